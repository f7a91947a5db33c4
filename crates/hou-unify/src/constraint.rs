//! Constraints
//!
//! The four constraint kinds the engine processes: expression equality,
//! universe-level equality, choice constraints (a generator enumerating
//! candidate values for a metavariable) and opaque plugin constraints
//! handed to the user plugin.

use crate::lazy::LazySeq;
use hou_kernel::{Expr, Justification, Level, Name, NameGenerator, Substitution};
use std::fmt;
use std::sync::Arc;

/// A list of constraints processed as one alternative
pub type Constraints = Vec<Constraint>;

/// One candidate produced by a choice function: the value the scrutinee
/// should equal, a justification, and extra constraints to process
#[derive(Clone, Debug)]
pub struct ChoiceAlternative {
    pub value: Expr,
    pub justification: Justification,
    pub constraints: Constraints,
}

impl ChoiceAlternative {
    pub fn new(value: Expr) -> Self {
        Self {
            value,
            justification: Justification::None,
            constraints: Vec::new(),
        }
    }

    pub fn with_justification(mut self, j: Justification) -> Self {
        self.justification = j;
        self
    }

    pub fn with_constraints(mut self, cs: Constraints) -> Self {
        self.constraints = cs;
        self
    }
}

/// Generator of candidates for a choice constraint; receives the
/// scrutinee's (instantiated) type, the current substitution and a fresh
/// name generator
pub type ChoiceFn = Arc<dyn Fn(&Expr, &Substitution, NameGenerator) -> LazySeq<ChoiceAlternative>>;

/// User plugin: enumerates alternative constraint lists for a constraint
/// the engine cannot solve itself
pub type UnifierPlugin = Arc<dyn Fn(&Constraint, NameGenerator) -> LazySeq<Constraints>>;

/// A plugin that never produces an alternative
pub fn null_plugin() -> UnifierPlugin {
    Arc::new(|_, _| LazySeq::empty())
}

/// A unification constraint
#[derive(Clone)]
pub enum Constraint {
    /// `lhs =?= rhs`
    Eq {
        lhs: Expr,
        rhs: Expr,
        j: Justification,
    },
    /// `lhs =?= rhs` on universe levels
    LevelEq {
        lhs: Level,
        rhs: Level,
        j: Justification,
    },
    /// Enumerate candidate values for the metavariable application `expr`
    Choice {
        expr: Expr,
        alternatives: ChoiceFn,
        j: Justification,
        /// Delayed choices are processed after all equality constraints
        delayed: bool,
    },
    /// Opaque constraint dispatched to the user plugin
    Plugin {
        tag: Name,
        args: Vec<Expr>,
        j: Justification,
    },
}

impl Constraint {
    pub fn eq(lhs: Expr, rhs: Expr, j: Justification) -> Self {
        Constraint::Eq { lhs, rhs, j }
    }

    pub fn level_eq(lhs: Level, rhs: Level, j: Justification) -> Self {
        Constraint::LevelEq { lhs, rhs, j }
    }

    pub fn choice(expr: Expr, alternatives: ChoiceFn, j: Justification, delayed: bool) -> Self {
        Constraint::Choice {
            expr,
            alternatives,
            j,
            delayed,
        }
    }

    pub fn plugin(tag: Name, args: Vec<Expr>, j: Justification) -> Self {
        Constraint::Plugin { tag, args, j }
    }

    pub fn justification(&self) -> &Justification {
        match self {
            Constraint::Eq { j, .. }
            | Constraint::LevelEq { j, .. }
            | Constraint::Choice { j, .. }
            | Constraint::Plugin { j, .. } => j,
        }
    }

    /// Compose `extra` onto this constraint's justification
    #[must_use]
    pub fn with_extra_justification(self, extra: Justification) -> Self {
        match self {
            Constraint::Eq { lhs, rhs, j } => Constraint::Eq {
                lhs,
                rhs,
                j: Justification::composite(j, extra),
            },
            Constraint::LevelEq { lhs, rhs, j } => Constraint::LevelEq {
                lhs,
                rhs,
                j: Justification::composite(j, extra),
            },
            Constraint::Choice {
                expr,
                alternatives,
                j,
                delayed,
            } => Constraint::Choice {
                expr,
                alternatives,
                j: Justification::composite(j, extra),
                delayed,
            },
            Constraint::Plugin { tag, args, j } => Constraint::Plugin {
                tag,
                args,
                j: Justification::composite(j, extra),
            },
        }
    }

    pub fn is_eq(&self) -> bool {
        matches!(self, Constraint::Eq { .. })
    }

    pub fn is_level_eq(&self) -> bool {
        matches!(self, Constraint::LevelEq { .. })
    }

    pub fn is_choice(&self) -> bool {
        matches!(self, Constraint::Choice { .. })
    }

    /// Equality with exactly one metavariable-headed side
    pub fn is_flex_rigid(&self) -> bool {
        match self {
            Constraint::Eq { lhs, rhs, .. } => lhs.is_meta_headed() != rhs.is_meta_headed(),
            _ => false,
        }
    }

    /// Equality with both sides metavariable-headed
    pub fn is_flex_flex(&self) -> bool {
        match self {
            Constraint::Eq { lhs, rhs, .. } => lhs.is_meta_headed() && rhs.is_meta_headed(),
            _ => false,
        }
    }
}

impl fmt::Display for Constraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Constraint::Eq { lhs, rhs, .. } => write!(f, "{lhs} =?= {rhs}"),
            Constraint::LevelEq { lhs, rhs, .. } => write!(f, "{lhs} =?= {rhs}"),
            Constraint::Choice { expr, .. } => write!(f, "choice {expr}"),
            Constraint::Plugin { tag, .. } => write!(f, "plugin {tag}"),
        }
    }
}

impl fmt::Debug for Constraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Constraint::Eq { lhs, rhs, .. } => write!(f, "Eq({lhs} =?= {rhs})"),
            Constraint::LevelEq { lhs, rhs, .. } => write!(f, "LevelEq({lhs} =?= {rhs})"),
            Constraint::Choice { expr, delayed, .. } => {
                write!(f, "Choice({expr}, delayed: {delayed})")
            }
            Constraint::Plugin { tag, args, .. } => write!(f, "Plugin({tag}, {} args)", args.len()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hou_kernel::Name;

    fn local(n: &str) -> Expr {
        Expr::local(Name::simple(n), Expr::type_())
    }

    fn meta(n: &str) -> Expr {
        Expr::metavar(Name::simple(n), Expr::type_())
    }

    #[test]
    fn test_classification() {
        let fr = Constraint::eq(
            Expr::app(meta("m"), local("x")),
            local("y"),
            Justification::None,
        );
        assert!(fr.is_flex_rigid());
        assert!(!fr.is_flex_flex());

        let ff = Constraint::eq(meta("m"), meta("k"), Justification::None);
        assert!(ff.is_flex_flex());
        assert!(!ff.is_flex_rigid());

        let rr = Constraint::eq(local("x"), local("y"), Justification::None);
        assert!(!rr.is_flex_rigid());
        assert!(!rr.is_flex_flex());
    }

    #[test]
    fn test_with_extra_justification() {
        let c = Constraint::eq(meta("m"), local("x"), Justification::asserted("orig"));
        let c = c.with_extra_justification(Justification::assumption(5));
        assert!(c.justification().depends_on(5));
    }
}
