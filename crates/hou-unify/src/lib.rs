//! hou-unify
//!
//! Higher-order unification for a dependently-typed lambda calculus.
//! Given equality constraints over terms and universe levels containing
//! metavariables, the engine enumerates substitutions solving all of
//! them simultaneously, or reports that none exists.
//!
//! The engine combines first-order and pattern unification, flex-rigid
//! imitation/projection branching with depth-first search, pluggable
//! user constraints, universe-level unification, and justification
//! tracking with conflict-driven backjumping. It is not a decision
//! procedure: flex-flex constraints are conceded, solutions are not
//! guaranteed most general, and termination is bounded only by the step
//! budget.
//!
//! # Example
//!
//! ```
//! use hou_kernel::{Environment, Expr, Justification, Name, NameGenerator};
//! use hou_unify::{unify, Constraint, UnifierConfig};
//!
//! let env = Environment::new();
//! let m = Expr::metavar(Name::simple("m"), Expr::type_());
//! let c = Expr::local(Name::simple("c"), Expr::type_());
//! let cs = vec![Constraint::eq(m.clone(), c.clone(), Justification::asserted("?m =?= c"))];
//!
//! let mut solutions = unify(
//!     &env,
//!     cs,
//!     NameGenerator::new(Name::simple("u")),
//!     UnifierConfig::default(),
//! );
//! let s = solutions.next().unwrap().unwrap();
//! assert_eq!(s.instantiate_expr(&m).value, c);
//! ```

pub mod config;
pub mod constraint;
pub mod engine;
pub mod error;
pub mod lazy;
pub mod queue;
pub mod simple;

pub use config::{UnifierConfig, DEFAULT_MAX_STEPS};
pub use constraint::{
    null_plugin, ChoiceAlternative, ChoiceFn, Constraint, Constraints, UnifierPlugin,
};
pub use engine::{Solutions, Unifier};
pub use error::UnifierError;
pub use lazy::LazySeq;
pub use queue::{ConstraintQueue, FIRST_DELAYED, FIRST_VERY_DELAYED};
pub use simple::{
    lambda_abstract_locals, occurs_context_check, unify_simple_constraint, unify_simple_exprs,
    unify_simple_levels, UnifyStatus,
};

use hou_kernel::{
    obligation_sink, Environment, Expr, Justification, NameGenerator, Obligation, Substitution,
    TypeChecker,
};

/// Unify a set of constraints, returning the lazy solution stream
pub fn unify(
    env: &Environment,
    cs: Vec<Constraint>,
    ngen: NameGenerator,
    config: UnifierConfig,
) -> Solutions {
    Unifier::new(env, cs, ngen, config).solutions()
}

/// Unify a set of constraints with a user plugin installed
pub fn unify_with_plugin(
    env: &Environment,
    cs: Vec<Constraint>,
    ngen: NameGenerator,
    plugin: UnifierPlugin,
    config: UnifierConfig,
) -> Solutions {
    Unifier::new(env, cs, ngen, config)
        .with_plugin(plugin)
        .solutions()
}

/// Unify two expressions
///
/// Runs the kernel's definitional-equality check first and folds every
/// constraint it emits through the simple unifier; the full engine is
/// only spun up (with exceptions disabled, so exhaustion ends the
/// stream) for the constraints the simple unifier reports as
/// `Unsupported`.
pub fn unify_exprs(
    env: &Environment,
    lhs: &Expr,
    rhs: &Expr,
    mut ngen: NameGenerator,
    config: UnifierConfig,
) -> Solutions {
    let sink = obligation_sink();
    let mut tc = TypeChecker::new(env.clone(), ngen.child(), sink.clone());
    let j = Justification::asserted(format!("{lhs} =?= {rhs}"));
    if !tc.is_def_eq(lhs, rhs, &j) {
        return Solutions::empty();
    }
    let mut subst = Substitution::new();
    let mut residue: Vec<Constraint> = Vec::new();
    let emitted: Vec<Obligation> = sink.borrow_mut().drain(..).collect();
    for ob in emitted {
        let c = match ob {
            Obligation::ExprEq(a, b, j) => Constraint::eq(a, b, j),
            Obligation::LevelEq(a, b, j) => Constraint::level_eq(a, b, j),
        };
        let (status, extended) = unify_simple_constraint(&subst, &c);
        match status {
            UnifyStatus::Solved => subst = extended,
            UnifyStatus::Failed => return Solutions::empty(),
            UnifyStatus::Unsupported => residue.push(c),
        }
    }
    if residue.is_empty() {
        return Solutions::single(subst);
    }
    Unifier::new(env, residue, ngen, config.with_use_exceptions(false))
        .with_substitution(subst)
        .solutions()
}
