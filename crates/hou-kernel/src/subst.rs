//! Metavariable substitutions
//!
//! A substitution maps term metavariables to expressions and universe
//! metavariables to levels, each paired with the justification of the
//! assignment. The maps are persistent (`im::OrdMap`): `assign_*`
//! returns an extended copy and leaves every previously held handle
//! untouched, which is what makes case-split snapshots O(1).

use crate::expr::{Expr, ExprKind};
use crate::justification::Justification;
use crate::level::Level;
use crate::name::Name;
use im::OrdMap;
use std::collections::BTreeSet;

/// Result of instantiating a term or level under a substitution
#[derive(Clone, Debug)]
pub struct Instantiated<T> {
    pub value: T,
    /// Composite justification of every assignment that was applied
    pub justification: Justification,
    /// Universe metavariables remaining in `value`
    pub unassigned_levels: BTreeSet<Name>,
    /// Term metavariables remaining in `value`
    pub unassigned_exprs: BTreeSet<Name>,
}

#[derive(Default)]
struct InstState {
    justification: Justification,
    unassigned_levels: BTreeSet<Name>,
    unassigned_exprs: BTreeSet<Name>,
}

/// Persistent assignment of metavariables to values
#[derive(Clone, Debug, Default)]
pub struct Substitution {
    exprs: OrdMap<Name, (Expr, Justification)>,
    levels: OrdMap<Name, (Level, Justification)>,
}

impl Substitution {
    pub fn new() -> Self {
        Self::default()
    }

    /// Extend with `m := v`; `m` must be unassigned
    #[must_use]
    pub fn assign_expr(&self, m: Name, v: Expr, j: Justification) -> Substitution {
        debug_assert!(!self.is_assigned_expr(&m), "metavariable assigned twice");
        let mut exprs = self.exprs.clone();
        exprs.insert(m, (v, j));
        Substitution {
            exprs,
            levels: self.levels.clone(),
        }
    }

    /// Extend with `m := l`; `m` must be unassigned
    #[must_use]
    pub fn assign_level(&self, m: Name, l: Level, j: Justification) -> Substitution {
        debug_assert!(!self.is_assigned_level(&m), "level metavariable assigned twice");
        let mut levels = self.levels.clone();
        levels.insert(m, (l, j));
        Substitution {
            exprs: self.exprs.clone(),
            levels,
        }
    }

    pub fn is_assigned_expr(&self, m: &Name) -> bool {
        self.exprs.contains_key(m)
    }

    pub fn is_assigned_level(&self, m: &Name) -> bool {
        self.levels.contains_key(m)
    }

    pub fn get_expr(&self, m: &Name) -> Option<&(Expr, Justification)> {
        self.exprs.get(m)
    }

    pub fn get_level(&self, m: &Name) -> Option<&(Level, Justification)> {
        self.levels.get(m)
    }

    /// Number of term-metavariable assignments
    pub fn num_expr_assignments(&self) -> usize {
        self.exprs.len()
    }

    /// Number of level-metavariable assignments
    pub fn num_level_assignments(&self) -> usize {
        self.levels.len()
    }

    /// Replace every assigned metavariable in `e` by its value,
    /// beta-reducing applied assignments, and report the composite
    /// justification and the metavariables that remain.
    pub fn instantiate_expr(&self, e: &Expr) -> Instantiated<Expr> {
        let mut st = InstState::default();
        let value = self.inst_expr(e, &mut st);
        Instantiated {
            value,
            justification: st.justification,
            unassigned_levels: st.unassigned_levels,
            unassigned_exprs: st.unassigned_exprs,
        }
    }

    /// Level analogue of [`Substitution::instantiate_expr`]
    pub fn instantiate_level(&self, l: &Level) -> Instantiated<Level> {
        let mut st = InstState::default();
        let value = self.inst_level(l, &mut st);
        Instantiated {
            value,
            justification: st.justification,
            unassigned_levels: st.unassigned_levels,
            unassigned_exprs: st.unassigned_exprs,
        }
    }

    fn inst_expr(&self, e: &Expr, st: &mut InstState) -> Expr {
        if !e.has_meta() {
            return e.clone();
        }
        match e.kind() {
            ExprKind::BVar(_) => e.clone(),
            ExprKind::Local { name, ty } => Expr::local(name.clone(), self.inst_expr(ty, st)),
            ExprKind::Meta { name, ty } => {
                if let Some((v, j)) = self.exprs.get(name) {
                    st.justification =
                        Justification::composite(st.justification.clone(), j.clone());
                    // assignments may chain; instantiate the value too
                    self.inst_expr(v, st)
                } else {
                    st.unassigned_exprs.insert(name.clone());
                    Expr::metavar(name.clone(), self.inst_expr(ty, st))
                }
            }
            ExprKind::Const { name, levels } => Expr::const_(
                name.clone(),
                levels.iter().map(|l| self.inst_level(l, st)).collect(),
            ),
            ExprKind::Sort(l) => Expr::sort(self.inst_level(l, st)),
            ExprKind::Lam(b) => Expr::lam(
                b.name.clone(),
                self.inst_expr(&b.ty, st),
                self.inst_expr(&b.body, st),
                b.info,
            ),
            ExprKind::Pi(b) => Expr::pi(
                b.name.clone(),
                self.inst_expr(&b.ty, st),
                self.inst_expr(&b.body, st),
                b.info,
            ),
            ExprKind::App(_, _) => {
                let (head, args) = e.unfold_app();
                if let Some(m) = head.meta_name() {
                    if let Some((v, j)) = self.exprs.get(m) {
                        st.justification =
                            Justification::composite(st.justification.clone(), j.clone());
                        let v = self.inst_expr(&v.clone(), st);
                        let args: Vec<Expr> =
                            args.iter().map(|a| self.inst_expr(a, st)).collect();
                        return Expr::apps_beta(v, &args);
                    }
                }
                let head = self.inst_expr(&head, st);
                Expr::apps(head, args.iter().map(|a| self.inst_expr(a, st)))
            }
            ExprKind::Macro { def, args } => Expr::macro_(
                def.clone(),
                args.iter().map(|a| self.inst_expr(a, st)).collect(),
            ),
        }
    }

    fn inst_level(&self, l: &Level, st: &mut InstState) -> Level {
        if !l.has_meta() {
            return l.clone();
        }
        match l {
            Level::Zero | Level::Param(_) => l.clone(),
            Level::Meta(name) => {
                if let Some((v, j)) = self.levels.get(name) {
                    st.justification =
                        Justification::composite(st.justification.clone(), j.clone());
                    self.inst_level(&v.clone(), st)
                } else {
                    st.unassigned_levels.insert(name.clone());
                    l.clone()
                }
            }
            Level::Succ(inner) => Level::succ(self.inst_level(inner, st)),
            Level::Max(a, b) => Level::max(self.inst_level(a, st), self.inst_level(b, st)),
            Level::IMax(a, b) => Level::imax(self.inst_level(a, st), self.inst_level(b, st)),
        }
    }
}
