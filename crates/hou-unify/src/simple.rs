//! Simple (first-order & pattern) unification
//!
//! Pure functions deciding the easy equalities without backtracking or
//! engine state. Used standalone, and as the fast path for constraints
//! the definitional-equality check emits on the fly: `Solved` and
//! `Failed` are final, `Unsupported` means the constraint needs the full
//! engine.

use crate::constraint::Constraint;
use hou_kernel::expr::ExprKind;
use hou_kernel::{Expr, Justification, Level, Name, Substitution};

/// Outcome of simple unification
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UnifyStatus {
    /// The constraint is satisfied (possibly extending the substitution)
    Solved,
    /// The constraint cannot be satisfied under any extension
    Failed,
    /// The caller must hand the constraint to the full engine
    Unsupported,
}

/// Close `e` over `locals` by abstraction and lambda binders, producing
/// the value assigned to a pattern metavariable
pub fn lambda_abstract_locals(e: &Expr, locals: &[Expr]) -> Expr {
    let mut v = e.abstract_locals(locals);
    for l in locals.iter().rev() {
        if let ExprKind::Local { name, ty } = l.kind() {
            v = Expr::lam(
                name.clone(),
                ty.clone(),
                v,
                hou_kernel::BinderInfo::Default,
            );
        }
    }
    v
}

/// True iff `e` does not contain the metavariable `m` and every local
/// constant of `e` is among `locals`
pub fn occurs_context_check(e: &Expr, m: &Name, locals: &[Expr]) -> bool {
    e.locals_subset_of(locals) && !e.occurs_expr_meta(m)
}

fn unify_simple_core(
    s: &Substitution,
    lhs: &Expr,
    rhs: &Expr,
    j: &Justification,
) -> (UnifyStatus, Substitution) {
    let Some((m, locals)) = lhs.as_simple_meta_pattern() else {
        return (UnifyStatus::Unsupported, s.clone());
    };
    if rhs.is_meta_headed() && rhs.get_app_fn() == &m {
        // same head metavariable on both sides: not ours to decide
        return (UnifyStatus::Unsupported, s.clone());
    }
    let Some(m_name) = m.meta_name().cloned() else {
        return (UnifyStatus::Unsupported, s.clone());
    };
    if !occurs_context_check(rhs, &m_name, &locals) {
        return (UnifyStatus::Failed, s.clone());
    }
    let v = lambda_abstract_locals(rhs, &locals);
    (UnifyStatus::Solved, s.assign_expr(m_name, v, j.clone()))
}

/// Simple unification of two expressions
pub fn unify_simple_exprs(
    s: &Substitution,
    lhs: &Expr,
    rhs: &Expr,
    j: &Justification,
) -> (UnifyStatus, Substitution) {
    if lhs == rhs {
        (UnifyStatus::Solved, s.clone())
    } else if !lhs.has_meta() && !rhs.has_meta() {
        (UnifyStatus::Failed, s.clone())
    } else if lhs.is_meta_headed() {
        unify_simple_core(s, lhs, rhs, j)
    } else if rhs.is_meta_headed() {
        unify_simple_core(s, rhs, lhs, j)
    } else {
        (UnifyStatus::Unsupported, s.clone())
    }
}

fn unify_simple_level_core(
    s: &Substitution,
    lhs: &Level,
    rhs: &Level,
    j: &Justification,
) -> (UnifyStatus, Substitution) {
    let Some(m) = lhs.meta_name() else {
        return (UnifyStatus::Unsupported, s.clone());
    };
    if rhs.occurs_meta(m) {
        if rhs.is_succ() {
            // ?m =?= succ(.. ?m ..) has no solution
            return (UnifyStatus::Failed, s.clone());
        }
        return (UnifyStatus::Unsupported, s.clone());
    }
    (
        UnifyStatus::Solved,
        s.assign_level(m.clone(), rhs.clone(), j.clone()),
    )
}

/// Simple unification of two universe levels
pub fn unify_simple_levels(
    s: &Substitution,
    lhs: &Level,
    rhs: &Level,
    j: &Justification,
) -> (UnifyStatus, Substitution) {
    if lhs == rhs {
        (UnifyStatus::Solved, s.clone())
    } else if !lhs.has_meta() && !rhs.has_meta() {
        (UnifyStatus::Failed, s.clone())
    } else if lhs.is_meta() {
        unify_simple_level_core(s, lhs, rhs, j)
    } else if rhs.is_meta() {
        unify_simple_level_core(s, rhs, lhs, j)
    } else if let (Some(l1), Some(l2)) = (lhs.succ_of(), rhs.succ_of()) {
        unify_simple_levels(s, l1, l2, j)
    } else {
        (UnifyStatus::Unsupported, s.clone())
    }
}

/// Simple unification of a constraint; choice and plugin constraints are
/// always `Unsupported`
pub fn unify_simple_constraint(s: &Substitution, c: &Constraint) -> (UnifyStatus, Substitution) {
    match c {
        Constraint::Eq { lhs, rhs, j } => unify_simple_exprs(s, lhs, rhs, j),
        Constraint::LevelEq { lhs, rhs, j } => unify_simple_levels(s, lhs, rhs, j),
        _ => (UnifyStatus::Unsupported, s.clone()),
    }
}
