//! Expressions
//!
//! The term language of the kernel: De Bruijn bound variables, free local
//! constants, metavariables, global constants with universe arguments,
//! sorts, lambda/pi binders, applications and opaque macros.
//!
//! Nodes are reference-counted and carry two cached bits, `has_meta` and
//! `has_local`, so traversals that only care about metavariables or
//! locals can skip entire subtrees. `has_meta` covers universe
//! metavariables too (a `Sort` or `Const` whose levels mention a meta is
//! flagged), which is what lets instantiation and the occurs check trust
//! the bit.

use crate::level::Level;
use crate::name::Name;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// Binder annotation (how an argument is supplied)
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BinderInfo {
    Default,
    Implicit,
    StrictImplicit,
    InstImplicit,
}

/// A lambda or pi binder
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Binder {
    /// Suggested name for the bound variable
    pub name: Name,
    /// Domain type
    pub ty: Expr,
    /// Body, with bound variable 0 referring to this binder
    pub body: Expr,
    pub info: BinderInfo,
}

/// Definition of an opaque macro
///
/// Macros are compared by identity (their name), never structurally; two
/// macro applications unify only when their definitions are the same
/// object and their arguments unify.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MacroDef(Arc<MacroDefData>);

#[derive(Clone, Debug, Serialize, Deserialize)]
struct MacroDefData {
    name: Name,
    /// Result type of any application of this macro
    ty: Expr,
}

impl MacroDef {
    pub fn new(name: Name, ty: Expr) -> Self {
        MacroDef(Arc::new(MacroDefData { name, ty }))
    }

    pub fn name(&self) -> &Name {
        &self.0.name
    }

    pub fn result_type(&self) -> &Expr {
        &self.0.ty
    }
}

impl PartialEq for MacroDef {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0) || self.0.name == other.0.name
    }
}

impl Eq for MacroDef {}

impl Hash for MacroDef {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.name.hash(state);
    }
}

/// Expression node kinds
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ExprKind {
    /// Bound variable (De Bruijn index)
    BVar(u32),
    /// Free local constant
    Local { name: Name, ty: Expr },
    /// Metavariable
    Meta { name: Name, ty: Expr },
    /// Global constant with universe arguments
    Const { name: Name, levels: Vec<Level> },
    /// Sort of a universe level
    Sort(Level),
    Lam(Binder),
    Pi(Binder),
    App(Expr, Expr),
    /// Opaque macro applied to subterm arguments
    Macro { def: MacroDef, args: Vec<Expr> },
}

#[derive(Debug, Serialize, Deserialize)]
struct ExprData {
    kind: ExprKind,
    has_meta: bool,
    has_local: bool,
}

/// An expression (shared, immutable)
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Expr(Arc<ExprData>);

impl PartialEq for Expr {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0) || self.0.kind == other.0.kind
    }
}

impl Eq for Expr {}

impl Hash for Expr {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.kind.hash(state);
    }
}

impl Expr {
    fn mk(kind: ExprKind) -> Self {
        let (has_meta, has_local) = match &kind {
            ExprKind::BVar(_) => (false, false),
            ExprKind::Local { ty, .. } => (ty.has_meta(), true),
            ExprKind::Meta { ty, .. } => (true, ty.has_local()),
            ExprKind::Const { levels, .. } => (levels.iter().any(Level::has_meta), false),
            ExprKind::Sort(l) => (l.has_meta(), false),
            ExprKind::Lam(b) | ExprKind::Pi(b) => (
                b.ty.has_meta() || b.body.has_meta(),
                b.ty.has_local() || b.body.has_local(),
            ),
            ExprKind::App(f, a) => (
                f.has_meta() || a.has_meta(),
                f.has_local() || a.has_local(),
            ),
            ExprKind::Macro { args, .. } => (
                args.iter().any(Expr::has_meta),
                args.iter().any(Expr::has_local),
            ),
        };
        Expr(Arc::new(ExprData {
            kind,
            has_meta,
            has_local,
        }))
    }

    pub fn bvar(idx: u32) -> Self {
        Expr::mk(ExprKind::BVar(idx))
    }

    pub fn local(name: Name, ty: Expr) -> Self {
        Expr::mk(ExprKind::Local { name, ty })
    }

    pub fn metavar(name: Name, ty: Expr) -> Self {
        Expr::mk(ExprKind::Meta { name, ty })
    }

    pub fn const_(name: Name, levels: Vec<Level>) -> Self {
        Expr::mk(ExprKind::Const { name, levels })
    }

    pub fn sort(level: Level) -> Self {
        Expr::mk(ExprKind::Sort(level))
    }

    /// `Prop`, i.e. `Sort 0`
    pub fn prop() -> Self {
        Expr::sort(Level::zero())
    }

    /// `Type`, i.e. `Sort 1`
    pub fn type_() -> Self {
        Expr::sort(Level::one())
    }

    pub fn lam(name: Name, ty: Expr, body: Expr, info: BinderInfo) -> Self {
        Expr::mk(ExprKind::Lam(Binder {
            name,
            ty,
            body,
            info,
        }))
    }

    pub fn pi(name: Name, ty: Expr, body: Expr, info: BinderInfo) -> Self {
        Expr::mk(ExprKind::Pi(Binder {
            name,
            ty,
            body,
            info,
        }))
    }

    pub fn app(f: Expr, a: Expr) -> Self {
        Expr::mk(ExprKind::App(f, a))
    }

    /// Apply `f` to `args` left to right
    pub fn apps(f: Expr, args: impl IntoIterator<Item = Expr>) -> Self {
        args.into_iter().fold(f, Expr::app)
    }

    /// Apply `f` to `args`, beta-reducing as long as `f` is a lambda
    pub fn apps_beta(f: Expr, args: &[Expr]) -> Self {
        let mut e = f;
        let mut i = 0;
        while i < args.len() {
            let reduced = match e.kind() {
                ExprKind::Lam(b) => b.body.instantiate(&args[i]),
                _ => break,
            };
            e = reduced;
            i += 1;
        }
        Expr::apps(e, args[i..].iter().cloned())
    }

    pub fn macro_(def: MacroDef, args: Vec<Expr>) -> Self {
        Expr::mk(ExprKind::Macro { def, args })
    }

    pub fn kind(&self) -> &ExprKind {
        &self.0.kind
    }

    /// True if any term or universe metavariable occurs in this expression
    pub fn has_meta(&self) -> bool {
        self.0.has_meta
    }

    /// True if any local constant occurs in this expression
    pub fn has_local(&self) -> bool {
        self.0.has_local
    }

    pub fn is_bvar(&self) -> bool {
        matches!(self.0.kind, ExprKind::BVar(_))
    }

    pub fn is_local(&self) -> bool {
        matches!(self.0.kind, ExprKind::Local { .. })
    }

    pub fn is_metavar(&self) -> bool {
        matches!(self.0.kind, ExprKind::Meta { .. })
    }

    pub fn is_sort(&self) -> bool {
        matches!(self.0.kind, ExprKind::Sort(_))
    }

    pub fn is_const(&self) -> bool {
        matches!(self.0.kind, ExprKind::Const { .. })
    }

    pub fn is_app(&self) -> bool {
        matches!(self.0.kind, ExprKind::App(_, _))
    }

    pub fn is_binder(&self) -> bool {
        matches!(self.0.kind, ExprKind::Lam(_) | ExprKind::Pi(_))
    }

    pub fn is_pi(&self) -> bool {
        matches!(self.0.kind, ExprKind::Pi(_))
    }

    pub fn is_macro(&self) -> bool {
        matches!(self.0.kind, ExprKind::Macro { .. })
    }

    /// True if the application head is a metavariable
    pub fn is_meta_headed(&self) -> bool {
        self.get_app_fn().is_metavar()
    }

    /// The name of this metavariable, if it is one
    pub fn meta_name(&self) -> Option<&Name> {
        match &self.0.kind {
            ExprKind::Meta { name, .. } => Some(name),
            _ => None,
        }
    }

    /// The declared type of this metavariable, if it is one
    pub fn meta_type(&self) -> Option<&Expr> {
        match &self.0.kind {
            ExprKind::Meta { ty, .. } => Some(ty),
            _ => None,
        }
    }

    /// Head of the application spine (`f` in `f a1 ... an`)
    pub fn get_app_fn(&self) -> &Expr {
        let mut e = self;
        while let ExprKind::App(f, _) = &e.0.kind {
            e = f;
        }
        e
    }

    /// Decompose the application spine into head and arguments
    pub fn unfold_app(&self) -> (Expr, Vec<Expr>) {
        let mut args = Vec::new();
        let mut e = self;
        while let ExprKind::App(f, a) = &e.0.kind {
            args.push(a.clone());
            e = f;
        }
        args.reverse();
        (e.clone(), args)
    }

    /// If this is `?m x1 ... xn` with the `xi` pairwise-distinct locals,
    /// return the metavariable head and the argument locals.
    pub fn as_simple_meta_pattern(&self) -> Option<(Expr, Vec<Expr>)> {
        let (head, args) = self.unfold_app();
        if !head.is_metavar() {
            return None;
        }
        for (i, a) in args.iter().enumerate() {
            if !a.is_local() || args[..i].contains(a) {
                return None;
            }
        }
        Some((head, args))
    }

    /// Shift bound variables with index >= `start` up by `amount`
    #[must_use]
    pub fn lift_bvars(&self, start: u32, amount: u32) -> Expr {
        if amount == 0 {
            return self.clone();
        }
        match &self.0.kind {
            ExprKind::BVar(i) => {
                if *i >= start {
                    Expr::bvar(i + amount)
                } else {
                    self.clone()
                }
            }
            ExprKind::Local { .. }
            | ExprKind::Meta { .. }
            | ExprKind::Const { .. }
            | ExprKind::Sort(_) => self.clone(),
            ExprKind::Lam(b) => Expr::lam(
                b.name.clone(),
                b.ty.lift_bvars(start, amount),
                b.body.lift_bvars(start + 1, amount),
                b.info,
            ),
            ExprKind::Pi(b) => Expr::pi(
                b.name.clone(),
                b.ty.lift_bvars(start, amount),
                b.body.lift_bvars(start + 1, amount),
                b.info,
            ),
            ExprKind::App(f, a) => {
                Expr::app(f.lift_bvars(start, amount), a.lift_bvars(start, amount))
            }
            ExprKind::Macro { def, args } => Expr::macro_(
                def.clone(),
                args.iter().map(|a| a.lift_bvars(start, amount)).collect(),
            ),
        }
    }

    /// Substitute `v` for bound variable 0 (used to open a binder body)
    #[must_use]
    pub fn instantiate(&self, v: &Expr) -> Expr {
        self.instantiate_at(0, v)
    }

    fn instantiate_at(&self, depth: u32, v: &Expr) -> Expr {
        match &self.0.kind {
            ExprKind::BVar(i) => {
                if *i == depth {
                    v.lift_bvars(0, depth)
                } else if *i > depth {
                    Expr::bvar(i - 1)
                } else {
                    self.clone()
                }
            }
            ExprKind::Local { .. }
            | ExprKind::Meta { .. }
            | ExprKind::Const { .. }
            | ExprKind::Sort(_) => self.clone(),
            ExprKind::Lam(b) => Expr::lam(
                b.name.clone(),
                b.ty.instantiate_at(depth, v),
                b.body.instantiate_at(depth + 1, v),
                b.info,
            ),
            ExprKind::Pi(b) => Expr::pi(
                b.name.clone(),
                b.ty.instantiate_at(depth, v),
                b.body.instantiate_at(depth + 1, v),
                b.info,
            ),
            ExprKind::App(f, a) => Expr::app(f.instantiate_at(depth, v), a.instantiate_at(depth, v)),
            ExprKind::Macro { def, args } => Expr::macro_(
                def.clone(),
                args.iter().map(|a| a.instantiate_at(depth, v)).collect(),
            ),
        }
    }

    /// Replace each of `locals` (which must be `Local`s) by a bound
    /// variable: `locals[j]` becomes index `locals.len() - j - 1` at the
    /// outermost depth, so wrapping the result in binders for `locals`
    /// left to right closes the term.
    #[must_use]
    pub fn abstract_locals(&self, locals: &[Expr]) -> Expr {
        if locals.is_empty() || !self.has_local() {
            return self.clone();
        }
        self.abstract_locals_at(0, locals)
    }

    fn abstract_locals_at(&self, depth: u32, locals: &[Expr]) -> Expr {
        if !self.has_local() {
            return self.clone();
        }
        match &self.0.kind {
            ExprKind::Local { .. } => {
                for (j, l) in locals.iter().enumerate() {
                    if self == l {
                        let idx = locals.len() as u32 - j as u32 - 1 + depth;
                        return Expr::bvar(idx);
                    }
                }
                self.clone()
            }
            ExprKind::BVar(_) | ExprKind::Const { .. } | ExprKind::Sort(_) => self.clone(),
            ExprKind::Meta { .. } => self.clone(),
            ExprKind::Lam(b) => Expr::lam(
                b.name.clone(),
                b.ty.abstract_locals_at(depth, locals),
                b.body.abstract_locals_at(depth + 1, locals),
                b.info,
            ),
            ExprKind::Pi(b) => Expr::pi(
                b.name.clone(),
                b.ty.abstract_locals_at(depth, locals),
                b.body.abstract_locals_at(depth + 1, locals),
                b.info,
            ),
            ExprKind::App(f, a) => Expr::app(
                f.abstract_locals_at(depth, locals),
                a.abstract_locals_at(depth, locals),
            ),
            ExprKind::Macro { def, args } => Expr::macro_(
                def.clone(),
                args.iter()
                    .map(|a| a.abstract_locals_at(depth, locals))
                    .collect(),
            ),
        }
    }

    /// Substitute universe parameters throughout the expression
    #[must_use]
    pub fn instantiate_level_params(&self, subst: &[(Name, Level)]) -> Expr {
        if subst.is_empty() {
            return self.clone();
        }
        match &self.0.kind {
            ExprKind::BVar(_) => self.clone(),
            ExprKind::Local { name, ty } => {
                Expr::local(name.clone(), ty.instantiate_level_params(subst))
            }
            ExprKind::Meta { name, ty } => {
                Expr::metavar(name.clone(), ty.instantiate_level_params(subst))
            }
            ExprKind::Const { name, levels } => Expr::const_(
                name.clone(),
                levels.iter().map(|l| l.substitute_params(subst)).collect(),
            ),
            ExprKind::Sort(l) => Expr::sort(l.substitute_params(subst)),
            ExprKind::Lam(b) => Expr::lam(
                b.name.clone(),
                b.ty.instantiate_level_params(subst),
                b.body.instantiate_level_params(subst),
                b.info,
            ),
            ExprKind::Pi(b) => Expr::pi(
                b.name.clone(),
                b.ty.instantiate_level_params(subst),
                b.body.instantiate_level_params(subst),
                b.info,
            ),
            ExprKind::App(f, a) => Expr::app(
                f.instantiate_level_params(subst),
                a.instantiate_level_params(subst),
            ),
            ExprKind::Macro { def, args } => Expr::macro_(
                def.clone(),
                args.iter()
                    .map(|a| a.instantiate_level_params(subst))
                    .collect(),
            ),
        }
    }

    /// Check whether the term metavariable `m` occurs anywhere in this
    /// expression (including metavariable types)
    pub fn occurs_expr_meta(&self, m: &Name) -> bool {
        if !self.has_meta() {
            return false;
        }
        match &self.0.kind {
            ExprKind::BVar(_) | ExprKind::Const { .. } | ExprKind::Sort(_) => false,
            ExprKind::Local { ty, .. } => ty.occurs_expr_meta(m),
            ExprKind::Meta { name, ty } => name == m || ty.occurs_expr_meta(m),
            ExprKind::Lam(b) | ExprKind::Pi(b) => {
                b.ty.occurs_expr_meta(m) || b.body.occurs_expr_meta(m)
            }
            ExprKind::App(f, a) => f.occurs_expr_meta(m) || a.occurs_expr_meta(m),
            ExprKind::Macro { args, .. } => args.iter().any(|a| a.occurs_expr_meta(m)),
        }
    }

    /// Check that every local constant occurring in this expression is
    /// one of `locals`
    pub fn locals_subset_of(&self, locals: &[Expr]) -> bool {
        if !self.has_local() {
            return true;
        }
        match &self.0.kind {
            ExprKind::BVar(_) | ExprKind::Const { .. } | ExprKind::Sort(_) => true,
            ExprKind::Local { .. } => locals.contains(self),
            ExprKind::Meta { ty, .. } => ty.locals_subset_of(locals),
            ExprKind::Lam(b) | ExprKind::Pi(b) => {
                b.ty.locals_subset_of(locals) && b.body.locals_subset_of(locals)
            }
            ExprKind::App(f, a) => f.locals_subset_of(locals) && a.locals_subset_of(locals),
            ExprKind::Macro { args, .. } => args.iter().all(|a| a.locals_subset_of(locals)),
        }
    }

    /// Collect the names of all universe and term metavariables
    pub fn collect_metas(&self, lvl_metas: &mut BTreeSet<Name>, expr_metas: &mut BTreeSet<Name>) {
        if !self.has_meta() {
            return;
        }
        match &self.0.kind {
            ExprKind::BVar(_) => {}
            ExprKind::Local { ty, .. } => ty.collect_metas(lvl_metas, expr_metas),
            ExprKind::Meta { name, ty } => {
                expr_metas.insert(name.clone());
                ty.collect_metas(lvl_metas, expr_metas);
            }
            ExprKind::Const { levels, .. } => {
                for l in levels {
                    l.collect_metas(lvl_metas);
                }
            }
            ExprKind::Sort(l) => l.collect_metas(lvl_metas),
            ExprKind::Lam(b) | ExprKind::Pi(b) => {
                b.ty.collect_metas(lvl_metas, expr_metas);
                b.body.collect_metas(lvl_metas, expr_metas);
            }
            ExprKind::App(f, a) => {
                f.collect_metas(lvl_metas, expr_metas);
                a.collect_metas(lvl_metas, expr_metas);
            }
            ExprKind::Macro { args, .. } => {
                for a in args {
                    a.collect_metas(lvl_metas, expr_metas);
                }
            }
        }
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.0.kind {
            ExprKind::BVar(i) => write!(f, "#{i}"),
            ExprKind::Local { name, .. } => write!(f, "{name}"),
            ExprKind::Meta { name, .. } => write!(f, "?{name}"),
            ExprKind::Const { name, levels } => {
                write!(f, "{name}")?;
                if !levels.is_empty() {
                    write!(f, ".{{")?;
                    for (i, l) in levels.iter().enumerate() {
                        if i > 0 {
                            write!(f, ", ")?;
                        }
                        write!(f, "{l}")?;
                    }
                    write!(f, "}}")?;
                }
                Ok(())
            }
            ExprKind::Sort(l) => {
                if l.is_zero() {
                    write!(f, "Prop")
                } else {
                    write!(f, "Sort {l}")
                }
            }
            ExprKind::Lam(b) => write!(f, "(fun {} : {} => {})", b.name, b.ty, b.body),
            ExprKind::Pi(b) => write!(f, "(Pi {} : {}, {})", b.name, b.ty, b.body),
            ExprKind::App(g, a) => write!(f, "({g} {a})"),
            ExprKind::Macro { def, args } => {
                write!(f, "[{}", def.name())?;
                for a in args {
                    write!(f, " {a}")?;
                }
                write!(f, "]")
            }
        }
    }
}
