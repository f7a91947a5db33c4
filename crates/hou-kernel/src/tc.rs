//! Type checker
//!
//! Weak-head normalization (beta + delta), type inference and
//! definitional equality for the unifier. The checker never decides a
//! pair it cannot decide structurally: whenever either side of a
//! comparison is metavariable-headed (or a universe comparison involves
//! level metavariables), it emits an [`Obligation`] into its sink and
//! answers `true`, deferring the decision to the unification engine.
//!
//! `push`/`pop` bracket a savepoint around the internal caches; the
//! engine opens one savepoint per case split and pops it when the split
//! is discarded or restored.

use crate::env::Environment;
use crate::expr::{Expr, ExprKind};
use crate::justification::Justification;
use crate::level::Level;
use crate::name::{Name, NameGenerator};
use rustc_hash::FxHashMap;
use std::cell::RefCell;
use std::rc::Rc;
use thiserror::Error;

/// An equality the checker could not decide and hands back to the engine
#[derive(Clone, Debug)]
pub enum Obligation {
    ExprEq(Expr, Expr, Justification),
    LevelEq(Level, Level, Justification),
}

/// Shared buffer of emitted obligations; the engine drains it after
/// every checker call
pub type ObligationSink = Rc<RefCell<Vec<Obligation>>>;

/// Create an empty obligation sink
pub fn obligation_sink() -> ObligationSink {
    Rc::new(RefCell::new(Vec::new()))
}

#[derive(Debug, Error)]
pub enum KernelError {
    #[error("unbound variable index {0} in open term")]
    UnboundVariable(u32),
    #[error("unknown constant: {0}")]
    UnknownConst(Name),
    #[error("constant {0} expects {1} universe arguments, got {2}")]
    LevelArityMismatch(Name, usize, usize),
    #[error("expected function type, got: {0}")]
    NotAFunction(Box<Expr>),
    #[error("expected sort, got: {0}")]
    ExpectedSort(Box<Expr>),
    #[error("type mismatch: expected {expected}, got {inferred}")]
    TypeMismatch {
        expected: Box<Expr>,
        inferred: Box<Expr>,
    },
}

/// Type checker over a fixed environment
pub struct TypeChecker {
    env: Environment,
    ngen: NameGenerator,
    sink: ObligationSink,
    whnf_cache: FxHashMap<Expr, Expr>,
    savepoints: Vec<FxHashMap<Expr, Expr>>,
}

impl TypeChecker {
    pub fn new(env: Environment, ngen: NameGenerator, sink: ObligationSink) -> Self {
        Self {
            env,
            ngen,
            sink,
            whnf_cache: FxHashMap::default(),
            savepoints: Vec::new(),
        }
    }

    pub fn env(&self) -> &Environment {
        &self.env
    }

    /// Open a savepoint around the internal caches
    pub fn push(&mut self) {
        self.savepoints.push(self.whnf_cache.clone());
    }

    /// Restore the caches to the most recent savepoint
    pub fn pop(&mut self) {
        if let Some(saved) = self.savepoints.pop() {
            self.whnf_cache = saved;
        }
    }

    fn emit(&self, ob: Obligation) {
        self.sink.borrow_mut().push(ob);
    }

    /// Weak-head-normal-form: beta reduction plus delta unfolding of
    /// environment definitions. Never reduces under a metavariable head.
    pub fn whnf(&mut self, e: &Expr) -> Expr {
        if !e.is_app() && !e.is_const() {
            return e.clone();
        }
        if let Some(r) = self.whnf_cache.get(e) {
            return r.clone();
        }
        let r = self.whnf_core(e.clone());
        self.whnf_cache.insert(e.clone(), r.clone());
        r
    }

    fn whnf_core(&mut self, e: Expr) -> Expr {
        let mut e = e;
        loop {
            let (head, args) = e.unfold_app();
            if !args.is_empty() && matches!(head.kind(), ExprKind::Lam(_)) {
                e = Expr::apps_beta(head, &args);
                continue;
            }
            let unfolded = match head.kind() {
                ExprKind::Const { name, levels } => self
                    .env
                    .get(name)
                    .filter(|d| d.level_params.len() == levels.len())
                    .and_then(|d| d.instantiated_value(levels)),
                _ => None,
            };
            match unfolded {
                Some(v) => e = Expr::apps_beta(v, &args),
                None => return e,
            }
        }
    }

    /// Infer the type of an expression
    ///
    /// Application domain checks go through [`TypeChecker::is_def_eq`],
    /// so inferring a term containing metavariables may emit obligations
    /// rather than fail.
    pub fn infer(&mut self, e: &Expr) -> Result<Expr, KernelError> {
        match e.kind() {
            ExprKind::BVar(i) => Err(KernelError::UnboundVariable(*i)),
            ExprKind::Local { ty, .. } | ExprKind::Meta { ty, .. } => Ok(ty.clone()),
            ExprKind::Sort(l) => Ok(Expr::sort(Level::succ(l.clone()))),
            ExprKind::Const { name, levels } => {
                let decl = self
                    .env
                    .get(name)
                    .ok_or_else(|| KernelError::UnknownConst(name.clone()))?;
                if decl.level_params.len() != levels.len() {
                    return Err(KernelError::LevelArityMismatch(
                        name.clone(),
                        decl.level_params.len(),
                        levels.len(),
                    ));
                }
                Ok(decl.instantiated_type(levels))
            }
            ExprKind::App(f, a) => {
                let f_ty = self.infer(f)?;
                let f_ty = self.whnf(&f_ty);
                match f_ty.kind() {
                    ExprKind::Pi(b) => {
                        let a_ty = self.infer(a)?;
                        if !self.is_def_eq(&b.ty, &a_ty, &Justification::None) {
                            return Err(KernelError::TypeMismatch {
                                expected: Box::new(b.ty.clone()),
                                inferred: Box::new(a_ty),
                            });
                        }
                        Ok(b.body.instantiate(a))
                    }
                    _ => Err(KernelError::NotAFunction(Box::new(f_ty.clone()))),
                }
            }
            ExprKind::Lam(b) => {
                let x = Expr::local(self.ngen.next(), b.ty.clone());
                let body = b.body.instantiate(&x);
                let body_ty = self.infer(&body)?;
                let closed = body_ty.abstract_locals(&[x]);
                Ok(Expr::pi(b.name.clone(), b.ty.clone(), closed, b.info))
            }
            ExprKind::Pi(b) => {
                let dom_level = self.infer_sort_of(&b.ty)?;
                let x = Expr::local(self.ngen.next(), b.ty.clone());
                let body = b.body.instantiate(&x);
                let body_level = self.infer_sort_of(&body)?;
                Ok(Expr::sort(Level::imax(dom_level, body_level)))
            }
            ExprKind::Macro { def, .. } => Ok(def.result_type().clone()),
        }
    }

    /// Infer `e`'s type and extract its universe level
    ///
    /// When the type is metavariable-headed the level cannot be known
    /// yet: a fresh level metavariable is returned and the equation
    /// `type(e) =?= Sort ?u` is emitted for the engine.
    fn infer_sort_of(&mut self, e: &Expr) -> Result<Level, KernelError> {
        let ty = self.infer(e)?;
        let ty = self.whnf(&ty);
        match ty.kind() {
            ExprKind::Sort(l) => Ok(l.clone()),
            _ if ty.is_meta_headed() => {
                let u = Level::meta(self.ngen.next());
                self.emit(Obligation::ExprEq(
                    ty.clone(),
                    Expr::sort(u.clone()),
                    Justification::None,
                ));
                Ok(u)
            }
            _ => Err(KernelError::ExpectedSort(Box::new(ty.clone()))),
        }
    }

    /// Definitional equality
    ///
    /// Returns `false` only for pairs that are definitely unequal under
    /// every metavariable assignment. Undecidable pairs emit an
    /// obligation tagged with `j` and return `true`.
    pub fn is_def_eq(&mut self, a: &Expr, b: &Expr, j: &Justification) -> bool {
        let a = self.whnf(a);
        let b = self.whnf(b);
        self.def_eq_core(&a, &b, j)
    }

    fn def_eq_core(&mut self, a: &Expr, b: &Expr, j: &Justification) -> bool {
        if a == b {
            return true;
        }
        if a.is_meta_headed() || b.is_meta_headed() {
            self.emit(Obligation::ExprEq(a.clone(), b.clone(), j.clone()));
            return true;
        }
        match (a.kind(), b.kind()) {
            (ExprKind::Sort(l1), ExprKind::Sort(l2)) => self.level_def_eq(l1, l2, j),
            (
                ExprKind::Const {
                    name: n1,
                    levels: ls1,
                },
                ExprKind::Const {
                    name: n2,
                    levels: ls2,
                },
            ) => {
                n1 == n2
                    && ls1.len() == ls2.len()
                    && ls1
                        .iter()
                        .zip(ls2.iter())
                        .all(|(l1, l2)| self.level_def_eq(l1, l2, j))
            }
            (ExprKind::App(f1, a1), ExprKind::App(f2, a2)) => {
                // both sides are stuck applications
                self.is_def_eq(f1, f2, j) && self.is_def_eq(a1, a2, j)
            }
            (ExprKind::Lam(b1), ExprKind::Lam(b2)) | (ExprKind::Pi(b1), ExprKind::Pi(b2)) => {
                if b1.info != b2.info || !self.is_def_eq(&b1.ty, &b2.ty, j) {
                    return false;
                }
                let x = Expr::local(self.ngen.next(), b1.ty.clone());
                let body1 = b1.body.instantiate(&x);
                let body2 = b2.body.instantiate(&x);
                self.is_def_eq(&body1, &body2, j)
            }
            (
                ExprKind::Macro {
                    def: d1,
                    args: args1,
                },
                ExprKind::Macro {
                    def: d2,
                    args: args2,
                },
            ) => {
                d1 == d2
                    && args1.len() == args2.len()
                    && args1
                        .iter()
                        .zip(args2.iter())
                        .all(|(x, y)| self.is_def_eq(x, y, j))
            }
            _ => false,
        }
    }

    fn level_def_eq(&mut self, l1: &Level, l2: &Level, j: &Justification) -> bool {
        let n1 = l1.normalize();
        let n2 = l2.normalize();
        if n1 == n2 {
            return true;
        }
        if n1.has_meta() || n2.has_meta() {
            self.emit(Obligation::LevelEq(n1, n2, j.clone()));
            return true;
        }
        false
    }
}
