//! hou kernel
//!
//! The term and universe model consumed by the `hou-unify` engine,
//! together with the kernel collaborators the unifier drives:
//!
//! - Hierarchical names and deterministic name generators (`name`)
//! - Universe levels with normalization (`level`)
//! - Expressions with cached metavariable/local bits (`expr`)
//! - The global environment of constant declarations (`env`)
//! - The justification algebra for conflict analysis (`justification`)
//! - The persistent metavariable substitution (`subst`)
//! - The type checker: whnf, inference, definitional equality with
//!   deferred obligations, and cache savepoints (`tc`)
//!
//! Terms, levels and justifications are shared DAGs (`Arc`); the
//! substitution is a persistent map, so snapshots taken by the unifier's
//! case splits are O(1) clones.

pub mod env;
pub mod expr;
pub mod justification;
pub mod level;
pub mod name;
pub mod subst;
pub mod tc;

pub use env::{Declaration, EnvError, Environment};
pub use expr::{Binder, BinderInfo, Expr, ExprKind, MacroDef};
pub use justification::Justification;
pub use level::Level;
pub use name::{Name, NameGenerator};
pub use subst::{Instantiated, Substitution};
pub use tc::{obligation_sink, KernelError, Obligation, ObligationSink, TypeChecker};
