//! Unifier errors

use hou_kernel::{Justification, KernelError};
use thiserror::Error;

/// Errors surfaced by the unification engine
#[derive(Debug, Error)]
pub enum UnifierError {
    /// All case splits are exhausted. The justification folds in every
    /// failed branch, so it names each constraint that contributed to
    /// the failure. Suppressed (end-of-stream instead) when
    /// `use_exceptions` is off.
    #[error("no solution: {0}")]
    NoSolution(Justification),

    /// The step budget was exhausted. Never suppressed; the budget can
    /// be raised via `UnifierConfig::max_steps`.
    #[error(
        "unifier maximum number of steps ({0}) exceeded; higher-order unification \
         may not terminate, the budget can be increased via max_steps"
    )]
    StepLimit(u64),

    /// The external interrupt flag was observed set
    #[error("unification interrupted")]
    Interrupted,

    /// A term was ill-typed during inference; passed through unchanged
    #[error(transparent)]
    Kernel(#[from] KernelError),

    /// A choice constraint whose scrutinee is not metavariable-headed
    #[error("invalid choice constraint: {0}")]
    ChoiceContract(String),
}
