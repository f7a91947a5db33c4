//! Unifier configuration

use serde::{Deserialize, Serialize};

/// Default value of [`UnifierConfig::max_steps`]
pub const DEFAULT_MAX_STEPS: u64 = 200_000;

/// Configuration of the unification engine
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct UnifierConfig {
    /// Hard step budget. Higher-order unification and unification hints
    /// may not terminate; this is the only safety net.
    pub max_steps: u64,

    /// When no (further) solution exists, raise a `NoSolution` error
    /// instead of ending the stream. The step-limit error is raised
    /// either way.
    pub use_exceptions: bool,
}

impl Default for UnifierConfig {
    fn default() -> Self {
        Self {
            max_steps: DEFAULT_MAX_STEPS,
            use_exceptions: true,
        }
    }
}

impl UnifierConfig {
    pub fn with_max_steps(mut self, max_steps: u64) -> Self {
        self.max_steps = max_steps;
        self
    }

    pub fn with_use_exceptions(mut self, use_exceptions: bool) -> Self {
        self.use_exceptions = use_exceptions;
        self
    }
}
