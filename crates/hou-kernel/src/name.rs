//! Hierarchical names
//!
//! Names are sequences of string and numeric components (`Nat.add`,
//! `_hou.12`). They identify global constants, local constants and
//! metavariables, and key the persistent maps used by the unifier, so
//! they are `Ord` and cheap to clone.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// One component of a hierarchical name
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum NamePart {
    Str(String),
    Num(u64),
}

/// A hierarchical name
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Name(Arc<Vec<NamePart>>);

impl Name {
    /// The anonymous (empty) name
    pub fn anonymous() -> Self {
        Name(Arc::new(Vec::new()))
    }

    /// Create a single-component name
    pub fn simple(s: impl Into<String>) -> Self {
        Name(Arc::new(vec![NamePart::Str(s.into())]))
    }

    /// Create a hierarchical name from a dot-separated string
    pub fn from_string(s: &str) -> Self {
        Name(Arc::new(
            s.split('.').map(|p| NamePart::Str(p.to_string())).collect(),
        ))
    }

    /// Extend with a string component
    pub fn append_str(&self, s: impl Into<String>) -> Self {
        let mut parts = (*self.0).clone();
        parts.push(NamePart::Str(s.into()));
        Name(Arc::new(parts))
    }

    /// Extend with a numeric component
    pub fn append_num(&self, n: u64) -> Self {
        let mut parts = (*self.0).clone();
        parts.push(NamePart::Num(n));
        Name(Arc::new(parts))
    }

    pub fn is_anonymous(&self) -> bool {
        self.0.is_empty()
    }

    /// Number of components
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            return write!(f, "[anonymous]");
        }
        for (i, part) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ".")?;
            }
            match part {
                NamePart::Str(s) => write!(f, "{s}")?,
                NamePart::Num(n) => write!(f, "{n}")?,
            }
        }
        Ok(())
    }
}

impl From<&str> for Name {
    fn from(s: &str) -> Self {
        Name::from_string(s)
    }
}

/// Deterministic generator of fresh names
///
/// All names produced by a generator share its prefix, so distinct
/// generators with distinct prefixes never collide. `child` carves out a
/// fresh sub-prefix, which lets a component hand out generators to
/// collaborators (e.g. the type checker) without coordinating counters.
/// Equal seeds yield equal name streams; the unifier's determinism
/// guarantee rests on this.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NameGenerator {
    prefix: Name,
    next_idx: u64,
}

impl NameGenerator {
    pub fn new(prefix: Name) -> Self {
        Self {
            prefix,
            next_idx: 0,
        }
    }

    /// Produce the next fresh name
    pub fn next(&mut self) -> Name {
        let n = self.prefix.append_num(self.next_idx);
        self.next_idx += 1;
        n
    }

    /// Split off a child generator with its own namespace
    pub fn child(&mut self) -> NameGenerator {
        NameGenerator::new(self.next())
    }

    pub fn prefix(&self) -> &Name {
        &self.prefix
    }
}

impl Default for NameGenerator {
    fn default() -> Self {
        NameGenerator::new(Name::simple("_hou"))
    }
}
