//! Justifications
//!
//! A justification records why a constraint holds or why a branch
//! failed. It is a DAG over three leaf/node shapes: an asserted leaf
//! (user-provided, labelled), an assumption leaf (tagged with the case
//! split index that introduced it) and composite nodes. The conflict
//! resolver asks one question of a justification: does it depend on a
//! given assumption index? That test drives backjumping.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

/// Justification for an assignment, constraint or conflict
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub enum Justification {
    /// No information (unit of composition)
    #[default]
    None,
    /// Atomic, user-provided; the label names the originating constraint
    Asserted(Arc<str>),
    /// Introduced by the case split with this assumption index
    Assumption(u64),
    Composite(Arc<Justification>, Arc<Justification>),
}

impl Justification {
    pub fn asserted(label: impl Into<Arc<str>>) -> Self {
        Justification::Asserted(label.into())
    }

    pub fn assumption(idx: u64) -> Self {
        Justification::Assumption(idx)
    }

    pub fn is_none(&self) -> bool {
        matches!(self, Justification::None)
    }

    /// Compose two justifications; `None` sides are dropped
    pub fn composite(a: Justification, b: Justification) -> Justification {
        if a.is_none() {
            return b;
        }
        if b.is_none() {
            return a;
        }
        Justification::Composite(Arc::new(a), Arc::new(b))
    }

    /// True iff any leaf is `Assumption(idx)`
    pub fn depends_on(&self, idx: u64) -> bool {
        match self {
            Justification::None | Justification::Asserted(_) => false,
            Justification::Assumption(i) => *i == idx,
            Justification::Composite(a, b) => a.depends_on(idx) || b.depends_on(idx),
        }
    }

    /// Collect the labels of all asserted leaves
    pub fn collect_asserted(&self, out: &mut BTreeSet<Arc<str>>) {
        match self {
            Justification::None | Justification::Assumption(_) => {}
            Justification::Asserted(l) => {
                out.insert(l.clone());
            }
            Justification::Composite(a, b) => {
                a.collect_asserted(out);
                b.collect_asserted(out);
            }
        }
    }
}

impl fmt::Display for Justification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut asserted = BTreeSet::new();
        self.collect_asserted(&mut asserted);
        if asserted.is_empty() {
            return write!(f, "<no constraint information>");
        }
        for (i, label) in asserted.iter().enumerate() {
            if i > 0 {
                write!(f, "; ")?;
            }
            write!(f, "{label}")?;
        }
        Ok(())
    }
}
