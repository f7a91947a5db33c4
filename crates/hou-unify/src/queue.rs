//! Constraint queue and occurrence indices
//!
//! The queue is an ordered map from insertion id (cidx) to constraint.
//! Ids are allocated from three disjoint bands, so the minimum-id
//! dequeue gives a strict priority without a separate key:
//!
//! - `[0, 2^28)` — regular
//! - `[2^28, 2^30)` — delayed (flex-rigid, unresolved universe
//!   constraints)
//! - `[2^30, ∞)` — very delayed (flex-flex, delayed choice)
//!
//! Two occurrence indices map metavariable names to the cidx sets of the
//! queued constraints referencing them; assigning a metavariable takes
//! its set and re-processes those constraints under the stronger
//! substitution.
//!
//! Everything is persistent (`im`): cloning the queue is the O(1)
//! snapshot taken at each case split, and removal by cidx is O(log n).

use crate::constraint::Constraint;
use hou_kernel::Name;
use im::{OrdMap, OrdSet};
use std::collections::BTreeSet;

/// First insertion id of the delayed band
pub const FIRST_DELAYED: u64 = 1 << 28;
/// First insertion id of the very-delayed band
pub const FIRST_VERY_DELAYED: u64 = 1 << 30;

/// Priority multiset of constraints plus reverse occurrence indices
#[derive(Clone, Debug, Default)]
pub struct ConstraintQueue {
    cnstrs: OrdMap<u64, Constraint>,
    mvar_occs: OrdMap<Name, OrdSet<u64>>,
    mlvl_occs: OrdMap<Name, OrdSet<u64>>,
}

impl ConstraintQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.cnstrs.is_empty()
    }

    pub fn len(&self) -> usize {
        self.cnstrs.len()
    }

    pub fn contains(&self, cidx: u64) -> bool {
        self.cnstrs.contains_key(&cidx)
    }

    /// Insert a constraint under `cidx` and index every metavariable
    /// name in the given sets
    pub fn add(
        &mut self,
        cidx: u64,
        c: Constraint,
        lvl_occs: &BTreeSet<Name>,
        var_occs: &BTreeSet<Name>,
    ) {
        self.cnstrs.insert(cidx, c);
        for m in lvl_occs {
            let mut set = self.mlvl_occs.get(m).cloned().unwrap_or_default();
            set.insert(cidx);
            self.mlvl_occs.insert(m.clone(), set);
        }
        for m in var_occs {
            let mut set = self.mvar_occs.get(m).cloned().unwrap_or_default();
            set.insert(cidx);
            self.mvar_occs.insert(m.clone(), set);
        }
    }

    /// Remove a constraint by insertion id
    pub fn remove(&mut self, cidx: u64) -> Option<Constraint> {
        self.cnstrs.remove(&cidx)
    }

    /// Dequeue the constraint with minimal insertion id
    pub fn pop_min(&mut self) -> Option<(u64, Constraint)> {
        let (cidx, c) = self.cnstrs.get_min().map(|(k, v)| (*k, v.clone()))?;
        self.cnstrs.remove(&cidx);
        Some((cidx, c))
    }

    /// Take the wake set of a term metavariable: its indexed cidxs in
    /// ascending order, with the index entry removed
    pub fn take_expr_occs(&mut self, m: &Name) -> Vec<u64> {
        match self.mvar_occs.remove(m) {
            Some(set) => set.iter().copied().collect(),
            None => Vec::new(),
        }
    }

    /// Level analogue of [`ConstraintQueue::take_expr_occs`]
    pub fn take_level_occs(&mut self, m: &Name) -> Vec<u64> {
        match self.mlvl_occs.remove(m) {
            Some(set) => set.iter().copied().collect(),
            None => Vec::new(),
        }
    }
}
