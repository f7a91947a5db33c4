//! Universe levels
//!
//! Universe levels stratify the sort hierarchy. The unifier additionally
//! deals in level metavariables (`Level::Meta`), placeholders solved by
//! universe unification.
//!
//! Key properties:
//! - `imax(l1, l2) = 0` if `l2 = 0`, otherwise `max(l1, l2)` — this is
//!   what makes `(x : Prop) → T` land in `Prop` when `T` does.
//! - `normalize` is the kernel's canonical form; the unifier always
//!   normalizes before comparing levels.

use crate::name::Name;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Universe level
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Level {
    /// Zero (the lowest level)
    Zero,
    /// Successor: l + 1
    Succ(Arc<Level>),
    /// Maximum: max(l1, l2)
    Max(Arc<Level>, Arc<Level>),
    /// Impredicative maximum: imax(l1, l2) = 0 if l2 = 0, else max(l1, l2)
    IMax(Arc<Level>, Arc<Level>),
    /// Universe parameter (polymorphism)
    Param(Name),
    /// Universe metavariable, solved by unification
    Meta(Name),
}

impl Level {
    pub fn zero() -> Self {
        Level::Zero
    }

    /// One, i.e. the level of `Type`
    pub fn one() -> Self {
        Level::succ(Level::Zero)
    }

    pub fn succ(l: Level) -> Self {
        Level::Succ(Arc::new(l))
    }

    /// Create a max level, simplifying if possible
    pub fn max(l1: Level, l2: Level) -> Self {
        if l1 == l2 {
            return l1;
        }
        if l1.is_zero() {
            return l2;
        }
        if l2.is_zero() {
            return l1;
        }
        Level::Max(Arc::new(l1), Arc::new(l2))
    }

    /// Create an imax level, simplifying if possible
    pub fn imax(l1: Level, l2: Level) -> Self {
        // imax(l, 0) = 0
        if l2.is_zero() {
            return Level::Zero;
        }
        // imax(l, succ(l')) = max(l, succ(l')) since succ(l') > 0
        if matches!(l2, Level::Succ(_)) {
            return Level::max(l1, l2);
        }
        if l1.is_zero() {
            return l2;
        }
        if l1 == l2 {
            return l1;
        }
        Level::IMax(Arc::new(l1), Arc::new(l2))
    }

    pub fn param(name: Name) -> Self {
        Level::Param(name)
    }

    pub fn meta(name: Name) -> Self {
        Level::Meta(name)
    }

    /// Check if this is definitely zero
    pub fn is_zero(&self) -> bool {
        match self {
            Level::Zero => true,
            // Params and metas might be 0 at instantiation time
            Level::Succ(_) | Level::Param(_) | Level::Meta(_) => false,
            Level::Max(l1, l2) => l1.is_zero() && l2.is_zero(),
            Level::IMax(_, l2) => l2.is_zero(),
        }
    }

    pub fn is_succ(&self) -> bool {
        matches!(self, Level::Succ(_))
    }

    pub fn is_meta(&self) -> bool {
        matches!(self, Level::Meta(_))
    }

    /// The metavariable name, if this is a meta
    pub fn meta_name(&self) -> Option<&Name> {
        match self {
            Level::Meta(n) => Some(n),
            _ => None,
        }
    }

    /// The argument of an outer successor, if any
    pub fn succ_of(&self) -> Option<&Level> {
        match self {
            Level::Succ(l) => Some(l),
            _ => None,
        }
    }

    /// Get the base level and offset: `succ(succ(u))` => `(u, 2)`
    pub fn get_offset(&self) -> (&Level, u32) {
        match self {
            Level::Succ(inner) => {
                let (base, offset) = inner.get_offset();
                (base, offset + 1)
            }
            _ => (self, 0),
        }
    }

    /// Add `n` successors on top of this level
    #[must_use]
    pub fn add_offset(&self, n: u32) -> Level {
        let mut l = self.clone();
        for _ in 0..n {
            l = Level::succ(l);
        }
        l
    }

    /// Normalize the level to a canonical form
    #[must_use]
    pub fn normalize(&self) -> Level {
        match self {
            Level::Zero | Level::Param(_) | Level::Meta(_) => self.clone(),
            Level::Succ(l) => Level::succ(l.normalize()),
            Level::Max(l1, l2) => Level::max(l1.normalize(), l2.normalize()),
            Level::IMax(l1, l2) => {
                let l2n = l2.normalize();
                if l2n.is_zero() {
                    return Level::Zero;
                }
                if l2n.is_succ() {
                    return Level::max(l1.normalize(), l2n);
                }
                Level::imax(l1.normalize(), l2n)
            }
        }
    }

    /// Check if this level contains any metavariable
    pub fn has_meta(&self) -> bool {
        match self {
            Level::Zero | Level::Param(_) => false,
            Level::Meta(_) => true,
            Level::Succ(l) => l.has_meta(),
            Level::Max(l1, l2) | Level::IMax(l1, l2) => l1.has_meta() || l2.has_meta(),
        }
    }

    /// Check if the metavariable `m` occurs in this level
    pub fn occurs_meta(&self, m: &Name) -> bool {
        match self {
            Level::Zero | Level::Param(_) => false,
            Level::Meta(n) => n == m,
            Level::Succ(l) => l.occurs_meta(m),
            Level::Max(l1, l2) | Level::IMax(l1, l2) => l1.occurs_meta(m) || l2.occurs_meta(m),
        }
    }

    /// Collect the names of all metavariables into `out`
    pub fn collect_metas(&self, out: &mut std::collections::BTreeSet<Name>) {
        match self {
            Level::Zero | Level::Param(_) => {}
            Level::Meta(n) => {
                out.insert(n.clone());
            }
            Level::Succ(l) => l.collect_metas(out),
            Level::Max(l1, l2) | Level::IMax(l1, l2) => {
                l1.collect_metas(out);
                l2.collect_metas(out);
            }
        }
    }

    /// Substitute universe parameters
    #[must_use]
    pub fn substitute_params(&self, subst: &[(Name, Level)]) -> Level {
        match self {
            Level::Zero | Level::Meta(_) => self.clone(),
            Level::Succ(l) => Level::succ(l.substitute_params(subst)),
            Level::Max(l1, l2) => {
                Level::max(l1.substitute_params(subst), l2.substitute_params(subst))
            }
            Level::IMax(l1, l2) => {
                Level::imax(l1.substitute_params(subst), l2.substitute_params(subst))
            }
            Level::Param(name) => {
                for (n, level) in subst {
                    if n == name {
                        return level.clone();
                    }
                }
                self.clone()
            }
        }
    }
}

impl std::fmt::Display for Level {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Level::Zero => write!(f, "0"),
            Level::Succ(_) => {
                let (base, offset) = self.get_offset();
                if base.is_zero() {
                    write!(f, "{offset}")
                } else {
                    write!(f, "{base} + {offset}")
                }
            }
            Level::Max(l1, l2) => write!(f, "max({l1}, {l2})"),
            Level::IMax(l1, l2) => write!(f, "imax({l1}, {l2})"),
            Level::Param(name) => write!(f, "{name}"),
            Level::Meta(name) => write!(f, "?{name}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_zero() {
        assert!(Level::zero().is_zero());
        assert!(!Level::one().is_zero());
        assert!(Level::imax(Level::param(Name::simple("u")), Level::zero()).is_zero());
        assert!(!Level::meta(Name::simple("m")).is_zero());
    }

    #[test]
    fn test_max_simplification() {
        let u = Level::param(Name::simple("u"));
        assert_eq!(Level::max(u.clone(), u.clone()), u);
        assert_eq!(Level::max(Level::zero(), u.clone()), u);
        assert_eq!(Level::max(u.clone(), Level::zero()), u);
    }

    #[test]
    fn test_imax_simplification() {
        let u = Level::param(Name::simple("u"));
        assert!(Level::imax(u.clone(), Level::zero()).is_zero());
        // imax(u, succ(0)) reduces to max(u, 1)
        let i = Level::imax(u.clone(), Level::one());
        assert!(matches!(i, Level::Max(_, _)));
    }

    #[test]
    fn test_normalize_imax_of_meta_is_kept() {
        // imax over a meta cannot be resolved until the meta is assigned
        let m = Level::meta(Name::simple("m"));
        let u = Level::param(Name::simple("u"));
        let l = Level::IMax(Arc::new(u), Arc::new(m));
        assert!(matches!(l.normalize(), Level::IMax(_, _)));
    }

    #[test]
    fn test_offsets() {
        let u = Level::param(Name::simple("u"));
        let l = u.add_offset(3);
        let (base, off) = l.get_offset();
        assert_eq!(base, &u);
        assert_eq!(off, 3);
    }

    #[test]
    fn test_occurs_meta() {
        let m = Name::simple("m");
        let l = Level::succ(Level::max(
            Level::meta(m.clone()),
            Level::param(Name::simple("u")),
        ));
        assert!(l.occurs_meta(&m));
        assert!(!l.occurs_meta(&Name::simple("other")));
        assert!(l.has_meta());
    }

    #[test]
    fn test_display() {
        let u = Level::param(Name::simple("u"));
        assert_eq!(Level::one().to_string(), "1");
        assert_eq!(u.add_offset(2).to_string(), "u + 2");
        assert_eq!(Level::meta(Name::simple("m")).to_string(), "?m");
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        fn arb_level() -> impl Strategy<Value = Level> {
            let leaf = prop_oneof![
                Just(Level::zero()),
                Just(Level::param(Name::simple("u"))),
                Just(Level::param(Name::simple("v"))),
                Just(Level::meta(Name::simple("m"))),
            ];
            leaf.prop_recursive(3, 16, 2, |inner| {
                prop_oneof![
                    inner.clone().prop_map(Level::succ),
                    (inner.clone(), inner.clone()).prop_map(|(a, b)| Level::max(a, b)),
                    (inner.clone(), inner).prop_map(|(a, b)| Level::imax(a, b)),
                ]
            })
        }

        proptest! {
            #[test]
            fn normalize_is_idempotent(l in arb_level()) {
                let n = l.normalize();
                prop_assert_eq!(n.normalize(), n);
            }

            #[test]
            fn normalize_preserves_metas(l in arb_level()) {
                // normalization never invents a metavariable; it may drop
                // one (imax collapsing), never the other way around
                if !l.has_meta() {
                    prop_assert!(!l.normalize().has_meta());
                }
            }
        }
    }
}
