//! Domain constructors (C3): concrete abstract domains and combinators built
//! on top of the [`crate::lattice`] primitives.
//!
//! Every domain here is either a direct `AbstractDomain` impl (when its
//! extremal elements don't fit the Bottom/Value/Top scaffolding shape, e.g.
//! [`interval::IntervalDomain`], whose bottom is a specific empty interval
//! rather than an erased payload) or an [`crate::lattice::AbstractValue`]
//! wrapped in [`crate::lattice::AbstractDomainScaffolding`].

pub mod constant;
pub mod disjoint_union;
pub mod environment;
pub mod finite;
pub mod hashed_set;
pub mod interval;
pub mod over_under;
pub mod partition;
pub mod powerset;
pub mod reduced_product;

/// Property-based checks of the universal lattice laws every constructed
/// domain must obey (idempotence, commutativity, associativity, absorption,
/// extremal behavior, order consistency, widen monotonicity-and-covering),
/// run with `proptest`-generated instances of a handful of representative
/// domains rather than hand-picked examples.
#[cfg(test)]
mod law_tests {
    use crate::domains::constant::Constant;
    use crate::domains::hashed_set::HashedSetValue;
    use crate::domains::interval::IntervalDomain;
    use crate::lattice::{AbstractDomain, AbstractDomainScaffolding};
    use proptest::prelude::*;

    /// The universal lattice properties, checked for any domain. `equals`
    /// rather than `==`/`PartialEq` is used throughout since that is the
    /// operation the invariant is actually stated in terms of.
    fn check_universal_laws<D: AbstractDomain>(a: D, b: D, c: D) -> Result<(), TestCaseError> {
        // Idempotence.
        prop_assert!(a.join(&a).equals(&a), "join idempotence");
        prop_assert!(a.meet(&a).equals(&a), "meet idempotence");

        // Commutativity.
        prop_assert!(a.join(&b).equals(&b.join(&a)), "join commutativity");
        prop_assert!(a.meet(&b).equals(&b.meet(&a)), "meet commutativity");

        // Associativity.
        prop_assert!(
            a.join(&b).join(&c).equals(&a.join(&b.join(&c))),
            "join associativity"
        );
        prop_assert!(
            a.meet(&b).meet(&c).equals(&a.meet(&b.meet(&c))),
            "meet associativity"
        );

        // Absorption.
        prop_assert!(a.join(&a.meet(&b)).equals(&a), "join/meet absorption");
        prop_assert!(a.meet(&a.join(&b)).equals(&a), "meet/join absorption");

        // Extremal behavior.
        prop_assert!(a.join(&D::bottom()).equals(&a), "join with bottom is identity");
        prop_assert!(a.meet(&D::top()).equals(&a), "meet with top is identity");
        prop_assert!(a.join(&D::top()).equals(&D::top()), "join with top is top");
        prop_assert!(a.meet(&D::bottom()).equals(&D::bottom()), "meet with bottom is bottom");

        // Order consistency.
        let leq = a.leq(&b);
        prop_assert_eq!(leq, a.join(&b).equals(&b), "leq iff join reaches b");
        prop_assert_eq!(leq, a.meet(&b).equals(&a), "leq iff meet stays at a");

        // Widen monotonicity-and-covering.
        let widened = a.widen(&b);
        prop_assert!(a.leq(&widened), "a leq a.widen(b)");
        prop_assert!(b.leq(&widened), "b leq a.widen(b)");
        Ok(())
    }

    fn const_scaffold() -> impl Strategy<Value = AbstractDomainScaffolding<Constant<i32>>> {
        prop_oneof![
            Just(AbstractDomainScaffolding::bottom()),
            Just(AbstractDomainScaffolding::top()),
            (-4i32..4).prop_map(|v| AbstractDomainScaffolding::from_value(Constant::new(v))),
        ]
    }

    fn interval() -> impl Strategy<Value = IntervalDomain> {
        prop_oneof![
            Just(IntervalDomain::bottom()),
            Just(IntervalDomain::top()),
            (-20i64..20, -20i64..20).prop_map(|(x, y)| {
                let (lb, ub) = if x <= y { (x, y) } else { (y, x) };
                IntervalDomain::finite(lb, ub)
            }),
        ]
    }

    fn hashed_set() -> impl Strategy<Value = AbstractDomainScaffolding<HashedSetValue<u8>>> {
        prop_oneof![
            Just(AbstractDomainScaffolding::bottom()),
            proptest::collection::hash_set(0u8..8, 0..8).prop_map(|set| {
                let mut value = HashedSetValue::default();
                for e in set {
                    value.add(e);
                }
                AbstractDomainScaffolding::from_value(value)
            }),
        ]
    }

    proptest! {
        #[test]
        fn constant_domain_obeys_lattice_laws(a in const_scaffold(), b in const_scaffold(), c in const_scaffold()) {
            check_universal_laws(a, b, c)?;
        }

        #[test]
        fn interval_domain_obeys_lattice_laws(a in interval(), b in interval(), c in interval()) {
            check_universal_laws(a, b, c)?;
        }

        #[test]
        fn hashed_set_domain_obeys_lattice_laws(a in hashed_set(), b in hashed_set(), c in hashed_set()) {
            check_universal_laws(a, b, c)?;
        }
    }
}
