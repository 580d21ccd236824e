//! `DisjointUnion2`/`DisjointUnion3`: the cardinal sum of two or three
//! abstract domains, for analyses whose components have disjoint
//! denotations (e.g. distinct variants of a tagged union of domains). The
//! join/meet of values from *different* variants collapses to Top/Bottom;
//! only same-variant values combine componentwise.

use crate::lattice::AbstractDomain;

#[derive(Clone, Debug)]
pub enum DisjointUnion2<D0: AbstractDomain, D1: AbstractDomain> {
    First(D0),
    Second(D1),
}

impl<D0: AbstractDomain, D1: AbstractDomain> DisjointUnion2<D0, D1> {
    pub fn first(value: D0) -> Self {
        DisjointUnion2::First(value)
    }

    pub fn second(value: D1) -> Self {
        DisjointUnion2::Second(value)
    }

    pub fn as_first(&self) -> Option<&D0> {
        match self {
            DisjointUnion2::First(d) => Some(d),
            DisjointUnion2::Second(_) => None,
        }
    }

    pub fn as_second(&self) -> Option<&D1> {
        match self {
            DisjointUnion2::Second(d) => Some(d),
            DisjointUnion2::First(_) => None,
        }
    }
}

impl<D0: AbstractDomain, D1: AbstractDomain> PartialEq for DisjointUnion2<D0, D1> {
    fn eq(&self, other: &Self) -> bool {
        self.equals(other)
    }
}

impl<D0: AbstractDomain, D1: AbstractDomain> AbstractDomain for DisjointUnion2<D0, D1> {
    fn bottom() -> Self {
        DisjointUnion2::First(D0::bottom())
    }

    fn top() -> Self {
        DisjointUnion2::First(D0::top())
    }

    fn is_bottom(&self) -> bool {
        match self {
            DisjointUnion2::First(d) => d.is_bottom(),
            DisjointUnion2::Second(d) => d.is_bottom(),
        }
    }

    fn is_top(&self) -> bool {
        match self {
            DisjointUnion2::First(d) => d.is_top(),
            DisjointUnion2::Second(d) => d.is_top(),
        }
    }

    fn leq(&self, other: &Self) -> bool {
        match (self, other) {
            (DisjointUnion2::First(a), DisjointUnion2::First(b)) => a.leq(b),
            (DisjointUnion2::Second(a), DisjointUnion2::Second(b)) => a.leq(b),
            (a, b) => a.is_bottom() || b.is_top(),
        }
    }

    fn equals(&self, other: &Self) -> bool {
        match (self, other) {
            (DisjointUnion2::First(a), DisjointUnion2::First(b)) => a.equals(b),
            (DisjointUnion2::Second(a), DisjointUnion2::Second(b)) => a.equals(b),
            (a, b) => (a.is_bottom() && b.is_bottom()) || (a.is_top() && b.is_top()),
        }
    }

    fn set_to_bottom(&mut self) {
        match self {
            DisjointUnion2::First(d) => d.set_to_bottom(),
            DisjointUnion2::Second(d) => d.set_to_bottom(),
        }
    }

    fn set_to_top(&mut self) {
        match self {
            DisjointUnion2::First(d) => d.set_to_top(),
            DisjointUnion2::Second(d) => d.set_to_top(),
        }
    }

    /// Joining across variants coalesces to Top (the two component Tops are
    /// treated as the same extremal element, per the cardinal-sum
    /// construction).
    fn join_with(&mut self, other: &Self) {
        match (&mut *self, other) {
            (DisjointUnion2::First(a), DisjointUnion2::First(b)) => a.join_with(b),
            (DisjointUnion2::Second(a), DisjointUnion2::Second(b)) => a.join_with(b),
            (a, b) => {
                if b.is_bottom() {
                    // no-op
                } else if a.is_bottom() {
                    *a = b.clone();
                } else {
                    a.set_to_top();
                }
            }
        }
    }

    fn meet_with(&mut self, other: &Self) {
        match (&mut *self, other) {
            (DisjointUnion2::First(a), DisjointUnion2::First(b)) => a.meet_with(b),
            (DisjointUnion2::Second(a), DisjointUnion2::Second(b)) => a.meet_with(b),
            (a, b) => {
                if b.is_top() {
                    // no-op
                } else if a.is_top() {
                    *a = b.clone();
                } else {
                    a.set_to_bottom();
                }
            }
        }
    }

    fn widen_with(&mut self, other: &Self) {
        match (&mut *self, other) {
            (DisjointUnion2::First(a), DisjointUnion2::First(b)) => a.widen_with(b),
            (DisjointUnion2::Second(a), DisjointUnion2::Second(b)) => a.widen_with(b),
            _ => self.join_with(other),
        }
    }

    fn narrow_with(&mut self, other: &Self) {
        match (&mut *self, other) {
            (DisjointUnion2::First(a), DisjointUnion2::First(b)) => a.narrow_with(b),
            (DisjointUnion2::Second(a), DisjointUnion2::Second(b)) => a.narrow_with(b),
            _ => self.meet_with(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domains::constant::Constant;
    use crate::lattice::AbstractDomainScaffolding;

    type ConstD = AbstractDomainScaffolding<Constant<i32>>;
    type U = DisjointUnion2<ConstD, ConstD>;

    #[test]
    fn join_across_variants_is_top() {
        let a = U::First(ConstD::from_value(Constant::new(1)));
        let b = U::Second(ConstD::from_value(Constant::new(2)));
        assert!(a.join(&b).is_top());
    }

    #[test]
    fn join_within_variant_is_componentwise() {
        let a = U::First(ConstD::from_value(Constant::new(1)));
        let b = U::First(ConstD::from_value(Constant::new(1)));
        let j = a.join(&b);
        assert_eq!(j.as_first().unwrap().get().unwrap().get(), &1);
    }
}
