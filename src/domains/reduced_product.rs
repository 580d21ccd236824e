//! `ReducedProduct2`/`ReducedProduct3`: the reduced cartesian product of two
//! or three abstract domains.
//!
//! A tuple with any bottom component is itself bottom. Beyond that, the
//! intersection of the components' denotations can still be empty even when
//! none of them is individually bottom — deciding that, and refining the
//! other components accordingly, is the reduction operation (the sigma of
//! Cousot & Cousot). The original kernel expresses the reduction as a
//! CRTP-derived static method; here it's a type parameter implementing
//! [`Reduction`], since Rust has no "derived class supplies a static
//! method" pattern. A product with nothing to refine uses [`NoReduction`].

use std::marker::PhantomData;

use crate::lattice::AbstractDomain;

/// Refines a tuple of domain values in place after every mutation.
/// Implementors must be monotonic: reduction must never increase any
/// component under `leq`.
pub trait Reduction<P>: Clone + std::fmt::Debug {
    fn reduce(product: &mut P);
}

/// The reduction that does nothing, for products whose components never
/// refine each other.
#[derive(Clone, Debug, Default)]
pub struct NoReduction;

impl<P> Reduction<P> for NoReduction {
    fn reduce(_product: &mut P) {}
}

#[derive(Clone, Debug)]
pub struct ReducedProduct2<D0: AbstractDomain, D1: AbstractDomain, R: Reduction<(D0, D1)>> {
    product: (D0, D1),
    _reduction: PhantomData<R>,
}

impl<D0: AbstractDomain, D1: AbstractDomain, R: Reduction<(D0, D1)>> ReducedProduct2<D0, D1, R> {
    pub fn new(d0: D0, d1: D1) -> Self {
        let mut result = ReducedProduct2 {
            product: (d0, d1),
            _reduction: PhantomData,
        };
        result.normalize();
        if !result.is_bottom() {
            result.reduce();
        }
        result
    }

    pub fn reduce(&mut self) {
        R::reduce(&mut self.product);
        self.normalize();
    }

    fn normalize(&mut self) {
        if self.any_component_is_bottom() {
            self.set_to_bottom();
        }
    }

    fn any_component_is_bottom(&self) -> bool {
        self.product.0.is_bottom() || self.product.1.is_bottom()
    }

    pub fn first(&self) -> &D0 {
        &self.product.0
    }

    pub fn first_mut(&mut self) -> &mut D0 {
        &mut self.product.0
    }

    pub fn second(&self) -> &D1 {
        &self.product.1
    }

    pub fn second_mut(&mut self) -> &mut D1 {
        &mut self.product.1
    }
}

impl<D0: AbstractDomain, D1: AbstractDomain, R: Reduction<(D0, D1)>> PartialEq
    for ReducedProduct2<D0, D1, R>
{
    fn eq(&self, other: &Self) -> bool {
        self.equals(other)
    }
}

impl<D0: AbstractDomain, D1: AbstractDomain, R: Reduction<(D0, D1)>> AbstractDomain
    for ReducedProduct2<D0, D1, R>
{
    fn bottom() -> Self {
        ReducedProduct2 {
            product: (D0::bottom(), D1::bottom()),
            _reduction: PhantomData,
        }
    }

    fn top() -> Self {
        ReducedProduct2 {
            product: (D0::top(), D1::top()),
            _reduction: PhantomData,
        }
    }

    fn is_bottom(&self) -> bool {
        self.any_component_is_bottom()
    }

    fn is_top(&self) -> bool {
        self.product.0.is_top() && self.product.1.is_top()
    }

    fn leq(&self, other: &Self) -> bool {
        if self.is_bottom() {
            return true;
        }
        if other.is_bottom() {
            return false;
        }
        self.product.0.leq(&other.product.0) && self.product.1.leq(&other.product.1)
    }

    fn equals(&self, other: &Self) -> bool {
        match (self.is_bottom(), other.is_bottom()) {
            (true, true) => true,
            (true, false) | (false, true) => false,
            (false, false) => {
                self.product.0.equals(&other.product.0) && self.product.1.equals(&other.product.1)
            }
        }
    }

    fn set_to_bottom(&mut self) {
        self.product.0.set_to_bottom();
        self.product.1.set_to_bottom();
    }

    fn set_to_top(&mut self) {
        self.product.0.set_to_top();
        self.product.1.set_to_top();
    }

    fn join_with(&mut self, other: &Self) {
        self.product.0.join_with(&other.product.0);
        self.product.1.join_with(&other.product.1);
        self.reduce();
    }

    fn meet_with(&mut self, other: &Self) {
        self.product.0.meet_with(&other.product.0);
        self.product.1.meet_with(&other.product.1);
        self.reduce();
    }

    fn widen_with(&mut self, other: &Self) {
        self.product.0.widen_with(&other.product.0);
        self.product.1.widen_with(&other.product.1);
        self.reduce();
    }

    fn narrow_with(&mut self, other: &Self) {
        self.product.0.narrow_with(&other.product.0);
        self.product.1.narrow_with(&other.product.1);
        self.reduce();
    }
}

#[derive(Clone, Debug)]
pub struct ReducedProduct3<
    D0: AbstractDomain,
    D1: AbstractDomain,
    D2: AbstractDomain,
    R: Reduction<(D0, D1, D2)>,
> {
    product: (D0, D1, D2),
    _reduction: PhantomData<R>,
}

impl<D0: AbstractDomain, D1: AbstractDomain, D2: AbstractDomain, R: Reduction<(D0, D1, D2)>>
    ReducedProduct3<D0, D1, D2, R>
{
    pub fn new(d0: D0, d1: D1, d2: D2) -> Self {
        let mut result = ReducedProduct3 {
            product: (d0, d1, d2),
            _reduction: PhantomData,
        };
        result.normalize();
        if !result.is_bottom() {
            result.reduce();
        }
        result
    }

    pub fn reduce(&mut self) {
        R::reduce(&mut self.product);
        self.normalize();
    }

    fn normalize(&mut self) {
        if self.any_component_is_bottom() {
            self.set_to_bottom();
        }
    }

    fn any_component_is_bottom(&self) -> bool {
        self.product.0.is_bottom() || self.product.1.is_bottom() || self.product.2.is_bottom()
    }

    pub fn first(&self) -> &D0 {
        &self.product.0
    }

    pub fn first_mut(&mut self) -> &mut D0 {
        &mut self.product.0
    }

    pub fn second(&self) -> &D1 {
        &self.product.1
    }

    pub fn second_mut(&mut self) -> &mut D1 {
        &mut self.product.1
    }

    pub fn third(&self) -> &D2 {
        &self.product.2
    }

    pub fn third_mut(&mut self) -> &mut D2 {
        &mut self.product.2
    }
}

impl<D0: AbstractDomain, D1: AbstractDomain, D2: AbstractDomain, R: Reduction<(D0, D1, D2)>>
    PartialEq for ReducedProduct3<D0, D1, D2, R>
{
    fn eq(&self, other: &Self) -> bool {
        self.equals(other)
    }
}

impl<D0: AbstractDomain, D1: AbstractDomain, D2: AbstractDomain, R: Reduction<(D0, D1, D2)>>
    AbstractDomain for ReducedProduct3<D0, D1, D2, R>
{
    fn bottom() -> Self {
        ReducedProduct3 {
            product: (D0::bottom(), D1::bottom(), D2::bottom()),
            _reduction: PhantomData,
        }
    }

    fn top() -> Self {
        ReducedProduct3 {
            product: (D0::top(), D1::top(), D2::top()),
            _reduction: PhantomData,
        }
    }

    fn is_bottom(&self) -> bool {
        self.any_component_is_bottom()
    }

    fn is_top(&self) -> bool {
        self.product.0.is_top() && self.product.1.is_top() && self.product.2.is_top()
    }

    fn leq(&self, other: &Self) -> bool {
        if self.is_bottom() {
            return true;
        }
        if other.is_bottom() {
            return false;
        }
        self.product.0.leq(&other.product.0)
            && self.product.1.leq(&other.product.1)
            && self.product.2.leq(&other.product.2)
    }

    fn equals(&self, other: &Self) -> bool {
        match (self.is_bottom(), other.is_bottom()) {
            (true, true) => true,
            (true, false) | (false, true) => false,
            (false, false) => {
                self.product.0.equals(&other.product.0)
                    && self.product.1.equals(&other.product.1)
                    && self.product.2.equals(&other.product.2)
            }
        }
    }

    fn set_to_bottom(&mut self) {
        self.product.0.set_to_bottom();
        self.product.1.set_to_bottom();
        self.product.2.set_to_bottom();
    }

    fn set_to_top(&mut self) {
        self.product.0.set_to_top();
        self.product.1.set_to_top();
        self.product.2.set_to_top();
    }

    fn join_with(&mut self, other: &Self) {
        self.product.0.join_with(&other.product.0);
        self.product.1.join_with(&other.product.1);
        self.product.2.join_with(&other.product.2);
        self.reduce();
    }

    fn meet_with(&mut self, other: &Self) {
        self.product.0.meet_with(&other.product.0);
        self.product.1.meet_with(&other.product.1);
        self.product.2.meet_with(&other.product.2);
        self.reduce();
    }

    fn widen_with(&mut self, other: &Self) {
        self.product.0.widen_with(&other.product.0);
        self.product.1.widen_with(&other.product.1);
        self.product.2.widen_with(&other.product.2);
        self.reduce();
    }

    fn narrow_with(&mut self, other: &Self) {
        self.product.0.narrow_with(&other.product.0);
        self.product.1.narrow_with(&other.product.1);
        self.product.2.narrow_with(&other.product.2);
        self.reduce();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domains::constant::Constant;
    use crate::lattice::AbstractDomainScaffolding;

    type ConstD = AbstractDomainScaffolding<Constant<i32>>;
    type Product = ReducedProduct2<ConstD, ConstD, NoReduction>;

    #[test]
    fn bottom_in_either_component_is_bottom_overall() {
        let p = Product::new(ConstD::bottom(), ConstD::from_value(Constant::new(1)));
        assert!(p.is_bottom());
    }

    #[test]
    fn join_is_componentwise() {
        let a = Product::new(
            ConstD::from_value(Constant::new(1)),
            ConstD::from_value(Constant::new(2)),
        );
        let b = Product::new(
            ConstD::from_value(Constant::new(1)),
            ConstD::from_value(Constant::new(3)),
        );
        let j = a.join(&b);
        assert_eq!(j.first().get().unwrap().get(), &1);
        assert!(j.second().is_top());
    }
}
