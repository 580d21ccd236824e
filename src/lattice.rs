//! Lattice primitives (C1): the `AbstractDomain`/`AbstractValue` traits, the
//! scaffolding combinator that lifts a payload to a full domain, and the
//! reversal combinator.
//!
//! Where the original C++ kernel uses CRTP (`AbstractDomain<Derived>`) to get
//! a statically polymorphic interface, this is a plain trait: every
//! concrete domain in `crate::domains` implements it directly.

use crate::error::{DomainKind, InvalidAbstractValue};

/// A partially ordered set with extremal elements and the four standard
/// lattice operators, plus their in-place (`_with`) forms.
///
/// Invariant that every implementor must uphold: `a.leq(b) && b.leq(a)` iff
/// `a.equals(b)`. `widen_with` must be extensive enough to guarantee
/// termination over chains of joined values; `narrow_with` must be
/// reductive with respect to meet.
pub trait AbstractDomain: Clone + std::fmt::Debug {
    fn bottom() -> Self;
    fn top() -> Self;

    fn is_bottom(&self) -> bool;
    fn is_top(&self) -> bool;

    fn leq(&self, other: &Self) -> bool;

    /// Semantically `self.leq(other) && other.leq(self)`. Override when a
    /// cheaper structural check is available (e.g. reference equality of
    /// shared Patricia-tree roots).
    fn equals(&self, other: &Self) -> bool {
        self.leq(other) && other.leq(self)
    }

    fn set_to_bottom(&mut self);
    fn set_to_top(&mut self);

    fn join_with(&mut self, other: &Self);
    fn meet_with(&mut self, other: &Self);

    /// Default widening is the join; override for domains with infinite
    /// ascending chains (e.g. `IntervalDomain`).
    fn widen_with(&mut self, other: &Self) {
        self.join_with(other);
    }

    /// Default narrowing is the meet; override for domains with infinite
    /// descending chains.
    fn narrow_with(&mut self, other: &Self) {
        self.meet_with(other);
    }

    fn join(&self, other: &Self) -> Self {
        let mut result = self.clone();
        result.join_with(other);
        result
    }

    fn meet(&self, other: &Self) -> Self {
        let mut result = self.clone();
        result.meet_with(other);
        result
    }

    fn widen(&self, other: &Self) -> Self {
        let mut result = self.clone();
        result.widen_with(other);
        result
    }

    fn narrow(&self, other: &Self) -> Self {
        let mut result = self.clone();
        result.narrow_with(other);
        result
    }
}

/// The payload of a scaffolded domain. Unlike `AbstractDomain`, a value does
/// not carry bottom/top directly — `kind()` reports what the scaffolding
/// should become after an in-place mutation, and `join_with`/`meet_with`
/// return the tag the result should adopt (they may collapse to
/// `Bottom`/`Top` themselves, e.g. a reduced product smashing to bottom).
pub trait AbstractValue: Clone + PartialEq + std::fmt::Debug {
    /// The scaffolding kind this value currently represents. A payload whose
    /// `kind()` is `Bottom`/`Top` is immediately discarded by
    /// `AbstractDomainScaffolding::normalize`.
    fn kind(&self) -> DomainKind;

    fn leq(&self, other: &Self) -> bool;

    /// Join in place, returning the resulting kind (usually `Value`, but a
    /// payload may detect it has become vacuous and report `Bottom`/`Top`).
    fn join_with(&mut self, other: &Self) -> DomainKind;

    /// Meet in place, returning the resulting kind.
    fn meet_with(&mut self, other: &Self) -> DomainKind;
}

/// Lifts an `AbstractValue` payload `V` into a full `AbstractDomain` by
/// attaching the tri-state tag and centralizing the bottom/top dispatch.
///
/// This is composition, not inheritance: the scaffolding owns an
/// `Option<V>` rather than deriving from a payload base class.
#[derive(Clone, Debug)]
pub struct AbstractDomainScaffolding<V: AbstractValue> {
    kind: DomainKind,
    value: Option<V>,
}

impl<V: AbstractValue> AbstractDomainScaffolding<V> {
    pub fn from_value(value: V) -> Self {
        let mut scaffolding = AbstractDomainScaffolding {
            kind: value.kind(),
            value: Some(value),
        };
        scaffolding.normalize();
        scaffolding
    }

    /// Re-derives `kind` from the payload's declared kind and discards the
    /// payload when the result is extremal. Call after any in-place mutation
    /// of the payload performed outside of `join_with`/`meet_with`.
    pub fn normalize(&mut self) {
        if let Some(value) = &self.value {
            self.kind = value.kind();
        }
        if !matches!(self.kind, DomainKind::Value) {
            self.value = None;
        }
    }

    pub fn kind(&self) -> DomainKind {
        self.kind
    }

    /// Returns the payload, or an `InvalidAbstractValue` error if the
    /// scaffolding is currently extremal.
    pub fn get(&self) -> Result<&V, InvalidAbstractValue> {
        self.value.as_ref().ok_or_else(|| {
            InvalidAbstractValue::new(DomainKind::Value, self.kind, "get", "self")
        })
    }

    pub fn get_mut(&mut self) -> Result<&mut V, InvalidAbstractValue> {
        let kind = self.kind;
        self.value.as_mut().ok_or_else(|| {
            InvalidAbstractValue::new(DomainKind::Value, kind, "get_mut", "self")
        })
    }
}

impl<V: AbstractValue> PartialEq for AbstractDomainScaffolding<V> {
    fn eq(&self, other: &Self) -> bool {
        self.kind == other.kind && self.value == other.value
    }
}

impl<V: AbstractValue> AbstractDomain for AbstractDomainScaffolding<V> {
    fn bottom() -> Self {
        AbstractDomainScaffolding {
            kind: DomainKind::Bottom,
            value: None,
        }
    }

    fn top() -> Self {
        AbstractDomainScaffolding {
            kind: DomainKind::Top,
            value: None,
        }
    }

    fn is_bottom(&self) -> bool {
        self.kind == DomainKind::Bottom
    }

    fn is_top(&self) -> bool {
        self.kind == DomainKind::Top
    }

    fn leq(&self, other: &Self) -> bool {
        match (self.kind, other.kind) {
            (DomainKind::Bottom, _) => true,
            (_, DomainKind::Top) => true,
            (DomainKind::Top, _) => false,
            (_, DomainKind::Bottom) => false,
            (DomainKind::Value, DomainKind::Value) => {
                self.value.as_ref().unwrap().leq(other.value.as_ref().unwrap())
            }
        }
    }

    fn set_to_bottom(&mut self) {
        self.kind = DomainKind::Bottom;
        self.value = None;
    }

    fn set_to_top(&mut self) {
        self.kind = DomainKind::Top;
        self.value = None;
    }

    fn join_with(&mut self, other: &Self) {
        match (self.kind, other.kind) {
            (DomainKind::Top, _) | (_, DomainKind::Bottom) => {}
            (DomainKind::Bottom, _) => *self = other.clone(),
            (_, DomainKind::Top) => self.set_to_top(),
            (DomainKind::Value, DomainKind::Value) => {
                let tag = self
                    .value
                    .as_mut()
                    .unwrap()
                    .join_with(other.value.as_ref().unwrap());
                self.kind = tag;
                self.normalize();
            }
        }
    }

    fn meet_with(&mut self, other: &Self) {
        match (self.kind, other.kind) {
            (DomainKind::Bottom, _) | (_, DomainKind::Top) => {}
            (DomainKind::Top, _) => *self = other.clone(),
            (_, DomainKind::Bottom) => self.set_to_bottom(),
            (DomainKind::Value, DomainKind::Value) => {
                let tag = self
                    .value
                    .as_mut()
                    .unwrap()
                    .meet_with(other.value.as_ref().unwrap());
                self.kind = tag;
                self.normalize();
            }
        }
    }
}

/// Given a finite domain `D` where widening coincides with joining, yields
/// the domain with the same carrier but the order flipped and ⊥/⊤ swapped.
/// Not sound to use over domains with infinite chains, since `widen_with`
/// here is implemented as the (now order-reversed) join.
#[derive(Clone, Debug, PartialEq)]
pub struct Reversed<D: AbstractDomain>(pub D);

impl<D: AbstractDomain> Reversed<D> {
    pub fn into_inner(self) -> D {
        self.0
    }

    pub fn inner(&self) -> &D {
        &self.0
    }
}

impl<D: AbstractDomain> AbstractDomain for Reversed<D> {
    fn bottom() -> Self {
        Reversed(D::top())
    }

    fn top() -> Self {
        Reversed(D::bottom())
    }

    fn is_bottom(&self) -> bool {
        self.0.is_top()
    }

    fn is_top(&self) -> bool {
        self.0.is_bottom()
    }

    fn leq(&self, other: &Self) -> bool {
        other.0.leq(&self.0)
    }

    fn equals(&self, other: &Self) -> bool {
        self.0.equals(&other.0)
    }

    fn set_to_bottom(&mut self) {
        self.0.set_to_top();
    }

    fn set_to_top(&mut self) {
        self.0.set_to_bottom();
    }

    fn join_with(&mut self, other: &Self) {
        self.0.meet_with(&other.0);
    }

    fn meet_with(&mut self, other: &Self) {
        self.0.join_with(&other.0);
    }

    fn widen_with(&mut self, other: &Self) {
        // Valid only because the reversal combinator is restricted to
        // finite domains where widen degenerates to join.
        self.join_with(other);
    }

    fn narrow_with(&mut self, other: &Self) {
        self.meet_with(other);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domains::constant::Constant;

    #[test]
    fn reversed_flips_extremes() {
        type D = AbstractDomainScaffolding<Constant<i32>>;
        assert!(Reversed::<D>::bottom().0.is_top());
        assert!(Reversed::<D>::top().0.is_bottom());
    }

    #[test]
    fn reversed_flips_order() {
        type D = AbstractDomainScaffolding<Constant<i32>>;
        let a = Reversed(D::from_value(Constant::new(1)));
        let top = Reversed::<D>::top();
        // top of the reversed domain is bottom of D, which is leq everything.
        assert!(top.leq(&a));
        assert!(!a.leq(&top) || a.equals(&top));
    }
}
