//! `Constant<T>`: the simplest nontrivial abstract value, used throughout
//! the kernel's own tests and as the textbook example of the scaffolding.
//! Bottom means unreachable, Top means "more than one concrete value seen",
//! and a `Value` payload is a single concrete `T`.

use crate::error::DomainKind;
use crate::lattice::AbstractValue;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Constant<T: Clone + Eq + std::fmt::Debug>(T);

impl<T: Clone + Eq + std::fmt::Debug> Constant<T> {
    pub fn new(value: T) -> Self {
        Constant(value)
    }

    pub fn get(&self) -> &T {
        &self.0
    }
}

impl<T: Clone + Eq + std::fmt::Debug> AbstractValue for Constant<T> {
    fn kind(&self) -> DomainKind {
        DomainKind::Value
    }

    fn leq(&self, other: &Self) -> bool {
        self.0 == other.0
    }

    fn join_with(&mut self, other: &Self) -> DomainKind {
        if self.0 == other.0 {
            DomainKind::Value
        } else {
            DomainKind::Top
        }
    }

    fn meet_with(&mut self, other: &Self) -> DomainKind {
        if self.0 == other.0 {
            DomainKind::Value
        } else {
            DomainKind::Bottom
        }
    }
}
