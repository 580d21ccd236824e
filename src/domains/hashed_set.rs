//! `HashedSetAbstractDomain<Element>`: a powerset domain backed by a plain
//! hash set. The empty set and Bottom are distinct values — the empty set
//! means "this program point can be reached with no elements flowing to
//! it yet," Bottom means "this program point is unreachable."
//!
//! Top stands in for the (usually infinite) universe of all elements and is
//! never materialized as an explicit set.

use std::collections::HashSet;
use std::hash::Hash;

use crate::error::DomainKind;
use crate::lattice::AbstractValue;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HashedSetValue<E: Eq + Hash + Clone + std::fmt::Debug>(HashSet<E>);

impl<E: Eq + Hash + Clone + std::fmt::Debug> Default for HashedSetValue<E> {
    fn default() -> Self {
        HashedSetValue(HashSet::new())
    }
}

impl<E: Eq + Hash + Clone + std::fmt::Debug> HashedSetValue<E> {
    pub fn singleton(e: E) -> Self {
        let mut set = HashSet::new();
        set.insert(e);
        HashedSetValue(set)
    }

    pub fn elements(&self) -> impl Iterator<Item = &E> {
        self.0.iter()
    }

    pub fn size(&self) -> usize {
        self.0.len()
    }

    pub fn contains(&self, e: &E) -> bool {
        self.0.contains(e)
    }

    pub fn add(&mut self, e: E) {
        self.0.insert(e);
    }

    pub fn remove(&mut self, e: &E) {
        self.0.remove(e);
    }
}

impl<E: Eq + Hash + Clone + std::fmt::Debug> AbstractValue for HashedSetValue<E> {
    fn kind(&self) -> DomainKind {
        DomainKind::Value
    }

    fn leq(&self, other: &Self) -> bool {
        self.0.is_subset(&other.0)
    }

    fn join_with(&mut self, other: &Self) -> DomainKind {
        self.0.extend(other.0.iter().cloned());
        DomainKind::Value
    }

    fn meet_with(&mut self, other: &Self) -> DomainKind {
        self.0.retain(|e| other.0.contains(e));
        DomainKind::Value
    }
}
