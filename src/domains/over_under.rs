//! `PatriciaTreeOverUnderSetAbstractDomain<K>`: a powerset domain that tracks
//! both an over-approximation and an under-approximation of a set
//! simultaneously, backed by [`PatriciaTreeSet`]. Useful when an analysis
//! needs both "the elements that may be present" and "the elements that are
//! definitely present" (e.g. may-alias vs must-alias sets).
//!
//! Invariant: `under ⊆ over`. A value that violates it collapses to Bottom.

use crate::error::DomainKind;
use crate::lattice::AbstractValue;
use crate::patricia::set::PatriciaTreeSet;
use crate::patricia::PatriciaKey;

#[derive(Clone, Debug, PartialEq)]
pub struct OverUnderSetValue<K: PatriciaKey> {
    over: PatriciaTreeSet<K>,
    under: PatriciaTreeSet<K>,
}

impl<K: PatriciaKey> Default for OverUnderSetValue<K> {
    fn default() -> Self {
        OverUnderSetValue {
            over: PatriciaTreeSet::new(),
            under: PatriciaTreeSet::new(),
        }
    }
}

impl<K: PatriciaKey> OverUnderSetValue<K> {
    /// Both approximations start out equal to `set`.
    pub fn exact(set: PatriciaTreeSet<K>) -> Self {
        OverUnderSetValue {
            over: set.clone(),
            under: set,
        }
    }

    pub fn new(over: PatriciaTreeSet<K>, under: PatriciaTreeSet<K>) -> Self {
        OverUnderSetValue {
            over: over.union(&under),
            under,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.over.size() == 0
    }

    pub fn over(&self) -> &PatriciaTreeSet<K> {
        &self.over
    }

    pub fn under(&self) -> &PatriciaTreeSet<K> {
        &self.under
    }

    pub fn add_over(&mut self, k: K) {
        self.over = self.over.insert(k);
    }

    pub fn add_under(&mut self, k: K) {
        self.over = self.over.insert(k.clone());
        self.under = self.under.insert(k);
    }

    pub fn add(&mut self, other: &Self) {
        self.over = self.over.union(&other.over);
        self.under = self.under.union(&other.under);
    }
}

impl<K: PatriciaKey> AbstractValue for OverUnderSetValue<K> {
    fn kind(&self) -> DomainKind {
        DomainKind::Value
    }

    fn leq(&self, other: &Self) -> bool {
        self.over.is_subset_of(&other.over) && other.under.is_subset_of(&self.under)
    }

    fn join_with(&mut self, other: &Self) -> DomainKind {
        self.over = self.over.union(&other.over);
        self.under = self.under.intersection(&other.under);
        DomainKind::Value
    }

    fn meet_with(&mut self, other: &Self) -> DomainKind {
        self.over = self.over.intersection(&other.over);
        self.under = self.under.union(&other.under);
        if self.under.is_subset_of(&self.over) {
            DomainKind::Value
        } else {
            DomainKind::Bottom
        }
    }
}
