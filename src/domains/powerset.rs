//! `PatriciaTreeSetAbstractDomain<K>`: a powerset domain backed by a
//! [`crate::patricia::set::PatriciaTreeSet`] instead of a hash set, so that
//! `join`/`meet` over sets that mostly overlap run in time proportional to
//! their symmetric difference and share structure across fixpoint
//! iterations. Used for the large, frequently-joined sets that show up in
//! whole-program analyses (e.g. "set of classes a register may hold").

use crate::error::DomainKind;
use crate::lattice::AbstractValue;
use crate::patricia::set::PatriciaTreeSet;
use crate::patricia::PatriciaKey;

#[derive(Clone, Debug, PartialEq)]
pub struct PatriciaSetValue<K: PatriciaKey>(PatriciaTreeSet<K>);

impl<K: PatriciaKey> Default for PatriciaSetValue<K> {
    fn default() -> Self {
        PatriciaSetValue(PatriciaTreeSet::new())
    }
}

impl<K: PatriciaKey> PatriciaSetValue<K> {
    pub fn singleton(k: K) -> Self {
        PatriciaSetValue(PatriciaTreeSet::new().insert(k))
    }

    pub fn from_set(set: PatriciaTreeSet<K>) -> Self {
        PatriciaSetValue(set)
    }

    pub fn size(&self) -> usize {
        self.0.size()
    }

    pub fn contains(&self, k: K) -> bool {
        self.0.contains(k)
    }

    pub fn add(&mut self, k: K) {
        self.0 = self.0.insert(k);
    }

    pub fn remove(&mut self, k: K) {
        self.0 = self.0.remove(k);
    }

    pub fn elements(&self) -> Vec<K> {
        self.0.elements()
    }
}

impl<K: PatriciaKey> AbstractValue for PatriciaSetValue<K> {
    fn kind(&self) -> DomainKind {
        DomainKind::Value
    }

    fn leq(&self, other: &Self) -> bool {
        self.0.is_subset_of(&other.0)
    }

    fn join_with(&mut self, other: &Self) -> DomainKind {
        self.0 = self.0.union(&other.0);
        DomainKind::Value
    }

    fn meet_with(&mut self, other: &Self) -> DomainKind {
        self.0 = self.0.intersection(&other.0);
        DomainKind::Value
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lattice::{AbstractDomain, AbstractDomainScaffolding};

    type D = AbstractDomainScaffolding<PatriciaSetValue<u64>>;

    #[test]
    fn empty_is_not_bottom() {
        let empty = D::from_value(PatriciaSetValue::default());
        assert!(!empty.is_bottom());
        assert_eq!(empty.get().unwrap().size(), 0);
    }

    #[test]
    fn join_unions_and_shares_on_self_join() {
        let mut v = PatriciaSetValue::default();
        v.add(1);
        v.add(2);
        let a = D::from_value(v);
        let j = a.join(&a);
        assert_eq!(j.get().unwrap().size(), 2);
    }

    #[test]
    fn meet_intersects() {
        let mut v1 = PatriciaSetValue::default();
        v1.add(1);
        v1.add(2);
        let mut v2 = PatriciaSetValue::default();
        v2.add(2);
        v2.add(3);
        let a = D::from_value(v1);
        let b = D::from_value(v2);
        let m = a.meet(&b);
        assert_eq!(m.get().unwrap().size(), 1);
        assert!(m.get().unwrap().contains(2));
    }
}
