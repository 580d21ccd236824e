//! `HashedAbstractPartition<Label, Domain>`: maps labels to a common
//! abstract domain, denoting a *union* of properties (as opposed to
//! `Environment`'s conjunction). Missing labels default to Bottom; the
//! partition itself is Bottom iff every binding is Bottom, Top iff every
//! binding is Top.
//!
//! Top is tracked with an explicit flag rather than folded into the map
//! representation, and — deliberately, matching the original kernel's
//! simplification — `top().set(label, d)` stays Top for any `d`: once a
//! partition is universally Top, individual labels cannot be re-bound away
//! from it.

use std::collections::HashMap;
use std::hash::Hash;

use crate::lattice::AbstractDomain;

#[derive(Clone, Debug)]
pub struct Partition<Label: Eq + Hash + Clone + std::fmt::Debug, D: AbstractDomain> {
    map: HashMap<Label, D>,
    is_top: bool,
}

impl<Label: Eq + Hash + Clone + std::fmt::Debug, D: AbstractDomain> Default for Partition<Label, D> {
    fn default() -> Self {
        Partition {
            map: HashMap::new(),
            is_top: false,
        }
    }
}

impl<Label: Eq + Hash + Clone + std::fmt::Debug, D: AbstractDomain> Partition<Label, D> {
    /// Bindings not set to Bottom. Undefined (panics) on a Top partition.
    pub fn bindings(&self) -> &HashMap<Label, D> {
        assert!(!self.is_top, "bindings() is undefined on a Top partition");
        &self.map
    }

    pub fn get(&self, label: &Label) -> D {
        if self.is_top {
            return D::top();
        }
        self.map.get(label).cloned().unwrap_or_else(D::bottom)
    }

    /// No-op if the partition is Top.
    pub fn set(&mut self, label: Label, value: D) {
        if self.is_top {
            return;
        }
        if value.is_bottom() {
            self.map.remove(&label);
        } else {
            self.map.insert(label, value);
        }
    }

    /// No-op if the partition is Top.
    pub fn update(&mut self, label: Label, op: impl FnOnce(&mut D)) {
        if self.is_top {
            return;
        }
        let mut value = self.map.remove(&label).unwrap_or_else(D::bottom);
        op(&mut value);
        if !value.is_bottom() {
            self.map.insert(label, value);
        }
    }
}

impl<Label: Eq + Hash + Clone + std::fmt::Debug, D: AbstractDomain> PartialEq for Partition<Label, D> {
    fn eq(&self, other: &Self) -> bool {
        self.equals(other)
    }
}

impl<Label: Eq + Hash + Clone + std::fmt::Debug, D: AbstractDomain> AbstractDomain
    for Partition<Label, D>
{
    fn bottom() -> Self {
        Self::default()
    }

    fn top() -> Self {
        Partition {
            map: HashMap::new(),
            is_top: true,
        }
    }

    fn is_bottom(&self) -> bool {
        !self.is_top && self.map.is_empty()
    }

    fn is_top(&self) -> bool {
        self.is_top
    }

    fn leq(&self, other: &Self) -> bool {
        if self.is_top {
            return other.is_top;
        }
        if other.is_top {
            return true;
        }
        if self.map.len() > other.map.len() {
            return false;
        }
        self.map.iter().all(|(label, value)| {
            other
                .map
                .get(label)
                .map(|other_value| value.leq(other_value))
                .unwrap_or(false)
        })
    }

    fn equals(&self, other: &Self) -> bool {
        if self.is_top != other.is_top || self.map.len() != other.map.len() {
            return false;
        }
        self.map.iter().all(|(label, value)| {
            other
                .map
                .get(label)
                .map(|other_value| value.equals(other_value))
                .unwrap_or(false)
        })
    }

    fn set_to_bottom(&mut self) {
        self.map.clear();
        self.is_top = false;
    }

    fn set_to_top(&mut self) {
        self.map.clear();
        self.is_top = true;
    }

    fn join_with(&mut self, other: &Self) {
        self.join_like(other, |x, y| x.join_with(y));
    }

    fn widen_with(&mut self, other: &Self) {
        self.join_like(other, |x, y| x.widen_with(y));
    }

    fn meet_with(&mut self, other: &Self) {
        self.meet_like(other, |x, y| x.meet_with(y));
    }

    fn narrow_with(&mut self, other: &Self) {
        self.meet_like(other, |x, y| x.narrow_with(y));
    }
}

impl<Label: Eq + Hash + Clone + std::fmt::Debug, D: AbstractDomain> Partition<Label, D> {
    fn join_like(&mut self, other: &Self, op: impl Fn(&mut D, &D)) {
        if self.is_top {
            return;
        }
        if other.is_top {
            self.set_to_top();
            return;
        }
        for (label, other_value) in &other.map {
            match self.map.get_mut(label) {
                None => {
                    self.map.insert(label.clone(), other_value.clone());
                }
                Some(value) => op(value, other_value),
            }
        }
    }

    fn meet_like(&mut self, other: &Self, op: impl Fn(&mut D, &D)) {
        if self.is_top {
            *self = other.clone();
            return;
        }
        if other.is_top {
            return;
        }
        self.map.retain(|label, value| match other.map.get(label) {
            None => false,
            Some(other_value) => {
                op(value, other_value);
                !value.is_bottom()
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domains::constant::Constant;
    use crate::lattice::AbstractDomainScaffolding;

    type ConstD = AbstractDomainScaffolding<Constant<i32>>;
    type Part = Partition<&'static str, ConstD>;

    #[test]
    fn default_is_bottom_and_missing_label_reads_bottom() {
        let p = Part::bottom();
        assert!(p.get(&"x").is_bottom());
    }

    #[test]
    fn set_then_get_roundtrips() {
        let mut p = Part::bottom();
        p.set("x", ConstD::from_value(Constant::new(1)));
        assert_eq!(p.get(&"x").get().unwrap().get(), &1);
    }

    #[test]
    fn top_ignores_further_sets() {
        let mut p = Part::top();
        p.set("x", ConstD::from_value(Constant::new(1)));
        assert!(p.is_top());
    }

    #[test]
    fn join_unions_labels() {
        let mut a = Part::bottom();
        a.set("x", ConstD::from_value(Constant::new(1)));
        let mut b = Part::bottom();
        b.set("y", ConstD::from_value(Constant::new(2)));
        let j = a.join(&b);
        assert_eq!(j.get(&"x").get().unwrap().get(), &1);
        assert_eq!(j.get(&"y").get().unwrap().get(), &2);
    }
}
