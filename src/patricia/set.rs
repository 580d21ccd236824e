//! `PatriciaTreeSet<K>`: the persistent element set.
//!
//! Distinct from wrapping `PatriciaTreeMap<K, ()>`: every branch caches an
//! incrementally maintained hash of its subtree (combining the branching bit
//! with the hashes of both children), and every leaf caches the hash of its
//! key, so that `PatriciaTreeSet: Hash` is O(1) instead of O(n). This
//! mirrors the "hash-consed" framing used elsewhere in the kernel for
//! memoizing structural equality checks.

use std::hash::{Hash, Hasher};
use std::sync::Arc;

use super::{branching_bit, mask, match_prefix, zero_bit, PatriciaKey};

fn hash_of<T: Hash>(value: &T) -> u64 {
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    value.hash(&mut hasher);
    hasher.finish()
}

#[derive(Debug)]
enum Node<K> {
    Leaf {
        key: K,
        hash: u64,
    },
    Branch {
        prefix: K,
        branching_bit: K,
        left: Tree<K>,
        right: Tree<K>,
        hash: u64,
    },
}

type Tree<K> = Arc<Node<K>>;

fn node_hash<K>(node: &Node<K>) -> u64 {
    match node {
        Node::Leaf { hash, .. } => *hash,
        Node::Branch { hash, .. } => *hash,
    }
}

fn ptr_eq<K>(a: &Option<Tree<K>>, b: &Option<Tree<K>>) -> bool {
    match (a, b) {
        (None, None) => true,
        (Some(x), Some(y)) => Arc::ptr_eq(x, y),
        _ => false,
    }
}

fn leaf<K: PatriciaKey>(key: K) -> Option<Tree<K>> {
    Some(Arc::new(Node::Leaf {
        key,
        hash: hash_of(&key),
    }))
}

fn branch<K: PatriciaKey>(
    prefix: K,
    bit: K,
    left: Option<Tree<K>>,
    right: Option<Tree<K>>,
) -> Option<Tree<K>> {
    match (left, right) {
        (None, None) => None,
        (Some(t), None) | (None, Some(t)) => Some(t),
        (Some(left), Some(right)) => {
            let mut h = hash_of(&bit);
            h = h
                .wrapping_mul(1_000_003)
                .wrapping_add(node_hash(&left));
            h = h
                .wrapping_mul(1_000_003)
                .wrapping_add(node_hash(&right));
            Some(Arc::new(Node::Branch {
                prefix,
                branching_bit: bit,
                left,
                right,
                hash: h,
            }))
        }
    }
}

fn join<K: PatriciaKey>(p0: K, t0: Option<Tree<K>>, p1: K, t1: Option<Tree<K>>) -> Option<Tree<K>> {
    let bit = branching_bit(p0, p1);
    let prefix = mask(p0, bit);
    if zero_bit(p0, bit) {
        branch(prefix, bit, t0, t1)
    } else {
        branch(prefix, bit, t1, t0)
    }
}

/// A persistent, immutable set of unsigned-integer keys, implemented as a
/// Patricia tree. Cloning is O(1).
#[derive(Debug)]
pub struct PatriciaTreeSet<K> {
    root: Option<Tree<K>>,
}

impl<K> Clone for PatriciaTreeSet<K> {
    fn clone(&self) -> Self {
        PatriciaTreeSet {
            root: self.root.clone(),
        }
    }
}

impl<K: PatriciaKey> Default for PatriciaTreeSet<K> {
    fn default() -> Self {
        PatriciaTreeSet { root: None }
    }
}

impl<K: PatriciaKey> PartialEq for PatriciaTreeSet<K> {
    fn eq(&self, other: &Self) -> bool {
        if ptr_eq(&self.root, &other.root) {
            return true;
        }
        let mut a = self.elements();
        let mut b = other.elements();
        a.sort();
        b.sort();
        a == b
    }
}
impl<K: PatriciaKey> Eq for PatriciaTreeSet<K> {}

impl<K: PatriciaKey> Hash for PatriciaTreeSet<K> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        let h = self.root.as_ref().map(|n| node_hash(n)).unwrap_or(0);
        h.hash(state);
    }
}

impl<K: PatriciaKey> PatriciaTreeSet<K> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.root.is_none()
    }

    pub fn is_identical_to(&self, other: &Self) -> bool {
        ptr_eq(&self.root, &other.root)
    }

    pub fn size(&self) -> usize {
        fn walk<K>(tree: &Option<Tree<K>>) -> usize {
            match tree {
                None => 0,
                Some(node) => match node.as_ref() {
                    Node::Leaf { .. } => 1,
                    Node::Branch { left, right, .. } => walk(left) + walk(right),
                },
            }
        }
        walk(&self.root)
    }

    pub fn contains(&self, key: K) -> bool {
        fn walk<K: PatriciaKey>(tree: &Option<Tree<K>>, key: K) -> bool {
            match tree {
                None => false,
                Some(node) => match node.as_ref() {
                    Node::Leaf { key: k, .. } => *k == key,
                    Node::Branch {
                        branching_bit,
                        left,
                        right,
                        ..
                    } => {
                        if zero_bit(key, *branching_bit) {
                            walk(left, key)
                        } else {
                            walk(right, key)
                        }
                    }
                },
            }
        }
        walk(&self.root, key)
    }

    pub fn insert(&self, key: K) -> Self {
        PatriciaTreeSet {
            root: insert_key(&self.root, key),
        }
    }

    pub fn remove(&self, key: K) -> Self {
        PatriciaTreeSet {
            root: remove_key(&self.root, key),
        }
    }

    pub fn elements(&self) -> Vec<K> {
        let mut out = Vec::new();
        fn walk<K: PatriciaKey>(tree: &Option<Tree<K>>, out: &mut Vec<K>) {
            match tree {
                None => {}
                Some(node) => match node.as_ref() {
                    Node::Leaf { key, .. } => out.push(*key),
                    Node::Branch { left, right, .. } => {
                        walk(left, out);
                        walk(right, out);
                    }
                },
            }
        }
        walk(&self.root, &mut out);
        out
    }

    pub fn union(&self, other: &Self) -> Self {
        PatriciaTreeSet {
            root: merge(&self.root, &other.root),
        }
    }

    pub fn intersection(&self, other: &Self) -> Self {
        PatriciaTreeSet {
            root: intersect(&self.root, &other.root),
        }
    }

    pub fn difference(&self, other: &Self) -> Self {
        PatriciaTreeSet {
            root: diff(&self.root, &other.root),
        }
    }

    pub fn is_subset_of(&self, other: &Self) -> bool {
        if ptr_eq(&self.root, &other.root) {
            return true;
        }
        self.elements().iter().all(|k| other.contains(*k))
    }
}

fn insert_key<K: PatriciaKey>(tree: &Option<Tree<K>>, key: K) -> Option<Tree<K>> {
    match tree {
        None => leaf(key),
        Some(node) => match node.as_ref() {
            Node::Leaf { key: k, .. } => {
                if *k == key {
                    Some(node.clone())
                } else {
                    join(key, leaf(key), *k, Some(node.clone()))
                }
            }
            Node::Branch {
                prefix,
                branching_bit: bit,
                left,
                right,
            } => {
                if match_prefix(key, *prefix, *bit) {
                    if zero_bit(key, *bit) {
                        branch(*prefix, *bit, insert_key(left, key), Some(right.clone()))
                    } else {
                        branch(*prefix, *bit, Some(left.clone()), insert_key(right, key))
                    }
                } else {
                    join(key, leaf(key), *prefix, Some(node.clone()))
                }
            }
        },
    }
}

fn remove_key<K: PatriciaKey>(tree: &Option<Tree<K>>, key: K) -> Option<Tree<K>> {
    match tree {
        None => None,
        Some(node) => match node.as_ref() {
            Node::Leaf { key: k, .. } => {
                if *k == key {
                    None
                } else {
                    Some(node.clone())
                }
            }
            Node::Branch {
                prefix,
                branching_bit: bit,
                left,
                right,
            } => {
                if !match_prefix(key, *prefix, *bit) {
                    Some(node.clone())
                } else if zero_bit(key, *bit) {
                    branch(*prefix, *bit, remove_key(left, key), Some(right.clone()))
                } else {
                    branch(*prefix, *bit, Some(left.clone()), remove_key(right, key))
                }
            }
        },
    }
}

fn merge<K: PatriciaKey>(s: &Option<Tree<K>>, t: &Option<Tree<K>>) -> Option<Tree<K>> {
    if ptr_eq(s, t) {
        return s.clone();
    }
    match (s, t) {
        (None, _) => t.clone(),
        (_, None) => s.clone(),
        (Some(s_node), Some(t_node)) => match (s_node.as_ref(), t_node.as_ref()) {
            (Node::Leaf { key, .. }, _) => insert_key(t, *key),
            (_, Node::Leaf { key, .. }) => insert_key(s, *key),
            (
                Node::Branch {
                    prefix: p,
                    branching_bit: m,
                    left: s0,
                    right: s1,
                },
                Node::Branch {
                    prefix: q,
                    branching_bit: n,
                    left: t0,
                    right: t1,
                },
            ) => {
                if m == n && p == q {
                    let new_left = merge(s0, t0);
                    let new_right = merge(s1, t1);
                    if ptr_eq(&new_left, &Some(s0.clone())) && ptr_eq(&new_right, &Some(s1.clone())) {
                        return s.clone();
                    }
                    branch(*p, *m, new_left, new_right)
                } else if m < n && match_prefix(*q, *p, *m) {
                    if zero_bit(*q, *m) {
                        branch(*p, *m, merge(s0, t), Some(s1.clone()))
                    } else {
                        branch(*p, *m, Some(s0.clone()), merge(s1, t))
                    }
                } else if m > n && match_prefix(*p, *q, *n) {
                    if zero_bit(*p, *n) {
                        branch(*q, *n, merge(s, t0), Some(t1.clone()))
                    } else {
                        branch(*q, *n, Some(t0.clone()), merge(s, t1))
                    }
                } else {
                    join(*p, s.clone(), *q, t.clone())
                }
            }
        },
    }
}

fn contains_in<K: PatriciaKey>(tree: &Option<Tree<K>>, key: K) -> bool {
    match tree {
        None => false,
        Some(node) => match node.as_ref() {
            Node::Leaf { key: k, .. } => *k == key,
            Node::Branch {
                branching_bit,
                left,
                right,
                ..
            } => {
                if zero_bit(key, *branching_bit) {
                    contains_in(left, key)
                } else {
                    contains_in(right, key)
                }
            }
        },
    }
}

fn intersect<K: PatriciaKey>(s: &Option<Tree<K>>, t: &Option<Tree<K>>) -> Option<Tree<K>> {
    if ptr_eq(s, t) {
        return s.clone();
    }
    match (s, t) {
        (None, _) | (_, None) => None,
        (Some(s_node), Some(t_node)) => match (s_node.as_ref(), t_node.as_ref()) {
            (Node::Leaf { key, .. }, _) => {
                if contains_in(t, *key) {
                    Some(s_node.clone())
                } else {
                    None
                }
            }
            (_, Node::Leaf { key, .. }) => {
                if contains_in(s, *key) {
                    Some(t_node.clone())
                } else {
                    None
                }
            }
            (
                Node::Branch {
                    prefix: p,
                    branching_bit: m,
                    left: s0,
                    right: s1,
                },
                Node::Branch {
                    prefix: q,
                    branching_bit: n,
                    left: t0,
                    right: t1,
                },
            ) => {
                if m == n && p == q {
                    branch(*p, *m, intersect(s0, t0), intersect(s1, t1))
                } else if m < n && match_prefix(*q, *p, *m) {
                    intersect(if zero_bit(*q, *m) { s0 } else { s1 }, t)
                } else if m > n && match_prefix(*p, *q, *n) {
                    intersect(s, if zero_bit(*p, *n) { t0 } else { t1 })
                } else {
                    None
                }
            }
        },
    }
}

fn diff<K: PatriciaKey>(s: &Option<Tree<K>>, t: &Option<Tree<K>>) -> Option<Tree<K>> {
    if ptr_eq(s, t) {
        return None;
    }
    match (s, t) {
        (None, _) => None,
        (_, None) => s.clone(),
        (Some(s_node), Some(t_node)) => match (s_node.as_ref(), t_node.as_ref()) {
            (Node::Leaf { key, .. }, _) => {
                if contains_in(t, *key) {
                    None
                } else {
                    Some(s_node.clone())
                }
            }
            (
                Node::Branch {
                    prefix: p,
                    branching_bit: m,
                    left: s0,
                    right: s1,
                },
                Node::Leaf { key, .. },
            ) => {
                if !match_prefix(*key, *p, *m) {
                    Some(s_node.clone())
                } else if zero_bit(*key, *m) {
                    branch(*p, *m, diff(s0, t), Some(s1.clone()))
                } else {
                    branch(*p, *m, Some(s0.clone()), diff(s1, t))
                }
            }
            (
                Node::Branch {
                    prefix: p,
                    branching_bit: m,
                    left: s0,
                    right: s1,
                },
                Node::Branch {
                    prefix: q,
                    branching_bit: n,
                    left: t0,
                    right: t1,
                },
            ) => {
                if m == n && p == q {
                    branch(*p, *m, diff(s0, t0), diff(s1, t1))
                } else if m < n && match_prefix(*q, *p, *m) {
                    if zero_bit(*q, *m) {
                        branch(*p, *m, diff(s0, t), Some(s1.clone()))
                    } else {
                        branch(*p, *m, Some(s0.clone()), diff(s1, t))
                    }
                } else if m > n && match_prefix(*p, *q, *n) {
                    diff(s, if zero_bit(*p, *n) { t0 } else { t1 })
                } else {
                    s.clone()
                }
            }
        },
    }
}

impl<K: PatriciaKey> FromIterator<K> for PatriciaTreeSet<K> {
    fn from_iter<I: IntoIterator<Item = K>>(iter: I) -> Self {
        let mut set = PatriciaTreeSet::new();
        for k in iter {
            set = set.insert(k);
        }
        set
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_contains_remove() {
        let s = PatriciaTreeSet::<u64>::new().insert(5).insert(9);
        assert!(s.contains(5));
        assert!(s.contains(9));
        assert!(!s.contains(1));
        let s2 = s.remove(5);
        assert!(!s2.contains(5));
        assert!(s2.contains(9));
    }

    #[test]
    fn union_intersection_difference() {
        let a: PatriciaTreeSet<u64> = [1, 2, 3].into_iter().collect();
        let b: PatriciaTreeSet<u64> = [2, 3, 4].into_iter().collect();
        assert_eq!(a.union(&b).size(), 4);
        assert_eq!(a.intersection(&b).elements().len(), 2);
        assert_eq!(a.difference(&b).elements(), vec![1]);
    }

    #[test]
    fn hash_matches_for_equal_sets_built_differently() {
        let a: PatriciaTreeSet<u64> = [1, 2, 3].into_iter().collect();
        let b: PatriciaTreeSet<u64> = [3, 2, 1].into_iter().collect();
        assert_eq!(a, b);
        assert_eq!(hash_of(&a.root.as_ref().map(node_hash)), hash_of(&b.root.as_ref().map(node_hash)));
    }

    #[test]
    fn subset() {
        let a: PatriciaTreeSet<u64> = [1, 2].into_iter().collect();
        let b: PatriciaTreeSet<u64> = [1, 2, 3].into_iter().collect();
        assert!(a.is_subset_of(&b));
        assert!(!b.is_subset_of(&a));
    }
}
