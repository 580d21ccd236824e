//! `PatriciaTreeMap<K, V>`: the persistent key/value map.
//!
//! Every mutating operation returns a new map; the old one remains valid.
//! Reference equality of two roots implies map equality, which `union`,
//! `intersection`, and `difference` exploit to short-circuit on shared
//! subtrees.

use std::sync::Arc;

use super::{branching_bit, mask, match_prefix, zero_bit, MapValue, PatriciaKey};

#[derive(Debug)]
enum Node<K, V> {
    Leaf {
        key: K,
        value: V,
    },
    Branch {
        prefix: K,
        branching_bit: K,
        left: Tree<K, V>,
        right: Tree<K, V>,
    },
}

type Tree<K, V> = Arc<Node<K, V>>;

fn ptr_eq<K, V>(a: &Option<Tree<K, V>>, b: &Option<Tree<K, V>>) -> bool {
    match (a, b) {
        (None, None) => true,
        (Some(x), Some(y)) => Arc::ptr_eq(x, y),
        _ => false,
    }
}

fn leaf<K, V>(key: K, value: V) -> Option<Tree<K, V>> {
    Some(Arc::new(Node::Leaf { key, value }))
}

fn branch<K: PatriciaKey, V>(
    prefix: K,
    branching_bit: K,
    left: Option<Tree<K, V>>,
    right: Option<Tree<K, V>>,
) -> Option<Tree<K, V>> {
    match (left, right) {
        (None, None) => None,
        (Some(t), None) | (None, Some(t)) => Some(t),
        (Some(left), Some(right)) => Some(Arc::new(Node::Branch {
            prefix,
            branching_bit,
            left,
            right,
        })),
    }
}

/// Joins two trees with disjoint prefixes under a new branch node whose bit
/// is the lowest bit at which the two prefixes differ.
fn join<K: PatriciaKey, V>(
    p0: K,
    t0: Option<Tree<K, V>>,
    p1: K,
    t1: Option<Tree<K, V>>,
) -> Option<Tree<K, V>> {
    let bit = branching_bit(p0, p1);
    let prefix = mask(p0, bit);
    if zero_bit(p0, bit) {
        branch(prefix, bit, t0, t1)
    } else {
        branch(prefix, bit, t1, t0)
    }
}

/// A persistent, immutable map from unsigned-integer keys to values,
/// implemented as a Patricia tree. Cloning a map is O(1) (an `Arc` bump).
#[derive(Debug)]
pub struct PatriciaTreeMap<K, V> {
    root: Option<Tree<K, V>>,
}

impl<K, V> Clone for PatriciaTreeMap<K, V> {
    fn clone(&self) -> Self {
        PatriciaTreeMap {
            root: self.root.clone(),
        }
    }
}

impl<K: PatriciaKey, V: MapValue> Default for PatriciaTreeMap<K, V> {
    fn default() -> Self {
        PatriciaTreeMap { root: None }
    }
}

impl<K: PatriciaKey, V: MapValue> PartialEq for PatriciaTreeMap<K, V> {
    fn eq(&self, other: &Self) -> bool {
        if ptr_eq(&self.root, &other.root) {
            return true;
        }
        // Structural fallback: same bindings, possibly built independently.
        let mut a = self.bindings();
        let mut b = other.bindings();
        a.sort_by(|x, y| x.0.cmp(&y.0));
        b.sort_by(|x, y| x.0.cmp(&y.0));
        a.len() == b.len()
            && a.iter()
                .zip(b.iter())
                .all(|((k1, v1), (k2, v2))| k1 == k2 && V::equals(v1, v2))
    }
}

impl<K: PatriciaKey, V: MapValue> PatriciaTreeMap<K, V> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.root.is_none()
    }

    /// Reference-equality check only (O(1)); use `==` for full structural
    /// equality.
    pub fn is_identical_to(&self, other: &Self) -> bool {
        ptr_eq(&self.root, &other.root)
    }

    pub fn size(&self) -> usize {
        fn walk<K, V>(tree: &Option<Tree<K, V>>) -> usize {
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
        self.lookup(key).is_some()
    }

    pub fn lookup(&self, key: K) -> Option<&V> {
        fn walk<K: PatriciaKey, V>(tree: &Option<Tree<K, V>>, key: K) -> Option<&V> {
            match tree {
                None => None,
                Some(node) => match node.as_ref() {
                    Node::Leaf { key: k, value } => {
                        if *k == key {
                            Some(value)
                        } else {
                            None
                        }
                    }
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

    pub fn at(&self, key: K) -> V {
        self.lookup(key).cloned().unwrap_or_else(V::default_value)
    }

    /// Inserting the codomain's default value removes the key, keeping the
    /// sparse, canonical representation that environment/partition domains
    /// rely on (missing == default).
    pub fn insert(&self, key: K, value: V) -> Self {
        if V::is_default_value(&value) {
            return self.remove(key);
        }
        PatriciaTreeMap {
            root: insert_leaf(&self.root, key, value),
        }
    }

    pub fn remove(&self, key: K) -> Self {
        PatriciaTreeMap {
            root: remove_key(&self.root, key),
        }
    }

    pub fn bindings(&self) -> Vec<(K, V)> {
        let mut out = Vec::new();
        fn walk<K: PatriciaKey, V: Clone>(tree: &Option<Tree<K, V>>, out: &mut Vec<(K, V)>) {
            match tree {
                None => {}
                Some(node) => match node.as_ref() {
                    Node::Leaf { key, value } => out.push((*key, value.clone())),
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

    /// Union of two maps. Shared keys are reconciled with `combine`; if the
    /// result is the codomain's default, the key is dropped (canonical
    /// sparse form). Reference-equal operands return the left-hand side
    /// unchanged, in O(1).
    pub fn union_with(&self, combine: impl Fn(&V, &V) -> V + Copy, other: &Self) -> Self {
        PatriciaTreeMap {
            root: merge(combine, &self.root, &other.root),
        }
    }

    /// Intersection of two maps. Disjoint prefixes yield the empty map;
    /// shared keys are reconciled with `combine`.
    pub fn intersection_with(&self, combine: impl Fn(&V, &V) -> V + Copy, other: &Self) -> Self {
        PatriciaTreeMap {
            root: intersect(combine, &self.root, &other.root),
        }
    }

    /// Bindings of `self` whose key is absent from `other`, plus bindings
    /// whose shared key's `combine(self_value, other_value)` is not the
    /// codomain's default (a default result removes the key).
    pub fn difference_with(&self, combine: impl Fn(&V, &V) -> V + Copy, other: &Self) -> Self {
        PatriciaTreeMap {
            root: diff(combine, &self.root, &other.root),
        }
    }

    /// Walks the map, preserving sharing for subtrees whose bindings are
    /// entirely retained.
    pub fn filter(&self, predicate: impl Fn(&K, &V) -> bool + Copy) -> Self {
        PatriciaTreeMap {
            root: filter_tree(predicate, &self.root),
        }
    }

    /// Applies `f` to every value; a value mapped to the codomain's default
    /// causes that leaf to be erased.
    pub fn map_values(&self, f: impl Fn(&V) -> V + Copy) -> Self {
        PatriciaTreeMap {
            root: map_tree(f, &self.root),
        }
    }

    /// The componentwise lifting of `V::leq`: every key bound in `self` must
    /// be bound (or default-bound) in `other` with a `leq` value, and vice
    /// versa for keys only in `other` against the default.
    pub fn leq(&self, other: &Self) -> bool {
        if ptr_eq(&self.root, &other.root) {
            return true;
        }
        self.bindings().iter().all(|(k, v)| {
            let other_v = other.lookup(*k).cloned().unwrap_or_else(V::default_value);
            V::leq(v, &other_v)
        }) && other.bindings().iter().all(|(k, v)| {
            let self_v = self.lookup(*k).cloned().unwrap_or_else(V::default_value);
            V::leq(&self_v, v)
        })
    }
}

fn insert_leaf<K: PatriciaKey, V: MapValue>(
    tree: &Option<Tree<K, V>>,
    key: K,
    value: V,
) -> Option<Tree<K, V>> {
    match tree {
        None => leaf(key, value),
        Some(node) => match node.as_ref() {
            Node::Leaf { key: k, .. } => {
                if *k == key {
                    leaf(key, value)
                } else {
                    join(key, leaf(key, value), *k, Some(node.clone()))
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
                        let new_left = insert_leaf(left, key, value);
                        branch(*prefix, *bit, new_left, Some(right.clone()))
                    } else {
                        let new_right = insert_leaf(right, key, value);
                        branch(*prefix, *bit, Some(left.clone()), new_right)
                    }
                } else {
                    join(key, leaf(key, value), *prefix, Some(node.clone()))
                }
            }
        },
    }
}

fn remove_key<K: PatriciaKey, V: Clone>(tree: &Option<Tree<K, V>>, key: K) -> Option<Tree<K, V>> {
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
                    let new_left = remove_key(left, key);
                    if ptr_eq(&new_left, &Some(left.clone())) {
                        Some(node.clone())
                    } else {
                        branch(*prefix, *bit, new_left, Some(right.clone()))
                    }
                } else {
                    let new_right = remove_key(right, key);
                    if ptr_eq(&new_right, &Some(right.clone())) {
                        Some(node.clone())
                    } else {
                        branch(*prefix, *bit, Some(left.clone()), new_right)
                    }
                }
            }
        },
    }
}

/// Inserts (or combines) a single leaf into an arbitrary tree, used by
/// `merge`/`intersect`/`diff` when one operand degenerates to a leaf.
fn combine_leaf_into<K: PatriciaKey, V: MapValue>(
    combine: impl Fn(&V, &V) -> V + Copy,
    leaf_key: K,
    leaf_value: &V,
    tree: &Option<Tree<K, V>>,
    leaf_is_left: bool,
) -> Option<Tree<K, V>> {
    match tree {
        None => leaf(leaf_key, leaf_value.clone()),
        Some(node) => match node.as_ref() {
            Node::Leaf { key, value } => {
                if *key == leaf_key {
                    let combined = if leaf_is_left {
                        combine(leaf_value, value)
                    } else {
                        combine(value, leaf_value)
                    };
                    if V::is_default_value(&combined) {
                        None
                    } else {
                        leaf(leaf_key, combined)
                    }
                } else {
                    join(leaf_key, leaf(leaf_key, leaf_value.clone()), *key, Some(node.clone()))
                }
            }
            Node::Branch {
                prefix,
                branching_bit: bit,
                left,
                right,
            } => {
                if match_prefix(leaf_key, *prefix, *bit) {
                    if zero_bit(leaf_key, *bit) {
                        let new_left =
                            combine_leaf_into(combine, leaf_key, leaf_value, left, leaf_is_left);
                        branch(*prefix, *bit, new_left, Some(right.clone()))
                    } else {
                        let new_right =
                            combine_leaf_into(combine, leaf_key, leaf_value, right, leaf_is_left);
                        branch(*prefix, *bit, Some(left.clone()), new_right)
                    }
                } else {
                    join(
                        leaf_key,
                        leaf(leaf_key, leaf_value.clone()),
                        *prefix,
                        Some(node.clone()),
                    )
                }
            }
        },
    }
}

fn merge<K: PatriciaKey, V: MapValue>(
    combine: impl Fn(&V, &V) -> V + Copy,
    s: &Option<Tree<K, V>>,
    t: &Option<Tree<K, V>>,
) -> Option<Tree<K, V>> {
    if ptr_eq(s, t) {
        return s.clone();
    }
    match (s, t) {
        (None, _) => t.clone(),
        (_, None) => s.clone(),
        (Some(s_node), Some(t_node)) => match (s_node.as_ref(), t_node.as_ref()) {
            (Node::Leaf { key, value }, _) => combine_leaf_into(combine, *key, value, t, true),
            (_, Node::Leaf { key, value }) => combine_leaf_into(combine, *key, value, s, false),
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
                    let new_left = merge(combine, s0, t0);
                    let new_right = merge(combine, s1, t1);
                    if ptr_eq(&new_left, &Some(s0.clone())) && ptr_eq(&new_right, &Some(s1.clone())) {
                        return s.clone();
                    }
                    if ptr_eq(&new_left, &Some(t0.clone())) && ptr_eq(&new_right, &Some(t1.clone())) {
                        return t.clone();
                    }
                    branch(*p, *m, new_left, new_right)
                } else if m < n && match_prefix(*q, *p, *m) {
                    if zero_bit(*q, *m) {
                        let new_left = merge(combine, s0, t);
                        if ptr_eq(&new_left, &Some(s0.clone())) {
                            return s.clone();
                        }
                        branch(*p, *m, new_left, Some(s1.clone()))
                    } else {
                        let new_right = merge(combine, s1, t);
                        if ptr_eq(&new_right, &Some(s1.clone())) {
                            return s.clone();
                        }
                        branch(*p, *m, Some(s0.clone()), new_right)
                    }
                } else if m > n && match_prefix(*p, *q, *n) {
                    if zero_bit(*p, *n) {
                        let new_left = merge(combine, s, t0);
                        if ptr_eq(&new_left, &Some(t0.clone())) {
                            return t.clone();
                        }
                        branch(*q, *n, new_left, Some(t1.clone()))
                    } else {
                        let new_right = merge(combine, s, t1);
                        if ptr_eq(&new_right, &Some(t1.clone())) {
                            return t.clone();
                        }
                        branch(*q, *n, Some(t0.clone()), new_right)
                    }
                } else {
                    join(*p, s.clone(), *q, t.clone())
                }
            }
        },
    }
}

fn intersect_leaf_with_tree<K: PatriciaKey, V: MapValue>(
    combine: impl Fn(&V, &V) -> V + Copy,
    leaf_key: K,
    leaf_value: &V,
    tree: &Option<Tree<K, V>>,
    leaf_is_left: bool,
) -> Option<Tree<K, V>> {
    match lookup_in(tree, leaf_key) {
        None => None,
        Some(other_value) => {
            let combined = if leaf_is_left {
                combine(leaf_value, &other_value)
            } else {
                combine(&other_value, leaf_value)
            };
            if V::is_default_value(&combined) {
                None
            } else {
                leaf(leaf_key, combined)
            }
        }
    }
}

fn lookup_in<K: PatriciaKey, V: Clone>(tree: &Option<Tree<K, V>>, key: K) -> Option<V> {
    match tree {
        None => None,
        Some(node) => match node.as_ref() {
            Node::Leaf { key: k, value } => {
                if *k == key {
                    Some(value.clone())
                } else {
                    None
                }
            }
            Node::Branch {
                branching_bit,
                left,
                right,
                ..
            } => {
                if zero_bit(key, *branching_bit) {
                    lookup_in(left, key)
                } else {
                    lookup_in(right, key)
                }
            }
        },
    }
}

fn intersect<K: PatriciaKey, V: MapValue>(
    combine: impl Fn(&V, &V) -> V + Copy,
    s: &Option<Tree<K, V>>,
    t: &Option<Tree<K, V>>,
) -> Option<Tree<K, V>> {
    if ptr_eq(s, t) {
        return s.clone();
    }
    match (s, t) {
        (None, _) | (_, None) => None,
        (Some(s_node), Some(t_node)) => match (s_node.as_ref(), t_node.as_ref()) {
            (Node::Leaf { key, value }, _) => {
                intersect_leaf_with_tree(combine, *key, value, t, true)
            }
            (_, Node::Leaf { key, value }) => {
                intersect_leaf_with_tree(combine, *key, value, s, false)
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
                    merge_disjoint(intersect(combine, s0, t0), intersect(combine, s1, t1))
                } else if m < n && match_prefix(*q, *p, *m) {
                    intersect(combine, if zero_bit(*q, *m) { s0 } else { s1 }, t)
                } else if m > n && match_prefix(*p, *q, *n) {
                    intersect(combine, s, if zero_bit(*p, *n) { t0 } else { t1 })
                } else {
                    None
                }
            }
        },
    }
}

/// Combines two trees known to have disjoint key sets (the result of
/// recursing into matched siblings of `intersect`/`diff`) without needing a
/// user `combine` function, since no key can appear in both.
fn merge_disjoint<K: PatriciaKey, V: Clone>(
    a: Option<Tree<K, V>>,
    b: Option<Tree<K, V>>,
) -> Option<Tree<K, V>> {
    match (&a, &b) {
        (None, _) => b,
        (_, None) => a,
        (Some(a_node), Some(_)) => {
            if let Node::Leaf { key, .. } = a_node.as_ref() {
                join(*key, a.clone(), find_any_key(&b), b)
            } else if let Node::Branch { prefix: p, branching_bit: m, left, right } = a_node.as_ref() {
                if let Node::Branch { prefix: q, branching_bit: n, left: t0, right: t1 } =
                    b.as_ref().unwrap().as_ref()
                {
                    if m == n && p == q {
                        branch(*p, *m, merge_disjoint(left.clone().into(), t0.clone().into()), merge_disjoint(right.clone().into(), t1.clone().into()))
                    } else {
                        join(*p, a.clone(), *q, b.clone())
                    }
                } else {
                    join(*p, a.clone(), find_any_key(&b), b)
                }
            } else {
                unreachable!()
            }
        }
    }
}

fn find_any_key<K: PatriciaKey, V>(tree: &Option<Tree<K, V>>) -> K {
    match tree {
        None => unreachable!("find_any_key called on empty tree"),
        Some(node) => match node.as_ref() {
            Node::Leaf { key, .. } => *key,
            Node::Branch { left, .. } => find_any_key(left),
        },
    }
}

fn diff<K: PatriciaKey, V: MapValue>(
    combine: impl Fn(&V, &V) -> V + Copy,
    s: &Option<Tree<K, V>>,
    t: &Option<Tree<K, V>>,
) -> Option<Tree<K, V>> {
    if ptr_eq(s, t) {
        return None;
    }
    match (s, t) {
        (None, _) => None,
        (_, None) => s.clone(),
        (Some(s_node), Some(_)) => match s_node.as_ref() {
            Node::Leaf { key, value } => match lookup_in(t, *key) {
                None => s.clone(),
                Some(t_value) => {
                    let combined = combine(value, &t_value);
                    if V::is_default_value(&combined) {
                        None
                    } else {
                        leaf(*key, combined)
                    }
                }
            },
            Node::Branch {
                prefix: p,
                branching_bit: m,
                left: s0,
                right: s1,
            } => {
                if let Node::Branch {
                    prefix: q,
                    branching_bit: n,
                    left: t0,
                    right: t1,
                } = t.as_ref().unwrap().as_ref()
                {
                    if m == n && p == q {
                        merge_disjoint(diff(combine, s0, t0), diff(combine, s1, t1))
                    } else if *m < *n && match_prefix(*q, *p, *m) {
                        if zero_bit(*q, *m) {
                            merge_disjoint(diff(combine, s0, &Some(t_node_clone(t))), Some(s1.clone()))
                        } else {
                            merge_disjoint(Some(s0.clone()), diff(combine, s1, &Some(t_node_clone(t))))
                        }
                    } else if *m > *n && match_prefix(*p, *q, *n) {
                        diff(combine, s, if zero_bit(*p, *n) { t0 } else { t1 })
                    } else {
                        s.clone()
                    }
                } else if let Node::Leaf { key, value } = t.as_ref().unwrap().as_ref() {
                    // t is a leaf: remove/combine at most one key from s.
                    diff_remove_one(combine, s, *key, value)
                } else {
                    s.clone()
                }
            }
        },
    }
}

fn t_node_clone<K: PatriciaKey, V: Clone>(t: &Option<Tree<K, V>>) -> Tree<K, V> {
    t.clone().unwrap()
}

fn diff_remove_one<K: PatriciaKey, V: MapValue>(
    combine: impl Fn(&V, &V) -> V + Copy,
    s: &Option<Tree<K, V>>,
    key: K,
    t_value: &V,
) -> Option<Tree<K, V>> {
    match s {
        None => None,
        Some(node) => match node.as_ref() {
            Node::Leaf { key: k, value } => {
                if *k == key {
                    let combined = combine(value, t_value);
                    if V::is_default_value(&combined) {
                        None
                    } else {
                        leaf(*k, combined)
                    }
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
                    merge_disjoint(
                        diff_remove_one(combine, left, key, t_value),
                        Some(right.clone()),
                    )
                } else {
                    merge_disjoint(
                        Some(left.clone()),
                        diff_remove_one(combine, right, key, t_value),
                    )
                }
            }
        },
    }
}

fn filter_tree<K: PatriciaKey, V: Clone>(
    predicate: impl Fn(&K, &V) -> bool + Copy,
    tree: &Option<Tree<K, V>>,
) -> Option<Tree<K, V>> {
    match tree {
        None => None,
        Some(node) => match node.as_ref() {
            Node::Leaf { key, value } => {
                if predicate(key, value) {
                    Some(node.clone())
                } else {
                    None
                }
            }
            Node::Branch {
                prefix,
                branching_bit,
                left,
                right,
            } => {
                let new_left = filter_tree(predicate, left);
                let new_right = filter_tree(predicate, right);
                if ptr_eq(&new_left, &Some(left.clone())) && ptr_eq(&new_right, &Some(right.clone())) {
                    Some(node.clone())
                } else {
                    branch(*prefix, *branching_bit, new_left, new_right)
                }
            }
        },
    }
}

fn map_tree<K: PatriciaKey, V: MapValue>(
    f: impl Fn(&V) -> V + Copy,
    tree: &Option<Tree<K, V>>,
) -> Option<Tree<K, V>> {
    match tree {
        None => None,
        Some(node) => match node.as_ref() {
            Node::Leaf { key, value } => {
                let new_value = f(value);
                if V::is_default_value(&new_value) {
                    None
                } else {
                    leaf(*key, new_value)
                }
            }
            Node::Branch {
                prefix,
                branching_bit,
                left,
                right,
            } => {
                let new_left = map_tree(f, left);
                let new_right = map_tree(f, right);
                branch(*prefix, *branching_bit, new_left, new_right)
            }
        },
    }
}

impl<K: PatriciaKey, V: MapValue> FromIterator<(K, V)> for PatriciaTreeMap<K, V> {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut map = PatriciaTreeMap::new();
        for (k, v) in iter {
            map = map.insert(k, v);
        }
        map
    }
}
