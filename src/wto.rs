//! Weak topological ordering (C4): Bourdoncle's decomposition of a rooted
//! directed graph into a nested sequence of vertices and strongly-connected
//! components, each SCC carrying a designated head. Consumed by
//! [`crate::fixpoint`] to drive chaotic iteration with widening.
//!
//! There is no single upstream source file for this construction in the
//! reference kernel — `MonotonicFixpointIterator.h` only consumes a
//! `WeakTopologicalOrdering<NodeId, NodeHash>` built elsewhere. The
//! implementation below follows Bourdoncle's own algorithm description
//! (stack-based DFS with partition numbers) rather than a retrieved file.
//!
//! F. Bourdoncle. *Efficient chaotic iteration strategies with widenings.*
//! FMPA 1993.

use std::collections::HashMap;
use std::hash::Hash;

/// A directed graph with a designated entry node, as consumed by the WTO
/// builder and the fixpoint iterator. `Node` plays the role of `NodeId` in
/// the reference kernel's `GraphInterface`.
pub trait WtoGraph {
    type Node: Eq + Hash + Clone + std::fmt::Debug;

    fn entry(&self) -> Self::Node;
    fn successors(&self, node: &Self::Node) -> Vec<Self::Node>;
}

/// One element of a weak topological ordering: either a plain vertex, or an
/// SCC with a designated head and a nested ordering of its remaining
/// members.
#[derive(Clone, Debug)]
pub enum WtoComponent<N> {
    Vertex(N),
    Scc { head: N, body: Vec<WtoComponent<N>> },
}

impl<N> WtoComponent<N> {
    pub fn is_vertex(&self) -> bool {
        matches!(self, WtoComponent::Vertex(_))
    }

    /// The head node: the vertex itself for a `Vertex`, the SCC's entry
    /// point for an `Scc`.
    pub fn head_node(&self) -> &N {
        match self {
            WtoComponent::Vertex(n) => n,
            WtoComponent::Scc { head, .. } => head,
        }
    }

    pub fn body(&self) -> &[WtoComponent<N>] {
        match self {
            WtoComponent::Vertex(_) => &[],
            WtoComponent::Scc { body, .. } => body,
        }
    }
}

/// A complete weak topological ordering of a graph reachable from its entry
/// node: a top-level sequence of components in iteration order.
#[derive(Clone, Debug)]
pub struct WeakTopologicalOrdering<N> {
    components: Vec<WtoComponent<N>>,
}

impl<N> WeakTopologicalOrdering<N> {
    pub fn components(&self) -> &[WtoComponent<N>] {
        &self.components
    }
}

impl<'a, N> IntoIterator for &'a WeakTopologicalOrdering<N> {
    type Item = &'a WtoComponent<N>;
    type IntoIter = std::slice::Iter<'a, WtoComponent<N>>;

    fn into_iter(self) -> Self::IntoIter {
        self.components.iter()
    }
}

/// `0` means "not yet visited"; `usize::MAX` marks a node whose DFN has been
/// permanently retired once its enclosing component is closed.
const UNVISITED: usize = 0;
const RETIRED: usize = usize::MAX;

struct Builder<'g, G: WtoGraph> {
    graph: &'g G,
    dfn: HashMap<G::Node, usize>,
    stack: Vec<G::Node>,
    next_dfn: usize,
}

impl<'g, G: WtoGraph> Builder<'g, G> {
    fn new(graph: &'g G) -> Self {
        Builder {
            graph,
            dfn: HashMap::new(),
            stack: Vec::new(),
            next_dfn: UNVISITED,
        }
    }

    fn dfn_of(&self, node: &G::Node) -> usize {
        *self.dfn.get(node).unwrap_or(&UNVISITED)
    }

    /// Bourdoncle's `visit`. Returns the lowest DFN reachable from `vertex`
    /// without crossing an already-closed component (the vertex's "head"
    /// value), pushing completed components onto `partition` as they close.
    fn visit(&mut self, vertex: G::Node, partition: &mut Vec<WtoComponent<G::Node>>) -> usize {
        self.stack.push(vertex.clone());
        self.next_dfn += 1;
        self.dfn.insert(vertex.clone(), self.next_dfn);
        let mut head = self.next_dfn;
        let mut is_loop = false;

        for successor in self.graph.successors(&vertex) {
            let successor_dfn = self.dfn_of(&successor);
            let min = if successor_dfn == UNVISITED {
                self.visit(successor, partition)
            } else {
                successor_dfn
            };
            if min <= head {
                head = min;
                is_loop = true;
            }
        }

        if head == self.dfn_of(&vertex) {
            self.dfn.insert(vertex.clone(), RETIRED);
            let mut element = self.stack.pop().expect("WTO stack underflow");
            if is_loop {
                while element != vertex {
                    self.dfn.insert(element.clone(), UNVISITED);
                    element = self.stack.pop().expect("WTO stack underflow");
                }
                let body = self.component(&vertex);
                partition.push(WtoComponent::Scc {
                    head: vertex,
                    body,
                });
            } else {
                partition.push(WtoComponent::Vertex(vertex));
            }
        }
        head
    }

    /// Builds the nested ordering of an SCC's non-head members, given that
    /// they were just reset to `UNVISITED` and `vertex` is the head.
    fn component(&mut self, vertex: &G::Node) -> Vec<WtoComponent<G::Node>> {
        let mut partition = Vec::new();
        for successor in self.graph.successors(vertex) {
            if self.dfn_of(&successor) == UNVISITED {
                self.visit(successor, &mut partition);
            }
        }
        partition
    }
}

impl<N> WeakTopologicalOrdering<N> {
    pub fn compute<G: WtoGraph<Node = N>>(graph: &G) -> Self {
        let mut builder = Builder::new(graph);
        let mut components = Vec::new();
        builder.visit(graph.entry(), &mut components);
        WeakTopologicalOrdering { components }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap as Map;

    struct TestGraph {
        edges: Map<u32, Vec<u32>>,
        entry: u32,
    }

    impl WtoGraph for TestGraph {
        type Node = u32;

        fn entry(&self) -> u32 {
            self.entry
        }

        fn successors(&self, node: &u32) -> Vec<u32> {
            self.edges.get(node).cloned().unwrap_or_default()
        }
    }

    fn linear_order<N: Clone>(wto: &WeakTopologicalOrdering<N>) -> Vec<N> {
        fn walk<N: Clone>(components: &[WtoComponent<N>], out: &mut Vec<N>) {
            for c in components {
                match c {
                    WtoComponent::Vertex(n) => out.push(n.clone()),
                    WtoComponent::Scc { head, body } => {
                        out.push(head.clone());
                        walk(body, out);
                    }
                }
            }
        }
        let mut out = Vec::new();
        walk(wto.components(), &mut out);
        out
    }

    #[test]
    fn acyclic_diamond_is_all_vertices_in_topological_order() {
        // 1 -> 2, 1 -> 3, 2 -> 4, 3 -> 4
        let mut edges = Map::new();
        edges.insert(1, vec![2, 3]);
        edges.insert(2, vec![4]);
        edges.insert(3, vec![4]);
        edges.insert(4, vec![]);
        let graph = TestGraph { edges, entry: 1 };
        let wto = WeakTopologicalOrdering::compute(&graph);
        assert!(wto.components().iter().all(|c| c.is_vertex()));
        assert_eq!(linear_order(&wto), vec![1, 2, 3, 4]);
    }

    #[test]
    fn simple_self_loop_is_a_single_component_scc() {
        // 1 -> 2 -> 2 (self loop) -> 3
        let mut edges = Map::new();
        edges.insert(1, vec![2]);
        edges.insert(2, vec![2, 3]);
        edges.insert(3, vec![]);
        let graph = TestGraph { edges, entry: 1 };
        let wto = WeakTopologicalOrdering::compute(&graph);
        let components = wto.components();
        assert_eq!(components.len(), 3);
        assert!(components[0].is_vertex());
        match &components[1] {
            WtoComponent::Scc { head, body } => {
                assert_eq!(*head, 2);
                assert!(body.is_empty());
            }
            WtoComponent::Vertex(_) => panic!("expected an SCC for the self-loop"),
        }
        assert!(components[2].is_vertex());
    }

    #[test]
    fn nested_loop_head_is_the_entry_of_the_cycle() {
        // 1 -> 2 -> 3 -> 2 (back edge), 3 -> 4
        let mut edges = Map::new();
        edges.insert(1, vec![2]);
        edges.insert(2, vec![3]);
        edges.insert(3, vec![2, 4]);
        edges.insert(4, vec![]);
        let graph = TestGraph { edges, entry: 1 };
        let wto = WeakTopologicalOrdering::compute(&graph);
        let components = wto.components();
        assert!(components[0].is_vertex());
        match &components[1] {
            WtoComponent::Scc { head, body } => {
                assert_eq!(*head, 2);
                assert_eq!(body.len(), 1);
                assert!(body[0].is_vertex());
                assert_eq!(*body[0].head_node(), 3);
            }
            WtoComponent::Vertex(_) => panic!("expected an SCC for nodes {{2, 3}}"),
        }
        assert!(components[2].is_vertex());
    }

    #[test]
    fn unreachable_nodes_do_not_appear() {
        let mut edges = Map::new();
        edges.insert(1, vec![]);
        edges.insert(99, vec![1]);
        let graph = TestGraph { edges, entry: 1 };
        let wto = WeakTopologicalOrdering::compute(&graph);
        assert_eq!(linear_order(&wto), vec![1]);
    }
}
