//! `FiniteAbstractDomain`: a domain over an explicit, small Hasse diagram,
//! encoded as a precomputed bit-vector lattice so that `leq`/`join`/`meet`
//! are O(1) table lookups instead of graph walks.
//!
//! The original kernel takes a `Lattice*` template parameter pointing at a
//! statically constructed encoding table. Rust has no template statics, so
//! [`BitVectorLattice`] is built once at runtime from the edge list and
//! shared behind an `Arc`; every [`FiniteAbstractDomain`] value carries a
//! clone of that `Arc` alongside its element index.

use std::sync::Arc;

use crate::lattice::AbstractDomain;

/// The reflexive-transitive closure of a Hasse diagram over `n` elements,
/// plus precomputed join/meet tables. Construction panics if the given edges
/// don't describe a lattice (every pair of elements must have a unique least
/// upper bound and greatest lower bound).
#[derive(Debug)]
pub struct BitVectorLattice {
    n: usize,
    /// `reachable[i]` is the bitset of elements reachable from `i` by
    /// following edges upward, including `i` itself.
    reachable: Vec<Vec<bool>>,
    join_table: Vec<Vec<usize>>,
    meet_table: Vec<Vec<usize>>,
    bottom: usize,
    top: usize,
}

impl BitVectorLattice {
    /// `n` elements indexed `0..n`; `edges` are `(lower, upper)` covering
    /// relations of the Hasse diagram. `bottom`/`top` index the extremal
    /// elements.
    pub fn new(n: usize, edges: &[(usize, usize)], bottom: usize, top: usize) -> Self {
        let mut reachable = vec![vec![false; n]; n];
        for i in 0..n {
            reachable[i][i] = true;
        }
        for &(lo, hi) in edges {
            reachable[lo][hi] = true;
        }
        // Floyd-Warshall style transitive closure over the reachability
        // relation.
        for k in 0..n {
            for i in 0..n {
                if reachable[i][k] {
                    for j in 0..n {
                        if reachable[k][j] {
                            reachable[i][j] = true;
                        }
                    }
                }
            }
        }

        let leq = |a: usize, b: usize| reachable[a][b];

        let mut join_table = vec![vec![0usize; n]; n];
        let mut meet_table = vec![vec![0usize; n]; n];
        for i in 0..n {
            for j in 0..n {
                join_table[i][j] = Self::least_upper_bound(n, &leq, i, j)
                    .unwrap_or_else(|| panic!("edges do not form a lattice: no join of {i},{j}"));
                meet_table[i][j] = Self::greatest_lower_bound(n, &leq, i, j)
                    .unwrap_or_else(|| panic!("edges do not form a lattice: no meet of {i},{j}"));
            }
        }

        BitVectorLattice {
            n,
            reachable,
            join_table,
            meet_table,
            bottom,
            top,
        }
    }

    fn least_upper_bound(
        n: usize,
        leq: &impl Fn(usize, usize) -> bool,
        a: usize,
        b: usize,
    ) -> Option<usize> {
        let upper_bounds: Vec<usize> = (0..n).filter(|&k| leq(a, k) && leq(b, k)).collect();
        upper_bounds
            .iter()
            .copied()
            .find(|&k| upper_bounds.iter().all(|&l| leq(k, l)))
    }

    fn greatest_lower_bound(
        n: usize,
        leq: &impl Fn(usize, usize) -> bool,
        a: usize,
        b: usize,
    ) -> Option<usize> {
        let lower_bounds: Vec<usize> = (0..n).filter(|&k| leq(k, a) && leq(k, b)).collect();
        lower_bounds
            .iter()
            .copied()
            .find(|&k| lower_bounds.iter().all(|&l| leq(l, k)))
    }

    fn leq(&self, a: usize, b: usize) -> bool {
        self.reachable[a][b]
    }
}

/// A value in a [`BitVectorLattice`]: an element index plus a shared handle
/// to the table it was encoded against. `join`/`meet`/`leq` between values
/// encoded against different lattice instances is a logic error and panics.
#[derive(Clone, Debug)]
pub struct FiniteAbstractDomain {
    lattice: Arc<BitVectorLattice>,
    element: usize,
}

impl FiniteAbstractDomain {
    pub fn new(lattice: Arc<BitVectorLattice>, element: usize) -> Self {
        assert!(element < lattice.n, "element index out of range");
        FiniteAbstractDomain { lattice, element }
    }

    pub fn element(&self) -> usize {
        self.element
    }

    fn assert_same_lattice(&self, other: &Self) {
        assert!(
            Arc::ptr_eq(&self.lattice, &other.lattice),
            "operands encoded against different FiniteAbstractDomain lattices"
        );
    }
}

impl PartialEq for FiniteAbstractDomain {
    fn eq(&self, other: &Self) -> bool {
        self.assert_same_lattice(other);
        self.element == other.element
    }
}

impl AbstractDomain for FiniteAbstractDomain {
    fn bottom() -> Self {
        panic!("FiniteAbstractDomain::bottom requires a lattice; use FiniteAbstractDomain::new")
    }

    fn top() -> Self {
        panic!("FiniteAbstractDomain::top requires a lattice; use FiniteAbstractDomain::new")
    }

    fn is_bottom(&self) -> bool {
        self.element == self.lattice.bottom
    }

    fn is_top(&self) -> bool {
        self.element == self.lattice.top
    }

    fn leq(&self, other: &Self) -> bool {
        self.assert_same_lattice(other);
        self.lattice.leq(self.element, other.element)
    }

    fn set_to_bottom(&mut self) {
        self.element = self.lattice.bottom;
    }

    fn set_to_top(&mut self) {
        self.element = self.lattice.top;
    }

    fn join_with(&mut self, other: &Self) {
        self.assert_same_lattice(other);
        self.element = self.lattice.join_table[self.element][other.element];
    }

    fn meet_with(&mut self, other: &Self) {
        self.assert_same_lattice(other);
        self.element = self.lattice.meet_table[self.element][other.element];
    }
}
