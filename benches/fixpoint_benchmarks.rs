//! Benchmarks for the monotonic fixpoint iterator: how iteration cost
//! scales with the size of a loop nest once widening has kicked in, using
//! the interval domain as the state.
//!
//! Uses the same `benchmark_group`-sweeps-an-input-size-axis style as this
//! crate's other benches.

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use redex_aik::domains::interval::IntervalDomain;
use redex_aik::fixpoint::{Graph, MonotonicFixpointIterator, Transformer};
use redex_aik::AbstractDomain;

/// A chain of `n` nested self-loops: node `i` falls through to `i + 1` and
/// also loops back to itself, forcing the iterator to widen at every node
/// before it can move on to the next.
struct LoopChain {
    len: u32,
}

impl Graph for LoopChain {
    type Node = u32;
    type Edge = (u32, u32);

    fn entry(&self) -> u32 {
        0
    }

    fn predecessors(&self, node: &u32) -> Vec<(u32, u32)> {
        let mut out = vec![(*node, *node)];
        if *node > 0 {
            out.push((*node - 1, *node));
        }
        out
    }

    fn successors(&self, node: &u32) -> Vec<(u32, u32)> {
        let mut out = vec![(*node, *node)];
        if *node + 1 < self.len {
            out.push((*node, *node + 1));
        }
        out
    }

    fn source(&self, edge: &(u32, u32)) -> u32 {
        edge.0
    }

    fn target(&self, edge: &(u32, u32)) -> u32 {
        edge.1
    }
}

/// Each node increments the running interval by `[0, 1]`, so without
/// widening the loop at each node would never stabilize.
struct Increment;

impl Transformer<LoopChain, IntervalDomain> for Increment {
    fn analyze_node(&self, _node: &u32, current_state: &mut IntervalDomain) {
        current_state.join_with(&current_state.add(&IntervalDomain::finite(0, 1)));
    }

    fn analyze_edge(&self, _edge: &(u32, u32), exit_state_at_source: &IntervalDomain) -> IntervalDomain {
        *exit_state_at_source
    }
}

fn bench_loop_chain(c: &mut Criterion) {
    let mut group = c.benchmark_group("fixpoint_loop_chain");
    for &len in &[10u32, 100, 1_000] {
        group.bench_with_input(BenchmarkId::from_parameter(len), &len, |b, &n| {
            let graph = LoopChain { len: n };
            b.iter(|| {
                let mut iter = MonotonicFixpointIterator::new(&graph, Increment);
                iter.run(IntervalDomain::finite(0, 0));
                iter.exit_state_at(&(n - 1))
            });
        });
    }
    group.finish();
}

fn bench_wto_construction(c: &mut Criterion) {
    use redex_aik::wto::{WeakTopologicalOrdering, WtoGraph};

    struct WtoAdapter<'g>(&'g LoopChain);
    impl<'g> WtoGraph for WtoAdapter<'g> {
        type Node = u32;
        fn entry(&self) -> u32 {
            self.0.entry()
        }
        fn successors(&self, node: &u32) -> Vec<u32> {
            self.0.successors(node).into_iter().map(|(_, t)| t).collect()
        }
    }

    let mut group = c.benchmark_group("wto_construction");
    for &len in &[10u32, 100, 1_000, 10_000] {
        let graph = LoopChain { len };
        group.bench_with_input(BenchmarkId::from_parameter(len), &len, |b, _| {
            b.iter(|| WeakTopologicalOrdering::compute(&WtoAdapter(&graph)));
        });
    }
    group.finish();
}

criterion_group!(benches, bench_loop_chain, bench_wto_construction);
criterion_main!(benches);
