//! Benchmarks for the persistent Patricia-tree map: insertion, lookup, and
//! the sharing-aware `union`/`intersection` paths.
//!
//! Follows the same shape as this crate's other `criterion` benches: a
//! `bench_function` for a single-item operation plus a `benchmark_group`
//! sweeping sizes for the batch/merge operations.

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use redex_aik::patricia::map::PatriciaTreeMap;
use redex_aik::patricia::MapValue;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct Count(u64);

impl MapValue for Count {
    fn default_value() -> Self {
        Count(0)
    }

    fn is_default_value(value: &Self) -> bool {
        value.0 == 0
    }

    fn equals(a: &Self, b: &Self) -> bool {
        a.0 == b.0
    }
}

fn last_writer_wins(_old: &Count, new: &Count) -> Count {
    *new
}

fn build(n: u64) -> PatriciaTreeMap<u64, Count> {
    let mut map = PatriciaTreeMap::new();
    for k in 1..=n {
        map = map.insert(k, Count(k * 2));
    }
    map
}

fn bench_single_insert(c: &mut Criterion) {
    let base = build(10_000);
    c.bench_function("patricia_map_insert_single", |b| {
        b.iter(|| base.insert(10_001, Count(1)));
    });
}

fn bench_lookup(c: &mut Criterion) {
    let base = build(10_000);
    c.bench_function("patricia_map_lookup_hit", |b| {
        b.iter(|| base.lookup(5_000));
    });
}

fn bench_batch_insert(c: &mut Criterion) {
    let mut group = c.benchmark_group("patricia_map_batch_insert");
    for &size in &[100u64, 1_000, 10_000] {
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, &sz| {
            b.iter(|| build(sz));
        });
    }
    group.finish();
}

/// Union of two maps that share most of their structure (all but one key)
/// should run close to O(1), not O(size); this benchmark tracks that the
/// sharing fast path keeps paying off as the shared prefix grows.
fn bench_union_shared_prefix(c: &mut Criterion) {
    let mut group = c.benchmark_group("patricia_map_union_shared_prefix");
    for &size in &[1_000u64, 10_000, 100_000] {
        let base = build(size);
        let other = base.insert(size + 1, Count(999));
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, _| {
            b.iter(|| base.union_with(last_writer_wins, &other));
        });
    }
    group.finish();
}

fn bench_union_disjoint(c: &mut Criterion) {
    let mut group = c.benchmark_group("patricia_map_union_disjoint");
    for &size in &[100u64, 1_000, 10_000] {
        let left = build(size);
        let mut right = PatriciaTreeMap::new();
        for k in size..(2 * size) {
            right = right.insert(k, Count(k));
        }
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, _| {
            b.iter(|| left.union_with(last_writer_wins, &right));
        });
    }
    group.finish();
}

criterion_group!(
    benches,
    bench_single_insert,
    bench_lookup,
    bench_batch_insert,
    bench_union_shared_prefix,
    bench_union_disjoint
);
criterion_main!(benches);
