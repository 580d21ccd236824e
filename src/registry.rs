//! The analysis-summary registry consumed by [`crate::interproc`]: a
//! concurrent map from function id to its current summary, with a dirty bit
//! the interprocedural driver polls between iterations.
//!
//! Grounded on the harness's registry contract (`update`, `has_update`,
//! `materialize_update`) rather than a single upstream file — the
//! call-graph/summary machinery this mirrors lives outside the retrieved
//! `sparta`/abstract-interpretation headers. `dashmap` provides the
//! per-key locking a concurrent registry needs.

use std::hash::Hash;
use std::sync::atomic::{AtomicBool, Ordering};

use dashmap::DashMap;

use crate::lattice::AbstractDomain;

/// A concurrent registry of per-function summaries. Workers call
/// [`SummaryRegistry::update`] with a transform that is applied atomically
/// per key (the entry's own lock, not a global one, is held during the
/// transform). The registry tracks, process-wide, whether any update
/// happened since the driver last checked.
pub struct SummaryRegistry<Id: Eq + Hash + Clone, S: AbstractDomain> {
    summaries: DashMap<Id, S>,
    dirty: AtomicBool,
}

impl<Id: Eq + Hash + Clone, S: AbstractDomain> SummaryRegistry<Id, S> {
    pub fn new() -> Self {
        SummaryRegistry {
            summaries: DashMap::new(),
            dirty: AtomicBool::new(false),
        }
    }

    /// The current summary for `id`, or `S::top()` if none has been
    /// published yet (the interprocedural harness's convention: an
    /// as-yet-unanalyzed callee contributes no information).
    pub fn get(&self, id: &Id) -> S {
        self.summaries
            .get(id)
            .map(|entry| entry.value().clone())
            .unwrap_or_else(S::top)
    }

    /// Applies `transform` to `id`'s current summary (or `S::top()` if
    /// absent) and publishes the result. Marks the registry dirty iff the
    /// summary actually changed under `leq` in both directions.
    pub fn update(&self, id: Id, transform: impl FnOnce(&S) -> S) {
        let previous = self.get(&id);
        let next = transform(&previous);
        let changed = !next.equals(&previous);
        self.summaries.insert(id, next);
        if changed {
            self.dirty.store(true, Ordering::Release);
        }
    }

    /// Whether any summary has changed since the last
    /// [`SummaryRegistry::materialize_update`].
    pub fn has_update(&self) -> bool {
        self.dirty.load(Ordering::Acquire)
    }

    /// Clears the dirty bit. Called by the driver between interprocedural
    /// iterations, after it has observed `has_update()`.
    pub fn materialize_update(&self) {
        self.dirty.store(false, Ordering::Release);
    }

    pub fn len(&self) -> usize {
        self.summaries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.summaries.is_empty()
    }
}

impl<Id: Eq + Hash + Clone, S: AbstractDomain> Default for SummaryRegistry<Id, S> {
    fn default() -> Self {
        Self::new()
    }
}
