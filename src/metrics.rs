//! Metrics interface: integer counters each pass reports to an aggregator,
//! safe to update concurrently from the per-method worker pool.
//! `snapshot()` yields a `HashMap<&'static str, u64>` for easy `serde_json`
//! serialization, the same shape used elsewhere in this crate for
//! query-execution stats.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::inliner::InlineFailureReason;

/// Counters for the method inliner: `calls_inlined`, `caller_too_large`,
/// `multi_ret`, `cross_store`, `results_captured`, plus one distinct
/// counter per [`InlineFailureReason`] variant.
#[derive(Default)]
pub struct InlinerStats {
    pub calls_inlined: AtomicU64,
    pub calls_not_inlinable: AtomicU64,
    pub caller_too_large: AtomicU64,
    pub multi_ret: AtomicU64,
    pub cross_store: AtomicU64,
    pub results_captured: AtomicU64,
    pub methods_made_static: AtomicU64,
    reasons: [AtomicU64; InlineFailureReason::COUNT],
}

impl InlinerStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_inlined(&self) {
        self.calls_inlined.fetch_add(1, Ordering::Relaxed);
    }

    /// The callee failed `should_inline`'s cost-based test: distinct from
    /// the named legality reasons, which this method never touches.
    pub fn record_not_worth_inlining(&self) {
        self.calls_not_inlinable.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_rejection(&self, reason: InlineFailureReason) {
        self.reasons[reason as usize].fetch_add(1, Ordering::Relaxed);
        match reason {
            InlineFailureReason::TooBig => {
                self.caller_too_large.fetch_add(1, Ordering::Relaxed);
            }
            InlineFailureReason::MultipleReturns => {
                self.multi_ret.fetch_add(1, Ordering::Relaxed);
            }
            InlineFailureReason::CrossStoreReference => {
                self.cross_store.fetch_add(1, Ordering::Relaxed);
            }
            _ => {}
        }
    }

    pub fn record_result_captured(&self) {
        self.results_captured.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_made_static(&self) {
        self.methods_made_static.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> HashMap<&'static str, u64> {
        let mut map = HashMap::new();
        map.insert("calls_inlined", self.calls_inlined.load(Ordering::Relaxed));
        map.insert("calls_not_inlinable", self.calls_not_inlinable.load(Ordering::Relaxed));
        map.insert("caller_too_large", self.caller_too_large.load(Ordering::Relaxed));
        map.insert("multi_ret", self.multi_ret.load(Ordering::Relaxed));
        map.insert("cross_store", self.cross_store.load(Ordering::Relaxed));
        map.insert("results_captured", self.results_captured.load(Ordering::Relaxed));
        map.insert("methods_made_static", self.methods_made_static.load(Ordering::Relaxed));
        for reason in InlineFailureReason::ALL {
            map.insert(reason.metric_name(), self.reasons[reason as usize].load(Ordering::Relaxed));
        }
        map
    }
}

/// Counters for the CSE pass: it has no user-visible toggles, but the
/// metrics interface still applies.
#[derive(Default)]
pub struct CseStats {
    pub instructions_eliminated: AtomicU64,
    pub methods_analyzed: AtomicU64,
}

impl CseStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_eliminated(&self, count: u64) {
        self.instructions_eliminated.fetch_add(count, Ordering::Relaxed);
    }

    pub fn record_method_analyzed(&self) {
        self.methods_analyzed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> HashMap<&'static str, u64> {
        let mut map = HashMap::new();
        map.insert(
            "instructions_eliminated",
            self.instructions_eliminated.load(Ordering::Relaxed),
        );
        map.insert("methods_analyzed", self.methods_analyzed.load(Ordering::Relaxed));
        map
    }
}
