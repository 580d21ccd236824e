//! # redex_aik
//!
//! An abstract-interpretation kernel for DEX bytecode optimization passes,
//! plus two passes built on top of it: a method inliner and a
//! common-subexpression-elimination pass.
//!
//! ## Pipeline
//!
//! ```text
//! Program (classes/methods/fields, CFG or linear body per method)
//!     |
//!     +-- [Abstract Interpretation Kernel]
//!     |       lattice    -> AbstractDomain / AbstractValue / scaffolding
//!     |       domains    -> constant, interval, powerset, hashed_set, ...
//!     |       patricia   -> persistent tree-backed maps/sets
//!     |       wto        -> weak topological ordering
//!     |       fixpoint   -> MonotonicFixpointIterator over a Graph
//!     |       interproc  -> call-graph-level fixpoint + summary registry
//!     |
//!     +-- [Method Inliner]   inliner::run / inliner::Inliner
//!     |       candidate map -> should-inline cost model -> legality battery
//!     |       -> CFG/linear splicing -> make-static post-pass
//!     |
//!     +-- [CSE]              cse::run_cse
//!             barrier classification -> forward fixpoint value numbering
//!             -> forwarding-pairs rewrite
//! ```
//!
//! Every pass reports its outcome through [`metrics`]; process-wide
//! behavior (worker-pool size, inliner thresholds, CSE toggles) is read
//! through [`config::Config`].

pub mod config;
pub mod cse;
pub mod domains;
pub mod error;
pub mod fixpoint;
pub mod inliner;
pub mod interproc;
pub mod ir;
pub mod lattice;
pub mod metrics;
pub mod patricia;
pub mod registry;
pub mod wto;

pub use config::Config;
pub use error::{DomainKind, InvalidAbstractValue};
pub use ir::Program;
pub use lattice::{AbstractDomain, AbstractDomainScaffolding, AbstractValue};
pub use metrics::{CseStats, InlinerStats};

/// Runs the method inliner followed by CSE over every in-scope method in
/// `program`, in that fixed order: the inliner first (so CSE sees inlined
/// bodies and can eliminate redundancy the inlining itself exposed), then
/// CSE.
///
/// Returns the combined metrics snapshot both passes accumulated, keyed by
/// the same counter names each pass's own `snapshot()` uses.
pub fn optimize(program: &mut Program, config: &Config) -> std::collections::HashMap<&'static str, u64> {
    let inliner_stats = inliner::run(program, &config.inliner);
    let cse_stats = cse::run_cse(program);

    let mut combined = inliner_stats.snapshot();
    combined.extend(cse_stats.snapshot());
    combined
}
