//! Common Subexpression Elimination: a forward monotonic fixpoint over a
//! method's CFG followed by a rewrite pass that forwards redundant
//! recomputations through a temporary register.
//!
//! Grounded on `opt/cse/CommonSubexpressionElimination.cpp`'s
//! `CommonSubexpressionElimination::patch` (the forwarding-pairs rewrite)
//! and its `Analyzer` (the per-instruction transfer function this module's
//! [`CseTransformer`] mirrors), reusing [`crate::fixpoint`]'s engine instead
//! of a bespoke fixpoint loop.

pub mod barrier;
pub mod value;

use std::cell::RefCell;
use std::collections::HashMap;

use crate::domains::constant::Constant;
use crate::domains::environment::{Environment, EnvironmentExt};
use crate::domains::reduced_product::{NoReduction, ReducedProduct3};
use crate::fixpoint::{Graph, MonotonicFixpointIterator, Transformer};
use crate::ir::{Cfg, Instruction, MethodDef, MethodRefId, Opcode, Program, RegId};
use crate::lattice::{AbstractDomain, AbstractDomainScaffolding};
use crate::metrics::CseStats;

use barrier::{classify, SharedState};
use value::{IrValue, Payload, ValueId, ValueTable};

type DefEnv = Environment<ValueId, AbstractDomainScaffolding<Constant<u32>>>;
type RefEnv = Environment<RegId, AbstractDomainScaffolding<Constant<ValueId>>>;

/// The reduced product of the three environments CSE tracks: barrier-
/// sensitive def env, barrier-insensitive def env, ref env. No
/// cross-component refinement is needed, so the reduction is the identity.
pub type CseState = ReducedProduct3<DefEnv, DefEnv, RefEnv, NoReduction>;

/// A CFG block-id graph adapter so [`crate::fixpoint::MonotonicFixpointIterator`]
/// can drive the analysis directly over [`Cfg`].
struct CfgGraph<'a>(&'a Cfg);

impl<'a> Graph for CfgGraph<'a> {
    type Node = u32;
    type Edge = (u32, u32);

    fn entry(&self) -> u32 {
        self.0.entry
    }

    fn predecessors(&self, node: &u32) -> Vec<(u32, u32)> {
        let mut out = Vec::new();
        for (&id, block) in &self.0.blocks {
            if block.successors.iter().any(|e| e.target == *node) {
                out.push((id, *node));
            }
        }
        out
    }

    fn successors(&self, node: &u32) -> Vec<(u32, u32)> {
        self.0.block(*node).successors.iter().map(|e| (*node, e.target)).collect()
    }

    fn source(&self, edge: &(u32, u32)) -> u32 {
        edge.0
    }

    fn target(&self, edge: &(u32, u32)) -> u32 {
        edge.1
    }
}

/// A `(defining instruction, consuming instruction)` pair the rewrite pass
/// will bridge with a temporary register.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
struct ForwardingPair {
    definer_block: u32,
    definer_index: usize,
    consumer_block: u32,
    consumer_index: usize,
}

/// Mutable bookkeeping shared across every `analyze_node` call for one
/// method: interior-mutable because [`Transformer::analyze_node`] takes
/// `&self`, and owned outside the transformer so it survives the iterator
/// that borrows it.
#[derive(Default)]
struct Bookkeeping {
    values: RefCell<ValueTable>,
    is_barrier_sensitive: RefCell<HashMap<ValueId, bool>>,
    first_definer: RefCell<HashMap<ValueId, (u32, usize)>>,
    forwarding: RefCell<Vec<ForwardingPair>>,
}

/// Per-instruction barrier flags (the possible-barrier set), precomputed
/// once per method before the fixpoint runs so the transformer itself
/// never needs a `&Program`.
type BarrierMap = HashMap<(u32, usize), bool>;

fn precompute_barriers(cfg: &Cfg, program: &Program, shared: &SharedState, method_barrier_free: bool) -> BarrierMap {
    let mut map = HashMap::new();
    if method_barrier_free {
        return map;
    }
    for block_id in cfg.block_ids_in_order() {
        let block = cfg.block(block_id);
        for (index, insn) in block.instructions.iter().enumerate() {
            if classify(insn, program, shared).is_some() {
                map.insert((block_id, index), true);
            }
        }
    }
    map
}

fn is_heap_read(opcode: Opcode) -> bool {
    matches!(opcode, Opcode::IGet | Opcode::SGet | Opcode::AGet)
}

struct CseTransformer<'a> {
    cfg: &'a Cfg,
    barriers: &'a BarrierMap,
    book: &'a Bookkeeping,
}

impl<'a> CseTransformer<'a> {
    fn ref_value(&self, state: &CseState, reg: RegId) -> Option<ValueId> {
        let binding = state.third().get_binding(&reg);
        binding.get().ok().map(|c| *c.get())
    }

    fn bind_ref(&self, state: &mut CseState, reg: RegId, value: ValueId) {
        state
            .third_mut()
            .set(reg, AbstractDomainScaffolding::from_value(Constant::new(value)));
    }

    fn def_env_mut<'s>(&self, state: &'s mut CseState, barrier_sensitive: bool) -> &'s mut DefEnv {
        if barrier_sensitive {
            state.first_mut()
        } else {
            state.second_mut()
        }
    }

    fn has_definer(&self, state: &CseState, barrier_sensitive: bool, value: ValueId) -> bool {
        let env = if barrier_sensitive { state.first() } else { state.second() };
        !env.get_binding(&value).is_top()
    }

    fn record_definer(&self, state: &mut CseState, barrier_sensitive: bool, value: ValueId, address: u32) {
        if !self.has_definer(state, barrier_sensitive, value) {
            self.def_env_mut(state, barrier_sensitive)
                .set(value, AbstractDomainScaffolding::from_value(Constant::new(address)));
        }
    }

    /// Clears the barrier-sensitive def env and resets every
    /// barrier-sensitive binding in the ref env to Top.
    fn clear_barrier_sensitive(&self, state: &mut CseState) {
        state.first_mut().set_to_top();
        let sensitive = self.book.is_barrier_sensitive.borrow();
        let bound: Vec<(RegId, ValueId)> = state
            .third()
            .bindings()
            .into_iter()
            .filter_map(|(reg, binding)| binding.get().ok().map(|c| (reg, *c.get())))
            .collect();
        for (reg, value_id) in bound {
            if *sensitive.get(&value_id).unwrap_or(&false) {
                state.third_mut().set(reg, AbstractDomainScaffolding::top());
            }
        }
    }

    fn analyze_block(&self, block_id: u32, state: &mut CseState) {
        let block = self.cfg.block(block_id);
        let mut pending_result: Option<ValueId> = None;
        for (index, insn) in block.instructions.iter().enumerate() {
            let mut source_ids = Vec::with_capacity(insn.srcs.len());
            for &src in &insn.srcs {
                let id = match self.ref_value(state, src) {
                    Some(id) => id,
                    None => {
                        let manufactured = IrValue::pre_state_source(src, insn.address);
                        let id = self.book.values.borrow_mut().intern(manufactured);
                        self.bind_ref(state, src, id);
                        id
                    }
                };
                source_ids.push(id);
            }

            if insn.opcode.is_move() {
                if let (Some(dest), Some(&src_id)) = (insn.dest, source_ids.first()) {
                    self.bind_ref(state, dest, src_id);
                }
            } else if insn.opcode.is_move_result() {
                if let (Some(dest), Some(id)) = (insn.dest, pending_result) {
                    self.bind_ref(state, dest, id);
                }
            } else if insn.dest.is_some() || insn.has_move_result() {
                let payload = operand_payload(insn);
                let value = IrValue::new(insn, source_ids.clone(), payload);
                let value_id = self.book.values.borrow_mut().intern(value);

                let barrier_sensitive = is_heap_read(insn.opcode)
                    || source_ids
                        .iter()
                        .any(|id| *self.book.is_barrier_sensitive.borrow().get(id).unwrap_or(&false));
                self.book.is_barrier_sensitive.borrow_mut().insert(value_id, barrier_sensitive);

                let is_first_definer = {
                    let mut definers = self.book.first_definer.borrow_mut();
                    match definers.get(&value_id).copied() {
                        Some(existing) => {
                            self.book.forwarding.borrow_mut().push(ForwardingPair {
                                definer_block: existing.0,
                                definer_index: existing.1,
                                consumer_block: block_id,
                                consumer_index: index,
                            });
                            false
                        }
                        None => {
                            definers.insert(value_id, (block_id, index));
                            true
                        }
                    }
                };
                let _ = is_first_definer;
                self.record_definer(state, barrier_sensitive, value_id, insn.address);

                if insn.has_move_result() {
                    pending_result = Some(value_id);
                } else if let Some(dest) = insn.dest {
                    self.bind_ref(state, dest, value_id);
                }
            }

            if *self.barriers.get(&(block_id, index)).unwrap_or(&false) {
                self.clear_barrier_sensitive(state);
            }
        }
    }
}

fn operand_payload(insn: &Instruction) -> Payload {
    match &insn.operand {
        Some(crate::ir::Operand::Literal(v)) => Payload::Literal(*v),
        Some(crate::ir::Operand::Type(t)) => Payload::Type(t.0),
        Some(crate::ir::Operand::Field(f)) => Payload::Field(f.0),
        Some(crate::ir::Operand::Method(m)) => Payload::Method(m.0),
        Some(crate::ir::Operand::String(s)) => Payload::String(s.0),
        Some(crate::ir::Operand::Data(_)) | None => {
            if insn.opcode.is_positional() {
                Payload::Positional(insn.address)
            } else {
                Payload::None
            }
        }
    }
}

impl<'a> Transformer<CfgGraph<'a>, CseState> for CseTransformer<'a> {
    fn analyze_node(&self, node: &u32, current_state: &mut CseState) {
        self.analyze_block(*node, current_state);
    }

    fn analyze_edge(&self, _edge: &(u32, u32), exit_state_at_source: &CseState) -> CseState {
        exit_state_at_source.clone()
    }
}

/// The forwarding-pairs rewrite: for each unique definer, allocate a
/// temporary, insert a move from the definer's
/// destination into it right after the definer, and a move from the
/// temporary into each consumer's destination right after the consumer.
/// Mutates `method`'s CFG in place; returns the count of forwarded
/// recomputations (for [`CseStats`]).
fn apply_rewrite(method: &mut MethodDef, pairs: &[ForwardingPair]) -> u64 {
    if pairs.is_empty() {
        return 0;
    }
    let mut by_definer: HashMap<(u32, usize), Vec<(u32, usize)>> = HashMap::new();
    for pair in pairs {
        by_definer
            .entry((pair.definer_block, pair.definer_index))
            .or_default()
            .push((pair.consumer_block, pair.consumer_index));
    }

    let mut eliminated = 0u64;
    let mut definer_inserts: HashMap<u32, Vec<(usize, RegId, RegId)>> = HashMap::new();
    let mut consumer_inserts: HashMap<u32, Vec<(usize, RegId, RegId)>> = HashMap::new();

    for ((def_block, def_index), consumers) in &by_definer {
        let definer_dest = {
            let cfg = method.cfg.as_ref().expect("CSE rewrite requires an editable CFG");
            cfg.block(*def_block)
                .instructions
                .get(*def_index)
                .and_then(|i| i.dest)
                .or_else(|| {
                    cfg.block(*def_block)
                        .instructions
                        .get(def_index + 1)
                        .filter(|i| i.opcode.is_move_result())
                        .and_then(|i| i.dest)
                })
        };
        let Some(definer_dest) = definer_dest else {
            continue;
        };
        let temp = method.allocate_temp();
        definer_inserts.entry(*def_block).or_default().push((*def_index, definer_dest, temp));
        let cfg = method.cfg.as_ref().unwrap();
        for (consumer_block, consumer_index) in consumers {
            let consumer_dest = cfg.block(*consumer_block).instructions.get(*consumer_index).and_then(|i| i.dest);
            if let Some(consumer_dest) = consumer_dest {
                consumer_inserts
                    .entry(*consumer_block)
                    .or_default()
                    .push((*consumer_index, temp, consumer_dest));
                eliminated += 1;
            }
        }
    }

    let cfg = method.cfg.as_mut().unwrap();
    for (block_id, mut inserts) in definer_inserts {
        inserts.sort_by(|a, b| b.0.cmp(&a.0));
        let block = cfg.blocks.get_mut(&block_id).unwrap();
        for (index, src, dest) in inserts {
            let insert_at = if block.instructions[index].has_move_result() {
                index + 2
            } else {
                index + 1
            };
            let address = block.instructions[index].address;
            block.instructions.insert(
                insert_at.min(block.instructions.len()),
                Instruction {
                    address,
                    opcode: Opcode::Move,
                    srcs: vec![src],
                    dest: Some(dest),
                    dest_wide: false,
                    operand: None,
                },
            );
        }
    }
    for (block_id, mut inserts) in consumer_inserts {
        inserts.sort_by(|a, b| b.0.cmp(&a.0));
        let block = cfg.blocks.get_mut(&block_id).unwrap();
        for (index, src, dest) in inserts {
            let safe_index = index.min(block.instructions.len().saturating_sub(1));
            let address = block.instructions[safe_index].address;
            block.instructions.insert(
                (index + 1).min(block.instructions.len()),
                Instruction {
                    address,
                    opcode: Opcode::Move,
                    srcs: vec![src],
                    dest: Some(dest),
                    dest_wide: false,
                    operand: None,
                },
            );
        }
    }

    eliminated
}

/// Runs the forward fixpoint for one method with a CFG and returns the
/// forwarding pairs it found, without touching `method` itself — split out
/// from [`analyze_and_rewrite_method`] so the per-method worker pool
/// (rayon drives the per-method worker pool) can run every method's
/// read-only analysis concurrently, leaving only the (necessarily serial,
/// since it mutates `Program`) rewrite application on the driving thread.
fn analyze_method(cfg: &Cfg, program: &Program, shared: &SharedState, method_barrier_free: bool) -> Vec<ForwardingPair> {
    let barriers = precompute_barriers(cfg, program, shared, method_barrier_free);
    let book = Bookkeeping::default();
    let graph = CfgGraph(cfg);
    let transformer = CseTransformer {
        cfg,
        barriers: &barriers,
        book: &book,
    };
    let mut iterator = MonotonicFixpointIterator::new(&graph, transformer);
    iterator.run(CseState::top());
    book.forwarding.into_inner()
}

/// Runs the analysis and rewrite for one method with a CFG, given the
/// process-wide [`SharedState`] and whether this method is entirely
/// barrier-free per the precomputed method-barriers table: an invoke whose
/// summary is entirely barrier-irrelevant is not itself a barrier.
pub fn analyze_and_rewrite_method(
    program: &Program,
    method: &mut MethodDef,
    shared: &SharedState,
    method_barrier_free: bool,
    stats: &CseStats,
) {
    let Some(cfg) = method.cfg.clone() else {
        stats.record_method_analyzed();
        return;
    };
    let pairs = analyze_method(&cfg, program, shared, method_barrier_free);
    stats.record_method_analyzed();
    let eliminated = apply_rewrite(method, &pairs);
    stats.record_eliminated(eliminated);
}

/// Runs CSE over every in-scope method with a CFG: the whole-scope entry
/// point. Each method's own possible-barrier scan still runs —
/// `method_barriers` only lets an invoke of a barrier-free callee be
/// downgraded from "unsafe invoke" to "not a barrier" at its callsite.
///
/// The per-method fixpoint (read-only against a `Program` snapshot) runs
/// across a `rayon` worker pool; only the rewrite application, which needs
/// `&mut` access to each method, happens back on the driving thread.
pub fn run_cse(program: &mut Program) -> CseStats {
    use rayon::prelude::*;

    let shared = SharedState::new();
    let method_barriers = barrier::compute_method_barriers(program, &shared);
    let stats = CseStats::new();
    let snapshot = program.clone();
    let method_ids: Vec<MethodRefId> = program.methods.keys().copied().collect();

    let analyzed: Vec<(MethodRefId, Vec<ForwardingPair>)> = method_ids
        .par_iter()
        .filter_map(|&method_id| {
            let cfg = snapshot.methods.get(&method_id)?.cfg.clone()?;
            let method_has_no_barriers = !*method_barriers.get(&method_id).unwrap_or(&true);
            let pairs = analyze_method(&cfg, &snapshot, &shared, method_has_no_barriers);
            Some((method_id, pairs))
        })
        .collect();

    for _ in &method_ids {
        stats.record_method_analyzed();
    }
    for (method_id, pairs) in analyzed {
        if let Some(method) = program.methods.get_mut(&method_id) {
            let eliminated = apply_rewrite(method, &pairs);
            stats.record_eliminated(eliminated);
        }
    }
    stats
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{AccessFlags, Block, Edge, EdgeKind, Operand};

    fn cfg_method(program: &mut Program) -> crate::ir::MethodRefId {
        let class = program.add_class("C", 0);
        let id = program.add_method(class, "m", 2, AccessFlags::default());
        let method = program.method_mut(id);
        // r0, r1 are params. Body: v2 = r0 + r1; v3 = r0 + r1; return v2 + v3
        let mut cfg = Cfg {
            entry: 0,
            ..Default::default()
        };
        cfg.blocks.insert(
            0,
            Block {
                id: 0,
                instructions: vec![
                    Instruction {
                        address: 0,
                        opcode: Opcode::Binop,
                        srcs: vec![RegId(0), RegId(1)],
                        dest: Some(RegId(2)),
                        dest_wide: false,
                        operand: Some(Operand::Literal(0)),
                    },
                    Instruction {
                        address: 1,
                        opcode: Opcode::Binop,
                        srcs: vec![RegId(0), RegId(1)],
                        dest: Some(RegId(3)),
                        dest_wide: false,
                        operand: Some(Operand::Literal(0)),
                    },
                    Instruction {
                        address: 2,
                        opcode: Opcode::Binop,
                        srcs: vec![RegId(2), RegId(3)],
                        dest: Some(RegId(4)),
                        dest_wide: false,
                        operand: Some(Operand::Literal(0)),
                    },
                    Instruction {
                        address: 3,
                        opcode: Opcode::Return,
                        srcs: vec![RegId(4)],
                        dest: None,
                        dest_wide: false,
                        operand: None,
                    },
                ],
                successors: vec![],
            },
        );
        let _ = Edge {
            kind: EdgeKind::Fallthrough,
            target: 0,
        };
        method.cfg = Some(cfg);
        method.register_size = 4;
        id
    }

    #[test]
    fn redundant_binop_is_forwarded_through_a_temp() {
        let mut program = Program::new();
        let method_id = cfg_method(&mut program);
        let shared = SharedState::new();
        let stats = CseStats::new();
        let snapshot = program.clone();
        let method = program.method_mut(method_id);
        analyze_and_rewrite_method(&snapshot, method, &shared, true, &stats);

        // The second Binop (index 1) recomputes the same value as the
        // first; forwarding should have fired exactly once.
        assert_eq!(stats.snapshot()["instructions_eliminated"], 1);
        let cfg = method.cfg.as_ref().unwrap();
        let block0 = cfg.block(0);
        // A move into a fresh temp should appear right after the definer,
        // and a move out of that temp right after the consumer.
        assert!(block0.instructions.iter().any(|i| i.opcode == Opcode::Move));
    }

    #[test]
    fn barrier_between_defs_prevents_forwarding() {
        let mut program = Program::new();
        let class = program.add_class("C", 0);
        let id = program.add_method(class, "m", 1, AccessFlags::default());
        let field = program.add_field(class, "f", AccessFlags::default(), true);
        let method = program.method_mut(id);
        let mut cfg = Cfg {
            entry: 0,
            ..Default::default()
        };
        cfg.blocks.insert(
            0,
            Block {
                id: 0,
                instructions: vec![
                    Instruction {
                        address: 0,
                        opcode: Opcode::IGet,
                        srcs: vec![RegId(0)],
                        dest: None,
                        dest_wide: false,
                        operand: Some(Operand::Field(field)),
                    },
                    Instruction {
                        address: 1,
                        opcode: Opcode::MoveResult,
                        srcs: vec![],
                        dest: Some(RegId(1)),
                        dest_wide: false,
                        operand: None,
                    },
                    Instruction {
                        address: 2,
                        opcode: Opcode::IPut,
                        srcs: vec![RegId(1), RegId(0)],
                        dest: None,
                        dest_wide: false,
                        operand: Some(Operand::Field(field)),
                    },
                    Instruction {
                        address: 3,
                        opcode: Opcode::IGet,
                        srcs: vec![RegId(0)],
                        dest: None,
                        dest_wide: false,
                        operand: Some(Operand::Field(field)),
                    },
                    Instruction {
                        address: 4,
                        opcode: Opcode::MoveResult,
                        srcs: vec![],
                        dest: Some(RegId(2)),
                        dest_wide: false,
                        operand: None,
                    },
                    Instruction {
                        address: 5,
                        opcode: Opcode::Return,
                        srcs: vec![RegId(2)],
                        dest: None,
                        dest_wide: false,
                        operand: None,
                    },
                ],
                successors: vec![],
            },
        );
        method.cfg = Some(cfg);
        method.register_size = 3;

        let shared = SharedState::new();
        let stats = CseStats::new();
        let snapshot = program.clone();
        let method = program.method_mut(id);
        analyze_and_rewrite_method(&snapshot, method, &shared, false, &stats);
        // The iput is a barrier (volatile field), so the two iget reads of
        // the same field must not be forwarded into each other.
        assert_eq!(stats.snapshot()["instructions_eliminated"], 0);
    }
}
