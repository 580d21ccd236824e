//! Method Inliner: a bottom-up, bounded, multi-caller inliner over the
//! [`crate::ir`] collaborator contract.
//!
//! Grounded on `libredex/Inliner.cpp`'s `MultiMethodInliner`: candidate map
//! construction (`MultiMethodInliner` ctor), the bottom-up DFS driver
//! (`inline_methods`/`inline_callees`), `should_inline`'s cost-based
//! decision, and the make-static post-pass
//! (`MultiMethodInliner::invoke_direct_to_static`).

pub mod cost;
pub mod legality;
pub mod mechanics;

use std::collections::{BTreeSet, HashMap, HashSet};

use crate::config::InlinerConfig;
use crate::ir::{ClassId, MethodRefId, Opcode, Program};
use crate::metrics::InlinerStats;

pub use legality::InlineFailureReason;

/// Whether the candidate map only links callers and callees that share a
/// container ("store"), or links freely across containers.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Mode {
    Intra,
    Inter,
}

/// The caller→callees and callee→callers adjacency built by
/// [`build_candidate_map`], restricted to the supplied candidate set.
#[derive(Default)]
pub struct CandidateMap {
    pub callers_of: HashMap<MethodRefId, BTreeSet<MethodRefId>>,
    pub callees_of: HashMap<MethodRefId, BTreeSet<MethodRefId>>,
}

impl CandidateMap {
    fn record_edge(&mut self, caller: MethodRefId, callee: MethodRefId) {
        self.callees_of.entry(caller).or_default().insert(callee);
        self.callers_of.entry(callee).or_default().insert(caller);
    }

    fn drop_callee(&mut self, callee: MethodRefId) {
        if let Some(callers) = self.callers_of.remove(&callee) {
            for caller in callers {
                if let Some(callees) = self.callees_of.get_mut(&caller) {
                    callees.remove(&callee);
                }
            }
        }
        self.callees_of.remove(&callee);
    }

    pub fn is_top_level_caller(&self, method: MethodRefId) -> bool {
        self.callers_of.get(&method).map(|c| c.is_empty()).unwrap_or(true)
    }

    /// A method with exactly one recorded caller.
    pub fn has_single_caller(&self, callee: MethodRefId) -> bool {
        self.callers_of.get(&callee).map(|c| c.len() == 1).unwrap_or(false)
    }

    pub fn caller_count(&self, callee: MethodRefId) -> usize {
        self.callers_of.get(&callee).map(|c| c.len()).unwrap_or(0)
    }

    /// True iff every caller of `callee` lives in the same class as `callee`.
    fn all_callers_same_class(&self, program: &Program, callee: MethodRefId) -> bool {
        let callee_class = program.method(callee).class;
        self.callers_of
            .get(&callee)
            .map(|callers| callers.iter().all(|c| program.method(*c).class == callee_class))
            .unwrap_or(true)
    }
}

/// Single pass over every instruction of every in-scope method: each
/// resolved invoke whose target is in `candidates` records a bidirectional
/// edge. In [`Mode::Intra`], any callee reached from a caller in a
/// different container is dropped entirely.
pub fn build_candidate_map(program: &Program, candidates: &HashSet<MethodRefId>, mode: Mode) -> CandidateMap {
    let mut map = CandidateMap::default();
    let mut cross_container = HashSet::new();

    for class_id in program.classes_in_scope() {
        for &caller_id in &program.class(class_id).methods.clone() {
            let caller = program.method(caller_id);
            for insn in caller.instructions() {
                if !insn.opcode.is_invoke() {
                    continue;
                }
                let Some(method_ref) = insn.method_operand() else {
                    continue;
                };
                let search = match insn.opcode {
                    Opcode::InvokeStatic => crate::ir::MethodSearch::Static,
                    Opcode::InvokeDirect => crate::ir::MethodSearch::Direct,
                    Opcode::InvokeSuper => crate::ir::MethodSearch::Virtual,
                    Opcode::InvokeInterface => crate::ir::MethodSearch::Interface,
                    _ => crate::ir::MethodSearch::Virtual,
                };
                let Some(callee_id) = program.resolve_method(method_ref, search) else {
                    continue;
                };
                if !candidates.contains(&callee_id) {
                    continue;
                }
                let caller_container = program.class(caller.class).container;
                let callee_container = program.class(program.method(callee_id).class).container;
                if mode == Mode::Intra && caller_container != callee_container {
                    cross_container.insert(callee_id);
                    continue;
                }
                map.record_edge(caller_id, callee_id);
            }
        }
    }

    for callee in cross_container {
        map.drop_callee(callee);
    }
    map
}

/// Decides whether `callee` is worth inlining at `caller`'s callsite(s),
/// given the candidate map's caller count for it.
fn should_inline(
    program: &Program,
    map: &CandidateMap,
    callee_id: MethodRefId,
    config: &InlinerConfig,
) -> bool {
    let callee = program.method(callee_id);
    let n_callers = map.caller_count(callee_id).max(1);

    if map.is_top_level_caller(callee_id) {
        // A "root-kept" callee (nothing in the candidate set calls it, but
        // it was still offered as a candidate): only worth it if policy
        // allows small-non-deletable inlining and the per-callsite cost
        // actually shrinks.
        return config.inline_small_non_deletables
            && cost::inlined_cost(callee) < cost::invoke_cost(callee, true);
    }

    if map.has_single_caller(callee_id) {
        return true;
    }

    if !config.multiple_callers {
        return false;
    }

    let mut invoke = cost::invoke_cost(callee, true) as u64;
    if !map.all_callers_same_class(program, callee_id) {
        invoke += cost::COST_INTER_DEX_SOME_CALLERS_DIFFERENT_CLASSES as u64;
    }
    let n = n_callers as u64;
    let inlined = cost::inlined_cost(callee) as u64;
    inlined * n > invoke * n + cost::method_cost(callee) as u64
}

/// Outcome of driving the inliner to completion over a candidate map.
#[derive(Default)]
pub struct InlineResult {
    /// Callees fully absorbed into every caller and safe to delete.
    pub fully_inlined: BTreeSet<MethodRefId>,
    /// Private/constructor callees that were inlined via a
    /// `CreateVMethod`-avoiding rewrite and must be promoted to static.
    pub needs_make_static: BTreeSet<MethodRefId>,
}

/// The bottom-up driver: visits every top-level caller, recursing into
/// callees before inlining them so each callee is fully resolved before
/// being embedded, with a call-stack set to break cycles introduced by
/// mutual recursion among candidates.
pub struct Inliner<'a> {
    program: &'a mut Program,
    map: CandidateMap,
    config: InlinerConfig,
    stats: &'a InlinerStats,
    visited: HashSet<MethodRefId>,
    call_stack: HashSet<MethodRefId>,
    result: InlineResult,
}

impl<'a> Inliner<'a> {
    pub fn new(program: &'a mut Program, map: CandidateMap, config: InlinerConfig, stats: &'a InlinerStats) -> Self {
        Inliner {
            program,
            map,
            config,
            stats,
            visited: HashSet::new(),
            call_stack: HashSet::new(),
            result: InlineResult::default(),
        }
    }

    pub fn run(mut self) -> InlineResult {
        let top_level: BTreeSet<MethodRefId> = self
            .map
            .callees_of
            .keys()
            .copied()
            .filter(|m| self.map.is_top_level_caller(*m))
            .collect();
        for caller in top_level {
            self.inline_into(caller);
        }
        self.result
    }

    fn inline_into(&mut self, caller_id: MethodRefId) {
        if self.visited.contains(&caller_id) || !self.call_stack.insert(caller_id) {
            return;
        }
        let callees: Vec<MethodRefId> = self
            .map
            .callees_of
            .get(&caller_id)
            .map(|s| s.iter().copied().collect())
            .unwrap_or_default();
        for callee_id in callees {
            if self.call_stack.contains(&callee_id) {
                // Recursive cycle among candidates: leave it as a plain call.
                continue;
            }
            self.inline_into(callee_id);
            self.try_inline_one(caller_id, callee_id);
        }
        self.call_stack.remove(&caller_id);
        self.visited.insert(caller_id);
    }

    fn try_inline_one(&mut self, caller_id: MethodRefId, callee_id: MethodRefId) {
        if !should_inline(self.program, &self.map, callee_id, &self.config) {
            self.stats.record_not_worth_inlining();
            return;
        }
        let caller = self.program.method(caller_id).clone();
        let callee = self.program.method(callee_id).clone();
        if let Err(reason) = legality::check_legality(self.program, &caller, &callee, &self.config) {
            self.stats.record_rejection(reason);
            return;
        }
        if needs_make_static(&callee) {
            self.result.needs_make_static.insert(callee_id);
        }
        splice_all_callsites(self.program, caller_id, callee_id);
        promote_visibility(self.program, caller_id, callee_id);
        self.stats.record_inlined();
        if self.map.has_single_caller(callee_id) || self.map.is_top_level_caller(callee_id) {
            self.result.fully_inlined.insert(callee_id);
        }
    }
}

/// Direct/constructor callees inlined across a class boundary need their
/// definition turned into a static method so the now-cross-class callsites
/// that still reference the original symbol (e.g. via reflection or a
/// not-yet-inlined caller) keep resolving.
fn needs_make_static(callee: &crate::ir::MethodDef) -> bool {
    !callee.access.static_ && (callee.access.private || callee.access.constructor)
}

/// Splices every callsite in `caller` that invokes `callee`, via
/// [`mechanics::prepare_callee_body`] and [`mechanics::splice_blocks`].
/// Operates on the linear body when no CFG is present on either side.
fn splice_all_callsites(program: &mut Program, caller_id: MethodRefId, callee_id: MethodRefId) {
    let register_base = program.method(caller_id).register_size;
    let callee = program.method(callee_id).clone();

    if program.method(caller_id).cfg.is_some() && callee.cfg.is_some() {
        let callsites = find_cfg_callsites(program, caller_id, callee_id);
        for site in callsites {
            let caller = program.method(caller_id);
            let block = caller.cfg.as_ref().unwrap().block(site.block_id);
            let invoke = &block.instructions[site.instruction_index];
            let arg_srcs = invoke.srcs.clone();
            let move_result_dest = find_move_result_dest(block, site.instruction_index);
            let next_base = program.method(caller_id).register_size;
            let (blocks, entry, returns) = mechanics::prepare_callee_body(&callee, next_base, &arg_srcs, move_result_dest);
            let caller_mut = program.method_mut(caller_id);
            let width = callee.register_size;
            caller_mut.register_size += width;
            let spliced = mechanics::splice_blocks(
                caller_mut.cfg.as_ref().unwrap(),
                &site,
                blocks,
                entry,
                returns,
                &mut fresh_block_id_counter(caller_mut),
            );
            caller_mut.cfg = Some(spliced);
        }
    } else {
        splice_linear(program, caller_id, callee_id, register_base);
    }
}

fn fresh_block_id_counter(caller: &crate::ir::MethodDef) -> u32 {
    caller
        .cfg
        .as_ref()
        .map(|c| c.blocks.keys().copied().max().unwrap_or(0) + 1)
        .unwrap_or(0)
}

fn find_move_result_dest(block: &crate::ir::Block, invoke_index: usize) -> Option<crate::ir::RegId> {
    block
        .instructions
        .get(invoke_index + 1)
        .filter(|i| i.opcode.is_move_result())
        .and_then(|i| i.dest)
}

fn find_cfg_callsites(program: &Program, caller_id: MethodRefId, callee_id: MethodRefId) -> Vec<mechanics::Callsite> {
    let caller = program.method(caller_id);
    let cfg = caller.cfg.as_ref().unwrap();
    let mut sites = Vec::new();
    for block_id in cfg.block_ids_in_order() {
        let block = cfg.block(block_id);
        for (index, insn) in block.instructions.iter().enumerate() {
            if insn.opcode.is_invoke() && insn.method_operand() == Some(callee_id) {
                sites.push(mechanics::Callsite {
                    block_id,
                    instruction_index: index,
                });
            }
        }
    }
    let _ = callee_id;
    sites
}

/// Linear-body splice (no CFG): replaces each resolved invoke (and any
/// trailing move-result) with the callee's remapped instruction stream,
/// minus its final return, followed by a move into the move-result
/// register if the callsite captured one.
fn splice_linear(program: &mut Program, caller_id: MethodRefId, callee_id: MethodRefId, register_base: u16) {
    let callee_instructions = program.method(callee_id).linear.clone();
    let callee_width = program.method(callee_id).register_size;

    let caller = program.method_mut(caller_id);
    let mut rewritten = Vec::with_capacity(caller.linear.len());
    let mut i = 0;
    while i < caller.linear.len() {
        let insn = caller.linear[i].clone();
        if insn.opcode.is_invoke() && insn.method_operand() == Some(callee_id) {
            let move_result_dest = caller
                .linear
                .get(i + 1)
                .filter(|n| n.opcode.is_move_result())
                .and_then(|n| n.dest);
            let mut body = callee_instructions.clone();
            for remapped in body.iter_mut() {
                for src in remapped.srcs.iter_mut() {
                    src.0 += register_base;
                }
                if let Some(dest) = remapped.dest.as_mut() {
                    dest.0 += register_base;
                }
            }
            let params: Vec<crate::ir::RegId> = (0..insn.srcs.len())
                .map(|k| crate::ir::RegId(register_base + k as u16))
                .collect();
            for (dest, src) in params.iter().zip(insn.srcs.iter()) {
                rewritten.push(crate::ir::Instruction {
                    address: insn.address,
                    opcode: Opcode::Move,
                    srcs: vec![*src],
                    dest: Some(*dest),
                    dest_wide: false,
                    operand: None,
                });
            }
            for body_insn in body {
                if body_insn.opcode.is_return() {
                    if let (Some(dest), Some(src)) = (move_result_dest, body_insn.srcs.first().copied()) {
                        rewritten.push(crate::ir::Instruction {
                            address: insn.address,
                            opcode: Opcode::Move,
                            srcs: vec![src],
                            dest: Some(dest),
                            dest_wide: false,
                            operand: None,
                        });
                    }
                } else {
                    rewritten.push(body_insn);
                }
            }
            i += if move_result_dest.is_some() { 2 } else { 1 };
        } else {
            rewritten.push(insn);
            i += 1;
        }
    }
    caller.linear = rewritten;
    caller.register_size += callee_width;
}

/// Visibility adjustment: promotes every field, method, and type the callee
/// referenced to public, since precise least-visible-legal computation is
/// left as a refinement.
fn promote_visibility(program: &mut Program, caller_id: MethodRefId, callee_id: MethodRefId) {
    let _ = caller_id;
    let referenced: Vec<(Option<crate::ir::FieldRefId>, Option<MethodRefId>)> = program
        .method(callee_id)
        .instructions()
        .iter()
        .map(|i| (i.field_operand(), i.method_operand()))
        .collect();
    for (field, method) in referenced {
        if let Some(field_id) = field {
            if let Some(fd) = program.fields.get_mut(&field_id) {
                fd.access.public = true;
                fd.access.private = false;
                fd.access.protected = false;
            }
        }
        if let Some(method_id) = method {
            if let Some(md) = program.methods.get_mut(&method_id) {
                md.access.public = true;
                md.access.private = false;
                md.access.protected = false;
            }
        }
    }
}

/// Post-pass: promotes every method recorded in `to_promote` to static in a
/// canonical, signature-independent order (by interned id, since promotion
/// itself mutates signatures), then rewrites every `invoke-direct` to a
/// promoted method into `invoke-static`.
pub fn make_static_post_pass(program: &mut Program, to_promote: &BTreeSet<MethodRefId>, stats: &InlinerStats) {
    for &method_id in to_promote {
        let method = program.method_mut(method_id);
        method.access.static_ = true;
        method.access.private = false;
        method.is_virtual = false;
        stats.record_made_static();
    }

    for class_id in program.classes_in_scope() {
        for &method_id in &program.class(class_id).methods.clone() {
            let method = program.method_mut(method_id);
            for insn in method.linear.iter_mut() {
                if insn.opcode == Opcode::InvokeDirect {
                    if let Some(target) = insn.method_operand() {
                        if to_promote.contains(&target) {
                            insn.opcode = Opcode::InvokeStatic;
                        }
                    }
                }
            }
            if let Some(cfg) = method.cfg.as_mut() {
                for block in cfg.blocks.values_mut() {
                    for insn in block.instructions.iter_mut() {
                        if insn.opcode == Opcode::InvokeDirect {
                            if let Some(target) = insn.method_operand() {
                                if to_promote.contains(&target) {
                                    insn.opcode = Opcode::InvokeStatic;
                                }
                            }
                        }
                    }
                }
            }
        }
    }
}

/// Whole-scope entry point: every concrete, non-external method with a body
/// is a candidate callee. Builds the candidate map in `mode`, drives the
/// bottom-up inliner, then runs the make-static post-pass over whatever
/// callees it flagged.
pub fn run(program: &mut Program, config: &InlinerConfig) -> InlinerStats {
    run_with_mode(program, config, Mode::Inter)
}

/// Like [`run`], but with an explicit container mode (`Intra`/`Inter`)
/// rather than the `Inter` default.
pub fn run_with_mode(program: &mut Program, config: &InlinerConfig, mode: Mode) -> InlinerStats {
    let stats = InlinerStats::new();
    let candidates: HashSet<MethodRefId> = program
        .methods
        .iter()
        .filter(|(_, m)| m.is_concrete && !m.is_external)
        .map(|(id, _)| *id)
        .collect();
    let map = build_candidate_map(program, &candidates, mode);
    let inliner = Inliner::new(program, map, config.clone(), &stats);
    let result = inliner.run();
    make_static_post_pass(program, &result.needs_make_static, &stats);
    stats
}
