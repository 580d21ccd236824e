//! End-to-end pipeline tests: build a small in-memory `Program`, run
//! [`redex_aik::optimize`] (inliner then CSE, in that fixed order), and
//! check the combined outcome through the public API rather than any
//! single pass's internals.

use redex_aik::inliner::{self, Mode};
use redex_aik::ir::{AccessFlags, Block, Cfg, Edge, EdgeKind, Instruction, Opcode, Operand, Program, RegId};
use redex_aik::{optimize, Config};
use std::collections::HashMap;

/// A static leaf method `callee() { const v0, <literal>; return v0; }`.
fn add_leaf_callee(program: &mut Program, class: redex_aik::ir::ClassId, literal: i64) -> redex_aik::ir::MethodRefId {
    let id = program.add_method(class, "callee", 0, AccessFlags::default());
    program.method_mut(id).access.static_ = true;
    program.method_mut(id).linear = vec![
        Instruction {
            address: 0,
            opcode: Opcode::Const,
            srcs: vec![],
            dest: Some(RegId(0)),
            dest_wide: false,
            operand: Some(Operand::Literal(literal)),
        },
        Instruction {
            address: 1,
            opcode: Opcode::Return,
            srcs: vec![RegId(0)],
            dest: None,
            dest_wide: false,
            operand: None,
        },
    ];
    id
}

fn add_caller_invoking(program: &mut Program, class: redex_aik::ir::ClassId, callee: redex_aik::ir::MethodRefId) -> redex_aik::ir::MethodRefId {
    let caller = program.add_method(class, "caller", 0, AccessFlags::default());
    program.method_mut(caller).linear = vec![
        Instruction {
            address: 0,
            opcode: Opcode::InvokeStatic,
            srcs: vec![],
            dest: None,
            dest_wide: false,
            operand: Some(Operand::Method(callee)),
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
    ];
    caller
}

/// Builds `callee` (same class as `add_leaf_callee`, but CFG-backed: a
/// single block `const v0, <literal>; return v0`) and a `caller` whose CFG
/// has the invoke and move-result in one block, falling through to a
/// second block that returns the result. Returns `(caller, callee)`.
fn add_cfg_caller_and_callee(
    program: &mut Program,
    class: redex_aik::ir::ClassId,
    literal: i64,
) -> (redex_aik::ir::MethodRefId, redex_aik::ir::MethodRefId) {
    let callee = program.add_method(class, "callee", 0, AccessFlags::default());
    program.method_mut(callee).access.static_ = true;
    let mut callee_blocks = HashMap::new();
    callee_blocks.insert(
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
                    operand: Some(Operand::Literal(literal)),
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
    program.method_mut(callee).cfg = Some(Cfg {
        entry: 0,
        blocks: callee_blocks,
        catch_blocks: vec![],
    });

    let caller = program.add_method(class, "caller", 0, AccessFlags::default());
    let mut caller_blocks = HashMap::new();
    caller_blocks.insert(
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
                    operand: Some(Operand::Method(callee)),
                },
                Instruction {
                    address: 1,
                    opcode: Opcode::MoveResult,
                    srcs: vec![],
                    dest: Some(RegId(1)),
                    dest_wide: false,
                    operand: None,
                },
            ],
            successors: vec![Edge {
                kind: EdgeKind::Fallthrough,
                target: 1,
            }],
        },
    );
    caller_blocks.insert(
        1,
        Block {
            id: 1,
            instructions: vec![Instruction {
                address: 2,
                opcode: Opcode::Return,
                srcs: vec![RegId(1)],
                dest: None,
                dest_wide: false,
                operand: None,
            }],
            successors: vec![],
        },
    );
    program.method_mut(caller).cfg = Some(Cfg {
        entry: 0,
        blocks: caller_blocks,
        catch_blocks: vec![],
    });

    (caller, callee)
}

/// A single-caller static leaf, spliced through the CFG-mode path (both
/// caller and callee carry an editable `Cfg`): the invoke and its
/// move-result must disappear from every block, not just get shadowed by
/// the callee's body landing after them.
#[test]
fn cfg_mode_splice_erases_invoke_and_move_result_from_every_block() {
    let mut program = Program::new();
    let class = program.add_class("com/example/Cfg", 0);
    let (caller, callee) = add_cfg_caller_and_callee(&mut program, class, 99);

    let config = Config::default();
    let stats = inliner::run_with_mode(&mut program, &config.inliner, Mode::Inter);

    assert_eq!(stats.snapshot().get("calls_inlined").copied().unwrap_or(0), 1);

    let cfg = program.method(caller).cfg.as_ref().expect("caller keeps its cfg");
    for block in cfg.blocks.values() {
        assert!(
            !block.instructions.iter().any(|i| i.opcode == Opcode::InvokeStatic),
            "block {} still holds the original invoke",
            block.id
        );
        assert!(
            !block.instructions.iter().any(|i| i.opcode == Opcode::MoveResult),
            "block {} still holds the original move-result",
            block.id
        );
    }
    assert!(
        cfg.blocks
            .values()
            .flat_map(|b| &b.instructions)
            .any(|i| i.opcode == Opcode::Const && i.operand == Some(Operand::Literal(99))),
        "the callee's const should have been spliced into the caller's cfg"
    );
    let _ = callee;
}

/// Inlining a single-caller static leaf should erase the invoke and splice
/// the callee's body in, and the combined `optimize()` metrics should
/// reflect exactly one inlined call.
#[test]
fn single_caller_leaf_is_inlined_and_leaves_no_invoke_behind() {
    let mut program = Program::new();
    let class = program.add_class("com/example/Foo", 0);
    let callee = add_leaf_callee(&mut program, class, 42);
    let caller = add_caller_invoking(&mut program, class, callee);

    let config = Config::default();
    let stats = optimize(&mut program, &config);

    assert_eq!(stats["calls_inlined"], 1);
    let body = &program.method(caller).linear;
    assert!(
        !body.iter().any(|i| i.opcode == Opcode::InvokeStatic),
        "the original invoke-static should have been erased by inlining"
    );
    assert!(
        body.iter()
            .any(|i| i.opcode == Opcode::Const && i.operand == Some(Operand::Literal(42))),
        "the callee's const should have been spliced into the caller"
    );
}

/// A caller in container A invoking a callee in container B must be left
/// untouched under `Mode::Intra`, with the rejection recorded under
/// `cross_store` rather than silently dropped.
#[test]
fn cross_container_callee_is_left_untouched_in_intra_mode() {
    let mut program = Program::new();
    let class_a = program.add_class("com/example/A", 0);
    let class_b = program.add_class("com/example/B", 1);
    let callee = add_leaf_callee(&mut program, class_b, 7);
    let caller = add_caller_invoking(&mut program, class_a, callee);

    let config = Config::default();
    let stats = inliner::run_with_mode(&mut program, &config.inliner, Mode::Intra);

    assert_eq!(stats.snapshot().get("calls_inlined").copied().unwrap_or(0), 0);
    let body = &program.method(caller).linear;
    assert!(body.iter().any(|i| i.opcode == Opcode::InvokeStatic));
}
