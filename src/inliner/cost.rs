//! The inliner's cost model: estimates the code-unit size of a method body
//! and the overhead of calling it, used by [`super::should_inline`] and by
//! the `TooBig` legality check.
//!
//! Grounded on `libredex/Inliner.cpp`'s anonymous-namespace cost constants
//! (`COST_METHOD`, `COST_METHOD_ARG`, `COST_INVOKE_WITH_RESULT`,
//! `COST_INVOKE_WITHOUT_RESULT`, `COST_INTER_DEX_SOME_CALLERS_DIFFERENT_CLASSES`)
//! and `get_inlined_cost`'s per-opcode surcharge schedule; the two size
//! limits come from the same file's `HARD_MAX_INSTRUCTION_SIZE` /
//! `SOFT_MAX_INSTRUCTION_SIZE` / `INSTRUCTION_BUFFER`.

use crate::ir::{Instruction, MethodDef, Opcode};

/// Overhead of having a method and its metadata at all.
pub const COST_METHOD: u32 = 32;
/// Overhead of each extra argument beyond 3 for methods with many arguments.
pub const COST_METHOD_ARG: u32 = 6;
/// Typical overhead of calling a method without a result.
pub const COST_INVOKE_WITHOUT_RESULT: u32 = 3;
/// Typical overhead of calling a method with a result.
pub const COST_INVOKE_WITH_RESULT: u32 = 5;
/// Surcharge when a callee's callers don't all live in the callee's class
/// (worse cross-dex-ref minimization).
pub const COST_INTER_DEX_SOME_CALLERS_DIFFERENT_CLASSES: u32 = 2;

/// This is the maximum size of method Dex bytecode can encode: the
/// instruction table is indexed by a 32-bit unsigned integer.
pub const HARD_MAX_INSTRUCTION_SIZE: u64 = 1u64 << 32;

/// Some ART versions (5.0.0 - 5.0.2) fail to verify a method if it's too
/// large; the verifier rounds up to the next power of two and doesn't
/// support anything bigger than 16 code units shifted, i.e. `1 << 15`.
pub const SOFT_MAX_INSTRUCTION_SIZE: u32 = 1 << 15;
/// Buffer reserved for lowering overhead on top of the soft limit.
pub const INSTRUCTION_BUFFER: u32 = 1 << 12;

fn register_extras(num_srcs: usize) -> u32 {
    if num_srcs > 3 {
        ((num_srcs - 3) as u32) * 2
    } else {
        0
    }
}

fn literal_surcharge(value: i64) -> u32 {
    let magnitude = value.unsigned_abs();
    if magnitude < (1 << 8) {
        1
    } else if magnitude < (1 << 16) {
        2
    } else if magnitude < (1 << 32) {
        3
    } else {
        4
    }
}

/// The cost, in code units, of a single instruction within an inlined body.
/// Internal bookkeeping, moves, and returns cost nothing (they disappear or
/// become a move-pair during splicing); other instructions cost a baseline
/// of 1 plus surcharges for extra source registers, move-exception's catch
/// overhead, reference-bearing operands, non-fallthrough gotos, and
/// switches.
pub fn instruction_cost(insn: &Instruction) -> u32 {
    match insn.opcode {
        Opcode::Move | Opcode::MoveResult | Opcode::Return | Opcode::ReturnVoid | Opcode::Nop | Opcode::LoadParam => 0,
        _ => {
            let mut cost = 1 + register_extras(insn.srcs.len());
            if insn.opcode == Opcode::MoveException {
                cost += 8;
            }
            if insn.has_method() || insn.has_field() || insn.has_type() || insn.has_string() {
                cost += 2;
            }
            if let Some(crate::ir::Operand::Literal(value)) = &insn.operand {
                cost += literal_surcharge(*value);
            }
            if insn.opcode == Opcode::Goto {
                cost += 1;
            }
            if insn.opcode == Opcode::Switch {
                let successors = insn.srcs.len().max(1) as u32;
                cost += 4 + 3 * successors;
            }
            cost
        }
    }
}

/// Total inlined cost of a method's body: the sum of its instructions' costs.
pub fn inlined_cost(method: &MethodDef) -> u32 {
    method.instructions().iter().map(|insn| instruction_cost(insn)).sum()
}

/// The overhead of a callsite if it remains a plain invoke: a fixed
/// with-result/without-result base plus a register-count surcharge mirroring
/// `instruction_cost`'s own register surcharge (an invoke pays for its own
/// argument registers the same way any other many-source instruction does).
pub fn invoke_cost(callee: &MethodDef, has_move_result: bool) -> u32 {
    let base = if has_move_result {
        COST_INVOKE_WITH_RESULT
    } else {
        COST_INVOKE_WITHOUT_RESULT
    };
    base + register_extras(callee.num_args)
}

/// `COST_METHOD` plus a per-argument-beyond-three surcharge, used to decide
/// whether fully inlining and deleting a callee is worthwhile.
pub fn method_cost(callee: &MethodDef) -> u32 {
    let extra_args = callee.num_args.saturating_sub(3) as u32;
    COST_METHOD + COST_METHOD_ARG * extra_args
}
