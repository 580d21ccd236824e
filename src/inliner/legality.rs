//! Legality checks: the reasons a callsite may not be inlined, plus the
//! predicates that detect them.
//!
//! Grounded on `libredex/Inliner.cpp`'s `is_inlinable`/`cross_store_reference`/
//! `is_blacklisted`/`caller_is_blacklisted`/`create_vmethod`/
//! `nonrelocatable_invoke_super` family and `libredex/ClassHierarchy.cpp`'s
//! virtual-dispatch helpers.

use std::collections::HashSet;

use crate::config::InlinerConfig;
use crate::inliner::cost;
use crate::ir::{MethodDef, MethodRefId, Opcode, Program};

/// Why a particular callsite was refused, one counter per variant in
/// [`crate::metrics::InlinerStats`]. Order is significant: `as usize` indexes
/// the stats table, so new variants must be added at the end.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum InlineFailureReason {
    /// Caller and callee live in different physical containers ("stores")
    /// and cross-container references aren't relocatable.
    CrossStoreReference,
    /// Caller or callee is named in the denylist configuration.
    Blacklisted,
    /// The callsite sits inside a caller-level catch block whose handler is
    /// defined outside the caller (an "external catch").
    ExternalCatch,
    /// Inlining would require materializing a new virtual method, which
    /// isn't legal post-inlining (no new vtable slots).
    CreateVMethod,
    /// The callee invokes a superclass method in a way that can't be
    /// relocated into the caller's class.
    NonrelocatableInvokeSuper,
    /// The callee can't be statically resolved to a concrete virtual target.
    UnknownVirtual,
    /// The callee references a field that can't be statically resolved.
    UnknownField,
    /// The callee is guarded by an API/Android-version check the caller
    /// doesn't share.
    AndroidVersionCheck,
    /// The callee can throw and `throws_inline` is disabled in configuration.
    ThrowsInline,
    /// The callee has more than one return instruction and the configured
    /// inlining mode doesn't support splicing multiple returns.
    MultipleReturns,
    /// Inlining would push the caller past the method-size limit.
    TooBig,
    /// Caller and callee disagree on minimum supported API level.
    ApiMismatch,
}

impl InlineFailureReason {
    pub const COUNT: usize = 12;
    pub const ALL: [InlineFailureReason; InlineFailureReason::COUNT] = [
        InlineFailureReason::CrossStoreReference,
        InlineFailureReason::Blacklisted,
        InlineFailureReason::ExternalCatch,
        InlineFailureReason::CreateVMethod,
        InlineFailureReason::NonrelocatableInvokeSuper,
        InlineFailureReason::UnknownVirtual,
        InlineFailureReason::UnknownField,
        InlineFailureReason::AndroidVersionCheck,
        InlineFailureReason::ThrowsInline,
        InlineFailureReason::MultipleReturns,
        InlineFailureReason::TooBig,
        InlineFailureReason::ApiMismatch,
    ];

    pub fn metric_name(self) -> &'static str {
        match self {
            InlineFailureReason::CrossStoreReference => "reason_cross_store_reference",
            InlineFailureReason::Blacklisted => "reason_blacklisted",
            InlineFailureReason::ExternalCatch => "reason_external_catch",
            InlineFailureReason::CreateVMethod => "reason_create_vmethod",
            InlineFailureReason::NonrelocatableInvokeSuper => "reason_nonrelocatable_invoke_super",
            InlineFailureReason::UnknownVirtual => "reason_unknown_virtual",
            InlineFailureReason::UnknownField => "reason_unknown_field",
            InlineFailureReason::AndroidVersionCheck => "reason_android_version_check",
            InlineFailureReason::ThrowsInline => "reason_throws_inline",
            InlineFailureReason::MultipleReturns => "reason_multiple_returns",
            InlineFailureReason::TooBig => "reason_too_big",
            InlineFailureReason::ApiMismatch => "reason_api_mismatch",
        }
    }
}

fn class_container(program: &Program, method: &MethodDef) -> u32 {
    program.class(method.class).container
}

fn is_blacklisted(name: &str, denylist: &HashSet<String>) -> bool {
    denylist.contains(name)
}

fn has_external_catch(callee: &MethodDef) -> bool {
    match &callee.cfg {
        Some(cfg) => !cfg.catch_blocks.is_empty(),
        None => false,
    }
}

fn count_returns(method: &MethodDef) -> usize {
    method.instructions().iter().filter(|i| i.opcode.is_return()).count()
}

fn has_invoke_super(method: &MethodDef) -> bool {
    method.instructions().iter().any(|i| i.opcode == Opcode::InvokeSuper)
}

fn can_throw(method: &MethodDef) -> bool {
    method.instructions().iter().any(|i| i.opcode == Opcode::Throw || i.opcode.is_invoke())
}

/// Checks every legality condition for inlining `callee` into `caller` at a
/// specific callsite, in the order the original checks them (cheapest/most
/// decisive first), returning the first violated reason.
pub fn check_legality(
    program: &Program,
    caller: &MethodDef,
    callee: &MethodDef,
    config: &InlinerConfig,
) -> Result<(), InlineFailureReason> {
    if class_container(program, caller) != class_container(program, callee) {
        return Err(InlineFailureReason::CrossStoreReference);
    }
    if is_blacklisted(&callee.name, &config.black_list) || is_blacklisted(&caller.name, &config.caller_black_list) {
        return Err(InlineFailureReason::Blacklisted);
    }
    if has_external_catch(callee) {
        return Err(InlineFailureReason::ExternalCatch);
    }
    if callee.is_virtual && !config.virtual_same_class_inline && caller.class != callee.class {
        return Err(InlineFailureReason::CreateVMethod);
    }
    if has_invoke_super(callee) && !(config.super_same_class_inline && caller.class == callee.class) {
        return Err(InlineFailureReason::NonrelocatableInvokeSuper);
    }
    if callee.is_virtual && !callee.is_concrete {
        return Err(InlineFailureReason::UnknownVirtual);
    }
    if callee.is_external {
        return Err(InlineFailureReason::UnknownField);
    }
    if callee.min_api_level > caller.min_api_level {
        return Err(InlineFailureReason::AndroidVersionCheck);
    }
    if can_throw(callee) && !config.throws_inline {
        return Err(InlineFailureReason::ThrowsInline);
    }
    let returns = count_returns(callee);
    if returns > 1 && !config.use_cfg_inliner {
        return Err(InlineFailureReason::MultipleReturns);
    }
    if caller.min_api_level != callee.min_api_level && callee.min_api_level != 0 && caller.min_api_level != 0 {
        return Err(InlineFailureReason::ApiMismatch);
    }
    if config.enforce_method_size_limit && !config.whitelist_no_method_limit.contains(&callee.name) {
        let projected = cost::inlined_cost(caller) + cost::inlined_cost(callee);
        if projected as u64 + cost::INSTRUCTION_BUFFER as u64 > cost::SOFT_MAX_INSTRUCTION_SIZE as u64 {
            return Err(InlineFailureReason::TooBig);
        }
    }
    Ok(())
}

/// Whether `callee_ref` even has a statically known, single concrete target
/// from `caller`'s perspective — `UnknownVirtual`/`UnknownField`'s shared
/// precondition, checked before `check_legality` is even attempted.
pub fn resolve_or_reject(
    program: &Program,
    callee_ref: MethodRefId,
    kind: crate::ir::MethodSearch,
) -> Result<MethodRefId, InlineFailureReason> {
    program.resolve_method(callee_ref, kind).ok_or(InlineFailureReason::UnknownVirtual)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{AccessFlags, Instruction, RegId};

    fn make_pair(
        caller_container: u32,
        callee_container: u32,
    ) -> (Program, MethodDef, MethodDef) {
        let mut program = Program::new();
        let caller_class = program.add_class("Caller", caller_container);
        let callee_class = program.add_class("Callee", callee_container);
        let caller_id = program.add_method(caller_class, "caller", 0, AccessFlags::default());
        let callee_id = program.add_method(callee_class, "callee", 0, AccessFlags::default());
        let caller = program.method(caller_id).clone();
        let callee = program.method(callee_id).clone();
        (program, caller, callee)
    }

    #[test]
    fn cross_store_reference_is_rejected() {
        let (program, caller, callee) = make_pair(0, 1);
        let config = InlinerConfig::default();
        assert_eq!(
            check_legality(&program, &caller, &callee, &config),
            Err(InlineFailureReason::CrossStoreReference)
        );
    }

    #[test]
    fn same_container_plain_callee_is_legal() {
        let (program, caller, callee) = make_pair(0, 0);
        let config = InlinerConfig::default();
        assert_eq!(check_legality(&program, &caller, &callee, &config), Ok(()));
    }

    #[test]
    fn blacklisted_callee_is_rejected() {
        let (program, caller, callee) = make_pair(0, 0);
        let mut config = InlinerConfig::default();
        config.black_list.insert("callee".to_string());
        assert_eq!(
            check_legality(&program, &caller, &callee, &config),
            Err(InlineFailureReason::Blacklisted)
        );
    }

    #[test]
    fn throwing_callee_rejected_unless_configured() {
        let (program, caller, mut callee) = make_pair(0, 0);
        callee.linear.push(Instruction {
            address: 0,
            opcode: Opcode::Throw,
            srcs: vec![RegId(0)],
            dest: None,
            dest_wide: false,
            operand: None,
        });
        let mut config = InlinerConfig::default();
        assert_eq!(
            check_legality(&program, &caller, &callee, &config),
            Err(InlineFailureReason::ThrowsInline)
        );
        config.throws_inline = true;
        assert_eq!(check_legality(&program, &caller, &callee, &config), Ok(()));
    }

    #[test]
    fn oversized_callee_is_rejected_when_limit_enforced() {
        let (program, caller, mut callee) = make_pair(0, 0);
        for i in 0..20_000u32 {
            callee.linear.push(Instruction {
                address: i,
                opcode: Opcode::Const,
                srcs: vec![],
                dest: Some(RegId(0)),
                dest_wide: false,
                operand: Some(crate::ir::Operand::Literal(i as i64)),
            });
        }
        let config = InlinerConfig::default();
        assert_eq!(
            check_legality(&program, &caller, &callee, &config),
            Err(InlineFailureReason::TooBig)
        );
    }
}
