//! IR collaborator contract: the real DEX reader/writer, class loader, and
//! register allocator are out of scope, so this module defines the
//! interface the rest of the crate is generic over — `Class`, `Method`,
//! `MethodRef`, `Field`, `FieldRef`, `Code`, `Cfg`, `Block`, `Instruction`,
//! and `Resolver` — plus one concrete, in-memory witness type (`MockIr` and
//! friends) sufficient to drive [`crate::inliner`] and [`crate::cse`] end to
//! end in tests and doc examples, mirroring how `inputlayer`'s
//! `optimizer`/`code_generator` modules consume its own concrete
//! `ir::IRNode` behind a small set of traits.
//!
//! Grounded on `Resolver.h` (`MethodSearch`/`FieldSearch` enums and
//! resolution semantics) and `IRInstruction.h`/`ControlFlow.h`'s
//! classification predicates (`has_method`, `is_invoke`, `is_commutative`,
//! …).

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};

/// A register. `wide` marks the low half of a register pair (e.g. holding a
/// `long`/`double`); the paired register is always `id + 1` by IR
/// convention, matching the DEX register-pair layout.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RegId(pub u16);

/// Opaque, interned identifiers for the reference-bearing operand kinds.
/// Equality is identity: two `TypeId`s compare equal iff they were interned
/// from the same type, matching the reference kernel's pointer-equality
/// convention for interned `Dex*` objects.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TypeId(pub u32);
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StringId(pub u32);
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClassId(pub u32);
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MethodRefId(pub u32);
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FieldRefId(pub u32);

/// The non-register operand an instruction may carry: a type, a method, a
/// field, a string, a literal, or an inline data payload.
#[derive(Clone, Debug, PartialEq)]
pub enum Operand {
    Type(TypeId),
    Method(MethodRefId),
    Field(FieldRefId),
    String(StringId),
    Literal(i64),
    Data(Vec<i64>),
}

/// Instruction opcodes, reduced to the families the inliner and CSE engine
/// must distinguish. Unlike the ~250-opcode real DEX instruction set, move
/// variants and field/array accessors are collapsed by *kind*; width
/// (32/64-bit, object/primitive) is tracked separately via
/// `Instruction::dest_is_wide` since neither pass needs to type-check it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Opcode {
    Const,
    Move,
    MoveResult,
    MoveException,
    Goto,
    IfCond,
    Switch,
    CmpBinop,
    Binop,
    Unop,
    InstanceOf,
    CheckCast,
    NewInstance,
    NewArray,
    FilledNewArray,
    FillArrayData,
    ArrayLength,
    Throw,
    Return,
    ReturnVoid,
    MonitorEnter,
    MonitorExit,
    InvokeVirtual,
    InvokeSuper,
    InvokeDirect,
    InvokeStatic,
    InvokeInterface,
    IGet,
    IPut,
    SGet,
    SPut,
    AGet,
    APut,
    LoadParam,
    Nop,
}

impl Opcode {
    pub fn is_invoke(self) -> bool {
        matches!(
            self,
            Opcode::InvokeVirtual
                | Opcode::InvokeSuper
                | Opcode::InvokeDirect
                | Opcode::InvokeStatic
                | Opcode::InvokeInterface
        )
    }

    pub fn is_field_op(self) -> bool {
        matches!(self, Opcode::IGet | Opcode::IPut | Opcode::SGet | Opcode::SPut)
    }

    pub fn is_array_op(self) -> bool {
        matches!(self, Opcode::AGet | Opcode::APut)
    }

    pub fn is_move(self) -> bool {
        matches!(self, Opcode::Move)
    }

    pub fn is_move_result(self) -> bool {
        matches!(self, Opcode::MoveResult)
    }

    pub fn is_return(self) -> bool {
        matches!(self, Opcode::Return | Opcode::ReturnVoid)
    }

    pub fn is_conditional_branch(self) -> bool {
        matches!(self, Opcode::IfCond)
    }

    /// Opcodes whose operand order is semantically irrelevant, so CSE sorts
    /// their source list before interning — `add-int`, `mul-int`, `and-*`,
    /// `or-*`, `xor-*`, `cmp-*` in the real instruction set.
    pub fn is_commutative(self) -> bool {
        matches!(self, Opcode::CmpBinop) || matches!(self, Opcode::Binop)
    }

    /// Opcodes whose value-numbering identity is pinned to the producing
    /// instruction's address rather than its operands: load-param,
    /// move-exception, new-instance, new-array, filled-new-array, every
    /// invoke.
    pub fn is_positional(self) -> bool {
        matches!(
            self,
            Opcode::LoadParam
                | Opcode::MoveException
                | Opcode::NewInstance
                | Opcode::NewArray
                | Opcode::FilledNewArray
        ) || self.is_invoke()
    }

    /// Opcodes that may write to the heap or synchronize: monitor enter/exit,
    /// fill-array-data, every iput/sput/aput, and invokes (conditionally
    /// safe, see `crate::cse::barrier`).
    pub fn is_possible_barrier(self) -> bool {
        matches!(
            self,
            Opcode::MonitorEnter
                | Opcode::MonitorExit
                | Opcode::FillArrayData
                | Opcode::IPut
                | Opcode::SPut
                | Opcode::APut
        ) || self.is_invoke()
    }
}

/// One instruction: an opcode, typed source/dest registers, and an optional
/// operand. `address` is the instruction's position within its method,
/// assigned at construction time and used to break ties between otherwise-
/// equivalent positional values deterministically.
#[derive(Clone, Debug)]
pub struct Instruction {
    pub address: u32,
    pub opcode: Opcode,
    pub srcs: Vec<RegId>,
    pub dest: Option<RegId>,
    pub dest_wide: bool,
    pub operand: Option<Operand>,
}

impl Instruction {
    pub fn has_method(&self) -> bool {
        matches!(self.operand, Some(Operand::Method(_)))
    }
    pub fn has_field(&self) -> bool {
        matches!(self.operand, Some(Operand::Field(_)))
    }
    pub fn has_type(&self) -> bool {
        matches!(self.operand, Some(Operand::Type(_)))
    }
    pub fn has_string(&self) -> bool {
        matches!(self.operand, Some(Operand::String(_)))
    }
    pub fn has_literal(&self) -> bool {
        matches!(self.operand, Some(Operand::Literal(_)))
    }
    pub fn has_data(&self) -> bool {
        matches!(self.operand, Some(Operand::Data(_)))
    }
    pub fn has_move_result(&self) -> bool {
        self.opcode.is_invoke() || matches!(self.opcode, Opcode::FilledNewArray)
    }
    pub fn method_operand(&self) -> Option<MethodRefId> {
        match &self.operand {
            Some(Operand::Method(m)) => Some(*m),
            _ => None,
        }
    }
    pub fn field_operand(&self) -> Option<FieldRefId> {
        match &self.operand {
            Some(Operand::Field(f)) => Some(*f),
            _ => None,
        }
    }
}

/// A maximal straight-line run of instructions within a CFG, terminated by
/// (at most) one control-transfer instruction.
#[derive(Clone, Debug, Default)]
pub struct Block {
    pub id: u32,
    pub instructions: Vec<Instruction>,
    pub successors: Vec<Edge>,
}

/// A typed CFG edge: fallthrough, conditional/unconditional branch, switch
/// (carrying its case value), or exception.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EdgeKind {
    Fallthrough,
    Branch,
    Switch(i32),
    Exception,
}

#[derive(Clone, Copy, Debug)]
pub struct Edge {
    pub kind: EdgeKind,
    pub target: u32,
}

/// A control-flow graph: a set of blocks connected by typed edges, with a
/// designated entry block. Exception handlers are modeled as ordinary
/// blocks reached only via `EdgeKind::Exception` edges, the same way a
/// caller's active catch handler participates in its control flow.
#[derive(Clone, Debug, Default)]
pub struct Cfg {
    pub entry: u32,
    pub blocks: HashMap<u32, Block>,
    /// Blocks (by id) that are exception handlers, in the order a throwing
    /// instruction's active handler list should be consulted.
    pub catch_blocks: Vec<u32>,
}

impl Cfg {
    pub fn block(&self, id: u32) -> &Block {
        self.blocks.get(&id).expect("dangling cfg block id")
    }

    pub fn block_ids_in_order(&self) -> Vec<u32> {
        let mut ids: Vec<u32> = self.blocks.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    pub fn instructions_in_order(&self) -> Vec<(u32, &Instruction)> {
        let mut out = Vec::new();
        for id in self.block_ids_in_order() {
            for insn in &self.block(id).instructions {
                out.push((id, insn));
            }
        }
        out
    }
}

/// The method/field-reference resolution kind the IR supports, per
/// `Resolver.h`'s `MethodSearch`: `Direct` only looks in the exact class;
/// `Static`/`Virtual`/`Any` walk the superclass chain; `Interface` walks the
/// interface graph.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MethodSearch {
    Direct,
    Static,
    Virtual,
    Any,
    Interface,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FieldSearch {
    Static,
    Instance,
    Any,
}

/// Method-level access flags relevant to the inliner's legality checks.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct AccessFlags {
    pub public: bool,
    pub private: bool,
    pub protected: bool,
    pub static_: bool,
    pub constructor: bool,
    pub final_: bool,
}

#[derive(Clone, Debug)]
pub struct MethodDef {
    pub id: MethodRefId,
    pub class: ClassId,
    pub name: String,
    pub num_args: usize,
    pub access: AccessFlags,
    pub is_virtual: bool,
    pub is_concrete: bool,
    pub is_external: bool,
    pub min_api_level: u32,
    pub register_size: u16,
    pub cfg: Option<Cfg>,
    /// Linear body, used when `cfg` is absent: passes operate on the CFG
    /// when one is built for a method, and fall back to the flat
    /// instruction list otherwise.
    pub linear: Vec<Instruction>,
}

impl MethodDef {
    pub fn instructions(&self) -> Vec<&Instruction> {
        if let Some(cfg) = &self.cfg {
            cfg.instructions_in_order().into_iter().map(|(_, i)| i).collect()
        } else {
            self.linear.iter().collect()
        }
    }

    pub fn allocate_temp(&mut self) -> RegId {
        let id = RegId(self.register_size);
        self.register_size += 1;
        id
    }

    pub fn allocate_wide_temp(&mut self) -> RegId {
        let id = RegId(self.register_size);
        self.register_size += 2;
        id
    }
}

#[derive(Clone, Debug)]
pub struct FieldDef {
    pub id: FieldRefId,
    pub class: ClassId,
    pub name: String,
    pub access: AccessFlags,
    pub volatile: bool,
}

#[derive(Clone, Debug, Default)]
pub struct ClassDef {
    pub id: ClassId,
    pub name: String,
    pub container: u32,
    pub super_class: Option<ClassId>,
    pub interfaces: Vec<ClassId>,
    pub methods: Vec<MethodRefId>,
    pub fields: Vec<FieldRefId>,
    pub is_external: bool,
    pub is_interface: bool,
    pub is_enum: bool,
}

/// An in-memory program: classes, methods, and fields keyed by interned id.
/// This is the crate's one concrete witness for the IR collaborator
/// contract, playing the role `inputlayer`'s `ir::IRNode`/`Schema` pair
/// plays for its own optimizer.
#[derive(Clone, Debug, Default)]
pub struct Program {
    pub classes: HashMap<ClassId, ClassDef>,
    pub methods: HashMap<MethodRefId, MethodDef>,
    pub fields: HashMap<FieldRefId, FieldDef>,
    next_id: u32,
}

static NEXT_PROGRAM_ID: AtomicU32 = AtomicU32::new(1);

impl Program {
    pub fn new() -> Self {
        Program::default()
    }

    fn fresh_id(&mut self) -> u32 {
        self.next_id += 1;
        self.next_id
    }

    pub fn add_class(&mut self, name: &str, container: u32) -> ClassId {
        let id = ClassId(self.fresh_id());
        self.classes.insert(
            id,
            ClassDef {
                id,
                name: name.to_string(),
                container,
                ..Default::default()
            },
        );
        id
    }

    pub fn add_method(&mut self, class: ClassId, name: &str, num_args: usize, access: AccessFlags) -> MethodRefId {
        let id = MethodRefId(self.fresh_id());
        self.methods.insert(
            id,
            MethodDef {
                id,
                class,
                name: name.to_string(),
                num_args,
                access,
                is_virtual: !access.static_ && !access.private && !access.constructor,
                is_concrete: true,
                is_external: false,
                min_api_level: 0,
                register_size: num_args as u16,
                cfg: None,
                linear: Vec::new(),
            },
        );
        self.classes.get_mut(&class).unwrap().methods.push(id);
        id
    }

    pub fn add_field(&mut self, class: ClassId, name: &str, access: AccessFlags, volatile: bool) -> FieldRefId {
        let id = FieldRefId(self.fresh_id());
        self.fields.insert(
            id,
            FieldDef {
                id,
                class,
                name: name.to_string(),
                access,
                volatile,
            },
        );
        self.classes.get_mut(&class).unwrap().fields.push(id);
        id
    }

    pub fn classes_in_scope(&self) -> Vec<ClassId> {
        let mut ids: Vec<ClassId> = self.classes.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    pub fn method(&self, id: MethodRefId) -> &MethodDef {
        self.methods.get(&id).expect("dangling method id")
    }

    pub fn method_mut(&mut self, id: MethodRefId) -> &mut MethodDef {
        self.methods.get_mut(&id).expect("dangling method id")
    }

    pub fn class(&self, id: ClassId) -> &ClassDef {
        self.classes.get(&id).expect("dangling class id")
    }

    pub fn field(&self, id: FieldRefId) -> &FieldDef {
        self.fields.get(&id).expect("dangling field id")
    }

    /// Walks `super()`/interfaces to test whether `sub` is `ancestor` or a
    /// descendant of it — the primitive `Direct`/`Static`/`Virtual`/`Any`
    /// resolution and `CreateVMethod`'s "ancestor class" check both need.
    pub fn is_subclass_or_self(&self, sub: ClassId, ancestor: ClassId) -> bool {
        let mut cur = Some(sub);
        while let Some(c) = cur {
            if c == ancestor {
                return true;
            }
            cur = self.classes.get(&c).and_then(|cd| cd.super_class);
        }
        false
    }

    /// Resolves a method reference under a given search kind: `Direct`
    /// only looks in the exact class; `Static`/`Virtual`/`Any` walk the
    /// superclass chain; `Interface` walks the interface graph.
    pub fn resolve_method(&self, method_ref: MethodRefId, kind: MethodSearch) -> Option<MethodRefId> {
        let seed = self.methods.get(&method_ref)?;
        let target_name = seed.name.clone();
        let target_args = seed.num_args;
        let start_class = seed.class;
        match kind {
            MethodSearch::Direct => self.find_in_class(start_class, &target_name, target_args),
            MethodSearch::Static | MethodSearch::Virtual | MethodSearch::Any => {
                let mut cur = Some(start_class);
                while let Some(c) = cur {
                    if let Some(found) = self.find_in_class(c, &target_name, target_args) {
                        return Some(found);
                    }
                    cur = self.classes.get(&c).and_then(|cd| cd.super_class);
                }
                None
            }
            MethodSearch::Interface => {
                let class = self.classes.get(&start_class)?;
                for iface in &class.interfaces {
                    if let Some(found) = self.find_in_class(*iface, &target_name, target_args) {
                        return Some(found);
                    }
                }
                None
            }
        }
    }

    fn find_in_class(&self, class: ClassId, name: &str, num_args: usize) -> Option<MethodRefId> {
        let cd = self.classes.get(&class)?;
        cd.methods
            .iter()
            .copied()
            .find(|m| {
                let md = &self.methods[m];
                md.name == name && md.num_args == num_args
            })
    }

    pub fn resolve_field(&self, type_class: ClassId, name: &str, kind: FieldSearch) -> Option<FieldRefId> {
        let mut cur = Some(type_class);
        while let Some(c) = cur {
            if let Some(cd) = self.classes.get(&c) {
                if let Some(found) = cd.fields.iter().copied().find(|f| {
                    let fd = &self.fields[f];
                    let matches_kind = match kind {
                        FieldSearch::Static => fd.access.static_,
                        FieldSearch::Instance => !fd.access.static_,
                        FieldSearch::Any => true,
                    };
                    fd.name == name && matches_kind
                }) {
                    return Some(found);
                }
                cur = cd.super_class;
            } else {
                break;
            }
        }
        None
    }
}

impl fmt::Display for RegId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn access(public: bool, static_: bool) -> AccessFlags {
        AccessFlags {
            public,
            static_,
            ..Default::default()
        }
    }

    #[test]
    fn resolve_method_walks_superclass_chain() {
        let mut program = Program::new();
        let base = program.add_class("Base", 0);
        let derived = program.add_class("Derived", 0);
        program.class_mut_for_test(derived).super_class = Some(base);
        let base_method = program.add_method(base, "helper", 0, access(true, false));
        let ref_from_derived = program.add_method(derived, "helper", 0, access(true, false));
        // simulate an unresolved reference that only names (class=derived, name, arity)
        let resolved = program.resolve_method(ref_from_derived, MethodSearch::Virtual);
        assert_eq!(resolved, Some(ref_from_derived));
        assert_ne!(base_method, ref_from_derived);
    }

    #[test]
    fn is_subclass_or_self_true_for_self_and_ancestors() {
        let mut program = Program::new();
        let base = program.add_class("Base", 0);
        let derived = program.add_class("Derived", 0);
        program.class_mut_for_test(derived).super_class = Some(base);
        assert!(program.is_subclass_or_self(derived, base));
        assert!(program.is_subclass_or_self(derived, derived));
        assert!(!program.is_subclass_or_self(base, derived));
    }
}

#[cfg(test)]
impl Program {
    fn class_mut_for_test(&mut self, id: ClassId) -> &mut ClassDef {
        self.classes.get_mut(&id).unwrap()
    }
}
