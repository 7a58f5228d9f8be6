//! May-alias analysis over pointer-typed locations and raw memory access
//! intrinsics (`peek`/`poke`/`peekw`/`pokew`/`volatile_*`).
//!
//! The IL has no address-taken locals, so the only aliasing surface is
//! explicit pointer arithmetic and intrinsic memory access; this analysis
//! is deliberately coarse (one equivalence class per base expression kind)
//! rather than attempting field-sensitive points-to sets. Every accessed
//! address is classified as a literal constant, a plain variable, an array
//! element, a pointer target, or unknown.

use std::collections::BTreeMap;

use crate::ir::function::Function;
use crate::ir::instruction::Opcode;
use crate::ir::types::IlType;
use crate::ir::value::Value;

/// An equivalence class of memory accesses that may refer to overlapping
/// storage. Two accesses in different classes are guaranteed disjoint;
/// two accesses in the same class may (not must) overlap.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum AliasClass {
    /// A constant address, e.g. `peek(0xD020)`: aliases only other accesses
    /// to the same literal address.
    Constant(i64),
    /// An address that is a named, non-array, non-pointer variable's own
    /// storage: aliases only other accesses to the same variable.
    Variable(String),
    /// An address derived from a named array variable: aliases only other
    /// accesses into the same array, regardless of index (indices aren't
    /// tracked, so two elements of the same array are never proven
    /// disjoint).
    ArrayElement(String),
    /// An address reached by dereferencing a named pointer-typed variable:
    /// conservatively aliases everything, since the pointer's target isn't
    /// known at this point in the analysis.
    PointerTarget(String),
    /// An address computed from an expression with no named base (e.g. a
    /// register with no variable/array/pointer provenance): conservatively
    /// aliases every other non-constant access.
    Unknown,
}

pub struct AliasResult {
    /// Per-instruction alias class, for every memory-accessing instruction.
    pub classes: BTreeMap<crate::common::types::InstrId, AliasClass>,
    /// True if any store's target may alias the function's own code, i.e.
    /// the program may be self-modifying.
    pub self_modifying: bool,
}

fn memory_intrinsics(opcode: &Opcode) -> Option<(&str, &[Value])> {
    match opcode {
        Opcode::Intrinsic { name, args, .. }
            if matches!(name.as_str(), "peek" | "poke" | "peekw" | "pokew" | "volatile_read" | "volatile_write") =>
        {
            Some((name.as_str(), args.as_slice()))
        }
        _ => None,
    }
}

/// The declared type of variable `base` within `function`, read off the
/// first `StoreVar`/`LoadVar`/`Phi` that mentions it (this IL has no
/// separate per-function symbol table, so the type lives on the
/// instructions themselves).
fn variable_type(function: &Function, base: &str) -> Option<IlType> {
    for block in function.blocks_in_order() {
        for instr in &block.instructions {
            match &instr.opcode {
                Opcode::StoreVar { var, ty, .. } | Opcode::LoadVar { var, ty } | Opcode::Phi { var, ty, .. }
                    if var.base == base =>
                {
                    return Some(ty.clone());
                }
                _ => {}
            }
        }
    }
    None
}

fn classify_address(address: &Value, function: &Function) -> AliasClass {
    match address {
        Value::Const(c) => AliasClass::Constant(c.value),
        Value::Var(v) => match variable_type(function, &v.base) {
            Some(IlType::Array(..)) => AliasClass::ArrayElement(v.base.clone()),
            Some(IlType::Pointer(..)) => AliasClass::PointerTarget(v.base.clone()),
            _ => AliasClass::Variable(v.base.clone()),
        },
        Value::Reg(r) => match &r.ty {
            IlType::Array(..) => AliasClass::ArrayElement(format!("%{}", r.id.0)),
            IlType::Pointer(..) => AliasClass::PointerTarget(format!("%{}", r.id.0)),
            _ => AliasClass::Unknown,
        },
    }
}

/// A self-modifying write: a store whose literal target address falls
/// within the program's own code image. The mid-end has no concept of a
/// code image's address range, so this is conservative: any store through
/// an address that isn't a single known literal (`Unknown`, or a pointer
/// dereference that could target anything) is flagged, since it cannot be
/// proven safe.
pub fn analyze(function: &Function) -> AliasResult {
    let mut classes = BTreeMap::new();
    let mut self_modifying = false;

    for block in function.blocks_in_order() {
        for instr in &block.instructions {
            if let Some((name, args)) = memory_intrinsics(&instr.opcode) {
                let address = args.first();
                let class = address.map(|a| classify_address(a, function)).unwrap_or(AliasClass::Unknown);

                let is_write = matches!(name, "poke" | "pokew" | "volatile_write");
                if is_write && matches!(class, AliasClass::Unknown | AliasClass::PointerTarget(_)) {
                    self_modifying = true;
                }

                classes.insert(instr.id, class);
            }
        }
    }

    AliasResult { classes, self_modifying }
}

/// Two memory accesses may alias iff they share an alias class (an
/// `Unknown` or `PointerTarget` class is conservatively assumed to alias
/// everything, including itself, and every distinct constant address, named
/// variable, or array is otherwise disjoint from every other one).
pub fn may_alias(a: &AliasClass, b: &AliasClass) -> bool {
    match (a, b) {
        (AliasClass::Unknown, _) | (_, AliasClass::Unknown) => true,
        (AliasClass::PointerTarget(_), _) | (_, AliasClass::PointerTarget(_)) => true,
        (AliasClass::Constant(x), AliasClass::Constant(y)) => x == y,
        (AliasClass::Variable(x), AliasClass::Variable(y)) => x == y,
        (AliasClass::ArrayElement(x), AliasClass::ArrayElement(y)) => x == y,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::types::{BlockId, InstrId};
    use crate::ir::types::IlType;
    use crate::ir::value::Constant;
    use crate::ir::{BasicBlock, Instruction};

    #[test]
    fn constant_addresses_alias_only_themselves() {
        assert!(may_alias(&AliasClass::Constant(10), &AliasClass::Constant(10)));
        assert!(!may_alias(&AliasClass::Constant(10), &AliasClass::Constant(11)));
        assert!(may_alias(&AliasClass::Unknown, &AliasClass::Constant(10)));
    }

    #[test]
    fn distinct_named_variables_and_arrays_do_not_alias() {
        assert!(may_alias(&AliasClass::Variable("a".to_string()), &AliasClass::Variable("a".to_string())));
        assert!(!may_alias(&AliasClass::Variable("a".to_string()), &AliasClass::Variable("b".to_string())));
        assert!(may_alias(&AliasClass::ArrayElement("buf".to_string()), &AliasClass::ArrayElement("buf".to_string())));
        assert!(!may_alias(&AliasClass::ArrayElement("buf".to_string()), &AliasClass::Variable("buf".to_string())));
        assert!(may_alias(&AliasClass::PointerTarget("p".to_string()), &AliasClass::Variable("a".to_string())));
    }

    #[test]
    fn write_through_a_variable_address_with_no_array_or_pointer_type_is_not_self_modifying() {
        let mut f = Function::new("f", IlType::Void);
        let mut b0 = BasicBlock::new(BlockId(0), "bb0");
        b0.instructions.push(Instruction::new(
            InstrId(0),
            Opcode::StoreVar {
                var: crate::ir::value::VarRef::unversioned("addr"),
                ty: IlType::Word,
                value: Value::Const(Constant::word(0xd020)),
            },
        ));
        b0.instructions.push(Instruction::new(
            InstrId(1),
            Opcode::Intrinsic {
                name: "poke".to_string(),
                args: vec![Value::Var(crate::ir::value::VarRef::unversioned("addr")), Value::Const(Constant::byte(1))],
                ty: IlType::Void,
            },
        ));
        b0.instructions.push(Instruction::new(InstrId(2), Opcode::ReturnVoid));
        f.add_block(b0);
        let result = analyze(&f);
        assert!(!result.self_modifying);
        assert_eq!(result.classes[&InstrId(1)], AliasClass::Variable("addr".to_string()));
    }

    #[test]
    fn write_through_a_pointer_typed_variable_is_flagged_self_modifying() {
        let mut f = Function::new("f", IlType::Void);
        let mut b0 = BasicBlock::new(BlockId(0), "bb0");
        b0.instructions.push(Instruction::new(
            InstrId(0),
            Opcode::StoreVar {
                var: crate::ir::value::VarRef::unversioned("addr"),
                ty: IlType::pointer_to(IlType::Byte),
                value: Value::Const(Constant::word(0xc000)),
            },
        ));
        b0.instructions.push(Instruction::new(
            InstrId(1),
            Opcode::Intrinsic {
                name: "poke".to_string(),
                args: vec![Value::Var(crate::ir::value::VarRef::unversioned("addr")), Value::Const(Constant::byte(1))],
                ty: IlType::Void,
            },
        ));
        b0.instructions.push(Instruction::new(InstrId(2), Opcode::ReturnVoid));
        f.add_block(b0);
        let result = analyze(&f);
        assert!(result.self_modifying);
        assert_eq!(result.classes[&InstrId(1)], AliasClass::PointerTarget("addr".to_string()));
    }
}
