//! Purity classification: whether a function can be safely reordered,
//! deduplicated (GVN/CSE), or speculated past a branch.

use std::collections::BTreeMap;

use crate::intrinsics::IntrinsicRegistry;
use crate::ir::function::{Function, Module};
use crate::ir::instruction::Opcode;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Purity {
    /// No observable side effects and result depends only on arguments and
    /// globals that are themselves never written: safe to hoist, sink, or
    /// eliminate if its result is unused.
    Pure,
    /// Reads mutable state (a global or memory through an intrinsic) but
    /// never writes it: safe to reorder with respect to other read-only
    /// code, but not across an intervening write.
    ReadOnly,
    /// Writes mutable state, a register, or memory: ordering-sensitive.
    Impure,
}

impl Purity {
    fn join(self, other: Purity) -> Purity {
        self.max(other)
    }
}

/// Classifies every function in `module`, resolving calls through the
/// module's other functions (unresolved/external calls are conservatively
/// `Impure`) and intrinsics through the global registry.
pub fn analyze_module(module: &Module, registry: &IntrinsicRegistry) -> BTreeMap<String, Purity> {
    let mut result = BTreeMap::new();
    let mut in_progress = std::collections::BTreeSet::new();
    for name in module.functions.keys() {
        resolve(name, module, registry, &mut result, &mut in_progress);
    }
    result
}

fn resolve(
    name: &str,
    module: &Module,
    registry: &IntrinsicRegistry,
    memo: &mut BTreeMap<String, Purity>,
    in_progress: &mut std::collections::BTreeSet<String>,
) -> Purity {
    if let Some(p) = memo.get(name) {
        return *p;
    }
    // A function in a recursion cycle whose purity is still unresolved is
    // conservatively treated as Impure for this computation; revisiting it
    // once callees resolve would require a fixed point, which recursive
    // mid-end functions on this target rarely need given the 256-byte stack
    // budget already bounding recursion depth elsewhere.
    if !in_progress.insert(name.to_string()) {
        return Purity::Impure;
    }

    let purity = match module.function(name) {
        Some(function) => classify_function(function, module, registry, memo, in_progress),
        None => Purity::Impure,
    };

    in_progress.remove(name);
    memo.insert(name.to_string(), purity);
    purity
}

fn classify_function(
    function: &Function,
    module: &Module,
    registry: &IntrinsicRegistry,
    memo: &mut BTreeMap<String, Purity>,
    in_progress: &mut std::collections::BTreeSet<String>,
) -> Purity {
    let mut purity = Purity::Pure;
    for block in function.blocks_in_order() {
        for instr in &block.instructions {
            purity = purity.join(classify_instruction(&instr.opcode, module, registry, memo, in_progress));
        }
    }
    purity
}

fn classify_instruction(
    opcode: &Opcode,
    module: &Module,
    registry: &IntrinsicRegistry,
    memo: &mut BTreeMap<String, Purity>,
    in_progress: &mut std::collections::BTreeSet<String>,
) -> Purity {
    match opcode {
        Opcode::Intrinsic { name, .. } => match registry.lookup(name) {
            Ok(sig) if sig.has_side_effect => Purity::Impure,
            Ok(sig) if sig.is_volatile => Purity::ReadOnly,
            Ok(_) => Purity::Pure,
            Err(_) => Purity::Impure,
        },
        Opcode::Call { callee, .. } => resolve(callee, module, registry, memo, in_progress),
        // Variable loads/stores are local unless the variable resolves to a
        // module-level global; the mid-end's IL does not yet disambiguate
        // locals from globals at this layer, so a `StoreVar` is treated as
        // potentially observable and classified `Impure` conservatively.
        Opcode::StoreVar { .. } => Purity::Impure,
        _ => Purity::Pure,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::types::InstrId;
    use crate::ir::types::IlType;
    use crate::ir::value::{Constant, Value};
    use crate::ir::BasicBlock;
    use crate::common::types::BlockId;
    use crate::ir::Instruction;

    #[test]
    fn pure_function_has_no_intrinsics_or_stores() {
        let mut module = Module::new("m");
        let mut f = Function::new("add_one", IlType::Byte);
        let mut b0 = BasicBlock::new(BlockId(0), "bb0");
        b0.instructions.push(Instruction::new(
            InstrId(0),
            Opcode::Return { value: Value::Const(Constant::byte(1)) },
        ));
        f.add_block(b0);
        module.add_function(f);
        let registry = crate::intrinsics::registry();
        let result = analyze_module(&module, registry);
        assert_eq!(result["add_one"], Purity::Pure);
    }

    #[test]
    fn side_effecting_intrinsic_makes_function_impure() {
        let mut module = Module::new("m");
        let mut f = Function::new("turn_off_interrupts", IlType::Void);
        let mut b0 = BasicBlock::new(BlockId(0), "bb0");
        b0.instructions.push(Instruction::new(
            InstrId(0),
            Opcode::Intrinsic { name: "sei".to_string(), args: vec![], ty: IlType::Void },
        ));
        b0.instructions.push(Instruction::new(InstrId(1), Opcode::ReturnVoid));
        f.add_block(b0);
        module.add_function(f);
        let registry = crate::intrinsics::registry();
        let result = analyze_module(&module, registry);
        assert_eq!(result["turn_off_interrupts"], Purity::Impure);
    }
}
