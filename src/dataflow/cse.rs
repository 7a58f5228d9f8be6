//! Block-local common subexpression elimination.
//!
//! Scoped strictly to a single basic block: control flow is treated as a
//! barrier, so the available-expressions table is built fresh on entry to
//! each block and discarded on exit, rather than carried across edges the
//! way [`crate::dataflow::gvn`] does via the dominator tree.

use std::collections::{BTreeSet, HashMap};

use crate::common::types::InstrId;
use crate::ir::function::Function;
use crate::ir::instruction::Opcode;
use crate::ir::value::Value;

pub struct CseResult {
    /// `(redundant, original)` pairs, both within the same block.
    pub redundant: Vec<(InstrId, InstrId)>,
}

fn operand_key(value: &Value) -> String {
    match value {
        Value::Const(c) => format!("c:{}:{}", c.ty, c.value),
        Value::Reg(r) => format!("r:{}", r.id),
        Value::Var(v) => format!("v:{v}"),
    }
}

fn operand_var(value: &Value, vars: &mut BTreeSet<String>) {
    if let Value::Var(v) = value {
        vars.insert(v.base.clone());
    }
}

fn canonical_key(opcode: &Opcode) -> Option<(String, BTreeSet<String>)> {
    match opcode {
        Opcode::Binary { op, lhs, rhs } => {
            let mut operands = [operand_key(lhs), operand_key(rhs)];
            if op.is_commutative() {
                operands.sort();
            }
            let mut vars = BTreeSet::new();
            operand_var(lhs, &mut vars);
            operand_var(rhs, &mut vars);
            Some((format!("bin:{op:?}:{}:{}", operands[0], operands[1]), vars))
        }
        Opcode::Compare { op, lhs, rhs } => {
            let mut operands = [operand_key(lhs), operand_key(rhs)];
            if op.is_commutative() {
                operands.sort();
            }
            let mut vars = BTreeSet::new();
            operand_var(lhs, &mut vars);
            operand_var(rhs, &mut vars);
            Some((format!("cmp:{op:?}:{}:{}", operands[0], operands[1]), vars))
        }
        Opcode::Unary { op, operand } => {
            let mut vars = BTreeSet::new();
            operand_var(operand, &mut vars);
            Some((format!("un:{op:?}:{}", operand_key(operand)), vars))
        }
        _ => None,
    }
}

pub fn compute(function: &Function) -> CseResult {
    let mut redundant = Vec::new();
    for block in function.blocks_in_order() {
        let mut available: HashMap<String, (InstrId, BTreeSet<String>)> = HashMap::new();
        for instr in &block.instructions {
            // A store invalidates every entry whose key reads that variable
            // directly (bypassing a LoadVar into a register, which a store
            // can't retroactively change); everything else survives.
            if let Opcode::StoreVar { var, .. } = &instr.opcode {
                available.retain(|_, (_, vars)| !vars.contains(&var.base));
                continue;
            }
            let Some((key, vars)) = canonical_key(&instr.opcode) else { continue };
            match available.get(&key) {
                Some(&(original, _)) => redundant.push((instr.id, original)),
                None => {
                    available.insert(key, (instr.id, vars));
                }
            }
        }
    }
    CseResult { redundant }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::types::{BlockId, InstrId, VRegId};
    use crate::ir::types::IlType;
    use crate::ir::value::Constant;
    use crate::ir::{BasicBlock, BinaryOp, Instruction};

    #[test]
    fn repeated_commutative_expression_in_same_block_is_redundant() {
        let mut f = Function::new("f", IlType::Byte);
        let mut b0 = BasicBlock::new(BlockId(0), "bb0");
        b0.instructions.push(
            Instruction::new(
                InstrId(0),
                Opcode::Binary {
                    op: BinaryOp::Add,
                    lhs: Value::Const(Constant::byte(1)),
                    rhs: Value::Const(Constant::byte(2)),
                },
            )
            .with_result(VRegId(0), IlType::Byte),
        );
        b0.instructions.push(
            Instruction::new(
                InstrId(1),
                Opcode::Binary {
                    op: BinaryOp::Add,
                    lhs: Value::Const(Constant::byte(2)),
                    rhs: Value::Const(Constant::byte(1)),
                },
            )
            .with_result(VRegId(1), IlType::Byte),
        );
        b0.instructions.push(Instruction::new(InstrId(2), Opcode::ReturnVoid));
        f.add_block(b0);
        let result = compute(&f);
        assert_eq!(result.redundant, vec![(InstrId(1), InstrId(0))]);
    }

    #[test]
    fn expressions_across_blocks_are_not_merged() {
        let mut f = Function::new("f", IlType::Byte);
        let mut b0 = BasicBlock::new(BlockId(0), "bb0");
        b0.instructions.push(
            Instruction::new(
                InstrId(0),
                Opcode::Binary {
                    op: BinaryOp::Add,
                    lhs: Value::Const(Constant::byte(1)),
                    rhs: Value::Const(Constant::byte(2)),
                },
            )
            .with_result(VRegId(0), IlType::Byte),
        );
        b0.instructions.push(Instruction::new(InstrId(1), Opcode::Jump { target: BlockId(1) }));
        let mut b1 = BasicBlock::new(BlockId(1), "bb1");
        b1.instructions.push(
            Instruction::new(
                InstrId(2),
                Opcode::Binary {
                    op: BinaryOp::Add,
                    lhs: Value::Const(Constant::byte(1)),
                    rhs: Value::Const(Constant::byte(2)),
                },
            )
            .with_result(VRegId(1), IlType::Byte),
        );
        b1.instructions.push(Instruction::new(InstrId(3), Opcode::ReturnVoid));
        f.add_block(b0);
        f.add_block(b1);
        let result = compute(&f);
        assert!(result.redundant.is_empty());
    }

    #[test]
    fn store_to_an_operand_variable_invalidates_the_entry() {
        use crate::ir::value::VarRef;

        let mut f = Function::new("f", IlType::Byte);
        let mut b0 = BasicBlock::new(BlockId(0), "bb0");
        b0.instructions.push(
            Instruction::new(
                InstrId(0),
                Opcode::Binary {
                    op: BinaryOp::Add,
                    lhs: Value::Var(VarRef::unversioned("x")),
                    rhs: Value::Const(Constant::byte(1)),
                },
            )
            .with_result(VRegId(0), IlType::Byte),
        );
        b0.instructions.push(Instruction::new(
            InstrId(1),
            Opcode::StoreVar {
                var: VarRef::unversioned("x"),
                ty: IlType::Byte,
                value: Value::Const(Constant::byte(10)),
            },
        ));
        b0.instructions.push(
            Instruction::new(
                InstrId(2),
                Opcode::Binary {
                    op: BinaryOp::Add,
                    lhs: Value::Var(VarRef::unversioned("x")),
                    rhs: Value::Const(Constant::byte(1)),
                },
            )
            .with_result(VRegId(1), IlType::Byte),
        );
        b0.instructions.push(Instruction::new(InstrId(3), Opcode::ReturnVoid));
        f.add_block(b0);
        let result = compute(&f);
        assert!(result.redundant.is_empty(), "store to x must invalidate the earlier x+1 entry");
    }
}
