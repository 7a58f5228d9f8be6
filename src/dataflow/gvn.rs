//! Global value numbering: a dominator-scoped available-expressions table,
//! walked in dominator-tree preorder so that a redundant computation is
//! only recognized when an equivalent one is guaranteed to have already
//! executed on every path reaching it.

use std::collections::HashMap;

use crate::common::types::InstrId;
use crate::dominance::DominatorTree;
use crate::ir::function::Function;
use crate::ir::instruction::{Opcode, PhiSource};
use crate::ir::value::Value;

pub struct GvnResult {
    pub value_number: HashMap<InstrId, u32>,
    /// `(redundant, original)` pairs: `redundant`'s result always equals
    /// `original`'s and can be rewritten to reuse it.
    pub redundant: Vec<(InstrId, InstrId)>,
}

fn operand_key(value: &Value) -> String {
    match value {
        Value::Const(c) => format!("c:{}:{}", c.ty, c.value),
        Value::Reg(r) => format!("r:{}", r.id),
        Value::Var(v) => format!("v:{v}"),
    }
}

fn canonical_key(opcode: &Opcode) -> Option<String> {
    match opcode {
        Opcode::Binary { op, lhs, rhs } => {
            let mut operands = [operand_key(lhs), operand_key(rhs)];
            if op.is_commutative() {
                operands.sort();
            }
            Some(format!("bin:{op:?}:{}:{}", operands[0], operands[1]))
        }
        Opcode::Compare { op, lhs, rhs } => {
            let mut operands = [operand_key(lhs), operand_key(rhs)];
            if op.is_commutative() {
                operands.sort();
            }
            Some(format!("cmp:{op:?}:{}:{}", operands[0], operands[1]))
        }
        Opcode::Unary { op, operand } => Some(format!("un:{op:?}:{}", operand_key(operand))),
        Opcode::ZeroExtend { operand } => Some(format!("zext:{}", operand_key(operand))),
        Opcode::Truncate { operand } => Some(format!("trunc:{}", operand_key(operand))),
        Opcode::LoadConst { value } => Some(format!("const:{}", operand_key(value))),
        _ => None,
    }
}

/// Computes value numbers for every numberable (pure, result-producing,
/// non-phi) instruction in `function`, aliasing redundant computations to
/// the first dominating instruction with the same canonical key.
pub fn compute(function: &Function, tree: &DominatorTree) -> GvnResult {
    let mut result = GvnResult { value_number: HashMap::new(), redundant: Vec::new() };
    let mut table: HashMap<String, (u32, InstrId)> = HashMap::new();
    let mut next_vn = 0u32;
    walk(function, tree, tree.entry, &mut table, &mut next_vn, &mut result);
    result
}

fn walk(
    function: &Function,
    tree: &DominatorTree,
    block_id: crate::common::types::BlockId,
    table: &mut HashMap<String, (u32, InstrId)>,
    next_vn: &mut u32,
    result: &mut GvnResult,
) {
    let Some(block) = function.block(block_id) else { return };
    let mut inserted = Vec::new();

    for instr in &block.instructions {
        let Some(key) = canonical_key(&instr.opcode) else { continue };
        if let Some(&(vn, original)) = table.get(&key) {
            result.value_number.insert(instr.id, vn);
            result.redundant.push((instr.id, original));
        } else {
            let vn = *next_vn;
            *next_vn += 1;
            table.insert(key.clone(), (vn, instr.id));
            inserted.push(key);
            result.value_number.insert(instr.id, vn);
        }
    }

    let mut children = tree.children(block_id).to_vec();
    children.sort();
    for child in children {
        walk(function, tree, child, table, next_vn, result);
    }

    for key in inserted {
        table.remove(&key);
    }
}

/// Picks, among a phi's sources, whether all resolve to the same value
/// number (a trivial phi candidate for the SSA pruning pass).
pub fn phi_is_trivial(sources: &[PhiSource], value_number: &HashMap<InstrId, u32>, reg_to_instr: &HashMap<u32, InstrId>) -> bool {
    let mut numbers = sources.iter().filter_map(|s| match &s.value {
        Value::Reg(r) => reg_to_instr.get(&r.id.0).and_then(|id| value_number.get(id)).copied(),
        _ => None,
    });
    match numbers.next() {
        Some(first) => numbers.all(|n| n == first),
        None => false,
    }
}
