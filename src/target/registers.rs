//! Register pressure estimation across the 6502's three general registers
//! (A, X, Y). Expressions above a pressure of 2 are flagged as spill
//! candidates, since the processor has no more than that many registers to
//! juggle an expression tree in.

use std::collections::BTreeMap;

use crate::common::types::InstrId;
use crate::ir::function::Function;
use crate::ir::instruction::Opcode;
use crate::ir::value::Value;

const MAX_PRESSURE: u8 = 3;

fn operand_pressure(value: &Value, pressure: &BTreeMap<u32, u8>) -> u8 {
    match value {
        Value::Const(_) => 1,
        Value::Var(_) => 1,
        Value::Reg(r) => pressure.get(&r.id.0).copied().unwrap_or(1),
    }
}

pub struct RegisterPressureResult {
    pub pressure: BTreeMap<InstrId, u8>,
    pub spill_candidates: Vec<InstrId>,
}

/// Walks `function` in program order, assigning each result-producing
/// instruction a 1-3 pressure score derived from its operands.
pub fn analyze(function: &Function) -> RegisterPressureResult {
    let mut by_reg: BTreeMap<u32, u8> = BTreeMap::new();
    let mut pressure = BTreeMap::new();
    let mut spill_candidates = Vec::new();

    for block in function.blocks_in_order() {
        for instr in &block.instructions {
            let p = match &instr.opcode {
                Opcode::Binary { lhs, rhs, .. } | Opcode::Compare { lhs, rhs, .. } => {
                    let l = operand_pressure(lhs, &by_reg);
                    let r = operand_pressure(rhs, &by_reg);
                    (l.max(r.saturating_add(1))).min(MAX_PRESSURE)
                }
                Opcode::Call { .. } => MAX_PRESSURE,
                Opcode::Unary { operand, .. } => operand_pressure(operand, &by_reg).min(MAX_PRESSURE),
                Opcode::Intrinsic { name, args, .. } if name.starts_with("peek") || name.starts_with("poke") => {
                    let base = args.first().map(|v| operand_pressure(v, &by_reg)).unwrap_or(1);
                    let index = args.get(1).map(|v| operand_pressure(v, &by_reg)).unwrap_or(0);
                    base.max(index.saturating_add(1)).min(MAX_PRESSURE)
                }
                _ => 1,
            };

            if let Some(result) = instr.result {
                by_reg.insert(result.0, p);
            }
            pressure.insert(instr.id, p);
            if p > 2 {
                spill_candidates.push(instr.id);
            }
        }
    }

    RegisterPressureResult { pressure, spill_candidates }
}
