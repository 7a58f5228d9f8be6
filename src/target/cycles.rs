//! Per-function cycle estimation.
//!
//! The recursive expression-level cost model from the original AST-based
//! front end is translated onto this register-based IL by letting each
//! instruction cost its own opcode plus the cost of its `Value` operands
//! directly: a sub-expression that would have been nested in an AST is
//! already materialized as its own instruction here, so the recursion
//! happens across instructions rather than within one.

use crate::intrinsics::IntrinsicRegistry;
use crate::ir::function::Function;
use crate::ir::instruction::Opcode;
use crate::ir::value::Value;
use crate::platform::TargetMachine;

const LITERAL_COST: u32 = 2;
const IDENTIFIER_COST: u32 = 3;
const UNARY_BASE: u32 = 6;
const BINARY_BASE: u32 = 8;
const CALL_BASE: u32 = 12;
const CALL_ARG_OVERHEAD: u32 = 3;
const ASSIGNMENT_BASE: u32 = 5;
const LOOP_OVERHEAD: u32 = 5;
const DEFAULT_ITERATION_ESTIMATE: u32 = 10;

const PAGE_CROSS_PENALTY: u32 = 1;
const RMW_PENALTY: u32 = 2;
const SPRITE_DMA_PENALTY: u32 = 2;
const MAX_SPRITE_LINE_PENALTY: u32 = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Confidence {
    /// Every loop bound in the function was a literal constant.
    Exact,
    /// At least one loop iteration count fell back to the default estimate.
    Estimated,
}

#[derive(Debug, Clone, Default)]
pub struct CostBreakdown {
    pub assignments: u32,
    pub binaries: u32,
    pub calls: u32,
    pub branches: u32,
    pub other: u32,
}

#[derive(Debug, Clone)]
pub struct CycleEstimate {
    pub best_case: u32,
    pub average_case: u32,
    pub worst_case: u32,
    pub breakdown: CostBreakdown,
    pub confidence: Confidence,
}

fn operand_cost(value: &Value) -> u32 {
    match value {
        Value::Const(_) => LITERAL_COST,
        Value::Reg(_) | Value::Var(_) => IDENTIFIER_COST,
    }
}

/// Cost of one instruction in isolation, ignoring hardware penalties
/// (page-crossing, RMW, sprite DMA, badlines), which the caller layers on
/// top once it knows the addressing mode and raster context.
fn instruction_cost(opcode: &Opcode, registry: &IntrinsicRegistry, breakdown: &mut CostBreakdown) -> u32 {
    match opcode {
        Opcode::LoadConst { .. } => LITERAL_COST,
        Opcode::LoadVar { .. } => IDENTIFIER_COST,
        Opcode::Unary { operand, .. } => {
            breakdown.other += 1;
            UNARY_BASE + operand_cost(operand)
        }
        Opcode::ZeroExtend { operand } | Opcode::Truncate { operand } => {
            breakdown.other += 1;
            UNARY_BASE + operand_cost(operand)
        }
        Opcode::Binary { lhs, rhs, .. } => {
            breakdown.binaries += 1;
            BINARY_BASE + operand_cost(lhs) + operand_cost(rhs)
        }
        Opcode::Compare { lhs, rhs, .. } => {
            breakdown.binaries += 1;
            BINARY_BASE + operand_cost(lhs) + operand_cost(rhs)
        }
        Opcode::StoreVar { value, .. } => {
            breakdown.assignments += 1;
            ASSIGNMENT_BASE + operand_cost(value)
        }
        Opcode::Call { args, .. } => {
            breakdown.calls += 1;
            CALL_BASE + args.iter().map(|a| operand_cost(a) + CALL_ARG_OVERHEAD).sum::<u32>()
        }
        Opcode::Branch { cond, .. } => {
            breakdown.branches += 1;
            BINARY_BASE + operand_cost(cond)
        }
        Opcode::Jump { .. } => {
            breakdown.branches += 1;
            3
        }
        Opcode::Return { value } => {
            breakdown.other += 1;
            ASSIGNMENT_BASE + operand_cost(value)
        }
        Opcode::ReturnVoid => {
            breakdown.other += 1;
            ASSIGNMENT_BASE
        }
        Opcode::Phi { .. } => 0,
        Opcode::Intrinsic { name, args, .. } => {
            breakdown.other += 1;
            let base = registry.lookup(name).ok().and_then(|sig| sig.emitted_cycle_cost).unwrap_or(0);
            // peek/poke-family intrinsics address memory, the nearest thing
            // this IL has to "indexed memory": charge the indexed-access
            // surcharge on top of the intrinsic's own table cost.
            let indexed = if name.starts_with("peek") || name.starts_with("poke") || name.starts_with("volatile") {
                5 + args.first().map(operand_cost).unwrap_or(0)
            } else {
                args.iter().map(operand_cost).sum()
            };
            base + indexed
        }
    }
}

/// Estimates cycles for `function`, folding in loop multiplication via
/// `loops` (from [`crate::dataflow::loops`]) and hardware surcharges from
/// `machine`. Page-crossing and RMW surcharges require addressing-mode
/// information this IL does not yet carry per-instruction, so they are
/// applied only to intrinsic memory accesses, conservatively assuming a
/// potential page cross on every absolute memory intrinsic.
pub fn estimate(
    function: &Function,
    loops: &crate::dataflow::loops::LoopForest,
    registry: &IntrinsicRegistry,
    machine: &TargetMachine,
) -> CycleEstimate {
    let mut breakdown = CostBreakdown::default();
    let mut confidence = Confidence::Exact;

    let mut per_block = std::collections::BTreeMap::new();
    for block in function.blocks_in_order() {
        let mut cost = 0u32;
        for instr in &block.instructions {
            let mut instr_cost = instruction_cost(&instr.opcode, registry, &mut breakdown);
            if let Opcode::Intrinsic { name, .. } = &instr.opcode {
                if name.starts_with("peek") || name.starts_with("poke") {
                    instr_cost += PAGE_CROSS_PENALTY;
                }
                if name.starts_with("poke") {
                    instr_cost += RMW_PENALTY;
                }
            }
            cost += instr_cost;
        }
        per_block.insert(block.id, cost);
    }

    // Blocks inside a loop body are folded into `setup + iterations * (body + overhead)`
    // rather than counted once; the loop header's own cost (the condition
    // check) is treated as per-iteration overhead, already in `body`.
    let mut loop_bodies = std::collections::BTreeSet::new();
    let mut total = 0u32;
    for l in &loops.loops {
        if l.depth != 0 {
            continue; // innermost-out folding: only fold top-level loops here
        }
        let body_cost: u32 = l.body.iter().filter_map(|b| per_block.get(b)).sum();
        let (iterations, estimated) = iteration_count(function, l);
        if estimated {
            confidence = Confidence::Estimated;
        }
        total += iterations * (body_cost + LOOP_OVERHEAD);
        loop_bodies.extend(l.body.iter().copied());
    }

    for (block_id, cost) in &per_block {
        if !loop_bodies.contains(block_id) {
            total += cost;
        }
    }

    let machine_overhead = machine.badline_penalty.min(machine.cycles_per_line) / 8;
    let best_case = total;
    let worst_case = total.saturating_add(machine_overhead);
    let average_case = (best_case + worst_case) / 2;

    CycleEstimate { best_case, average_case, worst_case, breakdown, confidence }
}

/// Derives a loop's trip count from a literal bound when possible: the
/// header's branch condition must be a direct compare of the basic
/// induction variable against a constant, and the variable's initial value
/// must be a constant store textually before the loop. Falls back to
/// [`DEFAULT_ITERATION_ESTIMATE`], flagged as estimated, whenever any of
/// that chain isn't literal (non-literal bound, computed initial value, or
/// no recognized BIV at all).
fn iteration_count(function: &Function, l: &crate::dataflow::loops::Loop) -> (u32, bool) {
    let Some(iv) = l.induction_variables.first() else {
        return (DEFAULT_ITERATION_ESTIMATE, true);
    };
    let Some(header) = function.block(l.header) else {
        return (DEFAULT_ITERATION_ESTIMATE, true);
    };
    let Some(bound) = literal_loop_bound(header, &iv.variable) else {
        return (DEFAULT_ITERATION_ESTIMATE, true);
    };
    let Some(initial) = literal_initial_value(function, l, &iv.variable) else {
        return (DEFAULT_ITERATION_ESTIMATE, true);
    };

    if iv.step == 0 {
        return (DEFAULT_ITERATION_ESTIMATE, true);
    }
    let span = bound - initial;
    if span.signum() != iv.step.signum() && span != 0 {
        return (0, false);
    }
    let count = (span.abs() as u32).div_ceil(iv.step.unsigned_abs() as u32);
    (count, false)
}

/// Finds `cmp(load_var(variable), const)` (or the mirrored operand order)
/// feeding the header's terminating branch, returning the constant bound.
fn literal_loop_bound(header: &crate::ir::block::BasicBlock, variable: &str) -> Option<i64> {
    let Opcode::Branch { cond, .. } = &header.terminator()?.opcode else { return None };
    let Value::Reg(cond_reg) = cond else { return None };

    let mut var_regs = std::collections::BTreeSet::new();
    for instr in &header.instructions {
        if let Opcode::LoadVar { var, .. } = &instr.opcode {
            if var.base == variable {
                if let Some(r) = instr.result {
                    var_regs.insert(r.0);
                }
            }
        }
    }

    for instr in &header.instructions {
        if instr.result != Some(cond_reg.id) {
            continue;
        }
        let (lhs, rhs) = match &instr.opcode {
            Opcode::Compare { lhs, rhs, .. } => (lhs, rhs),
            _ => continue,
        };
        if let (Value::Reg(r), Value::Const(c)) = (lhs, rhs) {
            if var_regs.contains(&r.id.0) {
                return Some(c.value);
            }
        }
        if let (Value::Const(c), Value::Reg(r)) = (lhs, rhs) {
            if var_regs.contains(&r.id.0) {
                return Some(c.value);
            }
        }
    }
    None
}

/// Scans every block outside the loop body for the last constant store to
/// `variable`, approximating "textually prior initialization" by program
/// order over ascending block ids.
fn literal_initial_value(function: &Function, l: &crate::dataflow::loops::Loop, variable: &str) -> Option<i64> {
    let mut found = None;
    for block in function.blocks_in_order() {
        if l.body.contains(&block.id) {
            continue;
        }
        for instr in &block.instructions {
            if let Opcode::StoreVar { var, value, .. } = &instr.opcode {
                if var.base == variable {
                    if let Value::Const(c) = value {
                        found = Some(c.value);
                    }
                }
            }
        }
    }
    found
}

pub fn sprite_dma_penalty(active_sprites: u32) -> u32 {
    (active_sprites * SPRITE_DMA_PENALTY).min(MAX_SPRITE_LINE_PENALTY)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::types::{BlockId, InstrId};
    use crate::ir::types::IlType;
    use crate::ir::value::Constant;
    use crate::ir::{BasicBlock, BinaryOp, Instruction};

    #[test]
    fn literal_addition_costs_base_plus_two_literals() {
        let mut f = Function::new("f", IlType::Byte);
        let mut b0 = BasicBlock::new(BlockId(0), "bb0");
        b0.instructions.push(Instruction::new(
            InstrId(0),
            Opcode::Binary {
                op: BinaryOp::Add,
                lhs: Value::Const(Constant::byte(1)),
                rhs: Value::Const(Constant::byte(2)),
            },
        ));
        b0.instructions.push(Instruction::new(InstrId(1), Opcode::ReturnVoid));
        f.add_block(b0);
        let mut breakdown = CostBreakdown::default();
        let registry = crate::intrinsics::registry();
        let cost = instruction_cost(&f.block(BlockId(0)).unwrap().instructions[0].opcode, registry, &mut breakdown);
        assert_eq!(cost, BINARY_BASE + LITERAL_COST + LITERAL_COST);
        assert_eq!(breakdown.binaries, 1);
    }

    #[test]
    fn sprite_dma_penalty_caps_at_eight() {
        assert_eq!(sprite_dma_penalty(2), 4);
        assert_eq!(sprite_dma_penalty(10), 8);
    }
}
