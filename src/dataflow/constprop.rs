//! Sparse conditional constant propagation: a forward dataflow analysis
//! over a three-point lattice (undefined / constant / not-constant), plus
//! dead-edge marking when a branch condition resolves to a known constant.

use std::collections::BTreeMap;

use crate::cfg::{Cfg, CfgEdge};
use crate::common::errors::DataflowError;
use crate::common::types::BlockId;
use crate::ir::function::Function;
use crate::ir::instruction::{BinaryOp, CompareOp, Opcode, UnaryOp};
use crate::ir::value::{Value, VarRef};

/// A lattice value for one variable at one program point.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lattice {
    /// Not yet reached by any definition on any analyzed path.
    Top,
    Constant(i64),
    /// Reached by at least two conflicting constants, or by a non-constant def.
    Bottom,
}

impl Lattice {
    pub fn meet(self, other: Lattice) -> Lattice {
        match (self, other) {
            (Lattice::Top, x) | (x, Lattice::Top) => x,
            (Lattice::Bottom, _) | (_, Lattice::Bottom) => Lattice::Bottom,
            (Lattice::Constant(a), Lattice::Constant(b)) => {
                if a == b {
                    Lattice::Constant(a)
                } else {
                    Lattice::Bottom
                }
            }
        }
    }
}

pub struct ConstPropResult {
    pub values_out: BTreeMap<BlockId, BTreeMap<String, Lattice>>,
    /// Per-block register lattice, keyed by `VRegId.0`. Most values in an
    /// SSA-form function flow through registers rather than named
    /// variables, so folding stops at the first `Value::Reg` unless these
    /// are tracked alongside the named-variable lattice above.
    pub registers_out: BTreeMap<BlockId, BTreeMap<u32, Lattice>>,
    pub dead_edges: Vec<CfgEdge>,
}

impl ConstPropResult {
    pub fn constant_of(&self, block: BlockId, variable: &str) -> Option<i64> {
        match self.values_out.get(&block)?.get(variable)? {
            Lattice::Constant(v) => Some(*v),
            _ => None,
        }
    }

    pub fn constant_of_register(&self, block: BlockId, register: u32) -> Option<i64> {
        match self.registers_out.get(&block)?.get(&register)? {
            Lattice::Constant(v) => Some(*v),
            _ => None,
        }
    }
}

fn var_key(var: &VarRef) -> String {
    var.to_string()
}

struct State {
    vars: BTreeMap<String, Lattice>,
    regs: BTreeMap<u32, Lattice>,
}

fn eval(state: &State, value: &Value) -> Lattice {
    match value {
        Value::Const(c) => Lattice::Constant(c.value),
        Value::Var(var) => state.vars.get(&var_key(var)).copied().unwrap_or(Lattice::Top),
        Value::Reg(r) => state.regs.get(&r.id.0).copied().unwrap_or(Lattice::Top),
    }
}

/// Combines two operand lattices the way evaluating an expression (not
/// merging two incoming paths) should: unknown-so-far (`Top`) only yields a
/// constant once every operand does; a non-constant operand (`Bottom`)
/// poisons the result immediately regardless of the other operand.
fn combine(op_fold: impl FnOnce(i64, i64) -> Option<i64>, l: Lattice, r: Lattice) -> Lattice {
    match (l, r) {
        (Lattice::Bottom, _) | (_, Lattice::Bottom) => Lattice::Bottom,
        (Lattice::Top, _) | (_, Lattice::Top) => Lattice::Top,
        (Lattice::Constant(a), Lattice::Constant(b)) => match op_fold(a, b) {
            Some(v) => Lattice::Constant(v),
            None => Lattice::Bottom,
        },
    }
}

fn fold_binary(op: BinaryOp, lhs: i64, rhs: i64) -> Option<i64> {
    Some(match op {
        BinaryOp::Add => lhs.wrapping_add(rhs),
        BinaryOp::Sub => lhs.wrapping_sub(rhs),
        BinaryOp::Mul => lhs.wrapping_mul(rhs),
        BinaryOp::Div => {
            if rhs == 0 {
                return None;
            }
            lhs / rhs
        }
        BinaryOp::Mod => {
            if rhs == 0 {
                return None;
            }
            lhs % rhs
        }
        BinaryOp::And => lhs & rhs,
        BinaryOp::Or => lhs | rhs,
        BinaryOp::Xor => lhs ^ rhs,
        BinaryOp::Shl => lhs.wrapping_shl(rhs as u32),
        BinaryOp::Shr => lhs.wrapping_shr(rhs as u32),
    })
}

fn fold_compare(op: CompareOp, lhs: i64, rhs: i64) -> bool {
    match op {
        CompareOp::Eq => lhs == rhs,
        CompareOp::Ne => lhs != rhs,
        CompareOp::Lt => lhs < rhs,
        CompareOp::Le => lhs <= rhs,
        CompareOp::Gt => lhs > rhs,
        CompareOp::Ge => lhs >= rhs,
    }
}

fn fold_unary(op: UnaryOp, x: i64) -> i64 {
    match op {
        UnaryOp::Neg => x.wrapping_neg(),
        UnaryOp::Not => !x,
        UnaryOp::LogicalNot => (x == 0) as i64,
    }
}

pub fn compute(
    function: &Function,
    cfg: &Cfg,
    max_iterations: usize,
    wall_time_budget: Option<std::time::Duration>,
) -> Result<ConstPropResult, DataflowError> {
    let mut vars_out: BTreeMap<BlockId, BTreeMap<String, Lattice>> =
        function.blocks.keys().map(|&b| (b, BTreeMap::new())).collect();
    let mut regs_out: BTreeMap<BlockId, BTreeMap<u32, Lattice>> =
        function.blocks.keys().map(|&b| (b, BTreeMap::new())).collect();

    let started = std::time::Instant::now();
    let mut iterations = 0;
    loop {
        if iterations >= max_iterations {
            return Err(DataflowError::DidNotConverge {
                analysis: "constant_propagation".to_string(),
                iterations,
            });
        }
        if let Some(budget) = wall_time_budget {
            let elapsed = started.elapsed();
            if elapsed > budget {
                return Err(DataflowError::WallTimeExceeded {
                    analysis: "constant_propagation".to_string(),
                    budget_ms: budget.as_millis(),
                    elapsed_ms: elapsed.as_millis(),
                    iterations,
                });
            }
        }
        iterations += 1;
        let mut changed = false;

        for block in function.blocks_in_order() {
            let mut new_vars_in: BTreeMap<String, Lattice> = BTreeMap::new();
            let mut new_regs_in: BTreeMap<u32, Lattice> = BTreeMap::new();
            for &pred in cfg.predecessors(block.id) {
                for (var, lattice) in &vars_out[&pred] {
                    let merged = new_vars_in.get(var).copied().unwrap_or(Lattice::Top).meet(*lattice);
                    new_vars_in.insert(var.clone(), merged);
                }
                for (&reg, &lattice) in &regs_out[&pred] {
                    let merged = new_regs_in.get(&reg).copied().unwrap_or(Lattice::Top).meet(lattice);
                    new_regs_in.insert(reg, merged);
                }
            }

            let mut state = State { vars: new_vars_in, regs: new_regs_in };
            for instr in &block.instructions {
                match &instr.opcode {
                    Opcode::StoreVar { var, value, .. } => {
                        let v = eval(&state, value);
                        state.vars.insert(var_key(var), v);
                    }
                    Opcode::Phi { var, sources, .. } => {
                        let merged =
                            sources.iter().map(|s| eval(&state, &s.value)).fold(Lattice::Top, Lattice::meet);
                        state.vars.insert(var_key(var), merged);
                        if let Some(r) = instr.result {
                            state.regs.insert(r.0, merged);
                        }
                    }
                    Opcode::LoadConst { value } => {
                        if let Some(r) = instr.result {
                            let v = eval(&state, value);
                            state.regs.insert(r.0, v);
                        }
                    }
                    Opcode::LoadVar { var, .. } => {
                        if let Some(r) = instr.result {
                            let v = state.vars.get(&var_key(var)).copied().unwrap_or(Lattice::Top);
                            state.regs.insert(r.0, v);
                        }
                    }
                    Opcode::Binary { op, lhs, rhs } => {
                        if let Some(r) = instr.result {
                            let (l, rr) = (eval(&state, lhs), eval(&state, rhs));
                            state.regs.insert(r.0, combine(|a, b| fold_binary(*op, a, b), l, rr));
                        }
                    }
                    Opcode::Compare { op, lhs, rhs } => {
                        if let Some(r) = instr.result {
                            let (l, rr) = (eval(&state, lhs), eval(&state, rhs));
                            state.regs.insert(r.0, combine(|a, b| Some(fold_compare(*op, a, b) as i64), l, rr));
                        }
                    }
                    Opcode::Unary { op, operand } => {
                        if let Some(r) = instr.result {
                            let folded = match eval(&state, operand) {
                                Lattice::Constant(x) => Lattice::Constant(fold_unary(*op, x)),
                                other => other,
                            };
                            state.regs.insert(r.0, folded);
                        }
                    }
                    Opcode::ZeroExtend { operand } | Opcode::Truncate { operand } => {
                        if let Some(r) = instr.result {
                            let v = eval(&state, operand);
                            state.regs.insert(r.0, v);
                        }
                    }
                    _ => {
                        // Calls and intrinsics: result, if any, is not
                        // derivable from constant operands alone.
                        if let Some(r) = instr.result {
                            state.regs.insert(r.0, Lattice::Bottom);
                        }
                    }
                }
            }

            if state.vars != vars_out[&block.id] {
                vars_out.insert(block.id, state.vars.clone());
                changed = true;
            }
            if state.regs != regs_out[&block.id] {
                regs_out.insert(block.id, state.regs.clone());
                changed = true;
            }
        }

        if !changed {
            break;
        }
    }

    let mut dead_edges = Vec::new();
    for block in function.blocks_in_order() {
        if let Some(instr) = block.terminator() {
            if let Opcode::Branch { cond, then_block, else_block } = &instr.opcode {
                let state = State { vars: vars_out[&block.id].clone(), regs: regs_out[&block.id].clone() };
                if let Lattice::Constant(v) = eval(&state, cond) {
                    let dead_target = if v != 0 { *else_block } else { *then_block };
                    dead_edges.push(CfgEdge { from: block.id, to: dead_target });
                }
            }
        }
    }

    Ok(ConstPropResult { values_out: vars_out, registers_out: regs_out, dead_edges })
}

/// Folds a fully-constant binary/compare expression, if both operands are
/// literal constants. Used by later passes (e.g. CSE) that want to fold
/// opportunistically without running the full fixed-point analysis.
pub fn fold_expression(opcode: &Opcode) -> Option<i64> {
    match opcode {
        Opcode::Binary { op, lhs: Value::Const(l), rhs: Value::Const(r) } => fold_binary(*op, l.value, r.value),
        Opcode::Compare { op, lhs: Value::Const(l), rhs: Value::Const(r) } => {
            Some(fold_compare(*op, l.value, r.value) as i64)
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cfg::CfgBuilder;
    use crate::common::types::{BlockId, InstrId};
    use crate::ir::types::IlType;
    use crate::ir::value::Constant;
    use crate::ir::{BasicBlock, Function, Instruction};

    #[test]
    fn constant_branch_condition_marks_one_edge_dead() {
        let mut f = Function::new("f", IlType::Void);
        let mut b0 = BasicBlock::new(BlockId(0), "bb0");
        b0.instructions.push(Instruction::new(
            InstrId(0),
            Opcode::StoreVar {
                var: VarRef::unversioned("c"),
                ty: IlType::Bool,
                value: Value::Const(Constant::boolean(true)),
            },
        ));
        b0.instructions.push(Instruction::new(
            InstrId(1),
            Opcode::Branch {
                cond: Value::Var(VarRef::unversioned("c")),
                then_block: BlockId(1),
                else_block: BlockId(2),
            },
        ));
        let mut b1 = BasicBlock::new(BlockId(1), "bb1");
        b1.instructions.push(Instruction::new(InstrId(2), Opcode::ReturnVoid));
        let mut b2 = BasicBlock::new(BlockId(2), "bb2");
        b2.instructions.push(Instruction::new(InstrId(3), Opcode::ReturnVoid));
        f.add_block(b0);
        f.add_block(b1);
        f.add_block(b2);
        CfgBuilder::wire_edges(&mut f).unwrap();
        let cfg = Cfg::from_function(&f);
        let result = compute(&f, &cfg, 100, None).unwrap();
        assert_eq!(result.dead_edges, vec![CfgEdge { from: BlockId(0), to: BlockId(2) }]);
    }

    #[test]
    fn constant_expression_folds() {
        let opcode = Opcode::Binary {
            op: BinaryOp::Add,
            lhs: Value::Const(Constant::byte(2)),
            rhs: Value::Const(Constant::byte(3)),
        };
        assert_eq!(fold_expression(&opcode), Some(5));
    }

    #[test]
    fn branch_on_register_fed_by_constant_compare_marks_dead_edge() {
        use crate::common::types::VRegId;

        let mut f = Function::new("f", IlType::Void);
        let mut b0 = BasicBlock::new(BlockId(0), "bb0");
        b0.instructions.push(
            Instruction::new(
                InstrId(0),
                Opcode::Compare {
                    op: CompareOp::Eq,
                    lhs: Value::Const(Constant::byte(3)),
                    rhs: Value::Const(Constant::byte(3)),
                },
            )
            .with_result(VRegId(0), IlType::Bool),
        );
        b0.instructions.push(Instruction::new(
            InstrId(1),
            Opcode::Branch {
                cond: Value::Reg(crate::ir::value::VReg { id: VRegId(0), ty: IlType::Bool, name: None }),
                then_block: BlockId(1),
                else_block: BlockId(2),
            },
        ));
        let mut b1 = BasicBlock::new(BlockId(1), "bb1");
        b1.instructions.push(Instruction::new(InstrId(2), Opcode::ReturnVoid));
        let mut b2 = BasicBlock::new(BlockId(2), "bb2");
        b2.instructions.push(Instruction::new(InstrId(3), Opcode::ReturnVoid));
        f.add_block(b0);
        f.add_block(b1);
        f.add_block(b2);
        CfgBuilder::wire_edges(&mut f).unwrap();
        let cfg = Cfg::from_function(&f);
        let result = compute(&f, &cfg, 100, None).unwrap();
        assert_eq!(result.dead_edges, vec![CfgEdge { from: BlockId(0), to: BlockId(2) }]);
    }
}
