//! Natural loop detection, loop-nesting, and induction variable
//! classification, grounded in the standard back-edge/natural-loop
//! construction: an edge `body -> header` is a back edge iff `header`
//! dominates `body`, and the loop body is the set of blocks that can
//! reach `body` without passing through `header`.

use std::collections::{BTreeMap, BTreeSet};

use crate::cfg::{Cfg, CfgEdge};
use crate::common::types::BlockId;
use crate::dominance::DominatorTree;
use crate::ir::function::Function;
use crate::ir::instruction::{BinaryOp, Opcode};
use crate::ir::value::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InductionKind {
    /// Stepped by a constant amount on every iteration of its own loop.
    Basic,
    /// An affine function of a basic induction variable: `biv*k`,
    /// `biv*k + c`, `biv + c`, or a bare copy of `biv`.
    Derived,
}

#[derive(Debug, Clone)]
pub struct InductionVariable {
    pub variable: String,
    pub kind: InductionKind,
    pub step: i64,
}

pub struct Loop {
    pub header: BlockId,
    pub body: BTreeSet<BlockId>,
    pub back_edges: Vec<CfgEdge>,
    pub exit_blocks: BTreeSet<BlockId>,
    pub depth: u32,
    pub induction_variables: Vec<InductionVariable>,
    /// Every loop-invariant `StoreVar` definition in the loop body, after
    /// taking the transitive closure (an assignment is invariant if every
    /// value it reads is itself invariant or defined outside the loop).
    pub invariant_defs: BTreeSet<crate::common::types::InstrId>,
}

pub struct LoopForest {
    pub loops: Vec<Loop>,
}

impl LoopForest {
    pub fn containing(&self, block: BlockId) -> Vec<usize> {
        self.loops
            .iter()
            .enumerate()
            .filter(|(_, l)| l.body.contains(&block))
            .map(|(i, _)| i)
            .collect()
    }
}

pub fn detect(function: &Function, cfg: &Cfg, tree: &DominatorTree) -> LoopForest {
    let mut back_edges = Vec::new();
    for edge in cfg.edges() {
        if tree.dominates(edge.to, edge.from) {
            back_edges.push(edge);
        }
    }

    let mut by_header: BTreeMap<BlockId, Vec<CfgEdge>> = BTreeMap::new();
    for edge in back_edges {
        by_header.entry(edge.to).or_default().push(edge);
    }

    let mut loops = Vec::new();
    for (header, edges) in by_header {
        let mut body = BTreeSet::new();
        body.insert(header);
        let mut worklist: Vec<BlockId> = Vec::new();
        for edge in &edges {
            if body.insert(edge.from) {
                worklist.push(edge.from);
            }
        }
        while let Some(block) = worklist.pop() {
            for &pred in cfg.predecessors(block) {
                if body.insert(pred) {
                    worklist.push(pred);
                }
            }
        }

        let mut exit_blocks = BTreeSet::new();
        for &block in &body {
            for &succ in cfg.successors(block) {
                if !body.contains(&succ) {
                    exit_blocks.insert(block);
                }
            }
        }

        let induction_variables = classify_induction_variables(function, &body, header);
        let invariant_defs = loop_invariant_defs(function, &body);

        loops.push(Loop {
            header,
            body,
            back_edges: edges,
            exit_blocks,
            depth: 0,
            induction_variables,
            invariant_defs,
        });
    }

    assign_nesting_depth(&mut loops);
    LoopForest { loops }
}

fn assign_nesting_depth(loops: &mut [Loop]) {
    let bodies: Vec<BTreeSet<BlockId>> = loops.iter().map(|l| l.body.clone()).collect();
    for (i, loop_i) in loops.iter_mut().enumerate() {
        let mut depth = 0;
        for (j, body_j) in bodies.iter().enumerate() {
            if i != j && body_j.is_superset(&loop_i.body) {
                depth += 1;
            }
        }
        loop_i.depth = depth;
    }
}

/// Recognizes `tmp := x +/- c; x := tmp` chains whose header phi feeds
/// back into the same variable, the canonical basic-induction-variable
/// shape, then a second pass recognizing derived induction variables: an
/// affine function `base*k`, `base*k + c`, `base + c`, or a bare `base`
/// copy, of an already-classified basic induction variable (commutative
/// operand orderings included).
fn classify_induction_variables(function: &Function, body: &BTreeSet<BlockId>, header: BlockId) -> Vec<InductionVariable> {
    let mut result = Vec::new();
    let Some(header_block) = function.block(header) else { return result };

    let phi_vars: BTreeSet<String> = header_block
        .phis()
        .filter_map(|instr| match &instr.opcode {
            Opcode::Phi { var, .. } => Some(var.base.clone()),
            _ => None,
        })
        .collect();

    let mut per_block_defs: BTreeMap<BlockId, BTreeMap<u32, (BinaryOp, Value, Value)>> = BTreeMap::new();
    for &block_id in body {
        let Some(block) = function.block(block_id) else { continue };
        let mut binary_defs = BTreeMap::new();
        for instr in &block.instructions {
            if let Opcode::Binary { op, lhs, rhs } = &instr.opcode {
                if let Some(result_reg) = instr.result {
                    binary_defs.insert(result_reg.0, (*op, lhs.clone(), rhs.clone()));
                }
            }
        }
        per_block_defs.insert(block_id, binary_defs);
    }

    for &block_id in body {
        let Some(block) = function.block(block_id) else { continue };
        let binary_defs = &per_block_defs[&block_id];
        for instr in &block.instructions {
            let Opcode::StoreVar { var, value, .. } = &instr.opcode else { continue };
            if !phi_vars.contains(&var.base) {
                continue;
            }
            let Value::Reg(r) = value else { continue };
            let Some((op, lhs, rhs)) = binary_defs.get(&r.id.0) else { continue };
            if let Some(step) = self_referencing_step(&var.base, *op, lhs, rhs) {
                result.push(InductionVariable { variable: var.base.clone(), kind: InductionKind::Basic, step });
            }
        }
    }

    let biv_names: BTreeSet<String> = result.iter().map(|iv| iv.variable.clone()).collect();
    if biv_names.is_empty() {
        return result;
    }

    for &block_id in body {
        let Some(block) = function.block(block_id) else { continue };
        let binary_defs = &per_block_defs[&block_id];
        for instr in &block.instructions {
            let Opcode::StoreVar { var, value, .. } = &instr.opcode else { continue };
            if biv_names.contains(&var.base) {
                continue;
            }
            for biv in &biv_names {
                if var.base == *biv {
                    continue;
                }
                let Some((k, _c)) = resolve_affine_source(biv, binary_defs, value) else { continue };
                let biv_step = result.iter().find(|iv| iv.variable == *biv).map(|iv| iv.step).unwrap_or(0);
                result.push(InductionVariable {
                    variable: var.base.clone(),
                    kind: InductionKind::Derived,
                    step: k * biv_step,
                });
                break;
            }
        }
    }

    result
}

/// Resolves `value` as an affine function `base*k + c` of variable `base`,
/// recognizing `base` itself (`k=1, c=0`), `base*k`, `base + c`, and
/// `base*k + c`, with either operand order at each level.
fn resolve_affine_source(base: &str, binary_defs: &BTreeMap<u32, (BinaryOp, Value, Value)>, value: &Value) -> Option<(i64, i64)> {
    if is_base_var(value, base) {
        return Some((1, 0));
    }
    let Value::Reg(r) = value else { return None };
    let (op, lhs, rhs) = binary_defs.get(&r.id.0)?;
    match op {
        BinaryOp::Mul => mul_by_base(base, lhs, rhs).map(|k| (k, 0)),
        BinaryOp::Add => {
            if let Some(c) = add_offset_from_base(base, lhs, rhs) {
                return Some((1, c));
            }
            scaled_then_offset(base, binary_defs, lhs, rhs)
        }
        _ => None,
    }
}

fn is_base_var(value: &Value, base: &str) -> bool {
    matches!(value, Value::Var(var) if var.base == base)
}

fn mul_by_base(base: &str, lhs: &Value, rhs: &Value) -> Option<i64> {
    if is_base_var(lhs, base) {
        constant_of(rhs)
    } else if is_base_var(rhs, base) {
        constant_of(lhs)
    } else {
        None
    }
}

fn add_offset_from_base(base: &str, lhs: &Value, rhs: &Value) -> Option<i64> {
    if is_base_var(lhs, base) {
        constant_of(rhs)
    } else if is_base_var(rhs, base) {
        constant_of(lhs)
    } else {
        None
    }
}

/// Matches `(base*k) + c` or `c + (base*k)`, where the multiplication is a
/// register defined earlier in the same block.
fn scaled_then_offset(
    base: &str,
    binary_defs: &BTreeMap<u32, (BinaryOp, Value, Value)>,
    lhs: &Value,
    rhs: &Value,
) -> Option<(i64, i64)> {
    let (offset_side, mul_side) = if constant_of(rhs).is_some() {
        (rhs, lhs)
    } else if constant_of(lhs).is_some() {
        (lhs, rhs)
    } else {
        return None;
    };
    let c = constant_of(offset_side)?;
    let Value::Reg(r) = mul_side else { return None };
    let (mop, mlhs, mrhs) = binary_defs.get(&r.id.0)?;
    if !matches!(mop, BinaryOp::Mul) {
        return None;
    }
    mul_by_base(base, mlhs, mrhs).map(|k| (k, c))
}

fn self_referencing_step(base: &str, op: BinaryOp, lhs: &Value, rhs: &Value) -> Option<i64> {
    let references_base = |v: &Value| matches!(v, Value::Var(var) if var.base == base);
    match (op, references_base(lhs), references_base(rhs)) {
        (BinaryOp::Add, true, false) => constant_of(rhs),
        (BinaryOp::Add, false, true) => constant_of(lhs),
        (BinaryOp::Sub, true, false) => constant_of(rhs).map(|c| -c),
        _ => None,
    }
}

fn constant_of(value: &Value) -> Option<i64> {
    match value {
        Value::Const(c) => Some(c.value),
        _ => None,
    }
}

/// Loop-invariant code motion candidate set: every `StoreVar` whose value
/// depends only on definitions outside the loop body or on other
/// already-invariant definitions, computed as the transitive closure of
/// that rule rather than a single pass (so a chain `a := k; b := a + 1`
/// marks both `a` and `b` invariant, not just `a`).
fn loop_invariant_defs(function: &Function, body: &BTreeSet<BlockId>) -> BTreeSet<crate::common::types::InstrId> {
    let mut invariant = BTreeSet::new();
    let mut invariant_vars: BTreeSet<String> = BTreeSet::new();

    loop {
        let mut changed = false;
        for &block_id in body {
            let Some(block) = function.block(block_id) else { continue };
            for instr in &block.instructions {
                if invariant.contains(&instr.id) {
                    continue;
                }
                if let Opcode::StoreVar { var, value, .. } = &instr.opcode {
                    let depends_on_loop_var = match value {
                        Value::Var(v) => !invariant_vars.contains(&v.base) && defined_in_body(function, body, &v.base),
                        _ => false,
                    };
                    if !depends_on_loop_var {
                        invariant.insert(instr.id);
                        invariant_vars.insert(var.base.clone());
                        changed = true;
                    }
                }
            }
        }
        if !changed {
            break;
        }
    }

    invariant
}

fn defined_in_body(function: &Function, body: &BTreeSet<BlockId>, base: &str) -> bool {
    body.iter().any(|&block_id| {
        function.block(block_id).is_some_and(|block| {
            block.instructions.iter().any(|instr| match &instr.opcode {
                Opcode::StoreVar { var, .. } | Opcode::Phi { var, .. } => var.base == base,
                _ => false,
            })
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cfg::CfgBuilder;
    use crate::common::types::InstrId;
    use crate::dominance::dominators;
    use crate::ir::instruction::PhiSource;
    use crate::ir::types::IlType;
    use crate::ir::value::{Constant, VarRef};
    use crate::ir::{BasicBlock, Function, Instruction};

    fn counting_loop() -> Function {
        let mut f = Function::new("count", IlType::Void);
        let mut b0 = BasicBlock::new(BlockId(0), "bb0");
        b0.instructions.push(Instruction::new(InstrId(0), Opcode::Jump { target: BlockId(1) }));
        let mut header = BasicBlock::new(BlockId(1), "bb1");
        header.instructions.push(Instruction::new(
            InstrId(1),
            Opcode::Branch {
                cond: Value::Const(Constant::boolean(true)),
                then_block: BlockId(2),
                else_block: BlockId(3),
            },
        ));
        let mut body = BasicBlock::new(BlockId(2), "bb2");
        body.instructions.push(Instruction::new(
            InstrId(2),
            Opcode::StoreVar {
                var: VarRef::unversioned("limit"),
                ty: IlType::Byte,
                value: Value::Const(Constant::byte(10)),
            },
        ));
        body.instructions.push(Instruction::new(InstrId(3), Opcode::Jump { target: BlockId(1) }));
        let mut exit = BasicBlock::new(BlockId(3), "bb3");
        exit.instructions.push(Instruction::new(InstrId(4), Opcode::ReturnVoid));
        f.add_block(b0);
        f.add_block(header);
        f.add_block(body);
        f.add_block(exit);
        f
    }

    #[test]
    fn back_edge_forms_a_natural_loop_with_header_and_body() {
        let mut f = counting_loop();
        CfgBuilder::wire_edges(&mut f).unwrap();
        let cfg = Cfg::from_function(&f);
        let tree = dominators::compute(&cfg).unwrap();
        let forest = detect(&f, &cfg, &tree);
        assert_eq!(forest.loops.len(), 1);
        let l = &forest.loops[0];
        assert_eq!(l.header, BlockId(1));
        assert!(l.body.contains(&BlockId(2)));
        assert!(l.exit_blocks.contains(&BlockId(1)));
    }

    #[test]
    fn constant_store_in_loop_body_is_invariant() {
        let mut f = counting_loop();
        CfgBuilder::wire_edges(&mut f).unwrap();
        let cfg = Cfg::from_function(&f);
        let tree = dominators::compute(&cfg).unwrap();
        let forest = detect(&f, &cfg, &tree);
        assert!(forest.loops[0].invariant_defs.contains(&InstrId(2)));
    }

    /// `i` is a basic induction variable stepped by 1 in the header; `j`,
    /// stored in the body as `i*2 + 3`, is a derived induction variable.
    fn counting_loop_with_derived_variable() -> Function {
        use crate::common::types::VRegId;

        let mut f = Function::new("count", IlType::Void);
        let mut b0 = BasicBlock::new(BlockId(0), "bb0");
        b0.instructions.push(Instruction::new(InstrId(0), Opcode::Jump { target: BlockId(1) }));

        let mut header = BasicBlock::new(BlockId(1), "bb1");
        header.instructions.push(Instruction::new(
            InstrId(1),
            Opcode::Phi {
                var: VarRef::unversioned("i"),
                ty: IlType::Byte,
                sources: vec![
                    PhiSource { predecessor: BlockId(0), value: Value::Const(Constant::byte(0)) },
                    PhiSource { predecessor: BlockId(2), value: Value::Var(VarRef::unversioned("i")) },
                ],
            },
        ));
        header.instructions.push(Instruction::new(
            InstrId(2),
            Opcode::Branch {
                cond: Value::Const(Constant::boolean(true)),
                then_block: BlockId(2),
                else_block: BlockId(3),
            },
        ));

        let mut body = BasicBlock::new(BlockId(2), "bb2");
        body.instructions.push(
            Instruction::new(
                InstrId(3),
                Opcode::Binary { op: BinaryOp::Add, lhs: Value::Var(VarRef::unversioned("i")), rhs: Value::Const(Constant::byte(1)) },
            )
            .with_result(VRegId(0), IlType::Byte),
        );
        body.instructions.push(Instruction::new(
            InstrId(4),
            Opcode::StoreVar {
                var: VarRef::unversioned("i"),
                ty: IlType::Byte,
                value: Value::Reg(crate::ir::value::VReg::new(VRegId(0), IlType::Byte)),
            },
        ));
        body.instructions.push(
            Instruction::new(
                InstrId(5),
                Opcode::Binary { op: BinaryOp::Mul, lhs: Value::Var(VarRef::unversioned("i")), rhs: Value::Const(Constant::byte(2)) },
            )
            .with_result(VRegId(1), IlType::Byte),
        );
        body.instructions.push(
            Instruction::new(
                InstrId(6),
                Opcode::Binary {
                    op: BinaryOp::Add,
                    lhs: Value::Reg(crate::ir::value::VReg::new(VRegId(1), IlType::Byte)),
                    rhs: Value::Const(Constant::byte(3)),
                },
            )
            .with_result(VRegId(2), IlType::Byte),
        );
        body.instructions.push(Instruction::new(
            InstrId(7),
            Opcode::StoreVar {
                var: VarRef::unversioned("j"),
                ty: IlType::Byte,
                value: Value::Reg(crate::ir::value::VReg::new(VRegId(2), IlType::Byte)),
            },
        ));
        body.instructions.push(Instruction::new(InstrId(8), Opcode::Jump { target: BlockId(1) }));

        let mut exit = BasicBlock::new(BlockId(3), "bb3");
        exit.instructions.push(Instruction::new(InstrId(9), Opcode::ReturnVoid));

        f.add_block(b0);
        f.add_block(header);
        f.add_block(body);
        f.add_block(exit);
        f
    }

    #[test]
    fn affine_function_of_a_basic_induction_variable_is_classified_as_derived() {
        let mut f = counting_loop_with_derived_variable();
        CfgBuilder::wire_edges(&mut f).unwrap();
        let cfg = Cfg::from_function(&f);
        let tree = dominators::compute(&cfg).unwrap();
        let forest = detect(&f, &cfg, &tree);

        let ivs = &forest.loops[0].induction_variables;
        let i = ivs.iter().find(|iv| iv.variable == "i").expect("i must be classified");
        assert_eq!(i.kind, InductionKind::Basic);
        assert_eq!(i.step, 1);

        let j = ivs.iter().find(|iv| iv.variable == "j").expect("j must be classified as derived");
        assert_eq!(j.kind, InductionKind::Derived);
        assert_eq!(j.step, 2);
    }
}
