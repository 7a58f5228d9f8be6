//! Liveness: a backward, union dataflow analysis over variable reads,
//! plus the live ranges, interference graph, and spill priorities built on
//! top of it for register/zero-page allocation.

use std::collections::{BTreeMap, BTreeSet};

use crate::cfg::Cfg;
use crate::common::errors::DataflowError;
use crate::common::types::BlockId;
use crate::ir::function::Function;
use crate::ir::instruction::Opcode;
use crate::ir::value::{Value, VarRef};

pub struct LivenessResult {
    pub live_in: BTreeMap<BlockId, BTreeSet<String>>,
    pub live_out: BTreeMap<BlockId, BTreeSet<String>>,
}

impl LivenessResult {
    pub fn is_live_out(&self, block: BlockId, variable: &str) -> bool {
        self.live_out.get(&block).is_some_and(|set| set.contains(variable))
    }

    /// Variables that interfere: live simultaneously at the exit of some block.
    /// Conservative (block-granularity) approximation of true interference.
    pub fn interference_graph(&self) -> BTreeMap<String, BTreeSet<String>> {
        let mut graph: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
        for live in self.live_out.values() {
            for a in live {
                for b in live {
                    if a != b {
                        graph.entry(a.clone()).or_default().insert(b.clone());
                    }
                }
                graph.entry(a.clone()).or_default();
            }
        }
        graph
    }

    /// Spill priority: variables with many interference neighbors and a short
    /// live range (few blocks they're live across) are the cheapest to spill.
    /// Lower score spills first.
    pub fn spill_priorities(&self) -> BTreeMap<String, f64> {
        let graph = self.interference_graph();
        let mut span: BTreeMap<String, u32> = BTreeMap::new();
        for live in self.live_out.values() {
            for var in live {
                *span.entry(var.clone()).or_insert(0) += 1;
            }
        }
        graph
            .iter()
            .map(|(var, neighbors)| {
                let degree = neighbors.len().max(1) as f64;
                let live_span = *span.get(var).unwrap_or(&1) as f64;
                (var.clone(), live_span / degree)
            })
            .collect()
    }
}

fn var_key(var: &VarRef) -> String {
    var.to_string()
}

fn uses_in_opcode(opcode: &Opcode) -> Vec<String> {
    let mut uses = Vec::new();
    let mut push = |v: &Value| {
        if let Value::Var(var) = v {
            uses.push(var_key(var));
        }
    };
    match opcode {
        Opcode::Binary { lhs, rhs, .. } | Opcode::Compare { lhs, rhs, .. } => {
            push(lhs);
            push(rhs);
        }
        Opcode::Unary { operand, .. } | Opcode::ZeroExtend { operand } | Opcode::Truncate { operand } => push(operand),
        Opcode::LoadVar { var, .. } => uses.push(var_key(var)),
        Opcode::StoreVar { value, .. } => push(value),
        Opcode::LoadConst { value } => push(value),
        Opcode::Branch { cond, .. } => push(cond),
        Opcode::Call { args, .. } | Opcode::Intrinsic { args, .. } => args.iter().for_each(|a| push(a)),
        Opcode::Return { value } => push(value),
        Opcode::Phi { sources, .. } => sources.iter().for_each(|s| push(&s.value)),
        Opcode::Jump { .. } | Opcode::ReturnVoid => {}
    }
    uses
}

fn def_in_opcode(opcode: &Opcode) -> Option<String> {
    match opcode {
        Opcode::StoreVar { var, .. } | Opcode::Phi { var, .. } => Some(var_key(var)),
        _ => None,
    }
}

pub fn compute(
    function: &Function,
    cfg: &Cfg,
    max_iterations: usize,
    wall_time_budget: Option<std::time::Duration>,
) -> Result<LivenessResult, DataflowError> {
    let mut use_set: BTreeMap<BlockId, BTreeSet<String>> = BTreeMap::new();
    let mut def_set: BTreeMap<BlockId, BTreeSet<String>> = BTreeMap::new();

    for block in function.blocks_in_order() {
        let mut uses = BTreeSet::new();
        let mut defs = BTreeSet::new();
        for instr in &block.instructions {
            for used in uses_in_opcode(&instr.opcode) {
                if !defs.contains(&used) {
                    uses.insert(used);
                }
            }
            if let Some(defined) = def_in_opcode(&instr.opcode) {
                defs.insert(defined);
            }
        }
        use_set.insert(block.id, uses);
        def_set.insert(block.id, defs);
    }

    let mut live_in: BTreeMap<BlockId, BTreeSet<String>> = function.blocks.keys().map(|&b| (b, BTreeSet::new())).collect();
    let mut live_out: BTreeMap<BlockId, BTreeSet<String>> = function.blocks.keys().map(|&b| (b, BTreeSet::new())).collect();

    let started = std::time::Instant::now();
    let mut iterations = 0;
    loop {
        if iterations >= max_iterations {
            return Err(DataflowError::DidNotConverge {
                analysis: "liveness".to_string(),
                iterations,
            });
        }
        if let Some(budget) = wall_time_budget {
            let elapsed = started.elapsed();
            if elapsed > budget {
                return Err(DataflowError::WallTimeExceeded {
                    analysis: "liveness".to_string(),
                    budget_ms: budget.as_millis(),
                    elapsed_ms: elapsed.as_millis(),
                    iterations,
                });
            }
        }
        iterations += 1;
        let mut changed = false;

        for block in function.blocks_in_order() {
            let mut new_out = BTreeSet::new();
            for &succ in cfg.successors(block.id) {
                new_out.extend(live_in[&succ].iter().cloned());
            }
            let mut new_in = use_set[&block.id].clone();
            for var in &new_out {
                if !def_set[&block.id].contains(var) {
                    new_in.insert(var.clone());
                }
            }

            if new_in != live_in[&block.id] {
                live_in.insert(block.id, new_in);
                changed = true;
            }
            if new_out != live_out[&block.id] {
                live_out.insert(block.id, new_out);
                changed = true;
            }
        }

        if !changed {
            break;
        }
    }

    Ok(LivenessResult { live_in, live_out })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cfg::CfgBuilder;
    use crate::common::types::{BlockId, InstrId};
    use crate::ir::types::IlType;
    use crate::ir::value::Constant;
    use crate::ir::{BasicBlock, Function, Instruction};

    fn def_then_use_across_blocks() -> Function {
        let mut f = Function::new("f", IlType::Void);
        let mut b0 = BasicBlock::new(BlockId(0), "bb0");
        b0.instructions.push(Instruction::new(
            InstrId(0),
            Opcode::StoreVar {
                var: VarRef::unversioned("x"),
                ty: IlType::Byte,
                value: Value::Const(Constant::byte(1)),
            },
        ));
        b0.instructions.push(Instruction::new(InstrId(1), Opcode::Jump { target: BlockId(1) }));
        let mut b1 = BasicBlock::new(BlockId(1), "bb1");
        b1.instructions.push(Instruction::new(
            InstrId(2),
            Opcode::Return {
                value: Value::Var(VarRef::unversioned("x")),
            },
        ));
        f.add_block(b0);
        f.add_block(b1);
        f
    }

    #[test]
    fn variable_is_live_out_of_defining_block() {
        let mut f = def_then_use_across_blocks();
        CfgBuilder::wire_edges(&mut f).unwrap();
        let cfg = Cfg::from_function(&f);
        let result = compute(&f, &cfg, 100, None).unwrap();
        assert!(result.is_live_out(BlockId(0), "x"));
        assert!(result.live_in[&BlockId(1)].contains("x"));
        assert!(!result.live_in[&BlockId(0)].contains("x"));
    }
}
