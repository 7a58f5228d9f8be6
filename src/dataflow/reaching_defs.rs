//! Reaching definitions: a forward, union (may) dataflow analysis over
//! variable assignments.
//!
//! Tracked at the granularity of `StoreVar` sites rather than SSA virtual
//! registers, since under SSA every register already has exactly one
//! static definition and reaching-defs would be a no-op; this analysis
//! earns its keep on pre-SSA IL, or on SSA IL that has been partially
//! rewritten by a later pass.

use std::collections::BTreeMap;

use bitvec::prelude::*;

use crate::cfg::Cfg;
use crate::common::errors::DataflowError;
use crate::common::types::{BlockId, InstrId};
use crate::ir::function::Function;
use crate::ir::instruction::Opcode;

/// One `StoreVar` instruction, identified by its position in program order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DefSite {
    pub block: BlockId,
    pub instr: InstrId,
    pub variable: String,
}

pub struct ReachingDefs {
    pub sites: Vec<DefSite>,
    pub reaching_in: BTreeMap<BlockId, BitVec>,
    pub reaching_out: BTreeMap<BlockId, BitVec>,
}

impl ReachingDefs {
    /// Definitions of `variable` live at the entry to `block`.
    pub fn reaching_at_entry(&self, block: BlockId, variable: &str) -> Vec<&DefSite> {
        let Some(bits) = self.reaching_in.get(&block) else { return Vec::new() };
        self.sites
            .iter()
            .enumerate()
            .filter(|(i, site)| site.variable == variable && bits[*i])
            .map(|(_, site)| site)
            .collect()
    }
}

pub fn compute(
    function: &Function,
    cfg: &Cfg,
    max_iterations: usize,
    wall_time_budget: Option<std::time::Duration>,
) -> Result<ReachingDefs, DataflowError> {
    let mut sites = Vec::new();
    for block in function.blocks_in_order() {
        for instr in &block.instructions {
            if let Opcode::StoreVar { var, .. } = &instr.opcode {
                sites.push(DefSite {
                    block: block.id,
                    instr: instr.id,
                    variable: var.base.clone(),
                });
            }
        }
    }
    let n = sites.len();

    let mut sites_by_var: BTreeMap<&str, Vec<usize>> = BTreeMap::new();
    for (i, site) in sites.iter().enumerate() {
        sites_by_var.entry(&site.variable).or_default().push(i);
    }

    let mut gen: BTreeMap<BlockId, BitVec> = BTreeMap::new();
    let mut kill: BTreeMap<BlockId, BitVec> = BTreeMap::new();

    for block in function.blocks_in_order() {
        let mut block_gen = bitvec![0; n];
        let mut killed_vars: std::collections::BTreeSet<&str> = std::collections::BTreeSet::new();
        for instr in &block.instructions {
            if let Opcode::StoreVar { var, .. } = &instr.opcode {
                killed_vars.insert(var.base.as_str());
                let idx = sites
                    .iter()
                    .position(|s| s.block == block.id && s.instr == instr.id)
                    .expect("site was just collected for this instruction");
                if let Some(same_var) = sites_by_var.get(var.base.as_str()) {
                    for &other in same_var {
                        if sites[other].block == block.id {
                            block_gen.set(other, false);
                        }
                    }
                }
                block_gen.set(idx, true);
            }
        }
        let mut block_kill = bitvec![0; n];
        for var in &killed_vars {
            if let Some(idxs) = sites_by_var.get(var) {
                for &idx in idxs {
                    block_kill.set(idx, true);
                }
            }
        }
        gen.insert(block.id, block_gen);
        kill.insert(block.id, block_kill);
    }

    let mut reaching_in: BTreeMap<BlockId, BitVec> = function.blocks.keys().map(|&b| (b, bitvec![0; n])).collect();
    let mut reaching_out: BTreeMap<BlockId, BitVec> = function.blocks.keys().map(|&b| (b, bitvec![0; n])).collect();

    let started = std::time::Instant::now();
    let mut iterations = 0;
    loop {
        if iterations >= max_iterations {
            return Err(DataflowError::DidNotConverge {
                analysis: "reaching_defs".to_string(),
                iterations,
            });
        }
        if let Some(budget) = wall_time_budget {
            let elapsed = started.elapsed();
            if elapsed > budget {
                return Err(DataflowError::WallTimeExceeded {
                    analysis: "reaching_defs".to_string(),
                    budget_ms: budget.as_millis(),
                    elapsed_ms: elapsed.as_millis(),
                    iterations,
                });
            }
        }
        iterations += 1;
        let mut changed = false;

        for block in function.blocks_in_order() {
            let mut new_in = bitvec![0; n];
            for &pred in cfg.predecessors(block.id) {
                if let Some(pred_out) = reaching_out.get(&pred) {
                    new_in |= pred_out.clone();
                }
            }
            let mut new_out = gen[&block.id].clone();
            let mut surviving = new_in.clone();
            surviving &= !kill[&block.id].clone();
            new_out |= surviving;

            if new_in != reaching_in[&block.id] {
                reaching_in.insert(block.id, new_in);
                changed = true;
            }
            if new_out != reaching_out[&block.id] {
                reaching_out.insert(block.id, new_out);
                changed = true;
            }
        }

        if !changed {
            break;
        }
    }

    Ok(ReachingDefs { sites, reaching_in, reaching_out })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cfg::CfgBuilder;
    use crate::common::types::InstrId;
    use crate::ir::types::IlType;
    use crate::ir::value::{Constant, Value, VarRef};
    use crate::ir::{BasicBlock, Function, Instruction};

    fn reassignment_in_two_blocks() -> Function {
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
            Opcode::StoreVar {
                var: VarRef::unversioned("x"),
                ty: IlType::Byte,
                value: Value::Const(Constant::byte(2)),
            },
        ));
        b1.instructions.push(Instruction::new(InstrId(3), Opcode::ReturnVoid));
        f.add_block(b0);
        f.add_block(b1);
        f
    }

    #[test]
    fn later_block_def_kills_earlier_one() {
        let mut f = reassignment_in_two_blocks();
        CfgBuilder::wire_edges(&mut f).unwrap();
        let cfg = Cfg::from_function(&f);
        let result = compute(&f, &cfg, 100, None).unwrap();
        assert_eq!(result.reaching_at_entry(BlockId(1), "x").len(), 1);
        assert_eq!(result.reaching_at_entry(BlockId(1), "x")[0].block, BlockId(0));
        let out1 = &result.reaching_out[&BlockId(1)];
        let def_in_b0 = result.sites.iter().position(|s| s.block == BlockId(0)).unwrap();
        assert!(!out1[def_in_b0], "bb0's def of x must not survive bb1's reassignment");
    }
}
