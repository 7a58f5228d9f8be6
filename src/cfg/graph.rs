//! The control-flow graph itself: an arena of blocks plus a derived edge
//! list. No direct back-pointers; everything references blocks by id.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::common::types::BlockId;
use crate::ir::function::Function;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CfgEdge {
    pub from: BlockId,
    pub to: BlockId,
}

/// A validated control-flow graph over one function's blocks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Cfg {
    pub entry: BlockId,
    /// Every block id that exists, in ascending order.
    pub block_ids: Vec<BlockId>,
    pub predecessors: BTreeMap<BlockId, Vec<BlockId>>,
    pub successors: BTreeMap<BlockId, Vec<BlockId>>,
    pub exit_blocks: Vec<BlockId>,
    pub reducible: bool,
}

impl Cfg {
    /// Builds the graph view directly from a function's already-wired
    /// block predecessor/successor lists (see [`crate::cfg::builder`]).
    pub fn from_function(function: &Function) -> Self {
        let mut block_ids: Vec<BlockId> = function.blocks.keys().copied().collect();
        block_ids.sort();

        let mut predecessors = BTreeMap::new();
        let mut successors = BTreeMap::new();
        for block in function.blocks_in_order() {
            predecessors.insert(block.id, block.predecessors.clone());
            successors.insert(block.id, block.successors.clone());
        }

        Self {
            entry: function.entry,
            block_ids,
            exit_blocks: function.exit_blocks(),
            reducible: true,
            predecessors,
            successors,
        }
    }

    pub fn predecessors(&self, block: BlockId) -> &[BlockId] {
        self.predecessors.get(&block).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn successors(&self, block: BlockId) -> &[BlockId] {
        self.successors.get(&block).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn contains(&self, block: BlockId) -> bool {
        self.predecessors.contains_key(&block)
    }

    /// Predecessor/successor relation is symmetric: true iff `S ∈ succ(P) ⇔ P ∈ pred(S)`.
    pub fn is_symmetric(&self) -> bool {
        for (&p, succs) in &self.successors {
            for &s in succs {
                if !self.predecessors(s).contains(&p) {
                    return false;
                }
            }
        }
        for (&s, preds) in &self.predecessors {
            for &p in preds {
                if !self.successors(p).contains(&s) {
                    return false;
                }
            }
        }
        true
    }

    pub fn edges(&self) -> Vec<CfgEdge> {
        let mut edges = Vec::new();
        for (&from, succs) in &self.successors {
            for &to in succs {
                edges.push(CfgEdge { from, to });
            }
        }
        edges.sort();
        edges
    }

    /// Depth-first reachability from the entry block.
    pub fn reachable_from_entry(&self) -> Vec<BlockId> {
        let mut visited = Vec::new();
        let mut stack = vec![self.entry];
        let mut seen = std::collections::BTreeSet::new();
        seen.insert(self.entry);
        while let Some(block) = stack.pop() {
            visited.push(block);
            for &succ in self.successors(block) {
                if seen.insert(succ) {
                    stack.push(succ);
                }
            }
        }
        visited.sort();
        visited
    }

    pub fn unreachable_blocks(&self) -> Vec<BlockId> {
        let reachable: std::collections::BTreeSet<_> = self.reachable_from_entry().into_iter().collect();
        self.block_ids
            .iter()
            .copied()
            .filter(|b| !reachable.contains(b))
            .collect()
    }

    /// Renders the graph as a Graphviz dot document, for debugging.
    pub fn to_dot(&self, name: &str) -> String {
        let mut out = format!("digraph {name} {{\n");
        for &block in &self.block_ids {
            out.push_str(&format!("  {block} [label=\"{block}\"];\n"));
        }
        for edge in self.edges() {
            out.push_str(&format!("  {} -> {};\n", edge.from, edge.to));
        }
        out.push_str("}\n");
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cfg::builder::CfgBuilder;
    use crate::ir::instruction::Opcode;
    use crate::ir::value::{Constant, Value};
    use crate::ir::{BasicBlock, Function, IlType, Instruction};
    use crate::common::types::InstrId;

    fn diamond_function() -> Function {
        let mut f = Function::new("diamond", IlType::Void);
        let mut b0 = BasicBlock::new(BlockId(0), "bb0");
        b0.instructions.push(Instruction::new(
            InstrId(0),
            Opcode::Branch {
                cond: Value::Const(Constant::boolean(true)),
                then_block: BlockId(1),
                else_block: BlockId(2),
            },
        ));
        let mut b1 = BasicBlock::new(BlockId(1), "bb1");
        b1.instructions.push(Instruction::new(InstrId(1), Opcode::Jump { target: BlockId(3) }));
        let mut b2 = BasicBlock::new(BlockId(2), "bb2");
        b2.instructions.push(Instruction::new(InstrId(2), Opcode::Jump { target: BlockId(3) }));
        let mut b3 = BasicBlock::new(BlockId(3), "bb3");
        b3.instructions.push(Instruction::new(InstrId(3), Opcode::ReturnVoid));
        f.add_block(b0);
        f.add_block(b1);
        f.add_block(b2);
        f.add_block(b3);
        f
    }

    #[test]
    fn diamond_cfg_is_symmetric_and_fully_reachable() {
        let mut f = diamond_function();
        CfgBuilder::wire_edges(&mut f).unwrap();
        let cfg = Cfg::from_function(&f);
        assert!(cfg.is_symmetric());
        assert_eq!(cfg.unreachable_blocks(), Vec::<BlockId>::new());
        assert_eq!(cfg.exit_blocks, vec![BlockId(3)]);
    }
}
