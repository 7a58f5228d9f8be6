//! Basic blocks: maximal straight-line instruction sequences.

use serde::{Deserialize, Serialize};

use crate::common::types::BlockId;
use crate::ir::instruction::Instruction;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BasicBlock {
    pub id: BlockId,
    pub label: String,
    pub instructions: Vec<Instruction>,
    pub predecessors: Vec<BlockId>,
    pub successors: Vec<BlockId>,
}

impl BasicBlock {
    pub fn new(id: BlockId, label: impl Into<String>) -> Self {
        Self {
            id,
            label: label.into(),
            instructions: Vec::new(),
            predecessors: Vec::new(),
            successors: Vec::new(),
        }
    }

    /// The terminator, if the block is non-empty and well-formed.
    pub fn terminator(&self) -> Option<&Instruction> {
        self.instructions.last().filter(|i| i.is_terminator())
    }

    /// Phi instructions, which must occupy a prefix of the block.
    pub fn phis(&self) -> impl Iterator<Item = &Instruction> {
        self.instructions.iter().take_while(|i| i.is_phi())
    }

    pub fn non_phi_instructions(&self) -> impl Iterator<Item = &Instruction> {
        self.instructions.iter().skip_while(|i| i.is_phi())
    }

    pub fn add_predecessor(&mut self, block: BlockId) {
        if !self.predecessors.contains(&block) {
            self.predecessors.push(block);
            self.predecessors.sort();
        }
    }

    pub fn add_successor(&mut self, block: BlockId) {
        if !self.successors.contains(&block) {
            self.successors.push(block);
            self.successors.sort();
        }
    }

    pub fn is_exit(&self) -> bool {
        self.successors.is_empty()
            || matches!(
                self.instructions.last().map(|i| &i.opcode),
                Some(crate::ir::instruction::Opcode::Return { .. })
                    | Some(crate::ir::instruction::Opcode::ReturnVoid)
            )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn predecessors_stay_sorted_and_deduplicated() {
        let mut block = BasicBlock::new(BlockId(2), "bb2");
        block.add_predecessor(BlockId(1));
        block.add_predecessor(BlockId(0));
        block.add_predecessor(BlockId(1));
        assert_eq!(block.predecessors, vec![BlockId(0), BlockId(1)]);
    }

    #[test]
    fn empty_block_has_no_terminator() {
        let block = BasicBlock::new(BlockId(0), "bb0");
        assert!(block.terminator().is_none());
    }
}
