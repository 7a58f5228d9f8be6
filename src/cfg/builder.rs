//! Partitions a function's linear instruction list into basic blocks and
//! wires predecessor/successor edges.

use std::collections::{BTreeMap, BTreeSet};

use crate::common::errors::CfgError;
use crate::common::types::BlockId;
use crate::ir::block::BasicBlock;
use crate::ir::function::Function;
use crate::ir::instruction::Instruction;

pub struct CfgBuilder;

impl CfgBuilder {
    /// Builds a function's blocks from a flat, ordered instruction stream.
    ///
    /// Block boundaries are introduced at: the first instruction; any
    /// instruction that is a branch/jump/return target; the instruction
    /// following a terminator. An empty instruction list produces an empty
    /// CFG with the entry id retained rather than an error.
    pub fn build_from_instructions(
        name: impl Into<String>,
        return_ty: crate::ir::types::IlType,
        instructions: Vec<Instruction>,
    ) -> Result<Function, CfgError> {
        let name = name.into();
        let mut function = Function::new(name.clone(), return_ty);
        if instructions.is_empty() {
            return Ok(function);
        }

        let leaders = Self::leader_offsets(&name, &instructions)?;

        let mut offset_to_block = BTreeMap::new();
        for (block_index, &leader_offset) in leaders.iter().enumerate() {
            offset_to_block.insert(leader_offset, BlockId(block_index as u32));
        }

        for (block_index, &leader_offset) in leaders.iter().enumerate() {
            let end = leaders
                .get(block_index + 1)
                .copied()
                .unwrap_or(instructions.len());
            let id = BlockId(block_index as u32);
            let mut block = BasicBlock::new(id, format!("bb{block_index}"));
            block.instructions = instructions[leader_offset..end].to_vec();
            function.add_block(block);
        }

        Self::wire_edges_with_offsets(&name, &mut function, &offset_to_block)?;
        Ok(function)
    }

    /// Offsets in `instructions` that begin a new basic block.
    ///
    /// Branch/jump targets in this IL already name block ids rather than
    /// instruction offsets (see §3/§6), so the only boundary this flat form
    /// needs to discover is "the instruction after a terminator".
    fn leader_offsets(_name: &str, instructions: &[Instruction]) -> Result<Vec<usize>, CfgError> {
        let mut leaders = BTreeSet::new();
        leaders.insert(0usize);
        for (offset, instr) in instructions.iter().enumerate() {
            if instr.is_terminator() && offset + 1 < instructions.len() {
                leaders.insert(offset + 1);
            }
        }
        Ok(leaders.into_iter().collect())
    }

    /// Recomputes predecessor/successor lists for an already block-split
    /// function from each block's terminator targets.
    pub fn wire_edges(function: &mut Function) -> Result<(), CfgError> {
        let name = function.name.clone();
        Self::wire_edges_inner(&name, function)
    }

    fn wire_edges_with_offsets(
        name: &str,
        function: &mut Function,
        _offset_to_block: &BTreeMap<usize, BlockId>,
    ) -> Result<(), CfgError> {
        Self::wire_edges_inner(name, function)
    }

    fn wire_edges_inner(name: &str, function: &mut Function) -> Result<(), CfgError> {
        let known_blocks: BTreeSet<BlockId> = function.blocks.keys().copied().collect();

        let mut edges: Vec<(BlockId, BlockId)> = Vec::new();
        let block_ids: Vec<BlockId> = known_blocks.iter().copied().collect();

        for &id in &block_ids {
            let block = function.block(id).expect("id came from function.blocks");
            match block.terminator() {
                Some(term) => {
                    for target in term.opcode.targets() {
                        if !known_blocks.contains(&target) {
                            return Err(CfgError::UnknownBranchTarget {
                                function: name.to_string(),
                                target: target.to_string(),
                            });
                        }
                        edges.push((id, target));
                    }
                }
                None => {
                    // Unterminated block: permitted only transiently, falls
                    // through to its textual successor.
                    if let Some(&next) = block_ids.iter().find(|&&b| b.0 == id.0 + 1) {
                        edges.push((id, next));
                    }
                }
            }
        }

        for block in function.blocks.values_mut() {
            block.predecessors.clear();
            block.successors.clear();
        }
        for (from, to) in edges {
            function.block_mut(from).unwrap().add_successor(to);
            function.block_mut(to).unwrap().add_predecessor(from);
        }

        Ok(())
    }
}
