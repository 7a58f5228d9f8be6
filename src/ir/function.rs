//! Functions and modules: the top-level containers of IL.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::common::types::BlockId;
use crate::ir::block::BasicBlock;
use crate::ir::types::IlType;
use crate::ir::value::VReg;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Parameter {
    pub reg: VReg,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Function {
    pub name: String,
    pub params: Vec<Parameter>,
    pub return_ty: IlType,
    /// Keyed by block id; iteration for passes always goes through
    /// `blocks_in_order`, which is ascending by id.
    pub blocks: BTreeMap<BlockId, BasicBlock>,
    pub entry: BlockId,
}

impl Function {
    pub fn new(name: impl Into<String>, return_ty: IlType) -> Self {
        Self {
            name: name.into(),
            params: Vec::new(),
            return_ty,
            blocks: BTreeMap::new(),
            entry: BlockId::ENTRY,
        }
    }

    pub fn add_block(&mut self, block: BasicBlock) {
        self.blocks.insert(block.id, block);
    }

    pub fn block(&self, id: BlockId) -> Option<&BasicBlock> {
        self.blocks.get(&id)
    }

    pub fn block_mut(&mut self, id: BlockId) -> Option<&mut BasicBlock> {
        self.blocks.get_mut(&id)
    }

    /// Blocks in ascending id order, the deterministic iteration order every
    /// pass in this crate relies on.
    pub fn blocks_in_order(&self) -> impl Iterator<Item = &BasicBlock> {
        self.blocks.values()
    }

    pub fn exit_blocks(&self) -> Vec<BlockId> {
        self.blocks_in_order()
            .filter(|b| b.is_exit())
            .map(|b| b.id)
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GlobalVariable {
    pub name: String,
    pub ty: IlType,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Module {
    pub name: String,
    pub functions: BTreeMap<String, Function>,
    pub globals: BTreeMap<String, GlobalVariable>,
    pub exports: Vec<String>,
    pub entry_point: Option<String>,
}

impl Module {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            functions: BTreeMap::new(),
            globals: BTreeMap::new(),
            exports: Vec::new(),
            entry_point: None,
        }
    }

    pub fn add_function(&mut self, function: Function) {
        self.functions.insert(function.name.clone(), function);
    }

    pub fn function(&self, name: &str) -> Option<&Function> {
        self.functions.get(name)
    }

    /// Checks that the declared entry point and every export resolve to a
    /// defined function.
    pub fn resolves_exports(&self) -> bool {
        let entry_ok = self
            .entry_point
            .as_ref()
            .map_or(true, |e| self.functions.contains_key(e));
        let exports_ok = self.exports.iter().all(|e| self.functions.contains_key(e));
        entry_ok && exports_ok
    }
}

impl Default for GlobalVariable {
    fn default() -> Self {
        Self {
            name: String::new(),
            ty: IlType::Void,
        }
    }
}
