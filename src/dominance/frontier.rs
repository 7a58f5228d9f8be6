//! Dominance frontier computation and iterated frontier (DF+).

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::cfg::Cfg;
use crate::common::types::BlockId;
use crate::dominance::dominators::DominatorTree;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DominanceFrontier {
    frontier: BTreeMap<BlockId, BTreeSet<BlockId>>,
}

impl DominanceFrontier {
    pub fn of(&self, block: BlockId) -> BTreeSet<BlockId> {
        self.frontier.get(&block).cloned().unwrap_or_default()
    }

    /// The iterated dominance frontier of a set of blocks: the closure of
    /// adding frontiers of newly discovered blocks until stable.
    pub fn iterated(&self, seeds: impl IntoIterator<Item = BlockId>) -> BTreeSet<BlockId> {
        let mut result: BTreeSet<BlockId> = BTreeSet::new();
        let mut worklist: Vec<BlockId> = seeds.into_iter().collect();
        while let Some(block) = worklist.pop() {
            for df_block in self.of(block) {
                if result.insert(df_block) {
                    worklist.push(df_block);
                }
            }
        }
        result
    }
}

/// For each block `b` with two or more predecessors, walk up the dominator
/// chain from each predecessor, adding `b` to every ancestor's frontier up
/// to (but not including) `idom(b)`.
pub fn compute(cfg: &Cfg, tree: &DominatorTree) -> DominanceFrontier {
    let mut frontier: BTreeMap<BlockId, BTreeSet<BlockId>> = BTreeMap::new();

    for &block in &cfg.block_ids {
        let preds = cfg.predecessors(block);
        if preds.len() < 2 || !tree.contains(block) {
            continue;
        }
        let stop_at = tree.idom(block);
        for &pred in preds {
            if !tree.contains(pred) {
                continue;
            }
            let mut runner = pred;
            loop {
                if Some(runner) == stop_at {
                    break;
                }
                frontier.entry(runner).or_default().insert(block);
                match tree.idom(runner) {
                    Some(parent) => runner = parent,
                    None => break,
                }
            }
        }
    }

    DominanceFrontier { frontier }
}
