//! Immediate dominator computation via the Cooper-Harvey-Kennedy iterative
//! algorithm, and the dominator tree derived from it.
//!
//! This fixes a bug class present in some naive implementations, where
//! "the" immediate dominator collapses to "any other dominator" when a
//! block has more than one already-processed predecessor: intersecting two
//! candidate dominators must walk both chains to their true meeting point
//! (the finger method below), not just pick one side.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::cfg::Cfg;
use crate::common::errors::DominanceError;
use crate::common::types::BlockId;

const MAX_ITERATIONS: usize = 1000;

/// Immediate dominators over the blocks reachable from the entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DominatorTree {
    pub entry: BlockId,
    /// `idom[entry] == None`; every other reachable block maps to its
    /// immediate dominator.
    idom: BTreeMap<BlockId, Option<BlockId>>,
    children: BTreeMap<BlockId, Vec<BlockId>>,
    depth: BTreeMap<BlockId, u32>,
}

impl DominatorTree {
    pub fn idom(&self, block: BlockId) -> Option<BlockId> {
        self.idom.get(&block).copied().flatten()
    }

    pub fn children(&self, block: BlockId) -> &[BlockId] {
        self.children.get(&block).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn depth(&self, block: BlockId) -> Option<u32> {
        self.depth.get(&block).copied()
    }

    pub fn contains(&self, block: BlockId) -> bool {
        self.idom.contains_key(&block)
    }

    /// `a` dominates `b` iff `a == b` or `a` appears on `b`'s idom chain to the entry.
    pub fn dominates(&self, a: BlockId, b: BlockId) -> bool {
        if a == b {
            return self.contains(a);
        }
        let mut cur = b;
        while let Some(parent) = self.idom(cur) {
            if parent == a {
                return true;
            }
            cur = parent;
        }
        false
    }

    /// Strict dominance: `a` dominates `b` and `a != b`.
    pub fn strictly_dominates(&self, a: BlockId, b: BlockId) -> bool {
        a != b && self.dominates(a, b)
    }

    /// Preorder walk of the dominator tree, starting at the entry.
    pub fn preorder(&self) -> Vec<BlockId> {
        let mut out = Vec::new();
        let mut stack = vec![self.entry];
        while let Some(block) = stack.pop() {
            out.push(block);
            let mut kids = self.children(block).to_vec();
            kids.sort();
            kids.reverse();
            stack.extend(kids);
        }
        out
    }

    /// Postorder walk of the dominator tree.
    pub fn postorder(&self) -> Vec<BlockId> {
        let mut out = Vec::new();
        fn visit(tree: &DominatorTree, block: BlockId, out: &mut Vec<BlockId>) {
            let mut kids = tree.children(block).to_vec();
            kids.sort();
            for kid in kids {
                visit(tree, kid, out);
            }
            out.push(block);
        }
        visit(self, self.entry, &mut out);
        out
    }

    /// Materializes, for every reachable block, the full set of blocks it
    /// dominates (including itself). O(n^2) worst case; only worth calling
    /// on small functions, per the memory design note.
    pub fn dominated_sets(&self) -> BTreeMap<BlockId, BTreeSet<BlockId>> {
        let mut sets: BTreeMap<BlockId, BTreeSet<BlockId>> = BTreeMap::new();
        for &block in self.idom.keys() {
            sets.entry(block).or_default().insert(block);
        }
        for &block in self.idom.keys() {
            let mut cur = block;
            while let Some(parent) = self.idom(cur) {
                sets.entry(parent).or_default().insert(block);
                cur = parent;
            }
        }
        sets
    }
}

/// Computes the dominator tree for `cfg`, restricted to blocks reachable
/// from the entry. Unreachable blocks are simply absent from the tree.
pub fn compute(cfg: &Cfg) -> Result<DominatorTree, DominanceError> {
    if !cfg.contains(cfg.entry) {
        return Err(DominanceError::NoEntryBlock);
    }

    let rpo = reverse_post_order(cfg);
    let rpo_index: BTreeMap<BlockId, usize> = rpo.iter().enumerate().map(|(i, &b)| (b, i)).collect();

    let mut idom: BTreeMap<BlockId, Option<BlockId>> = BTreeMap::new();
    idom.insert(cfg.entry, None);

    let mut converged = false;
    let mut iterations = 0;
    while !converged && iterations < MAX_ITERATIONS {
        converged = true;
        iterations += 1;
        for &block in rpo.iter().skip(1) {
            let mut processed_preds = cfg
                .predecessors(block)
                .iter()
                .copied()
                .filter(|p| idom.contains_key(p));

            let Some(first) = processed_preds.next() else {
                continue;
            };
            let mut new_idom = first;
            for pred in processed_preds {
                new_idom = intersect(&idom, &rpo_index, new_idom, pred);
            }

            if idom.get(&block).copied().flatten() != Some(new_idom) {
                idom.insert(block, Some(new_idom));
                converged = false;
            }
        }
    }

    if !converged {
        return Err(DominanceError::DidNotConverge { iterations });
    }

    for &block in &rpo {
        if block != cfg.entry && idom.get(&block).copied().flatten().is_none() {
            return Err(DominanceError::UnreachableBlock { block });
        }
    }

    Ok(build_tree(cfg.entry, idom))
}

/// The "finger" method: walk both candidates up their idom chains in
/// lockstep by reverse-postorder index until they meet.
fn intersect(
    idom: &BTreeMap<BlockId, Option<BlockId>>,
    rpo_index: &BTreeMap<BlockId, usize>,
    mut a: BlockId,
    mut b: BlockId,
) -> BlockId {
    let index_of = |b: BlockId| rpo_index.get(&b).copied().unwrap_or(usize::MAX);
    while a != b {
        while index_of(a) > index_of(b) {
            a = idom.get(&a).copied().flatten().unwrap_or(a);
        }
        while index_of(b) > index_of(a) {
            b = idom.get(&b).copied().flatten().unwrap_or(b);
        }
    }
    a
}

fn reverse_post_order(cfg: &Cfg) -> Vec<BlockId> {
    let mut visited = BTreeSet::new();
    let mut postorder = Vec::new();

    fn visit(cfg: &Cfg, block: BlockId, visited: &mut BTreeSet<BlockId>, postorder: &mut Vec<BlockId>) {
        if !visited.insert(block) {
            return;
        }
        let mut succs = cfg.successors(block).to_vec();
        succs.sort();
        for succ in succs {
            visit(cfg, succ, visited, postorder);
        }
        postorder.push(block);
    }

    visit(cfg, cfg.entry, &mut visited, &mut postorder);
    postorder.reverse();
    postorder
}

fn build_tree(entry: BlockId, idom: BTreeMap<BlockId, Option<BlockId>>) -> DominatorTree {
    let mut children: BTreeMap<BlockId, Vec<BlockId>> = BTreeMap::new();
    for (&block, &parent) in &idom {
        if let Some(parent) = parent {
            children.entry(parent).or_default().push(block);
        }
    }
    for kids in children.values_mut() {
        kids.sort();
    }

    let mut depth: BTreeMap<BlockId, u32> = BTreeMap::new();
    depth.insert(entry, 0);
    let mut stack = vec![entry];
    while let Some(block) = stack.pop() {
        let d = depth[&block];
        for &child in children.get(&block).map(Vec::as_slice).unwrap_or(&[]) {
            depth.insert(child, d + 1);
            stack.push(child);
        }
    }

    DominatorTree {
        entry,
        idom,
        children,
        depth,
    }
}
