//! SSA construction: dominators -> frontiers -> definition collection ->
//! phi placement -> renaming, per the pipeline in §4.4.

use std::collections::{BTreeMap, BTreeSet};

use crate::cfg::Cfg;
use crate::common::errors::SsaError;
use crate::common::types::{BlockId, InstrId};
use crate::dominance::{dominators, frontier, DominanceFrontier, DominatorTree};
use crate::ir::function::Function;
use crate::ir::instruction::{Instruction, Opcode, PhiSource};
use crate::ir::types::IlType;
use crate::ir::value::{Value, VarRef};

/// The artifacts produced alongside a function's in-place SSA rewrite.
pub struct SsaBuildResult {
    pub dominators: DominatorTree,
    pub frontiers: DominanceFrontier,
    /// Base variable names that received at least one phi node.
    pub phi_placed_for: BTreeSet<String>,
}

/// Runs the full SSA construction pipeline over `function`, rewriting its
/// blocks in place.
pub fn construct(function: &mut Function) -> Result<SsaBuildResult, SsaError> {
    if function.is_empty() {
        return Ok(SsaBuildResult {
            dominators: dominators::compute(&Cfg::from_function(function))
                .unwrap_or_else(|_| empty_tree(function.entry)),
            frontiers: DominanceFrontier::default(),
            phi_placed_for: BTreeSet::new(),
        });
    }

    let cfg = Cfg::from_function(function);
    let tree = dominators::compute(&cfg).map_err(|_| SsaError::MissingPhi {
        variable: String::new(),
        block: function.entry,
    })?;
    let frontiers = frontier::compute(&cfg, &tree);

    let def_blocks = collect_definitions(function);
    let phi_placed_for = place_phis(function, &def_blocks, &frontiers);

    let mut renamer = Renamer::new(&tree, &phi_placed_for);
    renamer.rename_block(function, function.entry);

    Ok(SsaBuildResult {
        dominators: tree,
        frontiers,
        phi_placed_for,
    })
}

fn empty_tree(entry: BlockId) -> DominatorTree {
    // Only reachable for the degenerate empty-function case where
    // `dominators::compute` has nothing to do; callers never query it.
    let cfg = Cfg {
        entry,
        block_ids: vec![],
        predecessors: BTreeMap::new(),
        successors: BTreeMap::new(),
        exit_blocks: vec![],
        reducible: true,
    };
    dominators::compute(&cfg).unwrap_or_else(|_| {
        // compute() requires the entry to be contained; synthesize a
        // single-node tree directly as a last resort.
        let mut cfg = cfg;
        cfg.block_ids.push(entry);
        cfg.predecessors.insert(entry, vec![]);
        cfg.successors.insert(entry, vec![]);
        dominators::compute(&cfg).expect("single-node CFG always has a dominator tree")
    })
}

/// Scans every instruction for `store_var`, recording every block that
/// defines each base variable name.
fn collect_definitions(function: &Function) -> BTreeMap<String, BTreeSet<BlockId>> {
    let mut defs: BTreeMap<String, BTreeSet<BlockId>> = BTreeMap::new();
    for block in function.blocks_in_order() {
        for instr in &block.instructions {
            if let Opcode::StoreVar { var, .. } = &instr.opcode {
                defs.entry(var.base.clone()).or_default().insert(block.id);
            }
        }
    }
    defs
}

/// Places phi nodes for every variable at its iterated dominance frontier,
/// with pre-initialized (unfilled) operand slots so renaming can fill them
/// out of dominator-tree order.
fn place_phis(
    function: &mut Function,
    def_blocks: &BTreeMap<String, BTreeSet<BlockId>>,
    frontiers: &DominanceFrontier,
) -> BTreeSet<String> {
    let mut next_id = next_instr_id(function);
    let mut placed_for = BTreeSet::new();

    for (var, blocks) in def_blocks {
        let ty = variable_type(function, var);
        let placement = frontiers.iterated(blocks.iter().copied());
        if placement.is_empty() {
            continue;
        }
        placed_for.insert(var.clone());
        for block_id in placement {
            let preds = function
                .block(block_id)
                .map(|b| b.predecessors.clone())
                .unwrap_or_default();
            let block = function.block_mut(block_id).expect("placement target exists");
            let already_has_phi = block
                .instructions
                .iter()
                .any(|i| matches!(&i.opcode, Opcode::Phi { var: v, .. } if v.base == *var));
            if already_has_phi {
                continue;
            }
            let sources = preds
                .iter()
                .map(|&p| PhiSource {
                    predecessor: p,
                    value: Value::Var(VarRef::unversioned(var.clone())),
                })
                .collect();
            let phi = Instruction::new(
                next_id,
                Opcode::Phi {
                    var: VarRef::unversioned(var.clone()),
                    ty: ty.clone(),
                    sources,
                },
            );
            next_id = InstrId(next_id.0 + 1);
            let insert_at = block.instructions.iter().take_while(|i| i.is_phi()).count();
            block.instructions.insert(insert_at, phi);
        }
    }
    placed_for
}

fn next_instr_id(function: &Function) -> InstrId {
    let max = function
        .blocks_in_order()
        .flat_map(|b| b.instructions.iter())
        .map(|i| i.id.0)
        .max()
        .unwrap_or(0);
    InstrId(max + 1)
}

fn variable_type(function: &Function, var: &str) -> IlType {
    function
        .blocks_in_order()
        .flat_map(|b| b.instructions.iter())
        .find_map(|i| match &i.opcode {
            Opcode::StoreVar { var: v, ty, .. } if v.base == var => Some(ty.clone()),
            _ => None,
        })
        .unwrap_or(IlType::Void)
}

struct Renamer<'a> {
    tree: &'a DominatorTree,
    tracked: &'a BTreeSet<String>,
    counters: BTreeMap<String, u32>,
    stacks: BTreeMap<String, Vec<u32>>,
}

impl<'a> Renamer<'a> {
    fn new(tree: &'a DominatorTree, tracked: &'a BTreeSet<String>) -> Self {
        Self {
            tree,
            tracked,
            counters: BTreeMap::new(),
            stacks: BTreeMap::new(),
        }
    }

    fn fresh_version(&mut self, base: &str) -> u32 {
        let counter = self.counters.entry(base.to_string()).or_insert(0);
        let version = *counter;
        *counter += 1;
        self.stacks.entry(base.to_string()).or_default().push(version);
        version
    }

    fn current_version(&self, base: &str) -> Option<u32> {
        self.stacks.get(base).and_then(|s| s.last().copied())
    }

    fn snapshot(&self) -> BTreeMap<String, usize> {
        self.stacks.iter().map(|(k, v)| (k.clone(), v.len())).collect()
    }

    fn restore(&mut self, snapshot: BTreeMap<String, usize>) {
        // A base whose stack didn't exist yet when the snapshot was taken
        // must be popped back to empty, not left untouched, so it truncates
        // to `snapshot[base]` if present or 0 otherwise.
        let bases: Vec<String> = self.stacks.keys().cloned().collect();
        for base in bases {
            let target_len = snapshot.get(&base).copied().unwrap_or(0);
            if let Some(stack) = self.stacks.get_mut(&base) {
                stack.truncate(target_len);
            }
        }
    }

    fn rewrite_value(&self, value: &mut Value) {
        if let Value::Var(var) = value {
            if var.version.is_none() {
                if let Some(version) = self.current_version(&var.base) {
                    var.version = Some(version);
                }
            }
        }
    }

    fn rewrite_reads(&self, opcode: &mut Opcode) {
        match opcode {
            Opcode::Binary { lhs, rhs, .. } | Opcode::Compare { lhs, rhs, .. } => {
                self.rewrite_value(lhs);
                self.rewrite_value(rhs);
            }
            Opcode::Unary { operand, .. }
            | Opcode::ZeroExtend { operand }
            | Opcode::Truncate { operand } => {
                self.rewrite_value(operand);
            }
            Opcode::LoadVar { var, .. } => {
                if var.version.is_none() {
                    if let Some(version) = self.current_version(&var.base) {
                        var.version = Some(version);
                    }
                }
            }
            Opcode::StoreVar { value, .. } => {
                self.rewrite_value(value);
            }
            Opcode::LoadConst { value } => self.rewrite_value(value),
            Opcode::Branch { cond, .. } => self.rewrite_value(cond),
            Opcode::Call { args, .. } | Opcode::Intrinsic { args, .. } => {
                for arg in args {
                    self.rewrite_value(arg);
                }
            }
            Opcode::Return { value } => self.rewrite_value(value),
            Opcode::Jump { .. } | Opcode::ReturnVoid | Opcode::Phi { .. } => {}
        }
    }

    fn rename_block(&mut self, function: &mut Function, block_id: BlockId) {
        let snapshot = self.snapshot();

        let (children, successors) = {
            let block = function.block(block_id).expect("block exists");
            (self.tree.children(block_id).to_vec(), block.successors.clone())
        };

        let instructions = &mut function.block_mut(block_id).unwrap().instructions;
        for instr in instructions.iter_mut() {
            if let Opcode::Phi { var, .. } = &mut instr.opcode {
                if self.tracked.contains(&var.base) {
                    let version = self.fresh_version(&var.base);
                    var.version = Some(version);
                }
            }
        }
        for instr in instructions.iter_mut() {
            if instr.is_phi() {
                continue;
            }
            self.rewrite_reads(&mut instr.opcode);
            if let Opcode::StoreVar { var, .. } = &mut instr.opcode {
                let version = self.fresh_version(&var.base);
                var.version = Some(version);
            }
        }

        for succ in successors {
            if let Some(succ_block) = function.block_mut(succ) {
                for instr in succ_block.instructions.iter_mut() {
                    if !instr.is_phi() {
                        break;
                    }
                    if let Opcode::Phi { var, sources, .. } = &mut instr.opcode {
                        if let Some(current) = self.current_version(&var.base) {
                            for source in sources.iter_mut() {
                                if source.predecessor == block_id {
                                    source.value = Value::Var(VarRef::versioned(var.base.clone(), current));
                                }
                            }
                        }
                    }
                }
            }
        }

        for child in children {
            self.rename_block(function, child);
        }

        self.restore(snapshot);
    }
}
