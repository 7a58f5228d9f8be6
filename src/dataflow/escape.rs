//! Escape and stack depth analysis: classifies which local variables
//! outlive the frame that defines them, and estimates worst-case stack
//! usage. The 6502 hardware stack is a single 256-byte page shared by
//! return addresses, `pha`/`php` pushes, and any stack-resident locals, so
//! a function whose worst-case call depth would overflow it needs to be
//! flagged before codegen.

use std::collections::{BTreeMap, BTreeSet};

use crate::common::errors::DataflowError;
use crate::ir::function::{Function, Module};
use crate::ir::instruction::Opcode;
use crate::ir::value::Value;

/// Bytes of stack a single call frame consumes: a 2-byte return address
/// plus one byte per `pha`/`php` intrinsic issued directly in the callee
/// (conservative: doesn't account for register-allocated locals spilled to
/// the stack, which a later pass may add to this estimate).
const RETURN_ADDRESS_BYTES: u16 = 2;

pub struct EscapeResult {
    /// Worst-case stack bytes consumed along any call chain starting at
    /// each function, including its own frame.
    pub max_depth_bytes: BTreeMap<String, u16>,
    pub over_budget: BTreeSet<String>,
    /// Base names of local variables that escape their defining
    /// function's frame, keyed by function name. Empty for a function
    /// where nothing escapes.
    pub escaping_vars: BTreeMap<String, BTreeSet<String>>,
}

/// Returns the base names of every local variable in `function` whose
/// value can outlive its defining frame: returned directly to the caller,
/// written into a module-level global, or passed by name into a call. On
/// this flat IL a variable used directly as a `Call` argument (rather
/// than loaded into a register first) is the only surviving way to pass
/// something other than a snapshot of its value, so it is treated as
/// retained by the callee.
fn classify_escapes(function: &Function, module: &Module) -> BTreeSet<String> {
    let mut escaping = BTreeSet::new();
    for block in function.blocks_in_order() {
        for instr in &block.instructions {
            match &instr.opcode {
                Opcode::Return { value: Value::Var(v) } => {
                    escaping.insert(v.base.clone());
                }
                Opcode::StoreVar { var, value: Value::Var(src), .. } if module.globals.contains_key(&var.base) => {
                    escaping.insert(src.base.clone());
                }
                Opcode::Call { args, .. } => {
                    for arg in args {
                        if let Value::Var(v) = arg {
                            escaping.insert(v.base.clone());
                        }
                    }
                }
                _ => {}
            }
        }
    }
    escaping
}

fn frame_bytes(function: &crate::ir::function::Function) -> u16 {
    let mut bytes = RETURN_ADDRESS_BYTES;
    for block in function.blocks_in_order() {
        for instr in &block.instructions {
            if let Opcode::Intrinsic { name, .. } = &instr.opcode {
                if name == "pha" || name == "php" {
                    bytes = bytes.saturating_add(1);
                }
            }
        }
    }
    bytes
}

fn callees(function: &crate::ir::function::Function) -> BTreeSet<String> {
    let mut out = BTreeSet::new();
    for block in function.blocks_in_order() {
        for instr in &block.instructions {
            if let Opcode::Call { callee, .. } = &instr.opcode {
                out.insert(callee.clone());
            }
        }
    }
    out
}

/// Estimates, for every function in `module`, the deepest stack usage along
/// any call path starting there. A call cycle (direct or mutual recursion)
/// has unbounded depth and is reported as `u16::MAX`.
pub fn analyze(module: &Module, budget: u16) -> Result<EscapeResult, DataflowError> {
    let mut memo: BTreeMap<String, u16> = BTreeMap::new();
    let mut in_progress = BTreeSet::new();
    let mut escaping_vars = BTreeMap::new();

    for (name, function) in &module.functions {
        depth_of(name, module, &mut memo, &mut in_progress);
        let escapes = classify_escapes(function, module);
        if !escapes.is_empty() {
            escaping_vars.insert(name.clone(), escapes);
        }
    }

    let over_budget = memo.iter().filter(|(_, &d)| d > budget).map(|(n, _)| n.clone()).collect();
    Ok(EscapeResult { max_depth_bytes: memo, over_budget, escaping_vars })
}

fn depth_of(name: &str, module: &Module, memo: &mut BTreeMap<String, u16>, in_progress: &mut BTreeSet<String>) -> u16 {
    if let Some(&d) = memo.get(name) {
        return d;
    }
    let Some(function) = module.function(name) else {
        return 0;
    };
    if !in_progress.insert(name.to_string()) {
        return u16::MAX;
    }

    let own_frame = frame_bytes(function);
    let deepest_callee = callees(function)
        .iter()
        .map(|callee| depth_of(callee, module, memo, in_progress))
        .max()
        .unwrap_or(0);

    in_progress.remove(name);
    let total = own_frame.saturating_add(deepest_callee);
    memo.insert(name.to_string(), total);
    total
}
