//! The IL validator: runs after any transformation and before code
//! generation. Every check is independently switchable via [`ValidationConfig`].

use crate::cfg::Cfg;
use crate::common::config::ValidationConfig;
use crate::common::types::BlockId;
use crate::dominance::DominatorTree;
use crate::diagnostics::{Diagnostic, DiagnosticBag, DiagnosticCode, Location};
use crate::ir::function::Function;
use crate::ir::instruction::Opcode;
use crate::ir::types::IlType;
use crate::ir::value::Value;
use crate::ssa;

/// Runs the configured validation checks over `function` and returns the
/// accumulated findings. Returns success (no errors) iff the IL is valid;
/// warnings are permitted.
pub fn validate(
    function: &Function,
    cfg: &Cfg,
    tree: Option<&DominatorTree>,
    config: &ValidationConfig,
) -> DiagnosticBag {
    let mut bag = DiagnosticBag::new();

    if config.check_terminators {
        check_terminators(function, &mut bag);
    }
    if config.check_cfg_symmetry {
        check_cfg_symmetry(cfg, function, &mut bag);
    }
    if config.check_types {
        check_types(function, &mut bag);
    }
    if config.check_ssa {
        if let Some(tree) = tree {
            check_ssa(function, cfg, tree, &mut bag);
        }
    }
    if config.check_phi_well_formedness {
        check_phi_well_formedness(function, cfg, &mut bag);
    }
    if config.check_constant_ranges {
        check_constant_ranges(function, &mut bag);
    }
    if config.check_reachability {
        check_reachability(cfg, function, &mut bag);
    }

    bag
}

/// Module-level checks: declared entry point exists, exports resolve.
pub fn validate_module(module: &crate::ir::function::Module, config: &ValidationConfig) -> DiagnosticBag {
    let mut bag = DiagnosticBag::new();
    if config.check_module && !module.resolves_exports() {
        bag.push(Diagnostic::error(
            DiagnosticCode::MissingEntryFunction,
            "module entry point or export does not resolve to a defined function",
        ));
    }
    bag
}

fn check_terminators(function: &Function, bag: &mut DiagnosticBag) {
    for block in function.blocks_in_order() {
        if block.instructions.is_empty() {
            continue;
        }
        if block.terminator().is_none() {
            bag.push(
                Diagnostic::error(
                    DiagnosticCode::MissingTerminator,
                    format!("block {} does not end in a terminator", block.id),
                )
                .at(Location::block(function.name.as_str(), block.id)),
            );
        }
        for (i, instr) in block.instructions.iter().enumerate() {
            let is_last = i + 1 == block.instructions.len();
            if instr.is_terminator() && !is_last {
                bag.push(
                    Diagnostic::error(
                        DiagnosticCode::MissingTerminator,
                        format!("terminator instruction {} is not the last instruction of its block", instr.id),
                    )
                    .at(Location::instruction(function.name.as_str(), block.id, instr.id)),
                );
            }
        }
    }
}

fn check_cfg_symmetry(cfg: &Cfg, function: &Function, bag: &mut DiagnosticBag) {
    if !cfg.is_symmetric() {
        bag.push(
            Diagnostic::error(DiagnosticCode::AsymmetricEdge, "predecessor/successor relation is not symmetric")
                .at(Location::function(function.name.as_str())),
        );
    }
    for block in function.blocks_in_order() {
        for instr in &block.instructions {
            for target in instr.opcode.targets() {
                if !cfg.contains(target) {
                    bag.push(
                        Diagnostic::error(
                            DiagnosticCode::AsymmetricEdge,
                            format!("instruction {} targets nonexistent block {target}", instr.id),
                        )
                        .at(Location::instruction(function.name.as_str(), block.id, instr.id)),
                    );
                }
            }
        }
    }
}

fn value_ty(value: &Value) -> Option<IlType> {
    match value {
        Value::Const(c) => Some(c.ty.clone()),
        Value::Reg(r) => Some(r.ty.clone()),
        Value::Var(_) => None,
    }
}

fn check_types(function: &Function, bag: &mut DiagnosticBag) {
    for block in function.blocks_in_order() {
        for instr in &block.instructions {
            let loc = || Location::instruction(function.name.as_str(), block.id, instr.id);
            match &instr.opcode {
                Opcode::Binary { op, lhs, rhs } => {
                    if let (Some(lt), Some(rt)) = (value_ty(lhs), value_ty(rhs)) {
                        if lt != rt {
                            bag.push(
                                Diagnostic::error(
                                    DiagnosticCode::TypeMismatch,
                                    format!("binary {op:?} operands have differing types {lt} vs {rt}"),
                                )
                                .at(loc()),
                            );
                        } else if let Some(result_ty) = &instr.result_ty {
                            if result_ty != &lt {
                                bag.push(
                                    Diagnostic::error(
                                        DiagnosticCode::TypeMismatch,
                                        "binary arithmetic result type must equal operand type",
                                    )
                                    .at(loc()),
                                );
                            }
                        }
                    }
                }
                Opcode::Compare { lhs, rhs, .. } => {
                    if let (Some(lt), Some(rt)) = (value_ty(lhs), value_ty(rhs)) {
                        if lt != rt {
                            bag.push(
                                Diagnostic::error(DiagnosticCode::TypeMismatch, "comparison operands have differing types")
                                    .at(loc()),
                            );
                        }
                    }
                    if let Some(result_ty) = &instr.result_ty {
                        if result_ty != &IlType::Bool {
                            bag.push(
                                Diagnostic::error(DiagnosticCode::TypeMismatch, "comparison result must be Bool").at(loc()),
                            );
                        }
                    }
                }
                Opcode::ZeroExtend { operand } => {
                    if let Some(t) = value_ty(operand) {
                        if t != IlType::Byte {
                            bag.push(
                                Diagnostic::error(DiagnosticCode::IllegalConversion, "zero_extend source must be Byte")
                                    .at(loc()),
                            );
                        }
                    }
                    if instr.result_ty.as_ref() != Some(&IlType::Word) {
                        bag.push(
                            Diagnostic::error(DiagnosticCode::IllegalConversion, "zero_extend target must be Word")
                                .at(loc()),
                        );
                    }
                }
                Opcode::Truncate { operand } => {
                    if let Some(t) = value_ty(operand) {
                        if t != IlType::Word {
                            bag.push(
                                Diagnostic::error(DiagnosticCode::IllegalConversion, "truncate source must be Word")
                                    .at(loc()),
                            );
                        }
                    }
                    if instr.result_ty.as_ref() != Some(&IlType::Byte) {
                        bag.push(
                            Diagnostic::error(DiagnosticCode::IllegalConversion, "truncate target must be Byte").at(loc()),
                        );
                    }
                }
                Opcode::Branch { cond, .. } => {
                    if let Some(t) = value_ty(cond) {
                        if t != IlType::Bool && t != IlType::Byte {
                            bag.push(
                                Diagnostic::error(
                                    DiagnosticCode::BadBranchCondition,
                                    format!("branch condition must be Bool or Byte, found {t}"),
                                )
                                .at(loc()),
                            );
                        }
                    }
                }
                Opcode::Return { value } => {
                    if let Some(t) = value_ty(value) {
                        if t == IlType::Void {
                            bag.push(
                                Diagnostic::error(
                                    DiagnosticCode::TypeMismatch,
                                    "returning Void is not allowed; use return_void",
                                )
                                .at(loc()),
                            );
                        }
                    }
                }
                _ => {}
            }
        }
    }
}

fn check_ssa(function: &Function, cfg: &Cfg, tree: &DominatorTree, bag: &mut DiagnosticBag) {
    for error in ssa::verify(function, cfg, tree) {
        let code = match &error {
            crate::common::errors::SsaError::MultipleDefinitions { .. } => DiagnosticCode::MultipleDefinitions,
            crate::common::errors::SsaError::UseNotDominated { .. } => DiagnosticCode::UseNotDominated,
            crate::common::errors::SsaError::PhiMissingOperand { .. } => DiagnosticCode::PhiOperandMismatch,
            crate::common::errors::SsaError::PhiTypeMismatch { .. } => DiagnosticCode::PhiOperandMismatch,
            crate::common::errors::SsaError::MissingPhi { .. } => DiagnosticCode::MissingPhi,
        };
        bag.push(Diagnostic::error(code, error.to_string()).at(Location::function(function.name.as_str())));
    }
}

fn check_phi_well_formedness(function: &Function, cfg: &Cfg, bag: &mut DiagnosticBag) {
    for block in function.blocks_in_order() {
        let prefix_len = block.instructions.iter().take_while(|i| i.is_phi()).count();
        for (i, instr) in block.instructions.iter().enumerate() {
            if instr.is_phi() && i >= prefix_len {
                bag.push(
                    Diagnostic::error(
                        DiagnosticCode::PhiOperandMismatch,
                        "phi instruction does not occupy the block's prefix",
                    )
                    .at(Location::instruction(function.name.as_str(), block.id, instr.id)),
                );
            }
        }
        let expected: std::collections::BTreeSet<BlockId> = cfg.predecessors(block.id).iter().copied().collect();
        for instr in block.phis() {
            if let Opcode::Phi { sources, .. } = &instr.opcode {
                let actual: std::collections::BTreeSet<BlockId> = sources.iter().map(|s| s.predecessor).collect();
                if actual != expected {
                    bag.push(
                        Diagnostic::error(
                            DiagnosticCode::PhiOperandMismatch,
                            "phi does not have exactly one source per predecessor",
                        )
                        .at(Location::instruction(function.name.as_str(), block.id, instr.id)),
                    );
                }
            }
        }
    }
}

fn check_constant_ranges(function: &Function, bag: &mut DiagnosticBag) {
    for block in function.blocks_in_order() {
        for instr in &block.instructions {
            let consts = constants_in(&instr.opcode);
            for c in consts {
                if !c.in_range() {
                    let severity = if c.ty == IlType::Bool {
                        crate::diagnostics::Severity::Warning
                    } else {
                        crate::diagnostics::Severity::Error
                    };
                    bag.push(
                        Diagnostic::new(
                            severity,
                            DiagnosticCode::ConstantOutOfRange,
                            format!("constant {} out of range for {}", c.value, c.ty),
                        )
                        .at(Location::instruction(function.name.as_str(), block.id, instr.id)),
                    );
                }
            }
        }
    }
}

fn constants_in(opcode: &Opcode) -> Vec<&crate::ir::value::Constant> {
    fn from_value(v: &Value, out: &mut Vec<&crate::ir::value::Constant>) {
        if let Value::Const(c) = v {
            out.push(c);
        }
    }
    let mut out = Vec::new();
    match opcode {
        Opcode::Binary { lhs, rhs, .. } | Opcode::Compare { lhs, rhs, .. } => {
            from_value(lhs, &mut out);
            from_value(rhs, &mut out);
        }
        Opcode::Unary { operand, .. } | Opcode::ZeroExtend { operand } | Opcode::Truncate { operand } => {
            from_value(operand, &mut out);
        }
        Opcode::StoreVar { value, .. } => from_value(value, &mut out),
        Opcode::LoadConst { value } => from_value(value, &mut out),
        Opcode::Branch { cond, .. } => from_value(cond, &mut out),
        Opcode::Call { args, .. } | Opcode::Intrinsic { args, .. } => {
            for a in args {
                from_value(a, &mut out);
            }
        }
        Opcode::Return { value } => from_value(value, &mut out),
        Opcode::Phi { sources, .. } => {
            for source in sources {
                from_value(&source.value, &mut out);
            }
        }
        _ => {}
    }
    out
}

fn check_reachability(cfg: &Cfg, function: &Function, bag: &mut DiagnosticBag) {
    for block in cfg.unreachable_blocks() {
        bag.push(
            Diagnostic::warning(DiagnosticCode::UnreachableBlock, format!("block {block} is unreachable"))
                .at(Location::block(function.name.as_str(), block)),
        );
    }
}
