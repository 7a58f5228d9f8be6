//! Error types for the 6502 mid-end.

use thiserror::Error;

use crate::common::types::BlockId;

/// Result alias used throughout the mid-end.
pub type MidendResult<T> = Result<T, MidendError>;

/// Top-level error aggregating every layer of the pipeline.
#[derive(Error, Debug)]
pub enum MidendError {
    #[error("CFG construction error: {0}")]
    Cfg(#[from] CfgError),

    #[error("dominance computation error: {0}")]
    Dominance(#[from] DominanceError),

    #[error("SSA construction error: {0}")]
    Ssa(#[from] SsaError),

    #[error("IL validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("dataflow analysis error: {0}")]
    Dataflow(#[from] DataflowError),

    #[error("target analysis error: {0}")]
    Target(#[from] TargetError),

    #[error("intrinsic registry error: {0}")]
    Intrinsic(#[from] IntrinsicError),

    #[error("internal error: {0}")]
    Internal(String),
}

/// Errors raised while building a control-flow graph from a linear
/// instruction stream.
#[derive(Error, Debug)]
pub enum CfgError {
    #[error("function {function} has no instructions")]
    EmptyFunction { function: String },

    #[error("branch target {target} does not exist in function {function}")]
    UnknownBranchTarget { function: String, target: String },

    #[error("block {block} falls through without a terminator")]
    MissingTerminator { block: BlockId },

    #[error("block {block} has a terminator that is not its last instruction")]
    TerminatorNotLast { block: BlockId },

    #[error("block {block} is referenced as a successor but was never built")]
    DanglingSuccessor { block: BlockId },
}

/// Errors raised while computing dominator trees or dominance frontiers.
#[derive(Error, Debug)]
pub enum DominanceError {
    #[error("function has no entry block")]
    NoEntryBlock,

    #[error("block {block} is unreachable from the entry block")]
    UnreachableBlock { block: BlockId },

    #[error("dominator fixed point did not converge after {iterations} iterations")]
    DidNotConverge { iterations: usize },
}

/// Errors raised during SSA construction or verification.
#[derive(Error, Debug)]
pub enum SsaError {
    #[error("variable {variable} is defined more than once at {block}")]
    MultipleDefinitions { variable: String, block: BlockId },

    #[error("use of {variable} at {block} is not dominated by any definition")]
    UseNotDominated { variable: String, block: BlockId },

    #[error("phi node for {variable} in {block} is missing an operand for predecessor {predecessor}")]
    PhiMissingOperand {
        variable: String,
        block: BlockId,
        predecessor: BlockId,
    },

    #[error("phi node for {variable} in {block} has operands of mismatched types")]
    PhiTypeMismatch { variable: String, block: BlockId },

    #[error("dominated use of {variable} in {block} has no reaching definition and no phi was inserted")]
    MissingPhi { variable: String, block: BlockId },
}

/// Errors raised by the IL validator.
#[derive(Error, Debug)]
pub enum ValidationError {
    #[error("block {block} does not end in a terminator instruction")]
    MissingTerminator { block: BlockId },

    #[error("edge {from} -> {to} is not symmetric: missing reciprocal predecessor/successor entry")]
    AsymmetricEdge { from: BlockId, to: BlockId },

    #[error("type mismatch in instruction {instr}: expected {expected}, found {found}")]
    TypeMismatch {
        instr: String,
        expected: String,
        found: String,
    },

    #[error("constant {value} at {instr} is out of range for type {ty}")]
    ConstantOutOfRange {
        instr: String,
        value: i64,
        ty: String,
    },

    #[error("module is missing an entry function")]
    MissingEntryFunction,
}

/// Errors raised by dataflow analyses (reaching defs, liveness, GVN, etc).
#[derive(Error, Debug)]
pub enum DataflowError {
    #[error("analysis {analysis} did not reach a fixed point within {iterations} iterations")]
    DidNotConverge { analysis: String, iterations: usize },

    #[error("analysis {analysis} exceeded its {budget_ms}ms wall-time budget after {elapsed_ms}ms ({iterations} iterations)")]
    WallTimeExceeded {
        analysis: String,
        budget_ms: u128,
        elapsed_ms: u128,
        iterations: usize,
    },

    #[error("loop analysis found an irreducible region containing {block}")]
    IrreducibleLoop { block: BlockId },

    #[error("prerequisite pass {prerequisite} was not run before {pass}")]
    MissingPrerequisite { prerequisite: String, pass: String },
}

/// Errors raised by 6502 target-specific analyses.
#[derive(Error, Debug)]
pub enum TargetError {
    #[error("address {address:#06x} falls outside of zero page")]
    NotZeroPage { address: u16 },

    #[error("address {address:#06x} collides with reserved range {range}")]
    ReservedZeroPage { address: u16, range: &'static str },

    #[error("register {register} is outside of SID/VIC-II register range")]
    RegisterOutOfRange { register: u16 },

    #[error("estimated per-line cycle budget exceeded: {estimated} > {budget}")]
    CycleBudgetExceeded { estimated: u32, budget: u32 },
}

/// Errors raised by the intrinsic registry.
#[derive(Error, Debug)]
pub enum IntrinsicError {
    #[error("intrinsic {name} is already registered")]
    DuplicateRegistration { name: String },

    #[error("unknown intrinsic: {name}")]
    Unknown { name: String },

    #[error("intrinsic {name} called with {actual} arguments, expected {expected}")]
    ArityMismatch {
        name: String,
        expected: usize,
        actual: usize,
    },
}

impl MidendError {
    pub fn internal<T: Into<String>>(msg: T) -> Self {
        MidendError::Internal(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cfg_error_converts_into_midend_error() {
        let err: MidendError = CfgError::EmptyFunction {
            function: "main".to_string(),
        }
        .into();
        assert!(matches!(err, MidendError::Cfg(_)));
    }

    #[test]
    fn internal_helper_wraps_message() {
        let err = MidendError::internal("unexpected state");
        assert_eq!(err.to_string(), "internal error: unexpected state");
    }
}
