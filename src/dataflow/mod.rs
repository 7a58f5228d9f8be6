//! Dataflow and optimization-adjacent analyses that run on top of the
//! validated IL: classic forward/backward fixed points (reaching
//! definitions, liveness, constant propagation), whole-program analyses
//! (purity, escape/stack-depth), and redundancy elimination (GVN, CSE).
//!
//! Every fixed-point pass here takes an explicit iteration cap and fails
//! with [`crate::common::errors::DataflowError::DidNotConverge`] rather
//! than looping forever on a malformed CFG.

pub mod alias;
pub mod constprop;
pub mod cse;
pub mod escape;
pub mod gvn;
pub mod liveness;
pub mod loops;
pub mod purity;
pub mod reaching_defs;

pub use alias::{AliasClass, AliasResult};
pub use constprop::{ConstPropResult, Lattice};
pub use cse::CseResult;
pub use escape::EscapeResult;
pub use gvn::GvnResult;
pub use liveness::LivenessResult;
pub use loops::{InductionKind, InductionVariable, Loop, LoopForest};
pub use purity::Purity;
pub use reaching_defs::ReachingDefs;
