//! # 6502 compiler mid-end
//!
//! A target-independent IL, CFG/dominance/SSA construction, a suite of
//! dataflow analyses, and 6502-specific hardware/timing analysis, wired
//! together by an orchestrator that runs passes in dependency order and
//! aggregates diagnostics.
//!
//! ## Architecture overview
//!
//! ```text
//! IL -> CFG -> Dominators/Frontiers -> SSA -> Validator -> Dataflow -> Target analysis
//! ```
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use mos6502_midend::common::config::MidendConfig;
//! use mos6502_midend::ir::function::Function;
//! use mos6502_midend::orchestrator::Orchestrator;
//!
//! let config = MidendConfig::default();
//! let orchestrator = Orchestrator::new(config);
//! let function = Function::new("main", mos6502_midend::ir::types::IlType::Void);
//! let report = orchestrator.run(function);
//! println!("errors: {}", report.diagnostics.has_errors());
//! ```

pub mod common;
pub mod diagnostics;
pub mod platform;
pub mod intrinsics;

pub mod ir;
pub mod cfg;
pub mod dominance;
pub mod ssa;
pub mod validator;
pub mod dataflow;
pub mod target;

pub mod orchestrator;

pub use common::{MidendError, MidendResult};
pub use diagnostics::{Diagnostic, DiagnosticBag, Severity};
pub use orchestrator::{ModuleReport, Orchestrator, PipelineReport};
