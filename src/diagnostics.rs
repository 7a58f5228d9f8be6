//! Diagnostic records accumulated by passes, as opposed to thrown errors.
//!
//! Every pass exposes a [`DiagnosticBag`] instead of bailing out on the
//! first recoverable finding, matching the propagation policy: errors are
//! accumulated, not thrown through the stack.

use serde::{Deserialize, Serialize};

use crate::common::types::{BlockId, InstrId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Severity {
    Info,
    Warning,
    Error,
}

/// Enumerated diagnostic codes, one per distinct finding kind across the
/// pipeline. Grouped loosely by the taxonomy in the error-handling design.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DiagnosticCode {
    // Structural
    MissingTerminator,
    AsymmetricEdge,
    UnreachableBlock,
    DuplicateInstructionId,
    MissingEntryFunction,

    // Type
    TypeMismatch,
    IllegalConversion,
    ConstantOutOfRange,
    BadBranchCondition,

    // SSA
    MultipleDefinitions,
    UseNotDominated,
    PhiOperandMismatch,
    MissingPhi,

    // Dataflow / resource
    FixedPointNotConverged,
    WallTimeBudgetExceeded,
    IrreducibleLoop,

    // Hardware
    ReservedZeroPage,
    RasterLineOverflow,
    SidVoiceConflict,
    SidFilterConflict,
    SidVolumeConflict,
    SidAllVoicesInUse,

    // Informational
    DeadEdge,
    GvnRedundant,
    CseRedundant,
    RasterMarginTight,
}

/// Coordinates locating a diagnostic within a module, as precisely as the
/// pass that raised it knows.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Location {
    pub function: Option<String>,
    pub block: Option<BlockId>,
    pub instruction: Option<InstrId>,
}

impl Location {
    pub fn function(name: impl Into<String>) -> Self {
        Self {
            function: Some(name.into()),
            block: None,
            instruction: None,
        }
    }

    pub fn block(name: impl Into<String>, block: BlockId) -> Self {
        Self {
            function: Some(name.into()),
            block: Some(block),
            instruction: None,
        }
    }

    pub fn instruction(name: impl Into<String>, block: BlockId, instruction: InstrId) -> Self {
        Self {
            function: Some(name.into()),
            block: Some(block),
            instruction: Some(instruction),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Diagnostic {
    pub severity: Severity,
    pub code: DiagnosticCode,
    pub message: String,
    pub location: Option<Location>,
}

impl Diagnostic {
    pub fn new(severity: Severity, code: DiagnosticCode, message: impl Into<String>) -> Self {
        Self {
            severity,
            code,
            message: message.into(),
            location: None,
        }
    }

    pub fn error(code: DiagnosticCode, message: impl Into<String>) -> Self {
        Self::new(Severity::Error, code, message)
    }

    pub fn warning(code: DiagnosticCode, message: impl Into<String>) -> Self {
        Self::new(Severity::Warning, code, message)
    }

    pub fn info(code: DiagnosticCode, message: impl Into<String>) -> Self {
        Self::new(Severity::Info, code, message)
    }

    pub fn at(mut self, location: Location) -> Self {
        self.location = Some(location);
        self
    }
}

/// Accumulates diagnostics from one or more passes.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DiagnosticBag {
    records: Vec<Diagnostic>,
}

impl DiagnosticBag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, diagnostic: Diagnostic) {
        self.records.push(diagnostic);
    }

    pub fn extend(&mut self, other: DiagnosticBag) {
        self.records.extend(other.records);
    }

    pub fn has_errors(&self) -> bool {
        self.records.iter().any(|d| d.severity == Severity::Error)
    }

    pub fn has_warnings(&self) -> bool {
        self.records.iter().any(|d| d.severity == Severity::Warning)
    }

    pub fn is_ok(&self) -> bool {
        !self.has_errors()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Diagnostic> {
        self.records.iter()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bag_reports_errors() {
        let mut bag = DiagnosticBag::new();
        assert!(bag.is_ok());
        bag.push(Diagnostic::warning(DiagnosticCode::UnreachableBlock, "unreachable"));
        assert!(bag.is_ok());
        assert!(bag.has_warnings());
        bag.push(Diagnostic::error(DiagnosticCode::MissingTerminator, "no terminator"));
        assert!(!bag.is_ok());
        assert!(bag.has_errors());
    }

    #[test]
    fn diagnostic_carries_location() {
        let diag = Diagnostic::error(DiagnosticCode::ReservedZeroPage, "reserved")
            .at(Location::function("main"));
        assert_eq!(diag.location.unwrap().function.as_deref(), Some("main"));
    }
}
