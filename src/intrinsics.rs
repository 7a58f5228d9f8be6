//! Read-only intrinsic registry.
//!
//! The registry is a process-wide singleton, built once and never mutated
//! afterwards, passed by reference to any pass that needs to resolve an
//! intrinsic's signature (cycle cost, side-effect flag, emitted opcode).

use std::collections::HashMap;
use std::sync::OnceLock;

use serde::{Deserialize, Serialize};

use crate::common::errors::IntrinsicError;
use crate::ir::types::IlType;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IntrinsicCategory {
    Memory,
    Optimization,
    Cpu,
    Stack,
    Utility,
    CompileTime,
}

/// The signature and cost metadata for one intrinsic.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntrinsicSignature {
    pub name: &'static str,
    pub category: IntrinsicCategory,
    pub params: Vec<IlType>,
    pub return_type: IlType,
    /// `None` for compile-time-only intrinsics (e.g. `sizeof`) that emit no code.
    pub emitted_cycle_cost: Option<u32>,
    pub has_side_effect: bool,
    /// A barrier intrinsic (e.g. a memory fence) blocks reordering across itself.
    pub is_barrier: bool,
    pub is_volatile: bool,
    pub description: &'static str,
}

/// Immutable table of all known intrinsics, keyed by name.
#[derive(Debug, Default)]
pub struct IntrinsicRegistry {
    entries: HashMap<&'static str, IntrinsicSignature>,
}

impl IntrinsicRegistry {
    fn build() -> Result<Self, IntrinsicError> {
        let mut registry = IntrinsicRegistry::default();
        for sig in builtin_signatures() {
            registry.register(sig)?;
        }
        Ok(registry)
    }

    fn register(&mut self, sig: IntrinsicSignature) -> Result<(), IntrinsicError> {
        if self.entries.contains_key(sig.name) {
            return Err(IntrinsicError::DuplicateRegistration {
                name: sig.name.to_string(),
            });
        }
        self.entries.insert(sig.name, sig);
        Ok(())
    }

    pub fn lookup(&self, name: &str) -> Result<&IntrinsicSignature, IntrinsicError> {
        self.entries
            .get(name)
            .ok_or_else(|| IntrinsicError::Unknown {
                name: name.to_string(),
            })
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &IntrinsicSignature> {
        self.entries.values()
    }
}

fn sig(
    name: &'static str,
    category: IntrinsicCategory,
    params: Vec<IlType>,
    return_type: IlType,
    emitted_cycle_cost: Option<u32>,
    has_side_effect: bool,
    is_barrier: bool,
    is_volatile: bool,
    description: &'static str,
) -> IntrinsicSignature {
    IntrinsicSignature {
        name,
        category,
        params,
        return_type,
        emitted_cycle_cost,
        has_side_effect,
        is_barrier,
        is_volatile,
        description,
    }
}

fn builtin_signatures() -> Vec<IntrinsicSignature> {
    use IlType::*;
    use IntrinsicCategory::*;
    vec![
        sig("peek", Memory, vec![Word], Byte, Some(4), false, false, true, "read a byte from an absolute address"),
        sig("poke", Memory, vec![Word, Byte], Void, Some(4), true, false, true, "write a byte to an absolute address"),
        sig("peekw", Memory, vec![Word], Word, Some(8), false, false, true, "read a little-endian word from an absolute address"),
        sig("pokew", Memory, vec![Word, Word], Void, Some(8), true, false, true, "write a little-endian word to an absolute address"),
        sig("sei", Cpu, vec![], Void, Some(2), true, true, false, "disable maskable interrupts"),
        sig("cli", Cpu, vec![], Void, Some(2), true, true, false, "enable maskable interrupts"),
        sig("nop", Cpu, vec![], Void, Some(2), false, false, false, "no operation"),
        sig("brk", Cpu, vec![], Void, Some(7), true, true, false, "software interrupt"),
        sig("pha", Stack, vec![Byte], Void, Some(3), true, false, false, "push accumulator"),
        sig("pla", Stack, vec![], Byte, Some(4), false, false, false, "pull accumulator"),
        sig("php", Stack, vec![], Void, Some(3), true, false, false, "push processor status"),
        sig("plp", Stack, vec![], Void, Some(4), true, false, false, "pull processor status"),
        sig("barrier", Optimization, vec![], Void, None, false, true, false, "compiler reordering barrier, no emitted code"),
        sig("volatile_read", Memory, vec![Word], Byte, Some(4), false, false, true, "read without constant-propagation/CSE reuse"),
        sig("volatile_write", Memory, vec![Word, Byte], Void, Some(4), true, false, true, "write without dead-store elimination"),
        sig("lo", Utility, vec![Word], Byte, Some(0), false, false, false, "low byte of a word, compile-time when operand is constant"),
        sig("hi", Utility, vec![Word], Byte, Some(0), false, false, false, "high byte of a word, compile-time when operand is constant"),
        sig("sizeof", CompileTime, vec![], Word, None, false, false, false, "compile-time size of a type argument"),
    ]
}

static REGISTRY: OnceLock<IntrinsicRegistry> = OnceLock::new();

/// Returns the process-wide intrinsic registry, building it on first access.
pub fn registry() -> &'static IntrinsicRegistry {
    REGISTRY.get_or_init(|| IntrinsicRegistry::build().expect("built-in intrinsic table has no duplicates"))
}
