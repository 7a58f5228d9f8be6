//! SID ($D400-$D41C) register conflict detection: tracks which function
//! writes which voice/filter/volume register, flags when more than one
//! distinct function writes the same resource, and flags a single function
//! that writes all three voices as a probable music-player IRQ timing
//! requirement.

use std::collections::{BTreeMap, BTreeSet};

use crate::diagnostics::{Diagnostic, DiagnosticBag, DiagnosticCode, Location};
use crate::ir::function::Module;
use crate::ir::instruction::Opcode;
use crate::ir::value::{Constant, Value};

const VOICE1: std::ops::RangeInclusive<u16> = 0xD400..=0xD406;
const VOICE2: std::ops::RangeInclusive<u16> = 0xD407..=0xD40D;
const VOICE3: std::ops::RangeInclusive<u16> = 0xD40E..=0xD414;
const FILTER: std::ops::RangeInclusive<u16> = 0xD415..=0xD418;
const VOLUME_REGISTER: u16 = 0xD418;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum SidResource {
    Voice(u8),
    Filter,
    Volume,
}

fn classify(address: u16) -> Option<SidResource> {
    if address == VOLUME_REGISTER {
        return Some(SidResource::Volume);
    }
    if VOICE1.contains(&address) {
        return Some(SidResource::Voice(1));
    }
    if VOICE2.contains(&address) {
        return Some(SidResource::Voice(2));
    }
    if VOICE3.contains(&address) {
        return Some(SidResource::Voice(3));
    }
    if FILTER.contains(&address) {
        return Some(SidResource::Filter);
    }
    None
}

pub struct SidAnalysis {
    pub writers: BTreeMap<SidResource, BTreeSet<String>>,
    pub voices_used: BTreeSet<u8>,
    /// Voices written by each individual function, as opposed to
    /// `voices_used`'s whole-module aggregate: the basis for flagging a
    /// single function as driving all three voices itself.
    pub voices_by_function: BTreeMap<String, BTreeSet<u8>>,
}

/// Collects, for every `poke`/`pokew` intrinsic call whose address operand
/// is a compile-time-known constant in the SID range, which function wrote
/// it.
pub fn analyze(module: &Module) -> SidAnalysis {
    let mut writers: BTreeMap<SidResource, BTreeSet<String>> = BTreeMap::new();
    let mut voices_used = BTreeSet::new();
    let mut voices_by_function: BTreeMap<String, BTreeSet<u8>> = BTreeMap::new();

    for function in module.functions.values() {
        for block in function.blocks_in_order() {
            for instr in &block.instructions {
                let Opcode::Intrinsic { name, args, .. } = &instr.opcode else { continue };
                if name != "poke" && name != "pokew" {
                    continue;
                }
                let Some(Value::Const(Constant { value, .. })) = args.first() else { continue };
                let Ok(address) = u16::try_from(*value) else { continue };
                let Some(resource) = classify(address) else { continue };
                writers.entry(resource).or_default().insert(function.name.clone());
                if let SidResource::Voice(n) = resource {
                    voices_used.insert(n);
                    voices_by_function.entry(function.name.clone()).or_default().insert(n);
                }
            }
        }
    }

    SidAnalysis { writers, voices_used, voices_by_function }
}

pub fn diagnostics_for(analysis: &SidAnalysis) -> DiagnosticBag {
    let mut bag = DiagnosticBag::new();

    // A single function driving all three voices is almost always a music
    // player; that pattern needs its SID writes serviced from a
    // raster/CIA IRQ on a predictable cadence rather than arbitrary mainline
    // code, so it's worth flagging even with no conflicting writer.
    for (function, voices) in &analysis.voices_by_function {
        if voices.len() == 3 {
            bag.push(
                Diagnostic::info(
                    DiagnosticCode::SidAllVoicesInUse,
                    format!("{function} writes all three SID voices: likely a music player needing IRQ-driven timing"),
                )
                .at(Location::function(function)),
            );
        }
    }

    for (resource, funcs) in &analysis.writers {
        if funcs.len() < 2 {
            continue;
        }
        let names = funcs.iter().cloned().collect::<Vec<_>>().join(", ");
        let (code, label) = match resource {
            SidResource::Voice(n) => (DiagnosticCode::SidVoiceConflict, format!("voice {n}")),
            SidResource::Filter => (DiagnosticCode::SidFilterConflict, "filter".to_string()),
            SidResource::Volume => (DiagnosticCode::SidVolumeConflict, "volume".to_string()),
        };
        bag.push(
            Diagnostic::warning(code, format!("multiple functions write the SID {label} register: {names}"))
                .at(Location::function(funcs.iter().next().unwrap().as_str())),
        );
    }
    bag
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::types::{BlockId, InstrId};
    use crate::ir::types::IlType;
    use crate::ir::{BasicBlock, Function, Instruction};

    fn poke_at(id: u32, address: u16) -> Instruction {
        Instruction::new(
            InstrId(id),
            Opcode::Intrinsic {
                name: "poke".to_string(),
                args: vec![Value::Const(Constant::word(address)), Value::Const(Constant::byte(0))],
                ty: IlType::Void,
            },
        )
    }

    #[test]
    fn two_functions_writing_same_voice_is_a_conflict() {
        let mut module = Module::new("m");
        let mut a = Function::new("play_a", IlType::Void);
        let mut ab0 = BasicBlock::new(BlockId(0), "bb0");
        ab0.instructions.push(poke_at(0, 0xD400));
        ab0.instructions.push(Instruction::new(InstrId(1), Opcode::ReturnVoid));
        a.add_block(ab0);
        let mut b = Function::new("play_b", IlType::Void);
        let mut bb0 = BasicBlock::new(BlockId(0), "bb0");
        bb0.instructions.push(poke_at(0, 0xD401));
        bb0.instructions.push(Instruction::new(InstrId(1), Opcode::ReturnVoid));
        b.add_block(bb0);
        module.add_function(a);
        module.add_function(b);

        let analysis = analyze(&module);
        assert!(analysis.voices_used.contains(&1));
        let bag = diagnostics_for(&analysis);
        assert_eq!(bag.len(), 1);
    }

    #[test]
    fn function_writing_all_three_voices_is_flagged_as_a_likely_music_player() {
        let mut module = Module::new("m");
        let mut player = Function::new("play_tune", IlType::Void);
        let mut b0 = BasicBlock::new(BlockId(0), "bb0");
        b0.instructions.push(poke_at(0, 0xD400));
        b0.instructions.push(poke_at(1, 0xD407));
        b0.instructions.push(poke_at(2, 0xD40E));
        b0.instructions.push(Instruction::new(InstrId(3), Opcode::ReturnVoid));
        player.add_block(b0);
        module.add_function(player);

        let analysis = analyze(&module);
        assert_eq!(analysis.voices_by_function["play_tune"].len(), 3);
        let bag = diagnostics_for(&analysis);
        assert!(bag.iter().any(|d| d.code == DiagnosticCode::SidAllVoicesInUse));
    }

    #[test]
    fn single_writer_is_not_a_conflict() {
        let mut module = Module::new("m");
        let mut a = Function::new("play", IlType::Void);
        let mut b0 = BasicBlock::new(BlockId(0), "bb0");
        b0.instructions.push(poke_at(0, 0xD418));
        b0.instructions.push(Instruction::new(InstrId(1), Opcode::ReturnVoid));
        a.add_block(b0);
        module.add_function(a);

        let analysis = analyze(&module);
        assert!(diagnostics_for(&analysis).is_empty());
    }
}
