//! Platform and processor tagging for 6502-family targets.
//!
//! A `TargetMachine` pins down the constants the target analysis layer
//! needs: raster timing, zero-page reservations, and which sound/graphics
//! chips are present.

use serde::{Deserialize, Serialize};

/// Host platform for the compiled program.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Platform {
    Commodore64,
    Vic20,
    CommanderX16,
    Atari2600,
    Nes,
    Snes,
    Generic,
}

/// CPU variant in the 6502 family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Processor {
    Mos6502,
    Mos6510,
    Wdc65C02,
    Mos6507,
    Wdc65816,
}

/// Broadcast standard, which fixes raster timing constants on C64-class targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VideoStandard {
    Pal,
    Ntsc,
}

/// Zero-page address classification for a given platform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ZeroPageCategory {
    Safe,
    Reserved(String),
}

/// A fully resolved target: processor + platform + derived timing constants.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TargetMachine {
    pub platform: Platform,
    pub processor: Processor,
    pub video_standard: VideoStandard,

    /// CPU cycles available per raster line.
    pub cycles_per_line: u32,
    /// Raster lines per frame.
    pub lines_per_frame: u32,
    /// Cycles stolen from a badline by VIC-II DMA.
    pub badline_penalty: u32,

    pub has_vic_ii: bool,
    pub has_sid: bool,
}

impl TargetMachine {
    /// Commodore 64 target, PAL or NTSC.
    pub fn c64(video_standard: VideoStandard) -> Self {
        let (cycles_per_line, lines_per_frame) = match video_standard {
            VideoStandard::Pal => (63, 312),
            VideoStandard::Ntsc => (65, 262),
        };
        Self {
            platform: Platform::Commodore64,
            processor: Processor::Mos6510,
            video_standard,
            cycles_per_line,
            lines_per_frame,
            badline_penalty: 40,
            has_vic_ii: true,
            has_sid: true,
        }
    }

    /// A bare MOS 6502 target with no video/sound chips, for platform-agnostic analysis.
    pub fn generic() -> Self {
        Self {
            platform: Platform::Generic,
            processor: Processor::Mos6502,
            video_standard: VideoStandard::Pal,
            cycles_per_line: 0,
            lines_per_frame: 0,
            badline_penalty: 0,
            has_vic_ii: false,
            has_sid: false,
        }
    }

    pub fn normal_line_cycles(&self) -> u32 {
        self.cycles_per_line
    }

    pub fn badline_cycles(&self) -> u32 {
        self.cycles_per_line.saturating_sub(self.badline_penalty)
    }

    /// Classifies a zero-page address per the platform's reserved ranges.
    pub fn zero_page_category(&self, address: u16) -> ZeroPageCategory {
        match self.platform {
            Platform::Commodore64 => match address {
                0x00..=0x01 => ZeroPageCategory::Reserved("CPU I/O port".to_string()),
                0x02..=0x8F => ZeroPageCategory::Safe,
                0x90..=0xFF => ZeroPageCategory::Reserved("KERNAL workspace".to_string()),
                _ => ZeroPageCategory::Reserved("outside zero page".to_string()),
            },
            _ => {
                if address <= 0xFF {
                    ZeroPageCategory::Safe
                } else {
                    ZeroPageCategory::Reserved("outside zero page".to_string())
                }
            }
        }
    }
}
