//! VIC-II raster safety triage: classifies a function's estimated cycle
//! cost against a platform's normal-line and badline budgets.

use crate::diagnostics::{Diagnostic, DiagnosticBag, DiagnosticCode, Location};
use crate::platform::TargetMachine;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recommendation {
    Safe,
    UseStableRaster,
    SplitAcrossLines,
    DisableBadlines,
    TooLong,
}

#[derive(Debug, Clone)]
pub struct RasterSafetyMetadata {
    pub raster_safe: bool,
    pub badline_aware: bool,
    pub cycle_margin: i64,
    pub lines_required: u32,
    pub stable_raster_compatible: bool,
    pub recommendation: Recommendation,
}

/// `variance` is the spread (max - min) across the function's best/worst
/// case cycle estimates, used only to gate `stable_raster_compatible`.
pub fn assess(machine: &TargetMachine, cycles: u32, variance: u32) -> RasterSafetyMetadata {
    let normal_line = machine.normal_line_cycles();
    let badline = machine.badline_cycles();

    let raster_safe = cycles <= normal_line;
    let badline_aware = cycles <= badline;
    let cycle_margin = badline as i64 - cycles as i64;
    let lines_required = (cycles as f64 / normal_line.max(1) as f64).ceil() as u32;
    let stable_raster_compatible = badline_aware && variance <= 1;

    // `badline_aware` (safe even when VIC-II DMA steals cycles) is the
    // strongest guarantee, so it's checked first: a function can be
    // `raster_safe` on a normal line yet still need a stable-raster trick
    // to survive a badline, which is exactly the `UseStableRaster` case.
    let recommendation = if cycles > badline.max(normal_line) * 4 {
        Recommendation::TooLong
    } else if badline_aware {
        Recommendation::Safe
    } else if raster_safe {
        Recommendation::UseStableRaster
    } else if lines_required > 1 {
        Recommendation::SplitAcrossLines
    } else {
        Recommendation::DisableBadlines
    };

    RasterSafetyMetadata {
        raster_safe,
        badline_aware,
        cycle_margin,
        lines_required,
        stable_raster_compatible,
        recommendation,
    }
}

/// Severity gradient from §4.7: exceeding the normal line is a hard error;
/// exceeding only the badline budget (function still fits a normal line,
/// just needs the stable-raster technique on a badline) is informational;
/// a tight margin on whichever budget the function does fit is a warning.
pub fn diagnostics_for(machine: &TargetMachine, function_name: &str, cycles: u32, meta: &RasterSafetyMetadata) -> DiagnosticBag {
    let mut bag = DiagnosticBag::new();
    let loc = Location::function(function_name);
    let margin_normal = machine.normal_line_cycles() as i64 - cycles as i64;

    if !meta.raster_safe {
        bag.push(
            Diagnostic::error(
                DiagnosticCode::RasterLineOverflow,
                format!("{function_name} estimated at {cycles} cycles exceeds the normal line budget"),
            )
            .at(loc),
        );
    } else if !meta.badline_aware {
        bag.push(
            Diagnostic::info(
                DiagnosticCode::RasterMarginTight,
                format!("{function_name} fits a normal line but exceeds the badline budget by {} cycles; use stable raster", -meta.cycle_margin),
            )
            .at(loc),
        );
    } else if meta.cycle_margin < 5 {
        bag.push(
            Diagnostic::info(
                DiagnosticCode::RasterMarginTight,
                format!("{function_name} has only {} cycles of margin on a badline", meta.cycle_margin),
            )
            .at(loc),
        );
    } else if margin_normal < 5 {
        bag.push(
            Diagnostic::warning(
                DiagnosticCode::RasterMarginTight,
                format!("{function_name} has only {margin_normal} cycles of margin on a normal line"),
            )
            .at(loc),
        );
    }

    bag
}
