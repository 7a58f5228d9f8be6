//! 6502 hardware and timing analysis: cycle estimation, register pressure,
//! zero-page validation, VIC-II raster safety, and SID conflict detection.
//! Each sub-analysis is independently invokable; the orchestrator wires
//! them together and gates each on [`crate::common::config::TargetConfig`].

pub mod cycles;
pub mod raster;
pub mod registers;
pub mod sid;
pub mod zeropage;

pub use cycles::{Confidence, CostBreakdown, CycleEstimate};
pub use raster::{Recommendation, RasterSafetyMetadata};
pub use registers::RegisterPressureResult;
pub use sid::{SidAnalysis, SidResource};
