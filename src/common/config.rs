//! Configuration for the mid-end pipeline.

use serde::{Deserialize, Serialize};

/// Top-level configuration, aggregating per-layer sub-configs.
///
/// Each sub-config owns the toggles and budgets for one pipeline stage, so
/// an orchestrator can enable or disable a stage without reaching into
/// unrelated settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MidendConfig {
    pub cfg: CfgConfig,
    pub ssa: SsaConfig,
    pub validation: ValidationConfig,
    pub dataflow: DataflowConfig,
    pub target: TargetConfig,
}

impl Default for MidendConfig {
    fn default() -> Self {
        Self {
            cfg: CfgConfig::default(),
            ssa: SsaConfig::default(),
            validation: ValidationConfig::default(),
            dataflow: DataflowConfig::default(),
            target: TargetConfig::default(),
        }
    }
}

/// Control-flow graph construction settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CfgConfig {
    /// Reject irreducible control flow instead of merely flagging it.
    pub reject_irreducible: bool,

    /// Emit a warning diagnostic for unreachable blocks found after construction.
    pub warn_unreachable_blocks: bool,
}

impl Default for CfgConfig {
    fn default() -> Self {
        Self {
            reject_irreducible: false,
            warn_unreachable_blocks: true,
        }
    }
}

/// SSA construction and verification settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SsaConfig {
    /// Run the SSA verifier immediately after construction.
    pub verify_after_construction: bool,

    /// Prune phi nodes whose operands are all identical (trivial phis).
    pub prune_trivial_phis: bool,
}

impl Default for SsaConfig {
    fn default() -> Self {
        Self {
            verify_after_construction: true,
            prune_trivial_phis: true,
        }
    }
}

/// IL validator settings; each check can be independently switched off.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationConfig {
    pub check_terminators: bool,
    pub check_cfg_symmetry: bool,
    pub check_types: bool,
    pub check_ssa: bool,
    pub check_phi_well_formedness: bool,
    pub check_constant_ranges: bool,
    pub check_reachability: bool,
    pub check_module: bool,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            check_terminators: true,
            check_cfg_symmetry: true,
            check_types: true,
            check_ssa: true,
            check_phi_well_formedness: true,
            check_constant_ranges: true,
            check_reachability: true,
            check_module: true,
        }
    }
}

/// Dataflow analysis settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataflowConfig {
    pub enable_reaching_defs: bool,
    pub enable_liveness: bool,
    pub enable_constant_propagation: bool,
    pub enable_alias_analysis: bool,
    pub enable_purity_analysis: bool,
    pub enable_escape_analysis: bool,
    pub enable_gvn: bool,
    pub enable_cse: bool,
    pub enable_loop_analysis: bool,

    /// Upper bound on fixed-point iterations before an analysis gives up
    /// and reports `DataflowError::DidNotConverge`.
    pub max_iterations: usize,

    /// Optional wall-clock ceiling, checked once per fixed-point iteration
    /// alongside `max_iterations`; `None` disables it. Catches a pass that's
    /// converging too slowly to meet a caller's time budget even while
    /// still within the iteration cap, reported as
    /// `DataflowError::WallTimeExceeded`.
    #[serde(with = "duration_millis_opt")]
    pub wall_time_budget: Option<std::time::Duration>,

    /// 6502 hardware stack is a single 256-byte page; escape analysis
    /// flags functions whose estimated stack depth would exceed this.
    pub stack_depth_budget: u16,
}

/// `Option<Duration>` as milliseconds, since `std::time::Duration` has no
/// native `serde` round-trip and a plain `u64` reads more predictably in a
/// JSON config file than the `{secs, nanos}` struct `Duration` would serialize
/// to on its own.
mod duration_millis_opt {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error> {
        value.map(|d| d.as_millis() as u64).serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<Duration>, D::Error> {
        Ok(Option::<u64>::deserialize(deserializer)?.map(Duration::from_millis))
    }
}

impl Default for DataflowConfig {
    fn default() -> Self {
        Self {
            enable_reaching_defs: true,
            enable_liveness: true,
            enable_constant_propagation: true,
            enable_alias_analysis: true,
            enable_purity_analysis: true,
            enable_escape_analysis: true,
            enable_gvn: true,
            enable_cse: true,
            enable_loop_analysis: true,
            max_iterations: 100,
            wall_time_budget: None,
            stack_depth_budget: 256,
        }
    }
}

/// 6502 hardware target settings: which machine/chipset to analyze against.
///
/// Which platform/processor/video-standard to model lives in [`crate::platform`];
/// this config only carries the per-pass enable toggles plus the selected target.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TargetConfig {
    pub platform: crate::platform::Platform,
    pub video_standard: crate::platform::VideoStandard,
    pub enable_cycle_estimation: bool,
    pub enable_register_pressure: bool,
    pub enable_zero_page_validation: bool,
    pub enable_raster_timing: bool,
    pub enable_sid_analysis: bool,
}

impl Default for TargetConfig {
    fn default() -> Self {
        Self {
            platform: crate::platform::Platform::Commodore64,
            video_standard: crate::platform::VideoStandard::Pal,
            enable_cycle_estimation: true,
            enable_register_pressure: true,
            enable_zero_page_validation: true,
            enable_raster_timing: true,
            enable_sid_analysis: true,
        }
    }
}
