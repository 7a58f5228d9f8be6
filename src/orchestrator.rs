//! Wires every layer of the mid-end into one pipeline: CFG construction,
//! dominance, SSA, validation, dataflow, and 6502 target analysis, run in
//! dependency order with diagnostics aggregated rather than thrown.
//!
//! Each stage is gated by the matching flag in [`MidendConfig`] and wrapped
//! in a `tracing::instrument` span so an embedding application can observe
//! pass sequencing and timing without the orchestrator depending on any
//! particular log sink.

use crate::cfg::{Cfg, CfgBuilder};
use crate::common::config::MidendConfig;
use crate::dataflow;
use crate::diagnostics::{Diagnostic, DiagnosticBag, DiagnosticCode};
use crate::dominance::{dominators, frontier, DominanceFrontier, DominatorTree};
use crate::intrinsics::IntrinsicRegistry;
use crate::ir::function::{Function, Module};
use crate::platform::{Platform, TargetMachine};
use crate::ssa;
use crate::target;
use crate::validator;

/// Every artifact a pipeline run can produce. Fields are `None` when their
/// producing pass was disabled by config, skipped for lack of a
/// prerequisite, or the function was too small to produce one (e.g. no
/// loops).
#[derive(Default)]
pub struct PipelineReport {
    pub diagnostics: DiagnosticBag,

    pub cfg: Option<Cfg>,
    pub dominators: Option<DominatorTree>,
    pub frontiers: Option<DominanceFrontier>,
    pub phi_placed_for: Vec<String>,

    pub reaching_defs: Option<dataflow::ReachingDefs>,
    pub liveness: Option<dataflow::LivenessResult>,
    pub constprop: Option<dataflow::ConstPropResult>,
    pub alias: Option<dataflow::AliasResult>,
    pub gvn: Option<dataflow::GvnResult>,
    pub cse: Option<dataflow::CseResult>,
    pub loops: Option<dataflow::LoopForest>,

    pub cycle_estimate: Option<target::CycleEstimate>,
    pub register_pressure: Option<target::RegisterPressureResult>,
    pub raster_safety: Option<target::RasterSafetyMetadata>,
}

impl PipelineReport {
    pub fn has_errors(&self) -> bool {
        self.diagnostics.has_errors()
    }

    pub fn has_warnings(&self) -> bool {
        self.diagnostics.has_warnings()
    }
}

/// Every artifact a whole-module run can produce, plus the per-function
/// [`PipelineReport`] for each function the module defines.
#[derive(Default)]
pub struct ModuleReport {
    pub diagnostics: DiagnosticBag,
    pub functions: std::collections::BTreeMap<String, PipelineReport>,
    pub purity: Option<std::collections::BTreeMap<String, dataflow::Purity>>,
    pub escape: Option<dataflow::EscapeResult>,
    pub sid: Option<target::SidAnalysis>,
}

impl ModuleReport {
    pub fn has_errors(&self) -> bool {
        self.diagnostics.has_errors() || self.functions.values().any(PipelineReport::has_errors)
    }
}

pub struct Orchestrator {
    config: MidendConfig,
    registry: &'static IntrinsicRegistry,
}

impl Orchestrator {
    pub fn new(config: MidendConfig) -> Self {
        Self { config, registry: crate::intrinsics::registry() }
    }

    fn target_machine(&self) -> TargetMachine {
        match self.config.target.platform {
            Platform::Commodore64 => TargetMachine::c64(self.config.target.video_standard),
            _ => TargetMachine::generic(),
        }
    }

    /// Runs the full pipeline over a single function, mutating it in place
    /// during CFG wiring and SSA construction.
    pub fn run(&self, mut function: Function) -> PipelineReport {
        let mut report = PipelineReport::default();

        if function.is_empty() {
            return report;
        }

        if CfgBuilder::wire_edges(&mut function).is_err() {
            report.diagnostics.push(Diagnostic::error(
                DiagnosticCode::MissingTerminator,
                format!("{} could not be wired into a CFG", function.name),
            ));
            return report;
        }

        let ssa_result = self.run_ssa(&mut function, &mut report);
        let Some((cfg, tree, frontiers)) = ssa_result else {
            return report;
        };

        self.run_validation(&function, &cfg, &tree, &mut report);

        self.run_dataflow(&function, &cfg, &tree, &mut report);
        self.run_target(&function, &cfg, &tree, &mut report);

        report.cfg = Some(cfg);
        report.dominators = Some(tree);
        report.frontiers = Some(frontiers);
        report
    }

    /// Runs whole-call-graph analyses (module entry/export resolution,
    /// purity, stack depth, SID register ownership) and then the
    /// single-function pipeline over every function the module defines.
    /// The module-level analyses run first since they need every function
    /// intact; [`Self::run`] consumes each function by value afterward.
    pub fn run_module(&self, module: Module) -> ModuleReport {
        let mut report = ModuleReport::default();

        report.diagnostics.extend(validator::validate_module(&module, &self.config.validation));

        if self.config.dataflow.enable_purity_analysis {
            report.purity = Some(dataflow::purity::analyze_module(&module, self.registry));
        }
        if self.config.dataflow.enable_escape_analysis {
            match dataflow::escape::analyze(&module, self.config.dataflow.stack_depth_budget) {
                Ok(r) => report.escape = Some(r),
                Err(e) => report.diagnostics.push(did_not_converge(e)),
            }
        }
        if self.config.target.enable_sid_analysis && self.target_machine().has_sid {
            let analysis = target::sid::analyze(&module);
            report.diagnostics.extend(target::sid::diagnostics_for(&analysis));
            report.sid = Some(analysis);
        }

        for (name, function) in module.functions {
            report.functions.insert(name, self.run(function));
        }

        report
    }

    #[tracing::instrument(skip_all, fields(function = %function.name))]
    fn run_ssa(&self, function: &mut Function, report: &mut PipelineReport) -> Option<(Cfg, DominatorTree, DominanceFrontier)> {
        match ssa::construct(function) {
            Ok(result) => {
                report.phi_placed_for = result.phi_placed_for.into_iter().collect();
                let cfg = Cfg::from_function(function);
                Some((cfg, result.dominators, result.frontiers))
            }
            Err(err) => {
                report
                    .diagnostics
                    .push(Diagnostic::error(DiagnosticCode::MissingPhi, format!("SSA construction failed: {err}")));
                let cfg = Cfg::from_function(function);
                match dominators::compute(&cfg) {
                    Ok(tree) => {
                        let frontiers = frontier::compute(&cfg, &tree);
                        Some((cfg, tree, frontiers))
                    }
                    Err(_) => None,
                }
            }
        }
    }

    #[tracing::instrument(skip_all, fields(function = %function.name))]
    fn run_validation(&self, function: &Function, cfg: &Cfg, tree: &DominatorTree, report: &mut PipelineReport) {
        let bag = validator::validate(function, cfg, Some(tree), &self.config.validation);
        report.diagnostics.extend(bag);
    }

    #[tracing::instrument(skip_all, fields(function = %function.name))]
    fn run_dataflow(&self, function: &Function, cfg: &Cfg, tree: &DominatorTree, report: &mut PipelineReport) {
        let max_iter = self.config.dataflow.max_iterations;
        let wall_time_budget = self.config.dataflow.wall_time_budget;

        if self.config.dataflow.enable_reaching_defs {
            match dataflow::reaching_defs::compute(function, cfg, max_iter, wall_time_budget) {
                Ok(r) => report.reaching_defs = Some(r),
                Err(e) => report.diagnostics.push(did_not_converge(e)),
            }
        }
        if self.config.dataflow.enable_liveness {
            match dataflow::liveness::compute(function, cfg, max_iter, wall_time_budget) {
                Ok(r) => report.liveness = Some(r),
                Err(e) => report.diagnostics.push(did_not_converge(e)),
            }
        }
        if self.config.dataflow.enable_constant_propagation {
            match dataflow::constprop::compute(function, cfg, max_iter, wall_time_budget) {
                Ok(r) => report.constprop = Some(r),
                Err(e) => report.diagnostics.push(did_not_converge(e)),
            }
        }
        if self.config.dataflow.enable_alias_analysis {
            report.alias = Some(dataflow::alias::analyze(function));
        }
        if self.config.dataflow.enable_gvn {
            report.gvn = Some(dataflow::gvn::compute(function, tree));
        }
        if self.config.dataflow.enable_cse {
            report.cse = Some(dataflow::cse::compute(function));
        }
        if self.config.dataflow.enable_loop_analysis {
            report.loops = Some(dataflow::loops::detect(function, cfg, tree));
        }
    }

    /// Cycle estimation needs a [`dataflow::LoopForest`] whether or not the
    /// dataflow stage happened to build one (loop analysis is disableable
    /// independently of cycle estimation), so it's recomputed here from
    /// `cfg`/`tree` rather than threading an extra flag through the config.
    #[tracing::instrument(skip_all, fields(function = %function.name))]
    fn run_target(&self, function: &Function, cfg: &Cfg, tree: &DominatorTree, report: &mut PipelineReport) {
        let machine = self.target_machine();

        if self.config.target.enable_register_pressure {
            report.register_pressure = Some(target::registers::analyze(function));
        }

        if self.config.target.enable_cycle_estimation {
            let loops = dataflow::loops::detect(function, cfg, tree);
            let estimate = target::cycles::estimate(function, &loops, self.registry, &machine);

            if self.config.target.enable_raster_timing && machine.has_vic_ii {
                let meta = target::raster::assess(&machine, estimate.worst_case, estimate.worst_case.saturating_sub(estimate.best_case));
                report.diagnostics.extend(target::raster::diagnostics_for(&machine, &function.name, estimate.worst_case, &meta));
                report.raster_safety = Some(meta);
            }

            report.cycle_estimate = Some(estimate);
        }
    }
}

fn did_not_converge(err: crate::common::errors::DataflowError) -> Diagnostic {
    use crate::common::errors::DataflowError;
    let code = match err {
        DataflowError::WallTimeExceeded { .. } => DiagnosticCode::WallTimeBudgetExceeded,
        _ => DiagnosticCode::FixedPointNotConverged,
    };
    Diagnostic::warning(code, err.to_string())
}
