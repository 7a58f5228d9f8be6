//! End-to-end scenarios run through the public API: build IL by hand, wire
//! it into a CFG, and drive it through the orchestrator or a single named
//! pass, the way an embedding compiler front-end would.

use mos6502_midend::cfg::{Cfg, CfgBuilder, CfgEdge};
use mos6502_midend::common::config::MidendConfig;
use mos6502_midend::common::types::{BlockId, InstrId, VRegId};
use mos6502_midend::dataflow;
use mos6502_midend::diagnostics::DiagnosticCode;
use mos6502_midend::dominance::dominators;
use mos6502_midend::ir::{BasicBlock, BinaryOp, CompareOp, Constant, Function, IlType, Instruction, Opcode, VReg, VarRef, Value};
use mos6502_midend::orchestrator::Orchestrator;
use mos6502_midend::platform::{TargetMachine, VideoStandard};
use mos6502_midend::ssa;
use mos6502_midend::target;
use mos6502_midend::validator;

fn jump(id: u32, target_block: BlockId) -> Instruction {
    Instruction::new(InstrId(id), Opcode::Jump { target: target_block })
}

fn store(id: u32, var: &str, value: Value) -> Instruction {
    Instruction::new(InstrId(id), Opcode::StoreVar { var: VarRef::unversioned(var), ty: IlType::Byte, value })
}

/// Scenario 1: diamond merge, b0 -> {b1, b2} -> b3, both arms store `x`.
/// SSA must place exactly one phi for `x` at b3.
#[test]
fn diamond_merge_places_one_phi_with_both_sources() {
    let mut f = Function::new("diamond", IlType::Void);
    let mut b0 = BasicBlock::new(BlockId(0), "bb0");
    b0.instructions.push(Instruction::new(
        InstrId(0),
        Opcode::Branch { cond: Value::Const(Constant::boolean(true)), then_block: BlockId(1), else_block: BlockId(2) },
    ));
    let mut b1 = BasicBlock::new(BlockId(1), "bb1");
    b1.instructions.push(store(1, "x", Value::Const(Constant::byte(1))));
    b1.instructions.push(jump(2, BlockId(3)));
    let mut b2 = BasicBlock::new(BlockId(2), "bb2");
    b2.instructions.push(store(3, "x", Value::Const(Constant::byte(2))));
    b2.instructions.push(jump(4, BlockId(3)));
    let mut b3 = BasicBlock::new(BlockId(3), "bb3");
    b3.instructions.push(Instruction::new(InstrId(5), Opcode::LoadVar { var: VarRef::unversioned("x"), ty: IlType::Byte }));
    b3.instructions.push(Instruction::new(InstrId(6), Opcode::ReturnVoid));
    f.add_block(b0);
    f.add_block(b1);
    f.add_block(b2);
    f.add_block(b3);

    CfgBuilder::wire_edges(&mut f).unwrap();
    let result = ssa::construct(&mut f).unwrap();
    assert!(result.phi_placed_for.contains("x"));

    let merge = f.block(BlockId(3)).unwrap();
    let phi = merge.instructions.iter().find(|i| i.is_phi()).expect("b3 must carry a phi for x");
    let Opcode::Phi { sources, .. } = &phi.opcode else { unreachable!() };
    assert_eq!(sources.len(), 2);
    let predecessors: std::collections::BTreeSet<_> = sources.iter().map(|s| s.predecessor).collect();
    assert_eq!(predecessors, [BlockId(1), BlockId(2)].into_iter().collect());

    let cfg = Cfg::from_function(&f);
    let tree = dominators::compute(&cfg).unwrap();
    let bag = validator::validate(&f, &cfg, Some(&tree), &Default::default());
    assert!(!bag.has_errors());
}

/// Scenario 2: `let i: byte = 0; while i < 10 { i = i + 1; }`. Loop analysis
/// must recognize `i` as a basic induction variable with stride +1, derive
/// the literal iteration count (not the default-10 estimate), and cycle
/// estimation must fold the loop as `setup + 10 * (body + 5)`.
#[test]
fn counting_loop_yields_a_literal_basic_induction_variable() {
    let mut f = Function::new("count_to_ten", IlType::Void);

    let mut b0 = BasicBlock::new(BlockId(0), "bb0");
    b0.instructions.push(store(0, "i", Value::Const(Constant::byte(0))));
    b0.instructions.push(jump(1, BlockId(1)));

    let mut b1 = BasicBlock::new(BlockId(1), "bb1");
    b1.instructions.push(Instruction::new(InstrId(2), Opcode::LoadVar { var: VarRef::unversioned("i"), ty: IlType::Byte }).with_result(VRegId(0), IlType::Byte));
    b1.instructions.push(
        Instruction::new(
            InstrId(3),
            Opcode::Compare { op: CompareOp::Lt, lhs: Value::Reg(VReg::new(VRegId(0), IlType::Byte)), rhs: Value::Const(Constant::byte(10)) },
        )
        .with_result(VRegId(1), IlType::Bool),
    );
    b1.instructions.push(Instruction::new(
        InstrId(4),
        Opcode::Branch { cond: Value::Reg(VReg::new(VRegId(1), IlType::Bool)), then_block: BlockId(2), else_block: BlockId(3) },
    ));

    let mut b2 = BasicBlock::new(BlockId(2), "bb2");
    b2.instructions.push(
        Instruction::new(
            InstrId(5),
            Opcode::Binary { op: BinaryOp::Add, lhs: Value::Var(VarRef::unversioned("i")), rhs: Value::Const(Constant::byte(1)) },
        )
        .with_result(VRegId(2), IlType::Byte),
    );
    b2.instructions.push(store(6, "i", Value::Reg(VReg::new(VRegId(2), IlType::Byte))));
    b2.instructions.push(jump(7, BlockId(1)));

    let mut b3 = BasicBlock::new(BlockId(3), "bb3");
    b3.instructions.push(Instruction::new(InstrId(8), Opcode::ReturnVoid));

    f.add_block(b0);
    f.add_block(b1);
    f.add_block(b2);
    f.add_block(b3);

    CfgBuilder::wire_edges(&mut f).unwrap();
    ssa::construct(&mut f).unwrap();
    let cfg = Cfg::from_function(&f);
    let tree = dominators::compute(&cfg).unwrap();
    let loops = dataflow::loops::detect(&f, &cfg, &tree);

    assert_eq!(loops.loops.len(), 1);
    let the_loop = &loops.loops[0];
    assert_eq!(the_loop.header, BlockId(1));
    assert_eq!(the_loop.induction_variables.len(), 1);
    let iv = &the_loop.induction_variables[0];
    assert_eq!(iv.variable, "i");
    assert_eq!(iv.step, 1);

    let registry = mos6502_midend::intrinsics::registry();
    let machine = TargetMachine::c64(VideoStandard::Pal);
    let estimate = target::cycles::estimate(&f, &loops, registry, &machine);
    assert_eq!(estimate.confidence, target::Confidence::Exact);
}

/// Scenario 3: mapping a Byte to $00 on a C64 target is rejected as the
/// reserved CPU I/O port.
#[test]
fn zero_page_allocation_at_cpu_io_port_is_rejected() {
    let machine = TargetMachine::c64(VideoStandard::Pal);
    let err = target::zeropage::validate(&machine, 0x00, 1).unwrap_err();
    assert!(matches!(
        err,
        mos6502_midend::common::errors::TargetError::ReservedZeroPage { address: 0x00, range: "CPU I/O port" }
    ));
}

/// Scenario 4: a 45-cycle function on PAL C64 (normal line 63, badline 23)
/// is raster-safe but not badline-aware, so the recommendation is to use
/// the stable-raster technique, with exactly one info-level diagnostic.
#[test]
fn forty_five_cycles_on_pal_c64_recommends_stable_raster() {
    let machine = TargetMachine::c64(VideoStandard::Pal);
    assert_eq!(machine.normal_line_cycles(), 63);
    assert_eq!(machine.badline_cycles(), 23);

    let meta = target::raster::assess(&machine, 45, 0);
    assert!(meta.raster_safe);
    assert!(!meta.badline_aware);
    assert_eq!(meta.recommendation, target::Recommendation::UseStableRaster);

    let bag = target::raster::diagnostics_for(&machine, "irq_handler", 45, &meta);
    assert_eq!(bag.len(), 1);
    assert_eq!(bag.iter().next().unwrap().severity, mos6502_midend::diagnostics::Severity::Info);
}

/// Scenario 5: a branch on `eq(const 3, const 3)` folds to a literal true;
/// the else edge is dead, and the validator still passes.
#[test]
fn constant_folded_branch_marks_the_else_edge_dead() {
    let mut f = Function::new("always_true", IlType::Void);
    let mut b0 = BasicBlock::new(BlockId(0), "bb0");
    b0.instructions.push(
        Instruction::new(
            InstrId(0),
            Opcode::Compare { op: CompareOp::Eq, lhs: Value::Const(Constant::byte(3)), rhs: Value::Const(Constant::byte(3)) },
        )
        .with_result(VRegId(0), IlType::Bool),
    );
    b0.instructions.push(Instruction::new(
        InstrId(1),
        Opcode::Branch { cond: Value::Reg(VReg::new(VRegId(0), IlType::Bool)), then_block: BlockId(1), else_block: BlockId(2) },
    ));
    let mut b1 = BasicBlock::new(BlockId(1), "bb1");
    b1.instructions.push(Instruction::new(InstrId(2), Opcode::ReturnVoid));
    let mut b2 = BasicBlock::new(BlockId(2), "bb2");
    b2.instructions.push(Instruction::new(InstrId(3), Opcode::ReturnVoid));
    f.add_block(b0);
    f.add_block(b1);
    f.add_block(b2);

    CfgBuilder::wire_edges(&mut f).unwrap();
    let cfg = Cfg::from_function(&f);
    let result = dataflow::constprop::compute(&f, &cfg, 100, None).unwrap();
    assert_eq!(result.dead_edges, vec![CfgEdge { from: BlockId(0), to: BlockId(2) }]);

    let tree = dominators::compute(&cfg).unwrap();
    let bag = validator::validate(&f, &cfg, Some(&tree), &Default::default());
    assert!(!bag.has_errors());
}

/// Scenario 6: b3 has predecessors b1 and b2, both writing `x`, with no phi
/// at b3. The SSA verifier must report a missing-phi error.
#[test]
fn missing_phi_at_a_real_merge_point_is_caught_by_verification() {
    let mut f = Function::new("broken", IlType::Void);
    let mut b0 = BasicBlock::new(BlockId(0), "bb0");
    b0.instructions.push(Instruction::new(
        InstrId(0),
        Opcode::Branch { cond: Value::Const(Constant::boolean(true)), then_block: BlockId(1), else_block: BlockId(2) },
    ));
    let mut b1 = BasicBlock::new(BlockId(1), "bb1");
    b1.instructions.push(store(1, "x", Value::Const(Constant::byte(1))));
    b1.instructions.push(jump(2, BlockId(3)));
    let mut b2 = BasicBlock::new(BlockId(2), "bb2");
    b2.instructions.push(store(3, "x", Value::Const(Constant::byte(2))));
    b2.instructions.push(jump(4, BlockId(3)));
    let mut b3 = BasicBlock::new(BlockId(3), "bb3");
    b3.instructions.push(Instruction::new(InstrId(5), Opcode::LoadVar { var: VarRef::unversioned("x"), ty: IlType::Byte }));
    b3.instructions.push(Instruction::new(InstrId(6), Opcode::ReturnVoid));
    f.add_block(b0);
    f.add_block(b1);
    f.add_block(b2);
    f.add_block(b3);

    CfgBuilder::wire_edges(&mut f).unwrap();
    let cfg = Cfg::from_function(&f);
    let tree = dominators::compute(&cfg).unwrap();

    // Deliberately skip SSA construction: b3 still reads the unversioned
    // `x` with no phi reconciling the two incoming definitions.
    let errors = ssa::verify(&f, &cfg, &tree);
    assert!(errors.iter().any(|e| matches!(e, mos6502_midend::common::errors::SsaError::MissingPhi { .. })));
}

// --- Boundary behaviors ---

#[test]
fn empty_function_has_no_blocks_and_validates_cleanly() {
    let f = Function::new("empty", IlType::Void);
    assert!(f.is_empty());
    let cfg = Cfg::from_function(&f);
    assert_eq!(cfg.block_ids.len(), 0);
    let bag = validator::validate(&f, &cfg, None, &Default::default());
    assert!(bag.is_ok());
}

#[test]
fn single_block_function_has_a_zero_depth_dominator_tree_and_no_phis() {
    let mut f = Function::new("just_return", IlType::Void);
    let mut b0 = BasicBlock::new(BlockId(0), "bb0");
    b0.instructions.push(Instruction::new(InstrId(0), Opcode::ReturnVoid));
    f.add_block(b0);

    CfgBuilder::wire_edges(&mut f).unwrap();
    let result = ssa::construct(&mut f).unwrap();
    assert!(result.phi_placed_for.is_empty());
    assert_eq!(result.dominators.idom(BlockId(0)), None);
}

#[test]
fn self_loop_detects_a_back_edge_with_header_in_its_own_body() {
    let mut f = Function::new("spin", IlType::Void);
    let mut b0 = BasicBlock::new(BlockId(0), "bb0");
    b0.instructions.push(jump(0, BlockId(1)));
    let mut b1 = BasicBlock::new(BlockId(1), "bb1");
    b1.instructions.push(store(1, "n", Value::Const(Constant::byte(1))));
    b1.instructions.push(Instruction::new(
        InstrId(2),
        Opcode::Branch { cond: Value::Const(Constant::boolean(true)), then_block: BlockId(1), else_block: BlockId(2) },
    ));
    let mut b2 = BasicBlock::new(BlockId(2), "bb2");
    b2.instructions.push(Instruction::new(InstrId(3), Opcode::ReturnVoid));
    f.add_block(b0);
    f.add_block(b1);
    f.add_block(b2);

    CfgBuilder::wire_edges(&mut f).unwrap();
    let cfg = Cfg::from_function(&f);
    let tree = dominators::compute(&cfg).unwrap();
    let loops = dataflow::loops::detect(&f, &cfg, &tree);
    assert_eq!(loops.loops.len(), 1);
    assert!(loops.loops[0].body.contains(&BlockId(1)));
    assert_eq!(loops.loops[0].header, BlockId(1));
}

#[test]
fn byte_constant_256_is_rejected_255_is_accepted() {
    let mut f = Function::new("bounds", IlType::Void);
    let mut b0 = BasicBlock::new(BlockId(0), "bb0");
    b0.instructions.push(Instruction::new(InstrId(0), Opcode::LoadConst { value: Value::Const(Constant::new(IlType::Byte, 256)) }));
    b0.instructions.push(Instruction::new(InstrId(1), Opcode::LoadConst { value: Value::Const(Constant::new(IlType::Byte, 255)) }));
    b0.instructions.push(Instruction::new(InstrId(2), Opcode::ReturnVoid));
    f.add_block(b0);
    CfgBuilder::wire_edges(&mut f).unwrap();
    let cfg = Cfg::from_function(&f);
    let bag = validator::validate(&f, &cfg, None, &Default::default());
    assert_eq!(bag.iter().filter(|d| d.code == DiagnosticCode::ConstantOutOfRange).count(), 1);
}

/// End-to-end: running the whole pipeline on a module with two functions
/// should produce a report per function plus module-level purity/stack
/// depth/entry-point checks, exercising the orchestrator as a whole.
#[test]
fn orchestrator_runs_a_two_function_module_end_to_end() {
    let mut caller = Function::new("main", IlType::Void);
    let mut cb0 = BasicBlock::new(BlockId(0), "bb0");
    cb0.instructions.push(Instruction::new(InstrId(0), Opcode::Call { callee: "helper".to_string(), args: vec![], ty: IlType::Void }));
    cb0.instructions.push(Instruction::new(InstrId(1), Opcode::ReturnVoid));
    caller.add_block(cb0);

    let mut helper = Function::new("helper", IlType::Void);
    let mut hb0 = BasicBlock::new(BlockId(0), "bb0");
    hb0.instructions.push(Instruction::new(InstrId(0), Opcode::ReturnVoid));
    helper.add_block(hb0);

    let mut module = mos6502_midend::ir::Module::new("cartridge");
    module.entry_point = Some("main".to_string());
    module.add_function(caller);
    module.add_function(helper);

    let orchestrator = Orchestrator::new(MidendConfig::default());
    let report = orchestrator.run_module(module);

    assert!(!report.has_errors());
    assert!(report.functions.contains_key("main"));
    assert!(report.functions.contains_key("helper"));
    let purity = report.purity.expect("purity analysis should run by default");
    assert_eq!(purity["helper"], dataflow::Purity::Pure);
    let escape = report.escape.expect("escape analysis should run by default");
    assert!(escape.max_depth_bytes.contains_key("main"));
}
