//! Reduction session integration tests.
//!
//! These tests run complete delta-debugging sessions through the public API:
//! a small shader-like module with dead stores is shrunk under different
//! oracles, and the ddmin schedule of a single pass is pinned down through a
//! finder implemented outside the crate.

use spvshrink::reduce::{
    InstructionLocation, OpportunityFinder, Reducer, ReducerOptions, ReductionOpportunity,
    ReductionPass, ReductionResultStatus, RemoveInstruction, RemoveUnreferencedInstructionFinder,
};
use spvshrink::spirv::{
    binary, BasicBlock, Function, FunctionControl, Instruction, Module, Op, Operand, TargetEnv,
    Word,
};
use spvshrink::Error;

/// A void-main module whose body stores a constant into four variables
/// nobody reads; only the %13/%14 load-store chain is live.
fn make_shader_module() -> Module {
    let mut module = Module::new();
    module.push_global(Instruction::new(
        Op::Capability,
        None,
        None,
        vec![Operand::Literal(1)],
    ));
    module.push_global(Instruction::new(
        Op::MemoryModel,
        None,
        None,
        vec![Operand::Literal(0), Operand::Literal(1)],
    ));
    module.push_global(Instruction::new(
        Op::Name,
        None,
        None,
        vec![Operand::Id(4), Operand::LiteralString("main".into())],
    ));
    module.push_global(Instruction::new(Op::TypeVoid, None, Some(2), Vec::new()));
    module.push_global(Instruction::new(
        Op::TypeFunction,
        None,
        Some(3),
        vec![Operand::Id(2)],
    ));
    module.push_global(Instruction::new(
        Op::TypeFloat,
        None,
        Some(6),
        vec![Operand::Literal(32)],
    ));
    module.push_global(Instruction::new(
        Op::TypePointer,
        None,
        Some(7),
        vec![Operand::Literal(7), Operand::Id(6)],
    ));
    module.push_global(Instruction::new(
        Op::Constant,
        Some(6),
        Some(8),
        vec![Operand::Literal(1.0f32.to_bits())],
    ));

    let mut function = Function::new(4, 2, FunctionControl::empty(), 3);
    let mut block = BasicBlock::new(5);
    for variable in 9..=13 {
        block.push(Instruction::new(
            Op::Variable,
            Some(7),
            Some(variable),
            vec![Operand::Literal(7)],
        ));
    }
    for variable in 9..=12 {
        block.push(Instruction::new(
            Op::Store,
            None,
            None,
            vec![Operand::Id(variable), Operand::Id(8)],
        ));
    }
    block.push(Instruction::new(
        Op::Load,
        Some(6),
        Some(14),
        vec![Operand::Id(13)],
    ));
    block.push(Instruction::new(
        Op::Store,
        None,
        None,
        vec![Operand::Id(13), Operand::Id(14)],
    ));
    block.push(Instruction::new(Op::Return, None, None, Vec::new()));
    function.add_block(block);
    module.add_function(function);
    module.ensure_bound_covers(14);
    module
}

fn body_ops(module: &Module) -> Vec<Op> {
    module
        .function(4)
        .unwrap()
        .block(5)
        .unwrap()
        .instructions()
        .iter()
        .map(Instruction::op)
        .collect()
}

#[test]
fn test_session_converges_to_the_live_chain() {
    let words = binary::serialize(&make_shader_module());

    let mut reducer = Reducer::new(TargetEnv::default());
    reducer.set_interestingness_function(|_, _| true);
    reducer.add_pass(Box::new(RemoveUnreferencedInstructionFinder::new()));

    let outcome = reducer
        .run(words.clone(), &ReducerOptions::default())
        .expect("session runs");
    assert_eq!(outcome.status, ReductionResultStatus::Complete);
    assert!(outcome.binary.len() < words.len());

    // Dead stores go first; the variables and the constant they kept alive
    // follow in later rounds. Only the live load-store chain survives.
    let reduced = binary::parse(&outcome.binary).expect("result decodes");
    assert_eq!(
        body_ops(&reduced),
        vec![Op::Variable, Op::Load, Op::Store, Op::Return]
    );
    assert!(reduced.global(8).is_none());
    // The pointer chain stays referenced throughout.
    assert!(reduced.global(7).is_some());
    assert!(reduced.global(6).is_some());
}

#[test]
fn test_oracle_pins_what_must_survive() {
    let words = binary::serialize(&make_shader_module());

    let mut reducer = Reducer::new(TargetEnv::default());
    // The bug being chased needs the constant declaration; everything else
    // is fair game.
    reducer.set_interestingness_function(|candidate, _| {
        binary::parse(candidate)
            .map(|module| module.global(8).is_some())
            .unwrap_or(false)
    });
    reducer.add_pass(Box::new(RemoveUnreferencedInstructionFinder::new()));

    let outcome = reducer
        .run(words, &ReducerOptions::default())
        .expect("session runs");
    assert_eq!(outcome.status, ReductionResultStatus::Complete);

    let reduced = binary::parse(&outcome.binary).expect("result decodes");
    assert!(reduced.global(8).is_some());
    assert_eq!(
        body_ops(&reduced),
        vec![Op::Variable, Op::Load, Op::Store, Op::Return]
    );
}

#[test]
fn test_attempt_budget_caps_the_session() {
    let words = binary::serialize(&make_shader_module());

    let mut reducer = Reducer::new(TargetEnv::default());
    reducer.set_interestingness_function(|_, _| true);
    reducer.add_pass(Box::new(RemoveUnreferencedInstructionFinder::new()));

    // The probe of the initial binary burns the whole budget, so no edit is
    // ever attempted.
    let outcome = reducer
        .run(words.clone(), &ReducerOptions::new().with_step_limit(1))
        .expect("session runs");
    assert_eq!(outcome.status, ReductionResultStatus::ReachedStepLimit);
    assert_eq!(outcome.binary, words);
}

#[test]
fn test_missing_oracle_is_a_caller_error() {
    let words = binary::serialize(&make_shader_module());

    let mut reducer = Reducer::new(TargetEnv::default());
    reducer.add_pass(Box::new(RemoveUnreferencedInstructionFinder::new()));

    match reducer.run(words, &ReducerOptions::default()) {
        Err(Error::InvariantViolation(_)) => {}
        other => panic!("expected an invariant violation, got {other:?}"),
    }
}

/// A finder built outside the crate: it targets exactly the four dead
/// stores, by pointer id.
struct DeadStoreFinder;

impl OpportunityFinder for DeadStoreFinder {
    fn name(&self) -> &'static str {
        "dead-stores"
    }

    fn available_opportunities(&self, module: &Module) -> Vec<Box<dyn ReductionOpportunity>> {
        let mut opportunities: Vec<Box<dyn ReductionOpportunity>> = Vec::new();
        for function in module.functions() {
            for block in function.blocks() {
                for instruction in block.instructions() {
                    if instruction.op() != Op::Store {
                        continue;
                    }
                    let target = instruction.operand(0).and_then(Operand::id);
                    if target.is_some_and(|pointer| (9..=12).contains(&pointer)) {
                        opportunities.push(Box::new(RemoveInstruction::new(
                            InstructionLocation::Body {
                                function: function.id(),
                                block: block.id(),
                            },
                            instruction.clone(),
                        )));
                    }
                }
            }
        }
        opportunities
    }
}

#[test]
fn test_pass_schedule_halves_from_whole_list_to_singles() {
    let words = binary::serialize(&make_shader_module());
    let mut pass = ReductionPass::new(TargetEnv::default(), Box::new(DeadStoreFinder));

    // Re-feed the original binary on every call so the opportunity list
    // stays at four entries; the recorded pairs are (granularity after the
    // call, whether the call produced a candidate). Each sweep ends with a
    // no-progress wrap call that halves the granularity, and the wrap at one
    // exhausts the pass.
    let mut keep = |_: &[Word]| true;
    let mut trace = Vec::new();
    while !pass.reached_minimum_granularity() {
        let outcome = pass
            .try_apply_reduction(&words, &mut keep)
            .expect("decodes");
        trace.push((pass.granularity(), outcome.is_some()));
    }

    assert_eq!(
        trace,
        vec![
            (4, true),
            (2, false),
            (2, true),
            (2, true),
            (1, false),
            (1, true),
            (1, true),
            (1, true),
            (1, true),
            (1, false),
        ]
    );
}

#[test]
fn test_pass_chunks_apply_against_the_fed_binary() {
    let words = binary::serialize(&make_shader_module());
    let mut pass = ReductionPass::new(TargetEnv::default(), Box::new(DeadStoreFinder));

    // Chained this time: each kept candidate becomes the next input, so the
    // very first whole-list chunk drains the finder and the pass runs dry.
    let mut keep = |_: &[Word]| true;
    let mut current = words;
    while !pass.reached_minimum_granularity() {
        if let Some(next) = pass
            .try_apply_reduction(&current, &mut keep)
            .expect("decodes")
        {
            assert!(next.len() < current.len());
            current = next;
        }
    }

    let reduced = binary::parse(&current).expect("decodes");
    let stores = reduced
        .function(4)
        .unwrap()
        .block(5)
        .unwrap()
        .instructions()
        .iter()
        .filter(|instruction| instruction.op() == Op::Store)
        .count();
    assert_eq!(stores, 1);
}
