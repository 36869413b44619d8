//! Benchmarks for the reduction pipeline.
//!
//! Measures the three costs a reduction session is built from: the binary
//! codec round trip, one validation of a candidate, and a full session over
//! a module with a known amount of removable code.

extern crate spvshrink;

use criterion::{criterion_group, criterion_main, Criterion, Throughput};
use spvshrink::reduce::{
    Reducer, ReducerOptions, ReductionPass, RemoveUnreferencedInstructionFinder,
};
use spvshrink::spirv::{
    binary, BasicBlock, Function, FunctionControl, Instruction, Module, Op, Operand, TargetEnv,
    Word,
};
use spvshrink::validate::{nop_message_consumer, validate};
use std::hint::black_box;

/// Dead stores in the benchmark module; each keeps one variable alive.
const DEAD_STORES: Word = 64;

/// A void-main module with `DEAD_STORES` removable store/variable pairs and
/// one live load-store chain.
fn make_module() -> Module {
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

    let first_variable: Word = 10;
    let live_variable = first_variable + DEAD_STORES;
    let loaded = live_variable + 1;

    let mut function = Function::new(4, 2, FunctionControl::empty(), 3);
    let mut block = BasicBlock::new(5);
    for variable in first_variable..=live_variable {
        block.push(Instruction::new(
            Op::Variable,
            Some(7),
            Some(variable),
            vec![Operand::Literal(7)],
        ));
    }
    for variable in first_variable..live_variable {
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
        Some(loaded),
        vec![Operand::Id(live_variable)],
    ));
    block.push(Instruction::new(
        Op::Store,
        None,
        None,
        vec![Operand::Id(live_variable), Operand::Id(loaded)],
    ));
    block.push(Instruction::new(Op::Return, None, None, Vec::new()));
    function.add_block(block);
    module.add_function(function);
    module.ensure_bound_covers(loaded);
    module
}

fn bench_codec_round_trip(c: &mut Criterion) {
    let module = make_module();
    let words = binary::serialize(&module);
    let byte_len = (words.len() * std::mem::size_of::<Word>()) as u64;

    let mut group = c.benchmark_group("reduction_codec");
    group.throughput(Throughput::Bytes(byte_len));
    group.bench_function("serialize", |b| {
        b.iter(|| black_box(binary::serialize(black_box(&module))));
    });
    group.bench_function("parse", |b| {
        b.iter(|| black_box(binary::parse(black_box(&words)).unwrap()));
    });
    group.finish();
}

fn bench_validate_candidate(c: &mut Criterion) {
    let words = binary::serialize(&make_module());
    let consumer = nop_message_consumer();

    c.bench_function("reduction_validate", |b| {
        b.iter(|| {
            black_box(validate(
                black_box(&words),
                TargetEnv::default(),
                &consumer,
            ))
        });
    });
}

/// One all-at-once attempt: enumerate, apply every opportunity, validate.
fn bench_single_attempt(c: &mut Criterion) {
    let words = binary::serialize(&make_module());

    c.bench_function("reduction_first_attempt", |b| {
        b.iter(|| {
            let mut pass = ReductionPass::new(
                TargetEnv::default(),
                Box::new(RemoveUnreferencedInstructionFinder::new()),
            );
            let mut keep = |_: &[Word]| true;
            black_box(pass.try_apply_reduction(black_box(&words), &mut keep).unwrap())
        });
    });
}

/// A whole session, rounds and re-arming included.
fn bench_full_session(c: &mut Criterion) {
    let words = binary::serialize(&make_module());

    let mut group = c.benchmark_group("reduction_session");
    group.throughput(Throughput::Elements(u64::from(DEAD_STORES)));
    group.bench_function("run_to_complete", |b| {
        b.iter(|| {
            let mut reducer = Reducer::new(TargetEnv::default());
            reducer.set_interestingness_function(|_, _| true);
            reducer.add_pass(Box::new(RemoveUnreferencedInstructionFinder::new()));
            let outcome = reducer
                .run(black_box(words.clone()), &ReducerOptions::default())
                .unwrap();
            black_box(outcome)
        });
    });
    group.finish();
}

criterion_group!(
    benches,
    bench_codec_round_trip,
    bench_validate_candidate,
    bench_single_attempt,
    bench_full_session
);
criterion_main!(benches);
