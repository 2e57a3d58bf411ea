//! Benchmarks for the loop optimizer and the whole pipeline.
//!
//! - loop tree construction on nested loops
//! - the full O2 pipeline on a counted loop with a range check
//! - the broker compiling a batch of methods in parallel

extern crate seaopt;

use criterion::{criterion_group, criterion_main, BatchSize, Criterion};
use seaopt::{
    analysis::LoopTree,
    compiler::{CompileBroker, CompileContext, CompileTask, MethodId, OptConfig, PassScheduler},
    ir::{CmpTest, Graph, GraphBuilder},
};
use std::hint::black_box;

/// `depth` nested counted loops summing their counters.
fn nested(depth: usize) -> Graph {
    let mut b = GraphBuilder::new(1);
    let n = b.parm(0);
    let zero = b.con(0);
    let one = b.con(1);
    let sum = b.var(zero);
    let mut open = Vec::with_capacity(depth);
    for _ in 0..depth {
        let i = b.var(zero);
        let mut lp = b.begin_loop();
        let iv = b.get(i);
        let test = b.cmp(CmpTest::Lt, iv, n);
        b.exit_unless(&mut lp, test);
        let acc = b.get(sum);
        let more = b.add(acc, iv);
        b.set(sum, more);
        open.push((i, lp));
    }
    while let Some((i, lp)) = open.pop() {
        let iv = b.get(i);
        let next = b.add(iv, one);
        b.set(i, next);
        b.end_loop(lp).unwrap();
    }
    let out = b.get(sum);
    b.ret(out);
    b.finish().unwrap()
}

/// `for (i = 0; i < min(n, len); i++) { check(i, len); sum += i; }`
fn array_loop() -> Graph {
    let mut b = GraphBuilder::new(2);
    let n = b.parm(0);
    let len = b.parm(1);
    let zero = b.con(0);
    let one = b.con(1);
    let limit = b.min(n, len);
    let sum = b.var(zero);
    let i = b.var(zero);
    let mut lp = b.begin_loop();
    let iv = b.get(i);
    let test = b.cmp(CmpTest::Lt, iv, limit);
    b.exit_unless(&mut lp, test);
    b.range_check(iv, len);
    let acc = b.get(sum);
    let more = b.add(acc, iv);
    b.set(sum, more);
    let next = b.add(iv, one);
    b.set(i, next);
    b.end_loop(lp).unwrap();
    let out = b.get(sum);
    b.ret(out);
    b.finish().unwrap()
}

/// Benchmark loop tree construction on four nested loops.
fn bench_loop_tree(c: &mut Criterion) {
    let graph = nested(4);

    c.bench_function("loop_tree_nested_4", |b| {
        b.iter(|| {
            let tree = LoopTree::build(black_box(&graph));
            black_box(tree)
        });
    });
}

/// Benchmark the full O2 pipeline on a loop with a range check.
fn bench_pipeline(c: &mut Criterion) {
    let graph = array_loop();
    let config = OptConfig::default();
    let scheduler = PassScheduler::for_config(&config);

    c.bench_function("pipeline_o2_array_loop", |b| {
        b.iter_batched(
            || CompileContext::new(MethodId::new(1), graph.clone(), config.clone()),
            |mut ctx| {
                scheduler.run_pipeline(&mut ctx).unwrap();
                black_box(ctx)
            },
            BatchSize::SmallInput,
        );
    });
}

/// Benchmark the broker on 32 methods.
fn bench_broker(c: &mut Criterion) {
    let graphs: Vec<Graph> = (0..32)
        .map(|i| if i % 2 == 0 { array_loop() } else { nested(2) })
        .collect();

    c.bench_function("broker_32_methods", |b| {
        b.iter(|| {
            let broker = CompileBroker::new(OptConfig::default());
            let tasks = graphs
                .iter()
                .enumerate()
                .map(|(i, g)| CompileTask::new(MethodId::new(i as u32), g.clone()))
                .collect();
            broker.compile_all(tasks);
            black_box(broker.summary())
        });
    });
}

criterion_group!(benches, bench_loop_tree, bench_pipeline, bench_broker);
criterion_main!(benches);
