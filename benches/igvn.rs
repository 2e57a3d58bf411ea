//! Benchmarks for the IGVN engine.
//!
//! Measures a full run to the fixpoint on:
//! - long straight-line arithmetic with constants to fold and duplicates to common
//! - a memory chain of stores and loads across two alias classes
//! - the same graph under each worklist order

extern crate seaopt;

use criterion::{criterion_group, criterion_main, BatchSize, Criterion};
use seaopt::{
    compiler::{IterGvn, OptConfig, WorklistOrder},
    ir::{Graph, GraphBuilder, Location},
};
use std::hint::black_box;

/// `x` folded through `n` rounds of `(x + c) * 1 ^ 0`, each computed twice.
fn arithmetic_chain(n: i32) -> Graph {
    let mut b = GraphBuilder::new(2);
    let mut x = b.parm(0);
    let y = b.parm(1);
    let zero = b.con(0);
    let one = b.con(1);
    for i in 0..n {
        let c = b.con(i);
        let a = b.add(x, c);
        let m = b.mul(a, one);
        let again = b.add(x, c);
        let d = b.sub(m, again);
        let e = b.xor(d, zero);
        let f = b.add(e, y);
        x = b.add(f, m);
    }
    b.ret(x);
    b.finish().unwrap()
}

/// Stores and loads alternating between a field and an array.
fn memory_chain(n: i32) -> Graph {
    let field = Location::Field { holder: 1, field: 0 };
    let array = Location::Array(1);
    let mut b = GraphBuilder::new(1);
    let x = b.parm(0);
    let mut acc = b.con(0);
    for i in 0..n {
        let idx = b.con(i % 4);
        b.store(field, idx, x);
        b.store(array, idx, acc);
        let v = b.load(field, idx);
        let w = b.load(array, idx);
        let s = b.add(v, w);
        acc = b.add(acc, s);
    }
    b.ret(acc);
    b.finish().unwrap()
}

fn run(graph: &Graph, config: &OptConfig) {
    let mut graph = graph.clone();
    let stats = IterGvn::new(&mut graph, config).run().unwrap();
    black_box((graph, stats));
}

/// Benchmark folding and commoning on 200 rounds of arithmetic.
fn bench_arithmetic(c: &mut Criterion) {
    let graph = arithmetic_chain(200);
    let config = OptConfig::default();

    c.bench_function("igvn_arithmetic_200", |b| {
        b.iter_batched(|| graph.clone(), |g| run(&g, &config), BatchSize::SmallInput);
    });
}

/// Benchmark load forwarding and store elimination on a 200-long chain.
fn bench_memory(c: &mut Criterion) {
    let graph = memory_chain(200);
    let config = OptConfig::default();

    c.bench_function("igvn_memory_200", |b| {
        b.iter_batched(|| graph.clone(), |g| run(&g, &config), BatchSize::SmallInput);
    });
}

/// Benchmark the three worklist orders on the same graph.
fn bench_worklist_orders(c: &mut Criterion) {
    let graph = arithmetic_chain(100);
    let mut group = c.benchmark_group("igvn_worklist_order");
    for (name, order) in [
        ("fifo", WorklistOrder::Fifo),
        ("lifo", WorklistOrder::Lifo),
        ("shuffled", WorklistOrder::Shuffled(7)),
    ] {
        let config = OptConfig::default().with_worklist_order(order);
        group.bench_function(name, |b| {
            b.iter_batched(|| graph.clone(), |g| run(&g, &config), BatchSize::SmallInput);
        });
    }
    group.finish();
}

criterion_group!(
    benches,
    bench_arithmetic,
    bench_memory,
    bench_worklist_orders,
);
criterion_main!(benches);
