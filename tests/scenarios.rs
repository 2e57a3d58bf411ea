//! End-to-end scenarios through the public API.
//!
//! Each test builds a method with `GraphBuilder`, runs the full pipeline and
//! checks the optimized graph both structurally (with `GraphQuery`) and by
//! execution against the unoptimized graph.

mod common;

use rand::{rngs::SmallRng, Rng, SeedableRng};
use seaopt::{
    compiler::{CompileBroker, CompileTask, EventKind, MethodId, OptConfig},
    ir::{CmpTest, GraphBuilder, GraphQuery, Heap, Interpreter, Location, OpKind, TrapReason},
    Result,
};

use common::{optimize, run};

/// `for (i = base; i > base - 2147483647; i += MIN) count++`
///
/// The exit test must stay signed: an unsigned reading of it would change the
/// trip count for every `base`.
#[test]
fn test_min_stride_loop_keeps_signed_exit() -> Result<()> {
    let mut b = GraphBuilder::new(1);
    let base = b.parm(0);
    let offset = b.con(-2_147_483_647);
    let limit = b.add(base, offset);
    let min = b.con(i32::MIN);
    let zero = b.con(0);
    let one = b.con(1);
    let i = b.var(base);
    let count = b.var(zero);
    let mut lp = b.begin_loop();
    let iv = b.get(i);
    let test = b.cmp(CmpTest::Gt, iv, limit);
    b.exit_unless(&mut lp, test);
    let c = b.get(count);
    let next_count = b.add(c, one);
    b.set(count, next_count);
    let next = b.add(iv, min);
    b.set(i, next);
    b.end_loop(lp)?;
    let out = b.get(count);
    b.ret(out);
    let graph = b.finish()?;

    // Base -1 never leaves the loop: the limit is MIN and the iv alternates
    // between -1 and MAX.
    let bases = [0, 1, 5, 100, i32::MAX, i32::MIN, i32::MIN + 1, 1 << 30];
    let expected: Vec<_> = bases.iter().map(|&x| run(&graph, &[x])).collect();
    for config in [OptConfig::default(), OptConfig::aggressive(), OptConfig::stress(3)] {
        let optimized = optimize(graph.clone(), config)?;
        let query = GraphQuery::new(&optimized);
        assert_eq!(query.count(OpKind::CmpU), 0);
        for (&x, want) in bases.iter().zip(&expected) {
            assert_eq!(&run(&optimized, &[x]), want, "base = {x}");
        }
    }
    assert_eq!(expected[0].value(), Some(1));
    Ok(())
}

/// `(x & 0xFF) >> 4` agrees with its optimized form for every pattern of the
/// high bits of `x`.
#[test]
fn test_mask_then_shift_matches_for_high_bits() -> Result<()> {
    let mut b = GraphBuilder::new(1);
    let x = b.parm(0);
    let mask = b.con(0xFF);
    let four = b.con(4);
    let masked = b.and(x, mask);
    let shifted = b.rshift(masked, four);
    b.ret(shifted);
    let graph = b.finish()?;
    let optimized = optimize(graph.clone(), OptConfig::default())?;

    let mut rng = SmallRng::seed_from_u64(0x00ff);
    for high in 0..=0xFFFu32 {
        let low: u32 = rng.gen_range(0..=0xF_FFFF);
        let x = ((high << 20) | low) as i32;
        let want = (x & 0xFF) >> 4;
        assert_eq!(run(&graph, &[x]).value(), Some(want));
        assert_eq!(run(&optimized, &[x]).value(), Some(want), "x = {x:#x}");
    }
    Ok(())
}

/// An exception path guarded by a test that can never hold is removed
/// completely; nothing typed Top stays live.
#[test]
fn test_dead_exception_path_leaves_no_top() -> Result<()> {
    let mut b = GraphBuilder::new(2);
    let x = b.parm(0);
    let n = b.parm(1);
    let one = b.con(1);
    let zero = b.con(0);
    let bit = b.and(x, one);
    let impossible = b.cmp(CmpTest::Gt, bit, one);
    let block = b.if_then(impossible);
    b.store(Location::Array(3), zero, x);
    b.trap(TrapReason::NullCheck);
    b.end_if(block);

    let sum = b.var(zero);
    let i = b.var(zero);
    let mut lp = b.begin_loop();
    let iv = b.get(i);
    let test = b.cmp(CmpTest::Lt, iv, n);
    b.exit_unless(&mut lp, test);
    let acc = b.get(sum);
    let next_sum = b.add(acc, bit);
    b.set(sum, next_sum);
    let next = b.add(iv, one);
    b.set(i, next);
    b.end_loop(lp)?;
    let out = b.get(sum);
    b.ret(out);
    let graph = b.finish()?;
    assert_eq!(GraphQuery::new(&graph).traps().len(), 1);

    for config in [OptConfig::minimal(), OptConfig::default()] {
        let optimized = optimize(graph.clone(), config)?;
        let query = GraphQuery::new(&optimized);
        assert!(query.traps().is_empty());
        assert!(query.live_top_nodes().is_empty());
        assert_eq!(query.count(OpKind::Store), 0);
        for args in [[0, 4], [3, 4], [7, 0]] {
            assert_eq!(run(&optimized, &args), run(&graph, &args));
        }
    }
    Ok(())
}

/// A narrow memory phi that matches the Bottom phi on every path folds away,
/// and random heaps read the same through the remaining phi.
#[test]
fn test_narrow_phi_replaced_by_bottom_phi() -> Result<()> {
    const F: Location = Location::Field { holder: 2, field: 0 };
    const G: Location = Location::Field { holder: 2, field: 1 };

    let mut b = GraphBuilder::new(3);
    let x = b.parm(0);
    let flag = b.parm(1);
    let k = b.parm(2);
    let zero = b.con(0);
    let one = b.con(1);
    let idx = b.and(k, one);
    b.store(F, idx, x);
    let cond = b.cmp(CmpTest::Ne, flag, zero);
    let mut block = b.if_then(cond);
    b.store_opaque(F, zero, flag);
    b.store(G, idx, k);
    b.else_branch(&mut block);
    b.store_opaque(F, one, x);
    b.end_if(block);
    let first = b.load(F, zero);
    let second = b.load(F, one);
    let third = b.load(G, idx);
    let partial = b.add(first, second);
    let total = b.add(partial, third);
    b.ret(total);
    let graph = b.finish()?;

    let optimized = optimize(graph.clone(), OptConfig::default())?;
    let before = GraphQuery::new(&graph).memory_phi_count();
    let after = GraphQuery::new(&optimized).memory_phi_count();
    assert!(after < before, "{after} memory phi(s) left of {before}");

    let mut rng = SmallRng::seed_from_u64(4);
    for _ in 0..500 {
        let mut heap = Heap::new();
        for _ in 0..rng.gen_range(0..6) {
            let location = if rng.gen_bool(0.5) { F } else { G };
            heap.set(location, rng.gen_range(0..2), rng.gen_range(-50..50));
        }
        let args = [rng.gen_range(-9..9), rng.gen_range(-1..=1), rng.gen_range(-4..4)];
        let before = Interpreter::new(&graph).with_heap(heap.clone()).run(&args)?;
        let after = Interpreter::new(&optimized).with_heap(heap).run(&args)?;
        assert_eq!(before, after, "args = {args:?}");
    }
    Ok(())
}

/// Unswitching on an invariant flag gives two loops whose outputs match the
/// original over many random inputs.
#[test]
fn test_unswitched_copies_match_baseline() -> Result<()> {
    const OUT: Location = Location::Array(9);

    let mut b = GraphBuilder::new(3);
    let n = b.parm(0);
    let flag = b.parm(1);
    let scale = b.parm(2);
    let zero = b.con(0);
    let one = b.con(1);
    let fifteen = b.con(15);
    let limit = b.and(n, fifteen);
    let on = b.cmp(CmpTest::Ne, flag, zero);
    let sum = b.var(zero);
    let i = b.var(zero);
    let mut lp = b.begin_loop();
    let iv = b.get(i);
    let test = b.cmp(CmpTest::Lt, iv, limit);
    b.exit_unless(&mut lp, test);
    let mut block = b.if_then(on);
    let acc = b.get(sum);
    let scaled = b.mul(iv, scale);
    let more = b.add(acc, scaled);
    b.set(sum, more);
    b.else_branch(&mut block);
    let acc = b.get(sum);
    let less = b.sub(acc, iv);
    b.set(sum, less);
    b.store(OUT, iv, acc);
    b.end_if(block);
    let next = b.add(iv, one);
    b.set(i, next);
    b.end_loop(lp)?;
    let out = b.get(sum);
    b.ret(out);
    let graph = b.finish()?;

    let broker = CompileBroker::new(OptConfig::default());
    broker.compile(CompileTask::new(MethodId::new(5), graph.clone()));
    let compiled = broker
        .take(MethodId::new(5))
        .and_then(|outcome| outcome.into_compiled())
        .expect("compiles");
    assert!(compiled.events.has(EventKind::LoopUnswitched));
    assert!(GraphQuery::new(&compiled.graph).loops().len() >= 2);

    let mut rng = SmallRng::seed_from_u64(10_000);
    for _ in 0..10_000 {
        let args = [rng.gen(), rng.gen_range(-2..=2), rng.gen_range(-100..100)];
        let want = run(&graph, &args);
        assert_eq!(run(&compiled.graph, &args), want, "args = {args:?}");
    }
    Ok(())
}
