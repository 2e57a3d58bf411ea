//! Range-check elimination.
//!
//! A `RangeCheck` on `CmpU(lt)(index, length)` inside a counted loop is removed
//! when the index provably stays in `[0, length)` on every iteration that
//! reaches the check. Two proofs are tried:
//!
//! - **Numeric**: the index is built from the induction variable with adds,
//!   subtracts, constant multiplies and constant shifts. Its range is evaluated
//!   in `i64` from the induction bounds; every intermediate must fit in `i32`,
//!   otherwise the node's own type is used instead. The check goes when
//!   `0 <= index.lo` and `index.hi < length.lo`.
//! - **Symbolic**: the index is the induction variable itself, the loop counts
//!   up from a non-negative start, and it stays while `iv < limit` where the
//!   limit is the length or a `MinI` with the length as one side.
//!
//! A loop that provably runs zero times keeps its checks; they never execute.

use log::debug;

use crate::{
    analysis::{iv_bounds, CountedLoop, LoopInfo},
    compiler::{context::CompileContext, events::EventKind},
    ir::{CmpTest, Graph, LoopFlags, NodeId, Op, TypeInt},
    utils::fits_i32,
};

/// Removes the provably redundant range checks of one counted loop.
///
/// # Returns
///
/// The number of checks removed.
pub(crate) fn eliminate(ctx: &mut CompileContext, info: &LoopInfo, pass: &'static str) -> usize {
    let Some(counted) = info.counted else {
        return 0;
    };
    let graph = &ctx.graph;
    let iv = induction_range(graph, &counted);

    let mut checks: Vec<NodeId> = info
        .body
        .iter()
        .copied()
        .filter(|&n| matches!(graph.op(n), Op::RangeCheck))
        .collect();
    checks.sort_unstable();

    let mut proven = Vec::new();
    for check in checks {
        let cond = graph.input(check, 1);
        if graph.ty(cond).get_con().is_some() {
            continue;
        }
        let Some((index, length)) = bounds_operands(graph, cond) else {
            continue;
        };
        let numeric = iv.is_some_and(|iv| proves_numeric(graph, info, &counted, iv, index, length));
        if numeric || proves_symbolic(graph, &counted, index, length) {
            proven.push(check);
        }
    }
    if proven.is_empty() {
        return 0;
    }

    let one = ctx.graph.con(1);
    for &check in &proven {
        ctx.graph.set_input(check, 1, one);
        debug!("{}: range check {check} in loop {} removed", ctx.method, info.header);
        ctx.events
            .record(EventKind::RangeCheckEliminated)
            .at(ctx.method, check)
            .pass(pass)
            .message(format!("range check {check} cannot fail in loop {}", info.header));
    }
    ctx.graph
        .set_op(info.header, Op::Loop(info.flags | LoopFlags::RCE_DONE));
    proven.len()
}

/// `(index, length)` of an in-bounds test.
fn bounds_operands(graph: &Graph, cond: NodeId) -> Option<(NodeId, NodeId)> {
    match graph.op(cond) {
        Op::CmpU(CmpTest::Lt) => Some((graph.input(cond, 0), graph.input(cond, 1))),
        Op::CmpU(CmpTest::Gt) => Some((graph.input(cond, 1), graph.input(cond, 0))),
        _ => None,
    }
}

/// Start value type of the iteration space. The inner loop of a strip-mined
/// nest starts at the outer phi, whose entry value bounds it from the start side.
fn init_type(graph: &Graph, counted: &CountedLoop) -> TypeInt {
    let init = counted.init;
    if let Op::Phi(_) = graph.op(init) {
        let outer = graph.input(init, 0);
        if let Op::Loop(flags) = graph.op(outer) {
            if flags.contains(LoopFlags::STRIP_MINED_OUTER) {
                return graph.ty(graph.input(init, 1)).as_int().unwrap_or(TypeInt::INT);
            }
        }
    }
    graph.ty(init).as_int().unwrap_or(TypeInt::INT)
}

fn induction_range(graph: &Graph, counted: &CountedLoop) -> Option<(i64, i64)> {
    let limit = graph.ty(counted.limit).as_int().unwrap_or(TypeInt::INT);
    iv_bounds(counted.test, init_type(graph, counted), limit)
}

fn proves_numeric(
    graph: &Graph,
    info: &LoopInfo,
    counted: &CountedLoop,
    iv: (i64, i64),
    index: NodeId,
    length: NodeId,
) -> bool {
    let Some(length) = graph.ty(length).as_int() else {
        return false;
    };
    let (lo, hi) = index_range(graph, info, counted, iv, index, 0);
    lo >= 0 && hi < length.lo_wide()
}

/// Inclusive range of `node` while the induction variable is within `iv`.
fn index_range(
    graph: &Graph,
    info: &LoopInfo,
    counted: &CountedLoop,
    iv: (i64, i64),
    node: NodeId,
    depth: usize,
) -> (i64, i64) {
    let typed = graph
        .ty(node)
        .as_int()
        .map_or((i64::from(i32::MIN), i64::from(i32::MAX)), |t| {
            (t.lo_wide(), t.hi_wide())
        });
    if node == counted.phi {
        return intersect(iv, typed);
    }
    if depth > 8 || info.is_invariant(node) {
        return typed;
    }
    let operand = |slot: usize| index_range(graph, info, counted, iv, graph.input(node, slot), depth + 1);
    let constant = |slot: usize| graph.con_value(graph.input(node, slot)).map(i64::from);

    let computed = match graph.op(node) {
        Op::AddI => {
            let (a, b) = (operand(0), operand(1));
            Some((a.0 + b.0, a.1 + b.1))
        }
        Op::SubI => {
            let (a, b) = (operand(0), operand(1));
            Some((a.0 - b.1, a.1 - b.0))
        }
        Op::MulI => match (constant(0), constant(1)) {
            (_, Some(c)) => Some(scale(operand(0), c)),
            (Some(c), None) => Some(scale(operand(1), c)),
            (None, None) => None,
        },
        Op::LShiftI => constant(1)
            .filter(|k| (0..31).contains(k))
            .map(|k| scale(operand(0), 1i64 << k)),
        Op::CastII(range) => Some(intersect(
            operand(1),
            (range.lo_wide(), range.hi_wide()),
        )),
        _ => None,
    };
    match computed {
        Some((lo, hi)) if fits_i32(lo) && fits_i32(hi) => intersect((lo, hi), typed),
        _ => typed,
    }
}

fn scale((lo, hi): (i64, i64), factor: i64) -> (i64, i64) {
    let (a, b) = (lo * factor, hi * factor);
    (a.min(b), a.max(b))
}

fn intersect(a: (i64, i64), b: (i64, i64)) -> (i64, i64) {
    (a.0.max(b.0), a.1.min(b.1))
}

fn proves_symbolic(graph: &Graph, counted: &CountedLoop, index: NodeId, length: NodeId) -> bool {
    index == counted.phi
        && counted.stride > 0
        && counted.test == CmpTest::Lt
        && init_type(graph, counted).lo() >= 0
        && bounded_by(graph, counted.limit, length, 0)
}

/// Returns `true` if `limit <= length` by construction.
fn bounded_by(graph: &Graph, limit: NodeId, length: NodeId, depth: usize) -> bool {
    if limit == length {
        return true;
    }
    if depth > 4 {
        return false;
    }
    match graph.op(limit) {
        Op::MinI => (0..2).any(|slot| bounded_by(graph, graph.input(limit, slot), length, depth + 1)),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        analysis::LoopTree,
        compiler::{IterGvn, MethodId, OptConfig},
        ir::{GraphBuilder, GraphQuery, Interpreter},
        test::graphs::{array_walk, array_walk_offset},
    };

    fn run_rce(graph: crate::ir::Graph) -> (CompileContext, usize) {
        let mut ctx = CompileContext::new(MethodId::new(3), graph, OptConfig::default());
        IterGvn::new(&mut ctx.graph, &ctx.config).run().unwrap();
        let tree = LoopTree::build(&ctx.graph);
        let info = tree.loops()[0].clone();
        let removed = eliminate(&mut ctx, &info, "test");
        IterGvn::new(&mut ctx.graph, &ctx.config).run().unwrap();
        (ctx, removed)
    }

    #[test]
    fn test_check_against_limit_removed() {
        // for (i = 0; i < n; i++) check(i, n)
        let (ctx, removed) = run_rce(array_walk(None));
        assert_eq!(removed, 1);
        assert!(ctx.events.has(EventKind::RangeCheckEliminated));
        assert!(GraphQuery::new(&ctx.graph).traps().is_empty());
        let out = Interpreter::new(&ctx.graph).run(&[5]).unwrap();
        assert_eq!(out.value(), Some(10));
    }

    #[test]
    fn test_constant_bounds_removed() {
        // for (i = 0; i < 10; i++) check(i, 10)
        let (ctx, removed) = run_rce(array_walk(Some((10, 10))));
        assert_eq!(removed, 1);
        assert!(GraphQuery::new(&ctx.graph).traps().is_empty());
    }

    #[test]
    fn test_off_by_one_kept() {
        // for (i = 0; i < 11; i++) check(i, 10)
        let (ctx, removed) = run_rce(array_walk(Some((11, 10))));
        assert_eq!(removed, 0);
        assert_eq!(GraphQuery::new(&ctx.graph).traps().len(), 1);
    }

    #[test]
    fn test_offset_index() {
        // for (i = 0; i < 10; i++) check(i + 5, 15) holds, check(i + 6, 15) does not
        let (_, removed) = run_rce(array_walk_offset(5, 15));
        assert_eq!(removed, 1);
        let (_, removed) = run_rce(array_walk_offset(6, 15));
        assert_eq!(removed, 0);
    }

    #[test]
    fn test_negative_start_kept() {
        let mut b = GraphBuilder::new(1);
        let n = b.parm(0);
        let (start, one) = (b.con(-1), b.con(1));
        let i = b.var(start);
        let mut lp = b.begin_loop();
        let iv = b.get(i);
        let test = b.cmp(CmpTest::Lt, iv, n);
        b.exit_unless(&mut lp, test);
        b.range_check(iv, n);
        let next = b.add(iv, one);
        b.set(i, next);
        b.end_loop(lp).unwrap();
        let out = b.get(i);
        b.ret(out);
        let (_, removed) = run_rce(b.finish().unwrap());
        assert_eq!(removed, 0);
    }

    #[test]
    fn test_index_range_stops_at_overflow() {
        let graph = array_walk(None);
        let tree = LoopTree::build(&graph);
        let info = &tree.loops()[0];
        let counted = info.counted.unwrap();
        let range = index_range(&graph, info, &counted, (0, i64::from(i32::MAX)), counted.step, 0);
        assert_eq!(range, (i64::from(i32::MIN), i64::from(i32::MAX)));
    }
}
