//! Counted-loop recognition.
//!
//! A counted loop has the shape
//!
//! ```text
//!   L   = Loop(entry, backedge)
//!   iv  = Phi(L, init, next)          next = AddI(iv, ConI(stride))
//!   If(L, CmpI(test)(iv, limit))      limit invariant in L
//! ```
//!
//! where the header test is the only non-sink exit. The stride must be nonzero,
//! not `i32::MIN`, and at most `i32::MAX / 2` in magnitude, and the step past the
//! last iteration must provably not overflow. Everything is evaluated in `i64` so
//! the checks themselves cannot wrap. An unsigned exit test is never counted.

use crate::{
    analysis::loops::LoopInfo,
    ir::{CmpTest, Graph, NodeId, Op, PhiKind, TypeInt},
};

/// The iteration space of a counted loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CountedLoop {
    /// The induction phi.
    pub phi: NodeId,
    /// The phi's entry value.
    pub init: NodeId,
    /// The invariant bound.
    pub limit: NodeId,
    /// Constant step per iteration.
    pub stride: i32,
    /// The body runs while `test(iv, limit)` holds; one of `lt le gt ge`.
    pub test: CmpTest,
    /// The header `If`.
    pub branch: NodeId,
    /// The `CmpI` of the header test.
    pub cmp: NodeId,
    /// The projection that stays in the loop.
    pub stay: NodeId,
    /// The projection that leaves the loop.
    pub exit: NodeId,
    /// The `AddI` feeding the backedge.
    pub step: NodeId,
    /// Number of iterations when init and limit are constants.
    pub trip_count: Option<i64>,
}

impl CountedLoop {
    /// Matches the counted shape on an analyzed loop.
    #[must_use]
    pub fn recognize(graph: &Graph, info: &LoopInfo) -> Option<Self> {
        let exit = info.main_exit(graph)?;
        let branch = exit.branch;
        let cmp = graph.input(branch, 1);
        let Op::CmpI(raw) = *graph.op(cmp) else {
            return None;
        };

        let stay = graph.proj(branch, !matches!(graph.op(exit.proj), Op::IfTrue))?;
        // Normalize to "stay while raw(a, b)".
        let raw = if matches!(graph.op(stay), Op::IfTrue) {
            raw
        } else {
            raw.negate()
        };

        let (a, b) = (graph.input(cmp, 0), graph.input(cmp, 1));
        let is_iv = |n: NodeId| {
            matches!(graph.op(n), Op::Phi(PhiKind::Value)) && graph.input(n, 0) == info.header
        };
        let (phi, limit, test) = if is_iv(a) && info.is_invariant(b) {
            (a, b, raw)
        } else if is_iv(b) && info.is_invariant(a) {
            (b, a, raw.commute())
        } else {
            return None;
        };

        let step = graph.input(phi, 2);
        if !matches!(graph.op(step), Op::AddI) {
            return None;
        }
        let stride = match (graph.input(step, 0), graph.input(step, 1)) {
            (x, c) if x == phi => graph.con_value(c)?,
            (c, x) if x == phi => graph.con_value(c)?,
            _ => return None,
        };
        if stride == 0 || stride == i32::MIN || i64::from(stride).abs() > i64::from(i32::MAX / 2) {
            return None;
        }

        let init = graph.input(phi, 1);
        let init_ty = graph.ty(init).as_int().unwrap_or(TypeInt::INT);
        let limit_ty = graph.ty(limit).as_int().unwrap_or(TypeInt::INT);
        let test = normalize_test(test, stride, init_ty, limit_ty)?;

        if !step_cannot_overflow(test, stride, limit_ty) {
            return None;
        }

        let trip_count = match (graph.con_value(init), graph.con_value(limit)) {
            (Some(i), Some(l)) => Some(trip_count(i, l, stride, test)),
            _ => None,
        };

        Some(Self {
            phi,
            init,
            limit,
            stride,
            test,
            branch,
            cmp,
            stay,
            exit: exit.proj,
            step,
            trip_count,
        })
    }

    /// Inclusive bounds of the induction value on iterations that run the body,
    /// given the types of init and limit. `None` when no iteration can run.
    #[must_use]
    pub fn iv_bounds(&self, graph: &Graph) -> Option<(i64, i64)> {
        let init = graph.ty(self.init).as_int().unwrap_or(TypeInt::INT);
        let limit = graph.ty(self.limit).as_int().unwrap_or(TypeInt::INT);
        iv_bounds(self.test, init, limit)
    }

    /// Returns `true` for loops that count upwards.
    #[must_use]
    pub fn is_increasing(&self) -> bool {
        self.stride > 0
    }
}

/// Checks that the test direction agrees with the stride; `ne` becomes `lt`/`gt`
/// for unit strides when init is provably on the right side of the limit.
fn normalize_test(test: CmpTest, stride: i32, init: TypeInt, limit: TypeInt) -> Option<CmpTest> {
    match (test, stride > 0) {
        (CmpTest::Lt | CmpTest::Le, true) | (CmpTest::Gt | CmpTest::Ge, false) => Some(test),
        (CmpTest::Ne, true) if stride == 1 && init.hi() <= limit.lo() => Some(CmpTest::Lt),
        (CmpTest::Ne, false) if stride == -1 && init.lo() >= limit.hi() => Some(CmpTest::Gt),
        _ => None,
    }
}

/// The last value that passes the test, plus the stride, must fit in `i32`.
fn step_cannot_overflow(test: CmpTest, stride: i32, limit: TypeInt) -> bool {
    let s = i64::from(stride);
    let last = match test {
        CmpTest::Lt => limit.hi_wide() - 1,
        CmpTest::Le => limit.hi_wide(),
        CmpTest::Gt => limit.lo_wide() + 1,
        CmpTest::Ge => limit.lo_wide(),
        CmpTest::Eq | CmpTest::Ne => return false,
    };
    crate::utils::fits_i32(last + s)
}

/// Inclusive range of induction values that pass `test` against `limit`, starting
/// from `init`.
#[must_use]
pub fn iv_bounds(test: CmpTest, init: TypeInt, limit: TypeInt) -> Option<(i64, i64)> {
    let (lo, hi) = match test {
        CmpTest::Lt => (init.lo_wide(), limit.hi_wide() - 1),
        CmpTest::Le => (init.lo_wide(), limit.hi_wide()),
        CmpTest::Gt => (limit.lo_wide() + 1, init.hi_wide()),
        CmpTest::Ge => (limit.lo_wide(), init.hi_wide()),
        CmpTest::Eq | CmpTest::Ne => return None,
    };
    (lo <= hi).then_some((lo, hi))
}

/// Iterations of `for (iv = init; test(iv, limit); iv += stride)`.
#[must_use]
pub fn trip_count(init: i32, limit: i32, stride: i32, test: CmpTest) -> i64 {
    let (i, l, s) = (i64::from(init), i64::from(limit), i64::from(stride));
    let span = match test {
        CmpTest::Lt => l - i,
        CmpTest::Le => l - i + 1,
        CmpTest::Gt => i - l,
        CmpTest::Ge => i - l + 1,
        CmpTest::Eq | CmpTest::Ne => return 0,
    };
    if span <= 0 {
        0
    } else {
        crate::utils::ceil_div(span, s.abs())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        analysis::LoopTree,
        ir::GraphBuilder,
        test::graphs::{counted_sum, strided_loop},
    };

    #[test]
    fn test_trip_count() {
        assert_eq!(trip_count(0, 10, 1, CmpTest::Lt), 10);
        assert_eq!(trip_count(0, 10, 3, CmpTest::Lt), 4);
        assert_eq!(trip_count(0, 10, 1, CmpTest::Le), 11);
        assert_eq!(trip_count(10, 0, -2, CmpTest::Gt), 5);
        assert_eq!(trip_count(5, 5, 1, CmpTest::Lt), 0);
        assert_eq!(trip_count(i32::MIN, i32::MAX, 1, CmpTest::Lt), (1i64 << 32) - 1);
    }

    #[test]
    fn test_recognizes_simple_counted_loop() {
        let graph = counted_sum(0, 1, CmpTest::Lt);
        let tree = LoopTree::build(&graph);
        let counted = tree.loops()[0].counted.unwrap();
        assert_eq!(counted.stride, 1);
        assert_eq!(counted.test, CmpTest::Lt);
        assert_eq!(graph.con_value(counted.init), Some(0));
        assert!(counted.trip_count.is_none());
        assert!(counted.is_increasing());
    }

    #[test]
    fn test_rejects_bad_strides() {
        for stride in [i32::MIN, i32::MAX, i32::MAX / 2 + 1] {
            let graph = strided_loop(0, stride, 100);
            let tree = LoopTree::build(&graph);
            assert!(tree.loops()[0].counted.is_none(), "stride {stride}");
        }
        let graph = strided_loop(0, 4, 100);
        let tree = LoopTree::build(&graph);
        assert_eq!(tree.loops()[0].counted.unwrap().trip_count, Some(25));
    }

    #[test]
    fn test_direction_must_match_stride() {
        let graph = counted_sum(0, -1, CmpTest::Lt);
        let tree = LoopTree::build(&graph);
        assert!(tree.loops()[0].counted.is_none());

        let graph = counted_sum(100, -1, CmpTest::Gt);
        let tree = LoopTree::build(&graph);
        assert_eq!(tree.loops()[0].counted.unwrap().test, CmpTest::Gt);
    }

    #[test]
    fn test_overflowing_step_is_rejected() {
        // for (i = 0; i <= n; i++) with unknown n: i + 1 overflows at n = MAX.
        let graph = counted_sum(0, 1, CmpTest::Le);
        let tree = LoopTree::build(&graph);
        assert!(tree.loops()[0].counted.is_none());
    }

    #[test]
    fn test_unsigned_exit_is_not_counted() {
        let mut b = GraphBuilder::new(1);
        let n = b.parm(0);
        let zero = b.con(0);
        let one = b.con(1);
        let i = b.var(zero);
        let mut lp = b.begin_loop();
        let iv = b.get(i);
        let test = b.cmpu(CmpTest::Lt, iv, n);
        b.exit_unless(&mut lp, test);
        let next = b.add(iv, one);
        b.set(i, next);
        b.end_loop(lp).unwrap();
        let out = b.get(i);
        b.ret(out);
        let graph = b.finish().unwrap();

        let tree = LoopTree::build(&graph);
        assert!(tree.loops()[0].is_simple(&graph));
        assert!(tree.loops()[0].counted.is_none());
    }

    #[test]
    fn test_iv_bounds() {
        let init = TypeInt::con(0);
        let limit = TypeInt::new(0, 100).unwrap();
        assert_eq!(iv_bounds(CmpTest::Lt, init, limit), Some((0, 99)));
        assert_eq!(iv_bounds(CmpTest::Lt, init, TypeInt::con(0)), None);
        assert_eq!(
            iv_bounds(CmpTest::Ge, TypeInt::con(10), TypeInt::con(0)),
            Some((0, 10))
        );
    }
}
