//! Strip mining.
//!
//! A long counted loop is split into an outer loop that advances in chunks and
//! an inner loop that runs at most one chunk:
//!
//! ```text
//!   OL  = Loop(entry, inner_exit)               STRIP_MINED_OUTER
//!   oiv = Phi(OL, init, iv)                     one outer phi per header phi
//!   If(OL, test(oiv, limit))  --exit-->  code after the loop
//!   L   = Loop(outer_stay, backedge)            STRIP_MINED_INNER
//!   iv  = Phi(L, oiv, iv + stride)
//!   If(L, test(iv, min(limit, oiv + chunk * stride)))  --exit-->  OL
//! ```
//!
//! The inner bound is only formed when `oiv + chunk * stride` cannot overflow for
//! any value the induction variable takes. Code after the loop reads the outer
//! phis, which hold the same values the inner phis had on the final exit.

use log::debug;
use smallvec::SmallVec;

use crate::{
    analysis::LoopInfo,
    compiler::{context::CompileContext, events::EventKind, loops::clone::privatize_sinks},
    ir::{LoopFlags, NodeId, Op},
    utils::fits_i32,
};

/// Returns `true` if the loop should be strip mined.
pub(crate) fn is_candidate(ctx: &CompileContext, info: &LoopInfo) -> bool {
    let Some(counted) = info.counted else {
        return false;
    };
    let chunk = i64::from(ctx.config.strip_mine_chunk);
    if chunk < 2 || info.flags.is_strip_mined() || !info.is_innermost() {
        return false;
    }
    if counted.trip_count.is_some_and(|trips| trips <= chunk) {
        return false;
    }
    let Some((lo, hi)) = counted.iv_bounds(&ctx.graph) else {
        return false;
    };
    let span = chunk * i64::from(counted.stride);
    let fits = if counted.is_increasing() {
        fits_i32(hi + span)
    } else {
        fits_i32(lo + span)
    };
    fits && fits_i32(span) && ctx.has_room_for(info.phis(&ctx.graph).len() + 12)
}

/// Splits the loop into an outer and an inner loop.
///
/// # Returns
///
/// `false` if a value computed inside the loop, other than a header phi, is used
/// after it; the loop is left unchanged apart from private copies of sink inputs.
pub(crate) fn strip_mine(ctx: &mut CompileContext, info: &LoopInfo, pass: &'static str) -> bool {
    let Some(counted) = info.counted else {
        return false;
    };
    let graph = &mut ctx.graph;
    let owned = privatize_sinks(graph, info);
    let phis = info.phis(graph);
    let outside = |graph: &crate::ir::Graph, value: NodeId| -> SmallVec<[NodeId; 4]> {
        let mut users: SmallVec<[NodeId; 4]> = graph
            .users(value)
            .iter()
            .copied()
            .filter(|u| !info.data.contains(u) && !info.body.contains(u) && !owned.contains(u))
            .collect();
        users.sort_unstable();
        users.dedup();
        users
    };
    if info
        .data
        .iter()
        .any(|&v| !phis.contains(&v) && !outside(graph, v).is_empty())
    {
        return false;
    }
    let after: Vec<(NodeId, SmallVec<[NodeId; 4]>)> =
        phis.iter().map(|&p| (p, outside(graph, p))).collect();
    let exit = counted.exit;
    let exit_users: SmallVec<[NodeId; 4]> = graph.users(exit).iter().copied().collect();

    let header = info.header;
    let entry = graph.input(header, 0);
    let top = graph.top();
    let outer = graph.add(Op::Loop(info.flags | LoopFlags::STRIP_MINED_OUTER), &[entry, top]);
    let mut outer_iv = counted.init;
    let mut outer_phis = Vec::with_capacity(phis.len());
    for &phi in &phis {
        let op = graph.op(phi).clone();
        let init = graph.input(phi, 1);
        let outer_phi = graph.add(op, &[outer, init, phi]);
        graph.set_input(phi, 1, outer_phi);
        if phi == counted.phi {
            outer_iv = outer_phi;
        }
        outer_phis.push(outer_phi);
    }

    let outer_cmp = graph.add(Op::CmpI(counted.test), &[outer_iv, counted.limit]);
    let outer_test = graph.add(Op::If, &[outer, outer_cmp]);
    let outer_stay = graph.add(Op::IfTrue, &[outer_test]);
    let outer_exit = graph.add(Op::IfFalse, &[outer_test]);

    let span = graph.con(ctx.config.strip_mine_chunk * counted.stride);
    let chunk_end = graph.add(Op::AddI, &[outer_iv, span]);
    let bound = if counted.is_increasing() { Op::MinI } else { Op::MaxI };
    let inner_limit = graph.add(bound, &[counted.limit, chunk_end]);
    let cmp_op = graph.op(counted.cmp).clone();
    let cmp_inputs: SmallVec<[NodeId; 2]> = graph
        .inputs(counted.cmp)
        .iter()
        .map(|&i| if i == counted.limit { inner_limit } else { i })
        .collect();
    let inner_cmp = graph.add(cmp_op, &cmp_inputs);
    graph.set_input(counted.branch, 1, inner_cmp);

    graph.set_input(header, 0, outer_stay);
    graph.set_op(header, Op::Loop(info.flags | LoopFlags::STRIP_MINED_INNER));

    for user in exit_users {
        let slots: SmallVec<[usize; 2]> = graph
            .inputs(user)
            .iter()
            .enumerate()
            .filter(|&(_, &i)| i == exit)
            .map(|(slot, _)| slot)
            .collect();
        for slot in slots {
            graph.set_input(user, slot, outer_exit);
        }
    }
    graph.set_input(outer, 1, exit);
    for ((phi, users), &outer_phi) in after.iter().zip(&outer_phis) {
        graph.replace_uses_where(*phi, outer_phi, |u| users.binary_search(&u).is_ok());
    }

    debug!(
        "{}: strip mined loop {header} into outer {outer}, chunk {}",
        ctx.method, ctx.config.strip_mine_chunk
    );
    ctx.events
        .record(EventKind::LoopStripMined)
        .at(ctx.method, header)
        .pass(pass)
        .message(format!(
            "loop {header} runs in chunks of {} under outer loop {outer}",
            ctx.config.strip_mine_chunk
        ));
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        analysis::LoopTree,
        compiler::{IterGvn, MethodId, OptConfig},
        ir::{CmpTest, GraphQuery, Interpreter, Verifier},
        test::graphs::{counted_sum, masked_sum, strided_loop},
    };

    fn config(chunk: i32) -> OptConfig {
        OptConfig {
            strip_mine_chunk: chunk,
            ..OptConfig::default()
        }
    }

    #[test]
    fn test_strip_mine_nests_loops() {
        // Limit is n & 255, so the chunk end cannot overflow.
        let graph = masked_sum(255);
        let expected: Vec<_> = [0, 1, 3, 4, 9, 17]
            .iter()
            .map(|&n| Interpreter::new(&graph).run(&[n]).unwrap().value())
            .collect();

        let mut ctx = CompileContext::new(MethodId::new(7), graph, config(4));
        IterGvn::new(&mut ctx.graph, &ctx.config).run().unwrap();
        let tree = LoopTree::build(&ctx.graph);
        let info = tree.loops()[0].clone();
        assert!(is_candidate(&ctx, &info));
        assert!(strip_mine(&mut ctx, &info, "test"));
        assert!(Verifier::new(&ctx.graph).violations().is_empty());
        IterGvn::new(&mut ctx.graph, &ctx.config).run().unwrap();
        assert!(Verifier::new(&ctx.graph).violations().is_empty());

        let tree = LoopTree::build(&ctx.graph);
        assert_eq!(tree.len(), 2);
        let inner = tree.innermost_first()[0];
        assert!(inner.flags.contains(LoopFlags::STRIP_MINED_INNER));
        assert!(inner.counted.is_some());
        let outer = tree.get(inner.parent.unwrap()).unwrap();
        assert!(outer.flags.contains(LoopFlags::STRIP_MINED_OUTER));
        assert!(!is_candidate(&ctx, inner));

        for (&n, want) in [0, 1, 3, 4, 9, 17].iter().zip(expected) {
            assert_eq!(Interpreter::new(&ctx.graph).run(&[n]).unwrap().value(), want);
        }
        assert!(ctx.events.has(EventKind::LoopStripMined));
        assert_eq!(GraphQuery::new(&ctx.graph).loops().len(), 2);
    }

    #[test]
    fn test_counting_down() {
        let graph = strided_loop(40, -3, 0);
        let expected = Interpreter::new(&graph).run(&[]).unwrap().value();
        let mut ctx = CompileContext::new(MethodId::new(7), graph, config(2));
        let tree = LoopTree::build(&ctx.graph);
        let info = tree.loops()[0].clone();
        assert!(is_candidate(&ctx, &info));
        assert!(strip_mine(&mut ctx, &info, "test"));
        IterGvn::new(&mut ctx.graph, &ctx.config).run().unwrap();
        assert_eq!(Interpreter::new(&ctx.graph).run(&[]).unwrap().value(), expected);
    }

    #[test]
    fn test_short_loop_not_mined() {
        let ctx = CompileContext::new(MethodId::new(7), strided_loop(0, 1, 3), config(4));
        let tree = LoopTree::build(&ctx.graph);
        assert!(!is_candidate(&ctx, &tree.loops()[0]));
    }

    #[test]
    fn test_unbounded_limit_not_mined() {
        let ctx = CompileContext::new(
            MethodId::new(7),
            counted_sum(0, 1, CmpTest::Lt),
            config(4),
        );
        let tree = LoopTree::build(&ctx.graph);
        assert!(!is_candidate(&ctx, &tree.loops()[0]));
    }
}
