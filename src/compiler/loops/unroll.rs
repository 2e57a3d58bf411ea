//! Loop unrolling.
//!
//! Partial unrolling appends a copy of the body after the original one, header
//! test included, so every trip around the backedge runs two iterations. Full
//! unrolling applies to counted loops with a small known trip count: the loop is
//! peeled once per iteration and the backedge, which can no longer be taken, is
//! cut. IGVN folds the copies' header tests afterwards.

use log::debug;

use crate::{
    analysis::LoopInfo,
    compiler::{
        context::CompileContext,
        events::EventKind,
        loops::clone::{can_copy, copy_loop, merge_exits, HeaderMode},
    },
    ir::{LoopFlags, NodeId, Op},
};

/// Trip count of a loop that full unrolling would remove, if any.
pub(crate) fn full_unroll_trips(ctx: &CompileContext, info: &LoopInfo) -> Option<u32> {
    let counted = info.counted?;
    let trips = u32::try_from(counted.trip_count?).ok()?;
    if trips > ctx.config.max_full_unroll_trip || info.flags.is_strip_mined() {
        return None;
    }
    let grown = info.size().saturating_mul(trips as usize);
    if grown > ctx.config.max_unroll_body.saturating_mul(ctx.config.max_full_unroll_trip as usize)
        || !ctx.has_room_for(grown)
        || !can_copy(&ctx.graph, info)
    {
        return None;
    }
    Some(trips)
}

/// Replaces a counted loop by `trips` copies of its body.
pub(crate) fn unroll_fully(
    ctx: &mut CompileContext,
    info: &LoopInfo,
    trips: u32,
    pass: &'static str,
) -> bool {
    let header = info.header;
    for _ in 0..trips {
        let Some(current) = LoopInfo::analyze(&ctx.graph, header) else {
            return false;
        };
        let graph = &mut ctx.graph;
        let Some(copy) = copy_loop(graph, &current, HeaderMode::Entry) else {
            return false;
        };
        let phis = current.phis(graph);
        let entries: Vec<NodeId> = phis.iter().map(|&p| copy.get(graph.input(p, 2))).collect();
        graph.set_input(header, 0, copy.get(current.backedge));
        for (&phi, &value) in phis.iter().zip(&entries) {
            graph.set_input(phi, 1, value);
        }
        merge_exits(graph, &current, &copy);
    }

    // The header test now fails on entry; the backedge is never taken.
    let graph = &mut ctx.graph;
    let top = graph.top();
    for phi in graph.phis_of(header) {
        graph.set_input(phi, 2, top);
    }
    graph.set_input(header, 1, top);

    debug!("{}: fully unrolled loop {header} ({trips} iterations)", ctx.method);
    ctx.events
        .record(EventKind::LoopFullyUnrolled)
        .at(ctx.method, header)
        .pass(pass)
        .message(format!("loop {header} replaced by {trips} copies of its body"));
    true
}

/// Returns `true` if the loop may be unrolled by two.
pub(crate) fn is_candidate(ctx: &CompileContext, info: &LoopInfo) -> bool {
    !info.flags.contains(LoopFlags::UNROLLED)
        && !info.flags.contains(LoopFlags::STRIP_MINED_OUTER)
        && info.size() <= ctx.config.max_unroll_body
        && ctx.has_room_for(info.size() * 2)
        && can_copy(&ctx.graph, info)
}

/// Unrolls the loop by two.
pub(crate) fn unroll(ctx: &mut CompileContext, info: &LoopInfo, pass: &'static str) -> bool {
    let graph = &mut ctx.graph;
    let Some(copy) = copy_loop(graph, info, HeaderMode::Backedge) else {
        return false;
    };
    let phis = info.phis(graph);
    let backs: Vec<NodeId> = phis.iter().map(|&p| copy.get(graph.input(p, 2))).collect();

    graph.set_input(info.header, 1, copy.get(info.backedge));
    for (&phi, &value) in phis.iter().zip(&backs) {
        graph.set_input(phi, 2, value);
    }
    merge_exits(graph, info, &copy);
    graph.set_op(info.header, Op::Loop(info.flags | LoopFlags::UNROLLED));

    debug!("{}: unrolled loop {} by two", ctx.method, info.header);
    ctx.events
        .record(EventKind::LoopUnrolled)
        .at(ctx.method, info.header)
        .pass(pass)
        .message(format!("loop {} unrolled by two", info.header));
    true
}
