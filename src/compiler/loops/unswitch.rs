//! Loop unswitching.
//!
//! A branch inside the loop whose condition is invariant is hoisted in front of
//! it: the loop is cloned, the original runs when the condition holds and the
//! clone when it does not, and in each copy the branch is pinned to the side it
//! is known to take.

use log::debug;

use crate::{
    analysis::LoopInfo,
    compiler::{
        context::CompileContext,
        events::EventKind,
        loops::clone::{can_copy, copy_loop, merge_exits, HeaderMode},
    },
    ir::{Graph, LoopFlags, NodeId, Op},
};

/// The first branch of the body that can be hoisted.
pub(crate) fn candidate(ctx: &CompileContext, info: &LoopInfo) -> Option<NodeId> {
    let graph = &ctx.graph;
    if info.flags.contains(LoopFlags::UNSWITCHED)
        || info.flags.is_strip_mined()
        || info.size() > ctx.config.max_unswitch_body
        || !ctx.has_room_for(info.size() + 8)
        || !can_copy(graph, info)
    {
        return None;
    }
    let mut branches: Vec<NodeId> = info
        .body
        .iter()
        .copied()
        .filter(|&n| matches!(graph.op(n), Op::If) && hoistable(graph, info, n))
        .collect();
    branches.sort_unstable();
    branches.first().copied()
}

fn hoistable(graph: &Graph, info: &LoopInfo, branch: NodeId) -> bool {
    let cond = graph.input(branch, 1);
    if graph.ty(cond).get_con().is_some() || cond == graph.top() || !info.is_invariant(cond) {
        return false;
    }
    [true, false]
        .into_iter()
        .all(|taken| graph.proj(branch, taken).is_some_and(|p| info.contains(p)))
}

/// Unswitches the loop on `branch`.
pub(crate) fn unswitch(
    ctx: &mut CompileContext,
    info: &LoopInfo,
    branch: NodeId,
    pass: &'static str,
) -> bool {
    let graph = &mut ctx.graph;
    let Some(copy) = copy_loop(graph, info, HeaderMode::Clone) else {
        return false;
    };
    let cond = graph.input(branch, 1);
    let entry = graph.input(info.header, 0);
    let select = graph.add(Op::If, &[entry, cond]);
    let on_true = graph.add(Op::IfTrue, &[select]);
    let on_false = graph.add(Op::IfFalse, &[select]);

    let cloned_header = copy.get(info.header);
    graph.set_input(info.header, 0, on_true);
    graph.set_input(cloned_header, 0, on_false);

    let (always, never) = (graph.con(1), graph.con(0));
    graph.set_input(branch, 1, always);
    graph.set_input(copy.get(branch), 1, never);

    merge_exits(graph, info, &copy);
    let flags = info.flags | LoopFlags::UNSWITCHED;
    graph.set_op(info.header, Op::Loop(flags));
    graph.set_op(cloned_header, Op::Loop(flags));

    debug!("{}: unswitched loop {} on {branch}", ctx.method, info.header);
    ctx.events
        .record(EventKind::LoopUnswitched)
        .at(ctx.method, info.header)
        .pass(pass)
        .message(format!(
            "loop {} unswitched on {branch}, copy {cloned_header}",
            info.header
        ));
    true
}
