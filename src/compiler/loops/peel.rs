//! Loop peeling.
//!
//! The first iteration is copied in front of the loop. The copy's header test
//! decides whether the loop is entered at all; its backedge becomes the loop's
//! entry and the values it computes become the phis' entry values. A test on a
//! phi whose backedge value is invariant folds in both copies afterwards: the
//! copy sees the entry value, the loop only ever sees the invariant one.

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

/// Returns `true` if peeling would let a branch in the body fold.
pub(crate) fn is_candidate(graph: &Graph, info: &LoopInfo, max_body: usize) -> bool {
    if info.flags.contains(LoopFlags::PEELED)
        || info.flags.is_strip_mined()
        || info.size() > max_body
        || !can_copy(graph, info)
    {
        return false;
    }
    let header_test = info.header_test(graph);
    let settles: Vec<NodeId> = info
        .phis(graph)
        .into_iter()
        .filter(|&phi| {
            let back = graph.input(phi, 2);
            back != phi && info.is_invariant(back)
        })
        .collect();
    if settles.is_empty() {
        return false;
    }
    info.body.iter().any(|&node| {
        if !graph.op(node).is_branch() || Some(node) == header_test {
            return false;
        }
        let cond = graph.input(node, 1);
        settles.contains(&cond) || graph.inputs(cond).iter().any(|i| settles.contains(i))
    })
}

/// Peels one iteration off the loop.
///
/// # Returns
///
/// `false` if the loop's shape does not allow the copy.
pub(crate) fn peel(ctx: &mut CompileContext, info: &LoopInfo, pass: &'static str) -> bool {
    let graph = &mut ctx.graph;
    let Some(copy) = copy_loop(graph, info, HeaderMode::Entry) else {
        return false;
    };
    let phis = info.phis(graph);
    let entries: Vec<NodeId> = phis.iter().map(|&p| copy.get(graph.input(p, 2))).collect();

    graph.set_input(info.header, 0, copy.get(info.backedge));
    for (&phi, &value) in phis.iter().zip(&entries) {
        graph.set_input(phi, 1, value);
    }
    merge_exits(graph, info, &copy);
    graph.set_op(info.header, Op::Loop(info.flags | LoopFlags::PEELED));

    debug!("{}: peeled loop {} ({} nodes copied)", ctx.method, info.header, copy.nodes.len());
    ctx.events
        .record(EventKind::LoopPeeled)
        .at(ctx.method, info.header)
        .pass(pass)
        .message(format!("peeled first iteration of loop {}", info.header));
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        analysis::LoopTree,
        compiler::{IterGvn, MethodId, OptConfig},
        ir::{GraphQuery, Interpreter, OpKind, Verifier},
        test::graphs::{counted_sum, first_iteration_flag},
    };

    #[test]
    fn test_peel_folds_first_iteration_test() {
        let graph = first_iteration_flag();
        let expected: Vec<_> = (0..6)
            .map(|n| Interpreter::new(&graph).run(&[n]).unwrap().value())
            .collect();

        let mut ctx = CompileContext::new(MethodId::new(4), graph, OptConfig::default());
        let tree = LoopTree::build(&ctx.graph);
        let info = tree.loops()[0].clone();
        assert!(is_candidate(&ctx.graph, &info, 100));
        let ifs_before = GraphQuery::new(&ctx.graph).count(OpKind::If);

        assert!(peel(&mut ctx, &info, "test"));
        assert!(Verifier::new(&ctx.graph).violations().is_empty());
        IterGvn::new(&mut ctx.graph, &ctx.config).run().unwrap();
        assert!(Verifier::new(&ctx.graph).violations().is_empty());

        // The flag test is gone from the loop and folded in the peeled copy.
        assert!(GraphQuery::new(&ctx.graph).count(OpKind::If) <= ifs_before);
        assert!(ctx.events.has(EventKind::LoopPeeled));
        for (n, want) in (0..6).zip(expected) {
            let got = Interpreter::new(&ctx.graph).run(&[n]).unwrap().value();
            assert_eq!(got, want, "n = {n}");
        }
        let loops = GraphQuery::new(&ctx.graph).loops();
        assert_eq!(loops.len(), 1);
        assert!(loops[0].1.contains(LoopFlags::PEELED));
    }

    #[test]
    fn test_plain_counted_loop_is_not_a_candidate() {
        let graph = counted_sum(0, 1, crate::ir::CmpTest::Lt);
        let tree = LoopTree::build(&graph);
        assert!(!is_candidate(&graph, &tree.loops()[0], 100));
    }
}
