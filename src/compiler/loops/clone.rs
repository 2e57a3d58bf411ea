//! Loop body duplication.
//!
//! Peeling, unrolling and unswitching all copy the control and data body of a
//! loop and then wire the copy in differently. The copy is made in one of three
//! ways, chosen by [`HeaderMode`]:
//!
//! | Mode | Header and phis in the copy | Used by |
//! |------|-----------------------------|---------|
//! | `Clone` | cloned | unswitching |
//! | `Entry` | the header's entry and the phis' entry values | peeling |
//! | `Backedge` | the backedge and the phis' backedge values | unrolling |
//!
//! Exit projections are copied too, and sinks hanging off an exit are copied
//! along with the data they read. Sinks of the original loop get private copies
//! of any value they share with code after the loop, so that redirecting those
//! values at the merged exit cannot change what a sink inside the loop sees.

use rustc_hash::{FxHashMap, FxHashSet};
use smallvec::SmallVec;

use crate::{
    analysis::LoopInfo,
    ir::{AliasIdx, Graph, NodeId, Op, PhiKind},
};

/// How the header of a loop copy is formed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum HeaderMode {
    /// Clone the header and its phis.
    Clone,
    /// The copy runs before the loop: it starts at the header's entry.
    Entry,
    /// The copy runs after the body: it starts at the backedge.
    Backedge,
}

/// The result of duplicating a loop.
#[derive(Debug)]
pub(crate) struct LoopCopy {
    /// Original node to its counterpart in the copy.
    pub map: FxHashMap<NodeId, NodeId>,
    /// Every node created, copies of sinks and their data included.
    pub nodes: FxHashSet<NodeId>,
    /// Sinks of the original loop and their private data.
    pub owned: FxHashSet<NodeId>,
    /// The main exit projection and its copy.
    pub main_exit: (NodeId, NodeId),
}

impl LoopCopy {
    /// The counterpart of `node` in the copy, or `node` itself if it was not copied.
    pub fn get(&self, node: NodeId) -> NodeId {
        self.map.get(&node).copied().unwrap_or(node)
    }
}

/// Returns `true` if the loop's shape allows duplication: it is simple, has no
/// nested loop, and every sink exit leads straight into sinks.
pub(crate) fn can_copy(graph: &Graph, info: &LoopInfo) -> bool {
    if !info.is_innermost() || !info.is_simple(graph) {
        return false;
    }
    info.sink_exits().all(|exit| {
        graph
            .control_successors(exit.proj)
            .iter()
            .all(|&s| graph.op(s).is_sink())
    })
}

/// Duplicates the loop. The copy is disconnected: its entry still points where
/// `mode` says, and nothing leads into it until the caller wires it.
pub(crate) fn copy_loop(graph: &mut Graph, info: &LoopInfo, mode: HeaderMode) -> Option<LoopCopy> {
    let main = info.main_exit(graph)?;
    let mut copy = LoopCopy {
        map: FxHashMap::default(),
        nodes: FxHashSet::default(),
        owned: privatize_sinks(graph, info),
        main_exit: (main.proj, main.proj),
    };

    let header = info.header;
    let phis = info.phis(graph);
    match mode {
        HeaderMode::Clone => {}
        HeaderMode::Entry => {
            copy.map.insert(header, graph.input(header, 0));
            for &phi in &phis {
                copy.map.insert(phi, graph.input(phi, 1));
            }
        }
        HeaderMode::Backedge => {
            copy.map.insert(header, info.backedge);
            for &phi in &phis {
                copy.map.insert(phi, graph.input(phi, 2));
            }
        }
    }

    let mut originals: Vec<NodeId> = info
        .body
        .iter()
        .chain(info.data.iter())
        .copied()
        .filter(|n| !copy.map.contains_key(n))
        .collect();
    originals.sort_unstable();
    originals.dedup();

    for &node in &originals {
        let op = graph.op(node).clone();
        let inputs: SmallVec<[NodeId; 4]> = graph.inputs(node).iter().copied().collect();
        let clone = graph.add(op, &inputs);
        graph.set_type(clone, graph.ty(node));
        copy.map.insert(node, clone);
        copy.nodes.insert(clone);
    }
    for &node in &originals {
        let clone = copy.map[&node];
        for slot in 0..graph.inputs(clone).len() {
            let input = graph.input(clone, slot);
            if let Some(&mapped) = copy.map.get(&input) {
                graph.set_input(clone, slot, mapped);
            }
        }
    }

    // Exits: projections first, then the sinks behind them.
    let mut roots = copy.map.clone();
    for exit in &info.exits {
        let op = graph.op(exit.proj).clone();
        let proj = graph.add(op, &[copy.map[&exit.branch]]);
        copy.map.insert(exit.proj, proj);
        copy.nodes.insert(proj);
        roots.insert(exit.proj, proj);
        if exit.proj == main.proj {
            copy.main_exit = (main.proj, proj);
        }
    }
    let mut memo = FxHashMap::default();
    for exit in info.sink_exits() {
        for sink in graph.control_successors(exit.proj) {
            let op = graph.op(sink).clone();
            let inputs: SmallVec<[NodeId; 4]> = graph.inputs(sink).iter().copied().collect();
            let mapped: SmallVec<[NodeId; 4]> = inputs
                .iter()
                .map(|&i| {
                    copy_dependents(graph, i, &roots, &mut memo, &mut copy.nodes).unwrap_or(i)
                })
                .collect();
            let clone = graph.add(op, &mapped);
            copy.nodes.insert(clone);
            graph.add_sink(clone);
        }
    }
    Some(copy)
}

/// Gives every sink behind a sink exit private copies of the values it reads
/// that depend on the loop. Returns the sinks and the copies.
pub(crate) fn privatize_sinks(graph: &mut Graph, info: &LoopInfo) -> FxHashSet<NodeId> {
    let roots: FxHashMap<NodeId, NodeId> = info
        .body
        .iter()
        .chain(info.data.iter())
        .map(|&n| (n, n))
        .collect();
    let mut memo = FxHashMap::default();
    let mut owned = FxHashSet::default();

    let sinks: Vec<NodeId> = info
        .sink_exits()
        .flat_map(|exit| graph.control_successors(exit.proj))
        .filter(|&s| graph.op(s).is_sink())
        .collect();
    for sink in sinks {
        owned.insert(sink);
        for slot in 1..graph.inputs(sink).len() {
            let input = graph.input(sink, slot);
            if roots.contains_key(&input) {
                continue;
            }
            if let Some(private) = copy_dependents(graph, input, &roots, &mut memo, &mut owned) {
                graph.set_input(sink, slot, private);
            }
        }
    }
    owned
}

/// Copies `node` if it depends on a key of `roots`, substituting the root's
/// value. Returns `None` for nodes that do not depend on any root.
fn copy_dependents(
    graph: &mut Graph,
    node: NodeId,
    roots: &FxHashMap<NodeId, NodeId>,
    memo: &mut FxHashMap<NodeId, Option<NodeId>>,
    created: &mut FxHashSet<NodeId>,
) -> Option<NodeId> {
    if let Some(&root) = roots.get(&node) {
        return Some(root);
    }
    if let Some(&done) = memo.get(&node) {
        return done;
    }
    let op = graph.op(node).clone();
    if op.is_control() || matches!(op, Op::Phi(_)) || graph.inputs(node).is_empty() {
        memo.insert(node, None);
        return None;
    }
    // Data cycles pass through phis, so the recursion terminates.
    let inputs: SmallVec<[NodeId; 4]> = graph.inputs(node).iter().copied().collect();
    let mut reached = false;
    let mut mapped: SmallVec<[NodeId; 4]> = SmallVec::new();
    for input in inputs {
        match copy_dependents(graph, input, roots, memo, created) {
            Some(new) => {
                reached = true;
                mapped.push(new);
            }
            None => mapped.push(input),
        }
    }
    let result = reached.then(|| {
        let clone = graph.add(op, &mapped);
        graph.set_type(clone, graph.ty(node));
        created.insert(clone);
        clone
    });
    memo.insert(node, result);
    result
}

/// The phi kind that can merge `value`.
pub(crate) fn phi_kind(graph: &Graph, value: NodeId) -> PhiKind {
    match graph.op(value) {
        Op::Phi(kind) => *kind,
        Op::Store(access) => PhiKind::Memory(access.alias),
        Op::MergeMem(_) | Op::InitMem => PhiKind::Memory(AliasIdx::BOTTOM),
        _ => PhiKind::Value,
    }
}

/// Joins the main exits of the loop and its copy in a new region, and merges
/// every loop value used after the loop with its counterpart.
///
/// # Returns
///
/// The new region.
pub(crate) fn merge_exits(graph: &mut Graph, info: &LoopInfo, copy: &LoopCopy) -> NodeId {
    let (exit, copy_exit) = copy.main_exit;
    let region = graph.add(Op::Region, &[exit, copy_exit]);
    graph.replace_uses_where(exit, region, |user| user != region);

    let mut values: Vec<NodeId> = info.data.iter().copied().collect();
    values.sort_unstable();
    let mut created: FxHashSet<NodeId> = FxHashSet::default();
    for value in values {
        let mut outside: Vec<NodeId> = graph
            .users(value)
            .iter()
            .copied()
            .filter(|u| {
                !info.data.contains(u)
                    && !info.body.contains(u)
                    && !copy.nodes.contains(u)
                    && !copy.owned.contains(u)
                    && !created.contains(u)
            })
            .collect();
        if outside.is_empty() {
            continue;
        }
        outside.sort_unstable();
        outside.dedup();
        let kind = phi_kind(graph, value);
        let phi = graph.add(Op::Phi(kind), &[region, value, copy.get(value)]);
        created.insert(phi);
        graph.replace_uses_where(value, phi, |u| outside.binary_search(&u).is_ok());
    }
    region
}
