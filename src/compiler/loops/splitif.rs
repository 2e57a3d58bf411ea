//! Split-if through a merge.
//!
//! A branch sitting directly on a `Region` whose condition compares phis of that
//! region is cloned into every predecessor, where the phis are replaced by the
//! values flowing in along that edge:
//!
//! ```text
//!   R = Region(p0, p1)                 If(p0, cmp(a0, b))    If(p1, cmp(a1, b))
//!   a = Phi(R, a0, a1)          =>     T = Region(t0, t1)    F = Region(f0, f1)
//!   If(R, cmp(a, b))                   a phi of R used below T or F moves there
//! ```
//!
//! The split is made only when one of the cloned compares has constant operands,
//! so IGVN removes at least one path afterwards. Every use of a phi of the merge
//! must lie below exactly one side of the branch; a use below a join of both
//! sides keeps the merge in place.

use log::debug;
use rustc_hash::{FxHashMap, FxHashSet};
use smallvec::SmallVec;

use crate::{
    compiler::{context::CompileContext, events::EventKind},
    ir::{Graph, NodeId, Op},
};

/// Largest merge that is split.
const MAX_PREDS: usize = 8;

/// A branch that can be split, with the side every phi use moves to.
#[derive(Debug)]
pub(crate) struct SplitIf {
    branch: NodeId,
    region: NodeId,
    /// `(user, slot, phi, taken side)`
    rewires: Vec<(NodeId, usize, NodeId, bool)>,
}

impl SplitIf {
    /// Nodes the split adds at most.
    pub fn cost(&self, graph: &Graph) -> usize {
        4 * graph.inputs(self.region).len() + 2 * graph.phis_of(self.region).len() + 2
    }
}

/// Live `If` nodes whose control is a `Region`, in id order.
pub(crate) fn candidates(graph: &Graph) -> Vec<NodeId> {
    let live = graph.reachable();
    graph
        .ids()
        .filter(|id| live.contains(id.index()))
        .filter(|&id| {
            matches!(graph.op(id), Op::If) && matches!(graph.op(graph.input(id, 0)), Op::Region)
        })
        .collect()
}

/// Checks whether `branch` can be split and plans the rewiring.
pub(crate) fn plan(graph: &Graph, branch: NodeId) -> Option<SplitIf> {
    let region = graph.input(branch, 0);
    if !matches!(graph.op(region), Op::Region) {
        return None;
    }
    let preds = graph.inputs(region);
    if preds.len() < 2
        || preds.len() > MAX_PREDS
        || preds.iter().any(|&p| p == graph.top() || graph.ty(p).is_top())
    {
        return None;
    }
    let phis = graph.phis_of(region);
    if graph.control_successors(region).as_slice() != [branch]
        || graph
            .users(region)
            .iter()
            .any(|u| *u != branch && !phis.contains(u))
    {
        return None;
    }

    let cond = graph.input(branch, 1);
    if !graph.op(cond).is_cmp() || graph.users(cond).len() != 1 {
        return None;
    }
    let operands = [graph.input(cond, 0), graph.input(cond, 1)];
    if !operands.iter().any(|o| phis.contains(o)) {
        return None;
    }
    if operands
        .iter()
        .any(|&o| !phis.contains(&o) && !defined_above(graph, o, region, &phis))
    {
        return None;
    }
    let folds = (0..preds.len()).any(|k| {
        operands
            .iter()
            .all(|&o| graph.con_value(along(graph, o, k, &phis)).is_some())
    });
    if !folds {
        return None;
    }

    let on_true = graph.proj(branch, true)?;
    let on_false = graph.proj(branch, false)?;
    let mut floating = FxHashMap::default();
    let mut rewires = Vec::new();
    for &phi in &phis {
        for (user, slot) in uses(graph, phi) {
            if user == cond {
                continue;
            }
            let side = side_of_use(graph, user, slot, (on_true, on_false), &mut floating, 0)?;
            rewires.push((user, slot, phi, side));
        }
    }
    Some(SplitIf {
        branch,
        region,
        rewires,
    })
}

/// Performs a planned split.
pub(crate) fn split(ctx: &mut CompileContext, plan: SplitIf, pass: &'static str) -> bool {
    let graph = &mut ctx.graph;
    let SplitIf {
        branch,
        region,
        rewires,
    } = plan;
    let (Some(on_true), Some(on_false)) = (graph.proj(branch, true), graph.proj(branch, false))
    else {
        return false;
    };
    let cond = graph.input(branch, 1);
    let cmp = graph.op(cond).clone();
    let operands = [graph.input(cond, 0), graph.input(cond, 1)];
    let phis = graph.phis_of(region);
    let preds: SmallVec<[NodeId; 4]> = graph.inputs(region).iter().copied().collect();

    let mut trues: SmallVec<[NodeId; 4]> = SmallVec::new();
    let mut falses: SmallVec<[NodeId; 4]> = SmallVec::new();
    for (k, &pred) in preds.iter().enumerate() {
        let inputs: SmallVec<[NodeId; 2]> = operands
            .iter()
            .map(|&o| along(graph, o, k, &phis))
            .collect();
        let test = graph.add(cmp.clone(), &inputs);
        let copy = graph.add(Op::If, &[pred, test]);
        trues.push(graph.add(Op::IfTrue, &[copy]));
        falses.push(graph.add(Op::IfFalse, &[copy]));
    }
    let true_region = graph.add(Op::Region, &trues);
    let false_region = graph.add(Op::Region, &falses);

    let mut copies: FxHashMap<(NodeId, bool), NodeId> = FxHashMap::default();
    for (user, slot, phi, side) in rewires {
        let copy = match copies.get(&(phi, side)) {
            Some(&copy) => copy,
            None => {
                let merge = if side { true_region } else { false_region };
                let mut inputs: SmallVec<[NodeId; 4]> = SmallVec::new();
                inputs.push(merge);
                inputs.extend(graph.inputs(phi).iter().skip(1).copied());
                let copy = graph.add(graph.op(phi).clone(), &inputs);
                copies.insert((phi, side), copy);
                copy
            }
        };
        graph.set_input(user, slot, copy);
    }
    graph.replace_uses(on_true, true_region);
    graph.replace_uses(on_false, false_region);

    debug!(
        "{}: split {branch} through {region} ({} paths)",
        ctx.method,
        preds.len()
    );
    ctx.events
        .record(EventKind::IfSplit)
        .at(ctx.method, branch)
        .pass(pass)
        .message(format!(
            "branch {branch} split through merge {region} into {} paths",
            preds.len()
        ));
    true
}

/// The value of `node` along predecessor `k`.
fn along(graph: &Graph, node: NodeId, k: usize, phis: &[NodeId]) -> NodeId {
    if phis.contains(&node) {
        graph.input(node, k + 1)
    } else {
        node
    }
}

/// Edges `(user, slot)` reading `node`.
fn uses(graph: &Graph, node: NodeId) -> Vec<(NodeId, usize)> {
    let mut users: SmallVec<[NodeId; 8]> = graph.users(node).iter().copied().collect();
    users.sort_unstable();
    users.dedup();
    users
        .into_iter()
        .filter(|&u| !graph.is_dead(u))
        .flat_map(|u| {
            graph
                .inputs(u)
                .iter()
                .enumerate()
                .filter(move |&(_, &i)| i == node)
                .map(move |(slot, _)| (u, slot))
                .collect::<SmallVec<[(NodeId, usize); 2]>>()
        })
        .collect()
}

/// Returns `true` if `node` reads neither a phi of the region nor anything
/// pinned to it.
fn defined_above(graph: &Graph, node: NodeId, region: NodeId, phis: &[NodeId]) -> bool {
    let mut stack = vec![node];
    let mut seen = FxHashSet::default();
    while let Some(n) = stack.pop() {
        if !seen.insert(n) {
            continue;
        }
        if seen.len() > 64 || phis.contains(&n) || graph.ctrl(n) == Some(region) {
            return false;
        }
        let op = graph.op(n);
        if op.is_control() || matches!(op, Op::Phi(_)) {
            continue;
        }
        stack.extend(graph.inputs(n).iter().copied());
    }
    true
}

/// Side of the branch the edge `user[slot]` is evaluated on.
fn side_of_use(
    graph: &Graph,
    user: NodeId,
    slot: usize,
    sides: (NodeId, NodeId),
    floating: &mut FxHashMap<NodeId, Option<bool>>,
    depth: usize,
) -> Option<bool> {
    let op = graph.op(user);
    if let Op::Phi(_) = op {
        let merge = graph.input(user, 0);
        let pred = *graph.inputs(merge).get(slot.checked_sub(1)?)?;
        return side_of_ctrl(graph, pred, sides);
    }
    if op.is_control() || op.is_pinned() {
        return side_of_ctrl(graph, graph.input(user, 0), sides);
    }
    if let Some(&side) = floating.get(&user) {
        return side;
    }
    if depth > 16 {
        return None;
    }
    floating.insert(user, None);
    let mut found = None;
    for (next, next_slot) in uses(graph, user) {
        let side = side_of_use(graph, next, next_slot, sides, floating, depth + 1)?;
        if found.is_some_and(|f| f != side) {
            return None;
        }
        found = Some(side);
    }
    floating.insert(user, found);
    found
}

/// `Some(true)` if every control path into `ctrl` passes the taken projection,
/// `Some(false)` if every one passes the other.
fn side_of_ctrl(graph: &Graph, ctrl: NodeId, (on_true, on_false): (NodeId, NodeId)) -> Option<bool> {
    let mut stack = vec![ctrl];
    let mut seen = FxHashSet::default();
    let (mut saw_true, mut saw_false) = (false, false);
    while let Some(c) = stack.pop() {
        if c == on_true {
            saw_true = true;
            continue;
        }
        if c == on_false {
            saw_false = true;
            continue;
        }
        if c == graph.top() || !seen.insert(c) {
            continue;
        }
        let preds = graph.control_preds(c);
        if c == graph.start() || preds.is_empty() {
            return None;
        }
        stack.extend(preds);
    }
    match (saw_true, saw_false) {
        (true, false) => Some(true),
        (false, true) => Some(false),
        _ => None,
    }
}
