//! Structural verification and the query interface.
//!
//! [`Verifier`] checks the invariants every pass must preserve and reports all
//! violations at once. [`GraphQuery`] answers the questions tests and callers ask
//! about a graph: how many nodes of a kind are live, which loops exist, and an
//! order-independent fingerprint for comparing two optimization results.

use std::hash::{Hash, Hasher};

use rustc_hash::FxHasher;

use crate::{
    error::Violation,
    ir::{
        alias::AliasIdx,
        graph::Graph,
        node::{LoopFlags, NodeId, Op, OpKind, PhiKind, TrapReason},
        types::Type,
    },
    utils::BitSet,
    Error, Result,
};

/// What an input slot must be connected to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Slot {
    /// A control node that continues a path.
    Ctrl,
    /// A control merge.
    Merge,
    /// A branch.
    Branch,
    /// The start node.
    Start,
    /// A method exit.
    Sink,
    /// An integer value.
    Int,
    /// Memory of a given alias class (or Bottom memory).
    Mem(AliasIdx),
}

/// Checks graph invariants.
///
/// # Examples
///
/// ```rust
/// use seaopt::ir::{GraphBuilder, Verifier};
///
/// let mut b = GraphBuilder::new(1);
/// let x = b.parm(0);
/// b.ret(x);
/// let graph = b.finish()?;
/// assert!(Verifier::new(&graph).violations().is_empty());
/// # Ok::<(), seaopt::Error>(())
/// ```
pub struct Verifier<'g> {
    graph: &'g Graph,
}

impl<'g> Verifier<'g> {
    /// Creates a verifier for `graph`.
    #[must_use]
    pub fn new(graph: &'g Graph) -> Self {
        Self { graph }
    }

    /// Verifies the graph.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Verification`] carrying every violation found.
    pub fn verify(&self) -> Result<()> {
        let violations = self.violations();
        if violations.is_empty() {
            Ok(())
        } else {
            Err(Error::Verification(violations))
        }
    }

    /// Collects all violations.
    #[must_use]
    pub fn violations(&self) -> Vec<Violation> {
        let mut out = Vec::new();
        let live = self.graph.reachable();

        for id in self.graph.ids() {
            self.check_mirroring(id, &mut out);
            if live.contains(id.index()) {
                self.check_node(id, &mut out);
            }
        }
        self.check_data_cycles(&live, &mut out);
        out
    }

    fn report(out: &mut Vec<Violation>, node: NodeId, message: String) {
        out.push(Violation { node, message });
    }

    /// Every input edge has exactly one matching user entry and vice versa.
    fn check_mirroring(&self, id: NodeId, out: &mut Vec<Violation>) {
        let g = self.graph;
        for &input in g.inputs(id) {
            if !g.contains(input) {
                Self::report(out, id, format!("input {input} is out of range"));
                continue;
            }
            if g.is_dead(input) {
                Self::report(out, id, format!("input {input} was removed"));
                continue;
            }
            let edges = g.inputs(id).iter().filter(|&&i| i == input).count();
            let mirrored = g.users(input).iter().filter(|&&u| u == id).count();
            if edges != mirrored {
                Self::report(
                    out,
                    id,
                    format!("{edges} edge(s) to {input} but {mirrored} user entries"),
                );
            }
        }
        for &user in g.users(id) {
            if g.is_dead(user) || !g.inputs(user).contains(&id) {
                Self::report(out, id, format!("stale user entry {user}"));
            }
        }
    }

    fn check_node(&self, id: NodeId, out: &mut Vec<Violation>) {
        let g = self.graph;
        let op = g.op(id);
        let inputs = g.inputs(id);

        if let Some(arity) = op.arity() {
            if inputs.len() != arity {
                Self::report(
                    out,
                    id,
                    format!("{op} expects {arity} inputs, has {}", inputs.len()),
                );
                return;
            }
        }
        match op {
            Op::Region if inputs.is_empty() => {
                Self::report(out, id, "region without predecessors".to_string());
            }
            Op::Phi(_) => {
                let region = inputs.first().copied();
                match region {
                    Some(r) if g.op(r).is_merge() => {
                        if inputs.len() != g.inputs(r).len() + 1 {
                            Self::report(
                                out,
                                id,
                                format!(
                                    "phi has {} values for {} predecessors of {r}",
                                    inputs.len() - 1,
                                    g.inputs(r).len()
                                ),
                            );
                            return;
                        }
                    }
                    _ => {
                        Self::report(out, id, "phi is not attached to a merge".to_string());
                        return;
                    }
                }
            }
            _ => {}
        }

        if id != g.top() && g.ty(id).is_top() {
            Self::report(out, id, "live node typed top".to_string());
        }

        for (slot, &input) in inputs.iter().enumerate() {
            if g.is_dead(input) {
                continue;
            }
            let expected = expected_slot(op, slot);
            if input == g.top() {
                let tolerated = op.is_merge()
                    || (matches!(op, Op::Phi(_)) && slot > 0)
                    || matches!(op, Op::Root);
                if !tolerated {
                    Self::report(out, id, format!("slot {slot} reads top"));
                }
                continue;
            }
            if !accepts(g.op(input), expected) {
                Self::report(
                    out,
                    id,
                    format!("slot {slot} expects {expected:?}, got {input} ({})", g.op(input)),
                );
            }
        }
    }

    /// Data cycles must pass through a phi; control cycles pass through a loop.
    fn check_data_cycles(&self, live: &BitSet, out: &mut Vec<Violation>) {
        const WHITE: u8 = 0;
        const GREY: u8 = 1;
        const BLACK: u8 = 2;

        let g = self.graph;
        let breaks = |id: NodeId| {
            let op = g.op(id);
            matches!(op, Op::Phi(_)) || op.is_control()
        };
        let mut color = vec![WHITE; g.len()];

        for root in live.iter().map(|i| NodeId::new(i as u32)) {
            if color[root.index()] != WHITE || breaks(root) {
                continue;
            }
            let mut stack = vec![(root, 0usize)];
            color[root.index()] = GREY;
            while let Some((id, next)) = stack.pop() {
                let inputs = g.inputs(id);
                if next >= inputs.len() {
                    color[id.index()] = BLACK;
                    continue;
                }
                stack.push((id, next + 1));
                let input = inputs[next];
                if g.is_dead(input) || breaks(input) {
                    continue;
                }
                match color[input.index()] {
                    WHITE => {
                        color[input.index()] = GREY;
                        stack.push((input, 0));
                    }
                    GREY => {
                        Self::report(out, id, format!("data cycle through {input}"));
                    }
                    _ => {}
                }
            }
        }
    }
}

fn expected_slot(op: &Op, slot: usize) -> Slot {
    match (op, slot) {
        (Op::Root, _) => Slot::Sink,
        (Op::Region | Op::Loop(_), _) => Slot::Ctrl,
        (Op::IfTrue | Op::IfFalse, _) => Slot::Branch,
        (Op::Parm(_) | Op::InitMem, _) => Slot::Start,
        (Op::Phi(_), 0) => Slot::Merge,
        (Op::Phi(PhiKind::Value), _) => Slot::Int,
        (Op::Phi(PhiKind::Memory(alias)), _) => Slot::Mem(*alias),
        (Op::MergeMem(_), 0) => Slot::Mem(AliasIdx::BOTTOM),
        (Op::MergeMem(aliases), k) => Slot::Mem(aliases[k - 1]),
        (Op::Return | Op::Trap(_), 1) => Slot::Mem(AliasIdx::BOTTOM),
        (Op::Load(access) | Op::Store(access), 1) => Slot::Mem(access.alias),
        (op, 0) if op.is_pinned() => Slot::Ctrl,
        _ => Slot::Int,
    }
}

fn accepts(op: &Op, slot: Slot) -> bool {
    match slot {
        Slot::Ctrl => {
            op.is_control() && !op.is_branch() && !op.is_sink() && !matches!(op, Op::Root)
        }
        Slot::Merge => op.is_merge(),
        Slot::Branch => op.is_branch(),
        Slot::Start => matches!(op, Op::Start),
        Slot::Sink => op.is_sink(),
        Slot::Int => !op.is_control() && !op.is_memory() && !matches!(op, Op::Top),
        Slot::Mem(alias) => {
            op.is_memory()
                && op
                    .alias()
                    .is_some_and(|a| a.is_bottom() || a == alias)
        }
    }
}

/// Read-only questions about a graph, answered over its live nodes.
///
/// # Examples
///
/// ```rust
/// use seaopt::ir::{GraphBuilder, GraphQuery, OpKind};
///
/// let mut b = GraphBuilder::new(1);
/// let x = b.parm(0);
/// let y = b.add(x, x);
/// b.ret(y);
/// let graph = b.finish()?;
///
/// let query = GraphQuery::new(&graph);
/// assert_eq!(query.count(OpKind::AddI), 1);
/// assert_eq!(query.phi_count(), 0);
/// assert!(query.live_top_nodes().is_empty());
/// # Ok::<(), seaopt::Error>(())
/// ```
pub struct GraphQuery<'g> {
    graph: &'g Graph,
    live: BitSet,
}

impl<'g> GraphQuery<'g> {
    /// Snapshots liveness of `graph`.
    #[must_use]
    pub fn new(graph: &'g Graph) -> Self {
        Self {
            graph,
            live: graph.reachable(),
        }
    }

    fn live_ids(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.live.iter().map(|i| NodeId::new(i as u32))
    }

    /// Number of live nodes of a kind.
    #[must_use]
    pub fn count(&self, kind: OpKind) -> usize {
        self.live_ids()
            .filter(|&id| self.graph.op(id).kind() == kind)
            .count()
    }

    /// Number of live phis of any kind.
    #[must_use]
    pub fn phi_count(&self) -> usize {
        self.count(OpKind::Phi)
    }

    /// Number of live memory phis.
    #[must_use]
    pub fn memory_phi_count(&self) -> usize {
        self.live_ids()
            .filter(|&id| matches!(self.graph.op(id), Op::Phi(PhiKind::Memory(_))))
            .count()
    }

    /// Number of live nodes.
    #[must_use]
    pub fn live_nodes(&self) -> usize {
        self.live.count()
    }

    /// Live nodes typed Top, other than the Top singleton.
    #[must_use]
    pub fn live_top_nodes(&self) -> Vec<NodeId> {
        self.live_ids()
            .filter(|&id| id != self.graph.top() && self.graph.ty(id) == Type::Top)
            .collect()
    }

    /// Live loop headers with their flags.
    #[must_use]
    pub fn loops(&self) -> Vec<(NodeId, LoopFlags)> {
        self.live_ids()
            .filter_map(|id| match self.graph.op(id) {
                Op::Loop(flags) => Some((id, *flags)),
                _ => None,
            })
            .collect()
    }

    /// Live traps with their reasons.
    #[must_use]
    pub fn traps(&self) -> Vec<(NodeId, TrapReason)> {
        self.live_ids()
            .filter_map(|id| match self.graph.op(id) {
                Op::Trap(reason) => Some((id, *reason)),
                _ => None,
            })
            .collect()
    }

    /// A hash of the live graph's shape that does not depend on node ids.
    ///
    /// Each node starts with a label derived from its operation; every round
    /// relabels a node from its own label and the labels of its inputs (sorted for
    /// commutative operations). The fingerprint hashes the sorted multiset of final
    /// labels, so two graphs that differ only in node numbering agree.
    #[must_use]
    pub fn fingerprint(&self) -> u64 {
        const ROUNDS: usize = 12;

        let g = self.graph;
        let ids: Vec<NodeId> = self.live_ids().collect();
        let mut labels = vec![0u64; g.len()];
        for &id in &ids {
            let mut h = FxHasher::default();
            g.op(id).hash(&mut h);
            g.inputs(id).len().hash(&mut h);
            labels[id.index()] = h.finish();
        }

        for _ in 0..ROUNDS {
            let mut next = labels.clone();
            for &id in &ids {
                let mut h = FxHasher::default();
                labels[id.index()].hash(&mut h);
                let mut ins: Vec<u64> = g.inputs(id).iter().map(|i| labels[i.index()]).collect();
                if g.op(id).is_commutative() || matches!(g.op(id), Op::Root) {
                    ins.sort_unstable();
                }
                ins.hash(&mut h);
                next[id.index()] = h.finish();
            }
            labels = next;
        }

        let mut all: Vec<u64> = ids.iter().map(|id| labels[id.index()]).collect();
        all.sort_unstable();
        let mut h = FxHasher::default();
        all.hash(&mut h);
        h.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{alias::Location, GraphBuilder};

    #[test]
    fn test_builder_graphs_verify() {
        let mut b = GraphBuilder::new(1);
        let x = b.parm(0);
        let zero = b.con(0);
        let cond = b.cmp(crate::ir::CmpTest::Ne, x, zero);
        let blk = b.if_then(cond);
        b.store(Location::Array(1), zero, x);
        b.end_if(blk);
        b.ret(x);
        let graph = b.finish().unwrap();
        assert!(Verifier::new(&graph).violations().is_empty());
    }

    #[test]
    fn test_detects_wrong_input_kind() {
        let mut b = GraphBuilder::new(1);
        let x = b.parm(0);
        let ret = b.ret(x);
        let mut graph = b.finish().unwrap();
        // Feed an integer where memory is expected.
        graph.set_input(ret, 1, x);
        let violations = Verifier::new(&graph).violations();
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].node, ret);
        assert!(matches!(
            Verifier::new(&graph).verify(),
            Err(Error::Verification(v)) if v.len() == 1
        ));
    }

    #[test]
    fn test_detects_alias_mismatch() {
        let field = Location::Field { holder: 1, field: 0 };
        let mut b = GraphBuilder::new(1);
        let x = b.parm(0);
        let zero = b.con(0);
        let store = b.store(Location::Array(1), zero, x);
        let load = b.load(field, zero);
        b.ret(load);
        let mut graph = b.finish().unwrap();
        graph.set_input(load, 1, store);
        assert!(Verifier::new(&graph)
            .violations()
            .iter()
            .any(|v| v.node == load));
    }

    #[test]
    fn test_detects_data_cycle() {
        let mut b = GraphBuilder::new(1);
        let x = b.parm(0);
        let one = b.con(1);
        let a = b.add(x, one);
        let c = b.add(a, one);
        b.ret(c);
        let mut graph = b.finish().unwrap();
        graph.set_input(a, 0, c);
        assert!(Verifier::new(&graph)
            .violations()
            .iter()
            .any(|v| v.message.contains("data cycle")));
    }

    #[test]
    fn test_fingerprint_ignores_numbering() {
        let build = |swap: bool| {
            let mut b = GraphBuilder::new(2);
            let (x, y) = if swap {
                let y = b.parm(1);
                (b.parm(0), y)
            } else {
                let x = b.parm(0);
                (x, b.parm(1))
            };
            let s = if swap { b.add(y, x) } else { b.add(x, y) };
            b.ret(s);
            b.finish().unwrap()
        };
        let a = GraphQuery::new(&build(false)).fingerprint();
        let b = GraphQuery::new(&build(true)).fingerprint();
        assert_eq!(a, b);

        let mut other = GraphBuilder::new(2);
        let x = other.parm(0);
        let y = other.parm(1);
        let d = other.sub(x, y);
        other.ret(d);
        let c = GraphQuery::new(&other.finish().unwrap()).fingerprint();
        assert_ne!(a, c);
    }
}
