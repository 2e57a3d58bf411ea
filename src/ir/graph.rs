//! The node arena.
//!
//! Nodes live in a `Vec` and are addressed by [`NodeId`]. Killed nodes keep their
//! slot (flagged [`NodeFlags::DEAD`]) so ids stay stable for the lifetime of the
//! graph. Three singletons exist from construction on: `Start`, `Root` and `Top`.
//!
//! Liveness is reachability from `Root` through input edges; [`Graph::sweep`]
//! kills everything else. Every edge is mirrored in the def-use index, one user
//! entry per edge, and all mutators keep both directions in sync.

use smallvec::SmallVec;

use crate::{
    ir::{
        alias::AliasTable,
        node::{Inputs, Node, NodeFlags, NodeId, Op, PhiKind},
        types::Type,
    },
    utils::BitSet,
};

/// A sea-of-nodes graph for one compilation unit.
#[derive(Debug, Clone)]
pub struct Graph {
    nodes: Vec<Node>,
    start: NodeId,
    root: NodeId,
    top: NodeId,
    params: u32,
    aliases: AliasTable,
}

impl Graph {
    /// Creates an empty graph for a method with `params` integer arguments.
    #[must_use]
    pub fn new(params: u32) -> Self {
        let mut graph = Self {
            nodes: Vec::new(),
            start: NodeId::new(0),
            root: NodeId::new(1),
            top: NodeId::new(2),
            params,
            aliases: AliasTable::new(),
        };
        graph.start = graph.add(Op::Start, &[]);
        graph.root = graph.add(Op::Root, &[]);
        graph.top = graph.add(Op::Top, &[]);
        graph
    }

    /// The method entry.
    #[must_use]
    pub const fn start(&self) -> NodeId {
        self.start
    }

    /// The liveness anchor.
    #[must_use]
    pub const fn root(&self) -> NodeId {
        self.root
    }

    /// The dead value / dead path singleton.
    #[must_use]
    pub const fn top(&self) -> NodeId {
        self.top
    }

    /// Number of integer arguments.
    #[must_use]
    pub const fn params(&self) -> u32 {
        self.params
    }

    /// Alias classes used by the graph's memory operations.
    #[must_use]
    pub fn aliases(&self) -> &AliasTable {
        &self.aliases
    }

    /// Mutable access to the alias classes.
    pub fn aliases_mut(&mut self) -> &mut AliasTable {
        &mut self.aliases
    }

    /// Arena size, including killed slots.
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Returns `true` if the arena holds only the singletons.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.len() <= 3
    }

    /// Number of nodes that were not killed.
    #[must_use]
    pub fn live_count(&self) -> usize {
        self.nodes.iter().filter(|n| !n.is_dead()).count()
    }

    /// Iterates over the ids of nodes that were not killed, in arena order.
    pub fn ids(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.nodes
            .iter()
            .enumerate()
            .filter(|(_, n)| !n.is_dead())
            .map(|(i, _)| Self::id_at(i))
    }

    #[allow(clippy::cast_possible_truncation)]
    fn id_at(index: usize) -> NodeId {
        NodeId::new(index as u32)
    }

    /// Returns `true` if `id` names a slot of this arena.
    #[must_use]
    pub fn contains(&self, id: NodeId) -> bool {
        id.index() < self.nodes.len()
    }

    /// The node behind `id`.
    ///
    /// # Panics
    ///
    /// Panics if `id` does not belong to this graph.
    #[must_use]
    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.index()]
    }

    /// Operation of `id`.
    #[must_use]
    pub fn op(&self, id: NodeId) -> &Op {
        &self.nodes[id.index()].op
    }

    /// Inputs of `id`.
    #[must_use]
    pub fn inputs(&self, id: NodeId) -> &[NodeId] {
        &self.nodes[id.index()].inputs
    }

    /// Input `slot` of `id`.
    ///
    /// # Panics
    ///
    /// Panics if the slot does not exist.
    #[must_use]
    pub fn input(&self, id: NodeId, slot: usize) -> NodeId {
        self.nodes[id.index()].inputs[slot]
    }

    /// Users of `id`, one entry per edge.
    #[must_use]
    pub fn users(&self, id: NodeId) -> &[NodeId] {
        &self.nodes[id.index()].users
    }

    /// Cached type of `id`.
    #[must_use]
    pub fn ty(&self, id: NodeId) -> Type {
        self.nodes[id.index()].ty
    }

    /// Returns `true` if `id` was killed.
    #[must_use]
    pub fn is_dead(&self, id: NodeId) -> bool {
        self.nodes[id.index()].is_dead()
    }

    /// Returns the integer constant produced by a `ConI` node.
    #[must_use]
    pub fn con_value(&self, id: NodeId) -> Option<i32> {
        match self.op(id) {
            Op::ConI(c) => Some(*c),
            _ => None,
        }
    }

    /// Control input of a pinned node.
    #[must_use]
    pub fn ctrl(&self, id: NodeId) -> Option<NodeId> {
        let node = self.node(id);
        if node.op.is_pinned() {
            node.inputs.first().copied()
        } else {
            None
        }
    }

    /// Appends a node. Its type starts at the operation's bottom type.
    pub fn add(&mut self, op: Op, inputs: &[NodeId]) -> NodeId {
        let id = Self::id_at(self.nodes.len());
        self.nodes.push(Node::new(op, Inputs::from_slice(inputs)));
        for &input in inputs {
            self.nodes[input.index()].users.push(id);
        }
        id
    }

    /// Appends an integer constant without deduplication.
    pub fn con(&mut self, value: i32) -> NodeId {
        self.add(Op::ConI(value), &[])
    }

    pub(crate) fn set_type(&mut self, id: NodeId, ty: Type) {
        self.nodes[id.index()].ty = ty;
    }

    /// Replaces the operation of `id`, keeping its inputs and users.
    pub fn set_op(&mut self, id: NodeId, op: Op) {
        self.nodes[id.index()].op = op;
    }

    fn remove_user(&mut self, def: NodeId, user: NodeId) {
        let users = &mut self.nodes[def.index()].users;
        if let Some(pos) = users.iter().position(|&u| u == user) {
            users.swap_remove(pos);
        }
    }

    /// Rewires input `slot` of `id` to `new`.
    pub fn set_input(&mut self, id: NodeId, slot: usize, new: NodeId) {
        let old = self.nodes[id.index()].inputs[slot];
        if old == new {
            return;
        }
        self.remove_user(old, id);
        self.nodes[id.index()].inputs[slot] = new;
        self.nodes[new.index()].users.push(id);
    }

    /// Appends an input to a variable-arity node.
    pub fn add_input(&mut self, id: NodeId, new: NodeId) {
        self.nodes[id.index()].inputs.push(new);
        self.nodes[new.index()].users.push(id);
    }

    /// Removes input `slot`, shifting later inputs down.
    pub fn remove_input(&mut self, id: NodeId, slot: usize) {
        let old = self.nodes[id.index()].inputs.remove(slot);
        self.remove_user(old, id);
    }

    /// Swaps two inputs of `id`.
    pub fn swap_inputs(&mut self, id: NodeId, a: usize, b: usize) {
        self.nodes[id.index()].inputs.swap(a, b);
    }

    /// Redirects every use of `old` to `new`.
    ///
    /// # Returns
    ///
    /// The number of rewired edges.
    pub fn replace_uses(&mut self, old: NodeId, new: NodeId) -> usize {
        self.replace_uses_where(old, new, |_| true)
    }

    /// Redirects every use of `old` to `new` except those made by `keep`.
    pub fn replace_uses_except(&mut self, old: NodeId, new: NodeId, keep: NodeId) -> usize {
        self.replace_uses_where(old, new, |user| user != keep)
    }

    /// Redirects the uses of `old` by users accepted by `filter` to `new`.
    pub fn replace_uses_where<F>(&mut self, old: NodeId, new: NodeId, filter: F) -> usize
    where
        F: Fn(NodeId) -> bool,
    {
        if old == new {
            return 0;
        }
        let mut users: Vec<NodeId> = self.nodes[old.index()].users.clone();
        users.sort_unstable();
        users.dedup();

        let mut rewired = 0;
        for user in users.into_iter().filter(|&u| filter(u)) {
            let slots: SmallVec<[usize; 4]> = self.nodes[user.index()]
                .inputs
                .iter()
                .enumerate()
                .filter(|&(_, &i)| i == old)
                .map(|(slot, _)| slot)
                .collect();
            for slot in slots {
                self.set_input(user, slot, new);
                rewired += 1;
            }
        }
        rewired
    }

    /// Kills `id`: drops its input edges and flags the slot dead.
    ///
    /// The singletons are never killed. The node must have no users left.
    ///
    /// # Returns
    ///
    /// The former inputs that lost their last user, so callers can clean them up.
    pub fn kill(&mut self, id: NodeId) -> SmallVec<[NodeId; 4]> {
        let mut orphans = SmallVec::new();
        if id == self.start || id == self.root || id == self.top || self.is_dead(id) {
            return orphans;
        }
        debug_assert!(
            self.users(id).is_empty(),
            "killing {id} with users {:?}",
            self.users(id)
        );

        let inputs = std::mem::take(&mut self.nodes[id.index()].inputs);
        for input in inputs {
            self.remove_user(input, id);
            if self.users(input).is_empty()
                && !self.is_dead(input)
                && input != self.start
                && input != self.root
                && input != self.top
                && !orphans.contains(&input)
            {
                orphans.push(input);
            }
        }
        self.nodes[id.index()].flags.insert(NodeFlags::DEAD);
        orphans
    }

    /// Marks every node reachable from `Root` through input edges.
    #[must_use]
    pub fn reachable(&self) -> BitSet {
        let mut marks = BitSet::new(self.nodes.len());
        let mut stack = vec![self.root];
        marks.insert(self.root.index());
        while let Some(id) = stack.pop() {
            for &input in self.inputs(id) {
                if marks.insert(input.index()) {
                    stack.push(input);
                }
            }
        }
        marks
    }

    /// Kills every node not reachable from `Root` (the singletons survive).
    ///
    /// # Returns
    ///
    /// The number of nodes killed.
    pub fn sweep(&mut self) -> usize {
        let marks = self.reachable();
        let doomed: Vec<NodeId> = self
            .ids()
            .filter(|&id| {
                !marks.contains(id.index())
                    && id != self.start
                    && id != self.root
                    && id != self.top
            })
            .collect();

        for &id in &doomed {
            let inputs = std::mem::take(&mut self.nodes[id.index()].inputs);
            for input in inputs {
                self.remove_user(input, id);
            }
        }
        for &id in &doomed {
            let node = &mut self.nodes[id.index()];
            node.users.clear();
            node.flags.insert(NodeFlags::DEAD);
        }
        doomed.len()
    }

    /// Registers a `Return` or `Trap` with the root.
    pub fn add_sink(&mut self, sink: NodeId) {
        self.add_input(self.root, sink);
    }

    /// Phis attached to a `Region` or `Loop`, in arena order.
    #[must_use]
    pub fn phis_of(&self, region: NodeId) -> Vec<NodeId> {
        let mut phis: Vec<NodeId> = self
            .users(region)
            .iter()
            .copied()
            .filter(|&u| matches!(self.op(u), Op::Phi(_)) && self.input(u, 0) == region)
            .collect();
        phis.sort_unstable();
        phis.dedup();
        phis
    }

    /// Value phis attached to a merge.
    #[must_use]
    pub fn value_phis_of(&self, region: NodeId) -> Vec<NodeId> {
        self.phis_of(region)
            .into_iter()
            .filter(|&p| matches!(self.op(p), Op::Phi(PhiKind::Value)))
            .collect()
    }

    /// Position of `pred` among the inputs of a merge.
    #[must_use]
    pub fn pred_index(&self, region: NodeId, pred: NodeId) -> Option<usize> {
        self.inputs(region).iter().position(|&p| p == pred)
    }

    /// Control nodes that continue the path leaving `ctrl`.
    #[must_use]
    pub fn control_successors(&self, ctrl: NodeId) -> SmallVec<[NodeId; 2]> {
        let mut succs: SmallVec<[NodeId; 2]> = SmallVec::new();
        for &user in self.users(ctrl) {
            if self.is_dead(user) || user == self.root || succs.contains(&user) {
                continue;
            }
            let op = self.op(user);
            let follows = if op.is_merge() {
                true
            } else {
                op.is_control() && self.input(user, 0) == ctrl
            };
            if follows {
                succs.push(user);
            }
        }
        succs.sort_unstable();
        succs
    }

    /// The `IfTrue` (`taken == true`) or `IfFalse` projection of a branch.
    #[must_use]
    pub fn proj(&self, branch: NodeId, taken: bool) -> Option<NodeId> {
        self.users(branch).iter().copied().find(|&u| {
            matches!(
                (self.op(u), taken),
                (Op::IfTrue, true) | (Op::IfFalse, false)
            )
        })
    }

    /// Control predecessors of a control node: all inputs of a merge, slot 0 otherwise.
    #[must_use]
    pub fn control_preds(&self, ctrl: NodeId) -> SmallVec<[NodeId; 2]> {
        let op = self.op(ctrl);
        if op.is_merge() {
            SmallVec::from_slice(self.inputs(ctrl))
        } else if op.is_control() && op.is_pinned() {
            self.inputs(ctrl).iter().take(1).copied().collect()
        } else {
            SmallVec::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::CmpTest;

    #[test]
    fn test_singletons() {
        let graph = Graph::new(2);
        assert_eq!(graph.op(graph.start()), &Op::Start);
        assert_eq!(graph.op(graph.root()), &Op::Root);
        assert_eq!(graph.ty(graph.top()), Type::Top);
        assert_eq!(graph.params(), 2);
        assert!(graph.is_empty());
    }

    #[test]
    fn test_edges_are_mirrored() {
        let mut graph = Graph::new(1);
        let x = graph.add(Op::Parm(0), &[graph.start()]);
        let c = graph.con(1);
        let add = graph.add(Op::AddI, &[x, c]);
        let twice = graph.add(Op::AddI, &[x, x]);

        assert_eq!(graph.users(x).len(), 3);
        assert_eq!(graph.users(c), &[add]);

        assert_eq!(graph.replace_uses(x, c), 3);
        assert!(graph.users(x).is_empty());
        assert_eq!(graph.inputs(twice), &[c, c]);
        assert_eq!(graph.users(c).len(), 4);
    }

    #[test]
    fn test_kill_reports_orphans() {
        let mut graph = Graph::new(1);
        let x = graph.add(Op::Parm(0), &[graph.start()]);
        let c = graph.con(3);
        let add = graph.add(Op::AddI, &[x, c]);

        let orphans = graph.kill(add);
        assert!(graph.is_dead(add));
        assert_eq!(orphans.as_slice(), &[x, c]);
        assert!(graph.users(c).is_empty());
    }

    #[test]
    fn test_sweep_removes_unreachable() {
        let mut graph = Graph::new(1);
        let start = graph.start();
        let mem = graph.add(Op::InitMem, &[start]);
        let x = graph.add(Op::Parm(0), &[start]);
        let unused = graph.add(Op::CmpI(CmpTest::Lt), &[x, x]);
        let ret = graph.add(Op::Return, &[start, mem, x]);
        graph.add_sink(ret);

        assert_eq!(graph.sweep(), 1);
        assert!(graph.is_dead(unused));
        assert_eq!(graph.users(x), &[ret]);
        assert!(!graph.is_dead(graph.top()));
    }

    #[test]
    fn test_control_navigation() {
        let mut graph = Graph::new(1);
        let start = graph.start();
        let x = graph.add(Op::Parm(0), &[start]);
        let iff = graph.add(Op::If, &[start, x]);
        let t = graph.add(Op::IfTrue, &[iff]);
        let f = graph.add(Op::IfFalse, &[iff]);
        let region = graph.add(Op::Region, &[t, f]);
        let phi = graph.add(Op::Phi(PhiKind::Value), &[region, x, x]);

        assert_eq!(graph.proj(iff, true), Some(t));
        assert_eq!(graph.proj(iff, false), Some(f));
        assert_eq!(graph.control_successors(start).as_slice(), &[iff]);
        assert_eq!(graph.control_successors(t).as_slice(), &[region]);
        assert_eq!(graph.phis_of(region), vec![phi]);
        assert_eq!(graph.pred_index(region, f), Some(1));
        assert_eq!(graph.control_preds(region).as_slice(), &[t, f]);
        assert_eq!(graph.ctrl(phi), Some(region));
        assert_eq!(graph.ctrl(x), Some(start));
    }
}
