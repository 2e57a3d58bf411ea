//! Iterative global value numbering (IGVN).
//!
//! IGVN is the engine every other optimization feeds. It processes nodes from a
//! worklist until no rule fires anywhere, combining constant folding, algebraic
//! simplification, dead-path propagation, the memory rules and common
//! subexpression elimination in a single fixpoint.
//!
//! # Example
//!
//! Before:
//! ```text
//! n5 = AddI(n3, ConI(2))
//! n6 = AddI(n5, ConI(3))
//! n7 = AddI(n3, ConI(5))
//! ```
//!
//! After:
//! ```text
//! n6 = AddI(n3, ConI(5))    // (x + 2) + 3 -> x + 5
//! n7 -> n6                  // hash-consed, all users moved to n6
//! ```
//!
//! # Algorithm
//!
//! For each node taken from the worklist:
//!
//! 1. A node without users is killed; its inputs are queued
//! 2. A node whose computed type is Top is replaced by the Top node, and its users
//!    are processed eagerly (see [`crate::compiler::deadpath`])
//! 3. Ideal rules run until none fires; in-place edits queue the users, a returned
//!    replacement is value-numbered and substituted
//! 4. The type is recomputed and narrowed by `join` with the old type; users are
//!    queued when it changed
//! 5. A node typed as a constant becomes a `ConI`
//! 6. Identity rules replace the node by an existing equivalent
//! 7. The node is hash-consed against the value table
//!
//! The engine never changes semantics: every rewrite replaces a node by one that
//! computes the same value on every execution reaching it.
//!
//! # Limitations
//!
//! - Types start pessimistic (at the operation's bottom type) and only narrow, so
//!   facts that need optimistic assumptions around a loop are not found
//! - Loop-header phis widen their ranges onto a fixed set of bounds to keep
//!   narrowing finite

mod ideal;
mod table;
mod value;
mod worklist;

use log::trace;
use smallvec::SmallVec;
use worklist::Worklist;

pub use table::ValueTable;
pub use value::compute_type;

use crate::{
    compiler::{
        config::OptConfig,
        context::{CompileContext, MethodId},
        events::{EventKind, EventLog},
        pass::GraphPass,
    },
    ir::{Graph, JoinSemiLattice, NodeId, Op, PhiKind, Type},
    BailoutReason, Error, Result,
};

/// Steps between two checks of the node budget.
const NODE_CHECK_INTERVAL: usize = 1024;

/// Counters of one or more IGVN runs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IgvnStats {
    /// Worklist steps and ideal-rule rounds.
    pub steps: usize,
    /// Rewrites of any kind: ideal rules, folding, identities, commoning,
    /// dead-path replacements.
    pub rewrites: usize,
    /// Type narrowings.
    pub type_updates: usize,
}

impl IgvnStats {
    /// Returns `true` if the run changed the graph or any type.
    #[must_use]
    pub fn changed(&self) -> bool {
        self.rewrites > 0 || self.type_updates > 0
    }

    /// Adds the counters of another run.
    pub fn accumulate(&mut self, other: &Self) {
        self.steps += other.steps;
        self.rewrites += other.rewrites;
        self.type_updates += other.type_updates;
    }
}

/// Outcome of one ideal-rule application.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Progress {
    /// No rule fired.
    Unchanged,
    /// The node was edited in place.
    Changed,
    /// The node is equivalent to another node.
    Replaced(NodeId),
}

/// The IGVN engine over one graph.
///
/// # Example
///
/// ```rust
/// use seaopt::compiler::{IterGvn, OptConfig};
/// use seaopt::ir::{GraphBuilder, GraphQuery, OpKind};
///
/// let mut b = GraphBuilder::new(1);
/// let x = b.parm(0);
/// let two = b.con(2);
/// let three = b.con(3);
/// let a = b.add(x, two);
/// let c = b.add(a, three);
/// b.ret(c);
/// let mut graph = b.finish()?;
///
/// let config = OptConfig::default();
/// let stats = IterGvn::new(&mut graph, &config).run()?;
/// assert!(stats.rewrites > 0);
/// assert_eq!(GraphQuery::new(&graph).count(OpKind::AddI), 1);
/// # Ok::<(), seaopt::Error>(())
/// ```
pub struct IterGvn<'a> {
    pub(crate) graph: &'a mut Graph,
    pub(crate) config: &'a OptConfig,
    pub(crate) worklist: Worklist,
    pub(crate) table: ValueTable,
    pub(crate) stats: IgvnStats,
    events: Option<(&'a EventLog, MethodId)>,
    pass: &'static str,
    full: bool,
}

impl<'a> IterGvn<'a> {
    /// Creates an engine with every rule enabled.
    #[must_use]
    pub fn new(graph: &'a mut Graph, config: &'a OptConfig) -> Self {
        let capacity = graph.len();
        Self {
            graph,
            config,
            worklist: Worklist::new(config.worklist_order, capacity),
            table: ValueTable::new(),
            stats: IgvnStats::default(),
            events: None,
            pass: "igvn",
            full: true,
        }
    }

    /// Records every rewrite in `log` under `method`.
    #[must_use]
    pub fn with_events(mut self, log: &'a EventLog, method: MethodId) -> Self {
        self.events = Some((log, method));
        self
    }

    /// Attributes recorded events to `pass`.
    #[must_use]
    pub fn with_pass(mut self, pass: &'static str) -> Self {
        self.pass = pass;
        self
    }

    /// Restricts the engine to typing, Top propagation and control cleanup.
    #[must_use]
    pub fn dead_paths_only(mut self) -> Self {
        self.full = false;
        self
    }

    /// Returns `true` unless the engine runs in dead-path mode.
    #[must_use]
    pub fn is_full(&self) -> bool {
        self.full
    }

    /// Runs to a fixpoint over the whole graph, then sweeps unreachable nodes.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Bailout`] when the step or node budget is exhausted.
    pub fn run(self) -> Result<IgvnStats> {
        let live = self.graph.reachable();
        let seeds: Vec<NodeId> = self
            .graph
            .ids()
            .filter(|id| live.contains(id.index()))
            .collect();
        self.run_from(seeds)
    }

    /// Runs to a fixpoint starting from `seeds` only.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Bailout`] when the step or node budget is exhausted.
    pub fn run_from<I>(mut self, seeds: I) -> Result<IgvnStats>
    where
        I: IntoIterator<Item = NodeId>,
    {
        self.rebuild_table();
        for id in seeds {
            if self.graph.contains(id) && !self.graph.is_dead(id) {
                self.worklist.push(id);
            }
        }
        while let Some(id) = self.worklist.pop() {
            self.process(id)?;
        }
        self.graph.sweep();
        Ok(self.stats)
    }

    fn rebuild_table(&mut self) {
        self.table.clear();
        if !self.full {
            return;
        }
        let live = self.graph.reachable();
        let ids: Vec<NodeId> = self
            .graph
            .ids()
            .filter(|id| live.contains(id.index()))
            .collect();
        for id in ids {
            self.table.lookup_or_insert(self.graph, id);
        }
    }

    fn tick(&mut self) -> Result<()> {
        self.stats.steps += 1;
        if self.stats.steps > self.config.max_igvn_steps {
            return Err(Error::Bailout(BailoutReason::StepLimit {
                limit: self.config.max_igvn_steps,
            }));
        }
        if self.stats.steps % NODE_CHECK_INTERVAL == 0 {
            let count = self.graph.live_count();
            if count > self.config.max_nodes {
                return Err(Error::Bailout(BailoutReason::NodeLimit {
                    limit: self.config.max_nodes,
                    count,
                }));
            }
        }
        Ok(())
    }

    fn process(&mut self, id: NodeId) -> Result<()> {
        let graph = &*self.graph;
        if graph.is_dead(id) || id == graph.top() || id == graph.start() {
            return Ok(());
        }
        if id == graph.root() {
            self.clean_root();
            return Ok(());
        }
        if graph.users(id).is_empty() {
            self.remove_dead(id);
            return Ok(());
        }
        self.tick()?;

        if compute_type(self.graph, id).is_top() {
            self.narrow_type(id, Type::Top);
            self.propagate_top(id);
            return Ok(());
        }

        self.table.remove(self.graph, id);
        loop {
            self.tick()?;
            match self.ideal(id) {
                Progress::Unchanged => break,
                Progress::Changed => {
                    self.stats.rewrites += 1;
                    self.worklist.push(id);
                    self.enqueue_users(id);
                }
                Progress::Replaced(new) if new == id => break,
                Progress::Replaced(new) => {
                    self.stats.rewrites += 1;
                    self.replace(id, new);
                    return Ok(());
                }
            }
            if self.graph.is_dead(id) {
                return Ok(());
            }
        }

        let ty = compute_type(self.graph, id).join(&self.graph.ty(id));
        self.narrow_type(id, ty);
        if ty.is_top() {
            self.propagate_top(id);
            return Ok(());
        }

        if self.full {
            if let Some(c) = ty.get_con() {
                if !matches!(self.graph.op(id), Op::ConI(_)) {
                    let con = self.make_con(c);
                    self.note(EventKind::ConstantFolded, id, || {
                        format!("{} -> {c}", self.graph.op(id))
                    });
                    self.stats.rewrites += 1;
                    self.replace(id, con);
                    return Ok(());
                }
            }
        }

        if let Some(same) = self.identity(id) {
            self.stats.rewrites += 1;
            self.replace(id, same);
            return Ok(());
        }

        if self.full {
            if let Some(existing) = self.table.lookup_or_insert(self.graph, id) {
                self.note(EventKind::NodeCommoned, id, || {
                    format!("{} commoned into {existing}", self.graph.op(id))
                });
                self.stats.rewrites += 1;
                self.replace(id, existing);
            }
        }
        Ok(())
    }

    fn narrow_type(&mut self, id: NodeId, ty: Type) {
        if self.graph.ty(id) != ty {
            trace!("{id}: {} -> {ty}", self.graph.ty(id));
            self.graph.set_type(id, ty);
            self.stats.type_updates += 1;
            self.enqueue_users(id);
        }
    }

    /// Queues the users of `id` together with the nodes whose rules look through
    /// them: projections of branches, phis of merges, users of arithmetic and
    /// compares, and users of memory nodes.
    pub(crate) fn enqueue_users(&mut self, id: NodeId) {
        let users: SmallVec<[NodeId; 8]> = self.graph.users(id).iter().copied().collect();
        for user in users {
            if self.graph.is_dead(user) {
                continue;
            }
            self.worklist.push(user);
            let op = self.graph.op(user);
            let second = op.is_branch()
                || op.is_merge()
                || op.is_int_binary()
                || op.is_cmp()
                || matches!(op, Op::MergeMem(_) | Op::Store(_) | Op::Phi(PhiKind::Memory(_)));
            if second {
                let next: SmallVec<[NodeId; 8]> =
                    self.graph.users(user).iter().copied().collect();
                for n in next {
                    if !self.graph.is_dead(n) {
                        self.worklist.push(n);
                    }
                }
            }
        }
    }

    /// Creates (or finds) the node `op(inputs)`, typed and value-numbered.
    pub(crate) fn transform(&mut self, op: Op, inputs: &[NodeId]) -> NodeId {
        if op.is_hashable() {
            if let Some(found) = self.table.find(self.graph, &op, inputs) {
                return found;
            }
        }
        let id = self.graph.add(op, inputs);
        let ty = compute_type(self.graph, id).join(&self.graph.ty(id));
        self.graph.set_type(id, ty);
        self.table.lookup_or_insert(self.graph, id);
        self.worklist.push(id);
        id
    }

    /// The canonical `ConI(value)`.
    pub(crate) fn make_con(&mut self, value: i32) -> NodeId {
        self.transform(Op::ConI(value), &[])
    }

    /// Moves every user of `old` to `new`, `new` included, and removes `old`.
    ///
    /// When `new` read `old` it now reads itself. A phi doing so is left to its
    /// identity rule; any other node in that state sits on a cycle no path enters,
    /// and goes to Top.
    pub(crate) fn replace(&mut self, old: NodeId, new: NodeId) {
        if old == new {
            return;
        }
        trace!("replace {old} ({}) by {new}", self.graph.op(old));
        self.enqueue_users(old);
        let cyclic = self.graph.inputs(new).contains(&old);
        self.graph.replace_uses(old, new);
        self.worklist.push(new);
        self.remove_dead(old);
        if cyclic && !self.graph.is_dead(new) && !matches!(self.graph.op(new), Op::Phi(_)) {
            self.propagate_top(new);
        }
    }

    /// Kills `id` if it has no users, then every input orphaned by that.
    pub(crate) fn remove_dead(&mut self, id: NodeId) {
        let mut stack = vec![id];
        while let Some(node) = stack.pop() {
            if self.graph.is_dead(node) || !self.graph.users(node).is_empty() {
                continue;
            }
            let mut inputs: SmallVec<[NodeId; 4]> =
                self.graph.inputs(node).iter().copied().collect();
            inputs.sort_unstable();
            inputs.dedup();
            let orphans = self.graph.kill(node);
            for input in inputs {
                if orphans.contains(&input) {
                    stack.push(input);
                } else if !self.graph.is_dead(input) {
                    // A node that lost a user may now simplify, and so may its
                    // other users (a store whose earlier store lost a reader).
                    self.worklist.push(input);
                    let op = self.graph.op(input);
                    if op.is_branch() || op.is_memory() {
                        self.enqueue_users(input);
                    }
                }
            }
        }
    }

    pub(crate) fn note<F>(&self, kind: EventKind, node: NodeId, message: F)
    where
        F: FnOnce() -> String,
    {
        if let Some((log, method)) = self.events {
            let message = message();
            trace!("{method} {node}: {kind}: {message}");
            log.record(kind)
                .at(method, node)
                .pass(self.pass)
                .message(message);
        }
    }
}

/// Runs IGVN over the whole graph.
pub struct IgvnPass;

impl Default for IgvnPass {
    fn default() -> Self {
        Self::new()
    }
}

impl IgvnPass {
    /// Creates the pass.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl GraphPass for IgvnPass {
    fn name(&self) -> &'static str {
        "igvn"
    }

    fn run(&self, ctx: &mut CompileContext) -> Result<bool> {
        let stats = IterGvn::new(&mut ctx.graph, &ctx.config)
            .with_events(&ctx.events, ctx.method)
            .with_pass(self.name())
            .run()?;
        ctx.stats.igvn.accumulate(&stats);
        Ok(stats.changed())
    }

    fn description(&self) -> &'static str {
        "Constant folding, algebraic simplification, dead paths, memory rules and commoning to a fixpoint"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        ir::{CmpTest, GraphBuilder, GraphQuery, Interpreter, OpKind, Verifier},
        test::graphs::{add_params, counted_sum},
    };

    fn optimize(graph: &mut Graph) -> IgvnStats {
        let config = OptConfig::default();
        IterGvn::new(graph, &config).run().unwrap()
    }

    #[test]
    fn test_folds_constants() {
        let mut b = GraphBuilder::new(0);
        let three = b.con(3);
        let four = b.con(4);
        let sum = b.add(three, four);
        let product = b.mul(sum, three);
        b.ret(product);
        let mut graph = b.finish().unwrap();

        let stats = optimize(&mut graph);
        assert!(stats.rewrites > 0);
        let ret = graph.input(graph.root(), 0);
        assert_eq!(graph.con_value(graph.input(ret, 2)), Some(21));
        assert_eq!(GraphQuery::new(&graph).count(OpKind::AddI), 0);
    }

    #[test]
    fn test_commons_equal_expressions() {
        let mut b = GraphBuilder::new(2);
        let x = b.parm(0);
        let y = b.parm(1);
        let a = b.add(x, y);
        let c = b.add(y, x);
        let both = b.mul(a, c);
        b.ret(both);
        let mut graph = b.finish().unwrap();

        optimize(&mut graph);
        assert_eq!(GraphQuery::new(&graph).count(OpKind::AddI), 1);
        let out = Interpreter::new(&graph).run(&[3, 4]).unwrap();
        assert_eq!(out.value(), Some(49));
    }

    #[test]
    fn test_second_run_is_quiet() {
        let mut graph = counted_sum(0, 1, CmpTest::Lt);
        optimize(&mut graph);
        let again = optimize(&mut graph);
        assert_eq!(again.rewrites, 0);
        assert_eq!(again.type_updates, 0);
        assert!(Verifier::new(&graph).violations().is_empty());
    }

    #[test]
    fn test_step_budget_bails_out() {
        let mut graph = add_params();
        let config = OptConfig {
            max_igvn_steps: 2,
            ..OptConfig::default()
        };
        let err = IterGvn::new(&mut graph, &config).run().unwrap_err();
        assert!(matches!(
            err,
            Error::Bailout(BailoutReason::StepLimit { limit: 2 })
        ));
    }

    #[test]
    fn test_events_are_recorded() {
        let mut b = GraphBuilder::new(0);
        let two = b.con(2);
        let sum = b.add(two, two);
        b.ret(sum);
        let mut graph = b.finish().unwrap();

        let config = OptConfig::default();
        let log = EventLog::new();
        IterGvn::new(&mut graph, &config)
            .with_events(&log, MethodId::new(3))
            .run()
            .unwrap();
        assert!(log.has(EventKind::ConstantFolded));
        let event = log.filter_kind(EventKind::ConstantFolded).next().unwrap();
        assert_eq!(event.method, Some(MethodId::new(3)));
        assert_eq!(event.pass, Some("igvn"));
    }
}
