//! Dead-path propagation.
//!
//! A node typed Top can never execute or produce a value. When IGVN proves that,
//! the node is replaced by the graph's Top node and its users are examined
//! immediately rather than through the worklist, so a dead branch disappears as
//! one unit: the projection, the code pinned to it, the merges it fed.
//!
//! # Rules
//!
//! | Situation | Result |
//! |-----------|--------|
//! | node typed Top | users rewired to Top, node killed |
//! | merge with a Top predecessor | predecessor and matching phi inputs removed |
//! | loop with a Top backedge | becomes a region with the entry only |
//! | region with one predecessor | phis replaced by their input, region by its predecessor |
//! | projection of a branch on a constant, taken side | replaced by the branch's control |
//! | `Root` input that is Top | removed |
//!
//! The rules are part of every IGVN run. [`DeadPathPass`] runs them alone, with no
//! other rewriting, which is what the O1 pipeline uses.

use log::trace;
use smallvec::SmallVec;

use crate::{
    compiler::{
        context::CompileContext,
        events::EventKind,
        igvn::{compute_type, IterGvn, Progress},
        pass::GraphPass,
    },
    ir::{NodeId, Op, Type},
    Result,
};

impl IterGvn<'_> {
    /// Replaces `start` and every user that becomes Top with it by the Top node.
    pub(crate) fn propagate_top(&mut self, start: NodeId) {
        let top = self.graph.top();
        let mut stack = vec![start];
        while let Some(id) = stack.pop() {
            if id == top || id == self.graph.root() || id == self.graph.start() {
                continue;
            }
            if self.graph.is_dead(id) {
                continue;
            }
            if self.graph.op(id).is_control() {
                self.note(EventKind::DeadPathRemoved, id, || {
                    format!("{} is unreachable", self.graph.op(id))
                });
            }
            trace!("{id} ({}) is top", self.graph.op(id));
            self.table.remove(self.graph, id);
            self.graph.set_type(id, Type::Top);
            self.stats.rewrites += 1;

            let mut users: SmallVec<[NodeId; 8]> = self.graph.users(id).iter().copied().collect();
            users.sort_unstable();
            users.dedup();
            self.graph.replace_uses(id, top);
            for user in users {
                if self.graph.is_dead(user) {
                    continue;
                }
                if user != self.graph.root() && compute_type(self.graph, user).is_top() {
                    stack.push(user);
                } else {
                    self.worklist.push(user);
                    if self.graph.op(user).is_merge() {
                        for phi in self.graph.phis_of(user) {
                            self.worklist.push(phi);
                        }
                    }
                }
            }
            self.remove_dead(id);
        }
    }

    /// Removes Top sinks from `Root`.
    pub(crate) fn clean_root(&mut self) {
        let root = self.graph.root();
        let top = self.graph.top();
        for slot in (0..self.graph.inputs(root).len()).rev() {
            let sink = self.graph.input(root, slot);
            if sink == top || self.graph.ty(sink).is_top() {
                self.graph.remove_input(root, slot);
                self.stats.rewrites += 1;
                if sink != top {
                    self.remove_dead(sink);
                }
            }
        }
    }

    /// Removes dead predecessors of a `Region` or `Loop`, and folds a region with
    /// a single predecessor into it.
    pub(crate) fn ideal_merge(&mut self, id: NodeId) -> Progress {
        let top = self.graph.top();
        let preds: SmallVec<[NodeId; 4]> = self.graph.inputs(id).iter().copied().collect();
        let dead: SmallVec<[usize; 4]> = preds
            .iter()
            .enumerate()
            .filter(|(_, &p)| p == top || self.graph.ty(p).is_top())
            .map(|(slot, _)| slot)
            .collect();

        if matches!(self.graph.op(id), Op::Loop(_)) {
            // A dead entry kills the whole loop through its type.
            if dead.as_slice() != [1] {
                return Progress::Unchanged;
            }
            let phis = self.graph.phis_of(id);
            for &phi in &phis {
                self.table.remove(self.graph, phi);
                if self.graph.inputs(phi).len() > 2 {
                    self.graph.remove_input(phi, 2);
                }
                self.worklist.push(phi);
            }
            self.graph.remove_input(id, 1);
            self.graph.set_op(id, Op::Region);
            self.note(EventKind::RegionSimplified, id, || {
                "loop without backedge became a region".to_string()
            });
            return Progress::Changed;
        }

        if !dead.is_empty() {
            if dead.len() == preds.len() {
                return Progress::Unchanged;
            }
            let phis = self.graph.phis_of(id);
            for &slot in dead.iter().rev() {
                for &phi in &phis {
                    self.table.remove(self.graph, phi);
                    if slot + 1 < self.graph.inputs(phi).len() {
                        self.graph.remove_input(phi, slot + 1);
                    }
                }
                self.graph.remove_input(id, slot);
            }
            for phi in phis {
                self.worklist.push(phi);
            }
            self.note(EventKind::RegionSimplified, id, || {
                format!("removed {} dead predecessor(s)", dead.len())
            });
            return Progress::Changed;
        }

        if preds.len() == 1 {
            for phi in self.graph.phis_of(id) {
                if self.graph.is_dead(phi) {
                    continue;
                }
                let value = match self.graph.inputs(phi).get(1) {
                    Some(&value) if value != phi => value,
                    _ => top,
                };
                self.replace(phi, value);
            }
            // Phis that only read each other are left on a cycle with no entry.
            for phi in self.graph.phis_of(id) {
                self.replace(phi, top);
            }
            self.note(EventKind::RegionSimplified, id, || {
                "region with a single predecessor".to_string()
            });
            return Progress::Replaced(preds[0]);
        }
        Progress::Unchanged
    }

    /// The taken projection of a branch on a constant is the branch's control.
    pub(crate) fn projection_identity(&self, id: NodeId) -> Option<NodeId> {
        let branch = self.graph.input(id, 0);
        if branch == self.graph.top() || !self.graph.op(branch).is_branch() {
            return None;
        }
        let cond = self.graph.input(branch, 1);
        let taken = matches!(self.graph.op(id), Op::IfTrue);
        let c = self.graph.ty(cond).get_con()?;
        if (c != 0) != taken {
            return None;
        }
        let ctrl = self.graph.input(branch, 0);
        self.note(EventKind::DeadPathRemoved, branch, || {
            format!("{} always goes one way", self.graph.op(branch))
        });
        Some(ctrl)
    }
}

/// Runs only typing, Top propagation and control cleanup.
pub struct DeadPathPass;

impl Default for DeadPathPass {
    fn default() -> Self {
        Self::new()
    }
}

impl DeadPathPass {
    /// Creates the pass.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl GraphPass for DeadPathPass {
    fn name(&self) -> &'static str {
        "dead-paths"
    }

    fn run(&self, ctx: &mut CompileContext) -> Result<bool> {
        let stats = IterGvn::new(&mut ctx.graph, &ctx.config)
            .dead_paths_only()
            .with_events(&ctx.events, ctx.method)
            .with_pass(self.name())
            .run()?;
        ctx.stats.igvn.accumulate(&stats);
        Ok(stats.changed())
    }

    fn description(&self) -> &'static str {
        "Removes branches, merges and code proven unreachable"
    }
}
