//! Memory rules of the alias model.
//!
//! Memory is split into alias classes. Bottom memory (class 0) stands for all of
//! it; a narrow class covers one family of locations. A `MergeMem` assembles
//! full memory from a Bottom base plus per-class slices, and narrow loads and
//! stores sit on the chain of their own class only.
//!
//! The rules below let IGVN see through that structure:
//!
//! | Rule | Effect |
//! |------|--------|
//! | resolution | a narrow access on a `MergeMem` moves to the slice of its class |
//! | forwarding | a load of the cell a store just wrote is the stored value |
//! | bypass | a load skips a store to a provably different cell |
//! | store over store | a store hides an earlier store to the same cell |
//! | merge cleanup | nested merges flatten, slices equal to the base drop |
//! | phi split | a narrow load of a Bottom phi gets a phi of its class |
//! | phi merge | a narrow phi equal to the Bottom phi on every path folds into it |
//!
//! Splitting and merging never undo each other: a split happens only when some
//! path resolves to a different node, which is exactly when merging refuses.

use smallvec::SmallVec;

use crate::{
    compiler::{
        events::EventKind,
        igvn::{compute_type, IterGvn, Progress},
        pass::GraphPass,
    },
    ir::{AliasIdx, Graph, MemAccess, NodeId, Op, PhiKind},
};

/// Upper bound on `MergeMem` hops during [`resolve`].
const RESOLVE_LIMIT: usize = 64;

/// The memory state of class `alias` inside `mem`.
///
/// Looks through `MergeMem` nodes: the slice of `alias` when listed, the base
/// otherwise. Stops at anything else. Bottom has no slice to resolve to.
#[must_use]
pub fn resolve(graph: &Graph, mut mem: NodeId, alias: AliasIdx) -> NodeId {
    if alias.is_bottom() {
        return mem;
    }
    for _ in 0..RESOLVE_LIMIT {
        let Op::MergeMem(aliases) = graph.op(mem) else {
            break;
        };
        mem = match aliases.iter().position(|&a| a == alias) {
            Some(k) => graph.input(mem, k + 1),
            None => graph.input(mem, 0),
        };
    }
    mem
}

/// Whether two accesses provably touch different cells.
fn disjoint(graph: &Graph, a: MemAccess, a_index: NodeId, b: MemAccess, b_index: NodeId) -> bool {
    if a.location != b.location {
        return true;
    }
    match (graph.con_value(a_index), graph.con_value(b_index)) {
        (Some(x), Some(y)) => x != y,
        _ => false,
    }
}

impl IterGvn<'_> {
    pub(crate) fn ideal_load(&mut self, id: NodeId, access: MemAccess) -> Progress {
        let mem = self.graph.input(id, 1);
        let index = self.graph.input(id, 2);

        if !access.alias.is_bottom() {
            let slice = resolve(self.graph, mem, access.alias);
            if slice != mem {
                self.graph.set_input(id, 1, slice);
                self.note(EventKind::MemoryMergeSimplified, id, || {
                    format!("load of {access} reads {slice}")
                });
                return Progress::Changed;
            }
        } else if let Op::MergeMem(aliases) = self.graph.op(mem) {
            let class = self.graph.aliases().class_of(access.location);
            if !aliases.contains(&class) {
                let base = self.graph.input(mem, 0);
                self.graph.set_input(id, 1, base);
                self.note(EventKind::MemoryMergeSimplified, id, || {
                    format!("opaque load of {access} reads base {base}")
                });
                return Progress::Changed;
            }
        }

        if let Op::Store(prior) = *self.graph.op(mem) {
            let stored_at = self.graph.input(mem, 2);
            if prior.location == access.location && stored_at == index {
                let value = self.graph.input(mem, 3);
                self.note(EventKind::LoadForwarded, id, || {
                    format!("load of {access} forwarded from {mem}")
                });
                return Progress::Replaced(value);
            }
            if disjoint(self.graph, prior, stored_at, access, index) {
                let before = self.graph.input(mem, 1);
                self.graph.set_input(id, 1, before);
                self.note(EventKind::LoadForwarded, id, || {
                    format!("load of {access} bypasses {mem}")
                });
                return Progress::Changed;
            }
        }

        if !access.alias.is_bottom() {
            if let Op::Phi(PhiKind::Memory(alias)) = *self.graph.op(mem) {
                if alias.is_bottom() {
                    return self.split_memory_phi(id, mem, access.alias);
                }
            }
        }
        Progress::Unchanged
    }

    /// Gives a narrow load on a Bottom phi a phi of its own class.
    fn split_memory_phi(&mut self, load: NodeId, phi: NodeId, alias: AliasIdx) -> Progress {
        let region = self.graph.input(phi, 0);
        let mut slices: SmallVec<[Option<NodeId>; 4]> = SmallVec::new();
        let mut differs = false;
        for &value in &self.graph.inputs(phi)[1..] {
            if value == phi {
                slices.push(None);
            } else {
                let slice = resolve(self.graph, value, alias);
                differs |= slice != value;
                slices.push(Some(slice));
            }
        }
        if !differs {
            return Progress::Unchanged;
        }

        let kind = Op::Phi(PhiKind::Memory(alias));
        let existing = self.graph.phis_of(region).into_iter().find(|&p| {
            *self.graph.op(p) == kind
                && self.graph.inputs(p)[1..]
                    .iter()
                    .zip(&slices)
                    .all(|(&v, s)| s.map_or(v == p, |s| v == s))
        });
        let narrow = match existing {
            Some(p) => p,
            None => {
                let top = self.graph.top();
                let mut inputs: SmallVec<[NodeId; 4]> = SmallVec::new();
                inputs.push(region);
                inputs.extend(slices.iter().map(|s| s.unwrap_or(top)));
                let narrow = self.graph.add(kind, &inputs);
                for (k, s) in slices.iter().enumerate() {
                    if s.is_none() {
                        self.graph.set_input(narrow, k + 1, narrow);
                    }
                }
                let ty = compute_type(self.graph, narrow);
                self.graph.set_type(narrow, ty);
                self.table.lookup_or_insert(self.graph, narrow);
                self.worklist.push(narrow);
                narrow
            }
        };
        self.graph.set_input(load, 1, narrow);
        self.note(EventKind::MemoryPhiSplit, load, || {
            format!("load reads {narrow} of class {alias} instead of {phi}")
        });
        Progress::Changed
    }

    pub(crate) fn ideal_store(&mut self, id: NodeId, access: MemAccess) -> Progress {
        let mem = self.graph.input(id, 1);
        let index = self.graph.input(id, 2);

        if !access.alias.is_bottom() {
            let slice = resolve(self.graph, mem, access.alias);
            if slice != mem {
                self.graph.set_input(id, 1, slice);
                self.note(EventKind::MemoryMergeSimplified, id, || {
                    format!("store to {access} follows {slice}")
                });
                return Progress::Changed;
            }
        }

        if let Op::Store(prior) = *self.graph.op(mem) {
            let only_reader = self.graph.users(mem).iter().all(|&u| u == id);
            if prior == access && self.graph.input(mem, 2) == index && only_reader {
                let before = self.graph.input(mem, 1);
                self.graph.set_input(id, 1, before);
                self.note(EventKind::StoreEliminated, mem, || {
                    format!("store to {access} overwritten by {id}")
                });
                self.remove_dead(mem);
                return Progress::Changed;
            }
        }
        Progress::Unchanged
    }

    pub(crate) fn ideal_merge_mem(&mut self, id: NodeId, aliases: &[AliasIdx]) -> Progress {
        let mut base = self.graph.input(id, 0);
        let mut slices: SmallVec<[(AliasIdx, NodeId); 4]> = aliases
            .iter()
            .copied()
            .zip(self.graph.inputs(id)[1..].iter().copied())
            .collect();
        let mut changed = false;

        if let Op::MergeMem(inner) = self.graph.op(base) {
            for (k, &alias) in inner.iter().enumerate() {
                if !slices.iter().any(|(a, _)| *a == alias) {
                    slices.push((alias, self.graph.input(base, k + 1)));
                }
            }
            base = self.graph.input(base, 0);
            changed = true;
        }
        for (alias, slice) in &mut slices {
            let resolved = resolve(self.graph, *slice, *alias);
            if resolved != *slice {
                *slice = resolved;
                changed = true;
            }
        }
        let before = slices.len();
        slices.retain(|(_, s)| *s != base);
        changed |= slices.len() != before;

        if slices.is_empty() {
            self.note(EventKind::MemoryMergeSimplified, id, || {
                "merge without slices is its base".to_string()
            });
            return Progress::Replaced(base);
        }
        if !changed {
            return Progress::Unchanged;
        }
        slices.sort_unstable_by_key(|(a, _)| *a);
        let aliases = slices.iter().map(|(a, _)| *a).collect();
        let mut inputs: SmallVec<[NodeId; 4]> = SmallVec::new();
        inputs.push(base);
        inputs.extend(slices.iter().map(|(_, s)| *s));
        let merged = self.transform(Op::MergeMem(aliases), &inputs);
        self.note(EventKind::MemoryMergeSimplified, id, || {
            format!("merge rebuilt as {merged}")
        });
        Progress::Replaced(merged)
    }

    /// Folds a narrow phi into the Bottom phi of the same region when both agree
    /// on every path.
    pub(crate) fn ideal_narrow_phi(&mut self, id: NodeId, alias: AliasIdx) -> Progress {
        let region = self.graph.input(id, 0);
        let bottom = Op::Phi(PhiKind::Memory(AliasIdx::BOTTOM));
        let Some(wide) = self
            .graph
            .phis_of(region)
            .into_iter()
            .find(|&p| *self.graph.op(p) == bottom)
        else {
            return Progress::Unchanged;
        };
        let narrow_inputs = &self.graph.inputs(id)[1..];
        let wide_inputs = &self.graph.inputs(wide)[1..];
        if narrow_inputs.len() != wide_inputs.len() {
            return Progress::Unchanged;
        }
        let agrees = narrow_inputs.iter().zip(wide_inputs).all(|(&n, &w)| {
            if n == id {
                w == wide
            } else {
                resolve(self.graph, n, alias) == w
            }
        });
        if !agrees {
            return Progress::Unchanged;
        }
        self.note(EventKind::MemoryPhiMerged, id, || {
            format!("class {alias} phi folded into {wide}")
        });
        Progress::Replaced(wide)
    }
}

/// Runs IGVN restricted to the nodes on memory chains and their users.
pub struct MemoryPass;

impl Default for MemoryPass {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryPass {
    /// Creates the pass.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl GraphPass for MemoryPass {
    fn name(&self) -> &'static str {
        "memory"
    }

    fn should_run(&self, ctx: &crate::compiler::context::CompileContext) -> bool {
        !ctx.graph.aliases().is_empty()
    }

    fn run(&self, ctx: &mut crate::compiler::context::CompileContext) -> crate::Result<bool> {
        let live = ctx.graph.reachable();
        let seeds: Vec<NodeId> = ctx
            .graph
            .ids()
            .filter(|&id| live.contains(id.index()) && ctx.graph.op(id).is_memory())
            .collect();
        let stats = IterGvn::new(&mut ctx.graph, &ctx.config)
            .with_events(&ctx.events, ctx.method)
            .with_pass(self.name())
            .run_from(seeds)?;
        ctx.stats.igvn.accumulate(&stats);
        Ok(stats.changed())
    }

    fn description(&self) -> &'static str {
        "Load forwarding, store elimination and memory phi cleanup"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        compiler::OptConfig,
        ir::{CmpTest, GraphBuilder, GraphQuery, Heap, Interpreter, Location, OpKind, Verifier},
    };

    const F: Location = Location::Field { holder: 1, field: 0 };
    const G: Location = Location::Field { holder: 1, field: 1 };

    fn optimize(graph: &mut Graph) {
        let config = OptConfig::default();
        IterGvn::new(graph, &config).run().unwrap();
        assert!(Verifier::new(graph).violations().is_empty());
    }

    fn returned(graph: &Graph) -> NodeId {
        graph.input(graph.input(graph.root(), 0), 2)
    }

    #[test]
    fn test_load_forwards_stored_value() {
        let mut b = GraphBuilder::new(1);
        let x = b.parm(0);
        let zero = b.con(0);
        b.store(F, zero, x);
        let v = b.load(F, zero);
        b.ret(v);
        let mut graph = b.finish().unwrap();
        optimize(&mut graph);
        assert!(matches!(graph.op(returned(&graph)), Op::Parm(0)));
        assert_eq!(GraphQuery::new(&graph).count(OpKind::Load), 0);
    }

    #[test]
    fn test_load_bypasses_other_class_and_other_cell() {
        let mut b = GraphBuilder::new(1);
        let x = b.parm(0);
        let zero = b.con(0);
        let one = b.con(1);
        b.store(F, zero, x);
        b.store_opaque(G, zero, one);
        b.store_opaque(F, one, one);
        let v = b.load(F, zero);
        b.ret(v);
        let mut graph = b.finish().unwrap();
        optimize(&mut graph);
        assert!(matches!(graph.op(returned(&graph)), Op::Parm(0)));
    }

    #[test]
    fn test_store_over_store() {
        let mut b = GraphBuilder::new(2);
        let x = b.parm(0);
        let y = b.parm(1);
        let zero = b.con(0);
        b.store(F, zero, x);
        b.store(F, zero, y);
        b.ret(zero);
        let mut graph = b.finish().unwrap();
        optimize(&mut graph);

        assert_eq!(GraphQuery::new(&graph).count(OpKind::Store), 1);
        let out = Interpreter::new(&graph).run(&[3, 4]).unwrap();
        assert_eq!(out.memory().get(F, 0), 4);
    }

    #[test]
    fn test_store_read_in_between_is_kept() {
        let mut b = GraphBuilder::new(2);
        let x = b.parm(0);
        let y = b.parm(1);
        let zero = b.con(0);
        b.store(F, zero, x);
        let seen = b.load(F, y);
        b.store(F, zero, y);
        b.ret(seen);
        let mut graph = b.finish().unwrap();
        optimize(&mut graph);

        assert_eq!(GraphQuery::new(&graph).count(OpKind::Store), 2);
        let out = Interpreter::new(&graph).run(&[3, 0]).unwrap();
        assert_eq!(out.value(), Some(3));
    }

    #[test]
    fn test_load_splits_through_bottom_phi() {
        let mut graph = Graph::new(1);
        let start = graph.start();
        let flag = graph.add(Op::Parm(0), &[start]);
        let init = graph.add(Op::InitMem, &[start]);
        let zero = graph.con(0);
        let one = graph.con(1);
        let two = graph.con(2);
        let f = graph.aliases_mut().access(F, false);

        let branch = graph.add(Op::If, &[start, flag]);
        let yes = graph.add(Op::IfTrue, &[branch]);
        let no = graph.add(Op::IfFalse, &[branch]);
        let s1 = graph.add(Op::Store(f), &[yes, init, zero, one]);
        let s2 = graph.add(Op::Store(f), &[no, init, zero, two]);
        let m1 = graph.add(Op::MergeMem([f.alias].into_iter().collect()), &[init, s1]);
        let m2 = graph.add(Op::MergeMem([f.alias].into_iter().collect()), &[init, s2]);
        let region = graph.add(Op::Region, &[yes, no]);
        let wide = graph.add(Op::Phi(PhiKind::Memory(AliasIdx::BOTTOM)), &[region, m1, m2]);
        let load = graph.add(Op::Load(f), &[region, wide, zero]);
        let ret = graph.add(Op::Return, &[region, wide, load]);
        graph.add_sink(ret);

        optimize(&mut graph);
        let narrow = graph.input(load, 1);
        assert_eq!(*graph.op(narrow), Op::Phi(PhiKind::Memory(f.alias)));
        assert_eq!(&graph.inputs(narrow)[1..], &[s1, s2]);
        for (arg, expected) in [(1, 1), (0, 2)] {
            let out = Interpreter::new(&graph).run(&[arg]).unwrap();
            assert_eq!(out.value(), Some(expected));
        }
    }

    #[test]
    fn test_narrow_phi_folds_into_bottom_phi() {
        let mut b = GraphBuilder::new(2);
        let x = b.parm(0);
        let flag = b.parm(1);
        let zero = b.con(0);
        b.store(F, zero, x);
        let c = b.cmp(CmpTest::Ne, flag, zero);
        let mut block = b.if_then(c);
        b.store_opaque(F, zero, flag);
        b.else_branch(&mut block);
        b.store_opaque(F, zero, x);
        b.end_if(block);
        let v = b.load(F, zero);
        b.ret(v);
        let mut graph = b.finish().unwrap();
        let heap = Heap::new();
        let before = Interpreter::new(&graph).with_heap(heap.clone()).run(&[7, 1]).unwrap();
        optimize(&mut graph);

        assert_eq!(GraphQuery::new(&graph).memory_phi_count(), 1);
        let after = Interpreter::new(&graph).with_heap(heap).run(&[7, 1]).unwrap();
        assert_eq!(before.value(), after.value());
    }

    #[test]
    fn test_resolve_walks_merges() {
        let mut graph = Graph::new(0);
        let start = graph.start();
        let mem = graph.add(Op::InitMem, &[start]);
        let f = graph.aliases_mut().classify(F);
        let g = graph.aliases_mut().classify(G);
        let zero = graph.con(0);
        let access = graph.aliases_mut().access(F, false);
        let store = graph.add(Op::Store(access), &[start, mem, zero, zero]);
        let merge = graph.add(Op::MergeMem([f].into_iter().collect()), &[mem, store]);
        assert_eq!(resolve(&graph, merge, f), store);
        assert_eq!(resolve(&graph, merge, g), mem);
        assert_eq!(resolve(&graph, merge, AliasIdx::BOTTOM), merge);
    }
}
