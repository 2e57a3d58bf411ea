//! Typed graph construction.
//!
//! [`GraphBuilder`] plays the role of the bytecode parser: it walks structured
//! control flow (if/else, loops with exits, returns and traps), keeps local
//! variables in [`Var`] slots and tracks the memory state as a Bottom base plus one
//! slice per narrow alias class. At every merge it creates value phis for
//! variables that differ and memory phis per live alias class plus the Bottom phi.
//!
//! # Example
//!
//! ```rust
//! use seaopt::ir::{CmpTest, GraphBuilder};
//!
//! // sum = 0; for (i = 0; i < n; i++) sum += i; return sum;
//! let mut b = GraphBuilder::new(1);
//! let n = b.parm(0);
//! let zero = b.con(0);
//! let one = b.con(1);
//! let sum = b.var(zero);
//! let i = b.var(zero);
//!
//! let mut lp = b.begin_loop();
//! let iv = b.get(i);
//! let test = b.cmp(CmpTest::Lt, iv, n);
//! b.exit_unless(&mut lp, test);
//! let acc = b.get(sum);
//! let next_sum = b.add(acc, iv);
//! b.set(sum, next_sum);
//! let next_i = b.add(iv, one);
//! b.set(i, next_i);
//! b.end_loop(lp)?;
//!
//! let result = b.get(sum);
//! b.ret(result);
//! let graph = b.finish()?;
//! assert_eq!(graph.params(), 1);
//! # Ok::<(), seaopt::Error>(())
//! ```

use std::collections::BTreeMap;

use rustc_hash::FxHashMap;

use crate::{
    ir::{
        alias::{AliasIdx, Location, MemAccess},
        graph::Graph,
        node::{CmpTest, LoopFlags, NodeId, Op, PhiKind, TrapReason},
        types::TypeInt,
        verify::Verifier,
    },
    Result,
};

/// A local variable slot of the builder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Var(usize);

/// Memory state: all memory (`base`) refined by per-class slices.
#[derive(Debug, Clone, PartialEq, Eq)]
struct MemState {
    base: NodeId,
    slices: BTreeMap<AliasIdx, NodeId>,
}

impl MemState {
    fn slice(&self, alias: AliasIdx) -> NodeId {
        self.slices.get(&alias).copied().unwrap_or(self.base)
    }
}

/// Everything that flows along one control path.
#[derive(Debug, Clone)]
struct Snapshot {
    ctrl: NodeId,
    vars: Vec<NodeId>,
    mem: MemState,
}

/// An open `if`, created by [`GraphBuilder::if_then`].
#[derive(Debug)]
pub struct IfBlock {
    branch: NodeId,
    pending: Snapshot,
    then_end: Option<Snapshot>,
    live: Vec<AliasIdx>,
}

impl IfBlock {
    /// The `If` node.
    #[must_use]
    pub fn branch(&self) -> NodeId {
        self.branch
    }
}

/// An open loop, created by [`GraphBuilder::begin_loop`].
#[derive(Debug)]
pub struct LoopBlock {
    header: NodeId,
    var_phis: Vec<NodeId>,
    base_phi: NodeId,
    slice_phis: Vec<(AliasIdx, NodeId)>,
    exits: Vec<Snapshot>,
}

impl LoopBlock {
    /// The `Loop` node.
    #[must_use]
    pub fn header(&self) -> NodeId {
        self.header
    }
}

/// Builds well-formed graphs.
pub struct GraphBuilder {
    graph: Graph,
    ctrl: NodeId,
    vars: Vec<NodeId>,
    mem: MemState,
    cons: FxHashMap<i32, NodeId>,
    parms: FxHashMap<u32, NodeId>,
}

impl GraphBuilder {
    /// Starts a method with `params` integer arguments.
    #[must_use]
    pub fn new(params: u32) -> Self {
        let mut graph = Graph::new(params);
        let start = graph.start();
        let init = graph.add(Op::InitMem, &[start]);
        Self {
            graph,
            ctrl: start,
            vars: Vec::new(),
            mem: MemState {
                base: init,
                slices: BTreeMap::new(),
            },
            cons: FxHashMap::default(),
            parms: FxHashMap::default(),
        }
    }

    /// The graph built so far.
    #[must_use]
    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    /// Current control, or the Top node once the path ended.
    #[must_use]
    pub fn ctrl(&self) -> NodeId {
        self.ctrl
    }

    /// Returns `true` while the current path can still execute.
    #[must_use]
    pub fn is_reachable(&self) -> bool {
        self.ctrl != self.graph.top()
    }

    /// Incoming argument `index`.
    pub fn parm(&mut self, index: u32) -> NodeId {
        if let Some(&parm) = self.parms.get(&index) {
            return parm;
        }
        let parm = self.graph.add(Op::Parm(index), &[self.graph.start()]);
        self.parms.insert(index, parm);
        parm
    }

    /// Integer constant.
    pub fn con(&mut self, value: i32) -> NodeId {
        if let Some(&c) = self.cons.get(&value) {
            return c;
        }
        let c = self.graph.con(value);
        self.cons.insert(value, c);
        c
    }

    fn binary(&mut self, op: Op, a: NodeId, b: NodeId) -> NodeId {
        self.graph.add(op, &[a, b])
    }

    /// `a + b`
    pub fn add(&mut self, a: NodeId, b: NodeId) -> NodeId {
        self.binary(Op::AddI, a, b)
    }

    /// `a - b`
    pub fn sub(&mut self, a: NodeId, b: NodeId) -> NodeId {
        self.binary(Op::SubI, a, b)
    }

    /// `a * b`
    pub fn mul(&mut self, a: NodeId, b: NodeId) -> NodeId {
        self.binary(Op::MulI, a, b)
    }

    /// `a & b`
    pub fn and(&mut self, a: NodeId, b: NodeId) -> NodeId {
        self.binary(Op::AndI, a, b)
    }

    /// `a | b`
    pub fn or(&mut self, a: NodeId, b: NodeId) -> NodeId {
        self.binary(Op::OrI, a, b)
    }

    /// `a ^ b`
    pub fn xor(&mut self, a: NodeId, b: NodeId) -> NodeId {
        self.binary(Op::XorI, a, b)
    }

    /// `a << b`
    pub fn shl(&mut self, a: NodeId, b: NodeId) -> NodeId {
        self.binary(Op::LShiftI, a, b)
    }

    /// `a >> b` (arithmetic)
    pub fn rshift(&mut self, a: NodeId, b: NodeId) -> NodeId {
        self.binary(Op::RShiftI, a, b)
    }

    /// `a >>> b` (logical)
    pub fn urshift(&mut self, a: NodeId, b: NodeId) -> NodeId {
        self.binary(Op::URShiftI, a, b)
    }

    /// `min(a, b)`
    pub fn min(&mut self, a: NodeId, b: NodeId) -> NodeId {
        self.binary(Op::MinI, a, b)
    }

    /// `max(a, b)`
    pub fn max(&mut self, a: NodeId, b: NodeId) -> NodeId {
        self.binary(Op::MaxI, a, b)
    }

    /// Signed comparison producing `0` or `1`.
    pub fn cmp(&mut self, test: CmpTest, a: NodeId, b: NodeId) -> NodeId {
        self.binary(Op::CmpI(test), a, b)
    }

    /// Unsigned comparison producing `0` or `1`.
    pub fn cmpu(&mut self, test: CmpTest, a: NodeId, b: NodeId) -> NodeId {
        self.binary(Op::CmpU(test), a, b)
    }

    /// Narrows `value` to `range`, pinned at the current control.
    pub fn cast(&mut self, range: TypeInt, value: NodeId) -> NodeId {
        self.graph.add(Op::CastII(range), &[self.ctrl, value])
    }

    /// Declares a variable holding `init`.
    pub fn var(&mut self, init: NodeId) -> Var {
        self.vars.push(init);
        Var(self.vars.len() - 1)
    }

    /// Current value of a variable.
    #[must_use]
    pub fn get(&self, var: Var) -> NodeId {
        self.vars[var.0]
    }

    /// Assigns a variable.
    pub fn set(&mut self, var: Var, value: NodeId) {
        self.vars[var.0] = value;
    }

    fn merge_mem(&mut self, base: NodeId, slices: &BTreeMap<AliasIdx, NodeId>) -> NodeId {
        let live: Vec<(AliasIdx, NodeId)> = slices
            .iter()
            .filter(|(_, &s)| s != base)
            .map(|(&a, &s)| (a, s))
            .collect();
        if live.is_empty() {
            return base;
        }
        let mut inputs = vec![base];
        inputs.extend(live.iter().map(|(_, s)| *s));
        let aliases = live.iter().map(|(a, _)| *a).collect();
        self.graph.add(Op::MergeMem(aliases), &inputs)
    }

    /// The complete memory state at this point, as one node.
    pub fn full_memory(&mut self) -> NodeId {
        let slices = self.mem.slices.clone();
        self.merge_mem(self.mem.base, &slices)
    }

    fn memory_for(&mut self, access: MemAccess) -> NodeId {
        if access.alias.is_bottom() {
            self.full_memory()
        } else {
            self.mem.slice(access.alias)
        }
    }

    fn access_load(&mut self, access: MemAccess, index: NodeId) -> NodeId {
        let mem = self.memory_for(access);
        self.graph.add(Op::Load(access), &[self.ctrl, mem, index])
    }

    fn access_store(&mut self, access: MemAccess, index: NodeId, value: NodeId) -> NodeId {
        let mem = self.memory_for(access);
        let store = self
            .graph
            .add(Op::Store(access), &[self.ctrl, mem, index, value]);
        if access.alias.is_bottom() {
            self.mem.base = store;
            self.mem.slices.clear();
        } else {
            self.mem.slices.insert(access.alias, store);
        }
        store
    }

    /// Loads `location[index]` through its narrow alias class.
    pub fn load(&mut self, location: Location, index: NodeId) -> NodeId {
        let access = self.graph.aliases_mut().access(location, false);
        self.access_load(access, index)
    }

    /// Loads `location[index]` with an unknown address type (Bottom class).
    pub fn load_opaque(&mut self, location: Location, index: NodeId) -> NodeId {
        let access = self.graph.aliases_mut().access(location, true);
        self.access_load(access, index)
    }

    /// Stores `value` to `location[index]` through its narrow alias class.
    pub fn store(&mut self, location: Location, index: NodeId, value: NodeId) -> NodeId {
        let access = self.graph.aliases_mut().access(location, false);
        self.access_store(access, index, value)
    }

    /// Stores `value` to `location[index]` with an unknown address type.
    ///
    /// Opaque stores consume and produce all of memory, so every slice is reset.
    pub fn store_opaque(&mut self, location: Location, index: NodeId, value: NodeId) -> NodeId {
        let access = self.graph.aliases_mut().access(location, true);
        self.access_store(access, index, value)
    }

    fn snapshot(&self) -> Snapshot {
        Snapshot {
            ctrl: self.ctrl,
            vars: self.vars.clone(),
            mem: self.mem.clone(),
        }
    }

    fn restore(&mut self, snap: Snapshot) {
        self.ctrl = snap.ctrl;
        self.vars = snap.vars;
        self.mem = snap.mem;
    }

    fn end_path(&mut self) {
        self.ctrl = self.graph.top();
    }

    /// Opens `if (cond != 0)`; the builder continues on the taken side.
    pub fn if_then(&mut self, cond: NodeId) -> IfBlock {
        let branch = self.graph.add(Op::If, &[self.ctrl, cond]);
        let taken = self.graph.add(Op::IfTrue, &[branch]);
        let not_taken = self.graph.add(Op::IfFalse, &[branch]);
        let live = self.mem.slices.keys().copied().collect();
        let mut pending = self.snapshot();
        pending.ctrl = not_taken;
        self.ctrl = taken;
        IfBlock {
            branch,
            pending,
            then_end: None,
            live,
        }
    }

    /// Switches to the not-taken side of an open `if`.
    pub fn else_branch(&mut self, block: &mut IfBlock) {
        let then_end = self.snapshot();
        let pending = std::mem::replace(&mut block.pending, then_end.clone());
        block.then_end = Some(then_end);
        self.restore(pending);
    }

    /// Closes an `if`, merging both sides.
    pub fn end_if(&mut self, block: IfBlock) {
        let current = self.snapshot();
        let (first, second) = match block.then_end {
            Some(then_end) => (then_end, current),
            None => (current, block.pending),
        };
        self.merge(vec![first, second], &block.live);
    }

    /// Merges control paths, creating a region and phis when more than one
    /// path is still reachable.
    fn merge(&mut self, paths: Vec<Snapshot>, live: &[AliasIdx]) {
        let top = self.graph.top();
        let mut paths: Vec<Snapshot> = paths.into_iter().filter(|p| p.ctrl != top).collect();
        match paths.len() {
            0 => {
                self.end_path();
                return;
            }
            1 => {
                if let Some(only) = paths.pop() {
                    self.restore(only);
                }
                return;
            }
            _ => {}
        }

        let ctrls: Vec<NodeId> = paths.iter().map(|p| p.ctrl).collect();
        let region = self.graph.add(Op::Region, &ctrls);

        let nvars = paths.iter().map(|p| p.vars.len()).min().unwrap_or(0);
        let mut vars = Vec::with_capacity(nvars);
        for v in 0..nvars {
            let values: Vec<NodeId> = paths.iter().map(|p| p.vars[v]).collect();
            vars.push(self.phi_if_needed(region, PhiKind::Value, &values));
        }

        let mut classes: Vec<AliasIdx> = live.to_vec();
        for path in &paths {
            classes.extend(path.mem.slices.keys().copied());
        }
        classes.sort_unstable();
        classes.dedup();

        let mut slices = BTreeMap::new();
        for alias in classes {
            let values: Vec<NodeId> = paths.iter().map(|p| p.mem.slice(alias)).collect();
            let phi = self.phi_if_needed(region, PhiKind::Memory(alias), &values);
            slices.insert(alias, phi);
        }
        let bases: Vec<NodeId> = paths.iter().map(|p| p.mem.base).collect();
        let base = self.phi_if_needed(region, PhiKind::Memory(AliasIdx::BOTTOM), &bases);

        self.ctrl = region;
        self.vars = vars;
        self.mem = MemState { base, slices };
    }

    fn phi_if_needed(&mut self, region: NodeId, kind: PhiKind, values: &[NodeId]) -> NodeId {
        if values.iter().all(|&v| v == values[0]) {
            return values[0];
        }
        let mut inputs = vec![region];
        inputs.extend_from_slice(values);
        self.graph.add(Op::Phi(kind), &inputs)
    }

    /// Opens a loop. Every existing variable and live memory slice gets a header phi.
    pub fn begin_loop(&mut self) -> LoopBlock {
        let top = self.graph.top();
        let header = self
            .graph
            .add(Op::Loop(LoopFlags::empty()), &[self.ctrl, top]);

        let mut var_phis = Vec::with_capacity(self.vars.len());
        for v in 0..self.vars.len() {
            let phi = self
                .graph
                .add(Op::Phi(PhiKind::Value), &[header, self.vars[v], top]);
            self.vars[v] = phi;
            var_phis.push(phi);
        }

        let base_phi = self.graph.add(
            Op::Phi(PhiKind::Memory(AliasIdx::BOTTOM)),
            &[header, self.mem.base, top],
        );
        let mut slice_phis = Vec::new();
        let entry_slices: Vec<(AliasIdx, NodeId)> =
            self.mem.slices.iter().map(|(&a, &s)| (a, s)).collect();
        for (alias, slice) in entry_slices {
            let phi = self
                .graph
                .add(Op::Phi(PhiKind::Memory(alias)), &[header, slice, top]);
            self.mem.slices.insert(alias, phi);
            slice_phis.push((alias, phi));
        }
        self.mem.base = base_phi;
        self.ctrl = header;

        LoopBlock {
            header,
            var_phis,
            base_phi,
            slice_phis,
            exits: Vec::new(),
        }
    }

    /// Leaves the loop unless `cond != 0`; the builder continues inside the loop.
    pub fn exit_unless(&mut self, block: &mut LoopBlock, cond: NodeId) {
        let branch = self.graph.add(Op::If, &[self.ctrl, cond]);
        let stay = self.graph.add(Op::IfTrue, &[branch]);
        let leave = self.graph.add(Op::IfFalse, &[branch]);
        let mut exit = self.snapshot();
        exit.ctrl = leave;
        block.exits.push(exit);
        self.ctrl = stay;
    }

    /// Leaves the loop when `cond != 0`; the builder continues inside the loop.
    pub fn exit_when(&mut self, block: &mut LoopBlock, cond: NodeId) {
        let branch = self.graph.add(Op::If, &[self.ctrl, cond]);
        let leave = self.graph.add(Op::IfTrue, &[branch]);
        let stay = self.graph.add(Op::IfFalse, &[branch]);
        let mut exit = self.snapshot();
        exit.ctrl = leave;
        block.exits.push(exit);
        self.ctrl = stay;
    }

    /// Closes a loop: wires the backedge and phis, then continues after the exits.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Malformed`] if the loop has no exit.
    pub fn end_loop(&mut self, block: LoopBlock) -> Result<()> {
        let header = block.header;
        if block.exits.is_empty() {
            return Err(malformed_error!("loop {} has no exit", header));
        }

        let top = self.graph.top();
        let reachable = self.ctrl != top;
        self.graph.set_input(header, 1, self.ctrl);

        for (v, &phi) in block.var_phis.iter().enumerate() {
            let back = if reachable { self.vars[v] } else { top };
            self.graph.set_input(phi, 2, back);
        }
        let mut phi_classes = Vec::with_capacity(block.slice_phis.len());
        for &(alias, phi) in &block.slice_phis {
            let back = if reachable { self.mem.slice(alias) } else { top };
            self.graph.set_input(phi, 2, back);
            phi_classes.push(alias);
        }
        let back_base = if reachable {
            let base = self.mem.base;
            let extra: BTreeMap<AliasIdx, NodeId> = self
                .mem
                .slices
                .iter()
                .filter(|(a, _)| !phi_classes.contains(a))
                .map(|(&a, &s)| (a, s))
                .collect();
            self.merge_mem(base, &extra)
        } else {
            top
        };
        self.graph.set_input(block.base_phi, 2, back_base);

        // Phis whose value never changes around the loop are not phis at all.
        let mut phis = block.var_phis.clone();
        phis.extend(block.slice_phis.iter().map(|(_, p)| *p));
        phis.push(block.base_phi);
        let mut exits = block.exits;
        for phi in phis {
            if self.graph.input(phi, 2) == phi {
                let entry = self.graph.input(phi, 1);
                self.graph.replace_uses_except(phi, entry, phi);
                for exit in &mut exits {
                    exit.vars.iter_mut().filter(|v| **v == phi).for_each(|v| *v = entry);
                    if exit.mem.base == phi {
                        exit.mem.base = entry;
                    }
                    exit.mem
                        .slices
                        .values_mut()
                        .filter(|s| **s == phi)
                        .for_each(|s| *s = entry);
                }
                self.graph.set_input(phi, 2, top);
                self.graph.set_input(phi, 1, top);
            }
        }

        self.merge(exits, &[]);
        Ok(())
    }

    /// Bounds check: continues when `0 <= index < length` (unsigned compare),
    /// otherwise traps with [`TrapReason::RangeCheck`].
    pub fn range_check(&mut self, index: NodeId, length: NodeId) -> NodeId {
        let cond = self.cmpu(CmpTest::Lt, index, length);
        let check = self.graph.add(Op::RangeCheck, &[self.ctrl, cond]);
        let ok = self.graph.add(Op::IfTrue, &[check]);
        let fail = self.graph.add(Op::IfFalse, &[check]);
        let mem = self.full_memory();
        let trap = self
            .graph
            .add(Op::Trap(TrapReason::RangeCheck), &[fail, mem]);
        self.graph.add_sink(trap);
        self.ctrl = ok;
        check
    }

    /// Continues when `cond != 0`, otherwise traps with `reason`.
    pub fn guard(&mut self, cond: NodeId, reason: TrapReason) -> NodeId {
        let branch = self.graph.add(Op::If, &[self.ctrl, cond]);
        let ok = self.graph.add(Op::IfTrue, &[branch]);
        let fail = self.graph.add(Op::IfFalse, &[branch]);
        let mem = self.full_memory();
        let trap = self.graph.add(Op::Trap(reason), &[fail, mem]);
        self.graph.add_sink(trap);
        self.ctrl = ok;
        branch
    }

    /// Ends the current path with a trap.
    pub fn trap(&mut self, reason: TrapReason) -> NodeId {
        let mem = self.full_memory();
        let trap = self.graph.add(Op::Trap(reason), &[self.ctrl, mem]);
        self.graph.add_sink(trap);
        self.end_path();
        trap
    }

    /// Ends the current path by returning `value`.
    pub fn ret(&mut self, value: NodeId) -> NodeId {
        let mem = self.full_memory();
        let ret = self.graph.add(Op::Return, &[self.ctrl, mem, value]);
        self.graph.add_sink(ret);
        self.end_path();
        ret
    }

    /// Finishes construction: drops unreachable nodes and verifies the graph.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Malformed`] if control can fall off the end or the
    /// method has no exit, and [`crate::Error::Verification`] if the graph breaks a
    /// structural invariant.
    pub fn finish(mut self) -> Result<Graph> {
        if self.is_reachable() {
            return Err(malformed_error!(
                "control reaches the end of the method at {} without a return",
                self.ctrl
            ));
        }
        if self.graph.inputs(self.graph.root()).is_empty() {
            return Err(malformed_error!("method has no return or trap"));
        }
        self.graph.sweep();
        Verifier::new(&self.graph).verify()?;
        Ok(self.graph)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ir::OpKind, Error};

    #[test]
    fn test_straight_line() {
        let mut b = GraphBuilder::new(2);
        let x = b.parm(0);
        let y = b.parm(1);
        assert_eq!(b.parm(0), x);
        let sum = b.add(x, y);
        b.ret(sum);
        let graph = b.finish().unwrap();

        let ret = graph.input(graph.root(), 0);
        assert_eq!(graph.op(ret), &Op::Return);
        assert_eq!(graph.input(ret, 2), sum);
        assert_eq!(graph.op(graph.input(ret, 1)), &Op::InitMem);
    }

    #[test]
    fn test_if_merge_creates_phi() {
        let mut b = GraphBuilder::new(1);
        let x = b.parm(0);
        let zero = b.con(0);
        let one = b.con(1);
        let v = b.var(zero);
        let cond = b.cmp(CmpTest::Gt, x, zero);
        let mut blk = b.if_then(cond);
        b.set(v, one);
        b.else_branch(&mut blk);
        b.end_if(blk);
        let merged = b.get(v);
        b.ret(merged);
        let graph = b.finish().unwrap();

        assert_eq!(graph.op(merged), &Op::Phi(PhiKind::Value));
        assert_eq!(graph.op(graph.input(merged, 0)), &Op::Region);
        assert_eq!(&graph.inputs(merged)[1..], &[one, zero]);
    }

    #[test]
    fn test_loop_drops_invariant_phis() {
        let mut b = GraphBuilder::new(1);
        let n = b.parm(0);
        let zero = b.con(0);
        let one = b.con(1);
        let i = b.var(zero);
        let fixed = b.var(n);

        let mut lp = b.begin_loop();
        let iv = b.get(i);
        let test = b.cmp(CmpTest::Lt, iv, n);
        b.exit_unless(&mut lp, test);
        let next = b.add(iv, one);
        b.set(i, next);
        b.end_loop(lp).unwrap();

        let out = b.get(fixed);
        b.ret(out);
        let graph = b.finish().unwrap();

        assert_eq!(out, n);
        let phis = graph
            .ids()
            .filter(|&id| graph.op(id).kind() == OpKind::Phi)
            .count();
        // The induction variable only; the invariant variable and the untouched
        // memory lose their phis.
        assert_eq!(phis, 1);
    }

    #[test]
    fn test_narrow_and_opaque_memory() {
        let mut b = GraphBuilder::new(1);
        let x = b.parm(0);
        let zero = b.con(0);
        let field = Location::Field { holder: 1, field: 0 };
        let arr = Location::Array(1);

        let s1 = b.store(field, zero, x);
        let s2 = b.store(arr, zero, x);
        let loaded = b.load(field, zero);
        assert_eq!(b.graph().input(loaded, 1), s1);

        let opaque = b.store_opaque(arr, x, zero);
        let merge = b.graph().input(opaque, 1);
        assert_eq!(b.graph().op(merge).kind(), OpKind::MergeMem);
        assert_eq!(&b.graph().inputs(merge)[1..], &[s1, s2]);

        // The opaque store reset every slice.
        let after = b.load(field, zero);
        assert_eq!(b.graph().input(after, 1), opaque);
        b.ret(after);
        assert!(b.finish().is_ok());
    }

    #[test]
    fn test_malformed_inputs() {
        let b = GraphBuilder::new(0);
        assert!(matches!(b.finish(), Err(Error::Malformed { .. })));

        let mut b = GraphBuilder::new(0);
        let lp = b.begin_loop();
        assert!(matches!(b.end_loop(lp), Err(Error::Malformed { .. })));
    }

    #[test]
    fn test_range_check_adds_trap_sink() {
        let mut b = GraphBuilder::new(2);
        let i = b.parm(0);
        let len = b.parm(1);
        let check = b.range_check(i, len);
        b.ret(i);
        let graph = b.finish().unwrap();

        assert_eq!(graph.op(check), &Op::RangeCheck);
        let sinks: Vec<OpKind> = graph
            .inputs(graph.root())
            .iter()
            .map(|&s| graph.op(s).kind())
            .collect();
        assert_eq!(sinks, vec![OpKind::Trap, OpKind::Return]);
    }
}
