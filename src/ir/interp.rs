//! Reference interpreter.
//!
//! Executes a graph on integer arguments and an initial [`Heap`], producing the
//! observable [`Outcome`]: the returned value or the trap reason, plus the final
//! heap. Optimizations must never change the outcome, which makes the interpreter
//! the oracle of the equivalence tests.
//!
//! Control is followed edge by edge from `Start`. Data nodes are pure functions of
//! the current phi values, so they are evaluated on demand and memoized until the
//! next merge point updates its phis. All phis of a merge update simultaneously
//! from the values flowing along the entered predecessor.

use std::{collections::BTreeMap, fmt, rc::Rc};

use rustc_hash::FxHashMap;

use crate::{
    ir::{
        alias::{AliasIdx, Location},
        graph::Graph,
        node::{NodeId, Op, TrapReason},
    },
    utils::BitSet,
    Error, Result,
};

/// A heap: integer cells addressed by location and index. Missing cells read `0`.
///
/// Writing `0` removes the cell, so two heaps compare equal exactly when every
/// cell reads the same.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Heap {
    cells: BTreeMap<(Location, i32), i32>,
}

impl Heap {
    /// Creates an empty heap.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Reads a cell.
    #[must_use]
    pub fn get(&self, location: Location, index: i32) -> i32 {
        self.cells.get(&(location, index)).copied().unwrap_or(0)
    }

    /// Writes a cell.
    pub fn set(&mut self, location: Location, index: i32, value: i32) {
        if value == 0 {
            self.cells.remove(&(location, index));
        } else {
            self.cells.insert((location, index), value);
        }
    }

    /// Number of non-zero cells.
    #[must_use]
    pub fn len(&self) -> usize {
        self.cells.len()
    }

    /// Returns `true` if every cell reads `0`.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Non-zero cells in location order.
    pub fn iter(&self) -> impl Iterator<Item = (Location, i32, i32)> + '_ {
        self.cells.iter().map(|(&(loc, idx), &v)| (loc, idx, v))
    }
}

impl fmt::Display for Heap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        for (i, (loc, idx, value)) in self.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{loc}[{idx}]={value}")?;
        }
        write!(f, "}}")
    }
}

/// How an execution ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// The method returned normally.
    Returned {
        /// The returned value
        value: i32,
        /// The heap on exit
        memory: Heap,
    },
    /// Execution left through a trap.
    Trapped {
        /// Why the trap was taken
        reason: TrapReason,
        /// The heap at the trap
        memory: Heap,
    },
}

impl Outcome {
    /// The returned value, if the method returned.
    #[must_use]
    pub fn value(&self) -> Option<i32> {
        match self {
            Self::Returned { value, .. } => Some(*value),
            Self::Trapped { .. } => None,
        }
    }

    /// The heap on exit.
    #[must_use]
    pub fn memory(&self) -> &Heap {
        match self {
            Self::Returned { memory, .. } | Self::Trapped { memory, .. } => memory,
        }
    }

    /// Returns `true` if execution ended in a trap.
    #[must_use]
    pub fn is_trap(&self) -> bool {
        matches!(self, Self::Trapped { .. })
    }
}

#[derive(Debug, Clone)]
enum Value {
    Int(i32),
    Mem(Rc<Heap>),
}

/// Default number of control steps before execution is abandoned.
pub const DEFAULT_STEP_LIMIT: usize = 1_000_000;

/// Executes graphs.
///
/// # Examples
///
/// ```rust
/// use seaopt::ir::{GraphBuilder, Interpreter};
///
/// let mut b = GraphBuilder::new(2);
/// let (x, y) = (b.parm(0), b.parm(1));
/// let product = b.mul(x, y);
/// b.ret(product);
/// let graph = b.finish()?;
///
/// let outcome = Interpreter::new(&graph).run(&[6, 7])?;
/// assert_eq!(outcome.value(), Some(42));
/// # Ok::<(), seaopt::Error>(())
/// ```
pub struct Interpreter<'g> {
    graph: &'g Graph,
    heap: Heap,
    step_limit: usize,
}

impl<'g> Interpreter<'g> {
    /// Creates an interpreter with an empty initial heap.
    #[must_use]
    pub fn new(graph: &'g Graph) -> Self {
        Self {
            graph,
            heap: Heap::new(),
            step_limit: DEFAULT_STEP_LIMIT,
        }
    }

    /// Sets the initial heap.
    #[must_use]
    pub fn with_heap(mut self, heap: Heap) -> Self {
        self.heap = heap;
        self
    }

    /// Sets the control step budget.
    #[must_use]
    pub fn with_step_limit(mut self, limit: usize) -> Self {
        self.step_limit = limit;
        self
    }

    /// Runs the method.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ExecutionLimit`] when the step budget runs out,
    /// [`Error::Malformed`] when an argument is missing or control is ambiguous, and
    /// [`Error::Invariant`] when a dead or unset value is read.
    pub fn run(&self, args: &[i32]) -> Result<Outcome> {
        let mut frame = Frame {
            graph: self.graph,
            args,
            init: Rc::new(self.heap.clone()),
            live: self.graph.reachable(),
            phis: FxHashMap::default(),
            memo: FxHashMap::default(),
        };

        let mut prev = self.graph.start();
        let mut ctrl = frame.next(prev)?;
        let mut steps = 0usize;

        loop {
            steps += 1;
            if steps > self.step_limit {
                return Err(Error::ExecutionLimit(self.step_limit));
            }

            let next = match self.graph.op(ctrl) {
                Op::Region | Op::Loop(_) => {
                    frame.enter(ctrl, prev)?;
                    frame.next(ctrl)?
                }
                Op::If | Op::RangeCheck => {
                    let taken = frame.int(self.graph.input(ctrl, 1))? != 0;
                    self.graph.proj(ctrl, taken).ok_or_else(|| {
                        malformed_error!("branch {} has no projection for {}", ctrl, taken)
                    })?
                }
                Op::IfTrue | Op::IfFalse => frame.next(ctrl)?,
                Op::Return => {
                    let memory = frame.mem(self.graph.input(ctrl, 1))?;
                    let value = frame.int(self.graph.input(ctrl, 2))?;
                    return Ok(Outcome::Returned {
                        value,
                        memory: (*memory).clone(),
                    });
                }
                Op::Trap(reason) => {
                    let memory = frame.mem(self.graph.input(ctrl, 1))?;
                    return Ok(Outcome::Trapped {
                        reason: *reason,
                        memory: (*memory).clone(),
                    });
                }
                op => {
                    return Err(malformed_error!("control reached non-control node {} ({})", ctrl, op));
                }
            };
            prev = ctrl;
            ctrl = next;
        }
    }
}

struct Frame<'a> {
    graph: &'a Graph,
    args: &'a [i32],
    init: Rc<Heap>,
    live: BitSet,
    phis: FxHashMap<NodeId, Value>,
    memo: FxHashMap<NodeId, Value>,
}

impl Frame<'_> {
    fn next(&self, ctrl: NodeId) -> Result<NodeId> {
        let succs: Vec<NodeId> = self
            .graph
            .control_successors(ctrl)
            .into_iter()
            .filter(|s| self.live.contains(s.index()))
            .collect();
        match succs.as_slice() {
            [only] => Ok(*only),
            [] => Err(malformed_error!("control ends at {}", ctrl)),
            _ => Err(malformed_error!("control forks at {} into {:?}", ctrl, succs)),
        }
    }

    /// Takes the edge `pred -> region`, updating all phis of the region at once.
    fn enter(&mut self, region: NodeId, pred: NodeId) -> Result<()> {
        let k = self
            .graph
            .pred_index(region, pred)
            .ok_or_else(|| invariant_error!("{} is not a predecessor of {}", pred, region))?;

        let phis = self.graph.phis_of(region);
        let mut values = Vec::with_capacity(phis.len());
        for &phi in &phis {
            values.push(self.eval(self.graph.input(phi, k + 1))?);
        }
        for (phi, value) in phis.into_iter().zip(values) {
            self.phis.insert(phi, value);
        }
        self.memo.clear();
        Ok(())
    }

    fn int(&mut self, id: NodeId) -> Result<i32> {
        match self.eval(id)? {
            Value::Int(v) => Ok(v),
            Value::Mem(_) => Err(invariant_error!("{} produced memory, expected an integer", id)),
        }
    }

    fn mem(&mut self, id: NodeId) -> Result<Rc<Heap>> {
        match self.eval(id)? {
            Value::Mem(h) => Ok(h),
            Value::Int(_) => Err(invariant_error!("{} produced an integer, expected memory", id)),
        }
    }

    fn eval(&mut self, id: NodeId) -> Result<Value> {
        if let Some(v) = self.memo.get(&id) {
            return Ok(v.clone());
        }
        if self.graph.is_dead(id) {
            return Err(invariant_error!("read of removed node {}", id));
        }

        let graph = self.graph;
        let inputs = graph.inputs(id);
        let value = match graph.op(id) {
            Op::ConI(c) => Value::Int(*c),
            Op::Parm(i) => {
                let arg = self
                    .args
                    .get(*i as usize)
                    .copied()
                    .ok_or_else(|| malformed_error!("missing argument {}", i))?;
                Value::Int(arg)
            }
            Op::InitMem => Value::Mem(self.init.clone()),
            Op::Phi(_) => {
                return self
                    .phis
                    .get(&id)
                    .cloned()
                    .ok_or_else(|| invariant_error!("phi {} read before its region ran", id));
            }
            Op::CastII(_) => Value::Int(self.int(inputs[1])?),
            Op::CmpI(test) => {
                let (a, b) = (self.int(inputs[0])?, self.int(inputs[1])?);
                Value::Int(i32::from(test.eval_signed(a, b)))
            }
            Op::CmpU(test) => {
                let (a, b) = (self.int(inputs[0])?, self.int(inputs[1])?);
                Value::Int(i32::from(test.eval_unsigned(a, b)))
            }
            Op::Load(access) => {
                let heap = self.mem(inputs[1])?;
                let index = self.int(inputs[2])?;
                Value::Int(heap.get(access.location, index))
            }
            Op::Store(access) => {
                let heap = self.mem(inputs[1])?;
                let index = self.int(inputs[2])?;
                let value = self.int(inputs[3])?;
                let mut next = (*heap).clone();
                next.set(access.location, index, value);
                Value::Mem(Rc::new(next))
            }
            Op::MergeMem(aliases) => {
                let base = self.mem(inputs[0])?;
                let mut merged = (*base).clone();
                for (k, alias) in aliases.iter().enumerate() {
                    let slice = self.mem(inputs[k + 1])?;
                    self.overlay(&mut merged, &slice, *alias);
                }
                Value::Mem(Rc::new(merged))
            }
            op if op.is_int_binary() => {
                let (a, b) = (self.int(inputs[0])?, self.int(inputs[1])?);
                Value::Int(eval_binary(op, a, b))
            }
            op => return Err(invariant_error!("{} ({}) has no value", id, op)),
        };

        self.memo.insert(id, value.clone());
        Ok(value)
    }

    /// Replaces the cells of class `alias` in `target` with those of `slice`.
    fn overlay(&self, target: &mut Heap, slice: &Heap, alias: AliasIdx) {
        let aliases = self.graph.aliases();
        target
            .cells
            .retain(|(loc, _), _| aliases.class_of(*loc) != alias);
        for (loc, idx, value) in slice.iter() {
            if aliases.class_of(loc) == alias {
                target.set(loc, idx, value);
            }
        }
    }
}

/// Two's complement semantics of the binary integer operations.
#[must_use]
#[allow(clippy::cast_sign_loss, clippy::cast_possible_wrap)]
pub fn eval_binary(op: &Op, a: i32, b: i32) -> i32 {
    match op {
        Op::AddI => a.wrapping_add(b),
        Op::SubI => a.wrapping_sub(b),
        Op::MulI => a.wrapping_mul(b),
        Op::AndI => a & b,
        Op::OrI => a | b,
        Op::XorI => a ^ b,
        Op::LShiftI => a.wrapping_shl((b & 31) as u32),
        Op::RShiftI => a >> (b & 31),
        Op::URShiftI => ((a as u32) >> (b & 31)) as i32,
        Op::MinI => a.min(b),
        Op::MaxI => a.max(b),
        _ => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{CmpTest, GraphBuilder};

    #[test]
    fn test_binary_semantics() {
        assert_eq!(eval_binary(&Op::AddI, i32::MAX, 1), i32::MIN);
        assert_eq!(eval_binary(&Op::LShiftI, 1, 33), 2);
        assert_eq!(eval_binary(&Op::RShiftI, -16, 2), -4);
        assert_eq!(eval_binary(&Op::URShiftI, -1, 28), 0xF);
        assert_eq!(eval_binary(&Op::MinI, -3, 2), -3);
    }

    #[test]
    fn test_heap_is_canonical() {
        let mut a = Heap::new();
        a.set(Location::Array(1), 3, 9);
        a.set(Location::Array(1), 3, 0);
        assert_eq!(a, Heap::new());
        assert_eq!(a.get(Location::Array(1), 3), 0);
    }

    #[test]
    fn test_loop_sum() {
        let mut b = GraphBuilder::new(1);
        let n = b.parm(0);
        let zero = b.con(0);
        let one = b.con(1);
        let sum = b.var(zero);
        let i = b.var(zero);
        let mut lp = b.begin_loop();
        let iv = b.get(i);
        let test = b.cmp(CmpTest::Lt, iv, n);
        b.exit_unless(&mut lp, test);
        let acc = b.get(sum);
        let s = b.add(acc, iv);
        b.set(sum, s);
        let next = b.add(iv, one);
        b.set(i, next);
        b.end_loop(lp).unwrap();
        let out = b.get(sum);
        b.ret(out);
        let graph = b.finish().unwrap();

        let interp = Interpreter::new(&graph);
        assert_eq!(interp.run(&[0]).unwrap().value(), Some(0));
        assert_eq!(interp.run(&[10]).unwrap().value(), Some(45));
        assert!(matches!(interp.run(&[]), Err(Error::Malformed { .. })));
        assert!(matches!(
            Interpreter::new(&graph).with_step_limit(20).run(&[1000]),
            Err(Error::ExecutionLimit(20))
        ));
    }

    #[test]
    fn test_memory_and_traps() {
        let arr = Location::Array(1);
        let mut b = GraphBuilder::new(2);
        let i = b.parm(0);
        let v = b.parm(1);
        let len = b.con(4);
        b.range_check(i, len);
        b.store(arr, i, v);
        let back = b.load(arr, i);
        b.ret(back);
        let graph = b.finish().unwrap();

        let mut heap = Heap::new();
        heap.set(arr, 0, 5);
        let interp = Interpreter::new(&graph).with_heap(heap.clone());

        let ok = interp.run(&[2, 11]).unwrap();
        assert_eq!(ok.value(), Some(11));
        assert_eq!(ok.memory().get(arr, 2), 11);
        assert_eq!(ok.memory().get(arr, 0), 5);

        let trapped = interp.run(&[-1, 11]).unwrap();
        assert!(trapped.is_trap());
        assert_eq!(trapped.memory(), &heap);
    }

    #[test]
    fn test_merge_mem_overlays_class() {
        let field = Location::Field { holder: 1, field: 0 };
        let arr = Location::Array(2);
        let mut b = GraphBuilder::new(1);
        let x = b.parm(0);
        let zero = b.con(0);
        b.store(field, zero, x);
        b.store_opaque(arr, zero, x);
        let f = b.load(field, zero);
        let a = b.load(arr, zero);
        let sum = b.add(f, a);
        b.ret(sum);
        let graph = b.finish().unwrap();

        let outcome = Interpreter::new(&graph).run(&[3]).unwrap();
        assert_eq!(outcome.value(), Some(6));
        assert_eq!(outcome.memory().len(), 2);
    }
}
