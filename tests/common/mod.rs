//! Shared helpers for the integration tests.
//!
//! Random methods are described as a flat list of [`Step`]s and built with the
//! public [`GraphBuilder`]. Block steps (`If`, `Else`, `EndIf`, `Loop`,
//! `EndLoop`) that do not fit the open structure are skipped, and anything still
//! open at the end is closed, so every step list yields a valid method.

#![allow(dead_code)]

use proptest::prelude::*;
use seaopt::{
    compiler::{CompileContext, MethodId, OptConfig, PassScheduler},
    ir::{CmpTest, Graph, GraphBuilder, IfBlock, Interpreter, Location, LoopBlock, NodeId, Outcome, Var},
    Result,
};

/// Number of local variables a generated method works on.
pub const VARS: usize = 4;

/// Locations generated methods read and write.
pub const LOCATIONS: [Location; 4] = [
    Location::Field { holder: 1, field: 0 },
    Location::Field { holder: 1, field: 1 },
    Location::Array(1),
    Location::Array(2),
];

const TESTS: [CmpTest; 6] = [
    CmpTest::Eq,
    CmpTest::Ne,
    CmpTest::Lt,
    CmpTest::Le,
    CmpTest::Gt,
    CmpTest::Ge,
];

/// A two-operand integer operation.
#[derive(Debug, Clone, Copy)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    And,
    Or,
    Xor,
    Shl,
    Shr,
    Ushr,
    Min,
    Max,
    Cmp(CmpTest),
    CmpU(CmpTest),
}

/// Trip bound of a generated loop.
#[derive(Debug, Clone, Copy)]
pub enum Bound {
    /// A constant limit.
    Const(i32),
    /// `var & 7`
    Masked(usize),
}

/// One step of a generated method. Variable operands index `0..VARS`.
#[derive(Debug, Clone)]
pub enum Step {
    Binary(BinOp, usize, usize, usize),
    Const(usize, i32),
    Store(usize, usize, usize),
    StoreOpaque(usize, usize, usize),
    Load(usize, usize, usize),
    Check(usize, i32),
    If(CmpTest, usize, usize),
    Else,
    EndIf,
    Loop(Bound),
    EndLoop,
}

enum Open {
    If { block: IfBlock, in_else: bool },
    Loop { block: LoopBlock, counter: Var },
}

struct Emitter {
    b: GraphBuilder,
    vars: Vec<Var>,
    open: Vec<Open>,
}

impl Emitter {
    fn new() -> Self {
        let mut b = GraphBuilder::new(2);
        let x = b.parm(0);
        let y = b.parm(1);
        let seven = b.con(7);
        let mixed = b.xor(x, y);
        let vars = vec![b.var(x), b.var(y), b.var(seven), b.var(mixed)];
        Self {
            b,
            vars,
            open: Vec::new(),
        }
    }

    fn get(&self, v: usize) -> NodeId {
        self.b.get(self.vars[v % VARS])
    }

    fn set(&mut self, v: usize, value: NodeId) {
        self.b.set(self.vars[v % VARS], value);
    }

    /// `var & 3`, so generated accesses stay on a few cells.
    fn index(&mut self, v: usize) -> NodeId {
        let value = self.get(v);
        let three = self.b.con(3);
        self.b.and(value, three)
    }

    fn loop_depth(&self) -> usize {
        self.open
            .iter()
            .filter(|o| matches!(o, Open::Loop { .. }))
            .count()
    }

    fn binary(&mut self, op: BinOp, a: NodeId, c: NodeId) -> NodeId {
        let b = &mut self.b;
        match op {
            BinOp::Add => b.add(a, c),
            BinOp::Sub => b.sub(a, c),
            BinOp::Mul => b.mul(a, c),
            BinOp::And => b.and(a, c),
            BinOp::Or => b.or(a, c),
            BinOp::Xor => b.xor(a, c),
            BinOp::Shl => b.shl(a, c),
            BinOp::Shr => b.rshift(a, c),
            BinOp::Ushr => b.urshift(a, c),
            BinOp::Min => b.min(a, c),
            BinOp::Max => b.max(a, c),
            BinOp::Cmp(test) => b.cmp(test, a, c),
            BinOp::CmpU(test) => b.cmpu(test, a, c),
        }
    }

    fn step(&mut self, step: &Step) -> Result<()> {
        match *step {
            Step::Binary(op, dst, a, c) => {
                let (a, c) = (self.get(a), self.get(c));
                let value = self.binary(op, a, c);
                self.set(dst, value);
            }
            Step::Const(dst, value) => {
                let value = self.b.con(value);
                self.set(dst, value);
            }
            Step::Store(loc, idx, val) | Step::StoreOpaque(loc, idx, val) => {
                let index = self.index(idx);
                let value = self.get(val);
                let location = LOCATIONS[loc % LOCATIONS.len()];
                if matches!(step, Step::Store(..)) {
                    self.b.store(location, index, value);
                } else {
                    self.b.store_opaque(location, index, value);
                }
            }
            Step::Load(dst, loc, idx) => {
                let index = self.index(idx);
                let value = self.b.load(LOCATIONS[loc % LOCATIONS.len()], index);
                self.set(dst, value);
            }
            Step::Check(idx, length) => {
                let value = self.get(idx);
                let seven = self.b.con(7);
                let index = self.b.and(value, seven);
                let length = self.b.con(length);
                self.b.range_check(index, length);
            }
            Step::If(test, a, c) => {
                if self.open.len() < 4 {
                    let (a, c) = (self.get(a), self.get(c));
                    let cond = self.b.cmp(test, a, c);
                    let block = self.b.if_then(cond);
                    self.open.push(Open::If {
                        block,
                        in_else: false,
                    });
                }
            }
            Step::Else => {
                if let Some(Open::If { block, in_else }) = self.open.last_mut() {
                    if !*in_else {
                        self.b.else_branch(block);
                        *in_else = true;
                    }
                }
            }
            Step::EndIf => {
                if matches!(self.open.last(), Some(Open::If { .. })) {
                    self.close()?;
                }
            }
            Step::Loop(bound) => {
                if self.open.len() < 4 && self.loop_depth() < 2 {
                    let limit = match bound {
                        Bound::Const(c) => self.b.con(c),
                        Bound::Masked(v) => {
                            let value = self.get(v);
                            let seven = self.b.con(7);
                            self.b.and(value, seven)
                        }
                    };
                    let zero = self.b.con(0);
                    let counter = self.b.var(zero);
                    let mut block = self.b.begin_loop();
                    let iv = self.b.get(counter);
                    let cond = self.b.cmp(CmpTest::Lt, iv, limit);
                    self.b.exit_unless(&mut block, cond);
                    self.open.push(Open::Loop { block, counter });
                }
            }
            Step::EndLoop => {
                if matches!(self.open.last(), Some(Open::Loop { .. })) {
                    self.close()?;
                }
            }
        }
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        match self.open.pop() {
            Some(Open::If { block, .. }) => self.b.end_if(block),
            Some(Open::Loop { block, counter }) => {
                let iv = self.b.get(counter);
                let one = self.b.con(1);
                let next = self.b.add(iv, one);
                self.b.set(counter, next);
                self.b.end_loop(block)?;
            }
            None => {}
        }
        Ok(())
    }

    fn finish(mut self) -> Result<Graph> {
        while !self.open.is_empty() {
            self.close()?;
        }
        let zero = self.b.con(0);
        let mut result = self.b.load(LOCATIONS[0], zero);
        for v in 0..VARS {
            let value = self.get(v);
            result = self.b.add(result, value);
        }
        self.b.ret(result);
        self.b.finish()
    }
}

/// Builds the method described by `steps`.
pub fn build(steps: &[Step]) -> Result<Graph> {
    let mut emitter = Emitter::new();
    for step in steps {
        emitter.step(step)?;
    }
    emitter.finish()
}

/// Runs the full pipeline for `config` and returns the context, events included.
pub fn compile(graph: Graph, config: OptConfig) -> Result<CompileContext> {
    let scheduler = PassScheduler::for_config(&config);
    let mut ctx = CompileContext::new(MethodId::new(1), graph, config);
    scheduler.run_pipeline(&mut ctx)?;
    Ok(ctx)
}

/// Runs the full pipeline for `config` and returns the optimized graph.
pub fn optimize(graph: Graph, config: OptConfig) -> Result<Graph> {
    Ok(compile(graph, config)?.graph)
}

/// Runs `graph` on `args` with an empty heap.
pub fn run(graph: &Graph, args: &[i32]) -> Outcome {
    Interpreter::new(graph).run(args).unwrap()
}

/// Argument pairs that hit zero, small, negative and extreme values.
pub const ARGS: [[i32; 2]; 8] = [
    [0, 0],
    [1, 2],
    [5, -3],
    [-1, 7],
    [3, 3],
    [i32::MAX, 1],
    [i32::MIN, -1],
    [0x1234_5678, 0x0f0f],
];

fn var() -> impl Strategy<Value = usize> {
    0..VARS
}

fn test() -> impl Strategy<Value = CmpTest> {
    prop::sample::select(TESTS.to_vec())
}

fn bin_op() -> impl Strategy<Value = BinOp> {
    prop_oneof![
        Just(BinOp::Add),
        Just(BinOp::Sub),
        Just(BinOp::Mul),
        Just(BinOp::And),
        Just(BinOp::Or),
        Just(BinOp::Xor),
        Just(BinOp::Shl),
        Just(BinOp::Shr),
        Just(BinOp::Ushr),
        Just(BinOp::Min),
        Just(BinOp::Max),
        test().prop_map(BinOp::Cmp),
        test().prop_map(BinOp::CmpU),
    ]
}

/// Any step.
pub fn step() -> impl Strategy<Value = Step> {
    prop_oneof![
        4 => (bin_op(), var(), var(), var()).prop_map(|(op, d, a, b)| Step::Binary(op, d, a, b)),
        1 => (var(), prop_oneof![-4..=4i32, any::<i32>()]).prop_map(|(d, c)| Step::Const(d, c)),
        2 => (0..LOCATIONS.len(), var(), var()).prop_map(|(l, i, v)| Step::Store(l, i, v)),
        1 => (0..LOCATIONS.len(), var(), var()).prop_map(|(l, i, v)| Step::StoreOpaque(l, i, v)),
        2 => (var(), 0..LOCATIONS.len(), var()).prop_map(|(d, l, i)| Step::Load(d, l, i)),
        1 => (var(), 1..=8i32).prop_map(|(i, n)| Step::Check(i, n)),
        1 => (test(), var(), var()).prop_map(|(t, a, b)| Step::If(t, a, b)),
        1 => Just(Step::Else),
        1 => Just(Step::EndIf),
        1 => prop_oneof![(0..6i32).prop_map(Bound::Const), var().prop_map(Bound::Masked)]
            .prop_map(Step::Loop),
        1 => Just(Step::EndLoop),
    ]
}

/// A method of up to `len` steps.
pub fn program(len: usize) -> impl Strategy<Value = Vec<Step>> {
    prop::collection::vec(step(), 1..len)
}
