#![no_main]

//! Builds a method from the input bytes, optimizes it with the stress
//! configuration and checks that it still computes the same results.

use libfuzzer_sys::fuzz_target;
use seaopt::{
    compiler::{CompileContext, MethodId, OptConfig, PassScheduler},
    ir::{CmpTest, Graph, GraphBuilder, IfBlock, Interpreter, Location, LoopBlock, NodeId, Var},
    Error,
};

const LOCATIONS: [Location; 3] = [
    Location::Field { holder: 1, field: 0 },
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

enum Open {
    If(IfBlock, bool),
    Loop(LoopBlock, Var),
}

fn build(data: &[u8]) -> Option<Graph> {
    let mut b = GraphBuilder::new(2);
    let x = b.parm(0);
    let y = b.parm(1);
    let three = b.con(3);
    let vars = [b.var(x), b.var(y), b.var(three)];
    let mut open: Vec<Open> = Vec::new();

    let mut bytes = data.chunks_exact(3);
    for chunk in &mut bytes {
        let (op, a, c) = (chunk[0], usize::from(chunk[1]), usize::from(chunk[2]));
        let va = b.get(vars[a % 3]);
        let vc = b.get(vars[c % 3]);
        let dst = vars[(a / 3) % 3];
        let value: Option<NodeId> = match op % 16 {
            0 => Some(b.add(va, vc)),
            1 => Some(b.sub(va, vc)),
            2 => Some(b.mul(va, vc)),
            3 => Some(b.and(va, vc)),
            4 => Some(b.xor(va, vc)),
            5 => Some(b.rshift(va, vc)),
            6 => Some(b.urshift(va, vc)),
            7 => Some(b.cmp(TESTS[c % 6], va, vc)),
            8 => Some(b.con(i32::from(chunk[2] as i8))),
            9 => {
                let idx = b.and(vc, three);
                b.store(LOCATIONS[a % 3], idx, va);
                None
            }
            10 => {
                let idx = b.and(vc, three);
                Some(b.load(LOCATIONS[a % 3], idx))
            }
            11 if open.len() < 4 => {
                let cond = b.cmp(TESTS[a % 6], va, vc);
                open.push(Open::If(b.if_then(cond), false));
                None
            }
            12 => {
                if let Some(Open::If(block, in_else)) = open.last_mut() {
                    if !*in_else {
                        b.else_branch(block);
                        *in_else = true;
                    }
                }
                None
            }
            13 if open.len() < 4 => {
                let seven = b.con(7);
                let limit = b.and(va, seven);
                let zero = b.con(0);
                let counter = b.var(zero);
                let mut block = b.begin_loop();
                let iv = b.get(counter);
                let test = b.cmp(CmpTest::Lt, iv, limit);
                b.exit_unless(&mut block, test);
                open.push(Open::Loop(block, counter));
                None
            }
            14 => {
                let idx = b.and(va, three);
                let len = b.con(i32::from(chunk[2] % 5));
                b.range_check(idx, len);
                None
            }
            15 => {
                close(&mut b, open.pop())?;
                None
            }
            _ => None,
        };
        if let Some(value) = value {
            b.set(dst, value);
        }
    }
    while let Some(top) = open.pop() {
        close(&mut b, Some(top))?;
    }
    let mut out = b.get(vars[0]);
    for var in &vars[1..] {
        let v = b.get(*var);
        out = b.add(out, v);
    }
    b.ret(out);
    b.finish().ok()
}

fn close(b: &mut GraphBuilder, open: Option<Open>) -> Option<()> {
    match open {
        Some(Open::If(block, _)) => b.end_if(block),
        Some(Open::Loop(block, counter)) => {
            let iv = b.get(counter);
            let one = b.con(1);
            let next = b.add(iv, one);
            b.set(counter, next);
            b.end_loop(block).ok()?;
        }
        None => {}
    }
    Some(())
}

fuzz_target!(|data: &[u8]| {
    let Some(graph) = build(data) else {
        return;
    };
    let seed = data.iter().fold(0u64, |h, &b| h.rotate_left(5) ^ u64::from(b));
    let config = OptConfig::stress(seed);
    let scheduler = PassScheduler::for_config(&config);
    let mut ctx = CompileContext::new(MethodId::new(0), graph.clone(), config);
    match scheduler.run_pipeline(&mut ctx) {
        Ok(_) => {}
        Err(Error::Bailout(_)) => return,
        Err(e) => panic!("optimizer failed: {e}"),
    }
    for args in [[0, 0], [1, -1], [7, 3], [-8, 100], [i32::MAX, i32::MIN]] {
        let want = Interpreter::new(&graph).run(&args).ok();
        let got = Interpreter::new(&ctx.graph).run(&args).ok();
        assert_eq!(got, want, "args = {args:?}");
    }
});
