//! Loop tree over the control skeleton of a graph.
//!
//! In a sea-of-nodes graph every loop is explicit: a [`Op::Loop`] header whose
//! inputs are `[entry, backedge]`. Finding the natural loop therefore needs no
//! dominator tree; the control body is everything reachable backwards from the
//! backedge without passing the header.
//!
//! # Loop Structure
//!
//! ```text
//!        entry
//!          |
//!          v
//!     [Loop header] <--------+
//!          |                 |
//!          v                 |
//!     [If test] --exit-->    |   <- header test, main exit
//!          |                 |
//!          v                 |
//!     [body ...] --trap-->   |   <- sink exits (Trap / Return)
//!          |                 |
//!          v                 |
//!      backedge -------------+
//! ```
//!
//! A loop is *simple* when its only exit that does not end in a sink leaves from
//! the header test. The *data body* is the set of data nodes whose value can
//! differ between iterations and that the loop itself consumes: the header phis,
//! everything pinned inside the control body, and the values in between. Data
//! nodes outside it are either invariant or only used after the loop.

use rustc_hash::FxHashSet;

use crate::{
    analysis::counted::CountedLoop,
    ir::{Graph, LoopFlags, NodeId, Op},
};

/// An edge leaving a loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoopExit {
    /// The branch inside the loop.
    pub branch: NodeId,
    /// The projection outside the loop.
    pub proj: NodeId,
    /// Whether the projection leads straight into a `Trap` or `Return`.
    pub sink: bool,
}

/// Everything the loop optimizer needs to know about one loop.
#[derive(Debug, Clone)]
pub struct LoopInfo {
    /// The `Loop` node.
    pub header: NodeId,

    /// Control flowing back into the header.
    pub backedge: NodeId,

    /// Control nodes of the loop, header included.
    pub body: FxHashSet<NodeId>,

    /// Data nodes that vary across iterations.
    pub data: FxHashSet<NodeId>,

    /// Exit edges, sink exits included.
    pub exits: Vec<LoopExit>,

    /// Flags of the header at the time of analysis.
    pub flags: LoopFlags,

    /// Nesting depth (0 = outermost).
    pub depth: usize,

    /// Header of the enclosing loop.
    pub parent: Option<NodeId>,

    /// Headers of the immediately nested loops.
    pub children: Vec<NodeId>,

    /// Counted-loop shape, when recognized.
    pub counted: Option<CountedLoop>,
}

impl LoopInfo {
    /// Analyzes the loop headed by `header`. Returns `None` if the backedge is dead.
    #[must_use]
    pub fn analyze(graph: &Graph, header: NodeId) -> Option<Self> {
        let Op::Loop(flags) = graph.op(header) else {
            return None;
        };
        let backedge = graph.input(header, 1);
        if backedge == graph.top() || graph.is_dead(backedge) {
            return None;
        }

        let body = control_body(graph, header, backedge);
        let exits = compute_exits(graph, header, &body);
        let data = data_body(graph, header, &body);

        let mut info = Self {
            header,
            backedge,
            body,
            data,
            exits,
            flags: *flags,
            depth: 0,
            parent: None,
            children: Vec::new(),
            counted: None,
        };
        info.counted = CountedLoop::recognize(graph, &info);
        Some(info)
    }

    /// Returns `true` if `node` is a control node of the loop.
    #[must_use]
    pub fn contains(&self, node: NodeId) -> bool {
        self.body.contains(&node)
    }

    /// Returns `true` if `node` is neither control inside the loop nor a varying
    /// data node.
    #[must_use]
    pub fn is_invariant(&self, node: NodeId) -> bool {
        !self.body.contains(&node) && !self.data.contains(&node)
    }

    /// Number of nodes that cloning the loop would copy.
    #[must_use]
    pub fn size(&self) -> usize {
        self.body.len() + self.data.len()
    }

    /// Returns `true` if this loop has no nested loops.
    #[must_use]
    pub fn is_innermost(&self) -> bool {
        self.children.is_empty()
    }

    /// The branch directly controlled by the header, if the header's only
    /// control successor is an `If`.
    #[must_use]
    pub fn header_test(&self, graph: &Graph) -> Option<NodeId> {
        match graph.control_successors(self.header).as_slice() {
            [only] if matches!(graph.op(*only), Op::If) => Some(*only),
            _ => None,
        }
    }

    /// Exits that do not end in a sink.
    pub fn main_exits(&self) -> impl Iterator<Item = &LoopExit> + '_ {
        self.exits.iter().filter(|e| !e.sink)
    }

    /// Exits ending in a `Trap` or `Return`.
    pub fn sink_exits(&self) -> impl Iterator<Item = &LoopExit> + '_ {
        self.exits.iter().filter(|e| e.sink)
    }

    /// The single non-sink exit, if the loop is simple.
    #[must_use]
    pub fn main_exit(&self, graph: &Graph) -> Option<LoopExit> {
        let test = self.header_test(graph)?;
        let mut mains = self.main_exits();
        let exit = *mains.next()?;
        if mains.next().is_some() || exit.branch != test {
            return None;
        }
        Some(exit)
    }

    /// Returns `true` if the only non-sink exit leaves from the header test.
    #[must_use]
    pub fn is_simple(&self, graph: &Graph) -> bool {
        self.main_exit(graph).is_some()
    }

    /// Value and memory phis of the header.
    #[must_use]
    pub fn phis(&self, graph: &Graph) -> Vec<NodeId> {
        graph.phis_of(self.header)
    }
}

/// Backward walk from the backedge, stopping at the header.
fn control_body(graph: &Graph, header: NodeId, backedge: NodeId) -> FxHashSet<NodeId> {
    let mut body = FxHashSet::default();
    body.insert(header);
    let mut worklist = vec![backedge];
    while let Some(node) = worklist.pop() {
        if node == graph.top() || graph.is_dead(node) || !body.insert(node) {
            continue;
        }
        for pred in graph.control_preds(node) {
            if pred != header && !body.contains(&pred) {
                worklist.push(pred);
            }
        }
    }
    body
}

/// Exits of the body. The header test's exit is never a sink exit, even when
/// a `Return` follows it directly.
fn compute_exits(graph: &Graph, header: NodeId, body: &FxHashSet<NodeId>) -> Vec<LoopExit> {
    let header_test = match graph.control_successors(header).as_slice() {
        [only] if matches!(graph.op(*only), Op::If) => Some(*only),
        _ => None,
    };
    let mut branches: Vec<NodeId> = body
        .iter()
        .copied()
        .filter(|&n| graph.op(n).is_branch())
        .collect();
    branches.sort_unstable();

    let mut exits = Vec::new();
    for branch in branches {
        for taken in [true, false] {
            let Some(proj) = graph.proj(branch, taken) else {
                continue;
            };
            if body.contains(&proj) {
                continue;
            }
            let sink = Some(branch) != header_test
                && graph
                    .control_successors(proj)
                    .iter()
                    .any(|&s| graph.op(s).is_sink());
            exits.push(LoopExit { branch, proj, sink });
        }
    }
    exits
}

/// Data nodes that vary across iterations and feed the loop itself.
///
/// Seeds are the header phis and the data nodes pinned inside the body. The
/// forward closure of the seeds is trimmed to the nodes that flow back into a
/// seed or a body control node, so values computed only after the loop stay out.
fn data_body(graph: &Graph, header: NodeId, body: &FxHashSet<NodeId>) -> FxHashSet<NodeId> {
    let floats_or_inside = |n: NodeId| -> bool {
        if graph.op(n).is_control() {
            return false;
        }
        graph.ctrl(n).map_or(true, |ctrl| body.contains(&ctrl))
    };

    let mut seeds: Vec<NodeId> = graph.phis_of(header);
    for &ctrl in body {
        seeds.extend(
            graph
                .users(ctrl)
                .iter()
                .copied()
                .filter(|&u| graph.op(u).is_pinned_data() && graph.input(u, 0) == ctrl),
        );
    }

    let mut forward = FxHashSet::default();
    let mut worklist = seeds.clone();
    while let Some(node) = worklist.pop() {
        if graph.is_dead(node) || !floats_or_inside(node) || !forward.insert(node) {
            continue;
        }
        worklist.extend(graph.users(node).iter().copied());
    }

    let mut data: FxHashSet<NodeId> = seeds.iter().copied().filter(|s| forward.contains(s)).collect();
    let mut worklist: Vec<NodeId> = data.iter().copied().collect();
    for &ctrl in body {
        worklist.extend(graph.inputs(ctrl).iter().copied());
    }
    while let Some(node) = worklist.pop() {
        for &input in graph.inputs(node) {
            if forward.contains(&input) && data.insert(input) {
                worklist.push(input);
            }
        }
        if forward.contains(&node) {
            data.insert(node);
        }
    }
    data
}

/// All loops of a graph with their nesting.
#[derive(Debug, Clone, Default)]
pub struct LoopTree {
    loops: Vec<LoopInfo>,
}

impl LoopTree {
    /// Analyzes every live loop of `graph`.
    #[must_use]
    pub fn build(graph: &Graph) -> Self {
        let live = graph.reachable();
        let mut loops: Vec<LoopInfo> = graph
            .ids()
            .filter(|id| live.contains(id.index()) && matches!(graph.op(*id), Op::Loop(_)))
            .filter_map(|h| LoopInfo::analyze(graph, h))
            .collect();
        compute_nesting(&mut loops);
        loops.sort_by_key(|l| l.header);
        Self { loops }
    }

    /// All loops, ordered by header id.
    #[must_use]
    pub fn loops(&self) -> &[LoopInfo] {
        &self.loops
    }

    /// Number of loops.
    #[must_use]
    pub fn len(&self) -> usize {
        self.loops.len()
    }

    /// Returns `true` if the graph has no loop.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.loops.is_empty()
    }

    /// The loop headed by `header`.
    #[must_use]
    pub fn get(&self, header: NodeId) -> Option<&LoopInfo> {
        self.loops.iter().find(|l| l.header == header)
    }

    /// The innermost loop whose control body contains `ctrl`.
    #[must_use]
    pub fn innermost(&self, ctrl: NodeId) -> Option<&LoopInfo> {
        self.loops
            .iter()
            .filter(|l| l.contains(ctrl))
            .max_by_key(|l| l.depth)
    }

    /// Iterates over all loops.
    pub fn iter(&self) -> impl Iterator<Item = &LoopInfo> {
        self.loops.iter()
    }

    /// Loops ordered innermost first, ties by header id.
    #[must_use]
    pub fn innermost_first(&self) -> Vec<&LoopInfo> {
        let mut sorted: Vec<_> = self.loops.iter().collect();
        sorted.sort_by_key(|l| (std::cmp::Reverse(l.depth), l.header));
        sorted
    }
}

/// Parent = smallest other loop whose body contains the header.
fn compute_nesting(loops: &mut [LoopInfo]) {
    let n = loops.len();
    for i in 0..n {
        let header = loops[i].header;
        let parent = (0..n)
            .filter(|&j| j != i && loops[j].body.contains(&header))
            .min_by_key(|&j| loops[j].body.len())
            .map(|j| loops[j].header);
        loops[i].parent = parent;
    }

    for i in 0..n {
        if let Some(parent) = loops[i].parent {
            let child = loops[i].header;
            if let Some(p) = loops.iter_mut().find(|l| l.header == parent) {
                p.children.push(child);
            }
        }
    }

    for i in 0..n {
        let mut depth = 0;
        let mut current = loops[i].parent;
        while let Some(parent) = current {
            depth += 1;
            current = loops.iter().find(|l| l.header == parent).and_then(|l| l.parent);
            if depth > n {
                break;
            }
        }
        loops[i].depth = depth;
    }
}
