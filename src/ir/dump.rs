//! Human-readable graph dumps.
//!
//! [`to_text`] lists one live node per line, `id op [inputs] : type`, and is what
//! fatal diagnostics carry. [`to_dot`] renders the live graph for Graphviz, with
//! control edges drawn bold and memory edges dashed.

use std::fmt::Write;

use crate::{
    ir::{graph::Graph, node::NodeId},
    utils::escape_dot,
};

/// Renders every live node as one line of text.
///
/// # Examples
///
/// ```rust
/// use seaopt::ir::{dump, GraphBuilder};
///
/// let mut b = GraphBuilder::new(1);
/// let x = b.parm(0);
/// b.ret(x);
/// let text = dump::to_text(&b.finish()?);
/// assert!(text.contains("Parm(0)"));
/// # Ok::<(), seaopt::Error>(())
/// ```
#[must_use]
pub fn to_text(graph: &Graph) -> String {
    let live = graph.reachable();
    let mut out = String::new();
    for id in graph.ids().filter(|id| live.contains(id.index())) {
        let inputs: Vec<String> = graph.inputs(id).iter().map(NodeId::to_string).collect();
        let _ = writeln!(
            out,
            "{id:>6} {:<24} [{}] : {}",
            graph.op(id).to_string(),
            inputs.join(", "),
            graph.ty(id)
        );
    }
    out
}

/// Renders the live graph in Graphviz DOT syntax.
#[must_use]
pub fn to_dot(graph: &Graph) -> String {
    let live = graph.reachable();
    let mut out = String::from("digraph seaopt {\n  node [shape=box, fontname=\"monospace\"];\n");

    for id in graph.ids().filter(|id| live.contains(id.index())) {
        let op = graph.op(id);
        let label = escape_dot(&format!("{id} {op}\n{}", graph.ty(id)));
        let shape = if op.is_control() { ", style=bold" } else { "" };
        let _ = writeln!(out, "  {id} [label=\"{label}\"{shape}];");
    }

    for id in graph.ids().filter(|id| live.contains(id.index())) {
        let op = graph.op(id);
        for (slot, &input) in graph.inputs(id).iter().enumerate() {
            let style = if graph.op(input).is_control() {
                "style=bold"
            } else if graph.op(input).is_memory() {
                "style=dashed"
            } else {
                "style=solid"
            };
            let _ = writeln!(
                out,
                "  {input} -> {id} [{style}, headlabel=\"{}\"];",
                if op.is_merge() || slot > 0 { slot.to_string() } else { String::new() }
            );
        }
    }
    out.push_str("}\n");
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::GraphBuilder;

    fn sample() -> Graph {
        let mut b = GraphBuilder::new(2);
        let x = b.parm(0);
        let y = b.parm(1);
        let s = b.add(x, y);
        b.ret(s);
        b.finish().unwrap()
    }

    #[test]
    fn test_text_lists_live_nodes() {
        let text = to_text(&sample());
        assert!(text.contains("AddI"));
        assert!(text.contains("Return"));
        assert!(!text.contains("Top"));
    }

    #[test]
    fn test_dot_is_well_formed() {
        let dot = to_dot(&sample());
        assert!(dot.starts_with("digraph seaopt {"));
        assert!(dot.trim_end().ends_with('}'));
        assert!(dot.contains("style=bold"));
        assert!(dot.contains("style=dashed"));
    }
}
