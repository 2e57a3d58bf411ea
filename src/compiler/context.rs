//! Per-unit compilation state.
//!
//! A [`CompileContext`] owns everything one compilation unit touches: its graph,
//! its configuration and its event log. Nothing in it is shared with other units,
//! so the broker can hand contexts to worker threads without synchronization.

use std::{
    fmt,
    time::{Duration, Instant},
};

use crate::{
    compiler::{config::OptConfig, events::EventLog, igvn::IgvnStats},
    ir::Graph,
    BailoutReason, Error, Result,
};

/// Identity of a compilation unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MethodId(u32);

impl MethodId {
    /// Creates a method id.
    #[must_use]
    pub const fn new(raw: u32) -> Self {
        Self(raw)
    }

    /// Returns the raw id.
    #[must_use]
    pub const fn value(&self) -> u32 {
        self.0
    }
}

impl fmt::Display for MethodId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "method#{}", self.0)
    }
}

/// Counters collected while compiling one unit.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompileStats {
    /// Passes executed, including repeated runs.
    pub passes_run: usize,
    /// Accumulated IGVN counters.
    pub igvn: IgvnStats,
    /// Loop transformations applied.
    pub loop_transforms: usize,
    /// Live nodes of the input graph.
    pub nodes_before: usize,
    /// Live nodes of the result.
    pub nodes_after: usize,
    /// Wall-clock time of the pipeline.
    pub elapsed: Duration,
}

/// State of one compilation unit.
pub struct CompileContext {
    /// The unit being compiled.
    pub method: MethodId,
    /// The graph, mutated in place by the passes.
    pub graph: Graph,
    /// Tunables of this unit.
    pub config: OptConfig,
    /// Every change made to the graph.
    pub events: EventLog,
    /// Counters.
    pub stats: CompileStats,
    /// Name of the last pass that completed and verified.
    pub last_pass: Option<&'static str>,
    start_time: Instant,
}

impl CompileContext {
    /// Creates a context for `graph`.
    #[must_use]
    pub fn new(method: MethodId, graph: Graph, config: OptConfig) -> Self {
        let nodes_before = graph.reachable().count();
        Self {
            method,
            graph,
            config,
            events: EventLog::new(),
            stats: CompileStats {
                nodes_before,
                ..CompileStats::default()
            },
            last_pass: None,
            start_time: Instant::now(),
        }
    }

    /// Returns the elapsed time since the context was created.
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// Checks the node and time budgets.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Bailout`] when either budget is exhausted.
    pub fn check_budgets(&self) -> Result<()> {
        let count = self.graph.live_count();
        if count > self.config.max_nodes {
            return Err(Error::Bailout(BailoutReason::NodeLimit {
                limit: self.config.max_nodes,
                count,
            }));
        }
        if let Some(limit) = self.config.time_budget {
            if self.elapsed() > limit {
                return Err(Error::Bailout(BailoutReason::TimeLimit { limit }));
            }
        }
        Ok(())
    }

    /// Returns `true` if `extra` more nodes still fit the node budget.
    #[must_use]
    pub fn has_room_for(&self, extra: usize) -> bool {
        self.graph.live_count() + extra <= self.config.max_nodes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test::graphs::add_params;

    #[test]
    fn test_node_budget() {
        let graph = add_params();
        let config = OptConfig {
            max_nodes: 3,
            ..OptConfig::default()
        };
        let ctx = CompileContext::new(MethodId::new(1), graph, config);
        assert!(ctx.stats.nodes_before > 3);
        assert!(matches!(
            ctx.check_budgets(),
            Err(Error::Bailout(BailoutReason::NodeLimit { limit: 3, .. }))
        ));
        assert!(!ctx.has_room_for(1));
    }

    #[test]
    fn test_time_budget() {
        let config = OptConfig {
            time_budget: Some(Duration::ZERO),
            ..OptConfig::default()
        };
        let ctx = CompileContext::new(MethodId::new(2), add_params(), config);
        std::thread::sleep(Duration::from_millis(1));
        assert!(ctx.check_budgets().unwrap_err().is_bailout());
    }

    #[test]
    fn test_method_id_display() {
        assert_eq!(MethodId::new(42).to_string(), "method#42");
        assert_eq!(MethodId::new(42).value(), 42);
    }
}
