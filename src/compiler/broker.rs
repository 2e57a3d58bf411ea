//! Compile broker.
//!
//! The broker takes independent compilation units, runs the pass pipeline on
//! each of them in parallel and keeps the outcomes keyed by method. A unit owns
//! its graph, configuration and event log for the whole compilation, so the
//! only shared state is the result map.
//!
//! # Example
//!
//! ```rust
//! use seaopt::compiler::{CompileBroker, CompileTask, MethodId, OptConfig};
//! use seaopt::ir::GraphBuilder;
//!
//! let mut b = GraphBuilder::new(2);
//! let (x, y) = (b.parm(0), b.parm(1));
//! let sum = b.add(x, y);
//! b.ret(sum);
//! let graph = b.finish()?;
//!
//! let broker = CompileBroker::new(OptConfig::default());
//! broker.compile_all(vec![CompileTask::new(MethodId::new(1), graph)]);
//! let outcome = broker.take(MethodId::new(1)).expect("submitted");
//! assert!(outcome.compiled().is_some());
//! # Ok::<(), seaopt::Error>(())
//! ```

use dashmap::DashMap;
use log::{debug, warn};
use rayon::prelude::*;

use crate::{
    compiler::{
        config::OptConfig,
        context::{CompileContext, CompileStats, MethodId},
        events::EventLog,
        scheduler::PassScheduler,
    },
    ir::{Graph, GraphQuery, NodeId, TrapReason},
    BailoutReason, Error,
};

/// One unit of work: a graph and what the front end inlined into it.
#[derive(Debug, Clone)]
pub struct CompileTask {
    /// The method the graph belongs to.
    pub method: MethodId,
    /// The graph to optimize.
    pub graph: Graph,
    /// Methods the front end inlined into the graph, outermost first.
    pub inlined: Vec<MethodId>,
}

impl CompileTask {
    /// Creates a task with an empty inlining history.
    #[must_use]
    pub fn new(method: MethodId, graph: Graph) -> Self {
        Self {
            method,
            graph,
            inlined: Vec::new(),
        }
    }

    /// Sets the inlining history.
    #[must_use]
    pub fn with_inlined(mut self, inlined: Vec<MethodId>) -> Self {
        self.inlined = inlined;
        self
    }
}

/// The result of a successful compilation.
#[derive(Debug)]
pub struct CompiledMethod {
    /// The method compiled.
    pub method: MethodId,
    /// The optimized graph.
    pub graph: Graph,
    /// Inlining history, passed through from the task.
    pub inlined: Vec<MethodId>,
    /// Live `Trap` nodes and their reasons: the points where execution leaves
    /// compiled code.
    pub deopt_points: Vec<(NodeId, TrapReason)>,
    /// Counters of the compilation.
    pub stats: CompileStats,
    /// Every change made to the graph.
    pub events: EventLog,
}

/// What became of a task.
#[derive(Debug)]
pub enum CompileOutcome {
    /// The pipeline finished and the graph verified.
    Compiled(Box<CompiledMethod>),
    /// A budget ran out; the method stays in the lower tier.
    Bailout(BailoutReason),
    /// The pipeline failed; the error carries the diagnostic.
    Failed(Error),
}

impl CompileOutcome {
    /// The compiled method, if the compilation succeeded.
    #[must_use]
    pub fn compiled(&self) -> Option<&CompiledMethod> {
        match self {
            Self::Compiled(method) => Some(method),
            _ => None,
        }
    }

    /// Consumes the outcome and returns the compiled method, if any.
    #[must_use]
    pub fn into_compiled(self) -> Option<CompiledMethod> {
        match self {
            Self::Compiled(method) => Some(*method),
            _ => None,
        }
    }

    /// Returns `true` for a bailout.
    #[must_use]
    pub fn is_bailout(&self) -> bool {
        matches!(self, Self::Bailout(_))
    }

    /// Returns `true` for a failure.
    #[must_use]
    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed(_))
    }
}

/// Counts of outcomes held by a broker.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BrokerSummary {
    /// Units compiled.
    pub compiled: usize,
    /// Units that bailed out.
    pub bailed_out: usize,
    /// Units that failed.
    pub failed: usize,
}

/// Compiles units in parallel and collects the outcomes.
pub struct CompileBroker {
    config: OptConfig,
    scheduler: PassScheduler,
    results: DashMap<MethodId, CompileOutcome>,
}

impl CompileBroker {
    /// Creates a broker that compiles every unit with `config`.
    #[must_use]
    pub fn new(config: OptConfig) -> Self {
        let scheduler = PassScheduler::for_config(&config);
        Self {
            config,
            scheduler,
            results: DashMap::new(),
        }
    }

    /// The configuration applied to every unit.
    #[must_use]
    pub fn config(&self) -> &OptConfig {
        &self.config
    }

    /// Compiles one task and stores its outcome, replacing any earlier one for
    /// the same method.
    pub fn compile(&self, task: CompileTask) {
        let method = task.method;
        let outcome = self.run(task);
        self.results.insert(method, outcome);
    }

    /// Compiles all tasks in parallel.
    pub fn compile_all(&self, tasks: Vec<CompileTask>) {
        tasks.into_par_iter().for_each(|task| self.compile(task));
    }

    fn run(&self, task: CompileTask) -> CompileOutcome {
        let CompileTask {
            method,
            graph,
            inlined,
        } = task;
        let mut ctx = CompileContext::new(method, graph, self.config.clone());
        match self.scheduler.run_pipeline(&mut ctx) {
            Ok(_) => {
                let deopt_points = GraphQuery::new(&ctx.graph).traps();
                debug!(
                    "{method}: compiled, {} deopt point(s), {} transformation(s)",
                    deopt_points.len(),
                    ctx.events.transformation_count()
                );
                CompileOutcome::Compiled(Box::new(CompiledMethod {
                    method,
                    graph: ctx.graph,
                    inlined,
                    deopt_points,
                    stats: ctx.stats,
                    events: ctx.events,
                }))
            }
            Err(Error::Bailout(reason)) => {
                debug!("{method}: bailout: {reason}");
                CompileOutcome::Bailout(reason)
            }
            Err(e) => {
                warn!("{method}: compilation failed: {e}");
                CompileOutcome::Failed(e)
            }
        }
    }

    /// Removes and returns the outcome for `method`.
    #[must_use]
    pub fn take(&self, method: MethodId) -> Option<CompileOutcome> {
        self.results.remove(&method).map(|(_, outcome)| outcome)
    }

    /// Returns `true` if an outcome is stored for `method`.
    #[must_use]
    pub fn contains(&self, method: MethodId) -> bool {
        self.results.contains_key(&method)
    }

    /// Number of stored outcomes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.results.len()
    }

    /// Returns `true` if no outcome is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    /// Methods with a stored outcome, sorted.
    #[must_use]
    pub fn methods(&self) -> Vec<MethodId> {
        let mut methods: Vec<MethodId> = self.results.iter().map(|e| *e.key()).collect();
        methods.sort_unstable();
        methods
    }

    /// Counts the stored outcomes by kind.
    #[must_use]
    pub fn summary(&self) -> BrokerSummary {
        self.results
            .iter()
            .fold(BrokerSummary::default(), |mut acc, entry| {
                match entry.value() {
                    CompileOutcome::Compiled(_) => acc.compiled += 1,
                    CompileOutcome::Bailout(_) => acc.bailed_out += 1,
                    CompileOutcome::Failed(_) => acc.failed += 1,
                }
                acc
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        ir::{CmpTest, Interpreter},
        test::graphs::{add_params, array_walk, counted_sum, strided_loop},
    };

    #[test]
    fn test_compile_all_in_parallel() {
        let tasks: Vec<CompileTask> = (0..16)
            .map(|i| {
                let graph = match i % 3 {
                    0 => add_params(),
                    1 => counted_sum(0, 1, CmpTest::Lt),
                    _ => strided_loop(0, 1, 3),
                };
                CompileTask::new(MethodId::new(i), graph)
            })
            .collect();
        let broker = CompileBroker::new(OptConfig::default());
        broker.compile_all(tasks);

        assert_eq!(broker.len(), 16);
        assert_eq!(broker.summary().compiled, 16);
        assert_eq!(broker.methods().first(), Some(&MethodId::new(0)));
        let compiled = broker.take(MethodId::new(2)).unwrap().into_compiled().unwrap();
        assert_eq!(compiled.method, MethodId::new(2));
        assert_eq!(Interpreter::new(&compiled.graph).run(&[]).unwrap().value(), Some(3));
        assert!(!broker.contains(MethodId::new(2)));
    }

    #[test]
    fn test_deopt_points_and_inlining_history() {
        let task = CompileTask::new(MethodId::new(40), array_walk(Some((11, 10))))
            .with_inlined(vec![MethodId::new(41), MethodId::new(42)]);
        let broker = CompileBroker::new(OptConfig::minimal());
        broker.compile(task);
        let outcome = broker.take(MethodId::new(40)).unwrap();
        let compiled = outcome.compiled().unwrap();
        assert_eq!(compiled.inlined, vec![MethodId::new(41), MethodId::new(42)]);
        assert_eq!(compiled.deopt_points.len(), 1);
        assert_eq!(compiled.deopt_points[0].1, TrapReason::RangeCheck);
    }

    #[test]
    fn test_bailout_keeps_no_graph() {
        let config = OptConfig {
            max_nodes: 4,
            ..OptConfig::default()
        };
        let broker = CompileBroker::new(config);
        broker.compile(CompileTask::new(MethodId::new(7), counted_sum(0, 1, CmpTest::Lt)));
        let outcome = broker.take(MethodId::new(7)).unwrap();
        assert!(outcome.is_bailout());
        assert!(outcome.compiled().is_none());
        assert!(matches!(
            outcome,
            CompileOutcome::Bailout(BailoutReason::NodeLimit { limit: 4, .. })
        ));
    }
}
