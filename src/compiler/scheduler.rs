//! Pass scheduler for one compilation unit.
//!
//! The `PassScheduler` runs the optimization passes in a phased pipeline. Each
//! phase runs to fixpoint, with IGVN normalization after every pass that
//! changed the graph; the whole pipeline repeats until no phase makes progress
//! or the iteration limit is reached.

use log::{debug, warn};

use crate::{
    compiler::{
        config::{OptConfig, OptLevel},
        context::CompileContext,
        deadpath::DeadPathPass,
        events::EventKind,
        igvn::IgvnPass,
        loops::LoopOptsPass,
        memory::MemoryPass,
        pass::GraphPass,
    },
    ir::{dump, Verifier},
    Diagnostic, Error, Result,
};

/// Orchestrates pass execution in a phased pipeline.
///
/// The scheduler runs passes in two phases:
///
/// 1. **Scalar**: dead-path propagation, IGVN and the memory rules
/// 2. **Loops**: range-check elimination and the structural loop transformations
///
/// Each phase runs to fixpoint before proceeding. After every pass the graph is
/// verified (when [`OptConfig::verify`] is set) and the budgets are checked. A
/// failure that is not a bailout becomes [`Error::Fatal`] carrying the name of
/// the last pass that completed and a dump of the graph.
#[allow(clippy::struct_field_names)]
pub struct PassScheduler {
    /// Maximum iterations for the entire pipeline.
    max_iterations: usize,
    /// Maximum iterations for a single phase before moving on.
    max_phase_iterations: usize,
    /// Phase 1: scalar optimizations.
    pub scalar: Vec<Box<dyn GraphPass>>,
    /// Phase 2: loop optimizations.
    pub loops: Vec<Box<dyn GraphPass>>,
    /// Normalization passes, run after every pass that made progress.
    pub normalize: Vec<Box<dyn GraphPass>>,
}

impl Default for PassScheduler {
    fn default() -> Self {
        Self::new(4, 8)
    }
}

impl PassScheduler {
    /// Creates an empty scheduler with the specified iteration limits.
    ///
    /// # Arguments
    ///
    /// * `max_iterations` - Maximum iterations for the entire pipeline.
    /// * `max_phase_iterations` - Maximum iterations for a single phase.
    #[must_use]
    pub fn new(max_iterations: usize, max_phase_iterations: usize) -> Self {
        Self {
            max_iterations,
            max_phase_iterations,
            scalar: Vec::new(),
            loops: Vec::new(),
            normalize: Vec::new(),
        }
    }

    /// Creates the pipeline for a configuration's optimization level.
    ///
    /// | Level | Scalar | Loops | Normalize |
    /// |-------|--------|-------|-----------|
    /// | O0 | - | - | - |
    /// | O1 | dead paths, IGVN, memory | - | IGVN |
    /// | O2 | dead paths, IGVN, memory | loop opts | IGVN |
    #[must_use]
    pub fn for_config(config: &OptConfig) -> Self {
        let mut scheduler = Self::default();
        if config.level == OptLevel::O0 {
            return scheduler;
        }
        scheduler.scalar.push(Box::new(DeadPathPass::new()));
        scheduler.scalar.push(Box::new(IgvnPass::new()));
        scheduler.scalar.push(Box::new(MemoryPass::new()));
        scheduler.normalize.push(Box::new(IgvnPass::new()));
        if config.level >= OptLevel::O2 && config.loop_opts_enabled() {
            scheduler.loops.push(Box::new(LoopOptsPass::new()));
        }
        scheduler
    }

    /// Names of all scheduled passes, in phase order.
    #[must_use]
    pub fn pass_names(&self) -> Vec<&'static str> {
        self.scalar
            .iter()
            .chain(self.loops.iter())
            .map(|p| p.name())
            .collect()
    }

    /// Runs one pass and checks the graph afterwards.
    fn run_pass(ctx: &mut CompileContext, pass: &dyn GraphPass) -> Result<bool> {
        if !pass.should_run(ctx) {
            return Ok(false);
        }
        ctx.check_budgets().inspect_err(|e| Self::report_bailout(ctx, pass, e))?;

        ctx.events
            .record(EventKind::PassStarted)
            .method(ctx.method)
            .pass(pass.name());
        let changed = match pass.run(ctx) {
            Ok(changed) => changed,
            Err(e) if e.is_bailout() => {
                Self::report_bailout(ctx, pass, &e);
                return Err(e);
            }
            Err(e) if e.is_fatal() => return Err(Self::fatal(ctx, pass.name(), e)),
            Err(e) => return Err(e),
        };
        ctx.stats.passes_run += 1;

        if ctx.config.verify {
            Verifier::new(&ctx.graph)
                .verify()
                .map_err(|e| Self::fatal(ctx, pass.name(), e))?;
        }
        ctx.check_budgets().inspect_err(|e| Self::report_bailout(ctx, pass, e))?;

        ctx.last_pass = Some(pass.name());
        ctx.events
            .record(EventKind::PassCompleted)
            .method(ctx.method)
            .pass(pass.name())
            .message(if changed { "changed" } else { "unchanged" });
        debug!(
            "{}: {} {} ({} live nodes)",
            ctx.method,
            pass.name(),
            if changed { "changed the graph" } else { "made no change" },
            ctx.graph.live_count()
        );
        Ok(changed)
    }

    fn report_bailout(ctx: &CompileContext, pass: &dyn GraphPass, error: &Error) {
        debug!("{}: bailout in {}: {error}", ctx.method, pass.name());
        ctx.events
            .record(EventKind::Bailout)
            .method(ctx.method)
            .pass(pass.name())
            .message(error.to_string());
    }

    /// Wraps an internal failure with the pipeline position and a graph dump.
    fn fatal(ctx: &CompileContext, failing_pass: &'static str, error: Error) -> Error {
        if let Error::Fatal(_) = error {
            return error;
        }
        warn!("{}: fatal in {failing_pass}: {error}", ctx.method);
        ctx.events
            .record(EventKind::Error)
            .method(ctx.method)
            .pass(failing_pass)
            .message(error.to_string());
        Error::Fatal(Box::new(Diagnostic {
            message: error.to_string(),
            last_pass: ctx.last_pass,
            failing_pass,
            dump: dump::to_text(&ctx.graph),
        }))
    }

    /// Runs the passes once each. Returns `true` if any made changes.
    fn run_passes_once(ctx: &mut CompileContext, passes: &[Box<dyn GraphPass>]) -> Result<bool> {
        let mut any_changed = false;
        for pass in passes {
            if Self::run_pass(ctx, pass.as_ref())? {
                any_changed = true;
            }
        }
        Ok(any_changed)
    }

    /// Runs normalization passes until no more changes occur.
    fn normalize_to_fixpoint(
        ctx: &mut CompileContext,
        passes: &[Box<dyn GraphPass>],
        max_phase_iterations: usize,
    ) -> Result<bool> {
        let mut any_changed = false;
        for _ in 0..max_phase_iterations {
            if !Self::run_passes_once(ctx, passes)? {
                break;
            }
            any_changed = true;
        }
        Ok(any_changed)
    }

    /// Runs a phase to fixpoint: execute the phase passes, then normalize until
    /// stable, and repeat while the phase passes make progress.
    fn phase_to_fixpoint(
        ctx: &mut CompileContext,
        phase_passes: &[Box<dyn GraphPass>],
        normalize_passes: &[Box<dyn GraphPass>],
        max_phase_iterations: usize,
    ) -> Result<bool> {
        if phase_passes.is_empty() {
            return Ok(false);
        }
        let mut phase_changed = false;
        for _ in 0..max_phase_iterations {
            if !Self::run_passes_once(ctx, phase_passes)? {
                break;
            }
            phase_changed = true;
            if !normalize_passes.is_empty() {
                Self::normalize_to_fixpoint(ctx, normalize_passes, max_phase_iterations)?;
            }
        }
        Ok(phase_changed)
    }

    /// Runs the complete pipeline on one unit.
    ///
    /// The input graph is verified first when verification is on; a graph that
    /// fails there is reported as [`Error::Verification`], not as a fatal error,
    /// because no pass has touched it.
    ///
    /// # Returns
    ///
    /// The number of pipeline iterations completed. Events are accumulated in
    /// `ctx.events`, counters in `ctx.stats`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Bailout`] when a budget runs out and [`Error::Fatal`] when
    /// a pass fails or leaves an invalid graph.
    pub fn run_pipeline(&self, ctx: &mut CompileContext) -> Result<usize> {
        if ctx.config.verify {
            Verifier::new(&ctx.graph).verify()?;
        }
        debug!(
            "{}: pipeline {:?} on {} live nodes",
            ctx.method,
            self.pass_names(),
            ctx.graph.live_count()
        );

        let mut iterations = 0;
        for iteration in 0..self.max_iterations {
            iterations = iteration + 1;
            let mut changed = Self::phase_to_fixpoint(
                ctx,
                &self.scalar,
                &self.normalize,
                self.max_phase_iterations,
            )?;
            if Self::phase_to_fixpoint(ctx, &self.loops, &self.normalize, self.max_phase_iterations)? {
                changed = true;
            }
            if !changed {
                break;
            }
        }

        ctx.stats.nodes_after = ctx.graph.reachable().count();
        ctx.stats.elapsed = ctx.elapsed();
        debug!(
            "{}: pipeline done after {iterations} iteration(s), {} -> {} nodes",
            ctx.method, ctx.stats.nodes_before, ctx.stats.nodes_after
        );
        Ok(iterations)
    }
}
