//! The pass trait.
//!
//! Every stage of the pipeline implements [`GraphPass`]. Passes do not declare
//! their own order; the [`crate::compiler::PassScheduler`] places them in fixed
//! phases and normalizes the graph with IGVN after each phase makes progress.

use crate::{compiler::context::CompileContext, Result};

/// An optimization pass over the graph of one compilation unit.
///
/// Passes must be thread-safe (`Send + Sync`) so one pipeline instance can be
/// shared by the broker's worker threads; all mutable state lives in the
/// [`CompileContext`].
pub trait GraphPass: Send + Sync {
    /// Unique name for logging, events and diagnostics.
    fn name(&self) -> &'static str;

    /// Should this pass run on the given unit?
    ///
    /// Called before [`GraphPass::run`]. Override to skip units the pass cannot
    /// improve, for instance loop passes on loop-free graphs.
    fn should_run(&self, _ctx: &CompileContext) -> bool {
        true
    }

    /// Runs the pass.
    ///
    /// Returns `true` if the graph changed. Events are recorded directly to
    /// `ctx.events`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Bailout`] when a budget runs out, or an internal
    /// consistency error, which the scheduler turns into a fatal diagnostic.
    fn run(&self, ctx: &mut CompileContext) -> Result<bool>;

    /// Get a description of what this pass does.
    fn description(&self) -> &'static str {
        "No description available"
    }
}
