//! Loop optimizer.
//!
//! Works on the loop tree from [`crate::analysis::LoopTree`] and applies, in
//! rounds, split-if and range-check elimination followed by structural
//! transformations:
//!
//! | Order | Transformation | Applies to |
//! |-------|----------------|------------|
//! | 1 | full unrolling | counted loops with a small known trip count |
//! | 2 | peeling | a body test on a phi that settles after one iteration |
//! | 3 | unswitching | a body branch on an invariant condition |
//! | 4 | strip mining | counted loops with a large or unknown trip count |
//! | 5 | partial unrolling | simple loops with small bodies |
//!
//! Only one structural transformation is applied per loop tree: every change
//! invalidates the analysis, so the tree is rebuilt after IGVN has cleaned up.
//! Each transformation tags the loops it produces with a [`LoopFlags`] bit, and
//! the node budget is checked before anything is cloned, so the rounds always
//! terminate.

mod clone;
mod peel;
mod rce;
mod splitif;
mod stripmine;
mod unroll;
mod unswitch;

use log::debug;

use crate::{
    analysis::{LoopInfo, LoopTree},
    compiler::{context::CompileContext, igvn::IterGvn, pass::GraphPass},
    ir::LoopFlags,
    Result,
};

/// Structural transformations applied before the tree is rebuilt.
const MAX_TRANSFORMS_PER_ROUND: usize = 16;

/// Runs range-check elimination and the structural loop transformations.
pub struct LoopOptsPass;

impl Default for LoopOptsPass {
    fn default() -> Self {
        Self::new()
    }
}

impl LoopOptsPass {
    /// Creates the pass.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Cleans up after a transformation.
    fn normalize(&self, ctx: &mut CompileContext) -> Result<()> {
        let stats = IterGvn::new(&mut ctx.graph, &ctx.config)
            .with_events(&ctx.events, ctx.method)
            .with_pass(self.name())
            .run()?;
        ctx.stats.igvn.accumulate(&stats);
        ctx.check_budgets()
    }

    /// Splits the first branch on merged constants through its merge.
    fn split_one_if(&self, ctx: &mut CompileContext) -> bool {
        let graph = &ctx.graph;
        let Some(plan) = splitif::candidates(graph)
            .into_iter()
            .find_map(|branch| splitif::plan(graph, branch))
        else {
            return false;
        };
        ctx.has_room_for(plan.cost(&ctx.graph)) && splitif::split(ctx, plan, self.name())
    }

    /// Removes range checks in every counted loop not yet handled.
    fn eliminate_range_checks(&self, ctx: &mut CompileContext) -> usize {
        let tree = LoopTree::build(&ctx.graph);
        tree.innermost_first()
            .into_iter()
            .filter(|info| !info.flags.contains(LoopFlags::RCE_DONE))
            .map(|info| rce::eliminate(ctx, info, self.name()))
            .sum()
    }

    /// Applies the first transformation that fits one of the loops.
    fn transform_one(&self, ctx: &mut CompileContext) -> bool {
        let tree = LoopTree::build(&ctx.graph);
        tree.innermost_first()
            .into_iter()
            .any(|info| self.transform_loop(ctx, info))
    }

    fn transform_loop(&self, ctx: &mut CompileContext, info: &LoopInfo) -> bool {
        let config = &ctx.config;
        let (unrolling, peeling, unswitching, strip_mining) = (
            config.unrolling,
            config.peeling,
            config.unswitching,
            config.strip_mining,
        );
        let max_peel_body = config.max_peel_body;

        if unrolling {
            if let Some(trips) = unroll::full_unroll_trips(ctx, info) {
                return unroll::unroll_fully(ctx, info, trips, self.name());
            }
        }
        if peeling
            && ctx.has_room_for(info.size())
            && peel::is_candidate(&ctx.graph, info, max_peel_body)
        {
            return peel::peel(ctx, info, self.name());
        }
        if unswitching {
            if let Some(branch) = unswitch::candidate(ctx, info) {
                return unswitch::unswitch(ctx, info, branch, self.name());
            }
        }
        if strip_mining
            && stripmine::is_candidate(ctx, info)
            && stripmine::strip_mine(ctx, info, self.name())
        {
            return true;
        }
        unrolling && unroll::is_candidate(ctx, info) && unroll::unroll(ctx, info, self.name())
    }
}

impl GraphPass for LoopOptsPass {
    fn name(&self) -> &'static str {
        "loop-opts"
    }

    fn should_run(&self, ctx: &CompileContext) -> bool {
        ctx.config.loop_opts_enabled() && !LoopTree::build(&ctx.graph).is_empty()
    }

    fn run(&self, ctx: &mut CompileContext) -> Result<bool> {
        let mut changed = false;
        for round in 0..ctx.config.loop_opts_rounds {
            let mut progress = false;
            if ctx.config.split_if {
                for _ in 0..MAX_TRANSFORMS_PER_ROUND {
                    if !self.split_one_if(ctx) {
                        break;
                    }
                    ctx.stats.loop_transforms += 1;
                    self.normalize(ctx)?;
                    progress = true;
                }
            }
            if ctx.config.range_check_elimination {
                let removed = self.eliminate_range_checks(ctx);
                if removed > 0 {
                    debug!("{}: round {round} removed {removed} range check(s)", ctx.method);
                    self.normalize(ctx)?;
                    progress = true;
                }
            }
            for _ in 0..MAX_TRANSFORMS_PER_ROUND {
                if !self.transform_one(ctx) {
                    break;
                }
                ctx.stats.loop_transforms += 1;
                self.normalize(ctx)?;
                progress = true;
            }
            if !progress {
                break;
            }
            changed = true;
        }
        Ok(changed)
    }

    fn description(&self) -> &'static str {
        "Split-if, range-check elimination, unswitching, peeling, unrolling and strip mining"
    }
}
