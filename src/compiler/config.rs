//! Optimizer configuration.
//!
//! [`OptConfig`] is a plain value threaded through every [`crate::compiler::CompileContext`].
//! Nothing in the optimizer reads ambient state, so units compiled concurrently
//! with different configurations never interfere.
//!
//! # Presets
//!
//! | Preset | Level | Loops | Worklist | Notes |
//! |--------|-------|-------|----------|-------|
//! | [`OptConfig::default`] | O2 | all | FIFO | production budgets |
//! | [`OptConfig::minimal`] | O1 | none | FIFO | IGVN, dead paths, memory |
//! | [`OptConfig::aggressive`] | O2 | all | FIFO | larger bodies and budgets |
//! | [`OptConfig::stress`] | O2 | all | shuffled | tiny thresholds, every transform fires early |

use std::{fmt, time::Duration};

/// How much of the pipeline runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum OptLevel {
    /// Verification only; the graph is returned unchanged.
    O0,
    /// IGVN, dead-path propagation and the memory model.
    O1,
    /// Everything in O1 plus the loop optimizer.
    #[default]
    O2,
}

impl OptLevel {
    /// The next higher level, if any.
    #[must_use]
    pub fn next(self) -> Option<Self> {
        match self {
            Self::O0 => Some(Self::O1),
            Self::O1 => Some(Self::O2),
            Self::O2 => None,
        }
    }
}

impl fmt::Display for OptLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::O0 => write!(f, "O0"),
            Self::O1 => write!(f, "O1"),
            Self::O2 => write!(f, "O2"),
        }
    }
}

/// Order in which the IGVN worklist hands out nodes.
///
/// The converged graph never depends on this choice; only the number of steps
/// does.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum WorklistOrder {
    /// First in, first out.
    #[default]
    Fifo,
    /// Last in, first out.
    Lifo,
    /// Uniformly random among the queued nodes, from a seeded generator.
    Shuffled(u64),
}

/// Tunables of one compilation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OptConfig {
    /// Pipeline depth.
    pub level: OptLevel,
    /// IGVN worklist order.
    pub worklist_order: WorklistOrder,
    /// Run the verifier after every pass.
    pub verify: bool,
    /// Allow `CmpI(x + MIN, y + MIN)` to become `CmpU(x, y)`.
    pub fold_unsigned_compares: bool,
    /// Node budget of a unit.
    pub max_nodes: usize,
    /// Budget of IGVN steps per run.
    pub max_igvn_steps: usize,
    /// Optional wall-clock budget of a unit.
    pub time_budget: Option<Duration>,
    /// Maximum rounds of the loop optimizer.
    pub loop_opts_rounds: usize,
    /// Remove range checks proven redundant in counted loops.
    pub range_check_elimination: bool,
    /// Duplicate loops over invariant tests.
    pub unswitching: bool,
    /// Largest loop (in nodes) that may be unswitched.
    pub max_unswitch_body: usize,
    /// Peel an iteration off loops whose tests settle after one trip.
    pub peeling: bool,
    /// Largest loop (in nodes) that may be peeled.
    pub max_peel_body: usize,
    /// Unroll loops, fully or by two.
    pub unrolling: bool,
    /// Largest constant trip count that is unrolled completely.
    pub max_full_unroll_trip: u32,
    /// Largest loop (in nodes) that may be unrolled.
    pub max_unroll_body: usize,
    /// Split long counted loops into an outer and an inner loop.
    pub strip_mining: bool,
    /// Iterations of the inner loop of a strip-mined pair.
    pub strip_mine_chunk: i32,
    /// Split branches on merged constants through their merge point.
    pub split_if: bool,
}

impl Default for OptConfig {
    fn default() -> Self {
        Self {
            level: OptLevel::O2,
            worklist_order: WorklistOrder::Fifo,
            verify: true,
            fold_unsigned_compares: true,
            max_nodes: 80_000,
            max_igvn_steps: 1_000_000,
            time_budget: None,
            loop_opts_rounds: 4,
            range_check_elimination: true,
            unswitching: true,
            max_unswitch_body: 60,
            peeling: true,
            max_peel_body: 60,
            unrolling: true,
            max_full_unroll_trip: 8,
            max_unroll_body: 40,
            strip_mining: true,
            strip_mine_chunk: 1000,
            split_if: true,
        }
    }
}

impl OptConfig {
    /// Scalar optimizations only: IGVN, dead paths and memory.
    #[must_use]
    pub fn minimal() -> Self {
        Self {
            level: OptLevel::O1,
            loop_opts_rounds: 0,
            range_check_elimination: false,
            unswitching: false,
            peeling: false,
            unrolling: false,
            strip_mining: false,
            split_if: false,
            ..Self::default()
        }
    }

    /// Larger bodies and budgets for hot code.
    #[must_use]
    pub fn aggressive() -> Self {
        Self {
            max_nodes: 250_000,
            max_igvn_steps: 5_000_000,
            loop_opts_rounds: 8,
            max_unswitch_body: 200,
            max_peel_body: 200,
            max_full_unroll_trip: 32,
            max_unroll_body: 120,
            ..Self::default()
        }
    }

    /// Shuffled worklist and tiny thresholds so every transformation fires on
    /// small test graphs. Verification stays on.
    #[must_use]
    pub fn stress(seed: u64) -> Self {
        Self {
            worklist_order: WorklistOrder::Shuffled(seed),
            verify: true,
            loop_opts_rounds: 6,
            max_full_unroll_trip: 3,
            strip_mine_chunk: 4,
            ..Self::default()
        }
    }

    /// Returns the configuration with another level.
    #[must_use]
    pub fn with_level(mut self, level: OptLevel) -> Self {
        self.level = level;
        self
    }

    /// Returns the configuration with another worklist order.
    #[must_use]
    pub fn with_worklist_order(mut self, order: WorklistOrder) -> Self {
        self.worklist_order = order;
        self
    }

    /// Returns `true` if any loop transformation is enabled.
    #[must_use]
    pub fn loop_opts_enabled(&self) -> bool {
        self.level >= OptLevel::O2
            && self.loop_opts_rounds > 0
            && (self.range_check_elimination
                || self.unswitching
                || self.peeling
                || self.unrolling
                || self.strip_mining
                || self.split_if)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_presets() {
        let default = OptConfig::default();
        assert_eq!(default.level, OptLevel::O2);
        assert_eq!(default.worklist_order, WorklistOrder::Fifo);
        assert!(default.loop_opts_enabled());

        let minimal = OptConfig::minimal();
        assert_eq!(minimal.level, OptLevel::O1);
        assert!(!minimal.loop_opts_enabled());
        assert!(default.split_if && !minimal.split_if);

        let stress = OptConfig::stress(7);
        assert_eq!(stress.worklist_order, WorklistOrder::Shuffled(7));
        assert!(stress.verify);
        assert!(stress.strip_mine_chunk < default.strip_mine_chunk);

        assert!(OptConfig::aggressive().max_nodes > default.max_nodes);
    }

    #[test]
    fn test_levels() {
        assert!(OptLevel::O0 < OptLevel::O1);
        assert_eq!(OptLevel::O0.next(), Some(OptLevel::O1));
        assert_eq!(OptLevel::O2.next(), None);
        assert_eq!(OptLevel::O1.to_string(), "O1");
        assert!(!OptConfig::default()
            .with_level(OptLevel::O1)
            .loop_opts_enabled());
    }
}
