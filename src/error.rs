use std::{fmt, time::Duration};

use thiserror::Error;

use crate::ir::NodeId;

macro_rules! malformed_error {
    // Single string version
    ($msg:expr) => {
        crate::Error::Malformed {
            message: $msg.to_string(),
            file: file!(),
            line: line!(),
        }
    };

    // Format string with arguments version
    ($fmt:expr, $($arg:tt)*) => {
        crate::Error::Malformed {
            message: format!($fmt, $($arg)*),
            file: file!(),
            line: line!(),
        }
    };
}

macro_rules! invariant_error {
    // Single string version
    ($msg:expr) => {
        crate::Error::Invariant {
            message: $msg.to_string(),
            file: file!(),
            line: line!(),
        }
    };

    // Format string with arguments version
    ($fmt:expr, $($arg:tt)*) => {
        crate::Error::Invariant {
            message: format!($fmt, $($arg)*),
            file: file!(),
            line: line!(),
        }
    };
}

/// The generic Error type, which covers every failure a compilation unit can report.
///
/// Errors fall into three classes:
///
/// ## Internal consistency violations (fatal)
/// - [`Error::Invariant`] - A dangling edge, a use of a removed node or a lattice violation
/// - [`Error::Verification`] - The verifier found one or more broken graph invariants
/// - [`Error::Fatal`] - One of the above, wrapped by the scheduler with a full graph dump
///
/// ## Resource exhaustion (recoverable)
/// - [`Error::Bailout`] - A node, step or time budget was exceeded; the unit falls back
///   to the unoptimized tier and no partial result escapes
///
/// ## Input errors
/// - [`Error::Malformed`] - A graph handed to the optimizer is structurally impossible
/// - [`Error::ExecutionLimit`] - The reference interpreter ran out of steps
///
/// # Examples
///
/// ```rust
/// use seaopt::{BailoutReason, Error};
///
/// let err = Error::Bailout(BailoutReason::NodeLimit { limit: 10, count: 11 });
/// assert!(err.is_bailout());
/// ```
#[derive(Error, Debug)]
pub enum Error {
    /// The graph is structurally malformed.
    ///
    /// Raised by the builder and by passes that receive graphs violating the input
    /// layout of an operation. Carries the source location where it was detected.
    #[error("Malformed - {file}:{line}: {message}")]
    Malformed {
        /// The message to be printed for the Malformed error
        message: String,
        /// The source file in which this error occured
        file: &'static str,
        /// The source line in which this error occured
        line: u32,
    },

    /// An internal consistency check failed.
    ///
    /// These are compiler defects: continuing would risk a miscompile, so the
    /// compilation unit is abandoned.
    #[error("Invariant violated - {file}:{line}: {message}")]
    Invariant {
        /// Description of the violated invariant
        message: String,
        /// The source file in which this error occured
        file: &'static str,
        /// The source line in which this error occured
        line: u32,
    },

    /// The verifier rejected the graph.
    #[error("Graph verification failed with {} violation(s)", .0.len())]
    Verification(Vec<Violation>),

    /// A fatal failure with the diagnostic dump collected by the scheduler.
    #[error("{0}")]
    Fatal(Box<Diagnostic>),

    /// A resource budget was exceeded; the unit bails out.
    #[error("Bailout: {0}")]
    Bailout(BailoutReason),

    /// The reference interpreter exceeded its step budget.
    #[error("Execution did not finish within {0} steps")]
    ExecutionLimit(usize),
}

impl Error {
    /// Returns `true` if this error is a recoverable bailout.
    #[must_use]
    pub fn is_bailout(&self) -> bool {
        matches!(self, Self::Bailout(_))
    }

    /// Returns `true` if this error is a fatal consistency failure.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::Invariant { .. } | Self::Verification(_) | Self::Fatal(_)
        )
    }
}

/// A single broken graph invariant found by the verifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Violation {
    /// The offending node.
    pub node: NodeId,
    /// What is wrong with it.
    pub message: String,
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.node, self.message)
    }
}

/// Diagnostic bundle for a fatal compilation failure.
#[derive(Debug, Clone)]
pub struct Diagnostic {
    /// The underlying failure, rendered.
    pub message: String,
    /// The last pass that completed successfully, if any.
    pub last_pass: Option<&'static str>,
    /// The pass that was running when the failure surfaced.
    pub failing_pass: &'static str,
    /// Text dump of the graph at the time of the failure.
    pub dump: String,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "fatal in pass '{}' (last good: {}): {}",
            self.failing_pass,
            self.last_pass.unwrap_or("<none>"),
            self.message
        )?;
        f.write_str(&self.dump)
    }
}

/// Why a compilation unit gave up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BailoutReason {
    /// The graph grew past the node budget.
    NodeLimit {
        /// Configured node budget
        limit: usize,
        /// Node count when the budget was exceeded
        count: usize,
    },
    /// IGVN needed more steps than allowed.
    StepLimit {
        /// Configured step budget
        limit: usize,
    },
    /// The wall-clock budget of the unit ran out.
    TimeLimit {
        /// Configured time budget
        limit: Duration,
    },
}

impl fmt::Display for BailoutReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NodeLimit { limit, count } => {
                write!(f, "node limit {limit} exceeded ({count} nodes)")
            }
            Self::StepLimit { limit } => write!(f, "optimization step limit {limit} exceeded"),
            Self::TimeLimit { limit } => write!(f, "time budget {limit:?} exceeded"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_classes() {
        let bailout = Error::Bailout(BailoutReason::StepLimit { limit: 5 });
        assert!(bailout.is_bailout());
        assert!(!bailout.is_fatal());

        let invariant = invariant_error!("dangling edge at {}", 3);
        assert!(invariant.is_fatal());
        assert!(invariant.to_string().contains("dangling edge at 3"));

        let malformed = malformed_error!("bad arity");
        assert!(!malformed.is_fatal());
        assert!(!malformed.is_bailout());
    }

    #[test]
    fn test_bailout_display() {
        let reason = BailoutReason::NodeLimit {
            limit: 100,
            count: 101,
        };
        assert_eq!(reason.to_string(), "node limit 100 exceeded (101 nodes)");
    }
}
