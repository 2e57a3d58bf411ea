//! # seaopt Prelude
//!
//! Re-exports the types most users need to build a graph, optimize it and inspect the
//! result. Import this module to get quick access to the essentials.

// ================================================================================================
// Core Types and Error Handling
// ================================================================================================

/// The main error type for all seaopt operations
pub use crate::Error;

/// The result type used throughout seaopt
pub use crate::Result;

/// Why a compilation unit gave up
pub use crate::BailoutReason;

// ================================================================================================
// Intermediate Representation
// ================================================================================================

/// Graph arena, nodes and operations
pub use crate::ir::{CmpTest, Graph, LoopFlags, Node, NodeId, Op, OpKind, PhiKind, TrapReason};

/// Type lattice
pub use crate::ir::{JoinSemiLattice, MeetSemiLattice, Type, TypeInt};

/// Memory locations and alias classes
pub use crate::ir::{AliasIdx, AliasTable, Location, MemAccess};

/// Front-end stand-in and reference interpreter
pub use crate::ir::{GraphBuilder, Heap, Interpreter, Outcome, Var};

/// Structural checks and queries
pub use crate::ir::{dump, GraphQuery, Verifier};

// ================================================================================================
// Analysis
// ================================================================================================

/// Loop tree and counted loops
pub use crate::analysis::{CountedLoop, LoopInfo, LoopTree};

// ================================================================================================
// Compiler
// ================================================================================================

/// Configuration
pub use crate::compiler::{OptConfig, OptLevel, WorklistOrder};

/// Compilation entry points
pub use crate::compiler::{
    CompileBroker, CompileContext, CompileOutcome, CompileTask, CompiledMethod, MethodId,
};

/// Engine and passes
pub use crate::compiler::{GraphPass, IgvnStats, IterGvn, PassScheduler};

/// Change tracking
pub use crate::compiler::{Event, EventKind, EventLog};
