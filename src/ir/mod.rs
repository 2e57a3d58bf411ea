//! Sea-of-nodes intermediate representation.
//!
//! A method is a single graph in which control, data and memory are all nodes
//! connected by use-def edges. There are no basic blocks: data nodes float and
//! are placed only by their inputs, while pinned nodes name their control input
//! in slot 0.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                         IR Layer                                 │
//! ├──────────────────────────────────────────────────────────────────┤
//! │                                                                  │
//! │  Type / TypeInt            Lattice element per node              │
//! │    └─ lattice               meet (toward Bottom), join (toward   │
//! │                             Top)                                 │
//! │                                                                  │
//! │  Graph                      Node arena + def-use index           │
//! │    ├─ Node / Op             Operation, inputs, type, flags       │
//! │    ├─ AliasTable            Alias classes of memory locations    │
//! │    └─ Start / Root / Top    Singletons                           │
//! │                                                                  │
//! │  GraphBuilder               Front-end stand-in                   │
//! │  Interpreter                Reference semantics                  │
//! │  Verifier / GraphQuery      Invariants, counts, fingerprint      │
//! │  dump                       Text and Graphviz output             │
//! │                                                                  │
//! └──────────────────────────────────────────────────────────────────┘
//! ```

mod alias;
mod builder;
pub mod dump;
mod graph;
mod interp;
mod lattice;
mod node;
mod types;
mod verify;

pub use alias::{AliasIdx, AliasTable, Location, MemAccess};
pub use builder::{GraphBuilder, IfBlock, LoopBlock, Var};
pub use graph::Graph;
pub use interp::{eval_binary, Heap, Interpreter, Outcome, DEFAULT_STEP_LIMIT};
pub use lattice::{is_narrower_or_equal, meet_all, JoinSemiLattice, Lattice, MeetSemiLattice};
pub use node::{CmpTest, Inputs, LoopFlags, Node, NodeFlags, NodeId, Op, OpKind, PhiKind, TrapReason};
pub use types::{Type, TypeInt};
pub use verify::{GraphQuery, Verifier};
