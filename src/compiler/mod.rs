//! Optimizer infrastructure for sea-of-nodes graphs.
//!
//! This module sits between graph construction and code emission:
//!
//! - [`crate::ir`] - the graph, its types and the builder standing in for a front end
//! - [`crate::analysis`] - loop tree and counted-loop recognition
//! - [`compiler`](self) - the optimization passes, their pipeline and the broker
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                      Compiler Pipeline                           │
//! ├──────────────────────────────────────────────────────────────────┤
//! │                                                                  │
//! │  CompileBroker                Parallel units (rayon, DashMap)    │
//! │    └─ CompileTask ──► CompileOutcome                             │
//! │                                                                  │
//! │  CompileContext               Per-unit state                     │
//! │    ├─ Graph                   (mutated in place)                 │
//! │    ├─ OptConfig               (level, budgets, switches)         │
//! │    ├─ EventLog                (every change, by pass)            │
//! │    └─ CompileStats                                               │
//! │                                                                  │
//! │  PassScheduler                Phased fixpoint execution          │
//! │    ├─ Phase 1: Scalar         (dead paths, IGVN, memory)         │
//! │    ├─ Phase 2: Loops          (RCE, unswitch, peel, unroll, mine)│
//! │    │  Each phase: run → normalize with IGVN → repeat             │
//! │    └─ After each pass: verify, check budgets                     │
//! │                                                                  │
//! │  GraphPass trait              Interface for all passes           │
//! │                                                                  │
//! │  IterGvn                      Worklist engine                    │
//! │    ├─ value functions         (types on the lattice)             │
//! │    ├─ identity / ideal        (rewrites, hash-consing)           │
//! │    ├─ dead-path propagation   (eager Top)                        │
//! │    └─ memory rules            (alias slices, forwarding)         │
//! │                                                                  │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```rust
//! use seaopt::compiler::{CompileContext, MethodId, OptConfig, PassScheduler};
//! use seaopt::ir::{GraphBuilder, GraphQuery, OpKind};
//!
//! let mut b = GraphBuilder::new(1);
//! let x = b.parm(0);
//! let two = b.con(2);
//! let three = b.con(3);
//! let five = b.add(two, three);
//! let sum = b.add(x, five);
//! b.ret(sum);
//! let graph = b.finish()?;
//!
//! let config = OptConfig::default();
//! let mut ctx = CompileContext::new(MethodId::new(1), graph, config.clone());
//! PassScheduler::for_config(&config).run_pipeline(&mut ctx)?;
//! assert_eq!(GraphQuery::new(&ctx.graph).count(OpKind::AddI), 1);
//! # Ok::<(), seaopt::Error>(())
//! ```

mod broker;
mod config;
mod context;
mod deadpath;
mod events;
mod igvn;
mod loops;
mod memory;
mod pass;
mod scheduler;

pub use broker::{BrokerSummary, CompileBroker, CompileOutcome, CompileTask, CompiledMethod};
pub use config::{OptConfig, OptLevel, WorklistOrder};
pub use context::{CompileContext, CompileStats, MethodId};
pub use deadpath::DeadPathPass;
pub use events::{DerivedStats, Event, EventKind, EventLog};
pub use igvn::{IgvnPass, IgvnStats, IterGvn};
pub use loops::LoopOptsPass;
pub use memory::{resolve as resolve_memory, MemoryPass};
pub use pass::GraphPass;
pub use scheduler::PassScheduler;
