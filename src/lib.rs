// Copyright 2025 Johann Kempter
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//
// SPDX-License-Identifier: Apache-2.0

#![doc(html_no_source)]
#![deny(missing_docs)]
#![deny(unsafe_code)]
#![allow(clippy::too_many_arguments)]

//! # seaopt
//!
//! The optimizing middle tier of a just-in-time compiler, built around a sea-of-nodes
//! intermediate representation. Control and data live in one graph; an iterative
//! global value numbering engine (IGVN) rewrites it to a fixpoint while a loop
//! optimizer, a dead-path propagator and an alias-partitioned memory model feed
//! their rewrites through the same worklist.
//!
//! ## Features
//!
//! - **Sea-of-nodes IR** - Arena-allocated nodes with stable ids, reachability-based liveness
//! - **Type lattice** - Top, integer constants and ranges, control, memory and bottom
//! - **IGVN** - Constant folding, algebraic simplification and hash-consing in one fixpoint
//! - **Dead paths** - Unreachable control and data collapse to a single Top node
//! - **Memory model** - Alias classes, per-class memory phis and load/store forwarding
//! - **Loops** - Counted loops, range-check elimination, unswitching, peeling,
//!   unrolling and strip mining
//! - **Parallel compilation** - Independent units compiled concurrently with `rayon`
//!
//! ## Quick Start
//!
//! ```rust
//! use seaopt::prelude::*;
//!
//! // (x & 0xFF) >> 4
//! let mut b = GraphBuilder::new(1);
//! let x = b.parm(0);
//! let mask = b.con(0xFF);
//! let masked = b.and(x, mask);
//! let four = b.con(4);
//! let shifted = b.rshift(masked, four);
//! b.ret(shifted);
//! let graph = b.finish()?;
//!
//! let broker = CompileBroker::new(OptConfig::default());
//! broker.compile(CompileTask::new(MethodId::new(1), graph));
//! let outcome = broker.take(MethodId::new(1)).expect("stored by compile");
//! let compiled = outcome.compiled().expect("small graphs never bail out");
//!
//! let result = Interpreter::new(&compiled.graph).run(&[0x1234])?;
//! assert_eq!(result.value(), Some(0x3));
//! # Ok::<(), seaopt::Error>(())
//! ```
//!
//! ## Architecture
//!
//! - [`ir`] - Nodes, types, alias classes, the graph arena, a builder, an interpreter,
//!   the verifier and dumps
//! - [`analysis`] - Loop tree construction and counted loop recognition
//! - [`compiler`] - The IGVN engine, dead-path and memory rules, loop transformations,
//!   the pass scheduler and the compile broker
//! - [`Error`] and [`Result`] - Error handling

#[macro_use]
pub(crate) mod error;

#[cfg(test)]
pub(crate) mod test;

pub mod analysis;
pub mod compiler;
pub mod ir;
pub mod prelude;
pub mod utils;

pub use error::{BailoutReason, Diagnostic, Error, Violation};

/// `seaopt` Result type.
///
/// A type alias for `std::result::Result<T, Error>` where the error type is always [`Error`].
pub type Result<T> = std::result::Result<T, Error>;
