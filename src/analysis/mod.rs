//! Loop analysis over the control skeleton of a graph.
//!
//! - [`LoopTree`] / [`LoopInfo`] - loop detection, control and data bodies, exits
//!   and nesting
//! - [`CountedLoop`] - recognition of loops with a constant stride and an
//!   invariant bound
//!
//! The analysis is a snapshot: any structural transformation invalidates it, so
//! the loop optimizer rebuilds the tree after every change.
//!
//! # Usage
//!
//! ```rust
//! use seaopt::analysis::LoopTree;
//! use seaopt::ir::{CmpTest, GraphBuilder};
//!
//! let mut b = GraphBuilder::new(1);
//! let n = b.parm(0);
//! let (zero, one) = (b.con(0), b.con(1));
//! let i = b.var(zero);
//! let mut lp = b.begin_loop();
//! let iv = b.get(i);
//! let test = b.cmp(CmpTest::Lt, iv, n);
//! b.exit_unless(&mut lp, test);
//! let next = b.add(iv, one);
//! b.set(i, next);
//! b.end_loop(lp)?;
//! let out = b.get(i);
//! b.ret(out);
//! let graph = b.finish()?;
//!
//! let tree = LoopTree::build(&graph);
//! let counted = tree.loops()[0].counted.expect("counted loop");
//! assert_eq!(counted.stride, 1);
//! # Ok::<(), seaopt::Error>(())
//! ```

mod counted;
mod loops;

pub use counted::{iv_bounds, trip_count, CountedLoop};
pub use loops::{LoopExit, LoopInfo, LoopTree};
