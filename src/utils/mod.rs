//! Shared utilities: bit sets, widened arithmetic and DOT escaping.

mod bitset;
mod dot;
mod math;

pub use bitset::{BitSet, BitSetIter};
pub use dot::escape_dot;
pub use math::{ceil_div, covering_mask, fits_i32, is_power_of_two, narrow_i32};
