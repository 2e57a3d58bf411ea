//! Lattice elements attached to nodes.
//!
//! Every live node carries a [`Type`] that over-approximates the values it can
//! produce at runtime. Integer values are tracked as closed ranges over `i32`
//! ([`TypeInt`]); constants are single-element ranges.
//!
//! ```text
//!                 Top                    provably unreachable
//!      /       /      \         \
//!   int:c   int:lo..hi  Control  Memory
//!      \       \      /         /
//!                Bottom                  unconstrained
//! ```
//!
//! See [`crate::ir::lattice`] for `meet` (toward Bottom) and `join` (toward Top).

use std::fmt;

use crate::utils::narrow_i32;

/// A non-empty closed range of 32-bit signed integers.
///
/// # Examples
///
/// ```rust
/// use seaopt::ir::TypeInt;
///
/// let byte = TypeInt::new(0, 255).unwrap();
/// assert!(byte.contains(17));
/// assert!(byte.is_nonneg());
/// assert_eq!(TypeInt::con(4).get_con(), Some(4));
/// assert!(TypeInt::new(3, 1).is_none());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TypeInt {
    lo: i32,
    hi: i32,
}

impl TypeInt {
    /// Every 32-bit integer.
    pub const INT: Self = Self {
        lo: i32::MIN,
        hi: i32::MAX,
    };

    /// The result of a comparison: `0` or `1`.
    pub const BOOL: Self = Self { lo: 0, hi: 1 };

    /// The non-negative integers.
    pub const POS: Self = Self { lo: 0, hi: i32::MAX };

    /// Creates the range `[lo, hi]`, or `None` if it would be empty.
    #[must_use]
    pub fn new(lo: i32, hi: i32) -> Option<Self> {
        (lo <= hi).then_some(Self { lo, hi })
    }

    /// Creates the single-value range `[c, c]`.
    #[must_use]
    pub const fn con(c: i32) -> Self {
        Self { lo: c, hi: c }
    }

    /// Creates a range from widened bounds, falling back to [`TypeInt::INT`] when
    /// either bound does not fit in `i32`.
    #[must_use]
    pub fn from_wide(lo: i64, hi: i64) -> Self {
        match (narrow_i32(lo), narrow_i32(hi)) {
            (Some(lo), Some(hi)) if lo <= hi => Self { lo, hi },
            _ => Self::INT,
        }
    }

    /// Lower bound.
    #[must_use]
    pub const fn lo(&self) -> i32 {
        self.lo
    }

    /// Upper bound.
    #[must_use]
    pub const fn hi(&self) -> i32 {
        self.hi
    }

    /// Lower bound, widened.
    #[must_use]
    pub fn lo_wide(&self) -> i64 {
        i64::from(self.lo)
    }

    /// Upper bound, widened.
    #[must_use]
    pub fn hi_wide(&self) -> i64 {
        i64::from(self.hi)
    }

    /// Returns `true` if the range holds exactly one value.
    #[must_use]
    pub const fn is_con(&self) -> bool {
        self.lo == self.hi
    }

    /// Returns the value of a single-value range.
    #[must_use]
    pub const fn get_con(&self) -> Option<i32> {
        if self.lo == self.hi {
            Some(self.lo)
        } else {
            None
        }
    }

    /// Returns `true` if `value` lies inside the range.
    #[must_use]
    pub const fn contains(&self, value: i32) -> bool {
        self.lo <= value && value <= self.hi
    }

    /// Returns `true` if every value of `self` is also in `other`.
    #[must_use]
    pub const fn is_subset_of(&self, other: &Self) -> bool {
        other.lo <= self.lo && self.hi <= other.hi
    }

    /// Returns `true` if the range contains no negative value.
    #[must_use]
    pub const fn is_nonneg(&self) -> bool {
        self.lo >= 0
    }

    /// Returns `true` if zero is not in the range.
    #[must_use]
    pub const fn excludes_zero(&self) -> bool {
        self.lo > 0 || self.hi < 0
    }

    /// Smallest range containing both operands.
    #[must_use]
    pub fn hull(&self, other: &Self) -> Self {
        Self {
            lo: self.lo.min(other.lo),
            hi: self.hi.max(other.hi),
        }
    }

    /// Intersection of both operands, `None` if they are disjoint.
    #[must_use]
    pub fn intersect(&self, other: &Self) -> Option<Self> {
        Self::new(self.lo.max(other.lo), self.hi.min(other.hi))
    }

    /// Rounds a range outward onto a fixed set of bounds.
    ///
    /// Loop phis only ever hold widened ranges. The set of widened ranges is finite,
    /// so narrowing a cycle through a loop phi terminates after a bounded number of
    /// steps instead of creeping one value per iteration.
    #[must_use]
    pub fn widen(&self) -> Self {
        const STOPS: [i32; 5] = [i32::MIN, -1, 0, 1, i32::MAX];
        if self.is_con() {
            return *self;
        }
        let lo = STOPS
            .iter()
            .rev()
            .copied()
            .find(|&s| s <= self.lo)
            .unwrap_or(i32::MIN);
        let hi = STOPS
            .iter()
            .copied()
            .find(|&s| s >= self.hi)
            .unwrap_or(i32::MAX);
        Self { lo, hi }
    }
}

impl fmt::Display for TypeInt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if *self == Self::INT {
            write!(f, "int")
        } else if *self == Self::BOOL {
            write!(f, "bool")
        } else if self.is_con() {
            write!(f, "int:{}", self.lo)
        } else {
            write!(f, "int:{}..{}", self.lo, self.hi)
        }
    }
}

/// A lattice element describing the values a node may produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Type {
    /// No value at all: the node is on a provably unreachable path.
    Top,
    /// An integer within a range.
    Int(TypeInt),
    /// A live control path.
    Control,
    /// A memory state.
    Memory,
    /// Anything: mixes of incompatible kinds.
    Bottom,
}

impl Type {
    /// Every 32-bit integer.
    pub const INT: Self = Self::Int(TypeInt::INT);

    /// `0` or `1`.
    pub const BOOL: Self = Self::Int(TypeInt::BOOL);

    /// A single integer constant.
    #[must_use]
    pub const fn con(c: i32) -> Self {
        Self::Int(TypeInt::con(c))
    }

    /// Returns `true` for the unreachable element.
    #[must_use]
    pub const fn is_top(&self) -> bool {
        matches!(self, Self::Top)
    }

    /// Returns the integer range, if this is an integer type.
    #[must_use]
    pub const fn as_int(&self) -> Option<TypeInt> {
        match self {
            Self::Int(t) => Some(*t),
            _ => None,
        }
    }

    /// Returns the constant value, if this is a single integer.
    #[must_use]
    pub const fn get_con(&self) -> Option<i32> {
        match self {
            Self::Int(t) => t.get_con(),
            _ => None,
        }
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Top => write!(f, "top"),
            Self::Int(t) => write!(f, "{t}"),
            Self::Control => write!(f, "control"),
            Self::Memory => write!(f, "memory"),
            Self::Bottom => write!(f, "bottom"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_typeint_construction() {
        assert!(TypeInt::new(1, 0).is_none());
        assert_eq!(TypeInt::new(2, 2), Some(TypeInt::con(2)));
        assert_eq!(TypeInt::from_wide(-1, 1 << 40), TypeInt::INT);
        assert_eq!(TypeInt::from_wide(-1, 3), TypeInt::new(-1, 3).unwrap());
    }

    #[test]
    fn test_typeint_set_ops() {
        let a = TypeInt::new(0, 10).unwrap();
        let b = TypeInt::new(5, 20).unwrap();
        assert_eq!(a.hull(&b), TypeInt::new(0, 20).unwrap());
        assert_eq!(a.intersect(&b), TypeInt::new(5, 10));
        assert_eq!(a.intersect(&TypeInt::con(11)), None);
        assert!(TypeInt::con(3).is_subset_of(&a));
        assert!(!b.is_subset_of(&a));
    }

    #[test]
    fn test_typeint_widen() {
        assert_eq!(TypeInt::new(3, 100).unwrap().widen(), TypeInt::new(1, i32::MAX).unwrap());
        assert_eq!(TypeInt::new(-5, 0).unwrap().widen(), TypeInt::new(i32::MIN, 0).unwrap());
        assert_eq!(TypeInt::new(0, 1).unwrap().widen(), TypeInt::BOOL);
        assert_eq!(TypeInt::con(42).widen(), TypeInt::con(42));
        // Widening is idempotent.
        let w = TypeInt::new(-3, 7).unwrap().widen();
        assert_eq!(w.widen(), w);
    }

    #[test]
    fn test_type_display() {
        assert_eq!(Type::INT.to_string(), "int");
        assert_eq!(Type::BOOL.to_string(), "bool");
        assert_eq!(Type::con(-3).to_string(), "int:-3");
        assert_eq!(Type::Int(TypeInt::new(0, 9).unwrap()).to_string(), "int:0..9");
        assert_eq!(Type::Top.to_string(), "top");
    }
}
