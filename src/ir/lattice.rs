//! Lattice traits and their implementation for [`Type`].
//!
//! The type lattice follows the usual orientation of a sea-of-nodes optimizer:
//!
//! - **Top (⊤)**: no value, the node is unreachable
//! - **Bottom (⊥)**: any value
//! - **Meet (∧)**: moves toward Bottom; used where control flow merges (phis)
//! - **Join (∨)**: moves toward Top; used to narrow a node's type, since both the
//!   old and the newly computed type are sound descriptions of the same value
//!
//! Integer ranges meet by taking their hull and join by intersecting them; an
//! empty intersection is Top.

use std::fmt::Debug;

use crate::ir::types::Type;

/// A meet semi-lattice with a meet (greatest lower bound) operation.
///
/// The meet operation combines information from multiple control flow paths.
/// It must satisfy:
///
/// - **Idempotent**: `x.meet(x) = x`
/// - **Commutative**: `x.meet(y) = y.meet(x)`
/// - **Associative**: `x.meet(y.meet(z)) = (x.meet(y)).meet(z)`
pub trait MeetSemiLattice: Clone + Debug + PartialEq {
    /// Computes the meet (greatest lower bound) of two lattice elements.
    #[must_use]
    fn meet(&self, other: &Self) -> Self;

    /// Returns `true` if this is the bottom element.
    ///
    /// Once bottom is reached, further meets cannot change the value.
    fn is_bottom(&self) -> bool;
}

/// A join semi-lattice with a join (least upper bound) operation.
///
/// It must satisfy:
///
/// - **Idempotent**: `x.join(x) = x`
/// - **Commutative**: `x.join(y) = y.join(x)`
/// - **Associative**: `x.join(y.join(z)) = (x.join(y)).join(z)`
pub trait JoinSemiLattice: Clone + Debug + PartialEq {
    /// Computes the join (least upper bound) of two lattice elements.
    #[must_use]
    fn join(&self, other: &Self) -> Self;

    /// Returns `true` if this is the top element.
    ///
    /// It is the identity for meet: `x.meet(top) = x`.
    fn is_top(&self) -> bool;
}

/// A complete lattice with both meet and join operations.
///
/// # Required Properties
///
/// - All properties of `MeetSemiLattice` and `JoinSemiLattice`
/// - **Absorption**: `x.meet(x.join(y)) = x` and `x.join(x.meet(y)) = x`
pub trait Lattice: MeetSemiLattice + JoinSemiLattice {
    /// Returns the top (⊤) element of the lattice.
    fn top() -> Self;

    /// Returns the bottom (⊥) element of the lattice.
    fn bottom() -> Self;
}

impl MeetSemiLattice for Type {
    fn meet(&self, other: &Self) -> Self {
        match (self, other) {
            (Self::Top, x) | (x, Self::Top) => *x,
            (Self::Int(a), Self::Int(b)) => Self::Int(a.hull(b)),
            (Self::Control, Self::Control) => Self::Control,
            (Self::Memory, Self::Memory) => Self::Memory,
            _ => Self::Bottom,
        }
    }

    fn is_bottom(&self) -> bool {
        matches!(self, Self::Bottom)
    }
}

impl JoinSemiLattice for Type {
    fn join(&self, other: &Self) -> Self {
        match (self, other) {
            (Self::Bottom, x) | (x, Self::Bottom) => *x,
            (Self::Int(a), Self::Int(b)) => a.intersect(b).map_or(Self::Top, Self::Int),
            (Self::Control, Self::Control) => Self::Control,
            (Self::Memory, Self::Memory) => Self::Memory,
            _ => Self::Top,
        }
    }

    fn is_top(&self) -> bool {
        matches!(self, Self::Top)
    }
}

impl Lattice for Type {
    fn top() -> Self {
        Self::Top
    }

    fn bottom() -> Self {
        Self::Bottom
    }
}

/// Returns `true` if `narrow` is at least as precise as `wide`, i.e. `narrow`
/// lies between `wide` and Top.
#[must_use]
pub fn is_narrower_or_equal(narrow: &Type, wide: &Type) -> bool {
    narrow.join(wide) == *narrow
}

/// Meet over an iterator; the meet of nothing is Top.
#[must_use]
pub fn meet_all<I: IntoIterator<Item = Type>>(types: I) -> Type {
    types.into_iter().fold(Type::Top, |acc, t| acc.meet(&t))
}
