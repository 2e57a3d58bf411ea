//! Memory locations and alias classes.
//!
//! Memory is partitioned into alias classes computed from the static type of the
//! accessed address. Two accesses in different narrow classes never interfere, so
//! each class can carry its own memory chain:
//!
//! - every field (`holder`, `field`) gets a class of its own
//! - all integer arrays share one class
//! - accesses whose address type is unknown are *opaque* and use the Bottom class,
//!   which stands for all of memory
//!
//! A [`Location`] is the runtime identity of a family of cells; the cell itself is
//! the location plus an integer index (always `0` for fields).

use std::fmt;

use rustc_hash::FxHashMap;

/// An alias class. Index `0` is the Bottom class covering all memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AliasIdx(u32);

impl AliasIdx {
    /// The catch-all class.
    pub const BOTTOM: Self = Self(0);

    /// Creates an alias index from its raw value.
    #[must_use]
    pub const fn new(raw: u32) -> Self {
        Self(raw)
    }

    /// Returns the raw index.
    #[must_use]
    pub const fn index(&self) -> u32 {
        self.0
    }

    /// Returns `true` for the catch-all class.
    #[must_use]
    pub const fn is_bottom(&self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for AliasIdx {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_bottom() {
            write!(f, "mem#bot")
        } else {
            write!(f, "mem#{}", self.0)
        }
    }
}

/// The runtime identity of a family of memory cells.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Location {
    /// An instance or static field.
    Field {
        /// Declaring holder id
        holder: u32,
        /// Field id within the holder
        field: u32,
    },
    /// An integer array.
    Array(u32),
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Field { holder, field } => write!(f, "f{holder}.{field}"),
            Self::Array(id) => write!(f, "a{id}"),
        }
    }
}

/// What a load or store touches: the location family and the alias class of the
/// memory chain it lives on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MemAccess {
    /// Accessed location family
    pub location: Location,
    /// Alias class of the access
    pub alias: AliasIdx,
}

impl fmt::Display for MemAccess {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.location, self.alias)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum AliasKey {
    Field { holder: u32, field: u32 },
    IntArray,
}

impl From<Location> for AliasKey {
    fn from(location: Location) -> Self {
        match location {
            Location::Field { holder, field } => Self::Field { holder, field },
            Location::Array(_) => Self::IntArray,
        }
    }
}

/// Allocates and remembers alias classes.
///
/// # Examples
///
/// ```rust
/// use seaopt::ir::{AliasIdx, AliasTable, Location};
///
/// let mut table = AliasTable::new();
/// let f = table.classify(Location::Field { holder: 1, field: 0 });
/// let a = table.classify(Location::Array(7));
/// let b = table.classify(Location::Array(9));
///
/// assert_ne!(f, a);
/// assert_eq!(a, b); // integer arrays share a class
/// assert_eq!(table.access(Location::Array(7), true).alias, AliasIdx::BOTTOM);
/// ```
#[derive(Debug, Clone, Default)]
pub struct AliasTable {
    classes: FxHashMap<AliasKey, AliasIdx>,
    next: u32,
}

impl AliasTable {
    /// Creates a table that only knows the Bottom class.
    #[must_use]
    pub fn new() -> Self {
        Self {
            classes: FxHashMap::default(),
            next: 1,
        }
    }

    /// Returns the narrow class of `location`, allocating it on first use.
    pub fn classify(&mut self, location: Location) -> AliasIdx {
        let next = &mut self.next;
        *self.classes.entry(location.into()).or_insert_with(|| {
            let idx = AliasIdx(*next);
            *next += 1;
            idx
        })
    }

    /// Describes an access to `location`. Opaque accesses use the Bottom class but
    /// still register the location's narrow class.
    pub fn access(&mut self, location: Location, opaque: bool) -> MemAccess {
        let narrow = self.classify(location);
        MemAccess {
            location,
            alias: if opaque { AliasIdx::BOTTOM } else { narrow },
        }
    }

    /// Returns the narrow class of `location` without allocating; Bottom when the
    /// location was never classified.
    #[must_use]
    pub fn class_of(&self, location: Location) -> AliasIdx {
        self.classes
            .get(&location.into())
            .copied()
            .unwrap_or(AliasIdx::BOTTOM)
    }

    /// Number of classes including Bottom.
    #[must_use]
    pub fn len(&self) -> usize {
        self.next as usize
    }

    /// Returns `true` if only the Bottom class exists.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.next <= 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fields_get_distinct_classes() {
        let mut table = AliasTable::new();
        let a = table.classify(Location::Field { holder: 1, field: 0 });
        let b = table.classify(Location::Field { holder: 1, field: 1 });
        let c = table.classify(Location::Field { holder: 2, field: 0 });
        assert_ne!(a, b);
        assert_ne!(a, c);
        assert_ne!(b, c);
        assert_eq!(table.classify(Location::Field { holder: 1, field: 0 }), a);
        assert_eq!(table.len(), 4);
    }

    #[test]
    fn test_class_of_unknown_is_bottom() {
        let table = AliasTable::new();
        assert!(table.is_empty());
        assert_eq!(table.class_of(Location::Array(0)), AliasIdx::BOTTOM);
    }

    #[test]
    fn test_opaque_access_registers_class() {
        let mut table = AliasTable::new();
        let access = table.access(Location::Array(3), true);
        assert!(access.alias.is_bottom());
        assert!(!table.class_of(Location::Array(3)).is_bottom());
    }

    #[test]
    fn test_display() {
        assert_eq!(AliasIdx::BOTTOM.to_string(), "mem#bot");
        assert_eq!(AliasIdx::new(3).to_string(), "mem#3");
        assert_eq!(Location::Array(2).to_string(), "a2");
        assert_eq!(Location::Field { holder: 1, field: 4 }.to_string(), "f1.4");
    }
}
