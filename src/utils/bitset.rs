//! A growable bit vector keyed by node index.
//!
//! Used wherever the optimizer tracks a set of nodes: worklist membership,
//! reachability marks during sweeps and visited sets in graph walks. Node ids are
//! dense arena indices, so a bit per node is far cheaper than a hash set.
//!
//! # Example
//!
//! ```rust
//! use seaopt::utils::BitSet;
//!
//! let mut set = BitSet::new(100);
//! set.insert(0);
//! set.insert(50);
//! set.grow(200);
//! set.insert(199);
//!
//! assert!(set.contains(50));
//! assert_eq!(set.count(), 3);
//! assert_eq!(set.iter().collect::<Vec<_>>(), vec![0, 50, 199]);
//! ```

/// A bit vector for efficient set operations over small integers.
#[derive(Clone, PartialEq, Eq, Hash, Default)]
pub struct BitSet {
    /// The bits, stored as a vector of words.
    words: Vec<u64>,
    /// The number of bits in the set.
    len: usize,
}

impl BitSet {
    /// Creates a new empty bit set with the given capacity.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let num_words = capacity.div_ceil(64);
        Self {
            words: vec![0; num_words],
            len: capacity,
        }
    }

    /// Returns the capacity of this bit set.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.len
    }

    /// Returns `true` if the bit set has no bits set.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.words.iter().all(|&w| w == 0)
    }

    /// Extends the capacity to at least `capacity` bits. Existing bits are kept.
    pub fn grow(&mut self, capacity: usize) {
        if capacity <= self.len {
            return;
        }
        self.words.resize(capacity.div_ceil(64), 0);
        self.len = capacity;
    }

    /// Sets the bit at the given index.
    ///
    /// Returns `true` if the bit was not set before.
    ///
    /// # Panics
    ///
    /// Panics if `index >= self.len()`.
    pub fn insert(&mut self, index: usize) -> bool {
        assert!(index < self.len, "index out of bounds");
        let word = index / 64;
        let mask = 1u64 << (index % 64);
        let was_set = self.words[word] & mask != 0;
        self.words[word] |= mask;
        !was_set
    }

    /// Clears the bit at the given index.
    ///
    /// Returns `true` if the bit was set before. Indices beyond the capacity are
    /// never set, so removing them is a no-op.
    pub fn remove(&mut self, index: usize) -> bool {
        if index >= self.len {
            return false;
        }
        let word = index / 64;
        let mask = 1u64 << (index % 64);
        let was_set = self.words[word] & mask != 0;
        self.words[word] &= !mask;
        was_set
    }

    /// Returns `true` if the bit at the given index is set.
    ///
    /// Indices beyond the capacity are reported as not set.
    #[must_use]
    pub fn contains(&self, index: usize) -> bool {
        if index >= self.len {
            return false;
        }
        (self.words[index / 64] & (1u64 << (index % 64))) != 0
    }

    /// Returns the number of bits set.
    #[must_use]
    pub fn count(&self) -> usize {
        self.words.iter().map(|w| w.count_ones() as usize).sum()
    }

    /// Clears all bits.
    pub fn clear(&mut self) {
        for word in &mut self.words {
            *word = 0;
        }
    }

    /// Returns an iterator over the indices of set bits, in ascending order.
    pub fn iter(&self) -> BitSetIter<'_> {
        BitSetIter {
            set: self,
            word_idx: 0,
            bit_idx: 0,
        }
    }
}

impl std::fmt::Debug for BitSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}

/// Iterator over the set bits in a `BitSet`.
pub struct BitSetIter<'a> {
    set: &'a BitSet,
    word_idx: usize,
    bit_idx: usize,
}

impl Iterator for BitSetIter<'_> {
    type Item = usize;

    fn next(&mut self) -> Option<Self::Item> {
        while self.word_idx < self.set.words.len() {
            let word = self.set.words[self.word_idx];
            while self.bit_idx < 64 {
                let idx = self.word_idx * 64 + self.bit_idx;
                if idx >= self.set.len {
                    return None;
                }
                self.bit_idx += 1;
                if (word & (1u64 << (self.bit_idx - 1))) != 0 {
                    return Some(idx);
                }
            }
            self.word_idx += 1;
            self.bit_idx = 0;
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bitset_basic() {
        let mut bs = BitSet::new(100);
        assert!(bs.is_empty());
        assert_eq!(bs.count(), 0);

        assert!(bs.insert(0));
        assert!(bs.insert(50));
        assert!(bs.insert(99));
        assert!(!bs.insert(50));

        assert!(!bs.is_empty());
        assert_eq!(bs.count(), 3);
        assert!(bs.contains(0));
        assert!(bs.contains(50));
        assert!(bs.contains(99));
        assert!(!bs.contains(1));
    }

    #[test]
    fn test_bitset_remove() {
        let mut bs = BitSet::new(100);
        bs.insert(42);
        assert!(bs.remove(42));
        assert!(!bs.contains(42));
        assert!(!bs.remove(42));
        assert!(!bs.remove(1000));
    }

    #[test]
    fn test_bitset_grow_keeps_bits() {
        let mut bs = BitSet::new(10);
        bs.insert(3);
        assert!(!bs.contains(500));

        bs.grow(1000);
        assert_eq!(bs.len(), 1000);
        assert!(bs.contains(3));
        bs.insert(999);
        assert_eq!(bs.count(), 2);

        // Shrinking requests are ignored.
        bs.grow(5);
        assert_eq!(bs.len(), 1000);
    }

    #[test]
    fn test_bitset_iter() {
        let mut bs = BitSet::new(130);
        bs.insert(5);
        bs.insert(64);
        bs.insert(129);

        let bits: Vec<_> = bs.iter().collect();
        assert_eq!(bits, vec![5, 64, 129]);
    }

    #[test]
    fn test_bitset_clear() {
        let mut bs = BitSet::new(100);
        bs.insert(50);
        bs.clear();
        assert!(bs.is_empty());
        assert_eq!(format!("{bs:?}"), "{}");
    }
}
