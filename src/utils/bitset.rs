//! A growable bit vector keyed by dense indices.
//!
//! The linker keeps several per-symbol boolean side tables (instantiated types, preserved
//! symbols, processed bodies). Symbol ids are dense arena indices, so a bit vector is the
//! natural representation. The set grows on insertion because steps may add symbols to the
//! graph after the table was created.
//!
//! # Example
//!
//! ```rust,ignore
//! use dotlink::utils::BitSet;
//!
//! let mut set = BitSet::new();
//! set.insert(3);
//! set.insert(130);
//!
//! assert!(set.contains(130));
//! assert!(!set.contains(4000));
//! assert_eq!(set.iter().collect::<Vec<_>>(), vec![3, 130]);
//! ```

/// A growable set of small integers.
#[derive(Clone, Default, PartialEq, Eq, Hash)]
pub struct BitSet {
    words: Vec<u64>,
}

impl BitSet {
    /// Creates an empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty set with room for `capacity` indices.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            words: vec![0; capacity.div_ceil(64)],
        }
    }

    /// Returns `true` if no index is set.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.words.iter().all(|&w| w == 0)
    }

    /// Adds `index`, growing the storage when needed.
    ///
    /// Returns `true` if the index was not present before.
    pub fn insert(&mut self, index: usize) -> bool {
        let word = index / 64;
        if word >= self.words.len() {
            self.words.resize(word + 1, 0);
        }
        let mask = 1u64 << (index % 64);
        let fresh = self.words[word] & mask == 0;
        self.words[word] |= mask;
        fresh
    }

    /// Removes `index`. Returns `true` if it was present.
    pub fn remove(&mut self, index: usize) -> bool {
        let Some(word) = self.words.get_mut(index / 64) else {
            return false;
        };
        let mask = 1u64 << (index % 64);
        let present = *word & mask != 0;
        *word &= !mask;
        present
    }

    /// Returns `true` if `index` is set. Indices beyond the storage are absent.
    #[must_use]
    pub fn contains(&self, index: usize) -> bool {
        self.words
            .get(index / 64)
            .is_some_and(|word| word & (1u64 << (index % 64)) != 0)
    }

    /// Returns the number of set indices.
    #[must_use]
    pub fn count(&self) -> usize {
        self.words.iter().map(|w| w.count_ones() as usize).sum()
    }

    /// Removes all indices.
    pub fn clear(&mut self) {
        self.words.fill(0);
    }

    /// Returns an iterator over the set indices in ascending order.
    pub fn iter(&self) -> impl Iterator<Item = usize> + '_ {
        self.words
            .iter()
            .enumerate()
            .flat_map(|(word_idx, &word)| {
                (0..64)
                    .filter(move |bit| word & (1u64 << bit) != 0)
                    .map(move |bit| word_idx * 64 + bit)
            })
    }
}

impl std::fmt::Debug for BitSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bitset_grows() {
        let mut bs = BitSet::new();
        assert!(bs.is_empty());
        assert!(!bs.contains(1000));

        assert!(bs.insert(0));
        assert!(bs.insert(1000));
        assert!(!bs.insert(1000));

        assert_eq!(bs.count(), 2);
        assert!(bs.contains(1000));
    }

    #[test]
    fn test_bitset_remove() {
        let mut bs = BitSet::with_capacity(10);
        bs.insert(42);
        assert!(bs.remove(42));
        assert!(!bs.remove(42));
        assert!(!bs.remove(9999));
        assert!(bs.is_empty());
    }

    #[test]
    fn test_bitset_iter() {
        let mut bs = BitSet::new();
        bs.insert(99);
        bs.insert(5);
        bs.insert(64);

        let bits: Vec<_> = bs.iter().collect();
        assert_eq!(bits, vec![5, 64, 99]);

        bs.clear();
        assert_eq!(bs.iter().count(), 0);
    }
}
