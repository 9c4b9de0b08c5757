//! Storage for sampled agree-sets.
//!
//! The sampler produces agree-sets faster than the inductor wants to consume
//! them, and most comparisons rediscover sets that are already known. The
//! [`AllColumnCombinations`] store deduplicates on insertion and remembers
//! which sets are new since the last hand-off; [`ColumnCombinationList`]
//! buckets a batch by popcount so the inductor can process the most specific
//! sets first.

use crate::bitset::AttributeSet;
use std::collections::HashSet;

/// A batch of column combinations, leveled by set size.
pub struct ColumnCombinationList {
    levels: Vec<Vec<AttributeSet>>,
}

impl ColumnCombinationList {
    /// Creates an empty list over the given universe size.
    pub fn new(attributes: usize) -> Self {
        ColumnCombinationList {
            levels: (0..=attributes).map(|_| Vec::new()).collect(),
        }
    }

    /// Adds one combination to its popcount bucket.
    pub fn add(&mut self, combination: AttributeSet) {
        let level = combination.count();
        self.levels[level].push(combination);
    }

    /// The deepest level, i.e. the universe size.
    pub fn depth(&self) -> usize {
        self.levels.len() - 1
    }

    /// The combinations with exactly `level` attributes.
    pub fn level(&self, level: usize) -> &[AttributeSet] {
        &self.levels[level]
    }

    /// Total number of combinations across all levels.
    pub fn len(&self) -> usize {
        self.levels.iter().map(Vec::len).sum()
    }

    /// Returns `true` if no combination is stored.
    pub fn is_empty(&self) -> bool {
        self.levels.iter().all(Vec::is_empty)
    }
}

/// Deduplicated store of every agree-set seen so far.
pub struct AllColumnCombinations {
    attributes: usize,
    seen: HashSet<AttributeSet>,
    fresh: Vec<AttributeSet>,
}

impl AllColumnCombinations {
    /// Creates an empty store over the given universe size.
    pub fn new(attributes: usize) -> Self {
        AllColumnCombinations {
            attributes,
            seen: HashSet::new(),
            fresh: Vec::new(),
        }
    }

    /// Inserts a combination. Returns `true` if it was not already known.
    pub fn add(&mut self, combination: AttributeSet) -> bool {
        if self.seen.contains(&combination) {
            return false;
        }
        self.seen.insert(combination.clone());
        self.fresh.push(combination);
        true
    }

    /// Returns `true` if the combination has been inserted before.
    pub fn contains(&self, combination: &AttributeSet) -> bool {
        self.seen.contains(combination)
    }

    /// Number of distinct combinations ever inserted.
    pub fn count(&self) -> usize {
        self.seen.len()
    }

    /// Hands off everything inserted since the previous call, leveled by
    /// popcount. Insertion order within a level is preserved.
    pub fn take_new(&mut self) -> ColumnCombinationList {
        let mut list = ColumnCombinationList::new(self.attributes);
        for combination in self.fresh.drain(..) {
            list.add(combination);
        }
        list
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(attributes: usize, bits: &[usize]) -> AttributeSet {
        let mut s = AttributeSet::empty(attributes);
        for &bit in bits {
            s.set(bit);
        }
        s
    }

    #[test]
    fn insert_if_new() {
        let mut store = AllColumnCombinations::new(4);
        assert!(store.add(set(4, &[0, 2])));
        assert!(!store.add(set(4, &[0, 2])));
        assert_eq!(store.count(), 1);
    }

    #[test]
    fn take_new_drains_only_fresh_sets() {
        let mut store = AllColumnCombinations::new(4);
        store.add(set(4, &[0]));
        let first = store.take_new();
        assert_eq!(first.len(), 1);
        assert_eq!(first.level(1).len(), 1);

        store.add(set(4, &[0]));
        store.add(set(4, &[1, 2, 3]));
        let second = store.take_new();
        assert_eq!(second.len(), 1);
        assert_eq!(second.level(3).len(), 1);
        assert!(store.take_new().is_empty());
    }
}
