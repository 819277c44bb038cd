/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Associative container kept sorted by a numeric rank.
//!
//! The capacity ledger answers "find me a node with at least X spare
//! capacity, optionally skipping the first K matches" on every dispatch.
//! That query is a binary search over an array kept sorted by rank, with a
//! key → position map for O(1) lookup.  Insertion shifts array positions,
//! which is acceptable because fleets are small (tens of nodes, not
//! millions).
//!
//! Rank ties are broken by insertion position; `find_next` is only required
//! to return *a* smallest-ranked match at or above the threshold.

use std::collections::HashMap;

use super::keyed_heap::{DuplicateKey, KeyedEntry};

/// An element with a unique key and a numeric rank to sort by.
pub trait RankedEntry: KeyedEntry {
    fn rank(&self) -> f64;
}

/// Array kept sorted by [`RankedEntry::rank`], with O(1) lookup by key.
#[derive(Debug)]
pub struct ValueSortedIndex<T: RankedEntry> {
    // Sorted ascending by rank
    items: Vec<T>,
    positions: HashMap<T::Key, usize>,
}

impl<T: RankedEntry> ValueSortedIndex<T> {
    pub fn new() -> Self {
        Self {
            items: Vec::new(),
            positions: HashMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Insert a new element at its sorted position.
    ///
    /// # Errors
    /// [`DuplicateKey`] if the key is already present; the index is left
    /// unchanged.
    pub fn insert(&mut self, item: T) -> Result<(), DuplicateKey<T::Key>> {
        let key = item.key();
        if self.positions.contains_key(&key) {
            return Err(DuplicateKey { key });
        }
        let pos = self.partition_point(item.rank());
        self.items.insert(pos, item);
        self.reindex_from(pos);
        Ok(())
    }

    /// Borrow the element with `key`.
    pub fn get(&self, key: &T::Key) -> Option<&T> {
        self.positions.get(key).map(|&p| &self.items[p])
    }

    /// Mutate the element with `key` through `f`, then restore sort order.
    ///
    /// The closure may change the rank; afterwards the element is moved to
    /// its new sorted position.  Returns `None` if the key is absent,
    /// otherwise the closure's result.
    pub fn update<R>(&mut self, key: &T::Key, f: impl FnOnce(&mut T) -> R) -> Option<R> {
        let pos = *self.positions.get(key)?;
        let out = f(&mut self.items[pos]);
        let item = self.items.remove(pos);
        let new_pos = self.partition_point(item.rank());
        self.items.insert(new_pos, item);
        self.reindex_from(pos.min(new_pos));
        Some(out)
    }

    /// Remove and return the element with `key`.
    pub fn remove_by_key(&mut self, key: &T::Key) -> Option<T> {
        let pos = self.positions.remove(key)?;
        let item = self.items.remove(pos);
        self.reindex_from(pos);
        Some(item)
    }

    /// Smallest-ranked element with `rank ≥ threshold`, after skipping
    /// `skip` further qualifying elements.
    ///
    /// Used to pick the Nth-best node when the best one is reserved by
    /// something else.  Returns `None` when fewer than `skip + 1` elements
    /// qualify.
    pub fn find_next(&self, threshold: f64, skip: usize) -> Option<&T> {
        let first = self.items.partition_point(|it| it.rank() < threshold);
        self.items.get(first + skip)
    }

    /// All elements in ascending rank order.
    pub fn to_vec(&self) -> Vec<&T> {
        self.items.iter().collect()
    }

    /// Iterate in ascending rank order.
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.items.iter()
    }

    // ── Internals ─────────────────────────────────────────────────────────────

    /// First position whose rank is ≥ `rank` (binary search).
    fn partition_point(&self, rank: f64) -> usize {
        self.items.partition_point(|it| it.rank() < rank)
    }

    /// Rebuild the position map from `from` to the end after a shift.
    fn reindex_from(&mut self, from: usize) {
        for (pos, item) in self.items.iter().enumerate().skip(from) {
            self.positions.insert(item.key(), pos);
        }
    }
}

impl<T: RankedEntry> Default for ValueSortedIndex<T> {
    fn default() -> Self {
        Self::new()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    struct Node {
        name: &'static str,
        available: f64,
    }

    impl KeyedEntry for Node {
        type Key = &'static str;
        fn key(&self) -> &'static str {
            self.name
        }
    }

    impl RankedEntry for Node {
        fn rank(&self) -> f64 {
            self.available
        }
    }

    fn node(name: &'static str, available: f64) -> Node {
        Node { name, available }
    }

    fn three_node_index() -> ValueSortedIndex<Node> {
        let mut idx = ValueSortedIndex::new();
        idx.insert(node("alpha", 30.0)).unwrap();
        idx.insert(node("beta", 80.0)).unwrap();
        idx.insert(node("gamma", 55.0)).unwrap();
        idx
    }

    #[test]
    fn iteration_is_rank_ascending() {
        let idx = three_node_index();
        let names: Vec<_> = idx.iter().map(|n| n.name).collect();
        assert_eq!(names, vec!["alpha", "gamma", "beta"]);
    }

    #[test]
    fn get_by_key_after_inserts() {
        let idx = three_node_index();
        assert_eq!(idx.get(&"gamma").unwrap().available, 55.0);
        assert!(idx.get(&"delta").is_none());
    }

    #[test]
    fn duplicate_key_rejected_and_index_unchanged() {
        let mut idx = three_node_index();
        let err = idx.insert(node("beta", 1.0)).unwrap_err();
        assert_eq!(err.key, "beta");
        assert_eq!(idx.len(), 3);
        assert_eq!(idx.get(&"beta").unwrap().available, 80.0);
    }

    #[test]
    fn find_next_picks_smallest_sufficient() {
        let idx = three_node_index();
        // Smallest node with ≥ 50 available is gamma (55), not beta (80)
        assert_eq!(idx.find_next(50.0, 0).unwrap().name, "gamma");
        // Skipping one qualifying node lands on beta
        assert_eq!(idx.find_next(50.0, 1).unwrap().name, "beta");
        // Skipping past the end yields nothing
        assert!(idx.find_next(50.0, 2).is_none());
        // Threshold above every node yields nothing
        assert!(idx.find_next(100.0, 0).is_none());
    }

    #[test]
    fn update_resorts_changed_rank() {
        let mut idx = three_node_index();
        // Drain alpha's availability below everyone, then bump it above
        idx.update(&"beta", |n| n.available = 10.0).unwrap();
        let names: Vec<_> = idx.iter().map(|n| n.name).collect();
        assert_eq!(names, vec!["beta", "alpha", "gamma"]);

        idx.update(&"beta", |n| n.available = 99.0).unwrap();
        let names: Vec<_> = idx.iter().map(|n| n.name).collect();
        assert_eq!(names, vec!["alpha", "gamma", "beta"]);

        // Lookup by key still lands on the right element after both moves
        assert_eq!(idx.get(&"beta").unwrap().available, 99.0);
        assert_eq!(idx.get(&"alpha").unwrap().available, 30.0);
    }

    #[test]
    fn update_missing_key_returns_none() {
        let mut idx = three_node_index();
        assert!(idx.update(&"delta", |n| n.available = 0.0).is_none());
    }

    #[test]
    fn remove_by_key_shifts_positions() {
        let mut idx = three_node_index();
        let removed = idx.remove_by_key(&"gamma").unwrap();
        assert_eq!(removed.available, 55.0);
        assert_eq!(idx.len(), 2);
        // Remaining keys still resolve correctly after the shift
        assert_eq!(idx.get(&"alpha").unwrap().available, 30.0);
        assert_eq!(idx.get(&"beta").unwrap().available, 80.0);
        assert_eq!(idx.find_next(0.0, 0).unwrap().name, "alpha");
    }

    #[test]
    fn round_trip_through_to_vec_preserves_queries() {
        let idx = three_node_index();
        let snapshot: Vec<Node> = idx.to_vec().into_iter().cloned().collect();

        let mut restored = ValueSortedIndex::new();
        for n in snapshot {
            restored.insert(n).unwrap();
        }

        let a: Vec<_> = idx.iter().map(|n| (n.name, n.available)).collect();
        let b: Vec<_> = restored.iter().map(|n| (n.name, n.available)).collect();
        assert_eq!(a, b);

        for threshold in [0.0, 30.0, 31.0, 55.0, 56.0, 80.0, 81.0] {
            for skip in 0..4 {
                assert_eq!(
                    idx.find_next(threshold, skip).map(|n| n.name),
                    restored.find_next(threshold, skip).map(|n| n.name),
                    "diverged at threshold {threshold} skip {skip}"
                );
            }
        }
    }

    #[test]
    fn equal_ranks_are_all_reachable_via_skip() {
        let mut idx = ValueSortedIndex::new();
        idx.insert(node("a", 40.0)).unwrap();
        idx.insert(node("b", 40.0)).unwrap();
        idx.insert(node("c", 40.0)).unwrap();

        let mut seen: Vec<_> = (0..3)
            .map(|skip| idx.find_next(40.0, skip).unwrap().name)
            .collect();
        seen.sort_unstable();
        assert_eq!(seen, vec!["a", "b", "c"]);
    }
}
