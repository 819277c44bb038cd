/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Min-heap with O(log n) removal by key.
//!
//! The capacity ledger tracks in-flight jobs ordered by deadline, but a job
//! can also be cancelled out of the middle of the heap (hard kill, target
//! switch).  A plain heap would need an O(n) scan plus a rebuild; this one
//! keeps a key → slot-index map consistent across every swap, so removal is
//! a swap-with-last followed by a local re-heapify.
//!
//! Duplicate keys are a programming error, not a recoverable condition:
//! `insert` fails fast with [`DuplicateKey`] and leaves the heap untouched.

use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;

use thiserror::Error;

// ── Traits / errors ───────────────────────────────────────────────────────────

/// An element that carries its own unique key.
pub trait KeyedEntry {
    type Key: Eq + Hash + Clone + fmt::Debug;

    fn key(&self) -> Self::Key;
}

/// Returned when inserting an element whose key is already present.
///
/// The structure is left exactly as it was before the call.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("duplicate key {key:?}")]
pub struct DuplicateKey<K: fmt::Debug> {
    pub key: K,
}

// ── KeyedMinHeap ──────────────────────────────────────────────────────────────

/// Min-heap ordered by `T: Ord`, additionally indexed by `T::Key`.
///
/// Every swap inside the heap updates the index map, so `remove_by_key` is
/// O(log n) rather than a scan-and-rebuild.
#[derive(Debug)]
pub struct KeyedMinHeap<T: KeyedEntry + Ord> {
    items: Vec<T>,
    index: HashMap<T::Key, usize>,
}

impl<T: KeyedEntry + Ord> KeyedMinHeap<T> {
    pub fn new() -> Self {
        Self {
            items: Vec::new(),
            index: HashMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Returns `true` if an element with `key` is present.
    pub fn contains(&self, key: &T::Key) -> bool {
        self.index.contains_key(key)
    }

    /// Insert an element, O(log n).
    ///
    /// # Errors
    /// [`DuplicateKey`] if an element with the same key is already stored;
    /// the heap is left unchanged.
    pub fn insert(&mut self, item: T) -> Result<(), DuplicateKey<T::Key>> {
        let key = item.key();
        if self.index.contains_key(&key) {
            return Err(DuplicateKey { key });
        }
        let idx = self.items.len();
        self.items.push(item);
        self.index.insert(key, idx);
        self.sift_up(idx);
        Ok(())
    }

    /// Remove and return the minimum element.
    pub fn pop(&mut self) -> Option<T> {
        if self.items.is_empty() {
            return None;
        }
        self.remove_at(0)
    }

    /// Borrow the minimum element without removing it.
    pub fn peek(&self) -> Option<&T> {
        self.items.first()
    }

    /// Remove the element with `key`, O(log n).  Returns `None` if absent.
    pub fn remove_by_key(&mut self, key: &T::Key) -> Option<T> {
        let idx = *self.index.get(key)?;
        self.remove_at(idx)
    }

    /// Snapshot of all elements in arbitrary (heap) order.
    pub fn to_vec(&self) -> Vec<&T> {
        self.items.iter().collect()
    }

    // ── Internals ─────────────────────────────────────────────────────────────

    /// Remove the element at `idx`: swap with the last slot, then restore the
    /// heap property locally (the displaced element may need to move either
    /// direction).
    fn remove_at(&mut self, idx: usize) -> Option<T> {
        let last = self.items.len() - 1;
        self.swap(idx, last);
        let removed = self.items.pop()?;
        self.index.remove(&removed.key());
        if idx < self.items.len() {
            self.sift_up(idx);
            self.sift_down(idx);
        }
        Some(removed)
    }

    /// Swap two slots and keep the index map consistent.
    fn swap(&mut self, a: usize, b: usize) {
        if a == b {
            return;
        }
        self.items.swap(a, b);
        self.index.insert(self.items[a].key(), a);
        self.index.insert(self.items[b].key(), b);
    }

    fn sift_up(&mut self, mut idx: usize) {
        while idx > 0 {
            let parent = (idx - 1) / 2;
            if self.items[idx] < self.items[parent] {
                self.swap(idx, parent);
                idx = parent;
            } else {
                break;
            }
        }
    }

    fn sift_down(&mut self, mut idx: usize) {
        let len = self.items.len();
        loop {
            let left = 2 * idx + 1;
            let right = 2 * idx + 2;
            let mut smallest = idx;

            if left < len && self.items[left] < self.items[smallest] {
                smallest = left;
            }
            if right < len && self.items[right] < self.items[smallest] {
                smallest = right;
            }
            if smallest == idx {
                break;
            }
            self.swap(idx, smallest);
            idx = smallest;
        }
    }
}

impl<T: KeyedEntry + Ord> Default for KeyedMinHeap<T> {
    fn default() -> Self {
        Self::new()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
