//! Binary min-heap keyed by an arbitrary comparator.
//!
//! `std::collections::BinaryHeap` is a max-heap over `Ord` and offers no way
//! to order the same element type two different ways in two different heaps.
//! The scheduler needs exactly that (priority and background task queues are
//! both ordered by `next_run` but hold different task types), so this is a
//! small hand-rolled sift heap over a caller-supplied comparator.
//!
//! No identity tracking — use [`KeyedMinHeap`](super::KeyedMinHeap) when
//! remove-by-key is needed.

use std::cmp::Ordering;

/// Binary min-heap over a caller-supplied comparator.
///
/// `pop()` always returns the smallest remaining element according to `cmp`.
pub struct MinHeap<T, F>
where
    F: Fn(&T, &T) -> Ordering,
{
    items: Vec<T>,
    cmp: F,
}

impl<T, F> MinHeap<T, F>
where
    F: Fn(&T, &T) -> Ordering,
{
    /// Create an empty heap ordered by `cmp` (smallest first).
    pub fn new(cmp: F) -> Self {
        Self {
            items: Vec::new(),
            cmp,
        }
    }

    /// Number of elements currently stored.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Returns `true` if the heap holds no elements.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Insert an element, O(log n).
    pub fn push(&mut self, item: T) {
        self.items.push(item);
        self.sift_up(self.items.len() - 1);
    }

    /// Remove and return the minimum element, O(log n).
    pub fn pop(&mut self) -> Option<T> {
        if self.items.is_empty() {
            return None;
        }
        let last = self.items.len() - 1;
        self.items.swap(0, last);
        let min = self.items.pop();
        if !self.items.is_empty() {
            self.sift_down(0);
        }
        min
    }

    /// Borrow the minimum element without removing it.
    pub fn peek(&self) -> Option<&T> {
        self.items.first()
    }

    fn sift_up(&mut self, mut idx: usize) {
        while idx > 0 {
            let parent = (idx - 1) / 2;
            if (self.cmp)(&self.items[idx], &self.items[parent]) == Ordering::Less {
                self.items.swap(idx, parent);
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

            if left < len && (self.cmp)(&self.items[left], &self.items[smallest]) == Ordering::Less
            {
                smallest = left;
            }
            if right < len
                && (self.cmp)(&self.items[right], &self.items[smallest]) == Ordering::Less
            {
                smallest = right;
            }
            if smallest == idx {
                break;
            }
            self.items.swap(idx, smallest);
            idx = smallest;
        }
    }
}

impl<T: std::fmt::Debug, F> std::fmt::Debug for MinHeap<T, F>
where
    F: Fn(&T, &T) -> Ordering,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MinHeap").field("items", &self.items).finish()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
