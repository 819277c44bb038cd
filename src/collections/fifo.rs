//! FIFO queue used for the per-job-kind dispatch queues.
//!
//! A thin domain wrapper over a ring buffer: O(1) push/pop/peek, front-first
//! iteration, and `retain` for draining cancelled batch elements in place.

use std::collections::VecDeque;

/// First-in first-out queue with O(1) push, pop and peek.
#[derive(Debug, Clone)]
pub struct FifoQueue<T> {
    inner: VecDeque<T>,
}

impl<T> FifoQueue<T> {
    pub fn new() -> Self {
        Self {
            inner: VecDeque::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Append to the back.
    pub fn push(&mut self, item: T) {
        self.inner.push_back(item);
    }

    /// Remove and return the front element.
    pub fn pop(&mut self) -> Option<T> {
        self.inner.pop_front()
    }

    /// Borrow the front element.
    pub fn peek(&self) -> Option<&T> {
        self.inner.front()
    }

    /// Iterate front to back without consuming.
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.inner.iter()
    }

    /// Keep only elements matching the predicate, preserving order.
    pub fn retain(&mut self, f: impl FnMut(&T) -> bool) {
        self.inner.retain(f);
    }

    /// Remove every element, returning them front-first.
    pub fn drain(&mut self) -> impl Iterator<Item = T> + '_ {
        self.inner.drain(..)
    }
}

impl<T> Default for FifoQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
