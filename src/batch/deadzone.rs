//! Deadzone tracking.
//!
//! A deadzone is a half-open time window `[start, end)` during which the
//! batch target is known to be in an unstable (non-schedulable) state — its
//! controllable attribute is off its floor while a batch's side effects
//! land.  The timing engine refuses to place a management pass inside one;
//! it skips to the zone's end instead.
//!
//! Zones are produced in chronological order (one per planned batch) and
//! pruned from the front once they lie entirely in the past.

use crate::collections::FifoQueue;

/// Half-open interval `[start, end)` in absolute milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Deadzone {
    pub start: u64,
    pub end: u64,
}

/// Chronologically ordered deadzone queue for one target.
#[derive(Debug, Default)]
pub struct DeadzoneQueue {
    zones: FifoQueue<Deadzone>,
}

impl DeadzoneQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a zone.  Callers push in chronological order.
    pub fn push(&mut self, zone: Deadzone) {
        debug_assert!(zone.start <= zone.end, "inverted deadzone {zone:?}");
        self.zones.push(zone);
    }

    /// Drop every zone that has fully elapsed.  The interval is half-open
    /// on the right, so a zone with `end == now` is already past.
    pub fn prune(&mut self, now: u64) {
        while let Some(front) = self.zones.peek() {
            if front.end <= now {
                self.zones.pop();
            } else {
                break;
            }
        }
    }

    /// The next pending zone, if any.
    pub fn peek(&self) -> Option<&Deadzone> {
        self.zones.peek()
    }

    pub fn len(&self) -> usize {
        self.zones.len()
    }

    pub fn is_empty(&self) -> bool {
        self.zones.is_empty()
    }

    /// Forget every zone (target switch).
    pub fn clear(&mut self) {
        while self.zones.pop().is_some() {}
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn zone(start: u64, end: u64) -> Deadzone {
        Deadzone { start, end }
    }

    #[test]
    fn prune_drops_only_fully_past_zones() {
        let mut q = DeadzoneQueue::new();
        q.push(zone(100, 200));
        q.push(zone(300, 400));
        q.push(zone(500, 600));

        q.prune(250);
        assert_eq!(q.len(), 2);
        assert_eq!(q.peek(), Some(&zone(300, 400)));

        // end == now is already past (half-open on the right edge); a zone
        // surviving its own end would pin the management clamp to `now`
        q.prune(399);
        assert_eq!(q.peek(), Some(&zone(300, 400)));
        q.prune(400);
        assert_eq!(q.peek(), Some(&zone(500, 600)));
    }

    #[test]
    fn clear_empties_the_queue() {
        let mut q = DeadzoneQueue::new();
        q.push(zone(1, 2));
        q.push(zone(3, 4));
        q.clear();
        assert!(q.is_empty());
        assert_eq!(q.peek(), None);
    }
}
