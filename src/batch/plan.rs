/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Batch instance construction.
//!
//! One batch is a single coordinated run of a policy's job sequence against
//! one target.  All of its elements share one completion reference time and
//! are staggered by the internal delay so their side effects apply in
//! sequence order:
//!
//! ```text
//! start                         end_time (= start + stabilize_dur − 1)
//!   │  element 0 ends ───────────►│
//!   │  element 1 ends ────────────│──► +1×delay
//!   │  element 2 ends ────────────│──► +2×delay
//!   ▼                             ▼
//! ──┬─────────────────────────────┬────────────────►  time
//!   hard_start = start − delay    hard_end = end_time + n×delay
//! ```
//!
//! `hard_start` is the committal boundary: before it, nothing has been
//! dispatched and a soft kill may cancel the whole batch; after it, a soft
//! kill is a no-op because a partially applied batch is worse than a fully
//! applied one.  A hard kill always takes effect (target switch) — capacity
//! comes back, but side effects of partially run jobs may be irreversible.

use crate::api::{JobId, JobKind, PolicyStep, TargetId};

/// Engine-local batch identifier (dense counter, never reused).
pub type BatchId = u64;

// ── Internal delay ────────────────────────────────────────────────────────────

/// Milliseconds the internal delay is never allowed to drop below.
pub const MIN_INTERNAL_DELAY_MS: u64 = 200;

/// Minimum spacing between sibling jobs within one batch: half a percent of
/// the stabilize duration, floored at [`MIN_INTERNAL_DELAY_MS`].
///
/// Large enough that measurable side-effect interference between siblings
/// cannot reorder their landings.
pub fn internal_delay(stabilize_duration_ms: u64) -> u64 {
    let scaled = (stabilize_duration_ms as f64 * 0.005).ceil() as u64;
    scaled.max(MIN_INTERNAL_DELAY_MS)
}

// ── Batch records ─────────────────────────────────────────────────────────────

/// One coordinated instance of a policy sequence.
///
/// Owned by the engine in an id-keyed arena; elements refer back to it by
/// [`BatchId`] rather than by captured closure, making ownership and kill
/// dispatch explicit.
#[derive(Debug, Clone)]
pub struct Batch {
    pub id: BatchId,
    pub target: TargetId,
    pub start: u64,
    /// Before this moment the batch is uncommitted and soft-killable.
    pub hard_start: u64,
    /// Shared completion reference: element 0 lands here.
    pub end_time: u64,
    /// Last element's landing plus one more delay slot.
    pub hard_end: u64,
    /// Jobs already handed to the executor for this batch.
    pub dispatched: Vec<JobId>,
}

/// One job-type slot of one batch, queued until its dispatch window opens.
#[derive(Debug, Clone)]
pub struct BatchElement {
    pub batch: BatchId,
    pub kind: JobKind,
    pub threads: u32,
    /// The precise moment this element's job must finish.
    pub target_end: u64,
}

/// A constructed batch: the record plus its queue-ready elements.
#[derive(Debug)]
pub struct BatchPlan {
    pub batch: Batch,
    pub elements: Vec<BatchElement>,
}

/// Lay out one batch instance starting at `start`.
///
/// Element `i` of the sequence gets `target_end = end_time + i × delay`,
/// so sibling side effects apply in sequence order with bounded skew.
pub fn plan_batch(
    id: BatchId,
    target: &str,
    start: u64,
    sequence: &[PolicyStep],
    stabilize_duration_ms: u64,
    delay_ms: u64,
) -> BatchPlan {
    let end_time = start + stabilize_duration_ms.saturating_sub(1);
    let n = sequence.len() as u64;

    let batch = Batch {
        id,
        target: target.to_string(),
        start,
        hard_start: start.saturating_sub(delay_ms),
        end_time,
        hard_end: end_time + n * delay_ms,
        dispatched: Vec::new(),
    };

    let elements = sequence
        .iter()
        .enumerate()
        .map(|(i, step)| BatchElement {
            batch: id,
            kind: step.kind,
            threads: step.threads,
            target_end: end_time + i as u64 * delay_ms,
        })
        .collect();

    BatchPlan { batch, elements }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn step(kind: JobKind, threads: u32) -> PolicyStep {
        PolicyStep { kind, threads }
    }

    #[test]
    fn internal_delay_floors_at_200ms() {
        // 8000 × 0.005 = 40 → floored
        assert_eq!(internal_delay(8_000), 200);
        assert_eq!(internal_delay(0), 200);
        assert_eq!(internal_delay(40_000), 200);
    }

    #[test]
    fn internal_delay_scales_for_long_stabilizes() {
        // 100_000 × 0.005 = 500
        assert_eq!(internal_delay(100_000), 500);
        // Fractional result rounds up: 41_000 × 0.005 = 205
        assert_eq!(internal_delay(41_000), 205);
    }

    #[test]
    fn four_element_batch_staggers_target_ends() {
        // Spec'd reference layout: stabilize 8000ms → delay 200ms,
        // element ends at T, T+200, T+400, T+600 with T = start + 7999.
        let seq = vec![
            step(JobKind::Extract, 10),
            step(JobKind::Stabilize, 3),
            step(JobKind::Amplify, 5),
            step(JobKind::Stabilize, 2),
        ];
        let start = 50_000;
        let plan = plan_batch(1, "t", start, &seq, 8_000, internal_delay(8_000));

        let ends: Vec<u64> = plan.elements.iter().map(|e| e.target_end).collect();
        let t = start + 7_999;
        assert_eq!(ends, vec![t, t + 200, t + 400, t + 600]);

        assert_eq!(plan.batch.hard_start, start - 200);
        assert_eq!(plan.batch.end_time, t);
        assert_eq!(plan.batch.hard_end, t + 4 * 200);
    }

    #[test]
    fn elements_carry_kind_and_threads_from_sequence() {
        let seq = vec![step(JobKind::Amplify, 7), step(JobKind::Stabilize, 2)];
        let plan = plan_batch(3, "t", 1_000, &seq, 10_000, 250);
        assert_eq!(plan.elements[0].kind, JobKind::Amplify);
        assert_eq!(plan.elements[0].threads, 7);
        assert_eq!(plan.elements[1].kind, JobKind::Stabilize);
        assert_eq!(plan.elements[1].threads, 2);
        assert!(plan.elements.iter().all(|e| e.batch == 3));
    }

    #[test]
    fn hard_start_saturates_near_zero() {
        let plan = plan_batch(1, "t", 100, &[step(JobKind::Extract, 1)], 5_000, 200);
        assert_eq!(plan.batch.hard_start, 0);
    }
}
