/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! External collaborator interfaces.
//!
//! The core never launches a process, never decides what a batch should
//! contain and never measures a target itself — those concerns live behind
//! three traits supplied at composition time:
//!
//! * [`Executor`] — launches, kills and observes jobs on fleet nodes.
//! * [`PolicyProvider`] — hands the engine an immutable [`Policy`] snapshot
//!   per management pass (which target, which job sequence, what spacing).
//! * [`MissReporter`] — purely observational sink for timing and dispatch
//!   misses; never affects control flow.
//!
//! All three are consumed through shared handles from inside scheduler
//! ticks, so implementations only need interior mutability, not `Sync`.

use std::fmt;

use tracing::warn;

// ── Identifiers ───────────────────────────────────────────────────────────────

/// Fleet node identifier.
pub type NodeId = String;

/// Batch target identifier.
pub type TargetId = String;

/// Job handle returned by [`Executor::exec`].  Values ≤ 0 signal a failed
/// dispatch; only positive ids are ever recorded in the capacity ledger.
pub type JobId = i64;

// ── Job kinds ─────────────────────────────────────────────────────────────────

/// The job types a batch sequence is composed of.
///
/// `Stabilize` is the reference phase: it has the longest duration, anchors
/// every element's target end time and defines the deadzone around batch
/// completion.  It is also the job dispatched standalone when a target is
/// not yet in a stable (schedulable) state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JobKind {
    /// Harvests value from the target; destabilizes it.
    Extract,
    /// Replenishes the target's controllable attribute; destabilizes it.
    Amplify,
    /// Drives the target's instability back to its floor.
    Stabilize,
}

impl JobKind {
    /// Every kind, in a fixed order (used to lay out the per-kind queues).
    pub const ALL: [JobKind; 3] = [JobKind::Extract, JobKind::Amplify, JobKind::Stabilize];

    /// Stable queue slot for this kind.
    pub fn slot(self) -> usize {
        match self {
            JobKind::Extract => 0,
            JobKind::Amplify => 1,
            JobKind::Stabilize => 2,
        }
    }
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            JobKind::Extract => "extract",
            JobKind::Amplify => "amplify",
            JobKind::Stabilize => "stabilize",
        };
        f.write_str(s)
    }
}

// ── Policy ────────────────────────────────────────────────────────────────────

/// One step of a batch sequence: run `threads` threads of `kind`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PolicyStep {
    pub kind: JobKind,
    pub threads: u32,
}

/// Externally computed scheduling decision, consumed once per management
/// pass.
///
/// An empty `sequence` means the target is not in a stable state yet and
/// should be driven there with standalone stabilization work instead of
/// batches.
#[derive(Debug, Clone, PartialEq)]
pub struct Policy {
    pub target: TargetId,
    /// Milliseconds between consecutive batch start times.
    pub spacing_ms: u64,
    /// Ordered job slots of one batch instance (1–4 entries in practice).
    pub sequence: Vec<PolicyStep>,
}

// ── Collaborator traits ───────────────────────────────────────────────────────

/// Launches and observes jobs.  The process mechanics behind `exec` are
/// opaque to the core.
pub trait Executor {
    /// Launch `threads` threads of `kind` against `target` on `node`.
    ///
    /// The job must sleep `delay_ms` before doing its work so that it
    /// completes at `target_end_ms`.  Returns a positive [`JobId`] on
    /// success, zero or negative on failure.
    fn exec(
        &self,
        node: &str,
        kind: JobKind,
        threads: u32,
        delay_ms: u64,
        target_end_ms: u64,
        target: &str,
    ) -> JobId;

    /// Terminate a previously launched job.  Unknown ids are a no-op.
    fn kill(&self, job: JobId);

    /// Returns `true` while the job is still running.
    fn is_running(&self, job: JobId) -> bool;

    /// Current duration estimate for one `kind` job against `target`.
    /// Estimates are jittery; the engine re-reads them every pass.
    fn duration_ms(&self, kind: JobKind, target: &str) -> u64;

    /// Capacity units consumed per thread of `kind`.
    fn thread_cost(&self, kind: JobKind) -> f64;
}

/// Supplies the engine's marching orders.
pub trait PolicyProvider {
    /// The target this scheduling stream is currently pointed at.
    fn target(&self) -> TargetId;

    /// Policy snapshot for `target`, or `None` when no decision is
    /// available yet (the engine backs off and asks again).
    fn policy(&self, target: &str) -> Option<Policy>;

    /// Capacity budget assigned to this scheduling stream, in capacity
    /// units.  Bounds standalone stabilization sizing.
    fn capacity_budget(&self) -> f64;
}

/// Observational sink for every soft-killed or failed-dispatch element.
pub trait MissReporter {
    fn report(&self, reason: &str);
}

/// Default reporter: forwards every miss to the log at `warn` level.
#[derive(Debug, Default)]
pub struct LogReporter;

impl MissReporter for LogReporter {
    fn report(&self, reason: &str) {
        warn!(reason, "batch element missed");
    }
}
