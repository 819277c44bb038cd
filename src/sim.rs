/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Deterministic in-process stand-ins for the external seams.
//!
//! [`SimExecutor`] models jobs as timestamped records against a
//! [`ManualClock`]: a job "runs" from its launch until
//! `launched_at + delay + duration`, then counts as finished.  Together with
//! [`StaticPolicyProvider`] and [`RecordingReporter`] this lets the whole
//! scheduling stack run under test, or as a dry-run demo from the binary,
//! with no game process behind it.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;

use tracing::debug;

use crate::api::{Executor, JobId, JobKind, MissReporter, Policy, PolicyProvider, TargetId};
use crate::scheduler::Clock;

// ── ManualClock ───────────────────────────────────────────────────────────────

/// A clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    ms: Cell<u64>,
}

impl ManualClock {
    pub fn new(start_ms: u64) -> Self {
        Self { ms: Cell::new(start_ms) }
    }

    pub fn set(&self, ms: u64) {
        self.ms.set(ms);
    }

    pub fn advance(&self, delta_ms: u64) {
        self.ms.set(self.ms.get() + delta_ms);
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> u64 {
        self.ms.get()
    }
}

// ── SimExecutor ───────────────────────────────────────────────────────────────

/// Everything the simulator knows about one launched job.
#[derive(Debug, Clone)]
pub struct LaunchRecord {
    pub job_id: JobId,
    pub node: String,
    pub kind: JobKind,
    pub threads: u32,
    pub delay_ms: u64,
    pub target_end: u64,
    pub target: TargetId,
    pub launched_at: u64,
    pub killed_at: Option<u64>,
}

impl LaunchRecord {
    fn finishes_at(&self, duration_ms: u64) -> u64 {
        self.launched_at + self.delay_ms + duration_ms
    }
}

const DEFAULT_DURATION_MS: u64 = 1_000;

/// Simulated job executor.
///
/// Durations are fixed per job kind (set with [`with_duration`]); real
/// per-target variation is an executor-side concern the simulator does not
/// model.  [`fail_next_execs`] makes the next N launches fail the way a
/// node out of memory would.
///
/// [`with_duration`]: SimExecutor::with_duration
/// [`fail_next_execs`]: SimExecutor::fail_next_execs
pub struct SimExecutor {
    clock: Rc<ManualClock>,
    durations: HashMap<JobKind, u64>,
    launches: RefCell<Vec<LaunchRecord>>,
    fail_next: Cell<u32>,
    next_id: Cell<JobId>,
}

impl SimExecutor {
    pub fn new(clock: Rc<ManualClock>) -> Self {
        Self {
            clock,
            durations: HashMap::new(),
            launches: RefCell::new(Vec::new()),
            fail_next: Cell::new(0),
            next_id: Cell::new(1),
        }
    }

    /// Fix the duration of `kind` jobs (builder style, before sharing).
    pub fn with_duration(mut self, kind: JobKind, duration_ms: u64) -> Self {
        self.durations.insert(kind, duration_ms);
        self
    }

    /// Make the next `n` calls to `exec` fail.
    pub fn fail_next_execs(&self, n: u32) {
        self.fail_next.set(self.fail_next.get() + n);
    }

    /// Snapshot of every launch so far, in launch order.
    pub fn launches(&self) -> Vec<LaunchRecord> {
        self.launches.borrow().clone()
    }

    /// Jobs currently running against the simulated clock.
    pub fn running_count(&self) -> usize {
        let now = self.clock.now_ms();
        self.launches
            .borrow()
            .iter()
            .filter(|l| self.runs_at(l, now))
            .count()
    }

    /// Running jobs whose target matches `target`.
    pub fn running_for_target(&self, target: &str) -> usize {
        let now = self.clock.now_ms();
        self.launches
            .borrow()
            .iter()
            .filter(|l| l.target == target && self.runs_at(l, now))
            .count()
    }

    fn duration_for(&self, kind: JobKind) -> u64 {
        self.durations.get(&kind).copied().unwrap_or(DEFAULT_DURATION_MS)
    }

    fn runs_at(&self, launch: &LaunchRecord, now: u64) -> bool {
        launch.killed_at.is_none() && now < launch.finishes_at(self.duration_for(launch.kind))
    }
}

impl Executor for SimExecutor {
    fn exec(
        &self,
        node: &str,
        kind: JobKind,
        threads: u32,
        delay_ms: u64,
        target_end_ms: u64,
        target: &str,
    ) -> JobId {
        if self.fail_next.get() > 0 {
            self.fail_next.set(self.fail_next.get() - 1);
            return 0;
        }
        let job_id = self.next_id.get();
        self.next_id.set(job_id + 1);
        self.launches.borrow_mut().push(LaunchRecord {
            job_id,
            node: node.to_string(),
            kind,
            threads,
            delay_ms,
            target_end: target_end_ms,
            target: target.to_string(),
            launched_at: self.clock.now_ms(),
            killed_at: None,
        });
        debug!(job_id, node, kind = %kind, threads, delay_ms, "sim launch");
        job_id
    }

    fn kill(&self, job: JobId) {
        let now = self.clock.now_ms();
        if let Some(l) = self
            .launches
            .borrow_mut()
            .iter_mut()
            .find(|l| l.job_id == job)
        {
            if l.killed_at.is_none() {
                l.killed_at = Some(now);
            }
        }
    }

    fn is_running(&self, job: JobId) -> bool {
        let now = self.clock.now_ms();
        self.launches
            .borrow()
            .iter()
            .any(|l| l.job_id == job && self.runs_at(l, now))
    }

    fn duration_ms(&self, kind: JobKind, _target: &str) -> u64 {
        self.duration_for(kind)
    }

    fn thread_cost(&self, kind: JobKind) -> f64 {
        match kind {
            JobKind::Extract => 1.6,
            JobKind::Amplify | JobKind::Stabilize => 1.75,
        }
    }
}

// ── StaticPolicyProvider ──────────────────────────────────────────────────────

/// A provider whose answers are set by hand.
pub struct StaticPolicyProvider {
    target: RefCell<TargetId>,
    policy: RefCell<Option<Policy>>,
    budget: Cell<f64>,
}

impl StaticPolicyProvider {
    pub fn new(target: &str, policy: Option<Policy>, capacity_budget: f64) -> Self {
        Self {
            target: RefCell::new(target.to_string()),
            policy: RefCell::new(policy),
            budget: Cell::new(capacity_budget),
        }
    }

    pub fn set_target(&self, target: &str) {
        *self.target.borrow_mut() = target.to_string();
    }

    pub fn set_policy(&self, policy: Option<Policy>) {
        *self.policy.borrow_mut() = policy;
    }

    pub fn set_capacity_budget(&self, budget: f64) {
        self.budget.set(budget);
    }
}

impl PolicyProvider for StaticPolicyProvider {
    fn target(&self) -> TargetId {
        self.target.borrow().clone()
    }

    fn policy(&self, _target: &str) -> Option<Policy> {
        self.policy.borrow().clone()
    }

    fn capacity_budget(&self) -> f64 {
        self.budget.get()
    }
}

// ── RecordingReporter ─────────────────────────────────────────────────────────

/// Collects miss reports instead of logging them.
#[derive(Default)]
pub struct RecordingReporter {
    misses: RefCell<Vec<String>>,
}

impl RecordingReporter {
    pub fn misses(&self) -> Vec<String> {
        self.misses.borrow().clone()
    }
}

impl MissReporter for RecordingReporter {
    fn report(&self, reason: &str) {
        self.misses.borrow_mut().push(reason.to_string());
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
