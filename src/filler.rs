/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Spare-capacity filler.
//!
//! [`FillerManager`] soaks capacity no batch is using with short-lived
//! stabilization jobs — work whose side effects only push the target
//! towards its schedulable floor, so it can never disturb batch timing.
//! It is the lowest-priority capacity consumer: the batch engine may call
//! [`Manager::free_node`] at any time to vacate a node it needs, and the
//! filler gives everything back immediately.
//!
//! A per-node headroom is left unfilled so small batch elements can usually
//! be placed without a vacate round-trip.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use tracing::{debug, warn};

use crate::api::{Executor, JobId, JobKind, NodeId, PolicyProvider};
use crate::ledger::{ActiveJob, CapacityLedger, LedgerError};
use crate::manage::Manager;

/// How often the filler re-examines the fleet.
pub const FILLER_PASS_MS: u64 = 5_000;

/// One filler job the manager is holding capacity for.
#[derive(Debug, Clone)]
struct FillerJob {
    job_id: JobId,
    capacity_used: f64,
}

/// Lowest-priority manager filling idle capacity with stabilization work.
pub struct FillerManager {
    ledger: Rc<RefCell<CapacityLedger>>,
    executor: Rc<dyn Executor>,
    provider: Rc<dyn PolicyProvider>,
    /// Spare capacity to leave free on every node.
    headroom: f64,
    jobs: HashMap<NodeId, Vec<FillerJob>>,
}

impl FillerManager {
    pub fn new(
        ledger: Rc<RefCell<CapacityLedger>>,
        executor: Rc<dyn Executor>,
        provider: Rc<dyn PolicyProvider>,
        headroom: f64,
    ) -> Self {
        Self {
            ledger,
            executor,
            provider,
            headroom,
            jobs: HashMap::new(),
        }
    }

    /// Jobs currently tracked across all nodes.
    pub fn job_count(&self) -> usize {
        self.jobs.values().map(Vec::len).sum()
    }

    /// Drop bookkeeping for jobs that already finished.  Their ledger
    /// reservations are reclaimed by the capacity sweep, not here.
    fn prune_finished(&mut self) {
        let executor = &self.executor;
        for jobs in self.jobs.values_mut() {
            jobs.retain(|j| executor.is_running(j.job_id));
        }
        self.jobs.retain(|_, jobs| !jobs.is_empty());
    }

    /// Fill one node up to its headroom boundary.
    fn fill_node(&mut self, node: &str, available: f64, now: u64) {
        let cost = self.executor.thread_cost(JobKind::Stabilize);
        let fillable = available - self.headroom;
        let threads = (fillable / cost).floor() as i64;
        if threads <= 0 {
            return;
        }
        let threads = threads as u32;

        let target = self.provider.target();
        let duration = self.executor.duration_ms(JobKind::Stabilize, &target);
        let job_id = self
            .executor
            .exec(node, JobKind::Stabilize, threads, 0, now + duration, &target);
        if job_id <= 0 {
            debug!(node, threads, "filler launch rejected");
            return;
        }

        let capacity_used = threads as f64 * cost;
        let reserve = self.ledger.borrow_mut().reserve(ActiveJob {
            job_id,
            node: node.to_string(),
            capacity_used,
            deadline: now + duration,
        });
        if let Err(e) = reserve {
            warn!(node, job_id, error = %e, "filler reservation failed, killing job");
            self.executor.kill(job_id);
            return;
        }
        debug!(node, job_id, threads, capacity_used, "filler job placed");
        self.jobs
            .entry(node.to_string())
            .or_default()
            .push(FillerJob { job_id, capacity_used });
    }
}

impl Manager for FillerManager {
    fn manage(&mut self, now: u64) -> u64 {
        self.prune_finished();
        let snapshot = self.ledger.borrow().node_availability();
        for (node, available) in snapshot {
            self.fill_node(&node, available, now);
        }
        now + FILLER_PASS_MS
    }

    fn check_node(&self, node: &str) -> f64 {
        self.jobs
            .get(node)
            .map(|jobs| jobs.iter().map(|j| j.capacity_used).sum())
            .unwrap_or(0.0)
    }

    fn free_node(&mut self, node: &str) {
        let Some(jobs) = self.jobs.remove(node) else {
            return;
        };
        let mut ledger = self.ledger.borrow_mut();
        for job in &jobs {
            self.executor.kill(job.job_id);
            ledger.cancel(job.job_id);
        }
        debug!(node, released = jobs.len(), "filler vacated node");
    }

    fn integrity_check(&self) -> Result<(), LedgerError> {
        self.ledger.borrow().integrity_check()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
