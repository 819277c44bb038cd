/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Capacity ledger: per-node bookkeeping of reserved vs. available capacity.
//!
//! The ledger is the only resource shared across components.  It owns two
//! structures:
//!
//! * a [`ValueSortedIndex`] of [`CapacityRecord`]s ordered by spare capacity,
//!   which answers "find me a node with ≥ X free" in one binary search, and
//! * a [`KeyedMinHeap`] of [`ActiveJob`]s ordered by deadline, which drives
//!   reclamation: once a job's deadline has passed *and* the executor
//!   confirms it is gone, its capacity flows back to the node.
//!
//! Conservation invariant: for every node,
//! `total − available == Σ capacity_used` over live jobs on that node.
//! [`CapacityLedger::integrity_check`] verifies it; the composition root runs
//! the check as a background task and logs violations at `error!`.
//!
//! Mutated exclusively by `reserve`, `cancel` and `sweep_expired`, all
//! invoked from inside a scheduler tick — no synchronization needed.

pub mod error;

pub use error::LedgerError;

use std::cmp::Ordering;

use tracing::{debug, info, warn};

use crate::api::{JobId, NodeId};
use crate::collections::{KeyedEntry, KeyedMinHeap, RankedEntry, ValueSortedIndex};

// ── Records ───────────────────────────────────────────────────────────────────

/// Capacity accounting for a single fleet node.
#[derive(Debug, Clone, PartialEq)]
pub struct CapacityRecord {
    pub node: NodeId,
    /// Capacity units not currently reserved by any live job.
    pub available: f64,
    /// Capacity units the node exposes in total.
    pub total: f64,
}

impl KeyedEntry for CapacityRecord {
    type Key = NodeId;
    fn key(&self) -> NodeId {
        self.node.clone()
    }
}

impl RankedEntry for CapacityRecord {
    fn rank(&self) -> f64 {
        self.available
    }
}

/// A dispatched, not-yet-reclaimed job holding capacity on one node.
#[derive(Debug, Clone, PartialEq)]
pub struct ActiveJob {
    pub job_id: JobId,
    pub node: NodeId,
    pub capacity_used: f64,
    /// Absolute completion time in ms; reclamation becomes possible once
    /// this has passed.
    pub deadline: u64,
}

impl KeyedEntry for ActiveJob {
    type Key = JobId;
    fn key(&self) -> JobId {
        self.job_id
    }
}

impl Eq for ActiveJob {}

impl Ord for ActiveJob {
    fn cmp(&self, other: &Self) -> Ordering {
        self.deadline
            .cmp(&other.deadline)
            .then(self.job_id.cmp(&other.job_id))
    }
}

impl PartialOrd for ActiveJob {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

// ── CapacityLedger ────────────────────────────────────────────────────────────

/// Tracks how much of each node's capacity is reserved by time-bounded jobs.
#[derive(Debug, Default)]
pub struct CapacityLedger {
    nodes: ValueSortedIndex<CapacityRecord>,
    active: KeyedMinHeap<ActiveJob>,
}

impl CapacityLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a node's total capacity.
    ///
    /// First observation creates the record with everything available.  A
    /// later total change (external upgrade) shifts `available` by the same
    /// delta, leaving reservations untouched.
    pub fn upsert_node(&mut self, node: &str, total: f64) {
        if self.nodes.get(&node.to_string()).is_some() {
            let _ = self.nodes.update(&node.to_string(), |rec| {
                let delta = total - rec.total;
                if delta != 0.0 {
                    debug!(node = %rec.node, old_total = rec.total, new_total = total, "node capacity changed");
                }
                rec.total = total;
                rec.available += delta;
            });
        } else {
            info!(node, total, "node observed");
            // Key is new, insert cannot collide
            let _ = self.nodes.insert(CapacityRecord {
                node: node.to_string(),
                available: total,
                total,
            });
        }
    }

    /// Find a node with at least `amount` spare capacity, skipping the first
    /// `skip` qualifying nodes.
    ///
    /// Returns `None` when the fleet has no such node — callers must treat
    /// that as "skip this dispatch, retry next tick", never as fatal.
    pub fn request_capacity(&self, amount: f64, skip: usize) -> Option<NodeId> {
        self.nodes.find_next(amount, skip).map(|rec| rec.node.clone())
    }

    /// Record `job` as live and subtract its capacity from the node.
    pub fn reserve(&mut self, job: ActiveJob) -> Result<(), LedgerError> {
        let key = job.node.clone();
        let rec = self
            .nodes
            .get(&key)
            .ok_or_else(|| LedgerError::UnknownNode { node: key.clone() })?;
        if job.capacity_used > rec.available {
            return Err(LedgerError::Oversubscribed {
                node: key,
                requested: job.capacity_used,
                available: rec.available,
            });
        }
        let used = job.capacity_used;
        self.active
            .insert(job)
            .map_err(|e| LedgerError::DuplicateJob { job_id: e.key })?;
        let _ = self.nodes.update(&key, |rec| rec.available -= used);
        Ok(())
    }

    /// Remove a job immediately (hard kill) and restore its capacity.
    pub fn cancel(&mut self, job_id: JobId) -> Option<ActiveJob> {
        let job = self.active.remove_by_key(&job_id)?;
        self.restore(&job);
        debug!(job_id, node = %job.node, capacity = job.capacity_used, "job cancelled, capacity restored");
        Some(job)
    }

    /// Reclaim capacity from jobs whose deadline has passed and which the
    /// executor confirms are no longer running.
    ///
    /// Stops at the first expired-but-still-running job: its deadline
    /// estimate was jittery and it will be retried on a later sweep.
    pub fn sweep_expired(&mut self, now: u64, is_running: impl Fn(JobId) -> bool) -> Vec<ActiveJob> {
        let mut reclaimed = Vec::new();
        while let Some(head) = self.active.peek() {
            if head.deadline > now {
                break;
            }
            if is_running(head.job_id) {
                warn!(
                    job_id = head.job_id,
                    deadline = head.deadline,
                    now,
                    "expired job still running, deferring reclamation"
                );
                break;
            }
            let Some(job) = self.active.pop() else {
                break;
            };
            self.restore(&job);
            reclaimed.push(job);
        }
        if !reclaimed.is_empty() {
            debug!(count = reclaimed.len(), "swept expired jobs");
        }
        reclaimed
    }

    /// Verify capacity conservation on every node.
    pub fn integrity_check(&self) -> Result<(), LedgerError> {
        for rec in self.nodes.iter() {
            let jobs_used: f64 = self
                .active
                .to_vec()
                .iter()
                .filter(|j| j.node == rec.node)
                .map(|j| j.capacity_used)
                .sum();
            let ledger_used = rec.total - rec.available;
            if (ledger_used - jobs_used).abs() > 1e-6 {
                return Err(LedgerError::ConservationViolated {
                    node: rec.node.clone(),
                    ledger_used,
                    jobs_used,
                });
            }
        }
        Ok(())
    }

    // ── Accessors ─────────────────────────────────────────────────────────────

    /// Spare capacity on `node`, if known.
    pub fn available_on(&self, node: &str) -> Option<f64> {
        self.nodes.get(&node.to_string()).map(|r| r.available)
    }

    /// Total capacity on `node`, if known.
    pub fn total_on(&self, node: &str) -> Option<f64> {
        self.nodes.get(&node.to_string()).map(|r| r.total)
    }

    /// Spare capacity across the whole fleet.
    pub fn fleet_available(&self) -> f64 {
        self.nodes.iter().map(|r| r.available).sum()
    }

    /// Number of live jobs.
    pub fn active_count(&self) -> usize {
        self.active.len()
    }

    /// Number of known nodes.
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// `(node, available)` pairs in ascending availability order.
    pub fn node_availability(&self) -> Vec<(NodeId, f64)> {
        self.nodes
            .iter()
            .map(|r| (r.node.clone(), r.available))
            .collect()
    }

    /// Live job ids on `node`.
    pub fn jobs_on(&self, node: &str) -> Vec<JobId> {
        self.active
            .to_vec()
            .iter()
            .filter(|j| j.node == node)
            .map(|j| j.job_id)
            .collect()
    }

    fn restore(&mut self, job: &ActiveJob) {
        let _ = self.nodes.update(&job.node, |rec| {
            rec.available += job.capacity_used;
        });
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
