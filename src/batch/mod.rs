/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Batch timing engine.
//!
//! [`BatchEngine`] turns a [`Policy`] into concrete, precisely timed job
//! dispatches.  Once per management pass (driven as one priority task) it:
//!
//! 1. prunes expired deadzones,
//! 2. picks the next management time — `now + spacing`, or past the next
//!    deadzone if that zone would start sooner,
//! 3. plans new batch instances up to that horizon and queues their
//!    elements per job kind,
//! 4. dispatches every element whose window has opened, computing the sleep
//!    delay that makes the job land exactly on its `target_end`.
//!
//! Elements that can no longer land on time are soft-killed and reported as
//! misses; a failed dispatch is treated identically.  Neither stops the
//! engine — the next pass re-derives the schedule from a fresh policy
//! snapshot.
//!
//! # State machine
//! * no policy → fixed backoff, no state change
//! * target switched → hard-cancel everything queued, restart planning
//! * empty sequence (target unstable) → soft-cancel, run standalone
//!   stabilization, poll again
//! * otherwise → normal operation as above
//!
//! # Why dispatch looks ahead
//! A job must *start* roughly one job-duration before its target end, so
//! eligibility is checked against the next management pass's horizon
//! (`next_manage + duration + delay`), not against `now` — waiting for the
//! target end itself would always be too late.

pub mod deadzone;
pub mod plan;

use std::collections::HashMap;
use std::rc::Rc;
use std::cell::RefCell;

use tracing::{debug, error, info, warn};

use crate::api::{Executor, JobId, JobKind, MissReporter, Policy, PolicyProvider, TargetId};
use crate::collections::FifoQueue;
use crate::ledger::{ActiveJob, CapacityLedger, LedgerError};
use crate::manage::Manager;

use deadzone::{Deadzone, DeadzoneQueue};
use plan::{internal_delay, plan_batch, Batch, BatchElement, BatchId};

// ── Constants ─────────────────────────────────────────────────────────────────

/// Sleep when the policy provider has no decision yet.
const NO_POLICY_BACKOFF_MS: u64 = 1_000;

/// Poll interval while driving a target towards its stable state.
const STABILIZE_POLL_MS: u64 = 1_000;

/// Runaway guard on the planning loop.  Tripping it means the spacing /
/// horizon math diverged; the pass logs loudly and carries on with what it
/// planned so far.
const MAX_PLANS_PER_PASS: usize = 10;

// ── BatchEngine ───────────────────────────────────────────────────────────────

/// Per-target batch timing engine.  See the module docs for the lifecycle.
pub struct BatchEngine {
    ledger: Rc<RefCell<CapacityLedger>>,
    executor: Rc<dyn Executor>,
    provider: Rc<dyn PolicyProvider>,
    reporter: Rc<dyn MissReporter>,
    /// Lower-priority manager that can be asked to vacate a node when the
    /// ledger alone cannot satisfy a reservation.
    filler: Option<Rc<RefCell<dyn Manager>>>,

    last_target: Option<TargetId>,
    /// Start time of the next batch instance to plan; 0 forces a restart.
    next_batch_init: u64,
    /// One dispatch queue per job kind, each in target-end order.
    queues: [FifoQueue<BatchElement>; 3],
    deadzones: DeadzoneQueue,
    /// Arena of live batch records, keyed by id.
    batches: HashMap<BatchId, Batch>,
    next_batch_id: BatchId,
    /// Currently running standalone stabilization job, if any.
    stabilizer_job: Option<JobId>,
}

impl BatchEngine {
    pub fn new(
        ledger: Rc<RefCell<CapacityLedger>>,
        executor: Rc<dyn Executor>,
        provider: Rc<dyn PolicyProvider>,
        reporter: Rc<dyn MissReporter>,
    ) -> Self {
        Self {
            ledger,
            executor,
            provider,
            reporter,
            filler: None,
            last_target: None,
            next_batch_init: 0,
            queues: [FifoQueue::new(), FifoQueue::new(), FifoQueue::new()],
            deadzones: DeadzoneQueue::new(),
            batches: HashMap::new(),
            next_batch_id: 1,
            stabilizer_job: None,
        }
    }

    /// Attach a filler manager the engine may ask to vacate nodes.
    pub fn with_filler(mut self, filler: Rc<RefCell<dyn Manager>>) -> Self {
        self.filler = Some(filler);
        self
    }

    // ── Introspection (primarily for tests and logging) ───────────────────────

    /// Queued elements of `kind`.
    pub fn queued(&self, kind: JobKind) -> usize {
        self.queues[kind.slot()].len()
    }

    /// Total queued elements across all kinds.
    pub fn queued_total(&self) -> usize {
        self.queues.iter().map(|q| q.len()).sum()
    }

    /// Live batch records.
    pub fn batch_count(&self) -> usize {
        self.batches.len()
    }

    /// Pending deadzones.
    pub fn deadzone_count(&self) -> usize {
        self.deadzones.len()
    }

    /// The next pending deadzone, if any.
    pub fn next_deadzone(&self) -> Option<Deadzone> {
        self.deadzones.peek().copied()
    }

    /// Start time of the next batch instance to plan.
    pub fn next_batch_init(&self) -> u64 {
        self.next_batch_init
    }

    // ── Management pass ───────────────────────────────────────────────────────

    /// One management pass.  Returns the absolute time of the next pass.
    pub fn manage_pass(&mut self, now: u64) -> u64 {
        let target = self.provider.target();
        let Some(policy) = self.provider.policy(&target) else {
            debug!(target = %target, "no policy available, backing off");
            return now + NO_POLICY_BACKOFF_MS;
        };

        // Target switch: everything queued belongs to the wrong target.
        if self.last_target.as_deref() != Some(policy.target.as_str()) {
            if let Some(old) = &self.last_target {
                info!(old = %old, new = %policy.target, "target switched, hard-cancelling queued batches");
                self.cancel_all_batches(now, false);
                self.deadzones.clear();
                // A stabilizer still driving the old target is stale too
                if let Some(job_id) = self.stabilizer_job.take() {
                    self.executor.kill(job_id);
                    self.ledger.borrow_mut().cancel(job_id);
                }
            }
            self.last_target = Some(policy.target.clone());
            self.next_batch_init = 0;
        }

        // Unstable target: no batches, drive it to its floor instead.
        if policy.sequence.is_empty() {
            self.cancel_all_batches(now, true);
            self.run_stabilizer(now, &policy.target);
            return now + STABILIZE_POLL_MS;
        }

        self.deadzones.prune(now);

        // Never schedule the next pass where it can no longer prevent
        // overlap into an unstable window — skip past the zone entirely.
        let mut next_manage = now + policy.spacing_ms;
        if let Some(zone) = self.deadzones.peek() {
            if zone.start < next_manage {
                debug!(
                    zone_start = zone.start,
                    zone_end = zone.end,
                    "management pass clamped past deadzone"
                );
                next_manage = zone.end;
            }
        }

        let stabilize_dur = self.executor.duration_ms(JobKind::Stabilize, &policy.target);
        let delay = internal_delay(stabilize_dur);

        self.plan_up_to(now, next_manage, &policy, stabilize_dur, delay);
        self.dispatch_due(now, next_manage, &policy.target, delay);

        // Batch records past their hard end can no longer be killed usefully
        self.batches.retain(|_, b| b.hard_end >= now);

        next_manage
    }

    /// Instantiate batches until the planning cursor passes `next_manage`.
    fn plan_up_to(&mut self, now: u64, next_manage: u64, policy: &Policy, stabilize_dur: u64, delay: u64) {
        // A fresh or reset cursor starts one delay out so the first
        // element's dispatch window is still satisfiable.
        if self.next_batch_init < now + delay {
            self.next_batch_init = now + delay;
        }

        let mut planned = 0usize;
        while self.next_batch_init <= next_manage {
            if planned >= MAX_PLANS_PER_PASS {
                error!(
                    planned,
                    next_batch_init = self.next_batch_init,
                    next_manage,
                    spacing = policy.spacing_ms,
                    "planning loop guard tripped — spacing/horizon math diverged"
                );
                debug_assert!(false, "batch planning loop exceeded {MAX_PLANS_PER_PASS} iterations");
                break;
            }

            let id = self.next_batch_id;
            self.next_batch_id += 1;
            let start = self.next_batch_init;
            let plan = plan_batch(id, &policy.target, start, &policy.sequence, stabilize_dur, delay);

            let n = policy.sequence.len() as u64;
            self.deadzones.push(Deadzone {
                start: (start + stabilize_dur).saturating_sub(1 + delay),
                end: start + stabilize_dur + n * delay,
            });

            debug!(
                batch = id,
                start,
                end_time = plan.batch.end_time,
                elements = plan.elements.len(),
                "batch planned"
            );
            for element in plan.elements {
                self.queues[element.kind.slot()].push(element);
            }
            self.batches.insert(id, plan.batch);

            self.next_batch_init += policy.spacing_ms;
            planned += 1;
        }
    }

    /// Pop and dispatch every element whose window has opened.
    fn dispatch_due(&mut self, now: u64, next_manage: u64, target: &str, delay: u64) {
        for kind in JobKind::ALL {
            let duration = self.executor.duration_ms(kind, target);
            loop {
                let due = match self.queues[kind.slot()].peek() {
                    Some(el) => el.target_end <= next_manage + duration + delay,
                    None => false,
                };
                if !due {
                    break;
                }
                let Some(element) = self.queues[kind.slot()].pop() else {
                    break;
                };

                // Batch already killed or pruned: nothing to dispatch
                if !self.batches.contains_key(&element.batch) {
                    continue;
                }

                // Dispatching now would still land late
                if now + duration + delay / 2 >= element.target_end {
                    let overshoot = now + duration + delay / 2 - element.target_end;
                    self.kill_batch(element.batch, true, now);
                    self.reporter.report(&format!(
                        "{kind} element of batch {} would land {overshoot}ms late",
                        element.batch
                    ));
                    continue;
                }

                let exec_delay = element.target_end - (now + duration);
                match self.dispatch(&element, target, exec_delay) {
                    Ok(job_id) => {
                        if let Some(batch) = self.batches.get_mut(&element.batch) {
                            batch.dispatched.push(job_id);
                        }
                        debug!(
                            job_id,
                            kind = %kind,
                            threads = element.threads,
                            exec_delay,
                            target_end = element.target_end,
                            "element dispatched"
                        );
                    }
                    Err(reason) => {
                        self.kill_batch(element.batch, true, now);
                        self.reporter.report(&reason);
                    }
                }
            }
        }
    }

    /// Reserve capacity and hand the element to the executor.
    fn dispatch(&mut self, element: &BatchElement, target: &str, exec_delay: u64) -> Result<JobId, String> {
        let capacity = element.threads as f64 * self.executor.thread_cost(element.kind);

        let Some(node) = self.acquire_node(capacity) else {
            return Err(format!(
                "no node with {capacity:.1} spare capacity for {} element of batch {}",
                element.kind, element.batch
            ));
        };

        let job_id = self.executor.exec(
            &node,
            element.kind,
            element.threads,
            exec_delay,
            element.target_end,
            target,
        );
        if job_id <= 0 {
            return Err(format!(
                "executor rejected {} element of batch {} (returned {job_id})",
                element.kind, element.batch
            ));
        }

        let reserve = self.ledger.borrow_mut().reserve(ActiveJob {
            job_id,
            node,
            capacity_used: capacity,
            deadline: element.target_end,
        });
        if let Err(e) = reserve {
            // The job is live but unaccounted — kill it rather than let the
            // ledger drift.
            self.executor.kill(job_id);
            return Err(format!("reservation failed for job {job_id}: {e}"));
        }
        Ok(job_id)
    }

    /// Find a node with `capacity` spare, asking the filler manager to
    /// vacate one if the ledger alone cannot satisfy the request.
    fn acquire_node(&self, capacity: f64) -> Option<String> {
        if let Some(node) = self.ledger.borrow().request_capacity(capacity, 0) {
            return Some(node);
        }
        let filler = self.filler.as_ref()?;

        let candidate = {
            let snapshot = self.ledger.borrow().node_availability();
            let filler_ref = filler.borrow();
            snapshot
                .into_iter()
                .find(|(node, available)| available + filler_ref.check_node(node) >= capacity)
                .map(|(node, _)| node)
        }?;

        debug!(node = %candidate, capacity, "vacating filler work to satisfy reservation");
        filler.borrow_mut().free_node(&candidate);
        self.ledger.borrow().request_capacity(capacity, 0)
    }

    // ── Cancellation ──────────────────────────────────────────────────────────

    /// Kill one batch.
    ///
    /// A soft kill is only honoured before the batch's `hard_start`
    /// (uncommitted); after that it is a no-op because a partially applied
    /// batch must be allowed to finish.  A hard kill always takes effect:
    /// dispatched jobs are killed and their capacity released.
    pub fn kill_batch(&mut self, id: BatchId, soft: bool, now: u64) {
        let committed = match self.batches.get(&id) {
            Some(batch) => now >= batch.hard_start,
            None => return,
        };
        if soft && committed {
            return;
        }
        let Some(batch) = self.batches.remove(&id) else {
            return;
        };
        for queue in &mut self.queues {
            queue.retain(|el| el.batch != id);
        }
        let mut ledger = self.ledger.borrow_mut();
        for job_id in &batch.dispatched {
            self.executor.kill(*job_id);
            ledger.cancel(*job_id);
        }
        debug!(
            batch = id,
            soft,
            killed_jobs = batch.dispatched.len(),
            "batch cancelled"
        );
    }

    /// Cancel every live batch with the given kill semantics.
    fn cancel_all_batches(&mut self, now: u64, soft: bool) {
        let ids: Vec<BatchId> = self.batches.keys().copied().collect();
        for id in ids {
            self.kill_batch(id, soft, now);
        }
    }

    // ── Stabilization ─────────────────────────────────────────────────────────

    /// Throw every capacity unit the stream's budget allows at driving the
    /// target back to its floor.  One stabilizer runs at a time.
    fn run_stabilizer(&mut self, now: u64, target: &str) {
        if let Some(job_id) = self.stabilizer_job {
            if self.executor.is_running(job_id) {
                return;
            }
            self.stabilizer_job = None;
        }

        let cost = self.executor.thread_cost(JobKind::Stabilize);
        let budget = self.provider.capacity_budget();

        let best = self
            .ledger
            .borrow()
            .node_availability()
            .into_iter()
            .max_by(|a, b| a.1.total_cmp(&b.1));
        let Some((node, available)) = best else {
            warn!("no nodes in ledger, cannot stabilize");
            return;
        };

        let threads = (available.min(budget) / cost).floor() as u32;
        if threads == 0 {
            debug!(node = %node, available, budget, "no headroom for stabilization yet");
            return;
        }

        let duration = self.executor.duration_ms(JobKind::Stabilize, target);
        let job_id = self
            .executor
            .exec(&node, JobKind::Stabilize, threads, 0, now + duration, target);
        if job_id <= 0 {
            self.reporter
                .report(&format!("stabilization dispatch failed (returned {job_id})"));
            return;
        }
        let reserve = self.ledger.borrow_mut().reserve(ActiveJob {
            job_id,
            node: node.clone(),
            capacity_used: threads as f64 * cost,
            deadline: now + duration,
        });
        if let Err(e) = reserve {
            self.executor.kill(job_id);
            self.reporter.report(&format!("stabilization reservation failed: {e}"));
            return;
        }
        self.stabilizer_job = Some(job_id);
        info!(target = %target, node = %node, threads, duration, "stabilization started");
    }
}

impl Manager for BatchEngine {
    fn manage(&mut self, now: u64) -> u64 {
        self.manage_pass(now)
    }

    // Batch capacity is never reclaimable on demand: killing mid-batch work
    // would corrupt the ordering the whole engine exists to protect.
    fn check_node(&self, _node: &str) -> f64 {
        0.0
    }

    fn free_node(&mut self, _node: &str) {}

    fn integrity_check(&self) -> Result<(), LedgerError> {
        self.ledger.borrow().integrity_check()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
