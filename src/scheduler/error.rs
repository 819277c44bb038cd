/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Structured error types for the cooperative scheduler.
//!
//! Everything here is a **fatal invariant violation**: a logic defect in the
//! task set, not a transient environment condition.  The driver loop is
//! expected to log the error and abort the process.  Transient conditions
//! (no spare capacity, timing misses, failed dispatches) never surface
//! through this type — they are recovered locally and forwarded to the miss
//! reporter instead.

use thiserror::Error;

/// Fatal failures returned by [`Scheduler::tick`](super::Scheduler::tick).
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SchedulerError {
    /// A priority task's function returned a `next_run` earlier than the
    /// moment it was invoked.
    ///
    /// The task is claiming to have already missed its next deadline, which
    /// means the timing math that produced the value is broken.  Tolerating
    /// it would make the scheduler spin on the same task forever, so the
    /// process must abort instead.
    #[error(
        "priority task '{task}' returned next_run {returned}ms which is before \
         its invocation time {invoked_at}ms; batch timing logic is broken"
    )]
    DeadlineRegression {
        task: String,
        returned: u64,
        invoked_at: u64,
    },
}
