/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Ledger error types.

use thiserror::Error;

use crate::api::{JobId, NodeId};

/// Failures in ledger bookkeeping.
///
/// `UnknownNode`, `DuplicateJob` and `Oversubscribed` indicate a logic defect
/// in the caller (reservation without a prior capacity grant, or a reused job
/// id).  `ConservationViolated` indicates the ledger itself has drifted.
#[derive(Debug, Error, PartialEq)]
pub enum LedgerError {
    /// `reserve` named a node the ledger has never observed.
    #[error("node '{node}' is not in the capacity ledger")]
    UnknownNode { node: NodeId },

    /// `reserve` was called twice with the same job id.
    #[error("job {job_id} is already reserved")]
    DuplicateJob { job_id: JobId },

    /// `reserve` asked for more capacity than the node has available.
    #[error("node '{node}' has {available:.2} capacity units available, {requested:.2} requested")]
    Oversubscribed {
        node: NodeId,
        requested: f64,
        available: f64,
    },

    /// `total − available` no longer matches the live jobs on a node.
    #[error(
        "capacity conservation violated on '{node}': ledger says {ledger_used:.2} used, \
         live jobs account for {jobs_used:.2}"
    )]
    ConservationViolated {
        node: NodeId,
        ledger_used: f64,
        jobs_used: f64,
    },
}
