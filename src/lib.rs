/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Cadence – batch timing scheduler
//!
//! Drives time-phased job batches onto a capacity-constrained fleet so
//! that every job lands at a precomputed moment, in sequence order, while
//! spare capacity is soaked by lower-priority filler work.
//!
//! Module layout:
//!
//! ```text
//! lib.rs
//! ├── collections/    – min-heap, keyed heap, sorted index, FIFO queue
//! ├── scheduler/      – two-tier cooperative tick scheduler
//! ├── ledger/         – per-node capacity accounting
//! ├── batch/          – batch planning, deadzones, the timing engine
//! ├── api             – Executor / PolicyProvider / MissReporter seams
//! ├── manage          – the Manager capability trait
//! ├── filler          – spare-capacity filler manager
//! ├── config/         – YAML fleet configuration
//! ├── sim             – deterministic in-process seam implementations
//! └── compose         – composition root wiring it all together
//! ```

pub mod api;
pub mod batch;
pub mod collections;
pub mod compose;
pub mod config;
pub mod filler;
pub mod ledger;
pub mod manage;
pub mod scheduler;
pub mod sim;
