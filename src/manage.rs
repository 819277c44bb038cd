//! The workload-manager capability interface.
//!
//! Every scheduling stream variant (batch engine, spare-capacity filler)
//! implements the same four capabilities and is selected by composition —
//! there is no manager base class and no inheritance chain.

use crate::ledger::LedgerError;

/// A unit of scheduling behaviour driven by the cooperative scheduler.
pub trait Manager {
    /// Run one management pass at `now`; returns the absolute time of the
    /// next pass (never in the past).
    fn manage(&mut self, now: u64) -> u64;

    /// Capacity units this manager could give back on `node` if asked.
    fn check_node(&self, node: &str) -> f64;

    /// Release everything this manager holds on `node`, immediately.
    fn free_node(&mut self, node: &str);

    /// Verify this manager's bookkeeping is internally consistent.
    fn integrity_check(&self) -> Result<(), LedgerError>;
}
