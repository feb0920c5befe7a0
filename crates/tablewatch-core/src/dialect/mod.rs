//! Per-RDBMS script rendering.
//!
//! Everything backend-specific that is *text* — introspection queries, the
//! provisioning script bundle, watchdog arm/disarm, teardown — is rendered
//! behind [`SqlDialect`]. The engine (provisioning order, loop state machine,
//! decode/dispatch) depends only on this trait and on the transport trait in
//! [`crate::driver`], never on a concrete backend.

mod sqlserver;

pub use sqlserver::SqlServerDialect;

use tablewatch_commons::TableRef;

use crate::provision::{ObjectNames, ProvisioningPlan};

/// One named step of the provisioning sequence.
///
/// Steps execute in order; the step name is what failure reporting and the
/// provisioner's audit log show.
#[derive(Debug, Clone)]
pub struct ProvisioningStep {
    pub name: &'static str,
    pub sql: String,
}

/// Script renderer for one backend.
pub trait SqlDialect: Send + Sync + 'static {
    /// Query returning one row when the table exists, none otherwise.
    fn table_exists_query(&self, table: &TableRef) -> String;

    /// Query returning `column_name`, `server_type`, `max_length` rows in
    /// ordinal order.
    fn column_catalog_query(&self, table: &TableRef) -> String;

    /// The ordered provisioning script bundle.
    fn provisioning_steps(
        &self,
        plan: &ProvisioningPlan,
        names: &ObjectNames,
    ) -> Vec<ProvisioningStep>;

    /// Existence-guarded drop statements. Safe to execute in any state, any
    /// number of times; each statement guards on its own object.
    fn teardown_statements(&self, names: &ObjectNames) -> Vec<String>;

    /// Statement the loop hands to the driver's blocking dequeue.
    fn dequeue_statement(&self, names: &ObjectNames, timeout_secs: u32) -> String;

    /// Arm the watchdog countdown before entering a blocking wait.
    fn arm_watchdog_statement(&self, names: &ObjectNames, timeout_secs: u32) -> String;

    /// Clear the watchdog countdown after the wait returns.
    fn disarm_watchdog_statement(&self, names: &ObjectNames) -> String;

    /// End this instance's conversations gracefully (cancellation path).
    fn end_conversation_statement(&self, names: &ObjectNames) -> String;
}
