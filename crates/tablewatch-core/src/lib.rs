//! # tablewatch-core
//!
//! Row-level change notifications on a relational table, without polling.
//!
//! A [`TableDependency`] provisions a server-side object set — a message
//! queue, a change-capture trigger, a dequeue routine and a watchdog job —
//! then runs a background loop that dequeues, decodes, filters and
//! dispatches typed change records to registered listeners, tearing
//! everything down on stop, error or disposal.
//!
//! ## Architecture
//!
//! ```text
//! TableDependency::new()
//!     ├── catalog: introspect columns, resolve model mapping
//!     └── filter: compile typed predicate to a boolean expression
//! TableDependency::start()
//!     ├── provision: queue + trigger + dequeue routine + watchdog
//!     └── runtime: arm watchdog → dequeue → disarm → decode → dispatch
//! TableDependency::stop() / dispose()
//!     └── cancel loop, join task, tear down the object set
//! ```
//!
//! Backend specifics live behind two seams: [`driver::SqlDriver`] (transport)
//! and [`dialect::SqlDialect`] (script text). The engine depends only on
//! those traits.
//!
//! ## Delivery semantics
//!
//! At-least-once, best-effort notification to live listeners. No history
//! replay, no cross-table joins, no exactly-once guarantee. Messages are
//! dispatched in queue order, which preserves row order within a single
//! multi-row statement.

pub mod catalog;
pub mod dependency;
pub mod dialect;
pub mod dispatch;
pub mod driver;
pub mod error;
pub mod filter;
pub mod model;
pub mod provision;
pub mod runtime;

pub use catalog::{ColumnDescriptor, ColumnMapping};
pub use dependency::{
    TableDependency, TableDependencyOptions, DEFAULT_TIMEOUT_SECS,
    DEFAULT_WATCHDOG_TIMEOUT_SECS, MIN_TIMEOUT_SECS, WATCHDOG_SAFETY_MARGIN_SECS,
};
pub use dialect::{ProvisioningStep, SqlDialect, SqlServerDialect};
pub use dispatch::{ListenerId, RecordChanged};
pub use driver::{ChangeMessage, DequeueOutcome, DriverError, SqlConnection, SqlDriver};
pub use error::{Result, TableWatchError};
pub use filter::{col, lit, FilterExpr, FilterTranslator, SqlFilter, TableFilter};
pub use model::TableRecord;
pub use provision::{NamingToken, ObjectNames, ObjectProvisioner, ProvisioningPlan};
pub use runtime::DependencyStatus;

// Re-export the shared models alongside the engine types.
pub use tablewatch_commons::{ChangeType, Row, SqlDataType, SqlValue, TableRef};
