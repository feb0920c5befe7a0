//! The transport seam between the engine and a concrete RDBMS driver.
//!
//! The engine never opens sockets itself. Everything it needs from a backend
//! is behind [`SqlDriver`] / [`SqlConnection`]:
//! - execute a statement (DDL, watchdog arm/disarm, conversation end)
//! - run a query and get rows back (catalog introspection)
//! - block on the queue with a timeout, honoring cancellation
//!
//! Implementations are thin wrappers over a driver crate for the target
//! server. The integration suite ships an in-memory implementation; see
//! `tests/common`.

use async_trait::async_trait;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use tablewatch_commons::{ChangeType, Row};

/// Errors surfaced by a driver implementation.
#[derive(Error, Debug)]
pub enum DriverError {
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Execution error: {0}")]
    Execution(String),

    /// The blocking dequeue was interrupted by the caller's token.
    /// Never reported to error listeners.
    #[error("Dequeue cancelled")]
    Cancelled,

    #[error("Transport error: {0}")]
    Transport(String),
}

/// Raw payload pulled off the queue.
///
/// Transient: exists only between dequeue and dispatch. The payload blobs are
/// the JSON documents produced by the change-capture trigger; see
/// `tablewatch_commons::wire`.
#[derive(Debug, Clone)]
pub struct ChangeMessage {
    pub change_type: ChangeType,
    /// New row values (current values for DELETE).
    pub payload: String,
    /// Previous row values, present when old-value capture was provisioned.
    pub old_payload: Option<String>,
}

impl ChangeMessage {
    /// Split a raw queue message into a [`ChangeMessage`].
    ///
    /// The message type name carries the change kind (the provisioner derives
    /// type names containing `insert`/`update`/`delete`); the body is the
    /// trigger's envelope `{"row": {...}, "old": {...}}`. Returns `None` for
    /// the keepalive sentinel, broker control messages (dialog timer, end
    /// dialog) and anything unparseable — callers surface those as a timeout
    /// outcome, never to listeners.
    pub fn from_wire(message_type: &str, body: &str) -> Option<ChangeMessage> {
        let change_type = if message_type.contains("insert") {
            ChangeType::Insert
        } else if message_type.contains("update") {
            ChangeType::Update
        } else if message_type.contains("delete") {
            ChangeType::Delete
        } else {
            return None;
        };

        let envelope: serde_json::Value = serde_json::from_str(body).ok()?;
        let row = envelope.get("row")?;
        if !row.is_object() {
            return None;
        }
        let old_payload = match envelope.get("old") {
            Some(old) if old.is_object() => Some(old.to_string()),
            _ => None,
        };
        Some(ChangeMessage {
            change_type,
            payload: row.to_string(),
            old_payload,
        })
    }
}

/// Result of one blocking dequeue call.
#[derive(Debug)]
pub enum DequeueOutcome {
    /// A real change message.
    Message(ChangeMessage),
    /// The wait elapsed, or the internal keepalive sentinel was received.
    Timeout,
}

/// One live connection to the server.
#[async_trait]
pub trait SqlConnection: Send {
    /// Execute a statement, returning the affected row count.
    async fn execute(&mut self, statement: &str) -> Result<u64, DriverError>;

    /// Run a query and return its result rows.
    async fn query_rows(&mut self, statement: &str) -> Result<Vec<Row>, DriverError>;

    /// Block on the queue until a message arrives, the timeout elapses, or
    /// the token is cancelled. Cancellation must abort the wait promptly and
    /// return [`DriverError::Cancelled`].
    async fn dequeue(
        &mut self,
        dequeue_statement: &str,
        timeout_secs: u32,
        cancel: &CancellationToken,
    ) -> Result<DequeueOutcome, DriverError>;
}

/// Factory for connections.
#[async_trait]
pub trait SqlDriver: Send + Sync + 'static {
    async fn connect(&self, connection_string: &str)
        -> Result<Box<dyn SqlConnection>, DriverError>;
}
