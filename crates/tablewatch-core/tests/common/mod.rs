//! Shared fixtures for the integration suite: an in-memory driver that
//! records every executed statement, serves scripted messages and injects
//! faults at chosen points.
#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::Deserialize;
use tokio_util::sync::CancellationToken;

use tablewatch_core::driver::{
    ChangeMessage, DequeueOutcome, DriverError, SqlConnection, SqlDriver,
};
use tablewatch_core::runtime::DependencyStatus;
use tablewatch_core::{Row, SqlValue, TableRecord};

/// Scripted backend state shared by every connection of one [`FakeDriver`].
pub struct FakeState {
    /// Every statement passed to `execute`, in order.
    pub executed: Mutex<Vec<String>>,
    /// When set, `execute` fails for any statement containing this text.
    pub fail_execute_containing: Mutex<Option<String>>,
    /// Catalog served to introspection queries: (column_name, server_type).
    pub catalog: Mutex<Vec<(String, String)>>,
    pub table_exists: Mutex<bool>,
    /// Messages served by `dequeue`, FIFO.
    pub queue: Mutex<VecDeque<ChangeMessage>>,
    /// When set, the next `dequeue` fails with a transport error (once).
    pub dequeue_fault: Mutex<Option<String>>,
}

impl FakeState {
    pub fn push_message(&self, message: ChangeMessage) {
        self.queue.lock().push_back(message);
    }

    pub fn inject_dequeue_fault(&self, reason: &str) {
        *self.dequeue_fault.lock() = Some(reason.to_string());
    }

    pub fn executed(&self) -> Vec<String> {
        self.executed.lock().clone()
    }

    pub fn executed_count_containing(&self, needle: &str) -> usize {
        self.executed
            .lock()
            .iter()
            .filter(|s| s.contains(needle))
            .count()
    }
}

/// In-memory [`SqlDriver`] for the integration suite.
pub struct FakeDriver {
    pub state: Arc<FakeState>,
}

impl FakeDriver {
    /// Driver over the default `Products` catalog.
    pub fn new() -> Self {
        Self {
            state: Arc::new(FakeState {
                executed: Mutex::new(Vec::new()),
                fail_execute_containing: Mutex::new(None),
                catalog: Mutex::new(
                    [
                        ("Id", "int"),
                        ("Name", "nvarchar"),
                        ("Quantity", "int"),
                        ("CategoryId", "int"),
                    ]
                    .into_iter()
                    .map(|(n, t)| (n.to_string(), t.to_string()))
                    .collect(),
                ),
                table_exists: Mutex::new(true),
                queue: Mutex::new(VecDeque::new()),
                dequeue_fault: Mutex::new(None),
            }),
        }
    }
}

impl Default for FakeDriver {
    fn default() -> Self {
        Self::new()
    }
}

struct FakeConnection {
    state: Arc<FakeState>,
}

#[async_trait]
impl SqlConnection for FakeConnection {
    async fn execute(&mut self, statement: &str) -> Result<u64, DriverError> {
        if let Some(needle) = self.state.fail_execute_containing.lock().as_deref() {
            if statement.contains(needle) {
                return Err(DriverError::Execution(format!(
                    "scripted failure on '{needle}'"
                )));
            }
        }
        self.state.executed.lock().push(statement.to_string());
        Ok(0)
    }

    async fn query_rows(&mut self, statement: &str) -> Result<Vec<Row>, DriverError> {
        if statement.contains("sys.columns") {
            let rows = self
                .state
                .catalog
                .lock()
                .iter()
                .map(|(name, server_type)| {
                    let mut row = Row::default();
                    row.insert("column_name", SqlValue::Text(name.clone()));
                    row.insert("server_type", SqlValue::Text(server_type.clone()));
                    row.insert("max_length", SqlValue::Null);
                    row
                })
                .collect();
            return Ok(rows);
        }
        if statement.contains("sys.tables") {
            if *self.state.table_exists.lock() {
                let mut row = Row::default();
                row.insert("table_name", SqlValue::Text("Products".to_string()));
                return Ok(vec![row]);
            }
            return Ok(Vec::new());
        }
        Ok(Vec::new())
    }

    async fn dequeue(
        &mut self,
        _dequeue_statement: &str,
        timeout_secs: u32,
        cancel: &CancellationToken,
    ) -> Result<DequeueOutcome, DriverError> {
        // Scripted wait: serve a queued message or fault as soon as one is
        // staged, otherwise block like the real RECEIVE would, bounded by
        // the caller's timeout and interruptible by the token.
        let deadline = tokio::time::Instant::now() + Duration::from_secs(timeout_secs as u64);
        loop {
            if let Some(reason) = self.state.dequeue_fault.lock().take() {
                return Err(DriverError::Transport(reason));
            }
            if let Some(message) = self.state.queue.lock().pop_front() {
                return Ok(DequeueOutcome::Message(message));
            }
            if tokio::time::Instant::now() >= deadline {
                return Ok(DequeueOutcome::Timeout);
            }
            tokio::select! {
                _ = cancel.cancelled() => return Err(DriverError::Cancelled),
                _ = tokio::time::sleep(Duration::from_millis(10)) => {}
            }
        }
    }
}

#[async_trait]
impl SqlDriver for FakeDriver {
    async fn connect(&self, _connection_string: &str) -> Result<Box<dyn SqlConnection>, DriverError> {
        Ok(Box::new(FakeConnection {
            state: Arc::clone(&self.state),
        }))
    }
}

/// The test model over the default catalog.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Product {
    pub id: i32,
    pub name: Option<String>,
    pub quantity: i32,
    pub category_id: Option<i32>,
}

impl TableRecord for Product {
    fn table_name() -> String {
        "Products".to_string()
    }

    fn model_properties() -> Vec<String> {
        ["id", "name", "quantity", "category_id"]
            .into_iter()
            .map(str::to_string)
            .collect()
    }

    fn column_hints() -> Vec<(String, String)> {
        [
            ("id", "Id"),
            ("name", "Name"),
            ("quantity", "Quantity"),
            ("category_id", "CategoryId"),
        ]
        .into_iter()
        .map(|(p, c)| (p.to_string(), c.to_string()))
        .collect()
    }
}

/// Poll until the dependency reaches `wanted` or the deadline passes.
pub async fn wait_for_status<F>(status_of: F, wanted: DependencyStatus)
where
    F: Fn() -> DependencyStatus,
{
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while status_of() != wanted {
        if tokio::time::Instant::now() > deadline {
            panic!("timed out waiting for status {wanted}, last was {}", status_of());
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}
