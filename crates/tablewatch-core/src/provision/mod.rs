//! Server-side object provisioning and teardown.
//!
//! [`ObjectProvisioner`] executes the dialect's script bundle in order inside
//! one short-lived connection scope. Failure semantics are strict: if any
//! step fails, the provisioner runs a full teardown before re-surfacing the
//! original error, so a failed start never leaves partial server-side state
//! behind.
//!
//! Teardown is idempotent and existence-guarded; it is safe before anything
//! was provisioned, after a partial provision, and on repeated calls.

pub mod naming;

pub use naming::{NamingToken, ObjectNames};

use std::sync::Arc;

use log::{debug, warn};

use tablewatch_commons::{SqlDataType, TableRef};

use crate::dialect::SqlDialect;
use crate::driver::SqlDriver;
use crate::error::{Result, TableWatchError};

/// Everything the dialect needs to render the script bundle.
#[derive(Debug, Clone)]
pub struct ProvisioningPlan {
    pub table: TableRef,
    /// Interested columns in payload order: server column name plus type.
    pub columns: Vec<(String, SqlDataType)>,
    /// Optional UPDATE gate: only changes to these columns enqueue a message.
    pub update_of: Option<Vec<String>>,
    /// Compiled filter clause; rows failing it produce no message.
    pub filter_clause: Option<String>,
    pub include_old_values: bool,
}

/// Names of the objects a successful provision created, for operator
/// verification against the server catalog.
#[derive(Debug, Clone)]
pub struct ProvisionedObjects {
    pub names: ObjectNames,
    /// Step names in the order they were executed.
    pub steps: Vec<&'static str>,
}

/// Creates and removes the server-side object set for one instance.
pub struct ObjectProvisioner {
    driver: Arc<dyn SqlDriver>,
    dialect: Arc<dyn SqlDialect>,
    connection_string: String,
    names: ObjectNames,
}

impl ObjectProvisioner {
    pub fn new(
        driver: Arc<dyn SqlDriver>,
        dialect: Arc<dyn SqlDialect>,
        connection_string: impl Into<String>,
        names: ObjectNames,
    ) -> Self {
        Self {
            driver,
            dialect,
            connection_string: connection_string.into(),
            names,
        }
    }

    pub fn names(&self) -> &ObjectNames {
        &self.names
    }

    /// Execute the full provisioning sequence.
    ///
    /// On any step failure the entire object set is torn down (best effort)
    /// before the original error is returned.
    pub async fn provision(&self, plan: &ProvisioningPlan) -> Result<ProvisionedObjects> {
        let steps = self.dialect.provisioning_steps(plan, &self.names);
        let step_names: Vec<&'static str> = steps.iter().map(|s| s.name).collect();

        let mut conn = self
            .driver
            .connect(&self.connection_string)
            .await
            .map_err(|e| TableWatchError::Connection(e.to_string()))?;

        for step in &steps {
            debug!(
                "provisioning step '{}' for token {}",
                step.name,
                self.names.token.as_str()
            );
            if let Err(e) = conn.execute(&step.sql).await {
                warn!(
                    "provisioning step '{}' failed for token {}: {}; tearing down",
                    step.name,
                    self.names.token.as_str(),
                    e
                );
                drop(conn);
                if let Err(td) = self.teardown().await {
                    warn!(
                        "teardown after failed provisioning reported: {} (token {})",
                        td,
                        self.names.token.as_str()
                    );
                }
                return Err(TableWatchError::Provisioning {
                    step: step.name.to_string(),
                    reason: e.to_string(),
                });
            }
        }

        debug!(
            "provisioned {} objects for token {}",
            self.names.all().len(),
            self.names.token.as_str()
        );
        Ok(ProvisionedObjects {
            names: self.names.clone(),
            steps: step_names,
        })
    }

    /// Drop every object scoped to this instance's token.
    ///
    /// Individual drop failures are logged and skipped; the remaining
    /// statements still run, so a partially-removed object set converges.
    pub async fn teardown(&self) -> Result<()> {
        let mut conn = self
            .driver
            .connect(&self.connection_string)
            .await
            .map_err(|e| TableWatchError::Connection(e.to_string()))?;

        for stmt in self.dialect.teardown_statements(&self.names) {
            if let Err(e) = conn.execute(&stmt).await {
                warn!(
                    "teardown statement failed for token {}: {}",
                    self.names.token.as_str(),
                    e
                );
            }
        }
        debug!("teardown completed for token {}", self.names.token.as_str());
        Ok(())
    }
}
