//! Public lifecycle surface: [`TableDependency`].
//!
//! One instance watches one table. Construction connects, introspects and
//! validates; `start` provisions the server-side object set and launches the
//! background loop; `stop`/`dispose` cancel the loop, join the task and tear
//! the object set down. Multiple instances may watch the same table; their
//! server-side footprints are disjoint, keyed by each instance's naming
//! token.

use std::sync::Arc;

use log::{debug, info, warn};
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use tablewatch_commons::TableRef;

use crate::catalog::{self, ColumnMapping};
use crate::dialect::SqlDialect;
use crate::dispatch::{ListenerHub, ListenerId, RecordChanged};
use crate::driver::SqlDriver;
use crate::error::{Result, TableWatchError};
use crate::filter::{FilterTranslator, SqlFilter, TableFilter};
use crate::model::TableRecord;
use crate::provision::{NamingToken, ObjectNames, ObjectProvisioner, ProvisioningPlan};
use crate::runtime::{run_notification_loop, DependencyStatus, LoopContext};

/// Default dequeue wait, seconds.
pub const DEFAULT_TIMEOUT_SECS: u32 = 120;
/// Default watchdog countdown, seconds.
pub const DEFAULT_WATCHDOG_TIMEOUT_SECS: u32 = 180;
/// Lower bound for both timeouts, seconds.
pub const MIN_TIMEOUT_SECS: u32 = 60;
/// The watchdog must outlast the dequeue wait by at least this margin, so it
/// can never fire while a live consumer's own wait is still pending.
pub const WATCHDOG_SAFETY_MARGIN_SECS: u32 = 60;

/// Construction options. Everything unset falls back to what the model type
/// declares.
#[derive(Default)]
pub struct TableDependencyOptions {
    /// Schema name; defaults to `dbo`.
    pub schema: Option<String>,
    /// Table name; defaults to [`TableRecord::table_name`].
    pub table: Option<String>,
    /// Explicit property-to-column mapping (highest precedence).
    pub mapping: Option<Vec<(String, String)>>,
    /// Columns whose change alone should notify on UPDATE.
    pub update_of: Option<Vec<String>>,
    /// Server-side row filter.
    pub filter: Option<TableFilter>,
    /// Capture previous values on UPDATE.
    pub include_old_values: bool,
}

struct RunState {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

/// A live subscription to row-level changes on one table.
pub struct TableDependency<T: TableRecord> {
    driver: Arc<dyn SqlDriver>,
    dialect: Arc<dyn SqlDialect>,
    connection_string: String,
    table: TableRef,
    mapping: ColumnMapping,
    update_of: Option<Vec<String>>,
    filter: Option<Box<dyn FilterTranslator>>,
    include_old_values: bool,
    names: ObjectNames,
    hub: Arc<ListenerHub<T>>,
    run: Mutex<Option<RunState>>,
}

impl<T: TableRecord> std::fmt::Debug for TableDependency<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TableDependency")
            .field("connection_string", &self.connection_string)
            .field("table", &self.table)
            .field("mapping", &self.mapping)
            .field("update_of", &self.update_of)
            .field("include_old_values", &self.include_old_values)
            .field("names", &self.names)
            .finish_non_exhaustive()
    }
}

impl<T: TableRecord> TableDependency<T> {
    /// Connect, introspect the table and resolve the model mapping.
    ///
    /// Fails synchronously on any configuration problem: unreachable server,
    /// missing table, zero or unsupported columns, mapper or update-of
    /// inconsistency. The connection used here is closed before returning.
    pub async fn new(
        driver: Arc<dyn SqlDriver>,
        dialect: Arc<dyn SqlDialect>,
        connection_string: impl Into<String>,
        options: TableDependencyOptions,
    ) -> Result<Self> {
        let connection_string = connection_string.into();
        let table = TableRef::new(
            options.schema.unwrap_or_else(|| "dbo".to_string()),
            options.table.unwrap_or_else(T::table_name),
        );

        let mut conn = driver
            .connect(&connection_string)
            .await
            .map_err(|e| TableWatchError::Connection(e.to_string()))?;

        let columns = catalog::discover(conn.as_mut(), dialect.as_ref(), &table).await?;
        catalog::validate(&table, &columns)?;
        let mapping = ColumnMapping::resolve(
            &T::model_properties(),
            &T::column_hints(),
            options.mapping.as_deref(),
            &columns,
        )?;
        drop(conn);

        if let Some(update_of) = &options.update_of {
            if update_of.is_empty() {
                return Err(TableWatchError::UpdateOf(
                    "update-of column list is empty".to_string(),
                ));
            }
            for column in update_of {
                if column.trim().is_empty() {
                    return Err(TableWatchError::UpdateOf(
                        "update-of column list contains a blank name".to_string(),
                    ));
                }
                if !columns.iter().any(|c| c.name.eq_ignore_ascii_case(column)) {
                    return Err(TableWatchError::UpdateOf(format!(
                        "column '{column}' does not exist on {table}"
                    )));
                }
            }
        }

        let filter: Option<Box<dyn FilterTranslator>> = match options.filter {
            Some(TableFilter::Expression(expr)) => {
                Some(Box::new(SqlFilter::new(expr, mapping.clone())))
            }
            Some(TableFilter::Custom(translator)) => Some(translator),
            None => None,
        };

        let token = NamingToken::generate();
        let names = ObjectNames::derive(&token);
        info!("dependency created for {table} with naming token {token}");

        Ok(Self {
            driver,
            dialect,
            connection_string,
            table,
            mapping,
            update_of: options.update_of,
            filter,
            include_old_values: options.include_old_values,
            names,
            hub: Arc::new(ListenerHub::new()),
            run: Mutex::new(None),
        })
    }

    /// Register a change listener. At least one must be registered before
    /// `start`.
    pub fn on_changed(
        &self,
        handler: impl Fn(&RecordChanged<T>) + Send + Sync + 'static,
    ) -> ListenerId {
        self.hub.on_changed(handler)
    }

    /// Register an error listener (runtime faults only).
    pub fn on_error(
        &self,
        handler: impl Fn(&TableWatchError) + Send + Sync + 'static,
    ) -> ListenerId {
        self.hub.on_error(handler)
    }

    /// Register a status listener.
    pub fn on_status_changed(
        &self,
        handler: impl Fn(DependencyStatus) + Send + Sync + 'static,
    ) -> ListenerId {
        self.hub.on_status_changed(handler)
    }

    pub fn remove_listener(&self, id: ListenerId) -> bool {
        self.hub.remove(id)
    }

    /// The instance's naming token, for operator audits of server-side
    /// cleanup.
    pub fn naming_token(&self) -> &str {
        self.names.token.as_str()
    }

    /// Every server-side object name this instance provisions.
    pub fn object_names(&self) -> &ObjectNames {
        &self.names
    }

    pub fn table(&self) -> &TableRef {
        &self.table
    }

    pub fn status(&self) -> DependencyStatus {
        self.hub.current_status()
    }

    /// Start with the default timeouts.
    pub async fn start(&self) -> Result<()> {
        self.start_with(DEFAULT_TIMEOUT_SECS, DEFAULT_WATCHDOG_TIMEOUT_SECS)
            .await
    }

    /// Provision the server-side objects and launch the background loop.
    ///
    /// Re-entrant no-op while the loop is live. After a terminal state the
    /// previous cycle is shut down (joined and torn down) and a fresh one
    /// begins.
    pub async fn start_with(&self, timeout_secs: u32, watchdog_timeout_secs: u32) -> Result<()> {
        if timeout_secs < MIN_TIMEOUT_SECS || watchdog_timeout_secs < MIN_TIMEOUT_SECS {
            return Err(TableWatchError::InvalidTimeout(format!(
                "timeouts must be at least {MIN_TIMEOUT_SECS} seconds"
            )));
        }
        if watchdog_timeout_secs < timeout_secs + WATCHDOG_SAFETY_MARGIN_SECS {
            return Err(TableWatchError::InvalidTimeout(format!(
                "watchdog timeout must be at least the dequeue timeout plus \
                 {WATCHDOG_SAFETY_MARGIN_SECS} seconds"
            )));
        }
        if !self.hub.has_change_listeners() {
            return Err(TableWatchError::NoSubscriber);
        }

        // Live loop: re-entrant no-op. Terminal loop: clean up and restart.
        let previous = {
            let mut run = self.run.lock();
            match run.take() {
                Some(state) if !state.task.is_finished() => {
                    *run = Some(state);
                    debug!("start() ignored; dependency already running");
                    return Ok(());
                }
                other => other,
            }
        };
        if previous.is_some() {
            self.shutdown(previous).await;
        }

        self.hub.set_status(DependencyStatus::Starting);

        let filter_clause = match &self.filter {
            Some(translator) => Some(translator.translate()?),
            None => None,
        };
        let plan = ProvisioningPlan {
            table: self.table.clone(),
            columns: self.mapping.column_shape(),
            update_of: self.update_of.clone(),
            filter_clause,
            include_old_values: self.include_old_values,
        };

        let provisioner = self.provisioner();
        provisioner.provision(&plan).await?;
        self.hub.set_status(DependencyStatus::Started);
        info!(
            "started watching {} (token {})",
            self.table,
            self.names.token.as_str()
        );

        let cancel = CancellationToken::new();
        let ctx = LoopContext {
            driver: Arc::clone(&self.driver),
            dialect: Arc::clone(&self.dialect),
            connection_string: self.connection_string.clone(),
            names: self.names.clone(),
            mapping: self.mapping.clone(),
            hub: Arc::clone(&self.hub),
            timeout_secs,
            watchdog_timeout_secs,
            cancel: cancel.clone(),
        };
        let task = tokio::spawn(run_notification_loop(ctx));
        *self.run.lock() = Some(RunState { cancel, task });
        Ok(())
    }

    /// Cancel the loop, join the task and tear the object set down.
    ///
    /// Idempotent; safe before `start` and on repeated calls.
    pub async fn stop(&self) {
        let state = self.run.lock().take();
        self.shutdown(state).await;
    }

    /// Fast-path graceful shutdown; equivalent to [`stop`](Self::stop).
    ///
    /// This is the cooperative cleanup path. If the process dies without it,
    /// the server-side watchdog job removes the provisioned objects on its
    /// own: the watchdog, not any in-process destructor, is the authoritative
    /// crash-recovery mechanism.
    pub async fn dispose(&self) {
        self.stop().await;
    }

    fn provisioner(&self) -> ObjectProvisioner {
        ObjectProvisioner::new(
            Arc::clone(&self.driver),
            Arc::clone(&self.dialect),
            self.connection_string.clone(),
            self.names.clone(),
        )
    }

    /// Joins the previous cycle's task (if any) and runs teardown once.
    async fn shutdown(&self, state: Option<RunState>) {
        let Some(state) = state else {
            return;
        };
        state.cancel.cancel();
        if let Err(e) = state.task.await {
            warn!("background task did not join cleanly: {e}");
        }
        if let Err(e) = self.provisioner().teardown().await {
            warn!(
                "teardown failed for token {}: {e}; the watchdog job will finish the cleanup",
                self.names.token.as_str()
            );
        } else {
            debug!("stopped and tore down token {}", self.names.token.as_str());
        }
    }
}

impl<T: TableRecord> Drop for TableDependency<T> {
    fn drop(&mut self) {
        if let Some(state) = self.run.get_mut().take() {
            state.cancel.cancel();
            warn!(
                "dependency for token {} dropped while running; \
                 the watchdog job will clean up its server-side objects",
                self.names.token.as_str()
            );
        }
    }
}
