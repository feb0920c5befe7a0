//! The notification loop state machine.
//!
//! One dedicated background task per dependency instance. Each iteration:
//! arm the watchdog countdown, block on the dequeue (bounded by the caller's
//! timeout, interruptible by the cancellation token), clear the countdown,
//! then decode and dispatch if a real message arrived.
//!
//! Terminal semantics:
//! - caller-initiated cancellation ends the conversation gracefully and
//!   reports `StopDueToCancellation`; no error listener fires
//! - any other fault reports `StopDueToError` and notifies error listeners
//!   exactly once; the watchdog stays armed server-side so the provisioned
//!   objects are cleaned up even if this process never runs teardown

use std::fmt;
use std::sync::Arc;

use log::{debug, info, trace, warn};
use tokio_util::sync::CancellationToken;

use crate::catalog::ColumnMapping;
use crate::dialect::SqlDialect;
use crate::dispatch::{decode_record, ListenerHub};
use crate::driver::{DequeueOutcome, DriverError, SqlConnection, SqlDriver};
use crate::error::{Result, TableWatchError};
use crate::model::TableRecord;
use crate::provision::ObjectNames;

/// Lifecycle status of one dependency instance.
///
/// Monotonic within one start/stop cycle: there is no transition out of a
/// `StopDue*` state except through a fresh start.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DependencyStatus {
    Starting,
    Started,
    WaitingForNotification,
    StopDueToCancellation,
    StopDueToError,
}

impl fmt::Display for DependencyStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DependencyStatus::Starting => "Starting",
            DependencyStatus::Started => "Started",
            DependencyStatus::WaitingForNotification => "WaitingForNotification",
            DependencyStatus::StopDueToCancellation => "StopDueToCancellation",
            DependencyStatus::StopDueToError => "StopDueToError",
        };
        write!(f, "{name}")
    }
}

/// Everything the background task needs, owned for its lifetime.
pub(crate) struct LoopContext<T: TableRecord> {
    pub driver: Arc<dyn SqlDriver>,
    pub dialect: Arc<dyn SqlDialect>,
    pub connection_string: String,
    pub names: ObjectNames,
    pub mapping: ColumnMapping,
    pub hub: Arc<ListenerHub<T>>,
    pub timeout_secs: u32,
    pub watchdog_timeout_secs: u32,
    pub cancel: CancellationToken,
}

/// Run the loop to its terminal state. Never panics out of the task; every
/// failure path lands in a status transition.
pub(crate) async fn run_notification_loop<T: TableRecord>(ctx: LoopContext<T>) {
    let token = ctx.names.token.as_str().to_string();
    match loop_body(&ctx).await {
        Ok(()) => {
            info!("notification loop for token {token} stopped by cancellation");
            ctx.hub.set_status(DependencyStatus::StopDueToCancellation);
        }
        Err(err) => {
            warn!("notification loop for token {token} stopped on error: {err}");
            ctx.hub.set_status(DependencyStatus::StopDueToError);
            ctx.hub.emit_error(&err);
        }
    }
}

/// Ok(()) means cancellation was observed; Err is a loop fault.
async fn loop_body<T: TableRecord>(ctx: &LoopContext<T>) -> Result<()> {
    let mut conn = ctx
        .driver
        .connect(&ctx.connection_string)
        .await
        .map_err(|e| TableWatchError::Connection(e.to_string()))?;

    let dequeue_stmt = ctx.dialect.dequeue_statement(&ctx.names, ctx.timeout_secs);
    let arm_stmt = ctx
        .dialect
        .arm_watchdog_statement(&ctx.names, ctx.watchdog_timeout_secs);
    let disarm_stmt = ctx.dialect.disarm_watchdog_statement(&ctx.names);

    loop {
        if ctx.cancel.is_cancelled() {
            end_conversations(ctx, conn.as_mut()).await;
            return Ok(());
        }

        conn.execute(&arm_stmt).await?;
        ctx.hub.set_status(DependencyStatus::WaitingForNotification);

        let outcome = match conn
            .dequeue(&dequeue_stmt, ctx.timeout_secs, &ctx.cancel)
            .await
        {
            Ok(outcome) => outcome,
            Err(DriverError::Cancelled) => {
                if let Err(e) = conn.execute(&disarm_stmt).await {
                    warn!("failed to disarm watchdog during cancellation: {e}");
                }
                end_conversations(ctx, conn.as_mut()).await;
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        };

        conn.execute(&disarm_stmt).await?;

        match outcome {
            DequeueOutcome::Timeout => {
                trace!("dequeue wait elapsed; re-arming watchdog");
            }
            DequeueOutcome::Message(message) => {
                debug!("received {} message", message.change_type);
                // A mapping mismatch here means the engine is misconfigured;
                // it propagates and stops the loop.
                let record = decode_record::<T>(&message, &ctx.mapping)?;
                ctx.hub.emit_changed(&record);
            }
        }
    }
}

async fn end_conversations<T: TableRecord>(ctx: &LoopContext<T>, conn: &mut dyn SqlConnection) {
    let stmt = ctx.dialect.end_conversation_statement(&ctx.names);
    if let Err(e) = conn.execute(&stmt).await {
        warn!(
            "failed to end conversations for token {}: {e}",
            ctx.names.token.as_str()
        );
    }
}
