//! Message decoding and listener dispatch.
//!
//! Decoding maps a raw [`ChangeMessage`] back into a typed
//! [`RecordChanged<T>`] through the column mapping. Dispatch invokes every
//! registered listener synchronously, in registration order, on the loop's
//! own task; a panicking listener is logged and skipped, it never takes the
//! loop down. The one exception is the mapping-mismatch error raised during
//! decoding, which means the engine itself is misconfigured and is allowed to
//! stop the loop.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use log::{error, trace};
use parking_lot::{Mutex, RwLock};
use serde_json::{Map as JsonMap, Value as JsonValue};

use tablewatch_commons::{wire, ChangeType};

use crate::catalog::ColumnMapping;
use crate::driver::ChangeMessage;
use crate::error::{Result, TableWatchError};
use crate::model::TableRecord;
use crate::runtime::DependencyStatus;

/// A decoded change, handed to user listeners.
///
/// Immutable; discarded after listener invocation returns.
#[derive(Debug, Clone)]
pub struct RecordChanged<T> {
    pub change_type: ChangeType,
    pub entity: T,
    /// Previous values, when old-value capture was provisioned.
    pub entity_old_values: Option<T>,
}

/// Decode one message into a typed record.
///
/// Payload members that map to no model property are ignored. A payload that
/// matches *zero* mapped columns — or that serde cannot materialize into the
/// model — is a mapping mismatch: for dynamically-shaped payloads that can
/// only surface once the first message arrives, so it is reported as the
/// construction-time error promoted to a runtime fault.
pub fn decode_record<T: TableRecord>(
    message: &ChangeMessage,
    mapping: &ColumnMapping,
) -> Result<RecordChanged<T>> {
    let shape = mapping.column_shape();

    let entity = decode_entity::<T>(&message.payload, mapping, &shape)?;
    let entity_old_values = match &message.old_payload {
        Some(old) => Some(decode_entity::<T>(old, mapping, &shape)?),
        None => None,
    };

    Ok(RecordChanged {
        change_type: message.change_type,
        entity,
        entity_old_values,
    })
}

fn decode_entity<T: TableRecord>(
    payload: &str,
    mapping: &ColumnMapping,
    shape: &[(String, tablewatch_commons::SqlDataType)],
) -> Result<T> {
    let row = wire::decode_row(payload, shape)?;
    if row.is_empty() {
        return Err(TableWatchError::NoMatchBetweenModelAndColumns);
    }

    let mut object = JsonMap::with_capacity(row.len());
    for entry in mapping.entries() {
        if let Some(value) = row.get(&entry.column) {
            object.insert(entry.property.clone(), value.to_json());
        }
    }

    serde_json::from_value(JsonValue::Object(object))
        .map_err(|_| TableWatchError::NoMatchBetweenModelAndColumns)
}

// ---------------------------------------------------------------------------
// Listener hub
// ---------------------------------------------------------------------------

/// Handle returned by listener registration.
pub type ListenerId = u64;

type ChangeHandler<T> = Arc<dyn Fn(&RecordChanged<T>) + Send + Sync>;
type ErrorHandler = Arc<dyn Fn(&TableWatchError) + Send + Sync>;
type StatusHandler = Arc<dyn Fn(DependencyStatus) + Send + Sync>;

/// Ordered listener registries plus the current status value.
///
/// Listeners run synchronously in registration order. Each invocation is
/// wrapped in an isolation boundary: a panic is logged and the remaining
/// listeners still run.
pub struct ListenerHub<T> {
    changed: RwLock<Vec<(ListenerId, ChangeHandler<T>)>>,
    errors: RwLock<Vec<(ListenerId, ErrorHandler)>>,
    status: RwLock<Vec<(ListenerId, StatusHandler)>>,
    current_status: Mutex<DependencyStatus>,
    next_id: AtomicU64,
}

impl<T> ListenerHub<T> {
    pub fn new() -> Self {
        Self {
            changed: RwLock::new(Vec::new()),
            errors: RwLock::new(Vec::new()),
            status: RwLock::new(Vec::new()),
            current_status: Mutex::new(DependencyStatus::Starting),
            next_id: AtomicU64::new(1),
        }
    }

    fn next_id(&self) -> ListenerId {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    pub fn on_changed(
        &self,
        handler: impl Fn(&RecordChanged<T>) + Send + Sync + 'static,
    ) -> ListenerId {
        let id = self.next_id();
        self.changed.write().push((id, Arc::new(handler)));
        id
    }

    pub fn on_error(
        &self,
        handler: impl Fn(&TableWatchError) + Send + Sync + 'static,
    ) -> ListenerId {
        let id = self.next_id();
        self.errors.write().push((id, Arc::new(handler)));
        id
    }

    pub fn on_status_changed(
        &self,
        handler: impl Fn(DependencyStatus) + Send + Sync + 'static,
    ) -> ListenerId {
        let id = self.next_id();
        self.status.write().push((id, Arc::new(handler)));
        id
    }

    pub fn remove(&self, id: ListenerId) -> bool {
        fn retain<H>(list: &RwLock<Vec<(ListenerId, H)>>, id: ListenerId) -> bool {
            let mut guard = list.write();
            let before = guard.len();
            guard.retain(|(i, _)| *i != id);
            guard.len() != before
        }
        let removed = retain(&self.changed, id);
        let removed = retain(&self.errors, id) || removed;
        retain(&self.status, id) || removed
    }

    pub fn has_change_listeners(&self) -> bool {
        !self.changed.read().is_empty()
    }

    pub fn current_status(&self) -> DependencyStatus {
        *self.current_status.lock()
    }

    /// Force the status value without notifying listeners (fresh start).
    pub fn reset_status(&self, status: DependencyStatus) {
        *self.current_status.lock() = status;
    }

    /// Transition the status, notifying status listeners on change.
    pub fn set_status(&self, status: DependencyStatus) {
        {
            let mut current = self.current_status.lock();
            if *current == status {
                return;
            }
            *current = status;
        }
        trace!("status changed to {status}");
        let handlers: Vec<StatusHandler> =
            self.status.read().iter().map(|(_, h)| Arc::clone(h)).collect();
        for handler in handlers {
            if catch_unwind(AssertUnwindSafe(|| handler(status))).is_err() {
                error!("status listener panicked; continuing");
            }
        }
    }

    /// Dispatch one record to every change listener, in order.
    pub fn emit_changed(&self, record: &RecordChanged<T>) {
        let handlers: Vec<ChangeHandler<T>> =
            self.changed.read().iter().map(|(_, h)| Arc::clone(h)).collect();
        trace!(
            "dispatching {} change to {} listener(s)",
            record.change_type,
            handlers.len()
        );
        for handler in handlers {
            if catch_unwind(AssertUnwindSafe(|| handler(record))).is_err() {
                error!("change listener panicked; continuing with remaining listeners");
            }
        }
    }

    /// Report one error to every error listener, in order.
    pub fn emit_error(&self, err: &TableWatchError) {
        let handlers: Vec<ErrorHandler> =
            self.errors.read().iter().map(|(_, h)| Arc::clone(h)).collect();
        for handler in handlers {
            if catch_unwind(AssertUnwindSafe(|| handler(err))).is_err() {
                error!("error listener panicked; continuing");
            }
        }
    }
}

impl<T> Default for ListenerHub<T> {
    fn default() -> Self {
        Self::new()
    }
}
