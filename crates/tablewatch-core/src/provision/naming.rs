//! Instance-scoped naming for server-side objects.
//!
//! Every dependency instance generates one random 128-bit token at
//! construction. The token scopes every object the instance provisions and is
//! the sole correlation key between the running process and its server-side
//! footprint: teardown, the watchdog job and operator audits all key off it.

use std::fmt;

use uuid::Uuid;

/// Opaque per-instance token: 32 lowercase hex characters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamingToken(String);

impl NamingToken {
    /// Generate a fresh random token.
    pub fn generate() -> Self {
        Self(Uuid::new_v4().simple().to_string())
    }

    /// Rebuild a token from its text form (operator tooling, tests).
    pub fn from_token(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NamingToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Names of every server-side object derived from one token.
#[derive(Debug, Clone)]
pub struct ObjectNames {
    pub token: NamingToken,
    pub queue: String,
    pub service: String,
    pub contract: String,
    pub trigger: String,
    pub dequeue_proc: String,
    /// Activation procedure that runs the drop-all script when the
    /// conversation timer fires with no live consumer.
    pub watchdog_proc: String,
    /// Procedure that arms/clears the watchdog countdown.
    pub timer_proc: String,
    pub msg_insert: String,
    pub msg_update: String,
    pub msg_delete: String,
    /// Keepalive sentinel message type; never dispatched to listeners.
    pub msg_keepalive: String,
}

impl ObjectNames {
    pub fn derive(token: &NamingToken) -> Self {
        let t = token.as_str();
        Self {
            token: token.clone(),
            queue: format!("tw_queue_{t}"),
            service: format!("tw_service_{t}"),
            contract: format!("tw_contract_{t}"),
            trigger: format!("tw_trigger_{t}"),
            dequeue_proc: format!("tw_dequeue_{t}"),
            watchdog_proc: format!("tw_watchdog_{t}"),
            timer_proc: format!("tw_timer_{t}"),
            msg_insert: format!("tw_msg_insert_{t}"),
            msg_update: format!("tw_msg_update_{t}"),
            msg_delete: format!("tw_msg_delete_{t}"),
            msg_keepalive: format!("tw_msg_keepalive_{t}"),
        }
    }

    /// Every derived object name, for operator verification.
    pub fn all(&self) -> Vec<&str> {
        vec![
            &self.queue,
            &self.service,
            &self.contract,
            &self.trigger,
            &self.dequeue_proc,
            &self.watchdog_proc,
            &self.timer_proc,
            &self.msg_insert,
            &self.msg_update,
            &self.msg_delete,
            &self.msg_keepalive,
        ]
    }
}
