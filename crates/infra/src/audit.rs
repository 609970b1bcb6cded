//! Best-effort audit trail.

use std::sync::Arc;

use chrono::Utc;

use crate::store::{AuditEntry, AuditSink};

/// Audit action names as persisted in `audit_log.action`.
pub mod actions {
    pub const USER_LOGIN: &str = "USER_LOGIN";
    pub const USER_LOGOUT: &str = "USER_LOGOUT";
    pub const PASSWORD_RESET_REQUESTED: &str = "PASSWORD_RESET_REQUESTED";
    pub const PASSWORD_RESET_COMPLETED: &str = "PASSWORD_RESET_COMPLETED";
    pub const SELECT_ORGANISATION: &str = "SELECT_ORGANISATION";
    pub const CREATE_USER: &str = "CREATE_USER";
    pub const UPDATE_USER: &str = "UPDATE_USER";
    pub const DELETE_USER: &str = "DELETE_USER";
}

/// Writes audit rows without ever failing the caller.
#[derive(Clone)]
pub struct AuditRecorder {
    sink: Arc<dyn AuditSink>,
}

impl AuditRecorder {
    pub fn new(sink: Arc<dyn AuditSink>) -> Self {
        Self { sink }
    }

    pub async fn record(&self, entry: AuditEntry) {
        let action = entry.action;
        if let Err(err) = self.sink.record(entry, Utc::now()).await {
            tracing::warn!(action, error = %err, "audit write failed");
        }
    }
}
