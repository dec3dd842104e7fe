//! Lock audit trail

use chrono::{DateTime, Utc};
use pkgd_types::{Caller, OperationId};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditEvent {
    Acquired,
    Released,
    /// Acquire refused because another operation holds the lock
    BusyRejected,
    /// Release with a token that no longer owns the lock
    StaleRelease,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub at: DateTime<Utc>,
    pub event: AuditEvent,
    pub operation: OperationId,
    pub caller: Caller,
    /// Holder at the time, for rejected and stale requests
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub holder: Option<OperationId>,
}

impl AuditEntry {
    pub(crate) fn log(&self) {
        match self.event {
            AuditEvent::Acquired | AuditEvent::Released => tracing::info!(
                target: "pkgd::lock::audit",
                event = ?self.event,
                operation = %self.operation,
                caller = %self.caller,
                "package database lock {}",
                if self.event == AuditEvent::Acquired { "acquired" } else { "released" }
            ),
            AuditEvent::BusyRejected => tracing::debug!(
                target: "pkgd::lock::audit",
                event = ?self.event,
                operation = %self.operation,
                caller = %self.caller,
                holder = ?self.holder.map(|op| op.to_string()),
                "package database lock busy"
            ),
            AuditEvent::StaleRelease => tracing::warn!(
                target: "pkgd::lock::audit",
                event = ?self.event,
                operation = %self.operation,
                "release of a lock token that is not held"
            ),
        }
    }
}
