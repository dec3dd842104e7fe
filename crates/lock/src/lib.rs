#![deny(clippy::pedantic, unsafe_code)]
#![allow(clippy::module_name_repetitions)]

//! Package database lock for pkgd
//!
//! At most one write transaction may mutate the package database at a time.
//! [`LockManager::acquire`] never blocks: a busy lock is reported to the
//! caller, which decides whether to back off and retry (see [`Backoff`]).
//! Every acquisition, release and rejection lands in a bounded audit trail.

mod audit;
mod backoff;

pub use audit::{AuditEntry, AuditEvent};
pub use backoff::Backoff;

use chrono::{DateTime, Utc};
use pkgd_errors::LockError;
use pkgd_types::{Caller, OperationId};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Proof of ownership returned by a successful acquire
///
/// Not `Clone`; only the owner can release.
#[derive(Debug, PartialEq, Eq)]
pub struct LockToken {
    serial: u64,
    operation: OperationId,
}

impl LockToken {
    #[must_use]
    pub fn serial(&self) -> u64 {
        self.serial
    }

    #[must_use]
    pub fn operation(&self) -> OperationId {
        self.operation
    }
}

/// Current owner of the lock
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockHolder {
    pub operation: OperationId,
    pub caller: Caller,
    pub serial: u64,
    pub acquired_at: DateTime<Utc>,
}

/// Snapshot reported to superuser clients
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LockStatus {
    pub holder: Option<LockHolder>,
    pub audit: Vec<AuditEntry>,
}

#[derive(Debug, Default)]
struct LockState {
    holder: Option<LockHolder>,
    next_serial: u64,
    audit: VecDeque<AuditEntry>,
}

/// Process-wide exclusive lock over the package database
#[derive(Debug)]
pub struct LockManager {
    state: Mutex<LockState>,
    audit_capacity: usize,
}

impl LockManager {
    #[must_use]
    pub fn new(audit_capacity: usize) -> Self {
        Self {
            state: Mutex::new(LockState::default()),
            audit_capacity: audit_capacity.max(1),
        }
    }

    // Every critical section leaves the state consistent; poisoning is ignored.
    fn state(&self) -> MutexGuard<'_, LockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Try to take the lock for `operation`
    ///
    /// # Errors
    ///
    /// Returns `LockError::Busy` naming the current holder when the lock is
    /// taken, including when `operation` itself already holds it.
    pub fn acquire(&self, operation: OperationId, caller: Caller) -> Result<LockToken, LockError> {
        let mut state = self.state();
        if let Some(holder) = &state.holder {
            let holder_op = holder.operation;
            self.record(
                &mut state,
                AuditEvent::BusyRejected,
                operation,
                caller,
                Some(holder_op),
            );
            return Err(LockError::Busy {
                holder: holder_op.to_string(),
            });
        }

        state.next_serial += 1;
        let serial = state.next_serial;
        state.holder = Some(LockHolder {
            operation,
            caller,
            serial,
            acquired_at: Utc::now(),
        });
        self.record(&mut state, AuditEvent::Acquired, operation, caller, None);
        Ok(LockToken { serial, operation })
    }

    /// Release the lock held by `token`
    ///
    /// Releasing a stale token, or releasing twice, is a logged no-op.
    /// Returns whether the lock was actually freed.
    pub fn release(&self, token: &LockToken) -> bool {
        let mut state = self.state();
        match &state.holder {
            Some(holder) if holder.serial == token.serial => {
                let caller = holder.caller;
                state.holder = None;
                self.record(
                    &mut state,
                    AuditEvent::Released,
                    token.operation,
                    caller,
                    None,
                );
                true
            }
            other => {
                let current = other.as_ref().map(|holder| holder.operation);
                let caller = other.as_ref().map_or(Caller::root(), |holder| holder.caller);
                self.record(
                    &mut state,
                    AuditEvent::StaleRelease,
                    token.operation,
                    caller,
                    current,
                );
                false
            }
        }
    }

    /// Take the lock and wrap it in a lease that releases on drop
    ///
    /// # Errors
    ///
    /// Same as [`LockManager::acquire`].
    pub fn acquire_lease(
        self: &Arc<Self>,
        operation: OperationId,
        caller: Caller,
    ) -> Result<LockLease, LockError> {
        let token = self.acquire(operation, caller)?;
        Ok(LockLease {
            manager: Arc::clone(self),
            token: Some(token),
        })
    }

    #[must_use]
    pub fn holder(&self) -> Option<LockHolder> {
        self.state().holder.clone()
    }

    #[must_use]
    pub fn is_held(&self) -> bool {
        self.state().holder.is_some()
    }

    /// Audit trail, oldest first
    #[must_use]
    pub fn audit(&self) -> Vec<AuditEntry> {
        self.state().audit.iter().cloned().collect()
    }

    #[must_use]
    pub fn status(&self) -> LockStatus {
        let state = self.state();
        LockStatus {
            holder: state.holder.clone(),
            audit: state.audit.iter().cloned().collect(),
        }
    }

    fn record(
        &self,
        state: &mut LockState,
        event: AuditEvent,
        operation: OperationId,
        caller: Caller,
        holder: Option<OperationId>,
    ) {
        let entry = AuditEntry {
            at: Utc::now(),
            event,
            operation,
            caller,
            holder,
        };
        entry.log();
        if state.audit.len() == self.audit_capacity {
            state.audit.pop_front();
        }
        state.audit.push_back(entry);
    }
}

impl Default for LockManager {
    fn default() -> Self {
        Self::new(256)
    }
}

/// RAII wrapper around a [`LockToken`]
///
/// Dropping an unreleased lease frees the lock, so a transaction task that
/// unwinds never leaves the database locked.
#[derive(Debug)]
pub struct LockLease {
    manager: Arc<LockManager>,
    token: Option<LockToken>,
}

impl LockLease {
    #[must_use]
    pub fn serial(&self) -> Option<u64> {
        self.token.as_ref().map(LockToken::serial)
    }

    #[must_use]
    pub fn is_released(&self) -> bool {
        self.token.is_none()
    }

    /// Release now; later calls and the eventual drop do nothing
    pub fn release(&mut self) -> bool {
        match self.token.take() {
            Some(token) => self.manager.release(&token),
            None => false,
        }
    }
}

impl Drop for LockLease {
    fn drop(&mut self) {
        if let Some(token) = self.token.take() {
            tracing::warn!(
                target: "pkgd::lock::audit",
                operation = %token.operation,
                "lock lease dropped while held, releasing"
            );
            self.manager.release(&token);
        }
    }
}
