#![deny(clippy::pedantic, unsafe_code)]
#![allow(clippy::module_name_repetitions)]

//! Write transactions for pkgd
//!
//! [`TransactionManager::begin`] admits a write request, registers it with
//! the operation registry and spawns a [`TransactionStateMachine`] that takes
//! it through authorization, the package database lock and the engine phases.
//! Callers get the operation id back immediately and follow progress by
//! attaching to the registry.

mod control;
mod machine;
mod reporter;

pub use control::{CancelReply, Control};
pub use machine::TransactionStateMachine;

use dashmap::DashMap;
use pkgd_auth::AuthorizationGate;
use pkgd_config::TransactionConfig;
use pkgd_engine::PackageEngine;
use pkgd_errors::{DispatchError, EngineError, EngineErrorKind, FailureCause};
use pkgd_events::{Outcome, ProgressEvent};
use pkgd_lock::LockManager;
use pkgd_registry::OperationRegistry;
use pkgd_types::{Action, Caller, OperationId};
use std::sync::{Arc, Mutex, PoisonError};

/// Collaborators shared by every transaction
pub struct TransactionContext {
    pub engine: Arc<dyn PackageEngine>,
    pub gate: Arc<dyn AuthorizationGate>,
    pub lock: Arc<LockManager>,
    pub registry: Arc<OperationRegistry>,
    pub config: TransactionConfig,
}

/// Starts transactions and routes cancel requests to them
pub struct TransactionManager {
    context: Arc<TransactionContext>,
    controls: DashMap<OperationId, Arc<Control>>,
    /// Held while an operation is registered and its control installed
    admission: Mutex<()>,
}

impl TransactionManager {
    #[must_use]
    pub fn new(context: TransactionContext) -> Arc<Self> {
        Arc::new(Self {
            context: Arc::new(context),
            controls: DashMap::new(),
            admission: Mutex::new(()),
        })
    }

    #[must_use]
    pub fn context(&self) -> &TransactionContext {
        &self.context
    }

    /// Start a transaction, or return the caller's identical one in flight
    ///
    /// The flag is `true` when an existing operation was resumed. Must be
    /// called from within a tokio runtime.
    #[must_use]
    pub fn begin(self: &Arc<Self>, caller: Caller, action: Action) -> (OperationId, bool) {
        let _admission = self
            .admission
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        let (operation, resumed) = self
            .context
            .registry
            .create_or_resume(caller, action.clone());
        if resumed {
            return (operation, true);
        }

        let control = Control::new();
        self.controls.insert(operation, Arc::clone(&control));
        let machine = TransactionStateMachine::new(
            operation,
            caller,
            action,
            Arc::clone(&self.context),
            Arc::clone(&control),
        );

        let context = Arc::clone(&self.context);
        let manager = Arc::downgrade(self);
        tokio::spawn(async move {
            // the machine runs in its own task so a panic still ends the operation
            let outcome = match tokio::spawn(machine.run()).await {
                Ok(outcome) => outcome,
                Err(e) => abandon(&context, &control, operation, &e),
            };
            tracing::info!(
                operation = %operation,
                phase = %outcome.phase(),
                "transaction finished"
            );
            if let Some(manager) = manager.upgrade() {
                manager.controls.remove(&operation);
            }
        });
        (operation, false)
    }

    /// Request cancellation of a running transaction
    ///
    /// # Errors
    ///
    /// Returns `DispatchError::UnknownOperation` if the registry does not
    /// know the id.
    pub fn cancel(&self, operation: OperationId) -> Result<CancelReply, DispatchError> {
        let _admission = self
            .admission
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        if let Some(control) = self.controls.get(&operation) {
            let reply = control.cancel();
            tracing::info!(operation = %operation, ?reply, "cancel requested");
            return Ok(reply);
        }
        if self.context.registry.phase(operation).is_some() {
            return Ok(CancelReply::Refused);
        }
        Err(DispatchError::UnknownOperation {
            id: operation.to_string(),
        })
    }

    /// Transactions whose task has not finished
    #[must_use]
    pub fn active(&self) -> usize {
        self.controls.len()
    }

    #[must_use]
    pub fn is_idle(&self) -> bool {
        self.controls.is_empty()
    }
}

/// Fail an operation whose machine task died without a terminal event
///
/// The lease, if any, was released when the task unwound. A cancel
/// acknowledged before the crash still ends the operation `Cancelled`.
fn abandon(
    context: &TransactionContext,
    control: &Control,
    operation: OperationId,
    error: &tokio::task::JoinError,
) -> Outcome {
    tracing::error!(operation = %operation, error = %error, "transaction task died");
    let cause = FailureCause::Engine(EngineError::new(
        EngineErrorKind::Other,
        "transaction task panicked",
    ));
    let outcome = control.conclude(Err(cause));
    if let Err(e) = context
        .registry
        .dispatch(operation, ProgressEvent::terminal(operation, outcome.clone()))
    {
        tracing::warn!(operation = %operation, error = %e, "cannot publish terminal event");
    }
    outcome
}
