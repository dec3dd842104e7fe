//! Phase-by-phase driver of one write transaction

use crate::control::Control;
use crate::reporter::PhaseReporter;
use crate::TransactionContext;
use pkgd_auth::Decision;
use pkgd_errors::{EngineError, EngineErrorKind, FailureCause, LockError};
use pkgd_events::{EventKind, Outcome, ProgressEvent};
use pkgd_lock::{Backoff, LockLease};
use pkgd_types::{Action, Caller, OperationId, Phase, Progress, TransactionSummary};
use std::sync::Arc;
use tokio::time::{self, Instant};

/// Drives one admitted operation from `Pending` to a terminal phase
///
/// Every phase entry is appended to the operation's log. The lock is held as a
/// [`LockLease`] from `Queued` on and released before the terminal event is
/// published, whatever the outcome.
pub struct TransactionStateMachine {
    operation: OperationId,
    caller: Caller,
    action: Action,
    context: Arc<TransactionContext>,
    control: Arc<Control>,
    lease: Option<LockLease>,
}

impl TransactionStateMachine {
    #[must_use]
    pub fn new(
        operation: OperationId,
        caller: Caller,
        action: Action,
        context: Arc<TransactionContext>,
        control: Arc<Control>,
    ) -> Self {
        Self {
            operation,
            caller,
            action,
            context,
            control,
            lease: None,
        }
    }

    #[must_use]
    pub fn control(&self) -> &Arc<Control> {
        &self.control
    }

    /// Run to completion and return the published outcome
    pub async fn run(mut self) -> Outcome {
        let result = self.drive().await;
        let outcome = self.control.conclude(result);

        if let Some(mut lease) = self.lease.take() {
            lease.release();
        }
        self.publish(ProgressEvent::terminal(self.operation, outcome.clone()));
        outcome
    }

    async fn drive(&mut self) -> Result<TransactionSummary, FailureCause> {
        self.enter(Phase::Pending, format!("{} requested by {}", self.action, self.caller))?;
        self.enter(Phase::Authorizing, "checking authorization")?;
        self.authorize().await?;

        self.enter(Phase::Queued, "waiting for the package database lock")?;
        self.acquire_lock().await?;

        self.enter(Phase::Resolving, "resolving dependencies")?;
        let summary = self.context.engine.resolve(&self.action).await?;

        self.enter(Phase::Resolved, summary.to_string())?;
        self.publish(ProgressEvent::new(
            self.operation,
            Phase::Resolved,
            EventKind::Resolved {
                summary: summary.clone(),
            },
            Progress::None,
            format!("{} changes", summary.items.len()),
        ));
        if summary.is_empty() {
            tracing::info!(operation = %self.operation, "nothing to do");
            return Ok(summary);
        }

        let reporter = PhaseReporter::new(
            self.operation,
            Arc::clone(&self.context.registry),
            Arc::clone(&self.control),
        );

        self.enter(Phase::Downloading, "downloading packages")?;
        self.context.engine.download(&summary, &reporter).await?;

        self.enter(Phase::TestRun, "running transaction test")?;
        self.context.engine.test(&summary, &reporter).await?;

        self.enter(Phase::Committing, "applying transaction")?;
        self.context.engine.commit(&summary, &reporter).await?;

        Ok(summary)
    }

    /// Enter `phase`, or stop with `Cancelled` if a cancel is pending
    fn enter(&self, phase: Phase, detail: impl Into<String>) -> Result<(), FailureCause> {
        if !self.control.advance(phase) {
            tracing::info!(operation = %self.operation, %phase, "cancelled before phase");
            return Err(FailureCause::Cancelled);
        }
        self.publish(ProgressEvent::phase_entered(self.operation, phase, detail));
        Ok(())
    }

    fn publish(&self, event: ProgressEvent) {
        if let Err(error) = self.context.registry.dispatch(self.operation, event) {
            tracing::error!(operation = %self.operation, %error, "failed to record event");
        }
    }

    async fn authorize(&self) -> Result<(), FailureCause> {
        let name = self.action.kind.name();
        let unauthorized = || FailureCause::Unauthorized {
            action: name.to_string(),
        };

        let decision = tokio::select! {
            decision = self.context.gate.check(&self.caller, name) => decision,
            () = self.control.cancelled() => return Err(FailureCause::Cancelled),
        };

        match decision {
            Ok(Decision::Allow) => Ok(()),
            Ok(Decision::Deny) => {
                tracing::info!(
                    operation = %self.operation,
                    caller = %self.caller,
                    action = name,
                    "authorization denied"
                );
                Err(unauthorized())
            }
            Ok(Decision::Challenge(mut challenge)) => {
                self.publish(ProgressEvent::new(
                    self.operation,
                    Phase::Authorizing,
                    EventKind::AuthChallenge {
                        challenge: challenge.id().to_string(),
                        prompt: challenge.prompt().to_string(),
                    },
                    Progress::None,
                    "waiting for authentication",
                ));
                let timeout = self.context.config.auth_timeout();
                tokio::select! {
                    answer = time::timeout(timeout, challenge.answer()) => match answer {
                        Ok(true) => Ok(()),
                        Ok(false) => Err(unauthorized()),
                        Err(_) => Err(FailureCause::AuthTimeout {
                            waited_secs: timeout.as_secs(),
                        }),
                    },
                    () = self.control.cancelled() => Err(FailureCause::Cancelled),
                }
            }
            Err(error) => {
                tracing::warn!(
                    operation = %self.operation,
                    %error,
                    "authorization backend failed, denying"
                );
                Err(unauthorized())
            }
        }
    }

    async fn acquire_lock(&mut self) -> Result<(), FailureCause> {
        let config = &self.context.config;
        let timeout = config.lock_timeout();
        let started = Instant::now();
        let deadline = started + timeout;
        let mut backoff = Backoff::new(config.backoff_initial(), config.backoff_max());

        loop {
            match self.context.lock.acquire_lease(self.operation, self.caller) {
                Ok(lease) => {
                    tracing::debug!(
                        operation = %self.operation,
                        attempts = backoff.attempts(),
                        "lock acquired"
                    );
                    self.lease = Some(lease);
                    return Ok(());
                }
                Err(LockError::Busy { holder }) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return Err(FailureCause::LockTimeout {
                            waited_secs: now.duration_since(started).as_secs(),
                        });
                    }
                    let delay = backoff.next_delay().min(deadline - now);
                    self.publish(ProgressEvent::new(
                        self.operation,
                        Phase::Queued,
                        EventKind::LockBusy {
                            holder: holder.clone(),
                            attempt: backoff.attempts(),
                        },
                        Progress::None,
                        format!("package database locked by {holder}"),
                    ));
                    tokio::select! {
                        () = time::sleep(delay) => {}
                        () = self.control.cancelled() => return Err(FailureCause::Cancelled),
                    }
                }
                Err(error) => {
                    return Err(FailureCause::Engine(EngineError::new(
                        EngineErrorKind::Other,
                        error.to_string(),
                    )));
                }
            }
        }
    }
}
