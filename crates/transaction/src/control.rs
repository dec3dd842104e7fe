//! Cancellation handshake between clients and a running transaction

use pkgd_errors::FailureCause;
use pkgd_events::Outcome;
use pkgd_types::{Phase, TransactionSummary};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::watch;

/// Answer to a cancel request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CancelReply {
    /// The transaction will end `Cancelled`, at the latest when the engine
    /// call in flight returns, whatever that call's result
    Ack,
    /// Commit already started or the transaction finished
    Refused,
}

#[derive(Debug)]
struct ControlState {
    phase: Phase,
    requested: bool,
}

/// Shared between the transaction task and whoever may cancel it
///
/// Phase changes and cancel requests go through the same lock, so a cancel
/// either lands before `Committing` is entered or is refused.
#[derive(Debug)]
pub struct Control {
    state: Mutex<ControlState>,
    signal: watch::Sender<bool>,
}

impl Control {
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(ControlState {
                phase: Phase::Pending,
                requested: false,
            }),
            signal: watch::Sender::new(false),
        })
    }

    fn state(&self) -> MutexGuard<'_, ControlState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Ask the transaction to stop
    pub fn cancel(&self) -> CancelReply {
        let mut state = self.state();
        if !state.phase.accepts_cancel() {
            return CancelReply::Refused;
        }
        state.requested = true;
        self.signal.send_replace(true);
        CancelReply::Ack
    }

    #[must_use]
    pub fn is_requested(&self) -> bool {
        self.state().requested
    }

    #[must_use]
    pub fn phase(&self) -> Phase {
        self.state().phase
    }

    /// Move to `phase` unless a cancel is pending
    ///
    /// Returns `false` when the transaction must stop instead.
    pub(crate) fn advance(&self, phase: Phase) -> bool {
        let mut state = self.state();
        if state.requested {
            return false;
        }
        state.phase = phase;
        true
    }

    /// Settle the outcome and record its terminal phase
    ///
    /// An acknowledged cancel wins over the result. Later cancels are refused.
    pub(crate) fn conclude(&self, result: Result<TransactionSummary, FailureCause>) -> Outcome {
        let mut state = self.state();
        let outcome = if state.requested {
            Outcome::Cancelled
        } else {
            match result {
                Ok(summary) => Outcome::Succeeded { summary },
                Err(FailureCause::Cancelled) => Outcome::Cancelled,
                Err(cause) => Outcome::failed(cause),
            }
        };
        state.phase = outcome.phase();
        outcome
    }

    /// Resolves once a cancel was acknowledged
    pub async fn cancelled(&self) {
        let mut signal = self.signal.subscribe();
        if signal.wait_for(|requested| *requested).await.is_err() {
            // sender lives in self, so this never happens
            std::future::pending::<()>().await;
        }
    }
}
