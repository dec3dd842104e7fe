#![deny(clippy::pedantic, unsafe_code)]
#![allow(clippy::module_name_repetitions)]

//! Authorization for pkgd write operations
//!
//! The transaction pipeline asks an [`AuthorizationGate`] whether a caller may
//! perform an action. The answer is allow, deny, or a [`Challenge`] that
//! suspends the transaction until an authentication agent answers it through
//! the [`ChallengeBroker`].

mod broker;
mod policy;

pub use broker::{ChallengeBroker, ChallengeInfo};
pub use policy::PolicyGate;

use async_trait::async_trait;
use pkgd_errors::AuthError;
use pkgd_types::Caller;
use std::fmt;
use std::sync::Weak;
use tokio::sync::oneshot;

/// Action name reads are authorized under
pub const QUERY_ACTION: &str = "query";

/// Action name for switching repositories on and off
pub const REPOS_ACTION: &str = "repos";

/// Result of an authorization check
#[derive(Debug)]
pub enum Decision {
    Allow,
    Deny,
    /// Ask the caller to authenticate; resolved by `Challenge::answer`
    Challenge(Challenge),
}

/// Pending interactive authorization
///
/// Dropping the challenge withdraws it from the broker it came from.
pub struct Challenge {
    id: String,
    prompt: String,
    answer: Option<oneshot::Receiver<bool>>,
    broker: Weak<ChallengeBroker>,
}

impl Challenge {
    /// Challenge that is not registered with any broker
    #[must_use]
    pub fn detached(
        id: impl Into<String>,
        prompt: impl Into<String>,
        answer: oneshot::Receiver<bool>,
    ) -> Self {
        Self {
            id: id.into(),
            prompt: prompt.into(),
            answer: Some(answer),
            broker: Weak::new(),
        }
    }

    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    #[must_use]
    pub fn prompt(&self) -> &str {
        &self.prompt
    }

    /// Wait for the agent's answer
    ///
    /// A challenge whose responder went away counts as refused.
    pub async fn answer(&mut self) -> bool {
        match self.answer.take() {
            Some(receiver) => receiver.await.unwrap_or(false),
            None => false,
        }
    }
}

impl fmt::Debug for Challenge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Challenge")
            .field("id", &self.id)
            .field("prompt", &self.prompt)
            .finish_non_exhaustive()
    }
}

impl Drop for Challenge {
    fn drop(&mut self) {
        if let Some(broker) = self.broker.upgrade() {
            broker.withdraw(&self.id);
        }
    }
}

/// Decides whether a caller may perform an action
#[async_trait]
pub trait AuthorizationGate: Send + Sync {
    /// Check `action` (an authorization action name such as `install`)
    ///
    /// # Errors
    ///
    /// Returns an error when the action is unknown or the backend cannot
    /// answer; the pipeline treats both as a denial.
    async fn check(&self, caller: &Caller, action: &str) -> Result<Decision, AuthError>;
}
