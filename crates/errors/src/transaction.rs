//! Terminal failure causes of a transaction

use std::borrow::Cow;

use crate::{EngineError, UserFacingError};
use thiserror::Error;

/// Why a transaction ended in `Failed` or `Cancelled`
#[derive(Debug, Clone, Error)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(tag = "cause", rename_all = "snake_case"))]
pub enum FailureCause {
    #[error("caller is not authorized to {action}")]
    Unauthorized { action: String },

    #[error("authorization challenge timed out after {waited_secs}s")]
    AuthTimeout { waited_secs: u64 },

    #[error("package database lock not acquired within {waited_secs}s")]
    LockTimeout { waited_secs: u64 },

    #[error("dependency resolution failed: {}", .problems.join("; "))]
    ResolutionConflict { problems: Vec<String> },

    #[error("{0}")]
    Engine(EngineError),

    #[error("transaction cancelled")]
    Cancelled,
}

impl From<EngineError> for FailureCause {
    fn from(err: EngineError) -> Self {
        if err.is_conflict() {
            let mut problems = err.details;
            if problems.is_empty() {
                problems.push(err.message);
            }
            Self::ResolutionConflict { problems }
        } else {
            Self::Engine(err)
        }
    }
}

impl UserFacingError for FailureCause {
    fn user_message(&self) -> Cow<'_, str> {
        Cow::Owned(self.to_string())
    }

    fn user_hint(&self) -> Option<&'static str> {
        match self {
            Self::Unauthorized { .. } => Some("Ask an administrator to grant the action."),
            Self::AuthTimeout { .. } => Some("Answer the authentication prompt sooner."),
            Self::LockTimeout { .. } => {
                Some("Another transaction held the package database too long; retry later.")
            }
            Self::ResolutionConflict { .. } => Some("Adjust the requested packages and retry."),
            Self::Engine(err) => err.user_hint(),
            Self::Cancelled => None,
        }
    }

    fn is_retryable(&self) -> bool {
        match self {
            Self::LockTimeout { .. } | Self::AuthTimeout { .. } => true,
            Self::Engine(err) => err.is_retryable(),
            _ => false,
        }
    }

    fn user_code(&self) -> Option<&'static str> {
        match self {
            Self::Unauthorized { .. } => Some("transaction.unauthorized"),
            Self::AuthTimeout { .. } => Some("transaction.auth_timeout"),
            Self::LockTimeout { .. } => Some("transaction.lock_timeout"),
            Self::ResolutionConflict { .. } => Some("transaction.resolution_conflict"),
            Self::Engine(err) => err.user_code(),
            Self::Cancelled => Some("transaction.cancelled"),
        }
    }
}
