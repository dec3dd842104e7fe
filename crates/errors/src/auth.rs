//! Authorization error types

use std::borrow::Cow;

use crate::UserFacingError;
use thiserror::Error;

#[derive(Debug, Clone, Error)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum AuthError {
    #[error("unknown authorization action: {action}")]
    UnknownAction { action: String },

    #[error("authorization challenge not found: {challenge}")]
    ChallengeNotFound { challenge: String },

    #[error("authorization backend unavailable: {message}")]
    BackendUnavailable { message: String },
}

impl UserFacingError for AuthError {
    fn user_message(&self) -> Cow<'_, str> {
        Cow::Owned(self.to_string())
    }

    fn user_hint(&self) -> Option<&'static str> {
        match self {
            Self::UnknownAction { .. } => {
                Some("Add the action to the [auth.actions] table of the configuration.")
            }
            Self::ChallengeNotFound { .. } => {
                Some("The challenge was already answered or has expired.")
            }
            Self::BackendUnavailable { .. } => None,
        }
    }

    fn user_code(&self) -> Option<&'static str> {
        Some(match self {
            Self::UnknownAction { .. } => "auth.unknown_action",
            Self::ChallengeNotFound { .. } => "auth.challenge_not_found",
            Self::BackendUnavailable { .. } => "auth.backend_unavailable",
        })
    }
}
