//! Request admission error types

use std::borrow::Cow;

use crate::UserFacingError;
use thiserror::Error;

#[derive(Debug, Clone, Error)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum DispatchError {
    /// Rejected before any operation id was created
    #[error("malformed request: {reason}")]
    MalformedRequest { reason: String },

    #[error("unknown operation: {id}")]
    UnknownOperation { id: String },

    #[error("caller is not permitted to {what}")]
    NotPermitted { what: String },
}

impl DispatchError {
    pub fn malformed(reason: impl Into<String>) -> Self {
        Self::MalformedRequest {
            reason: reason.into(),
        }
    }
}

impl UserFacingError for DispatchError {
    fn user_message(&self) -> Cow<'_, str> {
        Cow::Owned(self.to_string())
    }

    fn user_hint(&self) -> Option<&'static str> {
        match self {
            Self::MalformedRequest { .. } => Some("Check the request fields and retry."),
            Self::UnknownOperation { .. } => {
                Some("The operation finished and its result has been discarded.")
            }
            Self::NotPermitted { .. } => Some("Run the client as a privileged user."),
        }
    }

    fn user_code(&self) -> Option<&'static str> {
        Some(match self {
            Self::MalformedRequest { .. } => "request.malformed",
            Self::UnknownOperation { .. } => "request.unknown_operation",
            Self::NotPermitted { .. } => "request.not_permitted",
        })
    }
}
