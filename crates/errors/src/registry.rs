//! Operation registry error types

use std::borrow::Cow;

use crate::UserFacingError;
use thiserror::Error;

#[derive(Debug, Clone, Error)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum RegistryError {
    #[error("unknown operation: {id}")]
    UnknownOperation { id: String },

    #[error("operation {id} already reached a terminal state")]
    AlreadyTerminal { id: String },

    #[error("phase regression on operation {id}: {from} -> {to}")]
    PhaseRegression { id: String, from: String, to: String },
}

impl UserFacingError for RegistryError {
    fn user_message(&self) -> Cow<'_, str> {
        Cow::Owned(self.to_string())
    }

    fn user_code(&self) -> Option<&'static str> {
        Some(match self {
            Self::UnknownOperation { .. } => "registry.unknown_operation",
            Self::AlreadyTerminal { .. } => "registry.already_terminal",
            Self::PhaseRegression { .. } => "registry.phase_regression",
        })
    }
}
