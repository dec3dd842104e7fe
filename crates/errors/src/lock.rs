//! Package database lock error types

use std::borrow::Cow;

use crate::UserFacingError;
use thiserror::Error;

#[derive(Debug, Clone, Error)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum LockError {
    #[error("package database is locked by operation {holder}")]
    Busy { holder: String },

    #[error("lock token {serial} is not held")]
    NotHeld { serial: u64 },
}

impl UserFacingError for LockError {
    fn user_message(&self) -> Cow<'_, str> {
        Cow::Owned(self.to_string())
    }

    fn user_hint(&self) -> Option<&'static str> {
        match self {
            Self::Busy { .. } => Some("Another transaction is running; wait for it to finish."),
            Self::NotHeld { .. } => None,
        }
    }

    fn is_retryable(&self) -> bool {
        matches!(self, Self::Busy { .. })
    }

    fn user_code(&self) -> Option<&'static str> {
        Some(match self {
            Self::Busy { .. } => "lock.busy",
            Self::NotHeld { .. } => "lock.not_held",
        })
    }
}
