//! Package engine error types
//!
//! The engine's native taxonomy is preserved verbatim so the transaction
//! layer can surface it as the terminal cause of a failed operation.

use std::borrow::Cow;
use std::fmt;

use crate::UserFacingError;
use thiserror::Error;

/// Category reported by the package engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum EngineErrorKind {
    /// Repository metadata could not be loaded
    Repository,
    /// A requested package or package id does not exist
    NotFound,
    /// The requested change set cannot be satisfied
    Conflict,
    /// Fetching a package payload failed
    Download,
    /// A payload failed signature verification
    Signature,
    /// The test or real transaction failed to apply
    Transaction,
    Other,
}

impl fmt::Display for EngineErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Repository => "repository",
            Self::NotFound => "not found",
            Self::Conflict => "conflict",
            Self::Download => "download",
            Self::Signature => "signature",
            Self::Transaction => "transaction",
            Self::Other => "engine",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Error)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[error("{kind} error: {message}")]
pub struct EngineError {
    pub kind: EngineErrorKind,
    pub message: String,
    /// Individual problem lines (per-file download errors, depsolve problems)
    #[cfg_attr(feature = "serde", serde(default, skip_serializing_if = "Vec::is_empty"))]
    pub details: Vec<String>,
}

impl EngineError {
    pub fn new(kind: EngineErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            details: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_details(mut self, details: Vec<String>) -> Self {
        self.details = details;
        self
    }

    pub fn conflict(problems: Vec<String>) -> Self {
        let message = problems
            .first()
            .cloned()
            .unwrap_or_else(|| "unsatisfiable transaction".to_string());
        Self::new(EngineErrorKind::Conflict, message).with_details(problems)
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        Self::new(EngineErrorKind::NotFound, what)
    }

    #[must_use]
    pub fn is_conflict(&self) -> bool {
        self.kind == EngineErrorKind::Conflict
    }
}

impl UserFacingError for EngineError {
    fn user_message(&self) -> Cow<'_, str> {
        Cow::Owned(self.to_string())
    }

    fn user_hint(&self) -> Option<&'static str> {
        match self.kind {
            EngineErrorKind::Repository => Some("Check the repository configuration."),
            EngineErrorKind::Download => Some("Check network connectivity and retry."),
            EngineErrorKind::Signature => Some("Import the repository signing key."),
            EngineErrorKind::Conflict => Some("Adjust the requested packages and retry."),
            _ => None,
        }
    }

    fn is_retryable(&self) -> bool {
        matches!(self.kind, EngineErrorKind::Download | EngineErrorKind::Repository)
    }

    fn user_code(&self) -> Option<&'static str> {
        Some(match self.kind {
            EngineErrorKind::Repository => "engine.repository",
            EngineErrorKind::NotFound => "engine.not_found",
            EngineErrorKind::Conflict => "engine.conflict",
            EngineErrorKind::Download => "engine.download",
            EngineErrorKind::Signature => "engine.signature",
            EngineErrorKind::Transaction => "engine.transaction",
            EngineErrorKind::Other => "engine.other",
        })
    }
}
