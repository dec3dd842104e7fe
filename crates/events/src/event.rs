//! Progress events and terminal outcomes

use chrono::{DateTime, Utc};
use pkgd_errors::FailureCause;
use pkgd_types::{OperationId, PackageId, Phase, Progress, TransactionSummary};
use serde::{Deserialize, Serialize};

/// Final result of a transaction
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum Outcome {
    Succeeded {
        summary: TransactionSummary,
    },
    Failed {
        cause: FailureCause,
        detail: String,
    },
    Cancelled,
}

impl Outcome {
    #[must_use]
    pub fn failed(cause: FailureCause) -> Self {
        let detail = cause.to_string();
        Self::Failed { cause, detail }
    }

    /// Phase a transaction ends in with this outcome
    #[must_use]
    pub fn phase(&self) -> Phase {
        match self {
            Self::Succeeded { .. } => Phase::Succeeded,
            Self::Failed { .. } => Phase::Failed,
            Self::Cancelled => Phase::Cancelled,
        }
    }

    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Succeeded { .. })
    }

    #[must_use]
    pub fn cause(&self) -> Option<&FailureCause> {
        match self {
            Self::Failed { cause, .. } => Some(cause),
            _ => None,
        }
    }
}

/// Structured payload of a progress event
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventKind {
    /// The transaction entered `ProgressEvent::phase`
    PhaseEntered,

    /// Waiting on an interactive authorization answer
    AuthChallenge { challenge: String, prompt: String },

    /// Waiting for another transaction to release the package database
    LockBusy { holder: String, attempt: u32 },

    /// Dependency resolution produced this change set
    Resolved { summary: TransactionSummary },

    /// A download batch started
    DownloadStarted { files: usize, bytes: u64 },

    /// Progress of one payload within the batch
    DownloadProgress {
        package: PackageId,
        fraction: f32,
        total_fraction: f32,
        total_files: usize,
    },

    /// One payload finished downloading
    DownloadFinished {
        package: PackageId,
        ok: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message: Option<String>,
    },

    /// Per-package progress while the test or real transaction runs
    PackageProgress {
        package: PackageId,
        action: String,
        element_current: u64,
        element_total: u64,
        set_current: u64,
        set_total: u64,
    },

    /// The transaction finished; always the last event of an operation
    Terminal { outcome: Outcome },
}

impl EventKind {
    /// Short name used in log targets
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::PhaseEntered => "phase",
            Self::AuthChallenge { .. } => "auth",
            Self::LockBusy { .. } => "lock",
            Self::Resolved { .. } => "resolve",
            Self::DownloadStarted { .. }
            | Self::DownloadProgress { .. }
            | Self::DownloadFinished { .. } => "download",
            Self::PackageProgress { .. } => "package",
            Self::Terminal { .. } => "terminal",
        }
    }
}

/// Immutable record appended to an operation's log
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressEvent {
    pub operation: OperationId,
    /// Position in the operation's log, assigned on append
    pub sequence: u64,
    pub phase: Phase,
    pub progress: Progress,
    /// Human-readable description
    pub detail: String,
    pub kind: EventKind,
    pub timestamp: DateTime<Utc>,
}

impl ProgressEvent {
    pub fn new(
        operation: OperationId,
        phase: Phase,
        kind: EventKind,
        progress: Progress,
        detail: impl Into<String>,
    ) -> Self {
        Self {
            operation,
            sequence: 0,
            phase,
            progress,
            detail: detail.into(),
            kind,
            timestamp: Utc::now(),
        }
    }

    /// Event announcing entry into a phase
    pub fn phase_entered(operation: OperationId, phase: Phase, detail: impl Into<String>) -> Self {
        Self::new(
            operation,
            phase,
            EventKind::PhaseEntered,
            Progress::None,
            detail,
        )
    }

    /// The single terminal event of an operation
    #[must_use]
    pub fn terminal(operation: OperationId, outcome: Outcome) -> Self {
        let detail = match &outcome {
            Outcome::Succeeded { summary } => format!("transaction succeeded: {summary}"),
            Outcome::Failed { detail, .. } => format!("transaction failed: {detail}"),
            Outcome::Cancelled => "transaction cancelled".to_string(),
        };
        let progress = if outcome.is_success() {
            Progress::percent(100.0)
        } else {
            Progress::None
        };
        Self::new(
            operation,
            outcome.phase(),
            EventKind::Terminal { outcome },
            progress,
            detail,
        )
    }

    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self.kind, EventKind::Terminal { .. })
    }

    /// Whether this event moves the operation into a new phase
    #[must_use]
    pub fn enters_phase(&self) -> bool {
        matches!(
            self.kind,
            EventKind::PhaseEntered | EventKind::Terminal { .. }
        )
    }

    #[must_use]
    pub fn outcome(&self) -> Option<&Outcome> {
        match &self.kind {
            EventKind::Terminal { outcome } => Some(outcome),
            _ => None,
        }
    }
}
