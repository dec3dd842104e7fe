//! Transaction phase model and resolution summaries

use crate::package::PackageId;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Observable state of one transaction
///
/// Non-terminal phases are only ever entered in declaration order; `Failed`
/// and `Cancelled` may follow any non-terminal phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Pending,
    Authorizing,
    Queued,
    Resolving,
    Resolved,
    Downloading,
    TestRun,
    Committing,
    Succeeded,
    Failed,
    Cancelled,
}

impl Phase {
    /// Position in the forward sequence; terminal phases share the last slot
    #[must_use]
    pub fn ordinal(self) -> u8 {
        match self {
            Self::Pending => 0,
            Self::Authorizing => 1,
            Self::Queued => 2,
            Self::Resolving => 3,
            Self::Resolved => 4,
            Self::Downloading => 5,
            Self::TestRun => 6,
            Self::Committing => 7,
            Self::Succeeded | Self::Failed | Self::Cancelled => 8,
        }
    }

    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed | Self::Cancelled)
    }

    /// Phases during which the transaction owns the package database lock
    #[must_use]
    pub fn holds_lock(self) -> bool {
        matches!(
            self,
            Self::Resolving | Self::Resolved | Self::Downloading | Self::TestRun | Self::Committing
        )
    }

    /// Cancellation is honored up to, but not including, the commit
    #[must_use]
    pub fn accepts_cancel(self) -> bool {
        self.ordinal() < Self::Committing.ordinal()
    }

    /// Whether moving from `self` to `next` keeps the sequence monotonic
    #[must_use]
    pub fn can_advance_to(self, next: Phase) -> bool {
        if self.is_terminal() {
            return false;
        }
        match next {
            Self::Failed | Self::Cancelled => true,
            _ => next.ordinal() > self.ordinal(),
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Authorizing => "authorizing",
            Self::Queued => "queued",
            Self::Resolving => "resolving",
            Self::Resolved => "resolved",
            Self::Downloading => "downloading",
            Self::TestRun => "test_run",
            Self::Committing => "committing",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Percent-or-step progress carried by each event
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Progress {
    #[default]
    None,
    Percent {
        value: f32,
    },
    Step {
        current: u64,
        total: u64,
    },
}

impl Progress {
    /// Percentage clamped into `0.0..=100.0`
    #[must_use]
    pub fn percent(value: f32) -> Self {
        Self::Percent {
            value: value.clamp(0.0, 100.0),
        }
    }

    #[must_use]
    pub fn step(current: u64, total: u64) -> Self {
        Self::Step { current, total }
    }
}

/// Type of change within a resolved transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeType {
    Install,
    Update,
    Remove,
    Reinstall,
    Downgrade,
}

impl ChangeType {
    /// Display order of groups in a summary
    pub const ORDER: [ChangeType; 5] = [
        Self::Install,
        Self::Update,
        Self::Remove,
        Self::Reinstall,
        Self::Downgrade,
    ];

    /// Whether the change brings a new payload onto the system
    #[must_use]
    pub fn needs_payload(self) -> bool {
        !matches!(self, Self::Remove)
    }
}

impl fmt::Display for ChangeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Install => "install",
            Self::Update => "update",
            Self::Remove => "remove",
            Self::Reinstall => "reinstall",
            Self::Downgrade => "downgrade",
        };
        f.write_str(name)
    }
}

/// One package change in a resolved transaction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionItem {
    pub change: ChangeType,
    /// The package taking the active role (new build, or the build removed)
    pub package: PackageId,
    pub size: u64,
    /// Installed builds this change replaces
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub replaces: Vec<PackageId>,
}

/// Result of dependency resolution
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct TransactionSummary {
    pub items: Vec<TransactionItem>,
}

impl TransactionSummary {
    /// Build a summary with items grouped in `ChangeType::ORDER`
    #[must_use]
    pub fn new(mut items: Vec<TransactionItem>) -> Self {
        items.sort_by_key(|item| {
            ChangeType::ORDER
                .iter()
                .position(|change| *change == item.change)
                .unwrap_or(usize::MAX)
        });
        Self { items }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Items that need a payload fetched before commit
    pub fn payloads(&self) -> impl Iterator<Item = &TransactionItem> {
        self.items.iter().filter(|item| item.change.needs_payload())
    }

    #[must_use]
    pub fn download_size(&self) -> u64 {
        self.payloads().map(|item| item.size).sum()
    }

    /// Items of one change type
    pub fn of(&self, change: ChangeType) -> impl Iterator<Item = &TransactionItem> {
        self.items.iter().filter(move |item| item.change == change)
    }
}

impl fmt::Display for TransactionSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.items.is_empty() {
            return f.write_str("nothing to do");
        }
        let mut first = true;
        for change in ChangeType::ORDER {
            let count = self.of(change).count();
            if count == 0 {
                continue;
            }
            if !first {
                f.write_str(", ")?;
            }
            write!(f, "{change} {count}")?;
            first = false;
        }
        Ok(())
    }
}
