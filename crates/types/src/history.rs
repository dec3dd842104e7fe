//! Committed transaction history and package groups

use crate::state::TransactionItem;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One committed transaction as the package database remembers it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub id: u64,
    pub timestamp: DateTime<Utc>,
    pub items: Vec<TransactionItem>,
}

impl HistoryEntry {
    #[must_use]
    pub fn record(&self) -> HistoryRecord {
        HistoryRecord {
            id: self.id,
            timestamp: self.timestamp,
        }
    }

    /// Whole days between the commit and `now`
    #[must_use]
    pub fn age_days(&self, now: DateTime<Utc>) -> i64 {
        (now - self.timestamp).num_days()
    }
}

/// History listing row
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryRecord {
    pub id: u64,
    pub timestamp: DateTime<Utc>,
}

/// A named set of packages installed or removed together
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupInfo {
    pub id: String,
    pub name: String,
    pub description: String,
    /// Every default member is installed
    pub installed: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupCategory {
    pub name: String,
    pub groups: Vec<GroupInfo>,
}
