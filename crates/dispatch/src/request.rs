//! Wire-level request and reply shapes

use pkgd_auth::ChallengeInfo;
use pkgd_errors::{Error, UserFacingError};
use pkgd_lock::LockStatus;
use pkgd_registry::Snapshot;
use pkgd_transaction::CancelReply;
use pkgd_types::{
    ActionKind, GroupCategory, HistoryRecord, OperationId, PackageDescriptor, PackageFilter,
    RepoInfo, SearchField, TransactionItem,
};
use serde::{Deserialize, Serialize};

/// Everything a client can ask for
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "method", rename_all = "snake_case")]
pub enum Request {
    GetVersion,

    /// One of the named package lists
    Packages { filter: PackageFilter },

    ByName {
        pattern: String,
        #[serde(default)]
        newest_only: bool,
    },

    Search {
        fields: Vec<SearchField>,
        keys: Vec<String>,
        #[serde(default)]
        match_all: bool,
        #[serde(default)]
        newest_only: bool,
    },

    /// Attribute of a package given by its full id
    Attribute { package: String, attribute: String },

    Repositories {
        #[serde(default)]
        filter: String,
    },

    Repo { id: String },

    /// Enable exactly these repositories; needs the database lock to be free
    SetEnabledRepos { repos: Vec<String> },

    /// Package groups by category
    Groups,

    /// Newest builds of a group's members, optional ones too with `all`
    GroupPackages {
        group: String,
        #[serde(default)]
        all: bool,
    },

    /// Committed transactions between `start` and `end` days ago
    HistoryByDays { start: u32, end: u32 },

    /// Committed transactions touching packages matching any pattern
    HistorySearch { patterns: Vec<String> },

    /// Changes made by one committed transaction
    HistoryPackages { transaction: u64 },

    /// Start a write; `@id` targets name groups, `undo` takes a history id
    BeginTransaction {
        action: ActionKind,
        targets: Vec<String>,
    },

    Attach { operation: OperationId },

    Detach { operation: OperationId },

    Cancel { operation: OperationId },

    /// Pending interactive challenges (superuser only)
    Challenges,

    /// Answer a challenge on behalf of its caller (superuser only)
    AnswerChallenge { challenge: String, granted: bool },

    /// Lock holder and audit trail (superuser only)
    LockStatus,
}

impl Request {
    /// Name used in logs
    #[must_use]
    pub fn method(&self) -> &'static str {
        match self {
            Self::GetVersion => "get_version",
            Self::Packages { .. } => "packages",
            Self::ByName { .. } => "by_name",
            Self::Search { .. } => "search",
            Self::Attribute { .. } => "attribute",
            Self::Repositories { .. } => "repositories",
            Self::Repo { .. } => "repo",
            Self::SetEnabledRepos { .. } => "set_enabled_repos",
            Self::Groups => "groups",
            Self::GroupPackages { .. } => "group_packages",
            Self::HistoryByDays { .. } => "history_by_days",
            Self::HistorySearch { .. } => "history_search",
            Self::HistoryPackages { .. } => "history_packages",
            Self::BeginTransaction { .. } => "begin_transaction",
            Self::Attach { .. } => "attach",
            Self::Detach { .. } => "detach",
            Self::Cancel { .. } => "cancel",
            Self::Challenges => "challenges",
            Self::AnswerChallenge { .. } => "answer_challenge",
            Self::LockStatus => "lock_status",
        }
    }

    /// Whether this request changes the package database
    #[must_use]
    pub fn is_write(&self) -> bool {
        matches!(self, Self::BeginTransaction { .. } | Self::SetEnabledRepos { .. })
    }
}

/// Answer to one request
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Reply {
    Version {
        api: u32,
    },
    Packages {
        packages: Vec<PackageDescriptor>,
    },
    Attribute {
        value: serde_json::Value,
    },
    Repositories {
        ids: Vec<String>,
    },
    Repo {
        repo: Option<RepoInfo>,
    },
    ReposEnabled {
        repos: Vec<String>,
    },
    Groups {
        categories: Vec<GroupCategory>,
    },
    History {
        transactions: Vec<HistoryRecord>,
    },
    HistoryPackages {
        items: Vec<TransactionItem>,
    },
    Began {
        operation: OperationId,
        resumed: bool,
    },
    /// Events so far; live events follow as separate frames
    Attached {
        snapshot: Snapshot,
    },
    Detached {
        operation: OperationId,
    },
    Cancel {
        reply: CancelReply,
    },
    Challenges {
        challenges: Vec<ChallengeInfo>,
    },
    Answered {
        challenge: String,
    },
    LockStatus {
        status: LockStatus,
    },
    Error {
        code: String,
        message: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        hint: Option<String>,
        #[serde(default)]
        retryable: bool,
    },
}

impl Reply {
    #[must_use]
    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error { .. })
    }
}

impl From<&Error> for Reply {
    fn from(error: &Error) -> Self {
        Self::Error {
            code: error.user_code().unwrap_or("error.unknown").to_string(),
            message: error.user_message().into_owned(),
            hint: error.user_hint().map(str::to_string),
            retryable: error.is_retryable(),
        }
    }
}
