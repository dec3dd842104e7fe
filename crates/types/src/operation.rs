//! Callers, operation ids and write actions

use pkgd_errors::DispatchError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Identity of a connected client as reported by the transport
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Caller {
    pub uid: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pid: Option<i32>,
}

impl Caller {
    #[must_use]
    pub fn new(uid: u32, pid: Option<i32>) -> Self {
        Self { uid, pid }
    }

    /// The superuser, used for in-process callers
    #[must_use]
    pub fn root() -> Self {
        Self { uid: 0, pid: None }
    }

    #[must_use]
    pub fn is_superuser(&self) -> bool {
        self.uid == 0
    }
}

impl fmt::Display for Caller {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.pid {
            Some(pid) => write!(f, "uid={} pid={pid}", self.uid),
            None => write!(f, "uid={}", self.uid),
        }
    }
}

/// Unique token for one write transaction attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OperationId(Uuid);

impl OperationId {
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    #[must_use]
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for OperationId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for OperationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.hyphenated().fmt(f)
    }
}

impl FromStr for OperationId {
    type Err = DispatchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s)
            .map(Self)
            .map_err(|e| DispatchError::malformed(format!("invalid operation id {s:?}: {e}")))
    }
}

/// Closed set of write actions; every kind runs through the same phases
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionKind {
    Install,
    Remove,
    Update,
    Reinstall,
    Downgrade,
    /// Revert a committed transaction; the target is its history id
    Undo,
}

impl ActionKind {
    pub const ALL: [ActionKind; 6] = [
        Self::Install,
        Self::Remove,
        Self::Update,
        Self::Reinstall,
        Self::Downgrade,
        Self::Undo,
    ];

    /// Identifier used for authorization lookups
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Install => "install",
            Self::Remove => "remove",
            Self::Update => "update",
            Self::Reinstall => "reinstall",
            Self::Downgrade => "downgrade",
            Self::Undo => "undo",
        }
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ActionKind {
    type Err = DispatchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.name() == s)
            .ok_or_else(|| DispatchError::malformed(format!("unknown action {s:?}")))
    }
}

/// A requested change to the package set
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Action {
    pub kind: ActionKind,
    /// Package specs (names, wildcards, `@group`), full package ids, or
    /// history ids for `Undo`
    pub targets: Vec<String>,
}

impl Action {
    pub fn new(kind: ActionKind, targets: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            kind,
            targets: targets.into_iter().map(Into::into).collect(),
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.kind, self.targets.join(" "))
    }
}
