//! Read-only package queries

use serde::{Deserialize, Serialize};

/// Named package lists
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PackageFilter {
    Installed,
    Available,
    /// Newest available update per installed package
    Updates,
    Obsoletes,
    /// Available packages added to their repository recently
    Recent,
    /// Installed packages no enabled repository provides
    Extras,
    /// Every available version newer than the installed one
    UpdatesAll,
}

/// Searchable package fields
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchField {
    Name,
    Summary,
    Description,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Query {
    Packages {
        filter: PackageFilter,
    },
    ByName {
        /// Name pattern; `*` and `?` are wildcards
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
}
