#![deny(clippy::pedantic, unsafe_code)]
#![allow(clippy::module_name_repetitions)]

//! Package engine adapter for pkgd
//!
//! [`PackageEngine`] is the seam between the daemon and the package
//! management engine. The read methods are safe to call concurrently at any
//! time; the write methods (`resolve` through `commit`) are only ever called
//! by the transaction holding the package database lock.
//!
//! [`MemoryEngine`] is the reference implementation backed by a JSON
//! [`Catalog`], with a [`FaultPlan`] for exercising failure paths.
//!
//! `set_enabled_repos` is the one write outside a transaction; callers must
//! hold the package database lock around it.

mod catalog;
mod fault;
mod matcher;
mod memory;
mod resolve;

pub use catalog::{newest_only, Catalog, CatalogGroup, CatalogPackage, INSTALLED_REPO};
pub use fault::{EnginePhase, FaultPlan, PhaseGate};
pub use matcher::NameMatcher;
pub use memory::MemoryEngine;

use async_trait::async_trait;
use pkgd_errors::EngineError;
use pkgd_events::ProgressReporter;
use pkgd_types::{
    Action, GroupCategory, HistoryRecord, PackageDescriptor, PackageId, Query, RepoInfo,
    TransactionItem, TransactionSummary,
};

/// Attributes computed from the package database rather than stored
pub const PSEUDO_ATTRIBUTES: [&str; 2] = ["action", "downgrades"];

#[async_trait]
pub trait PackageEngine: Send + Sync {
    /// Run a read-only package query
    async fn query(&self, query: &Query) -> Result<Vec<PackageDescriptor>, EngineError>;

    /// Value of one attribute of a package; `null` when either is unknown
    async fn attribute(
        &self,
        package: &PackageId,
        attribute: &str,
    ) -> Result<serde_json::Value, EngineError>;

    /// Repository ids; empty or `enabled` lists enabled ones, anything else
    /// is a pattern over all ids
    async fn repositories(&self, filter: &str) -> Result<Vec<String>, EngineError>;

    async fn repo(&self, id: &str) -> Result<Option<RepoInfo>, EngineError>;

    /// Enable exactly the listed repositories, disabling every other one
    async fn set_enabled_repos(&self, ids: &[String]) -> Result<(), EngineError>;

    /// Groups by category, both sorted by name
    async fn groups(&self) -> Result<Vec<GroupCategory>, EngineError>;

    /// Newest builds of a group's members; `all` adds optional members.
    /// Unknown groups have no packages.
    async fn group_packages(
        &self,
        group: &str,
        all: bool,
    ) -> Result<Vec<PackageDescriptor>, EngineError>;

    /// Committed transactions between `start` and `end` whole days ago,
    /// newest first
    async fn history_by_days(
        &self,
        start: u32,
        end: u32,
    ) -> Result<Vec<HistoryRecord>, EngineError>;

    /// Committed transactions touching a package matching any pattern
    async fn history_search(&self, patterns: &[String]) -> Result<Vec<HistoryRecord>, EngineError>;

    /// Changes of one committed transaction
    ///
    /// Fails with an error of kind `NotFound` for an unknown id.
    async fn history_packages(&self, id: u64) -> Result<Vec<TransactionItem>, EngineError>;

    /// Compute the change set for an action
    ///
    /// Unsatisfiable requests fail with an error of kind `Conflict`.
    async fn resolve(&self, action: &Action) -> Result<TransactionSummary, EngineError>;

    /// Fetch every payload the change set needs
    async fn download(
        &self,
        summary: &TransactionSummary,
        reporter: &dyn ProgressReporter,
    ) -> Result<(), EngineError>;

    /// Verify the change set applies cleanly without changing anything
    async fn test(
        &self,
        summary: &TransactionSummary,
        reporter: &dyn ProgressReporter,
    ) -> Result<(), EngineError>;

    /// Apply the change set to the package database
    async fn commit(
        &self,
        summary: &TransactionSummary,
        reporter: &dyn ProgressReporter,
    ) -> Result<(), EngineError>;
}
