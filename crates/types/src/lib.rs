#![deny(clippy::pedantic, unsafe_code)]
#![allow(clippy::module_name_repetitions)]

//! Core type definitions for the pkgd service
//!
//! This crate provides the vocabulary shared by every layer: caller
//! identities, operation ids, package ids and descriptors, the closed set of
//! write actions, the transaction phase model and committed history.

pub mod history;
pub mod operation;
pub mod package;
pub mod query;
pub mod state;
pub mod version;

// Re-export commonly used types
pub use history::{GroupCategory, GroupInfo, HistoryEntry, HistoryRecord};
pub use operation::{Action, ActionKind, Caller, OperationId};
pub use package::{PackageDescriptor, PackageId, RepoInfo};
pub use query::{PackageFilter, Query, SearchField};
pub use state::{ChangeType, Phase, Progress, TransactionItem, TransactionSummary};
pub use uuid::Uuid;
pub use version::{compare_versions, Evr};

/// Version of the client-facing request protocol
pub const API_VERSION: u32 = 2;
