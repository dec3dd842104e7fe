//! Package database of the reference engine
//!
//! The catalog is a JSON document listing configured repositories, the
//! packages they offer, the packages installed on the host, package groups
//! and the history of committed transactions. Installed entries carry the
//! repository they came from prefixed with `@`.

use chrono::{DateTime, Utc};
use pkgd_errors::{EngineError, EngineErrorKind};
use pkgd_types::{
    compare_versions, Evr, HistoryEntry, PackageDescriptor, PackageId, RepoInfo,
    TransactionSummary,
};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::path::Path;

/// Repository the host itself reports installed packages under
pub const INSTALLED_REPO: &str = "@System";

/// One package build
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogPackage {
    pub name: String,
    #[serde(default)]
    pub epoch: u32,
    pub version: String,
    pub release: String,
    #[serde(default = "default_arch")]
    pub arch: String,
    pub repo: String,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub size: u64,
    /// Names of packages this one needs installed
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub requires: Vec<String>,
    /// Names of packages this one replaces
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub obsoletes: Vec<String>,
    /// Recently added to its repository
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub recent: bool,
}

fn default_arch() -> String {
    "noarch".to_string()
}

impl CatalogPackage {
    #[must_use]
    pub fn id(&self) -> PackageId {
        PackageId::new(
            self.name.clone(),
            self.evr(),
            self.arch.clone(),
            self.repo.clone(),
        )
    }

    #[must_use]
    pub fn evr(&self) -> Evr {
        Evr::new(self.epoch, self.version.clone(), self.release.clone())
    }

    #[must_use]
    pub fn descriptor(&self) -> PackageDescriptor {
        PackageDescriptor {
            id: self.id(),
            summary: self.summary.clone(),
            size: self.size,
        }
    }

    #[must_use]
    pub fn is_installed(&self) -> bool {
        self.repo.starts_with('@')
    }

    /// Same name and architecture
    #[must_use]
    pub fn same_slot(&self, other: &CatalogPackage) -> bool {
        self.name == other.name && self.arch == other.arch
    }

    /// Same name, architecture and EVR
    #[must_use]
    pub fn same_build(&self, other: &CatalogPackage) -> bool {
        self.same_slot(other) && self.cmp_evr(other) == Ordering::Equal
    }

    #[must_use]
    pub fn cmp_evr(&self, other: &CatalogPackage) -> Ordering {
        self.epoch
            .cmp(&other.epoch)
            .then_with(|| compare_versions(&self.version, &other.version))
            .then_with(|| compare_versions(&self.release, &other.release))
    }

    /// Whether this entry is the build `id` names
    #[must_use]
    pub fn matches_id(&self, id: &PackageId) -> bool {
        self.name == id.name
            && self.epoch == id.epoch
            && self.version == id.version
            && self.release == id.release
            && self.arch == id.arch
            && self.repo == id.repo
    }

    /// Copy of an available build as it looks once installed
    #[must_use]
    pub fn as_installed(&self) -> CatalogPackage {
        let mut installed = self.clone();
        if !installed.is_installed() {
            installed.repo = format!("@{}", self.repo);
        }
        installed.recent = false;
        installed
    }
}

/// Packages installed or removed together under `@id`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogGroup {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub category: String,
    /// Installed with the group
    #[serde(default)]
    pub packages: Vec<String>,
    /// Listed with the group but only installed on request
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub optional: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Catalog {
    #[serde(default)]
    pub repos: Vec<RepoInfo>,
    #[serde(default)]
    pub installed: Vec<CatalogPackage>,
    #[serde(default)]
    pub available: Vec<CatalogPackage>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub groups: Vec<CatalogGroup>,
    /// Committed transactions, oldest first
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub history: Vec<HistoryEntry>,
}

impl Catalog {
    /// Read a catalog document
    ///
    /// # Errors
    ///
    /// Returns a `Repository` engine error if the file cannot be read or is
    /// not a valid catalog.
    pub async fn load(path: &Path) -> Result<Self, EngineError> {
        let contents = tokio::fs::read_to_string(path).await.map_err(|e| {
            EngineError::new(
                EngineErrorKind::Repository,
                format!("failed to read catalog {}: {e}", path.display()),
            )
        })?;
        let mut catalog: Self = serde_json::from_str(&contents).map_err(|e| {
            EngineError::new(
                EngineErrorKind::Repository,
                format!("invalid catalog {}: {e}", path.display()),
            )
        })?;
        catalog.normalize();
        Ok(catalog)
    }

    /// Write the catalog next to `path` and move it into place
    ///
    /// # Errors
    ///
    /// Returns a `Transaction` engine error if the file cannot be written.
    pub async fn save(&self, path: &Path) -> Result<(), EngineError> {
        let write_error = |e: &dyn std::fmt::Display| {
            EngineError::new(
                EngineErrorKind::Transaction,
                format!("failed to write catalog {}: {e}", path.display()),
            )
        };
        let json = serde_json::to_string_pretty(self).map_err(|e| write_error(&e))?;
        let staging = path.with_extension("json.new");
        tokio::fs::write(&staging, json)
            .await
            .map_err(|e| write_error(&e))?;
        tokio::fs::rename(&staging, path)
            .await
            .map_err(|e| write_error(&e))?;
        Ok(())
    }

    /// Installed entries always carry an `@` repository
    pub fn normalize(&mut self) {
        for package in &mut self.installed {
            if !package.is_installed() {
                package.repo = format!("@{}", package.repo);
            }
        }
    }

    #[must_use]
    pub fn repo(&self, id: &str) -> Option<&RepoInfo> {
        self.repos.iter().find(|repo| repo.id == id)
    }

    /// Enable exactly the listed repositories
    ///
    /// # Errors
    ///
    /// Returns a `NotFound` engine error naming the first unknown id; nothing
    /// changes in that case.
    pub fn set_enabled_repos(&mut self, ids: &[String]) -> Result<(), EngineError> {
        if let Some(unknown) = ids.iter().find(|id| self.repo(id).is_none()) {
            return Err(EngineError::new(
                EngineErrorKind::NotFound,
                format!("no repository named {unknown}"),
            ));
        }
        for repo in &mut self.repos {
            repo.enabled = ids.contains(&repo.id);
        }
        Ok(())
    }

    fn repo_enabled(&self, id: &str) -> bool {
        // packages from a repository missing in the list are treated as enabled
        self.repo(id).is_none_or(|repo| repo.enabled)
    }

    /// Available packages from enabled repositories
    pub fn enabled_available(&self) -> impl Iterator<Item = &CatalogPackage> {
        self.available
            .iter()
            .filter(|package| self.repo_enabled(&package.repo))
    }

    /// Installed build in the same slot as `package`
    #[must_use]
    pub fn installed_in_slot(&self, package: &CatalogPackage) -> Option<&CatalogPackage> {
        self.installed
            .iter()
            .find(|installed| installed.same_slot(package))
    }

    #[must_use]
    pub fn is_name_installed(&self, name: &str) -> bool {
        self.installed.iter().any(|package| package.name == name)
    }

    /// Installed or available entry named by a full id
    #[must_use]
    pub fn find(&self, id: &PackageId) -> Option<&CatalogPackage> {
        let pool = if id.is_installed() {
            &self.installed
        } else {
            &self.available
        };
        pool.iter().find(|package| package.matches_id(id))
    }

    /// Newest enabled available build named `name`
    #[must_use]
    pub fn newest_available(&self, name: &str) -> Option<&CatalogPackage> {
        self.enabled_available()
            .filter(|package| package.name == name)
            .max_by(|a, b| a.cmp_evr(b))
    }

    /// Available builds newer than the installed build in the same slot
    pub fn upgrades_of<'a>(
        &'a self,
        installed: &'a CatalogPackage,
    ) -> impl Iterator<Item = &'a CatalogPackage> + 'a {
        self.enabled_available().filter(move |package| {
            package.same_slot(installed) && package.cmp_evr(installed) == Ordering::Greater
        })
    }

    #[must_use]
    pub fn group(&self, id: &str) -> Option<&CatalogGroup> {
        self.groups.iter().find(|group| group.id == id)
    }

    /// Every default member of the group is installed
    #[must_use]
    pub fn is_group_installed(&self, group: &CatalogGroup) -> bool {
        !group.packages.is_empty()
            && group
                .packages
                .iter()
                .all(|name| self.is_name_installed(name))
    }

    #[must_use]
    pub fn history_entry(&self, id: u64) -> Option<&HistoryEntry> {
        self.history.iter().find(|entry| entry.id == id)
    }

    /// Remember a committed change set under the next history id
    pub fn record(&mut self, summary: &TransactionSummary, at: DateTime<Utc>) -> u64 {
        let id = self.history.iter().map(|entry| entry.id).max().unwrap_or(0) + 1;
        self.history.push(HistoryEntry {
            id,
            timestamp: at,
            items: summary.items.clone(),
        });
        id
    }

    /// Available builds that obsolete an installed package
    pub fn obsoleting(&self) -> impl Iterator<Item = &CatalogPackage> {
        self.enabled_available().filter(|package| {
            package
                .obsoletes
                .iter()
                .any(|name| self.is_name_installed(name))
        })
    }
}

/// Keep only the newest build per name and architecture, preferring the
/// installed entry on a tie
#[must_use]
pub fn newest_only<'a>(packages: Vec<&'a CatalogPackage>) -> Vec<&'a CatalogPackage> {
    let mut newest: Vec<&CatalogPackage> = Vec::new();
    for package in packages {
        match newest.iter_mut().find(|kept| kept.same_slot(package)) {
            Some(kept) => {
                let replace = match package.cmp_evr(kept) {
                    Ordering::Greater => true,
                    Ordering::Equal => package.is_installed() && !kept.is_installed(),
                    Ordering::Less => false,
                };
                if replace {
                    *kept = package;
                }
            }
            None => newest.push(package),
        }
    }
    newest
}
