//! Package-related type definitions

use crate::version::Evr;
use pkgd_errors::DispatchError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Fully qualified package id: `name,epoch,version,release,arch,repo`
///
/// A repo starting with `@` marks an installed package.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PackageId {
    pub name: String,
    pub epoch: u32,
    pub version: String,
    pub release: String,
    pub arch: String,
    pub repo: String,
}

impl PackageId {
    /// Create a new package ID
    pub fn new(
        name: impl Into<String>,
        evr: Evr,
        arch: impl Into<String>,
        repo: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            epoch: evr.epoch,
            version: evr.version,
            release: evr.release,
            arch: arch.into(),
            repo: repo.into(),
        }
    }

    #[must_use]
    pub fn evr(&self) -> Evr {
        Evr::new(self.epoch, self.version.clone(), self.release.clone())
    }

    #[must_use]
    pub fn is_installed(&self) -> bool {
        self.repo.starts_with('@')
    }

    /// Same build (name, evr, arch) regardless of where it comes from
    #[must_use]
    pub fn same_build(&self, other: &PackageId) -> bool {
        self.name == other.name
            && self.arch == other.arch
            && self.epoch == other.epoch
            && self.version == other.version
            && self.release == other.release
    }

    /// Whether a target string looks like a full id rather than a name pattern
    #[must_use]
    pub fn looks_like_id(target: &str) -> bool {
        target.contains(',')
    }
}

impl fmt::Display for PackageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{},{},{},{},{},{}",
            self.name, self.epoch, self.version, self.release, self.arch, self.repo
        )
    }
}

impl FromStr for PackageId {
    type Err = DispatchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let fields: Vec<&str> = s.split(',').collect();
        let [name, epoch, version, release, arch, repo] = fields.as_slice() else {
            return Err(DispatchError::malformed(format!(
                "package id {s:?} must have 6 comma separated fields"
            )));
        };
        if [name, version, release, arch, repo]
            .iter()
            .any(|field| field.trim().is_empty())
        {
            return Err(DispatchError::malformed(format!(
                "package id {s:?} has an empty field"
            )));
        }
        let epoch = if epoch.is_empty() {
            0
        } else {
            epoch.parse().map_err(|_| {
                DispatchError::malformed(format!("package id {s:?} has a non-numeric epoch"))
            })?
        };
        Ok(Self {
            name: (*name).to_string(),
            epoch,
            version: (*version).to_string(),
            release: (*release).to_string(),
            arch: (*arch).to_string(),
            repo: (*repo).to_string(),
        })
    }
}

/// Query result row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PackageDescriptor {
    pub id: PackageId,
    pub summary: String,
    pub size: u64,
}

/// Configured repository
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepoInfo {
    pub id: String,
    pub name: String,
    pub enabled: bool,
    #[serde(default)]
    pub gpgcheck: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub baseurl: Option<String>,
}
