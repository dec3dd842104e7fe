//! In-memory reference engine

use crate::catalog::{newest_only, Catalog, CatalogPackage};
use crate::fault::{EnginePhase, FaultPlan};
use crate::matcher::NameMatcher;
use crate::resolve::Resolver;
use crate::{PackageEngine, PSEUDO_ATTRIBUTES};
use async_trait::async_trait;
use chrono::Utc;
use pkgd_errors::{EngineError, EngineErrorKind};
use pkgd_events::ProgressReporter;
use pkgd_types::{
    Action, ChangeType, GroupCategory, GroupInfo, HistoryEntry, HistoryRecord,
    PackageDescriptor, PackageFilter, PackageId, Query, RepoInfo, SearchField, TransactionItem,
    TransactionSummary,
};
use serde_json::{json, Value};
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard, PoisonError};

/// Chunks a simulated download reports progress in
const DOWNLOAD_STEPS: u32 = 4;

pub struct MemoryEngine {
    catalog: RwLock<Catalog>,
    protected: HashSet<String>,
    faults: Arc<FaultPlan>,
    /// Where committed changes are written back to
    path: Option<PathBuf>,
}

impl MemoryEngine {
    #[must_use]
    pub fn new(catalog: Catalog) -> Self {
        Self {
            catalog: RwLock::new(catalog),
            protected: HashSet::new(),
            faults: Arc::new(FaultPlan::new()),
            path: None,
        }
    }

    /// Load a catalog file; commits are written back to it
    ///
    /// # Errors
    ///
    /// Returns a `Repository` engine error if the catalog cannot be loaded.
    pub async fn load(path: &Path) -> Result<Self, EngineError> {
        let catalog = Catalog::load(path).await?;
        tracing::info!(
            path = %path.display(),
            repos = catalog.repos.len(),
            installed = catalog.installed.len(),
            available = catalog.available.len(),
            history = catalog.history.len(),
            "loaded package catalog"
        );
        let mut engine = Self::new(catalog);
        engine.path = Some(path.to_path_buf());
        Ok(engine)
    }

    #[must_use]
    pub fn with_protected(mut self, names: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.protected = names.into_iter().map(Into::into).collect();
        self
    }

    #[must_use]
    pub fn with_faults(mut self, faults: Arc<FaultPlan>) -> Self {
        self.faults = faults;
        self
    }

    #[must_use]
    pub fn faults(&self) -> &Arc<FaultPlan> {
        &self.faults
    }

    fn read(&self) -> RwLockReadGuard<'_, Catalog> {
        self.catalog.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Catalog> {
        self.catalog.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Copy of the current package database
    #[must_use]
    pub fn snapshot(&self) -> Catalog {
        self.read().clone()
    }

    fn filter_packages(catalog: &Catalog, filter: PackageFilter) -> Vec<&CatalogPackage> {
        match filter {
            PackageFilter::Installed => catalog.installed.iter().collect(),
            PackageFilter::Available => catalog.enabled_available().collect(),
            PackageFilter::Updates => catalog
                .installed
                .iter()
                .filter_map(|installed| {
                    catalog.upgrades_of(installed).max_by(|a, b| a.cmp_evr(b))
                })
                .collect(),
            PackageFilter::UpdatesAll => catalog
                .installed
                .iter()
                .flat_map(|installed| catalog.upgrades_of(installed))
                .collect(),
            PackageFilter::Obsoletes => catalog.obsoleting().collect(),
            PackageFilter::Recent => catalog
                .enabled_available()
                .filter(|package| package.recent)
                .collect(),
            PackageFilter::Extras => catalog
                .installed
                .iter()
                .filter(|installed| {
                    !catalog
                        .enabled_available()
                        .any(|package| package.same_build(installed))
                })
                .collect(),
        }
    }

    fn by_name<'a>(catalog: &'a Catalog, pattern: &str) -> Vec<&'a CatalogPackage> {
        let matcher = NameMatcher::new(pattern);
        catalog
            .installed
            .iter()
            .chain(catalog.enabled_available())
            .filter(|package| matcher.is_match(&package.name))
            .collect()
    }

    fn search<'a>(
        catalog: &'a Catalog,
        fields: &[SearchField],
        keys: &[String],
        match_all: bool,
    ) -> Vec<&'a CatalogPackage> {
        let keys: Vec<String> = keys.iter().map(|key| key.to_lowercase()).collect();
        let fields = if fields.is_empty() {
            &[SearchField::Name][..]
        } else {
            fields
        };
        catalog
            .installed
            .iter()
            .chain(catalog.enabled_available())
            .filter(|package| {
                let haystacks: Vec<String> = fields
                    .iter()
                    .map(|field| match field {
                        SearchField::Name => package.name.to_lowercase(),
                        SearchField::Summary => package.summary.to_lowercase(),
                        SearchField::Description => package.description.to_lowercase(),
                    })
                    .collect();
                let hit = |key: &String| haystacks.iter().any(|text| text.contains(key.as_str()));
                if match_all {
                    keys.iter().all(hit)
                } else {
                    keys.iter().any(hit)
                }
            })
            .collect()
    }

    /// What a client could do with a package
    fn action_for(catalog: &Catalog, package: &CatalogPackage) -> &'static str {
        if package.is_installed() {
            return "remove";
        }
        if let Some(installed) = catalog.installed_in_slot(package) {
            match package.cmp_evr(installed) {
                Ordering::Greater => return "update",
                Ordering::Less => return "downgrade",
                Ordering::Equal => {}
            }
        }
        if package
            .obsoletes
            .iter()
            .any(|name| catalog.is_name_installed(name))
        {
            return "obsolete";
        }
        "install"
    }

    /// Older builds a package could be downgraded to
    fn downgrades_for(catalog: &Catalog, package: &CatalogPackage) -> Vec<PackageId> {
        let Some(installed) = catalog.installed_in_slot(package) else {
            return Vec::new();
        };
        match package.cmp_evr(installed) {
            Ordering::Equal => {
                let mut older: Vec<&CatalogPackage> = catalog
                    .enabled_available()
                    .filter(|candidate| {
                        candidate.same_slot(package) && candidate.cmp_evr(package) == Ordering::Less
                    })
                    .collect();
                older.sort_by(|a, b| b.cmp_evr(a));
                older.into_iter().map(CatalogPackage::id).collect()
            }
            Ordering::Less => vec![installed.id()],
            Ordering::Greater => Vec::new(),
        }
    }

    fn pseudo_attribute(catalog: &Catalog, package: &CatalogPackage, attribute: &str) -> Value {
        match attribute {
            "action" => json!(Self::action_for(catalog, package)),
            "downgrades" => {
                let ids: Vec<String> = Self::downgrades_for(catalog, package)
                    .iter()
                    .map(ToString::to_string)
                    .collect();
                json!(ids)
            }
            _ => Value::Null,
        }
    }

    fn requires_for(catalog: &Catalog, package: &CatalogPackage) -> Value {
        let providers: serde_json::Map<String, Value> = package
            .requires
            .iter()
            .map(|requirement| {
                let ids: Vec<String> = catalog
                    .installed
                    .iter()
                    .filter(|candidate| &candidate.name == requirement)
                    .chain(catalog.newest_available(requirement))
                    .map(|candidate| candidate.id().to_string())
                    .collect();
                (requirement.clone(), json!(ids))
            })
            .collect();
        Value::Object(providers)
    }

    /// Package database after applying `summary`, without touching the live one
    fn apply(catalog: &Catalog, summary: &TransactionSummary) -> Result<Catalog, EngineError> {
        let mut next = catalog.clone();
        for item in &summary.items {
            if item.change == ChangeType::Remove {
                let before = next.installed.len();
                next.installed
                    .retain(|installed| !installed.matches_id(&item.package));
                if next.installed.len() == before {
                    return Err(transaction_error(format!(
                        "package {} is not installed",
                        item.package
                    )));
                }
                continue;
            }

            let incoming = catalog
                .find(&item.package)
                .ok_or_else(|| transaction_error(format!("package {} vanished", item.package)))?
                .as_installed();
            next.installed.retain(|installed| {
                !installed.same_slot(&incoming)
                    && !item.replaces.iter().any(|id| installed.matches_id(id))
            });
            next.installed.push(incoming);
        }
        next.installed
            .sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.arch.cmp(&b.arch)));
        Ok(next)
    }

    /// Write `next` back to the catalog file, then make it live
    async fn replace(&self, next: Catalog) -> Result<(), EngineError> {
        if let Some(path) = &self.path {
            next.save(path).await?;
        }
        *self.write() = next;
        Ok(())
    }

    fn broken_requirements(catalog: &Catalog) -> Vec<String> {
        let mut problems = Vec::new();
        for package in &catalog.installed {
            for requirement in &package.requires {
                if !catalog.is_name_installed(requirement) {
                    problems.push(format!(
                        "{} requires {requirement}, which would not be installed",
                        package.id()
                    ));
                }
            }
        }
        problems
    }
}

fn transaction_error(message: String) -> EngineError {
    EngineError::new(EngineErrorKind::Transaction, message)
}

fn verb(item: &TransactionItem) -> &'static str {
    match item.change {
        ChangeType::Install => "install",
        ChangeType::Update => "update",
        ChangeType::Remove => "erase",
        ChangeType::Reinstall => "reinstall",
        ChangeType::Downgrade => "downgrade",
    }
}

fn newest_first(mut records: Vec<HistoryRecord>) -> Vec<HistoryRecord> {
    records.sort_by(|a, b| b.id.cmp(&a.id));
    records
}

fn sorted_descriptors(mut packages: Vec<&CatalogPackage>) -> Vec<PackageDescriptor> {
    packages.sort_by(|a, b| {
        a.name
            .cmp(&b.name)
            .then_with(|| a.arch.cmp(&b.arch))
            .then_with(|| a.cmp_evr(b))
            .then_with(|| a.repo.cmp(&b.repo))
    });
    packages.dedup_by(|a, b| a.matches_id(&b.id()));
    packages.into_iter().map(CatalogPackage::descriptor).collect()
}

#[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation)]
fn fraction(done: u64, total: u64) -> f32 {
    if total == 0 {
        1.0
    } else {
        (done as f64 / total as f64) as f32
    }
}

#[async_trait]
impl PackageEngine for MemoryEngine {
    async fn query(&self, query: &Query) -> Result<Vec<PackageDescriptor>, EngineError> {
        let catalog = self.read();
        let packages = match query {
            Query::Packages { filter } => Self::filter_packages(&catalog, *filter),
            Query::ByName {
                pattern,
                newest_only: newest,
            } => {
                let found = Self::by_name(&catalog, pattern);
                if *newest {
                    newest_only(found)
                } else {
                    found
                }
            }
            Query::Search {
                fields,
                keys,
                match_all,
                newest_only: newest,
            } => {
                let found = Self::search(&catalog, fields, keys, *match_all);
                if *newest {
                    newest_only(found)
                } else {
                    found
                }
            }
        };
        Ok(sorted_descriptors(packages))
    }

    async fn attribute(&self, package: &PackageId, attribute: &str) -> Result<Value, EngineError> {
        let catalog = self.read();
        let Some(entry) = catalog.find(package) else {
            return Ok(Value::Null);
        };
        if PSEUDO_ATTRIBUTES.contains(&attribute) {
            return Ok(Self::pseudo_attribute(&catalog, entry, attribute));
        }
        let value = match attribute {
            "summary" => json!(entry.summary),
            "description" => json!(entry.description),
            "size" => json!(entry.size),
            "repo" => json!(entry.repo),
            "obsoletes" => json!(entry.obsoletes),
            "requires" => Self::requires_for(&catalog, entry),
            _ => Value::Null,
        };
        Ok(value)
    }

    async fn repositories(&self, filter: &str) -> Result<Vec<String>, EngineError> {
        let catalog = self.read();
        let ids = if filter.is_empty() || filter == "enabled" {
            catalog
                .repos
                .iter()
                .filter(|repo| repo.enabled)
                .map(|repo| repo.id.clone())
                .collect()
        } else {
            let matcher = NameMatcher::new(filter);
            catalog
                .repos
                .iter()
                .filter(|repo| matcher.is_match(&repo.id))
                .map(|repo| repo.id.clone())
                .collect()
        };
        Ok(ids)
    }

    async fn repo(&self, id: &str) -> Result<Option<RepoInfo>, EngineError> {
        Ok(self.read().repo(id).cloned())
    }

    async fn set_enabled_repos(&self, ids: &[String]) -> Result<(), EngineError> {
        let mut next = self.snapshot();
        next.set_enabled_repos(ids)?;
        self.replace(next).await?;
        tracing::info!(repos = ?ids, "enabled repositories changed");
        Ok(())
    }

    async fn groups(&self) -> Result<Vec<GroupCategory>, EngineError> {
        let catalog = self.read();
        let mut categories: BTreeMap<&str, Vec<GroupInfo>> = BTreeMap::new();
        for group in &catalog.groups {
            categories
                .entry(group.category.as_str())
                .or_default()
                .push(GroupInfo {
                    id: group.id.clone(),
                    name: group.name.clone(),
                    description: group.description.clone(),
                    installed: catalog.is_group_installed(group),
                });
        }
        Ok(categories
            .into_iter()
            .map(|(name, mut groups)| {
                groups.sort_by(|a, b| a.name.cmp(&b.name));
                GroupCategory {
                    name: name.to_string(),
                    groups,
                }
            })
            .collect())
    }

    async fn group_packages(
        &self,
        group: &str,
        all: bool,
    ) -> Result<Vec<PackageDescriptor>, EngineError> {
        let catalog = self.read();
        let Some(group) = catalog.group(group) else {
            return Ok(Vec::new());
        };
        let optional: &[String] = if all { &group.optional } else { &[] };
        let members: Vec<&CatalogPackage> = group
            .packages
            .iter()
            .chain(optional)
            .flat_map(|name| {
                newest_only(
                    catalog
                        .installed
                        .iter()
                        .chain(catalog.enabled_available())
                        .filter(|package| &package.name == name)
                        .collect(),
                )
            })
            .collect();
        Ok(sorted_descriptors(members))
    }

    async fn history_by_days(
        &self,
        start: u32,
        end: u32,
    ) -> Result<Vec<HistoryRecord>, EngineError> {
        let now = Utc::now();
        let window = i64::from(start)..=i64::from(end);
        let records = self
            .read()
            .history
            .iter()
            .filter(|entry| window.contains(&entry.age_days(now)))
            .map(HistoryEntry::record)
            .collect();
        Ok(newest_first(records))
    }

    async fn history_search(&self, patterns: &[String]) -> Result<Vec<HistoryRecord>, EngineError> {
        let matchers: Vec<NameMatcher> = patterns.iter().map(|p| NameMatcher::new(p)).collect();
        let touches = |id: &PackageId| matchers.iter().any(|m| m.is_match(&id.name));
        let records = self
            .read()
            .history
            .iter()
            .filter(|entry| {
                entry
                    .items
                    .iter()
                    .any(|item| touches(&item.package) || item.replaces.iter().any(touches))
            })
            .map(HistoryEntry::record)
            .collect();
        Ok(newest_first(records))
    }

    async fn history_packages(&self, id: u64) -> Result<Vec<TransactionItem>, EngineError> {
        self.read()
            .history_entry(id)
            .map(|entry| entry.items.clone())
            .ok_or_else(|| {
                EngineError::new(
                    EngineErrorKind::NotFound,
                    format!("no transaction {id} in history"),
                )
            })
    }

    async fn resolve(&self, action: &Action) -> Result<TransactionSummary, EngineError> {
        self.faults.enter(EnginePhase::Resolve).await?;
        let catalog = self.read();
        let summary = Resolver::new(&catalog, &self.protected).resolve(action)?;
        tracing::debug!(action = %action, %summary, "resolved");
        Ok(summary)
    }

    async fn download(
        &self,
        summary: &TransactionSummary,
        reporter: &dyn ProgressReporter,
    ) -> Result<(), EngineError> {
        let payloads: Vec<&TransactionItem> = summary.payloads().collect();
        let total_bytes = summary.download_size();
        reporter.download_started(payloads.len(), total_bytes);

        let planned = self.faults.enter(EnginePhase::Download).await;
        let mut done_bytes = 0u64;
        let mut failures = Vec::new();
        for item in &payloads {
            let exists = self.read().find(&item.package).is_some();
            if !exists {
                let message = "no such package in any repository".to_string();
                reporter.download_finished(&item.package, Some(message.clone()));
                failures.push(format!("{}: {message}", item.package));
                continue;
            }
            if let Err(error) = &planned {
                reporter.download_finished(&item.package, Some(error.message.clone()));
                failures.push(format!("{}: {}", item.package, error.message));
                continue;
            }
            for step in 1..=DOWNLOAD_STEPS {
                let part = item.size * u64::from(step) / u64::from(DOWNLOAD_STEPS);
                reporter.download_progress(
                    &item.package,
                    fraction(part, item.size),
                    fraction(done_bytes + part, total_bytes),
                    payloads.len(),
                );
                tokio::task::yield_now().await;
            }
            done_bytes += item.size;
            reporter.download_finished(&item.package, None);
        }

        match planned {
            Err(error) => Err(error.with_details(failures)),
            Ok(()) if failures.is_empty() => Ok(()),
            Ok(()) => Err(EngineError::new(
                EngineErrorKind::Download,
                format!("failed to download {} packages", failures.len()),
            )
            .with_details(failures)),
        }
    }

    async fn test(
        &self,
        summary: &TransactionSummary,
        reporter: &dyn ProgressReporter,
    ) -> Result<(), EngineError> {
        self.faults.enter(EnginePhase::Test).await?;
        let total = summary.items.len() as u64;
        let catalog = self.read();
        for (index, item) in summary.items.iter().enumerate() {
            reporter.package_progress(&item.package, "verify", (1, 1), (index as u64 + 1, total));
        }
        let next = Self::apply(&catalog, summary)?;
        let problems = Self::broken_requirements(&next);
        if problems.is_empty() {
            Ok(())
        } else {
            Err(EngineError::conflict(problems))
        }
    }

    async fn commit(
        &self,
        summary: &TransactionSummary,
        reporter: &dyn ProgressReporter,
    ) -> Result<(), EngineError> {
        self.faults.enter(EnginePhase::Commit).await?;
        let total = summary.items.len() as u64;
        let mut next = {
            let catalog = self.read();
            Self::apply(&catalog, summary)?
        };
        let history_id = next.record(summary, Utc::now());
        self.replace(next).await?;
        for (index, item) in summary.items.iter().enumerate() {
            reporter.package_progress(
                &item.package,
                verb(item),
                (item.size, item.size),
                (index as u64 + 1, total),
            );
        }
        tracing::info!(%summary, history_id, "transaction committed");
        Ok(())
    }
}
