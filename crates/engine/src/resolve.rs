//! Dependency resolution over a catalog snapshot

use crate::catalog::{newest_only, Catalog, CatalogPackage};
use crate::matcher::NameMatcher;
use pkgd_errors::EngineError;
use pkgd_types::{Action, ActionKind, ChangeType, PackageId, TransactionItem, TransactionSummary};
use std::cmp::Ordering;
use std::collections::{BTreeSet, HashSet};

/// Turn an action into a change set, or the list of problems preventing it
pub(crate) struct Resolver<'a> {
    catalog: &'a Catalog,
    protected: &'a HashSet<String>,
    items: Vec<TransactionItem>,
    problems: Vec<String>,
}

impl<'a> Resolver<'a> {
    pub(crate) fn new(catalog: &'a Catalog, protected: &'a HashSet<String>) -> Self {
        Self {
            catalog,
            protected,
            items: Vec::new(),
            problems: Vec::new(),
        }
    }

    pub(crate) fn resolve(mut self, action: &Action) -> Result<TransactionSummary, EngineError> {
        for target in &action.targets {
            match action.kind {
                ActionKind::Undo => self.undo(target),
                kind if target.starts_with('@') => self.group(kind, target),
                ActionKind::Install => self.install(target),
                ActionKind::Remove => self.remove(target),
                ActionKind::Update => self.update(target),
                ActionKind::Reinstall => self.reinstall(target),
                ActionKind::Downgrade => self.downgrade(target),
            }
        }
        self.pull_requirements();
        self.check_protected();

        if self.problems.is_empty() {
            Ok(TransactionSummary::new(self.items))
        } else {
            Err(EngineError::conflict(self.problems))
        }
    }

    /// Entries from `pool` a target names, either by full id or by pattern
    fn matching<'p>(
        pool: impl Iterator<Item = &'p CatalogPackage>,
        target: &str,
    ) -> Vec<&'p CatalogPackage> {
        if PackageId::looks_like_id(target) {
            match target.parse::<PackageId>() {
                Ok(id) => pool.filter(|package| package.matches_id(&id)).collect(),
                Err(_) => Vec::new(),
            }
        } else {
            let matcher = NameMatcher::new(target);
            pool.filter(|package| matcher.is_match(&package.name))
                .collect()
        }
    }

    fn already_planned(&self, package: &CatalogPackage) -> bool {
        self.items.iter().any(|item| {
            item.package.name == package.name && item.package.arch == package.arch
        })
    }

    fn push(&mut self, change: ChangeType, package: &CatalogPackage, mut replaces: Vec<PackageId>) {
        if self.already_planned(package) {
            return;
        }
        if change.needs_payload() {
            replaces.extend(
                self.catalog
                    .installed
                    .iter()
                    .filter(|installed| package.obsoletes.contains(&installed.name))
                    .map(CatalogPackage::id),
            );
        }
        self.items.push(TransactionItem {
            change,
            package: package.id(),
            size: package.size,
            replaces,
        });
    }

    fn install(&mut self, target: &str) {
        let catalog = self.catalog;
        let explicit = PackageId::looks_like_id(target);
        let candidates = Self::matching(catalog.enabled_available(), target);
        if candidates.is_empty() {
            self.problems.push(format!("no package matches '{target}'"));
            return;
        }
        let candidates = if explicit {
            candidates
        } else {
            newest_only(candidates)
        };
        for package in candidates {
            match catalog.installed_in_slot(package) {
                None => self.push(ChangeType::Install, package, Vec::new()),
                Some(installed) => match package.cmp_evr(installed) {
                    Ordering::Greater => {
                        self.push(ChangeType::Update, package, vec![installed.id()]);
                    }
                    Ordering::Less if explicit => {
                        self.push(ChangeType::Downgrade, package, vec![installed.id()]);
                    }
                    // already installed
                    _ => {}
                },
            }
        }
    }

    fn remove(&mut self, target: &str) {
        let catalog = self.catalog;
        // removing something that is not installed is not an error
        let mut queue = Self::matching(catalog.installed.iter(), target);
        let mut removed: BTreeSet<String> = BTreeSet::new();
        while let Some(package) = queue.pop() {
            if !removed.insert(package.name.clone()) {
                continue;
            }
            self.push(ChangeType::Remove, package, Vec::new());
            // installed packages that need the removed one go too
            queue.extend(
                catalog
                    .installed
                    .iter()
                    .filter(|dependent| dependent.requires.contains(&package.name)),
            );
        }
    }

    fn update(&mut self, target: &str) {
        let catalog = self.catalog;
        let installed = Self::matching(catalog.installed.iter(), target);
        for current in installed {
            if let Some(newest) = catalog
                .upgrades_of(current)
                .max_by(|a, b| a.cmp_evr(b))
            {
                self.push(ChangeType::Update, newest, vec![current.id()]);
            }
        }
    }

    fn reinstall(&mut self, target: &str) {
        let catalog = self.catalog;
        let installed = Self::matching(catalog.installed.iter(), target);
        for current in installed {
            match catalog
                .enabled_available()
                .find(|package| package.same_build(current))
            {
                Some(package) => self.push(ChangeType::Reinstall, package, vec![current.id()]),
                None => self.problems.push(format!(
                    "installed package {} is not available in any enabled repository",
                    current.id()
                )),
            }
        }
    }

    fn downgrade(&mut self, target: &str) {
        let catalog = self.catalog;
        let installed = Self::matching(catalog.installed.iter(), target);
        for current in installed {
            match catalog
                .enabled_available()
                .filter(|package| {
                    package.same_slot(current) && package.cmp_evr(current) == Ordering::Less
                })
                .max_by(|a, b| a.cmp_evr(b))
            {
                Some(package) => self.push(ChangeType::Downgrade, package, vec![current.id()]),
                None => self.problems.push(format!(
                    "package {} of lowest version already installed, cannot downgrade it",
                    current.name
                )),
            }
        }
    }

    /// `@id` installs the group's missing members or removes the installed ones
    fn group(&mut self, kind: ActionKind, target: &str) {
        let catalog = self.catalog;
        let Some(group) = target.strip_prefix('@').and_then(|id| catalog.group(id)) else {
            self.problems.push(format!("no group matches '{target}'"));
            return;
        };
        match kind {
            ActionKind::Install => {
                for name in &group.packages {
                    if !catalog.is_name_installed(name) {
                        self.install(name);
                    }
                }
            }
            ActionKind::Remove => {
                for name in &group.packages {
                    self.remove(name);
                }
            }
            _ => self.problems.push(format!("{kind} does not apply to group {target}")),
        }
    }

    fn undo(&mut self, target: &str) {
        let catalog = self.catalog;
        let Some(entry) = target
            .parse::<u64>()
            .ok()
            .and_then(|id| catalog.history_entry(id))
        else {
            self.problems.push(format!("no transaction {target} in history"));
            return;
        };
        for item in &entry.items {
            match item.change {
                ChangeType::Remove => self.bring_back(&item.package),
                ChangeType::Install => {
                    self.take_back(&item.package);
                    // packages the install obsoleted
                    for replaced in &item.replaces {
                        self.bring_back(replaced);
                    }
                }
                ChangeType::Update | ChangeType::Downgrade => {
                    for replaced in &item.replaces {
                        self.bring_back(replaced);
                    }
                }
                ChangeType::Reinstall => {}
            }
        }
    }

    fn installed_build(&self, id: &PackageId) -> Option<&'a CatalogPackage> {
        self.catalog
            .installed
            .iter()
            .find(|package| package.id().same_build(id))
    }

    /// Remove the installed build `id` names
    fn take_back(&mut self, id: &PackageId) {
        match self.installed_build(id) {
            Some(package) => self.push(ChangeType::Remove, package, Vec::new()),
            None => self.problems.push(format!(
                "an operation cannot be undone: {} is no longer installed",
                id.name
            )),
        }
    }

    /// Install the build `id` names again, replacing whatever holds its slot
    fn bring_back(&mut self, id: &PackageId) {
        let catalog = self.catalog;
        if self.installed_build(id).is_some() {
            return;
        }
        let Some(package) = catalog
            .enabled_available()
            .find(|package| package.id().same_build(id))
        else {
            self.problems.push(format!(
                "an operation cannot be undone: {}-{} is not available",
                id.name,
                id.evr()
            ));
            return;
        };
        match catalog.installed_in_slot(package) {
            None => self.push(ChangeType::Install, package, Vec::new()),
            Some(installed) => {
                let change = match package.cmp_evr(installed) {
                    Ordering::Less => ChangeType::Downgrade,
                    _ => ChangeType::Update,
                };
                self.push(change, package, vec![installed.id()]);
            }
        }
    }

    /// Add installs for requirements of incoming packages that nothing provides yet
    fn pull_requirements(&mut self) {
        let catalog = self.catalog;
        let mut index = 0;
        while index < self.items.len() {
            let item = &self.items[index];
            index += 1;
            if !item.change.needs_payload() {
                continue;
            }
            let Some(package) = catalog.find(&item.package) else {
                continue;
            };
            let needed_by = package.id();
            for requirement in &package.requires {
                if self.provided(requirement) {
                    continue;
                }
                match catalog.newest_available(requirement) {
                    Some(provider) => self.push(ChangeType::Install, provider, Vec::new()),
                    None => self.problems.push(format!(
                        "nothing provides {requirement} needed by {needed_by}"
                    )),
                }
            }
        }

        let removed: Vec<String> = self
            .items
            .iter()
            .filter(|item| item.change == ChangeType::Remove)
            .map(|item| item.package.name.clone())
            .collect();
        for item in &self.items {
            if !item.change.needs_payload() {
                continue;
            }
            if let Some(package) = catalog.find(&item.package) {
                for requirement in package.requires.iter().filter(|r| removed.contains(r)) {
                    self.problems.push(format!(
                        "{} requires {requirement}, which is being removed",
                        item.package
                    ));
                }
            }
        }
    }

    /// Installed and not being removed, or already part of the plan
    fn provided(&self, name: &str) -> bool {
        let removed = self
            .items
            .iter()
            .any(|item| item.change == ChangeType::Remove && item.package.name == name);
        let planned = self
            .items
            .iter()
            .any(|item| item.change.needs_payload() && item.package.name == name);
        planned || (self.catalog.is_name_installed(name) && !removed)
    }

    fn check_protected(&mut self) {
        let mut doomed: Vec<&PackageId> = Vec::new();
        for item in &self.items {
            if item.change == ChangeType::Remove {
                doomed.push(&item.package);
            }
        }
        // an obsoleting install takes a protected package away as well
        for item in &self.items {
            if item.change == ChangeType::Install {
                doomed.extend(item.replaces.iter());
            }
        }
        let problems: Vec<String> = doomed
            .into_iter()
            .filter(|id| self.protected.contains(&id.name))
            .map(|id| format!("the operation would remove protected package {}", id.name))
            .collect();
        self.problems.extend(problems);
    }
}
