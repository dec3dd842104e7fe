//! Integration tests for the reference engine

#[cfg(test)]
mod tests {
    use pkgd_engine::*;
    use pkgd_errors::{EngineError, EngineErrorKind};
    use pkgd_events::{EventKind, ProgressReporter};
    use chrono::{Duration, Utc};
    use pkgd_types::{
        Action, ActionKind, ChangeType, HistoryEntry, PackageFilter, PackageId, Progress, Query,
        RepoInfo, SearchField, TransactionSummary,
    };
    use serde_json::{json, Value};
    use std::sync::{Arc, Mutex};

    fn pkg(name: &str, version: &str, repo: &str) -> CatalogPackage {
        CatalogPackage {
            name: name.to_string(),
            epoch: 0,
            version: version.to_string(),
            release: "1".to_string(),
            arch: "x86_64".to_string(),
            repo: repo.to_string(),
            summary: format!("The {name} package"),
            description: format!("{name} does useful things"),
            size: 1000,
            requires: Vec::new(),
            obsoletes: Vec::new(),
            recent: false,
        }
    }

    fn repo(id: &str, enabled: bool) -> RepoInfo {
        RepoInfo {
            id: id.to_string(),
            name: format!("{id} repository"),
            enabled,
            gpgcheck: true,
            baseurl: Some(format!("https://mirror.example/{id}")),
        }
    }

    fn fixture() -> Catalog {
        let mut editor_new = pkg("editor", "2.0", "main");
        editor_new.requires = vec!["libtext".to_string()];
        let mut viewer = pkg("viewer", "1.0", "main");
        viewer.recent = true;
        let mut newshell = pkg("newshell", "1.0", "main");
        newshell.obsoletes = vec!["oldshell".to_string()];
        let mut plugin = pkg("plugin", "1.0", "@main");
        plugin.requires = vec!["editor".to_string()];

        Catalog {
            repos: vec![repo("main", true), repo("testing", false)],
            installed: vec![
                pkg("editor", "1.5", "@main"),
                plugin,
                pkg("oldshell", "1.0", "@main"),
                pkg("kernel", "6.1", "@main"),
                pkg("localtool", "0.1", "@commandline"),
            ],
            available: vec![
                pkg("editor", "1.0", "main"),
                pkg("editor", "1.5", "main"),
                editor_new,
                pkg("libtext", "3.0", "main"),
                viewer,
                newshell,
                pkg("plugin", "1.0", "main"),
                pkg("kernel", "6.1", "main"),
                pkg("kernel", "6.2", "main"),
                pkg("experimental", "0.1", "testing"),
            ],
            groups: vec![
                group("editing", "Applications", &["editor", "viewer"], &["libtext"]),
                group("base", "System", &["kernel"], &[]),
            ],
            history: Vec::new(),
        }
    }

    fn group(id: &str, category: &str, packages: &[&str], optional: &[&str]) -> CatalogGroup {
        CatalogGroup {
            id: id.to_string(),
            name: format!("{id} tools"),
            description: String::new(),
            category: category.to_string(),
            packages: packages.iter().map(ToString::to_string).collect(),
            optional: optional.iter().map(ToString::to_string).collect(),
        }
    }

    async fn run(engine: &MemoryEngine, action: Action) -> TransactionSummary {
        let summary = engine.resolve(&action).await.unwrap();
        let reporter = pkgd_events::NullReporter;
        engine.download(&summary, &reporter).await.unwrap();
        engine.test(&summary, &reporter).await.unwrap();
        engine.commit(&summary, &reporter).await.unwrap();
        summary
    }

    fn installed_names(engine: &MemoryEngine) -> Vec<String> {
        let mut names: Vec<String> = engine
            .snapshot()
            .installed
            .iter()
            .map(|p| format!("{}-{}", p.name, p.version))
            .collect();
        names.sort();
        names
    }

    fn engine() -> MemoryEngine {
        MemoryEngine::new(fixture()).with_protected(["kernel"])
    }

    fn names(descriptors: &[pkgd_types::PackageDescriptor]) -> Vec<String> {
        descriptors
            .iter()
            .map(|d| format!("{}-{}", d.id.name, d.id.version))
            .collect()
    }

    #[derive(Default)]
    struct Recorder(Mutex<Vec<(EventKind, Progress)>>);

    impl ProgressReporter for Recorder {
        fn report(&self, kind: EventKind, progress: Progress, _detail: String) {
            self.0.lock().unwrap().push((kind, progress));
        }
    }

    #[tokio::test]
    async fn test_package_filters() {
        let engine = engine();
        let installed = engine
            .query(&Query::Packages {
                filter: PackageFilter::Installed,
            })
            .await
            .unwrap();
        assert_eq!(installed.len(), 5);

        let updates = engine
            .query(&Query::Packages {
                filter: PackageFilter::Updates,
            })
            .await
            .unwrap();
        assert_eq!(names(&updates), vec!["editor-2.0", "kernel-6.2"]);

        let available = engine
            .query(&Query::Packages {
                filter: PackageFilter::Available,
            })
            .await
            .unwrap();
        // the disabled testing repository is hidden
        assert!(!names(&available).contains(&"experimental-0.1".to_string()));

        let recent = engine
            .query(&Query::Packages {
                filter: PackageFilter::Recent,
            })
            .await
            .unwrap();
        assert_eq!(names(&recent), vec!["viewer-1.0"]);

        let obsoletes = engine
            .query(&Query::Packages {
                filter: PackageFilter::Obsoletes,
            })
            .await
            .unwrap();
        assert_eq!(names(&obsoletes), vec!["newshell-1.0"]);

        let extras = engine
            .query(&Query::Packages {
                filter: PackageFilter::Extras,
            })
            .await
            .unwrap();
        assert_eq!(names(&extras), vec!["localtool-0.1", "oldshell-1.0"]);
    }

    #[tokio::test]
    async fn test_by_name_is_case_insensitive_and_newest_only() {
        let engine = engine();
        let all = engine
            .query(&Query::ByName {
                pattern: "EDIT*".to_string(),
                newest_only: false,
            })
            .await
            .unwrap();
        assert_eq!(all.len(), 4);

        let newest = engine
            .query(&Query::ByName {
                pattern: "edit?r".to_string(),
                newest_only: true,
            })
            .await
            .unwrap();
        assert_eq!(names(&newest), vec!["editor-2.0"]);
    }

    #[tokio::test]
    async fn test_search_match_all() {
        let engine = engine();
        let any = engine
            .query(&Query::Search {
                fields: vec![SearchField::Name, SearchField::Summary],
                keys: vec!["viewer".to_string(), "libtext".to_string()],
                match_all: false,
                newest_only: true,
            })
            .await
            .unwrap();
        assert_eq!(names(&any), vec!["libtext-3.0", "viewer-1.0"]);

        let all = engine
            .query(&Query::Search {
                fields: vec![SearchField::Description],
                keys: vec!["viewer".to_string(), "useful".to_string()],
                match_all: true,
                newest_only: false,
            })
            .await
            .unwrap();
        assert_eq!(names(&all), vec!["viewer-1.0"]);
    }

    #[tokio::test]
    async fn test_attributes_and_pseudo_attributes() {
        let engine = engine();
        let installed: PackageId = "editor,0,1.5,1,x86_64,@main".parse().unwrap();
        let newer: PackageId = "editor,0,2.0,1,x86_64,main".parse().unwrap();
        let older: PackageId = "editor,0,1.0,1,x86_64,main".parse().unwrap();

        assert_eq!(
            engine.attribute(&installed, "action").await.unwrap(),
            json!("remove")
        );
        assert_eq!(
            engine.attribute(&newer, "action").await.unwrap(),
            json!("update")
        );
        assert_eq!(
            engine.attribute(&older, "action").await.unwrap(),
            json!("downgrade")
        );
        assert_eq!(
            engine.attribute(&installed, "downgrades").await.unwrap(),
            json!(["editor,0,1.0,1,x86_64,main"])
        );
        assert_eq!(
            engine.attribute(&older, "downgrades").await.unwrap(),
            json!(["editor,0,1.5,1,x86_64,@main"])
        );
        assert_eq!(
            engine.attribute(&newer, "requires").await.unwrap(),
            json!({"libtext": ["libtext,0,3.0,1,x86_64,main"]})
        );
        assert_eq!(
            engine.attribute(&newer, "size").await.unwrap(),
            json!(1000)
        );
        assert_eq!(
            engine.attribute(&newer, "no-such-attr").await.unwrap(),
            Value::Null
        );
        for attribute in PSEUDO_ATTRIBUTES {
            assert_ne!(
                engine.attribute(&installed, attribute).await.unwrap(),
                Value::Null,
                "{attribute}"
            );
        }
        let missing: PackageId = "ghost,0,1,1,x86_64,main".parse().unwrap();
        assert_eq!(
            engine.attribute(&missing, "summary").await.unwrap(),
            Value::Null
        );
    }

    #[tokio::test]
    async fn test_repositories() {
        let engine = engine();
        assert_eq!(engine.repositories("").await.unwrap(), vec!["main"]);
        assert_eq!(engine.repositories("enabled").await.unwrap(), vec!["main"]);
        assert_eq!(engine.repositories("*").await.unwrap(), vec!["main", "testing"]);
        assert_eq!(engine.repositories("test*").await.unwrap(), vec!["testing"]);

        let info = engine.repo("testing").await.unwrap().unwrap();
        assert!(!info.enabled);
        assert!(engine.repo("nope").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_install_pulls_requirements() {
        let engine = MemoryEngine::new(fixture());
        let summary = engine
            .resolve(&Action::new(ActionKind::Install, ["editor"]))
            .await
            .unwrap();
        // editor 1.5 is installed, so installing it means updating to 2.0
        let update: Vec<_> = summary.of(ChangeType::Update).collect();
        assert_eq!(update.len(), 1);
        assert_eq!(update[0].package.version, "2.0");
        assert_eq!(update[0].replaces[0].to_string(), "editor,0,1.5,1,x86_64,@main");
        let install: Vec<_> = summary.of(ChangeType::Install).collect();
        assert_eq!(install[0].package.name, "libtext");
        assert_eq!(summary.to_string(), "install 1, update 1");
    }

    #[tokio::test]
    async fn test_install_unknown_is_conflict() {
        let engine = engine();
        let err = engine
            .resolve(&Action::new(ActionKind::Install, ["ghost"]))
            .await
            .unwrap_err();
        assert!(err.is_conflict());
        assert_eq!(err.details, vec!["no package matches 'ghost'"]);
    }

    #[tokio::test]
    async fn test_remove_cascades_to_dependents() {
        let engine = engine();
        let summary = engine
            .resolve(&Action::new(ActionKind::Remove, ["editor"]))
            .await
            .unwrap();
        let removed: Vec<_> = summary
            .of(ChangeType::Remove)
            .map(|item| item.package.name.clone())
            .collect();
        assert_eq!(removed.len(), 2);
        assert!(removed.contains(&"plugin".to_string()));
    }

    #[tokio::test]
    async fn test_remove_missing_is_nothing_to_do() {
        let engine = engine();
        let summary = engine
            .resolve(&Action::new(ActionKind::Remove, ["viewer"]))
            .await
            .unwrap();
        assert!(summary.is_empty());
    }

    #[tokio::test]
    async fn test_remove_protected_is_conflict() {
        let engine = engine();
        let err = engine
            .resolve(&Action::new(ActionKind::Remove, ["kern*"]))
            .await
            .unwrap_err();
        assert!(err.is_conflict());
        assert!(err.details[0].contains("protected package kernel"));
    }

    #[tokio::test]
    async fn test_update_downgrade_reinstall() {
        let engine = engine();
        let update = engine
            .resolve(&Action::new(ActionKind::Update, ["*"]))
            .await
            .unwrap();
        assert_eq!(update.of(ChangeType::Update).count(), 2);

        let downgrade = engine
            .resolve(&Action::new(ActionKind::Downgrade, ["editor"]))
            .await
            .unwrap();
        let item = downgrade.of(ChangeType::Downgrade).next().unwrap();
        assert_eq!(item.package.version, "1.0");

        let lowest = engine
            .resolve(&Action::new(ActionKind::Downgrade, ["kernel"]))
            .await
            .unwrap_err();
        assert!(lowest.is_conflict());

        let reinstall = engine
            .resolve(&Action::new(ActionKind::Reinstall, ["editor"]))
            .await
            .unwrap();
        assert_eq!(reinstall.of(ChangeType::Reinstall).count(), 1);

        let unavailable = engine
            .resolve(&Action::new(ActionKind::Reinstall, ["localtool"]))
            .await
            .unwrap_err();
        assert!(unavailable.details[0].contains("not available"));
    }

    #[tokio::test]
    async fn test_obsoleting_install_replaces() {
        let engine = engine();
        let summary = engine
            .resolve(&Action::new(ActionKind::Install, ["newshell"]))
            .await
            .unwrap();
        let item = summary.of(ChangeType::Install).next().unwrap();
        assert_eq!(item.replaces[0].name, "oldshell");
    }

    #[tokio::test]
    async fn test_full_pipeline_commits() {
        let engine = engine();
        let summary = engine
            .resolve(&Action::new(ActionKind::Install, ["viewer"]))
            .await
            .unwrap();
        let recorder = Recorder::default();
        engine.download(&summary, &recorder).await.unwrap();
        engine.test(&summary, &recorder).await.unwrap();
        engine.commit(&summary, &recorder).await.unwrap();

        let snapshot = engine.snapshot();
        let viewer = snapshot
            .installed
            .iter()
            .find(|p| p.name == "viewer")
            .unwrap();
        assert_eq!(viewer.repo, "@main");

        let events = recorder.0.lock().unwrap();
        assert!(matches!(
            events[0].0,
            EventKind::DownloadStarted { files: 1, bytes: 1000 }
        ));
        assert!(events.iter().any(|(kind, progress)| matches!(
            kind,
            EventKind::DownloadProgress { .. }
        ) && *progress == Progress::percent(100.0)));
        assert!(events
            .iter()
            .any(|(kind, _)| matches!(kind, EventKind::DownloadFinished { ok: true, .. })));
        assert!(events.iter().any(|(kind, _)| matches!(
            kind,
            EventKind::PackageProgress { action, .. } if action == "install"
        )));
    }

    #[tokio::test]
    async fn test_failed_test_run_leaves_database_unchanged() {
        let faults = Arc::new(FaultPlan::new());
        let engine = MemoryEngine::new(fixture()).with_faults(Arc::clone(&faults));
        let before = engine.snapshot();
        faults.fail(
            EnginePhase::Test,
            EngineError::new(EngineErrorKind::Transaction, "file conflict"),
        );

        let summary = engine
            .resolve(&Action::new(ActionKind::Install, ["viewer"]))
            .await
            .unwrap();
        let err = engine
            .test(&summary, &pkgd_events::NullReporter)
            .await
            .unwrap_err();
        assert_eq!(err.kind, EngineErrorKind::Transaction);
        assert_eq!(engine.snapshot(), before);
        assert_eq!(faults.calls(EnginePhase::Test), 1);
        assert_eq!(faults.calls(EnginePhase::Commit), 0);
    }

    #[tokio::test]
    async fn test_download_fault_reports_each_payload() {
        let faults = Arc::new(FaultPlan::new());
        let engine = MemoryEngine::new(fixture()).with_faults(Arc::clone(&faults));
        faults.fail(
            EnginePhase::Download,
            EngineError::new(EngineErrorKind::Download, "mirror unreachable"),
        );
        let summary = engine
            .resolve(&Action::new(ActionKind::Install, ["editor"]))
            .await
            .unwrap();
        let recorder = Recorder::default();
        let err = engine.download(&summary, &recorder).await.unwrap_err();
        assert_eq!(err.kind, EngineErrorKind::Download);
        assert_eq!(err.details.len(), 2);
        let failed = recorder
            .0
            .lock()
            .unwrap()
            .iter()
            .filter(|(kind, _)| matches!(kind, EventKind::DownloadFinished { ok: false, .. }))
            .count();
        assert_eq!(failed, 2);
    }

    #[tokio::test]
    async fn test_gate_holds_engine() {
        let faults = Arc::new(FaultPlan::new());
        let engine = Arc::new(MemoryEngine::new(fixture()).with_faults(Arc::clone(&faults)));
        let gate = faults.gate(EnginePhase::Resolve);

        let task = {
            let engine = Arc::clone(&engine);
            tokio::spawn(async move {
                engine
                    .resolve(&Action::new(ActionKind::Install, ["viewer"]))
                    .await
            })
        };
        gate.entered().await;
        assert!(!task.is_finished());
        gate.open();
        let summary = task.await.unwrap().unwrap();
        assert_eq!(summary.items.len(), 1);
    }

    #[tokio::test]
    async fn test_commit_persists_catalog() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("catalog.json");
        tokio::fs::write(&path, serde_json::to_string(&fixture()).unwrap())
            .await
            .unwrap();

        let engine = MemoryEngine::load(&path).await.unwrap();
        let summary = engine
            .resolve(&Action::new(ActionKind::Remove, ["oldshell"]))
            .await
            .unwrap();
        engine
            .commit(&summary, &pkgd_events::NullReporter)
            .await
            .unwrap();

        let reloaded = Catalog::load(&path).await.unwrap();
        assert!(!reloaded.installed.iter().any(|p| p.name == "oldshell"));
        assert_eq!(reloaded, engine.snapshot());
    }

    #[tokio::test]
    async fn test_load_invalid_catalog() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("catalog.json");
        tokio::fs::write(&path, "{ not json").await.unwrap();
        let err = MemoryEngine::load(&path).await.err().unwrap();
        assert_eq!(err.kind, EngineErrorKind::Repository);
    }

    #[tokio::test]
    async fn test_groups_by_category() {
        let engine = engine();
        let categories = engine.groups().await.unwrap();
        let listed: Vec<(String, Vec<(String, bool)>)> = categories
            .into_iter()
            .map(|c| {
                let groups = c.groups.into_iter().map(|g| (g.id, g.installed)).collect();
                (c.name, groups)
            })
            .collect();
        assert_eq!(
            listed,
            vec![
                ("Applications".to_string(), vec![("editing".to_string(), false)]),
                ("System".to_string(), vec![("base".to_string(), true)]),
            ]
        );
    }

    #[tokio::test]
    async fn test_group_packages() {
        let engine = engine();
        let default = engine.group_packages("editing", false).await.unwrap();
        assert_eq!(names(&default), vec!["editor-2.0", "viewer-1.0"]);
        let all = engine.group_packages("editing", true).await.unwrap();
        assert_eq!(names(&all), vec!["editor-2.0", "libtext-3.0", "viewer-1.0"]);
        assert!(engine.group_packages("nope", true).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_group_install_and_remove() {
        let engine = engine();
        let install = engine
            .resolve(&Action::new(ActionKind::Install, ["@editing"]))
            .await
            .unwrap();
        let planned: Vec<(ChangeType, String)> = install
            .items
            .iter()
            .map(|i| (i.change, i.package.name.clone()))
            .collect();
        assert_eq!(planned, vec![(ChangeType::Install, "viewer".to_string())]);

        let remove = engine
            .resolve(&Action::new(ActionKind::Remove, ["@editing"]))
            .await
            .unwrap();
        let mut removed: Vec<String> = remove
            .items
            .iter()
            .map(|i| i.package.name.clone())
            .collect();
        removed.sort();
        assert_eq!(removed, vec!["editor", "plugin"]);

        for (kind, target) in [(ActionKind::Update, "@editing"), (ActionKind::Install, "@nope")] {
            let err = engine
                .resolve(&Action::new(kind, [target]))
                .await
                .unwrap_err();
            assert_eq!(err.kind, EngineErrorKind::Conflict, "{kind} {target}");
        }
    }

    #[tokio::test]
    async fn test_commit_records_history() {
        let engine = engine();
        run(&engine, Action::new(ActionKind::Install, ["viewer"])).await;
        run(&engine, Action::new(ActionKind::Remove, ["oldshell"])).await;

        let today = engine.history_by_days(0, 0).await.unwrap();
        let ids: Vec<u64> = today.iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![2, 1]);
        assert!(engine.history_by_days(1, 30).await.unwrap().is_empty());

        let found = engine.history_search(&["view*".to_string()]).await.unwrap();
        assert_eq!(found.iter().map(|r| r.id).collect::<Vec<_>>(), vec![1]);
        assert!(engine.history_search(&["ghost".to_string()]).await.unwrap().is_empty());

        let items = engine.history_packages(2).await.unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].change, ChangeType::Remove);
        assert_eq!(items[0].package.name, "oldshell");
        let err = engine.history_packages(9).await.unwrap_err();
        assert_eq!(err.kind, EngineErrorKind::NotFound);
    }

    #[tokio::test]
    async fn test_history_by_days_window() {
        let now = Utc::now();
        let mut catalog = fixture();
        let ages = [Duration::days(10), Duration::days(2), Duration::hours(1)];
        for (id, age) in (1..).zip(ages) {
            catalog.history.push(HistoryEntry {
                id,
                timestamp: now - age,
                items: Vec::new(),
            });
        }
        let engine = MemoryEngine::new(catalog);
        let ids = |records: Vec<pkgd_types::HistoryRecord>| -> Vec<u64> {
            records.iter().map(|r| r.id).collect()
        };
        assert_eq!(ids(engine.history_by_days(0, 3).await.unwrap()), vec![3, 2]);
        assert_eq!(ids(engine.history_by_days(5, 30).await.unwrap()), vec![1]);
        assert_eq!(ids(engine.history_by_days(0, 0).await.unwrap()), vec![3]);
    }

    #[tokio::test]
    async fn test_undo_reverts_install_and_update() {
        let engine = engine();
        let before = installed_names(&engine);
        run(&engine, Action::new(ActionKind::Install, ["viewer"])).await;
        run(&engine, Action::new(ActionKind::Update, ["editor"])).await;
        assert!(installed_names(&engine).contains(&"libtext-3.0".to_string()));

        let undo_update = run(&engine, Action::new(ActionKind::Undo, ["2"])).await;
        assert_eq!(undo_update.of(ChangeType::Downgrade).count(), 1);
        assert_eq!(undo_update.of(ChangeType::Remove).next().unwrap().package.name, "libtext");

        run(&engine, Action::new(ActionKind::Undo, ["1"])).await;
        assert_eq!(installed_names(&engine), before);
        assert_eq!(engine.snapshot().history.len(), 4);
    }

    #[tokio::test]
    async fn test_undo_remove_reinstalls() {
        let engine = engine();
        run(&engine, Action::new(ActionKind::Remove, ["oldshell"])).await;
        // oldshell was never offered by a repository
        let err = engine
            .resolve(&Action::new(ActionKind::Undo, ["1"]))
            .await
            .unwrap_err();
        assert_eq!(err.kind, EngineErrorKind::Conflict);

        run(&engine, Action::new(ActionKind::Remove, ["plugin"])).await;
        let summary = run(&engine, Action::new(ActionKind::Undo, ["2"])).await;
        assert_eq!(summary.of(ChangeType::Install).next().unwrap().package.name, "plugin");
        assert!(installed_names(&engine).contains(&"plugin-1.0".to_string()));
    }

    #[tokio::test]
    async fn test_undo_unknown_transaction() {
        let engine = engine();
        for target in ["7", "latest"] {
            let err = engine
                .resolve(&Action::new(ActionKind::Undo, [target]))
                .await
                .unwrap_err();
            assert_eq!(err.kind, EngineErrorKind::Conflict);
            assert!(err.details[0].contains("no transaction"));
        }
    }

    #[tokio::test]
    async fn test_set_enabled_repos() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("catalog.json");
        tokio::fs::write(&path, serde_json::to_string(&fixture()).unwrap())
            .await
            .unwrap();
        let engine = MemoryEngine::load(&path).await.unwrap();

        engine.set_enabled_repos(&["testing".to_string()]).await.unwrap();
        assert_eq!(engine.repositories("").await.unwrap(), vec!["testing"]);
        let available = engine
            .query(&Query::Packages {
                filter: PackageFilter::Available,
            })
            .await
            .unwrap();
        assert_eq!(names(&available), vec!["experimental-0.1"]);

        let err = engine
            .set_enabled_repos(&["main".to_string(), "nope".to_string()])
            .await
            .unwrap_err();
        assert_eq!(err.kind, EngineErrorKind::NotFound);
        assert_eq!(engine.repositories("").await.unwrap(), vec!["testing"]);

        let reloaded = Catalog::load(&path).await.unwrap();
        assert!(reloaded.repo("testing").unwrap().enabled);
        assert!(!reloaded.repo("main").unwrap().enabled);
    }
}
