//! Integration tests for events

#[cfg(test)]
mod tests {
    use pkgd_errors::{EngineError, EngineErrorKind, FailureCause};
    use pkgd_events::*;
    use pkgd_types::{
        ChangeType, Evr, OperationId, PackageId, Phase, Progress, TransactionItem,
        TransactionSummary,
    };
    use std::sync::Mutex;

    fn pkg(name: &str) -> PackageId {
        PackageId::new(name, Evr::new(0, "1.0", "1"), "x86_64", "main")
    }

    #[derive(Default)]
    struct Collect(Mutex<Vec<(EventKind, Progress, String)>>);

    impl ProgressReporter for Collect {
        fn report(&self, kind: EventKind, progress: Progress, detail: String) {
            self.0
                .lock()
                .unwrap()
                .push((kind, progress, detail));
        }
    }

    #[test]
    fn test_terminal_event_carries_outcome_phase() {
        let op = OperationId::new();
        let ok = ProgressEvent::terminal(
            op,
            Outcome::Succeeded {
                summary: TransactionSummary::default(),
            },
        );
        assert_eq!(ok.phase, Phase::Succeeded);
        assert!(ok.is_terminal());
        assert!(ok.enters_phase());
        assert_eq!(ok.progress, Progress::percent(100.0));

        let cancelled = ProgressEvent::terminal(op, Outcome::Cancelled);
        assert_eq!(cancelled.phase, Phase::Cancelled);
        assert_eq!(cancelled.detail, "transaction cancelled");

        let failed = ProgressEvent::terminal(
            op,
            Outcome::failed(FailureCause::LockTimeout { waited_secs: 600 }),
        );
        assert_eq!(failed.phase, Phase::Failed);
        assert!(failed.detail.contains("600s"));
        assert!(matches!(
            failed.outcome().and_then(Outcome::cause),
            Some(FailureCause::LockTimeout { waited_secs: 600 })
        ));
    }

    #[test]
    fn test_phase_entered_is_not_terminal() {
        let event = ProgressEvent::phase_entered(OperationId::new(), Phase::Resolving, "resolving");
        assert!(!event.is_terminal());
        assert!(event.enters_phase());
        assert!(event.outcome().is_none());
        assert_eq!(event.sequence, 0);
    }

    #[test]
    fn test_event_levels() {
        let op = OperationId::new();
        let failed = ProgressEvent::terminal(
            op,
            Outcome::failed(EngineError::new(EngineErrorKind::Download, "mirror down").into()),
        );
        assert_eq!(event_level(&failed), EventLevel::Error);

        let progress = ProgressEvent::new(
            op,
            Phase::Downloading,
            EventKind::DownloadProgress {
                package: pkg("a"),
                fraction: 0.5,
                total_fraction: 0.25,
                total_files: 2,
            },
            Progress::percent(25.0),
            "downloading a",
        );
        assert_eq!(event_level(&progress), EventLevel::Debug);

        let phase = ProgressEvent::phase_entered(op, Phase::Queued, "queued");
        assert_eq!(event_level(&phase), EventLevel::Info);
    }

    #[test]
    fn test_reporter_helpers() {
        let reporter = Collect::default();
        let a = pkg("a");
        reporter.download_started(1, 1024);
        reporter.download_progress(&a, 1.0, 1.0, 1);
        reporter.download_finished(&a, Some("checksum mismatch".to_string()));
        reporter.package_progress(&a, "install", (10, 10), (1, 2));

        let seen = reporter.0.lock().unwrap();
        assert_eq!(seen.len(), 4);
        assert!(matches!(
            seen[0].0,
            EventKind::DownloadStarted {
                files: 1,
                bytes: 1024
            }
        ));
        assert_eq!(seen[1].1, Progress::percent(100.0));
        match &seen[2].0 {
            EventKind::DownloadFinished { ok, message, .. } => {
                assert!(!ok);
                assert_eq!(message.as_deref(), Some("checksum mismatch"));
            }
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(seen[3].1, Progress::step(1, 2));
        assert_eq!(seen[3].2, "install a");
    }

    #[test]
    fn test_null_reporter_discards() {
        NullReporter.download_started(3, 10);
        NullReporter.report(EventKind::PhaseEntered, Progress::None, String::new());
    }

    #[test]
    fn test_event_wire_shape() {
        let summary = TransactionSummary::new(vec![TransactionItem {
            change: ChangeType::Install,
            package: pkg("a"),
            size: 10,
            replaces: vec![],
        }]);
        let event = ProgressEvent::new(
            OperationId::new(),
            Phase::Resolved,
            EventKind::Resolved { summary },
            Progress::None,
            "install 1",
        );
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["phase"], "resolved");
        assert_eq!(json["kind"]["type"], "resolved");
        assert_eq!(json["kind"]["summary"]["items"][0]["change"], "install");

        let terminal = ProgressEvent::terminal(
            OperationId::new(),
            Outcome::failed(FailureCause::Unauthorized {
                action: "install".to_string(),
            }),
        );
        let json = serde_json::to_value(&terminal).unwrap();
        assert_eq!(json["kind"]["outcome"]["result"], "failed");
        assert_eq!(json["kind"]["outcome"]["cause"]["cause"], "unauthorized");
    }
}
