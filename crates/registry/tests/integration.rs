//! Integration tests for the operation registry

#[cfg(test)]
mod tests {
    use pkgd_errors::{FailureCause, RegistryError};
    use pkgd_events::{EventKind, Outcome, ProgressEvent};
    use pkgd_registry::*;
    use pkgd_types::{Action, ActionKind, Caller, OperationId, Phase, Progress, TransactionSummary};
    use std::time::Duration;

    fn install(target: &str) -> Action {
        Action::new(ActionKind::Install, [target])
    }

    fn user() -> Caller {
        Caller::new(1000, Some(77))
    }

    fn enter(registry: &OperationRegistry, id: OperationId, phase: Phase) -> ProgressEvent {
        registry
            .dispatch(id, ProgressEvent::phase_entered(id, phase, phase.as_str()))
            .unwrap()
    }

    fn lock_busy(id: OperationId, attempt: u32) -> ProgressEvent {
        ProgressEvent::new(
            id,
            Phase::Pending,
            EventKind::LockBusy {
                holder: "other".into(),
                attempt,
            },
            Progress::None,
            "waiting",
        )
    }

    fn succeed(registry: &OperationRegistry, id: OperationId) -> ProgressEvent {
        let outcome = Outcome::Succeeded {
            summary: TransactionSummary::default(),
        };
        registry
            .dispatch(id, ProgressEvent::terminal(id, outcome))
            .unwrap()
    }

    #[tokio::test]
    async fn test_sequences_are_dense_and_start_at_one() {
        let registry = OperationRegistry::new(Duration::from_secs(60));
        let id = registry.create(user(), install("editor"));

        let first = enter(&registry, id, Phase::Pending);
        let second = enter(&registry, id, Phase::Authorizing);
        let third = registry.dispatch(id, lock_busy(id, 1)).unwrap();

        assert_eq!(first.sequence, 1);
        assert_eq!(second.sequence, 2);
        assert_eq!(third.sequence, 3);
        assert_eq!(third.operation, id);
    }

    #[tokio::test]
    async fn test_intra_phase_events_take_current_phase() {
        let registry = OperationRegistry::new(Duration::from_secs(60));
        let id = registry.create(user(), install("editor"));
        enter(&registry, id, Phase::Queued);

        let stored = registry.dispatch(id, lock_busy(id, 1)).unwrap();
        assert_eq!(stored.phase, Phase::Queued);
        assert_eq!(registry.phase(id), Some(Phase::Queued));
    }

    #[tokio::test]
    async fn test_phase_regression_rejected() {
        let registry = OperationRegistry::new(Duration::from_secs(60));
        let id = registry.create(user(), install("editor"));
        enter(&registry, id, Phase::Resolving);

        let err = registry
            .dispatch(id, ProgressEvent::phase_entered(id, Phase::Queued, "back"))
            .unwrap_err();
        assert!(matches!(err, RegistryError::PhaseRegression { .. }));
        assert_eq!(registry.phase(id), Some(Phase::Resolving));
    }

    #[tokio::test]
    async fn test_nothing_after_terminal() {
        let registry = OperationRegistry::new(Duration::from_secs(60));
        let id = registry.create(user(), install("editor"));
        succeed(&registry, id);

        let err = registry.dispatch(id, lock_busy(id, 1)).unwrap_err();
        assert!(matches!(err, RegistryError::AlreadyTerminal { .. }));
        assert!(registry.outcome(id).unwrap().is_success());
        assert_eq!(registry.phase(id), Some(Phase::Succeeded));
    }

    #[tokio::test]
    async fn test_unknown_operation() {
        let registry = OperationRegistry::new(Duration::from_secs(60));
        let missing = OperationId::new();
        assert!(matches!(
            registry.attach(missing, user()),
            Err(RegistryError::UnknownOperation { .. })
        ));
        assert!(registry.dispatch(missing, lock_busy(missing, 1)).is_err());
        assert!(registry.phase(missing).is_none());
    }

    #[tokio::test]
    async fn test_late_attach_sees_full_history_then_live() {
        let registry = OperationRegistry::new(Duration::from_secs(60));
        let id = registry.create(user(), install("editor"));
        enter(&registry, id, Phase::Pending);
        enter(&registry, id, Phase::Authorizing);

        let (snapshot, mut subscription) = registry.attach(id, user()).unwrap();
        assert_eq!(snapshot.phase, Phase::Authorizing);
        let seen: Vec<u64> = snapshot.events.iter().map(|e| e.sequence).collect();
        assert_eq!(seen, vec![1, 2]);

        enter(&registry, id, Phase::Queued);
        succeed(&registry, id);

        let live = subscription.recv().await.unwrap();
        assert_eq!(live.sequence, 3);
        let last = subscription.recv().await.unwrap();
        assert!(last.is_terminal());
        assert!(subscription.recv().await.is_none());
        assert!(!subscription.is_open());
    }

    #[tokio::test]
    async fn test_observers_see_identical_sequences() {
        let registry = OperationRegistry::new(Duration::from_secs(60));
        let id = registry.create(user(), install("editor"));
        let (_, mut early) = registry.attach(id, user()).unwrap();

        enter(&registry, id, Phase::Pending);
        let (snapshot, mut late) = registry.attach(id, Caller::root()).unwrap();
        enter(&registry, id, Phase::Authorizing);
        succeed(&registry, id);

        let mut early_seen = Vec::new();
        while let Some(event) = early.recv().await {
            early_seen.push(event.sequence);
        }
        let mut late_seen: Vec<u64> = snapshot.events.iter().map(|e| e.sequence).collect();
        while let Some(event) = late.recv().await {
            late_seen.push(event.sequence);
        }
        assert_eq!(early_seen, vec![1, 2, 3]);
        assert_eq!(late_seen, early_seen);
    }

    #[tokio::test]
    async fn test_attach_after_terminal_gets_outcome_only() {
        let registry = OperationRegistry::new(Duration::from_secs(60));
        let id = registry.create(user(), install("editor"));
        enter(&registry, id, Phase::Pending);
        let outcome = Outcome::failed(FailureCause::Cancelled);
        registry
            .dispatch(id, ProgressEvent::terminal(id, outcome))
            .unwrap();

        let (snapshot, mut subscription) = registry.attach(id, user()).unwrap();
        assert_eq!(snapshot.events.len(), 1);
        assert!(snapshot.events[0].is_terminal());
        assert!(snapshot.outcome.is_some());
        assert!(!subscription.is_open());
        assert!(subscription.recv().await.is_none());
        assert_eq!(registry.info(id).unwrap().observers, 0);
    }

    #[tokio::test]
    async fn test_dropping_subscription_detaches() {
        let registry = OperationRegistry::new(Duration::from_secs(60));
        let id = registry.create(user(), install("editor"));
        let (_, first) = registry.attach(id, user()).unwrap();
        let (_, second) = registry.attach(id, user()).unwrap();
        assert_eq!(registry.info(id).unwrap().observers, 2);

        drop(first);
        assert_eq!(registry.info(id).unwrap().observers, 1);
        second.detach();
        assert_eq!(registry.info(id).unwrap().observers, 0);

        // an operation keeps running with nobody watching
        enter(&registry, id, Phase::Pending);
        assert_eq!(registry.phase(id), Some(Phase::Pending));
    }

    #[tokio::test]
    async fn test_create_or_resume() {
        let registry = OperationRegistry::new(Duration::from_secs(60));
        let (first, resumed) = registry.create_or_resume(user(), install("editor"));
        assert!(!resumed);

        let (again, resumed) =
            registry.create_or_resume(Caller::new(1000, Some(99)), install("editor"));
        assert!(resumed);
        assert_eq!(again, first);

        let (other, resumed) = registry.create_or_resume(user(), install("viewer"));
        assert!(!resumed);
        assert_ne!(other, first);

        let (stranger, resumed) =
            registry.create_or_resume(Caller::new(1001, None), install("editor"));
        assert!(!resumed);
        assert_ne!(stranger, first);

        succeed(&registry, first);
        let (fresh, resumed) = registry.create_or_resume(user(), install("editor"));
        assert!(!resumed);
        assert_ne!(fresh, first);
        assert_eq!(registry.active_count(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reap_respects_retention_and_observers() {
        let registry = OperationRegistry::new(Duration::from_secs(30));
        let watched = registry.create(user(), install("editor"));
        let idle = registry.create(user(), install("viewer"));
        let running = registry.create(user(), install("kernel"));
        let (_, subscription) = registry.attach(watched, user()).unwrap();

        succeed(&registry, watched);
        succeed(&registry, idle);
        assert_eq!(registry.reap(), 0);

        tokio::time::advance(Duration::from_secs(31)).await;
        assert_eq!(registry.reap(), 1);
        assert!(registry.phase(idle).is_none());
        assert!(registry.phase(watched).is_some());
        assert!(registry.phase(running).is_some());

        drop(subscription);
        assert_eq!(registry.reap(), 1);
        assert_eq!(registry.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reaper_task_runs_periodically() {
        let registry = OperationRegistry::new(Duration::from_secs(10));
        let id = registry.create(user(), install("editor"));
        succeed(&registry, id);
        let reaper = registry.spawn_reaper(Duration::from_secs(5));

        tokio::time::sleep(Duration::from_secs(16)).await;
        assert!(registry.is_empty());
        reaper.abort();
    }
}
