//! Integration tests for types

#[cfg(test)]
mod tests {
    use pkgd_types::*;
    use proptest::prelude::*;
    use std::cmp::Ordering;
    use std::str::FromStr;

    #[test]
    fn test_package_id_round_trip() {
        let raw = "bash,0,5.2.26,1.fc40,x86_64,@System";
        let id = PackageId::from_str(raw).unwrap();
        assert_eq!(id.name, "bash");
        assert!(id.is_installed());
        assert_eq!(id.to_string(), raw);
    }

    #[test]
    fn test_package_id_rejects_short_ids() {
        assert!(PackageId::from_str("bash,0,5.2").is_err());
        assert!(PackageId::from_str("bash,x,5.2,1,x86_64,updates").is_err());
        assert!(PackageId::from_str(",0,5.2,1,x86_64,updates").is_err());
    }

    #[test]
    fn test_phase_monotonicity() {
        assert!(Phase::Pending.can_advance_to(Phase::Authorizing));
        assert!(Phase::Queued.can_advance_to(Phase::Resolving));
        assert!(!Phase::Resolving.can_advance_to(Phase::Queued));
        assert!(Phase::Downloading.can_advance_to(Phase::Cancelled));
        assert!(!Phase::Succeeded.can_advance_to(Phase::Failed));
        assert!(Phase::TestRun.accepts_cancel());
        assert!(!Phase::Committing.accepts_cancel());
        assert!(Phase::Committing.holds_lock());
        assert!(!Phase::Queued.holds_lock());
    }

    #[test]
    fn test_action_kind_names() {
        for kind in ActionKind::ALL {
            assert_eq!(ActionKind::from_str(kind.name()).unwrap(), kind);
        }
        assert!(ActionKind::from_str("query").is_err());
    }

    #[test]
    fn test_summary_groups_by_change() {
        let pkg = |name: &str, repo: &str| {
            PackageId::new(name, Evr::new(0, "1.0", "1"), "x86_64", repo)
        };
        let summary = TransactionSummary::new(vec![
            TransactionItem {
                change: ChangeType::Remove,
                package: pkg("old", "@System"),
                size: 10,
                replaces: vec![],
            },
            TransactionItem {
                change: ChangeType::Install,
                package: pkg("new", "fedora"),
                size: 20,
                replaces: vec![],
            },
        ]);
        assert_eq!(summary.items[0].change, ChangeType::Install);
        assert_eq!(summary.download_size(), 20);
        assert_eq!(summary.to_string(), "install 1, remove 1");
        assert_eq!(TransactionSummary::default().to_string(), "nothing to do");
    }

    #[test]
    fn test_phase_serialization() {
        let json = serde_json::to_string(&Phase::TestRun).unwrap();
        assert_eq!(json, r#""test_run""#);
    }

    #[test]
    fn test_operation_id_parse() {
        let id = OperationId::new();
        assert_eq!(OperationId::from_str(&id.to_string()).unwrap(), id);
        assert!(OperationId::from_str("not-a-uuid").is_err());
    }

    proptest! {
        #[test]
        fn version_comparison_is_antisymmetric(a in "[0-9a-z.~]{0,8}", b in "[0-9a-z.~]{0,8}") {
            prop_assert_eq!(compare_versions(&a, &b), compare_versions(&b, &a).reverse());
        }

        #[test]
        fn numeric_versions_order_like_integers(a in 0u32..100_000, b in 0u32..100_000) {
            prop_assert_eq!(
                compare_versions(&a.to_string(), &b.to_string()),
                a.cmp(&b)
            );
        }
    }

    #[test]
    fn test_version_equal_to_itself() {
        assert_eq!(compare_versions("1.2.3", "1.2.3"), Ordering::Equal);
    }
}
