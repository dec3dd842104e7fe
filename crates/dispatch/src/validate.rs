//! Request shape checks done before anything is created

use pkgd_errors::DispatchError;
use pkgd_types::{Action, ActionKind, PackageId};
use std::collections::HashSet;

/// Check a write request and build its action
///
/// Targets are names, name patterns, full package ids, or `@group` for
/// install and remove. An undo takes exactly one history id. Duplicates are
/// dropped keeping the first occurrence.
///
/// # Errors
///
/// Returns `DispatchError::MalformedRequest` for an empty target list or a
/// target that does not fit the action.
pub fn action(kind: ActionKind, targets: &[String]) -> Result<Action, DispatchError> {
    if targets.is_empty() {
        return Err(DispatchError::malformed(format!(
            "{kind} needs at least one target"
        )));
    }
    if kind == ActionKind::Undo {
        return undo(targets);
    }

    let mut seen = HashSet::new();
    let mut unique = Vec::with_capacity(targets.len());
    for target in targets {
        check_target(target)?;
        if let Some(group) = target.strip_prefix('@') {
            if !matches!(kind, ActionKind::Install | ActionKind::Remove) {
                return Err(DispatchError::malformed(format!(
                    "{kind} does not take group {target}"
                )));
            }
            non_empty("group", group)?;
        }
        if seen.insert(target.as_str()) {
            unique.push(target.clone());
        }
    }
    Ok(Action::new(kind, unique))
}

fn undo(targets: &[String]) -> Result<Action, DispatchError> {
    let [target] = targets else {
        return Err(DispatchError::malformed("undo takes exactly one transaction id"));
    };
    target
        .parse::<u64>()
        .map_err(|_| DispatchError::malformed(format!("invalid transaction id {target:?}")))?;
    Ok(Action::new(ActionKind::Undo, [target.as_str()]))
}

fn check_target(target: &str) -> Result<(), DispatchError> {
    if target.is_empty() {
        return Err(DispatchError::malformed("empty target"));
    }
    if target
        .chars()
        .any(|c| c.is_whitespace() || c.is_control())
    {
        return Err(DispatchError::malformed(format!(
            "target {target:?} contains whitespace or control characters"
        )));
    }
    if PackageId::looks_like_id(target) {
        package_id(target)?;
    }
    Ok(())
}

/// Parse a full `name,epoch,version,release,arch,repo` id
///
/// # Errors
///
/// Returns `DispatchError::MalformedRequest` if the id does not parse.
pub fn package_id(text: &str) -> Result<PackageId, DispatchError> {
    text.parse()
}

/// Reject empty strings in required fields
///
/// # Errors
///
/// Returns `DispatchError::MalformedRequest` naming the field.
pub fn non_empty(field: &str, value: &str) -> Result<(), DispatchError> {
    if value.trim().is_empty() {
        return Err(DispatchError::malformed(format!("{field} must not be empty")));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn targets(items: &[&str]) -> Vec<String> {
        items.iter().map(ToString::to_string).collect()
    }

    #[test]
    fn test_dedupes_in_order() {
        let action = action(ActionKind::Install, &targets(&["b", "a", "b"])).unwrap();
        assert_eq!(action.targets, vec!["b".to_string(), "a".to_string()]);
    }

    #[test]
    fn test_rejects_bad_targets() {
        for bad in [&[][..], &["two words"], &[""], &["tab\there"], &["half,id"]] {
            assert!(
                action(ActionKind::Remove, &targets(bad)).is_err(),
                "{bad:?} accepted"
            );
        }
    }

    #[test]
    fn test_group_targets() {
        assert!(action(ActionKind::Install, &targets(&["@editing"])).is_ok());
        assert!(action(ActionKind::Remove, &targets(&["@editing", "viewer"])).is_ok());
        assert!(action(ActionKind::Update, &targets(&["@editing"])).is_err());
        assert!(action(ActionKind::Install, &targets(&["@"])).is_err());
    }

    #[test]
    fn test_undo_takes_one_history_id() {
        let undo = action(ActionKind::Undo, &targets(&["12"])).unwrap();
        assert_eq!(undo.targets, vec!["12".to_string()]);
        for bad in [&["x"][..], &["1", "2"], &["-3"]] {
            assert!(action(ActionKind::Undo, &targets(bad)).is_err(), "{bad:?} accepted");
        }
    }

    #[test]
    fn test_accepts_full_ids_and_patterns() {
        let list = targets(&["editor,0,2.0,1,x86_64,main", "lib*"]);
        assert!(action(ActionKind::Install, &list).is_ok());
    }
}
