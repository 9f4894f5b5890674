use std::fs;
use std::path::PathBuf;

use cw_core::{GuardError, PathGuard, is_contained};
use proptest::prelude::*;

fn segment() -> impl Strategy<Value = String> {
    prop_oneof![
        Just("..".to_string()),
        Just(".".to_string()),
        Just("Fluid".to_string()),
        Just("cases_other".to_string()),
        "[a-z]{1,6}",
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn resolved_paths_never_leave_the_root(segments in prop::collection::vec(segment(), 1..6)) {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("cases");
        fs::create_dir_all(root.join("Fluid").join("cavity2d")).unwrap();
        fs::create_dir_all(dir.path().join("cases_other")).unwrap();
        let guard = PathGuard::new(&root).unwrap();

        let candidate: PathBuf = segments.iter().collect();
        match guard.resolve(&candidate) {
            Ok(resolved) => prop_assert!(is_contained(guard.root(), &resolved)),
            Err(GuardError::OutsideRoot { .. }) | Err(GuardError::NotFound { .. }) => {}
            Err(other) => prop_assert!(false, "unexpected error: {other}"),
        }
    }
}

#[test]
fn textual_prefix_is_not_containment() {
    let root = PathBuf::from("/srv/cases");
    assert!(!is_contained(&root, &PathBuf::from("/srv/cases_other/x")));
    assert!(!is_contained(&root, &PathBuf::from("/srv/casesx")));
    assert!(is_contained(&root, &PathBuf::from("/srv/cases/Fluid/x")));
    assert!(is_contained(&root, &root));
}

#[test]
fn missing_root_is_reported() {
    let dir = tempfile::tempdir().unwrap();
    let err = PathGuard::new(dir.path().join("nope")).unwrap_err();
    assert!(matches!(err, GuardError::Root { .. }));
}
