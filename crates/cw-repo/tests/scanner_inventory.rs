use std::fs;
use std::path::Path;

use cw_core::{CaseId, PathGuard, UNCATEGORIZED};
use cw_repo::{CaseScanner, RepoError};

fn make_case(root: &Path, rel: &str) {
    let dir = root.join(rel);
    fs::create_dir_all(&dir).expect("failed to create case dir");
    fs::write(dir.join("Makefile"), "all:\n\t@echo build\n").expect("failed to write Makefile");
}

fn scratch_root() -> (tempfile::TempDir, CaseScanner) {
    let dir = tempfile::tempdir().expect("failed to create temp dir");
    let root = dir.path().join("cases");
    fs::create_dir_all(&root).expect("failed to create root");
    let guard = PathGuard::new(&root).expect("failed to guard root");
    (dir, CaseScanner::new(guard))
}

fn ids(scanner: &CaseScanner) -> Vec<String> {
    scanner
        .list_cases()
        .into_iter()
        .map(|c| c.id.to_string())
        .collect()
}

#[test]
fn lists_cases_sorted_by_domain_then_name() {
    let (_dir, scanner) = scratch_root();
    let root = scanner.guard().root().to_path_buf();
    make_case(&root, "Thermal/rayleighBenard2d");
    make_case(&root, "Fluid/poiseuille2d");
    make_case(&root, "Fluid/cavity2d");
    fs::create_dir_all(root.join("Fluid").join("notes")).unwrap();

    let cases = scanner.list_cases();
    let listed: Vec<(&str, &str)> = cases
        .iter()
        .map(|c| (c.domain.as_str(), c.name.as_str()))
        .collect();
    assert_eq!(
        listed,
        [
            ("Fluid", "cavity2d"),
            ("Fluid", "poiseuille2d"),
            ("Thermal", "rayleighBenard2d"),
        ]
    );
    assert!(cases.iter().all(|c| c.path.starts_with(&root)));
}

#[test]
fn repeated_scans_are_identical() {
    let (_dir, scanner) = scratch_root();
    let root = scanner.guard().root().to_path_buf();
    for name in ["e", "b", "d", "a", "c"] {
        make_case(&root, &format!("Domain{name}/case_{name}"));
        make_case(&root, &format!("Shared/case_{name}"));
    }
    let first = scanner.list_cases();
    let second = scanner.list_cases();
    assert_eq!(first, second);
}

#[test]
fn root_level_case_is_uncategorized() {
    let (_dir, scanner) = scratch_root();
    let root = scanner.guard().root().to_path_buf();
    make_case(&root, "standalone");

    let cases = scanner.list_cases();
    assert_eq!(cases.len(), 1);
    assert_eq!(cases[0].id.as_str(), "standalone");
    assert_eq!(cases[0].domain, UNCATEGORIZED);
}

#[test]
fn case_directories_are_not_descended() {
    let (_dir, scanner) = scratch_root();
    let root = scanner.guard().root().to_path_buf();
    make_case(&root, "Fluid/cavity2d");
    // Would be found if the walk entered the case.
    make_case(&root, "Fluid/cavity2d/nested");
    make_case(&root, "outer");
    make_case(&root, "outer/inner");

    assert_eq!(ids(&scanner), ["Fluid/cavity2d", "outer"]);
}

#[test]
fn accumulated_output_does_not_change_the_inventory() {
    let (_dir, scanner) = scratch_root();
    let root = scanner.guard().root().to_path_buf();
    make_case(&root, "Fluid/cavity2d");
    let output = root.join("Fluid").join("cavity2d").join("tmp").join("vtkData");
    fs::create_dir_all(&output).unwrap();
    for i in 0..10_000 {
        fs::write(output.join(format!("cavity2d_{i:05}.vti")), b"").unwrap();
    }

    assert_eq!(ids(&scanner), ["Fluid/cavity2d"]);
}

#[test]
fn scan_cost_ignores_case_contents() {
    let (_dir, scanner) = scratch_root();
    let root = scanner.guard().root().to_path_buf();
    make_case(&root, "Fluid/cavity2d");
    make_case(&root, "standalone");

    let mut walk = scanner.walk();
    assert_eq!(walk.by_ref().count(), 2);
    let baseline = walk.visited();

    // Output written straight into the cases, at every depth the walk reaches.
    for case in ["standalone", "Fluid/cavity2d"] {
        let dir = root.join(case);
        for i in 0..2_000 {
            fs::write(dir.join(format!("frame_{i:05}.dat")), b"").unwrap();
        }
        fs::create_dir_all(dir.join("results")).unwrap();
    }
    let total = walkdir::WalkDir::new(&root).into_iter().count();
    assert!(total > 4_000);

    let mut walk = scanner.walk();
    assert_eq!(walk.by_ref().count(), 2);
    assert_eq!(walk.visited(), baseline);
}

#[test]
fn hidden_and_ignored_directories_are_skipped() {
    let (_dir, scanner) = scratch_root();
    let root = scanner.guard().root().to_path_buf();
    make_case(&root, "tmp");
    make_case(&root, "TestDomain/tmp");
    make_case(&root, ".git/hooks");
    make_case(&root, "Fluid/.hidden");
    make_case(&root, "Fluid/visible");

    assert_eq!(ids(&scanner), ["Fluid/visible"]);
}

#[test]
fn missing_root_yields_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path().join("cases");
    fs::create_dir_all(&root).unwrap();
    let scanner = CaseScanner::new(PathGuard::new(&root).unwrap());
    fs::remove_dir_all(&root).unwrap();

    assert!(scanner.list_cases().is_empty());
}

#[test]
fn custom_descriptor_is_honoured() {
    let (_dir, scanner) = scratch_root();
    let scanner = scanner.with_descriptor("CMakeLists.txt");
    let root = scanner.guard().root().to_path_buf();
    make_case(&root, "Fluid/make_only");
    fs::create_dir_all(root.join("Fluid").join("cmake_case")).unwrap();
    fs::write(root.join("Fluid/cmake_case/CMakeLists.txt"), "").unwrap();

    assert_eq!(ids(&scanner), ["Fluid/cmake_case"]);
}

#[test]
fn find_resolves_single_case() {
    let (_dir, scanner) = scratch_root();
    let root = scanner.guard().root().to_path_buf();
    make_case(&root, "Fluid/cavity2d");
    fs::create_dir_all(root.join("Fluid").join("not_a_case")).unwrap();

    let case = scanner
        .find(&CaseId::parse("Fluid/cavity2d").unwrap())
        .expect("case should be found");
    assert_eq!(case.name, "cavity2d");
    assert_eq!(case.domain, "Fluid");

    for missing in ["Fluid/not_a_case", "Fluid/absent", "Fluid"] {
        let err = scanner.find(&CaseId::parse(missing).unwrap()).unwrap_err();
        assert!(
            matches!(err, RepoError::CaseNotFound { .. }),
            "{missing}: {err}"
        );
    }
}

#[cfg(unix)]
#[test]
fn symlinks_leaving_the_root_are_ignored() {
    let (dir, scanner) = scratch_root();
    let root = scanner.guard().root().to_path_buf();
    make_case(&root, "Fluid/cavity2d");
    let outside = dir.path().join("outside");
    make_case(&outside, "Evil/stolen");
    make_case(&outside, "loose");
    std::os::unix::fs::symlink(outside.join("Evil"), root.join("Evil")).unwrap();
    std::os::unix::fs::symlink(outside.join("loose"), root.join("Fluid").join("loose")).unwrap();

    assert_eq!(ids(&scanner), ["Fluid/cavity2d"]);
}

#[cfg(unix)]
#[test]
fn symlinks_inside_the_root_are_followed() {
    let (_dir, scanner) = scratch_root();
    let root = scanner.guard().root().to_path_buf();
    make_case(&root, "Fluid/cavity2d");
    std::os::unix::fs::symlink(root.join("Fluid"), root.join("Alias")).unwrap();

    assert_eq!(ids(&scanner), ["Alias/cavity2d", "Fluid/cavity2d"]);
}
