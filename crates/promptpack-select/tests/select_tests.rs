use std::fs;

use promptpack_core::ProjectTree;
use promptpack_scan::{ScanConfig, TreeScanner};
use promptpack_select::{
    AssembleOptions, Assembler, ExclusionSet, Inclusion, ToggleOutcome, assemble, bulk_set,
    compute_effective, toggle,
};
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

fn sample_tree() -> ProjectTree {
    ProjectTree::from_paths(
        "/work/app",
        &[
            "src/main.rs",
            "src/util/mod.rs",
            "src/util/fmt.rs",
            "tests/it.rs",
            "assets/",
            "Cargo.toml",
        ],
    )
}

/// Every exclusion set we can build from single toggles over the tree.
fn toggled_sets(tree: &ProjectTree) -> Vec<ExclusionSet> {
    let paths: Vec<_> = tree.paths().filter(|p| !p.is_empty()).collect();
    let mut sets = vec![ExclusionSet::new()];
    for first in &paths {
        for second in &paths {
            let mut set = ExclusionSet::new();
            set.toggle(first);
            set.toggle(second);
            sets.push(set);
        }
    }
    sets
}

#[test]
fn test_cascade_holds_for_every_node() {
    let tree = sample_tree();
    for set in toggled_sets(&tree) {
        let state = compute_effective(&tree, &set);
        for node in tree.iter().filter(|n| !n.is_root()) {
            let parent = promptpack_core::path::parent(&node.path).unwrap();
            let expected = state.is_included(parent) && !set.contains(&node.path);
            assert_eq!(state.is_included(&node.path), expected, "{}", node.path);
        }
        assert!(state.is_included(""));
    }
}

#[test]
fn test_no_upward_inclusion() {
    let tree = sample_tree();
    let mut set = ExclusionSet::new();
    set.insert("src");
    // Listing a child again changes nothing for the ancestor.
    set.insert("src/util");
    let state = compute_effective(&tree, &set);
    assert_eq!(state.get("src"), Some(Inclusion::Excluded));
    assert!(!state.is_included("src/util/fmt.rs"));
}

#[test]
fn test_toggle_twice_restores_state() {
    let tree = sample_tree();
    for path in tree.paths().filter(|p| !p.is_empty()) {
        let mut set = ExclusionSet::new();
        set.insert("tests");
        let before = set.clone();

        let first = toggle(path, &tree, &mut set);
        let second = toggle(path, &tree, &mut set);
        if first.changed() {
            assert!(second.changed());
        }
        assert_eq!(set, before, "toggling {path} twice");
    }
}

#[test]
fn test_blocked_toggle_keeps_set() {
    let tree = sample_tree();
    let mut set = ExclusionSet::new();
    toggle("src", &tree, &mut set);

    let outcome = toggle("src/util/mod.rs", &tree, &mut set);
    assert_eq!(outcome, ToggleOutcome::Blocked { ancestor: "src".into() });
    assert!(!outcome.changed());
    assert_eq!(set.len(), 1);
}

#[test]
fn test_bulk_operations() {
    let tree = sample_tree();
    let none = bulk_set(&tree, false);
    let state = compute_effective(&tree, &none);
    assert!(assemble(&tree, &state).is_empty());
    assert_eq!(none.len(), tree.children("").count());

    let all = bulk_set(&tree, true);
    let state = compute_effective(&tree, &all);
    assert_eq!(assemble(&tree, &state).len(), tree.files().count());
}

#[test]
fn test_stale_entries_are_tolerated() {
    let tree = sample_tree();
    let mut set = ExclusionSet::new();
    set.insert("old/removed.rs");
    set.insert("tests");

    let state = compute_effective(&tree, &set);
    assert!(!state.is_included("tests/it.rs"));
    assert_eq!(set.dormant(&tree).collect::<Vec<_>>(), vec!["old/removed.rs"]);

    let grown = ProjectTree::from_paths("/work/app", &["old/removed.rs", "src/main.rs"]);
    let state = compute_effective(&grown, &set);
    assert!(!state.is_included("old/removed.rs"));
}

#[test]
fn test_exclude_and_restore_scenario() {
    let temp = TempDir::new().unwrap();
    let root = temp.path();
    fs::create_dir_all(root.join("src")).unwrap();
    fs::create_dir_all(root.join("build")).unwrap();
    fs::write(root.join("src/a.py"), "a = 1\n").unwrap();
    fs::write(root.join("src/b.py"), "b = 2\n").unwrap();
    fs::write(root.join("build/out.o"), [0u8; 4]).unwrap();

    let config = ScanConfig::builder()
        .root(root)
        .ignore_patterns(vec!["build/".to_string()])
        .build()
        .unwrap();
    let tree = TreeScanner::new()
        .scan(&config, &CancellationToken::new())
        .unwrap();

    let mut set = ExclusionSet::new();
    let state = compute_effective(&tree, &set);
    assert_eq!(assemble(&tree, &state), vec!["src/a.py", "src/b.py"]);

    assert_eq!(toggle("src", &tree, &mut set), ToggleOutcome::Excluded);
    assert!(assemble(&tree, &compute_effective(&tree, &set)).is_empty());

    assert_eq!(toggle("src", &tree, &mut set), ToggleOutcome::Included);
    assert_eq!(
        assemble(&tree, &compute_effective(&tree, &set)),
        vec!["src/a.py", "src/b.py"]
    );
}

#[test]
fn test_binary_files_are_skipped() {
    let temp = TempDir::new().unwrap();
    let root = temp.path();
    fs::write(root.join("logo.png"), [0x89, b'P', b'N', b'G', 0x00, 0x00, 0xFF]).unwrap();
    fs::write(root.join("main.py"), "print('hi')\n").unwrap();

    let tree = TreeScanner::new()
        .scan(&ScanConfig::new(root), &CancellationToken::new())
        .unwrap();
    let state = compute_effective(&tree, &ExclusionSet::new());
    let options = AssembleOptions {
        max_files: None,
        skip_binary: true,
    };
    let assembly = Assembler::new(options).assemble(&tree, &state);

    assert_eq!(assembly.files, vec!["main.py"]);
    assert_eq!(assembly.skipped_binary, vec!["logo.png"]);
    assert!(!assembly.truncated);
}
