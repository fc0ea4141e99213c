use std::time::{Duration, SystemTime};

use promptpack_core::{
    Fingerprint, Node, NodeKind, ProjectTree, ScanConfig, ScanError, ScanWarning, TreeBuilder,
    WarningKind, path,
};

#[test]
fn test_node_kind_discrimination() {
    assert!(NodeKind::File.is_file());
    assert!(!NodeKind::File.is_folder());
    assert!(NodeKind::Folder.is_folder());
    assert!(!NodeKind::Folder.is_file());
}

#[test]
fn test_file_fingerprint_tracks_size_and_mtime() {
    let now = SystemTime::now();
    let node = Node::new_file("docs/readme.md", 2048, Some(now));

    assert_eq!(node.fingerprint(), Fingerprint::new(2048, Some(now)));
    assert_eq!(node.name.as_str(), "readme.md");
    assert!(!node.is_root());
}

#[test]
fn test_tree_is_depth_first() {
    let tree = ProjectTree::from_paths(
        "/work/app",
        &["README.md", "src/main.rs", "src/util/mod.rs", "tests/", "Cargo.toml"],
    );

    let order: Vec<_> = tree.paths().collect();
    assert_eq!(
        order,
        vec![
            "",
            "src",
            "src/util",
            "src/util/mod.rs",
            "src/main.rs",
            "tests",
            "Cargo.toml",
            "README.md",
        ]
    );

    // Every parent appears before its children.
    for (index, node) in tree.iter().enumerate() {
        if let Some(parent) = path::parent(&node.path) {
            let parent_index = tree.paths().position(|p| p == parent).unwrap();
            assert!(parent_index < index);
        }
    }
}

#[test]
fn test_tree_lookup_and_children() {
    let tree = ProjectTree::from_paths("/work/app", &["src/a.py", "src/b.py", "notes.txt"]);

    assert!(tree.contains("src"));
    assert!(tree.contains("src/a.py"));
    assert!(!tree.contains("src/c.py"));

    let src = tree.get("src").unwrap();
    assert!(src.is_folder());
    assert_eq!(src.children.len(), 2);

    let names: Vec<_> = tree.children("src").map(|n| n.name.as_str()).collect();
    assert_eq!(names, vec!["a.py", "b.py"]);

    assert_eq!(tree.files().count(), 3);
    assert_eq!(tree.len(), 5);
}

#[test]
fn test_fingerprint_map_covers_every_node() {
    let mut builder = TreeBuilder::new("/work/app");
    let stamp = SystemTime::UNIX_EPOCH + Duration::from_secs(1_000);
    builder.insert(Node::new_folder("src", Some(stamp)));
    builder.insert(Node::new_file("src/lib.rs", 42, Some(stamp)));
    let tree = builder.root_modified(Some(stamp)).build(Duration::from_millis(3));

    let prints = tree.fingerprints();
    assert_eq!(prints.len(), 3);
    assert_eq!(prints["src/lib.rs"], Fingerprint::new(42, Some(stamp)));
    assert_eq!(prints["src"], Fingerprint::new(0, Some(stamp)));
    assert_eq!(prints[""], Fingerprint::new(0, Some(stamp)));
}

#[test]
fn test_tree_serde_keeps_order() {
    let tree = ProjectTree::from_paths("/work/app", &["b/", "a.txt", "b/c.txt"]);
    let json = serde_json::to_string(&tree).unwrap();
    let back: ProjectTree = serde_json::from_str(&json).unwrap();

    assert!(tree.same_snapshot(&back));
    assert_eq!(
        back.paths().collect::<Vec<_>>(),
        tree.paths().collect::<Vec<_>>()
    );
}

#[test]
fn test_scan_config_defaults() {
    let config = ScanConfig::new("/work/app");

    assert!(config.ignore_patterns.iter().any(|p| p == "node_modules"));
    assert_eq!(config.ignore_files, vec![".gitignore".to_string()]);
    assert!(config.included_extensions.is_empty());
    assert!(config.max_depth.is_none());
}

#[test]
fn test_scan_config_roundtrip_with_defaults() {
    let config: ScanConfig = serde_json::from_str(r#"{"root": "/work/app"}"#).unwrap();
    assert_eq!(config.ignore_patterns, ScanConfig::new("/x").ignore_patterns);
    assert!(!config.include_hidden);
}

#[test]
fn test_errors_and_warnings() {
    let err = ScanError::NotADirectory {
        path: "/work/app/file.txt".into(),
    };
    assert!(err.to_string().contains("not a directory"));

    let warning = ScanWarning::broken_symlink("/work/app/link", "missing");
    assert_eq!(warning.kind, WarningKind::BrokenSymlink);
    assert!(warning.message.contains("missing"));
}
