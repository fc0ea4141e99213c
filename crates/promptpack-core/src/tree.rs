//! Snapshot tree container and statistics.

use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use compact_str::CompactString;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::error::ScanWarning;
use crate::node::{Fingerprint, Node, NodeKind};
use crate::path::{self, ROOT};

/// Summary statistics for a scanned tree.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeStats {
    /// Total size of all files in bytes.
    pub total_size: u64,
    /// Total number of files.
    pub total_files: u64,
    /// Total number of folders, excluding the root.
    pub total_folders: u64,
    /// Maximum depth reached.
    pub max_depth: u32,
}

impl TreeStats {
    /// Create new empty stats.
    pub fn new() -> Self {
        Self::default()
    }

    /// Update stats with a file entry.
    pub fn record_file(&mut self, size: u64, depth: u32) {
        self.total_files += 1;
        self.total_size += size;
        self.max_depth = self.max_depth.max(depth);
    }

    /// Record a folder.
    pub fn record_folder(&mut self, depth: u32) {
        self.total_folders += 1;
        self.max_depth = self.max_depth.max(depth);
    }
}

/// Immutable snapshot of a workspace.
///
/// Nodes live in a flat map keyed by relative path, laid out in depth-first
/// pre-order (root first, folders before files within each folder). Iterating
/// the tree therefore yields the same order a recursive walk would.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectTree {
    /// Absolute root path that was scanned.
    pub root_path: PathBuf,

    /// All nodes, keyed by relative path.
    nodes: IndexMap<CompactString, Node>,

    /// Summary statistics.
    pub stats: TreeStats,

    /// When this scan was performed.
    pub scanned_at: SystemTime,

    /// Duration of the scan.
    pub scan_duration: Duration,

    /// Warnings encountered during the scan.
    pub warnings: Vec<ScanWarning>,
}

impl ProjectTree {
    /// Build a tree from path specs without touching the filesystem.
    ///
    /// Specs ending in `/` are folders, everything else is a zero-byte file.
    /// Missing parent folders are created.
    pub fn from_paths(root_path: impl Into<PathBuf>, specs: &[&str]) -> Self {
        let mut builder = TreeBuilder::new(root_path);
        for spec in specs {
            if spec.ends_with('/') {
                builder.insert(Node::new_folder(path::normalize(spec), None));
            } else {
                builder.insert(Node::new_file(path::normalize(spec), 0, None));
            }
        }
        builder.build(Duration::ZERO)
    }

    /// Get the root node.
    pub fn root(&self) -> Option<&Node> {
        self.nodes.get(ROOT)
    }

    /// Look up a node by relative path.
    pub fn get(&self, path: &str) -> Option<&Node> {
        self.nodes.get(path)
    }

    /// Check whether a relative path exists in this snapshot.
    pub fn contains(&self, path: &str) -> bool {
        self.nodes.contains_key(path)
    }

    /// Number of nodes, including the root.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Check if the tree has no nodes at all.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// All nodes in depth-first order.
    pub fn iter(&self) -> impl Iterator<Item = &Node> {
        self.nodes.values()
    }

    /// All relative paths in depth-first order.
    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.nodes.keys().map(CompactString::as_str)
    }

    /// File nodes in depth-first order.
    pub fn files(&self) -> impl Iterator<Item = &Node> {
        self.nodes.values().filter(|n| n.is_file())
    }

    /// Direct children of a folder, in display order.
    pub fn children(&self, path: &str) -> impl Iterator<Item = &Node> {
        self.nodes
            .get(path)
            .map(|n| n.children.as_slice())
            .unwrap_or_default()
            .iter()
            .filter_map(|child| self.nodes.get(child))
    }

    /// Nodes at and below `path`, in depth-first order.
    pub fn subtree(&self, path: &str) -> impl Iterator<Item = &Node> {
        let start = self.nodes.get_index_of(path);
        let folder = CompactString::from(path);
        start
            .into_iter()
            .flat_map(move |index| self.nodes.values().skip(index))
            .take_while(move |node| path::is_within(&node.path, &folder))
    }

    /// Fingerprint of every entry, keyed by relative path.
    pub fn fingerprints(&self) -> BTreeMap<CompactString, Fingerprint> {
        self.nodes
            .iter()
            .map(|(path, node)| (path.clone(), node.fingerprint()))
            .collect()
    }

    /// Check whether two snapshots hold the same nodes in the same order.
    ///
    /// Scan timing and warnings are ignored.
    pub fn same_snapshot(&self, other: &ProjectTree) -> bool {
        self.root_path == other.root_path
            && self.nodes.len() == other.nodes.len()
            && self.nodes.values().eq(other.nodes.values())
    }

    /// Get the total size of all files.
    pub fn total_size(&self) -> u64 {
        self.stats.total_size
    }

    /// Get the total number of files.
    pub fn total_files(&self) -> u64 {
        self.stats.total_files
    }

    /// Get the total number of folders.
    pub fn total_folders(&self) -> u64 {
        self.stats.total_folders
    }

    /// Check if there were any warnings during scanning.
    pub fn has_warnings(&self) -> bool {
        !self.warnings.is_empty()
    }

    /// Absolute filesystem path of a node.
    pub fn absolute_path(&self, relative: &str) -> PathBuf {
        path::to_fs(&self.root_path, relative)
    }
}

/// Assembles a [`ProjectTree`] from entries discovered in any order.
#[derive(Debug)]
pub struct TreeBuilder {
    root_path: PathBuf,
    root_modified: Option<SystemTime>,
    entries: HashMap<CompactString, Node>,
    warnings: Vec<ScanWarning>,
}

impl TreeBuilder {
    /// Start a tree for the given root.
    pub fn new(root_path: impl Into<PathBuf>) -> Self {
        Self {
            root_path: root_path.into(),
            root_modified: None,
            entries: HashMap::new(),
            warnings: Vec::new(),
        }
    }

    /// Record the modification time of the root folder.
    pub fn root_modified(mut self, modified: Option<SystemTime>) -> Self {
        self.root_modified = modified;
        self
    }

    /// Add a node. Missing parent folders are created on the fly.
    ///
    /// Returns `false` if the node was rejected: it is the root, or one of its
    /// ancestors (or the path itself) was already added with a conflicting kind.
    pub fn insert(&mut self, node: Node) -> bool {
        if node.path.is_empty() {
            return false;
        }

        let conflicting_parent = path::ancestors(&node.path)
            .filter(|a| !a.is_empty())
            .any(|a| self.entries.get(a).is_some_and(|n| n.is_file()));
        if conflicting_parent {
            return false;
        }

        match self.entries.get_mut(&node.path) {
            Some(existing) if existing.kind != node.kind => return false,
            Some(existing) => {
                // Folders may be created implicitly before their own entry arrives.
                existing.modified = node.modified;
                existing.size = node.size;
                return true;
            }
            None => {}
        }

        let parents: Vec<CompactString> = path::ancestors(&node.path)
            .filter(|a| !a.is_empty() && !self.entries.contains_key(*a))
            .map(CompactString::from)
            .collect();
        for parent in parents {
            self.entries
                .insert(parent.clone(), Node::new_folder(parent, None));
        }
        self.entries.insert(node.path.clone(), node);
        true
    }

    /// Attach a non-fatal warning to the tree.
    pub fn warn(&mut self, warning: ScanWarning) {
        self.warnings.push(warning);
    }

    /// Number of entries added so far (excluding the root).
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if nothing was added yet.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Lay the entries out in depth-first order and compute folder sizes.
    pub fn build(mut self, scan_duration: Duration) -> ProjectTree {
        let mut by_parent: HashMap<CompactString, Vec<CompactString>> = HashMap::new();
        for key in self.entries.keys() {
            if let Some(parent) = path::parent(key) {
                by_parent
                    .entry(CompactString::from(parent))
                    .or_default()
                    .push(key.clone());
            }
        }
        for children in by_parent.values_mut() {
            children.sort_by(|a, b| display_order(&self.entries, a, b));
        }

        let mut root = Node::new_folder(ROOT, self.root_modified);
        root.name = root_name(&self.root_path);
        self.entries.insert(CompactString::from(ROOT), root);

        let mut nodes = IndexMap::with_capacity(self.entries.len());
        let mut stats = TreeStats::new();
        place(ROOT, 0, &mut self.entries, &mut by_parent, &mut nodes, &mut stats);

        ProjectTree {
            root_path: self.root_path,
            nodes,
            stats,
            scanned_at: SystemTime::now(),
            scan_duration,
            warnings: self.warnings,
        }
    }
}

/// Folders before files, then case-sensitive by name.
fn display_order(entries: &HashMap<CompactString, Node>, a: &str, b: &str) -> Ordering {
    let rank = |p: &str| match entries.get(p).map(|n| n.kind) {
        Some(NodeKind::Folder) => 0u8,
        _ => 1u8,
    };
    rank(a)
        .cmp(&rank(b))
        .then_with(|| path::file_name(a).cmp(path::file_name(b)))
}

fn root_name(root_path: &Path) -> CompactString {
    root_path
        .file_name()
        .map(|n| CompactString::new(n.to_string_lossy()))
        .unwrap_or_else(|| CompactString::new(root_path.to_string_lossy()))
}

/// Move `path` and its subtree into `out`, returning the subtree size.
fn place(
    path: &str,
    depth: u32,
    entries: &mut HashMap<CompactString, Node>,
    by_parent: &mut HashMap<CompactString, Vec<CompactString>>,
    out: &mut IndexMap<CompactString, Node>,
    stats: &mut TreeStats,
) -> u64 {
    let Some(mut node) = entries.remove(path) else {
        return 0;
    };

    if node.is_file() {
        stats.record_file(node.size, depth);
        let size = node.size;
        out.insert(node.path.clone(), node);
        return size;
    }

    if depth > 0 {
        stats.record_folder(depth);
    }
    let children = by_parent.remove(path).unwrap_or_default();
    node.children = children.clone();
    let (index, _) = out.insert_full(node.path.clone(), node);

    let mut size = 0;
    for child in &children {
        size += place(child, depth + 1, entries, by_parent, out, stats);
    }
    if let Some((_, folder)) = out.get_index_mut(index) {
        folder.size = size;
    }
    size
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tree_stats_record() {
        let mut stats = TreeStats::new();
        stats.record_file(1024, 2);
        stats.record_folder(1);

        assert_eq!(stats.total_files, 1);
        assert_eq!(stats.total_size, 1024);
        assert_eq!(stats.total_folders, 1);
        assert_eq!(stats.max_depth, 2);
    }

    #[test]
    fn test_builder_orders_folders_first() {
        let tree = ProjectTree::from_paths(
            "/p",
            &["z.txt", "a.txt", "lib/", "src/b.py", "src/a.py", "B.txt"],
        );
        let order: Vec<_> = tree.paths().collect();
        assert_eq!(
            order,
            vec!["", "lib", "src", "src/a.py", "src/b.py", "B.txt", "a.txt", "z.txt"]
        );
    }

    #[test]
    fn test_builder_aggregates_sizes() {
        let mut builder = TreeBuilder::new("/p");
        builder.insert(Node::new_file("src/a.py", 10, None));
        builder.insert(Node::new_file("src/deep/b.py", 5, None));
        builder.insert(Node::new_file("top.md", 1, None));
        let tree = builder.build(Duration::ZERO);

        assert_eq!(tree.get("src").unwrap().size, 15);
        assert_eq!(tree.get("src/deep").unwrap().size, 5);
        assert_eq!(tree.root().unwrap().size, 16);
        assert_eq!(tree.total_files(), 3);
        assert_eq!(tree.total_folders(), 2);
        assert_eq!(tree.root().unwrap().name, "p");
    }

    #[test]
    fn test_builder_rejects_conflicts() {
        let mut builder = TreeBuilder::new("/p");
        assert!(builder.insert(Node::new_file("a", 1, None)));
        assert!(!builder.insert(Node::new_file("a/b", 1, None)));
        assert!(!builder.insert(Node::new_folder("a", None)));
        assert!(!builder.insert(Node::new_folder("", None)));
    }

    #[test]
    fn test_subtree_and_children() {
        let tree = ProjectTree::from_paths("/p", &["src/a.py", "src/x/y.py", "srcs/z.py"]);
        let sub: Vec<_> = tree.subtree("src").map(|n| n.path.as_str()).collect();
        assert_eq!(sub, vec!["src", "src/x", "src/x/y.py", "src/a.py"]);

        let kids: Vec<_> = tree.children("").map(|n| n.name.as_str()).collect();
        assert_eq!(kids, vec!["src", "srcs"]);
        assert_eq!(tree.subtree("missing").count(), 0);
    }

    #[test]
    fn test_same_snapshot() {
        let a = ProjectTree::from_paths("/p", &["src/a.py"]);
        let b = ProjectTree::from_paths("/p", &["src/a.py"]);
        let c = ProjectTree::from_paths("/p", &["src/b.py"]);
        assert!(a.same_snapshot(&b));
        assert!(!a.same_snapshot(&c));
    }
}
