//! JWalk-based directory scanner producing snapshot trees.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use jwalk::{Parallelism, WalkDir};
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use promptpack_core::{
    Node, ProjectTree, ScanConfig, ScanError, ScanWarning, TreeBuilder, WarningKind, path,
};

use crate::matcher::PathMatcher;
use crate::progress::{ProgressTracker, ScanProgress};

/// How many admitted entries between two progress broadcasts.
const PROGRESS_INTERVAL: u64 = 256;

/// Walks a workspace root and builds an immutable [`ProjectTree`].
pub struct TreeScanner {
    progress_tx: broadcast::Sender<ScanProgress>,
}

impl TreeScanner {
    /// Create a new scanner.
    pub fn new() -> Self {
        let (progress_tx, _) = broadcast::channel(100);
        Self { progress_tx }
    }

    /// Subscribe to scan progress updates.
    pub fn subscribe(&self) -> broadcast::Receiver<ScanProgress> {
        self.progress_tx.subscribe()
    }

    /// Scan the configured root, compiling its ignore rules first.
    pub fn scan(
        &self,
        config: &ScanConfig,
        cancel: &CancellationToken,
    ) -> Result<ProjectTree, ScanError> {
        let mut config = config.clone();
        config.root = canonical_root(&config.root)?;
        let matcher = Arc::new(PathMatcher::from_config(&config));
        self.scan_with_matcher(&config, matcher, cancel)
    }

    /// Scan the configured root using an already compiled matcher.
    ///
    /// Entries the matcher rejects are pruned together with their subtree.
    /// Per-entry failures become warnings on the tree; a missing or unreadable
    /// root, or cancellation, fails the whole scan.
    pub fn scan_with_matcher(
        &self,
        config: &ScanConfig,
        matcher: Arc<PathMatcher>,
        cancel: &CancellationToken,
    ) -> Result<ProjectTree, ScanError> {
        let root_path = canonical_root(&config.root)?;
        let root_metadata =
            fs::metadata(&root_path).map_err(|e| ScanError::io(&root_path, e))?;
        fs::read_dir(&root_path).map_err(|e| ScanError::io(&root_path, e))?;

        let mut tracker = ProgressTracker::new();
        let mut builder =
            TreeBuilder::new(&root_path).root_modified(root_metadata.modified().ok());
        let mut warned: HashSet<PathBuf> = HashSet::new();

        let walker = self.walker(config, &root_path, matcher, cancel.clone());

        for entry_result in walker {
            if cancel.is_cancelled() {
                debug!(root = %root_path.display(), "scan cancelled");
                return Err(ScanError::Interrupted);
            }

            let entry = match entry_result {
                Ok(e) => e,
                Err(err) => {
                    let path = err.path().map(Path::to_path_buf).unwrap_or_default();
                    let warning = match err.io_error() {
                        Some(io) => ScanWarning::from_io(path, io),
                        None => ScanWarning::new(path, err.to_string(), WarningKind::ReadError),
                    };
                    push_warning(&mut builder, &mut tracker, &mut warned, warning);
                    continue;
                }
            };

            if entry.depth == 0 {
                continue;
            }

            let abs_path = entry.path();
            let Some(relative) = path::relative_to(&root_path, &abs_path) else {
                continue;
            };
            let file_type = entry.file_type();

            if file_type.is_dir() {
                let modified = entry.metadata().ok().and_then(|m| m.modified().ok());
                builder.insert(Node::new_folder(relative, modified));
                tracker.record_dir();
                // jwalk reports unreadable folders on the entry, not as an Err item.
                if let Some(err) = &entry.read_children_error {
                    let warning = match err.io_error() {
                        Some(io) => ScanWarning::from_io(&abs_path, io),
                        None => ScanWarning::new(&abs_path, err.to_string(), WarningKind::ReadError),
                    };
                    push_warning(&mut builder, &mut tracker, &mut warned, warning);
                }
            } else if file_type.is_file() {
                match entry.metadata() {
                    Ok(metadata) => {
                        tracker.record_file(metadata.len());
                        builder.insert(Node::new_file(
                            relative,
                            metadata.len(),
                            metadata.modified().ok(),
                        ));
                    }
                    Err(err) => {
                        let warning = ScanWarning::new(
                            &abs_path,
                            err.to_string(),
                            WarningKind::MetadataError,
                        );
                        push_warning(&mut builder, &mut tracker, &mut warned, warning);
                        continue;
                    }
                }
            } else if file_type.is_symlink() {
                // Never followed into directories; a link to a file is a file.
                match fs::metadata(&abs_path) {
                    Ok(target) if target.is_file() => {
                        tracker.record_file(target.len());
                        builder.insert(Node::new_file(
                            relative,
                            target.len(),
                            target.modified().ok(),
                        ));
                    }
                    Ok(_) => {
                        debug!(path = %abs_path.display(), "skipping symlink to directory");
                        continue;
                    }
                    Err(_) => {
                        let target = fs::read_link(&abs_path)
                            .map(|p| p.to_string_lossy().to_string())
                            .unwrap_or_default();
                        let warning = ScanWarning::broken_symlink(&abs_path, &target);
                        push_warning(&mut builder, &mut tracker, &mut warned, warning);
                        continue;
                    }
                }
            } else {
                continue;
            }

            if tracker.total_items() % PROGRESS_INTERVAL == 0 {
                tracker.set_current_path(abs_path);
                let _ = self.progress_tx.send(tracker.snapshot());
            }
        }

        if cancel.is_cancelled() {
            return Err(ScanError::Interrupted);
        }

        let _ = self.progress_tx.send(tracker.snapshot());
        let tree = builder.build(tracker.elapsed());
        debug!(
            root = %tree.root_path.display(),
            files = tree.total_files(),
            folders = tree.total_folders(),
            warnings = tree.warnings.len(),
            "scan complete"
        );
        Ok(tree)
    }

    fn walker(
        &self,
        config: &ScanConfig,
        root_path: &Path,
        matcher: Arc<PathMatcher>,
        cancel: CancellationToken,
    ) -> WalkDir {
        let parallelism = match config.threads {
            0 => Parallelism::RayonDefaultPool {
                busy_timeout: Duration::from_millis(100),
            },
            n => Parallelism::RayonNewPool(n),
        };
        let filter_root = root_path.to_path_buf();

        WalkDir::new(root_path)
            .parallelism(parallelism)
            .skip_hidden(false)
            .follow_links(false)
            .sort(true)
            .min_depth(0)
            .max_depth(config.max_depth.map(|d| d as usize).unwrap_or(usize::MAX))
            .process_read_dir(move |_depth, _dir, _state, children| {
                if cancel.is_cancelled() {
                    children.clear();
                    return;
                }
                children.retain(|child| match child {
                    Ok(entry) => {
                        let Some(relative) = path::relative_to(&filter_root, &entry.path())
                        else {
                            return true;
                        };
                        let pruned = matcher.matches(&relative, entry.file_type().is_dir());
                        if pruned {
                            debug!(path = %relative, "ignored by filter");
                        }
                        !pruned
                    }
                    Err(_) => true,
                });
            })
    }
}

impl Default for TreeScanner {
    fn default() -> Self {
        Self::new()
    }
}

/// Canonicalize a workspace root and check that it is a directory.
pub fn canonical_root(root: &Path) -> Result<PathBuf, ScanError> {
    let root_path = root.canonicalize().map_err(|e| ScanError::io(root, e))?;
    if !root_path.is_dir() {
        return Err(ScanError::NotADirectory { path: root_path });
    }
    Ok(root_path)
}

fn push_warning(
    builder: &mut TreeBuilder,
    tracker: &mut ProgressTracker,
    warned: &mut HashSet<PathBuf>,
    warning: ScanWarning,
) {
    if warned.insert(warning.path.clone()) {
        debug!(path = %warning.path.display(), kind = %warning.kind, "scan warning");
        tracker.record_warning();
        builder.warn(warning);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn create_test_tree() -> TempDir {
        let temp = TempDir::new().unwrap();
        let root = temp.path();

        fs::create_dir_all(root.join("src/nested")).unwrap();
        fs::create_dir(root.join("docs")).unwrap();

        fs::write(root.join("README.md"), "hello").unwrap();
        fs::write(root.join("src/b.py"), "print('b')").unwrap();
        fs::write(root.join("src/a.py"), "print('a')").unwrap();
        fs::write(root.join("src/nested/c.py"), "c").unwrap();
        fs::write(root.join("docs/guide.md"), "guide").unwrap();

        temp
    }

    fn scan(config: &ScanConfig) -> ProjectTree {
        TreeScanner::new()
            .scan(config, &CancellationToken::new())
            .unwrap()
    }

    #[test]
    fn test_basic_scan() {
        let temp = create_test_tree();
        let tree = scan(&ScanConfig::new(temp.path()));

        assert_eq!(tree.total_files(), 5);
        assert_eq!(tree.total_folders(), 3);
        assert!(tree.contains("src/nested/c.py"));
        assert_eq!(tree.get("src/a.py").unwrap().size, 10);
        assert!(!tree.has_warnings());
    }

    #[test]
    fn test_children_sorted_folders_first() {
        let temp = create_test_tree();
        let tree = scan(&ScanConfig::new(temp.path()));

        let order: Vec<_> = tree.paths().collect();
        assert_eq!(
            order,
            vec![
                "",
                "docs",
                "docs/guide.md",
                "src",
                "src/nested",
                "src/nested/c.py",
                "src/a.py",
                "src/b.py",
                "README.md",
            ]
        );
    }

    #[test]
    fn test_ignore_patterns_prune_subtree() {
        let temp = create_test_tree();
        let config = ScanConfig::builder()
            .root(temp.path())
            .ignore_patterns(vec!["nested/".to_string(), "*.md".to_string()])
            .build()
            .unwrap();
        let tree = scan(&config);

        assert!(!tree.contains("src/nested"));
        assert!(!tree.contains("src/nested/c.py"));
        assert!(!tree.contains("README.md"));
        // The folder stays even though every file inside was filtered.
        assert!(tree.contains("docs"));
        assert_eq!(tree.total_files(), 2);
    }

    #[test]
    fn test_missing_root_fails() {
        let temp = TempDir::new().unwrap();
        let config = ScanConfig::new(temp.path().join("nope"));
        let result = TreeScanner::new().scan(&config, &CancellationToken::new());
        assert!(matches!(result, Err(ScanError::NotFound { .. })));
    }

    #[test]
    fn test_file_root_fails() {
        let temp = create_test_tree();
        let config = ScanConfig::new(temp.path().join("README.md"));
        let result = TreeScanner::new().scan(&config, &CancellationToken::new());
        assert!(matches!(result, Err(ScanError::NotADirectory { .. })));
    }

    #[test]
    fn test_cancelled_scan_returns_interrupted() {
        let temp = create_test_tree();
        let cancel = CancellationToken::new();
        cancel.cancel();
        let result = TreeScanner::new().scan(&ScanConfig::new(temp.path()), &cancel);
        assert!(matches!(result, Err(ScanError::Interrupted)));
    }

    #[test]
    fn test_max_depth() {
        let temp = create_test_tree();
        let mut config = ScanConfig::new(temp.path());
        config.max_depth = Some(1);
        let tree = scan(&config);

        assert!(tree.contains("src"));
        assert!(!tree.contains("src/a.py"));
    }
}
