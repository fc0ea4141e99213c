//! Cheap change detection against a cached snapshot.
//!
//! Instead of walking the tree again, the probe stats the entries recorded in
//! a snapshot. Adding, removing or renaming an entry bumps the parent folder's
//! mtime, so checking folders alone is enough to detect structural drift.
//! Checking files as well also catches in-place edits.

use std::fs;
use std::time::SystemTime;

use compact_str::CompactString;
use rayon::prelude::*;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use promptpack_core::{Node, ProjectTree, ScanError};

/// Result of comparing a snapshot with the live filesystem.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeOutcome {
    /// Every probed entry still has its recorded fingerprint.
    Unchanged,
    /// At least one entry differs; carries the first difference found.
    Changed {
        /// Relative path of the entry that changed.
        path: CompactString,
    },
}

impl ProbeOutcome {
    /// Check if nothing changed.
    pub fn is_unchanged(&self) -> bool {
        matches!(self, ProbeOutcome::Unchanged)
    }
}

/// Compare the snapshot's folder mtimes (and optionally file sizes and
/// mtimes) against the filesystem.
pub fn probe(
    tree: &ProjectTree,
    verify_files: bool,
    cancel: &CancellationToken,
) -> Result<ProbeOutcome, ScanError> {
    let candidates: Vec<&Node> = tree
        .iter()
        .filter(|node| verify_files || node.is_folder())
        .collect();

    let changed = candidates.par_iter().find_map_any(|node| {
        if cancel.is_cancelled() {
            return Some(None);
        }
        (!still_matches(tree, node)).then(|| Some(node.path.clone()))
    });

    match changed {
        Some(None) => Err(ScanError::Interrupted),
        Some(Some(path)) => {
            debug!(path = %path, "probe found a changed entry");
            Ok(ProbeOutcome::Changed { path })
        }
        None => Ok(ProbeOutcome::Unchanged),
    }
}

fn still_matches(tree: &ProjectTree, node: &Node) -> bool {
    let Ok(metadata) = fs::metadata(tree.absolute_path(&node.path)) else {
        return false;
    };
    let modified = metadata.modified().ok();

    if node.is_folder() {
        metadata.is_dir() && same_time(node.modified, modified)
    } else {
        metadata.is_file() && metadata.len() == node.size && same_time(node.modified, modified)
    }
}

/// Unknown times never count as unchanged.
fn same_time(recorded: Option<SystemTime>, current: Option<SystemTime>) -> bool {
    matches!((recorded, current), (Some(a), Some(b)) if a == b)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::TreeScanner;
    use promptpack_core::ScanConfig;
    use tempfile::TempDir;

    fn scanned(temp: &TempDir) -> ProjectTree {
        TreeScanner::new()
            .scan(&ScanConfig::new(temp.path()), &CancellationToken::new())
            .unwrap()
    }

    #[test]
    fn test_unchanged_tree() {
        let temp = TempDir::new().unwrap();
        fs::create_dir(temp.path().join("src")).unwrap();
        fs::write(temp.path().join("src/a.py"), "a").unwrap();
        let tree = scanned(&temp);

        let outcome = probe(&tree, true, &CancellationToken::new()).unwrap();
        assert!(outcome.is_unchanged());
    }

    #[test]
    fn test_removed_folder_is_detected() {
        let temp = TempDir::new().unwrap();
        fs::create_dir(temp.path().join("src")).unwrap();
        let tree = scanned(&temp);

        fs::remove_dir(temp.path().join("src")).unwrap();
        let outcome = probe(&tree, false, &CancellationToken::new()).unwrap();
        assert!(!outcome.is_unchanged());
    }

    #[test]
    fn test_unknown_mtime_counts_as_changed() {
        let tree = ProjectTree::from_paths("/nonexistent/root", &["src/"]);
        let outcome = probe(&tree, false, &CancellationToken::new()).unwrap();
        assert!(!outcome.is_unchanged());
    }

    #[test]
    fn test_cancelled_probe() {
        let temp = TempDir::new().unwrap();
        let tree = scanned(&temp);
        let cancel = CancellationToken::new();
        cancel.cancel();
        assert!(matches!(
            probe(&tree, false, &cancel),
            Err(ScanError::Interrupted)
        ));
    }
}
