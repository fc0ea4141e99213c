//! On-disk snapshot cache and reconciliation against the live filesystem.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use compact_str::CompactString;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use promptpack_core::{FilterSignature, Fingerprint, ProjectTree, ScanConfig};
use promptpack_scan::{ProbeOutcome, ScanError, TreeScanner, canonical_root, probe};

use crate::error::StoreError;
use crate::persist::atomic_write;

/// Bumped whenever the snapshot layout changes; older files are ignored.
pub const CACHE_FORMAT_VERSION: u32 = 2;

/// Hex digits of the root hash used in cache file names.
const KEY_LEN: usize = 16;

/// A scanned tree together with what it was scanned with.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CachedSnapshot {
    pub format_version: u32,
    pub root_path: PathBuf,
    pub filters: FilterSignature,
    pub last_scanned_at: DateTime<Utc>,
    pub fingerprints: BTreeMap<CompactString, Fingerprint>,
    pub tree: Arc<ProjectTree>,
}

impl CachedSnapshot {
    /// Capture a freshly scanned tree.
    pub fn new(tree: Arc<ProjectTree>, filters: FilterSignature) -> Self {
        Self {
            format_version: CACHE_FORMAT_VERSION,
            root_path: tree.root_path.clone(),
            filters,
            last_scanned_at: DateTime::<Utc>::from(tree.scanned_at),
            fingerprints: tree.fingerprints(),
            tree,
        }
    }

    /// Check whether this snapshot can stand in for a scan of `root` with
    /// `filters`.
    pub fn is_reusable_for(&self, root: &Path, filters: &FilterSignature) -> bool {
        self.format_version == CACHE_FORMAT_VERSION
            && self.root_path == root
            && self.tree.root_path == root
            && self.filters == *filters
    }
}

/// Controls for [`reconcile`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheOptions {
    /// Always walk, even if the snapshot looks current.
    pub force: bool,
    /// Also stat every file when probing, not just folders.
    pub verify_files: bool,
}

impl CacheOptions {
    /// Options for an explicit reload.
    pub fn forced() -> Self {
        Self {
            force: true,
            ..Self::default()
        }
    }
}

/// Difference between two snapshots of the same root.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeSummary {
    /// Paths only in the new tree, in its order.
    pub added: Vec<CompactString>,
    /// Paths only in the old tree, in its order.
    pub removed: Vec<CompactString>,
    /// Paths in both whose kind changed, or files whose size or mtime did.
    pub modified: Vec<CompactString>,
}

impl ChangeSummary {
    /// Check if nothing changed.
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty() && self.modified.is_empty()
    }

    /// Total number of changed paths.
    pub fn len(&self) -> usize {
        self.added.len() + self.removed.len() + self.modified.len()
    }
}

/// Compare two snapshots by path.
pub fn diff(old: &ProjectTree, new: &ProjectTree) -> ChangeSummary {
    let added = new
        .iter()
        .filter(|n| !old.contains(&n.path))
        .map(|n| n.path.clone())
        .collect();
    let removed = old
        .iter()
        .filter(|n| !new.contains(&n.path))
        .map(|n| n.path.clone())
        .collect();
    let modified = new
        .iter()
        .filter(|n| {
            old.get(&n.path).is_some_and(|before| {
                before.kind != n.kind || (n.is_file() && before.fingerprint() != n.fingerprint())
            })
        })
        .map(|n| n.path.clone())
        .collect();

    ChangeSummary {
        added,
        removed,
        modified,
    }
}

/// Outcome of [`reconcile`].
#[derive(Debug, Clone)]
pub struct Reconciled {
    /// The tree to use from now on.
    pub tree: Arc<ProjectTree>,
    /// What changed relative to the cached tree.
    pub changes: ChangeSummary,
    /// True if the cached tree was reused without walking.
    pub fast_path: bool,
}

/// Produce a current tree for `config.root`, reusing `cached` when the
/// filesystem shows no sign of change.
///
/// With no usable snapshot to compare against, the change summary is empty.
pub fn reconcile(
    cached: Option<&CachedSnapshot>,
    config: &ScanConfig,
    scanner: &TreeScanner,
    options: CacheOptions,
    cancel: &CancellationToken,
) -> Result<Reconciled, ScanError> {
    let mut config = config.clone();
    config.root = canonical_root(&config.root)?;
    let filters = config.filter_signature();

    let reusable = cached.filter(|s| s.is_reusable_for(&config.root, &filters));
    if let Some(snapshot) = reusable.filter(|_| !options.force) {
        match probe(&snapshot.tree, options.verify_files, cancel)? {
            ProbeOutcome::Unchanged => {
                info!(root = %config.root.display(), "cached tree is current");
                return Ok(Reconciled {
                    tree: Arc::clone(&snapshot.tree),
                    changes: ChangeSummary::default(),
                    fast_path: true,
                });
            }
            ProbeOutcome::Changed { path } => {
                debug!(root = %config.root.display(), changed = %path, "cached tree is stale");
            }
        }
    }

    let tree = scanner.scan(&config, cancel)?;
    let changes = cached
        .filter(|s| s.root_path == config.root)
        .map(|s| diff(&s.tree, &tree))
        .unwrap_or_default();

    Ok(Reconciled {
        tree: Arc::new(tree),
        changes,
        fast_path: false,
    })
}

/// Directory of per-workspace snapshot files.
#[derive(Debug, Clone)]
pub struct ProjectCache {
    dir: Option<PathBuf>,
}

impl ProjectCache {
    /// Cache files under `dir`.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: Some(dir.into()),
        }
    }

    /// A cache that never stores anything.
    pub fn disabled() -> Self {
        Self { dir: None }
    }

    /// Default location: `<cache dir>/promptpack`.
    pub fn default_dir() -> PathBuf {
        dirs::cache_dir()
            .unwrap_or_else(std::env::temp_dir)
            .join("promptpack")
    }

    /// Cache file for a root: `index_<16 hex of blake3(root)>.json`.
    pub fn file_for(&self, root: &Path) -> Option<PathBuf> {
        let dir = self.dir.as_ref()?;
        let hash = blake3::hash(root.to_string_lossy().as_bytes()).to_hex();
        Some(dir.join(format!("index_{}.json", &hash[..KEY_LEN])))
    }

    /// Read the snapshot for a root. Missing, corrupt or foreign files are
    /// all treated as absent.
    pub fn load(&self, root: &Path) -> Option<CachedSnapshot> {
        let file = self.file_for(root)?;
        let bytes = match fs::read(&file) {
            Ok(bytes) => bytes,
            Err(err) => {
                debug!(path = %file.display(), error = %err, "no cached snapshot");
                return None;
            }
        };
        match serde_json::from_slice::<CachedSnapshot>(&bytes) {
            Ok(snapshot)
                if snapshot.format_version == CACHE_FORMAT_VERSION
                    && snapshot.root_path == root =>
            {
                Some(snapshot)
            }
            Ok(_) => {
                debug!(path = %file.display(), "cached snapshot belongs elsewhere, ignoring");
                None
            }
            Err(err) => {
                warn!(path = %file.display(), error = %err, "cached snapshot is corrupt, ignoring");
                None
            }
        }
    }

    /// Write a snapshot atomically.
    pub fn save(&self, snapshot: &CachedSnapshot) -> Result<(), StoreError> {
        let Some(file) = self.file_for(&snapshot.root_path) else {
            return Ok(());
        };
        let bytes = serde_json::to_vec(snapshot)?;
        atomic_write(&file, &bytes)
    }

    /// Delete the snapshot for a root, if any.
    pub fn remove(&self, root: &Path) -> Result<(), StoreError> {
        let Some(file) = self.file_for(root) else {
            return Ok(());
        };
        match fs::remove_file(&file) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(StoreError::io(file, err)),
        }
    }
}
