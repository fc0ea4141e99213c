//! Open workspaces and the operations on them.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use promptpack_core::{FilterSignature, ProjectTree, TreeStats};
use promptpack_scan::{TreeScanner, canonical_root};
use promptpack_select::{
    AssembleOptions, Assembler, Assembly, EffectiveState, ExclusionSet, SelectionCounts,
    ToggleOutcome,
};

use crate::cache::{CacheOptions, CachedSnapshot, ChangeSummary, ProjectCache, Reconciled, reconcile};
use crate::error::WorkspaceError;
use crate::record::WorkspaceRecord;
use crate::store::{ExclusionStore, MemoryStore, lock};

/// What an open or rescan did.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanReport {
    /// Canonical workspace root.
    pub root_path: PathBuf,
    /// Difference to the previous tree.
    pub changes: ChangeSummary,
    /// True if the cached tree was reused without walking.
    pub fast_path: bool,
    /// Totals of the current tree.
    pub stats: TreeStats,
    /// Entries that could not be read during the walk.
    pub warnings: usize,
    /// Exclusion entries naming paths not in the tree.
    pub dormant: usize,
}

impl ScanReport {
    fn new(record: &WorkspaceRecord, reconciled: Reconciled) -> Self {
        Self {
            root_path: record.root_path().to_path_buf(),
            changes: reconciled.changes,
            fast_path: reconciled.fast_path,
            stats: record.tree().stats.clone(),
            warnings: record.tree().warnings.len(),
            dormant: record.dormant_count(),
        }
    }
}

struct WorkspaceHandle {
    record: Mutex<WorkspaceRecord>,
    scanning: AtomicBool,
    cancel: Mutex<CancellationToken>,
}

impl WorkspaceHandle {
    fn new(record: WorkspaceRecord) -> Self {
        Self {
            record: Mutex::new(record),
            scanning: AtomicBool::new(false),
            cancel: Mutex::new(CancellationToken::new()),
        }
    }

    /// Claim the scan slot of this workspace.
    fn begin_scan(&self, root: &Path) -> Result<ScanGuard<'_>, WorkspaceError> {
        if self
            .scanning
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(WorkspaceError::ScanInProgress {
                root: root.to_path_buf(),
            });
        }
        let token = CancellationToken::new();
        *lock(&self.cancel) = token.clone();
        Ok(ScanGuard {
            flag: &self.scanning,
            token,
        })
    }
}

struct ScanGuard<'a> {
    flag: &'a AtomicBool,
    token: CancellationToken,
}

impl Drop for ScanGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

/// Marks a root as being opened until dropped.
struct OpeningGuard<'a> {
    opening: &'a Mutex<HashMap<PathBuf, CancellationToken>>,
    root: PathBuf,
}

impl Drop for OpeningGuard<'_> {
    fn drop(&mut self) {
        lock(self.opening).remove(&self.root);
    }
}

/// The set of workspaces one user has open.
///
/// Each workspace is guarded separately: operations on different roots never
/// wait for each other, and scans of different roots run in parallel.
pub struct Session {
    store: Arc<dyn ExclusionStore>,
    cache: ProjectCache,
    workspaces: RwLock<HashMap<PathBuf, Arc<WorkspaceHandle>>>,
    opening: Mutex<HashMap<PathBuf, CancellationToken>>,
}

impl Session {
    /// Create a session persisting through `store` and `cache`.
    pub fn new(store: Arc<dyn ExclusionStore>, cache: ProjectCache) -> Self {
        Self {
            store,
            cache,
            workspaces: RwLock::new(HashMap::new()),
            opening: Mutex::new(HashMap::new()),
        }
    }

    /// A session that keeps everything in memory.
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryStore::new()), ProjectCache::disabled())
    }

    /// The exclusion store in use.
    pub fn store(&self) -> &Arc<dyn ExclusionStore> {
        &self.store
    }

    /// Open a workspace, reusing its cached tree when it is still current.
    ///
    /// Opening a root that is already open reconciles it again.
    pub fn open_workspace(
        &self,
        root: &Path,
        options: CacheOptions,
    ) -> Result<ScanReport, WorkspaceError> {
        self.open_with(root, options, &TreeScanner::new())
    }

    /// [`open_workspace`](Self::open_workspace) with a caller-provided scanner,
    /// e.g. one whose progress is being watched.
    pub fn open_with(
        &self,
        root: &Path,
        options: CacheOptions,
        scanner: &TreeScanner,
    ) -> Result<ScanReport, WorkspaceError> {
        let root = canonical_root(root)?;

        let token = {
            let mut opening = lock(&self.opening);
            if self.read().contains_key(&root) {
                None
            } else if opening.contains_key(&root) {
                return Err(WorkspaceError::ScanInProgress { root });
            } else {
                let token = CancellationToken::new();
                opening.insert(root.clone(), token.clone());
                Some(token)
            }
        };
        let Some(token) = token else {
            return self.rescan_with(&root, options, scanner);
        };
        let _opening = OpeningGuard {
            opening: &self.opening,
            root: root.clone(),
        };

        let cached = self.cache.load(&root);
        let config = self.store.scan_config(&root);
        let reconciled = reconcile(cached.as_ref(), &config, scanner, options, &token)?;
        let snapshot = self.snapshot_for(&reconciled, cached, config.filter_signature());

        let record = WorkspaceRecord::new(snapshot, self.store.load(&root));
        let report = ScanReport::new(&record, reconciled);
        self.write()
            .insert(root.clone(), Arc::new(WorkspaceHandle::new(record)));

        if let Err(err) = self.store.opened(&root) {
            warn!(root = %root.display(), error = %err, "failed to record opened workspace");
        }
        debug!(root = %root.display(), fast_path = report.fast_path, "workspace opened");
        Ok(report)
    }

    /// Reconcile an open workspace with the filesystem.
    pub fn rescan(&self, root: &Path, options: CacheOptions) -> Result<ScanReport, WorkspaceError> {
        self.rescan_with(root, options, &TreeScanner::new())
    }

    /// [`rescan`](Self::rescan) with a caller-provided scanner.
    ///
    /// The walk runs without holding the workspace lock. A failed or
    /// cancelled scan leaves the previous tree in place.
    pub fn rescan_with(
        &self,
        root: &Path,
        options: CacheOptions,
        scanner: &TreeScanner,
    ) -> Result<ScanReport, WorkspaceError> {
        let (root, handle) = self.handle(root)?;
        let scan = handle.begin_scan(&root)?;

        let previous = lock(&handle.record).snapshot();
        let config = self.store.scan_config(&root);
        let reconciled = reconcile(Some(&previous), &config, scanner, options, &scan.token)?;

        let mut record = lock(&handle.record);
        if !reconciled.fast_path {
            let snapshot = self.snapshot_for(&reconciled, None, config.filter_signature());
            record.replace(snapshot);
        }
        debug!(
            root = %root.display(),
            changes = reconciled.changes.len(),
            fast_path = reconciled.fast_path,
            "workspace rescanned"
        );
        Ok(ScanReport::new(&record, reconciled))
    }

    /// Cancel a running scan of `root`. Returns `false` if none was running.
    pub fn cancel_scan(&self, root: &Path) -> bool {
        let root = lookup_key(root);
        if let Some(token) = lock(&self.opening).get(&root) {
            token.cancel();
            return true;
        }
        match self.read().get(&root) {
            Some(handle) if handle.scanning.load(Ordering::Acquire) => {
                lock(&handle.cancel).cancel();
                true
            }
            _ => false,
        }
    }

    /// Check whether a scan of `root` is running.
    pub fn is_scanning(&self, root: &Path) -> bool {
        let root = lookup_key(root);
        lock(&self.opening).contains_key(&root)
            || self
                .read()
                .get(&root)
                .is_some_and(|h| h.scanning.load(Ordering::Acquire))
    }

    /// Toggle one path and persist the result.
    pub fn toggle(&self, root: &Path, path: &str) -> Result<ToggleOutcome, WorkspaceError> {
        let (root, handle) = self.handle(root)?;
        let mut record = lock(&handle.record);
        let tree = Arc::clone(record.tree());
        let before = record.exclusions.clone();

        let outcome = promptpack_select::toggle(path, &tree, &mut record.exclusions);
        if outcome.changed() {
            if let Err(err) = self.store.save(&root, &record.exclusions) {
                record.exclusions = before;
                return Err(err.into());
            }
        }
        debug!(root = %root.display(), path, ?outcome, "toggled");
        Ok(outcome)
    }

    /// Include everything (`true`) or nothing (`false`) and persist.
    pub fn bulk_set(&self, root: &Path, included: bool) -> Result<SelectionCounts, WorkspaceError> {
        let (root, handle) = self.handle(root)?;
        let mut record = lock(&handle.record);
        let next = promptpack_select::bulk_set(record.tree(), included);
        self.store.save(&root, &next)?;
        record.exclusions = next;
        Ok(record.effective().counts())
    }

    /// Effective inclusion of every node.
    pub fn effective(&self, root: &Path) -> Result<EffectiveState, WorkspaceError> {
        self.with_record(root, WorkspaceRecord::effective)
    }

    /// Status bar totals.
    pub fn counts(&self, root: &Path) -> Result<SelectionCounts, WorkspaceError> {
        self.with_record(root, |record| record.effective().counts())
    }

    /// Files to emit for the whole tree or, with `folder`, one subtree.
    pub fn assemble(
        &self,
        root: &Path,
        options: AssembleOptions,
        folder: Option<&str>,
    ) -> Result<Assembly, WorkspaceError> {
        let (tree, effective) =
            self.with_record(root, |record| (Arc::clone(record.tree()), record.effective()))?;
        let assembler = Assembler::new(options);
        Ok(match folder {
            Some(folder) => assembler.assemble_folder(&tree, &effective, folder),
            None => assembler.assemble(&tree, &effective),
        })
    }

    /// Current tree of a workspace.
    pub fn tree(&self, root: &Path) -> Result<Arc<ProjectTree>, WorkspaceError> {
        self.with_record(root, |record| Arc::clone(record.tree()))
    }

    /// Current exclusions of a workspace.
    pub fn exclusions(&self, root: &Path) -> Result<ExclusionSet, WorkspaceError> {
        self.with_record(root, |record| record.exclusions.clone())
    }

    /// Copy of a workspace's record.
    pub fn record(&self, root: &Path) -> Result<WorkspaceRecord, WorkspaceError> {
        self.with_record(root, WorkspaceRecord::clone)
    }

    /// Close a workspace, cancelling any scan in flight.
    pub fn close_workspace(&self, root: &Path) -> Result<(), WorkspaceError> {
        let root = lookup_key(root);
        let handle = self
            .write()
            .remove(&root)
            .ok_or_else(|| WorkspaceError::NotOpen { root: root.clone() })?;
        lock(&handle.cancel).cancel();
        self.store.closed(&root)?;
        debug!(root = %root.display(), "workspace closed");
        Ok(())
    }

    /// Roots of all open workspaces, sorted.
    pub fn workspaces(&self) -> Vec<PathBuf> {
        let mut roots: Vec<PathBuf> = self.read().keys().cloned().collect();
        roots.sort();
        roots
    }

    fn snapshot_for(
        &self,
        reconciled: &Reconciled,
        cached: Option<CachedSnapshot>,
        filters: FilterSignature,
    ) -> CachedSnapshot {
        if let Some(cached) = cached.filter(|_| reconciled.fast_path) {
            return cached;
        }
        let snapshot = CachedSnapshot::new(Arc::clone(&reconciled.tree), filters);
        if let Err(err) = self.cache.save(&snapshot) {
            warn!(root = %snapshot.root_path.display(), error = %err, "failed to write cache");
        }
        snapshot
    }

    fn with_record<T>(
        &self,
        root: &Path,
        f: impl FnOnce(&WorkspaceRecord) -> T,
    ) -> Result<T, WorkspaceError> {
        let (_, handle) = self.handle(root)?;
        let record = lock(&handle.record);
        Ok(f(&record))
    }

    fn handle(&self, root: &Path) -> Result<(PathBuf, Arc<WorkspaceHandle>), WorkspaceError> {
        let root = lookup_key(root);
        match self.read().get(&root) {
            Some(handle) => Ok((root, Arc::clone(handle))),
            None => Err(WorkspaceError::NotOpen { root }),
        }
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, HashMap<PathBuf, Arc<WorkspaceHandle>>> {
        self.workspaces.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, HashMap<PathBuf, Arc<WorkspaceHandle>>> {
        self.workspaces.write().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Canonical form of a root when it still exists, the path as given otherwise.
fn lookup_key(root: &Path) -> PathBuf {
    root.canonicalize().unwrap_or_else(|_| root.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn project() -> (TempDir, PathBuf) {
        let temp = TempDir::new().unwrap();
        fs::create_dir(temp.path().join("src")).unwrap();
        fs::write(temp.path().join("src/a.py"), "a").unwrap();
        let root = temp.path().canonicalize().unwrap();
        (temp, root)
    }

    #[test]
    fn test_second_scan_of_same_root_is_rejected() {
        let (_temp, root) = project();
        let session = Session::in_memory();
        session.open_workspace(&root, CacheOptions::default()).unwrap();

        let (_, handle) = session.handle(&root).unwrap();
        let guard = handle.begin_scan(&root).unwrap();
        assert!(session.is_scanning(&root));

        let err = session.rescan(&root, CacheOptions::forced()).unwrap_err();
        assert!(matches!(err, WorkspaceError::ScanInProgress { .. }));

        drop(guard);
        assert!(!session.is_scanning(&root));
        assert!(session.rescan(&root, CacheOptions::forced()).is_ok());
    }

    #[test]
    fn test_cancel_reaches_running_scan() {
        let (_temp, root) = project();
        let session = Session::in_memory();
        session.open_workspace(&root, CacheOptions::default()).unwrap();

        let (_, handle) = session.handle(&root).unwrap();
        let guard = handle.begin_scan(&root).unwrap();
        assert!(session.cancel_scan(&root));
        assert!(guard.token.is_cancelled());
        drop(guard);

        assert!(!session.cancel_scan(&root));
    }
}
