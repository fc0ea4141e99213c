//! Live state of one open workspace.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use compact_str::CompactString;

use promptpack_core::{FilterSignature, Fingerprint, ProjectTree};
use promptpack_select::{EffectiveState, ExclusionSet, compute_effective};

use crate::cache::CachedSnapshot;

/// One workspace's tree, exclusions and scan metadata.
///
/// The tree is shared and never mutated; a rescan swaps in a new one.
#[derive(Debug, Clone)]
pub struct WorkspaceRecord {
    root_path: PathBuf,
    pub exclusions: ExclusionSet,
    tree: Arc<ProjectTree>,
    fingerprints: BTreeMap<CompactString, Fingerprint>,
    last_scanned_at: DateTime<Utc>,
    filters: FilterSignature,
}

impl WorkspaceRecord {
    /// Build a record from a snapshot and the persisted exclusions.
    pub fn new(snapshot: CachedSnapshot, exclusions: ExclusionSet) -> Self {
        Self {
            root_path: snapshot.root_path,
            exclusions,
            tree: snapshot.tree,
            fingerprints: snapshot.fingerprints,
            last_scanned_at: snapshot.last_scanned_at,
            filters: snapshot.filters,
        }
    }

    pub fn root_path(&self) -> &Path {
        &self.root_path
    }

    pub fn tree(&self) -> &Arc<ProjectTree> {
        &self.tree
    }

    pub fn fingerprints(&self) -> &BTreeMap<CompactString, Fingerprint> {
        &self.fingerprints
    }

    pub fn last_scanned_at(&self) -> DateTime<Utc> {
        self.last_scanned_at
    }

    pub fn filters(&self) -> &FilterSignature {
        &self.filters
    }

    /// Current state as a cacheable snapshot.
    pub fn snapshot(&self) -> CachedSnapshot {
        CachedSnapshot {
            format_version: crate::cache::CACHE_FORMAT_VERSION,
            root_path: self.root_path.clone(),
            filters: self.filters.clone(),
            last_scanned_at: self.last_scanned_at,
            fingerprints: self.fingerprints.clone(),
            tree: Arc::clone(&self.tree),
        }
    }

    /// Swap in a newly scanned tree. Exclusions are left as they are, so
    /// entries for vanished paths go dormant.
    pub fn replace(&mut self, snapshot: CachedSnapshot) {
        self.tree = snapshot.tree;
        self.fingerprints = snapshot.fingerprints;
        self.last_scanned_at = snapshot.last_scanned_at;
        self.filters = snapshot.filters;
    }

    /// Effective inclusion of every node.
    pub fn effective(&self) -> EffectiveState {
        compute_effective(&self.tree, &self.exclusions)
    }

    /// Number of exclusion entries that name no node in the current tree.
    pub fn dormant_count(&self) -> usize {
        self.exclusions.dormant(&self.tree).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_replace_keeps_exclusions() {
        let old = Arc::new(ProjectTree::from_paths("/p", &["src/a.py", "gen/x.py"]));
        let exclusions: ExclusionSet = ["gen"].into_iter().collect();
        let mut record = WorkspaceRecord::new(
            CachedSnapshot::new(old, FilterSignature::default()),
            exclusions.clone(),
        );
        assert_eq!(record.dormant_count(), 0);

        let new = Arc::new(ProjectTree::from_paths("/p", &["src/a.py"]));
        record.replace(CachedSnapshot::new(new, FilterSignature::default()));

        assert_eq!(record.exclusions, exclusions);
        assert_eq!(record.dormant_count(), 1);
        assert!(record.effective().is_included("src/a.py"));
        assert!(!record.fingerprints().contains_key("gen"));
    }
}
