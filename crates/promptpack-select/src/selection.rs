//! Cascading inclusion over a snapshot tree.
//!
//! A node is included iff it is not listed in the [`ExclusionSet`] and its
//! parent folder is included. The root is always included. Exclusion flows
//! down to every descendant; inclusion never flows up.

use std::collections::HashMap;

use compact_str::CompactString;
use serde::{Deserialize, Serialize};
use tracing::debug;

use promptpack_core::{Node, ProjectTree, path};

use crate::exclusion::ExclusionSet;

/// Why a node is or is not part of the selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, strum::Display)]
#[strum(serialize_all = "kebab-case")]
pub enum Inclusion {
    /// Included.
    Included,
    /// Listed in the exclusion set.
    Excluded,
    /// Not listed, but below an excluded folder.
    ExcludedByAncestor,
}

impl Inclusion {
    /// Check if the node ends up in the selection.
    pub fn is_included(self) -> bool {
        matches!(self, Inclusion::Included)
    }
}

/// Status bar totals for one effective state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectionCounts {
    /// Folders not included, root excluded from the count.
    pub excluded_folders: u64,
    /// Files not included.
    pub excluded_files: u64,
    /// Files included.
    pub included_files: u64,
    /// Total size of included files in bytes.
    pub included_bytes: u64,
}

/// Effective inclusion of every node in one tree.
///
/// Derived from a tree and an exclusion set; never persisted.
#[derive(Debug, Clone, Default)]
pub struct EffectiveState {
    states: HashMap<CompactString, Inclusion>,
    counts: SelectionCounts,
}

impl EffectiveState {
    /// Inclusion of a node, `None` if the path is not in the tree.
    pub fn get(&self, path: &str) -> Option<Inclusion> {
        self.states.get(path).copied()
    }

    /// Check whether a node is effectively included. Unknown paths are not.
    pub fn is_included(&self, path: &str) -> bool {
        self.get(path).is_some_and(Inclusion::is_included)
    }

    /// Totals for the status bar.
    pub fn counts(&self) -> SelectionCounts {
        self.counts
    }

    /// Number of nodes covered.
    pub fn len(&self) -> usize {
        self.states.len()
    }

    /// Check if no node is covered.
    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }
}

/// Result of toggling one path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "kebab-case")]
pub enum ToggleOutcome {
    /// The path was added to the exclusion set.
    Excluded,
    /// The path was removed from the set and is included again.
    Included,
    /// The path was removed from the set, but an excluded ancestor still
    /// keeps it out.
    Unlisted { blocked_by: CompactString },
    /// Nothing changed: the path is already excluded through an ancestor.
    Blocked { ancestor: CompactString },
    /// Nothing changed: the path is not in the tree.
    NotFound,
    /// Nothing changed: the root cannot be toggled.
    Root,
}

impl ToggleOutcome {
    /// Check if the exclusion set was modified.
    pub fn changed(&self) -> bool {
        matches!(
            self,
            ToggleOutcome::Excluded | ToggleOutcome::Included | ToggleOutcome::Unlisted { .. }
        )
    }
}

/// Fold the exclusion set over the tree in one top-down pass.
pub fn compute_effective(tree: &ProjectTree, exclusions: &ExclusionSet) -> EffectiveState {
    let mut states: HashMap<CompactString, Inclusion> = HashMap::with_capacity(tree.len());
    let mut counts = SelectionCounts::default();

    for node in tree.iter() {
        let state = match path::parent(&node.path) {
            None => Inclusion::Included,
            Some(parent) => {
                let parent_included = states.get(parent).is_some_and(|s| s.is_included());
                if !parent_included {
                    Inclusion::ExcludedByAncestor
                } else if exclusions.contains_normalized(&node.path) {
                    Inclusion::Excluded
                } else {
                    Inclusion::Included
                }
            }
        };
        tally(&mut counts, node, state);
        states.insert(node.path.clone(), state);
    }

    EffectiveState { states, counts }
}

fn tally(counts: &mut SelectionCounts, node: &Node, state: Inclusion) {
    match (node.is_file(), state.is_included()) {
        (true, true) => {
            counts.included_files += 1;
            counts.included_bytes += node.size;
        }
        (true, false) => counts.excluded_files += 1,
        (false, false) => counts.excluded_folders += 1,
        (false, true) => {}
    }
}

/// Nearest proper ancestor of `path` that is listed in the exclusion set.
pub fn excluded_ancestor<'a>(path: &'a str, exclusions: &ExclusionSet) -> Option<&'a str> {
    path::ancestors(path)
        .filter(|a| !a.is_empty())
        .find(|a| exclusions.contains_normalized(a))
}

/// Flip the user's intent for one path.
///
/// A path below an excluded folder cannot be re-included on its own: it
/// reports [`ToggleOutcome::Blocked`] and leaves the set alone.
pub fn toggle(raw: &str, tree: &ProjectTree, exclusions: &mut ExclusionSet) -> ToggleOutcome {
    let target = path::normalize(raw);
    if target.is_empty() {
        return ToggleOutcome::Root;
    }
    if !tree.contains(&target) {
        debug!(path = %target, "toggle on a path outside the tree");
        return ToggleOutcome::NotFound;
    }

    let ancestor = excluded_ancestor(&target, exclusions).map(CompactString::from);

    if exclusions.contains_normalized(&target) {
        exclusions.remove(&target);
        return match ancestor {
            Some(blocked_by) => ToggleOutcome::Unlisted { blocked_by },
            None => ToggleOutcome::Included,
        };
    }

    match ancestor {
        Some(ancestor) => ToggleOutcome::Blocked { ancestor },
        None => {
            exclusions.insert(&target);
            ToggleOutcome::Excluded
        }
    }
}

/// The exclusion set for "select all" (`true`) or "select none" (`false`).
///
/// Selecting none lists exactly the root's direct children; the cascade
/// covers everything below them.
pub fn bulk_set(tree: &ProjectTree, included: bool) -> ExclusionSet {
    if included {
        return ExclusionSet::new();
    }
    tree.children(path::ROOT).map(|n| n.path.as_str()).collect()
}
