//! The user's explicit exclusions for one workspace.

use std::collections::BTreeSet;

use compact_str::CompactString;
use serde::{Deserialize, Serialize};

use promptpack_core::{ProjectTree, path};

/// Relative paths the user explicitly excluded.
///
/// Membership is independent of any tree: entries for paths that no longer
/// exist are kept and take effect again if the path reappears. Serializes as
/// a sorted sequence of strings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<CompactString>", into = "Vec<CompactString>")]
pub struct ExclusionSet {
    paths: BTreeSet<CompactString>,
}

impl ExclusionSet {
    /// Create an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a path if absent, remove it if present. Returns the new membership.
    pub fn toggle(&mut self, raw: &str) -> bool {
        let path = path::normalize(raw);
        if self.paths.remove(&path) {
            false
        } else {
            self.paths.insert(path);
            true
        }
    }

    /// Add a path. Returns `false` if it was already listed.
    pub fn insert(&mut self, raw: &str) -> bool {
        self.paths.insert(path::normalize(raw))
    }

    /// Remove a path. Returns `false` if it was not listed.
    pub fn remove(&mut self, raw: &str) -> bool {
        self.paths.remove(path::normalize(raw).as_str())
    }

    /// Check whether a path is listed. The input is normalized first.
    pub fn contains(&self, raw: &str) -> bool {
        self.paths.contains(path::normalize(raw).as_str())
    }

    /// Check an already normalized path.
    pub(crate) fn contains_normalized(&self, path: &str) -> bool {
        self.paths.contains(path)
    }

    /// Listed paths in sorted order.
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.paths.iter().map(CompactString::as_str)
    }

    /// Number of listed paths, dormant ones included.
    pub fn len(&self) -> usize {
        self.paths.len()
    }

    /// Check if nothing is excluded.
    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    /// Remove every entry.
    pub fn clear(&mut self) {
        self.paths.clear();
    }

    /// Entries that name no node in `tree`.
    pub fn dormant<'a>(&'a self, tree: &'a ProjectTree) -> impl Iterator<Item = &'a str> {
        self.iter().filter(move |p| !tree.contains(p))
    }

    /// Entries that name a node in `tree`.
    pub fn active<'a>(&'a self, tree: &'a ProjectTree) -> impl Iterator<Item = &'a str> {
        self.iter().filter(move |p| tree.contains(p))
    }
}

impl From<Vec<CompactString>> for ExclusionSet {
    fn from(paths: Vec<CompactString>) -> Self {
        paths.iter().map(CompactString::as_str).collect()
    }
}

impl From<ExclusionSet> for Vec<CompactString> {
    fn from(set: ExclusionSet) -> Self {
        set.paths.into_iter().collect()
    }
}

impl<S: AsRef<str>> FromIterator<S> for ExclusionSet {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        let mut set = Self::new();
        for raw in iter {
            set.insert(raw.as_ref());
        }
        set
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_toggle_returns_membership() {
        let mut set = ExclusionSet::new();
        assert!(set.toggle("src"));
        assert!(set.contains("src"));
        assert!(!set.toggle("src"));
        assert!(set.is_empty());
    }

    #[test]
    fn test_paths_are_normalized() {
        let mut set = ExclusionSet::new();
        set.insert("./src\\nested/");
        assert!(set.contains("src/nested"));
        assert!(set.contains("/src/nested"));
        assert_eq!(set.iter().collect::<Vec<_>>(), vec!["src/nested"]);
    }

    #[test]
    fn test_serializes_as_sorted_sequence() {
        let set: ExclusionSet = ["tests", "build", "src/a.py"].into_iter().collect();
        let json = serde_json::to_string(&set).unwrap();
        assert_eq!(json, r#"["build","src/a.py","tests"]"#);

        let back: ExclusionSet = serde_json::from_str(r#"["./docs/", "docs"]"#).unwrap();
        assert_eq!(back.len(), 1);
        assert!(back.contains("docs"));
    }

    #[test]
    fn test_dormant_entries() {
        let tree = ProjectTree::from_paths("/p", &["src/a.py"]);
        let set: ExclusionSet = ["src/a.py", "gone"].into_iter().collect();
        assert_eq!(set.dormant(&tree).collect::<Vec<_>>(), vec!["gone"]);
        assert_eq!(set.active(&tree).collect::<Vec<_>>(), vec!["src/a.py"]);
    }
}
