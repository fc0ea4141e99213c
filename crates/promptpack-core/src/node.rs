//! Snapshot node types.

use std::time::SystemTime;

use compact_str::CompactString;
use serde::{Deserialize, Serialize};

/// Type of a tree entry.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, strum::Display,
)]
#[strum(serialize_all = "lowercase")]
pub enum NodeKind {
    /// Regular file (or a symlink resolving to one).
    File,
    /// Directory.
    Folder,
}

impl NodeKind {
    /// Check if this is a folder.
    pub fn is_folder(self) -> bool {
        matches!(self, NodeKind::Folder)
    }

    /// Check if this is a file.
    pub fn is_file(self) -> bool {
        matches!(self, NodeKind::File)
    }
}

/// Cheap change detector for a filesystem entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fingerprint {
    /// Size in bytes (0 for folders).
    pub size: u64,
    /// Last modification time, if the platform reported one.
    pub modified: Option<SystemTime>,
}

impl Fingerprint {
    /// Create a new fingerprint.
    pub fn new(size: u64, modified: Option<SystemTime>) -> Self {
        Self { size, modified }
    }
}

/// A single file or folder in a snapshot.
///
/// Nodes are owned by a [`ProjectTree`](crate::ProjectTree) and addressed by
/// their relative path; children are stored as paths, not pointers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    /// Root-relative path, `/` separated. Empty for the root.
    pub path: CompactString,

    /// Entry name (last path segment).
    pub name: CompactString,

    /// File or folder.
    pub kind: NodeKind,

    /// Size in bytes (aggregate of descendant files for folders).
    pub size: u64,

    /// Last modification time.
    pub modified: Option<SystemTime>,

    /// Child paths, folders first then by name (folders only).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<CompactString>,
}

impl Node {
    /// Create a new file node.
    pub fn new_file(
        path: impl Into<CompactString>,
        size: u64,
        modified: Option<SystemTime>,
    ) -> Self {
        let path = path.into();
        Self {
            name: crate::path::file_name(&path).into(),
            path,
            kind: NodeKind::File,
            size,
            modified,
            children: Vec::new(),
        }
    }

    /// Create a new, empty folder node.
    pub fn new_folder(path: impl Into<CompactString>, modified: Option<SystemTime>) -> Self {
        let path = path.into();
        Self {
            name: crate::path::file_name(&path).into(),
            path,
            kind: NodeKind::Folder,
            size: 0,
            modified,
            children: Vec::new(),
        }
    }

    /// Check if this node is a folder.
    pub fn is_folder(&self) -> bool {
        self.kind.is_folder()
    }

    /// Check if this node is a file.
    pub fn is_file(&self) -> bool {
        self.kind.is_file()
    }

    /// Check if this node is the tree root.
    pub fn is_root(&self) -> bool {
        self.path.is_empty()
    }

    /// Fingerprint of this node as recorded at scan time.
    pub fn fingerprint(&self) -> Fingerprint {
        match self.kind {
            NodeKind::File => Fingerprint::new(self.size, self.modified),
            NodeKind::Folder => Fingerprint::new(0, self.modified),
        }
    }
}
