//! Turning a selection into the ordered list of files to emit.
//!
//! Formatting the payload is left to the caller; this module only decides
//! which files go in and in what order.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use compact_str::CompactString;
use content_inspector::{ContentType, inspect};
use derive_builder::Builder;
use serde::{Deserialize, Serialize};
use tracing::debug;

use promptpack_core::{ProjectTree, path};

use crate::selection::EffectiveState;

/// Bytes inspected when deciding whether a file is binary.
const SNIFF_LEN: usize = 8192;

/// Files in tree order that are effectively included.
pub fn assemble(tree: &ProjectTree, effective: &EffectiveState) -> Vec<CompactString> {
    tree.files()
        .filter(|n| effective.is_included(&n.path))
        .map(|n| n.path.clone())
        .collect()
}

/// Like [`assemble`], restricted to the files at or below `folder`.
pub fn assemble_folder(
    tree: &ProjectTree,
    effective: &EffectiveState,
    folder: &str,
) -> Vec<CompactString> {
    let folder = path::normalize(folder);
    tree.subtree(&folder)
        .filter(|n| n.is_file() && effective.is_included(&n.path))
        .map(|n| n.path.clone())
        .collect()
}

/// Limits applied while assembling.
#[derive(Debug, Clone, Default, Builder, Serialize, Deserialize)]
#[builder(setter(into), default)]
pub struct AssembleOptions {
    /// Maximum number of files to emit (None = unlimited).
    pub max_files: Option<usize>,

    /// Leave out files whose leading bytes look binary.
    pub skip_binary: bool,
}

impl AssembleOptions {
    /// Create a new options builder.
    pub fn builder() -> AssembleOptionsBuilder {
        AssembleOptionsBuilder::default()
    }
}

/// Outcome of an assembly with options applied.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Assembly {
    /// Files to emit, in tree order.
    pub files: Vec<CompactString>,
    /// True if `max_files` cut the list short.
    pub truncated: bool,
    /// Included files left out because they look binary.
    pub skipped_binary: Vec<CompactString>,
}

/// Applies [`AssembleOptions`] on top of the plain selection.
#[derive(Debug, Clone, Default)]
pub struct Assembler {
    options: AssembleOptions,
}

impl Assembler {
    /// Create an assembler with the given options.
    pub fn new(options: AssembleOptions) -> Self {
        Self { options }
    }

    /// Assemble the whole tree.
    pub fn assemble(&self, tree: &ProjectTree, effective: &EffectiveState) -> Assembly {
        self.finish(tree, assemble(tree, effective))
    }

    /// Assemble one folder.
    pub fn assemble_folder(
        &self,
        tree: &ProjectTree,
        effective: &EffectiveState,
        folder: &str,
    ) -> Assembly {
        self.finish(tree, assemble_folder(tree, effective, folder))
    }

    fn finish(&self, tree: &ProjectTree, candidates: Vec<CompactString>) -> Assembly {
        let mut assembly = Assembly::default();
        let limit = self.options.max_files.unwrap_or(usize::MAX);

        for candidate in candidates {
            if self.options.skip_binary && is_binary(&tree.absolute_path(&candidate)) {
                assembly.skipped_binary.push(candidate);
                continue;
            }
            if assembly.files.len() == limit {
                assembly.truncated = true;
                break;
            }
            assembly.files.push(candidate);
        }

        debug!(
            files = assembly.files.len(),
            truncated = assembly.truncated,
            binary = assembly.skipped_binary.len(),
            "assembled selection"
        );
        assembly
    }
}

/// Check whether a file's leading bytes look binary.
///
/// Unreadable files are reported as binary so they are left out.
pub fn is_binary(path: &Path) -> bool {
    let mut buffer = [0u8; SNIFF_LEN];
    let read = File::open(path).and_then(|mut file| file.read(&mut buffer));
    match read {
        Ok(0) => false,
        Ok(n) => matches!(inspect(&buffer[..n]), ContentType::BINARY),
        Err(err) => {
            debug!(path = %path.display(), error = %err, "unreadable file treated as binary");
            true
        }
    }
}

/// Rough token count for status display: a quarter of the characters,
/// at least one for any non-empty text.
pub fn estimate_tokens(text: &str) -> usize {
    if text.is_empty() {
        0
    } else {
        (text.chars().count() / 4).max(1)
    }
}
