//! Core types for promptpack.
//!
//! This crate provides the data model shared by the rest of the workspace:
//! snapshot nodes, the arena-backed project tree, path helpers and the scan
//! configuration.

mod config;
mod error;
mod node;
pub mod path;
mod tree;

pub use config::{
    DEFAULT_HIDDEN_ALLOWLIST, DEFAULT_IGNORE_FILES, DEFAULT_IGNORE_PATTERNS, FilterSignature,
    NO_EXTENSION, ScanConfig, ScanConfigBuilder,
};
pub use error::{ScanError, ScanWarning, WarningKind};
pub use node::{Fingerprint, Node, NodeKind};
pub use tree::{ProjectTree, TreeBuilder, TreeStats};
