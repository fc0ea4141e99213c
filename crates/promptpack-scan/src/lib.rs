//! Filtered directory scanning for promptpack.
//!
//! This crate turns a workspace root into an immutable
//! [`ProjectTree`](promptpack_core::ProjectTree).
//!
//! # Overview
//!
//! - **Filtering** via [`PathMatcher`]: gitignore-style rules, hidden
//!   entries and an extension allow-list. Ignored folders are pruned before
//!   the walk descends into them.
//! - **Parallel traversal** via jwalk/rayon
//! - **Progress updates** via broadcast channels
//! - **Cancellation** through a `CancellationToken`
//! - **Change probing** with [`probe`], which compares a snapshot's
//!   fingerprints to the filesystem without walking it again.
//!
//! # Example
//!
//! ```rust,no_run
//! use promptpack_scan::{ScanConfig, TreeScanner};
//! use tokio_util::sync::CancellationToken;
//!
//! let config = ScanConfig::new("/path/to/project");
//! let scanner = TreeScanner::new();
//! let tree = scanner.scan(&config, &CancellationToken::new()).unwrap();
//!
//! for file in tree.files() {
//!     println!("{} ({} bytes)", file.path, file.size);
//! }
//! ```
//!
//! # Progress Monitoring
//!
//! ```rust,no_run
//! use promptpack_scan::TreeScanner;
//!
//! let scanner = TreeScanner::new();
//! let mut progress_rx = scanner.subscribe();
//!
//! tokio::spawn(async move {
//!     while let Ok(progress) = progress_rx.recv().await {
//!         println!("Scanned {} files", progress.files_scanned);
//!     }
//! });
//! ```

mod matcher;
mod probe;
mod progress;
mod scanner;

pub use matcher::PathMatcher;
pub use probe::{ProbeOutcome, probe};
pub use progress::ScanProgress;
pub use scanner::{TreeScanner, canonical_root};

// Re-export core types for convenience
pub use promptpack_core::{
    Node, NodeKind, ProjectTree, ScanConfig, ScanError, ScanWarning, TreeStats, WarningKind,
};
