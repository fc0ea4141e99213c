//! Workspace management for promptpack.
//!
//! A [`Session`] holds every open workspace. Each one pairs the latest
//! scanned tree with the user's persisted exclusions:
//!
//! - **Persistence** - [`ExclusionStore`] implementations ([`ConfigFile`],
//!   [`MemoryStore`]); every mutation is flushed before returning
//! - **Snapshot cache** - [`ProjectCache`] keeps one JSON snapshot per root
//!   and [`reconcile`] reuses it when a cheap probe finds nothing changed
//! - **Background scans** - [`start_open`] / [`start_rescan`] stream
//!   progress over a tokio channel
//!
//! # Example
//!
//! ```rust,no_run
//! use std::path::Path;
//! use promptpack_workspace::{CacheOptions, Session};
//!
//! let session = Session::in_memory();
//! let root = Path::new("/path/to/project");
//! let report = session.open_workspace(root, CacheOptions::default()).unwrap();
//! println!("{} files", report.stats.total_files);
//!
//! session.toggle(root, "target").unwrap();
//! let counts = session.counts(root).unwrap();
//! println!("{} files included", counts.included_files);
//! ```

mod background;
mod cache;
mod error;
mod persist;
mod record;
mod session;
mod store;

pub use background::{ScanEvent, start_open, start_rescan};
pub use cache::{
    CACHE_FORMAT_VERSION, CacheOptions, CachedSnapshot, ChangeSummary, ProjectCache, Reconciled,
    diff, reconcile,
};
pub use error::{StoreError, WorkspaceError};
pub use persist::atomic_write;
pub use record::WorkspaceRecord;
pub use session::{ScanReport, Session};
pub use store::{AppConfig, ConfigFile, DEFAULT_MAX_RECENT, ExclusionStore, MemoryStore, WorkspaceEntry};
