//! Error types for workspace management.

use std::path::PathBuf;

use thiserror::Error;

use promptpack_scan::ScanError;

/// Errors reading or writing persisted state.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Filesystem failure.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The config file could not be serialized.
    #[error("Failed to encode config: {0}")]
    Toml(#[from] toml::ser::Error),

    /// A cache snapshot could not be serialized.
    #[error("Failed to encode cache: {0}")]
    Json(#[from] serde_json::Error),
}

impl StoreError {
    /// Create an I/O error with path context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Errors from [`Session`](crate::Session) operations.
#[derive(Debug, Error)]
pub enum WorkspaceError {
    /// The scan failed or was cancelled.
    #[error(transparent)]
    Scan(#[from] ScanError),

    /// Persisting exclusions failed.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Another scan of the same root is still running.
    #[error("A scan is already running for {root}")]
    ScanInProgress { root: PathBuf },

    /// The root has not been opened in this session.
    #[error("Workspace not open: {root}")]
    NotOpen { root: PathBuf },
}

impl WorkspaceError {
    /// Check if the error is a cancellation.
    pub fn is_interrupted(&self) -> bool {
        matches!(self, WorkspaceError::Scan(ScanError::Interrupted))
    }
}
