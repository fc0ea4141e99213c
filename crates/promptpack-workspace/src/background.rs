//! Running workspace scans off the caller's thread.

use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::{broadcast, mpsc};

use promptpack_scan::{ScanError, ScanProgress, TreeScanner};

use crate::cache::CacheOptions;
use crate::error::WorkspaceError;
use crate::session::{ScanReport, Session};

/// Capacity of the event channel handed to the caller.
const SCAN_CHANNEL_SIZE: usize = 100;

/// Messages from a background scan.
#[derive(Debug)]
pub enum ScanEvent {
    /// Periodic walk progress.
    Progress(ScanProgress),
    /// The scan finished; always the last event.
    Complete(Result<ScanReport, WorkspaceError>),
}

/// Open a workspace in the background.
///
/// Must be called from within a tokio runtime.
pub fn start_open(
    session: Arc<Session>,
    root: PathBuf,
    options: CacheOptions,
) -> mpsc::Receiver<ScanEvent> {
    spawn_scan(move |scanner| session.open_with(&root, options, scanner))
}

/// Rescan an open workspace in the background.
///
/// Must be called from within a tokio runtime.
pub fn start_rescan(
    session: Arc<Session>,
    root: PathBuf,
    options: CacheOptions,
) -> mpsc::Receiver<ScanEvent> {
    spawn_scan(move |scanner| session.rescan_with(&root, options, scanner))
}

fn spawn_scan<F>(run: F) -> mpsc::Receiver<ScanEvent>
where
    F: FnOnce(&TreeScanner) -> Result<ScanReport, WorkspaceError> + Send + 'static,
{
    let (tx, rx) = mpsc::channel(SCAN_CHANNEL_SIZE);

    tokio::spawn(async move {
        let scanner = TreeScanner::new();
        let mut progress_rx = scanner.subscribe();

        let tx_progress = tx.clone();
        let progress_task = tokio::spawn(async move {
            loop {
                match progress_rx.recv().await {
                    Ok(progress) => {
                        if tx_progress.send(ScanEvent::Progress(progress)).await.is_err() {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });

        // jwalk runs on rayon, keep it off the async workers
        let result = tokio::task::spawn_blocking(move || run(&scanner))
            .await
            .unwrap_or_else(|e| {
                Err(WorkspaceError::Scan(ScanError::Other {
                    message: e.to_string(),
                }))
            });

        // The scanner was dropped with the closure, so the forwarder drains
        // what is buffered, sees the channel close, and exits.
        let _ = progress_task.await;
        let _ = tx.send(ScanEvent::Complete(result)).await;
    });

    rx
}
