//! Scan progress reporting.

use std::path::PathBuf;
use std::time::{Duration, Instant};

/// Progress information during a scan.
#[derive(Debug, Clone)]
pub struct ScanProgress {
    /// Number of files admitted so far.
    pub files_scanned: u64,
    /// Number of folders admitted so far.
    pub dirs_scanned: u64,
    /// Total bytes of admitted files so far.
    pub bytes_scanned: u64,
    /// Last path visited.
    pub current_path: PathBuf,
    /// Number of warnings encountered.
    pub warnings_count: u64,
    /// Time elapsed since the scan started.
    pub elapsed: Duration,
}

impl ScanProgress {
    /// Create initial progress state.
    pub fn new() -> Self {
        Self {
            files_scanned: 0,
            dirs_scanned: 0,
            bytes_scanned: 0,
            current_path: PathBuf::new(),
            warnings_count: 0,
            elapsed: Duration::ZERO,
        }
    }

    /// Calculate scan rate in files per second.
    pub fn files_per_second(&self) -> f64 {
        if self.elapsed.as_secs_f64() > 0.0 {
            self.files_scanned as f64 / self.elapsed.as_secs_f64()
        } else {
            0.0
        }
    }

    /// Get total items scanned (files + folders).
    pub fn total_items(&self) -> u64 {
        self.files_scanned + self.dirs_scanned
    }
}

impl Default for ScanProgress {
    fn default() -> Self {
        Self::new()
    }
}

/// Running counters for one walk.
#[derive(Debug)]
pub(crate) struct ProgressTracker {
    start_time: Instant,
    progress: ScanProgress,
}

impl ProgressTracker {
    pub fn new() -> Self {
        Self {
            start_time: Instant::now(),
            progress: ScanProgress::new(),
        }
    }

    pub fn record_file(&mut self, size: u64) {
        self.progress.files_scanned += 1;
        self.progress.bytes_scanned += size;
    }

    pub fn record_dir(&mut self) {
        self.progress.dirs_scanned += 1;
    }

    pub fn record_warning(&mut self) {
        self.progress.warnings_count += 1;
    }

    pub fn set_current_path(&mut self, path: PathBuf) {
        self.progress.current_path = path;
    }

    pub fn total_items(&self) -> u64 {
        self.progress.total_items()
    }

    pub fn elapsed(&self) -> Duration {
        self.start_time.elapsed()
    }

    pub fn snapshot(&self) -> ScanProgress {
        ScanProgress {
            elapsed: self.start_time.elapsed(),
            ..self.progress.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tracker_snapshot() {
        let mut tracker = ProgressTracker::new();
        tracker.record_file(100);
        tracker.record_file(50);
        tracker.record_dir();
        tracker.record_warning();
        tracker.set_current_path(PathBuf::from("/p/src"));

        let snap = tracker.snapshot();
        assert_eq!(snap.files_scanned, 2);
        assert_eq!(snap.bytes_scanned, 150);
        assert_eq!(snap.total_items(), 3);
        assert_eq!(snap.warnings_count, 1);
        assert_eq!(snap.current_path, PathBuf::from("/p/src"));
    }

    #[test]
    fn test_rate_without_elapsed_time() {
        assert_eq!(ScanProgress::new().files_per_second(), 0.0);
    }
}
