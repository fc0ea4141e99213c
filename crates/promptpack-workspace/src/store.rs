//! Persisted application config and exclusion storage.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use promptpack_core::{DEFAULT_IGNORE_PATTERNS, ScanConfig};
use promptpack_select::ExclusionSet;

use crate::error::StoreError;
use crate::persist::atomic_write;

/// Default cap on the recent-workspaces list.
pub const DEFAULT_MAX_RECENT: usize = 10;

/// Per-workspace persisted state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkspaceEntry {
    /// Canonical workspace root.
    pub root_path: PathBuf,

    /// Paths the user excluded, relative to the root.
    #[serde(default)]
    pub exclusion_set: ExclusionSet,

    /// Extension allow-list for this workspace (empty = all).
    #[serde(default)]
    pub included_extensions: Vec<String>,
}

impl WorkspaceEntry {
    /// Create an entry with no exclusions.
    pub fn new(root_path: impl Into<PathBuf>, included_extensions: Vec<String>) -> Self {
        Self {
            root_path: root_path.into(),
            exclusion_set: ExclusionSet::new(),
            included_extensions,
        }
    }
}

/// Contents of the TOML config file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    /// Global ignore rules, gitignore syntax.
    #[serde(default = "default_ignore_patterns")]
    pub ignore_patterns: Vec<String>,

    /// Extension allow-list given to newly opened workspaces.
    #[serde(default)]
    pub included_extensions: Vec<String>,

    /// Scan dotfiles too.
    #[serde(default)]
    pub include_hidden: bool,

    /// Cap on `recent_workspaces`.
    #[serde(default = "default_max_recent")]
    pub max_recent: usize,

    /// Recently opened roots, most recent first.
    #[serde(default)]
    pub recent_workspaces: Vec<PathBuf>,

    /// Root the user worked in last.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active_workspace: Option<PathBuf>,

    /// One entry per known workspace.
    #[serde(default)]
    pub workspaces: Vec<WorkspaceEntry>,
}

fn default_ignore_patterns() -> Vec<String> {
    DEFAULT_IGNORE_PATTERNS.iter().map(|p| p.to_string()).collect()
}

fn default_max_recent() -> usize {
    DEFAULT_MAX_RECENT
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            ignore_patterns: default_ignore_patterns(),
            included_extensions: Vec::new(),
            include_hidden: false,
            max_recent: DEFAULT_MAX_RECENT,
            recent_workspaces: Vec::new(),
            active_workspace: None,
            workspaces: Vec::new(),
        }
    }
}

impl AppConfig {
    /// Parse a config from TOML text.
    pub fn from_toml(text: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(text)
    }

    /// Render the config as TOML text.
    pub fn to_toml(&self) -> Result<String, StoreError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Look up the entry for a root.
    pub fn entry(&self, root: &Path) -> Option<&WorkspaceEntry> {
        self.workspaces.iter().find(|w| w.root_path == root)
    }

    /// The entry for a root, created with the default extensions if missing.
    pub fn entry_mut(&mut self, root: &Path) -> &mut WorkspaceEntry {
        let index = match self.workspaces.iter().position(|w| w.root_path == root) {
            Some(index) => index,
            None => {
                let entry = WorkspaceEntry::new(root, self.included_extensions.clone());
                self.workspaces.push(entry);
                self.workspaces.len() - 1
            }
        };
        &mut self.workspaces[index]
    }

    /// Scan settings for a root: global filters plus the workspace's
    /// extension list.
    pub fn scan_config(&self, root: &Path) -> ScanConfig {
        let mut config = ScanConfig::new(root);
        config.ignore_patterns = self.ignore_patterns.clone();
        config.include_hidden = self.include_hidden;
        config.included_extensions = match self.entry(root) {
            Some(entry) => entry.included_extensions.clone(),
            None => self.included_extensions.clone(),
        };
        config
    }

    /// Move a root to the front of the recent list and make it active.
    pub fn touch_recent(&mut self, root: &Path) {
        self.recent_workspaces.retain(|r| r != root);
        self.recent_workspaces.insert(0, root.to_path_buf());
        self.recent_workspaces.truncate(self.max_recent.max(1));
        self.active_workspace = Some(root.to_path_buf());
    }

    /// Drop a root from the recent list. Its exclusions are kept.
    pub fn forget_recent(&mut self, root: &Path) {
        self.recent_workspaces.retain(|r| r != root);
        if self.active_workspace.as_deref() == Some(root) {
            self.active_workspace = self.recent_workspaces.first().cloned();
        }
    }
}

/// Persistence seam for exclusion sets.
///
/// Loading never fails: missing or unreadable state is an empty set.
pub trait ExclusionStore: Send + Sync {
    /// Exclusions saved for a root.
    fn load(&self, root: &Path) -> ExclusionSet;

    /// Replace the exclusions saved for a root.
    fn save(&self, root: &Path, exclusions: &ExclusionSet) -> Result<(), StoreError>;

    /// Scan settings to use for a root.
    fn scan_config(&self, root: &Path) -> ScanConfig {
        ScanConfig::new(root)
    }

    /// Called after a workspace was opened.
    fn opened(&self, _root: &Path) -> Result<(), StoreError> {
        Ok(())
    }

    /// Called after a workspace was closed.
    fn closed(&self, _root: &Path) -> Result<(), StoreError> {
        Ok(())
    }
}

pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// [`ExclusionStore`] backed by the TOML config file.
///
/// The file is read once on open; every save rewrites it atomically from
/// the in-memory copy.
#[derive(Debug)]
pub struct ConfigFile {
    path: PathBuf,
    config: Mutex<AppConfig>,
    /// Set while the file on disk failed to parse and has not been backed up.
    corrupt: AtomicBool,
}

impl ConfigFile {
    /// Default location: `<config dir>/promptpack/config.toml`.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("promptpack")
            .join("config.toml")
    }

    /// Read the config at `path`.
    ///
    /// A missing file yields defaults. A corrupt one also yields defaults and
    /// is left on disk untouched: opening and closing workspaces do not write
    /// it, and the first explicit save copies it to `<path>.corrupt` first.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let mut corrupt = false;
        let config = match fs::read_to_string(&path) {
            Ok(text) => AppConfig::from_toml(&text).unwrap_or_else(|err| {
                warn!(path = %path.display(), error = %err, "config file is corrupt, using defaults");
                corrupt = true;
                AppConfig::default()
            }),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "no config file yet");
                AppConfig::default()
            }
            Err(err) => {
                warn!(path = %path.display(), error = %err, "config file unreadable, using defaults");
                AppConfig::default()
            }
        };
        Self {
            path,
            config: Mutex::new(config),
            corrupt: AtomicBool::new(corrupt),
        }
    }

    /// Whether the file failed to parse and is still on disk as found.
    pub fn is_corrupt(&self) -> bool {
        self.corrupt.load(Ordering::Acquire)
    }

    /// Where a corrupt file is copied before it is first overwritten.
    pub fn backup_path(&self) -> PathBuf {
        let mut name = self.path.clone().into_os_string();
        name.push(".corrupt");
        PathBuf::from(name)
    }

    /// Location of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Copy of the current config.
    pub fn config(&self) -> AppConfig {
        lock(&self.config).clone()
    }

    /// Apply a change and write the file.
    pub fn update<F>(&self, change: F) -> Result<(), StoreError>
    where
        F: FnOnce(&mut AppConfig),
    {
        let mut config = lock(&self.config);
        let mut next = config.clone();
        change(&mut next);
        if self.is_corrupt() {
            let backup = self.backup_path();
            fs::copy(&self.path, &backup).map_err(|err| StoreError::io(&backup, err))?;
            warn!(backup = %backup.display(), "corrupt config file backed up before overwrite");
            self.corrupt.store(false, Ordering::Release);
        }
        atomic_write(&self.path, next.to_toml()?.as_bytes())?;
        *config = next;
        Ok(())
    }

    /// Bookkeeping writes are skipped while the file is corrupt.
    fn update_bookkeeping<F>(&self, change: F) -> Result<(), StoreError>
    where
        F: FnOnce(&mut AppConfig),
    {
        if self.is_corrupt() {
            debug!(path = %self.path.display(), "config file is corrupt, not recording workspace");
            let mut config = lock(&self.config);
            change(&mut config);
            return Ok(());
        }
        self.update(change)
    }
}

impl ExclusionStore for ConfigFile {
    fn load(&self, root: &Path) -> ExclusionSet {
        lock(&self.config)
            .entry(root)
            .map(|entry| entry.exclusion_set.clone())
            .unwrap_or_default()
    }

    fn save(&self, root: &Path, exclusions: &ExclusionSet) -> Result<(), StoreError> {
        self.update(|config| config.entry_mut(root).exclusion_set = exclusions.clone())
    }

    fn scan_config(&self, root: &Path) -> ScanConfig {
        lock(&self.config).scan_config(root)
    }

    fn opened(&self, root: &Path) -> Result<(), StoreError> {
        self.update_bookkeeping(|config| {
            config.entry_mut(root);
            config.touch_recent(root);
        })
    }

    fn closed(&self, root: &Path) -> Result<(), StoreError> {
        self.update_bookkeeping(|config| config.forget_recent(root))
    }
}

/// In-memory [`ExclusionStore`].
#[derive(Debug, Default)]
pub struct MemoryStore {
    sets: Mutex<HashMap<PathBuf, ExclusionSet>>,
    template: Option<ScanConfig>,
}

impl MemoryStore {
    /// Create an empty store using default scan settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Use `template`'s filters (with the root replaced) for every workspace.
    pub fn with_scan_config(mut self, template: ScanConfig) -> Self {
        self.template = Some(template);
        self
    }

    /// Seed the exclusions for a root.
    pub fn insert(&self, root: impl Into<PathBuf>, exclusions: ExclusionSet) {
        lock(&self.sets).insert(root.into(), exclusions);
    }
}

impl ExclusionStore for MemoryStore {
    fn load(&self, root: &Path) -> ExclusionSet {
        lock(&self.sets).get(root).cloned().unwrap_or_default()
    }

    fn save(&self, root: &Path, exclusions: &ExclusionSet) -> Result<(), StoreError> {
        lock(&self.sets).insert(root.to_path_buf(), exclusions.clone());
        Ok(())
    }

    fn scan_config(&self, root: &Path) -> ScanConfig {
        match &self.template {
            Some(template) => ScanConfig {
                root: root.to_path_buf(),
                ..template.clone()
            },
            None => ScanConfig::new(root),
        }
    }
}
