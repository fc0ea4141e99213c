//! Scan configuration types.

use std::collections::BTreeMap;
use std::path::PathBuf;

use derive_builder::Builder;
use serde::{Deserialize, Serialize};

/// Entries hidden from every scan unless the user configures otherwise.
pub const DEFAULT_IGNORE_PATTERNS: &[&str] = &[
    ".git",
    "__pycache__",
    "node_modules",
    ".vscode",
    ".idea",
    "venv",
    "env",
    ".next",
    "dist",
    "build",
];

/// Per-project ignore files read from the workspace root.
pub const DEFAULT_IGNORE_FILES: &[&str] = &[".gitignore"];

/// Dotfiles that are still scanned when hidden entries are skipped.
pub const DEFAULT_HIDDEN_ALLOWLIST: &[&str] = &[".gitignore", ".dockerignore", ".env.example"];

/// Extension allow-list token admitting files without an extension.
pub const NO_EXTENSION: &str = "no ext";

/// Configuration for scanning a workspace.
#[derive(Debug, Clone, Builder, Serialize, Deserialize)]
#[builder(setter(into), build_fn(validate = "Self::validate"))]
pub struct ScanConfig {
    /// Workspace root to scan.
    pub root: PathBuf,

    /// Global ignore rules (gitignore syntax), applied before project ignore files.
    #[builder(default = "default_ignore_patterns()")]
    #[serde(default = "default_ignore_patterns")]
    pub ignore_patterns: Vec<String>,

    /// Ignore files read from the workspace root.
    #[builder(default = "default_ignore_files()")]
    #[serde(default = "default_ignore_files")]
    pub ignore_files: Vec<String>,

    /// File extension allow-list (empty = all files).
    #[builder(default)]
    #[serde(default)]
    pub included_extensions: Vec<String>,

    /// Include hidden entries (starting with `.`).
    #[builder(default = "false")]
    #[serde(default)]
    pub include_hidden: bool,

    /// Hidden names scanned even when `include_hidden` is off.
    #[builder(default = "default_hidden_allowlist()")]
    #[serde(default = "default_hidden_allowlist")]
    pub hidden_allowlist: Vec<String>,

    /// Maximum depth to traverse (None = unlimited).
    #[builder(default)]
    #[serde(default)]
    pub max_depth: Option<u32>,

    /// Number of threads for scanning (0 = auto-detect).
    #[builder(default = "0")]
    #[serde(default)]
    pub threads: usize,
}

fn default_ignore_patterns() -> Vec<String> {
    DEFAULT_IGNORE_PATTERNS.iter().map(|p| p.to_string()).collect()
}

fn default_ignore_files() -> Vec<String> {
    DEFAULT_IGNORE_FILES.iter().map(|p| p.to_string()).collect()
}

fn default_hidden_allowlist() -> Vec<String> {
    DEFAULT_HIDDEN_ALLOWLIST.iter().map(|p| p.to_string()).collect()
}

impl ScanConfigBuilder {
    fn validate(&self) -> Result<(), String> {
        if let Some(ref root) = self.root {
            if root.as_os_str().is_empty() {
                return Err("Root path cannot be empty".to_string());
            }
        } else {
            return Err("Root path is required".to_string());
        }
        Ok(())
    }
}

impl ScanConfig {
    /// Create a new scan config builder.
    pub fn builder() -> ScanConfigBuilder {
        ScanConfigBuilder::default()
    }

    /// Create a config with default filters for scanning a path.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            ignore_patterns: default_ignore_patterns(),
            ignore_files: default_ignore_files(),
            included_extensions: Vec::new(),
            include_hidden: false,
            hidden_allowlist: default_hidden_allowlist(),
            max_depth: None,
            threads: 0,
        }
    }

    /// Extension allow-list in canonical form: lowercase, without leading dot.
    pub fn normalized_extensions(&self) -> Vec<String> {
        let mut exts: Vec<String> = self
            .included_extensions
            .iter()
            .filter_map(|e| normalize_extension(e))
            .collect();
        exts.sort();
        exts.dedup();
        exts
    }

    /// Check if a hidden entry should be skipped.
    pub fn should_skip_hidden(&self, name: &str) -> bool {
        !self.include_hidden
            && name.starts_with('.')
            && !self.hidden_allowlist.iter().any(|allowed| allowed == name)
    }

    /// Signature of every setting that changes which entries a scan produces.
    ///
    /// Reads the root's ignore files so that editing one in place changes
    /// the signature; unreadable files are left out.
    pub fn filter_signature(&self) -> FilterSignature {
        let mut ignore_patterns: Vec<String> = self
            .ignore_patterns
            .iter()
            .map(|p| p.trim().to_string())
            .filter(|p| !p.is_empty())
            .collect();
        ignore_patterns.sort();
        ignore_patterns.dedup();

        let mut ignore_files = self.ignore_files.clone();
        ignore_files.sort();
        ignore_files.dedup();
        let ignore_file_digests = ignore_files
            .iter()
            .filter_map(|name| {
                let contents = std::fs::read(self.root.join(name)).ok()?;
                Some((name.clone(), blake3::hash(&contents).to_hex().to_string()))
            })
            .collect();
        let mut hidden_allowlist = self.hidden_allowlist.clone();
        hidden_allowlist.sort();

        FilterSignature {
            ignore_patterns,
            ignore_files,
            ignore_file_digests,
            included_extensions: self.normalized_extensions(),
            include_hidden: self.include_hidden,
            hidden_allowlist,
            max_depth: self.max_depth,
        }
    }
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self::new(".")
    }
}

/// Canonical form of one allow-list entry, `None` for blank input.
fn normalize_extension(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    if trimmed.eq_ignore_ascii_case(NO_EXTENSION) {
        return Some(NO_EXTENSION.to_string());
    }
    let ext = trimmed.trim_start_matches('.').to_ascii_lowercase();
    (!ext.is_empty()).then_some(ext)
}

/// The filter settings a tree was scanned with.
///
/// A cached tree is only reusable when its signature matches the current one.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterSignature {
    pub ignore_patterns: Vec<String>,
    pub ignore_files: Vec<String>,
    /// blake3 of each readable ignore file, keyed by file name.
    #[serde(default)]
    pub ignore_file_digests: BTreeMap<String, String>,
    pub included_extensions: Vec<String>,
    pub include_hidden: bool,
    pub hidden_allowlist: Vec<String>,
    pub max_depth: Option<u32>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_builder() {
        let config = ScanConfig::builder()
            .root("/home/user/project")
            .threads(4usize)
            .included_extensions(vec![".py".to_string()])
            .build()
            .unwrap();

        assert_eq!(config.root, PathBuf::from("/home/user/project"));
        assert_eq!(config.threads, 4);
        assert!(!config.include_hidden);
        assert_eq!(config.ignore_patterns.len(), DEFAULT_IGNORE_PATTERNS.len());
    }

    #[test]
    fn test_builder_requires_root() {
        assert!(ScanConfig::builder().build().is_err());
        assert!(ScanConfig::builder().root("").build().is_err());
    }

    #[test]
    fn test_normalized_extensions() {
        let mut config = ScanConfig::new("/p");
        config.included_extensions = vec![
            ".PY".to_string(),
            "rs".to_string(),
            " ".to_string(),
            "No Ext".to_string(),
            "py".to_string(),
        ];
        assert_eq!(config.normalized_extensions(), vec!["no ext", "py", "rs"]);
    }

    #[test]
    fn test_should_skip_hidden() {
        let mut config = ScanConfig::new("/test");

        assert!(config.should_skip_hidden(".cache"));
        assert!(!config.should_skip_hidden(".gitignore"));
        assert!(!config.should_skip_hidden("src"));

        config.include_hidden = true;
        assert!(!config.should_skip_hidden(".cache"));
    }

    #[test]
    fn test_filter_signature_is_order_insensitive() {
        let mut a = ScanConfig::new("/p");
        a.ignore_patterns = vec!["target".into(), "*.log".into()];
        let mut b = ScanConfig::new("/p");
        b.ignore_patterns = vec!["*.log".into(), "target".into(), "target".into()];
        assert_eq!(a.filter_signature(), b.filter_signature());

        b.included_extensions = vec!["rs".into()];
        assert_ne!(a.filter_signature(), b.filter_signature());
    }

    #[test]
    fn test_filter_signature_tracks_ignore_file_contents() {
        let dir = std::env::temp_dir().join(format!("promptpack-sig-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let config = ScanConfig::new(&dir);

        let without = config.filter_signature();
        assert!(without.ignore_file_digests.is_empty());

        std::fs::write(dir.join(".gitignore"), "*.log\n").unwrap();
        let first = config.filter_signature();
        assert_eq!(first.ignore_file_digests.len(), 1);
        assert_ne!(first, without);

        std::fs::write(dir.join(".gitignore"), "*.log\nsecret.py\n").unwrap();
        assert_ne!(config.filter_signature(), first);

        std::fs::remove_dir_all(&dir).unwrap();
    }
}
