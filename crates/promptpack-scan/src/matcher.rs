//! Hard filesystem-level filtering of scan entries.
//!
//! A [`PathMatcher`] decides which entries never enter a tree. It combines
//! gitignore-style rules (global patterns first, then the project's ignore
//! files so they can override), hidden-entry skipping and an extension
//! allow-list for files.

use std::path::Path;

use ignore::gitignore::{Gitignore, GitignoreBuilder};
use tracing::{debug, info, warn};

use promptpack_core::{NO_EXTENSION, ScanConfig, path};

/// Compiled ignore rules for one workspace.
#[derive(Debug)]
pub struct PathMatcher {
    rules: Gitignore,
    extensions: Vec<String>,
    include_hidden: bool,
    hidden_allowlist: Vec<String>,
}

impl PathMatcher {
    /// A matcher that lets everything through.
    pub fn empty() -> Self {
        Self {
            rules: Gitignore::empty(),
            extensions: Vec::new(),
            include_hidden: true,
            hidden_allowlist: Vec::new(),
        }
    }

    /// Compile the rules described by a scan configuration.
    ///
    /// Ignore files are read relative to `config.root`; a missing file is not
    /// an error. Malformed lines are skipped.
    pub fn from_config(config: &ScanConfig) -> Self {
        let mut builder = GitignoreBuilder::new(&config.root);
        for line in &config.ignore_patterns {
            add_rule(&mut builder, None, line);
        }

        for name in &config.ignore_files {
            let file = config.root.join(name);
            match std::fs::read_to_string(&file) {
                Ok(contents) => {
                    debug!(path = %file.display(), "loading ignore file");
                    for line in contents.lines() {
                        add_rule(&mut builder, Some(&file), line);
                    }
                }
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
                Err(err) => {
                    info!(path = %file.display(), error = %err, "ignore file unreadable, skipping");
                }
            }
        }

        let rules = builder.build().unwrap_or_else(|err| {
            warn!(error = %err, "failed to compile ignore rules, ignoring none");
            Gitignore::empty()
        });

        Self {
            rules,
            extensions: config.normalized_extensions(),
            include_hidden: config.include_hidden,
            hidden_allowlist: config.hidden_allowlist.clone(),
        }
    }

    /// Compile an ad-hoc list of gitignore lines with no other filters.
    pub fn from_patterns(root: &Path, patterns: &[&str]) -> Self {
        let mut builder = GitignoreBuilder::new(root);
        for line in patterns {
            add_rule(&mut builder, None, line);
        }
        Self {
            rules: builder.build().unwrap_or_else(|_| Gitignore::empty()),
            ..Self::empty()
        }
    }

    /// Restrict files to the given extensions (empty = all).
    pub fn with_extensions<S: AsRef<str>>(mut self, extensions: &[S]) -> Self {
        let mut config = ScanConfig::default();
        config.included_extensions = extensions.iter().map(|e| e.as_ref().to_string()).collect();
        self.extensions = config.normalized_extensions();
        self
    }

    /// True iff the entry must never appear in a scan.
    pub fn matches(&self, relative_path: &str, is_dir: bool) -> bool {
        if relative_path.is_empty() {
            return false;
        }
        if self.is_hidden(relative_path) || self.is_ignored(relative_path, is_dir) {
            return true;
        }
        !is_dir && !self.extension_allowed(relative_path)
    }

    /// Check the gitignore rules alone. Later rules win, `!` re-includes.
    pub fn is_ignored(&self, relative_path: &str, is_dir: bool) -> bool {
        self.rules.matched(relative_path, is_dir).is_ignore()
    }

    /// Check the extension allow-list alone.
    pub fn extension_allowed(&self, relative_path: &str) -> bool {
        if self.extensions.is_empty() {
            return true;
        }
        match Path::new(path::file_name(relative_path)).extension() {
            Some(ext) => {
                let ext = ext.to_string_lossy().to_ascii_lowercase();
                self.extensions.iter().any(|allowed| *allowed == ext)
            }
            None => self.extensions.iter().any(|allowed| allowed == NO_EXTENSION),
        }
    }

    /// Number of compiled gitignore rules.
    pub fn rule_count(&self) -> usize {
        self.rules.num_ignores() as usize + self.rules.num_whitelists() as usize
    }

    fn is_hidden(&self, relative_path: &str) -> bool {
        if self.include_hidden {
            return false;
        }
        let name = path::file_name(relative_path);
        name.starts_with('.') && !self.hidden_allowlist.iter().any(|allowed| allowed == name)
    }
}

impl Default for PathMatcher {
    fn default() -> Self {
        Self::empty()
    }
}

fn add_rule(builder: &mut GitignoreBuilder, source: Option<&Path>, line: &str) {
    let trimmed = line.trim_end();
    if trimmed.trim_start().is_empty() || trimmed.starts_with('#') {
        return;
    }
    if let Err(err) = builder.add_line(source.map(Path::to_path_buf), trimmed) {
        info!(pattern = trimmed, error = %err, "skipping malformed ignore pattern");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn matcher(patterns: &[&str]) -> PathMatcher {
        PathMatcher::from_patterns(Path::new("/project"), patterns)
    }

    #[test]
    fn test_single_star_stays_in_segment() {
        let m = matcher(&["src/*.py"]);
        assert!(m.matches("src/a.py", false));
        assert!(!m.matches("src/deep/a.py", false));
    }

    #[test]
    fn test_double_star_crosses_segments() {
        let m = matcher(&["src/**/*.py"]);
        assert!(m.matches("src/a.py", false));
        assert!(m.matches("src/deep/er/a.py", false));
        assert!(!m.matches("lib/a.py", false));
    }

    #[test]
    fn test_trailing_slash_only_matches_dirs() {
        let m = matcher(&["build/"]);
        assert!(m.matches("build", true));
        assert!(!m.matches("build", false));
    }

    #[test]
    fn test_negation_reincludes() {
        let m = matcher(&["*.log", "!keep.log"]);
        assert!(m.matches("debug.log", false));
        assert!(!m.matches("keep.log", false));
    }

    #[test]
    fn test_later_rules_override() {
        let m = matcher(&["!keep.log", "*.log"]);
        assert!(m.matches("keep.log", false));
    }

    #[test]
    fn test_malformed_line_is_skipped() {
        let m = matcher(&["src/[", "*.tmp"]);
        assert!(m.matches("a.tmp", false));
        assert!(!m.matches("src/a.py", false));
    }

    #[test]
    fn test_extension_allow_list() {
        let m = PathMatcher::empty().with_extensions(&[".py", "no ext"]);
        assert!(!m.matches("src/a.py", false));
        assert!(!m.matches("Makefile", false));
        assert!(m.matches("src/a.rs", false));
        // Folders are never filtered by extension.
        assert!(!m.matches("src.rs", true));
    }

    #[test]
    fn test_empty_allow_list_admits_all() {
        let m = PathMatcher::empty();
        assert!(m.extension_allowed("anything.bin"));
        assert!(m.extension_allowed("README"));
    }

    #[test]
    fn test_hidden_entries() {
        let mut config = ScanConfig::new("/does/not/exist");
        config.ignore_patterns.clear();
        let m = PathMatcher::from_config(&config);
        assert!(m.matches(".cache", true));
        assert!(m.matches("src/.env", false));
        assert!(!m.matches(".gitignore", false));
    }
}
