//! Root-relative path helpers.
//!
//! Every path stored in a tree or an exclusion set is relative to the
//! workspace root, uses `/` as separator and carries no leading `./` or
//! trailing slash. The root itself is the empty string.

use std::path::{Component, Path, PathBuf};

use compact_str::CompactString;

/// Relative path of the root node.
pub const ROOT: &str = "";

/// Normalize user or config supplied input into the canonical relative form.
///
/// Backslashes become `/`, empty and `.` segments are dropped.
pub fn normalize(raw: &str) -> CompactString {
    let mut out = CompactString::default();
    for segment in raw.split(['/', '\\']) {
        if segment.is_empty() || segment == "." {
            continue;
        }
        if !out.is_empty() {
            out.push('/');
        }
        out.push_str(segment);
    }
    out
}

/// Convert an absolute filesystem path below `root` into its relative form.
///
/// Returns `None` if `path` is not inside `root`.
pub fn relative_to(root: &Path, path: &Path) -> Option<CompactString> {
    let stripped = path.strip_prefix(root).ok()?;
    let mut out = CompactString::default();
    for component in stripped.components() {
        if let Component::Normal(part) = component {
            if !out.is_empty() {
                out.push('/');
            }
            out.push_str(&part.to_string_lossy());
        }
    }
    Some(out)
}

/// Resolve a relative path against the workspace root.
pub fn to_fs(root: &Path, relative: &str) -> PathBuf {
    let mut out = root.to_path_buf();
    for segment in relative.split('/').filter(|s| !s.is_empty()) {
        out.push(segment);
    }
    out
}

/// Parent of a relative path. The root has no parent.
pub fn parent(path: &str) -> Option<&str> {
    if path.is_empty() {
        return None;
    }
    Some(path.rsplit_once('/').map_or(ROOT, |(head, _)| head))
}

/// Last segment of a relative path.
pub fn file_name(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

/// Join a child name onto a relative parent path.
pub fn join(parent: &str, name: &str) -> CompactString {
    if parent.is_empty() {
        CompactString::from(name)
    } else {
        let mut out = CompactString::with_capacity(parent.len() + name.len() + 1);
        out.push_str(parent);
        out.push('/');
        out.push_str(name);
        out
    }
}

/// Iterate over the proper ancestors of `path`, nearest first, ending with the root.
pub fn ancestors(path: &str) -> impl Iterator<Item = &str> {
    std::iter::successors(parent(path), |p| parent(*p))
}

/// Whether `path` equals `folder` or lies somewhere beneath it.
pub fn is_within(path: &str, folder: &str) -> bool {
    if folder.is_empty() {
        return true;
    }
    path == folder
        || (path.len() > folder.len()
            && path.starts_with(folder)
            && path.as_bytes()[folder.len()] == b'/')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize() {
        assert_eq!(normalize("./src/lib.rs"), "src/lib.rs");
        assert_eq!(normalize("src\\nested\\"), "src/nested");
        assert_eq!(normalize("/a//b/"), "a/b");
        assert_eq!(normalize("."), "");
    }

    #[test]
    fn test_relative_to() {
        let root = Path::new("/work/project");
        assert_eq!(
            relative_to(root, Path::new("/work/project/src/a.py")).unwrap(),
            "src/a.py"
        );
        assert_eq!(relative_to(root, root).unwrap(), "");
        assert!(relative_to(root, Path::new("/elsewhere")).is_none());
    }

    #[test]
    fn test_parent_and_ancestors() {
        assert_eq!(parent("a/b/c"), Some("a/b"));
        assert_eq!(parent("a"), Some(""));
        assert_eq!(parent(""), None);

        let chain: Vec<_> = ancestors("a/b/c").collect();
        assert_eq!(chain, vec!["a/b", "a", ""]);
    }

    #[test]
    fn test_is_within() {
        assert!(is_within("src/a.py", "src"));
        assert!(is_within("src", "src"));
        assert!(!is_within("srcs/a.py", "src"));
        assert!(is_within("anything", ""));
    }

    #[test]
    fn test_join_and_file_name() {
        assert_eq!(join("", "src"), "src");
        assert_eq!(join("src", "a.py"), "src/a.py");
        assert_eq!(file_name("src/a.py"), "a.py");
        assert_eq!(file_name("top"), "top");
    }
}
