//! Storage path helpers.
//!
//! Paths inside the tree store are relative, `/`-separated and never start or
//! end with a separator. The root directory is the empty string.

use crate::storage::error::{StorageError, StorageResult};

/// Normalize separators to `/` and strip leading/trailing separators.
pub fn normalize(path: &str) -> String {
    path.replace('\\', "/").trim_matches('/').to_string()
}

/// Normalize and validate a path that names a file.
pub fn validate(path: &str) -> StorageResult<String> {
    let normalized = normalize(path);
    if normalized.is_empty() {
        return Err(StorageError::InvalidPath(path.to_string()));
    }
    for segment in normalized.split('/') {
        if segment.is_empty() || segment == "." || segment == ".." || segment == ".git" {
            return Err(StorageError::InvalidPath(path.to_string()));
        }
    }
    Ok(normalized)
}

/// Join a directory path and an entry name.
pub fn join(directory: &str, name: &str) -> String {
    if directory.is_empty() {
        name.to_string()
    } else {
        format!("{}/{}", directory, name)
    }
}

/// Directory containing `path` (`""` for top-level entries).
pub fn parent(path: &str) -> &str {
    match path.rfind('/') {
        Some(index) => &path[..index],
        None => "",
    }
}

/// Last segment of `path`.
pub fn file_name(path: &str) -> &str {
    match path.rfind('/') {
        Some(index) => &path[index + 1..],
        None => path,
    }
}

/// File name without its final extension.
pub fn file_stem(path: &str) -> &str {
    let name = file_name(path);
    match name.rfind('.') {
        Some(0) | None => name,
        Some(index) => &name[..index],
    }
}

/// True when every segment of `prefix` matches the leading segments of `path`.
///
/// `projects` is a segment prefix of `projects/acme/project.json`, but
/// `proj` is not. The root (`""`) is a prefix of everything.
pub fn is_segment_prefix(prefix: &str, path: &str) -> bool {
    if prefix.is_empty() {
        return true;
    }
    match path.strip_prefix(prefix) {
        Some(rest) => rest.is_empty() || rest.starts_with('/'),
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize() {
        assert_eq!(normalize("projects\\acme\\project.json"), "projects/acme/project.json");
        assert_eq!(normalize("/machines/m1.json/"), "machines/m1.json");
        assert_eq!(normalize(""), "");
    }

    #[test]
    fn test_validate_rejects_traversal() {
        assert!(validate("projects/../secret").is_err());
        assert!(validate("projects//x.json").is_err());
        assert!(validate("").is_err());
        assert!(validate(".git/config").is_err());
        assert_eq!(validate("a/b.json").unwrap(), "a/b.json");
    }

    #[test]
    fn test_join_and_split() {
        assert_eq!(join("", "meta"), "meta");
        assert_eq!(join("projects/acme", "project.json"), "projects/acme/project.json");
        assert_eq!(parent("projects/acme/project.json"), "projects/acme");
        assert_eq!(parent("readme.md"), "");
        assert_eq!(file_name("projects/acme/project.json"), "project.json");
        assert_eq!(file_stem("projects/acme/project.json"), "project");
        assert_eq!(file_stem("environments/env-1.json"), "env-1");
        assert_eq!(file_stem(".hidden"), ".hidden");
    }

    #[test]
    fn test_segment_prefix() {
        assert!(is_segment_prefix("", "anything"));
        assert!(is_segment_prefix("projects", "projects/acme/project.json"));
        assert!(is_segment_prefix("projects/acme", "projects/acme"));
        assert!(!is_segment_prefix("proj", "projects/acme"));
        assert!(!is_segment_prefix("projects/acme", "projects"));
    }
}
