//! Path parsing, normalization and security checks for object storage.
//!
//! Provides protection against directory traversal attacks and turns the
//! configured `/bucket/prefix` strings into backend locations.

use anyhow::{Result, bail};
use std::path::{Component, Path, PathBuf};

use super::types::ObjectLocation;

/// Validates and normalizes an object name to prevent directory traversal.
///
/// # Security
/// Rejects names that:
/// - Are absolute (start with `/` or drive letter)
/// - Contain `..` components
/// - Contain special components like root or prefix
/// - Contain null bytes
/// - Are empty
///
/// # Examples
/// ```ignore
/// validate_path("uploads/abc.png")     // Ok("uploads/abc.png")
/// validate_path("./public/logo.svg")   // Ok("public/logo.svg")
///
/// validate_path("../etc/passwd")       // Error: path traversal
/// validate_path("/etc/passwd")         // Error: absolute path
/// validate_path("")                    // Error: empty path
/// ```
pub(crate) fn validate_path(path: &str) -> Result<PathBuf> {
    if path.is_empty() {
        bail!("Object path cannot be empty");
    }
    if path.contains('\0') {
        bail!("Object path cannot contain null bytes");
    }

    let path = Path::new(path);

    if path.is_absolute() {
        bail!("Object path cannot be absolute: {}", path.display());
    }

    let mut normalized = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Normal(name) => normalized.push(name),
            Component::CurDir => {},
            Component::ParentDir => {
                bail!("Object path cannot contain '..': {}", path.display())
            },
            Component::RootDir | Component::Prefix(_) => {
                bail!(
                    "Object path cannot contain root or prefix: {}",
                    path.display()
                )
            },
        }
    }

    if normalized.as_os_str().is_empty() {
        bail!("Object path normalized to empty path");
    }

    Ok(normalized)
}

/// Normalized `/`-separated form of an object name.
pub(crate) fn normalize_name(name: &str) -> Result<String> {
    Ok(validate_path(name)?.to_string_lossy().replace('\\', "/"))
}

/// Validates a whole location: a single-segment bucket and a safe name.
pub(crate) fn normalize_location(location: &ObjectLocation) -> Result<ObjectLocation> {
    let bucket = &location.bucket;
    if bucket.is_empty() || bucket.contains('/') || bucket == "." || bucket == ".." {
        bail!("Invalid bucket name: {bucket:?}");
    }
    Ok(ObjectLocation::new(
        bucket.clone(),
        normalize_name(&location.name)?,
    ))
}

/// Returns the filesystem path for an object given a base directory.
pub(crate) fn object_path(base_dir: &Path, location: &ObjectLocation) -> Result<PathBuf> {
    let location = normalize_location(location)?;
    Ok(base_dir
        .join(&location.bucket)
        .join(validate_path(&location.name)?))
}

/// Splits `/bucket/object/name` into a location.
///
/// A leading `/` is optional. At least a bucket and one name segment are
/// required.
///
/// # Errors
///
/// Returns an error if the path has fewer than two segments.
pub fn parse_object_path(path: &str) -> Result<ObjectLocation> {
    let path = path.strip_prefix('/').unwrap_or(path);
    match path.split_once('/') {
        Some((bucket, name)) if !bucket.is_empty() && !name.is_empty() => {
            Ok(ObjectLocation::new(bucket, name))
        },
        _ => bail!("Invalid object path: must contain at least a bucket name and an object name"),
    }
}

/// Parses a comma-separated search path list: trimmed, empty entries dropped.
pub fn parse_search_paths(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(ToString::to_string)
        .collect()
}

/// Ensures the private root starts and ends with exactly one `/`.
pub fn normalize_private_dir(raw: &str) -> String {
    format!("/{}/", raw.trim().trim_matches('/'))
}

/// Joins a prefix and a relative path with a single `/`.
pub(crate) fn join_object_path(prefix: &str, relative: &str) -> String {
    format!(
        "{}/{}",
        prefix.trim_end_matches('/'),
        relative.trim_start_matches('/')
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_path_rejects_traversal() {
        for path in [
            "../etc/passwd",
            "a/../../etc/passwd",
            "/etc/passwd",
            "",
            ".",
            "nul\0byte",
        ] {
            assert!(validate_path(path).is_err(), "accepted: {path:?}");
        }
    }

    #[test]
    fn test_validate_path_normalizes_current_dir() {
        assert_eq!(normalize_name("./a/./b.txt").unwrap(), "a/b.txt");
    }

    #[test]
    fn test_parse_object_path() {
        let loc = parse_object_path("/bucket/public/logo.svg").unwrap();
        assert_eq!(loc, ObjectLocation::new("bucket", "public/logo.svg"));

        let loc = parse_object_path("bucket/x").unwrap();
        assert_eq!(loc, ObjectLocation::new("bucket", "x"));

        assert!(parse_object_path("/bucket").is_err());
        assert!(parse_object_path("/bucket/").is_err());
        assert!(parse_object_path("//x").is_err());
    }

    #[test]
    fn test_parse_search_paths() {
        assert_eq!(
            parse_search_paths(" /b/public , ,/b/assets,"),
            vec!["/b/public".to_string(), "/b/assets".to_string()]
        );
        assert!(parse_search_paths(" , ").is_empty());
    }

    #[test]
    fn test_normalize_private_dir() {
        assert_eq!(normalize_private_dir("/b/.private"), "/b/.private/");
        assert_eq!(normalize_private_dir("/b/.private/"), "/b/.private/");
        assert_eq!(normalize_private_dir("/b/.private//"), "/b/.private/");
        assert_eq!(normalize_private_dir("b/.private"), "/b/.private/");
        assert_eq!(normalize_private_dir(" //b/.private "), "/b/.private/");
    }

    #[test]
    fn test_join_object_path() {
        assert_eq!(join_object_path("/b/public/", "/x.txt"), "/b/public/x.txt");
        assert_eq!(join_object_path("/b/public", "x.txt"), "/b/public/x.txt");
    }

    #[test]
    fn test_normalize_location_rejects_bad_bucket() {
        assert!(normalize_location(&ObjectLocation::new("..", "x")).is_err());
        assert!(normalize_location(&ObjectLocation::new("", "x")).is_err());
        assert!(normalize_location(&ObjectLocation::new("b", "../x")).is_err());
    }
}
