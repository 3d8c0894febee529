//! Entry name and path validation.
//!
//! Directory handles only ever address their direct children by name, so the
//! common case is [`validate_name`]. [`validate`] handles multi-component
//! paths relative to a storage root and is what backends use internally to
//! keep locations from escaping that root.

use std::path::{Component, Path, PathBuf};

use crate::error::{ErrorKind, Result};

/// Validates a single entry name.
///
/// The name must be exactly one normal path component: not empty, no
/// separators, no `.`/`..`, no null bytes.
///
/// # Examples
///
/// ```
/// use shelf_storage::validate_name;
/// assert!(validate_name("bookdata_1-2-3").is_ok());
/// assert!(validate_name("My Book").is_ok());
/// assert!(validate_name("a/b").is_err());
/// assert!(validate_name("..").is_err());
/// assert!(validate_name("").is_err());
/// ```
pub fn validate_name(name: &str) -> Result<&str> {
    let mut components = Path::new(name).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(s)), None) if !s.as_encoded_bytes().contains(&0) && !name.contains('/') => Ok(name),
        _ => exn::bail!(ErrorKind::InvalidName(name.to_string())),
    }
}

/// Validates a storage path relative to the storage root.
/// Ensures that paths don't escape the storage root (no `..` traversal).
///
/// # Returns
/// Returns the normalized path if valid, or [`InvalidName`](crate::error::ErrorKind::InvalidName)
/// if invalid.
///
/// # Examples
///
/// ```
/// use std::path::Path;
/// use shelf_storage::validate_path;
/// assert!(validate_path("My Book/bookdata_1-2-3").is_ok());
/// assert!(validate_path("../etc/passwd").is_err());
/// assert_eq!(validate_path("a/./b//").unwrap(), Path::new("a/b"));
/// ```
pub fn validate(path: impl AsRef<Path>) -> Result<PathBuf> {
    let path = path.as_ref();
    let invalid = || ErrorKind::InvalidName(path.display().to_string());
    let mut components = Vec::new();
    for component in path.components() {
        match component {
            Component::Normal(s) => {
                // Null bytes pass through Path::components() on Unix but cause
                // truncation in C-based syscalls, so reject them.
                if s.as_encoded_bytes().contains(&0) {
                    exn::bail!(invalid());
                }
                components.push(s)
            },
            Component::CurDir | Component::RootDir => {},
            Component::Prefix(_) => exn::bail!(invalid()),
            Component::ParentDir => {
                if components.pop().is_none() {
                    exn::bail!(invalid());
                }
            },
        }
    }
    match components.is_empty() {
        true => exn::bail!(invalid()),
        false => Ok(components.into_iter().collect()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("cover_png")]
    #[case("Title with spaces")]
    #[case("%2Ehidden")]
    #[case(".swap")]
    fn test_valid_names(#[case] name: &str) {
        assert_eq!(validate_name(name).unwrap(), name);
    }

    #[rstest]
    #[case("")]
    #[case(".")]
    #[case("..")]
    #[case("a/b")]
    #[case("/abs")]
    #[case("trailing/")]
    #[case("a\0b")]
    fn test_invalid_names(#[case] name: &str) {
        let err = validate_name(name).unwrap_err();
        assert!(matches!(&*err, ErrorKind::InvalidName(_)));
    }

    #[test]
    fn test_valid_paths() {
        assert_eq!(validate(Path::new("Title/cover_png")).unwrap(), Path::new("Title/cover_png"));
        assert_eq!(validate(Path::new("a//b/./c")).unwrap(), Path::new("a/b/c"));
        assert_eq!(validate(Path::new("a/b/..")).unwrap(), Path::new("a"));
    }

    #[test]
    fn test_traversal_attempts() {
        assert!(validate(Path::new("../etc/passwd")).is_err());
        assert!(validate(Path::new("a/../../b")).is_err());
        assert!(validate(Path::new("..")).is_err());
    }

    #[test]
    fn test_empty_paths() {
        assert!(validate(Path::new("")).is_err());
        assert!(validate(Path::new("./")).is_err());
        assert!(validate(Path::new("//")).is_err());
    }
}
