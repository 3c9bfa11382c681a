//! Canonical source identifiers.
//!
//! Every source unit is addressed by an absolute URI. Filesystem paths
//! are normalized against the working directory and converted to
//! `file://` URIs; strings that already carry a known scheme pass
//! through unchanged.

use std::path::{Component, Path, PathBuf};
use thiserror::Error;
use url::Url;

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("invalid source URI '{0}'")]
    InvalidUri(String),
    #[error("cannot convert path '{0}' to a file URI")]
    InvalidPath(String),
}

/// Schemes accepted verbatim; everything else is treated as a path.
const URI_SCHEMES: &[&str] = &["file://", "http://", "https://"];

/// Turn a user-supplied source ID into a canonical absolute URI.
pub fn canonical_source_id(input: &str) -> Result<Url, SourceError> {
    if URI_SCHEMES.iter().any(|scheme| input.starts_with(scheme)) {
        return Url::parse(input).map_err(|_| SourceError::InvalidUri(input.to_string()));
    }
    let path = Path::new(input);
    let absolute = if path.is_absolute() {
        normalize(path)
    } else {
        let cwd = std::env::current_dir().map_err(|_| SourceError::InvalidPath(input.to_string()))?;
        normalize(&cwd.join(path))
    };
    Url::from_file_path(&absolute).map_err(|_| SourceError::InvalidPath(input.to_string()))
}

/// Resolve an import target against the URI of the importing file.
///
/// Absolute filesystem paths stay absolute; anything else resolves
/// relative to the importing document.
pub fn resolve_import(base: &Url, target: &str) -> Result<Url, SourceError> {
    let path = Path::new(target);
    if path.is_absolute() {
        return Url::from_file_path(normalize(path))
            .map_err(|_| SourceError::InvalidPath(target.to_string()));
    }
    base.join(target)
        .map_err(|_| SourceError::InvalidUri(target.to_string()))
}

/// Lexical `.`/`..` resolution, no filesystem access.
fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push(component.as_os_str());
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uri_passthrough() {
        let uri = canonical_source_id("file:///scripts/a.dp").unwrap();
        assert_eq!(uri.as_str(), "file:///scripts/a.dp");
    }

    #[test]
    fn test_absolute_path_becomes_file_uri() {
        let uri = canonical_source_id("/scripts/a.dp").unwrap();
        assert_eq!(uri.scheme(), "file");
        assert_eq!(uri.path(), "/scripts/a.dp");
    }

    #[test]
    fn test_relative_path_resolves_against_cwd() {
        let uri = canonical_source_id("a.dp").unwrap();
        assert_eq!(uri.scheme(), "file");
        assert!(uri.path().ends_with("/a.dp"));
        assert_ne!(uri.path(), "/a.dp");
    }

    #[test]
    fn test_dotdot_normalized() {
        let uri = canonical_source_id("/scripts/sub/../a.dp").unwrap();
        assert_eq!(uri.path(), "/scripts/a.dp");
    }

    #[test]
    fn test_import_relative_to_base() {
        let base = Url::parse("file:///scripts/a.dp").unwrap();
        let uri = resolve_import(&base, "b.dp").unwrap();
        assert_eq!(uri.as_str(), "file:///scripts/b.dp");

        let uri = resolve_import(&base, "sub/c.dp").unwrap();
        assert_eq!(uri.as_str(), "file:///scripts/sub/c.dp");
    }

    #[test]
    fn test_import_absolute_stays_absolute() {
        let base = Url::parse("file:///scripts/a.dp").unwrap();
        let uri = resolve_import(&base, "/shared/common.dp").unwrap();
        assert_eq!(uri.as_str(), "file:///shared/common.dp");
    }
}
