//! Source text resolution.
//!
//! The compiler core never touches the filesystem directly; it asks a
//! host-provided [`ContentResolver`] for source text. The resolver is
//! async so hosts can back it with non-blocking I/O, and must be safe
//! for concurrent reads.

use async_trait::async_trait;
use std::collections::HashMap;
use thiserror::Error;
use url::Url;

#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("source not found: {0}")]
    NotFound(Url),
    #[error("unsupported scheme '{scheme}' for {uri}")]
    UnsupportedScheme { scheme: String, uri: Url },
    #[error("failed to read {uri}: {source}")]
    Io {
        uri: Url,
        #[source]
        source: std::io::Error,
    },
}

/// Maps a canonical source URI to its text.
#[async_trait]
pub trait ContentResolver: Send + Sync {
    /// Whether the source exists without fetching it.
    async fn exists(&self, source_id: &Url) -> bool;

    /// Fetch the full source text.
    async fn get_text(&self, source_id: &Url) -> Result<String, ResolveError>;
}

/// Resolver over the local filesystem; handles `file://` URIs only.
#[derive(Debug, Default)]
pub struct FsResolver;

impl FsResolver {
    pub fn new() -> Self {
        Self
    }

    fn to_path(source_id: &Url) -> Result<std::path::PathBuf, ResolveError> {
        if source_id.scheme() != "file" {
            return Err(ResolveError::UnsupportedScheme {
                scheme: source_id.scheme().to_string(),
                uri: source_id.clone(),
            });
        }
        source_id
            .to_file_path()
            .map_err(|_| ResolveError::NotFound(source_id.clone()))
    }
}

#[async_trait]
impl ContentResolver for FsResolver {
    async fn exists(&self, source_id: &Url) -> bool {
        match Self::to_path(source_id) {
            Ok(path) => tokio::fs::try_exists(&path).await.unwrap_or(false),
            Err(_) => false,
        }
    }

    async fn get_text(&self, source_id: &Url) -> Result<String, ResolveError> {
        let path = Self::to_path(source_id)?;
        tokio::fs::read_to_string(&path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ResolveError::NotFound(source_id.clone())
            } else {
                ResolveError::Io {
                    uri: source_id.clone(),
                    source: e,
                }
            }
        })
    }
}

/// In-memory resolver for tests and embedders.
#[derive(Debug, Default)]
pub struct MemoryResolver {
    sources: HashMap<Url, String>,
}

impl MemoryResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, source_id: Url, text: impl Into<String>) {
        self.sources.insert(source_id, text.into());
    }

    /// Builder-style variant of [`insert`](Self::insert).
    pub fn with(mut self, source_id: &str, text: impl Into<String>) -> Self {
        let uri = Url::parse(source_id).expect("memory resolver URIs are well-formed");
        self.insert(uri, text);
        self
    }
}

#[async_trait]
impl ContentResolver for MemoryResolver {
    async fn exists(&self, source_id: &Url) -> bool {
        self.sources.contains_key(source_id)
    }

    async fn get_text(&self, source_id: &Url) -> Result<String, ResolveError> {
        self.sources
            .get(source_id)
            .cloned()
            .ok_or_else(|| ResolveError::NotFound(source_id.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_resolver_roundtrip() {
        let resolver = MemoryResolver::new().with("file:///a.dp", "label start:\n");
        let uri = Url::parse("file:///a.dp").unwrap();

        assert!(resolver.exists(&uri).await);
        assert_eq!(resolver.get_text(&uri).await.unwrap(), "label start:\n");

        let missing = Url::parse("file:///b.dp").unwrap();
        assert!(!resolver.exists(&missing).await);
        assert!(matches!(
            resolver.get_text(&missing).await,
            Err(ResolveError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_fs_resolver_rejects_http() {
        let resolver = FsResolver::new();
        let uri = Url::parse("https://example.com/a.dp").unwrap();
        assert!(!resolver.exists(&uri).await);
        assert!(matches!(
            resolver.get_text(&uri).await,
            Err(ResolveError::UnsupportedScheme { .. })
        ));
    }
}
