//! Document blob storage
//!
//! The rest of the crate treats a document's `file_path` as an opaque
//! fetchable reference. The hosted deployment points it at a blob-hosting
//! service; the CLI stores files under the data directory. `fetch` follows
//! http(s) references either way so ingested records keep working after a
//! storage migration.

use crate::error::{Error, Result};
use async_trait::async_trait;
use std::path::PathBuf;
use std::time::Duration;
use tracing::debug;

/// Storage seam for document content
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Store bytes under a relative path, returning the opaque reference
    async fn store(&self, path: &str, bytes: &[u8], content_type: &str) -> Result<String>;

    /// Fetch the bytes behind a reference previously returned by `store`
    async fn fetch(&self, reference: &str) -> Result<Vec<u8>>;

    /// Delete stored bytes. Callers treat failures as non-fatal.
    async fn delete(&self, reference: &str) -> Result<()>;
}

/// Filesystem-backed blob store rooted at the config blob directory
pub struct FsBlobStore {
    root: PathBuf,
    client: reqwest::Client,
}

impl FsBlobStore {
    pub fn new(root: PathBuf) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self { root, client })
    }

    fn resolve(&self, reference: &str) -> PathBuf {
        let path = std::path::Path::new(reference);
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.root.join(path)
        }
    }

    fn is_remote(reference: &str) -> bool {
        reference.starts_with("http://") || reference.starts_with("https://")
    }
}

/// Replace characters that don't belong in a stored file name
pub fn sanitize_file_name(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '.' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

#[async_trait]
impl BlobStore for FsBlobStore {
    async fn store(&self, path: &str, bytes: &[u8], _content_type: &str) -> Result<String> {
        let full = self.root.join(path);
        if let Some(parent) = full.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        debug!("Storing {} bytes at {:?}", bytes.len(), full);
        tokio::fs::write(&full, bytes).await?;
        Ok(full.to_string_lossy().into_owned())
    }

    async fn fetch(&self, reference: &str) -> Result<Vec<u8>> {
        if Self::is_remote(reference) {
            debug!("Fetching remote blob {}", reference);
            let response = self
                .client
                .get(reference)
                .send()
                .await
                .map_err(|e| Error::BlobFetch(e.to_string()))?;
            let response = response
                .error_for_status()
                .map_err(|e| Error::BlobFetch(e.to_string()))?;
            let bytes = response
                .bytes()
                .await
                .map_err(|e| Error::BlobFetch(e.to_string()))?;
            return Ok(bytes.to_vec());
        }

        let full = self.resolve(reference);
        tokio::fs::read(&full)
            .await
            .map_err(|e| Error::BlobFetch(format!("{}: {}", full.display(), e)))
    }

    async fn delete(&self, reference: &str) -> Result<()> {
        if Self::is_remote(reference) {
            // Remote blobs belong to the hosting service; nothing to remove
            // locally.
            return Ok(());
        }

        let full = self.resolve(reference);
        tokio::fs::remove_file(&full)
            .await
            .map_err(|e| Error::Blob(format!("{}: {}", full.display(), e)))
    }
}
