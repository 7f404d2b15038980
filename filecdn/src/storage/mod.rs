//! Storage client abstraction and backends.
//!
//! Files are stored as opaque blobs keyed by their name. The service only needs four primitives
//! (get, put, delete and a cursor-paginated list), so every backend is a thin adapter:
//!
//! - [`S3Storage`]: any S3-compatible bucket via the AWS SDK
//! - [`LocalStorage`]: one file per key under a base directory
//! - [`MemoryStorage`]: process-local map, for development and tests
//!
//! None of the backends offer a conditional write, so callers that check for existence before
//! writing or deleting race with concurrent requests for the same key. Last write wins.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;

use crate::config::{StorageBackend, StorageConfig};

pub mod local;
pub mod memory;
pub mod s3;

pub use local::LocalStorage;
pub use memory::MemoryStorage;
pub use s3::S3Storage;

/// One page of a listing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListPage {
    /// Names in backend order
    pub names: Vec<String>,
    /// Continuation cursor; `None` means this was the last page
    pub next_cursor: Option<String>,
}

#[derive(Error, Debug)]
pub enum StorageError {
    /// The backend could not be reached (connection, DNS, timeout)
    #[error("storage backend unavailable: {0}")]
    Unavailable(anyhow::Error),

    /// The key cannot be represented by this backend
    #[error("invalid key '{key}': {reason}")]
    InvalidKey { key: String, reason: String },

    /// Catch-all for non-recoverable errors
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, StorageError>;

/// Trait for blob storage backends
#[async_trait]
pub trait StorageClient: Send + Sync {
    /// Fetch the content stored under `key`, or `None` if there is none
    async fn get(&self, key: &str) -> Result<Option<Bytes>>;

    /// Store `content` under `key`, replacing anything already there
    async fn put(&self, key: &str, content: Bytes) -> Result<()>;

    /// Remove `key`; removing an absent key is not an error
    async fn delete(&self, key: &str) -> Result<()>;

    /// Fetch one page of names, starting after `cursor`
    async fn list(&self, cursor: Option<&str>) -> Result<ListPage>;

    /// Check whether `key` exists
    async fn exists(&self, key: &str) -> Result<bool> {
        Ok(self.get(key).await?.is_some())
    }
}

/// Create a storage backend based on configuration
pub async fn create_storage(config: &StorageConfig) -> anyhow::Result<Arc<dyn StorageClient>> {
    match config.backend {
        StorageBackend::S3 => {
            tracing::info!(bucket = %config.s3.bucket, "Creating S3 storage backend");
            Ok(Arc::new(S3Storage::from_config(&config.s3, config.page_size).await))
        }
        StorageBackend::Local => {
            let path = &config.local.path;
            tracing::info!("Creating local file storage backend (path: {:?})", path);
            tokio::fs::create_dir_all(path)
                .await
                .map_err(|e| anyhow::anyhow!("Failed to create local storage directory {:?}: {}", path, e))?;
            Ok(Arc::new(LocalStorage::new(path.clone(), config.page_size)))
        }
        StorageBackend::Memory => {
            tracing::warn!("Creating in-memory storage backend - files will not survive a restart");
            Ok(Arc::new(MemoryStorage::new(config.page_size)))
        }
    }
}

/// Page `names` (already sorted) after `cursor`, using the last returned name as the next cursor.
pub(crate) fn page_after<'a, I>(names: I, cursor: Option<&str>, page_size: usize) -> ListPage
where
    I: IntoIterator<Item = &'a String>,
{
    let mut remaining = names.into_iter().filter(|name| cursor.is_none_or(|c| name.as_str() > c)).peekable();

    let page: Vec<String> = remaining.by_ref().take(page_size).cloned().collect();
    let next_cursor = match (remaining.peek(), page.last()) {
        (Some(_), Some(last)) => Some(last.clone()),
        _ => None,
    };

    ListPage { names: page, next_cursor }
}
