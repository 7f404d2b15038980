use std::fs::Metadata;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use bytes::Bytes;
use tokio::fs;
use tokio::io::AsyncWriteExt;

use super::{ListPage, Result, StorageClient, StorageError, page_after};

/// Directory under the base path where writes are staged before being renamed into place.
/// Listing skips it like any other directory.
const STAGING_DIR: &str = ".filecdn-staging";

/// Local filesystem storage backend - stores one file per key in a directory
/// Useful for development and single-node deployments
pub struct LocalStorage {
    base_path: PathBuf,
    page_size: usize,
    staged_writes: AtomicU64,
}

impl LocalStorage {
    pub fn new(base_path: PathBuf, page_size: usize) -> Self {
        Self {
            base_path,
            page_size,
            staged_writes: AtomicU64::new(0),
        }
    }

    /// Resolve a key to a path inside the base directory, refusing anything that could escape it
    fn path_for(&self, key: &str) -> Result<PathBuf> {
        let reason = if key.is_empty() {
            Some("name cannot be empty")
        } else if key == "." || key == ".." {
            Some("name cannot be a relative directory")
        } else if key.contains(['/', '\\', '\0']) {
            Some("path separators are not allowed")
        } else if key == STAGING_DIR {
            Some("name is reserved")
        } else {
            None
        };

        match reason {
            Some(reason) => Err(StorageError::InvalidKey {
                key: key.to_string(),
                reason: reason.to_string(),
            }),
            None => Ok(self.base_path.join(key)),
        }
    }

    fn staging_path(&self) -> PathBuf {
        let n = self.staged_writes.fetch_add(1, Ordering::Relaxed);
        self.base_path
            .join(STAGING_DIR)
            .join(format!("{}-{}.part", std::process::id(), n))
    }

    async fn sorted_names(&self) -> Result<Vec<String>> {
        let mut entries = fs::read_dir(&self.base_path).await.map_err(|e| io_error(&self.base_path, e))?;

        let mut names = Vec::new();
        while let Some(entry) = entries.next_entry().await.map_err(|e| io_error(&self.base_path, e))? {
            let file_type = entry.file_type().await.map_err(|e| io_error(&entry.path(), e))?;
            if !file_type.is_file() {
                continue;
            }
            match entry.file_name().into_string() {
                Ok(name) => names.push(name),
                Err(raw) => tracing::warn!("Skipping file with non UTF-8 name: {:?}", raw),
            }
        }
        names.sort();
        Ok(names)
    }

    async fn write_staged(&self, staged: &Path, content: &[u8]) -> std::io::Result<()> {
        let mut file = fs::File::create(staged).await?;
        file.write_all(content).await?;
        file.sync_all().await
    }
}

/// Metadata for `path` if it is a regular file. Anything else counts as absent,
/// matching what the listing reports.
async fn regular_file(path: &Path) -> Result<Option<Metadata>> {
    match fs::metadata(path).await {
        Ok(metadata) if metadata.is_file() => Ok(Some(metadata)),
        Ok(_) => Ok(None),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(io_error(path, e)),
    }
}

fn io_error(path: &Path, err: std::io::Error) -> StorageError {
    StorageError::Other(anyhow::anyhow!("I/O error on {:?}: {}", path, err))
}

#[async_trait]
impl StorageClient for LocalStorage {
    async fn get(&self, key: &str) -> Result<Option<Bytes>> {
        let full_path = self.path_for(key)?;

        if regular_file(&full_path).await?.is_none() {
            return Ok(None);
        }

        match fs::read(&full_path).await {
            Ok(content) => Ok(Some(Bytes::from(content))),
            // Removed between the check and the read
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(io_error(&full_path, e)),
        }
    }

    /// Writes to a staging file first, so a failed write never leaves a partial file under `key`.
    async fn put(&self, key: &str, content: Bytes) -> Result<()> {
        let full_path = self.path_for(key)?;

        let staging_dir = self.base_path.join(STAGING_DIR);
        fs::create_dir_all(&staging_dir).await.map_err(|e| io_error(&staging_dir, e))?;

        let staged = self.staging_path();
        if let Err(e) = self.write_staged(&staged, &content).await {
            let _ = fs::remove_file(&staged).await;
            return Err(io_error(&staged, e));
        }

        if let Err(e) = fs::rename(&staged, &full_path).await {
            let _ = fs::remove_file(&staged).await;
            return Err(io_error(&full_path, e));
        }

        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let full_path = self.path_for(key)?;

        if regular_file(&full_path).await?.is_none() {
            return Ok(());
        }

        match fs::remove_file(&full_path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(io_error(&full_path, e)),
        }
    }

    async fn list(&self, cursor: Option<&str>) -> Result<ListPage> {
        let names = self.sorted_names().await?;
        Ok(page_after(&names, cursor, self.page_size))
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        let full_path = self.path_for(key)?;
        Ok(regular_file(&full_path).await?.is_some())
    }
}
