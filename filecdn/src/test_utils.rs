//! Shared helpers for handler and router tests.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use axum_test::TestServer;
use bytes::Bytes;

use crate::config::{Config, StorageBackend};
use crate::storage::{ListPage, MemoryStorage, Result, StorageClient};

/// In-memory storage that counts every call made to it.
pub struct CountingStorage {
    inner: MemoryStorage,
    pub gets: AtomicUsize,
    pub puts: AtomicUsize,
    pub deletes: AtomicUsize,
    pub lists: AtomicUsize,
    pub exists_checks: AtomicUsize,
}

impl CountingStorage {
    pub fn new(page_size: usize) -> Self {
        Self {
            inner: MemoryStorage::new(page_size),
            gets: AtomicUsize::new(0),
            puts: AtomicUsize::new(0),
            deletes: AtomicUsize::new(0),
            lists: AtomicUsize::new(0),
            exists_checks: AtomicUsize::new(0),
        }
    }

    /// Total number of storage operations of any kind
    pub fn calls(&self) -> usize {
        [&self.gets, &self.puts, &self.deletes, &self.lists, &self.exists_checks]
            .iter()
            .map(|counter| counter.load(Ordering::SeqCst))
            .sum()
    }
}

#[async_trait]
impl StorageClient for CountingStorage {
    async fn get(&self, key: &str) -> Result<Option<Bytes>> {
        self.gets.fetch_add(1, Ordering::SeqCst);
        self.inner.get(key).await
    }

    async fn put(&self, key: &str, content: Bytes) -> Result<()> {
        self.puts.fetch_add(1, Ordering::SeqCst);
        self.inner.put(key, content).await
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.deletes.fetch_add(1, Ordering::SeqCst);
        self.inner.delete(key).await
    }

    async fn list(&self, cursor: Option<&str>) -> Result<ListPage> {
        self.lists.fetch_add(1, Ordering::SeqCst);
        self.inner.list(cursor).await
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        self.exists_checks.fetch_add(1, Ordering::SeqCst);
        self.inner.exists(key).await
    }
}

pub fn create_test_config() -> Config {
    let mut config = Config::default();
    config.storage.backend = StorageBackend::Memory;
    config
}

pub async fn create_test_app(config: Config) -> (TestServer, Arc<CountingStorage>) {
    let storage = Arc::new(CountingStorage::new(config.storage.page_size));

    let app = crate::Application::with_storage(config, storage.clone()).expect("Failed to create application");
    (app.into_test_server(), storage)
}
