use std::collections::BTreeMap;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::RwLock;

use super::{ListPage, Result, StorageClient, page_after};

/// In-memory storage backend, ordered by name
pub struct MemoryStorage {
    files: RwLock<BTreeMap<String, Bytes>>,
    page_size: usize,
}

impl MemoryStorage {
    pub fn new(page_size: usize) -> Self {
        Self {
            files: RwLock::new(BTreeMap::new()),
            page_size,
        }
    }
}

#[async_trait]
impl StorageClient for MemoryStorage {
    async fn get(&self, key: &str) -> Result<Option<Bytes>> {
        Ok(self.files.read().await.get(key).cloned())
    }

    async fn put(&self, key: &str, content: Bytes) -> Result<()> {
        self.files.write().await.insert(key.to_string(), content);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.files.write().await.remove(key);
        Ok(())
    }

    async fn list(&self, cursor: Option<&str>) -> Result<ListPage> {
        let files = self.files.read().await;
        Ok(page_after(files.keys(), cursor, self.page_size))
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        Ok(self.files.read().await.contains_key(key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_storage_put_overwrites() {
        let storage = MemoryStorage::new(10);

        storage.put("a.png", Bytes::from_static(b"first")).await.unwrap();
        storage.put("a.png", Bytes::from_static(b"second")).await.unwrap();

        assert_eq!(storage.get("a.png").await.unwrap(), Some(Bytes::from_static(b"second")));
    }

    #[tokio::test]
    async fn test_memory_storage_lists_in_name_order() {
        let storage = MemoryStorage::new(2);
        for name in ["b.gif", "c.svg", "a.png"] {
            storage.put(name, Bytes::new()).await.unwrap();
        }

        let first = storage.list(None).await.unwrap();
        assert_eq!(first.names, vec!["a.png", "b.gif"]);

        let second = storage.list(first.next_cursor.as_deref()).await.unwrap();
        assert_eq!(second.names, vec!["c.svg"]);
        assert!(second.next_cursor.is_none());
    }
}
