//! Key→blob storage for cache entries (local directory or in-memory).

use std::path::PathBuf;
use std::sync::Arc;

use bytes::Bytes;
use object_store::{local::LocalFileSystem, memory::InMemory, path::Path, ObjectStore};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::error::{CacheError, CacheResult};

/// Where cache blobs live.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BlobStoreConfig {
    /// A directory tree rooted at `root`.
    Local { root: PathBuf },
    /// Process-local memory; contents are lost on exit.
    Memory,
}

/// Thin wrapper over an `ObjectStore` addressed by `/`-separated keys.
#[derive(Clone)]
pub struct BlobStore {
    store: Arc<dyn ObjectStore>,
    label: String,
}

impl std::fmt::Debug for BlobStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlobStore").field("label", &self.label).finish()
    }
}

impl BlobStore {
    pub fn new(config: &BlobStoreConfig) -> CacheResult<Self> {
        match config {
            BlobStoreConfig::Local { root } => Self::local(root.clone()),
            BlobStoreConfig::Memory => Ok(Self::in_memory()),
        }
    }

    /// Store blobs as files under `root`, creating it if needed.
    ///
    /// Writes are staged to a temporary file and renamed into place, so a
    /// reader never sees a half-written entry.
    pub fn local(root: impl Into<PathBuf>) -> CacheResult<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root).map_err(|e| {
            CacheError::Storage(format!("Failed to create cache root {}: {}", root.display(), e))
        })?;
        let store = LocalFileSystem::new_with_prefix(&root).map_err(|e| {
            CacheError::Storage(format!("Failed to open cache root {}: {}", root.display(), e))
        })?;
        Ok(Self {
            store: Arc::new(store),
            label: root.display().to_string(),
        })
    }

    pub fn in_memory() -> Self {
        Self {
            store: Arc::new(InMemory::new()),
            label: "memory".to_string(),
        }
    }

    /// Wrap an existing store.
    pub fn from_store(store: Arc<dyn ObjectStore>, label: impl Into<String>) -> Self {
        Self {
            store,
            label: label.into(),
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// Write bytes to a key, replacing any previous blob.
    #[instrument(skip(self, data), fields(store = %self.label, key = %key))]
    pub async fn put(&self, key: &str, data: Bytes) -> CacheResult<()> {
        let location = Path::from(key);
        debug!(size = data.len(), "Writing blob");

        self.store
            .put(&location, data.into())
            .await
            .map_err(|e| CacheError::Write(format!("Failed to write {}: {}", key, e)))?;

        Ok(())
    }

    /// Read a blob; `Ok(None)` when the key does not exist.
    #[instrument(skip(self), fields(store = %self.label, key = %key))]
    pub async fn get(&self, key: &str) -> CacheResult<Option<Bytes>> {
        let location = Path::from(key);

        let result = match self.store.get(&location).await {
            Ok(result) => result,
            Err(object_store::Error::NotFound { .. }) => return Ok(None),
            Err(e) => {
                return Err(CacheError::Storage(format!("Failed to read {}: {}", key, e)));
            }
        };

        let bytes = result
            .bytes()
            .await
            .map_err(|e| CacheError::Storage(format!("Failed to read bytes of {}: {}", key, e)))?;

        debug!(size = bytes.len(), "Read blob");
        Ok(Some(bytes))
    }

    pub async fn exists(&self, key: &str) -> CacheResult<bool> {
        let location = Path::from(key);

        match self.store.head(&location).await {
            Ok(_) => Ok(true),
            Err(object_store::Error::NotFound { .. }) => Ok(false),
            Err(e) => Err(CacheError::Storage(format!("Failed to check {}: {}", key, e))),
        }
    }

    /// Keys under a prefix.
    pub async fn list(&self, prefix: &str) -> CacheResult<Vec<String>> {
        use futures::TryStreamExt;

        let prefix_path = Path::from(prefix);
        let mut keys = Vec::new();

        let mut stream = self.store.list(Some(&prefix_path));
        while let Some(meta) = stream
            .try_next()
            .await
            .map_err(|e| CacheError::Storage(format!("List failed: {}", e)))?
        {
            keys.push(meta.location.to_string());
        }

        keys.sort();
        Ok(keys)
    }

    /// Delete a blob. Deleting a missing key is not an error.
    #[instrument(skip(self), fields(store = %self.label, key = %key))]
    pub async fn delete(&self, key: &str) -> CacheResult<()> {
        let location = Path::from(key);

        match self.store.delete(&location).await {
            Ok(()) | Err(object_store::Error::NotFound { .. }) => Ok(()),
            Err(e) => Err(CacheError::Storage(format!("Failed to delete {}: {}", key, e))),
        }
    }

    /// Total size and blob count.
    pub async fn stats(&self) -> CacheResult<StorageStats> {
        use futures::TryStreamExt;

        let mut total_size: u64 = 0;
        let mut object_count: u64 = 0;

        let mut stream = self.store.list(None);
        while let Some(meta) = stream
            .try_next()
            .await
            .map_err(|e| CacheError::Storage(format!("List failed: {}", e)))?
        {
            total_size += meta.size as u64;
            object_count += 1;
        }

        Ok(StorageStats {
            total_size,
            object_count,
            store: self.label.clone(),
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageStats {
    pub total_size: u64,
    pub object_count: u64,
    pub store: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_get_missing_is_none() {
        let store = BlobStore::in_memory();
        assert!(store.get("east/none.grst").await.unwrap().is_none());
        assert!(!store.exists("east/none.grst").await.unwrap());
        store.delete("east/none.grst").await.unwrap();
    }

    #[tokio::test]
    async fn test_local_store_nested_keys() {
        let dir = tempfile::tempdir().unwrap();
        let store = BlobStore::local(dir.path().join("cache")).unwrap();

        store
            .put("east/full-disk/C13/x2/2019/03/01/1700.grst", Bytes::from_static(b"abc"))
            .await
            .unwrap();

        assert!(dir
            .path()
            .join("cache/east/full-disk/C13/x2/2019/03/01/1700.grst")
            .exists());
        assert_eq!(
            store.list("east/full-disk").await.unwrap(),
            vec!["east/full-disk/C13/x2/2019/03/01/1700.grst".to_string()]
        );

        let stats = store.stats().await.unwrap();
        assert_eq!(stats.object_count, 1);
        assert_eq!(stats.total_size, 3);
    }
}
