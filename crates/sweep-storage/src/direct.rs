//! Direct adapter: inline I/O, no guard
//!
//! Valid only while a single writer is active. Every other adapter builds
//! on this one, so the format-version check lives in [`DirectBackend::open`]
//! and runs exactly once per topology.

use crate::backend::{LoadMode, LoadedLeaves, StorageBackend, StoreBatch, StoreOp, WriteMode};
use crate::error::StorageError;
use crate::store::{BlobStore, FORMAT_VERSION};
use async_trait::async_trait;
use std::sync::Arc;

/// Unguarded inline adapter over one physical store
#[derive(Debug, Clone)]
pub struct DirectBackend {
    store: Arc<dyn BlobStore>,
}

impl DirectBackend {
    /// Open the store, verifying its format stamp
    ///
    /// # Errors
    /// [`StorageError::VersionMismatch`] when the stamp disagrees with
    /// [`FORMAT_VERSION`] — surfaced, never silently upgraded.
    pub fn open(store: Arc<dyn BlobStore>) -> Result<Self, StorageError> {
        let found = store.format_version();
        if found != FORMAT_VERSION {
            return Err(StorageError::VersionMismatch {
                expected: FORMAT_VERSION.to_string(),
                found,
            });
        }
        Ok(Self { store })
    }

    /// The underlying physical store
    #[must_use]
    pub fn blob_store(&self) -> &Arc<dyn BlobStore> {
        &self.store
    }

    /// Apply a batch synchronously, honoring the write mode
    ///
    /// # Errors
    /// First failing operation aborts the rest of the batch.
    pub fn apply(&self, batch: &StoreBatch, mode: WriteMode) -> Result<(), StorageError> {
        for op in &batch.ops {
            match op {
                StoreOp::CreateGroup { path } => self.store.create_group(path)?,
                StoreOp::WriteLeaf { path, data } => {
                    if mode == WriteMode::Append && self.store.exists(path) {
                        continue;
                    }
                    self.store.write_leaf(path, data.clone())?;
                }
                StoreOp::Delete { path } => self.store.delete(path)?,
            }
        }
        Ok(())
    }

    /// Read synchronously, honoring the load mode
    ///
    /// # Errors
    /// [`StorageError::NotFound`] for an absent single leaf.
    pub fn read(&self, path: &str, mode: LoadMode) -> Result<LoadedLeaves, StorageError> {
        match mode {
            LoadMode::Single => Ok(vec![(path.to_string(), self.store.read_leaf(path)?)]),
            LoadMode::Subtree => {
                let mut out = Vec::new();
                for leaf_path in self.store.list(path) {
                    let data = self.store.read_leaf(&leaf_path)?;
                    out.push((leaf_path, data));
                }
                Ok(out)
            }
        }
    }
}

#[async_trait]
impl StorageBackend for DirectBackend {
    async fn store(&self, batch: StoreBatch, mode: WriteMode) -> Result<(), StorageError> {
        self.apply(&batch, mode)
    }

    async fn load(&self, path: &str, mode: LoadMode) -> Result<LoadedLeaves, StorageError> {
        self.read(path, mode)
    }

    fn worker_handle(self: Arc<Self>) -> Result<Arc<dyn StorageBackend>, StorageError> {
        Ok(self)
    }

    fn name(&self) -> &'static str {
        "direct"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{LeafData, MemoryStore};
    use pretty_assertions::assert_eq;
    use sweep_tree::Value;

    fn backend() -> DirectBackend {
        DirectBackend::open(Arc::new(MemoryStore::new())).unwrap()
    }

    fn leaf(v: i64) -> LeafData {
        LeafData::new(Value::from(v))
    }

    #[test]
    fn open_rejects_version_drift() {
        let store = Arc::new(MemoryStore::with_version("0.4"));
        let result = DirectBackend::open(store);
        assert!(matches!(
            result,
            Err(StorageError::VersionMismatch { .. })
        ));
    }

    #[tokio::test]
    async fn store_and_load_round_trip() {
        let backend = backend();
        let mut batch = StoreBatch::new();
        batch.create_group("results");
        batch.write_leaf("results.z", leaf(6));
        backend.store(batch, WriteMode::Overwrite).await.unwrap();

        let loaded = backend.load("results.z", LoadMode::Single).await.unwrap();
        assert_eq!(loaded, vec![("results.z".to_string(), leaf(6))]);
    }

    #[tokio::test]
    async fn append_preserves_existing_leaves() {
        let backend = backend();
        let mut batch = StoreBatch::new();
        batch.write_leaf("a.x", leaf(1));
        backend.store(batch, WriteMode::Overwrite).await.unwrap();

        let mut batch = StoreBatch::new();
        batch.write_leaf("a.x", leaf(99));
        batch.write_leaf("a.y", leaf(2));
        backend.store(batch, WriteMode::Append).await.unwrap();

        let loaded = backend.load("a", LoadMode::Subtree).await.unwrap();
        assert_eq!(
            loaded,
            vec![
                ("a.x".to_string(), leaf(1)),
                ("a.y".to_string(), leaf(2)),
            ]
        );
    }

    #[tokio::test]
    async fn overwrite_replaces() {
        let backend = backend();
        let mut batch = StoreBatch::new();
        batch.write_leaf("a.x", leaf(1));
        backend.store(batch, WriteMode::Overwrite).await.unwrap();

        let mut batch = StoreBatch::new();
        batch.write_leaf("a.x", leaf(99));
        backend.store(batch, WriteMode::Overwrite).await.unwrap();

        let loaded = backend.load("a.x", LoadMode::Single).await.unwrap();
        assert_eq!(loaded[0].1, leaf(99));
    }

    #[tokio::test]
    async fn delete_inside_batch() {
        let backend = backend();
        let mut batch = StoreBatch::new();
        batch.write_leaf("a.x", leaf(1));
        batch.delete("a.x");
        backend.store(batch, WriteMode::Overwrite).await.unwrap();

        let result = backend.load("a.x", LoadMode::Single).await;
        assert!(matches!(result, Err(StorageError::NotFound(_))));
    }
}
