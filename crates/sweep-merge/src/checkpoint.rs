//! Merge checkpoints
//!
//! The checkpoint record lives inside the target store, so a resumed
//! merge needs no side files: completed source runs are skipped instead
//! of re-copied.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::Arc;
use sweep_storage::{LeafData, LoadMode, StorageBackend, StorageError, StoreBatch, WriteMode};
use sweep_tree::Value;

/// Leaf path carrying the checkpoint inside the target store
pub const CHECKPOINT_PATH: &str = "config.merge.checkpoint";

/// Relocation progress for one source trajectory
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MergeCheckpoint {
    /// Source trajectory name the checkpoint belongs to
    pub source: String,
    /// Run-index offset the relocation started from
    pub offset: usize,
    /// Source run indices whose subtrees finished relocating
    pub completed: BTreeSet<usize>,
}

impl MergeCheckpoint {
    /// Fresh checkpoint for a source/offset pair
    #[must_use]
    pub fn new(source: impl Into<String>, offset: usize) -> Self {
        Self {
            source: source.into(),
            offset,
            completed: BTreeSet::new(),
        }
    }

    /// Load the checkpoint from a target store, if one is present
    pub async fn load(backend: &Arc<dyn StorageBackend>) -> Option<Self> {
        let leaves = backend.load(CHECKPOINT_PATH, LoadMode::Single).await.ok()?;
        let (_, data) = leaves.into_iter().next()?;
        match data.value {
            Value::Json(json) => serde_json::from_value(json).ok(),
            _ => None,
        }
    }

    /// Persist the checkpoint into the target store
    ///
    /// # Errors
    /// Storage transport failures.
    pub async fn save(&self, backend: &Arc<dyn StorageBackend>) -> Result<(), StorageError> {
        let json = serde_json::to_value(self)
            .map_err(|e| StorageError::Fatal(format!("encode checkpoint: {e}")))?;
        let mut batch = StoreBatch::new();
        batch.write_leaf(CHECKPOINT_PATH, LeafData::new(Value::Json(json)));
        backend.store(batch, WriteMode::Overwrite).await
    }

    /// Remove the checkpoint after a completed merge
    ///
    /// # Errors
    /// Storage transport failures.
    pub async fn clear(backend: &Arc<dyn StorageBackend>) -> Result<(), StorageError> {
        let mut batch = StoreBatch::new();
        batch.delete(CHECKPOINT_PATH);
        backend.store(batch, WriteMode::Overwrite).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sweep_storage::{BlobStore, DirectBackend, MemoryStore};

    fn backend() -> Arc<dyn StorageBackend> {
        let store: Arc<dyn BlobStore> = Arc::new(MemoryStore::new());
        Arc::new(DirectBackend::open(store).unwrap())
    }

    #[tokio::test]
    async fn save_load_clear_cycle() {
        let backend = backend();
        assert!(MergeCheckpoint::load(&backend).await.is_none());

        let mut checkpoint = MergeCheckpoint::new("source_study", 4);
        checkpoint.completed.insert(0);
        checkpoint.completed.insert(1);
        checkpoint.save(&backend).await.unwrap();

        let loaded = MergeCheckpoint::load(&backend).await.unwrap();
        assert_eq!(loaded, checkpoint);

        MergeCheckpoint::clear(&backend).await.unwrap();
        assert!(MergeCheckpoint::load(&backend).await.is_none());
    }
}
