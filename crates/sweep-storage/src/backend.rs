//! The storage backend interface
//!
//! One polymorphic interface, five concurrency adapters. The adapter is
//! chosen once at study setup and never mixed mid-study; identical
//! operation sequences yield identical final store contents regardless of
//! which adapter executed them.

use crate::error::StorageError;
use crate::store::LeafData;
use async_trait::async_trait;
use std::sync::Arc;

/// How leaf writes treat existing content
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
    /// Keep existing leaves, only add missing ones
    Append,
    /// Replace existing leaves
    Overwrite,
}

/// How loads address the store
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadMode {
    /// Exactly the addressed leaf
    Single,
    /// Every leaf under the addressed prefix
    Subtree,
}

/// One path-addressed operation inside a batch
#[derive(Debug, Clone, PartialEq)]
pub enum StoreOp {
    /// Ensure a group exists
    CreateGroup {
        /// Group path
        path: String,
    },
    /// Write a typed leaf
    WriteLeaf {
        /// Leaf path
        path: String,
        /// Payload and attributes
        data: LeafData,
    },
    /// Remove a leaf or subtree
    Delete {
        /// Doomed path
        path: String,
    },
}

impl StoreOp {
    /// Path the operation addresses
    #[must_use]
    pub fn path(&self) -> &str {
        match self {
            StoreOp::CreateGroup { path }
            | StoreOp::WriteLeaf { path, .. }
            | StoreOp::Delete { path } => path,
        }
    }
}

/// An ordered subtree mutation applied atomically relative to other
/// batches on the same physical store
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StoreBatch {
    /// Operations in application order
    pub ops: Vec<StoreOp>,
}

impl StoreBatch {
    /// Empty batch
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a group creation
    pub fn create_group(&mut self, path: impl Into<String>) {
        self.ops.push(StoreOp::CreateGroup { path: path.into() });
    }

    /// Append a leaf write
    pub fn write_leaf(&mut self, path: impl Into<String>, data: LeafData) {
        self.ops.push(StoreOp::WriteLeaf {
            path: path.into(),
            data,
        });
    }

    /// Append a deletion
    pub fn delete(&mut self, path: impl Into<String>) {
        self.ops.push(StoreOp::Delete { path: path.into() });
    }

    /// Number of operations
    #[must_use]
    pub fn len(&self) -> usize {
        self.ops.len()
    }

    /// Whether the batch carries no operations
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }
}

/// Loaded leaves, path-sorted for subtree loads
pub type LoadedLeaves = Vec<(String, LeafData)>;

/// Storage coordination adapter
///
/// # Safety contract
/// Exactly one adapter instance performs mutating I/O on a physical store
/// at any instant. `store` and `load` are atomic relative to each other
/// per physical store; both may block (on a lock, or on enqueue
/// capacity).
#[async_trait]
pub trait StorageBackend: Send + Sync + std::fmt::Debug {
    /// Apply a batch under the adapter's mutual-exclusion discipline
    ///
    /// # Errors
    /// [`StorageError::Fatal`] once the contention budget is exhausted or
    /// the underlying store fails; [`StorageError::ShuttingDown`] after
    /// the shutdown sentinel.
    async fn store(&self, batch: StoreBatch, mode: WriteMode) -> Result<(), StorageError>;

    /// Read leaves back under the same discipline
    ///
    /// # Errors
    /// [`StorageError::NotFound`] for absent single leaves; transport
    /// errors as for [`Self::store`].
    async fn load(&self, path: &str, mode: LoadMode) -> Result<LoadedLeaves, StorageError>;

    /// Request graceful shutdown (sentinel for consumer topologies)
    ///
    /// Defaults to a no-op for adapters without a consumer task.
    ///
    /// # Errors
    /// Transport failure delivering the sentinel.
    async fn shutdown(&self) -> Result<(), StorageError> {
        Ok(())
    }

    /// Handle for one worker
    ///
    /// Shared-lock and queue topologies hand back the shared instance;
    /// the pipe topology registers a dedicated per-worker endpoint.
    ///
    /// # Errors
    /// [`StorageError::ShuttingDown`] when no further workers can join.
    fn worker_handle(self: Arc<Self>) -> Result<Arc<dyn StorageBackend>, StorageError>;

    /// Adapter name (for logs/diagnostics)
    fn name(&self) -> &'static str;
}
