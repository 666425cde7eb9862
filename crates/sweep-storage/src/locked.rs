//! Locked adapter: acquire → operate → release
//!
//! Wraps [`DirectBackend`] with a process-shareable mutex. A contending
//! caller blocks; an acquisition that pends past the policy's timeout
//! counts as transient contention and is retried with backoff until the
//! budget escalates it to [`StorageError::Fatal`].

use crate::backend::{LoadMode, LoadedLeaves, StorageBackend, StoreBatch, WriteMode};
use crate::backoff::{with_backoff, RetryPolicy};
use crate::direct::DirectBackend;
use crate::error::StorageError;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tokio::time::timeout;

/// Mutex-guarded adapter for multi-writer topologies within one process
/// group
#[derive(Debug)]
pub struct LockedBackend {
    inner: DirectBackend,
    lock: Arc<Mutex<()>>,
    policy: RetryPolicy,
}

impl LockedBackend {
    /// Guard a direct backend with a fresh mutex
    #[must_use]
    pub fn new(inner: DirectBackend, policy: RetryPolicy) -> Self {
        Self {
            inner,
            lock: Arc::new(Mutex::new(())),
            policy,
        }
    }

    /// Share an existing mutex (several adapters, one physical store)
    #[must_use]
    pub fn with_lock(inner: DirectBackend, lock: Arc<Mutex<()>>, policy: RetryPolicy) -> Self {
        Self {
            inner,
            lock,
            policy,
        }
    }

    /// The shared mutex, for wiring sibling adapters
    #[must_use]
    pub fn lock_handle(&self) -> Arc<Mutex<()>> {
        Arc::clone(&self.lock)
    }

    async fn acquire(&self) -> Result<OwnedMutexGuard<()>, StorageError> {
        let lock = Arc::clone(&self.lock);
        with_backoff(&self.policy, "lock acquisition", || {
            let lock = Arc::clone(&lock);
            async move {
                timeout(self.policy.acquire_timeout, lock.lock_owned())
                    .await
                    .map_err(|_| StorageError::Contention("lock held past timeout".into()))
            }
        })
        .await
    }
}

#[async_trait]
impl StorageBackend for LockedBackend {
    async fn store(&self, batch: StoreBatch, mode: WriteMode) -> Result<(), StorageError> {
        let guard = self.acquire().await?;
        let result = self.inner.apply(&batch, mode);
        drop(guard);
        result
    }

    async fn load(&self, path: &str, mode: LoadMode) -> Result<LoadedLeaves, StorageError> {
        let guard = self.acquire().await?;
        let result = self.inner.read(path, mode);
        drop(guard);
        result
    }

    fn worker_handle(self: Arc<Self>) -> Result<Arc<dyn StorageBackend>, StorageError> {
        Ok(self)
    }

    fn name(&self) -> &'static str {
        "locked"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{LeafData, MemoryStore};
    use std::time::Duration;
    use sweep_tree::Value;

    fn locked() -> Arc<LockedBackend> {
        let direct = DirectBackend::open(Arc::new(MemoryStore::new())).unwrap();
        Arc::new(LockedBackend::new(direct, RetryPolicy::default()))
    }

    #[tokio::test]
    async fn store_load_under_lock() {
        let backend = locked();
        let mut batch = StoreBatch::new();
        batch.write_leaf("a.x", LeafData::new(Value::from(1_i64)));
        backend.store(batch, WriteMode::Overwrite).await.unwrap();

        let loaded = backend.load("a.x", LoadMode::Single).await.unwrap();
        assert_eq!(loaded[0].1.value, Value::from(1_i64));
    }

    #[tokio::test]
    async fn contender_blocks_then_proceeds() {
        let backend = locked();
        let lock = backend.lock_handle();

        let guard = lock.clone().lock_owned().await;
        let contender = {
            let backend = Arc::clone(&backend);
            tokio::spawn(async move {
                let mut batch = StoreBatch::new();
                batch.write_leaf("a.x", LeafData::new(Value::from(2_i64)));
                backend.store(batch, WriteMode::Overwrite).await
            })
        };

        // holder releases well inside the retry budget
        tokio::time::sleep(Duration::from_millis(20)).await;
        drop(guard);

        contender.await.unwrap().unwrap();
        let loaded = backend.load("a.x", LoadMode::Single).await.unwrap();
        assert_eq!(loaded[0].1.value, Value::from(2_i64));
    }

    #[tokio::test]
    async fn exhausted_budget_is_fatal() {
        let direct = DirectBackend::open(Arc::new(MemoryStore::new())).unwrap();
        let policy = RetryPolicy {
            max_attempts: 2,
            initial_delay: Duration::from_millis(1),
            acquire_timeout: Duration::from_millis(5),
            ..RetryPolicy::default()
        };
        let backend = Arc::new(LockedBackend::new(direct, policy));

        // park the lock forever
        let _guard = backend.lock_handle().lock_owned().await;

        let mut batch = StoreBatch::new();
        batch.write_leaf("a.x", LeafData::new(Value::from(1_i64)));
        let result = backend.store(batch, WriteMode::Overwrite).await;
        assert!(matches!(result, Err(StorageError::Fatal(_))));
    }
}
