//! Queued adapter: one consumer, many producer stubs
//!
//! A dedicated consumer task owns the sole [`DirectBackend`] and drains a
//! bounded FIFO. Producer stubs block only on enqueue capacity
//! (backpressure), never on I/O. Loads round-trip through the same FIFO
//! with a oneshot reply so the consumer stays the only store toucher.
//!
//! Ordering: per-producer enqueue order is preserved; cross-producer
//! interleaving is enqueue-time order and never changes once enqueued.
//! A sentinel message closes the queue and drains what was already
//! enqueued before the consumer exits.

use crate::backend::{LoadMode, LoadedLeaves, StorageBackend, StoreBatch, WriteMode};
use crate::direct::DirectBackend;
use crate::error::StorageError;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};

/// Messages flowing from producer stubs to the consumer
#[derive(Debug)]
pub(crate) enum QueueMessage {
    /// Apply a batch
    Store {
        /// Operations to apply
        batch: StoreBatch,
        /// Write mode
        mode: WriteMode,
    },
    /// Read leaves and reply
    Load {
        /// Addressed path
        path: String,
        /// Load mode
        mode: LoadMode,
        /// Reply channel
        reply: oneshot::Sender<Result<LoadedLeaves, StorageError>>,
    },
    /// Graceful shutdown sentinel: close intake, drain, exit
    Shutdown,
}

/// Producer-side stub handed to workers
#[derive(Debug, Clone)]
pub struct QueuedBackend {
    tx: mpsc::Sender<QueueMessage>,
}

/// Consumer task state; owns the only direct instance
#[derive(Debug)]
pub struct QueueConsumer {
    rx: mpsc::Receiver<QueueMessage>,
    inner: DirectBackend,
}

/// Build a queued topology over one physical store
///
/// The caller spawns [`QueueConsumer::run`] on its runtime and shares the
/// returned stub (it is `Clone`) among workers.
#[must_use]
pub fn queued(inner: DirectBackend, capacity: usize) -> (QueuedBackend, QueueConsumer) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (QueuedBackend { tx }, QueueConsumer { rx, inner })
}

impl QueueConsumer {
    /// Drain the FIFO until the sentinel (or every producer) closes it
    ///
    /// Returns the number of store batches applied.
    ///
    /// # Errors
    /// The first underlying store failure stops the consumer; producers
    /// observe [`StorageError::ShuttingDown`] from then on.
    pub async fn run(mut self) -> Result<u64, StorageError> {
        let mut applied = 0_u64;
        while let Some(msg) = self.rx.recv().await {
            match msg {
                QueueMessage::Store { batch, mode } => {
                    self.inner.apply(&batch, mode)?;
                    applied += 1;
                }
                QueueMessage::Load { path, mode, reply } => {
                    let result = self.inner.read(&path, mode);
                    // a dropped requester is not the consumer's problem
                    let _ = reply.send(result);
                }
                QueueMessage::Shutdown => {
                    tracing::debug!(applied, "queue consumer draining after sentinel");
                    self.rx.close();
                }
            }
        }
        tracing::debug!(applied, "queue consumer finished");
        Ok(applied)
    }
}

impl QueuedBackend {
    async fn send(&self, msg: QueueMessage) -> Result<(), StorageError> {
        self.tx
            .send(msg)
            .await
            .map_err(|_| StorageError::ShuttingDown)
    }
}

#[async_trait]
impl StorageBackend for QueuedBackend {
    async fn store(&self, batch: StoreBatch, mode: WriteMode) -> Result<(), StorageError> {
        self.send(QueueMessage::Store { batch, mode }).await
    }

    async fn load(&self, path: &str, mode: LoadMode) -> Result<LoadedLeaves, StorageError> {
        let (reply, rx) = oneshot::channel();
        self.send(QueueMessage::Load {
            path: path.to_string(),
            mode,
            reply,
        })
        .await?;
        rx.await.map_err(|_| StorageError::ShuttingDown)?
    }

    async fn shutdown(&self) -> Result<(), StorageError> {
        self.send(QueueMessage::Shutdown).await
    }

    fn worker_handle(self: Arc<Self>) -> Result<Arc<dyn StorageBackend>, StorageError> {
        Ok(self)
    }

    fn name(&self) -> &'static str {
        "queued"
    }
}
