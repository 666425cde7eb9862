//! Piped adapter: one endpoint per worker, one consumer
//!
//! Same contract as the queued topology, trading the central FIFO for a
//! dedicated duplex channel per worker. A single consumer task owns the
//! sole [`DirectBackend`] and multiplexes every endpoint with a fair
//! round-robin poll; per-endpoint order is preserved and cross-endpoint
//! interleaving is arrival order. Each endpoint shuts down with its own
//! sentinel; the consumer exits once registration is closed and every
//! pipe has drained.

use crate::backend::{LoadMode, LoadedLeaves, StorageBackend, StoreBatch, WriteMode};
use crate::direct::DirectBackend;
use crate::error::StorageError;
use crate::queued::QueueMessage;
use async_trait::async_trait;
use futures::future::poll_fn;
use parking_lot::Mutex;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::sync::{mpsc, oneshot};

/// Per-worker endpoint into the pipe consumer
#[derive(Debug)]
pub struct PipeEndpoint {
    tx: mpsc::Sender<QueueMessage>,
}

/// Pipe hub: registers endpoints and acts as the coordinator's own
/// endpoint
#[derive(Debug)]
pub struct PipedBackend {
    ctrl: Mutex<Option<mpsc::UnboundedSender<mpsc::Receiver<QueueMessage>>>>,
    capacity: usize,
    local: PipeEndpoint,
}

/// Consumer task state; owns the only direct instance
#[derive(Debug)]
pub struct PipeConsumer {
    ctrl_rx: mpsc::UnboundedReceiver<mpsc::Receiver<QueueMessage>>,
    ctrl_closed: bool,
    pipes: Vec<Option<mpsc::Receiver<QueueMessage>>>,
    open: usize,
    cursor: usize,
    inner: DirectBackend,
}

enum PipeEvent {
    Register(mpsc::Receiver<QueueMessage>),
    Message(usize, QueueMessage),
}

/// Build a piped topology over one physical store
///
/// The caller spawns [`PipeConsumer::run`]; workers obtain endpoints via
/// [`StorageBackend::worker_handle`] on the hub.
#[must_use]
pub fn piped(inner: DirectBackend, capacity: usize) -> (Arc<PipedBackend>, PipeConsumer) {
    let (ctrl_tx, ctrl_rx) = mpsc::unbounded_channel();
    let capacity = capacity.max(1);

    let (local_tx, local_rx) = mpsc::channel(capacity);
    let _ = ctrl_tx.send(local_rx);

    let hub = Arc::new(PipedBackend {
        ctrl: Mutex::new(Some(ctrl_tx)),
        capacity,
        local: PipeEndpoint { tx: local_tx },
    });
    let consumer = PipeConsumer {
        ctrl_rx,
        ctrl_closed: false,
        pipes: Vec::new(),
        open: 0,
        cursor: 0,
        inner,
    };
    (hub, consumer)
}

impl PipedBackend {
    /// Register a dedicated endpoint for one worker
    ///
    /// # Errors
    /// [`StorageError::ShuttingDown`] once registration is closed.
    pub fn register(&self) -> Result<PipeEndpoint, StorageError> {
        let guard = self.ctrl.lock();
        let ctrl = guard.as_ref().ok_or(StorageError::ShuttingDown)?;
        let (tx, rx) = mpsc::channel(self.capacity);
        ctrl.send(rx).map_err(|_| StorageError::ShuttingDown)?;
        Ok(PipeEndpoint { tx })
    }

    /// Stop accepting new endpoints
    pub fn close_registration(&self) {
        self.ctrl.lock().take();
    }
}

impl PipeConsumer {
    fn poll_next(&mut self, cx: &mut Context<'_>) -> Poll<Option<PipeEvent>> {
        if !self.ctrl_closed {
            match self.ctrl_rx.poll_recv(cx) {
                Poll::Ready(Some(rx)) => return Poll::Ready(Some(PipeEvent::Register(rx))),
                Poll::Ready(None) => self.ctrl_closed = true,
                Poll::Pending => {}
            }
        }

        let n = self.pipes.len();
        if n > 0 {
            for offset in 0..n {
                let i = (self.cursor + offset) % n;
                let Some(rx) = self.pipes[i].as_mut() else {
                    continue;
                };
                match rx.poll_recv(cx) {
                    Poll::Ready(Some(msg)) => {
                        self.cursor = (i + 1) % n;
                        return Poll::Ready(Some(PipeEvent::Message(i, msg)));
                    }
                    Poll::Ready(None) => {
                        self.pipes[i] = None;
                        self.open -= 1;
                    }
                    Poll::Pending => {}
                }
            }
        }

        if self.ctrl_closed && self.open == 0 {
            Poll::Ready(None)
        } else {
            Poll::Pending
        }
    }

    /// Serve every endpoint until registration closes and all pipes drain
    ///
    /// Returns the number of store batches applied.
    ///
    /// # Errors
    /// The first underlying store failure stops the consumer.
    pub async fn run(mut self) -> Result<u64, StorageError> {
        let mut applied = 0_u64;
        loop {
            let event = poll_fn(|cx| self.poll_next(cx)).await;
            match event {
                None => break,
                Some(PipeEvent::Register(rx)) => {
                    self.pipes.push(Some(rx));
                    self.open += 1;
                    tracing::debug!(open = self.open, "pipe endpoint registered");
                }
                Some(PipeEvent::Message(i, msg)) => match msg {
                    QueueMessage::Store { batch, mode } => {
                        self.inner.apply(&batch, mode)?;
                        applied += 1;
                    }
                    QueueMessage::Load { path, mode, reply } => {
                        let result = self.inner.read(&path, mode);
                        let _ = reply.send(result);
                    }
                    QueueMessage::Shutdown => {
                        if let Some(rx) = self.pipes[i].as_mut() {
                            rx.close();
                        }
                    }
                },
            }
        }
        tracing::debug!(applied, "pipe consumer finished");
        Ok(applied)
    }
}

impl PipeEndpoint {
    async fn send(&self, msg: QueueMessage) -> Result<(), StorageError> {
        self.tx
            .send(msg)
            .await
            .map_err(|_| StorageError::ShuttingDown)
    }
}

#[async_trait]
impl StorageBackend for PipeEndpoint {
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
        "piped"
    }
}

#[async_trait]
impl StorageBackend for PipedBackend {
    async fn store(&self, batch: StoreBatch, mode: WriteMode) -> Result<(), StorageError> {
        self.local.store(batch, mode).await
    }

    async fn load(&self, path: &str, mode: LoadMode) -> Result<LoadedLeaves, StorageError> {
        self.local.load(path, mode).await
    }

    async fn shutdown(&self) -> Result<(), StorageError> {
        self.close_registration();
        self.local.shutdown().await
    }

    fn worker_handle(self: Arc<Self>) -> Result<Arc<dyn StorageBackend>, StorageError> {
        Ok(Arc::new(self.register()?))
    }

    fn name(&self) -> &'static str {
        "piped"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{BlobStore, LeafData, MemoryStore};
    use pretty_assertions::assert_eq;
    use sweep_tree::Value;

    fn direct_over(store: &Arc<MemoryStore>) -> DirectBackend {
        let blob: Arc<dyn BlobStore> = Arc::clone(store) as _;
        DirectBackend::open(blob).unwrap()
    }

    fn leaf(v: i64) -> LeafData {
        LeafData::new(Value::from(v))
    }

    #[tokio::test]
    async fn hub_store_and_load_round_trip() {
        let store = Arc::new(MemoryStore::new());
        let (hub, consumer) = piped(direct_over(&store), 8);
        let handle = tokio::spawn(consumer.run());

        let mut batch = StoreBatch::new();
        batch.write_leaf("a.x", leaf(1));
        hub.store(batch, WriteMode::Overwrite).await.unwrap();

        let loaded = hub.load("a.x", LoadMode::Single).await.unwrap();
        assert_eq!(loaded[0].1, leaf(1));

        hub.shutdown().await.unwrap();
        drop(hub);
        handle.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn per_worker_endpoints_apply_in_endpoint_order() {
        let store = Arc::new(MemoryStore::new());
        let (hub, consumer) = piped(direct_over(&store), 8);
        let handle = tokio::spawn(consumer.run());

        let mut workers = Vec::new();
        for w in 0..4_i64 {
            let endpoint = Arc::clone(&hub).worker_handle().unwrap();
            workers.push(tokio::spawn(async move {
                for i in 0..5_i64 {
                    let mut batch = StoreBatch::new();
                    batch.write_leaf(format!("w{w}.item"), leaf(i));
                    endpoint.store(batch, WriteMode::Overwrite).await.unwrap();
                }
                endpoint.shutdown().await.unwrap();
            }));
        }
        for worker in workers {
            worker.await.unwrap();
        }

        hub.shutdown().await.unwrap();
        drop(hub);
        let applied = handle.await.unwrap().unwrap();
        assert_eq!(applied, 20);

        // last write per endpoint wins
        for w in 0..4 {
            assert_eq!(store.read_leaf(&format!("w{w}.item")).unwrap(), leaf(4));
        }
    }

    #[tokio::test]
    async fn registration_closes_after_shutdown() {
        let store = Arc::new(MemoryStore::new());
        let (hub, consumer) = piped(direct_over(&store), 4);
        let handle = tokio::spawn(consumer.run());

        hub.shutdown().await.unwrap();
        assert!(matches!(
            hub.register(),
            Err(StorageError::ShuttingDown)
        ));

        drop(hub);
        handle.await.unwrap().unwrap();
    }
}
