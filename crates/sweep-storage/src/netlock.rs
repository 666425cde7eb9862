//! NetLocked adapter: mutual exclusion brokered over the network
//!
//! Like the locked adapter, but the mutex lives in a small TCP lock
//! service so independent hosts can coordinate on one physical store. The
//! wire protocol is line-delimited JSON: a client connects, requests the
//! lock, blocks until the broker grants it (FIFO), performs its I/O and
//! releases. A dropped connection releases implicitly, so a crashed
//! holder never wedges the study.
//!
//! Connection failures are transient and retried with the same bounded
//! backoff as the locked adapter; budget exhaustion is fatal.

use crate::backend::{LoadMode, LoadedLeaves, StorageBackend, StoreBatch, WriteMode};
use crate::backoff::{with_backoff, RetryPolicy};
use crate::direct::DirectBackend;
use crate::error::StorageError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines, ReadHalf, WriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{oneshot, Mutex};
use uuid::Uuid;

#[derive(Debug, Serialize, Deserialize)]
struct LockRequest {
    client: Uuid,
    cmd: LockCmd,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
enum LockCmd {
    Acquire,
    Release,
}

#[derive(Debug, Serialize, Deserialize)]
struct LockReply {
    granted: bool,
}

#[derive(Debug, Default)]
struct BrokerState {
    holder: Option<Uuid>,
    waiters: VecDeque<(Uuid, oneshot::Sender<()>)>,
}

impl BrokerState {
    /// Grant to the next waiter, or free the lock
    fn release(&mut self) {
        loop {
            match self.waiters.pop_front() {
                Some((next, grant)) => {
                    // a waiter that hung up forfeits its turn
                    if grant.send(()).is_ok() {
                        self.holder = Some(next);
                        return;
                    }
                }
                None => {
                    self.holder = None;
                    return;
                }
            }
        }
    }
}

/// Small TCP lock service
///
/// One broker per physical store. Grants are strictly FIFO.
#[derive(Debug)]
pub struct LockBroker {
    listener: TcpListener,
    state: Arc<Mutex<BrokerState>>,
}

impl LockBroker {
    /// Bind the broker to an address (use port 0 for an ephemeral port)
    ///
    /// # Errors
    /// [`StorageError::Fatal`] when the bind fails.
    pub async fn bind(addr: &str) -> Result<Self, StorageError> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| StorageError::Fatal(format!("broker bind {addr}: {e}")))?;
        Ok(Self {
            listener,
            state: Arc::new(Mutex::new(BrokerState::default())),
        })
    }

    /// Address the broker actually listens on
    ///
    /// # Errors
    /// [`StorageError::Fatal`] when the socket has no local address.
    pub fn local_addr(&self) -> Result<SocketAddr, StorageError> {
        self.listener
            .local_addr()
            .map_err(|e| StorageError::Fatal(format!("broker local addr: {e}")))
    }

    /// Accept and serve clients until the task is dropped
    pub async fn run(self) {
        loop {
            match self.listener.accept().await {
                Ok((stream, peer)) => {
                    tracing::debug!(%peer, "lock broker accepted client");
                    let state = Arc::clone(&self.state);
                    tokio::spawn(serve_client(stream, state));
                }
                Err(e) => {
                    tracing::warn!(error = %e, "lock broker accept failed");
                }
            }
        }
    }
}

async fn serve_client(stream: TcpStream, state: Arc<Mutex<BrokerState>>) {
    let (read, mut write) = tokio::io::split(stream);
    let mut lines = BufReader::new(read).lines();
    let mut held_by: Option<Uuid> = None;

    while let Ok(Some(line)) = lines.next_line().await {
        let Ok(request) = serde_json::from_str::<LockRequest>(&line) else {
            tracing::warn!("lock broker dropped malformed request");
            break;
        };
        match request.cmd {
            LockCmd::Acquire => {
                let pending = {
                    let mut guard = state.lock().await;
                    if guard.holder.is_none() {
                        guard.holder = Some(request.client);
                        None
                    } else {
                        let (tx, rx) = oneshot::channel();
                        guard.waiters.push_back((request.client, tx));
                        Some(rx)
                    }
                };
                if let Some(rx) = pending {
                    // blocks this client until the holder releases
                    if rx.await.is_err() {
                        break;
                    }
                }
                held_by = Some(request.client);
                if write_reply(&mut write, true).await.is_err() {
                    break;
                }
            }
            LockCmd::Release => {
                let mut guard = state.lock().await;
                if guard.holder == Some(request.client) {
                    guard.release();
                    held_by = None;
                }
                drop(guard);
                if write_reply(&mut write, false).await.is_err() {
                    break;
                }
            }
        }
    }

    // disconnect releases an abandoned hold
    if let Some(client) = held_by {
        let mut guard = state.lock().await;
        if guard.holder == Some(client) {
            tracing::debug!(%client, "releasing lock abandoned by disconnect");
            guard.release();
        }
    }
}

async fn write_reply(write: &mut WriteHalf<TcpStream>, granted: bool) -> std::io::Result<()> {
    let mut line = serde_json::to_string(&LockReply { granted }).unwrap_or_default();
    line.push('\n');
    write.write_all(line.as_bytes()).await
}

/// One acquire/release cycle over a broker connection
struct NetLockGuard {
    lines: Lines<BufReader<ReadHalf<TcpStream>>>,
    write: WriteHalf<TcpStream>,
    client: Uuid,
}

impl NetLockGuard {
    async fn acquire(addr: &str, client: Uuid) -> Result<Self, StorageError> {
        let stream = TcpStream::connect(addr)
            .await
            .map_err(|e| StorageError::Contention(format!("broker connect {addr}: {e}")))?;
        let (read, write) = tokio::io::split(stream);
        let mut guard = Self {
            lines: BufReader::new(read).lines(),
            write,
            client,
        };
        guard.send(LockCmd::Acquire).await?;
        let reply = guard.read_reply().await?;
        if !reply.granted {
            return Err(StorageError::Contention("broker refused grant".into()));
        }
        Ok(guard)
    }

    async fn release(mut self) -> Result<(), StorageError> {
        self.send(LockCmd::Release).await?;
        self.read_reply().await?;
        Ok(())
    }

    async fn send(&mut self, cmd: LockCmd) -> Result<(), StorageError> {
        let request = LockRequest {
            client: self.client,
            cmd,
        };
        let mut line = serde_json::to_string(&request)
            .map_err(|e| StorageError::Fatal(format!("encode lock request: {e}")))?;
        line.push('\n');
        self.write
            .write_all(line.as_bytes())
            .await
            .map_err(|e| StorageError::Contention(format!("broker write: {e}")))
    }

    async fn read_reply(&mut self) -> Result<LockReply, StorageError> {
        let line = self
            .lines
            .next_line()
            .await
            .map_err(|e| StorageError::Contention(format!("broker read: {e}")))?
            .ok_or_else(|| StorageError::Contention("broker hung up".into()))?;
        serde_json::from_str(&line)
            .map_err(|e| StorageError::Fatal(format!("decode lock reply: {e}")))
    }
}

/// Network-brokered locked adapter
#[derive(Debug)]
pub struct NetLockedBackend {
    inner: DirectBackend,
    broker_addr: String,
    policy: RetryPolicy,
    client: Uuid,
}

impl NetLockedBackend {
    /// Adapter coordinating through the broker at `broker_addr`
    #[must_use]
    pub fn new(inner: DirectBackend, broker_addr: impl Into<String>, policy: RetryPolicy) -> Self {
        Self {
            inner,
            broker_addr: broker_addr.into(),
            policy,
            client: Uuid::new_v4(),
        }
    }

    async fn acquire(&self) -> Result<NetLockGuard, StorageError> {
        with_backoff(&self.policy, "net lock acquisition", || {
            NetLockGuard::acquire(&self.broker_addr, self.client)
        })
        .await
    }
}

#[async_trait]
impl StorageBackend for NetLockedBackend {
    async fn store(&self, batch: StoreBatch, mode: WriteMode) -> Result<(), StorageError> {
        let guard = self.acquire().await?;
        let result = self.inner.apply(&batch, mode);
        if let Err(e) = guard.release().await {
            tracing::warn!(error = %e, "net lock release failed; broker reclaims on disconnect");
        }
        result
    }

    async fn load(&self, path: &str, mode: LoadMode) -> Result<LoadedLeaves, StorageError> {
        let guard = self.acquire().await?;
        let result = self.inner.read(path, mode);
        if let Err(e) = guard.release().await {
            tracing::warn!(error = %e, "net lock release failed; broker reclaims on disconnect");
        }
        result
    }

    fn worker_handle(self: Arc<Self>) -> Result<Arc<dyn StorageBackend>, StorageError> {
        Ok(self)
    }

    fn name(&self) -> &'static str {
        "net_locked"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{BlobStore, LeafData, MemoryStore};
    use sweep_tree::Value;

    async fn broker_addr() -> String {
        let broker = LockBroker::bind("127.0.0.1:0").await.unwrap();
        let addr = broker.local_addr().unwrap();
        tokio::spawn(broker.run());
        addr.to_string()
    }

    fn direct_over(store: &Arc<MemoryStore>) -> DirectBackend {
        let blob: Arc<dyn BlobStore> = Arc::clone(store) as _;
        DirectBackend::open(blob).unwrap()
    }

    #[tokio::test]
    async fn store_through_broker() {
        let addr = broker_addr().await;
        let store = Arc::new(MemoryStore::new());
        let backend =
            NetLockedBackend::new(direct_over(&store), addr, RetryPolicy::default());

        let mut batch = StoreBatch::new();
        batch.write_leaf("a.x", LeafData::new(Value::from(1_i64)));
        backend.store(batch, WriteMode::Overwrite).await.unwrap();

        let loaded = backend.load("a.x", LoadMode::Single).await.unwrap();
        assert_eq!(loaded[0].1.value, Value::from(1_i64));
    }

    #[tokio::test]
    async fn two_clients_serialize_through_broker() {
        let addr = broker_addr().await;
        let store = Arc::new(MemoryStore::new());

        let mut handles = Vec::new();
        for client in 0..2_i64 {
            let backend = Arc::new(NetLockedBackend::new(
                direct_over(&store),
                addr.clone(),
                RetryPolicy::default(),
            ));
            handles.push(tokio::spawn(async move {
                for i in 0..10_i64 {
                    let mut batch = StoreBatch::new();
                    batch.write_leaf(
                        format!("c{client}.item"),
                        LeafData::new(Value::from(i)),
                    );
                    backend.store(batch, WriteMode::Overwrite).await.unwrap();
                }
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        for client in 0..2 {
            let leaf = store.read_leaf(&format!("c{client}.item")).unwrap();
            assert_eq!(leaf.value, Value::from(9_i64));
        }
    }

    #[tokio::test]
    async fn unreachable_broker_goes_fatal() {
        let store = Arc::new(MemoryStore::new());
        let policy = RetryPolicy {
            max_attempts: 2,
            initial_delay: std::time::Duration::from_millis(1),
            ..RetryPolicy::default()
        };
        // nothing listens on this port
        let backend = NetLockedBackend::new(direct_over(&store), "127.0.0.1:1", policy);

        let mut batch = StoreBatch::new();
        batch.write_leaf("a.x", LeafData::new(Value::from(1_i64)));
        let result = backend.store(batch, WriteMode::Overwrite).await;
        assert!(matches!(result, Err(StorageError::Fatal(_))));
    }
}
