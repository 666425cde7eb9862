//! Study configuration

use sweep_storage::RetryPolicy;

/// Storage topology selected once at setup and never mixed mid-study
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BackendKind {
    /// Inline I/O; single active writer only
    Direct,
    /// Shared mutex around one direct instance
    #[default]
    Locked,
    /// Dedicated consumer draining a bounded FIFO
    Queued,
    /// One endpoint per worker, one consumer
    Piped,
    /// Mutual exclusion brokered over TCP
    NetLocked,
}

/// Configuration for a study run
#[derive(Debug, Clone)]
pub struct StudyConfig {
    /// Maximum concurrently executing run bodies
    pub max_workers: usize,
    /// Storage topology
    pub backend: BackendKind,
    /// Queue/pipe capacity (enqueue backpressure threshold)
    pub queue_capacity: usize,
    /// Contention retry budget and backoff curve
    pub retry: RetryPolicy,
    /// Lock broker address for [`BackendKind::NetLocked`]
    pub broker_addr: Option<String>,
}

impl Default for StudyConfig {
    fn default() -> Self {
        Self {
            max_workers: 4,
            backend: BackendKind::default(),
            queue_capacity: 64,
            retry: RetryPolicy::default(),
            broker_addr: None,
        }
    }
}

impl StudyConfig {
    /// Default configuration
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the worker count
    #[must_use]
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.max_workers = workers.max(1);
        self
    }

    /// Select the storage topology
    #[must_use]
    pub fn with_backend(mut self, backend: BackendKind) -> Self {
        self.backend = backend;
        self
    }

    /// Set the queue/pipe capacity
    #[must_use]
    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity.max(1);
        self
    }

    /// Set the retry policy
    #[must_use]
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Point [`BackendKind::NetLocked`] at a broker
    #[must_use]
    pub fn with_broker(mut self, addr: impl Into<String>) -> Self {
        self.broker_addr = Some(addr.into());
        self
    }
}
