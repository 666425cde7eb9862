//! Sweep Storage
//!
//! Storage coordination for concurrent parameter studies.
//!
//! # Core Concepts
//!
//! - [`BlobStore`]: the only contract required from the (external)
//!   physical persistence layer; [`MemoryStore`] is the in-memory
//!   reference implementation
//! - [`StorageBackend`]: one polymorphic interface over five concurrency
//!   adapters, chosen once at study setup
//! - [`DirectBackend`]: inline I/O, single active writer only
//! - [`LockedBackend`]: acquire → operate → release behind a shared mutex
//! - [`queued`]: dedicated consumer draining a bounded FIFO of producer
//!   stubs
//! - [`piped`]: per-worker endpoints multiplexed by one consumer
//! - [`NetLockedBackend`] + [`LockBroker`]: mutual exclusion brokered over
//!   TCP for multi-host studies
//!
//! Whichever adapter runs them, identical operation sequences leave the
//! physical store in identical final states.

#![warn(missing_docs)]
#![warn(unreachable_pub)]

mod backend;
mod backoff;
mod direct;
mod error;
mod locked;
mod netlock;
mod piped;
mod queued;
mod store;

pub use backend::{LoadMode, LoadedLeaves, StorageBackend, StoreBatch, StoreOp, WriteMode};
pub use backoff::{with_backoff, RetryPolicy};
pub use direct::DirectBackend;
pub use error::StorageError;
pub use locked::LockedBackend;
pub use netlock::{LockBroker, NetLockedBackend};
pub use piped::{piped, PipeConsumer, PipeEndpoint, PipedBackend};
pub use queued::{queued, QueueConsumer, QueuedBackend};
pub use store::{BlobStore, LeafData, MemoryStore, FORMAT_VERSION, VERSION_ATTR};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
