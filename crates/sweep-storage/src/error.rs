//! Error types for the storage layer
//!
//! Contention is transient and retried with bounded backoff; everything
//! else surfaces immediately. `is_transient()` drives the retry loop the
//! same way the orchestrator classifies retryable failures.

/// Errors raised by stores and storage backends
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// Transient contention (lock busy, queue full); retried with backoff
    #[error("storage contention: {0}")]
    Contention(String),

    /// Retry budget exhausted or underlying I/O failure; never retried
    #[error("storage fatal: {0}")]
    Fatal(String),

    /// Path missing from the physical store
    #[error("path not found in store: {0}")]
    NotFound(String),

    /// Store written by an incompatible format version
    #[error("store format version mismatch: store has {found}, library speaks {expected}")]
    VersionMismatch {
        /// Version this library writes
        expected: String,
        /// Version found in the store
        found: String,
    },

    /// Backend received the shutdown sentinel; no further operations
    #[error("storage backend is shutting down")]
    ShuttingDown,
}

impl StorageError {
    /// Whether the retry loop may try again
    #[inline]
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Contention(_))
    }

    /// Escalate a transient error once the budget is gone
    #[must_use]
    pub fn into_fatal(self, context: &str) -> Self {
        match self {
            Self::Contention(msg) => Self::Fatal(format!("{context}: retry budget exhausted ({msg})")),
            other => other,
        }
    }
}
