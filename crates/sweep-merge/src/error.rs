//! Error types for trajectory consolidation

use sweep_storage::StorageError;
use sweep_trajectory::TrajectoryError;
use sweep_tree::TreeError;

/// Merge failures
///
/// Schema mismatches reject the whole merge atomically — validation runs
/// before the first write. Cancellation between relocation steps leaves a
/// checkpoint behind so a resumed merge never re-copies completed runs.
#[derive(Debug, thiserror::Error)]
pub enum MergeError {
    /// Incompatible parameter sets or kinds; nothing was written
    #[error("schema mismatch at '{path}': {reason}")]
    SchemaMismatch {
        /// Offending parameter path
        path: String,
        /// What disagreed
        reason: String,
    },

    /// Non-run-scoped path present in both with differing content
    #[error("conflicting content at '{0}' (not in the ignore list)")]
    Conflict(String),

    /// Cooperative cancellation observed between relocation steps
    #[error("merge cancelled between relocation steps")]
    Cancelled,

    /// Trajectory-layer failure
    #[error(transparent)]
    Trajectory(#[from] TrajectoryError),

    /// Storage-layer failure
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// Tree-layer failure
    #[error(transparent)]
    Tree(#[from] TreeError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schema_mismatch_names_path() {
        let err = MergeError::SchemaMismatch {
            path: "parameters.x".to_string(),
            reason: "kind i64 vs f64".to_string(),
        };
        assert!(err.to_string().contains("parameters.x"));
        assert!(err.to_string().contains("kind"));
    }
}
