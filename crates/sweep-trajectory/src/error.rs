//! Error types for the trajectory layer

use sweep_storage::StorageError;
use sweep_tree::{LockedError, TreeError};

/// Exploration and expansion failures
#[derive(Debug, thiserror::Error)]
pub enum ExplorationError {
    /// Value lists inside one co-varying group disagree in length
    #[error("value lists in group {group:?} must share length, got {lengths:?}")]
    GroupLengthMismatch {
        /// Names in the offending group
        group: Vec<String>,
        /// Observed lengths, same order
        lengths: Vec<usize>,
    },

    /// A plan carried lists of unequal length
    #[error("value list for '{name}' has length {actual}, expected {expected}")]
    LengthMismatch {
        /// Offending list name
        name: String,
        /// Established length
        expected: usize,
        /// Observed length
        actual: usize,
    },

    /// Empty value list
    #[error("empty value list for '{0}'")]
    EmptyValues(String),

    /// A grouping names a list that does not exist, or names one twice
    #[error("grouping error for '{0}': unknown or duplicated name")]
    BadGrouping(String),

    /// Parameter already carries an incompatible exploration
    #[error("parameter '{0}' is already explored")]
    AlreadyExplored(String),

    /// Runs exist; exploring is only legal before the first run
    #[error("{0} runs already exist; use expand to append")]
    RunsExist(usize),

    /// Expansion requires a prior exploration
    #[error("trajectory was never explored")]
    NeverExplored,

    /// Expansion must cover exactly the explored parameter set
    #[error("expand must cover exactly the explored set; offending name '{0}'")]
    KeySetMismatch(String),
}

/// Top-level trajectory failures
#[derive(Debug, thiserror::Error)]
pub enum TrajectoryError {
    /// Naming/resolution failure
    #[error(transparent)]
    Tree(#[from] TreeError),

    /// Write to an in-run-locked parameter
    #[error(transparent)]
    Locked(#[from] LockedError),

    /// Exploration algebra failure
    #[error(transparent)]
    Exploration(#[from] ExplorationError),

    /// Storage coordination failure
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// Run index outside the run list
    #[error("run index {idx} out of range ({count} runs)")]
    RunIndexOutOfRange {
        /// Requested index
        idx: usize,
        /// Runs available
        count: usize,
    },

    /// A stored trajectory is missing a structural leaf
    #[error("stored trajectory is malformed: {0}")]
    MalformedStore(String),
}

impl TrajectoryError {
    /// Whether the failure poisons the whole study (storage went fatal)
    #[inline]
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            TrajectoryError::Storage(StorageError::Fatal(_) | StorageError::VersionMismatch { .. })
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn storage_fatal_classification() {
        let err = TrajectoryError::Storage(StorageError::Fatal("disk".into()));
        assert!(err.is_fatal());

        let err = TrajectoryError::Exploration(ExplorationError::NeverExplored);
        assert!(!err.is_fatal());
    }
}
