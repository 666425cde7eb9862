//! Top-level study errors

use sweep_storage::StorageError;
use sweep_trajectory::TrajectoryError;

/// Errors surfaced by study orchestration
///
/// Individual run failures are reported per run in the study report, not
/// here; the study call itself fails only for the reasons below.
#[derive(Debug, thiserror::Error)]
pub enum SweepError {
    /// Trajectory manipulation failure outside run bodies
    #[error(transparent)]
    Trajectory(#[from] TrajectoryError),

    /// Storage topology setup/teardown failure
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// Storage went fatal mid-study; siblings were not dispatched
    #[error("storage went fatal during the study: {0}")]
    StorageFatal(String),

    /// Every dispatched run failed
    #[error("every run failed ({0} runs)")]
    AllRunsFailed(usize),

    /// The study was aborted by repeated interrupt
    #[error("study aborted")]
    Aborted,
}
