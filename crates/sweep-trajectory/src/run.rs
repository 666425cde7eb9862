//! Run records
//!
//! One [`RunInfo`] per element of the exploration matrix, appended by
//! explore/expand (and by the merger, renumbered). Immutable except for
//! the completion fields.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sweep_tree::run_name;

/// Record of one run of the study
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunInfo {
    /// Position in the run list; also the index into every explored
    /// parameter's value sequence
    pub idx: usize,
    /// Generated name, `run_XXXXXXXX`
    pub name: String,
    /// Creation time
    pub timestamp: DateTime<Utc>,
    /// Whether the run body finished
    pub completed: bool,
    /// Short outcome summary
    pub summary: Option<String>,
    /// Error text when the body failed; a failed run never aborts
    /// siblings
    pub error: Option<String>,
}

impl RunInfo {
    /// Fresh record for a run index
    #[must_use]
    pub fn new(idx: usize) -> Self {
        Self {
            idx,
            name: run_name(idx),
            timestamp: Utc::now(),
            completed: false,
            summary: None,
            error: None,
        }
    }

    /// Mark completion with a summary
    pub fn complete(&mut self, summary: impl Into<String>) {
        self.completed = true;
        self.summary = Some(summary.into());
        self.error = None;
    }

    /// Record a failed body; the run stays uncompleted
    pub fn fail(&mut self, error: impl Into<String>) {
        self.completed = false;
        self.error = Some(error.into());
    }

    /// Renumber for merge relocation, keeping timestamps and outcome
    #[must_use]
    pub fn renumbered(&self, new_idx: usize) -> Self {
        Self {
            idx: new_idx,
            name: run_name(new_idx),
            ..self.clone()
        }
    }
}
