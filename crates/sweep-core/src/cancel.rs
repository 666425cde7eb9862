//! Cooperative cancellation
//!
//! One process-wide atomic flag with a three-state machine:
//! Running → Terminating → Aborting. The first interrupt stops new run
//! dispatch while in-flight bodies finish their current operation; the
//! second abandons waiting. The merger consults the same flag between
//! relocation steps. No signal-handler reentrancy tricks — interrupt
//! handlers only call [`CancelFlag::interrupt`].

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

/// Study lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    /// Dispatching and executing runs
    Running,
    /// No new runs; in-flight bodies finish their current operation
    Terminating,
    /// Abandon everything as fast as cooperation allows
    Aborting,
}

impl RunState {
    fn from_u8(raw: u8) -> Self {
        match raw {
            0 => RunState::Running,
            1 => RunState::Terminating,
            _ => RunState::Aborting,
        }
    }

    fn as_u8(self) -> u8 {
        match self {
            RunState::Running => 0,
            RunState::Terminating => 1,
            RunState::Aborting => 2,
        }
    }
}

/// Shared cooperative cancellation flag
#[derive(Debug, Clone, Default)]
pub struct CancelFlag {
    state: Arc<AtomicU8>,
}

impl CancelFlag {
    /// Fresh flag in the running state
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Current state
    #[must_use]
    pub fn state(&self) -> RunState {
        RunState::from_u8(self.state.load(Ordering::SeqCst))
    }

    /// Escalate one step: Running → Terminating → Aborting
    ///
    /// Returns the state after the interrupt. Idempotent once aborting.
    pub fn interrupt(&self) -> RunState {
        let mut current = self.state.load(Ordering::SeqCst);
        loop {
            let next = RunState::from_u8(current).escalated().as_u8();
            match self.state.compare_exchange(
                current,
                next,
                Ordering::SeqCst,
                Ordering::SeqCst,
            ) {
                Ok(_) => {
                    let state = RunState::from_u8(next);
                    tracing::warn!(?state, "interrupt received");
                    return state;
                }
                Err(actual) => current = actual,
            }
        }
    }

    /// Whether new work may still be dispatched
    #[must_use]
    pub fn accepting_work(&self) -> bool {
        self.state() == RunState::Running
    }

    /// Whether in-flight work should be abandoned
    #[must_use]
    pub fn aborting(&self) -> bool {
        self.state() == RunState::Aborting
    }
}

impl RunState {
    /// The state one interrupt later
    #[must_use]
    pub fn escalated(self) -> Self {
        match self {
            RunState::Running => RunState::Terminating,
            RunState::Terminating | RunState::Aborting => RunState::Aborting,
        }
    }
}
