//! Sweep Core
//!
//! Study orchestration over the tree/trajectory/storage layers.
//!
//! # Core Concepts
//!
//! - [`StudyRunner`]: bounded worker pool executing one [`RunBody`] per
//!   run index, per-run outcome reporting after the pool drains
//! - [`CancelFlag`]: cooperative Running → Terminating → Aborting state
//!   machine shared with interrupt handlers and the merger
//! - [`StudyConfig`] / [`BackendKind`]: topology and pool configuration,
//!   selected once at setup
//! - [`setup_backend`]: construct the configured storage topology and its
//!   consumer task
//!
//! # Example
//!
//! ```rust,ignore
//! let handles = setup_backend(&config, store)?;
//! let mut traj = Trajectory::new("study", handles.backend.clone());
//! // ... add parameters, explore ...
//! let runner = StudyRunner::new(config);
//! let report = runner.run_study(&mut traj, Arc::new(MyBody)).await?;
//! handles.finish().await?;
//! ```

#![warn(missing_docs)]
#![warn(unreachable_pub)]

mod cancel;
mod config;
mod error;
mod runner;

pub use cancel::{CancelFlag, RunState};
pub use config::{BackendKind, StudyConfig};
pub use error::SweepError;
pub use runner::{
    setup_backend, BackendHandles, RunBody, RunOutcome, StudyReport, StudyRunner,
};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
