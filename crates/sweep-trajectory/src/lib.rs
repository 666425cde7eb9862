//! Sweep Trajectory
//!
//! Trajectories for iterative parameter studies.
//!
//! # Core Concepts
//!
//! - [`Trajectory`]: one complete hierarchical store — tree, run records,
//!   explored-parameter set, wildcard table, shared backend handle
//! - [`ExplorationPlan`] via [`cartesian`]/[`cartesian_grouped`]/[`zip`]:
//!   the pure exploration algebra building the run matrix
//! - [`RunView`]: per-run projection handed to workers; reads the i-th
//!   explored values, write-locks parameters on first read, scopes result
//!   writes under the run's namespace
//! - [`RunInfo`]: append-only run records
//!
//! # Example
//!
//! ```rust,ignore
//! let mut traj = Trajectory::new("study", backend);
//! traj.add_parameter("x", Value::from(0_i64))?;
//! traj.add_parameter("y", Value::from(0_i64))?;
//! traj.explore(&cartesian(lists)?)?;
//!
//! let mut view = traj.make_run_view(2)?;
//! let x = view.get_value("x")?;
//! view.set("z", x)?;
//! view.store().await?;
//! ```

#![warn(unreachable_pub)]
#![allow(missing_docs)]

mod builder;
mod error;
mod persist;
mod run;
mod run_view;
mod trajectory;

pub use builder::{cartesian, cartesian_grouped, zip, ExplorationPlan};
pub use error::{ExplorationError, TrajectoryError};
pub use run::RunInfo;
pub use run_view::RunView;
pub use trajectory::{
    Trajectory, CONFIG_GROUP, DERIVED_GROUP, PARAMETERS_GROUP, RESULTS_GROUP, RUNS_SUBGROUP,
};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
