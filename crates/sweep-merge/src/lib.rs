//! Sweep Merge
//!
//! Consolidation of two trajectories' run sets and data into one.
//!
//! # Core Concepts
//!
//! - [`merge`]: the five-step algorithm — schema check (atomic
//!   rejection), renumber + relocate, value concatenation, optional
//!   duplicate elimination with a trial disambiguator, non-run-scoped
//!   path union
//! - [`MergeConfig`]: move vs copy, bulk vs item-wise relocation, trial
//!   parameter, ignore list, checkpointing
//! - [`MergeCheckpoint`]: relocation progress written into the target
//!   store so a crashed merge resumes without re-copying completed runs
//!
//! The merger observes the shared [`sweep_core::CancelFlag`] between
//! relocation steps.

#![warn(missing_docs)]
#![warn(unreachable_pub)]

mod checkpoint;
mod error;
mod merge;

pub use checkpoint::{MergeCheckpoint, CHECKPOINT_PATH};
pub use error::MergeError;
pub use merge::{merge, MergeConfig, MergeReport, RelocationStrategy};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
