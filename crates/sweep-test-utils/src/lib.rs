//! Testing utilities for the sweep workspace
//!
//! Shared fixtures: memory-backed storage pairs, populated trajectories,
//! value-list builders.

#![allow(missing_docs)]

use indexmap::IndexMap;
use std::sync::Arc;
use sweep_storage::{BlobStore, DirectBackend, MemoryStore, StorageBackend};
use sweep_trajectory::{cartesian, ExplorationPlan, Trajectory};
use sweep_tree::Value;

/// A fresh in-memory store plus a direct backend over it
#[must_use]
pub fn memory_backend_pair() -> (Arc<MemoryStore>, Arc<dyn StorageBackend>) {
    let store = Arc::new(MemoryStore::new());
    let blob: Arc<dyn BlobStore> = Arc::clone(&store) as _;
    let backend: Arc<dyn StorageBackend> =
        Arc::new(DirectBackend::open(blob).expect("fresh store version"));
    (store, backend)
}

/// Integer value list
#[must_use]
pub fn int_values(values: &[i64]) -> Vec<Value> {
    values.iter().map(|&v| Value::from(v)).collect()
}

/// Named integer lists in declaration order
#[must_use]
pub fn int_lists(pairs: &[(&str, &[i64])]) -> IndexMap<String, Vec<Value>> {
    pairs
        .iter()
        .map(|(name, values)| ((*name).to_string(), int_values(values)))
        .collect()
}

/// The canonical x/y cartesian plan: {x:[1,2], y:[3,4]} → 4 runs
#[must_use]
pub fn xy_plan() -> ExplorationPlan {
    cartesian(int_lists(&[("x", &[1, 2]), ("y", &[3, 4])])).expect("static plan")
}

/// Trajectory with x/y added and the canonical plan explored
#[must_use]
pub fn explored_xy_trajectory(name: &str, backend: Arc<dyn StorageBackend>) -> Trajectory {
    let mut traj = Trajectory::new(name, backend);
    traj.add_parameter("x", Value::from(0_i64)).expect("fresh tree");
    traj.add_parameter("y", Value::from(0_i64)).expect("fresh tree");
    traj.explore(&xy_plan()).expect("valid plan");
    traj
}
