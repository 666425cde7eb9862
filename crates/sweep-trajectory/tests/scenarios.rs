//! End-to-end exploration scenarios
//!
//! The canonical study: explore {x:[1,2], y:[3,4]} as a cartesian
//! product, compute z = x*y per run, expand, and read everything back
//! through the storage backend.

use indexmap::IndexMap;
use std::sync::Arc;
use sweep_storage::{BlobStore, DirectBackend, MemoryStore, StorageBackend};
use sweep_trajectory::{cartesian, zip, Trajectory};
use sweep_tree::Value;

fn memory_pair() -> (Arc<MemoryStore>, Arc<dyn StorageBackend>) {
    let store = Arc::new(MemoryStore::new());
    let blob: Arc<dyn BlobStore> = Arc::clone(&store) as _;
    let backend: Arc<dyn StorageBackend> = Arc::new(DirectBackend::open(blob).unwrap());
    (store, backend)
}

fn ints(values: &[i64]) -> Vec<Value> {
    values.iter().map(|&v| Value::from(v)).collect()
}

fn xy_trajectory(backend: Arc<dyn StorageBackend>) -> Trajectory {
    let mut traj = Trajectory::new("product_study", backend);
    traj.add_parameter("x", Value::from(0_i64)).unwrap();
    traj.add_parameter("y", Value::from(0_i64)).unwrap();

    let mut lists = IndexMap::new();
    lists.insert("x".to_string(), ints(&[1, 2]));
    lists.insert("y".to_string(), ints(&[3, 4]));
    traj.explore(&cartesian(lists).unwrap()).unwrap();
    traj
}

#[test]
fn cartesian_exploration_orders_runs_right_most_fastest() {
    let (_, backend) = memory_pair();
    let traj = xy_trajectory(backend);

    assert_eq!(traj.run_count(), 4);
    let expected = [(1, 3), (1, 4), (2, 3), (2, 4)];
    for (idx, (x, y)) in expected.iter().enumerate() {
        let mut view = traj.make_run_view(idx).unwrap();
        assert_eq!(view.get_value("x").unwrap(), Value::from(*x));
        assert_eq!(view.get_value("y").unwrap(), Value::from(*y));
    }
}

#[tokio::test]
async fn each_run_stores_its_product() {
    let (store, backend) = memory_pair();
    let traj = xy_trajectory(backend);

    for idx in 0..traj.run_count() {
        let mut view = traj.make_run_view(idx).unwrap();
        let x = view.get_value("x").unwrap().as_i64().unwrap();
        let y = view.get_value("y").unwrap().as_i64().unwrap();
        view.set("z", Value::from(x * y)).unwrap();
        view.store().await.unwrap();
    }

    // run index 2 yields x=2, y=3, z=6
    let leaf = store.read_leaf("results.runs.run_00000002.z").unwrap();
    assert_eq!(leaf.value, Value::from(6_i64));

    let all: Vec<i64> = (0..4)
        .map(|i| {
            store
                .read_leaf(&format!("results.runs.run_{i:08}.z"))
                .unwrap()
                .value
                .as_i64()
                .unwrap()
        })
        .collect();
    assert_eq!(all, vec![3, 4, 6, 8]);
}

#[tokio::test]
async fn expand_appends_a_fifth_run() {
    let (store, backend) = memory_pair();
    let mut traj = xy_trajectory(backend);

    let mut lists = IndexMap::new();
    lists.insert("x".to_string(), ints(&[5]));
    lists.insert("y".to_string(), ints(&[6]));
    traj.expand(&zip(lists).unwrap()).unwrap();

    assert_eq!(traj.run_count(), 5);
    let mut view = traj.make_run_view(4).unwrap();
    assert_eq!(view.get_value("x").unwrap(), Value::from(5_i64));
    assert_eq!(view.get_value("y").unwrap(), Value::from(6_i64));

    let x = view.get_value("x").unwrap().as_i64().unwrap();
    let y = view.get_value("y").unwrap().as_i64().unwrap();
    view.set("z", Value::from(x * y)).unwrap();
    view.store().await.unwrap();
    let leaf = store.read_leaf("results.runs.run_00000004.z").unwrap();
    assert_eq!(leaf.value, Value::from(30_i64));
}

#[tokio::test]
async fn round_trip_preserves_types_for_every_leaf_kind() {
    let (_, backend) = memory_pair();
    let mut traj = Trajectory::new("kinds", Arc::clone(&backend));
    traj.add_result("r_bool", Value::from(true)).unwrap();
    traj.add_result("r_int", Value::from(-3_i64)).unwrap();
    traj.add_result("r_float", Value::from(0.25)).unwrap();
    traj.add_result("r_str", Value::from("text")).unwrap();
    traj.add_result("r_json", Value::Json(serde_json::json!({"k": [1, 2]})))
        .unwrap();
    traj.store().await.unwrap();

    let loaded = Trajectory::load(Arc::clone(&backend)).await.unwrap();
    assert_eq!(loaded.get_value("r_bool").unwrap(), Value::from(true));
    assert_eq!(loaded.get_value("r_int").unwrap(), Value::from(-3_i64));
    assert_eq!(loaded.get_value("r_float").unwrap(), Value::from(0.25));
    assert_eq!(loaded.get_value("r_str").unwrap(), Value::from("text"));
    assert_eq!(
        loaded.get_value("r_json").unwrap(),
        Value::Json(serde_json::json!({"k": [1, 2]}))
    );
}

#[test]
fn resolution_is_deterministic_per_index() {
    let (_, backend) = memory_pair();
    let traj = xy_trajectory(backend);

    for _ in 0..3 {
        let mut view = traj.make_run_view(1).unwrap();
        assert_eq!(view.get_value("x").unwrap(), Value::from(1_i64));
        assert_eq!(view.get_value("y").unwrap(), Value::from(4_i64));
    }
}

#[test]
fn version_mismatch_is_surfaced_not_upgraded() {
    let store: Arc<dyn BlobStore> = Arc::new(MemoryStore::with_version("0.9"));
    let result = DirectBackend::open(store);
    assert!(matches!(
        result,
        Err(sweep_storage::StorageError::VersionMismatch { .. })
    ));
}
