//! The same study through every storage topology
//!
//! Whichever adapter coordinates the writers, the final store contents
//! must be identical: each run's z = x*y leaf present under its own run
//! namespace, no torn or missing writes.

use std::sync::Arc;
use sweep_core::{
    setup_backend, BackendKind, RunBody, StudyConfig, StudyRunner, SweepError,
};
use sweep_storage::{BlobStore, LockBroker, MemoryStore};
use sweep_test_utils::{explored_xy_trajectory, int_lists};
use sweep_trajectory::{zip, RunView, Trajectory};
use sweep_tree::Value;

struct Product;

#[async_trait::async_trait]
impl RunBody for Product {
    async fn execute(&self, view: &mut RunView) -> anyhow::Result<Option<String>> {
        let x = view.get_value("x")?.as_i64().unwrap_or(0);
        let y = view.get_value("y")?.as_i64().unwrap_or(0);
        view.set("z", Value::from(x * y))?;
        Ok(Some(format!("z = {}", x * y)))
    }
}

async fn run_with(config: StudyConfig) -> Result<Vec<i64>, SweepError> {
    let store = Arc::new(MemoryStore::new());
    let blob: Arc<dyn BlobStore> = Arc::clone(&store) as _;
    let handles = setup_backend(&config, blob)?;
    let mut traj = explored_xy_trajectory("topology_study", Arc::clone(&handles.backend));

    let runner = StudyRunner::new(config);
    let report = runner.run_study(&mut traj, Arc::new(Product)).await?;
    assert_eq!(report.completed(), 4);
    handles.finish().await?;

    Ok((0..4)
        .map(|i| {
            store
                .read_leaf(&format!("results.runs.run_{i:08}.z"))
                .unwrap()
                .value
                .as_i64()
                .unwrap()
        })
        .collect())
}

#[tokio::test]
async fn direct_topology() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
    let zs = run_with(StudyConfig::new().with_backend(BackendKind::Direct).with_workers(1))
        .await
        .unwrap();
    assert_eq!(zs, vec![3, 4, 6, 8]);
}

#[tokio::test]
async fn locked_topology() {
    let zs = run_with(StudyConfig::new().with_backend(BackendKind::Locked).with_workers(4))
        .await
        .unwrap();
    assert_eq!(zs, vec![3, 4, 6, 8]);
}

#[tokio::test]
async fn queued_topology() {
    let zs = run_with(StudyConfig::new().with_backend(BackendKind::Queued).with_workers(4))
        .await
        .unwrap();
    assert_eq!(zs, vec![3, 4, 6, 8]);
}

#[tokio::test]
async fn piped_topology() {
    let zs = run_with(StudyConfig::new().with_backend(BackendKind::Piped).with_workers(4))
        .await
        .unwrap();
    assert_eq!(zs, vec![3, 4, 6, 8]);
}

#[tokio::test]
async fn net_locked_topology() {
    let broker = LockBroker::bind("127.0.0.1:0").await.unwrap();
    let addr = broker.local_addr().unwrap().to_string();
    tokio::spawn(broker.run());

    let zs = run_with(
        StudyConfig::new()
            .with_backend(BackendKind::NetLocked)
            .with_broker(addr)
            .with_workers(4),
    )
    .await
    .unwrap();
    assert_eq!(zs, vec![3, 4, 6, 8]);
}

#[tokio::test]
async fn net_locked_without_broker_address_fails_setup() {
    let result = run_with(StudyConfig::new().with_backend(BackendKind::NetLocked)).await;
    assert!(result.is_err());
}

#[tokio::test]
async fn expansion_extends_a_finished_study() {
    let store = Arc::new(MemoryStore::new());
    let blob: Arc<dyn BlobStore> = Arc::clone(&store) as _;
    let config = StudyConfig::new().with_backend(BackendKind::Queued);
    let handles = setup_backend(&config, blob).unwrap();
    let mut traj = explored_xy_trajectory("expanding_study", Arc::clone(&handles.backend));

    let runner = StudyRunner::new(config.clone());
    runner.run_study(&mut traj, Arc::new(Product)).await.unwrap();

    traj.expand(&zip(int_lists(&[("x", &[5]), ("y", &[6])])).unwrap())
        .unwrap();
    assert_eq!(traj.run_count(), 5);

    // only the fresh run is dispatched
    let report = runner.run_study(&mut traj, Arc::new(Product)).await.unwrap();
    assert_eq!(report.completed(), 1);
    assert_eq!(report.outcomes[0].idx, 4);
    handles.finish().await.unwrap();

    let leaf = store.read_leaf("results.runs.run_00000004.z").unwrap();
    assert_eq!(leaf.value, Value::from(30_i64));
}

#[tokio::test]
async fn trajectory_persists_after_study() {
    let store = Arc::new(MemoryStore::new());
    let blob: Arc<dyn BlobStore> = Arc::clone(&store) as _;
    let config = StudyConfig::new();
    let handles = setup_backend(&config, blob).unwrap();
    let mut traj = explored_xy_trajectory("persisted_study", Arc::clone(&handles.backend));

    let runner = StudyRunner::new(config);
    runner.run_study(&mut traj, Arc::new(Product)).await.unwrap();
    traj.store().await.unwrap();

    let loaded = Trajectory::load(Arc::clone(&handles.backend)).await.unwrap();
    assert_eq!(loaded.run_count(), 4);
    assert!(loaded.runs().iter().all(|r| r.completed));
    assert_eq!(
        loaded.run(2).unwrap().summary.as_deref(),
        Some("z = 6")
    );
}
