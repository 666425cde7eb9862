//! The study runner
//!
//! Dispatches run bodies over a bounded pool of tokio tasks, one
//! [`RunView`] per run. Workers share nothing but the storage adapter
//! handle; a failing body aborts only its own run, and per-run outcomes
//! are reported after the pool drains.

use crate::cancel::CancelFlag;
use crate::config::{BackendKind, StudyConfig};
use crate::error::SweepError;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;
use sweep_storage::{
    piped, queued, BlobStore, DirectBackend, LockedBackend, NetLockedBackend, StorageBackend,
    StorageError,
};
use sweep_trajectory::{RunView, Trajectory};
use tokio::task::{JoinHandle, JoinSet};

/// One run body, executed once per run index
#[async_trait]
pub trait RunBody: Send + Sync {
    /// Compute the run, reading parameters and writing results through
    /// the view; the returned summary lands in the run record
    async fn execute(&self, view: &mut RunView) -> anyhow::Result<Option<String>>;
}

/// Outcome of one dispatched run
#[derive(Debug, Clone)]
pub struct RunOutcome {
    /// Run index
    pub idx: usize,
    /// Generated run name
    pub name: String,
    /// Summary on success, error text on failure
    pub result: Result<Option<String>, String>,
}

/// Per-run outcomes after the pool drained
#[derive(Debug, Default)]
pub struct StudyReport {
    /// Outcomes in run-index order
    pub outcomes: Vec<RunOutcome>,
    /// Runs never dispatched (cancellation, storage fatal)
    pub skipped: Vec<usize>,
}

impl StudyReport {
    /// Completed run count
    #[must_use]
    pub fn completed(&self) -> usize {
        self.outcomes.iter().filter(|o| o.result.is_ok()).count()
    }

    /// Failed runs with their error text
    pub fn failures(&self) -> impl Iterator<Item = (usize, &str)> {
        self.outcomes
            .iter()
            .filter_map(|o| o.result.as_ref().err().map(|e| (o.idx, e.as_str())))
    }

    /// Whether every dispatched run failed
    #[must_use]
    pub fn all_failed(&self) -> bool {
        !self.outcomes.is_empty() && self.outcomes.iter().all(|o| o.result.is_err())
    }
}

/// A constructed storage topology plus its consumer task, if any
pub struct BackendHandles {
    /// The shared adapter handle for the study
    pub backend: Arc<dyn StorageBackend>,
    consumer: Option<JoinHandle<Result<u64, StorageError>>>,
}

impl BackendHandles {
    /// Send the shutdown sentinel and wait for the consumer to drain
    ///
    /// # Errors
    /// Consumer-side storage failures.
    pub async fn finish(self) -> Result<(), SweepError> {
        self.backend.shutdown().await?;
        if let Some(consumer) = self.consumer {
            match consumer.await {
                Ok(result) => {
                    result?;
                }
                Err(join) => {
                    return Err(SweepError::Storage(StorageError::Fatal(format!(
                        "consumer task failed: {join}"
                    ))));
                }
            }
        }
        Ok(())
    }
}

/// Build the configured storage topology over a physical store
///
/// # Errors
/// Version mismatch at open; missing broker address for
/// [`BackendKind::NetLocked`].
pub fn setup_backend(
    config: &StudyConfig,
    store: Arc<dyn BlobStore>,
) -> Result<BackendHandles, SweepError> {
    let direct = DirectBackend::open(store)?;
    let handles = match config.backend {
        BackendKind::Direct => BackendHandles {
            backend: Arc::new(direct),
            consumer: None,
        },
        BackendKind::Locked => BackendHandles {
            backend: Arc::new(LockedBackend::new(direct, config.retry)),
            consumer: None,
        },
        BackendKind::Queued => {
            let (producer, consumer) = queued(direct, config.queue_capacity);
            BackendHandles {
                backend: Arc::new(producer),
                consumer: Some(tokio::spawn(consumer.run())),
            }
        }
        BackendKind::Piped => {
            let (hub, consumer) = piped(direct, config.queue_capacity);
            BackendHandles {
                backend: hub,
                consumer: Some(tokio::spawn(consumer.run())),
            }
        }
        BackendKind::NetLocked => {
            let addr = config.broker_addr.as_deref().ok_or_else(|| {
                SweepError::Storage(StorageError::Fatal(
                    "net-locked topology needs a broker address".to_string(),
                ))
            })?;
            BackendHandles {
                backend: Arc::new(NetLockedBackend::new(direct, addr, config.retry)),
                consumer: None,
            }
        }
    };
    Ok(handles)
}

struct TaskResult {
    idx: usize,
    name: String,
    outcome: Result<Option<String>, TaskError>,
}

struct TaskError {
    fatal: bool,
    message: String,
}

async fn execute_one(mut view: RunView, body: Arc<dyn RunBody>) -> TaskResult {
    let idx = view.index();
    let name = view.name().to_string();
    tracing::debug!(run = %name, "run body starting");
    let outcome = match body.execute(&mut view).await {
        Ok(summary) => match view.store().await {
            Ok(()) => Ok(summary),
            Err(e) => Err(TaskError {
                fatal: e.is_fatal(),
                message: e.to_string(),
            }),
        },
        Err(e) => Err(TaskError {
            fatal: false,
            message: format!("{e:#}"),
        }),
    };
    TaskResult { idx, name, outcome }
}

/// Bounded worker pool executing one run body per run index
#[derive(Debug)]
pub struct StudyRunner {
    config: StudyConfig,
    cancel: CancelFlag,
}

impl StudyRunner {
    /// Runner over a configuration
    #[must_use]
    pub fn new(config: StudyConfig) -> Self {
        Self {
            config,
            cancel: CancelFlag::new(),
        }
    }

    /// The shared cancellation flag (hand it to interrupt handlers and
    /// the merger)
    #[must_use]
    pub fn cancel_flag(&self) -> CancelFlag {
        self.cancel.clone()
    }

    /// Execute every not-yet-completed run of the trajectory
    ///
    /// Per-run failures are recorded on their run records and reported in
    /// the study report after the pool drains. The call itself fails only
    /// when storage goes fatal, every run fails, or the study is aborted.
    ///
    /// # Errors
    /// [`SweepError::StorageFatal`], [`SweepError::AllRunsFailed`],
    /// [`SweepError::Aborted`].
    pub async fn run_study(
        &self,
        trajectory: &mut Trajectory,
        body: Arc<dyn RunBody>,
    ) -> Result<StudyReport, SweepError> {
        let pending: Vec<usize> = trajectory
            .runs()
            .iter()
            .filter(|r| !r.completed)
            .map(|r| r.idx)
            .collect();
        tracing::info!(
            trajectory = %trajectory.name(),
            pending = pending.len(),
            workers = self.config.max_workers,
            "study starting"
        );

        let backend = trajectory.backend();
        let mut queue = pending.into_iter();
        let mut pool: JoinSet<TaskResult> = JoinSet::new();
        let mut results: BTreeMap<usize, TaskResult> = BTreeMap::new();
        let mut skipped: Vec<usize> = Vec::new();
        let mut fatal: Option<String> = None;

        loop {
            while pool.len() < self.config.max_workers
                && fatal.is_none()
                && self.cancel.accepting_work()
            {
                let Some(idx) = queue.next() else { break };
                let worker_backend = Arc::clone(&backend).worker_handle()?;
                let view = trajectory.make_run_view_with(idx, worker_backend)?;
                pool.spawn(execute_one(view, Arc::clone(&body)));
            }

            if pool.is_empty() {
                break;
            }
            if self.cancel.aborting() {
                tracing::warn!("aborting in-flight runs");
                pool.abort_all();
            }

            match pool.join_next().await {
                Some(Ok(result)) => {
                    if let Err(task_err) = &result.outcome {
                        if task_err.fatal && fatal.is_none() {
                            fatal = Some(task_err.message.clone());
                        }
                    }
                    results.insert(result.idx, result);
                }
                Some(Err(join_err)) if join_err.is_cancelled() => {}
                Some(Err(join_err)) => {
                    return Err(SweepError::Storage(StorageError::Fatal(format!(
                        "worker task panicked: {join_err}"
                    ))));
                }
                None => break,
            }
        }
        skipped.extend(queue);

        // record outcomes on the run list
        let mut outcomes = Vec::with_capacity(results.len());
        for (_, task) in results {
            match &task.outcome {
                Ok(summary) => {
                    trajectory.mark_run_completed(
                        task.idx,
                        summary.clone().unwrap_or_else(|| "completed".to_string()),
                    )?;
                }
                Err(e) => {
                    trajectory.mark_run_failed(task.idx, e.message.clone())?;
                }
            }
            outcomes.push(RunOutcome {
                idx: task.idx,
                name: task.name,
                result: task.outcome.map_err(|e| e.message),
            });
        }
        let report = StudyReport { outcomes, skipped };

        for (idx, error) in report.failures() {
            tracing::warn!(run = idx, %error, "run failed");
        }
        tracing::info!(
            completed = report.completed(),
            failed = report.failures().count(),
            skipped = report.skipped.len(),
            "study finished"
        );

        if let Some(message) = fatal {
            return Err(SweepError::StorageFatal(message));
        }
        if self.cancel.aborting() {
            return Err(SweepError::Aborted);
        }
        if report.all_failed() {
            return Err(SweepError::AllRunsFailed(report.outcomes.len()));
        }
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use indexmap::IndexMap;
    use sweep_storage::MemoryStore;
    use sweep_tree::Value;
    use sweep_trajectory::cartesian;

    struct Product;

    #[async_trait]
    impl RunBody for Product {
        async fn execute(&self, view: &mut RunView) -> anyhow::Result<Option<String>> {
            let x = view.get_value("x")?.as_i64().unwrap_or(0);
            let y = view.get_value("y")?.as_i64().unwrap_or(0);
            view.set("z", Value::from(x * y))?;
            Ok(Some(format!("z = {}", x * y)))
        }
    }

    struct FailOdd;

    #[async_trait]
    impl RunBody for FailOdd {
        async fn execute(&self, view: &mut RunView) -> anyhow::Result<Option<String>> {
            if view.index() % 2 == 1 {
                anyhow::bail!("odd run rejected");
            }
            Ok(None)
        }
    }

    struct AlwaysFail;

    #[async_trait]
    impl RunBody for AlwaysFail {
        async fn execute(&self, _view: &mut RunView) -> anyhow::Result<Option<String>> {
            anyhow::bail!("no")
        }
    }

    fn explored_trajectory(backend: Arc<dyn StorageBackend>) -> Trajectory {
        let mut traj = Trajectory::new("study", backend);
        traj.add_parameter("x", Value::from(0_i64)).unwrap();
        traj.add_parameter("y", Value::from(0_i64)).unwrap();
        let mut lists = IndexMap::new();
        lists.insert(
            "x".to_string(),
            vec![Value::from(1_i64), Value::from(2_i64)],
        );
        lists.insert(
            "y".to_string(),
            vec![Value::from(3_i64), Value::from(4_i64)],
        );
        traj.explore(&cartesian(lists).unwrap()).unwrap();
        traj
    }

    #[tokio::test]
    async fn study_runs_every_index() {
        let store = Arc::new(MemoryStore::new());
        let handles =
            setup_backend(&StudyConfig::new().with_backend(BackendKind::Queued), store.clone())
                .unwrap();
        let mut traj = explored_trajectory(Arc::clone(&handles.backend));

        let runner = StudyRunner::new(StudyConfig::new().with_workers(4));
        let report = runner.run_study(&mut traj, Arc::new(Product)).await.unwrap();
        assert_eq!(report.completed(), 4);
        handles.finish().await.unwrap();

        let leaf = store.read_leaf("results.runs.run_00000002.z").unwrap();
        assert_eq!(leaf.value, Value::from(6_i64));
        assert!(traj.runs().iter().all(|r| r.completed));
    }

    #[tokio::test]
    async fn failing_runs_abort_only_themselves() {
        let store = Arc::new(MemoryStore::new());
        let handles = setup_backend(&StudyConfig::new(), store).unwrap();
        let mut traj = explored_trajectory(Arc::clone(&handles.backend));

        let runner = StudyRunner::new(StudyConfig::new().with_workers(2));
        let report = runner.run_study(&mut traj, Arc::new(FailOdd)).await.unwrap();

        assert_eq!(report.completed(), 2);
        let failed: Vec<usize> = report.failures().map(|(idx, _)| idx).collect();
        assert_eq!(failed, vec![1, 3]);
        assert_eq!(
            traj.run(1).unwrap().error.as_deref(),
            Some("odd run rejected")
        );
        assert!(traj.run(0).unwrap().completed);
    }

    #[tokio::test]
    async fn all_failures_fail_the_study() {
        let store = Arc::new(MemoryStore::new());
        let handles = setup_backend(&StudyConfig::new(), store).unwrap();
        let mut traj = explored_trajectory(Arc::clone(&handles.backend));

        let runner = StudyRunner::new(StudyConfig::new());
        let result = runner.run_study(&mut traj, Arc::new(AlwaysFail)).await;
        assert!(matches!(result, Err(SweepError::AllRunsFailed(4))));
    }

    #[tokio::test]
    async fn terminating_flag_skips_undispatched_runs() {
        let store = Arc::new(MemoryStore::new());
        let handles = setup_backend(&StudyConfig::new(), store).unwrap();
        let mut traj = explored_trajectory(Arc::clone(&handles.backend));

        let runner = StudyRunner::new(StudyConfig::new().with_workers(1));
        // first interrupt before the study: nothing gets dispatched
        runner.cancel_flag().interrupt();
        let report = runner.run_study(&mut traj, Arc::new(Product)).await.unwrap();
        assert_eq!(report.completed(), 0);
        assert_eq!(report.skipped, vec![0, 1, 2, 3]);
    }
}
