//! Readiness Evaluator (C4) and DAG Scheduler (C6).
//!
//! The source drives readiness recursively from inside the executor
//! (`orchestrator.py::_execute_single_task` calls back into
//! `_find_ready_tasks`/`_execute_tasks` on every completion). Spec §9
//! recommends replacing that with message-passing into a shared work
//! queue drained by a bounded worker pool; this module is that redesign.
//! The semaphore-plus-background-`tokio::spawn` shape is grounded on
//! `cloacina/src/executor/task_executor.rs::run_execution_loop`.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::{mpsc, Mutex, Notify, Semaphore};
use tracing::{debug, info};

use crate::dag::{DagConfig, TaskDescriptor};
use crate::error::StoreError;
use crate::executor::TaskExecutor;
use crate::results::{ResultMap, Results};
use crate::store::{StateStore, TaskStatus};

/// Readiness Evaluator (C4): the subset of `tasks` whose dependencies have
/// all completed (observed in `results`) and whose own status is still
/// `pending` (spec §4.4).
pub fn find_ready_tasks<'a>(
    tasks: &'a [TaskDescriptor],
    results: &HashMap<String, ResultMap>,
    states: &HashMap<String, crate::store::TaskState>,
) -> Vec<&'a TaskDescriptor> {
    tasks
        .iter()
        .filter(|task| {
            let deps_ready = task.dependencies.iter().all(|dep| results.contains_key(dep));
            if !deps_ready {
                return false;
            }
            match states.get(&task.id).map(|s| s.status) {
                Some(TaskStatus::Pending) | None => true,
                Some(TaskStatus::Completed)
                | Some(TaskStatus::Running)
                | Some(TaskStatus::Failed) => false,
            }
        })
        .collect()
}

/// Default bound on concurrently in-flight tasks when a run doesn't
/// override it (see `settings.rs`).
pub const DEFAULT_MAX_CONCURRENCY: usize = 8;

/// Drives the DAG to a fixpoint: repeatedly finds ready tasks, dispatches
/// them onto a bounded worker pool, and lets completions feed newly-ready
/// children back onto the queue, until no task is ready and none is
/// in-flight.
pub struct Scheduler {
    executor: Arc<TaskExecutor>,
    max_concurrency: usize,
}

impl Scheduler {
    pub fn new(executor: Arc<TaskExecutor>, max_concurrency: usize) -> Self {
        Self {
            executor,
            max_concurrency,
        }
    }

    /// Runs every task in `config` to a fixpoint (spec §4.6). Returns the
    /// final Results snapshot. Only a [`StoreError`] aborts the run;
    /// individual task failures are recorded and the scheduler continues
    /// with whatever else can still make progress.
    pub async fn run(
        &self,
        run_id: &str,
        config: &DagConfig,
        store: &StateStore,
    ) -> Result<HashMap<String, ResultMap>, StoreError> {
        let tasks_by_id: HashMap<String, TaskDescriptor> = config
            .tasks
            .iter()
            .map(|t| (t.id.clone(), t.clone()))
            .collect();

        let results = self.executor.results();
        let semaphore = Arc::new(Semaphore::new(self.max_concurrency.max(1)));
        let (tx, mut rx) = mpsc::unbounded_channel::<String>();
        let dispatched = Arc::new(Mutex::new(HashSet::<String>::new()));
        let in_flight = Arc::new(AtomicUsize::new(0));
        let notify = Arc::new(Notify::new());

        let states = store.list(run_id).await?;
        let ready = find_ready_tasks(&config.tasks, &results.snapshot().await, &states);
        {
            let mut dispatched = dispatched.lock().await;
            for task in ready {
                dispatched.insert(task.id.clone());
                let _ = tx.send(task.id.clone());
            }
        }

        loop {
            // Drain every task id currently queued.
            while let Ok(task_id) = rx.try_recv() {
                let task = tasks_by_id[&task_id].clone();
                let permit = semaphore.clone().acquire_owned().await.expect("semaphore open");
                in_flight.fetch_add(1, Ordering::SeqCst);

                let executor = self.executor.clone();
                let store = store.clone();
                let tx = tx.clone();
                let tasks = config.tasks.clone();
                let results = results.clone();
                let dispatched = dispatched.clone();
                let in_flight = in_flight.clone();
                let notify = notify.clone();
                let run_id = run_id.to_string();
                let max_retries = config.max_retries;
                let retry_delay = config.retry_delay;

                tokio::spawn(async move {
                    let _permit = permit;
                    info!(task_id = %task.id, "dispatching task");

                    if let Err(e) = executor
                        .execute(&run_id, &task, max_retries, retry_delay)
                        .await
                    {
                        // A StoreError is fatal; there's no good channel to
                        // propagate it from a spawned task back to `run`,
                        // so it's logged and the task is treated as not
                        // having made progress. The run-level caller
                        // still observes overall persistence health via
                        // its own Store calls.
                        tracing::error!(task_id = %task.id, error = %e, "store error executing task");
                    }

                    if let Ok(states) = store.list(&run_id).await {
                        let snapshot = results.snapshot().await;
                        let newly_ready = find_ready_tasks(&tasks, &snapshot, &states);
                        let mut dispatched = dispatched.lock().await;
                        for t in newly_ready {
                            if dispatched.insert(t.id.clone()) {
                                let _ = tx.send(t.id.clone());
                            }
                        }
                    }

                    in_flight.fetch_sub(1, Ordering::SeqCst);
                    notify.notify_one();
                });
            }

            if in_flight.load(Ordering::SeqCst) == 0 && rx.is_empty() {
                break;
            }

            notify.notified().await;
        }

        debug!(run_id, "scheduler reached fixpoint");
        Ok(results.snapshot().await)
    }
}
