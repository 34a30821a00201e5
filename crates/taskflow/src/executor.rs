//! Task Executor (C5): runs one task descriptor through its retry loop,
//! persisting every state transition and relocating any reserved output
//! file into the run directory.
//!
//! Grounded on `cloacina/src/executor/task_executor.rs` for the shape of
//! the retry loop and its `tracing` calls at each transition, and on
//! `original_source/orchestrator.py::_execute_single_task` for the exact
//! retry/attempt semantics this spec requires (fixed `retry_delay`, not the
//! teacher's configurable `RetryPolicy`/backoff — see `DESIGN.md`).
//!
//! Per spec §9's redesign note, this module does **not** recursively
//! dispatch newly-ready children the way the source does from inside the
//! retry loop; it only runs its own task and returns. `scheduler.rs` is
//! responsible for noticing completion and dispatching children via the
//! work queue.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde_json::Value;
use tracing::{error, info, warn};

use crate::binder::{precompute_params, resolve_params};
use crate::dag::TaskDescriptor;
use crate::error::StoreError;
use crate::registry::OperationRegistry;
use crate::results::{ResultMap, Results};
use crate::store::{StateStore, TaskStatus};

/// Reserved result key that triggers artifact relocation (spec §4.5, §6).
pub const OUTPUT_FILE_PATH_KEY: &str = "output_file_path";

pub struct TaskExecutor {
    store: StateStore,
    registry: std::sync::Arc<OperationRegistry>,
    results: Results,
    run_dir: PathBuf,
}

impl TaskExecutor {
    pub fn new(
        store: StateStore,
        registry: std::sync::Arc<OperationRegistry>,
        results: Results,
        run_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            store,
            registry,
            results,
            run_dir: run_dir.into(),
        }
    }

    /// Persists the precomputed `params` column for a freshly-initialized
    /// task (spec §4.3 precomputed component). Called once by the Run
    /// Coordinator before any attempt runs.
    pub fn precompute(&self, task: &TaskDescriptor) -> std::collections::HashMap<String, Value> {
        precompute_params(task, &self.registry)
    }

    /// A clone of the shared Results map, for the Scheduler's readiness
    /// checks.
    pub fn results(&self) -> Results {
        self.results.clone()
    }

    /// Runs `task` through its retry loop. Returns `Ok(true)` if the task
    /// reached `completed`, `Ok(false)` if it exhausted its retries and
    /// ended `failed`. Only a [`StoreError`] (persistence failure) is
    /// fatal — attempt-level failures are recorded and retried internally.
    pub async fn execute(
        &self,
        run_id: &str,
        task: &TaskDescriptor,
        max_retries: u32,
        retry_delay_secs: u64,
    ) -> Result<bool, StoreError> {
        let stored = self
            .store
            .load(run_id, &task.id)
            .await?
            .ok_or_else(|| StoreError::NotFound {
                run_id: run_id.to_string(),
                task_id: task.id.clone(),
            })?;

        let stored_params = stored.params;
        let starting_attempt = stored.retry_count.max(0) as u32;

        info!(task_id = %task.id, "starting task");

        for attempt in starting_attempt..max_retries {
            let attempt_number = attempt + 1;

            self.store
                .save(
                    run_id,
                    &task.id,
                    TaskStatus::Running,
                    &stored_params,
                    None,
                    None,
                    attempt_number as i32,
                )
                .await?;
            info!(
                task_id = %task.id,
                attempt = attempt_number,
                max_retries,
                "task attempt running"
            );

            match self.run_attempt(task, &stored_params).await {
                Ok(mut result) => {
                    self.relocate_output_file(&mut result).await;

                    self.store
                        .save(
                            run_id,
                            &task.id,
                            TaskStatus::Completed,
                            &stored_params,
                            Some(&result),
                            None,
                            attempt_number as i32,
                        )
                        .await?;
                    self.results.insert(task.id.clone(), result).await;

                    info!(task_id = %task.id, attempt = attempt_number, "task completed");
                    return Ok(true);
                }
                Err(message) => {
                    self.store
                        .save(
                            run_id,
                            &task.id,
                            TaskStatus::Failed,
                            &stored_params,
                            None,
                            Some(&message),
                            attempt_number as i32,
                        )
                        .await?;
                    warn!(
                        task_id = %task.id,
                        attempt = attempt_number,
                        max_retries,
                        error = %message,
                        "task attempt failed"
                    );

                    if attempt_number < max_retries {
                        tokio::time::sleep(Duration::from_secs(retry_delay_secs)).await;
                        continue;
                    } else {
                        error!(task_id = %task.id, max_retries, "task exhausted retries");
                        return Ok(false);
                    }
                }
            }
        }

        Ok(false)
    }

    /// One attempt: resolve `dependent_params` against the current Results
    /// snapshot, then invoke the operation. Both failure modes become an
    /// attempt failure (spec §4.5b).
    async fn run_attempt(
        &self,
        task: &TaskDescriptor,
        stored_params: &std::collections::HashMap<String, Value>,
    ) -> Result<ResultMap, String> {
        let params = resolve_params(task, stored_params, &self.results)
            .await
            .map_err(|e| e.to_string())?;

        let operation = self.registry.get(&task.operation).ok_or_else(|| {
            format!(
                "operation '{}' not found in registry (should have been caught at validation)",
                task.operation
            )
        })?;

        operation.invoke(params).await.map_err(|e| e.to_string())
    }

    /// If the result carries the reserved `output_file_path` key, moves the
    /// file into the run directory and rewrites the key to the new path
    /// (spec §4.5, §6). Best-effort: a missing or unmovable source file
    /// leaves the original path in place rather than failing the task,
    /// since relocation is a convenience, not part of the operation's
    /// contract.
    async fn relocate_output_file(&self, result: &mut ResultMap) {
        let Some(source) = result
            .get(OUTPUT_FILE_PATH_KEY)
            .and_then(Value::as_str)
            .map(PathBuf::from)
        else {
            return;
        };

        let Some(file_name) = source.file_name() else {
            return;
        };
        let destination = self.run_dir.join(file_name);

        if move_file(&source, &destination).await.is_ok() {
            result.insert(
                OUTPUT_FILE_PATH_KEY.to_string(),
                Value::String(destination.to_string_lossy().to_string()),
            );
        }
    }
}

async fn move_file(source: &Path, destination: &Path) -> std::io::Result<()> {
    match tokio::fs::rename(source, destination).await {
        Ok(()) => Ok(()),
        Err(_) => {
            tokio::fs::copy(source, destination).await?;
            tokio::fs::remove_file(source).await.ok();
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dag::TaskDescriptor;
    use crate::database::Database;
    use async_trait::async_trait;
    use serde_json::json;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tempfile::tempdir;

    struct FlakyOperation {
        fail_until: usize,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl crate::registry::Operation for FlakyOperation {
        async fn invoke(
            &self,
            _params: HashMap<String, Value>,
        ) -> Result<HashMap<String, Value>, crate::error::OperationError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.fail_until {
                Err(crate::error::OperationError::new("not yet"))
            } else {
                Ok(HashMap::from([("ok".to_string(), json!(true))]))
            }
        }

        fn default_parameters(&self) -> HashMap<String, Value> {
            HashMap::new()
        }
    }

    async fn fresh_executor(
        run_dir: &Path,
        registry: OperationRegistry,
    ) -> (TaskExecutor, StateStore) {
        let db = Database::new(":memory:", 1).unwrap();
        db.run_migrations().await.unwrap();
        let store = StateStore::new(db);
        let executor = TaskExecutor::new(
            store.clone(),
            Arc::new(registry),
            Results::new(),
            run_dir.to_path_buf(),
        );
        (executor, store)
    }

    fn task(operation: &str) -> TaskDescriptor {
        TaskDescriptor {
            id: "A".to_string(),
            operation: operation.to_string(),
            dependencies: vec![],
            independent_params: HashMap::new(),
            dependent_params: HashMap::new(),
        }
    }

    #[tracing_test::traced_test]
    #[tokio::test]
    async fn completion_is_logged_at_info() {
        let dir = tempdir().unwrap();
        let mut registry = OperationRegistry::new();
        registry.register_builtins();
        let (executor, store) = fresh_executor(dir.path(), registry).await;

        let t = task("identity");
        store
            .init_partition("run1", vec![(t.id.clone(), executor.precompute(&t))])
            .await
            .unwrap();

        executor.execute("run1", &t, 3, 0).await.unwrap();
        assert!(logs_contain("task completed"));
    }

    #[tokio::test]
    async fn succeeds_on_first_attempt() {
        let dir = tempdir().unwrap();
        let mut registry = OperationRegistry::new();
        registry.register_builtins();
        let (executor, store) = fresh_executor(dir.path(), registry).await;

        let t = task("identity");
        store
            .init_partition("run1", vec![(t.id.clone(), executor.precompute(&t))])
            .await
            .unwrap();

        let completed = executor.execute("run1", &t, 3, 0).await.unwrap();
        assert!(completed);
        let state = store.load("run1", &t.id).await.unwrap().unwrap();
        assert_eq!(state.status, TaskStatus::Completed);
        assert_eq!(state.retry_count, 1);
    }

    #[tokio::test]
    async fn retries_then_succeeds() {
        let dir = tempdir().unwrap();
        let mut registry = OperationRegistry::new();
        registry.register("flaky", Arc::new(FlakyOperation {
            fail_until: 2,
            calls: AtomicUsize::new(0),
        }));
        let (executor, store) = fresh_executor(dir.path(), registry).await;

        let t = task("flaky");
        store
            .init_partition("run1", vec![(t.id.clone(), HashMap::new())])
            .await
            .unwrap();

        let completed = executor.execute("run1", &t, 3, 0).await.unwrap();
        assert!(completed);
        let state = store.load("run1", &t.id).await.unwrap().unwrap();
        assert_eq!(state.status, TaskStatus::Completed);
        assert_eq!(state.retry_count, 3);
    }

    #[tokio::test]
    async fn exhausts_retries_and_stays_failed() {
        let dir = tempdir().unwrap();
        let mut registry = OperationRegistry::new();
        registry.register("flaky", Arc::new(FlakyOperation {
            fail_until: 100,
            calls: AtomicUsize::new(0),
        }));
        let (executor, store) = fresh_executor(dir.path(), registry).await;

        let t = task("flaky");
        store
            .init_partition("run1", vec![(t.id.clone(), HashMap::new())])
            .await
            .unwrap();

        let completed = executor.execute("run1", &t, 2, 0).await.unwrap();
        assert!(!completed);
        let state = store.load("run1", &t.id).await.unwrap().unwrap();
        assert_eq!(state.status, TaskStatus::Failed);
        assert_eq!(state.retry_count, 2);
    }

    #[tokio::test]
    async fn relocates_output_file_into_run_directory() {
        let dir = tempdir().unwrap();
        let mut registry = OperationRegistry::new();
        registry.register_builtins();
        let (executor, store) = fresh_executor(dir.path(), registry).await;

        let mut t = task("write_file");
        t.independent_params
            .insert("content".to_string(), json!("hello"));
        t.independent_params
            .insert("file_name".to_string(), json!("out.txt"));
        store
            .init_partition("run1", vec![(t.id.clone(), executor.precompute(&t))])
            .await
            .unwrap();

        executor.execute("run1", &t, 1, 0).await.unwrap();
        let state = store.load("run1", &t.id).await.unwrap().unwrap();
        let result = state.result.unwrap();
        let path = result[OUTPUT_FILE_PATH_KEY].as_str().unwrap();
        assert!(path.starts_with(dir.path().to_str().unwrap()));
        assert!(std::path::Path::new(path).exists());
    }
}
