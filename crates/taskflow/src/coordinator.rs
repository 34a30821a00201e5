//! Run Coordinator (C8): allocates a run id and directory, orchestrates
//! init → schedule → package, and applies the non-recovery/recovery policy
//! (spec §4.2, §4.8).
//!
//! Random-id-retried-until-free is kept from
//! `original_source/orchestrator.py.__init__` rather than the teacher's
//! content-addressed `Workflow::calculate_version` — a run id identifies an
//! *execution*, not a *definition*, so content-hashing doesn't apply. See
//! `DESIGN.md`.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use rand::Rng;
use tracing::info;

use crate::dag::{validate_dag, DagConfig};
use crate::error::RunError;
use crate::executor::TaskExecutor;
use crate::packager::{package_run, PackagedRun};
use crate::registry::OperationRegistry;
use crate::results::Results;
use crate::scheduler::Scheduler;
use crate::store::StateStore;

/// Run id prefix, matching the source's fixed literal tag.
const RUN_ID_PREFIX: &str = "dag_run_";

/// Whether a submission starts fresh or resumes a prior attempt at the same
/// run id (spec §4.2's non-recovery/recovery policy).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunMode {
    /// Wipe the partition and force every task back to `pending`.
    Fresh,
    /// Preserve existing rows; only newly-added task ids are initialized.
    Recover { run_id: String },
}

pub struct RunCoordinator {
    store: StateStore,
    registry: Arc<OperationRegistry>,
    runs_root: PathBuf,
    max_concurrency: usize,
}

impl RunCoordinator {
    pub fn new(
        store: StateStore,
        registry: Arc<OperationRegistry>,
        runs_root: impl Into<PathBuf>,
        max_concurrency: usize,
    ) -> Self {
        Self {
            store,
            registry,
            runs_root: runs_root.into(),
            max_concurrency,
        }
    }

    /// Runs `config` to completion under `mode`, returning the archive
    /// paths (spec §4.8). Validation failures and store/packaging failures
    /// propagate; individual task failures do not.
    pub async fn run(
        &self,
        mut config: DagConfig,
        mode: RunMode,
    ) -> Result<PackagedRun, RunError> {
        validate_dag(&config, &self.registry)?;

        let run_id = match &mode {
            RunMode::Fresh => self.allocate_run_id()?,
            RunMode::Recover { run_id } => run_id.clone(),
        };
        config.dag_id = Some(run_id.clone());

        let run_dir = self.runs_root.join(&run_id);
        std::fs::create_dir_all(&run_dir).map_err(|source| RunError::RunDirectory {
            path: run_dir.display().to_string(),
            source,
        })?;
        info!(run_id, path = %run_dir.display(), "run directory ready");

        if mode == RunMode::Fresh {
            self.store.cleanup_partition(&run_id).await?;
        }

        let results = Results::new();
        let executor = Arc::new(TaskExecutor::new(
            self.store.clone(),
            self.registry.clone(),
            results,
            run_dir.clone(),
        ));

        let precomputed: Vec<(String, std::collections::HashMap<String, serde_json::Value>)> =
            config
                .tasks
                .iter()
                .map(|task| (task.id.clone(), executor.precompute(task)))
                .collect();
        self.store.init_partition(&run_id, precomputed).await?;

        // On recovery, tasks already `completed` in a prior attempt carry no
        // in-memory Results entry yet — without this, the Readiness
        // Evaluator would never see their dependents as ready, since it
        // checks the Results map, not the store, for dependency
        // satisfaction (spec §4.4). Hydrate from whatever the store already
        // has before the Scheduler starts.
        let existing = self.store.list(&run_id).await?;
        for (task_id, state) in existing {
            if let Some(result) = state.result {
                executor.results().insert(task_id, result).await;
            }
        }

        let scheduler = Scheduler::new(executor, self.max_concurrency);
        let results = scheduler.run(&run_id, &config, &self.store).await?;

        info!(run_id, completed = results.len(), "scheduler reached fixpoint");

        let packaged = package_run(&run_dir, &config, &results)?;
        Ok(packaged)
    }

    fn allocate_run_id(&self) -> Result<String, RunError> {
        let mut rng = rand::thread_rng();
        for _ in 0..10_000 {
            let candidate = format!("{RUN_ID_PREFIX}{}", rng.gen::<u32>());
            let candidate_dir = self.runs_root.join(&candidate);
            if !candidate_dir.exists() {
                return Ok(candidate);
            }
        }
        Err(RunError::RunDirectory {
            path: self.runs_root.display().to_string(),
            source: std::io::Error::new(
                std::io::ErrorKind::AlreadyExists,
                "exhausted random run id attempts",
            ),
        })
    }
}
