mod cli;
mod logging;

use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use cli::{Cli, Commands};
use taskflow::database::Database;
use taskflow::registry::OperationRegistry;
use taskflow::store::StateStore;
use taskflow::{DagConfig, RunCoordinator, RunMode, TaskflowConfig};
use tracing::error;

/// Exit code contract (spec §6, refined by `SPEC_FULL.md`'s Supplemented
/// Features): 0 = every task completed, 1 = at least one task ended
/// `failed`, 2 = the run never started or never finished cleanly.
const EXIT_SUCCESS: u8 = 0;
const EXIT_TASK_FAILED: u8 = 1;
const EXIT_RUN_ERROR: u8 = 2;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    logging::init_logging(&cli);

    let config = match TaskflowConfig::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            error!(error = %e, "failed to load engine configuration");
            return ExitCode::from(EXIT_RUN_ERROR);
        }
    };

    match run(&cli, config).await {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            error!(error = %e, "taskflowctl failed");
            ExitCode::from(EXIT_RUN_ERROR)
        }
    }
}

async fn run(cli: &Cli, settings: TaskflowConfig) -> anyhow::Result<u8> {
    match &cli.command {
        Commands::Run {
            config_path,
            recover,
        } => run_dag(config_path, recover.clone(), settings).await,
        Commands::Status { run_id } => print_status(run_id, settings).await,
    }
}

async fn run_dag(
    config_path: &Path,
    recover: Option<String>,
    settings: TaskflowConfig,
) -> anyhow::Result<u8> {
    let raw = std::fs::read_to_string(config_path)?;
    let config: DagConfig = serde_json::from_str(&raw)?;

    let database = Database::new(
        &settings.database.url,
        settings.database.pool_size,
    )?;
    database.run_migrations().await?;
    let store = StateStore::new(database);
    let status_store = store.clone();

    let mut registry = OperationRegistry::new();
    registry.register_builtins();

    let coordinator = RunCoordinator::new(
        store,
        Arc::new(registry),
        settings.execution.runs_root.clone(),
        settings.execution.max_concurrency,
    );

    let mode = match recover {
        Some(run_id) => RunMode::Recover { run_id },
        None => RunMode::Fresh,
    };

    let packaged = coordinator.run(config, mode).await?;
    println!("{}", serde_json::json!({
        "dag_path": packaged.dag_path,
        "zip_path": packaged.zip_path,
    }));

    let run_id = packaged
        .dag_path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    let states = status_store.list(&run_id).await?;
    let any_failed = states
        .values()
        .any(|state| matches!(state.status, taskflow::store::TaskStatus::Failed));

    Ok(if any_failed {
        EXIT_TASK_FAILED
    } else {
        EXIT_SUCCESS
    })
}

async fn print_status(run_id: &str, settings: TaskflowConfig) -> anyhow::Result<u8> {
    let database = Database::new(&settings.database.url, settings.database.pool_size)?;
    let store = StateStore::new(database);

    let states = store.list(run_id).await?;
    if states.is_empty() {
        println!("{}", serde_json::json!({ "run_id": run_id, "tasks": {} }));
        return Ok(EXIT_SUCCESS);
    }

    let mut any_failed = false;
    let mut rendered = serde_json::Map::new();
    for (task_id, state) in &states {
        if matches!(state.status, taskflow::store::TaskStatus::Failed) {
            any_failed = true;
        }
        rendered.insert(
            task_id.clone(),
            serde_json::json!({
                "status": state.status.as_str(),
                "retry_count": state.retry_count,
                "error": state.error,
            }),
        );
    }

    println!(
        "{}",
        serde_json::json!({ "run_id": run_id, "tasks": rendered })
    );

    Ok(if any_failed {
        EXIT_TASK_FAILED
    } else {
        EXIT_SUCCESS
    })
}
