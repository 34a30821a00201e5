//! End-to-end scenarios mirroring the testable properties of a DAG run:
//! diamond-shaped parallel branches and resume-after-recovery.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::json;
use serial_test::serial;
use taskflow::dag::TaskDescriptor;
use taskflow::database::Database;
use taskflow::registry::OperationRegistry;
use taskflow::store::{StateStore, TaskStatus};
use taskflow::{DagConfig, RunCoordinator, RunMode};
use tempfile::tempdir;

fn task(id: &str, deps: &[&str]) -> TaskDescriptor {
    TaskDescriptor {
        id: id.to_string(),
        operation: "identity".to_string(),
        dependencies: deps.iter().map(|s| s.to_string()).collect(),
        independent_params: HashMap::from([("value".to_string(), json!(id))]),
        dependent_params: HashMap::new(),
    }
}

async fn coordinator(runs_root: &std::path::Path) -> RunCoordinator {
    let db = Database::new(":memory:", 1).unwrap();
    db.run_migrations().await.unwrap();
    let store = StateStore::new(db);
    let mut registry = OperationRegistry::new();
    registry.register_builtins();
    RunCoordinator::new(store, Arc::new(registry), runs_root.to_path_buf(), 8)
}

#[tokio::test]
#[serial]
async fn diamond_dag_completes_all_branches() {
    let root = tempdir().unwrap();
    let coordinator = coordinator(root.path()).await;

    let config = DagConfig {
        dag_name: "diamond".into(),
        max_retries: 3,
        retry_delay: 0,
        tasks: vec![
            task("A", &[]),
            task("B", &["A"]),
            task("C", &["A"]),
            task("D", &["B", "C"]),
        ],
        dag_id: None,
    };

    let packaged = coordinator.run(config, RunMode::Fresh).await.unwrap();

    let results_raw = std::fs::read_to_string(packaged.dag_path.join("results.json")).unwrap();
    let results: HashMap<String, serde_json::Value> = serde_json::from_str(&results_raw).unwrap();
    assert_eq!(results.len(), 4);
    assert!(results.contains_key("D"));
}

#[tokio::test]
#[serial]
async fn recovery_preserves_completed_tasks() {
    let root = tempdir().unwrap();

    let db = Database::new(":memory:", 1).unwrap();
    db.run_migrations().await.unwrap();
    let store = StateStore::new(db);
    let mut registry = OperationRegistry::new();
    registry.register_builtins();
    let coordinator = RunCoordinator::new(
        store.clone(),
        Arc::new(registry),
        root.path().to_path_buf(),
        8,
    );

    let config = DagConfig {
        dag_name: "chain".into(),
        max_retries: 3,
        retry_delay: 0,
        tasks: vec![task("A", &[]), task("B", &["A"])],
        dag_id: None,
    };

    let first = coordinator.run(config.clone(), RunMode::Fresh).await.unwrap();
    let run_id = first
        .dag_path
        .file_name()
        .unwrap()
        .to_string_lossy()
        .to_string();

    let before = store.load(&run_id, "A").await.unwrap().unwrap();
    assert_eq!(before.status, TaskStatus::Completed);

    let mut resumed_config = config;
    resumed_config.dag_id = Some(run_id.clone());
    coordinator
        .run(resumed_config, RunMode::Recover { run_id: run_id.clone() })
        .await
        .unwrap();

    let after = store.load(&run_id, "A").await.unwrap().unwrap();
    assert_eq!(after.created_at, before.created_at);
    assert_eq!(after.retry_count, before.retry_count);
}
