//! The shared, in-memory Results map (spec §3, §9).
//!
//! Wrapped in a [`tokio::sync::Mutex`] rather than a sync `std::sync::Mutex`
//! since resolution and mutation happen across `.await` points (reading for
//! param binding, writing after task completion may both occur inside a
//! spawned task holding the lock across other awaits is avoided, but the
//! lock itself must be held through async code paths).

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::Mutex;

pub type ResultMap = HashMap<String, Value>;

/// A concurrent map from task id to that task's result mapping, shared
/// between the executor (writer on success) and sibling executors
/// resolving `dependent_params` (readers).
#[derive(Clone, Default)]
pub struct Results {
    inner: Arc<Mutex<HashMap<String, ResultMap>>>,
}

impl Results {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub async fn insert(&self, task_id: String, result: ResultMap) {
        self.inner.lock().await.insert(task_id, result);
    }

    pub async fn get(&self, task_id: &str) -> Option<ResultMap> {
        self.inner.lock().await.get(task_id).cloned()
    }

    pub async fn contains(&self, task_id: &str) -> bool {
        self.inner.lock().await.contains_key(task_id)
    }

    /// A consistent point-in-time snapshot, used when writing `results.json`
    /// and when the Readiness Evaluator checks dependency satisfaction.
    pub async fn snapshot(&self) -> HashMap<String, ResultMap> {
        self.inner.lock().await.clone()
    }
}
