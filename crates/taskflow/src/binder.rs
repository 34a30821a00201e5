//! Parameter Binder (C3): merges `independent_params`, operation defaults,
//! and resolved `dependent_params` references into the mapping an operation
//! is invoked with (spec §4.3).
//!
//! Grounded on `original_source/orchestrator.py`'s `_get_funcs_param` (the
//! precomputed component) and the inline resolution step in
//! `_execute_single_task` (the per-attempt component), which this module
//! reproduces with the exact same `.split(".")` segment semantics.

use std::collections::HashMap;

use serde_json::Value;

use crate::dag::{parse_reference, TaskDescriptor};
use crate::error::BindError;
use crate::registry::OperationRegistry;
use crate::results::Results;

/// Precomputed component (spec §4.3 step 1-2): `independent_params` plus
/// the operation's declared defaults for any name the task didn't supply.
/// Computed once, at init, and persisted to the `params` column.
pub fn precompute_params(
    task: &TaskDescriptor,
    registry: &OperationRegistry,
) -> HashMap<String, Value> {
    let mut params = task.independent_params.clone();
    if let Some(defaults) = registry.default_parameters(&task.operation) {
        for (name, default_value) in defaults {
            params.entry(name).or_insert(default_value);
        }
    }
    params
}

/// Per-attempt component (spec §4.3 step 3): resolves every
/// `dependent_params` reference against the current Results snapshot and
/// merges the resolved values into a copy of the stored `params`.
/// `dependent_params` wins on key collision, since it is applied last.
pub async fn resolve_params(
    task: &TaskDescriptor,
    stored_params: &HashMap<String, Value>,
    results: &Results,
) -> Result<HashMap<String, Value>, BindError> {
    let mut merged = stored_params.clone();

    for (param_name, reference) in &task.dependent_params {
        // Malformed references are rejected at config-validation time
        // (ConfigError::MalformedReference), so parsing here cannot fail
        // for a DAG that passed validate_dag.
        let parsed = parse_reference(&task.id, reference)
            .map_err(|_| BindError::MissingDependencyValue(reference.clone()))?;

        let source_result = results
            .get(&parsed.source_task_id)
            .await
            .ok_or_else(|| BindError::MissingDependencyValue(parsed.source_task_id.clone()))?;

        let value = source_result
            .get(&parsed.source_result_key)
            .cloned()
            .ok_or_else(|| BindError::MissingResultKey {
                task: parsed.source_task_id.clone(),
                key: parsed.source_result_key.clone(),
            })?;

        merged.insert(param_name.clone(), value);
    }

    Ok(merged)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dag::TaskDescriptor;
    use serde_json::json;

    fn task_with_dependent(param: &str, reference: &str) -> TaskDescriptor {
        TaskDescriptor {
            id: "B".to_string(),
            operation: "identity".to_string(),
            dependencies: vec!["A".to_string()],
            independent_params: HashMap::new(),
            dependent_params: HashMap::from([(param.to_string(), reference.to_string())]),
        }
    }

    #[test]
    fn precompute_fills_operation_defaults() {
        let mut registry = OperationRegistry::new();
        registry.register_builtins();
        let task = TaskDescriptor {
            id: "A".to_string(),
            operation: "uppercase".to_string(),
            dependencies: vec![],
            independent_params: HashMap::new(),
            dependent_params: HashMap::new(),
        };
        let params = precompute_params(&task, &registry);
        assert_eq!(params.get("text"), Some(&Value::Null));
    }

    #[test]
    fn precompute_does_not_override_supplied_value() {
        let mut registry = OperationRegistry::new();
        registry.register_builtins();
        let task = TaskDescriptor {
            id: "A".to_string(),
            operation: "uppercase".to_string(),
            dependencies: vec![],
            independent_params: HashMap::from([("text".to_string(), json!("hi"))]),
            dependent_params: HashMap::new(),
        };
        let params = precompute_params(&task, &registry);
        assert_eq!(params.get("text"), Some(&json!("hi")));
    }

    #[tokio::test]
    async fn resolve_substitutes_dependent_value_ignoring_middle_segment() {
        let results = Results::new();
        results
            .insert("A".to_string(), HashMap::from([("x".to_string(), json!(1))]))
            .await;
        let task = task_with_dependent("x", "A.ignored_field.x");
        let resolved = resolve_params(&task, &HashMap::new(), &results).await.unwrap();
        assert_eq!(resolved["x"], json!(1));
    }

    #[tokio::test]
    async fn resolve_fails_on_missing_dependency_value() {
        let results = Results::new();
        let task = task_with_dependent("x", "A.ignored.x");
        let err = resolve_params(&task, &HashMap::new(), &results)
            .await
            .unwrap_err();
        assert!(matches!(err, BindError::MissingDependencyValue(_)));
    }

    #[tokio::test]
    async fn resolve_fails_on_missing_result_key() {
        let results = Results::new();
        results
            .insert("A".to_string(), HashMap::from([("y".to_string(), json!(1))]))
            .await;
        let task = task_with_dependent("x", "A.ignored.x");
        let err = resolve_params(&task, &HashMap::new(), &results)
            .await
            .unwrap_err();
        assert!(matches!(err, BindError::MissingResultKey { .. }));
    }

    #[tokio::test]
    async fn dependent_params_wins_on_collision() {
        let results = Results::new();
        results
            .insert("A".to_string(), HashMap::from([("x".to_string(), json!(99))]))
            .await;
        let task = task_with_dependent("x", "A.ignored.x");
        let stored = HashMap::from([("x".to_string(), json!(1))]);
        let resolved = resolve_params(&task, &stored, &results).await.unwrap();
        assert_eq!(resolved["x"], json!(99));
    }
}
