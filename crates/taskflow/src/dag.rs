//! DAG configuration types and validation.
//!
//! `DagConfig` is the external wire format (§6): a JSON document describing
//! a run's tasks, their dependencies, and their parameters. Validation here
//! enforces invariants I1-I5 before any task is allowed to execute.

use std::collections::{HashMap, HashSet};

use petgraph::algo::{is_cyclic_directed, toposort};
use petgraph::graph::{Graph, NodeIndex};
use petgraph::Directed;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ConfigError;
use crate::registry::OperationRegistry;

fn default_max_retries() -> u32 {
    3
}

fn default_retry_delay() -> u64 {
    3
}

/// A DAG configuration as submitted by a caller (§6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DagConfig {
    pub dag_name: String,

    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    #[serde(default = "default_retry_delay")]
    pub retry_delay: u64,

    pub tasks: Vec<TaskDescriptor>,

    /// Stamped in by the Run Coordinator once a run id has been allocated;
    /// absent on the caller-submitted document.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub dag_id: Option<String>,
}

/// One node in the DAG (§3 Task Descriptor).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskDescriptor {
    pub id: String,
    pub operation: String,

    #[serde(default)]
    pub dependencies: Vec<String>,

    #[serde(default)]
    pub independent_params: HashMap<String, Value>,

    #[serde(default)]
    pub dependent_params: HashMap<String, String>,
}

/// A `dependent_params` reference, parsed per §4.3.
///
/// The middle segment is accepted but deliberately unused — see spec §9's
/// Open Questions: implementers should not rely on it.
pub struct ParsedReference {
    pub source_task_id: String,
    pub source_result_key: String,
}

pub fn parse_reference(task_id: &str, reference: &str) -> Result<ParsedReference, ConfigError> {
    let segments: Vec<&str> = reference.split('.').collect();
    if segments.len() != 3 {
        return Err(ConfigError::MalformedReference {
            task: task_id.to_string(),
            reference: reference.to_string(),
        });
    }
    Ok(ParsedReference {
        source_task_id: segments[0].to_string(),
        source_result_key: segments[2].to_string(),
    })
}

/// Validates every invariant in spec §3: acyclic dependencies (I1),
/// resolvable dependent_params references (I2), known operation names
/// (I3), unique task ids (I4), and table-partition-safe task ids (I5).
pub fn validate_dag(config: &DagConfig, registry: &OperationRegistry) -> Result<(), ConfigError> {
    if config.tasks.is_empty() {
        return Err(ConfigError::EmptyDag);
    }

    let mut seen_ids = HashSet::new();
    for task in &config.tasks {
        if !seen_ids.insert(task.id.as_str()) {
            return Err(ConfigError::DuplicateTaskId(task.id.clone()));
        }
        if !is_safe_task_id(&task.id) {
            return Err(ConfigError::InvalidTaskId(task.id.clone()));
        }
    }

    for task in &config.tasks {
        if !registry.contains(&task.operation) {
            return Err(ConfigError::UnknownOperation {
                task: task.id.clone(),
                operation: task.operation.clone(),
            });
        }
        for dep in &task.dependencies {
            if !seen_ids.contains(dep.as_str()) {
                return Err(ConfigError::UnknownDependency {
                    task: task.id.clone(),
                    dependency: dep.clone(),
                });
            }
        }
        for reference in task.dependent_params.values() {
            let parsed = parse_reference(&task.id, reference)?;
            if !seen_ids.contains(parsed.source_task_id.as_str()) {
                return Err(ConfigError::UnknownReference {
                    task: task.id.clone(),
                    reference: reference.clone(),
                    source_task: parsed.source_task_id,
                });
            }
        }
    }

    if has_cycles(config) {
        return Err(ConfigError::CyclicDependency);
    }

    Ok(())
}

fn is_safe_task_id(id: &str) -> bool {
    !id.is_empty() && id.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn build_graph(config: &DagConfig) -> (Graph<String, (), Directed>, HashMap<String, NodeIndex>) {
    let mut graph = Graph::<String, (), Directed>::new();
    let mut node_indices = HashMap::new();

    for task in &config.tasks {
        let index = graph.add_node(task.id.clone());
        node_indices.insert(task.id.clone(), index);
    }

    for task in &config.tasks {
        let to_index = node_indices[&task.id];
        for dep in &task.dependencies {
            if let Some(&from_index) = node_indices.get(dep) {
                graph.add_edge(from_index, to_index, ());
            }
        }
    }

    (graph, node_indices)
}

fn has_cycles(config: &DagConfig) -> bool {
    let (graph, _) = build_graph(config);
    is_cyclic_directed(&graph)
}

/// Returns task ids in topological order. Only meaningful after
/// [`validate_dag`] has confirmed the graph is acyclic.
pub fn topological_order(config: &DagConfig) -> Result<Vec<String>, ConfigError> {
    let (graph, _) = build_graph(config);
    match toposort(&graph, None) {
        Ok(sorted) => Ok(sorted.into_iter().map(|idx| graph[idx].clone()).collect()),
        Err(_) => Err(ConfigError::CyclicDependency),
    }
}
