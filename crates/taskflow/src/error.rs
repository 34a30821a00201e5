//! Error types for every stage of a run, from config validation through
//! packaging.
//!
//! Mirrors the split the source distinguishes by propagation behavior:
//! configuration and persistence failures are fatal to the run, while
//! parameter-resolution and operation failures are attempt-level and are
//! caught by the executor's retry loop.

use thiserror::Error;

/// Failures raised while validating a DAG configuration, before any task
/// runs. Fatal: the run never starts.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("dependency graph contains a cycle")]
    CyclicDependency,

    #[error("task '{0}' is not unique within the DAG")]
    DuplicateTaskId(String),

    #[error("task '{task}' depends on unknown task '{dependency}'")]
    UnknownDependency { task: String, dependency: String },

    #[error("task '{task}' references unknown operation '{operation}'")]
    UnknownOperation { task: String, operation: String },

    #[error(
        "task '{task}' has a dependent_params reference '{reference}' pointing to unknown task '{source_task}'"
    )]
    UnknownReference {
        task: String,
        reference: String,
        source_task: String,
    },

    #[error(
        "task '{task}' has a malformed dependent_params reference '{reference}' (expected '<task_id>.<ignored>.<result_key>')"
    )]
    MalformedReference { task: String, reference: String },

    #[error(
        "task id '{0}' is not usable as a table-partition label (must be alphanumeric/underscore)"
    )]
    InvalidTaskId(String),

    #[error("DAG has no tasks")]
    EmptyDag,
}

/// Failures raised while resolving `dependent_params` for a single attempt.
/// Attempt-level: caught by the executor's retry loop.
#[derive(Debug, Error)]
pub enum BindError {
    #[error("dependency value missing: task '{0}' has not produced a result yet")]
    MissingDependencyValue(String),

    #[error("result key '{key}' not found in result of task '{task}'")]
    MissingResultKey { task: String, key: String },
}

/// Failure raised by an operation callable itself. The message is persisted
/// verbatim as the task's `error` column.
#[derive(Debug, Error)]
#[error("{0}")]
pub struct OperationError(pub String);

impl OperationError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// Failures from the State Store. Fatal: re-raised by the executor.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database connection error: {0}")]
    Connection(String),

    #[error("database query error: {0}")]
    Query(#[from] diesel::result::Error),

    #[error("failed to (de)serialize task state column: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("no state row for run '{run_id}' task '{task_id}'")]
    NotFound { run_id: String, task_id: String },
}

/// Failures raised by the Artifact Packager. Surfaced to the caller after
/// execution completes.
#[derive(Debug, Error)]
pub enum PackagingError {
    #[error("failed to write {path}: {source}")]
    Write {
        path: String,
        source: std::io::Error,
    },

    #[error("failed to serialize {what}: {source}")]
    Serialize {
        what: String,
        source: serde_json::Error,
    },

    #[error("failed to build zip archive: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("io error while packaging: {0}")]
    Io(#[from] std::io::Error),
}

/// Top-level error type returned by the Run Coordinator to its caller.
#[derive(Debug, Error)]
pub enum RunError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Packaging(#[from] PackagingError),

    #[error("failed to create run directory {path}: {source}")]
    RunDirectory {
        path: String,
        source: std::io::Error,
    },
}
