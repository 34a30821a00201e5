//! `taskflow`: a DAG task orchestration engine.
//!
//! Executes user-defined task graphs described by a declarative JSON
//! configuration. Each task invokes one of a fixed registry of asynchronous
//! operations, optionally consuming outputs produced by upstream tasks. The
//! engine resolves dependencies, runs independent tasks concurrently,
//! retries failures with bounded attempts, persists per-task state so an
//! aborted run can be resumed, and packages the artifacts of a successful
//! run into a zip archive.
//!
//! See [`coordinator::RunCoordinator`] for the entry point.

pub mod binder;
pub mod coordinator;
pub mod dag;
pub mod database;
pub mod error;
pub mod executor;
pub mod operations;
pub mod packager;
pub mod registry;
pub mod results;
pub mod scheduler;
pub mod settings;
pub mod store;

pub use coordinator::{RunCoordinator, RunMode};
pub use dag::{DagConfig, TaskDescriptor};
pub use error::RunError;
pub use packager::PackagedRun;
pub use registry::{Operation, OperationRegistry};
pub use settings::TaskflowConfig;
