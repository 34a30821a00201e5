//! Command-line surface for `taskflowctl`.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "taskflowctl",
    version,
    about = "Run and inspect taskflow DAG executions"
)]
pub struct Cli {
    /// Path to a TaskflowConfig TOML file.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable verbose (debug-level) logging.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Suppress non-essential output.
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Submit a DAG config and run it to completion.
    Run {
        /// Path to a DAG config JSON file.
        config_path: PathBuf,

        /// Resume a previously-started run instead of starting fresh.
        #[arg(long)]
        recover: Option<String>,
    },
    /// Print the task states for a prior or in-progress run.
    Status {
        /// The run id to query.
        #[arg(long = "run-id")]
        run_id: String,
    },
}
