//! Tracing-subscriber initialization, matching
//! `cloacina-ctl/src/utils/logging.rs`'s verbose/quiet mapping onto a real
//! `tracing_subscriber::fmt` subscriber rather than a raw `RUST_LOG` set.

use crate::cli::Cli;

pub fn init_logging(cli: &Cli) {
    let level = if cli.quiet {
        "error"
    } else if cli.verbose {
        "debug"
    } else {
        "info"
    };

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    tracing_subscriber::fmt().with_env_filter(filter).init();
}
