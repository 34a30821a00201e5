//! SQLite connection pooling.
//!
//! Async pool via `deadpool-diesel`, the same crate the teacher uses for its
//! async backend, rather than the teacher's older sync `r2d2` pool: the
//! executor needs connection acquisition and queries to be suspension
//! points (spec §5), which a sync pool cannot provide without blocking a
//! worker thread.
//!
//! This crate supports SQLite only — see `DESIGN.md` for why the teacher's
//! dual Postgres/SQLite `AnyConnection`/`MultiConnection` machinery isn't
//! carried over.

use deadpool_diesel::sqlite::{Manager, Pool, Runtime};
use diesel_migrations::{embed_migrations, EmbeddedMigrations, MigrationHarness};
use tracing::info;

use crate::error::StoreError;

pub const MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations");

/// A pool of SQLite connections backing the State Store.
#[derive(Clone)]
pub struct Database {
    pool: Pool,
}

impl Database {
    /// Opens (or creates) the sqlite database at `path` and builds a
    /// connection pool. Pass `:memory:` for an in-process database, used
    /// throughout the test suite.
    ///
    /// `requested_size` is accepted from the caller's settings for parity
    /// with a pool-sized backend, but is clamped to 1, matching
    /// `crates/cloacina/src/database/connection.rs`'s SQLite branch: SQLite
    /// has limited concurrent write support even with WAL mode, so a pool
    /// of more than one connection just trades "database is locked" errors
    /// for silent inconsistency — with a `:memory:` URL each pooled
    /// connection is an independent database, so migrations run on one
    /// connection would be invisible to queries routed to another.
    pub fn new(path: &str, requested_size: usize) -> Result<Self, StoreError> {
        let max_size = 1;
        if requested_size > max_size {
            info!(
                path,
                requested_size, max_size, "clamping sqlite pool to a single connection"
            );
        }

        let manager = Manager::new(path, Runtime::Tokio1);
        let pool = Pool::builder(manager)
            .max_size(max_size)
            .build()
            .map_err(|e| StoreError::Connection(e.to_string()))?;

        info!(path, max_size, "sqlite connection pool initialized");

        Ok(Self { pool })
    }

    pub fn pool(&self) -> &Pool {
        &self.pool
    }

    /// Runs pending migrations, setting WAL mode and a generous
    /// `busy_timeout` first for better concurrent-access behavior, matching
    /// `crates/cloacina/src/database/connection.rs::run_migrations`.
    pub async fn run_migrations(&self) -> Result<(), StoreError> {
        let conn = self
            .pool
            .get()
            .await
            .map_err(|e| StoreError::Connection(e.to_string()))?;

        conn.interact(|conn| {
            use diesel::prelude::*;
            diesel::sql_query("PRAGMA journal_mode=WAL;").execute(conn)?;
            diesel::sql_query("PRAGMA busy_timeout=30000;").execute(conn)?;
            conn.run_pending_migrations(MIGRATIONS)
                .map(|_| ())
                .map_err(|e| diesel::result::Error::QueryBuilderError(e))
        })
        .await
        .map_err(|e| StoreError::Connection(e.to_string()))?
        .map_err(StoreError::Query)?;

        Ok(())
    }
}
