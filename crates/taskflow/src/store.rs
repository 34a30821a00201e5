//! State Store (C2): a single shared `task_states` table keyed by
//! `(run_id, task_id)`.
//!
//! Spec §9 recommends this over the source's one-table-per-run-id scheme
//! (`orchestrator.py` interpolates `self.dag_id` directly into `CREATE
//! TABLE`/`INSERT`/`UPDATE` statements — unsafe dynamic DDL). One shared
//! table with an indexed `run_id` column gives the same per-run isolation
//! without identifier interpolation, and unifies cleanup into a single
//! `DELETE ... WHERE run_id = ?`.

use std::collections::HashMap;

use chrono::{NaiveDateTime, Utc};
use diesel::prelude::*;
use serde_json::Value;

use crate::database::schema::task_states;
use crate::database::Database;
use crate::error::StoreError;

/// A task's lifecycle position (spec §3). Stored as text; never round-trips
/// through an integer discriminant so the column stays human-readable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Running => "running",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
        }
    }

    pub fn parse(value: &str) -> Result<Self, StoreError> {
        match value {
            "pending" => Ok(TaskStatus::Pending),
            "running" => Ok(TaskStatus::Running),
            "completed" => Ok(TaskStatus::Completed),
            "failed" => Ok(TaskStatus::Failed),
            other => Err(StoreError::Connection(format!(
                "unrecognized task status '{other}'"
            ))),
        }
    }
}

/// One row of the `task_states` table (spec §3 Task State), deserialized
/// into typed `params`/`result` values.
#[derive(Debug, Clone)]
pub struct TaskState {
    pub run_id: String,
    pub task_id: String,
    pub status: TaskStatus,
    pub params: HashMap<String, Value>,
    pub result: Option<HashMap<String, Value>>,
    pub error: Option<String>,
    pub retry_count: i32,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Queryable, Selectable)]
#[diesel(table_name = task_states)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
struct TaskStateRow {
    run_id: String,
    task_id: String,
    status: String,
    params: String,
    result: Option<String>,
    error: Option<String>,
    retry_count: i32,
    created_at: NaiveDateTime,
    updated_at: NaiveDateTime,
}

impl TaskStateRow {
    fn into_task_state(self) -> Result<TaskState, StoreError> {
        Ok(TaskState {
            run_id: self.run_id,
            task_id: self.task_id,
            status: TaskStatus::parse(&self.status)?,
            params: serde_json::from_str(&self.params)?,
            result: self
                .result
                .map(|r| serde_json::from_str(&r))
                .transpose()?,
            error: self.error,
            retry_count: self.retry_count,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

#[derive(Insertable)]
#[diesel(table_name = task_states)]
struct NewTaskStateRow {
    run_id: String,
    task_id: String,
    status: String,
    params: String,
    result: Option<String>,
    error: Option<String>,
    retry_count: i32,
    created_at: NaiveDateTime,
    updated_at: NaiveDateTime,
}

/// The State Store. Wraps a [`Database`] connection pool with the
/// operations spec §4.2 names.
#[derive(Clone)]
pub struct StateStore {
    database: Database,
}

impl StateStore {
    pub fn new(database: Database) -> Self {
        Self { database }
    }

    /// `init_partition`: inserts a `pending` row (retry_count=0) for every
    /// task id not already present. Uses `INSERT OR IGNORE` semantics so a
    /// row surviving from a prior run (recovery flow) is left untouched —
    /// see spec §4.2's non-recovery/recovery policy.
    pub async fn init_partition(
        &self,
        run_id: &str,
        tasks: Vec<(String, HashMap<String, Value>)>,
    ) -> Result<(), StoreError> {
        let conn = self
            .database
            .pool()
            .get()
            .await
            .map_err(|e| StoreError::Connection(e.to_string()))?;

        let run_id = run_id.to_string();
        let now = Utc::now().naive_utc();

        let rows = tasks
            .into_iter()
            .map(|(task_id, params)| {
                Ok(NewTaskStateRow {
                    run_id: run_id.clone(),
                    task_id,
                    status: TaskStatus::Pending.as_str().to_string(),
                    params: serde_json::to_string(&params)?,
                    result: None,
                    error: None,
                    retry_count: 0,
                    created_at: now,
                    updated_at: now,
                })
            })
            .collect::<Result<Vec<_>, serde_json::Error>>()?;

        conn.interact(move |conn| {
            for row in rows {
                diesel::insert_or_ignore_into(task_states::table)
                    .values(&row)
                    .execute(conn)?;
            }
            Ok::<_, diesel::result::Error>(())
        })
        .await
        .map_err(|e| StoreError::Connection(e.to_string()))??;

        Ok(())
    }

    /// `cleanup_partition`: removes every row for `run_id`. A `run_id` with
    /// no rows is not an error — the `DELETE` simply affects zero rows,
    /// unlike the source's `DROP TABLE`-adjacent "no such table" special
    /// case.
    pub async fn cleanup_partition(&self, run_id: &str) -> Result<(), StoreError> {
        let conn = self
            .database
            .pool()
            .get()
            .await
            .map_err(|e| StoreError::Connection(e.to_string()))?;
        let run_id = run_id.to_string();

        conn.interact(move |conn| {
            diesel::delete(task_states::table.filter(task_states::run_id.eq(run_id))).execute(conn)
        })
        .await
        .map_err(|e| StoreError::Connection(e.to_string()))??;

        Ok(())
    }

    pub async fn load(&self, run_id: &str, task_id: &str) -> Result<Option<TaskState>, StoreError> {
        let conn = self
            .database
            .pool()
            .get()
            .await
            .map_err(|e| StoreError::Connection(e.to_string()))?;
        let (run_id, task_id) = (run_id.to_string(), task_id.to_string());

        let row = conn
            .interact(move |conn| {
                task_states::table
                    .filter(task_states::run_id.eq(run_id))
                    .filter(task_states::task_id.eq(task_id))
                    .select(TaskStateRow::as_select())
                    .first(conn)
                    .optional()
            })
            .await
            .map_err(|e| StoreError::Connection(e.to_string()))??;

        row.map(TaskStateRow::into_task_state).transpose()
    }

    /// `save`: upsert preserving `created_at`, bumping `updated_at`.
    #[allow(clippy::too_many_arguments)]
    pub async fn save(
        &self,
        run_id: &str,
        task_id: &str,
        status: TaskStatus,
        params: &HashMap<String, Value>,
        result: Option<&HashMap<String, Value>>,
        error: Option<&str>,
        retry_count: i32,
    ) -> Result<(), StoreError> {
        let conn = self
            .database
            .pool()
            .get()
            .await
            .map_err(|e| StoreError::Connection(e.to_string()))?;

        let run_id = run_id.to_string();
        let task_id = task_id.to_string();
        let status_str = status.as_str().to_string();
        let params_json = serde_json::to_string(params)?;
        let result_json = result.map(serde_json::to_string).transpose()?;
        let error = error.map(|e| e.to_string());
        let now = Utc::now().naive_utc();

        conn.interact(move |conn| {
            let existing_created_at: Option<NaiveDateTime> = task_states::table
                .filter(task_states::run_id.eq(&run_id))
                .filter(task_states::task_id.eq(&task_id))
                .select(task_states::created_at)
                .first(conn)
                .optional()?;

            let created_at = existing_created_at.unwrap_or(now);

            let row = NewTaskStateRow {
                run_id: run_id.clone(),
                task_id: task_id.clone(),
                status: status_str,
                params: params_json,
                result: result_json,
                error,
                retry_count,
                created_at,
                updated_at: now,
            };

            diesel::insert_into(task_states::table)
                .values(&row)
                .on_conflict((task_states::run_id, task_states::task_id))
                .do_update()
                .set((
                    task_states::status.eq(&row.status),
                    task_states::params.eq(&row.params),
                    task_states::result.eq(&row.result),
                    task_states::error.eq(&row.error),
                    task_states::retry_count.eq(row.retry_count),
                    task_states::updated_at.eq(row.updated_at),
                ))
                .execute(conn)
        })
        .await
        .map_err(|e| StoreError::Connection(e.to_string()))??;

        Ok(())
    }

    pub async fn list(&self, run_id: &str) -> Result<HashMap<String, TaskState>, StoreError> {
        let conn = self
            .database
            .pool()
            .get()
            .await
            .map_err(|e| StoreError::Connection(e.to_string()))?;
        let run_id_owned = run_id.to_string();

        let rows = conn
            .interact(move |conn| {
                task_states::table
                    .filter(task_states::run_id.eq(run_id_owned))
                    .select(TaskStateRow::as_select())
                    .load(conn)
            })
            .await
            .map_err(|e| StoreError::Connection(e.to_string()))??;

        rows.into_iter()
            .map(|row| {
                let task_id = row.task_id.clone();
                row.into_task_state().map(|state| (task_id, state))
            })
            .collect()
    }
}
