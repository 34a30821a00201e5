//! Hand-written Diesel schema for the `task_states` table.
//!
//! No `diesel print-schema` output ships with this crate, so the table is
//! declared directly with `diesel::table!`, following the pattern in
//! `cloacina-app/src-tauri/src/domains/runners/dal.rs`.

diesel::table! {
    task_states (run_id, task_id) {
        run_id -> Text,
        task_id -> Text,
        status -> Text,
        params -> Text,
        result -> Nullable<Text>,
        error -> Nullable<Text>,
        retry_count -> Integer,
        created_at -> Timestamp,
        updated_at -> Timestamp,
    }
}
