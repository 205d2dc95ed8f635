//! Progress entry queries.

use jiff::Timestamp;
use rusqlite::{params, OptionalExtension};

use super::{parsed_column, timestamp_column};
use crate::{
    error::{DatabaseResultExt, Result},
    models::{ProgressEntry, ProgressState},
};

const INSERT_PROGRESS_SQL: &str = "INSERT INTO progress (operation_id, completion, step, state, message, created_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6)";
const SELECT_LAST_PROGRESS_SQL: &str = "SELECT operation_id, completion, step, state, message, created_at FROM progress WHERE operation_id = ?1 ORDER BY id DESC LIMIT 1";

impl super::Database {
    /// Records a progress entry. Completion is clamped to 100.
    pub fn create_progress_entry(
        &mut self,
        operation_id: &str,
        completion: u32,
        step: u32,
        state: ProgressState,
        message: &str,
    ) -> Result<ProgressEntry> {
        let completion = completion.min(100);
        let now = Timestamp::now();
        self.connection
            .execute(
                INSERT_PROGRESS_SQL,
                params![
                    operation_id,
                    completion,
                    step,
                    state.as_str(),
                    message,
                    now.to_string()
                ],
            )
            .db_context("Failed to insert progress entry")?;

        Ok(ProgressEntry {
            operation_id: operation_id.to_string(),
            completion,
            step,
            state,
            message: message.to_string(),
            created_at: now,
        })
    }

    /// Returns the latest progress entry of an operation.
    pub fn last_progress_entry(&self, operation_id: &str) -> Result<Option<ProgressEntry>> {
        self.connection
            .query_row(SELECT_LAST_PROGRESS_SQL, params![operation_id], |row| {
                Ok(ProgressEntry {
                    operation_id: row.get(0)?,
                    completion: row.get(1)?,
                    step: row.get(2)?,
                    state: parsed_column::<ProgressState>(row, 3)?,
                    message: row.get(4)?,
                    created_at: timestamp_column(row, 5)?,
                })
            })
            .optional()
            .db_context("Failed to query progress")
    }
}
