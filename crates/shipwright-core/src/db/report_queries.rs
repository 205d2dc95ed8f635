//! Agent report queries.

use jiff::Timestamp;
use rusqlite::{params, OptionalExtension};

use crate::{
    error::{DatabaseResultExt, Result},
    models::AgentReport,
};

const UPSERT_REPORT_SQL: &str = "INSERT INTO agent_reports (operation_id, body, updated_at) VALUES (?1, ?2, ?3) ON CONFLICT(operation_id) DO UPDATE SET body = excluded.body, updated_at = excluded.updated_at";
const SELECT_REPORT_SQL: &str = "SELECT body FROM agent_reports WHERE operation_id = ?1";

impl super::Database {
    /// Replaces the agent report of an operation.
    pub fn set_agent_report(&mut self, operation_id: &str, report: &AgentReport) -> Result<()> {
        let body = serde_json::to_string(report)?;
        self.connection
            .execute(
                UPSERT_REPORT_SQL,
                params![operation_id, &body, Timestamp::now().to_string()],
            )
            .db_context("Failed to store agent report")?;
        Ok(())
    }

    /// Returns the agent report of an operation, empty if no agent has
    /// reported yet.
    pub fn get_agent_report(&self, operation_id: &str) -> Result<AgentReport> {
        let body: Option<String> = self
            .connection
            .query_row(SELECT_REPORT_SQL, params![operation_id], |row| row.get(0))
            .optional()
            .db_context("Failed to query agent report")?;
        match body {
            Some(body) => Ok(serde_json::from_str(&body)?),
            None => Ok(AgentReport::default()),
        }
    }
}
