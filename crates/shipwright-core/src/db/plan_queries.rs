//! Operation plan and plan change log queries.

use jiff::Timestamp;
use rusqlite::{params, OptionalExtension, TransactionBehavior};

use super::{parsed_column, timestamp_column};
use crate::{
    error::{DatabaseResultExt, OpsError, Result},
    models::{OperationPlan, PhaseState, PlanChange},
};

const CHECK_OPERATION_EXISTS_SQL: &str = "SELECT EXISTS(SELECT 1 FROM operations WHERE id = ?1)";
const CHECK_PLAN_EXISTS_SQL: &str = "SELECT EXISTS(SELECT 1 FROM plans WHERE operation_id = ?1)";
const INSERT_PLAN_SQL: &str =
    "INSERT INTO plans (operation_id, body, created_at) VALUES (?1, ?2, ?3)";
const SELECT_PLAN_SQL: &str = "SELECT body FROM plans WHERE operation_id = ?1";
const INSERT_PLAN_CHANGE_SQL: &str = "INSERT INTO plan_changes (operation_id, phase_id, new_state, error, created_at) VALUES (?1, ?2, ?3, ?4, ?5)";
const SELECT_PLAN_CHANGES_SQL: &str = "SELECT id, operation_id, phase_id, new_state, error, created_at FROM plan_changes WHERE operation_id = ?1 ORDER BY id";

impl super::Database {
    fn build_change_from_row(row: &rusqlite::Row) -> rusqlite::Result<PlanChange> {
        Ok(PlanChange {
            id: row.get::<_, i64>(0)? as u64,
            operation_id: row.get(1)?,
            phase_id: row.get(2)?,
            new_state: parsed_column::<PhaseState>(row, 3)?,
            error: row.get(4)?,
            created_at: timestamp_column(row, 5)?,
        })
    }

    /// Stores the plan for an existing operation. A plan can only be written
    /// once: a second attempt fails with `AlreadyExists`.
    pub fn create_plan(&mut self, plan: &OperationPlan) -> Result<()> {
        let body = serde_json::to_string(plan)?;

        let tx = self
            .connection
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .db_context("Failed to begin transaction")?;

        let operation_exists: bool = tx
            .query_row(CHECK_OPERATION_EXISTS_SQL, params![&plan.operation_id], |row| {
                row.get(0)
            })
            .db_context("Failed to check operation existence")?;
        if !operation_exists {
            return Err(OpsError::not_found(format!(
                "operation {} not found",
                plan.operation_id
            )));
        }

        let plan_exists: bool = tx
            .query_row(CHECK_PLAN_EXISTS_SQL, params![&plan.operation_id], |row| {
                row.get(0)
            })
            .db_context("Failed to check plan existence")?;
        if plan_exists {
            return Err(OpsError::already_exists(format!(
                "plan for operation {} is already initialized",
                plan.operation_id
            )));
        }

        tx.execute(
            INSERT_PLAN_SQL,
            params![&plan.operation_id, &body, plan.created_at.to_string()],
        )
        .db_context("Failed to insert plan")?;

        tx.commit().db_context("Failed to commit transaction")?;
        Ok(())
    }

    /// Retrieves the plan of an operation.
    pub fn get_plan(&self, operation_id: &str) -> Result<Option<OperationPlan>> {
        let body: Option<String> = self
            .connection
            .query_row(SELECT_PLAN_SQL, params![operation_id], |row| row.get(0))
            .optional()
            .db_context("Failed to query plan")?;
        match body {
            Some(body) => Ok(Some(serde_json::from_str(&body)?)),
            None => Ok(None),
        }
    }

    /// Appends a phase state transition to the change log.
    pub fn create_plan_change(
        &mut self,
        operation_id: &str,
        phase_id: &str,
        new_state: PhaseState,
        error: Option<&str>,
    ) -> Result<PlanChange> {
        let tx = self
            .connection
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .db_context("Failed to begin transaction")?;

        let plan_exists: bool = tx
            .query_row(CHECK_PLAN_EXISTS_SQL, params![operation_id], |row| row.get(0))
            .db_context("Failed to check plan existence")?;
        if !plan_exists {
            return Err(OpsError::not_found(format!(
                "plan for operation {operation_id} not found"
            )));
        }

        let now = Timestamp::now();
        tx.execute(
            INSERT_PLAN_CHANGE_SQL,
            params![
                operation_id,
                phase_id,
                new_state.as_str(),
                error,
                now.to_string()
            ],
        )
        .db_context("Failed to insert plan change")?;
        let id = tx.last_insert_rowid() as u64;

        tx.commit().db_context("Failed to commit transaction")?;

        Ok(PlanChange {
            id,
            operation_id: operation_id.to_string(),
            phase_id: phase_id.to_string(),
            new_state,
            error: error.map(String::from),
            created_at: now,
        })
    }

    /// Returns the change log of an operation in the order it was recorded.
    pub fn get_plan_changes(&self, operation_id: &str) -> Result<Vec<PlanChange>> {
        let mut stmt = self
            .connection
            .prepare(SELECT_PLAN_CHANGES_SQL)
            .db_context("Failed to prepare query")?;
        let changes = stmt
            .query_map(params![operation_id], Self::build_change_from_row)
            .db_context("Failed to query plan changes")?
            .collect::<rusqlite::Result<Vec<_>>>()
            .db_context("Failed to read plan change row")?;
        Ok(changes)
    }
}
