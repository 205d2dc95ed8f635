//! Operation CRUD operations and queries.

use jiff::Timestamp;
use rusqlite::{params, OptionalExtension, TransactionBehavior};

use super::{parsed_column, timestamp_column};
use crate::{
    error::{DatabaseResultExt, OpsError, Result},
    models::{Operation, OperationKey, OperationKind, OperationState},
};

const CHECK_OPERATION_EXISTS_SQL: &str = "SELECT EXISTS(SELECT 1 FROM operations WHERE id = ?1)";
const INSERT_OPERATION_SQL: &str = "INSERT INTO operations (id, account_id, cluster_name, kind, state, created_at, updated_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)";
const OPERATION_COLUMNS: &str =
    "id, account_id, cluster_name, kind, state, message, created_at, updated_at";
const UPDATE_OPERATION_STATE_SQL: &str =
    "UPDATE operations SET state = ?1, message = ?2, updated_at = ?3 WHERE id = ?4";

impl super::Database {
    fn build_operation_from_row(row: &rusqlite::Row) -> rusqlite::Result<Operation> {
        Ok(Operation {
            key: OperationKey {
                operation_id: row.get(0)?,
                account_id: row.get(1)?,
                cluster_name: row.get(2)?,
            },
            kind: parsed_column::<OperationKind>(row, 3)?,
            state: parsed_column::<OperationState>(row, 4)?,
            message: row.get(5)?,
            created_at: timestamp_column(row, 6)?,
            updated_at: timestamp_column(row, 7)?,
        })
    }

    /// Records a new operation in the `created` state.
    pub fn create_operation(&mut self, key: &OperationKey, kind: OperationKind) -> Result<Operation> {
        let tx = self
            .connection
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .db_context("Failed to begin transaction")?;

        let exists: bool = tx
            .query_row(CHECK_OPERATION_EXISTS_SQL, params![&key.operation_id], |row| {
                row.get(0)
            })
            .db_context("Failed to check operation existence")?;
        if exists {
            return Err(OpsError::already_exists(format!(
                "operation {} already exists",
                key.operation_id
            )));
        }

        let now = Timestamp::now();
        let now_str = now.to_string();
        tx.execute(
            INSERT_OPERATION_SQL,
            params![
                &key.operation_id,
                &key.account_id,
                &key.cluster_name,
                kind.as_str(),
                OperationState::Created.as_str(),
                &now_str,
                &now_str
            ],
        )
        .db_context("Failed to insert operation")?;

        tx.commit().db_context("Failed to commit transaction")?;

        Ok(Operation {
            key: key.clone(),
            kind,
            state: OperationState::Created,
            message: None,
            created_at: now,
            updated_at: now,
        })
    }

    /// Retrieves an operation by its ID.
    pub fn get_operation(&self, operation_id: &str) -> Result<Option<Operation>> {
        let sql = format!("SELECT {OPERATION_COLUMNS} FROM operations WHERE id = ?1");
        self.connection
            .query_row(&sql, params![operation_id], Self::build_operation_from_row)
            .optional()
            .db_context("Failed to query operation")
    }

    /// Returns the most recently created operation, if any.
    pub fn last_operation(&self) -> Result<Option<Operation>> {
        let sql = format!(
            "SELECT {OPERATION_COLUMNS} FROM operations ORDER BY rowid DESC LIMIT 1"
        );
        self.connection
            .query_row(&sql, [], Self::build_operation_from_row)
            .optional()
            .db_context("Failed to query last operation")
    }

    /// Lists all operations, newest first.
    pub fn list_operations(&self) -> Result<Vec<Operation>> {
        let sql = format!(
            "SELECT {OPERATION_COLUMNS} FROM operations ORDER BY rowid DESC"
        );
        let mut stmt = self
            .connection
            .prepare(&sql)
            .db_context("Failed to prepare query")?;
        let operations = stmt
            .query_map([], Self::build_operation_from_row)
            .db_context("Failed to list operations")?
            .collect::<rusqlite::Result<Vec<_>>>()
            .db_context("Failed to read operation row")?;
        Ok(operations)
    }

    /// Updates the lifecycle state of an operation.
    pub fn set_operation_state(
        &mut self,
        operation_id: &str,
        state: OperationState,
        message: Option<&str>,
    ) -> Result<()> {
        let now_str = Timestamp::now().to_string();
        let updated = self
            .connection
            .execute(
                UPDATE_OPERATION_STATE_SQL,
                params![state.as_str(), message, &now_str, operation_id],
            )
            .db_context("Failed to update operation state")?;
        if updated == 0 {
            return Err(OpsError::not_found(format!(
                "operation {operation_id} not found"
            )));
        }
        Ok(())
    }
}
