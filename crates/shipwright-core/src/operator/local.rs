//! SQLite-backed operator.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::task;

use super::Operator;
use crate::{
    db::Database,
    error::{OpsError, Result},
    models::{
        AgentReport, Operation, OperationKey, OperationKind, OperationPlan, OperationState,
        PhaseState, PlanChange, ProgressEntry, ProgressState,
    },
};

/// Operator that stores everything in a local SQLite database.
#[derive(Debug, Clone)]
pub struct LocalOperator {
    db_path: PathBuf,
}

impl LocalOperator {
    pub(crate) fn new(db_path: PathBuf) -> Self {
        Self { db_path }
    }

    pub fn database_path(&self) -> &Path {
        &self.db_path
    }

    /// Runs `f` against a fresh connection on the blocking thread pool.
    async fn with_db<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut Database) -> Result<T> + Send + 'static,
    {
        let db_path = self.db_path.clone();
        task::spawn_blocking(move || {
            let mut db = Database::new(&db_path)?;
            f(&mut db)
        })
        .await
        .map_err(|e| OpsError::internal(format!("database task failed: {e}")))?
    }

    /// Lists all operations, newest first.
    pub async fn list_operations(&self) -> Result<Vec<Operation>> {
        self.with_db(|db| db.list_operations()).await
    }

    /// Returns the most recently created operation.
    pub async fn last_operation(&self) -> Result<Option<Operation>> {
        self.with_db(|db| db.last_operation()).await
    }

    /// Looks an operation up by its ID alone.
    pub async fn find_operation(&self, operation_id: &str) -> Result<Option<Operation>> {
        let operation_id = operation_id.to_string();
        self.with_db(move |db| db.get_operation(&operation_id)).await
    }
}

#[async_trait]
impl Operator for LocalOperator {
    async fn create_operation(
        &self,
        key: &OperationKey,
        kind: OperationKind,
    ) -> Result<Operation> {
        let key = key.clone();
        self.with_db(move |db| db.create_operation(&key, kind)).await
    }

    async fn get_operation(&self, key: &OperationKey) -> Result<Operation> {
        let operation_id = key.operation_id.clone();
        self.with_db(move |db| {
            db.get_operation(&operation_id)?
                .ok_or_else(|| OpsError::not_found(format!("operation {operation_id} not found")))
        })
        .await
    }

    async fn set_operation_state(
        &self,
        key: &OperationKey,
        state: OperationState,
        message: Option<String>,
    ) -> Result<()> {
        let operation_id = key.operation_id.clone();
        self.with_db(move |db| db.set_operation_state(&operation_id, state, message.as_deref()))
            .await
    }

    async fn create_operation_plan(&self, plan: &OperationPlan) -> Result<()> {
        let plan = plan.clone();
        self.with_db(move |db| db.create_plan(&plan)).await
    }

    async fn get_operation_plan(&self, key: &OperationKey) -> Result<OperationPlan> {
        let operation_id = key.operation_id.clone();
        self.with_db(move |db| {
            db.get_plan(&operation_id)?.ok_or_else(|| {
                OpsError::not_found(format!("plan for operation {operation_id} not found"))
            })
        })
        .await
    }

    async fn create_operation_plan_change(
        &self,
        key: &OperationKey,
        phase_id: &str,
        new_state: PhaseState,
        error: Option<String>,
    ) -> Result<PlanChange> {
        let operation_id = key.operation_id.clone();
        let phase_id = phase_id.to_string();
        self.with_db(move |db| {
            db.create_plan_change(&operation_id, &phase_id, new_state, error.as_deref())
        })
        .await
    }

    async fn get_operation_plan_changes(&self, key: &OperationKey) -> Result<Vec<PlanChange>> {
        let operation_id = key.operation_id.clone();
        self.with_db(move |db| db.get_plan_changes(&operation_id)).await
    }

    async fn create_progress_entry(
        &self,
        key: &OperationKey,
        completion: u32,
        step: u32,
        state: ProgressState,
        message: String,
    ) -> Result<ProgressEntry> {
        let operation_id = key.operation_id.clone();
        self.with_db(move |db| {
            db.create_progress_entry(&operation_id, completion, step, state, &message)
        })
        .await
    }

    async fn get_site_operation_progress(
        &self,
        key: &OperationKey,
    ) -> Result<Option<ProgressEntry>> {
        let operation_id = key.operation_id.clone();
        self.with_db(move |db| db.last_progress_entry(&operation_id)).await
    }

    async fn get_site_install_operation_agent_report(
        &self,
        key: &OperationKey,
    ) -> Result<AgentReport> {
        let operation_id = key.operation_id.clone();
        self.with_db(move |db| db.get_agent_report(&operation_id)).await
    }

    async fn set_agent_report(&self, key: &OperationKey, report: &AgentReport) -> Result<()> {
        let operation_id = key.operation_id.clone();
        let report = report.clone();
        self.with_db(move |db| db.set_agent_report(&operation_id, &report)).await
    }
}
