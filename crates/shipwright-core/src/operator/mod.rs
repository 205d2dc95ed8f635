//! Backend the engines persist operations, plans and progress through.
//!
//! [`Operator`] is the seam between the engines and storage. The crate ships
//! [`LocalOperator`], a SQLite implementation that runs every query on the
//! blocking thread pool:
//!
//! ```text
//! ┌─────────────────┐    ┌─────────────────┐    ┌─────────────────┐
//! │  FSM / Engines  │───▶│  LocalOperator  │───▶│    Database     │
//! │                 │    │ (spawn_blocking)│    │   (via db/)     │
//! └─────────────────┘    └─────────────────┘    └─────────────────┘
//! ```
//!
//! # Example
//!
//! ```rust,no_run
//! use shipwright_core::OperatorBuilder;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let operator = OperatorBuilder::new()
//!     .with_database_path(Some("/var/lib/shipwright/shipwright.db"))
//!     .build()
//!     .await?;
//! let operations = operator.list_operations().await?;
//! # Ok(())
//! # }
//! ```

use async_trait::async_trait;

use crate::{
    error::Result,
    models::{
        AgentReport, Operation, OperationKey, OperationKind, OperationPlan, OperationState,
        PhaseState, PlanChange, ProgressEntry, ProgressState,
    },
};

pub mod builder;
pub mod local;

pub use builder::OperatorBuilder;
pub use local::LocalOperator;

/// Storage contract for operations, plans, plan changes, progress and agent
/// reports.
#[async_trait]
pub trait Operator: Send + Sync {
    /// Fails with `AlreadyExists` when the operation ID is taken.
    async fn create_operation(&self, key: &OperationKey, kind: OperationKind)
        -> Result<Operation>;

    /// Fails with `NotFound` for an unknown operation.
    async fn get_operation(&self, key: &OperationKey) -> Result<Operation>;

    async fn set_operation_state(
        &self,
        key: &OperationKey,
        state: OperationState,
        message: Option<String>,
    ) -> Result<()>;

    /// Fails with `AlreadyExists` when the operation already has a plan.
    async fn create_operation_plan(&self, plan: &OperationPlan) -> Result<()>;

    /// Fails with `NotFound` when the plan has not been initialized.
    async fn get_operation_plan(&self, key: &OperationKey) -> Result<OperationPlan>;

    async fn create_operation_plan_change(
        &self,
        key: &OperationKey,
        phase_id: &str,
        new_state: PhaseState,
        error: Option<String>,
    ) -> Result<PlanChange>;

    /// Change log in the order the changes were recorded.
    async fn get_operation_plan_changes(&self, key: &OperationKey) -> Result<Vec<PlanChange>>;

    async fn create_progress_entry(
        &self,
        key: &OperationKey,
        completion: u32,
        step: u32,
        state: ProgressState,
        message: String,
    ) -> Result<ProgressEntry>;

    /// Latest progress entry, if any has been written.
    async fn get_site_operation_progress(&self, key: &OperationKey)
        -> Result<Option<ProgressEntry>>;

    /// Agents that have joined the install operation so far.
    async fn get_site_install_operation_agent_report(
        &self,
        key: &OperationKey,
    ) -> Result<AgentReport>;

    /// Records the latest agent report; called as agents join.
    async fn set_agent_report(&self, key: &OperationKey, report: &AgentReport) -> Result<()>;
}
