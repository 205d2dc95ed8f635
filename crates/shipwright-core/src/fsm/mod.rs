//! Plan execution engine.
//!
//! The FSM walks an [`OperationPlan`] and runs every leaf phase through the
//! executor [`Dispatch`] resolves for it. Progress is never kept in memory:
//! every transition is appended to the plan change log through the
//! [`Operator`], and the state the scheduler acts on is folded from that log
//! on each round. A process that dies mid-plan therefore resumes where the
//! log says it stopped.
//!
//! ```text
//! unstarted ──▶ in-progress ──▶ completed
//!                    │
//!                    └────────▶ failed ──(operator)──▶ rolled-back
//! ```
//!
//! Failed phases are never retried automatically. They stay failed until an
//! operator re-executes or rolls them back with [`Fsm::execute_phase`] or
//! [`Fsm::rollback_phase`].

use std::sync::Arc;

use futures::future::{BoxFuture, FutureExt};
use log::{debug, error, info, warn};
use tokio::task::JoinSet;

use crate::{
    error::{OpsError, Result},
    models::{
        OperationKey, OperationPlan, OperationState, Phase, PhaseState, ProgressState,
    },
    operator::Operator,
};

mod dispatch;
mod executor;
mod state;

pub use dispatch::{InstallDispatch, PhaseKind};
pub use executor::{Dispatch, ExecutorParams, PhaseExecutor};
pub use state::PlanState;

/// Whether [`Fsm::run`] traverses the plan or leaves it to the operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExecutionMode {
    #[default]
    Automatic,
    /// The plan is initialized but phases are only run on request
    Manual,
}

/// Flags threaded through one traversal.
#[derive(Debug, Clone, Copy, Default)]
struct RunContext {
    /// Re-run phases that already completed
    force: bool,
    /// Re-run phases that failed
    retry_failed: bool,
}

/// Executes the plan of one operation.
#[derive(Clone)]
pub struct Fsm {
    key: OperationKey,
    operator: Arc<dyn Operator>,
    dispatch: Arc<dyn Dispatch>,
    mode: ExecutionMode,
    report_progress: bool,
}

impl Fsm {
    pub fn new(key: OperationKey, operator: Arc<dyn Operator>, dispatch: Arc<dyn Dispatch>) -> Self {
        Self {
            key,
            operator,
            dispatch,
            mode: ExecutionMode::Automatic,
            report_progress: true,
        }
    }

    pub fn with_mode(mut self, mode: ExecutionMode) -> Self {
        self.mode = mode;
        self
    }

    /// Enables or disables progress entries after each completed phase.
    pub fn with_progress(mut self, report_progress: bool) -> Self {
        self.report_progress = report_progress;
        self
    }

    pub fn key(&self) -> &OperationKey {
        &self.key
    }

    pub async fn plan(&self) -> Result<OperationPlan> {
        self.operator.get_operation_plan(&self.key).await
    }

    /// Folds the change log into the current phase states.
    pub async fn plan_state(&self) -> Result<PlanState> {
        let changes = self.operator.get_operation_plan_changes(&self.key).await?;
        Ok(PlanState::from_changes(&changes))
    }

    /// Marks the operation in progress and runs the plan to completion. In
    /// manual mode this only logs how to proceed.
    pub async fn run(&self) -> Result<()> {
        if self.mode == ExecutionMode::Manual {
            info!(
                "{} initialized in manual mode, run `shipwright plan execute --phase <id>` to proceed",
                self.key
            );
            return Ok(());
        }
        self.operator
            .set_operation_state(&self.key, OperationState::InProgress, None)
            .await?;
        self.resume().await
    }

    /// Runs every phase that has not completed yet.
    ///
    /// Refuses to start while any phase is failed: a failed phase has to be
    /// retried or rolled back by hand first.
    pub async fn resume(&self) -> Result<()> {
        let plan = Arc::new(self.plan().await?);
        let state = self.plan_state().await?;

        let failures = state.failures(&plan);
        if !failures.is_empty() {
            let errors = failures
                .into_iter()
                .map(|(id, message)| {
                    OpsError::bad_parameter(format!(
                        "phase {id} failed: {}; retry it with `shipwright plan execute --phase {id}` \
                         or roll it back with `shipwright plan rollback --phase {id}`",
                        message.unwrap_or("unknown error")
                    ))
                })
                .collect();
            return OpsError::aggregate(errors);
        }

        if state.is_completed(&plan) {
            info!("all phases of {} are completed", self.key);
            return Ok(());
        }

        let phases = plan.phases.clone();
        self.run_phases(plan, phases, 1, RunContext::default()).await
    }

    /// Executes a single phase, or the subtree under a composite phase.
    ///
    /// A completed phase, or one with a leaf in progress, is only re-executed
    /// with `force`. Failed phases are retried. Without `force`, completed
    /// children of a composite phase are skipped.
    pub async fn execute_phase(&self, id: &str, force: bool) -> Result<()> {
        let plan = Arc::new(self.plan().await?);
        let phase = plan
            .find_phase(id)
            .cloned()
            .ok_or_else(|| OpsError::not_found(format!("phase {id} not found")))?;
        let state = self.plan_state().await?;

        let unmet = state.unmet_requirements(&plan, &phase);
        if !unmet.is_empty() {
            return Err(OpsError::bad_parameter(format!(
                "phase {id} requires {} to be completed first",
                unmet.join(", ")
            )));
        }
        match state.phase_state(&phase) {
            PhaseState::Completed if !force => {
                return Err(OpsError::bad_parameter(format!(
                    "phase {id} is already completed, use --force to execute it again"
                )))
            }
            // A composite left half done resumes its remaining children.
            PhaseState::InProgress if !force && state.is_running(&phase) => {
                return Err(OpsError::bad_parameter(format!(
                    "phase {id} is in progress, use --force to execute it again"
                )))
            }
            _ => {}
        }

        let ctx = RunContext {
            force,
            retry_failed: true,
        };
        self.run_phases(plan, vec![phase], 1, ctx).await
    }

    /// Rolls back a phase, or every leaf under a composite phase in reverse
    /// plan order.
    ///
    /// Completed phases are only rolled back with `force`. Leaves that never
    /// started or were already rolled back are skipped.
    pub async fn rollback_phase(&self, id: &str, force: bool) -> Result<()> {
        let plan = Arc::new(self.plan().await?);
        let phase = plan
            .find_phase(id)
            .ok_or_else(|| OpsError::not_found(format!("phase {id} not found")))?;
        let state = self.plan_state().await?;

        for leaf in phase.leaves().into_iter().rev() {
            match state.leaf_state(&leaf.id) {
                PhaseState::Unstarted | PhaseState::RolledBack => {
                    debug!("nothing to roll back for phase {}", leaf.id);
                    continue;
                }
                PhaseState::Completed if !force => {
                    return Err(OpsError::bad_parameter(format!(
                        "phase {} is completed, use --force to roll it back",
                        leaf.id
                    )));
                }
                _ => {}
            }

            info!("rolling back phase {}", leaf.id);
            let executor = self.dispatch.resolve(ExecutorParams {
                plan: Arc::clone(&plan),
                phase: leaf.clone(),
                key: self.key.clone(),
            })?;
            executor.rollback().await?;
            self.operator
                .create_operation_plan_change(&self.key, &leaf.id, PhaseState::RolledBack, None)
                .await?;
        }
        Ok(())
    }

    /// Marks the operation finished and writes the final progress entry.
    ///
    /// With an error the operation fails. Without one it completes, and is
    /// recorded as completed manually when the plan was not finished.
    pub async fn complete(&self, fsm_error: Option<&OpsError>) -> Result<()> {
        let (state, progress, message) = match fsm_error {
            Some(e) => (
                OperationState::Failed,
                ProgressState::Failed,
                format!("operation failed: {e}"),
            ),
            None => {
                let plan = self.plan().await?;
                let message = if self.plan_state().await?.is_completed(&plan) {
                    "operation completed".to_string()
                } else {
                    "operation completed manually".to_string()
                };
                (OperationState::Completed, ProgressState::Completed, message)
            }
        };

        let last = self.operator.get_site_operation_progress(&self.key).await?;
        let (completion, step) = match (&last, state) {
            (_, OperationState::Completed) => (100, last.as_ref().map_or(0, |p| p.step)),
            (Some(entry), _) => (entry.completion, entry.step),
            (None, _) => (0, 0),
        };

        self.operator
            .set_operation_state(&self.key, state, Some(message.clone()))
            .await?;
        self.operator
            .create_progress_entry(&self.key, completion, step, progress, message)
            .await?;
        Ok(())
    }

    /// Runs `phases` as one group: at most `limit` at a time, each started
    /// once its requirements are completed.
    fn run_phases(
        &self,
        plan: Arc<OperationPlan>,
        phases: Vec<Phase>,
        limit: usize,
        ctx: RunContext,
    ) -> BoxFuture<'static, Result<()>> {
        let fsm = self.clone();
        async move {
            let limit = limit.max(1);
            let mut pending = phases;
            let mut running = JoinSet::new();
            let mut first_error: Option<OpsError> = None;

            loop {
                if first_error.is_none() {
                    let state = fsm.plan_state().await?;
                    let mut index = 0;
                    while index < pending.len() && running.len() < limit {
                        let phase = &pending[index];
                        match state.phase_state(phase) {
                            PhaseState::Completed if !ctx.force => {
                                debug!("phase {} is already completed", phase.id);
                                pending.remove(index);
                                continue;
                            }
                            PhaseState::Failed if !ctx.retry_failed => {
                                first_error = Some(OpsError::bad_parameter(format!(
                                    "phase {} has failed and must be retried manually",
                                    phase.id
                                )));
                                break;
                            }
                            _ => {}
                        }
                        if !state.unmet_requirements(&plan, phase).is_empty() {
                            index += 1;
                            continue;
                        }

                        let phase = pending.remove(index);
                        let task = if phase.is_leaf() {
                            fsm.execute_leaf(Arc::clone(&plan), phase)
                        } else {
                            let limit = phase.limit.unwrap_or(1);
                            fsm.run_phases(Arc::clone(&plan), phase.phases, limit, ctx)
                        };
                        running.spawn(task);
                    }
                }

                match running.join_next().await {
                    None => break,
                    Some(Ok(Ok(()))) => {}
                    Some(Ok(Err(e))) => {
                        first_error.get_or_insert(e);
                    }
                    Some(Err(e)) => {
                        first_error.get_or_insert(OpsError::internal(format!(
                            "phase task aborted: {e}"
                        )));
                    }
                }
            }

            if let Some(e) = first_error {
                return Err(e);
            }
            if !pending.is_empty() {
                let ids: Vec<&str> = pending.iter().map(|phase| phase.id.as_str()).collect();
                return Err(OpsError::bad_parameter(format!(
                    "phases {} have requirements that cannot be met",
                    ids.join(", ")
                )));
            }
            Ok(())
        }
        .boxed()
    }

    fn execute_leaf(&self, plan: Arc<OperationPlan>, phase: Phase) -> BoxFuture<'static, Result<()>> {
        let fsm = self.clone();
        async move {
            let id = phase.id.clone();
            let description = phase.description.clone();
            let step = phase.step;
            let total = plan.top_level_count();

            info!("executing phase {id}");
            fsm.operator
                .create_operation_plan_change(&fsm.key, &id, PhaseState::InProgress, None)
                .await?;

            let params = ExecutorParams {
                key: fsm.key.clone(),
                plan,
                phase,
            };
            let result = match fsm.dispatch.resolve(params) {
                Ok(executor) => run_executor(executor.as_ref()).await,
                Err(e) => Err(e),
            };

            match result {
                Ok(()) => {
                    fsm.operator
                        .create_operation_plan_change(&fsm.key, &id, PhaseState::Completed, None)
                        .await?;
                    info!("phase {id} completed");
                    if fsm.report_progress {
                        fsm.operator
                            .create_progress_entry(
                                &fsm.key,
                                completion(step, total),
                                step,
                                ProgressState::InProgress,
                                description,
                            )
                            .await?;
                    }
                    Ok(())
                }
                Err(e) => {
                    error!("phase {id} failed: {e}");
                    if let Err(record) = fsm
                        .operator
                        .create_operation_plan_change(
                            &fsm.key,
                            &id,
                            PhaseState::Failed,
                            Some(e.to_string()),
                        )
                        .await
                    {
                        warn!("failed to record failure of phase {id}: {record}");
                    }
                    Err(e)
                }
            }
        }
        .boxed()
    }
}

async fn run_executor(executor: &dyn PhaseExecutor) -> Result<()> {
    executor.pre_check().await?;
    executor.execute().await?;
    executor.post_check().await
}

/// Completion percentage after finishing a phase of the given step.
pub fn completion(step: u32, top_level_count: usize) -> u32 {
    let total = u32::try_from(top_level_count.max(1)).unwrap_or(u32::MAX);
    (100 / total).saturating_mul(step).min(100)
}
