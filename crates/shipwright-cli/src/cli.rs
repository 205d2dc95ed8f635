//! Command handlers.
//!
//! Each handler resolves the operation it acts on, calls into the core and
//! renders the result as markdown.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use log::info;
use shipwright_core::{
    checks::{run_local_checks, DiskThresholds},
    config::{ExpandConfig, InstallConfig, ReconfigureConfig},
    display::{OperationList, OperationStatus, PlanView, ProbeList},
    engine::{recovery_hints, Expander, Installer, Outcome, Reconfigurator},
    fsm::{Dispatch, ExecutorParams, Fsm, PhaseExecutor, PlanState},
    models::{Operation, OperationKind},
    remote::Remote,
    services::Services,
    LocalOperator, Operator, OpsError,
};

use crate::{
    args::{CheckCommands, PhaseArgs, PlanCommands},
    remote::SshRemote,
    renderer::TerminalRenderer,
};

pub struct Cli {
    operator: Arc<LocalOperator>,
    remote: Arc<dyn Remote>,
    renderer: TerminalRenderer,
    operation_id: Option<String>,
    config: Option<PathBuf>,
}

impl Cli {
    pub fn new(operator: LocalOperator, renderer: TerminalRenderer) -> Self {
        Self {
            operator: Arc::new(operator),
            remote: Arc::new(SshRemote::new(None)),
            renderer,
            operation_id: None,
            config: None,
        }
    }

    pub fn with_remote(mut self, remote: Arc<dyn Remote>) -> Self {
        self.remote = remote;
        self
    }

    pub fn with_operation_id(mut self, operation_id: Option<String>) -> Self {
        self.operation_id = operation_id;
        self
    }

    pub fn with_config(mut self, config: Option<PathBuf>) -> Self {
        self.config = config;
        self
    }

    fn services(&self) -> Services {
        Services::with_remote(self.operator.clone(), Arc::clone(&self.remote))
    }

    fn config_path(&self) -> Result<&Path> {
        self.config
            .as_deref()
            .context("pass the operation's configuration file with --config")
    }

    fn render_status(&self, status: &OperationStatus) {
        self.renderer.render(&status.to_string());
    }

    pub async fn install(&self) -> Result<()> {
        let config = InstallConfig::load(self.config_path()?)
            .context("Failed to load install configuration")?;
        let outcome = Installer::new(config, self.services()).run().await?;
        self.report(outcome)
    }

    pub async fn expand(&self) -> Result<()> {
        let config = ExpandConfig::load(self.config_path()?)
            .context("Failed to load expand configuration")?;
        let outcome = Expander::new(config, self.services()).run().await?;
        self.report(outcome)
    }

    pub async fn reconfigure(&self) -> Result<()> {
        let config = ReconfigureConfig::load(self.config_path()?)
            .context("Failed to load reconfigure configuration")?;
        let outcome = Reconfigurator::new(config, self.services()).run().await?;
        self.report(outcome)
    }

    fn report(&self, outcome: Outcome) -> Result<()> {
        match outcome {
            Outcome::Completed => {
                self.render_status(&OperationStatus::success("Operation completed"));
                Ok(())
            }
            Outcome::Manual => {
                self.render_status(&OperationStatus::success(
                    "Plan initialized, run `shipwright plan show` to see the phases",
                ));
                Ok(())
            }
            Outcome::Interrupted => {
                self.render_status(&OperationStatus::failure(
                    "Interrupted, continue with `shipwright plan resume`",
                ));
                Ok(())
            }
            Outcome::Failed { key, error } => {
                self.render_status(
                    &OperationStatus::failure(error.to_string()).with_hints(recovery_hints(&key)),
                );
                Err(error).context("Operation failed")
            }
        }
    }

    pub async fn list_operations(&self) -> Result<()> {
        let operations = self
            .operator
            .list_operations()
            .await
            .context("Failed to list operations")?;
        self.renderer.render(&OperationList(operations).to_string());
        Ok(())
    }

    /// The operation selected with `--operation-id`, or the latest one.
    async fn operation(&self) -> Result<Operation> {
        let operation = match &self.operation_id {
            Some(id) => self
                .operator
                .find_operation(id)
                .await?
                .with_context(|| format!("Operation {id} not found"))?,
            None => self
                .operator
                .last_operation()
                .await?
                .context("No operations found")?,
        };
        Ok(operation)
    }

    /// FSM for the operation; executing phases requires its configuration.
    fn fsm(&self, operation: &Operation, execute: bool) -> Result<Fsm> {
        let key = operation.key.clone();
        if !execute {
            return Ok(Fsm::new(key, self.operator.clone(), Arc::new(Unconfigured)));
        }

        let path = self.config_path()?;
        let fsm = match operation.kind {
            OperationKind::Install => {
                Installer::new(InstallConfig::load(path)?, self.services()).fsm(key)
            }
            OperationKind::Expand => {
                Expander::new(ExpandConfig::load(path)?, self.services()).fsm(key)
            }
            OperationKind::Reconfigure => {
                Reconfigurator::new(ReconfigureConfig::load(path)?, self.services()).fsm(key)
            }
        };
        Ok(fsm)
    }

    pub async fn handle_plan_command(&self, command: PlanCommands) -> Result<()> {
        let operation = self.operation().await?;
        match command {
            PlanCommands::Show => self.show_plan(&operation).await,
            PlanCommands::Execute(PhaseArgs { phase, force }) => {
                let fsm = self.fsm(&operation, true)?;
                fsm.execute_phase(&phase, force)
                    .await
                    .with_context(|| format!("Failed to execute phase {phase}"))?;
                self.render_status(&OperationStatus::success(format!("Phase {phase} completed")));
                Ok(())
            }
            PlanCommands::Rollback(PhaseArgs { phase, force }) => {
                let fsm = self.fsm(&operation, true)?;
                fsm.rollback_phase(&phase, force)
                    .await
                    .with_context(|| format!("Failed to roll back phase {phase}"))?;
                self.render_status(&OperationStatus::success(format!(
                    "Phase {phase} rolled back"
                )));
                Ok(())
            }
            PlanCommands::Resume => {
                let fsm = self.fsm(&operation, true)?;
                info!("resuming {}", fsm.key());
                match fsm.run().await {
                    Ok(()) => {
                        fsm.complete(None).await?;
                        self.render_status(&OperationStatus::success("Operation completed"));
                        Ok(())
                    }
                    Err(e) => {
                        fsm.complete(Some(&e)).await?;
                        self.render_status(
                            &OperationStatus::failure(e.to_string())
                                .with_hints(recovery_hints(&operation.key)),
                        );
                        Err(e).context("Operation failed")
                    }
                }
            }
            PlanCommands::Complete => {
                let fsm = self.fsm(&operation, false)?;
                fsm.complete(None).await?;
                self.render_status(&OperationStatus::success(format!(
                    "Operation {} marked completed",
                    operation.key.operation_id
                )));
                Ok(())
            }
        }
    }

    async fn show_plan(&self, operation: &Operation) -> Result<()> {
        let plan = self
            .operator
            .get_operation_plan(&operation.key)
            .await
            .context("Failed to load plan")?;
        let changes = self
            .operator
            .get_operation_plan_changes(&operation.key)
            .await
            .context("Failed to load plan changes")?;
        let state = PlanState::from_changes(&changes);
        self.renderer.render(&PlanView::new(&plan, &state).to_string());
        Ok(())
    }

    pub async fn progress(&self) -> Result<()> {
        let operation = self.operation().await?;
        match self
            .operator
            .get_site_operation_progress(&operation.key)
            .await?
        {
            Some(entry) => self.renderer.render(&entry.to_string()),
            None => self.renderer.render("No progress recorded.\n"),
        }
        Ok(())
    }

    pub async fn handle_check_command(&self, command: CheckCommands) -> Result<()> {
        match command {
            CheckCommands::Disk { path } => {
                let probes = run_local_checks(&path, &DiskThresholds::from_env())
                    .await
                    .with_context(|| format!("Failed to benchmark {}", path.display()))?;
                let failed = probes.iter().any(|probe| probe.is_critical());
                self.renderer.render(&ProbeList(probes).to_string());
                if failed {
                    bail!("{} is too slow for etcd", path.display());
                }
                Ok(())
            }
        }
    }
}

/// Dispatch for commands that only record state and never run a phase.
struct Unconfigured;

impl Dispatch for Unconfigured {
    fn resolve(&self, params: ExecutorParams) -> shipwright_core::Result<Box<dyn PhaseExecutor>> {
        Err(OpsError::bad_parameter(format!(
            "phase {} cannot be executed without --config",
            params.phase.id
        )))
    }
}
