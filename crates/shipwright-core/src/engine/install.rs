//! Install engine.

use std::sync::Arc;

use log::info;

use super::{
    drive, ensure_operation, init_plan, operation_key, read_or_create, wait_for_agents, Outcome,
    TOKEN_FILE,
};
use crate::{
    config::InstallConfig,
    error::Result,
    fsm::{ExecutionMode, Fsm, InstallDispatch},
    models::{AgentReport, OperationKey, OperationKind, OperationPlan, Server},
    operator::Operator,
    plan::build_install_plan,
    remote::Remote,
    services::Services,
};

/// Installs a new cluster.
pub struct Installer {
    config: InstallConfig,
    services: Services,
}

impl Installer {
    pub fn new(config: InstallConfig, services: Services) -> Self {
        Self { config, services }
    }

    /// Installer whose packages and applications are driven through
    /// `remote`.
    pub fn with_remote(
        config: InstallConfig,
        operator: Arc<dyn Operator>,
        remote: Arc<dyn Remote>,
    ) -> Self {
        Self::new(config, Services::with_remote(operator, remote))
    }

    /// Prepares the state directory, the join token and the operation.
    pub async fn bootstrap(&self) -> Result<OperationKey> {
        let state_dir = &self.config.state_dir;
        read_or_create(state_dir, TOKEN_FILE, || uuid::Uuid::new_v4().to_string())?;
        info!(
            "agents join with the token in {}",
            state_dir.join(TOKEN_FILE).display()
        );

        let key = operation_key(
            state_dir,
            &self.config.account_id,
            &self.config.cluster_name,
            self.config.operation_id.as_deref(),
        )?;
        ensure_operation(self.services.operator.as_ref(), &key, OperationKind::Install).await?;
        Ok(key)
    }

    pub async fn wait_for_agents(&self, key: &OperationKey) -> Result<AgentReport> {
        wait_for_agents(
            Arc::clone(&self.services.operator),
            key,
            &self.config.servers,
            self.config.agent_wait_timeout(),
        )
        .await
    }

    /// Builds and persists the install plan. A plan initialized by an
    /// earlier run is loaded instead.
    pub async fn init_plan(&self, key: &OperationKey, report: &AgentReport) -> Result<OperationPlan> {
        let servers = merge_report(&self.config.servers, report);
        let params = self.config.install_params(key.clone(), servers);
        let plan = build_install_plan(&params, &self.config.manifest)?;
        init_plan(self.services.operator.as_ref(), plan).await
    }

    pub fn fsm(&self, key: OperationKey) -> Fsm {
        let dispatch = InstallDispatch::new(
            self.services.clone(),
            Arc::new(self.config.manifest.clone()),
            self.config.checker_config(),
        )
        .with_wait_timeout(self.config.cluster_wait_timeout());
        Fsm::new(key, Arc::clone(&self.services.operator), Arc::new(dispatch))
    }

    pub async fn run(&self) -> Result<Outcome> {
        let key = self.bootstrap().await?;
        let report = self.wait_for_agents(&key).await?;
        self.init_plan(&key, &report).await?;

        let mode = if self.config.manual {
            ExecutionMode::Manual
        } else {
            ExecutionMode::Automatic
        };
        drive(self.fsm(key), mode).await
    }
}

/// Configured servers with the OS their agents reported.
fn merge_report(servers: &[Server], report: &AgentReport) -> Vec<Server> {
    servers
        .iter()
        .map(|server| {
            let mut server = server.clone();
            if let Some(info) = report.servers.iter().find(|i| i.hostname == server.hostname) {
                server.os = info.os.clone();
            }
            server
        })
        .collect()
}
