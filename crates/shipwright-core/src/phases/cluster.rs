//! Executors for cluster-level work: preflight checks, packages and
//! applications.

use std::sync::Arc;

use async_trait::async_trait;
use log::info;

use super::{data_master, data_package, data_server, missing, phase_data};
use crate::{
    checks::{Checker, CheckerConfig},
    error::{OpsError, Result},
    fsm::{ExecutorParams, PhaseExecutor},
    models::{Locator, Manifest, OperationKey, PullData, Server, ServerInfos},
    operator::Operator,
    remote::Remote,
    services::{Apps, Packages},
};

/// Runs the preflight checks against the agents that joined the operation.
pub struct ChecksExecutor {
    params: ExecutorParams,
    operator: Arc<dyn Operator>,
    remote: Arc<dyn Remote>,
    manifest: Arc<Manifest>,
    config: CheckerConfig,
}

impl ChecksExecutor {
    pub fn new(
        params: ExecutorParams,
        operator: Arc<dyn Operator>,
        remote: Arc<dyn Remote>,
        manifest: Arc<Manifest>,
        config: CheckerConfig,
    ) -> Self {
        Self {
            params,
            operator,
            remote,
            manifest,
            config,
        }
    }
}

#[async_trait]
impl PhaseExecutor for ChecksExecutor {
    async fn execute(&self) -> Result<()> {
        let report = self
            .operator
            .get_site_install_operation_agent_report(&self.params.key)
            .await?;
        let plan = &self.params.plan;
        let infos: Vec<_> = report
            .servers
            .into_iter()
            .filter(|info| {
                plan.servers
                    .iter()
                    .any(|server| server.hostname == info.hostname)
            })
            .collect();
        if infos.is_empty() {
            return Err(OpsError::bad_parameter(format!(
                "no agents of {} have reported system information",
                self.params.key
            )));
        }

        let checker = Checker::new(
            Arc::clone(&self.remote),
            Arc::clone(&self.manifest),
            self.config.clone(),
        );
        checker.run(&ServerInfos(infos)).await
    }
}

/// Generates configuration packages for the servers of the plan.
pub struct ConfigureExecutor {
    key: OperationKey,
    master: Server,
    servers: Vec<Server>,
    packages: Arc<dyn Packages>,
}

impl ConfigureExecutor {
    pub fn new(params: ExecutorParams, packages: Arc<dyn Packages>) -> Result<Self> {
        Ok(Self {
            master: data_master(&params)?,
            servers: params.plan.servers.clone(),
            key: params.key,
            packages,
        })
    }
}

#[async_trait]
impl PhaseExecutor for ConfigureExecutor {
    async fn execute(&self) -> Result<()> {
        info!("configuring packages for {} servers", self.servers.len());
        self.packages
            .configure(&self.key, &self.master, &self.servers)
            .await
    }
}

pub struct PullExecutor {
    server: Server,
    pull: PullData,
    packages: Arc<dyn Packages>,
}

impl PullExecutor {
    pub fn new(params: ExecutorParams, packages: Arc<dyn Packages>) -> Result<Self> {
        let pull = phase_data(&params)?
            .pull
            .clone()
            .ok_or_else(|| missing(&params, "packages to pull"))?;
        Ok(Self {
            server: data_server(&params)?,
            pull,
            packages,
        })
    }
}

#[async_trait]
impl PhaseExecutor for PullExecutor {
    async fn execute(&self) -> Result<()> {
        self.packages.pull(&self.server, &self.pull).await
    }
}

pub struct ExportExecutor {
    server: Server,
    package: Locator,
    packages: Arc<dyn Packages>,
}

impl ExportExecutor {
    pub fn new(params: ExecutorParams, packages: Arc<dyn Packages>) -> Result<Self> {
        Ok(Self {
            server: data_server(&params)?,
            package: data_package(&params)?,
            packages,
        })
    }
}

#[async_trait]
impl PhaseExecutor for ExportExecutor {
    async fn execute(&self) -> Result<()> {
        self.packages.export(&self.server, &self.package).await
    }
}

/// Installs an application through its install hooks.
pub struct AppExecutor {
    master: Server,
    package: Locator,
    apps: Arc<dyn Apps>,
}

impl AppExecutor {
    pub fn new(params: ExecutorParams, apps: Arc<dyn Apps>) -> Result<Self> {
        Ok(Self {
            master: data_master(&params)?,
            package: data_package(&params)?,
            apps,
        })
    }
}

#[async_trait]
impl PhaseExecutor for AppExecutor {
    async fn execute(&self) -> Result<()> {
        info!("installing application {}", self.package);
        self.apps.install(&self.master, &self.package).await
    }
}

/// Applies a resource document. The resource set is named after the phase.
pub struct ResourcesExecutor {
    name: String,
    master: Server,
    resources: String,
    apps: Arc<dyn Apps>,
}

impl ResourcesExecutor {
    pub fn new(params: ExecutorParams, apps: Arc<dyn Apps>) -> Result<Self> {
        let resources = phase_data(&params)?
            .resources
            .clone()
            .ok_or_else(|| missing(&params, "resources"))?;
        Ok(Self {
            name: params.phase.id.trim_start_matches('/').to_string(),
            master: data_master(&params)?,
            resources,
            apps,
        })
    }
}

#[async_trait]
impl PhaseExecutor for ResourcesExecutor {
    async fn execute(&self) -> Result<()> {
        self.apps
            .apply_resources(&self.master, &self.name, &self.resources)
            .await
    }
}

/// Adds the master servers of the plan to leader election.
pub struct ElectionExecutor {
    master: Server,
    masters: Vec<Server>,
    apps: Arc<dyn Apps>,
}

impl ElectionExecutor {
    pub fn new(params: ExecutorParams, apps: Arc<dyn Apps>) -> Result<Self> {
        let masters: Vec<Server> = params
            .plan
            .servers
            .iter()
            .filter(|server| server.is_master())
            .cloned()
            .collect();
        if masters.is_empty() {
            return Err(missing(&params, "master servers"));
        }
        Ok(Self {
            master: data_master(&params)?,
            masters,
            apps,
        })
    }
}

#[async_trait]
impl PhaseExecutor for ElectionExecutor {
    async fn execute(&self) -> Result<()> {
        self.apps.enable_election(&self.master, &self.masters).await
    }
}
