//! Executors that run agent commands on a single node.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use log::{debug, info, warn};

use super::{data_master, data_package, data_server, phase_data, SystemComponent};
use crate::{
    backoff::{classify, polling_policy, retry_notify},
    error::{OpsError, Result},
    fsm::{ExecutorParams, PhaseExecutor},
    models::{Locator, OperationKey, Server, ServiceUser},
    remote::Remote,
    services::{agent_command, Packages},
};

/// Server the phase targets: its own server if it has one, the master
/// otherwise.
fn target(params: &ExecutorParams) -> Result<Server> {
    data_server(params).or_else(|_| data_master(params))
}

async fn exec_on(remote: &dyn Remote, server: &Server, args: Vec<String>) -> Result<()> {
    debug!("{}: {}", server.hostname, args.join(" "));
    remote.exec(server.agent_addr(), &args).await?;
    Ok(())
}

/// Prepares the node that drives the operation.
pub struct InitExecutor {
    key: OperationKey,
    server: Server,
    remote: Arc<dyn Remote>,
}

impl InitExecutor {
    pub fn new(params: ExecutorParams, remote: Arc<dyn Remote>) -> Result<Self> {
        Ok(Self {
            server: target(&params)?,
            key: params.key,
            remote,
        })
    }
}

#[async_trait]
impl PhaseExecutor for InitExecutor {
    async fn execute(&self) -> Result<()> {
        info!("initializing {} on {}", self.key, self.server.hostname);
        let args = agent_command([
            "system",
            "init",
            "--operation-id",
            self.key.operation_id.as_str(),
            "--cluster",
            self.key.cluster_name.as_str(),
        ]);
        exec_on(self.remote.as_ref(), &self.server, args).await
    }
}

/// Loads the SELinux policy on a node.
pub struct SelinuxExecutor {
    server: Server,
    remote: Arc<dyn Remote>,
}

impl SelinuxExecutor {
    pub fn new(params: ExecutorParams, remote: Arc<dyn Remote>) -> Result<Self> {
        Ok(Self {
            server: data_server(&params)?,
            remote,
        })
    }
}

#[async_trait]
impl PhaseExecutor for SelinuxExecutor {
    async fn execute(&self) -> Result<()> {
        exec_on(
            self.remote.as_ref(),
            &self.server,
            agent_command(["system", "selinux-bootstrap"]),
        )
        .await
    }
}

/// Creates the state directory layout and the service user on a node.
pub struct BootstrapExecutor {
    server: Server,
    user: ServiceUser,
    state_dir: PathBuf,
    remote: Arc<dyn Remote>,
}

impl BootstrapExecutor {
    pub fn new(params: ExecutorParams, remote: Arc<dyn Remote>, state_dir: PathBuf) -> Result<Self> {
        let user = phase_data(&params)?.service_user.clone().unwrap_or_default();
        Ok(Self {
            server: data_server(&params)?,
            user,
            state_dir,
            remote,
        })
    }
}

#[async_trait]
impl PhaseExecutor for BootstrapExecutor {
    async fn execute(&self) -> Result<()> {
        let args = agent_command([
            "system".to_string(),
            "bootstrap".to_string(),
            "--state-dir".to_string(),
            self.state_dir.display().to_string(),
            "--service-user".to_string(),
            self.user.name.clone(),
            "--service-uid".to_string(),
            self.user.uid.to_string(),
            "--service-gid".to_string(),
            self.user.gid.to_string(),
        ]);
        exec_on(self.remote.as_ref(), &self.server, args).await
    }
}

/// Installs one system package as a service on a node.
pub struct SystemExecutor {
    server: Server,
    package: Locator,
    component: SystemComponent,
    user: ServiceUser,
    packages: Arc<dyn Packages>,
    remote: Arc<dyn Remote>,
}

impl SystemExecutor {
    pub fn new(
        params: ExecutorParams,
        component: SystemComponent,
        packages: Arc<dyn Packages>,
        remote: Arc<dyn Remote>,
    ) -> Result<Self> {
        let user = phase_data(&params)?.service_user.clone().unwrap_or_default();
        Ok(Self {
            server: data_server(&params)?,
            package: data_package(&params)?,
            component,
            user,
            packages,
            remote,
        })
    }
}

#[async_trait]
impl PhaseExecutor for SystemExecutor {
    async fn execute(&self) -> Result<()> {
        info!(
            "installing {} ({}) on {}",
            self.component, self.package, self.server.hostname
        );
        self.packages
            .install_service(&self.server, &self.package, &self.user)
            .await
    }

    async fn rollback(&self) -> Result<()> {
        let args = agent_command([
            "system".to_string(),
            "uninstall".to_string(),
            self.package.to_string(),
        ]);
        exec_on(self.remote.as_ref(), &self.server, args).await
    }
}

/// Polls a node until the cluster services report healthy.
pub struct WaitExecutor {
    server: Server,
    remote: Arc<dyn Remote>,
    timeout: Duration,
}

impl WaitExecutor {
    pub fn new(params: ExecutorParams, remote: Arc<dyn Remote>, timeout: Duration) -> Result<Self> {
        Ok(Self {
            server: target(&params)?,
            remote,
            timeout,
        })
    }
}

#[async_trait]
impl PhaseExecutor for WaitExecutor {
    async fn execute(&self) -> Result<()> {
        let args = agent_command(["system", "status", "--ready"]);
        let remote = Arc::clone(&self.remote);
        let addr = self.server.agent_addr().to_string();

        let result = retry_notify(
            polling_policy(self.timeout),
            || {
                let remote = Arc::clone(&remote);
                let addr = addr.clone();
                let args = args.clone();
                async move {
                    remote.exec(&addr, &args).await.map_err(classify)?;
                    Ok(())
                }
            },
            |error: OpsError, delay: Duration| {
                debug!("cluster is not ready yet, retrying in {delay:?}: {error}");
            },
        )
        .await;

        result.map_err(|error| match error {
            OpsError::AccessDenied { .. } | OpsError::BadParameter { .. } => error,
            error => {
                warn!("cluster on {} did not become ready: {error}", self.server.hostname);
                OpsError::limit_exceeded(format!(
                    "timed out after {:?} waiting for the cluster on {}: {error}",
                    self.timeout, self.server.hostname
                ))
            }
        })
    }
}

/// Runs the phase's command line on its server.
pub struct CommandExecutor {
    server: Server,
    command: Vec<String>,
    remote: Arc<dyn Remote>,
}

impl CommandExecutor {
    pub fn new(params: ExecutorParams, remote: Arc<dyn Remote>) -> Result<Self> {
        let command = phase_data(&params)?.command.clone();
        if command.is_empty() {
            return Err(super::missing(&params, "command"));
        }
        Ok(Self {
            server: data_server(&params)?,
            command,
            remote,
        })
    }
}

#[async_trait]
impl PhaseExecutor for CommandExecutor {
    async fn execute(&self) -> Result<()> {
        exec_on(self.remote.as_ref(), &self.server, self.command.clone()).await
    }
}
