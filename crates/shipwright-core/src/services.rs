//! Collaborators phase executors delegate to.
//!
//! Package storage and application management are external systems. The
//! core talks to them through [`Packages`] and [`Apps`]; the adapters in
//! this module implement both by running the agent-side `shipwright`
//! commands on the target node through [`Remote::exec`].

use std::sync::Arc;

use async_trait::async_trait;
use log::debug;

use crate::{
    error::Result,
    models::{Locator, OperationKey, PullData, Server, ServiceUser},
    operator::Operator,
    remote::{ExecOutput, Remote},
};

/// Name of the agent-side binary.
pub const AGENT_BINARY: &str = "shipwright";

#[async_trait]
pub trait Packages: Send + Sync {
    /// Generates the per-node configuration packages of the operation.
    async fn configure(&self, key: &OperationKey, master: &Server, servers: &[Server])
        -> Result<()>;

    /// Pulls packages and applications into the node's local storage.
    async fn pull(&self, server: &Server, pull: &PullData) -> Result<()>;

    /// Exports a package into the node's container registry.
    async fn export(&self, server: &Server, locator: &Locator) -> Result<()>;

    /// Installs a package as a system service on the node.
    async fn install_service(
        &self,
        server: &Server,
        locator: &Locator,
        user: &ServiceUser,
    ) -> Result<()>;
}

#[async_trait]
pub trait Apps: Send + Sync {
    /// Creates or updates cluster resources from a manifest document.
    async fn apply_resources(&self, master: &Server, name: &str, resources: &str) -> Result<()>;

    /// Runs the install hooks of an application.
    async fn install(&self, master: &Server, locator: &Locator) -> Result<()>;

    /// Lets the master servers take part in leader election.
    async fn enable_election(&self, master: &Server, servers: &[Server]) -> Result<()>;
}

/// Everything a phase executor may need, shared across executors.
#[derive(Clone)]
pub struct Services {
    pub operator: Arc<dyn Operator>,
    pub remote: Arc<dyn Remote>,
    pub packages: Arc<dyn Packages>,
    pub apps: Arc<dyn Apps>,
}

impl Services {
    /// Services backed by `remote` for both packages and applications.
    pub fn with_remote(operator: Arc<dyn Operator>, remote: Arc<dyn Remote>) -> Self {
        Self {
            operator,
            packages: Arc::new(RemotePackages::new(Arc::clone(&remote))),
            apps: Arc::new(RemoteApps::new(Arc::clone(&remote))),
            remote,
        }
    }
}

/// Builds an agent command line.
pub fn agent_command<I, S>(args: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    std::iter::once(AGENT_BINARY.to_string())
        .chain(args.into_iter().map(Into::into))
        .collect()
}

async fn run(remote: &dyn Remote, server: &Server, args: Vec<String>) -> Result<ExecOutput> {
    debug!("{}: {}", server.hostname, args.join(" "));
    remote.exec(server.agent_addr(), &args).await
}

pub struct RemotePackages {
    remote: Arc<dyn Remote>,
}

impl RemotePackages {
    pub fn new(remote: Arc<dyn Remote>) -> Self {
        Self { remote }
    }
}

#[async_trait]
impl Packages for RemotePackages {
    async fn configure(
        &self,
        key: &OperationKey,
        master: &Server,
        servers: &[Server],
    ) -> Result<()> {
        let mut args = agent_command([
            "package",
            "configure",
            "--operation-id",
            key.operation_id.as_str(),
            "--cluster",
            key.cluster_name.as_str(),
        ]);
        for server in servers {
            args.push("--server".to_string());
            args.push(format!("{}={}", server.hostname, server.advertise_ip));
        }
        run(self.remote.as_ref(), master, args).await?;
        Ok(())
    }

    async fn pull(&self, server: &Server, pull: &PullData) -> Result<()> {
        for locator in &pull.packages {
            let args = agent_command(["package".to_string(), "pull".to_string(), locator.to_string()]);
            run(self.remote.as_ref(), server, args).await?;
        }
        for locator in &pull.apps {
            let args = agent_command(["app".to_string(), "pull".to_string(), locator.to_string()]);
            run(self.remote.as_ref(), server, args).await?;
        }
        Ok(())
    }

    async fn export(&self, server: &Server, locator: &Locator) -> Result<()> {
        let args = agent_command(["app".to_string(), "export".to_string(), locator.to_string()]);
        run(self.remote.as_ref(), server, args).await?;
        Ok(())
    }

    async fn install_service(
        &self,
        server: &Server,
        locator: &Locator,
        user: &ServiceUser,
    ) -> Result<()> {
        let args = agent_command([
            "system".to_string(),
            "install".to_string(),
            locator.to_string(),
            "--service-uid".to_string(),
            user.uid.to_string(),
            "--service-gid".to_string(),
            user.gid.to_string(),
        ]);
        run(self.remote.as_ref(), server, args).await?;
        Ok(())
    }
}

pub struct RemoteApps {
    remote: Arc<dyn Remote>,
}

impl RemoteApps {
    pub fn new(remote: Arc<dyn Remote>) -> Self {
        Self { remote }
    }
}

#[async_trait]
impl Apps for RemoteApps {
    async fn apply_resources(&self, master: &Server, name: &str, resources: &str) -> Result<()> {
        let args = agent_command(["resource", "apply", "--name", name, "--data", resources]);
        run(self.remote.as_ref(), master, args).await?;
        Ok(())
    }

    async fn install(&self, master: &Server, locator: &Locator) -> Result<()> {
        let args = agent_command(["app".to_string(), "install".to_string(), locator.to_string()]);
        run(self.remote.as_ref(), master, args).await?;
        Ok(())
    }

    async fn enable_election(&self, master: &Server, servers: &[Server]) -> Result<()> {
        let mut args = agent_command(["system", "enable-election"]);
        for server in servers.iter().filter(|server| server.is_master()) {
            args.push("--server".to_string());
            args.push(server.advertise_ip.clone());
        }
        run(self.remote.as_ref(), master, args).await?;
        Ok(())
    }
}
