//! Phase executors.
//!
//! Executors extract what they need from the phase snapshot when they are
//! constructed, so a malformed phase is rejected at dispatch time before any
//! side effect happens. Node-level work runs agent commands through
//! [`Remote`](crate::remote::Remote); package and application work goes
//! through the [`Packages`](crate::services::Packages) and
//! [`Apps`](crate::services::Apps) collaborators.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::{
    error::{OpsError, Result},
    fsm::ExecutorParams,
    models::{Locator, PhaseData, Server},
    plan::phases::{PLANET_COMPONENT, TELEPORT_COMPONENT},
};

mod cluster;
mod node;

pub use cluster::{
    AppExecutor, ChecksExecutor, ConfigureExecutor, ElectionExecutor, ExportExecutor,
    PullExecutor, ResourcesExecutor,
};
pub use node::{
    BootstrapExecutor, CommandExecutor, InitExecutor, SelinuxExecutor, SystemExecutor,
    WaitExecutor,
};

/// How long the wait phase polls for the cluster to come up.
pub const DEFAULT_WAIT_TIMEOUT: Duration = Duration::from_secs(600);

/// System service installed by a system phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SystemComponent {
    Teleport,
    Planet,
}

impl FromStr for SystemComponent {
    type Err = OpsError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            TELEPORT_COMPONENT => Ok(SystemComponent::Teleport),
            PLANET_COMPONENT => Ok(SystemComponent::Planet),
            other => Err(OpsError::bad_parameter(format!(
                "unknown system component {other:?}"
            ))),
        }
    }
}

impl fmt::Display for SystemComponent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SystemComponent::Teleport => f.write_str(TELEPORT_COMPONENT),
            SystemComponent::Planet => f.write_str(PLANET_COMPONENT),
        }
    }
}

fn missing(params: &ExecutorParams, what: &str) -> OpsError {
    OpsError::bad_parameter(format!("phase {} has no {what}", params.phase.id))
}

fn phase_data(params: &ExecutorParams) -> Result<&PhaseData> {
    params
        .phase
        .data
        .as_ref()
        .ok_or_else(|| missing(params, "data"))
}

fn data_server(params: &ExecutorParams) -> Result<Server> {
    phase_data(params)?
        .server
        .clone()
        .ok_or_else(|| missing(params, "server"))
}

fn data_master(params: &ExecutorParams) -> Result<Server> {
    phase_data(params)?
        .master
        .clone()
        .ok_or_else(|| missing(params, "master"))
}

fn data_package(params: &ExecutorParams) -> Result<Locator> {
    phase_data(params)?
        .package
        .clone()
        .ok_or_else(|| missing(params, "package"))
}
