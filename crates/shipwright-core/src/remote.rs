//! Capability the engine uses to reach agents running on cluster nodes.
//!
//! The transport (RPC, TLS, SSH) lives outside the core. Everything that
//! talks to a node goes through [`Remote`], addressed by the agent's
//! advertise address.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::{
    checks::{
        disk::{CheckDisksRequest, CheckDisksResponse},
        pingpong::{PingPongRequest, PingPongResult},
    },
    error::Result,
    models::{NodeProfile, Probe},
};

/// Captured output of a remote command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecOutput {
    pub stdout: String,
    pub stderr: String,
}

/// Parameters of the agent-side validation of a node against its profile.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ValidateConfig {
    pub profile: NodeProfile,
    /// State directory the agent will use on the node
    pub state_dir: String,
}

#[async_trait]
pub trait Remote: Send + Sync {
    /// Runs `args` on the agent. A non-zero exit is an `Exec` error carrying
    /// the command's stderr.
    async fn exec(&self, addr: &str, args: &[String]) -> Result<ExecOutput>;

    /// Plays one agent's leg of a ping-pong game.
    async fn ping_pong(&self, addr: &str, request: &PingPongRequest) -> Result<PingPongResult>;

    /// Runs disk benchmark jobs on the agent.
    async fn check_disks(
        &self,
        addr: &str,
        request: &CheckDisksRequest,
    ) -> Result<CheckDisksResponse>;

    /// Validates the node against a profile and returns failed probes.
    async fn validate(&self, addr: &str, config: &ValidateConfig) -> Result<Vec<Probe>>;
}
