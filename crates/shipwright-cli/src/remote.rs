//! Agent transport over ssh.
//!
//! Commands run on the node through `ssh`. Structured requests (games, disk
//! benchmarks, validation) are sent to the node agent as JSON on stdin and
//! its JSON answer is read back from stdout.

use std::process::Stdio;

use async_trait::async_trait;
use log::debug;
use serde::{de::DeserializeOwned, Serialize};
use shipwright_core::{
    checks::{
        disk::{CheckDisksRequest, CheckDisksResponse},
        pingpong::{PingPongRequest, PingPongResult},
    },
    models::Probe,
    remote::{ExecOutput, Remote, ValidateConfig},
    services::agent_command,
    OpsError, Result,
};
use tokio::{io::AsyncWriteExt, process::Command};

/// ssh exits with this code when the connection itself failed.
const SSH_CONNECTION_FAILED: i32 = 255;

pub struct SshRemote {
    user: Option<String>,
}

impl SshRemote {
    pub fn new(user: Option<String>) -> Self {
        Self { user }
    }

    fn destination(&self, addr: &str) -> String {
        match &self.user {
            Some(user) => format!("{user}@{addr}"),
            None => addr.to_string(),
        }
    }

    async fn run(&self, addr: &str, args: &[String], input: Option<Vec<u8>>) -> Result<ExecOutput> {
        let command_line = args.join(" ");
        debug!("{addr}: {command_line}");

        let mut command = Command::new("ssh");
        command
            .args(["-o", "BatchMode=yes"])
            .arg(self.destination(addr))
            .arg("--")
            .args(args)
            .stdin(if input.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = command.spawn().map_err(|e| OpsError::Exec {
            command: command_line.clone(),
            message: e.to_string(),
        })?;
        if let (Some(input), Some(mut stdin)) = (input, child.stdin.take()) {
            stdin.write_all(&input).await.map_err(|e| {
                OpsError::connection_problem(format!("failed to send request to {addr}: {e}"))
            })?;
        }
        let output = child.wait_with_output().await.map_err(|e| OpsError::Exec {
            command: command_line.clone(),
            message: e.to_string(),
        })?;

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        match output.status.code() {
            Some(0) => Ok(ExecOutput { stdout, stderr }),
            Some(SSH_CONNECTION_FAILED) => Err(OpsError::connection_problem(format!(
                "failed to reach agent on {addr}: {stderr}"
            ))),
            _ => Err(OpsError::Exec {
                command: command_line,
                message: stderr,
            }),
        }
    }

    async fn call<Req, Resp>(&self, addr: &str, verb: &str, request: &Req) -> Result<Resp>
    where
        Req: Serialize + Sync,
        Resp: DeserializeOwned,
    {
        let body = serde_json::to_vec(request)?;
        let args = agent_command(["agent", verb]);
        let output = self.run(addr, &args, Some(body)).await?;
        Ok(serde_json::from_str(&output.stdout)?)
    }
}

#[async_trait]
impl Remote for SshRemote {
    async fn exec(&self, addr: &str, args: &[String]) -> Result<ExecOutput> {
        self.run(addr, args, None).await
    }

    async fn ping_pong(&self, addr: &str, request: &PingPongRequest) -> Result<PingPongResult> {
        self.call(addr, "ping-pong", request).await
    }

    async fn check_disks(&self, addr: &str, request: &CheckDisksRequest) -> Result<CheckDisksResponse> {
        self.call(addr, "check-disks", request).await
    }

    async fn validate(&self, addr: &str, config: &ValidateConfig) -> Result<Vec<Probe>> {
        self.call(addr, "validate", config).await
    }
}
