//! Port reachability and bandwidth tests between agents.
//!
//! A game assigns every participating agent a [`PingPongRequest`]: the
//! addresses it listens on and the peer addresses it contacts. Each agent's
//! leg is dispatched concurrently through [`Remote::ping_pong`]; results are
//! collected on one channel and the whole game is bounded by twice the
//! requested test duration.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use log::{debug, warn};
use serde::{Deserialize, Serialize};
use tokio::{sync::mpsc, task::JoinSet};

use crate::{
    error::{OpsError, Result},
    remote::Remote,
};

/// Kind of test an agent runs.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PingPongMode {
    /// Connectivity and latency
    PingPong,
    /// Throughput
    Bandwidth,
}

impl PingPongMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            PingPongMode::PingPong => "pingpong",
            PingPongMode::Bandwidth => "bandwidth",
        }
    }
}

impl std::str::FromStr for PingPongMode {
    type Err = OpsError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "pingpong" => Ok(PingPongMode::PingPong),
            "bandwidth" => Ok(PingPongMode::Bandwidth),
            other => Err(OpsError::bad_parameter(format!(
                "unsupported mode {other:?}, expected \"pingpong\" or \"bandwidth\""
            ))),
        }
    }
}

/// A network endpoint.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct Addr {
    /// `tcp` or `udp`
    pub network: String,
    /// `host:port`
    pub addr: String,
}

impl Addr {
    pub fn tcp(addr: impl Into<String>) -> Self {
        Self {
            network: "tcp".to_string(),
            addr: addr.into(),
        }
    }

    pub fn udp(addr: impl Into<String>) -> Self {
        Self {
            network: "udp".to_string(),
            addr: addr.into(),
        }
    }
}

impl fmt::Display for Addr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}", self.network, self.addr)
    }
}

/// One agent's part in a game.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PingPongRequest {
    pub listen: Vec<Addr>,
    pub ping: Vec<Addr>,
    pub duration: Duration,
    pub mode: PingPongMode,
}

impl PingPongRequest {
    /// Validates the request before it is sent to an agent.
    pub fn check(&self) -> Result<()> {
        if self.listen.is_empty() {
            return Err(OpsError::bad_parameter("at least one listen address is required"));
        }
        if self.ping.is_empty() {
            return Err(OpsError::bad_parameter("at least one ping address is required"));
        }
        if self.mode == PingPongMode::PingPong {
            for addr in self.listen.iter().chain(self.ping.iter()) {
                if addr.network != "tcp" && addr.network != "udp" {
                    return Err(OpsError::bad_parameter(format!(
                        "address {} must use tcp or udp",
                        addr.addr
                    )));
                }
            }
        }
        Ok(())
    }
}

/// Mapping of agent address to the request it plays.
pub type PingPongGame = BTreeMap<String, PingPongRequest>;

/// Outcome of listening on or pinging a single endpoint.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ServerResult {
    /// 0 on success
    pub code: i32,
    #[serde(default)]
    pub message: String,
    pub server: Addr,
}

impl ServerResult {
    pub fn is_ok(&self) -> bool {
        self.code == 0
    }
}

/// One agent's result.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct PingPongResult {
    /// 0 when every listener and ping succeeded
    pub code: i32,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub listen: Vec<ServerResult>,
    #[serde(default)]
    pub ping: Vec<ServerResult>,
    /// Measured throughput in bytes per second (bandwidth mode)
    #[serde(default)]
    pub bandwidth: u64,
}

/// Results of a game keyed by agent address.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct PingPongGameResults(pub BTreeMap<String, PingPongResult>);

impl PingPongGameResults {
    /// Human-readable description of every failed listener and ping.
    pub fn failures(&self) -> Vec<String> {
        let mut failures = Vec::new();
        for (agent, result) in &self.0 {
            for listen in result.listen.iter().filter(|l| !l.is_ok()) {
                failures.push(format!(
                    "{agent} failed to listen on {}: {}",
                    listen.server, listen.message
                ));
            }
            for ping in result.ping.iter().filter(|p| !p.is_ok()) {
                failures.push(format!(
                    "{agent} failed to ping {}: {}",
                    ping.server, ping.message
                ));
            }
        }
        failures
    }

    pub fn get(&self, agent: &str) -> Option<&PingPongResult> {
        self.0.get(agent)
    }
}

/// Runs a connectivity game across the agents.
pub async fn check_ports(remote: Arc<dyn Remote>, game: PingPongGame) -> Result<PingPongGameResults> {
    play(remote, game, PingPongMode::PingPong).await
}

/// Runs a throughput game across the agents.
pub async fn check_bandwidth(
    remote: Arc<dyn Remote>,
    game: PingPongGame,
) -> Result<PingPongGameResults> {
    play(remote, game, PingPongMode::Bandwidth).await
}

/// Validates the game, dispatches each agent's leg on its own task and
/// collects the results.
///
/// The whole game is bounded by twice the longest requested duration: an
/// agent that never answers surfaces as `LimitExceeded`, and the remaining
/// legs are cancelled.
pub async fn play(
    remote: Arc<dyn Remote>,
    game: PingPongGame,
    mode: PingPongMode,
) -> Result<PingPongGameResults> {
    if game.is_empty() {
        return Ok(PingPongGameResults::default());
    }
    for (agent, request) in &game {
        if request.mode != mode {
            return Err(OpsError::bad_parameter(format!(
                "request for {agent} uses mode {}, expected {}",
                request.mode.as_str(),
                mode.as_str()
            )));
        }
        request.check()?;
    }

    let duration = game
        .values()
        .map(|request| request.duration)
        .max()
        .unwrap_or_default();
    let timeout = duration * 2;
    let expected = game.len();

    let (tx, mut rx) = mpsc::channel(expected);
    let mut tasks = JoinSet::new();
    for (agent, request) in game {
        let remote = Arc::clone(&remote);
        let tx = tx.clone();
        tasks.spawn(async move {
            let result = remote.ping_pong(&agent, &request).await;
            // The receiver is gone only if the game already timed out.
            let _ = tx.send((agent, result)).await;
        });
    }
    drop(tx);

    let deadline = tokio::time::sleep(timeout);
    tokio::pin!(deadline);

    let mut results = BTreeMap::new();
    let mut errors = Vec::new();
    while results.len() + errors.len() < expected {
        tokio::select! {
            received = rx.recv() => match received {
                Some((agent, Ok(result))) => {
                    debug!("{} game result from {agent}: code {}", mode.as_str(), result.code);
                    results.insert(agent, result);
                }
                Some((agent, Err(e))) => {
                    warn!("{} game failed on {agent}: {e}", mode.as_str());
                    errors.push(OpsError::connection_problem(format!("{agent}: {e}")));
                }
                None => break,
            },
            _ = &mut deadline => {
                tasks.abort_all();
                return Err(OpsError::limit_exceeded(format!(
                    "timed out after {timeout:?} waiting for {} of {expected} agents",
                    expected - results.len() - errors.len()
                )));
            }
        }
    }

    OpsError::aggregate(errors)?;
    Ok(PingPongGameResults(results))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(mode: PingPongMode) -> PingPongRequest {
        PingPongRequest {
            listen: vec![Addr::tcp("10.0.0.1:4242")],
            ping: vec![Addr::tcp("10.0.0.2:4242")],
            duration: Duration::from_secs(1),
            mode,
        }
    }

    #[test]
    fn test_check_requires_listen_and_ping() {
        let mut req = request(PingPongMode::PingPong);
        req.listen.clear();
        assert!(req.check().unwrap_err().is_bad_parameter());

        let mut req = request(PingPongMode::PingPong);
        req.ping.clear();
        assert!(req.check().unwrap_err().is_bad_parameter());
    }

    #[test]
    fn test_check_network_only_enforced_for_pingpong() {
        let mut req = request(PingPongMode::PingPong);
        req.ping[0].network = "sctp".to_string();
        assert!(req.check().unwrap_err().is_bad_parameter());

        req.mode = PingPongMode::Bandwidth;
        req.check().expect("bandwidth mode accepts any network");
    }

    #[test]
    fn test_unknown_mode_rejected() {
        assert!("latency".parse::<PingPongMode>().unwrap_err().is_bad_parameter());
        assert_eq!("bandwidth".parse::<PingPongMode>().unwrap(), PingPongMode::Bandwidth);
    }

    #[test]
    fn test_failures_lists_listeners_and_pings() {
        let mut results = BTreeMap::new();
        results.insert(
            "10.0.0.1".to_string(),
            PingPongResult {
                code: 1,
                listen: vec![ServerResult {
                    code: 1,
                    message: "address in use".to_string(),
                    server: Addr::tcp("10.0.0.1:4242"),
                }],
                ping: vec![
                    ServerResult {
                        code: 0,
                        message: String::new(),
                        server: Addr::udp("10.0.0.2:4242"),
                    },
                    ServerResult {
                        code: 1,
                        message: "connection refused".to_string(),
                        server: Addr::tcp("10.0.0.2:4242"),
                    },
                ],
                ..Default::default()
            },
        );
        let failures = PingPongGameResults(results).failures();
        assert_eq!(
            failures,
            vec![
                "10.0.0.1 failed to listen on tcp://10.0.0.1:4242: address in use".to_string(),
                "10.0.0.1 failed to ping tcp://10.0.0.2:4242: connection refused".to_string(),
            ]
        );
    }
}
