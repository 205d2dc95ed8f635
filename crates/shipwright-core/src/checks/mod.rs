//! Preflight checks.
//!
//! Individual checks are plain functions that can be invoked on their own.
//! [`Checker`] runs all of them against the servers of an operation and
//! folds every violated requirement into a single error, so one run reports
//! everything that needs fixing instead of stopping at the first problem.
//!
//! Remote checks are dispatched on one task per server and the collector
//! always races the results against a deadline, so an agent that never
//! answers cannot block the engine.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use log::{debug, info, warn};
use tokio::task::JoinSet;

use crate::{
    error::{OpsError, Result},
    models::{Manifest, Probe, Server, ServerInfo, ServerInfos},
    remote::{Remote, ValidateConfig},
};

pub mod disk;
pub mod hardware;
pub mod os;
pub mod pingpong;
pub mod time;

pub use disk::{check_local_disk, DiskThresholds};
pub use hardware::{check_cpu, check_ram};
pub use os::check_same_os;
pub use pingpong::{check_bandwidth, check_ports, PingPongGame, PingPongGameResults};
pub use time::{check_time, MAX_OUT_OF_SYNC_TIME_DELTA};

use disk::{CheckDisksRequest, FioJobSpec};
use pingpong::{Addr, PingPongMode, PingPongRequest};

/// Ports probed between every pair of servers.
pub const TEST_PORTS: &[(&str, u16)] = &[
    ("tcp", 2379),
    ("tcp", 2380),
    ("tcp", 3022),
    ("tcp", 3023),
    ("tcp", 3024),
    ("tcp", 3025),
    ("tcp", 6443),
    ("tcp", 7373),
    ("tcp", 7496),
    ("tcp", 10250),
    ("udp", 8472),
];

/// Port used by the bandwidth test.
pub const BANDWIDTH_TEST_PORT: u16 = 4242;

/// Returns the directory etcd keeps its write-ahead log in.
pub fn etcd_wal_dir(state_dir: &Path) -> PathBuf {
    state_dir.join("planet").join("etcd")
}

#[derive(Debug, Clone)]
pub struct CheckerConfig {
    /// Maximum allowed clock difference between servers
    pub max_time_drift: Duration,
    pub disk_thresholds: DiskThresholds,
    /// State directory on the nodes
    pub state_dir: PathBuf,
    /// Duration of each ping-pong game
    pub test_duration: Duration,
    /// Whether to run the bandwidth game
    pub test_bandwidth: bool,
    /// Deadline for each remote check fan-out
    pub remote_timeout: Duration,
}

impl Default for CheckerConfig {
    fn default() -> Self {
        Self {
            max_time_drift: MAX_OUT_OF_SYNC_TIME_DELTA,
            disk_thresholds: DiskThresholds::default(),
            state_dir: PathBuf::from("/var/lib/gravity"),
            test_duration: Duration::from_secs(5),
            test_bandwidth: true,
            remote_timeout: Duration::from_secs(300),
        }
    }
}

/// Runs the full set of preflight checks for an operation.
pub struct Checker {
    remote: Arc<dyn Remote>,
    manifest: Arc<Manifest>,
    config: CheckerConfig,
}

impl Checker {
    pub fn new(remote: Arc<dyn Remote>, manifest: Arc<Manifest>, config: CheckerConfig) -> Self {
        Self {
            remote,
            manifest,
            config,
        }
    }

    /// Runs every check and aggregates the failures. Warnings are logged and
    /// do not fail the run.
    pub async fn run(&self, infos: &ServerInfos) -> Result<()> {
        let servers: Vec<Server> = infos.iter().map(ServerInfo::to_server).collect();
        info!("running preflight checks on {} servers", servers.len());

        let mut errors = Vec::new();
        if let Err(e) = self.check_servers(infos) {
            errors.push(e);
        }

        let mut probes = Vec::new();
        match self.validate(&servers).await {
            Ok(found) => probes.extend(found),
            Err(e) => errors.push(e),
        }
        match self.check_disks(&servers).await {
            Ok(found) => probes.extend(found),
            Err(e) => errors.push(e),
        }
        if let Err(e) = probes_to_error(&probes) {
            errors.push(e);
        }

        if let Err(e) = self.check_network(&servers).await {
            errors.push(e);
        }

        OpsError::aggregate(errors)
    }

    /// Local predicates over the reported system facts: per-profile CPU and
    /// RAM requirements, OS uniformity and clock skew.
    pub fn check_servers(&self, infos: &ServerInfos) -> Result<()> {
        let mut errors = Vec::new();
        for info in infos.iter() {
            let profile = match self.manifest.node_profile(&info.role) {
                Ok(profile) => profile,
                Err(e) => {
                    errors.push(e);
                    continue;
                }
            };
            if let Err(e) = check_cpu(info, &profile.requirements) {
                errors.push(e);
            }
            if let Err(e) = check_ram(info, &profile.requirements) {
                errors.push(e);
            }
        }
        if let Err(e) = check_same_os(infos) {
            errors.push(e);
        }
        if let Err(e) = check_time(self.config.max_time_drift, infos) {
            errors.push(e);
        }
        OpsError::aggregate(errors)
    }

    /// Asks each agent to validate its node against the node's profile.
    pub async fn validate(&self, servers: &[Server]) -> Result<Vec<Probe>> {
        for server in servers {
            self.manifest.node_profile(&server.role)?;
        }

        let remote = Arc::clone(&self.remote);
        let manifest = Arc::clone(&self.manifest);
        let state_dir = self.config.state_dir.display().to_string();
        let results = fan_out(servers, self.config.remote_timeout, |server| {
            let remote = Arc::clone(&remote);
            let config = manifest
                .node_profile(&server.role)
                .map(|profile| ValidateConfig {
                    profile: profile.clone(),
                    state_dir: state_dir.clone(),
                });
            async move { remote.validate(server.agent_addr(), &config?).await }
        })
        .await?;

        collect_probes(results)
    }

    /// Benchmarks the etcd WAL directory on every server.
    pub async fn check_disks(&self, servers: &[Server]) -> Result<Vec<Probe>> {
        let request = CheckDisksRequest {
            jobs: vec![FioJobSpec::etcd(etcd_wal_dir(&self.config.state_dir))],
        };
        let thresholds = self.config.disk_thresholds;
        let remote = Arc::clone(&self.remote);
        let results = fan_out(servers, self.config.remote_timeout, |server| {
            let remote = Arc::clone(&remote);
            let request = request.clone();
            async move {
                let response = remote.check_disks(server.agent_addr(), &request).await?;
                let mut probes = disk::classify(response.first_job()?, &thresholds)?;
                for probe in &mut probes {
                    probe.message = format!("{} on {}", probe.message, server.hostname);
                }
                Ok(probes)
            }
        })
        .await?;

        collect_probes(results)
    }

    /// Runs the port game and, when enabled, the bandwidth game.
    pub async fn check_network(&self, servers: &[Server]) -> Result<()> {
        if servers.len() < 2 {
            debug!("skipping network checks for a single server");
            return Ok(());
        }
        let mut errors = Vec::new();

        let game = ports_game(servers, TEST_PORTS, self.config.test_duration);
        match check_ports(Arc::clone(&self.remote), game).await {
            Ok(results) => {
                errors.extend(results.failures().into_iter().map(OpsError::bad_parameter))
            }
            Err(e) => errors.push(e),
        }

        if self.config.test_bandwidth {
            let game = bandwidth_game(servers, BANDWIDTH_TEST_PORT, self.config.test_duration);
            match check_bandwidth(Arc::clone(&self.remote), game).await {
                Ok(results) => {
                    errors.extend(results.failures().into_iter().map(OpsError::bad_parameter));
                    for (agent, result) in &results.0 {
                        debug!("bandwidth from {agent}: {} bytes/sec", result.bandwidth);
                    }
                }
                Err(e) => errors.push(e),
            }
        }

        OpsError::aggregate(errors)
    }
}

/// Builds a game in which every server listens on all `ports` and every
/// server contacts every other server on them.
pub fn ports_game(servers: &[Server], ports: &[(&str, u16)], duration: Duration) -> PingPongGame {
    let listen_addrs = |server: &Server| -> Vec<Addr> {
        ports
            .iter()
            .map(|(network, port)| Addr {
                network: network.to_string(),
                addr: format!("{}:{port}", server.advertise_ip),
            })
            .collect()
    };

    servers
        .iter()
        .map(|server| {
            let ping = servers
                .iter()
                .filter(|peer| peer.hostname != server.hostname)
                .flat_map(listen_addrs)
                .collect();
            let request = PingPongRequest {
                listen: listen_addrs(server),
                ping,
                duration,
                mode: PingPongMode::PingPong,
            };
            (server.agent_addr().to_string(), request)
        })
        .collect()
}

/// Builds a game in which each server measures throughput to the next
/// server in the list, wrapping around at the end.
pub fn bandwidth_game(servers: &[Server], port: u16, duration: Duration) -> PingPongGame {
    let addr = |server: &Server| Addr::tcp(format!("{}:{port}", server.advertise_ip));
    servers
        .iter()
        .enumerate()
        .map(|(i, server)| {
            let peer = &servers[(i + 1) % servers.len()];
            let request = PingPongRequest {
                listen: vec![addr(server)],
                ping: vec![addr(peer)],
                duration,
                mode: PingPongMode::Bandwidth,
            };
            (server.agent_addr().to_string(), request)
        })
        .collect()
}

/// Turns critical probes into an aggregate error. Warnings are logged.
pub fn probes_to_error(probes: &[Probe]) -> Result<()> {
    let mut errors = Vec::new();
    for probe in probes.iter().filter(|probe| probe.is_failed()) {
        if probe.is_warning() {
            warn!("{}: {}", probe.checker, probe.message);
        } else {
            errors.push(OpsError::bad_parameter(probe_message(probe)));
        }
    }
    OpsError::aggregate(errors)
}

fn probe_message(probe: &Probe) -> String {
    if probe.detail.is_empty() {
        probe.message.clone()
    } else {
        format!("{} ({})", probe.message, probe.detail)
    }
}

/// Checks that can be run on the local host without agents.
pub async fn run_local_checks(directory: &Path, thresholds: &DiskThresholds) -> Result<Vec<Probe>> {
    check_local_disk(directory, thresholds).await
}

fn collect_probes(results: Vec<(Server, Result<Vec<Probe>>)>) -> Result<Vec<Probe>> {
    let mut probes = Vec::new();
    let mut errors = Vec::new();
    for (server, result) in results {
        match result {
            Ok(found) => probes.extend(found),
            Err(e) => errors.push(OpsError::connection_problem(format!(
                "check failed on {}: {e}",
                server.hostname
            ))),
        }
    }
    OpsError::aggregate(errors)?;
    Ok(probes)
}

/// Runs `f` for every server on its own task and collects the results in
/// server order. Fails with `LimitExceeded` if not all tasks finish within
/// `timeout`.
async fn fan_out<T, F, Fut>(
    servers: &[Server],
    timeout: Duration,
    f: F,
) -> Result<Vec<(Server, Result<T>)>>
where
    T: Send + 'static,
    F: Fn(Server) -> Fut,
    Fut: Future<Output = Result<T>> + Send + 'static,
{
    let mut tasks = JoinSet::new();
    for (index, server) in servers.iter().enumerate() {
        let check = f(server.clone());
        let server = server.clone();
        tasks.spawn(async move { (index, server, check.await) });
    }

    let deadline = tokio::time::sleep(timeout);
    tokio::pin!(deadline);

    let mut results = Vec::with_capacity(servers.len());
    loop {
        tokio::select! {
            joined = tasks.join_next() => match joined {
                Some(Ok(result)) => results.push(result),
                Some(Err(e)) => {
                    return Err(OpsError::internal(format!("check task failed: {e}")))
                }
                None => break,
            },
            _ = &mut deadline => {
                tasks.abort_all();
                return Err(OpsError::limit_exceeded(format!(
                    "timed out after {timeout:?} waiting for checks on {} of {} servers",
                    servers.len() - results.len(),
                    servers.len()
                )));
            }
        }
    }

    results.sort_by_key(|(index, _, _)| *index);
    Ok(results
        .into_iter()
        .map(|(_, server, result)| (server, result))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ProbeSeverity;

    fn servers(count: usize) -> Vec<Server> {
        (1..=count)
            .map(|i| Server::new(format!("node-{i}"), format!("10.0.0.{i}"), "worker"))
            .collect()
    }

    #[test]
    fn test_ports_game_pings_every_peer() {
        let servers = servers(3);
        let game = ports_game(&servers, &[("tcp", 7373), ("udp", 8472)], Duration::from_secs(1));
        assert_eq!(game.len(), 3);

        let request = &game["10.0.0.1"];
        assert_eq!(request.listen.len(), 2);
        assert_eq!(request.ping.len(), 4);
        assert!(request.ping.iter().all(|addr| !addr.addr.starts_with("10.0.0.1:")));
        request.check().unwrap();
    }

    #[test]
    fn test_bandwidth_game_forms_ring() {
        let servers = servers(3);
        let game = bandwidth_game(&servers, 4242, Duration::from_secs(1));
        assert_eq!(game["10.0.0.1"].ping, vec![Addr::tcp("10.0.0.2:4242")]);
        assert_eq!(game["10.0.0.3"].ping, vec![Addr::tcp("10.0.0.1:4242")]);
        assert!(game.values().all(|r| r.mode == PingPongMode::Bandwidth));
    }

    #[test]
    fn test_probes_to_error_ignores_warnings() {
        let warning = Probe::failed("disk", ProbeSeverity::Warning, "slow");
        probes_to_error(&[warning.clone()]).unwrap();

        let critical =
            Probe::failed("disk", ProbeSeverity::Critical, "too slow").with_detail("node-1");
        let err = probes_to_error(&[warning, critical]).unwrap_err();
        assert_eq!(err.to_string(), "too slow (node-1)");
    }
}
