#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use jiff::Timestamp;
use shipwright_core::{
    checks::{
        disk::{CheckDisksRequest, CheckDisksResponse},
        pingpong::{PingPongRequest, PingPongResult},
    },
    fsm::{Dispatch, ExecutorParams, PhaseExecutor},
    models::{
        Dependencies, Locator, Manifest, NodeProfile, OperationKey, OperationKind, OperationPlan,
        Phase, Probe, ServerInfo,
    },
    remote::{ExecOutput, Remote, ValidateConfig},
    LocalOperator, OperatorBuilder, OpsError, Result,
};
use tempfile::TempDir;

/// Helper function to create a test operator backed by a temporary database
pub async fn create_test_operator() -> (TempDir, Arc<LocalOperator>) {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let db_path = temp_dir.path().join("test.db");
    let operator = OperatorBuilder::new()
        .with_database_path(Some(&db_path))
        .build()
        .await
        .expect("Failed to create operator");
    (temp_dir, Arc::new(operator))
}

pub fn key() -> OperationKey {
    OperationKey::new("system", "example.com", "op-1")
}

pub fn locator(name: &str) -> Locator {
    format!("gravitational.io/{name}:1.0.0")
        .parse()
        .expect("valid locator")
}

/// Manifest with every dependency the install plan needs, a `master`
/// profile and a `worker` profile.
pub fn manifest() -> Manifest {
    Manifest {
        locator: "example.com/app:2.0.0".parse().expect("valid locator"),
        node_profiles: vec![
            NodeProfile::new("master").with_service_role("master"),
            NodeProfile::new("worker").with_service_role("node"),
        ],
        dependencies: Dependencies {
            packages: vec![locator("teleport"), locator("gravity"), locator("planet")],
            apps: vec![
                locator("rbac-app"),
                locator("dns-app"),
                locator("site"),
            ],
        },
    }
}

/// A plan of top-level leaves chained by requirements in the given order.
pub fn chain_plan(ids: &[&str]) -> OperationPlan {
    let mut phases = Vec::new();
    let mut previous: Option<&str> = None;
    for (step, id) in ids.iter().enumerate() {
        let mut phase = Phase::new(*id, format!("phase {id}"));
        phase.step = step as u32 + 1;
        if let Some(previous) = previous {
            phase.requires = vec![previous.to_string()];
        }
        phases.push(phase);
        previous = Some(id);
    }
    plan_with(phases)
}

pub fn plan_with(phases: Vec<Phase>) -> OperationPlan {
    let key = key();
    OperationPlan {
        operation_id: key.operation_id,
        operation_kind: OperationKind::Install,
        account_id: key.account_id,
        cluster_name: key.cluster_name,
        servers: Vec::new(),
        phases,
        created_at: Timestamp::now(),
    }
}

pub fn server_info(hostname: &str, ip: &str, role: &str) -> ServerInfo {
    ServerInfo {
        hostname: hostname.to_string(),
        advertise_ip: ip.to_string(),
        role: role.to_string(),
        cpus: 4,
        os: shipwright_core::models::OsInfo::new("centos", "7.9.2009"),
        server_time: shipwright_core::models::ServerTime {
            time: Timestamp::now(),
            latency: Duration::from_millis(2),
        },
        ..Default::default()
    }
}

/// Dispatch whose executors record their phase and fail on request.
#[derive(Default)]
pub struct RecordingDispatch {
    pub executed: Mutex<Vec<String>>,
    pub rolled_back: Mutex<Vec<String>>,
    failing: Mutex<HashSet<String>>,
    delays: HashMap<String, Duration>,
    running: AtomicUsize,
    pub max_running: AtomicUsize,
}

impl RecordingDispatch {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Every executor sleeps for `delay` before finishing.
    pub fn with_delay(ids: &[&str], delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            delays: ids.iter().map(|id| (id.to_string(), delay)).collect(),
            ..Self::default()
        })
    }

    pub fn fail(&self, id: &str) {
        self.failing.lock().unwrap().insert(id.to_string());
    }

    pub fn heal(&self, id: &str) {
        self.failing.lock().unwrap().remove(id);
    }

    pub fn executed(&self) -> Vec<String> {
        self.executed.lock().unwrap().clone()
    }

    pub fn rolled_back(&self) -> Vec<String> {
        self.rolled_back.lock().unwrap().clone()
    }
}

struct RecordingExecutor {
    id: String,
    dispatch: Arc<RecordingDispatch>,
}

#[async_trait]
impl PhaseExecutor for RecordingExecutor {
    async fn execute(&self) -> Result<()> {
        let dispatch = &self.dispatch;
        let running = dispatch.running.fetch_add(1, Ordering::SeqCst) + 1;
        dispatch.max_running.fetch_max(running, Ordering::SeqCst);
        if let Some(delay) = dispatch.delays.get(&self.id) {
            tokio::time::sleep(*delay).await;
        }
        dispatch.running.fetch_sub(1, Ordering::SeqCst);

        dispatch.executed.lock().unwrap().push(self.id.clone());
        if dispatch.failing.lock().unwrap().contains(&self.id) {
            return Err(OpsError::connection_problem(format!("{} exploded", self.id)));
        }
        Ok(())
    }

    async fn rollback(&self) -> Result<()> {
        self.dispatch.rolled_back.lock().unwrap().push(self.id.clone());
        Ok(())
    }
}

/// Wrapper so an `Arc<RecordingDispatch>` can hand itself to executors.
pub struct SharedDispatch(pub Arc<RecordingDispatch>);

impl Dispatch for SharedDispatch {
    fn resolve(&self, params: ExecutorParams) -> Result<Box<dyn PhaseExecutor>> {
        Ok(Box::new(RecordingExecutor {
            id: params.phase.id,
            dispatch: Arc::clone(&self.0),
        }))
    }
}

/// Remote that accepts every command and reports a healthy node.
pub struct FakeRemote {
    pub commands: Mutex<Vec<(String, Vec<String>)>>,
    /// Agents whose ping-pong leg never answers
    pub silent_agents: HashSet<String>,
    /// Write IOPS reported by the disk benchmark
    pub disk_iops: f64,
}

impl Default for FakeRemote {
    fn default() -> Self {
        Self {
            commands: Mutex::new(Vec::new()),
            silent_agents: HashSet::new(),
            disk_iops: 500.0,
        }
    }
}

impl FakeRemote {
    pub fn commands(&self) -> Vec<String> {
        self.commands
            .lock()
            .unwrap()
            .iter()
            .map(|(_, args)| args.join(" "))
            .collect()
    }
}

#[async_trait]
impl Remote for FakeRemote {
    async fn exec(&self, addr: &str, args: &[String]) -> Result<ExecOutput> {
        self.commands
            .lock()
            .unwrap()
            .push((addr.to_string(), args.to_vec()));
        Ok(ExecOutput::default())
    }

    async fn ping_pong(&self, addr: &str, _: &PingPongRequest) -> Result<PingPongResult> {
        if self.silent_agents.contains(addr) {
            tokio::time::sleep(Duration::from_secs(3600)).await;
        }
        Ok(PingPongResult::default())
    }

    async fn check_disks(&self, _: &str, _: &CheckDisksRequest) -> Result<CheckDisksResponse> {
        let output = format!(
            r#"{{"jobs": [{{"jobname": "etcd", "write": {{"iops": {}}},
                "sync": {{"lat_ns": {{"percentile": {{"99.000000": 2000000.0}}}}}}}}]}}"#,
            self.disk_iops
        );
        CheckDisksResponse::parse(&output)
    }

    async fn validate(&self, _: &str, _: &ValidateConfig) -> Result<Vec<Probe>> {
        Ok(Vec::new())
    }
}
