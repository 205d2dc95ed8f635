//! Operation configuration files.
//!
//! Each engine is driven by a JSON document describing the cluster, the
//! servers and the application manifest. Optional fields fall back to the
//! defaults below.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::{
    checks::{CheckerConfig, DiskThresholds, MAX_OUT_OF_SYNC_TIME_DELTA},
    error::{OpsError, Result},
    models::{Manifest, OperationKey, Server, ServiceUser},
    phases::DEFAULT_WAIT_TIMEOUT,
    plan::{ExpandParams, InstallParams, ReconfigureParams, DEFAULT_NUM_PARALLEL},
};

/// Account operations are created under when none is configured.
pub const DEFAULT_ACCOUNT: &str = "system";

/// Default state directory on the nodes.
pub const DEFAULT_STATE_DIR: &str = "/var/lib/gravity";

/// Default time to wait for every agent to join.
pub const DEFAULT_AGENT_WAIT_SECS: u64 = 300;

fn default_account() -> String {
    DEFAULT_ACCOUNT.to_string()
}

fn default_num_parallel() -> usize {
    DEFAULT_NUM_PARALLEL
}

fn default_state_dir() -> PathBuf {
    PathBuf::from(DEFAULT_STATE_DIR)
}

fn default_agent_wait_secs() -> u64 {
    DEFAULT_AGENT_WAIT_SECS
}

fn default_wait_secs() -> u64 {
    DEFAULT_WAIT_TIMEOUT.as_secs()
}

fn default_max_time_drift_ms() -> u64 {
    MAX_OUT_OF_SYNC_TIME_DELTA.as_millis() as u64
}

fn default_true() -> bool {
    true
}

/// Reads and parses a JSON configuration file.
pub fn load_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let contents = std::fs::read_to_string(path).map_err(|source| OpsError::FileSystem {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(serde_json::from_str(&contents)?)
}

fn require(value: &str, name: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(OpsError::Configuration {
            message: format!("{name} must not be empty"),
        });
    }
    Ok(())
}

/// Settings of an install operation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InstallConfig {
    pub cluster_name: String,

    #[serde(default = "default_account")]
    pub account_id: String,

    /// Operation ID to resume; generated and remembered in the state
    /// directory when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operation_id: Option<String>,

    pub servers: Vec<Server>,

    pub manifest: Manifest,

    #[serde(default = "default_num_parallel")]
    pub num_parallel: usize,

    #[serde(default)]
    pub selinux: bool,

    #[serde(default)]
    pub service_user: ServiceUser,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_resources: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gravity_resources: Option<String>,

    /// Local directory holding the install token and operation ID
    #[serde(default = "default_state_dir")]
    pub state_dir: PathBuf,

    #[serde(default = "default_agent_wait_secs")]
    pub agent_wait_timeout_secs: u64,

    #[serde(default = "default_wait_secs")]
    pub cluster_wait_timeout_secs: u64,

    /// Initialize the plan without running it
    #[serde(default)]
    pub manual: bool,

    #[serde(default = "default_max_time_drift_ms")]
    pub max_time_drift_ms: u64,

    #[serde(default = "default_true")]
    pub test_bandwidth: bool,
}

impl InstallConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let config: Self = load_json(path)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        require(&self.cluster_name, "cluster_name")?;
        require(&self.account_id, "account_id")?;
        if self.servers.is_empty() {
            return Err(OpsError::Configuration {
                message: "at least one server is required".to_string(),
            });
        }
        if self.num_parallel == 0 {
            return Err(OpsError::Configuration {
                message: "num_parallel must be at least 1".to_string(),
            });
        }
        for server in &self.servers {
            require(&server.hostname, "server hostname")?;
            require(&server.advertise_ip, "server advertise_ip")?;
        }
        Ok(())
    }

    pub fn agent_wait_timeout(&self) -> Duration {
        Duration::from_secs(self.agent_wait_timeout_secs)
    }

    pub fn cluster_wait_timeout(&self) -> Duration {
        Duration::from_secs(self.cluster_wait_timeout_secs)
    }

    /// Preflight check settings, disk thresholds come from the environment.
    pub fn checker_config(&self) -> CheckerConfig {
        CheckerConfig {
            max_time_drift: Duration::from_millis(self.max_time_drift_ms),
            disk_thresholds: DiskThresholds::from_env(),
            state_dir: self.state_dir.clone(),
            test_bandwidth: self.test_bandwidth,
            ..CheckerConfig::default()
        }
    }

    pub fn install_params(&self, key: OperationKey, servers: Vec<Server>) -> InstallParams {
        InstallParams {
            num_parallel: self.num_parallel,
            selinux: self.selinux,
            service_user: self.service_user.clone(),
            user_resources: self.user_resources.clone(),
            gravity_resources: self.gravity_resources.clone(),
            ..InstallParams::new(key, servers)
        }
    }
}

/// Settings of an expand operation joining one node.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExpandConfig {
    pub cluster_name: String,

    #[serde(default = "default_account")]
    pub account_id: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operation_id: Option<String>,

    /// The joining server
    pub server: Server,

    /// A master of the running cluster
    pub master: Server,

    pub manifest: Manifest,

    #[serde(default)]
    pub selinux: bool,

    #[serde(default)]
    pub service_user: ServiceUser,

    #[serde(default = "default_state_dir")]
    pub state_dir: PathBuf,

    #[serde(default = "default_wait_secs")]
    pub cluster_wait_timeout_secs: u64,

    #[serde(default)]
    pub manual: bool,
}

impl ExpandConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let config: Self = load_json(path)?;
        require(&config.cluster_name, "cluster_name")?;
        require(&config.server.hostname, "server hostname")?;
        require(&config.master.hostname, "master hostname")?;
        Ok(config)
    }

    pub fn expand_params(&self, key: OperationKey) -> ExpandParams {
        ExpandParams {
            key,
            server: self.server.clone(),
            master: self.master.clone(),
            selinux: self.selinux,
            service_user: self.service_user.clone(),
        }
    }

    pub fn checker_config(&self) -> CheckerConfig {
        CheckerConfig {
            disk_thresholds: DiskThresholds::from_env(),
            state_dir: self.state_dir.clone(),
            ..CheckerConfig::default()
        }
    }
}

/// Settings of a reconfigure operation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReconfigureConfig {
    pub cluster_name: String,

    #[serde(default = "default_account")]
    pub account_id: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operation_id: Option<String>,

    /// The cluster's only node, with its current address
    pub server: Server,

    /// Address the node will advertise
    pub advertise_addr: String,

    pub manifest: Manifest,

    #[serde(default = "default_state_dir")]
    pub state_dir: PathBuf,

    #[serde(default)]
    pub manual: bool,
}

impl ReconfigureConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let config: Self = load_json(path)?;
        require(&config.cluster_name, "cluster_name")?;
        require(&config.advertise_addr, "advertise_addr")?;
        Ok(config)
    }

    pub fn reconfigure_params(&self, key: OperationKey) -> ReconfigureParams {
        ReconfigureParams {
            key,
            server: self.server.clone(),
            advertise_addr: self.advertise_addr.clone(),
        }
    }
}
