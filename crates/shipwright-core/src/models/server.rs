//! Server descriptions and the system facts agents report about them.

use std::time::Duration;

use jiff::Timestamp;
use serde::{Deserialize, Serialize};

/// Role a server plays in the cluster control plane.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ClusterRole {
    Master,
    Node,
}

impl ClusterRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            ClusterRole::Master => "master",
            ClusterRole::Node => "node",
        }
    }
}

/// Operating system identity as reported by an agent.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct OsInfo {
    /// Distribution ID, e.g. `centos` or `ubuntu`
    pub id: String,

    /// Distribution version, e.g. `7.2.1511` or `16.04`
    pub version: String,
}

impl OsInfo {
    pub fn new(id: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            version: version.into(),
        }
    }

    /// Major component of the version (everything before the first dot).
    pub fn major_version(&self) -> &str {
        self.version.split('.').next().unwrap_or_default()
    }

    /// Whether the version string has more than one component.
    pub fn is_multi_component(&self) -> bool {
        self.version.contains('.')
    }
}

/// A cluster node participating in an operation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Server {
    pub hostname: String,

    /// Address other nodes and the agent transport use to reach this node
    pub advertise_ip: String,

    /// Name of the node profile this server was assigned
    pub role: String,

    /// Control plane role, assigned by the plan builder
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cluster_role: Option<ClusterRole>,

    #[serde(default)]
    pub os: OsInfo,
}

impl Server {
    pub fn new(
        hostname: impl Into<String>,
        advertise_ip: impl Into<String>,
        role: impl Into<String>,
    ) -> Self {
        Self {
            hostname: hostname.into(),
            advertise_ip: advertise_ip.into(),
            role: role.into(),
            cluster_role: None,
            os: OsInfo::default(),
        }
    }

    pub fn is_master(&self) -> bool {
        self.cluster_role == Some(ClusterRole::Master)
    }

    /// Address of the agent running on this server.
    pub fn agent_addr(&self) -> &str {
        &self.advertise_ip
    }
}

/// Memory statistics in bytes.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct MemoryInfo {
    pub total: u64,
    pub free: u64,
    /// Free memory including reclaimable buffers and caches
    pub actual_free: u64,
}

impl MemoryInfo {
    /// Memory considered available when matching against requirements.
    pub fn available(&self) -> u64 {
        self.free.saturating_add(self.actual_free)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Filesystem {
    pub dir_name: String,
    pub dev_name: String,
    pub total: u64,
    pub free: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NetworkInterface {
    pub name: String,
    pub ipv4: String,
}

/// A clock reading taken from a server together with the round-trip latency
/// of the request that fetched it.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct ServerTime {
    pub time: Timestamp,
    pub latency: Duration,
}

/// System facts reported by the agent on a server.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct ServerInfo {
    pub hostname: String,
    pub advertise_ip: String,
    pub role: String,
    pub cpus: u32,
    pub memory: MemoryInfo,
    #[serde(default)]
    pub filesystems: Vec<Filesystem>,
    pub os: OsInfo,
    #[serde(default)]
    pub interfaces: Vec<NetworkInterface>,
    pub server_time: ServerTime,
}

impl ServerInfo {
    /// Server description derived from the report.
    pub fn to_server(&self) -> Server {
        Server {
            hostname: self.hostname.clone(),
            advertise_ip: self.advertise_ip.clone(),
            role: self.role.clone(),
            cluster_role: None,
            os: self.os.clone(),
        }
    }
}

/// Collection of server reports used by cluster-wide predicates.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServerInfos(pub Vec<ServerInfo>);

impl ServerInfos {
    pub fn find_by_hostname(&self, hostname: &str) -> Option<&ServerInfo> {
        self.0.iter().find(|info| info.hostname == hostname)
    }

    pub fn hostnames(&self) -> Vec<&str> {
        self.0.iter().map(|info| info.hostname.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ServerInfo> {
        self.0.iter()
    }
}

/// Snapshot of agents that have joined an install operation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct AgentReport {
    pub servers: Vec<ServerInfo>,
    #[serde(default)]
    pub message: String,
}

impl AgentReport {
    /// Hostnames present in this report but not in `previous`.
    pub fn joined_since<'a>(&'a self, previous: Option<&AgentReport>) -> Vec<&'a str> {
        self.servers
            .iter()
            .filter(|info| {
                previous.map_or(true, |prev| {
                    !prev.servers.iter().any(|p| p.hostname == info.hostname)
                })
            })
            .map(|info| info.hostname.as_str())
            .collect()
    }
}
