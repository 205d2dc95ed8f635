//! Phase identifiers shared by the plan builders and dispatch.

pub const INIT_PHASE: &str = "/init";
pub const SELINUX_PHASE: &str = "/selinux";
pub const CHECKS_PHASE: &str = "/checks";
pub const CONFIGURE_PHASE: &str = "/configure";
pub const BOOTSTRAP_PHASE: &str = "/bootstrap";
pub const PULL_PHASE: &str = "/pull";
pub const MASTERS_PHASE: &str = "/masters";
pub const NODES_PHASE: &str = "/nodes";
pub const WAIT_PHASE: &str = "/wait";
pub const RBAC_PHASE: &str = "/rbac";
pub const SYSTEM_RESOURCES_PHASE: &str = "/system-resources";
pub const USER_RESOURCES_PHASE: &str = "/user-resources";
pub const EXPORT_PHASE: &str = "/export";
pub const RUNTIME_PHASE: &str = "/runtime";
pub const APP_PHASE: &str = "/app";
pub const ELECTION_PHASE: &str = "/election";
pub const GRAVITY_RESOURCES_PHASE: &str = "/gravity-resources";

// Expand
pub const SYSTEM_PHASE: &str = "/system";
pub const ELECT_PHASE: &str = "/elect";

// Reconfigure
pub const NETWORK_PHASE: &str = "/network";
pub const LOCAL_PACKAGES_PHASE: &str = "/local-packages";
pub const ETCD_PHASE: &str = "/etcd";
pub const STATE_PHASE: &str = "/state";
pub const TOKENS_PHASE: &str = "/tokens";
pub const NODE_PHASE: &str = "/node";
pub const DIRECTORIES_PHASE: &str = "/directories";
pub const PODS_PHASE: &str = "/pods";
pub const GRAVITY_PHASE: &str = "/gravity";

/// Components installed as system services on every node.
pub const TELEPORT_COMPONENT: &str = "teleport";
pub const PLANET_COMPONENT: &str = "planet";

/// Joins path segments into a phase ID under `parent`.
pub fn child_id(parent: &str, segment: &str) -> String {
    format!("{parent}/{segment}")
}
