//! Assignment of control plane roles.

use log::debug;

use crate::{
    error::{OpsError, Result},
    models::{ClusterRole, Manifest, Server, SERVICE_ROLE_MASTER, SERVICE_ROLE_NODE},
};

/// Maximum number of servers running the control plane.
pub const MAX_MASTER_NODES: usize = 3;

/// Splits servers into masters and regular nodes.
///
/// Servers whose node profile names an explicit service role get that role.
/// Servers without one become masters until [`MAX_MASTER_NODES`] is reached
/// and regular nodes after that. Explicit `node` servers are never
/// promoted. The returned servers carry their assigned `cluster_role`.
pub fn split_servers(servers: &[Server], manifest: &Manifest) -> Result<(Vec<Server>, Vec<Server>)> {
    let mut explicit = Vec::with_capacity(servers.len());
    for server in servers {
        let profile = manifest.node_profile(&server.role)?;
        let role = match profile.service_role.as_deref() {
            None | Some("") => None,
            Some(SERVICE_ROLE_MASTER) => Some(ClusterRole::Master),
            Some(SERVICE_ROLE_NODE) => Some(ClusterRole::Node),
            Some(other) => {
                return Err(OpsError::bad_parameter(format!(
                    "node profile {:?} has unknown service role {other:?}",
                    profile.name
                )))
            }
        };
        explicit.push(role);
    }

    let mut num_masters = explicit
        .iter()
        .filter(|role| **role == Some(ClusterRole::Master))
        .count();
    if num_masters > MAX_MASTER_NODES {
        return Err(OpsError::bad_parameter(format!(
            "{num_masters} servers require the master role, at most {MAX_MASTER_NODES} are supported"
        )));
    }

    let mut masters = Vec::new();
    let mut nodes = Vec::new();
    for (server, role) in servers.iter().zip(explicit) {
        let role = role.unwrap_or_else(|| {
            if num_masters < MAX_MASTER_NODES {
                num_masters += 1;
                ClusterRole::Master
            } else {
                ClusterRole::Node
            }
        });
        debug!("server {} gets role {}", server.hostname, role.as_str());
        let mut server = server.clone();
        server.cluster_role = Some(role);
        match role {
            ClusterRole::Master => masters.push(server),
            ClusterRole::Node => nodes.push(server),
        }
    }

    if masters.is_empty() {
        return Err(OpsError::bad_parameter(
            "at least one server must be able to run the master role",
        ));
    }
    Ok((masters, nodes))
}
