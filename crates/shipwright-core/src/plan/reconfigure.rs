//! Reconfigure plan: moves a single-node cluster to a new advertise address.

use super::{phases::*, PhaseList};
use crate::{
    error::{OpsError, Result},
    models::{OperationKey, OperationKind, OperationPlan, Phase, PhaseData, Server},
    services::agent_command,
};

#[derive(Debug, Clone)]
pub struct ReconfigureParams {
    pub key: OperationKey,
    /// The cluster's only master
    pub server: Server,
    /// New address the node advertises
    pub advertise_addr: String,
}

/// Steps in execution order, with their descriptions.
const STEPS: &[(&str, &str)] = &[
    (CHECKS_PHASE, "Run preflight checks"),
    (NETWORK_PHASE, "Remove old network interfaces"),
    (LOCAL_PACKAGES_PHASE, "Reconfigure local packages"),
    (ETCD_PHASE, "Reset etcd membership"),
    (STATE_PHASE, "Update cluster state"),
    (TOKENS_PHASE, "Recreate service account tokens"),
    (NODE_PHASE, "Replace the Kubernetes node object"),
    (DIRECTORIES_PHASE, "Update directory permissions"),
    (PODS_PHASE, "Restart cluster pods"),
    (GRAVITY_PHASE, "Restart cluster controller"),
];

/// Builds the reconfigure plan. Every step runs a command on the node and
/// requires the step before it.
pub fn build_reconfigure_plan(params: &ReconfigureParams) -> Result<OperationPlan> {
    if params.advertise_addr.trim().is_empty() {
        return Err(OpsError::bad_parameter("new advertise address is required"));
    }
    if params.advertise_addr == params.server.advertise_ip {
        return Err(OpsError::bad_parameter(format!(
            "node {} already advertises {}",
            params.server.hostname, params.advertise_addr
        )));
    }

    let mut plan = PhaseList::default();
    let mut previous: Option<&str> = None;
    for (id, description) in STEPS {
        let step = id.trim_start_matches('/');
        let phase = Phase::new(*id, *description)
            .with_data(PhaseData {
                server: Some(params.server.clone()),
                command: agent_command([
                    "system",
                    "reconfigure",
                    step,
                    "--advertise-addr",
                    params.advertise_addr.as_str(),
                ]),
                ..Default::default()
            })
            .with_requires(previous.map(|p| plan.require_if_present(&[p])).unwrap_or_default());
        plan.push(phase);
        previous = Some(*id);
    }

    let plan = plan.into_plan(
        &params.key,
        OperationKind::Reconfigure,
        vec![params.server.clone()],
    );
    plan.check()?;
    Ok(plan)
}
