//! Operation plan builders.
//!
//! A plan is built once per operation and persisted as a unit. Building is
//! deterministic: the same inputs always produce the same phase IDs, order
//! and requirement edges. Every manifest dependency a plan refers to is
//! resolved while building, so a missing package fails the operation before
//! any phase runs.

use jiff::Timestamp;

use crate::models::{OperationKey, OperationKind, OperationPlan, Phase, Server, ServiceUser};

mod expand;
mod install;
pub mod phases;
mod reconfigure;
mod topology;

pub use expand::{build_expand_plan, ExpandParams};
pub use install::build_install_plan;
pub use reconfigure::{build_reconfigure_plan, ReconfigureParams};
pub use topology::{split_servers, MAX_MASTER_NODES};

/// Default number of per-node phases executed concurrently.
pub const DEFAULT_NUM_PARALLEL: usize = 10;

/// Inputs of the install plan.
#[derive(Debug, Clone)]
pub struct InstallParams {
    pub key: OperationKey,
    pub servers: Vec<Server>,
    /// Maximum number of per-node phases executed concurrently
    pub num_parallel: usize,
    /// Whether nodes need the SELinux policy bootstrapped
    pub selinux: bool,
    pub service_user: ServiceUser,
    /// Resources supplied by the user, applied after the system resources
    pub user_resources: Option<String>,
    /// Cluster configuration resources applied once the cluster is up
    pub gravity_resources: Option<String>,
}

impl InstallParams {
    pub fn new(key: OperationKey, servers: Vec<Server>) -> Self {
        Self {
            key,
            servers,
            num_parallel: DEFAULT_NUM_PARALLEL,
            selinux: false,
            service_user: ServiceUser::default(),
            user_resources: None,
            gravity_resources: None,
        }
    }
}

/// Top-level phases being assembled into a plan.
#[derive(Debug, Default)]
pub(crate) struct PhaseList {
    phases: Vec<Phase>,
}

impl PhaseList {
    /// Appends a top-level phase. Steps count top-level phases from 1.
    pub(crate) fn push(&mut self, mut phase: Phase) {
        phase.set_step(self.phases.len() as u32 + 1);
        self.phases.push(phase);
    }

    pub(crate) fn contains(&self, id: &str) -> bool {
        self.phases.iter().any(|phase| phase.find(id).is_some())
    }

    /// Requirement list naming only the phases that were actually added.
    pub(crate) fn require_if_present(&self, ids: &[&str]) -> Vec<String> {
        ids.iter()
            .filter(|id| self.contains(id))
            .map(|id| id.to_string())
            .collect()
    }

    pub(crate) fn into_plan(
        self,
        key: &OperationKey,
        kind: OperationKind,
        servers: Vec<Server>,
    ) -> OperationPlan {
        OperationPlan {
            operation_id: key.operation_id.clone(),
            operation_kind: kind,
            account_id: key.account_id.clone(),
            cluster_name: key.cluster_name.clone(),
            servers,
            phases: self.phases,
            created_at: Timestamp::now(),
        }
    }
}

#[cfg(test)]
mod tests;
