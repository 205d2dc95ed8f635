//! Data models for operations, plans and preflight checks.
//!
//! Display implementations for these models live in [`crate::display`] so
//! that the data structures stay free of presentation logic.

mod manifest;
mod operation;
mod plan;
mod probe;
mod server;
mod status;

pub use manifest::*;
pub use operation::{Operation, OperationKey, ProgressEntry};
pub use plan::{OperationPlan, Phase, PhaseData, PlanChange, PullData, ServiceUser};
pub use probe::{Probe, ProbeSeverity, ProbeStatus};
pub use server::{
    AgentReport, ClusterRole, Filesystem, MemoryInfo, NetworkInterface, OsInfo, Server,
    ServerInfo, ServerInfos, ServerTime,
};
pub use status::{OperationKind, OperationState, PhaseState, ProgressState};

#[cfg(test)]
mod tests;
