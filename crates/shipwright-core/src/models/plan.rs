//! Operation plan model: a tree of phases with dependency edges.

use std::collections::HashSet;

use jiff::Timestamp;
use serde::{Deserialize, Serialize};

use super::{Locator, OperationKey, OperationKind, PhaseState, Server};
use crate::error::{OpsError, Result};

/// Packages and applications a server pulls to its local package store.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct PullData {
    #[serde(default)]
    pub packages: Vec<Locator>,
    #[serde(default)]
    pub apps: Vec<Locator>,
}

/// User and group that own the cluster state on every node.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ServiceUser {
    pub name: String,
    pub uid: u32,
    pub gid: u32,
}

impl Default for ServiceUser {
    fn default() -> Self {
        Self {
            name: "planet".to_string(),
            uid: 1000,
            gid: 1000,
        }
    }
}

/// Payload a leaf phase's executor works from.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct PhaseData {
    /// Server the phase runs against
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server: Option<Server>,

    /// Master that runs cluster-level work for this phase
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub master: Option<Server>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub package: Option<Locator>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pull: Option<PullData>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_user: Option<ServiceUser>,

    /// Raw resource definitions applied by resource phases
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resources: Option<String>,

    /// Command line executed on `server` by command phases
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub command: Vec<String>,
}

/// A node in the plan tree.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Phase {
    /// Unique slash-delimited path, e.g. `/masters/node-1/planet`
    pub id: String,

    pub description: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<PhaseData>,

    /// Phases that must be completed before this one may start
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub requires: Vec<String>,

    /// Maximum number of children executed concurrently
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<usize>,

    /// Coarse plan step used for progress reporting
    #[serde(default)]
    pub step: u32,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub phases: Vec<Phase>,
}

impl Phase {
    pub fn new(id: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            description: description.into(),
            data: None,
            requires: Vec::new(),
            limit: None,
            step: 0,
            phases: Vec::new(),
        }
    }

    pub fn with_data(mut self, data: PhaseData) -> Self {
        self.data = Some(data);
        self
    }

    pub fn with_requires(mut self, requires: Vec<String>) -> Self {
        self.requires = requires;
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn is_leaf(&self) -> bool {
        self.phases.is_empty()
    }

    /// Appends a child phase; children inherit the parent's step.
    pub fn add_child(&mut self, mut child: Phase) {
        child.set_step(self.step);
        self.phases.push(child);
    }

    pub(crate) fn set_step(&mut self, step: u32) {
        self.step = step;
        for child in &mut self.phases {
            child.set_step(step);
        }
    }

    /// Depth-first search for a phase with the given ID in this subtree.
    pub fn find(&self, id: &str) -> Option<&Phase> {
        if self.id == id {
            return Some(self);
        }
        self.phases.iter().find_map(|child| child.find(id))
    }

    /// Leaf phases of this subtree in plan order.
    pub fn leaves(&self) -> Vec<&Phase> {
        if self.is_leaf() {
            return vec![self];
        }
        self.phases.iter().flat_map(Phase::leaves).collect()
    }

    fn walk<'a>(&'a self, out: &mut Vec<&'a Phase>) {
        out.push(self);
        for child in &self.phases {
            child.walk(out);
        }
    }
}

/// The full set of phases for one operation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OperationPlan {
    pub operation_id: String,
    pub operation_kind: OperationKind,
    pub account_id: String,
    pub cluster_name: String,
    pub servers: Vec<Server>,
    pub phases: Vec<Phase>,
    pub created_at: Timestamp,
}

impl OperationPlan {
    pub fn key(&self) -> OperationKey {
        OperationKey::new(&self.account_id, &self.cluster_name, &self.operation_id)
    }

    pub fn find_phase(&self, id: &str) -> Option<&Phase> {
        self.phases.iter().find_map(|phase| phase.find(id))
    }

    /// Every phase in the plan, parents before their children.
    pub fn all_phases(&self) -> Vec<&Phase> {
        let mut out = Vec::new();
        for phase in &self.phases {
            phase.walk(&mut out);
        }
        out
    }

    /// Leaf phases in plan order.
    pub fn leaf_phases(&self) -> Vec<&Phase> {
        self.phases.iter().flat_map(Phase::leaves).collect()
    }

    pub fn top_level_count(&self) -> usize {
        self.phases.len()
    }

    /// Chain of ancestors of the phase with the given ID, outermost first.
    pub fn ancestors(&self, id: &str) -> Vec<&Phase> {
        fn search<'a>(phase: &'a Phase, id: &str, chain: &mut Vec<&'a Phase>) -> bool {
            if phase.id == id {
                return true;
            }
            chain.push(phase);
            if phase.phases.iter().any(|child| search(child, id, chain)) {
                return true;
            }
            chain.pop();
            false
        }

        let mut chain = Vec::new();
        for phase in &self.phases {
            if search(phase, id, &mut chain) {
                return chain;
            }
        }
        Vec::new()
    }

    /// Verifies the structural invariants: unique IDs, composite phases
    /// without executable data and requirements that name existing phases.
    pub fn check(&self) -> Result<()> {
        let phases = self.all_phases();
        let mut ids = HashSet::new();
        for phase in &phases {
            if !ids.insert(phase.id.as_str()) {
                return Err(OpsError::bad_parameter(format!(
                    "duplicate phase ID {:?}",
                    phase.id
                )));
            }
            if !phase.is_leaf() && phase.data.is_some() {
                return Err(OpsError::bad_parameter(format!(
                    "phase {:?} has children and cannot carry data",
                    phase.id
                )));
            }
        }
        for phase in &phases {
            if let Some(missing) = phase.requires.iter().find(|id| !ids.contains(id.as_str())) {
                return Err(OpsError::bad_parameter(format!(
                    "phase {:?} requires unknown phase {missing:?}",
                    phase.id
                )));
            }
        }
        Ok(())
    }
}

/// Immutable record of one phase state transition.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PlanChange {
    /// Sequence number, increasing in the order changes were recorded
    pub id: u64,
    pub operation_id: String,
    pub phase_id: String,
    pub new_state: PhaseState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub created_at: Timestamp,
}
