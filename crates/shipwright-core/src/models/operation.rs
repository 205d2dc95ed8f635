//! Operation identity, lifecycle and progress records.

use std::fmt;

use jiff::Timestamp;
use serde::{Deserialize, Serialize};

use super::{OperationKind, OperationState, ProgressState};

/// Identifies an operation within a cluster.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct OperationKey {
    pub account_id: String,
    pub cluster_name: String,
    pub operation_id: String,
}

impl OperationKey {
    pub fn new(
        account_id: impl Into<String>,
        cluster_name: impl Into<String>,
        operation_id: impl Into<String>,
    ) -> Self {
        Self {
            account_id: account_id.into(),
            cluster_name: cluster_name.into(),
            operation_id: operation_id.into(),
        }
    }
}

impl fmt::Display for OperationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "operation({}/{}/{})",
            self.account_id, self.cluster_name, self.operation_id
        )
    }
}

/// A cluster operation and its lifecycle state.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Operation {
    pub key: OperationKey,
    pub kind: OperationKind,
    pub state: OperationState,

    /// Final message recorded when the operation finished
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

/// Coarse progress summary persisted for cheap polling.
///
/// Progress entries are informational only: the plan change log decides
/// what runs next.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProgressEntry {
    pub operation_id: String,

    /// Completion percentage, 0 to 100
    pub completion: u32,

    /// Plan step the entry was computed from
    pub step: u32,

    pub state: ProgressState,
    pub message: String,
    pub created_at: Timestamp,
}

impl ProgressEntry {
    pub fn is_finished(&self) -> bool {
        matches!(
            self.state,
            ProgressState::Completed | ProgressState::Failed
        )
    }
}
