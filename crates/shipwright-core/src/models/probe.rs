//! Preflight check outcomes.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ProbeStatus {
    Passed,
    Failed,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ProbeSeverity {
    /// Blocks the operation
    Critical,
    /// Reported to the user but does not block
    Warning,
}

/// The atomic result of a preflight check.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Probe {
    /// Name of the checker that produced the probe
    pub checker: String,
    pub status: ProbeStatus,
    pub severity: ProbeSeverity,
    pub message: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub detail: String,
}

impl Probe {
    pub fn failed(
        checker: impl Into<String>,
        severity: ProbeSeverity,
        message: impl Into<String>,
    ) -> Self {
        Self {
            checker: checker.into(),
            status: ProbeStatus::Failed,
            severity,
            message: message.into(),
            detail: String::new(),
        }
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = detail.into();
        self
    }

    pub fn is_failed(&self) -> bool {
        self.status == ProbeStatus::Failed
    }

    pub fn is_critical(&self) -> bool {
        self.is_failed() && self.severity == ProbeSeverity::Critical
    }

    pub fn is_warning(&self) -> bool {
        self.is_failed() && self.severity == ProbeSeverity::Warning
    }
}
