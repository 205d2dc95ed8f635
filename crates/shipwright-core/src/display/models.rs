//! Display implementations for domain models.

use std::fmt;

use super::LocalDateTime;
use crate::models::{
    Operation, OperationKind, OperationState, PhaseState, Probe, ProbeSeverity, ProgressEntry,
    ProgressState,
};

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for OperationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for PhaseState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "# Operation {}", self.key.operation_id)?;
        writeln!(f)?;
        writeln!(f, "- Kind: {}", self.kind)?;
        writeln!(f, "- Cluster: {}", self.key.cluster_name)?;
        writeln!(f, "- State: {}", self.state)?;
        writeln!(f, "- Created: {}", LocalDateTime(&self.created_at))?;
        writeln!(f, "- Updated: {}", LocalDateTime(&self.updated_at))?;
        if let Some(message) = &self.message {
            writeln!(f)?;
            writeln!(f, "{message}")?;
        }
        Ok(())
    }
}

impl fmt::Display for ProgressEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match self.state {
            ProgressState::InProgress => "➤",
            ProgressState::Completed => "✓",
            ProgressState::Failed => "✗",
        };
        writeln!(
            f,
            "{state} **{}%** (step {}) {}",
            self.completion, self.step, self.message
        )?;
        writeln!(f, "  _{}_", LocalDateTime(&self.created_at))
    }
}

impl fmt::Display for Probe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let severity = match self.severity {
            ProbeSeverity::Critical => "critical",
            ProbeSeverity::Warning => "warning",
        };
        write!(f, "[{severity}] {}: {}", self.checker, self.message)?;
        if !self.detail.is_empty() {
            write!(f, " ({})", self.detail)?;
        }
        Ok(())
    }
}
