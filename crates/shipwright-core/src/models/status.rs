//! Status enumerations for operations, phases and progress.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Type-safe enumeration of operation kinds.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum OperationKind {
    /// Initial cluster installation
    Install,

    /// Adding a node to an installed cluster
    Expand,

    /// Changing the advertise address of a single-node cluster
    Reconfigure,
}

impl FromStr for OperationKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "install" => Ok(OperationKind::Install),
            "expand" => Ok(OperationKind::Expand),
            "reconfigure" => Ok(OperationKind::Reconfigure),
            _ => Err(format!("Invalid operation kind: {s}")),
        }
    }
}

impl OperationKind {
    /// Convert to database string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationKind::Install => "install",
            OperationKind::Expand => "expand",
            OperationKind::Reconfigure => "reconfigure",
        }
    }
}

/// Lifecycle of an operation as a whole.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum OperationState {
    /// Operation was created but the plan has not started
    #[default]
    Created,

    /// Plan execution is underway
    InProgress,

    /// Operation finished successfully
    Completed,

    /// Operation finished with an error
    Failed,
}

impl FromStr for OperationState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "created" => Ok(OperationState::Created),
            "inprogress" | "in_progress" => Ok(OperationState::InProgress),
            "completed" => Ok(OperationState::Completed),
            "failed" => Ok(OperationState::Failed),
            _ => Err(format!("Invalid operation state: {s}")),
        }
    }
}

impl OperationState {
    /// Convert to database string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationState::Created => "created",
            OperationState::InProgress => "inprogress",
            OperationState::Completed => "completed",
            OperationState::Failed => "failed",
        }
    }

    pub fn is_finished(&self) -> bool {
        matches!(self, OperationState::Completed | OperationState::Failed)
    }
}

/// State of a single phase, as folded from its change log.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default, Hash)]
#[serde(rename_all = "lowercase")]
pub enum PhaseState {
    /// No transition has been recorded
    #[default]
    Unstarted,

    /// Phase executor is running (or was running when the process died)
    InProgress,

    /// Phase executor finished successfully
    Completed,

    /// Phase executor returned an error
    Failed,

    /// Phase side effects were undone by an explicit rollback
    RolledBack,
}

impl FromStr for PhaseState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "unstarted" => Ok(PhaseState::Unstarted),
            "inprogress" | "in_progress" => Ok(PhaseState::InProgress),
            "completed" => Ok(PhaseState::Completed),
            "failed" => Ok(PhaseState::Failed),
            "rolledback" | "rolled_back" => Ok(PhaseState::RolledBack),
            _ => Err(format!("Invalid phase state: {s}")),
        }
    }
}

impl PhaseState {
    /// Convert to database string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            PhaseState::Unstarted => "unstarted",
            PhaseState::InProgress => "inprogress",
            PhaseState::Completed => "completed",
            PhaseState::Failed => "failed",
            PhaseState::RolledBack => "rolledback",
        }
    }

    /// Get state with consistent icon formatting for display.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use shipwright_core::models::PhaseState;
    ///
    /// assert_eq!(PhaseState::Completed.with_icon(), "✓ Completed");
    /// assert_eq!(PhaseState::Failed.with_icon(), "✗ Failed");
    /// ```
    pub fn with_icon(&self) -> &'static str {
        match self {
            PhaseState::Unstarted => "○ Unstarted",
            PhaseState::InProgress => "➤ In Progress",
            PhaseState::Completed => "✓ Completed",
            PhaseState::Failed => "✗ Failed",
            PhaseState::RolledBack => "↺ Rolled Back",
        }
    }
}

/// State carried by a progress entry.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ProgressState {
    InProgress,
    Completed,
    Failed,
}

impl FromStr for ProgressState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "inprogress" | "in_progress" => Ok(ProgressState::InProgress),
            "completed" => Ok(ProgressState::Completed),
            "failed" => Ok(ProgressState::Failed),
            _ => Err(format!("Invalid progress state: {s}")),
        }
    }
}

impl ProgressState {
    /// Convert to database string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            ProgressState::InProgress => "inprogress",
            ProgressState::Completed => "completed",
            ProgressState::Failed => "failed",
        }
    }
}
