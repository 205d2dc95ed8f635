//! Markdown rendering of operations, plans, progress and probes.
//!
//! Models stay free of presentation logic. Anything shown to a user goes
//! through a wrapper type from this module whose `Display` implementation
//! produces markdown, which the CLI renders to the terminal.
//!
//! ```text
//! ┌─────────────────┐    ┌─────────────────┐    ┌─────────────────┐
//! │  Domain Models  │───▶│ Display Wrapper │───▶│    Markdown     │
//! │ (Plan, Probes)  │    │ (PlanView, ...) │    │ (termimad/CLI)  │
//! └─────────────────┘    └─────────────────┘    └─────────────────┘
//! ```
//!
//! # Example
//!
//! ```rust
//! use shipwright_core::display::PlanView;
//! use shipwright_core::fsm::PlanState;
//! use shipwright_core::models::{OperationKind, OperationPlan, Phase, PhaseState};
//! use jiff::Timestamp;
//!
//! let plan = OperationPlan {
//!     operation_id: "op-1".to_string(),
//!     operation_kind: OperationKind::Install,
//!     account_id: "system".to_string(),
//!     cluster_name: "example.com".to_string(),
//!     servers: Vec::new(),
//!     phases: vec![Phase::new("/init", "Initialize the operation")],
//!     created_at: Timestamp::UNIX_EPOCH,
//! };
//! let state = PlanState::default();
//!
//! let output = PlanView::new(&plan, &state).to_string();
//! assert!(output.contains("/init"));
//! assert!(output.contains(PhaseState::Unstarted.with_icon()));
//! ```

use std::fmt;

use jiff::{tz::TimeZone, Timestamp};

mod collections;
mod models;
mod plan;

pub use collections::{OperationList, ProbeList};
pub use plan::PlanView;

/// Formats a timestamp in the system time zone as `YYYY-MM-DD HH:MM:SS TZ`.
pub struct LocalDateTime<'a>(pub &'a Timestamp);

impl fmt::Display for LocalDateTime<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let zoned = self.0.to_zoned(TimeZone::system());
        write!(f, "{}", zoned.strftime("%Y-%m-%d %H:%M:%S %Z"))
    }
}

/// One-line success or failure message.
pub struct OperationStatus {
    pub message: String,
    pub success: bool,
    /// Follow-up commands listed under the message
    pub hints: Vec<String>,
}

impl OperationStatus {
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            success: true,
            hints: Vec::new(),
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            success: false,
            hints: Vec::new(),
        }
    }

    pub fn with_hints(mut self, hints: Vec<String>) -> Self {
        self.hints = hints;
        self
    }
}

impl fmt::Display for OperationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = if self.success { "Success:" } else { "Error:" };
        writeln!(f, "{label} {}", self.message)?;
        if !self.hints.is_empty() {
            writeln!(f)?;
            for hint in &self.hints {
                writeln!(f, "- {hint}")?;
            }
        }
        Ok(())
    }
}
