use std::fmt;

use super::LocalDateTime;
use crate::{
    fsm::PlanState,
    models::{OperationPlan, Phase, PhaseState},
};

/// A plan together with the folded state of its phases.
pub struct PlanView<'a> {
    plan: &'a OperationPlan,
    state: &'a PlanState,
}

impl<'a> PlanView<'a> {
    pub fn new(plan: &'a OperationPlan, state: &'a PlanState) -> Self {
        Self { plan, state }
    }

    fn fmt_phase(&self, f: &mut fmt::Formatter<'_>, phase: &Phase, depth: usize) -> fmt::Result {
        let indent = "· ".repeat(depth);
        let requires = if phase.requires.is_empty() {
            "-".to_string()
        } else {
            phase.requires.join(", ")
        };
        writeln!(
            f,
            "| {indent}{} | {} | {} | {requires} |",
            phase.id,
            phase.description,
            self.state.phase_state(phase).with_icon(),
        )?;
        for child in &phase.phases {
            self.fmt_phase(f, child, depth + 1)?;
        }
        Ok(())
    }
}

impl fmt::Display for PlanView<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let plan = self.plan;
        writeln!(
            f,
            "# {} operation {}",
            capitalize(plan.operation_kind.as_str()),
            plan.operation_id
        )?;
        writeln!(f)?;
        writeln!(f, "- Cluster: {}", plan.cluster_name)?;
        writeln!(f, "- Created: {}", LocalDateTime(&plan.created_at))?;

        let leaves = plan.leaf_phases();
        let completed = leaves
            .iter()
            .filter(|phase| self.state.leaf_state(&phase.id) == PhaseState::Completed)
            .count();
        writeln!(f, "- Progress: {completed}/{} phases completed", leaves.len())?;
        writeln!(f)?;

        writeln!(f, "| Phase | Description | State | Requires |")?;
        writeln!(f, "|:-|:-|:-|:-|")?;
        for phase in &plan.phases {
            self.fmt_phase(f, phase, 0)?;
        }

        let failures = self.state.failures(plan);
        if !failures.is_empty() {
            writeln!(f, "\n## Failures")?;
            writeln!(f)?;
            for (id, error) in failures {
                writeln!(f, "- `{id}`: {}", error.unwrap_or("no error recorded"))?;
            }
        }
        Ok(())
    }
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
