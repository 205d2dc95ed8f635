//! Phase state as a fold over the plan change log.

use std::collections::HashMap;

use crate::models::{OperationPlan, Phase, PhaseState, PlanChange};

/// Current state of every phase of a plan.
///
/// Only leaf phases have changes recorded against them; the state of a
/// composite phase is derived from its children.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlanState {
    leaves: HashMap<String, (PhaseState, Option<String>)>,
}

impl PlanState {
    /// Folds the change log in sequence order, the last change for a phase
    /// wins.
    pub fn from_changes(changes: &[PlanChange]) -> Self {
        let mut ordered: Vec<&PlanChange> = changes.iter().collect();
        ordered.sort_by_key(|change| change.id);

        let mut leaves = HashMap::new();
        for change in ordered {
            leaves.insert(
                change.phase_id.clone(),
                (change.new_state, change.error.clone()),
            );
        }
        Self { leaves }
    }

    /// State of a phase, unstarted if nothing has been recorded for it.
    pub fn phase_state(&self, phase: &Phase) -> PhaseState {
        if phase.is_leaf() {
            return self.leaf_state(&phase.id);
        }
        let children: Vec<PhaseState> = phase.phases.iter().map(|c| self.phase_state(c)).collect();
        resolve(&children)
    }

    /// Whether any leaf under `phase` (or `phase` itself) is in progress.
    pub fn is_running(&self, phase: &Phase) -> bool {
        phase
            .leaves()
            .iter()
            .any(|leaf| self.leaf_state(&leaf.id) == PhaseState::InProgress)
    }

    pub fn leaf_state(&self, id: &str) -> PhaseState {
        self.leaves
            .get(id)
            .map(|(state, _)| *state)
            .unwrap_or_default()
    }

    /// Error recorded with the phase's last failure.
    pub fn error(&self, id: &str) -> Option<&str> {
        self.leaves
            .get(id)
            .and_then(|(state, error)| match state {
                PhaseState::Failed => error.as_deref(),
                _ => None,
            })
    }

    /// State of the phase with the given ID, unstarted for unknown IDs.
    pub fn state_of(&self, plan: &OperationPlan, id: &str) -> PhaseState {
        plan.find_phase(id)
            .map(|phase| self.phase_state(phase))
            .unwrap_or_default()
    }

    /// Requirements of `phase` and of all of its ancestors that have not
    /// completed yet.
    pub fn unmet_requirements<'a>(&self, plan: &'a OperationPlan, phase: &'a Phase) -> Vec<&'a str> {
        plan.ancestors(&phase.id)
            .into_iter()
            .chain(std::iter::once(phase))
            .flat_map(|p| p.requires.iter())
            .filter(|id| self.state_of(plan, id) != PhaseState::Completed)
            .map(String::as_str)
            .collect()
    }

    pub fn is_completed(&self, plan: &OperationPlan) -> bool {
        plan.phases
            .iter()
            .all(|phase| self.phase_state(phase) == PhaseState::Completed)
    }

    pub fn is_failed(&self, plan: &OperationPlan) -> bool {
        plan.leaf_phases()
            .iter()
            .any(|phase| self.leaf_state(&phase.id) == PhaseState::Failed)
    }

    /// Leaf phases that failed, in plan order, with their errors.
    pub fn failures<'a>(&'a self, plan: &'a OperationPlan) -> Vec<(&'a str, Option<&'a str>)> {
        plan.leaf_phases()
            .into_iter()
            .filter(|phase| self.leaf_state(&phase.id) == PhaseState::Failed)
            .map(|phase| (phase.id.as_str(), self.error(&phase.id)))
            .collect()
    }
}

/// Derives a composite phase's state from its children's.
fn resolve(children: &[PhaseState]) -> PhaseState {
    let all = |state: PhaseState| children.iter().all(|s| *s == state);
    let any = |state: PhaseState| children.iter().any(|s| *s == state);

    if children.is_empty() || all(PhaseState::Unstarted) {
        PhaseState::Unstarted
    } else if all(PhaseState::Completed) {
        PhaseState::Completed
    } else if any(PhaseState::Failed) {
        PhaseState::Failed
    } else if children
        .iter()
        .all(|s| matches!(s, PhaseState::RolledBack | PhaseState::Unstarted))
    {
        PhaseState::RolledBack
    } else {
        PhaseState::InProgress
    }
}
