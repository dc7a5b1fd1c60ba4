//! Expiry handler: detects overdue steps
//!
//! The handler only inspects an instance and returns decisions. Applying
//! them (and recording them in the ledger) is the engine's job.

use chrono::{DateTime, Utc};
use workflow_types::*;

/// Detects steps whose deadline has passed
#[derive(Clone, Debug, Default)]
pub struct ExpiryHandler;

impl ExpiryHandler {
    pub fn new() -> Self {
        Self
    }

    /// Every pending step past its deadline, earliest deadline first.
    pub fn check_expirations(
        &self,
        instance: &WorkflowInstance,
        now: DateTime<Utc>,
    ) -> Vec<ExpiryDecision> {
        let mut decisions: Vec<ExpiryDecision> = instance
            .expirable_steps(now)
            .into_iter()
            .filter_map(|id| self.check_step(instance, &id, now))
            .collect();
        decisions.sort_by(|a, b| a.deadline.cmp(&b.deadline).then_with(|| a.step_id.cmp(&b.step_id)));
        decisions
    }

    /// Decision for one step, if it is due
    pub fn check_step(
        &self,
        instance: &WorkflowInstance,
        step_id: &StepId,
        now: DateTime<Utc>,
    ) -> Option<ExpiryDecision> {
        if instance.status != WorkflowStatus::InProgress {
            return None;
        }
        let state = instance.step(step_id)?;
        if !state.status.is_pending() {
            return None;
        }
        let deadline = state.step.deadline?;
        if now <= deadline {
            return None;
        }
        Some(ExpiryDecision {
            step_id: step_id.clone(),
            participant: state.step.participant.clone(),
            deadline,
            terminates_workflow: state.step.terminates_on_failure(),
        })
    }

    /// Earliest deadline among pending steps
    pub fn next_deadline(&self, instance: &WorkflowInstance) -> Option<DateTime<Utc>> {
        if instance.is_terminal() {
            return None;
        }
        instance
            .steps
            .iter()
            .filter(|s| s.status.is_pending())
            .filter_map(|s| s.step.deadline)
            .min()
    }
}

/// A step the engine should expire
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExpiryDecision {
    pub step_id: StepId,
    pub participant: ActorId,
    pub deadline: DateTime<Utc>,
    /// Expiring this step ends the workflow
    pub terminates_workflow: bool,
}
