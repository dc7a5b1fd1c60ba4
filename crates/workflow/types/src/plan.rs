//! Workflow plans: the blueprint of signature and approval steps
//!
//! A plan belongs to one document and is immutable once a workflow has been
//! initiated from it. To change it, retire the workflow and initiate a new
//! plan version.

use crate::{WorkflowError, WorkflowResult};
use chrono::{DateTime, Utc};
use docseal_audit::{ActorId, DocumentId};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};

// ── Identifiers ──────────────────────────────────────────────────────

/// Unique identifier for a workflow plan
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PlanId(pub String);

impl PlanId {
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn short(&self) -> &str {
        &self.0[..8.min(self.0.len())]
    }
}

impl std::fmt::Display for PlanId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of a step, unique within its plan
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StepId(pub String);

impl StepId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for StepId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ── Steps ────────────────────────────────────────────────────────────

/// What the participant is asked to do
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepKind {
    Signature,
    Approval,
}

impl std::fmt::Display for StepKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StepKind::Signature => write!(f, "signature"),
            StepKind::Approval => write!(f, "approval"),
        }
    }
}

/// One obligation in a plan
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Step {
    pub id: StepId,
    /// Rank of the step. Blocking steps with equal order form one rank.
    pub order: u32,
    /// The only actor allowed to act on this step
    pub participant: ActorId,
    pub kind: StepKind,
    /// Whether later ranks wait for this step
    #[serde(default = "default_true")]
    pub blocking: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deadline: Option<DateTime<Utc>>,
    /// A non-blocking step whose rejection or expiry ends the workflow.
    /// Blocking steps always behave this way.
    #[serde(default)]
    pub veto_capable: bool,
}

fn default_true() -> bool {
    true
}

impl Step {
    pub fn new(
        id: impl Into<String>,
        order: u32,
        participant: impl Into<String>,
        kind: StepKind,
    ) -> Self {
        Self {
            id: StepId::new(id),
            order,
            participant: ActorId::new(participant),
            kind,
            blocking: true,
            deadline: None,
            veto_capable: false,
        }
    }

    pub fn signature(id: impl Into<String>, order: u32, participant: impl Into<String>) -> Self {
        Self::new(id, order, participant, StepKind::Signature)
    }

    pub fn approval(id: impl Into<String>, order: u32, participant: impl Into<String>) -> Self {
        Self::new(id, order, participant, StepKind::Approval)
    }

    pub fn with_deadline(mut self, deadline: DateTime<Utc>) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Make the step parallel: actionable at any time, never holding back later ranks.
    pub fn non_blocking(mut self) -> Self {
        self.blocking = false;
        self
    }

    pub fn with_veto(mut self) -> Self {
        self.veto_capable = true;
        self
    }

    /// Whether rejecting or expiring this step terminates the workflow.
    pub fn terminates_on_failure(&self) -> bool {
        self.blocking || self.veto_capable
    }

    /// Whether `now` is past the deadline.
    pub fn is_overdue(&self, now: DateTime<Utc>) -> bool {
        self.deadline.is_some_and(|d| now > d)
    }
}

// ── Plan ─────────────────────────────────────────────────────────────

/// The plan of steps for one document
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct WorkflowPlan {
    pub id: PlanId,
    pub document_id: DocumentId,
    /// Plan version; bumped when a retired workflow is re-planned
    #[serde(default = "default_version")]
    pub version: u32,
    pub steps: Vec<Step>,
    pub created_at: DateTime<Utc>,
}

fn default_version() -> u32 {
    1
}

impl WorkflowPlan {
    pub fn new(document_id: DocumentId) -> Self {
        Self {
            id: PlanId::generate(),
            document_id,
            version: 1,
            steps: Vec::new(),
            created_at: Utc::now(),
        }
    }

    pub fn with_version(mut self, version: u32) -> Self {
        self.version = version;
        self
    }

    pub fn with_step(mut self, step: Step) -> Self {
        self.steps.push(step);
        self
    }

    /// Add a step, refusing duplicate ids
    pub fn add_step(&mut self, step: Step) -> WorkflowResult<()> {
        if self.steps.iter().any(|s| s.id == step.id) {
            return Err(WorkflowError::InvalidPlan(format!(
                "duplicate step id '{}'",
                step.id
            )));
        }
        self.steps.push(step);
        Ok(())
    }

    pub fn get_step(&self, id: &StepId) -> Option<&Step> {
        self.steps.iter().find(|s| &s.id == id)
    }

    /// Distinct ranks of blocking steps, ascending
    pub fn ranks(&self) -> BTreeSet<u32> {
        self.steps
            .iter()
            .filter(|s| s.blocking)
            .map(|s| s.order)
            .collect()
    }

    /// Validate the plan for structural satisfiability.
    ///
    /// Only impossible plans are refused: no steps, blank identifiers,
    /// duplicate step ids, or two blocking steps in the same rank that
    /// demand the same action from the same participant.
    pub fn validate(&self) -> WorkflowResult<()> {
        if self.document_id.as_str().trim().is_empty() {
            return Err(WorkflowError::InvalidPlan("document id is empty".into()));
        }

        if self.steps.is_empty() {
            return Err(WorkflowError::InvalidPlan(
                "plan must have at least one step".into(),
            ));
        }

        let mut seen_ids = HashSet::new();
        let mut rank_obligations = HashSet::new();
        for step in &self.steps {
            if step.id.as_str().trim().is_empty() {
                return Err(WorkflowError::InvalidPlan("step id is empty".into()));
            }
            if step.participant.as_str().trim().is_empty() {
                return Err(WorkflowError::InvalidPlan(format!(
                    "step '{}' has no participant",
                    step.id
                )));
            }
            if !seen_ids.insert(&step.id) {
                return Err(WorkflowError::InvalidPlan(format!(
                    "duplicate step id '{}'",
                    step.id
                )));
            }
            if step.blocking && !rank_obligations.insert((step.order, &step.participant, step.kind))
            {
                return Err(WorkflowError::InvalidPlan(format!(
                    "participant '{}' has two blocking {} steps in rank {}",
                    step.participant, step.kind, step.order
                )));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc() -> DocumentId {
        DocumentId::new("doc-1")
    }

    #[test]
    fn two_signer_plan_is_valid() {
        let plan = WorkflowPlan::new(doc())
            .with_step(Step::signature("sign-a", 1, "alice"))
            .with_step(Step::signature("sign-b", 2, "bob"));
        assert!(plan.validate().is_ok());
        assert_eq!(plan.ranks().into_iter().collect::<Vec<_>>(), vec![1, 2]);
    }

    #[test]
    fn empty_plan_is_invalid() {
        let plan = WorkflowPlan::new(doc());
        assert!(matches!(plan.validate(), Err(WorkflowError::InvalidPlan(_))));
    }

    #[test]
    fn duplicate_step_ids_are_invalid() {
        let mut plan = WorkflowPlan::new(doc()).with_step(Step::signature("s", 1, "alice"));
        assert!(plan.add_step(Step::approval("s", 2, "bob")).is_err());

        let plan = plan.with_step(Step::approval("s", 2, "bob"));
        assert!(matches!(plan.validate(), Err(WorkflowError::InvalidPlan(_))));
    }

    #[test]
    fn same_participant_same_rank_same_kind_is_invalid() {
        let plan = WorkflowPlan::new(doc())
            .with_step(Step::signature("s1", 1, "alice"))
            .with_step(Step::signature("s2", 1, "alice"));
        assert!(plan.validate().is_err());
    }

    #[test]
    fn unusual_but_satisfiable_plans_are_accepted() {
        // Same participant twice in a rank with different kinds, and a parallel duplicate.
        let plan = WorkflowPlan::new(doc())
            .with_step(Step::signature("s1", 1, "alice"))
            .with_step(Step::approval("a1", 1, "alice"))
            .with_step(Step::signature("w1", 1, "alice").non_blocking());
        assert!(plan.validate().is_ok());
    }

    #[test]
    fn blank_participant_is_invalid() {
        let plan = WorkflowPlan::new(doc()).with_step(Step::signature("s1", 1, " "));
        assert!(plan.validate().is_err());
    }

    #[test]
    fn steps_default_to_blocking_when_deserialized() {
        let json = r#"{"id":"s1","order":1,"participant":"alice","kind":"signature"}"#;
        let step: Step = serde_json::from_str(json).unwrap();
        assert!(step.blocking);
        assert!(!step.veto_capable);
        assert!(step.terminates_on_failure());
    }

    #[test]
    fn overdue_is_strictly_after_deadline() {
        let deadline = Utc::now();
        let step = Step::approval("a", 1, "bob").with_deadline(deadline);
        assert!(!step.is_overdue(deadline));
        assert!(step.is_overdue(deadline + chrono::Duration::seconds(1)));
    }
}
