//! Workflow instances: one run of a plan against a document version
//!
//! A WorkflowInstance is the single authoritative record of where a
//! document's workflow stands. All transitions go through the methods here,
//! each guarded by the same actionability check, so status can never drift
//! from per-step state.

use crate::{Step, StepId, StepKind, WorkflowError, WorkflowPlan, WorkflowResult};
use chrono::{DateTime, Utc};
use docseal_audit::{ActorId, DocumentId};
use docseal_digest::Digest;
use serde::{Deserialize, Serialize};

// ── Instance Identifier ──────────────────────────────────────────────

/// Unique identifier for a workflow instance
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WorkflowInstanceId(pub String);

impl WorkflowInstanceId {
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn short(&self) -> &str {
        &self.0[..8.min(self.0.len())]
    }
}

impl std::fmt::Display for WorkflowInstanceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ── Document Version ─────────────────────────────────────────────────

/// The document content a workflow runs against
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentVersion {
    pub document_id: DocumentId,
    pub content_digest: Digest,
    pub version: u64,
}

impl DocumentVersion {
    pub fn new(document_id: DocumentId, content_digest: Digest, version: u64) -> Self {
        Self {
            document_id,
            content_digest,
            version,
        }
    }
}

// ── Status ───────────────────────────────────────────────────────────

/// Workflow status
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStatus {
    Draft,
    InProgress,
    Completed,
    Rejected,
    Expired,
}

impl WorkflowStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            WorkflowStatus::Completed | WorkflowStatus::Rejected | WorkflowStatus::Expired
        )
    }
}

impl std::fmt::Display for WorkflowStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WorkflowStatus::Draft => write!(f, "draft"),
            WorkflowStatus::InProgress => write!(f, "in progress"),
            WorkflowStatus::Completed => write!(f, "completed"),
            WorkflowStatus::Rejected => write!(f, "rejected"),
            WorkflowStatus::Expired => write!(f, "expired"),
        }
    }
}

/// Step status. Anything other than `Pending` is final.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Pending,
    Completed,
    Rejected,
    Expired,
}

impl StepStatus {
    pub fn is_pending(&self) -> bool {
        matches!(self, StepStatus::Pending)
    }
}

impl std::fmt::Display for StepStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StepStatus::Pending => write!(f, "pending"),
            StepStatus::Completed => write!(f, "completed"),
            StepStatus::Rejected => write!(f, "rejected"),
            StepStatus::Expired => write!(f, "expired"),
        }
    }
}

/// Runtime state of a single step
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StepState {
    pub step: Step,
    pub status: StepStatus,
    /// Who resolved the step; `None` while pending or when expired
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actor: Option<ActorId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolved_at: Option<DateTime<Utc>>,
    /// Rejection reason or approval comment
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

impl StepState {
    fn pending(step: Step) -> Self {
        Self {
            step,
            status: StepStatus::Pending,
            actor: None,
            resolved_at: None,
            note: None,
        }
    }

    /// Whether this step no longer stands between the workflow and completion.
    fn is_satisfied(&self) -> bool {
        if self.step.terminates_on_failure() {
            self.status == StepStatus::Completed
        } else {
            !self.status.is_pending()
        }
    }
}

/// What a single transition did
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepOutcome {
    pub step_id: StepId,
    pub step_status: StepStatus,
    pub workflow_status: WorkflowStatus,
    /// The workflow reached a terminal status in this transition
    pub finished: bool,
}

// ── Workflow Instance ────────────────────────────────────────────────

/// A run of a [`WorkflowPlan`] against one [`DocumentVersion`]
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct WorkflowInstance {
    pub id: WorkflowInstanceId,
    pub plan: WorkflowPlan,
    /// Document version at initiation
    pub document: DocumentVersion,
    pub status: WorkflowStatus,
    pub steps: Vec<StepState>,
    pub completed_count: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
}

impl WorkflowInstance {
    /// Create a draft instance. The plan is validated here.
    pub fn draft(
        plan: WorkflowPlan,
        document: DocumentVersion,
        now: DateTime<Utc>,
    ) -> WorkflowResult<Self> {
        plan.validate()?;
        if plan.document_id != document.document_id {
            return Err(WorkflowError::ValidationError(format!(
                "plan is for document '{}', not '{}'",
                plan.document_id, document.document_id
            )));
        }

        let steps = plan.steps.iter().cloned().map(StepState::pending).collect();
        Ok(Self {
            id: WorkflowInstanceId::generate(),
            plan,
            document,
            status: WorkflowStatus::Draft,
            steps,
            completed_count: 0,
            created_at: now,
            updated_at: now,
            finished_at: None,
        })
    }

    /// Draft -> InProgress
    pub fn start(&mut self, now: DateTime<Utc>) -> WorkflowResult<()> {
        if self.status != WorkflowStatus::Draft {
            return Err(WorkflowError::StepNotActionable {
                step: StepId::new("-"),
                reason: format!("workflow is {}, expected draft", self.status),
            });
        }
        self.status = WorkflowStatus::InProgress;
        self.updated_at = now;
        Ok(())
    }

    pub fn document_id(&self) -> &DocumentId {
        &self.document.document_id
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    pub fn step(&self, id: &StepId) -> Option<&StepState> {
        self.steps.iter().find(|s| &s.step.id == id)
    }

    fn step_mut(&mut self, id: &StepId) -> Option<&mut StepState> {
        self.steps.iter_mut().find(|s| &s.step.id == id)
    }

    // ── Queries ──────────────────────────────────────────────────────

    /// Lowest order among pending blocking steps
    pub fn current_rank(&self) -> Option<u32> {
        self.steps
            .iter()
            .filter(|s| s.step.blocking && s.status.is_pending())
            .map(|s| s.step.order)
            .min()
    }

    /// The first pending blocking step of the current rank
    pub fn current_step(&self) -> Option<&StepId> {
        let rank = self.current_rank()?;
        self.steps
            .iter()
            .find(|s| s.step.blocking && s.status.is_pending() && s.step.order == rank)
            .map(|s| &s.step.id)
    }

    /// Steps that would accept an action right now
    pub fn actionable_steps(&self) -> Vec<&Step> {
        if self.status != WorkflowStatus::InProgress {
            return Vec::new();
        }
        let rank = self.current_rank();
        self.steps
            .iter()
            .filter(|s| s.status.is_pending())
            .filter(|s| !s.step.blocking || Some(s.step.order) == rank)
            .map(|s| &s.step)
            .collect()
    }

    /// Pending steps whose deadline lies before `now`
    pub fn expirable_steps(&self, now: DateTime<Utc>) -> Vec<StepId> {
        if self.status != WorkflowStatus::InProgress {
            return Vec::new();
        }
        self.steps
            .iter()
            .filter(|s| s.status.is_pending() && s.step.is_overdue(now))
            .map(|s| s.step.id.clone())
            .collect()
    }

    /// Every step is resolved in a way that lets the workflow finish.
    ///
    /// Blocking and veto-capable steps must be completed; other parallel
    /// steps only need to have left `Pending`.
    pub fn is_complete(&self) -> bool {
        self.steps.iter().all(StepState::is_satisfied)
    }

    /// Check that `actor` may act on `step_id` now.
    ///
    /// `kind` is `None` for rejections, which are legal on either kind.
    pub fn check_actionable(
        &self,
        step_id: &StepId,
        actor: &ActorId,
        kind: Option<StepKind>,
    ) -> WorkflowResult<&Step> {
        if self.is_terminal() {
            return Err(WorkflowError::WorkflowTerminal {
                document: self.document_id().clone(),
                status: self.status,
            });
        }
        let state = self
            .step(step_id)
            .ok_or_else(|| WorkflowError::StepNotFound(step_id.clone()))?;

        if self.status != WorkflowStatus::InProgress {
            return Err(WorkflowError::StepNotActionable {
                step: step_id.clone(),
                reason: format!("workflow is {}", self.status),
            });
        }
        if !state.status.is_pending() {
            return Err(WorkflowError::StepNotActionable {
                step: step_id.clone(),
                reason: format!("step is already {}", state.status),
            });
        }
        if state.step.blocking {
            if let Some(rank) = self.current_rank() {
                if state.step.order > rank {
                    return Err(WorkflowError::StepNotActionable {
                        step: step_id.clone(),
                        reason: format!("waiting for steps of order {rank} to complete"),
                    });
                }
            }
        }
        if &state.step.participant != actor {
            return Err(WorkflowError::ActorMismatch {
                step: step_id.clone(),
                expected: state.step.participant.clone(),
                actual: actor.clone(),
            });
        }
        if let Some(kind) = kind {
            if state.step.kind != kind {
                return Err(WorkflowError::StepKindMismatch {
                    step: step_id.clone(),
                    expected: state.step.kind,
                    attempted: kind,
                });
            }
        }
        Ok(&state.step)
    }

    // ── Transitions ──────────────────────────────────────────────────

    /// Complete a step with a signature or an approval.
    pub fn complete_step(
        &mut self,
        step_id: &StepId,
        actor: &ActorId,
        kind: StepKind,
        note: Option<String>,
        now: DateTime<Utc>,
    ) -> WorkflowResult<StepOutcome> {
        self.check_actionable(step_id, actor, Some(kind))?;
        self.resolve(step_id, StepStatus::Completed, Some(actor.clone()), note, now);
        self.completed_count += 1;
        Ok(self.settle(step_id, StepStatus::Completed, now))
    }

    /// Reject a step. Terminates the workflow when the step is blocking or veto-capable.
    pub fn reject_step(
        &mut self,
        step_id: &StepId,
        actor: &ActorId,
        reason: String,
        now: DateTime<Utc>,
    ) -> WorkflowResult<StepOutcome> {
        let terminates = self.check_actionable(step_id, actor, None)?.terminates_on_failure();
        self.resolve(
            step_id,
            StepStatus::Rejected,
            Some(actor.clone()),
            Some(reason),
            now,
        );
        if terminates {
            self.finish(WorkflowStatus::Rejected, now);
            return Ok(self.outcome(step_id, StepStatus::Rejected, true));
        }
        Ok(self.settle(step_id, StepStatus::Rejected, now))
    }

    /// Expire an overdue step.
    ///
    /// Returns `Ok(None)` when the step is already expired, so repeated and
    /// concurrent callers all succeed while only the first transitions.
    pub fn expire_step(
        &mut self,
        step_id: &StepId,
        now: DateTime<Utc>,
    ) -> WorkflowResult<Option<StepOutcome>> {
        let state = self
            .step(step_id)
            .ok_or_else(|| WorkflowError::StepNotFound(step_id.clone()))?;

        match state.status {
            StepStatus::Expired => return Ok(None),
            StepStatus::Pending => {}
            other => {
                return Err(WorkflowError::StepNotActionable {
                    step: step_id.clone(),
                    reason: format!("step is already {other}"),
                })
            }
        }
        if self.is_terminal() {
            return Err(WorkflowError::WorkflowTerminal {
                document: self.document_id().clone(),
                status: self.status,
            });
        }
        if self.status != WorkflowStatus::InProgress {
            return Err(WorkflowError::StepNotActionable {
                step: step_id.clone(),
                reason: format!("workflow is {}", self.status),
            });
        }
        if !state.step.is_overdue(now) {
            return Err(WorkflowError::StepNotActionable {
                step: step_id.clone(),
                reason: match state.step.deadline {
                    Some(deadline) => format!("deadline {deadline} has not passed"),
                    None => "step has no deadline".to_string(),
                },
            });
        }

        let terminates = state.step.terminates_on_failure();
        self.resolve(step_id, StepStatus::Expired, None, None, now);
        if terminates {
            self.finish(WorkflowStatus::Expired, now);
            return Ok(Some(self.outcome(step_id, StepStatus::Expired, true)));
        }
        Ok(Some(self.settle(step_id, StepStatus::Expired, now)))
    }

    fn resolve(
        &mut self,
        step_id: &StepId,
        status: StepStatus,
        actor: Option<ActorId>,
        note: Option<String>,
        now: DateTime<Utc>,
    ) {
        if let Some(state) = self.step_mut(step_id) {
            state.status = status;
            state.actor = actor;
            state.note = note;
            state.resolved_at = Some(now);
        }
        self.updated_at = now;
    }

    /// Completion check after a non-terminating step transition.
    fn settle(&mut self, step_id: &StepId, step_status: StepStatus, now: DateTime<Utc>) -> StepOutcome {
        let finished = self.is_complete();
        if finished {
            self.finish(WorkflowStatus::Completed, now);
        }
        self.outcome(step_id, step_status, finished)
    }

    fn finish(&mut self, status: WorkflowStatus, now: DateTime<Utc>) {
        self.status = status;
        self.finished_at = Some(now);
        self.updated_at = now;
    }

    fn outcome(&self, step_id: &StepId, step_status: StepStatus, finished: bool) -> StepOutcome {
        StepOutcome {
            step_id: step_id.clone(),
            step_status,
            workflow_status: self.status,
            finished,
        }
    }

    /// Snapshot for API callers
    pub fn report(&self) -> WorkflowStatusReport {
        WorkflowStatusReport {
            instance_id: self.id.clone(),
            document_id: self.document_id().clone(),
            document_version: self.document.version,
            plan_version: self.plan.version,
            status: self.status,
            current_step: self.current_step().cloned(),
            actionable: self.actionable_steps().iter().map(|s| s.id.clone()).collect(),
            completed_count: self.completed_count,
            steps: self.steps.clone(),
            created_at: self.created_at,
            updated_at: self.updated_at,
            finished_at: self.finished_at,
        }
    }
}

/// Read model returned by `getWorkflowStatus`
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct WorkflowStatusReport {
    pub instance_id: WorkflowInstanceId,
    pub document_id: DocumentId,
    pub document_version: u64,
    pub plan_version: u32,
    pub status: WorkflowStatus,
    pub current_step: Option<StepId>,
    pub actionable: Vec<StepId>,
    pub completed_count: u32,
    pub steps: Vec<StepState>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
}
