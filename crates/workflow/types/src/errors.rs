//! Error types for the workflow layer

use crate::{StepId, StepKind, WorkflowStatus};
use docseal_audit::{ActorId, AuditError, DocumentId};
use serde::{Deserialize, Serialize};

/// Coarse classification of a failure, used to decide how a caller reacts.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Malformed input; nothing was mutated. Fix the request and retry.
    Validation,
    /// Lost a race; re-read state and retry if still applicable.
    ConcurrencyConflict,
    /// The action is illegal in the current state. Never retried.
    State,
    /// The document's history can no longer be trusted.
    Integrity,
    /// An external collaborator is slow or unreachable.
    ExternalService,
    /// Storage or other internal failure.
    Internal,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ErrorKind::Validation => "validation",
            ErrorKind::ConcurrencyConflict => "concurrency_conflict",
            ErrorKind::State => "state",
            ErrorKind::Integrity => "integrity",
            ErrorKind::ExternalService => "external_service",
            ErrorKind::Internal => "internal",
        };
        f.write_str(s)
    }
}

/// Errors that can occur in workflow operations
#[derive(Debug, thiserror::Error)]
pub enum WorkflowError {
    #[error("Invalid plan: {0}")]
    InvalidPlan(String),

    #[error("Workflow validation error: {0}")]
    ValidationError(String),

    #[error("No workflow for document: {0}")]
    WorkflowNotFound(DocumentId),

    #[error("Step not found: {0}")]
    StepNotFound(StepId),

    #[error("Step '{step}' is not actionable: {reason}")]
    StepNotActionable { step: StepId, reason: String },

    #[error("Step '{step}' is assigned to '{expected}', not '{actual}'")]
    ActorMismatch {
        step: StepId,
        expected: ActorId,
        actual: ActorId,
    },

    #[error("Step '{step}' is a {expected} step, cannot accept a {attempted}")]
    StepKindMismatch {
        step: StepId,
        expected: StepKind,
        attempted: StepKind,
    },

    #[error("Workflow for document '{document}' is already {status}")]
    WorkflowTerminal {
        document: DocumentId,
        status: WorkflowStatus,
    },

    #[error("Document '{0}' already has a workflow in progress")]
    WorkflowActive(DocumentId),

    #[error("Integrity of document '{0}' is compromised; further actions are refused")]
    IntegrityCompromised(DocumentId),

    #[error("Audit ledger error: {0}")]
    Audit(#[from] AuditError),
}

impl WorkflowError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            WorkflowError::InvalidPlan(_)
            | WorkflowError::ValidationError(_)
            | WorkflowError::WorkflowNotFound(_)
            | WorkflowError::StepNotFound(_) => ErrorKind::Validation,
            WorkflowError::StepNotActionable { .. }
            | WorkflowError::ActorMismatch { .. }
            | WorkflowError::StepKindMismatch { .. }
            | WorkflowError::WorkflowTerminal { .. }
            | WorkflowError::WorkflowActive(_) => ErrorKind::State,
            WorkflowError::IntegrityCompromised(_) => ErrorKind::Integrity,
            WorkflowError::Audit(AuditError::SequenceConflict { .. }) => {
                ErrorKind::ConcurrencyConflict
            }
            WorkflowError::Audit(_) => ErrorKind::Internal,
        }
    }

    /// Stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            WorkflowError::InvalidPlan(_) => "INVALID_PLAN",
            WorkflowError::ValidationError(_) => "VALIDATION_ERROR",
            WorkflowError::WorkflowNotFound(_) => "WORKFLOW_NOT_FOUND",
            WorkflowError::StepNotFound(_) => "STEP_NOT_FOUND",
            WorkflowError::StepNotActionable { .. } => "STEP_NOT_ACTIONABLE",
            WorkflowError::ActorMismatch { .. } => "ACTOR_MISMATCH",
            WorkflowError::StepKindMismatch { .. } => "STEP_KIND_MISMATCH",
            WorkflowError::WorkflowTerminal { .. } => "WORKFLOW_TERMINAL",
            WorkflowError::WorkflowActive(_) => "WORKFLOW_ACTIVE",
            WorkflowError::IntegrityCompromised(_) => "INTEGRITY_COMPROMISED",
            WorkflowError::Audit(AuditError::SequenceConflict { .. }) => "SEQUENCE_CONFLICT",
            WorkflowError::Audit(_) => "AUDIT_ERROR",
        }
    }
}

/// Result type alias for workflow operations
pub type WorkflowResult<T> = Result<T, WorkflowError>;
