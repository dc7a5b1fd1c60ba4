use chrono::{DateTime, Utc};
use docseal_digest::Digest;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

// ── Identifiers ──────────────────────────────────────────────────────

/// Identifier of a document in the external registry.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocumentId(pub String);

impl DocumentId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// An already-authenticated participant or system actor.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ActorId(pub String);

impl ActorId {
    /// Actor recorded for transitions the engine performs on its own
    /// (expiry, completion).
    pub const SYSTEM: &'static str = "system";

    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn system() -> Self {
        Self(Self::SYSTEM.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ActorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ── Actions ──────────────────────────────────────────────────────────

/// What a record attests to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AuditAction {
    #[serde(rename = "workflow.initiated")]
    WorkflowInitiated,
    #[serde(rename = "step.signed")]
    SignatureSubmitted,
    #[serde(rename = "step.approved")]
    StepApproved,
    #[serde(rename = "step.rejected")]
    StepRejected,
    #[serde(rename = "step.expired")]
    StepExpired,
    #[serde(rename = "workflow.completed")]
    WorkflowCompleted,
    #[serde(rename = "workflow.rejected")]
    WorkflowRejected,
    #[serde(rename = "workflow.expired")]
    WorkflowExpired,
    #[serde(rename = "workflow.retired")]
    WorkflowRetired,
}

impl AuditAction {
    /// Stable wire name; this string is part of every record digest.
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditAction::WorkflowInitiated => "workflow.initiated",
            AuditAction::SignatureSubmitted => "step.signed",
            AuditAction::StepApproved => "step.approved",
            AuditAction::StepRejected => "step.rejected",
            AuditAction::StepExpired => "step.expired",
            AuditAction::WorkflowCompleted => "workflow.completed",
            AuditAction::WorkflowRejected => "workflow.rejected",
            AuditAction::WorkflowExpired => "workflow.expired",
            AuditAction::WorkflowRetired => "workflow.retired",
        }
    }

    pub fn is_workflow_terminal(&self) -> bool {
        matches!(
            self,
            AuditAction::WorkflowCompleted
                | AuditAction::WorkflowRejected
                | AuditAction::WorkflowExpired
        )
    }
}

impl fmt::Display for AuditAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Records ──────────────────────────────────────────────────────────

/// Append request. Sequence, timestamp and digests are assigned by the ledger.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    pub actor: ActorId,
    pub action: AuditAction,
    #[serde(default)]
    pub payload: Value,
}

impl AuditEntry {
    pub fn new(actor: ActorId, action: AuditAction, payload: Value) -> Self {
        Self {
            actor,
            action,
            payload,
        }
    }
}

/// A stored, hash-linked audit record.
///
/// `record_digest = H(sequence ‖ timestamp ‖ actor ‖ action ‖ payload_digest ‖ previous_record_digest)`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditRecord {
    pub document_id: DocumentId,
    pub sequence: u64,
    pub timestamp: DateTime<Utc>,
    pub actor: ActorId,
    pub action: AuditAction,
    pub payload: Value,
    pub payload_digest: Digest,
    pub previous_record_digest: Digest,
    pub record_digest: Digest,
}

impl AuditRecord {
    pub fn is_genesis(&self) -> bool {
        self.sequence == 0
    }
}

/// Outcome of replaying a document's chain from genesis.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainReplay {
    pub valid: bool,
    /// First sequence at which stored and recomputed state diverge.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub broken_at_sequence: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    pub record_count: u64,
    /// Digest of the last record that replayed cleanly.
    pub head_digest: Digest,
}

impl ChainReplay {
    pub fn intact(record_count: u64, head_digest: Digest) -> Self {
        Self {
            valid: true,
            broken_at_sequence: None,
            reason: None,
            record_count,
            head_digest,
        }
    }

    pub fn broken(
        sequence: u64,
        reason: impl Into<String>,
        record_count: u64,
        last_good: Digest,
    ) -> Self {
        Self {
            valid: false,
            broken_at_sequence: Some(sequence),
            reason: Some(reason.into()),
            record_count,
            head_digest: last_good,
        }
    }
}
