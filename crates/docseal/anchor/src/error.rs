//! Anchoring errors

use crate::AnchorId;
use docseal_audit::{AuditError, DocumentId};
use thiserror::Error;

/// Anchoring error types
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AnchorError {
    /// The document has no audit records yet
    #[error("Nothing to anchor for document {0}: ledger is empty")]
    NothingToAnchor(DocumentId),

    /// The external service did not answer in time, even after retries.
    /// The workflow is unaffected; the anchor can be retried later.
    #[error("Anchor pending for document {document}: {reason}")]
    Pending { document: DocumentId, reason: String },

    /// Transient failure reported by the anchoring service
    #[error("Anchoring service unavailable: {0}")]
    Unavailable(String),

    /// Permanent refusal by the anchoring service; not retried
    #[error("Anchoring service rejected the request: {0}")]
    Rejected(String),

    #[error("Anchor not found: {0}")]
    AnchorNotFound(AnchorId),

    #[error("Ledger error: {0}")]
    Ledger(#[from] AuditError),

    #[error("Anchor store error: {0}")]
    Store(String),
}

impl AnchorError {
    /// Whether the failure is the soft "not yet anchored" outcome
    pub fn is_pending(&self) -> bool {
        matches!(self, AnchorError::Pending { .. })
    }

    /// Whether another attempt may succeed
    pub fn is_transient(&self) -> bool {
        matches!(self, AnchorError::Unavailable(_) | AnchorError::Pending { .. })
    }
}

/// Result type for anchoring operations
pub type AnchorResult<T> = Result<T, AnchorError>;
