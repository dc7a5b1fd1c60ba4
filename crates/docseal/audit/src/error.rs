use crate::DocumentId;
use thiserror::Error;

/// Result type for audit ledger operations.
pub type AuditResult<T> = Result<T, AuditError>;

/// Audit ledger errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AuditError {
    /// Another append claimed the sequence number first.
    #[error("sequence conflict on document {document}: expected sequence {expected}, attempted {attempted}")]
    SequenceConflict {
        document: DocumentId,
        expected: u64,
        attempted: u64,
    },

    #[error("audit record not found: document {document}, sequence {sequence}")]
    RecordNotFound { document: DocumentId, sequence: u64 },

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("backend error: {0}")]
    Backend(String),
}

impl AuditError {
    pub fn is_conflict(&self) -> bool {
        matches!(self, AuditError::SequenceConflict { .. })
    }
}
