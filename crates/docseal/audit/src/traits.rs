use crate::model::{AuditRecord, DocumentId};
use crate::AuditResult;
use async_trait::async_trait;

/// Persistence for per-document audit streams.
///
/// Implementations must be append-only. `insert` accepts a record only when
/// its `sequence` equals the current stream length and its
/// `previous_record_digest` equals the current head digest; otherwise it
/// fails with [`crate::AuditError::SequenceConflict`] and stores nothing.
#[async_trait]
pub trait AuditStore: Send + Sync {
    /// Store the next record of a stream.
    async fn insert(&self, record: AuditRecord) -> AuditResult<()>;

    /// All records of a stream, ascending by sequence.
    async fn list(&self, document: &DocumentId) -> AuditResult<Vec<AuditRecord>>;

    /// The most recent record of a stream.
    async fn head(&self, document: &DocumentId) -> AuditResult<Option<AuditRecord>>;

    /// One record by position.
    async fn get(&self, document: &DocumentId, sequence: u64) -> AuditResult<Option<AuditRecord>>;

    /// Documents with at least one record.
    async fn documents(&self) -> AuditResult<Vec<DocumentId>>;
}
