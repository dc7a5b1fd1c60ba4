//! In-memory reference implementation of [`AuditStore`].
//!
//! Deterministic and test-friendly. A durable deployment backs the same
//! trait with a transactional store.

use crate::model::{AuditRecord, DocumentId};
use crate::traits::AuditStore;
use crate::{AuditError, AuditResult};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::RwLock;

/// In-memory audit store keyed by document.
#[derive(Default)]
pub struct InMemoryAuditStore {
    streams: RwLock<HashMap<DocumentId, Vec<AuditRecord>>>,
}

impl InMemoryAuditStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mutate one stored record in place, bypassing every chain check.
    /// Returns `false` when the record does not exist.
    #[cfg(feature = "fault-injection")]
    pub fn tamper<F>(&self, document: &DocumentId, sequence: u64, f: F) -> bool
    where
        F: FnOnce(&mut AuditRecord),
    {
        let Ok(mut guard) = self.streams.write() else {
            return false;
        };
        match guard
            .get_mut(document)
            .and_then(|stream| stream.get_mut(sequence as usize))
        {
            Some(record) => {
                f(record);
                true
            }
            None => false,
        }
    }

    /// Rewrite a whole stream, bypassing every chain check.
    #[cfg(feature = "fault-injection")]
    pub fn tamper_stream<F>(&self, document: &DocumentId, f: F) -> bool
    where
        F: FnOnce(&mut Vec<AuditRecord>),
    {
        let Ok(mut guard) = self.streams.write() else {
            return false;
        };
        match guard.get_mut(document) {
            Some(stream) => {
                f(stream);
                true
            }
            None => false,
        }
    }
}

#[async_trait]
impl AuditStore for InMemoryAuditStore {
    async fn insert(&self, record: AuditRecord) -> AuditResult<()> {
        let mut guard = self
            .streams
            .write()
            .map_err(|_| AuditError::Backend("audit lock poisoned".to_string()))?;

        let stream = guard.entry(record.document_id.clone()).or_default();
        let expected = stream.len() as u64;
        let expected_prev = stream
            .last()
            .map(|r| r.record_digest)
            .unwrap_or(docseal_digest::Digest::ZERO);

        if record.sequence != expected || record.previous_record_digest != expected_prev {
            return Err(AuditError::SequenceConflict {
                document: record.document_id.clone(),
                expected,
                attempted: record.sequence,
            });
        }

        stream.push(record);
        Ok(())
    }

    async fn list(&self, document: &DocumentId) -> AuditResult<Vec<AuditRecord>> {
        let guard = self
            .streams
            .read()
            .map_err(|_| AuditError::Backend("audit lock poisoned".to_string()))?;
        Ok(guard.get(document).cloned().unwrap_or_default())
    }

    async fn head(&self, document: &DocumentId) -> AuditResult<Option<AuditRecord>> {
        let guard = self
            .streams
            .read()
            .map_err(|_| AuditError::Backend("audit lock poisoned".to_string()))?;
        Ok(guard.get(document).and_then(|s| s.last()).cloned())
    }

    async fn get(&self, document: &DocumentId, sequence: u64) -> AuditResult<Option<AuditRecord>> {
        let guard = self
            .streams
            .read()
            .map_err(|_| AuditError::Backend("audit lock poisoned".to_string()))?;
        Ok(guard
            .get(document)
            .and_then(|s| s.get(sequence as usize))
            .cloned())
    }

    async fn documents(&self) -> AuditResult<Vec<DocumentId>> {
        let guard = self
            .streams
            .read()
            .map_err(|_| AuditError::Backend("audit lock poisoned".to_string()))?;
        let mut ids = guard
            .iter()
            .filter(|(_, stream)| !stream.is_empty())
            .map(|(id, _)| id.clone())
            .collect::<Vec<_>>();
        ids.sort();
        Ok(ids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ActorId, AuditAction};
    use chrono::Utc;
    use docseal_digest::{digest_content, Digest};

    fn record(sequence: u64, prev: Digest) -> AuditRecord {
        AuditRecord {
            document_id: DocumentId::new("doc-1"),
            sequence,
            timestamp: Utc::now(),
            actor: ActorId::new("alice"),
            action: AuditAction::StepApproved,
            payload: serde_json::Value::Null,
            payload_digest: digest_content(b"null"),
            previous_record_digest: prev,
            record_digest: digest_content(&sequence.to_be_bytes()),
        }
    }

    #[tokio::test]
    async fn insert_requires_next_sequence() {
        let store = InMemoryAuditStore::new();
        let first = record(0, Digest::ZERO);
        store.insert(first.clone()).await.unwrap();

        let err = store.insert(record(0, Digest::ZERO)).await.unwrap_err();
        assert!(matches!(
            err,
            AuditError::SequenceConflict {
                expected: 1,
                attempted: 0,
                ..
            }
        ));

        store.insert(record(1, first.record_digest)).await.unwrap();
        assert_eq!(store.list(&DocumentId::new("doc-1")).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn insert_requires_matching_previous_digest() {
        let store = InMemoryAuditStore::new();
        store.insert(record(0, Digest::ZERO)).await.unwrap();
        let err = store
            .insert(record(1, digest_content(b"stale head")))
            .await
            .unwrap_err();
        assert!(err.is_conflict());
    }

    #[tokio::test]
    async fn empty_store_has_no_documents() {
        let store = InMemoryAuditStore::new();
        assert!(store.documents().await.unwrap().is_empty());
        assert!(store
            .head(&DocumentId::new("missing"))
            .await
            .unwrap()
            .is_none());
    }
}
