//! The audit ledger: the only write path into audit streams.

use crate::model::{AuditEntry, AuditRecord, ChainReplay, DocumentId};
use crate::traits::AuditStore;
use crate::{AuditError, AuditResult};
use chrono::{DateTime, SecondsFormat, Utc};
use docseal_digest::{digest_content, digest_record, Digest, RecordField};
use serde_json::Value;
use std::sync::Arc;

/// Digest of a structured payload. `serde_json` maps are key-ordered, so
/// equal payloads always serialize to the same bytes.
pub fn payload_digest(payload: &Value) -> AuditResult<Digest> {
    let bytes = serde_json::to_vec(payload).map_err(|e| AuditError::Serialization(e.to_string()))?;
    Ok(digest_content(&bytes))
}

/// Recompute a record digest from its stored fields.
pub fn compute_record_digest(
    sequence: u64,
    timestamp: &DateTime<Utc>,
    actor: &str,
    action: &str,
    payload_digest: &Digest,
    previous_record_digest: &Digest,
) -> Digest {
    let timestamp = timestamp.to_rfc3339_opts(SecondsFormat::Nanos, true);
    digest_record(&[
        RecordField::U64(sequence),
        RecordField::Str(&timestamp),
        RecordField::Str(actor),
        RecordField::Str(action),
        RecordField::Digest(payload_digest),
        RecordField::Digest(previous_record_digest),
    ])
}

fn recompute(record: &AuditRecord) -> Digest {
    compute_record_digest(
        record.sequence,
        &record.timestamp,
        record.actor.as_str(),
        record.action.as_str(),
        &record.payload_digest,
        &record.previous_record_digest,
    )
}

/// Append-only, hash-chained ledger over an [`AuditStore`].
#[derive(Clone)]
pub struct AuditLedger {
    store: Arc<dyn AuditStore>,
}

impl AuditLedger {
    pub fn new(store: Arc<dyn AuditStore>) -> Self {
        Self { store }
    }

    /// Read-only view for components that must never append.
    pub fn reader(&self) -> LedgerReader {
        LedgerReader {
            store: Arc::clone(&self.store),
        }
    }

    /// Append the next record to a document's stream.
    ///
    /// Fails with [`AuditError::SequenceConflict`] when another append
    /// claimed the next sequence between the head read and the insert.
    pub async fn append(
        &self,
        document: &DocumentId,
        entry: AuditEntry,
    ) -> AuditResult<AuditRecord> {
        let head = self.store.head(document).await?;
        let (sequence, previous_record_digest) = match &head {
            Some(h) => (h.sequence + 1, h.record_digest),
            None => (0, Digest::ZERO),
        };

        let payload_digest = payload_digest(&entry.payload)?;
        let timestamp = Utc::now();
        let record_digest = compute_record_digest(
            sequence,
            &timestamp,
            entry.actor.as_str(),
            entry.action.as_str(),
            &payload_digest,
            &previous_record_digest,
        );

        let record = AuditRecord {
            document_id: document.clone(),
            sequence,
            timestamp,
            actor: entry.actor,
            action: entry.action,
            payload: entry.payload,
            payload_digest,
            previous_record_digest,
            record_digest,
        };

        self.store.insert(record.clone()).await?;

        tracing::debug!(
            document = %document,
            sequence,
            action = %record.action,
            digest = %record_digest.short(),
            "Audit record appended"
        );

        Ok(record)
    }

    pub async fn head_digest(&self, document: &DocumentId) -> AuditResult<Digest> {
        self.reader().head_digest(document).await
    }

    /// Most recent record, if the stream has any.
    pub async fn head_record(&self, document: &DocumentId) -> AuditResult<Option<AuditRecord>> {
        self.store.head(document).await
    }

    pub async fn records(&self, document: &DocumentId) -> AuditResult<Vec<AuditRecord>> {
        self.reader().records(document).await
    }

    pub async fn replay_chain(&self, document: &DocumentId) -> AuditResult<ChainReplay> {
        self.reader().replay_chain(document).await
    }
}

/// Read-only access to audit streams.
#[derive(Clone)]
pub struct LedgerReader {
    store: Arc<dyn AuditStore>,
}

impl LedgerReader {
    /// Digest of the most recent record, or [`Digest::ZERO`] for an empty stream.
    pub async fn head_digest(&self, document: &DocumentId) -> AuditResult<Digest> {
        Ok(self
            .store
            .head(document)
            .await?
            .map(|r| r.record_digest)
            .unwrap_or(Digest::ZERO))
    }

    /// Sequence and digest of the most recent record.
    pub async fn head(&self, document: &DocumentId) -> AuditResult<Option<(u64, Digest)>> {
        Ok(self
            .store
            .head(document)
            .await?
            .map(|r| (r.sequence, r.record_digest)))
    }

    pub async fn records(&self, document: &DocumentId) -> AuditResult<Vec<AuditRecord>> {
        self.store.list(document).await
    }

    pub async fn record(&self, document: &DocumentId, sequence: u64) -> AuditResult<AuditRecord> {
        self.store
            .get(document, sequence)
            .await?
            .ok_or_else(|| AuditError::RecordNotFound {
                document: document.clone(),
                sequence,
            })
    }

    /// Digest of the record at `sequence`, recomputed from its stored fields
    /// rather than read back from `record_digest`.
    pub async fn digest_at(&self, document: &DocumentId, sequence: u64) -> AuditResult<Digest> {
        let record = self.record(document, sequence).await?;
        Ok(recompute(&record))
    }

    pub async fn documents(&self) -> AuditResult<Vec<DocumentId>> {
        self.store.documents().await
    }

    /// Recompute every digest from genesis and report the first divergence.
    pub async fn replay_chain(&self, document: &DocumentId) -> AuditResult<ChainReplay> {
        let records = self.store.list(document).await?;
        Ok(replay(&records))
    }
}

/// Replay an ordered slice of records.
fn replay(records: &[AuditRecord]) -> ChainReplay {
    let count = records.len() as u64;
    let mut previous = Digest::ZERO;

    for (index, record) in records.iter().enumerate() {
        let expected_seq = index as u64;
        if record.sequence != expected_seq {
            return ChainReplay::broken(
                expected_seq,
                format!("expected sequence {}, found {}", expected_seq, record.sequence),
                count,
                previous,
            );
        }

        match payload_digest(&record.payload) {
            Ok(d) if d == record.payload_digest => {}
            _ => {
                return ChainReplay::broken(expected_seq, "payload digest mismatch", count, previous)
            }
        }

        if record.previous_record_digest != previous {
            return ChainReplay::broken(expected_seq, "previous digest link mismatch", count, previous);
        }

        if recompute(record) != record.record_digest {
            return ChainReplay::broken(expected_seq, "record digest mismatch", count, previous);
        }

        previous = record.record_digest;
    }

    ChainReplay::intact(count, previous)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::InMemoryAuditStore;
    use crate::model::{ActorId, AuditAction};
    use proptest::prelude::*;
    use serde_json::json;

    fn ledger() -> AuditLedger {
        AuditLedger::new(Arc::new(InMemoryAuditStore::new()))
    }

    fn entry(n: u64) -> AuditEntry {
        AuditEntry::new(
            ActorId::new(format!("actor-{}", n % 3)),
            AuditAction::StepApproved,
            json!({ "step": format!("s{}", n), "comment": "ok" }),
        )
    }

    async fn build(ledger: &AuditLedger, doc: &DocumentId, n: u64) -> Vec<AuditRecord> {
        let mut out = Vec::new();
        for i in 0..n {
            out.push(ledger.append(doc, entry(i)).await.unwrap());
        }
        out
    }

    #[tokio::test]
    async fn genesis_links_to_zero() {
        let ledger = ledger();
        let doc = DocumentId::new("doc-1");
        assert_eq!(ledger.head_digest(&doc).await.unwrap(), Digest::ZERO);

        let first = ledger.append(&doc, entry(0)).await.unwrap();
        assert_eq!(first.sequence, 0);
        assert_eq!(first.previous_record_digest, Digest::ZERO);
        assert_eq!(ledger.head_digest(&doc).await.unwrap(), first.record_digest);
    }

    #[tokio::test]
    async fn records_chain_to_predecessor() {
        let ledger = ledger();
        let doc = DocumentId::new("doc-1");
        let records = build(&ledger, &doc, 4).await;
        for pair in records.windows(2) {
            assert_eq!(pair[1].previous_record_digest, pair[0].record_digest);
            assert_eq!(pair[1].sequence, pair[0].sequence + 1);
        }
        let replay = ledger.replay_chain(&doc).await.unwrap();
        assert!(replay.valid);
        assert_eq!(replay.record_count, 4);
        assert_eq!(replay.head_digest, records[3].record_digest);
    }

    #[tokio::test]
    async fn streams_are_independent() {
        let ledger = ledger();
        let a = DocumentId::new("doc-a");
        let b = DocumentId::new("doc-b");
        build(&ledger, &a, 3).await;
        let first_b = ledger.append(&b, entry(0)).await.unwrap();
        assert_eq!(first_b.sequence, 0);
        assert_eq!(first_b.previous_record_digest, Digest::ZERO);
    }

    #[tokio::test]
    async fn empty_chain_replays_valid() {
        let ledger = ledger();
        let replay = ledger.replay_chain(&DocumentId::new("none")).await.unwrap();
        assert!(replay.valid);
        assert_eq!(replay.record_count, 0);
        assert_eq!(replay.head_digest, Digest::ZERO);
    }

    #[test]
    fn replay_detects_payload_edit() {
        let rt = tokio::runtime::Runtime::new().unwrap();
        let records = rt.block_on(async {
            let ledger = ledger();
            build(&ledger, &DocumentId::new("doc"), 3).await
        });
        let mut tampered = records.clone();
        tampered[1].payload = json!({ "step": "forged" });
        let replay = replay(&tampered);
        assert!(!replay.valid);
        assert_eq!(replay.broken_at_sequence, Some(1));
        assert_eq!(replay.head_digest, records[0].record_digest);
    }

    #[test]
    fn replay_detects_removed_record() {
        let rt = tokio::runtime::Runtime::new().unwrap();
        let mut records = rt.block_on(async {
            let ledger = ledger();
            build(&ledger, &DocumentId::new("doc"), 4).await
        });
        records.remove(2);
        let replay = replay(&records);
        assert_eq!(replay.broken_at_sequence, Some(2));
    }

    #[derive(Debug, Clone, Copy)]
    enum Field {
        Sequence,
        Timestamp,
        Actor,
        Action,
        PayloadDigest,
        Previous,
        RecordDigest,
    }

    fn corrupt(record: &mut AuditRecord, field: Field, byte: usize) {
        let flip = |d: &mut Digest| d.0[byte % 32] ^= 0x01;
        match field {
            Field::Sequence => record.sequence += 7,
            Field::Timestamp => record.timestamp += chrono::Duration::nanoseconds(1),
            Field::Actor => record.actor.0.push('x'),
            Field::Action => {
                record.action = if record.action == AuditAction::StepRejected {
                    AuditAction::StepApproved
                } else {
                    AuditAction::StepRejected
                }
            }
            Field::PayloadDigest => flip(&mut record.payload_digest),
            Field::Previous => flip(&mut record.previous_record_digest),
            Field::RecordDigest => flip(&mut record.record_digest),
        }
    }

    fn field_strategy() -> impl Strategy<Value = Field> {
        prop_oneof![
            Just(Field::Sequence),
            Just(Field::Timestamp),
            Just(Field::Actor),
            Just(Field::Action),
            Just(Field::PayloadDigest),
            Just(Field::Previous),
            Just(Field::RecordDigest),
        ]
    }

    proptest! {
        #[test]
        fn property_any_single_edit_is_located(
            len in 1u64..12,
            target in 0u64..12,
            field in field_strategy(),
            byte in 0usize..32,
        ) {
            let target = target % len;
            let rt = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .expect("runtime");
            let records = rt.block_on(async {
                let ledger = ledger();
                build(&ledger, &DocumentId::new("prop"), len).await
            });

            prop_assert!(replay(&records).valid);

            let mut tampered = records.clone();
            corrupt(&mut tampered[target as usize], field, byte);
            let result = replay(&tampered);
            prop_assert!(!result.valid);
            prop_assert_eq!(result.broken_at_sequence, Some(target));
        }

        #[test]
        fn property_sequences_are_gapless(len in 0u64..20) {
            let rt = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .expect("runtime");
            let records = rt.block_on(async {
                let ledger = ledger();
                build(&ledger, &DocumentId::new("prop"), len).await
            });
            let sequences: Vec<u64> = records.iter().map(|r| r.sequence).collect();
            let expected: Vec<u64> = (0..len).collect();
            prop_assert_eq!(sequences, expected);
        }
    }
}
