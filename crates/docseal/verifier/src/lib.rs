//! Integrity verifier for DocSeal documents.
//!
//! Verification has three distinct outcomes, never merged:
//!
//! 1. **Chain broken**: a stored record no longer matches its digest or
//!    its predecessor link. `broken_at_sequence` names the first bad record.
//! 2. **Anchor mismatch**: the chain is internally consistent, but the
//!    digest recomputed at the latest confirmed anchor's sequence differs
//!    from what was anchored. The ledger was rewritten after anchoring, or
//!    a stale head was anchored.
//! 3. **Valid**: both checks pass. Without a confirmed anchor the result is
//!    still valid, with the soft [`AnchorMismatch::AnchorPending`] note.

#![deny(unsafe_code)]

use chrono::{DateTime, Utc};
use docseal_anchor::{AnchorError, AnchorReference, AnchorStore};
use docseal_audit::{AuditError, DocumentId, LedgerReader};
use docseal_digest::Digest;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum VerifyError {
    #[error("Ledger error: {0}")]
    Ledger(#[from] AuditError),

    #[error("Anchor store error: {0}")]
    Anchor(#[from] AnchorError),
}

pub type VerifyResult<T> = Result<T, VerifyError>;

/// Why the chain and its anchor disagree, or why they could not be compared
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum AnchorMismatch {
    /// No confirmed anchor yet. Not a failure.
    AnchorPending,
    /// The anchored digest differs from the recomputed one
    DigestMismatch {
        sequence: u64,
        anchored: Digest,
        recomputed: Digest,
    },
    /// The anchored record no longer exists in the ledger
    UnknownSequence { sequence: u64, record_count: u64 },
}

impl AnchorMismatch {
    /// Whether this mismatch invalidates the document
    pub fn is_hard(&self) -> bool {
        !matches!(self, AnchorMismatch::AnchorPending)
    }
}

/// Coarse classification of a [`VerificationResult`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerificationOutcome {
    ChainBroken,
    AnchorMismatch,
    Valid,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationResult {
    pub document_id: DocumentId,
    pub valid: bool,
    pub broken_at_sequence: Option<u64>,
    /// Human-readable explanation of a broken chain
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    pub anchor_mismatch: Option<AnchorMismatch>,
    pub record_count: u64,
    pub head_digest: Digest,
    /// The confirmed anchor the chain was compared against
    #[serde(skip_serializing_if = "Option::is_none")]
    pub anchor: Option<AnchorReference>,
    pub verified_at: DateTime<Utc>,
}

impl VerificationResult {
    pub fn outcome(&self) -> VerificationOutcome {
        if self.broken_at_sequence.is_some() {
            VerificationOutcome::ChainBroken
        } else if self.anchor_mismatch.as_ref().is_some_and(AnchorMismatch::is_hard) {
            VerificationOutcome::AnchorMismatch
        } else {
            VerificationOutcome::Valid
        }
    }

    /// One-line summary, used when flagging a document
    pub fn summary(&self) -> String {
        match (&self.broken_at_sequence, &self.anchor_mismatch) {
            (Some(seq), _) => format!(
                "chain broken at sequence {}: {}",
                seq,
                self.reason.as_deref().unwrap_or("digest mismatch")
            ),
            (None, Some(AnchorMismatch::DigestMismatch { sequence, .. })) => {
                format!("anchored digest at sequence {sequence} does not match the ledger")
            }
            (None, Some(AnchorMismatch::UnknownSequence { sequence, record_count })) => format!(
                "anchored sequence {sequence} missing from ledger of {record_count} records"
            ),
            (None, Some(AnchorMismatch::AnchorPending)) => "valid, anchor pending".to_string(),
            (None, None) => "valid".to_string(),
        }
    }
}

/// Replays audit chains and compares them with confirmed anchors.
///
/// Reads only; it never appends or mutates anchors.
#[derive(Clone)]
pub struct Verifier {
    reader: LedgerReader,
    anchors: Arc<dyn AnchorStore>,
}

impl Verifier {
    pub fn new(reader: LedgerReader, anchors: Arc<dyn AnchorStore>) -> Self {
        Self { reader, anchors }
    }

    /// The anchor is read before the chain. An anchor only ever covers
    /// records that existed when it was stored, so a chain read afterwards
    /// is at least that long unless history was removed.
    pub async fn verify(&self, document: &DocumentId) -> VerifyResult<VerificationResult> {
        let latest = self.anchors.latest_confirmed(document).await?;
        let replay = self.reader.replay_chain(document).await?;
        let mut result = VerificationResult {
            document_id: document.clone(),
            valid: replay.valid,
            broken_at_sequence: replay.broken_at_sequence,
            reason: replay.reason.clone(),
            anchor_mismatch: None,
            record_count: replay.record_count,
            head_digest: replay.head_digest,
            anchor: None,
            verified_at: Utc::now(),
        };

        if !replay.valid {
            tracing::error!(
                document = %document,
                broken_at = ?replay.broken_at_sequence,
                reason = ?replay.reason,
                "Audit chain broken"
            );
            return Ok(result);
        }

        let Some(anchor) = latest else {
            result.anchor_mismatch = Some(AnchorMismatch::AnchorPending);
            tracing::debug!(document = %document, "No confirmed anchor yet");
            return Ok(result);
        };

        let sequence = anchor.anchored_sequence;
        let mismatch = if sequence >= replay.record_count {
            Some(AnchorMismatch::UnknownSequence {
                sequence,
                record_count: replay.record_count,
            })
        } else {
            let recomputed = self.reader.digest_at(document, sequence).await?;
            (recomputed != anchor.anchored_digest).then_some(AnchorMismatch::DigestMismatch {
                sequence,
                anchored: anchor.anchored_digest,
                recomputed,
            })
        };

        if let Some(mismatch) = mismatch {
            tracing::error!(
                document = %document,
                anchor_id = %anchor.anchor_id,
                sequence,
                "Ledger does not match its anchor"
            );
            result.valid = false;
            result.anchor_mismatch = Some(mismatch);
        }
        result.anchor = Some(anchor);
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use docseal_anchor::{AnchorReceipt, InMemoryAnchorStore};
    use docseal_audit::{ActorId, AuditAction, AuditEntry, AuditLedger, InMemoryAuditStore};
    use serde_json::json;

    struct Setup {
        audit: Arc<InMemoryAuditStore>,
        ledger: AuditLedger,
        anchors: Arc<InMemoryAnchorStore>,
        verifier: Verifier,
    }

    fn setup() -> Setup {
        let audit = Arc::new(InMemoryAuditStore::new());
        let ledger = AuditLedger::new(audit.clone());
        let anchors = Arc::new(InMemoryAnchorStore::new());
        let verifier = Verifier::new(ledger.reader(), anchors.clone());
        Setup {
            audit,
            ledger,
            anchors,
            verifier,
        }
    }

    fn doc() -> DocumentId {
        DocumentId::new("deed")
    }

    async fn append(s: &Setup, n: u64) {
        for i in 0..n {
            s.ledger
                .append(
                    &doc(),
                    AuditEntry::new(
                        ActorId::new("notary"),
                        AuditAction::StepApproved,
                        json!({ "step_id": format!("s{i}") }),
                    ),
                )
                .await
                .unwrap();
        }
    }

    /// Anchor the current head and confirm it, bypassing the network.
    async fn anchor_head(s: &Setup) -> AnchorReference {
        let (sequence, digest) = s.ledger.reader().head(&doc()).await.unwrap().unwrap();
        let reference = AnchorReference::new(
            doc(),
            digest,
            sequence,
            AnchorReceipt {
                tx_ref: format!("0x{}", digest.to_hex()),
                network: "test".into(),
            },
        );
        s.anchors.insert(reference.clone()).await.unwrap();
        s.anchors
            .mark_confirmed(&reference.anchor_id, Some("block-1".into()), Utc::now())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn intact_chain_without_anchor_is_soft_pending() {
        let s = setup();
        append(&s, 3).await;
        let result = s.verifier.verify(&doc()).await.unwrap();
        assert!(result.valid);
        assert_eq!(result.anchor_mismatch, Some(AnchorMismatch::AnchorPending));
        assert_eq!(result.outcome(), VerificationOutcome::Valid);
        assert_eq!(result.record_count, 3);
    }

    #[tokio::test]
    async fn intact_and_anchored_is_fully_valid() {
        let s = setup();
        append(&s, 3).await;
        anchor_head(&s).await;
        append(&s, 2).await;

        let result = s.verifier.verify(&doc()).await.unwrap();
        assert!(result.valid);
        assert_eq!(result.anchor_mismatch, None);
        assert_eq!(result.anchor.map(|a| a.anchored_sequence), Some(2));
    }

    #[tokio::test]
    async fn corrupted_payload_digest_breaks_chain_at_that_record() {
        let s = setup();
        append(&s, 4).await;
        anchor_head(&s).await;

        assert!(s.audit.tamper(&doc(), 1, |r| {
            let mut bytes = *r.payload_digest.as_bytes();
            bytes[0] ^= 0x01;
            r.payload_digest = Digest::from_bytes(bytes);
        }));

        let result = s.verifier.verify(&doc()).await.unwrap();
        assert!(!result.valid);
        assert_eq!(result.broken_at_sequence, Some(1));
        assert_eq!(result.anchor_mismatch, None);
        assert_eq!(result.outcome(), VerificationOutcome::ChainBroken);
    }

    #[tokio::test]
    async fn consistent_rewrite_after_anchoring_is_an_anchor_mismatch() {
        let s = setup();
        append(&s, 3).await;
        let anchor = anchor_head(&s).await;

        // Rewrite record 1 and rebuild every later digest so the chain replays clean.
        assert!(s.audit.tamper_stream(&doc(), |stream| {
            stream[1].payload = json!({ "step_id": "forged" });
            let mut previous = stream[0].record_digest;
            for record in stream.iter_mut().skip(1) {
                record.payload_digest = docseal_audit::payload_digest(&record.payload).unwrap();
                record.previous_record_digest = previous;
                record.record_digest = docseal_audit::compute_record_digest(
                    record.sequence,
                    &record.timestamp,
                    record.actor.as_str(),
                    record.action.as_str(),
                    &record.payload_digest,
                    &record.previous_record_digest,
                );
                previous = record.record_digest;
            }
        }));

        let result = s.verifier.verify(&doc()).await.unwrap();
        assert!(!result.valid);
        assert_eq!(result.broken_at_sequence, None);
        assert_eq!(result.outcome(), VerificationOutcome::AnchorMismatch);
        match result.anchor_mismatch {
            Some(AnchorMismatch::DigestMismatch {
                sequence, anchored, ..
            }) => {
                assert_eq!(sequence, 2);
                assert_eq!(anchored, anchor.anchored_digest);
            }
            other => panic!("expected digest mismatch, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn truncated_tail_is_reported_against_the_anchor() {
        let s = setup();
        append(&s, 3).await;
        anchor_head(&s).await;
        assert!(s.audit.tamper_stream(&doc(), |stream| {
            stream.pop();
        }));

        let result = s.verifier.verify(&doc()).await.unwrap();
        assert!(!result.valid);
        assert_eq!(
            result.anchor_mismatch,
            Some(AnchorMismatch::UnknownSequence {
                sequence: 2,
                record_count: 2
            })
        );
        assert!(result.summary().contains("missing"));
    }

    #[tokio::test]
    async fn unconfirmed_anchor_is_ignored() {
        let s = setup();
        append(&s, 2).await;
        let (sequence, digest) = s.ledger.reader().head(&doc()).await.unwrap().unwrap();
        s.anchors
            .insert(AnchorReference::new(
                doc(),
                digest,
                sequence,
                AnchorReceipt {
                    tx_ref: "0xabc".into(),
                    network: "test".into(),
                },
            ))
            .await
            .unwrap();

        let result = s.verifier.verify(&doc()).await.unwrap();
        assert!(result.valid);
        assert_eq!(result.anchor_mismatch, Some(AnchorMismatch::AnchorPending));
    }

    /// Anchor store that lets a transition and an anchor confirmation land
    /// while the verifier is reading.
    struct InterleavingAnchors {
        inner: Arc<InMemoryAnchorStore>,
        ledger: AuditLedger,
    }

    #[async_trait::async_trait]
    impl AnchorStore for InterleavingAnchors {
        async fn insert(&self, reference: AnchorReference) -> docseal_anchor::AnchorResult<()> {
            self.inner.insert(reference).await
        }

        async fn get(
            &self,
            anchor_id: &docseal_anchor::AnchorId,
        ) -> docseal_anchor::AnchorResult<Option<AnchorReference>> {
            self.inner.get(anchor_id).await
        }

        async fn list(&self, document: &DocumentId) -> docseal_anchor::AnchorResult<Vec<AnchorReference>> {
            self.inner.list(document).await
        }

        async fn unconfirmed(&self) -> docseal_anchor::AnchorResult<Vec<AnchorReference>> {
            self.inner.unconfirmed().await
        }

        async fn mark_confirmed(
            &self,
            anchor_id: &docseal_anchor::AnchorId,
            block_ref: Option<String>,
            confirmed_at: DateTime<Utc>,
        ) -> docseal_anchor::AnchorResult<AnchorReference> {
            self.inner.mark_confirmed(anchor_id, block_ref, confirmed_at).await
        }

        async fn latest_confirmed(
            &self,
            document: &DocumentId,
        ) -> docseal_anchor::AnchorResult<Option<AnchorReference>> {
            let record = self
                .ledger
                .append(
                    document,
                    AuditEntry::new(ActorId::new("notary"), AuditAction::StepApproved, json!({})),
                )
                .await
                .unwrap();
            let reference = AnchorReference::new(
                document.clone(),
                record.record_digest,
                record.sequence,
                AnchorReceipt {
                    tx_ref: "0xrace".into(),
                    network: "test".into(),
                },
            );
            self.inner.insert(reference.clone()).await?;
            self.inner
                .mark_confirmed(&reference.anchor_id, None, Utc::now())
                .await?;
            self.inner.latest_confirmed(document).await
        }
    }

    #[tokio::test]
    async fn anchor_confirmed_during_verification_is_not_a_mismatch() {
        let s = setup();
        append(&s, 1).await;
        let verifier = Verifier::new(
            s.ledger.reader(),
            Arc::new(InterleavingAnchors {
                inner: s.anchors.clone(),
                ledger: s.ledger.clone(),
            }),
        );

        let result = verifier.verify(&doc()).await.unwrap();
        assert!(result.valid, "{}", result.summary());
        assert_eq!(result.anchor_mismatch, None);
        assert_eq!(result.record_count, 2);
        assert_eq!(result.anchor.map(|a| a.anchored_sequence), Some(1));
    }
}
