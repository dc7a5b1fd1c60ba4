//! The anchoring client
//!
//! Reads a document's ledger head, publishes it through the
//! [`AnchoringService`], and tracks confirmation. Every external call is
//! bounded by a timeout and retried per the configured [`RetryStrategy`];
//! when attempts run out the caller gets [`AnchorError::Pending`].
//!
//! The client never holds any workflow lock. It reads the head through a
//! [`LedgerReader`] snapshot, so a slow network delays only the anchor.
//!
//! [`RetryStrategy`]: crate::RetryStrategy

use crate::{
    AnchorConfig, AnchorError, AnchorId, AnchorReference, AnchorResult, AnchorStore,
    AnchoringService,
};
use chrono::Utc;
use docseal_audit::{DocumentId, LedgerReader};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

/// Outcome of a confirmation pass over unconfirmed anchors
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfirmationSweep {
    pub confirmed: usize,
    pub pending: usize,
    pub failed: usize,
}

/// Client for the external anchoring service
pub struct AnchoringClient {
    reader: LedgerReader,
    service: Arc<dyn AnchoringService>,
    store: Arc<dyn AnchorStore>,
    config: AnchorConfig,
}

impl AnchoringClient {
    pub fn new(
        reader: LedgerReader,
        service: Arc<dyn AnchoringService>,
        store: Arc<dyn AnchorStore>,
        config: AnchorConfig,
    ) -> Self {
        Self {
            reader,
            service,
            store,
            config,
        }
    }

    pub fn config(&self) -> &AnchorConfig {
        &self.config
    }

    pub fn store(&self) -> Arc<dyn AnchorStore> {
        Arc::clone(&self.store)
    }

    /// Anchor the current ledger head of `document`.
    pub async fn submit(&self, document: &DocumentId) -> AnchorResult<AnchorReference> {
        let (sequence, digest) = self
            .reader
            .head(document)
            .await?
            .ok_or_else(|| AnchorError::NothingToAnchor(document.clone()))?;

        let receipt = self
            .call(document, "anchor", self.config.submit_timeout(), move || {
                self.service.anchor(digest)
            })
            .await?;

        let reference = AnchorReference::new(document.clone(), digest, sequence, receipt);
        self.store.insert(reference.clone()).await?;

        tracing::info!(
            document = %document,
            anchor_id = %reference.anchor_id,
            sequence,
            digest = %digest.short(),
            tx_ref = %reference.external_tx_ref,
            network = %reference.network,
            "Ledger head anchored"
        );
        Ok(reference)
    }

    /// Poll the service for confirmation of one anchor. Returns whether it
    /// is confirmed.
    pub async fn confirm(&self, document: &DocumentId, anchor_id: &AnchorId) -> AnchorResult<bool> {
        let reference = self
            .store
            .get(anchor_id)
            .await?
            .filter(|r| &r.document_id == document)
            .ok_or_else(|| AnchorError::AnchorNotFound(anchor_id.clone()))?;
        self.refresh(&reference).await
    }

    /// Poll every unconfirmed anchor once.
    pub async fn confirm_pending(&self) -> AnchorResult<ConfirmationSweep> {
        let mut sweep = ConfirmationSweep::default();
        for reference in self.store.unconfirmed().await? {
            match self.refresh(&reference).await {
                Ok(true) => sweep.confirmed += 1,
                Ok(false) => sweep.pending += 1,
                Err(e) if e.is_pending() => sweep.pending += 1,
                Err(e) => {
                    tracing::warn!(
                        document = %reference.document_id,
                        anchor_id = %reference.anchor_id,
                        error = %e,
                        "Anchor confirmation failed"
                    );
                    sweep.failed += 1;
                }
            }
        }
        Ok(sweep)
    }

    pub async fn list(&self, document: &DocumentId) -> AnchorResult<Vec<AnchorReference>> {
        self.store.list(document).await
    }

    pub async fn latest_confirmed(
        &self,
        document: &DocumentId,
    ) -> AnchorResult<Option<AnchorReference>> {
        self.store.latest_confirmed(document).await
    }

    async fn refresh(&self, reference: &AnchorReference) -> AnchorResult<bool> {
        if reference.confirmed {
            return Ok(true);
        }

        let tx_ref = reference.external_tx_ref.as_str();
        let resolution = self
            .call(
                &reference.document_id,
                "resolve",
                self.config.confirm_timeout(),
                move || self.service.resolve(tx_ref),
            )
            .await?;

        if !resolution.confirmed {
            tracing::debug!(anchor_id = %reference.anchor_id, "Anchor not yet confirmed");
            return Ok(false);
        }

        self.store
            .mark_confirmed(&reference.anchor_id, resolution.block_ref, Utc::now())
            .await?;
        tracing::info!(
            document = %reference.document_id,
            anchor_id = %reference.anchor_id,
            sequence = reference.anchored_sequence,
            "Anchor confirmed"
        );
        Ok(true)
    }

    /// Run `f` under a timeout, retrying transient failures.
    async fn call<T, F, Fut>(
        &self,
        document: &DocumentId,
        operation: &'static str,
        timeout: Duration,
        mut f: F,
    ) -> AnchorResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = AnchorResult<T>>,
    {
        let max_attempts = self.config.max_attempts.max(1);
        let mut attempt = 0;
        loop {
            attempt += 1;
            let reason = match tokio::time::timeout(timeout, f()).await {
                Ok(Ok(value)) => return Ok(value),
                Ok(Err(e)) if !e.is_transient() => return Err(e),
                Ok(Err(e)) => e.to_string(),
                Err(_) => format!("{operation} timed out after {} ms", timeout.as_millis()),
            };

            if attempt >= max_attempts || !self.config.retry.retries() {
                tracing::warn!(
                    document = %document,
                    operation,
                    attempts = attempt,
                    reason = %reason,
                    "Anchoring deferred"
                );
                return Err(AnchorError::Pending {
                    document: document.clone(),
                    reason,
                });
            }

            let delay = self.config.retry.delay_for_attempt(attempt);
            tracing::debug!(
                document = %document,
                operation,
                attempt,
                delay_ms = delay.as_millis() as u64,
                reason = %reason,
                "Retrying anchoring call"
            );
            tokio::time::sleep(delay).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{InMemoryAnchorStore, RetryStrategy, SimulatedAnchoringService};
    use docseal_audit::{ActorId, AuditAction, AuditEntry, AuditLedger, InMemoryAuditStore};
    use serde_json::json;

    struct Setup {
        ledger: AuditLedger,
        service: Arc<SimulatedAnchoringService>,
        client: AnchoringClient,
    }

    fn fast_config() -> AnchorConfig {
        AnchorConfig {
            submit_timeout_ms: 200,
            confirm_timeout_ms: 200,
            max_attempts: 3,
            retry: RetryStrategy::Fixed { delay_ms: 5 },
            ..AnchorConfig::default()
        }
    }

    fn setup(service: SimulatedAnchoringService, config: AnchorConfig) -> Setup {
        let ledger = AuditLedger::new(Arc::new(InMemoryAuditStore::new()));
        let service = Arc::new(service);
        let client = AnchoringClient::new(
            ledger.reader(),
            service.clone(),
            Arc::new(InMemoryAnchorStore::new()),
            config,
        );
        Setup {
            ledger,
            service,
            client,
        }
    }

    async fn append(ledger: &AuditLedger, doc: &DocumentId) {
        ledger
            .append(
                doc,
                AuditEntry::new(
                    ActorId::new("alice"),
                    AuditAction::SignatureSubmitted,
                    json!({ "step_id": "s1" }),
                ),
            )
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn empty_ledger_has_nothing_to_anchor() {
        let s = setup(SimulatedAnchoringService::default(), fast_config());
        let err = s.client.submit(&DocumentId::new("d")).await.unwrap_err();
        assert!(matches!(err, AnchorError::NothingToAnchor(_)));
    }

    #[tokio::test]
    async fn submit_then_confirm() {
        let s = setup(
            SimulatedAnchoringService::new("testnet").with_confirm_after(2),
            fast_config(),
        );
        let doc = DocumentId::new("d");
        append(&s.ledger, &doc).await;
        append(&s.ledger, &doc).await;

        let reference = s.client.submit(&doc).await.unwrap();
        assert!(!reference.confirmed);
        assert_eq!(reference.anchored_sequence, 1);
        assert_eq!(reference.anchored_digest, s.ledger.head_digest(&doc).await.unwrap());
        assert_eq!(
            s.service.anchored_digest(&reference.external_tx_ref),
            Some(reference.anchored_digest)
        );

        assert!(!s.client.confirm(&doc, &reference.anchor_id).await.unwrap());
        assert!(s.client.confirm(&doc, &reference.anchor_id).await.unwrap());

        let latest = s.client.latest_confirmed(&doc).await.unwrap().unwrap();
        assert_eq!(latest.anchor_id, reference.anchor_id);
        assert_eq!(latest.anchored_digest, reference.anchored_digest);
        assert!(latest.block_ref.is_some());
    }

    #[tokio::test]
    async fn outage_is_reported_as_pending() {
        let s = setup(SimulatedAnchoringService::default(), fast_config());
        let doc = DocumentId::new("d");
        append(&s.ledger, &doc).await;
        s.service.set_available(false);

        let err = s.client.submit(&doc).await.unwrap_err();
        assert!(err.is_pending());
        assert!(s.client.list(&doc).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn slow_service_times_out_as_pending() {
        let s = setup(
            SimulatedAnchoringService::default().with_latency(Duration::from_millis(500)),
            AnchorConfig {
                submit_timeout_ms: 20,
                max_attempts: 2,
                ..fast_config()
            },
        );
        let doc = DocumentId::new("d");
        append(&s.ledger, &doc).await;

        match s.client.submit(&doc).await {
            Err(AnchorError::Pending { reason, .. }) => assert!(reason.contains("timed out")),
            other => panic!("expected pending, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn recovers_when_service_returns() {
        let s = setup(SimulatedAnchoringService::default(), fast_config());
        let doc = DocumentId::new("d");
        append(&s.ledger, &doc).await;

        let reference = s.client.submit(&doc).await.unwrap();
        s.service.set_available(false);
        let sweep = s.client.confirm_pending().await.unwrap();
        assert_eq!(sweep, ConfirmationSweep { confirmed: 0, pending: 1, failed: 0 });

        s.service.set_available(true);
        let sweep = s.client.confirm_pending().await.unwrap();
        assert_eq!(sweep.confirmed, 1);
        assert!(s.client.confirm(&doc, &reference.anchor_id).await.unwrap());
    }

    #[tokio::test]
    async fn anchor_of_another_document_is_not_found() {
        let s = setup(SimulatedAnchoringService::default(), fast_config());
        let doc = DocumentId::new("d");
        append(&s.ledger, &doc).await;
        let reference = s.client.submit(&doc).await.unwrap();

        let err = s
            .client
            .confirm(&DocumentId::new("other"), &reference.anchor_id)
            .await
            .unwrap_err();
        assert!(matches!(err, AnchorError::AnchorNotFound(_)));
    }
}
