//! The external anchoring service seam and a simulated implementation.

use crate::{AnchorError, AnchorReceipt, AnchorResult, Resolution};
use async_trait::async_trait;
use dashmap::DashMap;
use docseal_digest::{digest_record, Digest, RecordField};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::time::Duration;

/// An external, independently operated immutable ledger.
///
/// Calls may take arbitrarily long or fail transiently. Callers bound them
/// with timeouts; implementations need not.
#[async_trait]
pub trait AnchoringService: Send + Sync {
    /// Publish a digest
    async fn anchor(&self, digest: Digest) -> AnchorResult<AnchorReceipt>;

    /// Look up a previous submission
    async fn resolve(&self, tx_ref: &str) -> AnchorResult<Resolution>;
}

#[derive(Debug, Clone)]
struct SimulatedTx {
    digest: Digest,
    resolutions: u32,
    block: Option<u64>,
}

/// In-process stand-in for an anchoring network.
///
/// Transaction references are derived from the digest and a nonce. A
/// submission confirms after a configurable number of `resolve` calls.
/// Availability and latency can be changed at runtime to simulate outages.
#[derive(Debug)]
pub struct SimulatedAnchoringService {
    network: String,
    available: AtomicBool,
    latency_ms: AtomicU64,
    confirm_after: AtomicU32,
    nonce: AtomicU64,
    next_block: AtomicU64,
    transactions: DashMap<String, SimulatedTx>,
}

impl SimulatedAnchoringService {
    pub fn new(network: impl Into<String>) -> Self {
        Self {
            network: network.into(),
            available: AtomicBool::new(true),
            latency_ms: AtomicU64::new(0),
            confirm_after: AtomicU32::new(1),
            nonce: AtomicU64::new(0),
            next_block: AtomicU64::new(1),
            transactions: DashMap::new(),
        }
    }

    /// Number of `resolve` calls before a submission reports confirmed
    pub fn with_confirm_after(self, resolutions: u32) -> Self {
        self.confirm_after.store(resolutions, Ordering::SeqCst);
        self
    }

    pub fn with_latency(self, latency: Duration) -> Self {
        self.set_latency(latency);
        self
    }

    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    pub fn set_latency(&self, latency: Duration) {
        self.latency_ms
            .store(latency.as_millis() as u64, Ordering::SeqCst);
    }

    pub fn network(&self) -> &str {
        &self.network
    }

    /// Digest published under `tx_ref`
    pub fn anchored_digest(&self, tx_ref: &str) -> Option<Digest> {
        self.transactions.get(tx_ref).map(|tx| tx.digest)
    }

    pub fn submission_count(&self) -> usize {
        self.transactions.len()
    }

    async fn round_trip(&self) -> AnchorResult<()> {
        let latency = self.latency_ms.load(Ordering::SeqCst);
        if latency > 0 {
            tokio::time::sleep(Duration::from_millis(latency)).await;
        }
        if !self.available.load(Ordering::SeqCst) {
            return Err(AnchorError::Unavailable(format!(
                "{} is unreachable",
                self.network
            )));
        }
        Ok(())
    }
}

impl Default for SimulatedAnchoringService {
    fn default() -> Self {
        Self::new("simulated")
    }
}

#[async_trait]
impl AnchoringService for SimulatedAnchoringService {
    async fn anchor(&self, digest: Digest) -> AnchorResult<AnchorReceipt> {
        self.round_trip().await?;

        let nonce = self.nonce.fetch_add(1, Ordering::SeqCst);
        let tx_ref = format!(
            "0x{}",
            digest_record(&[
                RecordField::Str(&self.network),
                RecordField::Digest(&digest),
                RecordField::U64(nonce),
            ])
            .to_hex()
        );
        self.transactions.insert(
            tx_ref.clone(),
            SimulatedTx {
                digest,
                resolutions: 0,
                block: None,
            },
        );

        tracing::debug!(network = %self.network, tx_ref = %tx_ref, "Simulated anchor accepted");
        Ok(AnchorReceipt {
            tx_ref,
            network: self.network.clone(),
        })
    }

    async fn resolve(&self, tx_ref: &str) -> AnchorResult<Resolution> {
        self.round_trip().await?;

        let mut tx = self
            .transactions
            .get_mut(tx_ref)
            .ok_or_else(|| AnchorError::Rejected(format!("unknown transaction {tx_ref}")))?;

        tx.resolutions += 1;
        if tx.block.is_none() && tx.resolutions >= self.confirm_after.load(Ordering::SeqCst) {
            tx.block = Some(self.next_block.fetch_add(1, Ordering::SeqCst));
        }

        Ok(match tx.block {
            Some(block) => Resolution::confirmed(format!("{}:{}", self.network, block)),
            None => Resolution::pending(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use docseal_digest::digest_content;

    #[tokio::test]
    async fn confirms_after_configured_resolutions() {
        let service = SimulatedAnchoringService::new("testnet").with_confirm_after(2);
        let receipt = service.anchor(digest_content(b"head")).await.unwrap();
        assert_eq!(receipt.network, "testnet");
        assert!(receipt.tx_ref.starts_with("0x"));

        assert!(!service.resolve(&receipt.tx_ref).await.unwrap().confirmed);
        let resolution = service.resolve(&receipt.tx_ref).await.unwrap();
        assert!(resolution.confirmed);
        assert_eq!(resolution.block_ref.as_deref(), Some("testnet:1"));
        assert_eq!(
            service.anchored_digest(&receipt.tx_ref),
            Some(digest_content(b"head"))
        );
    }

    #[tokio::test]
    async fn same_digest_gets_distinct_references() {
        let service = SimulatedAnchoringService::default();
        let d = digest_content(b"head");
        let a = service.anchor(d).await.unwrap();
        let b = service.anchor(d).await.unwrap();
        assert_ne!(a.tx_ref, b.tx_ref);
        assert_eq!(service.submission_count(), 2);
    }

    #[tokio::test]
    async fn outage_is_transient() {
        let service = SimulatedAnchoringService::default();
        service.set_available(false);
        let err = service.anchor(digest_content(b"x")).await.unwrap_err();
        assert!(err.is_transient());

        service.set_available(true);
        assert!(service.anchor(digest_content(b"x")).await.is_ok());
    }

    #[tokio::test]
    async fn unknown_reference_is_rejected() {
        let service = SimulatedAnchoringService::default();
        let err = service.resolve("0xdead").await.unwrap_err();
        assert!(matches!(err, AnchorError::Rejected(_)));
    }
}
