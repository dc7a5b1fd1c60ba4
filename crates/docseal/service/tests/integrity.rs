//! Integrity and anchoring through the service surface.

use chrono::{Duration, Utc};
use docseal_anchor::{AnchorConfig, AnchorPolicy, InMemoryAnchorStore, RetryStrategy, SimulatedAnchoringService};
use docseal_audit::{AuditAction, AuditError, AuditLedger, AuditResult, AuditStore, InMemoryAuditStore};
use docseal_digest::Digest;
use docseal_service::*;
use serde_json::json;
use std::sync::Arc;
use workflow_engine::{Clock, InMemoryDocumentRegistry, ManualClock, WorkflowEngine};
use workflow_types::{Step, WorkflowError, WorkflowPlan};

struct Fixture {
    audit: Arc<InMemoryAuditStore>,
    network: Arc<SimulatedAnchoringService>,
    clock: Arc<ManualClock>,
    service: DocsealService,
}

fn fixture(policy: AnchorPolicy) -> Fixture {
    let audit = Arc::new(InMemoryAuditStore::new());
    let registry = Arc::new(InMemoryDocumentRegistry::new());
    let clock = Arc::new(ManualClock::new(Utc::now()));
    let engine = WorkflowEngine::new(AuditLedger::new(audit.clone()), registry.clone())
        .with_clock(clock.clone());
    let network = Arc::new(SimulatedAnchoringService::new("testnet"));
    let config = AnchorConfig {
        submit_timeout_ms: 200,
        confirm_timeout_ms: 200,
        max_attempts: 3,
        retry: RetryStrategy::Fixed { delay_ms: 5 },
        policy,
    };
    let service = DocsealService::new(
        engine,
        registry,
        network.clone(),
        Arc::new(InMemoryAnchorStore::new()),
        config,
    );
    Fixture {
        audit,
        network,
        clock,
        service,
    }
}

fn doc() -> DocumentId {
    DocumentId::new("share-purchase")
}

async fn start(f: &Fixture, plan: WorkflowPlan) {
    f.service.put_content(doc(), b"share purchase agreement");
    f.service
        .initiate_workflow(plan, ActorId::new("counsel"))
        .await
        .unwrap();
}

fn two_signers() -> WorkflowPlan {
    WorkflowPlan::new(doc())
        .with_step(Step::signature("step1", 1, "signer-a"))
        .with_step(Step::signature("step2", 2, "signer-b"))
}

fn sign(step: &str, actor: &str) -> ActRequest {
    ActRequest {
        step_id: StepId::new(step),
        actor: ActorId::new(actor),
        action: StepAction::Sign {
            signature: json!(format!("sig-{actor}")),
        },
    }
}

async fn complete(f: &Fixture) {
    start(f, two_signers()).await;
    f.service.act_on_step(&doc(), sign("step1", "signer-a")).await.unwrap();
    let receipt = f.service.act_on_step(&doc(), sign("step2", "signer-b")).await.unwrap();
    assert_eq!(receipt.status.status, WorkflowStatus::Completed);
}

async fn wait_for_anchor(f: &Fixture) -> Vec<AnchorReference> {
    for _ in 0..100 {
        let anchors = f.service.list_anchors(&doc()).await.unwrap();
        if !anchors.is_empty() {
            return anchors;
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }
    panic!("no anchor was submitted");
}

#[tokio::test]
async fn corrupted_record_is_reported_and_freezes_the_document() {
    let f = fixture(AnchorPolicy::Manual);
    complete(&f).await;

    assert!(f.audit.tamper(&doc(), 1, |record| {
        let mut bytes = *record.payload_digest.as_bytes();
        bytes[7] ^= 0xff;
        record.payload_digest = Digest::from_bytes(bytes);
    }));

    let result = f.service.verify_integrity(&doc()).await.unwrap();
    assert!(!result.valid);
    assert_eq!(result.broken_at_sequence, Some(1));
    assert_eq!(result.outcome(), VerificationOutcome::ChainBroken);
    assert!(f.service.integrity_flag(&doc()).is_some());

    let err = f.service.retire(&doc(), ActorId::new("counsel")).await.unwrap_err();
    assert!(matches!(
        err,
        ServiceError::Workflow(WorkflowError::IntegrityCompromised(_))
    ));
    assert_eq!(err.kind(), ErrorKind::Integrity);

    // Reads stay available while frozen.
    assert_eq!(f.service.get_audit_trail(&doc()).await.unwrap().len(), 4);

    assert!(f.service.clear_integrity_flag(&doc()));
    f.service.retire(&doc(), ActorId::new("counsel")).await.unwrap();
}

#[tokio::test]
async fn unreachable_anchoring_does_not_block_completion() {
    let f = fixture(AnchorPolicy::OnCompletion);
    f.network.set_available(false);
    complete(&f).await;

    // Let the background attempt run out of retries.
    tokio::time::sleep(std::time::Duration::from_millis(100)).await;
    assert!(f.service.list_anchors(&doc()).await.unwrap().is_empty());

    let status = f.service.get_workflow_status(&doc()).await.unwrap();
    assert_eq!(status.status, WorkflowStatus::Completed);

    let result = f.service.verify_integrity(&doc()).await.unwrap();
    assert!(result.valid);
    assert_eq!(result.anchor_mismatch, Some(AnchorMismatch::AnchorPending));
    assert!(f.service.integrity_flag(&doc()).is_none());

    let err = f.service.anchor_document(&doc()).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ExternalService);
    assert_eq!(err.code(), "ANCHOR_PENDING");

    f.network.set_available(true);
    let report = f.service.reconcile().await;
    assert_eq!(report.anchored, 1);
    assert_eq!(report.confirmations.confirmed, 1);

    let result = f.service.verify_integrity(&doc()).await.unwrap();
    assert!(result.valid);
    assert_eq!(result.anchor_mismatch, None);
    assert_eq!(result.anchor.map(|a| a.anchored_sequence), Some(3));
}

#[tokio::test]
async fn completion_is_anchored_in_the_background() {
    let f = fixture(AnchorPolicy::OnCompletion);
    complete(&f).await;

    let anchors = wait_for_anchor(&f).await;
    assert_eq!(anchors.len(), 1);
    assert_eq!(anchors[0].anchored_sequence, 3);
    assert!(!anchors[0].confirmed);

    let sweep = f.service.confirm_anchors().await.unwrap();
    assert_eq!(sweep.confirmed, 1);
    let result = f.service.verify_integrity(&doc()).await.unwrap();
    assert_eq!(result.outcome(), VerificationOutcome::Valid);
    assert_eq!(result.anchor_mismatch, None);
}

#[tokio::test]
async fn manual_policy_anchors_only_on_request() {
    let f = fixture(AnchorPolicy::Manual);
    complete(&f).await;

    let report = f.service.reconcile().await;
    assert_eq!(report.anchored, 0);
    assert!(f.service.list_anchors(&doc()).await.unwrap().is_empty());

    let reference = f.service.anchor_document(&doc()).await.unwrap();
    assert_eq!(reference.anchored_sequence, 3);
    assert!(f
        .service
        .confirm_anchor(&doc(), &reference.anchor_id)
        .await
        .unwrap());
}

#[tokio::test]
async fn rewriting_history_after_anchoring_is_an_anchor_mismatch() {
    let f = fixture(AnchorPolicy::Manual);
    complete(&f).await;
    let reference = f.service.anchor_document(&doc()).await.unwrap();
    f.service
        .confirm_anchor(&doc(), &reference.anchor_id)
        .await
        .unwrap();

    // Drop the completion record. What is left replays cleanly.
    assert!(f.audit.tamper_stream(&doc(), |stream| {
        stream.pop();
    }));

    let result = f.service.verify_integrity(&doc()).await.unwrap();
    assert!(!result.valid);
    assert_eq!(result.broken_at_sequence, None);
    assert_eq!(result.outcome(), VerificationOutcome::AnchorMismatch);
    assert!(f.service.integrity_flag(&doc()).is_some());
}

#[tokio::test]
async fn reconcile_expires_overdue_steps_and_anchors_the_outcome() {
    let f = fixture(AnchorPolicy::OnCompletion);
    let deadline = f.clock.now() + Duration::hours(1);
    start(
        &f,
        WorkflowPlan::new(doc()).with_step(Step::signature("step1", 1, "signer-a").with_deadline(deadline)),
    )
    .await;

    f.clock.advance(Duration::hours(2));
    let report = f.service.reconcile().await;
    assert_eq!(report.documents, 1);
    assert_eq!(report.expired, 1);
    assert_eq!(report.anchored, 1);
    assert!(report.flagged.is_empty());

    let status = f.service.get_workflow_status(&doc()).await.unwrap();
    assert_eq!(status.status, WorkflowStatus::Expired);

    let trail = f.service.get_audit_trail(&doc()).await.unwrap();
    let anchors = f.service.list_anchors(&doc()).await.unwrap();
    assert_eq!(anchors[0].anchored_sequence, trail.len() as u64 - 1);
}

#[tokio::test]
async fn reconcile_flags_tampered_documents() {
    let f = fixture(AnchorPolicy::Manual);
    complete(&f).await;
    assert!(f.audit.tamper(&doc(), 2, |record| {
        record.payload = json!({ "step_id": "step1", "signature": "forged" });
    }));

    let report = f.service.reconcile().await;
    assert_eq!(report.flagged, vec![doc()]);
    assert!(f.service.integrity_flag(&doc()).is_some());
}

#[tokio::test]
async fn verifying_an_unknown_document_is_not_found() {
    let f = fixture(AnchorPolicy::Manual);
    let err = f
        .service
        .verify_integrity(&DocumentId::new("never-initiated"))
        .await
        .unwrap_err();
    assert!(err.is_not_found());
    assert_eq!(err.code(), "WORKFLOW_NOT_FOUND");
}

#[tokio::test]
async fn vanished_audit_stream_is_a_broken_chain() {
    let f = fixture(AnchorPolicy::Manual);
    start(&f, two_signers()).await;
    assert!(f.audit.tamper_stream(&doc(), |stream| stream.clear()));

    let result = f.service.verify_integrity(&doc()).await.unwrap();
    assert!(!result.valid);
    assert_eq!(result.record_count, 0);
    assert_eq!(result.outcome(), VerificationOutcome::ChainBroken);
    assert!(f.service.integrity_flag(&doc()).is_some());
}

/// Audit store that refuses the first workflow-level terminal record.
#[derive(Default)]
struct LosesFirstFinish {
    inner: InMemoryAuditStore,
    tripped: std::sync::atomic::AtomicBool,
}

#[async_trait::async_trait]
impl AuditStore for LosesFirstFinish {
    async fn insert(&self, record: AuditRecord) -> AuditResult<()> {
        if record.action.is_workflow_terminal()
            && !self.tripped.swap(true, std::sync::atomic::Ordering::SeqCst)
        {
            return Err(AuditError::Backend("write failed".into()));
        }
        self.inner.insert(record).await
    }

    async fn list(&self, document: &DocumentId) -> AuditResult<Vec<AuditRecord>> {
        self.inner.list(document).await
    }

    async fn head(&self, document: &DocumentId) -> AuditResult<Option<AuditRecord>> {
        self.inner.head(document).await
    }

    async fn get(&self, document: &DocumentId, sequence: u64) -> AuditResult<Option<AuditRecord>> {
        self.inner.get(document, sequence).await
    }

    async fn documents(&self) -> AuditResult<Vec<DocumentId>> {
        self.inner.documents().await
    }
}

#[tokio::test]
async fn reconcile_restores_a_lost_completion_record_and_anchors_it() {
    let registry = Arc::new(InMemoryDocumentRegistry::new());
    let engine = WorkflowEngine::new(
        AuditLedger::new(Arc::new(LosesFirstFinish::default())),
        registry.clone(),
    );
    let service = DocsealService::new(
        engine,
        registry,
        Arc::new(SimulatedAnchoringService::new("testnet")),
        Arc::new(InMemoryAnchorStore::new()),
        AnchorConfig {
            policy: AnchorPolicy::OnCompletion,
            ..AnchorConfig::default()
        },
    );

    service.put_content(doc(), b"share purchase agreement");
    service
        .initiate_workflow(two_signers(), ActorId::new("counsel"))
        .await
        .unwrap();
    service.act_on_step(&doc(), sign("step1", "signer-a")).await.unwrap();
    assert!(service.act_on_step(&doc(), sign("step2", "signer-b")).await.is_err());
    assert!(service.list_anchors(&doc()).await.unwrap().is_empty());

    let report = service.reconcile().await;
    assert_eq!(report.restored, 1);
    assert_eq!(report.anchored, 1);

    let trail = service.get_audit_trail(&doc()).await.unwrap();
    assert_eq!(trail.last().unwrap().action, AuditAction::WorkflowCompleted);
    let anchors = service.list_anchors(&doc()).await.unwrap();
    assert_eq!(anchors[0].anchored_sequence, 3);
}
