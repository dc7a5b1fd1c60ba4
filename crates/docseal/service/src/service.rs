//! The DocSeal service facade

use crate::config::AnchoringConfig;
use crate::ServiceResult;
use docseal_anchor::{
    AnchorConfig, AnchorError, AnchorId, AnchorPolicy, AnchorReference, AnchorResult,
    AnchorStore, AnchoringClient, AnchoringService, ConfirmationSweep, InMemoryAnchorStore,
};
use docseal_audit::{AuditLedger, AuditRecord, InMemoryAuditStore};
use docseal_verifier::{VerificationResult, Verifier};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use workflow_engine::{DocumentRegistry, InMemoryDocumentRegistry, TransitionReceipt, WorkflowEngine};
use workflow_types::{
    ActorId, DocumentId, DocumentVersion, Step, StepId, WorkflowPlan, WorkflowStatusReport,
};

// ── Requests ─────────────────────────────────────────────────────────

/// Request to start a workflow on a registered document
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InitiateRequest {
    pub initiator: ActorId,
    /// Plan version; defaults to 1
    #[serde(default)]
    pub version: Option<u32>,
    pub steps: Vec<Step>,
}

impl InitiateRequest {
    pub fn into_plan(self, document: DocumentId) -> (WorkflowPlan, ActorId) {
        let mut plan = WorkflowPlan::new(document);
        if let Some(version) = self.version {
            plan = plan.with_version(version);
        }
        plan.steps = self.steps;
        (plan, self.initiator)
    }
}

/// What a participant does to a step
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum StepAction {
    Sign {
        signature: Value,
    },
    Approve {
        #[serde(default)]
        comment: Option<String>,
    },
    Reject {
        reason: String,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActRequest {
    pub step_id: StepId,
    pub actor: ActorId,
    #[serde(flatten)]
    pub action: StepAction,
}

/// Outcome of one reconciliation pass
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReconcileReport {
    pub documents: usize,
    pub expired: usize,
    pub anchored: usize,
    pub anchors_pending: usize,
    /// Documents whose verification failed in this pass
    pub flagged: Vec<DocumentId>,
    /// Terminal workflows whose missing workflow record was appended
    pub restored: usize,
    pub confirmations: ConfirmationSweep,
}

// ── Service ──────────────────────────────────────────────────────────

/// Exposed surface of DocSeal.
///
/// Workflow mutations go through the engine, the only ledger writer.
/// Anchoring and verification see a read-only ledger view and never hold
/// a workflow lock.
#[derive(Clone)]
pub struct DocsealService {
    engine: Arc<WorkflowEngine>,
    registry: Arc<InMemoryDocumentRegistry>,
    anchoring: Arc<AnchoringClient>,
    verifier: Verifier,
    policy: AnchorPolicy,
}

impl DocsealService {
    /// Assemble a service. `engine` must have been built over `registry`.
    pub fn new(
        engine: WorkflowEngine,
        registry: Arc<InMemoryDocumentRegistry>,
        anchoring_service: Arc<dyn AnchoringService>,
        anchors: Arc<dyn AnchorStore>,
        config: AnchorConfig,
    ) -> Self {
        let reader = engine.ledger_reader();
        let policy = config.policy;
        let anchoring = AnchoringClient::new(reader.clone(), anchoring_service, anchors.clone(), config);
        Self {
            engine: Arc::new(engine),
            registry,
            anchoring: Arc::new(anchoring),
            verifier: Verifier::new(reader, anchors),
            policy,
        }
    }

    /// Fully in-memory service over the simulated anchoring network
    pub fn in_memory(config: &AnchoringConfig) -> Self {
        let ledger = AuditLedger::new(Arc::new(InMemoryAuditStore::new()));
        let registry = Arc::new(InMemoryDocumentRegistry::new());
        let engine = WorkflowEngine::new(ledger, registry.clone());
        Self::new(
            engine,
            registry,
            Arc::new(config.simulated.build()),
            Arc::new(InMemoryAnchorStore::new()),
            config.client.clone(),
        )
    }

    pub fn policy(&self) -> AnchorPolicy {
        self.policy
    }

    pub fn documents(&self) -> Vec<DocumentId> {
        self.engine.documents()
    }

    // ── Documents ────────────────────────────────────────────────────

    /// Register or update document content. Returns the current version.
    pub fn put_content(&self, document: DocumentId, content: &[u8]) -> DocumentVersion {
        self.registry.put(document, content)
    }

    pub async fn content_version(&self, document: &DocumentId) -> ServiceResult<DocumentVersion> {
        Ok(self.registry.content_digest(document).await?)
    }

    // ── Workflow ─────────────────────────────────────────────────────

    pub async fn initiate_workflow(
        &self,
        plan: WorkflowPlan,
        initiator: ActorId,
    ) -> ServiceResult<WorkflowStatusReport> {
        let document = plan.document_id.clone();
        let version = self.registry.content_digest(&document).await?;
        let report = self.engine.initiate(plan, version, initiator).await?;
        if self.policy == AnchorPolicy::EveryRecord {
            self.anchor_in_background(&document);
        }
        Ok(report)
    }

    pub async fn act_on_step(
        &self,
        document: &DocumentId,
        request: ActRequest,
    ) -> ServiceResult<TransitionReceipt> {
        let ActRequest {
            step_id,
            actor,
            action,
        } = request;
        let receipt = match action {
            StepAction::Sign { signature } => {
                self.engine
                    .submit_signature(document, step_id, actor, signature)
                    .await?
            }
            StepAction::Approve { comment } => {
                self.engine.approve(document, step_id, actor, comment).await?
            }
            StepAction::Reject { reason } => {
                self.engine.reject(document, step_id, actor, reason).await?
            }
        };
        self.after_transition(document, &receipt.records);
        Ok(receipt)
    }

    pub async fn expire_step(
        &self,
        document: &DocumentId,
        step: StepId,
    ) -> ServiceResult<TransitionReceipt> {
        let receipt = self.engine.expire(document, step).await?;
        self.after_transition(document, &receipt.records);
        Ok(receipt)
    }

    /// Expire overdue steps across every document.
    pub async fn sweep_expired(&self) -> usize {
        self.engine.sweep_all().await
    }

    pub async fn retire(
        &self,
        document: &DocumentId,
        actor: ActorId,
    ) -> ServiceResult<WorkflowStatusReport> {
        Ok(self.engine.retire(document, actor).await?)
    }

    pub async fn get_workflow_status(
        &self,
        document: &DocumentId,
    ) -> ServiceResult<WorkflowStatusReport> {
        Ok(self.engine.status(document).await?)
    }

    pub async fn get_audit_trail(&self, document: &DocumentId) -> ServiceResult<Vec<AuditRecord>> {
        Ok(self.engine.audit_trail(document).await?)
    }

    // ── Integrity ────────────────────────────────────────────────────

    /// Verify a document's chain and anchor. A failed verification flags
    /// the document and freezes its workflow.
    /// Verify a document that has had a workflow.
    ///
    /// Every initiated workflow leaves at least its initiation record, so an
    /// empty stream for a known document is reported as a broken chain.
    pub async fn verify_integrity(&self, document: &DocumentId) -> ServiceResult<VerificationResult> {
        self.engine.status(document).await?;

        let mut result = self.verifier.verify(document).await?;
        if result.record_count == 0 {
            tracing::error!(document = %document, "Audit stream missing for a known workflow");
            result.valid = false;
            result.broken_at_sequence = Some(0);
            result.reason = Some("audit stream is empty".to_string());
            result.anchor_mismatch = None;
        }
        if !result.valid && self.engine.integrity_flag(document).is_none() {
            self.engine.flag_integrity(document, result.summary());
        }
        Ok(result)
    }

    pub fn integrity_flag(&self, document: &DocumentId) -> Option<String> {
        self.engine.integrity_flag(document)
    }

    /// Operator override after a flagged document has been reviewed.
    pub fn clear_integrity_flag(&self, document: &DocumentId) -> bool {
        self.engine.clear_integrity_flag(document)
    }

    // ── Anchoring ────────────────────────────────────────────────────

    pub async fn anchor_document(&self, document: &DocumentId) -> ServiceResult<AnchorReference> {
        Ok(self.anchoring.submit(document).await?)
    }

    pub async fn confirm_anchor(
        &self,
        document: &DocumentId,
        anchor_id: &AnchorId,
    ) -> ServiceResult<bool> {
        Ok(self.anchoring.confirm(document, anchor_id).await?)
    }

    pub async fn confirm_anchors(&self) -> ServiceResult<ConfirmationSweep> {
        Ok(self.anchoring.confirm_pending().await?)
    }

    pub async fn list_anchors(&self, document: &DocumentId) -> ServiceResult<Vec<AnchorReference>> {
        Ok(self.anchoring.list(document).await?)
    }

    // ── Reconciliation ───────────────────────────────────────────────

    /// One pass over every document: sweep expiries, verify, anchor what the
    /// policy says is due, then poll unconfirmed anchors.
    pub async fn reconcile(&self) -> ReconcileReport {
        let mut report = ReconcileReport::default();

        for document in self.engine.documents() {
            report.documents += 1;

            match self.engine.sweep_expired(&document).await {
                Ok(n) => report.expired += n,
                Err(e) => tracing::warn!(document = %document, error = %e, "Expiry sweep failed"),
            }

            match self.verify_integrity(&document).await {
                Ok(result) if !result.valid => {
                    report.flagged.push(document);
                    continue;
                }
                Ok(_) => {}
                Err(e) => {
                    tracing::warn!(document = %document, error = %e, "Verification failed to run");
                    continue;
                }
            }

            match self.engine.restore_finish_record(&document).await {
                Ok(Some(_)) => report.restored += 1,
                Ok(None) => {}
                Err(e) => tracing::warn!(document = %document, error = %e, "Workflow record restore failed"),
            }

            match self.anchor_if_due(&document).await {
                Ok(true) => report.anchored += 1,
                Ok(false) => {}
                Err(e) if e.is_pending() => report.anchors_pending += 1,
                Err(e) => tracing::warn!(document = %document, error = %e, "Anchoring failed"),
            }
        }

        match self.anchoring.confirm_pending().await {
            Ok(sweep) => report.confirmations = sweep,
            Err(e) => tracing::warn!(error = %e, "Anchor confirmation sweep failed"),
        }

        tracing::info!(
            documents = report.documents,
            expired = report.expired,
            anchored = report.anchored,
            confirmed = report.confirmations.confirmed,
            flagged = report.flagged.len(),
            restored = report.restored,
            "Reconciliation pass completed"
        );
        report
    }

    // ── Internal ─────────────────────────────────────────────────────

    fn after_transition(&self, document: &DocumentId, records: &[AuditRecord]) {
        let due = records
            .last()
            .is_some_and(|record| self.policy.should_anchor(record.action));
        if due {
            self.anchor_in_background(document);
        }
    }

    fn anchor_in_background(&self, document: &DocumentId) {
        let anchoring = Arc::clone(&self.anchoring);
        let document = document.clone();
        tokio::spawn(async move {
            match anchoring.submit(&document).await {
                Ok(reference) => {
                    tracing::debug!(document = %document, anchor_id = %reference.anchor_id, "Background anchor submitted")
                }
                // Already logged by the client; reconciliation retries it.
                Err(AnchorError::Pending { .. }) => {}
                Err(e) => tracing::warn!(document = %document, error = %e, "Background anchoring failed"),
            }
        });
    }

    /// Anchor the ledger head when no anchor covers it yet and the policy
    /// calls for one at the head's action.
    async fn anchor_if_due(&self, document: &DocumentId) -> AnchorResult<bool> {
        if self.policy == AnchorPolicy::Manual {
            return Ok(false);
        }
        let reader = self.engine.ledger_reader();
        let Some((sequence, _)) = reader.head(document).await? else {
            return Ok(false);
        };

        let covered = self
            .anchoring
            .list(document)
            .await?
            .iter()
            .map(|r| r.anchored_sequence)
            .max();
        if covered.is_some_and(|c| c >= sequence) {
            return Ok(false);
        }

        let head = reader.record(document, sequence).await?;
        if !self.policy.should_anchor(head.action) {
            return Ok(false);
        }
        self.anchoring.submit(document).await?;
        Ok(true)
    }
}
