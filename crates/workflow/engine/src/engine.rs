//! Workflow Engine: the entry point for every workflow mutation
//!
//! The engine:
//! 1. Initiates workflows from validated plans
//! 2. Admits signatures, approvals and rejections from participants
//! 3. Expires overdue steps, lazily on every access and on demand
//! 4. Appends an audit record for every transition it commits
//! 5. Notifies the dispatcher once the transition is committed
//!
//! Each document has its own async mutex. Every transition, including its
//! ledger appends, runs under that lock, so at most one mutation per
//! document is in flight. A transition is computed on a copy of the
//! instance and only swapped in once its step record has been appended.

use crate::expiry_handler::ExpiryHandler;
use crate::{Clock, DocumentRegistry, Notifier, NoopNotifier, SystemClock, WorkflowEvent};
use dashmap::DashMap;
use docseal_audit::{AuditAction, AuditEntry, AuditLedger, AuditRecord, LedgerReader};
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::sync::Mutex;
use workflow_types::*;

/// Per-document state guarded by the document lock
#[derive(Default)]
struct DocumentSlot {
    active: Option<WorkflowInstance>,
    retired: Vec<WorkflowInstance>,
}

/// Step-level requests admitted by the engine
#[derive(Clone, Debug)]
enum Action {
    Sign {
        step: StepId,
        actor: ActorId,
        signature: Value,
    },
    Approve {
        step: StepId,
        actor: ActorId,
        comment: Option<String>,
    },
    Reject {
        step: StepId,
        actor: ActorId,
        reason: String,
    },
    Expire {
        step: StepId,
    },
}

/// What a committed (or idempotently skipped) transition produced
#[derive(Clone, Debug, Serialize)]
pub struct TransitionReceipt {
    /// `None` when the call was a no-op, e.g. expiring an already expired step
    pub outcome: Option<StepOutcome>,
    /// Records appended by this call, in ledger order
    pub records: Vec<AuditRecord>,
    pub status: WorkflowStatusReport,
}

impl TransitionReceipt {
    pub fn transitioned(&self) -> bool {
        self.outcome.is_some()
    }
}

/// Steps expired by one lazy sweep
struct Expired {
    outcome: StepOutcome,
    records: Vec<AuditRecord>,
}

/// The workflow engine
pub struct WorkflowEngine {
    slots: DashMap<DocumentId, Arc<Mutex<DocumentSlot>>>,
    /// Documents whose history failed verification, with the reason
    flagged: DashMap<DocumentId, String>,
    ledger: AuditLedger,
    registry: Arc<dyn DocumentRegistry>,
    notifier: Arc<dyn Notifier>,
    clock: Arc<dyn Clock>,
    expiry: ExpiryHandler,
}

impl WorkflowEngine {
    pub fn new(ledger: AuditLedger, registry: Arc<dyn DocumentRegistry>) -> Self {
        Self {
            slots: DashMap::new(),
            flagged: DashMap::new(),
            ledger,
            registry,
            notifier: Arc::new(NoopNotifier),
            clock: Arc::new(SystemClock),
            expiry: ExpiryHandler::new(),
        }
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Read-only ledger view for anchoring and verification
    pub fn ledger_reader(&self) -> LedgerReader {
        self.ledger.reader()
    }

    /// Documents that have had a workflow
    pub fn documents(&self) -> Vec<DocumentId> {
        self.slots.iter().map(|e| e.key().clone()).collect()
    }

    // ── Initiation ───────────────────────────────────────────────────

    /// Start a workflow for `document` from `plan`.
    pub async fn initiate(
        &self,
        plan: WorkflowPlan,
        document: DocumentVersion,
        initiator: ActorId,
    ) -> WorkflowResult<WorkflowStatusReport> {
        let document_id = document.document_id.clone();
        self.ensure_trusted(&document_id)?;

        let now = self.clock.now();
        let instance = WorkflowInstance::draft(plan, document, now)?;

        let slot = self.slot(&document_id);
        let mut events = Vec::new();
        let result = {
            let mut guard = slot.lock().await;
            self.initiate_locked(&mut guard, instance, &initiator, &mut events)
                .await
        };
        self.dispatch(events).await;
        result
    }

    async fn initiate_locked(
        &self,
        slot: &mut DocumentSlot,
        mut instance: WorkflowInstance,
        initiator: &ActorId,
        events: &mut Vec<WorkflowEvent>,
    ) -> WorkflowResult<WorkflowStatusReport> {
        let now = self.clock.now();
        let document_id = instance.document_id().clone();
        self.ensure_trusted(&document_id)?;

        if let Some(active) = slot.active.as_mut() {
            self.expire_overdue(active, events).await?;
            if active.is_terminal() {
                return Err(WorkflowError::WorkflowTerminal {
                    document: document_id,
                    status: active.status,
                });
            }
            return Err(WorkflowError::WorkflowActive(document_id));
        }

        if let Some(previous) = slot.retired.iter().map(|i| i.plan.version).max() {
            if instance.plan.version <= previous {
                return Err(WorkflowError::InvalidPlan(format!(
                    "plan version {} must be greater than retired version {}",
                    instance.plan.version, previous
                )));
            }
        }

        instance.start(now)?;

        let payload = json!({
            "instance_id": instance.id,
            "plan_id": instance.plan.id,
            "plan_version": instance.plan.version,
            "document_version": instance.document.version,
            "content_digest": instance.document.content_digest,
            "steps": instance.plan.steps,
        });
        let record = self
            .ledger
            .append(
                &document_id,
                AuditEntry::new(initiator.clone(), AuditAction::WorkflowInitiated, payload),
            )
            .await?;

        events.extend(actionable_events(&[], &instance));

        tracing::info!(
            document = %document_id,
            instance_id = %instance.id,
            plan_version = instance.plan.version,
            steps = instance.steps.len(),
            sequence = record.sequence,
            "Workflow initiated"
        );

        let report = instance.report();
        slot.active = Some(instance);
        Ok(report)
    }

    // ── Step Actions ─────────────────────────────────────────────────

    /// Complete a signature step.
    pub async fn submit_signature(
        &self,
        document: &DocumentId,
        step: StepId,
        actor: ActorId,
        signature: Value,
    ) -> WorkflowResult<TransitionReceipt> {
        if signature.is_null() {
            return Err(WorkflowError::ValidationError(
                "signature payload is empty".into(),
            ));
        }
        self.apply(
            document,
            Action::Sign {
                step,
                actor,
                signature,
            },
        )
        .await
    }

    /// Complete an approval step.
    pub async fn approve(
        &self,
        document: &DocumentId,
        step: StepId,
        actor: ActorId,
        comment: Option<String>,
    ) -> WorkflowResult<TransitionReceipt> {
        self.apply(
            document,
            Action::Approve {
                step,
                actor,
                comment,
            },
        )
        .await
    }

    /// Reject a step. A reason is required.
    pub async fn reject(
        &self,
        document: &DocumentId,
        step: StepId,
        actor: ActorId,
        reason: String,
    ) -> WorkflowResult<TransitionReceipt> {
        if reason.trim().is_empty() {
            return Err(WorkflowError::ValidationError(
                "rejection reason is required".into(),
            ));
        }
        self.apply(document, Action::Reject { step, actor, reason })
            .await
    }

    /// Expire an overdue step.
    ///
    /// Idempotent: a step that is already expired yields a receipt with no
    /// outcome and no new records.
    pub async fn expire(
        &self,
        document: &DocumentId,
        step: StepId,
    ) -> WorkflowResult<TransitionReceipt> {
        self.apply(document, Action::Expire { step }).await
    }

    async fn apply(&self, document: &DocumentId, action: Action) -> WorkflowResult<TransitionReceipt> {
        self.ensure_trusted(document)?;
        let slot = self.existing_slot(document)?;

        let mut events = Vec::new();
        let result = {
            let mut guard = slot.lock().await;
            match guard.active.as_mut() {
                Some(instance) => self.apply_locked(instance, action, &mut events).await,
                None => Err(WorkflowError::WorkflowNotFound(document.clone())),
            }
        };
        self.dispatch(events).await;
        result
    }

    async fn apply_locked(
        &self,
        instance: &mut WorkflowInstance,
        action: Action,
        events: &mut Vec<WorkflowEvent>,
    ) -> WorkflowResult<TransitionReceipt> {
        // The flag may have been raised while this caller waited on the lock.
        self.ensure_trusted(instance.document_id())?;
        let swept = self.expire_overdue(instance, events).await?;
        let now = self.clock.now();
        let document_id = instance.document_id().clone();

        if let Action::Expire { step } = &action {
            if let Some(done) = swept.into_iter().find(|e| &e.outcome.step_id == step) {
                return Ok(TransitionReceipt {
                    outcome: Some(done.outcome),
                    records: done.records,
                    status: instance.report(),
                });
            }
        }

        let before = actionable_ids(instance);
        let mut next = instance.clone();

        let (outcome, actor, entry) = match action {
            Action::Sign {
                step,
                actor,
                signature,
            } => {
                let outcome = next.complete_step(&step, &actor, StepKind::Signature, None, now)?;
                let payload = json!({ "step_id": step, "signature": signature });
                let entry = AuditEntry::new(actor.clone(), AuditAction::SignatureSubmitted, payload);
                (outcome, actor, entry)
            }
            Action::Approve {
                step,
                actor,
                comment,
            } => {
                let outcome =
                    next.complete_step(&step, &actor, StepKind::Approval, comment.clone(), now)?;
                let payload = json!({ "step_id": step, "comment": comment });
                let entry = AuditEntry::new(actor.clone(), AuditAction::StepApproved, payload);
                (outcome, actor, entry)
            }
            Action::Reject {
                step,
                actor,
                reason,
            } => {
                let outcome = next.reject_step(&step, &actor, reason.clone(), now)?;
                let payload = json!({
                    "step_id": step,
                    "reason": reason,
                    "terminates_workflow": outcome.workflow_status == WorkflowStatus::Rejected,
                });
                let entry = AuditEntry::new(actor.clone(), AuditAction::StepRejected, payload);
                (outcome, actor, entry)
            }
            Action::Expire { step } => {
                let Some(outcome) = next.expire_step(&step, now)? else {
                    tracing::debug!(document = %document_id, step = %step, "Step already expired");
                    return Ok(TransitionReceipt {
                        outcome: None,
                        records: Vec::new(),
                        status: instance.report(),
                    });
                };
                let entry = expiry_entry(&next, &step);
                (outcome, ActorId::system(), entry)
            }
        };

        let record = self.ledger.append(&document_id, entry).await?;
        *instance = next;

        tracing::info!(
            document = %document_id,
            step = %outcome.step_id,
            actor = %actor,
            step_status = %outcome.step_status,
            workflow_status = %outcome.workflow_status,
            sequence = record.sequence,
            "Step transition committed"
        );

        let mut records = vec![record];
        if outcome.finished {
            records.push(self.record_finish(instance, &actor, &outcome.step_id, events).await?);
        }
        events.extend(actionable_events(&before, instance));

        Ok(TransitionReceipt {
            outcome: Some(outcome),
            records,
            status: instance.report(),
        })
    }

    // ── Expiry ───────────────────────────────────────────────────────

    /// Expire every overdue step of one document's active workflow.
    ///
    /// Returns the number of steps expired. Flagged documents are skipped.
    pub async fn sweep_expired(&self, document: &DocumentId) -> WorkflowResult<usize> {
        if self.flagged.contains_key(document) {
            return Ok(0);
        }
        let slot = self.existing_slot(document)?;
        let mut events = Vec::new();
        let result = {
            let mut guard = slot.lock().await;
            match guard.active.as_mut() {
                Some(instance) => self
                    .expire_overdue(instance, &mut events)
                    .await
                    .map(|expired| expired.len()),
                None => Ok(0),
            }
        };
        self.dispatch(events).await;
        result
    }

    /// Sweep every document. Per-document failures are logged and skipped.
    pub async fn sweep_all(&self) -> usize {
        let mut expired = 0;
        for document in self.documents() {
            match self.sweep_expired(&document).await {
                Ok(n) => expired += n,
                Err(e) => tracing::warn!(document = %document, error = %e, "Expiry sweep failed"),
            }
        }
        if expired > 0 {
            tracing::info!(expired, "Expiry sweep completed");
        }
        expired
    }

    /// Lazy expiry: apply every due expiry decision, earliest deadline first.
    async fn expire_overdue(
        &self,
        instance: &mut WorkflowInstance,
        events: &mut Vec<WorkflowEvent>,
    ) -> WorkflowResult<Vec<Expired>> {
        let now = self.clock.now();
        let document_id = instance.document_id().clone();
        let mut expired = Vec::new();

        for decision in self.expiry.check_expirations(instance, now) {
            if instance.is_terminal() {
                break;
            }
            let before = actionable_ids(instance);
            let mut next = instance.clone();
            let Some(outcome) = next.expire_step(&decision.step_id, now)? else {
                continue;
            };

            let record = self
                .ledger
                .append(&document_id, expiry_entry(&next, &decision.step_id))
                .await?;
            *instance = next;

            tracing::info!(
                document = %document_id,
                step = %decision.step_id,
                deadline = %decision.deadline,
                workflow_status = %outcome.workflow_status,
                sequence = record.sequence,
                "Step expired"
            );

            let mut records = vec![record];
            if outcome.finished {
                records.push(
                    self.record_finish(instance, &ActorId::system(), &decision.step_id, events)
                        .await?,
                );
            }
            events.extend(actionable_events(&before, instance));
            expired.push(Expired { outcome, records });
        }

        Ok(expired)
    }

    // ── Completion ───────────────────────────────────────────────────

    /// Append the workflow-level record for a terminal instance.
    async fn record_finish(
        &self,
        instance: &WorkflowInstance,
        actor: &ActorId,
        trigger: &StepId,
        events: &mut Vec<WorkflowEvent>,
    ) -> WorkflowResult<AuditRecord> {
        let document_id = instance.document_id().clone();

        let (action, actor, payload) = match instance.status {
            WorkflowStatus::Completed => {
                let version = self.completion_version(instance).await;
                let unresolved_optional: Vec<&StepId> = instance
                    .steps
                    .iter()
                    .filter(|s| s.status != StepStatus::Completed)
                    .map(|s| &s.step.id)
                    .collect();
                let payload = json!({
                    "instance_id": instance.id,
                    "content_digest": version.content_digest,
                    "document_version": version.version,
                    "completed_steps": instance.completed_count,
                    "skipped_optional_steps": unresolved_optional,
                });
                (AuditAction::WorkflowCompleted, ActorId::system(), payload)
            }
            WorkflowStatus::Rejected => {
                let payload = json!({ "instance_id": instance.id, "step_id": trigger });
                (AuditAction::WorkflowRejected, actor.clone(), payload)
            }
            _ => {
                let payload = json!({ "instance_id": instance.id, "step_id": trigger });
                (AuditAction::WorkflowExpired, ActorId::system(), payload)
            }
        };

        let record = self
            .ledger
            .append(&document_id, AuditEntry::new(actor, action, payload))
            .await?;

        tracing::info!(
            document = %document_id,
            instance_id = %instance.id,
            status = %instance.status,
            sequence = record.sequence,
            "Workflow finished"
        );

        events.push(WorkflowEvent::WorkflowTerminal {
            document_id,
            instance_id: instance.id.clone(),
            status: instance.status,
        });
        Ok(record)
    }

    /// Document content at completion time, falling back to the initiation
    /// version when the registry cannot answer.
    async fn completion_version(&self, instance: &WorkflowInstance) -> DocumentVersion {
        match self.registry.content_digest(instance.document_id()).await {
            Ok(version) => {
                if version.content_digest != instance.document.content_digest {
                    tracing::warn!(
                        document = %instance.document_id(),
                        initiated_version = instance.document.version,
                        current_version = version.version,
                        "Document content changed during the workflow"
                    );
                }
                version
            }
            Err(e) => {
                tracing::warn!(
                    document = %instance.document_id(),
                    error = %e,
                    "Registry unavailable, recording the initiation digest"
                );
                instance.document.clone()
            }
        }
    }

    /// Append the workflow-level record a terminal instance is missing.
    ///
    /// The step record and the workflow record are separate appends. When
    /// the second one fails the instance is terminal while the ledger head
    /// is still the step record. Returns `None` when nothing is missing.
    pub async fn restore_finish_record(
        &self,
        document: &DocumentId,
    ) -> WorkflowResult<Option<AuditRecord>> {
        let slot = self.existing_slot(document)?;
        let mut events = Vec::new();
        let result = {
            let guard = slot.lock().await;
            self.restore_finish_locked(&guard, document, &mut events).await
        };
        self.dispatch(events).await;
        result
    }

    async fn restore_finish_locked(
        &self,
        slot: &DocumentSlot,
        document: &DocumentId,
        events: &mut Vec<WorkflowEvent>,
    ) -> WorkflowResult<Option<AuditRecord>> {
        self.ensure_trusted(document)?;
        let Some(instance) = slot.active.as_ref().filter(|i| i.is_terminal()) else {
            return Ok(None);
        };
        let Some(head) = self.ledger.head_record(document).await? else {
            return Ok(None);
        };
        if head.action.is_workflow_terminal() {
            return Ok(None);
        }
        let Some(trigger) = head.payload.get("step_id").and_then(Value::as_str) else {
            tracing::warn!(
                document = %document,
                sequence = head.sequence,
                "Terminal workflow head is not a step record"
            );
            return Ok(None);
        };

        tracing::warn!(
            document = %document,
            status = %instance.status,
            after_sequence = head.sequence,
            "Restoring missing workflow record"
        );
        let record = self
            .record_finish(instance, &head.actor, &StepId::new(trigger), events)
            .await?;
        Ok(Some(record))
    }

    // ── Queries ──────────────────────────────────────────────────────

    /// Current status. Overdue steps are expired first.
    ///
    /// When the last workflow was retired and none is active, the retired
    /// workflow's final status is returned.
    pub async fn status(&self, document: &DocumentId) -> WorkflowResult<WorkflowStatusReport> {
        let slot = self.existing_slot(document)?;
        let trusted = !self.flagged.contains_key(document);

        let mut events = Vec::new();
        let result = {
            let mut guard = slot.lock().await;
            let state = &mut *guard;
            match state.active.as_mut() {
                Some(instance) if trusted => self
                    .expire_overdue(instance, &mut events)
                    .await
                    .map(|_| instance.report()),
                Some(instance) => Ok(instance.report()),
                None => state
                    .retired
                    .last()
                    .map(WorkflowInstance::report)
                    .ok_or_else(|| WorkflowError::WorkflowNotFound(document.clone())),
            }
        };
        self.dispatch(events).await;
        result
    }

    /// Full audit trail of a document, ascending by sequence.
    pub async fn audit_trail(&self, document: &DocumentId) -> WorkflowResult<Vec<AuditRecord>> {
        self.status(document).await?;
        Ok(self.ledger.records(document).await?)
    }

    /// Final reports of retired workflows, oldest first.
    pub async fn retired(&self, document: &DocumentId) -> WorkflowResult<Vec<WorkflowStatusReport>> {
        let slot = self.existing_slot(document)?;
        let guard = slot.lock().await;
        Ok(guard.retired.iter().map(WorkflowInstance::report).collect())
    }

    // ── Retirement ───────────────────────────────────────────────────

    /// Move a terminal workflow into the retired set so a new plan version
    /// can be initiated. Its records stay in the ledger.
    pub async fn retire(
        &self,
        document: &DocumentId,
        actor: ActorId,
    ) -> WorkflowResult<WorkflowStatusReport> {
        self.ensure_trusted(document)?;
        let slot = self.existing_slot(document)?;

        let mut events = Vec::new();
        let result = {
            let mut guard = slot.lock().await;
            self.retire_locked(&mut guard, document, actor, &mut events)
                .await
        };
        self.dispatch(events).await;
        result
    }

    async fn retire_locked(
        &self,
        slot: &mut DocumentSlot,
        document: &DocumentId,
        actor: ActorId,
        events: &mut Vec<WorkflowEvent>,
    ) -> WorkflowResult<WorkflowStatusReport> {
        self.ensure_trusted(document)?;
        let Some(instance) = slot.active.as_mut() else {
            return Err(WorkflowError::WorkflowNotFound(document.clone()));
        };
        self.expire_overdue(instance, events).await?;
        if !instance.is_terminal() {
            return Err(WorkflowError::WorkflowActive(document.clone()));
        }

        let payload = json!({
            "instance_id": instance.id,
            "plan_version": instance.plan.version,
            "final_status": instance.status,
        });
        let record = self
            .ledger
            .append(
                document,
                AuditEntry::new(actor, AuditAction::WorkflowRetired, payload),
            )
            .await?;

        let report = instance.report();
        if let Some(instance) = slot.active.take() {
            tracing::info!(
                document = %document,
                instance_id = %instance.id,
                sequence = record.sequence,
                "Workflow retired"
            );
            slot.retired.push(instance);
        }
        Ok(report)
    }

    // ── Integrity Flags ──────────────────────────────────────────────

    /// Freeze a document after a failed verification.
    pub fn flag_integrity(&self, document: &DocumentId, reason: impl Into<String>) {
        let reason = reason.into();
        tracing::error!(document = %document, reason = %reason, "Document integrity compromised");
        self.flagged.insert(document.clone(), reason);
    }

    /// Lift a flag after operator review. Returns whether a flag was present.
    pub fn clear_integrity_flag(&self, document: &DocumentId) -> bool {
        let cleared = self.flagged.remove(document).is_some();
        if cleared {
            tracing::warn!(document = %document, "Integrity flag cleared");
        }
        cleared
    }

    pub fn integrity_flag(&self, document: &DocumentId) -> Option<String> {
        self.flagged.get(document).map(|r| r.value().clone())
    }

    pub fn flagged_documents(&self) -> Vec<DocumentId> {
        self.flagged.iter().map(|e| e.key().clone()).collect()
    }

    // ── Internal ─────────────────────────────────────────────────────

    fn ensure_trusted(&self, document: &DocumentId) -> WorkflowResult<()> {
        if self.flagged.contains_key(document) {
            return Err(WorkflowError::IntegrityCompromised(document.clone()));
        }
        Ok(())
    }

    fn slot(&self, document: &DocumentId) -> Arc<Mutex<DocumentSlot>> {
        let entry = self.slots.entry(document.clone()).or_default();
        Arc::clone(entry.value())
    }

    fn existing_slot(&self, document: &DocumentId) -> WorkflowResult<Arc<Mutex<DocumentSlot>>> {
        self.slots
            .get(document)
            .map(|s| Arc::clone(s.value()))
            .ok_or_else(|| WorkflowError::WorkflowNotFound(document.clone()))
    }

    async fn dispatch(&self, events: Vec<WorkflowEvent>) {
        for event in events {
            let document = event.document_id().clone();
            if let Err(e) = self.notifier.notify(event).await {
                tracing::warn!(document = %document, error = %e, "Notification delivery failed");
            }
        }
    }
}

fn expiry_entry(instance: &WorkflowInstance, step: &StepId) -> AuditEntry {
    let deadline = instance.step(step).and_then(|s| s.step.deadline);
    AuditEntry::new(
        ActorId::system(),
        AuditAction::StepExpired,
        json!({
            "step_id": step,
            "deadline": deadline,
            "terminates_workflow": instance.status == WorkflowStatus::Expired,
        }),
    )
}

fn actionable_ids(instance: &WorkflowInstance) -> Vec<StepId> {
    instance
        .actionable_steps()
        .into_iter()
        .map(|s| s.id.clone())
        .collect()
}

/// `StepActionable` for every step actionable now that was not before.
fn actionable_events(before: &[StepId], instance: &WorkflowInstance) -> Vec<WorkflowEvent> {
    instance
        .actionable_steps()
        .into_iter()
        .filter(|s| !before.contains(&s.id))
        .map(|s| WorkflowEvent::StepActionable {
            document_id: instance.document_id().clone(),
            step_id: s.id.clone(),
            participant: s.participant.clone(),
            kind: s.kind,
        })
        .collect()
}
