//! DocSeal service layer
//!
//! [`DocsealService`] is the structured request/response surface over the
//! workflow engine, anchoring client and verifier: initiate a workflow,
//! act on steps, read status and the audit trail, verify integrity, and
//! manage anchors. It also runs the periodic reconciliation pass.

#![deny(unsafe_code)]

pub mod config;
mod error;
mod service;

pub use config::{
    AnchoringConfig, DocsealConfig, LoggingConfig, SchedulerConfig, ServerConfig,
    SimulatedNetworkConfig,
};
pub use error::{ServiceError, ServiceResult};
pub use service::{ActRequest, DocsealService, InitiateRequest, ReconcileReport, StepAction};

pub use docseal_anchor::{AnchorId, AnchorPolicy, AnchorReference, ConfirmationSweep};
pub use docseal_audit::{ActorId, AuditRecord, DocumentId};
pub use docseal_verifier::{AnchorMismatch, VerificationOutcome, VerificationResult};
pub use workflow_engine::TransitionReceipt;
pub use workflow_types::{ErrorKind, StepId, WorkflowStatus, WorkflowStatusReport};
