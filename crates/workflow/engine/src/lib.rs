//! Workflow engine for DocSeal
//!
//! The engine admits signatures, approvals, rejections and expiries for a
//! document's workflow, checks each against the plan and current state,
//! and records every committed transition in the audit ledger.
//!
//! # Key Principle
//!
//! **No transition without a record, no record without a transition.**
//!
//! The engine owns the only [`AuditLedger`](docseal_audit::AuditLedger)
//! handle that can append. Everything else receives a read-only
//! [`LedgerReader`](docseal_audit::LedgerReader).
//!
//! # Architecture
//!
//! The [`WorkflowEngine`] composes:
//!
//! - [`ExpiryHandler`]: finds overdue steps
//! - [`DocumentRegistry`]: current content digest of a document
//! - [`Notifier`]: best-effort "step actionable" and "workflow terminal" events
//! - [`Clock`]: time source for deadlines
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use docseal_audit::{AuditLedger, InMemoryAuditStore};
//! use workflow_engine::{InMemoryDocumentRegistry, WorkflowEngine};
//! use workflow_types::*;
//!
//! # #[tokio::main]
//! # async fn main() {
//! let ledger = AuditLedger::new(Arc::new(InMemoryAuditStore::new()));
//! let registry = Arc::new(InMemoryDocumentRegistry::new());
//! let engine = WorkflowEngine::new(ledger, registry.clone());
//!
//! let doc = DocumentId::new("lease-42");
//! let version = registry.put(doc.clone(), b"lease terms");
//! let plan = WorkflowPlan::new(doc.clone())
//!     .with_step(Step::signature("tenant", 1, "alice"))
//!     .with_step(Step::signature("landlord", 2, "bob"));
//!
//! engine.initiate(plan, version, ActorId::new("agent")).await.unwrap();
//! engine
//!     .submit_signature(&doc, StepId::new("tenant"), ActorId::new("alice"), serde_json::json!("sig-a"))
//!     .await
//!     .unwrap();
//!
//! let status = engine.status(&doc).await.unwrap();
//! assert_eq!(status.current_step, Some(StepId::new("landlord")));
//! # }
//! ```

#![deny(unsafe_code)]

pub mod clock;
pub mod engine;
pub mod expiry_handler;
pub mod notifier;
pub mod registry;

// Re-export main types
pub use clock::{Clock, ManualClock, SystemClock};
pub use engine::{TransitionReceipt, WorkflowEngine};
pub use expiry_handler::{ExpiryDecision, ExpiryHandler};
pub use notifier::{ChannelNotifier, NoopNotifier, Notifier, NotifyError, WorkflowEvent};
pub use registry::{DocumentRegistry, InMemoryDocumentRegistry, RegistryError};
