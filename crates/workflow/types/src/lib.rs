//! Workflow domain types for DocSeal.
//!
//! A document moves through an ordered plan of signature and approval
//! steps, each performed by a distinct participant.
//!
//! # Key Concepts
//!
//! - **WorkflowPlan**: the immutable list of [`Step`]s for one document.
//!   Blocking steps sharing an `order` value form a *rank*; a rank must be
//!   fully completed before the next becomes actionable. Non-blocking steps
//!   are actionable whenever the workflow is in progress.
//! - **WorkflowInstance**: one run of a plan against a document version,
//!   holding per-step state and the single authoritative status.
//! - **WorkflowError**: every refusal carries an [`ErrorKind`] so callers
//!   know whether to fix input, retry, or stop.
//!
//! Types here are pure state. Recording transitions in the audit ledger is
//! the engine's job.

#![deny(unsafe_code)]

mod errors;
mod instance;
mod plan;

pub use errors::*;
pub use instance::*;
pub use plan::*;

pub use docseal_audit::{ActorId, DocumentId};
pub use docseal_digest::Digest;
