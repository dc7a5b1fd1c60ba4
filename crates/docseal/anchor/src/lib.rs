//! Anchoring for DocSeal audit ledgers.
//!
//! A document's ledger head digest is published to an external immutable
//! ledger through an [`AnchoringService`]. The returned reference is kept
//! as an [`AnchorReference`] and later confirmed by polling the service.
//!
//! Anchoring is decoupled from workflow progression: an unreachable
//! service yields [`AnchorError::Pending`] and never blocks a transition.

#![deny(unsafe_code)]

mod client;
mod config;
mod error;
mod model;
mod service;
mod store;

pub use client::{AnchoringClient, ConfirmationSweep};
pub use config::{AnchorConfig, AnchorPolicy, RetryStrategy};
pub use error::{AnchorError, AnchorResult};
pub use model::{AnchorId, AnchorReceipt, AnchorReference, Resolution};
pub use service::{AnchoringService, SimulatedAnchoringService};
pub use store::{AnchorStore, InMemoryAnchorStore};
