//! DocSeal audit ledger.
//!
//! Every state change of a document workflow is recorded as an
//! [`AuditRecord`] in a per-document, append-only stream. Each record's
//! digest covers the previous record's digest, so any retroactive change
//! breaks the chain at the altered record.
//!
//! - [`AuditLedger`] is the single write path (`append`) plus reads.
//! - [`LedgerReader`] is a read-only view handed to components that must
//!   never append (anchoring, verification).
//! - [`AuditStore`] is the persistence seam; [`InMemoryAuditStore`] is the
//!   reference implementation.

#![deny(unsafe_code)]
#![warn(rust_2018_idioms)]

mod error;
mod ledger;
pub mod memory;
mod model;
mod traits;

pub use error::{AuditError, AuditResult};
pub use ledger::{compute_record_digest, payload_digest, AuditLedger, LedgerReader};
pub use memory::InMemoryAuditStore;
pub use model::{ActorId, AuditAction, AuditEntry, AuditRecord, ChainReplay, DocumentId};
pub use traits::AuditStore;

pub use docseal_digest::Digest;
