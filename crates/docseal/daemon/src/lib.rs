//! DocSeal daemon library
//!
//! - REST API over [`DocsealService`](docseal_service::DocsealService)
//! - Scheduler for reconciliation and expiry sweeps
//! - Server lifecycle management

#![deny(unsafe_code)]

pub mod api;
pub mod error;
pub mod scheduler;
pub mod server;

pub use api::{create_router, AppState};
pub use error::{ApiError, DaemonError};
pub use scheduler::Scheduler;
pub use server::Server;
