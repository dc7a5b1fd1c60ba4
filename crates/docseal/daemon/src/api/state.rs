//! Application state for API handlers

use docseal_service::DocsealService;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub service: DocsealService,

    /// Daemon version
    pub version: String,

    /// Daemon start time
    pub started_at: chrono::DateTime<chrono::Utc>,
}

impl AppState {
    pub fn new(service: DocsealService) -> Self {
        Self {
            service,
            version: env!("CARGO_PKG_VERSION").to_string(),
            started_at: chrono::Utc::now(),
        }
    }

    /// Get uptime as a human-readable string
    pub fn uptime(&self) -> String {
        let secs = (chrono::Utc::now() - self.started_at).num_seconds().max(0);
        let (hours, rem) = (secs / 3600, secs % 3600);
        format!("{}h {}m {}s", hours, rem / 60, rem % 60)
    }
}
