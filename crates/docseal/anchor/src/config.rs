//! Anchoring configuration: timeouts, retry strategy, anchoring cadence.

use docseal_audit::AuditAction;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Retry strategy for calls to the anchoring service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RetryStrategy {
    /// No retry
    None,
    /// Fixed delay between retries
    Fixed { delay_ms: u64 },
    /// Exponential backoff
    Exponential {
        initial_delay_ms: u64,
        max_delay_ms: u64,
        multiplier: f64,
    },
}

impl Default for RetryStrategy {
    fn default() -> Self {
        Self::Exponential {
            initial_delay_ms: 250,
            max_delay_ms: 5_000,
            multiplier: 2.0,
        }
    }
}

impl RetryStrategy {
    /// Delay before retry number `attempt` (1-based)
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        match self {
            RetryStrategy::None => Duration::ZERO,
            RetryStrategy::Fixed { delay_ms } => Duration::from_millis(*delay_ms),
            RetryStrategy::Exponential {
                initial_delay_ms,
                max_delay_ms,
                multiplier,
            } => {
                let exponent = attempt.saturating_sub(1) as i32;
                let delay = (*initial_delay_ms as f64) * multiplier.powi(exponent);
                let delay = delay.min(*max_delay_ms as f64);
                Duration::from_millis(delay as u64)
            }
        }
    }

    pub fn retries(&self) -> bool {
        !matches!(self, RetryStrategy::None)
    }
}

/// When the service anchors a document's ledger head on its own
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnchorPolicy {
    /// Only on explicit request
    Manual,
    /// Once the workflow finishes, whatever the outcome
    #[default]
    OnCompletion,
    /// After every committed transition
    EveryRecord,
}

impl AnchorPolicy {
    /// Whether a transition that appended `action` last should trigger anchoring
    pub fn should_anchor(&self, action: AuditAction) -> bool {
        match self {
            AnchorPolicy::Manual => false,
            AnchorPolicy::OnCompletion => action.is_workflow_terminal(),
            AnchorPolicy::EveryRecord => true,
        }
    }
}

/// Anchoring client configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnchorConfig {
    /// Bound on one `anchor` call
    pub submit_timeout_ms: u64,
    /// Bound on one `resolve` call
    pub confirm_timeout_ms: u64,
    /// Attempts per operation, including the first
    pub max_attempts: u32,
    pub retry: RetryStrategy,
    pub policy: AnchorPolicy,
}

impl Default for AnchorConfig {
    fn default() -> Self {
        Self {
            submit_timeout_ms: 5_000,
            confirm_timeout_ms: 5_000,
            max_attempts: 3,
            retry: RetryStrategy::default(),
            policy: AnchorPolicy::default(),
        }
    }
}

impl AnchorConfig {
    pub fn submit_timeout(&self) -> Duration {
        Duration::from_millis(self.submit_timeout_ms)
    }

    pub fn confirm_timeout(&self) -> Duration {
        Duration::from_millis(self.confirm_timeout_ms)
    }
}
