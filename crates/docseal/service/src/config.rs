//! Configuration for DocSeal

use docseal_anchor::{AnchorConfig, SimulatedAnchoringService};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::time::Duration;

/// Main configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DocsealConfig {
    /// HTTP server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Anchoring client and simulated network
    #[serde(default)]
    pub anchoring: AnchoringConfig,

    /// Background reconciliation and expiry sweeps
    #[serde(default)]
    pub scheduler: SchedulerConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Listen address
    #[serde(default = "default_listen_addr")]
    pub listen_addr: SocketAddr,

    /// Enable CORS
    #[serde(default = "default_true")]
    pub enable_cors: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            enable_cors: true,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AnchoringConfig {
    #[serde(default)]
    pub client: AnchorConfig,

    #[serde(default)]
    pub simulated: SimulatedNetworkConfig,
}

/// Knobs of the in-process anchoring network
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulatedNetworkConfig {
    #[serde(default = "default_network")]
    pub network: String,

    /// `resolve` calls before a submission confirms
    #[serde(default = "default_confirm_after")]
    pub confirm_after: u32,

    #[serde(default)]
    pub latency_ms: u64,
}

impl Default for SimulatedNetworkConfig {
    fn default() -> Self {
        Self {
            network: default_network(),
            confirm_after: default_confirm_after(),
            latency_ms: 0,
        }
    }
}

impl SimulatedNetworkConfig {
    pub fn build(&self) -> SimulatedAnchoringService {
        SimulatedAnchoringService::new(self.network.clone())
            .with_confirm_after(self.confirm_after)
            .with_latency(Duration::from_millis(self.latency_ms))
    }
}

/// Scheduler configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Run the background loops at all
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Reconciliation interval in seconds
    #[serde(default = "default_reconcile_interval")]
    pub reconcile_interval_secs: u64,

    /// Expiry sweep interval in seconds
    #[serde(default = "default_expiry_interval")]
    pub expiry_sweep_interval_secs: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            reconcile_interval_secs: default_reconcile_interval(),
            expiry_sweep_interval_secs: default_expiry_interval(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level or `EnvFilter` directive
    #[serde(default = "default_log_level")]
    pub level: String,

    /// JSON format
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

// Default value helpers
fn default_true() -> bool {
    true
}

fn default_listen_addr() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 8080))
}

fn default_network() -> String {
    "simulated".to_string()
}

fn default_confirm_after() -> u32 {
    1
}

fn default_reconcile_interval() -> u64 {
    30
}

fn default_expiry_interval() -> u64 {
    5
}

fn default_log_level() -> String {
    "info".to_string()
}

impl DocsealConfig {
    /// Load configuration: defaults, then the optional file, then
    /// `DOCSEAL__SECTION__KEY` environment variables.
    pub fn load(path: Option<&str>) -> Result<Self, config::ConfigError> {
        let mut builder = config::Config::builder();

        builder = builder.add_source(config::Config::try_from(&DocsealConfig::default())?);

        if let Some(path) = path {
            builder = builder.add_source(config::File::with_name(path).required(false));
        }

        builder = builder.add_source(
            config::Environment::with_prefix("DOCSEAL")
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        );

        builder.build()?.try_deserialize()
    }
}
