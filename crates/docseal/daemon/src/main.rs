//! DocSeal daemon
//!
//! Serves the DocSeal REST API and runs background reconciliation:
//! expiry sweeps, anchoring per policy, anchor confirmation and
//! integrity verification.

use clap::Parser;
use docseal_daemon::error::{DaemonError, DaemonResult};
use docseal_daemon::Server;
use docseal_service::DocsealConfig;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// DocSeal daemon CLI
#[derive(Parser)]
#[command(name = "docsealed")]
#[command(about = "DocSeal - document workflows with an anchored audit trail", long_about = None)]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, env = "DOCSEAL_CONFIG")]
    config: Option<String>,

    /// Listen address, overrides the configuration file
    #[arg(short, long, env = "DOCSEAL_LISTEN_ADDR")]
    listen: Option<String>,

    /// Log level, overrides the configuration file
    #[arg(long, env = "DOCSEAL_LOG_LEVEL")]
    log_level: Option<String>,

    /// Enable JSON logging
    #[arg(long, env = "DOCSEAL_LOG_JSON")]
    json: bool,

    /// Disable the background scheduler
    #[arg(long)]
    no_scheduler: bool,
}

#[tokio::main]
async fn main() -> DaemonResult<()> {
    let cli = Cli::parse();

    let mut config = DocsealConfig::load(cli.config.as_deref())
        .map_err(|e| DaemonError::Config(e.to_string()))?;

    // Override with CLI args
    if let Some(listen) = &cli.listen {
        config.server.listen_addr = listen
            .parse()
            .map_err(|e| DaemonError::Config(format!("Invalid listen address: {}", e)))?;
    }
    if let Some(level) = cli.log_level {
        config.logging.level = level;
    }
    if cli.json {
        config.logging.json = true;
    }
    if cli.no_scheduler {
        config.scheduler.enabled = false;
    }

    // Initialize tracing
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| config.logging.level.clone().into());

    if config.logging.json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        config = ?cli.config,
        scheduler = config.scheduler.enabled,
        "Starting docsealed"
    );

    Server::new(config).run().await
}
