//! Server setup and lifecycle management

use crate::api::{create_router, AppState};
use crate::error::{DaemonError, DaemonResult};
use crate::scheduler::Scheduler;
use docseal_service::{DocsealConfig, DocsealService};
use tokio::net::TcpListener;
use tokio::sync::watch;

/// DocSeal daemon server
pub struct Server {
    config: DocsealConfig,
    service: DocsealService,
}

impl Server {
    /// Create a new server with the given configuration
    pub fn new(config: DocsealConfig) -> Self {
        let service = DocsealService::in_memory(&config.anchoring);
        Self { config, service }
    }

    pub fn service(&self) -> &DocsealService {
        &self.service
    }

    /// Run the server
    pub async fn run(self) -> DaemonResult<()> {
        let addr = self.config.server.listen_addr;
        let app = create_router(AppState::new(self.service.clone()), self.config.server.enable_cors);
        let listener = TcpListener::bind(addr).await?;

        tracing::info!(
            addr = %addr,
            anchor_policy = ?self.service.policy(),
            network = %self.config.anchoring.simulated.network,
            "DocSeal daemon listening"
        );

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let scheduler = if self.config.scheduler.enabled {
            let scheduler = Scheduler::new(self.config.scheduler.clone(), self.service.clone());
            Some(tokio::spawn(scheduler.start(shutdown_rx)))
        } else {
            None
        };

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await
            .map_err(|e| DaemonError::Server(e.to_string()))?;

        tracing::info!("DocSeal daemon shutting down");

        let _ = shutdown_tx.send(true);
        if let Some(handle) = scheduler {
            if let Err(e) = handle.await {
                tracing::warn!(error = %e, "Scheduler task ended abnormally");
            }
        }

        Ok(())
    }
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            tracing::info!("Received terminate signal, initiating graceful shutdown");
        }
    }
}
