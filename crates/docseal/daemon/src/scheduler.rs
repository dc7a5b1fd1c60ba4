//! Background reconciliation and expiry sweeps

use docseal_service::{DocsealService, SchedulerConfig};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::time::{interval, Duration, MissedTickBehavior};

/// Drives the periodic maintenance of a [`DocsealService`]
pub struct Scheduler {
    config: SchedulerConfig,
    service: DocsealService,
}

impl Scheduler {
    pub fn new(config: SchedulerConfig, service: DocsealService) -> Arc<Self> {
        Arc::new(Self { config, service })
    }

    /// Run until `shutdown` flips to `true` or its sender is dropped.
    pub async fn start(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        let mut reconcile = interval(Duration::from_secs(
            self.config.reconcile_interval_secs.max(1),
        ));
        let mut expiry = interval(Duration::from_secs(
            self.config.expiry_sweep_interval_secs.max(1),
        ));
        reconcile.set_missed_tick_behavior(MissedTickBehavior::Delay);
        expiry.set_missed_tick_behavior(MissedTickBehavior::Delay);

        tracing::info!(
            reconcile_interval_secs = self.config.reconcile_interval_secs,
            expiry_sweep_interval_secs = self.config.expiry_sweep_interval_secs,
            "Scheduler started"
        );

        loop {
            tokio::select! {
                _ = reconcile.tick() => {
                    let report = self.service.reconcile().await;
                    if !report.flagged.is_empty() {
                        tracing::error!(flagged = ?report.flagged, "Reconciliation flagged documents");
                    }
                }
                _ = expiry.tick() => {
                    self.service.sweep_expired().await;
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        tracing::info!("Scheduler stopped");
    }
}
