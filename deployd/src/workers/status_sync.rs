//! Periodic deployment status reconciliation

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use tracing::{debug, error, info};

use crate::sync::syncer::StatusSynchronizer;

/// Status sync worker options
#[derive(Debug, Clone)]
pub struct Options {
    /// Time between sweeps
    pub interval: Duration,

    /// Delay before the first sweep
    pub initial_delay: Duration,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(30),
            initial_delay: Duration::from_secs(5),
        }
    }
}

/// Run the status sync worker until `shutdown_signal` resolves
pub async fn run<S, F>(
    options: &Options,
    syncer: &StatusSynchronizer,
    sleep_fn: S,
    mut shutdown_signal: Pin<Box<dyn Future<Output = ()> + Send>>,
) where
    S: Fn(Duration) -> F,
    F: Future<Output = ()>,
{
    info!("Status sync worker starting...");

    tokio::select! {
        _ = &mut shutdown_signal => {
            info!("Status sync worker shutting down...");
            return;
        }
        _ = sleep_fn(options.initial_delay) => {}
    }

    loop {
        match syncer.sync_job_statuses().await {
            Ok(report) => {
                if report.succeeded + report.failed + report.errors > 0 {
                    info!(
                        "Synced {} deployment(s): {} succeeded, {} failed, {} errors",
                        report.checked, report.succeeded, report.failed, report.errors
                    );
                } else {
                    debug!("Synced {} deployment(s), nothing changed", report.checked);
                }
            }
            Err(e) => {
                error!("Status sync failed: {}", e);
            }
        }

        tokio::select! {
            _ = &mut shutdown_signal => {
                info!("Status sync worker shutting down...");
                return;
            }
            _ = sleep_fn(options.interval) => {}
        }
    }
}
