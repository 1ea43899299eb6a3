//! Health-check worker for multi-cloud routing

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::multicloud::health::HealthStatus;
use crate::multicloud::orchestrator::MultiCloudOrchestrator;

/// Health worker options
#[derive(Debug, Clone)]
pub struct Options {
    /// Delay between probe rounds
    pub interval: Duration,

    /// Delay before the first round
    pub initial_delay: Duration,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(30),
            initial_delay: Duration::ZERO,
        }
    }
}

/// Probe every provider on a fixed interval until `shutdown_signal` fires.
/// Runs beside request handling and never blocks deploys.
pub async fn run<S, F>(
    options: &Options,
    orchestrator: Arc<MultiCloudOrchestrator>,
    sleep_fn: S,
    mut shutdown_signal: Pin<Box<dyn Future<Output = ()> + Send>>,
) where
    S: Fn(Duration) -> F,
    F: Future<Output = ()>,
{
    info!("Health worker starting...");

    tokio::select! {
        _ = &mut shutdown_signal => {
            info!("Health worker shutting down...");
            return;
        }
        _ = sleep_fn(options.initial_delay) => {}
    }

    loop {
        let table = orchestrator.check_health().await;
        let unhealthy: Vec<&String> = table
            .iter()
            .filter(|(_, h)| h.status == HealthStatus::Unhealthy)
            .map(|(id, _)| id)
            .collect();
        if unhealthy.is_empty() {
            debug!("Health round complete: {} providers routable", table.len());
        } else {
            warn!("Unhealthy providers: {:?}", unhealthy);
        }

        tokio::select! {
            _ = &mut shutdown_signal => {
                info!("Health worker shutting down...");
                return;
            }
            _ = sleep_fn(options.interval) => {}
        }
    }
}
