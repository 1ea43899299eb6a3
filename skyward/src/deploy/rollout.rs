//! Bounded wait for a rollout to become ready

use std::time::{Duration, Instant};

use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::deploy::fsm::DeploymentPhase;
use crate::deploy::manager::DeploymentManager;
use crate::errors::OrchestratorError;
use crate::models::deployment::DeploymentStatus;

/// Time source for polling loops
#[async_trait]
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;

    async fn sleep(&self, duration: Duration);
}

/// Wall clock backed by the tokio timer
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioClock;

#[async_trait]
impl Clock for TokioClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Rollout wait settings
#[derive(Debug, Clone)]
pub struct RolloutOptions {
    /// Upper bound on `wait_for_rollout`
    pub timeout: Duration,

    /// Delay between status polls
    pub poll_interval: Duration,
}

impl Default for RolloutOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(300),
            poll_interval: Duration::from_secs(2),
        }
    }
}

fn is_converged(status: &DeploymentStatus) -> bool {
    matches!(status.phase, DeploymentPhase::Running | DeploymentPhase::Stopped)
        && status.replicas.ready >= status.replicas.desired
        && status.replicas.available >= status.replicas.desired
}

impl DeploymentManager {
    /// Poll `get_status` until the deployment's replicas are ready.
    ///
    /// The deadline is checked on every iteration and bounds both the status
    /// read and the sleep between polls, so the call returns
    /// [`OrchestratorError::Timeout`] promptly once `timeout` (or the
    /// configured default) has elapsed, even if the backend hangs.
    pub async fn wait_for_rollout(
        &self,
        deployment_id: &str,
        timeout: Option<Duration>,
    ) -> Result<DeploymentStatus, OrchestratorError> {
        let timeout = timeout.unwrap_or(self.options.rollout.timeout);
        let clock = self.clock.clone();
        let deadline = clock.now() + timeout;
        info!("Waiting up to {:?} for rollout of {}", timeout, deployment_id);

        loop {
            if !self.contains(deployment_id).await {
                return Err(OrchestratorError::NotFound(format!(
                    "Deployment {} not found",
                    deployment_id
                )));
            }

            // A backend that stops answering must not outlive the deadline.
            let remaining = deadline.saturating_duration_since(clock.now());
            let status = tokio::select! {
                biased;
                status = self.get_status(deployment_id) => status,
                _ = clock.sleep(remaining) => {
                    warn!("Status read for {} did not return before the deadline", deployment_id);
                    return Err(OrchestratorError::Timeout(format!(
                        "Rollout timeout: {} not ready after {:?} (status read did not complete)",
                        deployment_id, timeout
                    )));
                }
            };
            if status.phase == DeploymentPhase::Failed {
                return Err(OrchestratorError::ProviderError(format!(
                    "Deployment {} failed during rollout",
                    deployment_id
                )));
            }
            if is_converged(&status) {
                info!("Rollout of {} is ready", deployment_id);
                return Ok(status);
            }

            let now = clock.now();
            if now >= deadline {
                warn!("Rollout of {} timed out after {:?}", deployment_id, timeout);
                return Err(OrchestratorError::Timeout(format!(
                    "Rollout timeout: {} not ready after {:?} ({}/{} replicas ready)",
                    deployment_id, timeout, status.replicas.ready, status.replicas.desired
                )));
            }

            let wait = self.options.rollout.poll_interval.min(deadline - now);
            debug!(
                "Rollout of {}: {}/{} ready, polling again in {:?}",
                deployment_id, status.replicas.ready, status.replicas.desired, wait
            );
            clock.sleep(wait).await;
        }
    }
}
