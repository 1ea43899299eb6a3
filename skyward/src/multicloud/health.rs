//! Provider health tracking
//!
//! Each provider moves between three states:
//!
//! - **Unknown**: never probed; still routable
//! - **Healthy**: the last probe succeeded, or enough successes in a row
//!   have restored it
//! - **Unhealthy**: `failover_threshold` probes failed in a row; removed
//!   from routing until `recovery_threshold` probes succeed in a row

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Unhealthy,
    #[default]
    Unknown,
}

impl std::fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            HealthStatus::Healthy => "healthy",
            HealthStatus::Unhealthy => "unhealthy",
            HealthStatus::Unknown => "unknown",
        };
        f.write_str(name)
    }
}

/// Consecutive-result thresholds gating health transitions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthThresholds {
    pub failover_threshold: u32,
    pub recovery_threshold: u32,
}

impl Default for HealthThresholds {
    fn default() -> Self {
        Self {
            failover_threshold: 3,
            recovery_threshold: 2,
        }
    }
}

/// Health of one provider as seen by the router
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderHealth {
    pub status: HealthStatus,
    pub consecutive_failures: u32,
    pub consecutive_successes: u32,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_checked_at: Option<DateTime<Utc>>,

    /// Error text of the most recent failed probe
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

impl ProviderHealth {
    /// Unhealthy providers are skipped by routing; unknown ones are not
    pub fn is_routable(&self) -> bool {
        self.status != HealthStatus::Unhealthy
    }

    pub fn record_success(&mut self, provider_id: &str, thresholds: &HealthThresholds) {
        self.consecutive_failures = 0;
        self.consecutive_successes = self.consecutive_successes.saturating_add(1);
        self.last_checked_at = Some(Utc::now());
        self.last_error = None;

        match self.status {
            HealthStatus::Unknown => self.status = HealthStatus::Healthy,
            HealthStatus::Unhealthy => {
                if self.consecutive_successes >= thresholds.recovery_threshold.max(1) {
                    info!(
                        "Provider {} recovered after {} successful probes",
                        provider_id, self.consecutive_successes
                    );
                    self.status = HealthStatus::Healthy;
                }
            }
            HealthStatus::Healthy => {}
        }
    }

    pub fn record_failure(&mut self, provider_id: &str, error: &str, thresholds: &HealthThresholds) {
        self.consecutive_successes = 0;
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
        self.last_checked_at = Some(Utc::now());
        self.last_error = Some(error.to_string());

        if self.status != HealthStatus::Unhealthy
            && self.consecutive_failures >= thresholds.failover_threshold.max(1)
        {
            warn!(
                "Provider {} marked unhealthy after {} failed probes: {}",
                provider_id, self.consecutive_failures, error
            );
            self.status = HealthStatus::Unhealthy;
        }
    }
}
