//! Multi-provider routing with automatic failover

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::deploy::manager::DeploymentManager;
use crate::errors::OrchestratorError;
use crate::models::deployment::{DeploymentConfig, DeploymentResult};
use crate::multicloud::health::{HealthStatus, HealthThresholds, ProviderHealth};

/// Routing-table entry for one provider
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderRoute {
    pub provider_id: String,

    /// Relative share of keyed traffic; 0 takes part in failover only
    #[serde(default = "default_weight")]
    pub weight: u32,

    /// Failover order among secondaries, lowest first
    #[serde(default)]
    pub priority: u32,
}

fn default_weight() -> u32 {
    1
}

impl ProviderRoute {
    pub fn new(provider_id: impl Into<String>, weight: u32, priority: u32) -> Self {
        Self {
            provider_id: provider_id.into(),
            weight,
            priority,
        }
    }
}

/// A provider's route together with the manager that serves it
#[derive(Clone)]
pub struct ProviderBinding {
    pub route: ProviderRoute,
    pub manager: Arc<DeploymentManager>,
}

impl ProviderBinding {
    pub fn new(route: ProviderRoute, manager: Arc<DeploymentManager>) -> Self {
        Self { route, manager }
    }
}

/// Orchestrator options
#[derive(Debug, Clone)]
pub struct MultiCloudOptions {
    pub thresholds: HealthThresholds,

    /// Delay between health rounds of the background worker
    pub health_check_interval: Duration,

    /// Upper bound on a single provider probe; exceeding it is a failure
    pub health_check_timeout: Duration,
}

impl Default for MultiCloudOptions {
    fn default() -> Self {
        Self {
            thresholds: HealthThresholds::default(),
            health_check_interval: Duration::from_secs(30),
            health_check_timeout: Duration::from_secs(5),
        }
    }
}

/// Outcome of [`MultiCloudOrchestrator::deploy_function`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoutedDeployment {
    /// Provider that accepted the deployment, if any did
    pub provider_id: Option<String>,

    /// Providers tried, in order
    pub attempted: Vec<String>,

    pub result: DeploymentResult,
}

#[derive(Debug, Clone)]
struct RoutingTable {
    primary: String,
    routes: Vec<ProviderRoute>,
}

impl RoutingTable {
    /// Primary first, then secondaries by ascending priority
    fn ordered(&self) -> Vec<ProviderRoute> {
        let mut secondaries: Vec<ProviderRoute> = self
            .routes
            .iter()
            .filter(|r| r.provider_id != self.primary)
            .cloned()
            .collect();
        secondaries.sort_by_key(|r| r.priority);

        let mut ordered = Vec::with_capacity(self.routes.len());
        if let Some(primary) = self.routes.iter().find(|r| r.provider_id == self.primary) {
            ordered.push(primary.clone());
        }
        ordered.extend(secondaries);
        ordered
    }
}

/// One primary deployment manager plus ordered secondaries
pub struct MultiCloudOrchestrator {
    options: MultiCloudOptions,
    managers: HashMap<String, Arc<DeploymentManager>>,
    table: RwLock<RoutingTable>,
    health: RwLock<HashMap<String, ProviderHealth>>,
}

impl MultiCloudOrchestrator {
    /// Build the orchestrator. Duplicate or empty provider ids are a
    /// configuration error.
    pub fn new(
        primary: ProviderBinding,
        secondaries: Vec<ProviderBinding>,
        options: MultiCloudOptions,
    ) -> Result<Self, OrchestratorError> {
        let primary_id = primary.route.provider_id.clone();
        let mut managers = HashMap::new();
        let mut routes = Vec::new();
        let mut health = HashMap::new();

        for binding in std::iter::once(primary).chain(secondaries) {
            let id = binding.route.provider_id.clone();
            if id.trim().is_empty() {
                return Err(OrchestratorError::ConfigError(
                    "Provider id must not be empty".to_string(),
                ));
            }
            if managers.insert(id.clone(), binding.manager).is_some() {
                return Err(OrchestratorError::ConfigError(format!(
                    "Provider {} is configured more than once",
                    id
                )));
            }
            health.insert(id, ProviderHealth::default());
            routes.push(binding.route);
        }

        info!(
            "Multi-cloud routing over {} providers, primary {}",
            routes.len(),
            primary_id
        );
        Ok(Self {
            options,
            managers,
            table: RwLock::new(RoutingTable {
                primary: primary_id,
                routes,
            }),
            health: RwLock::new(health),
        })
    }

    pub fn options(&self) -> &MultiCloudOptions {
        &self.options
    }

    pub fn manager(&self, provider_id: &str) -> Option<Arc<DeploymentManager>> {
        self.managers.get(provider_id).cloned()
    }

    pub async fn primary(&self) -> String {
        self.table.read().await.primary.clone()
    }

    /// Routes in failover order
    pub async fn routes(&self) -> Vec<ProviderRoute> {
        self.table.read().await.ordered()
    }

    /// Routes in failover order, minus unhealthy providers
    async fn routable(&self) -> Vec<ProviderRoute> {
        let ordered = self.routes().await;
        let health = self.health.read().await;
        ordered
            .into_iter()
            .filter(|r| health.get(&r.provider_id).map_or(true, ProviderHealth::is_routable))
            .collect()
    }

    /// Deploy to the first provider that accepts `config`: the primary, then
    /// secondaries by priority. Unhealthy providers are skipped. When every
    /// attempt fails the last failure is returned.
    pub async fn deploy_function(&self, config: DeploymentConfig) -> RoutedDeployment {
        if let Err(e) = config.validate() {
            return RoutedDeployment {
                provider_id: None,
                attempted: Vec::new(),
                result: DeploymentResult::failed(config.id.clone(), e.to_string()),
            };
        }

        let candidates = self.routable().await;
        if candidates.is_empty() {
            warn!("No healthy providers for {}", config.id);
            return RoutedDeployment {
                provider_id: None,
                attempted: Vec::new(),
                result: DeploymentResult::failed(config.id.clone(), "No healthy providers available"),
            };
        }

        let mut attempted = Vec::with_capacity(candidates.len());
        let mut last_failure = None;
        for route in candidates {
            let Some(manager) = self.managers.get(&route.provider_id) else {
                continue;
            };
            attempted.push(route.provider_id.clone());

            debug!("Deploying {} to {}", config.id, route.provider_id);
            let result = manager.deploy(config.clone()).await;
            if result.success {
                if attempted.len() > 1 {
                    info!(
                        "Deployment {} failed over to {} after {:?}",
                        config.id,
                        route.provider_id,
                        &attempted[..attempted.len() - 1]
                    );
                }
                return RoutedDeployment {
                    provider_id: Some(route.provider_id),
                    attempted,
                    result,
                };
            }

            warn!(
                "Provider {} rejected {}: {}",
                route.provider_id, config.id, result.message
            );
            last_failure = Some(result);
        }

        let result = last_failure.unwrap_or_else(|| {
            DeploymentResult::failed(config.id.clone(), "No healthy providers available")
        });
        RoutedDeployment {
            provider_id: None,
            attempted,
            result,
        }
    }

    /// Promote `provider_id` to primary for subsequent calls. The previous
    /// primary stays configured as a secondary; nothing running is moved.
    pub async fn switch_primary(&self, provider_id: &str) -> Result<(), OrchestratorError> {
        let mut table = self.table.write().await;
        if !table.routes.iter().any(|r| r.provider_id == provider_id) {
            return Err(OrchestratorError::NotFound(format!(
                "Provider {} is not configured",
                provider_id
            )));
        }
        if table.primary != provider_id {
            info!("Switching primary from {} to {}", table.primary, provider_id);
            table.primary = provider_id.to_string();
        }
        Ok(())
    }

    /// Health of every configured provider
    pub async fn get_multi_cloud_status(&self) -> BTreeMap<String, ProviderHealth> {
        let health = self.health.read().await;
        health
            .iter()
            .map(|(id, h)| (id.clone(), h.clone()))
            .collect()
    }

    /// Health status of one provider; unconfigured ids are `Unknown`
    pub async fn provider_status(&self, provider_id: &str) -> HealthStatus {
        let health = self.health.read().await;
        health
            .get(provider_id)
            .map_or(HealthStatus::Unknown, |h| h.status)
    }

    /// Probe every provider once, concurrently, and fold the results into
    /// the health table. Returns the updated table.
    pub async fn check_health(&self) -> BTreeMap<String, ProviderHealth> {
        let timeout = self.options.health_check_timeout;
        let probes = self.managers.iter().map(|(id, manager)| async move {
            let outcome = match tokio::time::timeout(timeout, manager.probe()).await {
                Ok(Ok(())) => Ok(()),
                Ok(Err(e)) => Err(e.to_string()),
                Err(_) => Err(format!("health probe timed out after {:?}", timeout)),
            };
            (id.clone(), outcome)
        });
        let outcomes = join_all(probes).await;

        {
            let mut health = self.health.write().await;
            for (id, outcome) in outcomes {
                let entry = health.entry(id.clone()).or_default();
                match outcome {
                    Ok(()) => entry.record_success(&id, &self.options.thresholds),
                    Err(error) => {
                        debug!("Health probe of {} failed: {}", id, error);
                        entry.record_failure(&id, &error, &self.options.thresholds)
                    }
                }
            }
        }
        self.get_multi_cloud_status().await
    }

    /// Pick a provider for `key` in proportion to route weights, among
    /// routable providers. The same key maps to the same provider while
    /// the routable set is unchanged.
    pub async fn route_for(&self, key: &str) -> Option<String> {
        let routable = self.routable().await;
        let total: u64 = routable.iter().map(|r| u64::from(r.weight)).sum();
        if total == 0 {
            return routable.first().map(|r| r.provider_id.clone());
        }

        let mut slot = key_hash(key) % total;
        for route in &routable {
            let weight = u64::from(route.weight);
            if slot < weight {
                return Some(route.provider_id.clone());
            }
            slot -= weight;
        }
        None
    }

    /// Share of keyed traffic per routable provider, summing to 1
    pub async fn traffic_split(&self) -> BTreeMap<String, f64> {
        let routable = self.routable().await;
        let total: u64 = routable.iter().map(|r| u64::from(r.weight)).sum();
        routable
            .into_iter()
            .filter(|r| r.weight > 0)
            .map(|r| (r.provider_id, r.weight as f64 / total as f64))
            .collect()
    }
}

fn key_hash(key: &str) -> u64 {
    let digest = Sha256::digest(key.as_bytes());
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&digest[..8]);
    u64::from_be_bytes(bytes)
}
