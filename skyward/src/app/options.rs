//! Application configuration options

use std::path::PathBuf;
use std::time::Duration;

use crate::deploy::adapter::ProviderKind;
use crate::deploy::manager::ManagerOptions;
use crate::deploy::rollout::RolloutOptions;
use crate::deploy::{docker, kubernetes};
use crate::multicloud::health::HealthThresholds;
use crate::multicloud::orchestrator::{MultiCloudOptions, ProviderRoute};
use crate::storage::settings::{ProviderSettings, Settings};
use crate::workers::health;

/// Main application options
#[derive(Debug, Clone)]
pub struct AppOptions {
    pub lifecycle: LifecycleOptions,

    /// Backends, primary first
    pub providers: Vec<ProviderOptions>,

    pub manager: ManagerOptions,

    pub multicloud: MultiCloudOptions,

    /// Run the background health worker
    pub enable_health_worker: bool,

    pub health_worker: health::Options,

    pub workflows: WorkflowOptions,
}

impl Default for AppOptions {
    fn default() -> Self {
        Self {
            lifecycle: LifecycleOptions::default(),
            providers: vec![ProviderOptions::Docker {
                route: ProviderRoute::new("docker", 1, 0),
                options: docker::Options::default(),
            }],
            manager: ManagerOptions::default(),
            multicloud: MultiCloudOptions::default(),
            enable_health_worker: true,
            health_worker: health::Options::default(),
            workflows: WorkflowOptions::default(),
        }
    }
}

impl AppOptions {
    /// Runtime options for `settings`. The primary provider is moved to the
    /// front; without an explicit primary the first provider is used.
    pub fn from_settings(settings: &Settings) -> Self {
        let mut providers: Vec<&ProviderSettings> = settings.providers.iter().collect();
        if let Some(index) = providers.iter().position(|p| p.primary) {
            let primary = providers.remove(index);
            providers.insert(0, primary);
        }

        let multicloud = MultiCloudOptions {
            thresholds: HealthThresholds {
                failover_threshold: settings.multicloud.failover_threshold,
                recovery_threshold: settings.multicloud.recovery_threshold,
            },
            health_check_interval: Duration::from_secs(settings.multicloud.health_check_interval_secs),
            health_check_timeout: Duration::from_secs(settings.multicloud.health_check_timeout_secs),
        };

        Self {
            lifecycle: LifecycleOptions::default(),
            providers: providers.into_iter().map(ProviderOptions::from_settings).collect(),
            manager: ManagerOptions {
                max_revision_history: settings.max_revision_history,
                rollout: RolloutOptions {
                    timeout: Duration::from_secs(settings.rollout.timeout_secs),
                    poll_interval: Duration::from_secs(settings.rollout.poll_interval_secs),
                },
            },
            health_worker: health::Options {
                interval: multicloud.health_check_interval,
                ..Default::default()
            },
            multicloud,
            enable_health_worker: settings.multicloud.enable_health_worker,
            workflows: WorkflowOptions {
                root_dir: settings.workflows.root_dir.clone(),
                output_dir: settings.workflows.output_dir.clone(),
                secret_names: settings.workflows.secret_names.clone(),
                variables: settings.workflows.variables.clone(),
            },
        }
    }
}

/// One configured backend
#[derive(Debug, Clone)]
pub enum ProviderOptions {
    Docker {
        route: ProviderRoute,
        options: docker::Options,
    },
    Kubernetes {
        route: ProviderRoute,
        options: kubernetes::Options,
    },
}

impl ProviderOptions {
    pub fn route(&self) -> &ProviderRoute {
        match self {
            ProviderOptions::Docker { route, .. } | ProviderOptions::Kubernetes { route, .. } => route,
        }
    }

    fn from_settings(settings: &ProviderSettings) -> Self {
        let route = ProviderRoute::new(settings.id.clone(), settings.weight, settings.priority);
        match settings.kind {
            ProviderKind::Kubernetes => {
                let defaults = kubernetes::Options::default();
                ProviderOptions::Kubernetes {
                    route,
                    options: kubernetes::Options {
                        provider_id: settings.id.clone(),
                        binary: settings.binary.clone().unwrap_or(defaults.binary),
                        namespace: settings.namespace.clone().unwrap_or(defaults.namespace),
                        context: settings.context.clone(),
                    },
                }
            }
            // Settings validation rejects the kinds without a CLI adapter.
            _ => {
                let defaults = docker::Options::default();
                ProviderOptions::Docker {
                    route,
                    options: docker::Options {
                        provider_id: settings.id.clone(),
                        binary: settings.binary.clone().unwrap_or(defaults.binary),
                        ..defaults
                    },
                }
            }
        }
    }
}

/// Lifecycle options
#[derive(Debug, Clone)]
pub struct LifecycleOptions {
    /// Maximum delay for graceful shutdown
    pub max_shutdown_delay: Duration,
}

impl Default for LifecycleOptions {
    fn default() -> Self {
        Self {
            max_shutdown_delay: Duration::from_secs(30),
        }
    }
}

/// Workflow generation options
#[derive(Debug, Clone)]
pub struct WorkflowOptions {
    pub root_dir: PathBuf,
    pub output_dir: String,
    pub secret_names: Vec<String>,
    pub variables: std::collections::BTreeMap<String, String>,
}

impl Default for WorkflowOptions {
    fn default() -> Self {
        Self {
            root_dir: PathBuf::from("."),
            output_dir: ".github/workflows".to_string(),
            secret_names: Vec::new(),
            variables: Default::default(),
        }
    }
}
