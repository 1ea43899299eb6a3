//! Main application run loop

use std::future::Future;
use std::sync::Arc;

use secrecy::SecretString;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::app::options::{AppOptions, LifecycleOptions, ProviderOptions, WorkflowOptions};
use crate::coordinator::{FsArtifactStore, MultiWorkflowCoordinator, TemplateCatalog};
use crate::deploy::adapter::ProviderAdapter;
use crate::deploy::docker::DockerAdapter;
use crate::deploy::events::LifecycleEvent;
use crate::deploy::kubernetes::KubernetesAdapter;
use crate::deploy::manager::{DeploymentManager, ManagerOptions};
use crate::errors::OrchestratorError;
use crate::models::workflow::SharedConfig;
use crate::multicloud::health::ProviderHealth;
use crate::multicloud::orchestrator::{MultiCloudOrchestrator, ProviderBinding};
use crate::workers::health;

/// Run skyward as a long-lived process: providers are health-checked in
/// the background until `shutdown_signal` resolves.
pub async fn run(
    version: String,
    options: AppOptions,
    shutdown_signal: impl Future<Output = ()> + Send + 'static,
) -> Result<(), OrchestratorError> {
    info!("Initializing skyward {}...", version);

    let (shutdown_tx, _shutdown_rx): (broadcast::Sender<()>, _) = broadcast::channel(1);
    let mut shutdown_manager = ShutdownManager::new(shutdown_tx.clone(), options.lifecycle.clone());

    if let Err(e) = init(&options, &shutdown_tx, &mut shutdown_manager).await {
        error!("Failed to start skyward: {}", e);
        shutdown_manager.shutdown().await?;
        return Err(e);
    }

    shutdown_signal.await;
    info!("Shutdown signal received, shutting down...");

    drop(shutdown_tx);
    shutdown_manager.shutdown().await
}

/// Probe every configured provider once and return the health table
pub async fn run_diagnostic(
    options: &AppOptions,
) -> Result<std::collections::BTreeMap<String, ProviderHealth>, OrchestratorError> {
    let orchestrator = build_orchestrator(options)?;
    Ok(orchestrator.check_health().await)
}

// =============================== INITIALIZATION ================================== //

async fn init(
    options: &AppOptions,
    shutdown_tx: &broadcast::Sender<()>,
    shutdown_manager: &mut ShutdownManager,
) -> Result<Arc<MultiCloudOrchestrator>, OrchestratorError> {
    let orchestrator = Arc::new(build_orchestrator(options)?);

    if options.enable_health_worker {
        init_health_worker(
            options.health_worker.clone(),
            orchestrator.clone(),
            shutdown_manager,
            shutdown_tx.subscribe(),
        )?;
    }

    Ok(orchestrator)
}

fn init_health_worker(
    options: health::Options,
    orchestrator: Arc<MultiCloudOrchestrator>,
    shutdown_manager: &mut ShutdownManager,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), OrchestratorError> {
    info!("Initializing health worker...");

    let health_handle = tokio::spawn(async move {
        health::run(
            &options,
            orchestrator,
            tokio::time::sleep,
            Box::pin(async move {
                let _ = shutdown_rx.recv().await;
            }),
        )
        .await;
    });

    shutdown_manager.with_health_worker_handle(health_handle)
}

pub fn build_adapter(provider: &ProviderOptions) -> Arc<dyn ProviderAdapter> {
    match provider {
        ProviderOptions::Docker { options, .. } => Arc::new(DockerAdapter::new(options.clone())),
        ProviderOptions::Kubernetes { options, .. } => {
            Arc::new(KubernetesAdapter::new(options.clone()))
        }
    }
}

/// A manager for `adapter` whose lifecycle events are logged
pub fn build_manager(adapter: Arc<dyn ProviderAdapter>, options: ManagerOptions) -> DeploymentManager {
    let manager = DeploymentManager::new(adapter, options);
    let provider_id = manager.provider_id().to_string();
    manager.subscribe(move |event| match event {
        LifecycleEvent::DeploymentStarted { deployment_id, operation } => {
            info!("[{}] {:?} of {} started", provider_id, operation, deployment_id)
        }
        LifecycleEvent::DeploymentCompleted { deployment_id, operation, result } => {
            info!(
                "[{}] {:?} of {} completed: {}",
                provider_id, operation, deployment_id, result.message
            )
        }
        LifecycleEvent::DeploymentFailed { deployment_id, operation, error } => {
            warn!("[{}] {:?} of {} failed: {}", provider_id, operation, deployment_id, error)
        }
    });
    manager
}

/// Orchestrator over every configured provider; the first one is primary
pub fn build_orchestrator(options: &AppOptions) -> Result<MultiCloudOrchestrator, OrchestratorError> {
    let mut bindings = options.providers.iter().map(|provider| {
        let manager = build_manager(build_adapter(provider), options.manager.clone());
        ProviderBinding::new(provider.route().clone(), Arc::new(manager))
    });

    let primary = bindings.next().ok_or_else(|| {
        OrchestratorError::ConfigError("At least one provider must be configured".to_string())
    })?;
    MultiCloudOrchestrator::new(primary, bindings.collect(), options.multicloud.clone())
}

pub fn build_coordinator(options: &WorkflowOptions) -> MultiWorkflowCoordinator {
    MultiWorkflowCoordinator::new(
        TemplateCatalog::builtin(),
        Arc::new(FsArtifactStore::new(options.root_dir.clone())),
    )
}

/// Shared workflow config for `project`. Secret values come from the
/// environment; names without a value are skipped with a warning.
pub fn shared_config(options: &WorkflowOptions, project: &str, frameworks: &[String]) -> SharedConfig {
    let mut shared = SharedConfig::new(project);
    shared.output_dir = options.output_dir.clone();
    shared.frameworks = frameworks.to_vec();
    shared.variables = options.variables.clone();

    for name in &options.secret_names {
        match std::env::var(name) {
            Ok(value) => {
                shared.secrets.insert(name.clone(), SecretString::from(value));
            }
            Err(_) => warn!("Secret {} is not set in the environment", name),
        }
    }
    shared
}

// ================================= SHUTDOWN ===================================== //

struct ShutdownManager {
    shutdown_tx: broadcast::Sender<()>,
    lifecycle_options: LifecycleOptions,
    health_worker_handle: Option<JoinHandle<()>>,
}

impl ShutdownManager {
    pub fn new(shutdown_tx: broadcast::Sender<()>, lifecycle_options: LifecycleOptions) -> Self {
        Self {
            shutdown_tx,
            lifecycle_options,
            health_worker_handle: None,
        }
    }

    pub fn with_health_worker_handle(&mut self, handle: JoinHandle<()>) -> Result<(), OrchestratorError> {
        if self.health_worker_handle.is_some() {
            return Err(OrchestratorError::Internal(
                "health_worker_handle already set".to_string(),
            ));
        }
        self.health_worker_handle = Some(handle);
        Ok(())
    }

    pub async fn shutdown(&mut self) -> Result<(), OrchestratorError> {
        let _ = self.shutdown_tx.send(());

        match tokio::time::timeout(
            self.lifecycle_options.max_shutdown_delay,
            self.shutdown_impl(),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => {
                error!(
                    "Shutdown timed out after {:?}, forcing shutdown...",
                    self.lifecycle_options.max_shutdown_delay
                );
                std::process::exit(1);
            }
        }
    }

    async fn shutdown_impl(&mut self) -> Result<(), OrchestratorError> {
        info!("Shutting down skyward...");

        if let Some(handle) = self.health_worker_handle.take() {
            handle
                .await
                .map_err(|e| OrchestratorError::Internal(e.to_string()))?;
        }

        info!("Shutdown complete");
        Ok(())
    }
}
