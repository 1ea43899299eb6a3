//! Deployment manager
//!
//! Drives one [`ProviderAdapter`] and owns the registry of deployments it
//! created. Every mutating operation returns a [`DeploymentResult`]; provider
//! errors are caught here and never escape to the caller.
//!
//! The registry lock is never held across a provider call, so operations on
//! different deployment ids interleave freely. Callers must not issue
//! overlapping mutating calls for the same id; nothing here serializes them.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};

use crate::deploy::adapter::{
    Capabilities, InstanceHandle, InstancePatch, InstanceSpec, ProviderAdapter,
};
use crate::deploy::events::{LifecycleEvent, ListenerId, Listeners, Operation};
use crate::deploy::fsm::{DeploymentFsm, DeploymentPhase, PhaseEvent};
use crate::deploy::rollout::{Clock, RolloutOptions, TokioClock};
use crate::deploy::stats;
use crate::errors::OrchestratorError;
use crate::models::deployment::{
    Condition, ContainerStats, Deployment, DeploymentConfig, DeploymentPatch, DeploymentResult,
    DeploymentStatus, DeploymentStrategy, LogQuery, Replicas, Revision, RollbackInfo, RollbackStrategy,
};

/// Manager options
#[derive(Debug, Clone)]
pub struct ManagerOptions {
    /// Revisions kept per deployment; the oldest are dropped first
    pub max_revision_history: usize,

    pub rollout: RolloutOptions,
}

impl Default for ManagerOptions {
    fn default() -> Self {
        Self {
            max_revision_history: 10,
            rollout: RolloutOptions::default(),
        }
    }
}

/// Registry entry: the public snapshot plus the state machine behind it
#[derive(Debug, Clone)]
struct Entry {
    deployment: Deployment,
    fsm: DeploymentFsm,
    next_revision: u64,
}

impl Entry {
    fn transition(&mut self, event: PhaseEvent) -> Result<(), OrchestratorError> {
        self.fsm
            .process(event)
            .map_err(OrchestratorError::TransitionError)?;
        self.deployment.phase = self.fsm.phase();
        Ok(())
    }

    fn push_revision(&mut self, config: DeploymentConfig, max_history: usize) -> u64 {
        let revision_number = self.next_revision;
        self.next_revision += 1;
        self.deployment.revision_history.push(Revision {
            revision_number,
            config,
            applied_at: Utc::now(),
        });
        let history = &mut self.deployment.revision_history;
        if history.len() > max_history.max(1) {
            let excess = history.len() - max_history.max(1);
            history.drain(..excess);
        }
        revision_number
    }
}

/// Why an apply failed, and whether the old instance is already gone
struct ApplyFailure {
    error: OrchestratorError,
    destructive: bool,
}

impl ApplyFailure {
    fn before_teardown(error: OrchestratorError) -> Self {
        Self {
            error,
            destructive: false,
        }
    }

    fn after_teardown(error: OrchestratorError) -> Self {
        Self {
            error,
            destructive: true,
        }
    }
}

/// How to move a live deployment onto a new config
enum ApplyMode {
    /// In-place patch of the existing instance
    Patch,
    /// Stop, remove, create, start
    Recreate,
}

/// Per-provider deployment orchestration
pub struct DeploymentManager {
    adapter: Arc<dyn ProviderAdapter>,
    pub(crate) options: ManagerOptions,
    pub(crate) clock: Arc<dyn Clock>,
    registry: RwLock<HashMap<String, Entry>>,
    listeners: Listeners,
}

impl DeploymentManager {
    /// Create a new manager over `adapter`
    pub fn new(adapter: Arc<dyn ProviderAdapter>, options: ManagerOptions) -> Self {
        Self {
            adapter,
            options,
            clock: Arc::new(TokioClock),
            registry: RwLock::new(HashMap::new()),
            listeners: Listeners::new(),
        }
    }

    /// Replace the time source used by `wait_for_rollout`
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn provider_id(&self) -> &str {
        self.adapter.provider_id()
    }

    pub fn capabilities(&self) -> Capabilities {
        self.adapter.capabilities()
    }

    /// Register a lifecycle listener for this manager
    pub fn subscribe<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(&LifecycleEvent) + Send + Sync + 'static,
    {
        self.listeners.subscribe(listener)
    }

    pub fn unsubscribe(&self, id: ListenerId) -> bool {
        self.listeners.unsubscribe(id)
    }

    /// Snapshot of one deployment
    pub async fn get(&self, deployment_id: &str) -> Option<Deployment> {
        let registry = self.registry.read().await;
        registry.get(deployment_id).map(|e| e.deployment.clone())
    }

    /// Snapshot of every deployment, ordered by id
    pub async fn list(&self) -> Vec<Deployment> {
        let registry = self.registry.read().await;
        let mut deployments: Vec<Deployment> =
            registry.values().map(|e| e.deployment.clone()).collect();
        deployments.sort_by(|a, b| a.config.id.cmp(&b.config.id));
        deployments
    }

    pub async fn contains(&self, deployment_id: &str) -> bool {
        self.registry.read().await.contains_key(deployment_id)
    }

    /// Liveness of the backend itself
    pub async fn probe(&self) -> Result<(), OrchestratorError> {
        self.adapter.health_probe().await
    }

    async fn entry(&self, deployment_id: &str) -> Option<Entry> {
        self.registry.read().await.get(deployment_id).cloned()
    }

    fn not_found(deployment_id: &str) -> DeploymentResult {
        DeploymentResult::failed(
            deployment_id,
            format!("Deployment {} not found", deployment_id),
        )
    }

    /// Instances to run for `config` on this backend
    fn instance_replicas(&self, config: &DeploymentConfig) -> u32 {
        if self.capabilities().native_replicas {
            config.scaling.min_replicas
        } else {
            1
        }
    }

    /// Rejection message when `config` asks for more instances than the
    /// backend can run
    fn unsupported_replicas(&self, config: &DeploymentConfig) -> Option<String> {
        if self.capabilities().native_replicas || config.scaling.min_replicas <= 1 {
            return None;
        }
        Some(format!(
            "Deployment requests {} replicas; multi-replica support requires a clustered backend ({} runs a single instance)",
            config.scaling.min_replicas,
            self.provider_id()
        ))
    }

    /// Build the image when the config carries build instructions,
    /// otherwise resolve the configured reference
    async fn resolve_image(&self, config: &DeploymentConfig) -> Result<String, OrchestratorError> {
        let Some(build) = &config.build else {
            return Ok(config.image_ref());
        };

        let mut build = build.clone();
        if build.tag.is_none() {
            let version = if config.version.is_empty() {
                "latest"
            } else {
                config.version.as_str()
            };
            build.tag = Some(format!("{}:{}", config.name, version));
        }
        debug!("Building artifact for {}", config.id);
        self.adapter.build_artifact(&build).await
    }

    /// Create and start an instance. A created instance whose start fails is
    /// removed again so no half-made resource is left behind.
    async fn materialize(&self, spec: &InstanceSpec) -> Result<InstanceHandle, OrchestratorError> {
        let handle = self.adapter.create_instance(spec).await?;
        if let Err(e) = self.adapter.start(&handle).await {
            if let Err(cleanup) = self.adapter.remove(&handle).await {
                warn!("Failed to clean up instance {}: {}", handle, cleanup);
            }
            return Err(e);
        }
        Ok(handle)
    }

    /// Move the deployment in `entry` onto `config`
    async fn apply(
        &self,
        entry: &Entry,
        config: &DeploymentConfig,
        image: String,
        mode: ApplyMode,
    ) -> Result<InstanceHandle, ApplyFailure> {
        let replicas = if self.capabilities().native_replicas {
            entry.deployment.replicas.desired
        } else {
            1
        };
        let spec = InstanceSpec::from_config(config, image, replicas);

        match (mode, &entry.deployment.instance) {
            (ApplyMode::Patch, Some(handle)) => {
                debug!("Patching {} in place", handle);
                self.adapter
                    .patch(handle, &InstancePatch::from_spec(&spec))
                    .await
                    .map_err(ApplyFailure::before_teardown)?;
                Ok(handle.clone())
            }
            (_, existing) => {
                if let Some(handle) = existing {
                    debug!("Recreating {}", handle);
                    self.adapter
                        .stop(handle)
                        .await
                        .map_err(ApplyFailure::before_teardown)?;
                    self.adapter
                        .remove(handle)
                        .await
                        .map_err(ApplyFailure::after_teardown)?;
                }
                self.materialize(&spec)
                    .await
                    .map_err(ApplyFailure::after_teardown)
            }
        }
    }

    // ================================ DEPLOY ================================ //

    /// Validate `config` and create it on the backend
    pub async fn deploy(&self, config: DeploymentConfig) -> DeploymentResult {
        let deployment_id = config.id.clone();

        if let Err(e) = config.validate() {
            warn!("Rejected deployment {:?}: {}", deployment_id, e);
            return DeploymentResult::failed(deployment_id, e.to_string());
        }

        let capabilities = self.capabilities();
        if let Some(message) = self.unsupported_replicas(&config) {
            return DeploymentResult::failed(deployment_id, message);
        }
        if config.build.is_some() && !capabilities.build {
            return DeploymentResult::failed(
                deployment_id,
                format!("{} does not support artifact builds", self.provider_id()),
            );
        }
        if self.contains(&deployment_id).await {
            return DeploymentResult::failed(
                deployment_id.clone(),
                format!("Deployment {} already exists; use update instead", deployment_id),
            );
        }

        info!("Deploying {} ({}) to {}", deployment_id, config.name, self.provider_id());
        self.listeners.emit(LifecycleEvent::DeploymentStarted {
            deployment_id: deployment_id.clone(),
            operation: Operation::Deploy,
        });

        let created = async {
            let image = self.resolve_image(&config).await?;
            let spec = InstanceSpec::from_config(&config, image.clone(), self.instance_replicas(&config));
            let handle = self.materialize(&spec).await?;
            Ok::<_, OrchestratorError>((handle, image))
        }
        .await;

        let (handle, image) = match created {
            Ok(created) => created,
            Err(e) => {
                error!("Deployment {} failed: {}", deployment_id, e);
                self.listeners.emit(LifecycleEvent::DeploymentFailed {
                    deployment_id: deployment_id.clone(),
                    operation: Operation::Deploy,
                    error: e.to_string(),
                });
                return DeploymentResult::failed(deployment_id, format!("Deployment failed: {}", e));
            }
        };

        // Record the image that actually runs so rollbacks never rebuild.
        let mut applied = config;
        if applied.build.is_some() {
            applied.image = image;
        }

        let now = Utc::now();
        let desired = applied.scaling.min_replicas;
        let mut entry = Entry {
            deployment: Deployment {
                config: applied.clone(),
                replicas: Replicas {
                    desired,
                    ready: 0,
                    available: 0,
                },
                phase: DeploymentPhase::Pending,
                revision_history: Vec::new(),
                instance: Some(handle),
                created_at: now,
                last_updated_at: now,
            },
            fsm: DeploymentFsm::new(),
            next_revision: 1,
        };
        entry.push_revision(applied, self.options.max_revision_history);
        if let Err(e) = entry.transition(PhaseEvent::Created) {
            return DeploymentResult::failed(deployment_id, e.to_string());
        }

        self.registry
            .write()
            .await
            .insert(deployment_id.clone(), entry);

        let result = DeploymentResult::ok(
            deployment_id.clone(),
            format!("Deployment {} created on {}", deployment_id, self.provider_id()),
        );
        info!("Deployment {} is running", deployment_id);
        self.listeners.emit(LifecycleEvent::DeploymentCompleted {
            deployment_id,
            operation: Operation::Deploy,
            result: result.clone(),
        });
        result
    }

    // ================================ UPDATE ================================ //

    /// Merge `patch` onto the stored config and apply it.
    ///
    /// On failure the stored config and revision history are untouched.
    pub async fn update(&self, deployment_id: &str, patch: DeploymentPatch) -> DeploymentResult {
        let Some(entry) = self.entry(deployment_id).await else {
            return Self::not_found(deployment_id);
        };
        if !entry.fsm.can_mutate() {
            return DeploymentResult::failed(
                deployment_id,
                format!(
                    "Cannot update deployment {} while {}",
                    deployment_id,
                    entry.fsm.phase()
                ),
            );
        }

        let merged = patch.merge_onto(&entry.deployment.config);
        if let Err(e) = merged.validate() {
            return DeploymentResult::failed(deployment_id, e.to_string());
        }
        if let Some(message) = self.unsupported_replicas(&merged) {
            return DeploymentResult::failed(deployment_id, message);
        }
        if patch.build.is_some() && !self.capabilities().build {
            return DeploymentResult::failed(
                deployment_id,
                format!("{} does not support artifact builds", self.provider_id()),
            );
        }

        let mode = match merged.strategy {
            DeploymentStrategy::RollingUpdate if self.capabilities().in_place_patch => {
                ApplyMode::Patch
            }
            _ => ApplyMode::Recreate,
        };

        info!("Updating {} on {}", deployment_id, self.provider_id());
        if let Err(e) = self.transition(deployment_id, PhaseEvent::Update).await {
            return DeploymentResult::failed(deployment_id, e.to_string());
        }
        self.listeners.emit(LifecycleEvent::DeploymentStarted {
            deployment_id: deployment_id.to_string(),
            operation: Operation::Update,
        });

        // A build only runs when this patch asks for one; otherwise the
        // stored image (possibly a previous build's tag) is reused.
        let image = if patch.build.is_some() {
            self.resolve_image(&merged).await
        } else {
            let mut reuse = merged.clone();
            reuse.build = None;
            Ok(reuse.image_ref())
        };

        let outcome = match image {
            Ok(image) => self
                .apply(&entry, &merged, image.clone(), mode)
                .await
                .map(|handle| (handle, image)),
            Err(e) => Err(ApplyFailure::before_teardown(e)),
        };

        match outcome {
            Ok((handle, image)) => {
                let mut applied = merged;
                if patch.build.is_some() {
                    applied.image = image;
                }
                self.commit(deployment_id, applied, handle, PhaseEvent::UpdateSucceeded)
                    .await;
                let result = DeploymentResult::ok(
                    deployment_id,
                    format!("Deployment {} updated", deployment_id),
                );
                self.listeners.emit(LifecycleEvent::DeploymentCompleted {
                    deployment_id: deployment_id.to_string(),
                    operation: Operation::Update,
                    result: result.clone(),
                });
                result
            }
            Err(failure) => {
                let message = format!("Update failed: {}", failure.error);
                self.fail(deployment_id, Operation::Update, &failure, &message).await;
                DeploymentResult::failed(deployment_id, message)
            }
        }
    }

    // =============================== ROLLBACK =============================== //

    /// Restore a previous revision's config.
    ///
    /// Without `target_version` the revision before the current one is used;
    /// otherwise the newest revision with that version. The restore itself is
    /// recorded as a new revision.
    pub async fn rollback(&self, deployment_id: &str, target_version: Option<&str>) -> DeploymentResult {
        let Some(entry) = self.entry(deployment_id).await else {
            return Self::not_found(deployment_id);
        };
        if !entry.fsm.can_mutate() {
            return DeploymentResult::failed(
                deployment_id,
                format!(
                    "Cannot roll back deployment {} while {}",
                    deployment_id,
                    entry.fsm.phase()
                ),
            );
        }

        let history = &entry.deployment.revision_history;
        let target = match target_version {
            Some(version) => history.iter().rev().find(|r| r.config.version == version),
            None => history.len().checked_sub(2).and_then(|i| history.get(i)),
        };
        let Some(target) = target.cloned() else {
            let message = match target_version {
                Some(version) => format!(
                    "Rollback failed: version {} not found in revision history of {}",
                    version, deployment_id
                ),
                None => format!(
                    "Rollback failed: no previous revision found for {}",
                    deployment_id
                ),
            };
            return DeploymentResult::failed(deployment_id, message);
        };

        if let Some(message) = self.unsupported_replicas(&target.config) {
            return DeploymentResult::failed(deployment_id, format!("Rollback failed: {}", message));
        }

        let previous_version = entry.deployment.config.version.clone();
        let capabilities = self.capabilities();
        let (strategy, mode) = if capabilities.staged_rollout && capabilities.in_place_patch {
            (RollbackStrategy::Gradual, ApplyMode::Patch)
        } else {
            (RollbackStrategy::Immediate, ApplyMode::Recreate)
        };

        info!(
            "Rolling back {} from {:?} to revision {} ({:?})",
            deployment_id, previous_version, target.revision_number, target.config.version
        );
        if let Err(e) = self.transition(deployment_id, PhaseEvent::Rollback).await {
            return DeploymentResult::failed(deployment_id, e.to_string());
        }
        self.listeners.emit(LifecycleEvent::DeploymentStarted {
            deployment_id: deployment_id.to_string(),
            operation: Operation::Rollback,
        });

        let mut restored = target.config.clone();
        restored.build = None;
        let image = restored.image_ref();

        match self.apply(&entry, &restored, image, mode).await {
            Ok(handle) => {
                let mut applied = target.config;
                applied.id = deployment_id.to_string();
                self.commit(deployment_id, applied, handle, PhaseEvent::RollbackSucceeded)
                    .await;
                let mut result = DeploymentResult::ok(
                    deployment_id,
                    format!(
                        "Rolled back {} to revision {} (version {})",
                        deployment_id, target.revision_number, target_version_label(&restored.version)
                    ),
                );
                result.rollback_info = Some(RollbackInfo {
                    previous_version,
                    rollback_strategy: strategy,
                    target_revision: target.revision_number,
                });
                self.listeners.emit(LifecycleEvent::DeploymentCompleted {
                    deployment_id: deployment_id.to_string(),
                    operation: Operation::Rollback,
                    result: result.clone(),
                });
                result
            }
            Err(failure) => {
                let message = format!("Rollback failed: {}", failure.error);
                self.fail(deployment_id, Operation::Rollback, &failure, &message).await;
                DeploymentResult::failed(deployment_id, message)
            }
        }
    }

    async fn transition(&self, deployment_id: &str, event: PhaseEvent) -> Result<(), OrchestratorError> {
        let mut registry = self.registry.write().await;
        let entry = registry
            .get_mut(deployment_id)
            .ok_or_else(|| OrchestratorError::NotFound(deployment_id.to_string()))?;
        entry.transition(event)
    }

    /// Record a successful update or rollback
    async fn commit(
        &self,
        deployment_id: &str,
        config: DeploymentConfig,
        handle: InstanceHandle,
        event: PhaseEvent,
    ) {
        let mut registry = self.registry.write().await;
        let Some(entry) = registry.get_mut(deployment_id) else {
            warn!("Deployment {} vanished while being changed", deployment_id);
            return;
        };
        entry.deployment.config = config.clone();
        entry.deployment.instance = Some(handle);
        entry.deployment.last_updated_at = Utc::now();
        entry.push_revision(config, self.options.max_revision_history);
        if let Err(e) = entry.transition(event) {
            error!("Deployment {}: {}", deployment_id, e);
        }
    }

    /// Record a failed update or rollback. Config, replicas and history stay
    /// as they were; the phase reports whether the old instance survived.
    async fn fail(&self, deployment_id: &str, operation: Operation, failure: &ApplyFailure, message: &str) {
        error!("Deployment {}: {}", deployment_id, message);
        {
            let mut registry = self.registry.write().await;
            if let Some(entry) = registry.get_mut(deployment_id) {
                let event = if failure.destructive {
                    entry.deployment.instance = None;
                    PhaseEvent::Fail(failure.error.to_string())
                } else {
                    PhaseEvent::Abort
                };
                if let Err(e) = entry.transition(event) {
                    error!("Deployment {}: {}", deployment_id, e);
                }
            }
        }
        self.listeners.emit(LifecycleEvent::DeploymentFailed {
            deployment_id: deployment_id.to_string(),
            operation,
            error: message.to_string(),
        });
    }

    // ================================ SCALE ================================= //

    /// Change the replica count.
    ///
    /// Backends without native replica control run one instance: 0 stops and
    /// removes it, 1 brings it back, anything larger is rejected.
    pub async fn scale(&self, deployment_id: &str, replicas: u32) -> DeploymentResult {
        let Some(entry) = self.entry(deployment_id).await else {
            return Self::not_found(deployment_id);
        };

        if self.capabilities().native_replicas {
            self.scale_native(deployment_id, &entry, replicas).await
        } else {
            self.scale_single(deployment_id, &entry, replicas).await
        }
    }

    async fn scale_native(&self, deployment_id: &str, entry: &Entry, replicas: u32) -> DeploymentResult {
        let (DeploymentPhase::Running, Some(handle)) = (entry.fsm.phase(), &entry.deployment.instance) else {
            return DeploymentResult::failed(
                deployment_id,
                format!("Cannot scale deployment {} while {}", deployment_id, entry.fsm.phase()),
            );
        };

        info!("Scaling {} to {} replicas", deployment_id, replicas);
        if let Err(e) = self.adapter.patch(handle, &InstancePatch::replicas(replicas)).await {
            error!("Scaling {} failed: {}", deployment_id, e);
            return DeploymentResult::failed(deployment_id, format!("Scale failed: {}", e));
        }

        let mut registry = self.registry.write().await;
        if let Some(entry) = registry.get_mut(deployment_id) {
            entry.deployment.replicas.desired = replicas;
            entry.deployment.last_updated_at = Utc::now();
        }
        DeploymentResult::ok(
            deployment_id,
            format!("Scaled {} to {} replicas", deployment_id, replicas),
        )
    }

    async fn scale_single(&self, deployment_id: &str, entry: &Entry, replicas: u32) -> DeploymentResult {
        let phase = entry.fsm.phase();
        match (replicas, phase) {
            (n, _) if n > 1 => DeploymentResult::failed(
                deployment_id,
                format!(
                    "Cannot scale {} to {} replicas: multi-replica support requires a clustered backend ({} runs a single instance)",
                    deployment_id,
                    n,
                    self.provider_id()
                ),
            ),
            (0, DeploymentPhase::Stopped) | (1, DeploymentPhase::Running) => DeploymentResult::ok(
                deployment_id,
                format!("Deployment {} already at {} replicas", deployment_id, replicas),
            ),
            (0, DeploymentPhase::Running) => {
                info!("Scaling {} to zero", deployment_id);
                if let Some(handle) = &entry.deployment.instance {
                    if let Err(e) = self.adapter.stop(handle).await {
                        return DeploymentResult::failed(deployment_id, format!("Scale failed: {}", e));
                    }
                    if let Err(e) = self.adapter.remove(handle).await {
                        // Stopped but not removed; keep the handle so scaling up
                        // can clear it first.
                        self.set_stopped(deployment_id, Some(handle.clone())).await;
                        return DeploymentResult::failed(deployment_id, format!("Scale failed: {}", e));
                    }
                }
                self.set_stopped(deployment_id, None).await;
                DeploymentResult::ok(deployment_id, format!("Scaled {} to 0 replicas", deployment_id))
            }
            (1, DeploymentPhase::Stopped) => {
                info!("Scaling {} back to one instance", deployment_id);
                if let Some(stale) = &entry.deployment.instance {
                    if let Err(e) = self.adapter.remove(stale).await {
                        warn!("Failed to remove stale instance {}: {}", stale, e);
                    }
                }
                let config = &entry.deployment.config;
                let spec = InstanceSpec::from_config(config, config.image_ref(), 1);
                match self.materialize(&spec).await {
                    Ok(handle) => {
                        let mut registry = self.registry.write().await;
                        if let Some(entry) = registry.get_mut(deployment_id) {
                            entry.deployment.instance = Some(handle);
                            entry.deployment.replicas.desired = 1;
                            entry.deployment.last_updated_at = Utc::now();
                            if let Err(e) = entry.transition(PhaseEvent::Start) {
                                error!("Deployment {}: {}", deployment_id, e);
                            }
                        }
                        DeploymentResult::ok(deployment_id, format!("Scaled {} to 1 replica", deployment_id))
                    }
                    Err(e) => DeploymentResult::failed(deployment_id, format!("Scale failed: {}", e)),
                }
            }
            (_, phase) => DeploymentResult::failed(
                deployment_id,
                format!("Cannot scale deployment {} while {}", deployment_id, phase),
            ),
        }
    }

    async fn set_stopped(&self, deployment_id: &str, handle: Option<InstanceHandle>) {
        let mut registry = self.registry.write().await;
        if let Some(entry) = registry.get_mut(deployment_id) {
            entry.deployment.instance = handle;
            entry.deployment.replicas = Replicas::default();
            entry.deployment.last_updated_at = Utc::now();
            if let Err(e) = entry.transition(PhaseEvent::Stop) {
                error!("Deployment {}: {}", deployment_id, e);
            }
        }
    }

    // ================================ STATUS ================================ //

    /// Current status. Unknown ids report `Unknown` without a provider call;
    /// a failed inspect is reported as a condition, not an error.
    pub async fn get_status(&self, deployment_id: &str) -> DeploymentStatus {
        let Some(entry) = self.entry(deployment_id).await else {
            return DeploymentStatus::unknown();
        };
        let desired = entry.deployment.replicas.desired;

        let Some(handle) = &entry.deployment.instance else {
            return DeploymentStatus {
                phase: entry.fsm.phase(),
                replicas: Replicas {
                    desired,
                    ready: 0,
                    available: 0,
                },
                conditions: vec![Condition {
                    condition_type: "Available".to_string(),
                    status: "False".to_string(),
                    reason: Some("NoInstance".to_string()),
                    message: entry.fsm.error().map(str::to_string),
                }],
            };
        };

        match self.adapter.inspect(handle).await {
            Ok(raw) => {
                let available = raw.available_replicas >= desired && (raw.running || desired == 0);
                DeploymentStatus {
                    phase: entry.fsm.phase(),
                    replicas: Replicas {
                        desired,
                        ready: raw.ready_replicas,
                        available: raw.available_replicas,
                    },
                    conditions: vec![Condition {
                        condition_type: "Available".to_string(),
                        status: if available { "True" } else { "False" }.to_string(),
                        reason: Some(
                            if available {
                                "MinimumReplicasAvailable"
                            } else {
                                "MinimumReplicasUnavailable"
                            }
                            .to_string(),
                        ),
                        message: raw.message,
                    }],
                }
            }
            Err(e) => {
                warn!("Status check for {} failed: {}", deployment_id, e);
                DeploymentStatus {
                    phase: DeploymentPhase::Unknown,
                    replicas: Replicas {
                        desired,
                        ready: 0,
                        available: 0,
                    },
                    conditions: vec![Condition {
                        condition_type: "Available".to_string(),
                        status: "False".to_string(),
                        reason: Some("StatusCheckFailed".to_string()),
                        message: Some(e.to_string()),
                    }],
                }
            }
        }
    }

    /// Log lines of the deployment's instance
    pub async fn get_logs(&self, deployment_id: &str, options: &LogQuery) -> Result<Vec<String>, OrchestratorError> {
        let handle = self.instance_of(deployment_id).await?;
        let blob = self.adapter.logs(&handle, options).await?;
        Ok(blob.lines().map(str::to_string).collect())
    }

    /// Resource usage of the deployment's instance, read through
    pub async fn get_container_stats(&self, deployment_id: &str) -> Result<ContainerStats, OrchestratorError> {
        let handle = self.instance_of(deployment_id).await?;
        let raw = self.adapter.stats(&handle).await?;
        let mut normalized = stats::normalize(&raw);
        if normalized.container_id.is_empty() {
            normalized.container_id = handle.id;
        }
        Ok(normalized)
    }

    async fn instance_of(&self, deployment_id: &str) -> Result<InstanceHandle, OrchestratorError> {
        let entry = self
            .entry(deployment_id)
            .await
            .ok_or_else(|| OrchestratorError::NotFound(format!("Deployment {} not found", deployment_id)))?;
        entry.deployment.instance.ok_or_else(|| {
            OrchestratorError::NotFound(format!("Deployment {} has no running instance", deployment_id))
        })
    }

    // ================================ DELETE ================================ //

    /// Stop and remove the backend resource, then forget the deployment.
    /// Unknown ids are a successful no-op.
    pub async fn delete(&self, deployment_id: &str) -> DeploymentResult {
        let Some(entry) = self.entry(deployment_id).await else {
            debug!("Delete of unknown deployment {} is a no-op", deployment_id);
            return DeploymentResult::ok(
                deployment_id,
                format!("Deployment {} not found; nothing to delete", deployment_id),
            );
        };

        info!("Deleting {} from {}", deployment_id, self.provider_id());
        if let Some(handle) = &entry.deployment.instance {
            if entry.fsm.phase() != DeploymentPhase::Stopped {
                if let Err(e) = self.adapter.stop(handle).await {
                    warn!("Stopping {} before removal failed: {}", handle, e);
                }
            }
            if let Err(e) = self.adapter.remove(handle).await {
                error!("Removing {} failed: {}", handle, e);
                return DeploymentResult::failed(deployment_id, format!("Delete failed: {}", e));
            }
        }

        if let Some(mut removed) = self.registry.write().await.remove(deployment_id) {
            if let Err(e) = removed.transition(PhaseEvent::Terminate) {
                debug!("Deployment {}: {}", deployment_id, e);
            }
        }
        DeploymentResult::ok(deployment_id, format!("Deployment {} deleted", deployment_id))
    }
}

fn target_version_label(version: &str) -> &str {
    if version.is_empty() {
        "unversioned"
    } else {
        version
    }
}
