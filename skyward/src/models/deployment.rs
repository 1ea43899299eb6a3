//! Deployment models

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::deploy::adapter::InstanceHandle;
use crate::deploy::fsm::DeploymentPhase;
use crate::errors::OrchestratorError;

/// How an update replaces the running workload
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeploymentStrategy {
    /// Stop and remove the old instance, then create the new one
    Recreate,

    /// Patch in place where the backend supports it
    #[default]
    RollingUpdate,
}

/// CPU and memory quantities with unit suffixes, e.g. `"500m"` and `"256Mi"`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceList {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cpu: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory: Option<String>,
}

/// Resource requests and limits
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceRequirements {
    #[serde(default)]
    pub requests: ResourceList,

    #[serde(default)]
    pub limits: ResourceList,
}

/// A single exposed port
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PortMapping {
    pub name: String,

    pub container_port: u16,

    /// "TCP" or "UDP"
    #[serde(default = "default_protocol")]
    pub protocol: String,
}

fn default_protocol() -> String {
    "TCP".to_string()
}

/// Liveness probe
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthCheck {
    /// Probe type: "http", "tcp" or "exec"
    #[serde(rename = "type")]
    pub probe_type: String,

    /// URL path, port or command, depending on the probe type
    pub target: String,

    #[serde(default)]
    pub initial_delay_seconds: u32,

    #[serde(default = "default_period_seconds")]
    pub period_seconds: u32,

    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u32,

    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,
}

fn default_period_seconds() -> u32 {
    10
}

fn default_timeout_seconds() -> u32 {
    5
}

fn default_failure_threshold() -> u32 {
    3
}

/// Replica bounds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScalingConfig {
    pub min_replicas: u32,
    pub max_replicas: u32,
}

impl Default for ScalingConfig {
    fn default() -> Self {
        Self {
            min_replicas: 1,
            max_replicas: 1,
        }
    }
}

/// Instructions for building the image before it is deployed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildSpec {
    /// Build context directory
    pub context: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dockerfile: Option<String>,

    /// Tag to give the built image; defaults to `{name}:{version}`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tag: Option<String>,

    #[serde(default)]
    pub args: BTreeMap<String, String>,
}

/// Immutable deployment intent
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentConfig {
    /// Unique deployment ID
    pub id: String,

    pub name: String,

    /// Image or artifact reference
    #[serde(default)]
    pub image: String,

    #[serde(default)]
    pub version: String,

    /// Free-form label, e.g. "production"
    #[serde(default)]
    pub environment: String,

    #[serde(default)]
    pub strategy: DeploymentStrategy,

    #[serde(default)]
    pub resources: ResourceRequirements,

    #[serde(default)]
    pub networking: Vec<PortMapping>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub health_check: Option<HealthCheck>,

    #[serde(default)]
    pub scaling: ScalingConfig,

    #[serde(default)]
    pub env: BTreeMap<String, String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub build: Option<BuildSpec>,
}

impl DeploymentConfig {
    /// Create a config with the given identity and image and defaults elsewhere
    pub fn new(id: impl Into<String>, name: impl Into<String>, image: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            image: image.into(),
            version: String::new(),
            environment: String::new(),
            strategy: DeploymentStrategy::default(),
            resources: ResourceRequirements::default(),
            networking: Vec::new(),
            health_check: None,
            scaling: ScalingConfig::default(),
            env: BTreeMap::new(),
            build: None,
        }
    }

    /// Check the config invariants. Never touches a provider.
    pub fn validate(&self) -> Result<(), OrchestratorError> {
        if self.id.trim().is_empty() {
            return Err(OrchestratorError::ValidationError(
                "Deployment ID is required".to_string(),
            ));
        }
        if self.name.trim().is_empty() {
            return Err(OrchestratorError::ValidationError(
                "Deployment name is required".to_string(),
            ));
        }
        if self.image.trim().is_empty() && self.build.is_none() {
            return Err(OrchestratorError::ValidationError(
                "Deployment image or build configuration is required".to_string(),
            ));
        }
        if self.scaling.min_replicas > self.scaling.max_replicas {
            return Err(OrchestratorError::ValidationError(format!(
                "minReplicas ({}) must not exceed maxReplicas ({})",
                self.scaling.min_replicas, self.scaling.max_replicas
            )));
        }
        Ok(())
    }

    /// Image reference to run, with the version applied as a tag when the
    /// image carries none
    pub fn image_ref(&self) -> String {
        let last_segment = self.image.rsplit('/').next().unwrap_or(&self.image);
        if last_segment.contains(':') || last_segment.contains('@') || self.version.is_empty() {
            self.image.clone()
        } else {
            format!("{}:{}", self.image, self.version)
        }
    }
}

/// Partial config merged onto a stored one. Top-level fields only: a
/// present `resources` replaces the stored resources wholesale.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub environment: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub strategy: Option<DeploymentStrategy>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resources: Option<ResourceRequirements>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub networking: Option<Vec<PortMapping>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub health_check: Option<HealthCheck>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scaling: Option<ScalingConfig>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub env: Option<BTreeMap<String, String>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub build: Option<BuildSpec>,
}

impl DeploymentPatch {
    pub fn version(version: impl Into<String>) -> Self {
        Self {
            version: Some(version.into()),
            ..Default::default()
        }
    }

    /// Apply onto a copy of `base`. The id is never patched.
    pub fn merge_onto(&self, base: &DeploymentConfig) -> DeploymentConfig {
        let mut merged = base.clone();
        if let Some(name) = &self.name {
            merged.name = name.clone();
        }
        if let Some(image) = &self.image {
            merged.image = image.clone();
        }
        if let Some(version) = &self.version {
            merged.version = version.clone();
        }
        if let Some(environment) = &self.environment {
            merged.environment = environment.clone();
        }
        if let Some(strategy) = self.strategy {
            merged.strategy = strategy;
        }
        if let Some(resources) = &self.resources {
            merged.resources = resources.clone();
        }
        if let Some(networking) = &self.networking {
            merged.networking = networking.clone();
        }
        if let Some(health_check) = &self.health_check {
            merged.health_check = Some(health_check.clone());
        }
        if let Some(scaling) = self.scaling {
            merged.scaling = scaling;
        }
        if let Some(env) = &self.env {
            merged.env = env.clone();
        }
        if let Some(build) = &self.build {
            merged.build = Some(build.clone());
        }
        merged
    }
}

/// Replica counts
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Replicas {
    pub desired: u32,
    pub ready: u32,
    pub available: u32,
}

/// Materialized state of a deployment, as owned by its manager
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Deployment {
    /// Latest applied config
    pub config: DeploymentConfig,
    pub replicas: Replicas,
    pub phase: DeploymentPhase,

    /// Newest last, capped
    pub revision_history: Vec<Revision>,

    /// Provider resource, absent while stopped or after a destructive failure
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instance: Option<InstanceHandle>,

    pub created_at: DateTime<Utc>,
    pub last_updated_at: DateTime<Utc>,
}

impl Deployment {
    pub fn current_revision(&self) -> Option<&Revision> {
        self.revision_history.last()
    }
}

/// Snapshot of applied configuration, taken on every successful
/// deploy, update and rollback
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Revision {
    pub revision_number: u64,
    pub config: DeploymentConfig,
    pub applied_at: DateTime<Utc>,
}

/// Chosen by backend capability, never by the caller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RollbackStrategy {
    /// Single-instance swap
    Immediate,

    /// Staged, version-aware rollout
    Gradual,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RollbackInfo {
    /// Version active immediately before the rollback
    pub previous_version: String,
    pub rollback_strategy: RollbackStrategy,
    pub target_revision: u64,
}

/// Outcome returned by every mutating manager operation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentResult {
    pub success: bool,
    pub deployment_id: String,
    pub message: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rollback_info: Option<RollbackInfo>,
}

impl DeploymentResult {
    pub fn ok(deployment_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            success: true,
            deployment_id: deployment_id.into(),
            message: message.into(),
            rollback_info: None,
        }
    }

    pub fn failed(deployment_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            success: false,
            deployment_id: deployment_id.into(),
            message: message.into(),
            rollback_info: None,
        }
    }
}

/// A status condition, modelled on the orchestrator convention
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Condition {
    #[serde(rename = "type")]
    pub condition_type: String,
    pub status: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentStatus {
    pub phase: DeploymentPhase,
    pub replicas: Replicas,

    #[serde(default)]
    pub conditions: Vec<Condition>,
}

impl DeploymentStatus {
    /// Status reported for an id that is not in the registry
    pub fn unknown() -> Self {
        Self {
            phase: DeploymentPhase::Unknown,
            replicas: Replicas::default(),
            conditions: Vec::new(),
        }
    }
}

/// Log retrieval options
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogQuery {
    /// Kept for wire compatibility. `get_logs` returns a finished snapshot,
    /// so adapters never stream.
    #[serde(default)]
    pub follow: bool,

    #[serde(default)]
    pub timestamps: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tail_lines: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub since: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct CpuStats {
    pub percent: f64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemoryStats {
    pub usage_bytes: u64,
    pub limit_bytes: u64,
    pub percent: f64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkStats {
    pub rx_bytes: u64,
    pub tx_bytes: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockIoStats {
    pub read_bytes: u64,
    pub write_bytes: u64,
}

/// Normalized resource usage of a deployment's instance
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContainerStats {
    pub container_id: String,
    pub cpu: CpuStats,
    pub memory: MemoryStats,
    pub network: NetworkStats,
    pub block_io: BlockIoStats,
}

/// A set of named services deployed together
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ComposeProject {
    pub name: String,

    /// Service name to config; each config's id is derived from the
    /// project and service names
    pub services: BTreeMap<String, DeploymentConfig>,
}
