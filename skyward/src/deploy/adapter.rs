//! Provider adapter interface
//!
//! Every concrete backend (single-host container engine, clustered
//! orchestrator, managed function platform) sits behind [`ProviderAdapter`].
//! Optional primitives default to [`OrchestratorError::Unsupported`], and
//! [`Capabilities`] tells the manager which ones a backend really has.

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::errors::OrchestratorError;
use crate::models::deployment::{
    BuildSpec, DeploymentConfig, HealthCheck, LogQuery, PortMapping, ResourceRequirements,
};

/// Kind of backend behind an adapter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    Docker,
    Kubernetes,
    Serverless,
    Memory,
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ProviderKind::Docker => "docker",
            ProviderKind::Kubernetes => "kubernetes",
            ProviderKind::Serverless => "serverless",
            ProviderKind::Memory => "memory",
        };
        f.write_str(name)
    }
}

/// What a backend can do beyond the mandatory primitives
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Capabilities {
    /// Native replica control; without it the backend runs one instance
    pub native_replicas: bool,

    /// In-place `patch` of a live instance
    pub in_place_patch: bool,

    /// Staged, version-aware rollout (enables gradual rollback)
    pub staged_rollout: bool,

    /// `build_artifact` is available
    pub build: bool,
}

/// Opaque reference to a provider resource
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InstanceHandle {
    pub id: String,
}

impl InstanceHandle {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }
}

impl std::fmt::Display for InstanceHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.id)
    }
}

/// Everything a backend needs to materialize a deployment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstanceSpec {
    /// Stable resource name, the deployment id
    pub name: String,
    pub image: String,
    pub version: String,
    pub replicas: u32,
    pub resources: ResourceRequirements,
    pub ports: Vec<PortMapping>,
    pub health_check: Option<HealthCheck>,
    pub env: BTreeMap<String, String>,
    pub labels: BTreeMap<String, String>,
}

impl InstanceSpec {
    /// Build the instance spec for `config` running `replicas` instances of `image`
    pub fn from_config(config: &DeploymentConfig, image: String, replicas: u32) -> Self {
        let mut labels = BTreeMap::new();
        labels.insert("app".to_string(), config.id.clone());
        labels.insert("skyward.name".to_string(), config.name.clone());
        if !config.version.is_empty() {
            labels.insert("skyward.version".to_string(), config.version.clone());
        }
        if !config.environment.is_empty() {
            labels.insert("skyward.environment".to_string(), config.environment.clone());
        }

        Self {
            name: config.id.clone(),
            image,
            version: config.version.clone(),
            replicas,
            resources: config.resources.clone(),
            ports: config.networking.clone(),
            health_check: config.health_check.clone(),
            env: config.env.clone(),
            labels,
        }
    }
}

/// In-place change to a live instance
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InstancePatch {
    pub image: Option<String>,
    pub version: Option<String>,
    pub replicas: Option<u32>,
    pub resources: Option<ResourceRequirements>,
    pub env: Option<BTreeMap<String, String>>,
}

impl InstancePatch {
    pub fn replicas(replicas: u32) -> Self {
        Self {
            replicas: Some(replicas),
            ..Default::default()
        }
    }

    /// Patch that moves a live instance onto `spec`
    pub fn from_spec(spec: &InstanceSpec) -> Self {
        Self {
            image: Some(spec.image.clone()),
            version: Some(spec.version.clone()),
            replicas: None,
            resources: Some(spec.resources.clone()),
            env: Some(spec.env.clone()),
        }
    }
}

/// Provider-native status of a resource
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawStatus {
    pub running: bool,

    /// Backend state string, e.g. "running", "exited"
    pub state: String,
    pub desired_replicas: u32,
    pub ready_replicas: u32,
    pub available_replicas: u32,
    pub message: Option<String>,
}

/// Provider-native metrics, in the human-readable form container engines
/// print them, e.g. `mem_usage = "10MiB / 1GiB"`
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct RawStats {
    #[serde(rename = "ID", default)]
    pub id: String,

    #[serde(rename = "CPUPerc", default)]
    pub cpu_perc: String,

    #[serde(rename = "MemUsage", default)]
    pub mem_usage: String,

    #[serde(rename = "MemPerc", default)]
    pub mem_perc: String,

    #[serde(rename = "NetIO", default)]
    pub net_io: String,

    #[serde(rename = "BlockIO", default)]
    pub block_io: String,
}

/// Uniform interface over a deployment backend
#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    /// Identifier of this provider in routing tables and logs
    fn provider_id(&self) -> &str;

    fn kind(&self) -> ProviderKind;

    fn capabilities(&self) -> Capabilities;

    async fn create_instance(&self, spec: &InstanceSpec) -> Result<InstanceHandle, OrchestratorError>;

    async fn start(&self, handle: &InstanceHandle) -> Result<(), OrchestratorError>;

    async fn stop(&self, handle: &InstanceHandle) -> Result<(), OrchestratorError>;

    async fn remove(&self, handle: &InstanceHandle) -> Result<(), OrchestratorError>;

    async fn inspect(&self, handle: &InstanceHandle) -> Result<RawStatus, OrchestratorError>;

    /// Raw log blob; the adapter translates `options` to its own flags
    async fn logs(&self, handle: &InstanceHandle, options: &LogQuery) -> Result<String, OrchestratorError>;

    async fn stats(&self, handle: &InstanceHandle) -> Result<RawStats, OrchestratorError>;

    /// Build an image and return its reference
    async fn build_artifact(&self, build: &BuildSpec) -> Result<String, OrchestratorError> {
        let _ = build;
        Err(OrchestratorError::Unsupported(format!(
            "{} does not support artifact builds",
            self.provider_id()
        )))
    }

    async fn patch(&self, handle: &InstanceHandle, patch: &InstancePatch) -> Result<(), OrchestratorError> {
        let _ = (handle, patch);
        Err(OrchestratorError::Unsupported(format!(
            "{} does not support in-place updates",
            self.provider_id()
        )))
    }

    /// Cheap liveness check of the backend itself
    async fn health_probe(&self) -> Result<(), OrchestratorError>;
}
