//! Settings file management

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::deploy::adapter::ProviderKind;
use crate::errors::OrchestratorError;
use crate::filesys::file::File;
use crate::logs::LogLevel;

/// Default settings location, overridable with `--settings=`
pub const DEFAULT_SETTINGS_PATH: &str = "/etc/skyward/settings.json";

/// skyward settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    #[serde(default)]
    pub log_level: LogLevel,

    /// Emit JSON log lines on stdout
    #[serde(default)]
    pub log_json: bool,

    /// Directory for rotated log files
    #[serde(default)]
    pub log_dir: Option<PathBuf>,

    /// Deployment backends; exactly one should be primary
    #[serde(default = "default_providers")]
    pub providers: Vec<ProviderSettings>,

    #[serde(default)]
    pub multicloud: MultiCloudSettings,

    #[serde(default)]
    pub rollout: RolloutSettings,

    #[serde(default = "default_max_revision_history")]
    pub max_revision_history: usize,

    #[serde(default)]
    pub workflows: WorkflowSettings,
}

fn default_true() -> bool {
    true
}

fn default_providers() -> Vec<ProviderSettings> {
    vec![ProviderSettings::default()]
}

fn default_max_revision_history() -> usize {
    10
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            log_level: LogLevel::Info,
            log_json: false,
            log_dir: None,
            providers: default_providers(),
            multicloud: MultiCloudSettings::default(),
            rollout: RolloutSettings::default(),
            max_revision_history: default_max_revision_history(),
            workflows: WorkflowSettings::default(),
        }
    }
}

impl Settings {
    /// Read settings from `path`; a missing file yields the defaults
    pub async fn load(path: impl Into<PathBuf>) -> Result<Self, OrchestratorError> {
        let file = File::new(path);
        if !file.exists().await {
            return Ok(Self::default());
        }
        let settings: Settings = file.read_json().await?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), OrchestratorError> {
        if self.providers.is_empty() {
            return Err(OrchestratorError::ConfigError(
                "At least one provider must be configured".to_string(),
            ));
        }
        let primaries = self.providers.iter().filter(|p| p.primary).count();
        if primaries > 1 {
            return Err(OrchestratorError::ConfigError(format!(
                "Exactly one primary provider is allowed, found {}",
                primaries
            )));
        }
        for provider in &self.providers {
            if provider.kind == ProviderKind::Memory || provider.kind == ProviderKind::Serverless {
                return Err(OrchestratorError::ConfigError(format!(
                    "Provider {} has unsupported kind {}",
                    provider.id, provider.kind
                )));
            }
        }
        Ok(())
    }
}

/// One deployment backend
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderSettings {
    pub id: String,

    pub kind: ProviderKind,

    #[serde(default)]
    pub primary: bool,

    #[serde(default = "default_weight")]
    pub weight: u32,

    #[serde(default)]
    pub priority: u32,

    /// CLI binary; defaults per kind
    #[serde(default)]
    pub binary: Option<String>,

    /// Kubernetes namespace
    #[serde(default)]
    pub namespace: Option<String>,

    /// Kubernetes context
    #[serde(default)]
    pub context: Option<String>,
}

fn default_weight() -> u32 {
    1
}

impl Default for ProviderSettings {
    fn default() -> Self {
        Self {
            id: "docker".to_string(),
            kind: ProviderKind::Docker,
            primary: true,
            weight: default_weight(),
            priority: 0,
            binary: None,
            namespace: None,
            context: None,
        }
    }
}

/// Failover and health-check settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MultiCloudSettings {
    #[serde(default = "default_failover_threshold")]
    pub failover_threshold: u32,

    #[serde(default = "default_recovery_threshold")]
    pub recovery_threshold: u32,

    #[serde(default = "default_health_check_interval")]
    pub health_check_interval_secs: u64,

    #[serde(default = "default_health_check_timeout")]
    pub health_check_timeout_secs: u64,

    /// Run the background health worker
    #[serde(default = "default_true")]
    pub enable_health_worker: bool,
}

fn default_failover_threshold() -> u32 {
    3
}

fn default_recovery_threshold() -> u32 {
    2
}

fn default_health_check_interval() -> u64 {
    30
}

fn default_health_check_timeout() -> u64 {
    5
}

impl Default for MultiCloudSettings {
    fn default() -> Self {
        Self {
            failover_threshold: default_failover_threshold(),
            recovery_threshold: default_recovery_threshold(),
            health_check_interval_secs: default_health_check_interval(),
            health_check_timeout_secs: default_health_check_timeout(),
            enable_health_worker: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RolloutSettings {
    #[serde(default = "default_rollout_timeout")]
    pub timeout_secs: u64,

    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,
}

fn default_rollout_timeout() -> u64 {
    300
}

fn default_poll_interval() -> u64 {
    2
}

impl Default for RolloutSettings {
    fn default() -> Self {
        Self {
            timeout_secs: default_rollout_timeout(),
            poll_interval_secs: default_poll_interval(),
        }
    }
}

/// Workflow generation settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowSettings {
    /// Root the artifact store writes under
    #[serde(default = "default_workflow_root")]
    pub root_dir: PathBuf,

    /// Artifact directory below the root
    #[serde(default = "default_output_dir")]
    pub output_dir: String,

    /// Secret names referenced by generated workflows; values are read
    /// from environment variables of the same name
    #[serde(default)]
    pub secret_names: Vec<String>,

    #[serde(default)]
    pub variables: std::collections::BTreeMap<String, String>,
}

fn default_workflow_root() -> PathBuf {
    PathBuf::from(".")
}

fn default_output_dir() -> String {
    ".github/workflows".to_string()
}

impl Default for WorkflowSettings {
    fn default() -> Self {
        Self {
            root_dir: default_workflow_root(),
            output_dir: default_output_dir(),
            secret_names: Vec::new(),
            variables: Default::default(),
        }
    }
}
