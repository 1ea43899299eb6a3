//! Workflow models

use std::collections::BTreeMap;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};

use crate::errors::OrchestratorError;

/// Kind of generated workflow
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum WorkflowType {
    Ci,
    Cd,
    SecurityScan,
    Release,
}

impl WorkflowType {
    pub const ALL: [WorkflowType; 4] = [
        WorkflowType::Ci,
        WorkflowType::Cd,
        WorkflowType::SecurityScan,
        WorkflowType::Release,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            WorkflowType::Ci => "ci",
            WorkflowType::Cd => "cd",
            WorkflowType::SecurityScan => "security-scan",
            WorkflowType::Release => "release",
        }
    }

    /// Types that must be generated before this one when both are requested
    pub fn dependencies(&self) -> &'static [WorkflowType] {
        match self {
            WorkflowType::Ci => &[],
            WorkflowType::Cd => &[WorkflowType::Ci],
            WorkflowType::SecurityScan => &[],
            WorkflowType::Release => &[WorkflowType::Ci],
        }
    }
}

impl std::fmt::Display for WorkflowType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WorkflowType {
    type Err = OrchestratorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ci" => Ok(WorkflowType::Ci),
            "cd" => Ok(WorkflowType::Cd),
            "security-scan" | "security" => Ok(WorkflowType::SecurityScan),
            "release" => Ok(WorkflowType::Release),
            other => Err(OrchestratorError::PlanningError(format!(
                "Unknown workflow type: {}",
                other
            ))),
        }
    }
}

/// A workflow template. `content` may hold `{{VAR}}` placeholders.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowTemplate {
    pub id: String,
    pub name: String,
    pub workflow_type: WorkflowType,

    /// Framework tags this template targets; `generic` marks a fallback
    pub frameworks: Vec<String>,

    /// Output path relative to the artifact directory
    pub file_name: String,
    pub content: String,
}

/// Settings shared by every artifact of one coordinated batch
#[derive(Debug, Clone, Default)]
pub struct SharedConfig {
    pub project_name: String,

    /// Frameworks of the project, most significant first
    pub frameworks: Vec<String>,

    /// Extra variables available to every template
    pub variables: BTreeMap<String, String>,

    /// Secrets by name. Artifacts only ever reference them by name.
    pub secrets: BTreeMap<String, SecretString>,

    /// Artifact directory, relative to the store root
    pub output_dir: String,
}

impl SharedConfig {
    pub fn new(project_name: impl Into<String>) -> Self {
        Self {
            project_name: project_name.into(),
            output_dir: ".github/workflows".to_string(),
            ..Default::default()
        }
    }

    pub fn framework(mut self, framework: impl Into<String>) -> Self {
        self.frameworks.push(framework.into());
        self
    }

    pub fn variable(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.variables.insert(key.into(), value.into());
        self
    }

    pub fn secret(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.secrets
            .insert(name.into(), SecretString::from(value.into()));
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactStatus {
    Written,
    Failed,
    Skipped,
}

/// Outcome for one planned artifact
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArtifactResult {
    pub workflow_type: WorkflowType,
    pub template_id: String,
    pub path: String,
    pub status: ArtifactStatus,

    /// sha256 of the written content
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub digest: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// `dependent` is generated after `dependency`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DependencyEdge {
    pub dependent: WorkflowType,
    pub dependency: WorkflowType,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CoordinationSummary {
    pub dependency_edges: Vec<DependencyEdge>,
    pub execution_order: Vec<WorkflowType>,

    /// Names of variables and secret references every artifact received
    pub propagated_variables: Vec<String>,
    pub generated_at: DateTime<Utc>,
    pub duration_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CoordinationResult {
    /// True when every artifact was written
    pub success: bool,
    pub artifacts: Vec<ArtifactResult>,
    pub errors: Vec<String>,
    pub summary: CoordinationSummary,
}
