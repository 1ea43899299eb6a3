//! Execution planning for coordinated workflow generation

use std::collections::{BTreeMap, HashSet};

use secrecy::ExposeSecret;
use tracing::debug;

use crate::coordinator::templates::{TemplateCatalog, GENERIC_TAG};
use crate::errors::OrchestratorError;
use crate::models::workflow::{DependencyEdge, SharedConfig, WorkflowType};

/// One artifact of a plan, with everything needed to render it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedArtifact {
    pub workflow_type: WorkflowType,
    pub template_id: String,
    pub score: u32,

    /// Path relative to the artifact store root
    pub path: String,
    pub content: String,

    /// Requested types this artifact waits for
    pub depends_on: Vec<WorkflowType>,
    pub context: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionPlan {
    /// Artifacts in execution order
    pub steps: Vec<PlannedArtifact>,
    pub edges: Vec<DependencyEdge>,
    pub propagated_variables: Vec<String>,
}

impl ExecutionPlan {
    pub fn execution_order(&self) -> Vec<WorkflowType> {
        self.steps.iter().map(|s| s.workflow_type).collect()
    }
}

/// Reference syntax used in place of a secret's value
pub fn secret_reference(name: &str) -> String {
    format!("${{{{ secrets.{} }}}}", name)
}

/// Variables every artifact receives. Secrets appear as `secrets.NAME`
/// keys whose value is a reference, never the secret itself.
pub fn shared_context(shared: &SharedConfig) -> BTreeMap<String, String> {
    let mut context = BTreeMap::new();
    context.insert("PROJECT_NAME".to_string(), shared.project_name.clone());
    context.insert(
        "FRAMEWORK".to_string(),
        shared
            .frameworks
            .first()
            .cloned()
            .unwrap_or_else(|| GENERIC_TAG.to_string()),
    );
    context.insert("ENVIRONMENT".to_string(), "production".to_string());
    context.insert("REGISTRY".to_string(), "ghcr.io".to_string());
    context.insert("NODE_VERSION".to_string(), "20".to_string());

    for (key, value) in &shared.variables {
        context.insert(key.clone(), value.clone());
    }
    for name in shared.secrets.keys() {
        context.insert(format!("secrets.{}", name), secret_reference(name));
    }
    context
}

/// Replace any literal secret value that made it into `content`
pub fn redact_secrets(content: &str, shared: &SharedConfig) -> String {
    let mut redacted = content.to_string();
    for (name, value) in &shared.secrets {
        let value = value.expose_secret();
        if !value.is_empty() && redacted.contains(value) {
            redacted = redacted.replace(value, &secret_reference(name));
        }
    }
    redacted
}

/// Requested types in dependency order. Among types that are ready at the
/// same time, request order wins.
pub fn topological_order(requested: &[WorkflowType]) -> Result<Vec<WorkflowType>, OrchestratorError> {
    let requested_set: HashSet<WorkflowType> = requested.iter().copied().collect();
    let mut placed: HashSet<WorkflowType> = HashSet::new();
    let mut order = Vec::with_capacity(requested.len());

    while order.len() < requested.len() {
        let next = requested.iter().copied().find(|t| {
            !placed.contains(t)
                && t.dependencies()
                    .iter()
                    .filter(|d| requested_set.contains(d))
                    .all(|d| placed.contains(d))
        });
        let Some(next) = next else {
            return Err(OrchestratorError::PlanningError(
                "Workflow dependencies form a cycle".to_string(),
            ));
        };
        placed.insert(next);
        order.push(next);
    }
    Ok(order)
}

/// Plan the generation of `types` for `shared`. Fails when any type has no
/// usable template.
pub fn plan(
    catalog: &TemplateCatalog,
    types: &[WorkflowType],
    shared: &SharedConfig,
) -> Result<ExecutionPlan, OrchestratorError> {
    let mut requested = Vec::new();
    for workflow_type in types {
        if !requested.contains(workflow_type) {
            requested.push(*workflow_type);
        }
    }
    if requested.is_empty() {
        return Err(OrchestratorError::PlanningError(
            "At least one workflow type is required".to_string(),
        ));
    }

    let context = shared_context(shared);
    let order = topological_order(&requested)?;

    let mut edges = Vec::new();
    let mut steps = Vec::with_capacity(order.len());
    for workflow_type in order {
        let (template, score) = catalog
            .select(workflow_type, &shared.frameworks)
            .ok_or_else(|| {
                OrchestratorError::PlanningError(format!(
                    "No templates found for type {}",
                    workflow_type
                ))
            })?;
        debug!(
            "Selected template {} for {} (score {})",
            template.id, workflow_type, score
        );

        let depends_on: Vec<WorkflowType> = workflow_type
            .dependencies()
            .iter()
            .copied()
            .filter(|d| requested.contains(d))
            .collect();
        edges.extend(depends_on.iter().map(|dependency| DependencyEdge {
            dependent: workflow_type,
            dependency: *dependency,
        }));

        let mut step_context = context.clone();
        step_context.insert("WORKFLOW_TYPE".to_string(), workflow_type.to_string());

        steps.push(PlannedArtifact {
            workflow_type,
            template_id: template.id.clone(),
            score,
            path: join_path(&shared.output_dir, &template.file_name),
            content: template.content.clone(),
            depends_on,
            context: step_context,
        });
    }

    Ok(ExecutionPlan {
        steps,
        edges,
        propagated_variables: context.into_keys().collect(),
    })
}

fn join_path(dir: &str, file_name: &str) -> String {
    let dir = dir.trim_end_matches('/');
    if dir.is_empty() {
        file_name.to_string()
    } else {
        format!("{}/{}", dir, file_name)
    }
}
