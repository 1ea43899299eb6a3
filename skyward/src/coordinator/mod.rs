//! Coordinated multi-workflow generation
//!
//! [`MultiWorkflowCoordinator`] selects one template per requested workflow
//! type, orders the artifacts by their dependencies and writes them through
//! an [`ArtifactStore`]. A failed write only affects the artifacts that
//! depend on it.

pub mod planner;
pub mod store;
pub mod templates;

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use tracing::{info, warn};

use crate::errors::OrchestratorError;
use crate::models::workflow::{
    ArtifactResult, ArtifactStatus, CoordinationResult, CoordinationSummary, SharedConfig,
    WorkflowType,
};
use crate::utils::sha256_hash;

pub use planner::{ExecutionPlan, PlannedArtifact};
pub use store::{ArtifactStore, FsArtifactStore};
pub use templates::TemplateCatalog;

pub struct MultiWorkflowCoordinator {
    catalog: TemplateCatalog,
    store: Arc<dyn ArtifactStore>,
}

impl MultiWorkflowCoordinator {
    pub fn new(catalog: TemplateCatalog, store: Arc<dyn ArtifactStore>) -> Self {
        Self { catalog, store }
    }

    pub fn catalog(&self) -> &TemplateCatalog {
        &self.catalog
    }

    pub fn plan(
        &self,
        types: &[WorkflowType],
        shared: &SharedConfig,
    ) -> Result<ExecutionPlan, OrchestratorError> {
        planner::plan(&self.catalog, types, shared)
    }

    /// Plan and write every requested workflow.
    ///
    /// Planning failures abort the batch and are returned as errors. Write
    /// failures are collected in the result; artifacts that depend on a
    /// failed or skipped one are skipped, the rest still run.
    pub async fn generate_coordinated_workflows(
        &self,
        types: &[WorkflowType],
        shared: &SharedConfig,
    ) -> Result<CoordinationResult, OrchestratorError> {
        let started = Instant::now();
        let plan = self.plan(types, shared)?;
        info!(
            "Generating {} workflows for {}: {:?}",
            plan.steps.len(),
            shared.project_name,
            plan.execution_order()
        );

        let mut unavailable: HashSet<WorkflowType> = HashSet::new();
        let mut artifacts = Vec::with_capacity(plan.steps.len());
        let mut errors = Vec::new();

        for step in &plan.steps {
            if let Some(blocker) = step.depends_on.iter().find(|d| unavailable.contains(d)) {
                let reason = format!(
                    "Skipped {}: depends on {} which was not generated",
                    step.workflow_type, blocker
                );
                warn!("{}", reason);
                unavailable.insert(step.workflow_type);
                errors.push(reason.clone());
                artifacts.push(artifact(step, ArtifactStatus::Skipped, None, Some(reason)));
                continue;
            }

            let rendered = planner::redact_secrets(
                &templates::render(&step.content, &step.context),
                shared,
            );
            match self.store.write_artifact(&step.path, &rendered).await {
                Ok(()) => {
                    let digest = sha256_hash(rendered.as_bytes());
                    artifacts.push(artifact(step, ArtifactStatus::Written, Some(digest), None));
                }
                Err(e) => {
                    let error = match e {
                        OrchestratorError::ArtifactWriteError(_) => e,
                        other => OrchestratorError::ArtifactWriteError(other.to_string()),
                    };
                    warn!("Writing {} failed: {}", step.path, error);
                    unavailable.insert(step.workflow_type);
                    errors.push(error.to_string());
                    artifacts.push(artifact(
                        step,
                        ArtifactStatus::Failed,
                        None,
                        Some(error.to_string()),
                    ));
                }
            }
        }

        let success = errors.is_empty();
        info!(
            "Generated {} of {} workflows for {}",
            artifacts
                .iter()
                .filter(|a| a.status == ArtifactStatus::Written)
                .count(),
            artifacts.len(),
            shared.project_name
        );

        Ok(CoordinationResult {
            success,
            summary: CoordinationSummary {
                dependency_edges: plan.edges.clone(),
                execution_order: plan.execution_order(),
                propagated_variables: plan.propagated_variables.clone(),
                generated_at: Utc::now(),
                duration_ms: started.elapsed().as_millis() as u64,
            },
            artifacts,
            errors,
        })
    }
}

fn artifact(
    step: &PlannedArtifact,
    status: ArtifactStatus,
    digest: Option<String>,
    error: Option<String>,
) -> ArtifactResult {
    ArtifactResult {
        workflow_type: step.workflow_type,
        template_id: step.template_id.clone(),
        path: step.path.clone(),
        status,
        digest,
        error,
    }
}
