//! Multi-service deploys

use tracing::{info, warn};

use crate::deploy::manager::DeploymentManager;
use crate::models::deployment::{ComposeProject, DeploymentConfig, DeploymentResult};

/// Config for one service of `project`, with the derived deployment id
pub fn service_config(project: &str, service: &str, config: &DeploymentConfig) -> DeploymentConfig {
    let mut config = config.clone();
    config.id = format!("{}-{}", project, service);
    if config.name.trim().is_empty() {
        config.name = service.to_string();
    }
    config
}

impl DeploymentManager {
    /// Deploy every service of `project`, one `deploy` per service in name
    /// order. Services are independent: a failure leaves the services
    /// already deployed running and the rest are still attempted.
    pub async fn deploy_with_compose(&self, project: &ComposeProject) -> Vec<DeploymentResult> {
        info!(
            "Deploying project {} ({} services)",
            project.name,
            project.services.len()
        );

        let mut results = Vec::with_capacity(project.services.len());
        for (service, config) in &project.services {
            let result = self
                .deploy(service_config(&project.name, service, config))
                .await;
            if !result.success {
                warn!("Service {} of {} failed: {}", service, project.name, result.message);
            }
            results.push(result);
        }

        let failed = results.iter().filter(|r| !r.success).count();
        if failed > 0 {
            warn!("Project {}: {} of {} services failed", project.name, failed, results.len());
        } else {
            info!("Project {} deployed", project.name);
        }
        results
    }
}
