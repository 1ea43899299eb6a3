//! Multi-provider routing and health

pub mod health;
pub mod orchestrator;

pub use health::{HealthStatus, HealthThresholds, ProviderHealth};
pub use orchestrator::{
    MultiCloudOptions, MultiCloudOrchestrator, ProviderBinding, ProviderRoute, RoutedDeployment,
};
