//! Deployment module

pub mod adapter;
pub mod command;
pub mod compose;
pub mod docker;
pub mod events;
pub mod fsm;
pub mod kubernetes;
pub mod manager;
pub mod rollout;
pub mod stats;

pub use adapter::{Capabilities, InstanceHandle, ProviderAdapter, ProviderKind};
pub use fsm::DeploymentPhase;
pub use manager::{DeploymentManager, ManagerOptions};
