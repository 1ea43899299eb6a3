//! skyward library
//!
//! Deployment orchestration core: validated rollouts and rollbacks on a
//! single provider, failover across providers and coordinated generation
//! of CI/CD workflow files.

pub mod app;
pub mod coordinator;
pub mod deploy;
pub mod errors;
pub mod filesys;
pub mod logs;
pub mod models;
pub mod multicloud;
pub mod storage;
pub mod utils;
pub mod workers;
