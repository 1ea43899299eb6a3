//! Error types for the orchestration core

use thiserror::Error;

/// Main error type for skyward
#[derive(Error, Debug)]
pub enum OrchestratorError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    /// Malformed deployment config, detected before any provider call
    #[error("Validation error: {0}")]
    ValidationError(String),

    /// The backend rejected a call (network, auth, conflict)
    #[error("Provider error: {0}")]
    ProviderError(String),

    /// The backend has no such primitive (build, patch, stats, ...)
    #[error("Unsupported operation: {0}")]
    Unsupported(String),

    #[error("Not found: {0}")]
    NotFound(String),

    /// A bounded wait expired before the backend converged
    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("Planning error: {0}")]
    PlanningError(String),

    #[error("Artifact write error: {0}")]
    ArtifactWriteError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Invalid transition: {0}")]
    TransitionError(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl OrchestratorError {
    /// Whether this error means the backend never converged, as opposed to
    /// rejecting the call outright.
    pub fn is_timeout(&self) -> bool {
        matches!(self, OrchestratorError::Timeout(_))
    }
}

impl From<anyhow::Error> for OrchestratorError {
    fn from(err: anyhow::Error) -> Self {
        OrchestratorError::Internal(err.to_string())
    }
}
