//! Finite State Machine for the deployment lifecycle

use serde::{Deserialize, Serialize};

/// Deployment phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DeploymentPhase {
    /// Accepted, provider calls in flight
    Pending,

    /// Live on the backend
    Running,

    /// Update in progress
    Updating,

    /// Rollback in progress
    RollingBack,

    /// Scaled to zero on a single-instance backend; record retained
    Stopped,

    /// Unrecoverable provider error
    Failed,

    /// Deleted
    Terminated,

    /// Not present in the registry, or status could not be read
    Unknown,
}

impl std::fmt::Display for DeploymentPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// Phase event
#[derive(Debug, Clone)]
pub enum PhaseEvent {
    /// Instance created and started
    Created,

    /// Start an update
    Update,

    /// Update applied
    UpdateSucceeded,

    /// Start a rollback
    Rollback,

    /// Rollback applied
    RollbackSucceeded,

    /// The operation failed before the backend was touched; return to the
    /// phase held before it started
    Abort,

    /// Unrecoverable provider error
    Fail(String),

    /// Scaled to zero
    Stop,

    /// Scaled back up from zero
    Start,

    /// Deleted
    Terminate,
}

/// Deployment FSM
#[derive(Debug, Clone)]
pub struct DeploymentFsm {
    phase: DeploymentPhase,
    previous: Option<DeploymentPhase>,
    error: Option<String>,
    failure_count: u32,
}

impl DeploymentFsm {
    /// Create a new FSM in pending phase
    pub fn new() -> Self {
        Self {
            phase: DeploymentPhase::Pending,
            previous: None,
            error: None,
            failure_count: 0,
        }
    }

    /// Get current phase
    pub fn phase(&self) -> DeploymentPhase {
        self.phase
    }

    /// Get the last error message if any
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Number of failures seen since the last success
    pub fn failure_count(&self) -> u32 {
        self.failure_count
    }

    /// Process an event and transition phase
    pub fn process(&mut self, event: PhaseEvent) -> Result<(), String> {
        use DeploymentPhase::*;

        let new_phase = match (&self.phase, &event) {
            // From Pending
            (Pending, PhaseEvent::Created) => {
                self.error = None;
                self.failure_count = 0;
                Running
            }

            // From Running
            (Running, PhaseEvent::Update) => Updating,
            (Running, PhaseEvent::Rollback) => RollingBack,
            (Running, PhaseEvent::Stop) => Stopped,

            // From Updating
            (Updating, PhaseEvent::UpdateSucceeded) => {
                self.error = None;
                self.failure_count = 0;
                Running
            }

            // From RollingBack
            (RollingBack, PhaseEvent::RollbackSucceeded) => {
                self.error = None;
                self.failure_count = 0;
                Running
            }

            // Abort returns to wherever the operation started
            (Updating | RollingBack, PhaseEvent::Abort) => self.previous.unwrap_or(Running),

            // Unrecoverable failures
            (Pending | Updating | RollingBack, PhaseEvent::Fail(err)) => {
                self.error = Some(err.clone());
                self.failure_count += 1;
                Failed
            }

            // From Stopped
            (Stopped, PhaseEvent::Start) => Running,

            // From Failed: a fresh update or rollback may recover it
            (Failed, PhaseEvent::Update) => Updating,
            (Failed, PhaseEvent::Rollback) => RollingBack,

            // Any live record can be deleted
            (Pending | Running | Updating | RollingBack | Stopped | Failed, PhaseEvent::Terminate) => {
                Terminated
            }

            // Invalid transitions
            (phase, event) => {
                return Err(format!("{:?} -> {:?}", phase, event));
            }
        };

        self.previous = Some(self.phase);
        self.phase = new_phase;
        Ok(())
    }

    /// Whether the deployment accepts an update or rollback right now
    pub fn can_mutate(&self) -> bool {
        matches!(self.phase, DeploymentPhase::Running | DeploymentPhase::Failed)
    }
}

impl Default for DeploymentFsm {
    fn default() -> Self {
        Self::new()
    }
}
