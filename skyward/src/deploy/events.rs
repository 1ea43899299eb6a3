//! Lifecycle events and the per-manager listener list

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use serde::Serialize;

use crate::models::deployment::DeploymentResult;

/// Which manager operation produced an event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    Deploy,
    Update,
    Rollback,
}

/// Lifecycle event fired to listeners
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "camelCase")]
pub enum LifecycleEvent {
    #[serde(rename_all = "camelCase")]
    DeploymentStarted {
        deployment_id: String,
        operation: Operation,
    },

    #[serde(rename_all = "camelCase")]
    DeploymentCompleted {
        deployment_id: String,
        operation: Operation,
        result: DeploymentResult,
    },

    #[serde(rename_all = "camelCase")]
    DeploymentFailed {
        deployment_id: String,
        operation: Operation,
        error: String,
    },
}

impl LifecycleEvent {
    pub fn deployment_id(&self) -> &str {
        match self {
            LifecycleEvent::DeploymentStarted { deployment_id, .. }
            | LifecycleEvent::DeploymentCompleted { deployment_id, .. }
            | LifecycleEvent::DeploymentFailed { deployment_id, .. } => deployment_id,
        }
    }
}

/// Handle returned by [`Listeners::subscribe`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

type Listener = Arc<dyn Fn(&LifecycleEvent) + Send + Sync>;

/// Listener list owned by one manager
#[derive(Default)]
pub struct Listeners {
    next_id: AtomicU64,
    entries: RwLock<Vec<(ListenerId, Listener)>>,
}

impl Listeners {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(&LifecycleEvent) + Send + Sync + 'static,
    {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        entries.push((id, Arc::new(listener)));
        id
    }

    /// Returns false if the listener was already detached
    pub fn unsubscribe(&self, id: ListenerId) -> bool {
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        let before = entries.len();
        entries.retain(|(entry_id, _)| *entry_id != id);
        entries.len() != before
    }

    /// Deliver synchronously to every listener, in subscription order
    pub fn emit(&self, event: LifecycleEvent) {
        // Snapshot so a listener may subscribe or unsubscribe re-entrantly.
        let snapshot: Vec<Listener> = {
            let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
            entries.iter().map(|(_, l)| l.clone()).collect()
        };
        for listener in snapshot {
            listener(&event);
        }
    }

    pub fn len(&self) -> usize {
        self.entries.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
