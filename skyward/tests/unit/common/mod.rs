//! Scripted doubles shared by the integration tests
#![allow(dead_code)]

use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;

use skyward::coordinator::ArtifactStore;
use skyward::deploy::adapter::{
    Capabilities, InstanceHandle, InstancePatch, InstanceSpec, ProviderAdapter, ProviderKind,
    RawStats, RawStatus,
};
use skyward::deploy::manager::{DeploymentManager, ManagerOptions};
use skyward::deploy::rollout::Clock;
use skyward::errors::OrchestratorError;
use skyward::models::deployment::{BuildSpec, DeploymentConfig, LogQuery, ScalingConfig};

/// Capabilities of a single-host container engine
pub fn single_instance() -> Capabilities {
    Capabilities {
        native_replicas: false,
        in_place_patch: false,
        staged_rollout: false,
        build: true,
    }
}

/// Capabilities of a clustered orchestrator
pub fn clustered() -> Capabilities {
    Capabilities {
        native_replicas: true,
        in_place_patch: true,
        staged_rollout: true,
        build: false,
    }
}

pub fn config(id: &str, version: &str) -> DeploymentConfig {
    let mut config = DeploymentConfig::new(id, "app", "registry.local/app");
    config.version = version.to_string();
    config
}

pub fn replicas(min: u32, max: u32) -> ScalingConfig {
    ScalingConfig {
        min_replicas: min,
        max_replicas: max,
    }
}

/// In-memory provider that records every call and fails on demand
pub struct MockAdapter {
    id: String,
    capabilities: Capabilities,
    calls: Mutex<Vec<String>>,
    failures: Mutex<HashMap<String, VecDeque<String>>>,
    persistent_failures: Mutex<HashMap<String, String>>,
    instances: Mutex<HashMap<String, u32>>,
    next_handle: AtomicUsize,
    inspects: AtomicUsize,
    hang_inspect: AtomicBool,
    ready_after: Mutex<Option<usize>>,
    log_blob: Mutex<String>,
    raw_stats: Mutex<RawStats>,
    probe_delay: Mutex<Option<Duration>>,
    log_queries: Mutex<Vec<LogQuery>>,
}

impl MockAdapter {
    pub fn new(id: &str, capabilities: Capabilities) -> Arc<Self> {
        Arc::new(Self {
            id: id.to_string(),
            capabilities,
            calls: Mutex::new(Vec::new()),
            failures: Mutex::new(HashMap::new()),
            persistent_failures: Mutex::new(HashMap::new()),
            instances: Mutex::new(HashMap::new()),
            next_handle: AtomicUsize::new(1),
            inspects: AtomicUsize::new(0),
            hang_inspect: AtomicBool::new(false),
            ready_after: Mutex::new(None),
            log_blob: Mutex::new(String::new()),
            raw_stats: Mutex::new(RawStats::default()),
            probe_delay: Mutex::new(None),
            log_queries: Mutex::new(Vec::new()),
        })
    }

    pub fn manager(self: &Arc<Self>) -> DeploymentManager {
        DeploymentManager::new(self.clone(), ManagerOptions::default())
    }

    /// Fail the next call of `op` with `message`
    pub fn fail_next(&self, op: &str, message: &str) {
        self.failures
            .lock()
            .unwrap()
            .entry(op.to_string())
            .or_default()
            .push_back(message.to_string());
    }

    /// Fail every call of `op` until cleared
    pub fn fail_always(&self, op: &str, message: &str) {
        self.persistent_failures
            .lock()
            .unwrap()
            .insert(op.to_string(), message.to_string());
    }

    pub fn clear_failures(&self) {
        self.failures.lock().unwrap().clear();
        self.persistent_failures.lock().unwrap().clear();
    }

    /// Report zero ready replicas for the first `inspects` inspect calls
    pub fn ready_after(&self, inspects: usize) {
        *self.ready_after.lock().unwrap() = Some(inspects);
    }

    /// Never report ready replicas
    pub fn never_ready(&self) {
        *self.ready_after.lock().unwrap() = Some(usize::MAX);
    }

    /// Make every later inspect call wait forever
    pub fn hang_inspect(&self) {
        self.hang_inspect.store(true, Ordering::SeqCst);
    }

    pub fn set_logs(&self, blob: &str) {
        *self.log_blob.lock().unwrap() = blob.to_string();
    }

    pub fn set_stats(&self, stats: RawStats) {
        *self.raw_stats.lock().unwrap() = stats;
    }

    pub fn set_probe_delay(&self, delay: Duration) {
        *self.probe_delay.lock().unwrap() = Some(delay);
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    /// Number of calls of `op`
    pub fn count(&self, op: &str) -> usize {
        self.calls()
            .iter()
            .filter(|c| c.split(':').next() == Some(op))
            .count()
    }

    /// Calls of `op`, with their argument
    pub fn calls_of(&self, op: &str) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter(|c| c.split(':').next() == Some(op))
            .collect()
    }

    pub fn clear_calls(&self) {
        self.calls.lock().unwrap().clear();
    }

    pub fn log_queries(&self) -> Vec<LogQuery> {
        self.log_queries.lock().unwrap().clone()
    }

    pub fn live_instances(&self) -> usize {
        self.instances.lock().unwrap().len()
    }

    fn record(&self, op: &str, arg: &str) -> Result<(), OrchestratorError> {
        self.calls.lock().unwrap().push(format!("{}:{}", op, arg));

        if let Some(message) = self.persistent_failures.lock().unwrap().get(op) {
            return Err(OrchestratorError::ProviderError(message.clone()));
        }
        let next = self
            .failures
            .lock()
            .unwrap()
            .get_mut(op)
            .and_then(|queue| queue.pop_front());
        match next {
            Some(message) => Err(OrchestratorError::ProviderError(message)),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl ProviderAdapter for MockAdapter {
    fn provider_id(&self) -> &str {
        &self.id
    }

    fn kind(&self) -> ProviderKind {
        ProviderKind::Memory
    }

    fn capabilities(&self) -> Capabilities {
        self.capabilities
    }

    async fn create_instance(&self, spec: &InstanceSpec) -> Result<InstanceHandle, OrchestratorError> {
        self.record("create", &format!("{}@{}", spec.name, spec.image))?;
        let n = self.next_handle.fetch_add(1, Ordering::SeqCst);
        let handle = InstanceHandle::new(format!("{}-{}", spec.name, n));
        self.instances
            .lock()
            .unwrap()
            .insert(handle.id.clone(), spec.replicas);
        Ok(handle)
    }

    async fn start(&self, handle: &InstanceHandle) -> Result<(), OrchestratorError> {
        self.record("start", &handle.id)
    }

    async fn stop(&self, handle: &InstanceHandle) -> Result<(), OrchestratorError> {
        self.record("stop", &handle.id)
    }

    async fn remove(&self, handle: &InstanceHandle) -> Result<(), OrchestratorError> {
        self.record("remove", &handle.id)?;
        self.instances.lock().unwrap().remove(&handle.id);
        Ok(())
    }

    async fn inspect(&self, handle: &InstanceHandle) -> Result<RawStatus, OrchestratorError> {
        self.record("inspect", &handle.id)?;
        if self.hang_inspect.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        let seen = self.inspects.fetch_add(1, Ordering::SeqCst);
        let replicas = self
            .instances
            .lock()
            .unwrap()
            .get(&handle.id)
            .copied()
            .unwrap_or(0);
        let ready = match *self.ready_after.lock().unwrap() {
            Some(after) if seen < after => 0,
            _ => replicas,
        };
        Ok(RawStatus {
            running: true,
            state: "running".to_string(),
            desired_replicas: replicas,
            ready_replicas: ready,
            available_replicas: ready,
            message: None,
        })
    }

    async fn logs(&self, handle: &InstanceHandle, options: &LogQuery) -> Result<String, OrchestratorError> {
        self.record("logs", &handle.id)?;
        self.log_queries.lock().unwrap().push(options.clone());
        Ok(self.log_blob.lock().unwrap().clone())
    }

    async fn stats(&self, handle: &InstanceHandle) -> Result<RawStats, OrchestratorError> {
        self.record("stats", &handle.id)?;
        Ok(self.raw_stats.lock().unwrap().clone())
    }

    async fn build_artifact(&self, build: &BuildSpec) -> Result<String, OrchestratorError> {
        let tag = build.tag.clone().unwrap_or_default();
        self.record("build", &tag)?;
        Ok(tag)
    }

    async fn patch(&self, handle: &InstanceHandle, patch: &InstancePatch) -> Result<(), OrchestratorError> {
        if !self.capabilities.in_place_patch && !self.capabilities.native_replicas {
            return Err(OrchestratorError::Unsupported(format!(
                "{} does not support in-place updates",
                self.id
            )));
        }
        let arg = match (&patch.replicas, &patch.version) {
            (Some(replicas), _) => format!("{}=replicas:{}", handle.id, replicas),
            (None, Some(version)) => format!("{}=version:{}", handle.id, version),
            (None, None) => handle.id.clone(),
        };
        self.record("patch", &arg)?;
        if let Some(replicas) = patch.replicas {
            self.instances
                .lock()
                .unwrap()
                .insert(handle.id.clone(), replicas);
        }
        Ok(())
    }

    async fn health_probe(&self) -> Result<(), OrchestratorError> {
        let delay = *self.probe_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.record("probe", &self.id)
    }
}

/// Clock that only moves when slept on
pub struct ManualClock {
    base: Instant,
    elapsed: Mutex<Duration>,
    sleeps: Mutex<Vec<Duration>>,
}

impl ManualClock {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            base: Instant::now(),
            elapsed: Mutex::new(Duration::ZERO),
            sleeps: Mutex::new(Vec::new()),
        })
    }

    pub fn elapsed(&self) -> Duration {
        *self.elapsed.lock().unwrap()
    }

    pub fn sleeps(&self) -> Vec<Duration> {
        self.sleeps.lock().unwrap().clone()
    }
}

#[async_trait]
impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.base + *self.elapsed.lock().unwrap()
    }

    async fn sleep(&self, duration: Duration) {
        *self.elapsed.lock().unwrap() += duration;
        self.sleeps.lock().unwrap().push(duration);
        tokio::task::yield_now().await;
    }
}

/// Artifact store in memory, with per-path write failures
#[derive(Default)]
pub struct MemoryArtifactStore {
    files: Mutex<BTreeMap<String, String>>,
    failing: Mutex<HashSet<String>>,
    writes: Mutex<Vec<String>>,
}

impl MemoryArtifactStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn fail_path(&self, path: &str) {
        self.failing.lock().unwrap().insert(path.to_string());
    }

    /// Paths in the order they were written
    pub fn writes(&self) -> Vec<String> {
        self.writes.lock().unwrap().clone()
    }

    pub fn get(&self, path: &str) -> Option<String> {
        self.files.lock().unwrap().get(path).cloned()
    }
}

#[async_trait]
impl ArtifactStore for MemoryArtifactStore {
    async fn write_artifact(&self, path: &str, content: &str) -> Result<(), OrchestratorError> {
        if self.failing.lock().unwrap().contains(path) {
            return Err(OrchestratorError::ArtifactWriteError(format!(
                "{}: disk full",
                path
            )));
        }
        self.writes.lock().unwrap().push(path.to_string());
        self.files
            .lock()
            .unwrap()
            .insert(path.to_string(), content.to_string());
        Ok(())
    }

    async fn list_artifacts(&self, directory: &str) -> Result<Vec<String>, OrchestratorError> {
        let prefix = format!("{}/", directory.trim_end_matches('/'));
        Ok(self
            .files
            .lock()
            .unwrap()
            .keys()
            .filter(|k| k.starts_with(&prefix))
            .cloned()
            .collect())
    }

    async fn read_artifact(&self, path: &str) -> Result<String, OrchestratorError> {
        self.get(path)
            .ok_or_else(|| OrchestratorError::NotFound(path.to_string()))
    }
}
