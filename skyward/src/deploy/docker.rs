//! Docker adapter: a single-instance container engine driven through the
//! `docker` CLI

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, info};

use crate::deploy::adapter::{
    Capabilities, InstanceHandle, InstanceSpec, ProviderAdapter, ProviderKind, RawStats, RawStatus,
};
use crate::deploy::command;
use crate::errors::OrchestratorError;
use crate::models::deployment::{BuildSpec, HealthCheck, LogQuery};

/// Docker adapter options
#[derive(Debug, Clone)]
pub struct Options {
    /// Provider id used in routing tables
    pub provider_id: String,

    /// Path to the docker binary
    pub binary: String,

    /// Restart policy passed to `docker create`
    pub restart_policy: String,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            provider_id: "docker".to_string(),
            binary: "docker".to_string(),
            restart_policy: "unless-stopped".to_string(),
        }
    }
}

pub struct DockerAdapter {
    options: Options,
}

impl DockerAdapter {
    pub fn new(options: Options) -> Self {
        Self { options }
    }

    async fn docker(&self, args: Vec<String>) -> Result<String, OrchestratorError> {
        command::run(&self.options.binary, &args, None).await
    }
}

#[derive(Debug, Deserialize)]
struct ContainerState {
    #[serde(rename = "Running", default)]
    running: bool,

    #[serde(rename = "Status", default)]
    status: String,

    #[serde(rename = "Health", default)]
    health: Option<ContainerHealth>,

    #[serde(rename = "Error", default)]
    error: String,
}

#[derive(Debug, Deserialize)]
struct ContainerHealth {
    #[serde(rename = "Status", default)]
    status: String,
}

#[async_trait]
impl ProviderAdapter for DockerAdapter {
    fn provider_id(&self) -> &str {
        &self.options.provider_id
    }

    fn kind(&self) -> ProviderKind {
        ProviderKind::Docker
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            native_replicas: false,
            in_place_patch: false,
            staged_rollout: false,
            build: true,
        }
    }

    async fn create_instance(&self, spec: &InstanceSpec) -> Result<InstanceHandle, OrchestratorError> {
        info!("Creating container {} from {}", spec.name, spec.image);
        let stdout = self.docker(create_args(spec, &self.options.restart_policy)).await?;
        let container_id = stdout.trim();
        if container_id.is_empty() {
            return Err(OrchestratorError::ProviderError(format!(
                "docker create returned no container id for {}",
                spec.name
            )));
        }
        Ok(InstanceHandle::new(container_id))
    }

    async fn start(&self, handle: &InstanceHandle) -> Result<(), OrchestratorError> {
        debug!("Starting container: {}", handle);
        self.docker(vec!["start".to_string(), handle.id.clone()]).await?;
        Ok(())
    }

    async fn stop(&self, handle: &InstanceHandle) -> Result<(), OrchestratorError> {
        debug!("Stopping container: {}", handle);
        self.docker(vec!["stop".to_string(), handle.id.clone()]).await?;
        Ok(())
    }

    async fn remove(&self, handle: &InstanceHandle) -> Result<(), OrchestratorError> {
        debug!("Removing container: {}", handle);
        self.docker(vec!["rm".to_string(), handle.id.clone()]).await?;
        Ok(())
    }

    async fn inspect(&self, handle: &InstanceHandle) -> Result<RawStatus, OrchestratorError> {
        let stdout = self
            .docker(vec![
                "inspect".to_string(),
                "--format".to_string(),
                "{{json .State}}".to_string(),
                handle.id.clone(),
            ])
            .await?;
        let state: ContainerState = serde_json::from_str(stdout.trim())?;
        Ok(status_from_state(&state))
    }

    async fn logs(&self, handle: &InstanceHandle, options: &LogQuery) -> Result<String, OrchestratorError> {
        command::run_combined(&self.options.binary, &log_args(handle, options)).await
    }

    async fn stats(&self, handle: &InstanceHandle) -> Result<RawStats, OrchestratorError> {
        let stdout = self
            .docker(vec![
                "stats".to_string(),
                "--no-stream".to_string(),
                "--format".to_string(),
                "{{json .}}".to_string(),
                handle.id.clone(),
            ])
            .await?;
        let line = stdout.lines().find(|l| !l.trim().is_empty()).unwrap_or_default();
        Ok(serde_json::from_str(line)?)
    }

    async fn build_artifact(&self, build: &BuildSpec) -> Result<String, OrchestratorError> {
        let tag = build.tag.clone().ok_or_else(|| {
            OrchestratorError::ValidationError("Build tag is required".to_string())
        })?;
        info!("Building image {} from {}", tag, build.context);
        self.docker(build_args(build, &tag)).await?;
        Ok(tag)
    }

    async fn health_probe(&self) -> Result<(), OrchestratorError> {
        self.docker(vec![
            "version".to_string(),
            "--format".to_string(),
            "{{.Server.Version}}".to_string(),
        ])
        .await?;
        Ok(())
    }
}

fn status_from_state(state: &ContainerState) -> RawStatus {
    let health = state.health.as_ref().map(|h| h.status.as_str());
    let ready = state.running && !matches!(health, Some("unhealthy") | Some("starting"));
    RawStatus {
        running: state.running,
        state: state.status.clone(),
        desired_replicas: 1,
        ready_replicas: u32::from(ready),
        available_replicas: u32::from(state.running),
        message: (!state.error.is_empty()).then(|| state.error.clone()),
    }
}

/// Arguments for `docker create`
pub fn create_args(spec: &InstanceSpec, restart_policy: &str) -> Vec<String> {
    let mut args = vec![
        "create".to_string(),
        "--name".to_string(),
        spec.name.clone(),
        "--restart".to_string(),
        restart_policy.to_string(),
    ];

    for port in &spec.ports {
        let protocol = port.protocol.to_lowercase();
        args.push("-p".to_string());
        if protocol == "tcp" {
            args.push(format!("{0}:{0}", port.container_port));
        } else {
            args.push(format!("{0}:{0}/{1}", port.container_port, protocol));
        }
    }

    let limits = &spec.resources.limits;
    if let Some(memory) = limits.memory.as_deref().and_then(memory_flag) {
        args.push("--memory".to_string());
        args.push(memory);
    }
    if let Some(cpus) = limits.cpu.as_deref().and_then(cpus_flag) {
        args.push("--cpus".to_string());
        args.push(cpus);
    }
    if let Some(reservation) = spec.resources.requests.memory.as_deref().and_then(memory_flag) {
        args.push("--memory-reservation".to_string());
        args.push(reservation);
    }

    for (key, value) in &spec.env {
        args.push("-e".to_string());
        args.push(format!("{}={}", key, value));
    }
    for (key, value) in &spec.labels {
        args.push("--label".to_string());
        args.push(format!("{}={}", key, value));
    }

    if let Some(check) = &spec.health_check {
        args.extend(health_args(check));
    }

    args.push(spec.image.clone());
    args
}

fn health_args(check: &HealthCheck) -> Vec<String> {
    let cmd = match check.probe_type.to_lowercase().as_str() {
        "http" | "httpget" => {
            let path = if check.target.starts_with('/') {
                format!("http://localhost{}", check.target)
            } else {
                check.target.clone()
            };
            format!("curl -fsS {} || exit 1", path)
        }
        "tcp" | "tcpsocket" => format!("nc -z localhost {} || exit 1", check.target),
        _ => check.target.clone(),
    };

    vec![
        "--health-cmd".to_string(),
        cmd,
        "--health-interval".to_string(),
        format!("{}s", check.period_seconds),
        "--health-timeout".to_string(),
        format!("{}s", check.timeout_seconds),
        "--health-retries".to_string(),
        check.failure_threshold.to_string(),
        "--health-start-period".to_string(),
        format!("{}s", check.initial_delay_seconds),
    ]
}

/// Arguments for `docker logs`. `follow` is ignored: the
/// output is collected after the command exits.
pub fn log_args(handle: &InstanceHandle, options: &LogQuery) -> Vec<String> {
    let mut args = vec!["logs".to_string()];
    if options.timestamps {
        args.push("--timestamps".to_string());
    }
    if let Some(tail) = options.tail_lines {
        args.push("--tail".to_string());
        args.push(tail.to_string());
    }
    if let Some(since) = options.since {
        args.push("--since".to_string());
        args.push(since.to_rfc3339());
    }
    args.push(handle.id.clone());
    args
}

/// Arguments for `docker build`
pub fn build_args(build: &BuildSpec, tag: &str) -> Vec<String> {
    let mut args = vec!["build".to_string(), "-t".to_string(), tag.to_string()];
    if let Some(dockerfile) = &build.dockerfile {
        args.push("-f".to_string());
        args.push(dockerfile.clone());
    }
    for (key, value) in &build.args {
        args.push("--build-arg".to_string());
        args.push(format!("{}={}", key, value));
    }
    args.push(build.context.clone());
    args
}

/// Translate a memory quantity ("256Mi", "1G", "1048576") to docker's
/// `--memory` syntax
pub fn memory_flag(quantity: &str) -> Option<String> {
    let quantity = quantity.trim();
    let split = quantity
        .find(|c: char| !c.is_ascii_digit() && c != '.')
        .unwrap_or(quantity.len());
    let (number, unit) = quantity.split_at(split);
    if number.is_empty() {
        return None;
    }

    let suffix = match unit {
        "" => "b",
        "Ki" | "K" | "k" => "k",
        "Mi" | "M" | "m" => "m",
        "Gi" | "G" | "g" => "g",
        _ => return None,
    };
    Some(format!("{}{}", number, suffix))
}

/// Translate a CPU quantity ("500m", "2", "0.5") to docker's `--cpus`
pub fn cpus_flag(quantity: &str) -> Option<String> {
    let quantity = quantity.trim();
    let cpus = match quantity.strip_suffix('m') {
        Some(millis) => millis.parse::<f64>().ok()? / 1000.0,
        None => quantity.parse::<f64>().ok()?,
    };
    if cpus <= 0.0 {
        return None;
    }
    Some(format!("{}", cpus))
}
