//! Kubernetes adapter: a clustered orchestrator driven through `kubectl`
//!
//! Each deployment maps to one `apps/v1` Deployment named after the
//! deployment id. Replica counts, image changes and resource changes are
//! applied in place with strategic-merge patches, which the cluster rolls
//! out gradually.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use tracing::{debug, info};

use crate::deploy::adapter::{
    Capabilities, InstanceHandle, InstancePatch, InstanceSpec, ProviderAdapter, ProviderKind,
    RawStats, RawStatus,
};
use crate::deploy::command;
use crate::errors::OrchestratorError;
use crate::models::deployment::{HealthCheck, LogQuery, PortMapping, ResourceList, ResourceRequirements};

/// Kubernetes adapter options
#[derive(Debug, Clone)]
pub struct Options {
    /// Provider id used in routing tables
    pub provider_id: String,

    /// Path to the kubectl binary
    pub binary: String,

    pub namespace: String,

    /// kubeconfig context; the current context when absent
    pub context: Option<String>,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            provider_id: "kubernetes".to_string(),
            binary: "kubectl".to_string(),
            namespace: "default".to_string(),
            context: None,
        }
    }
}

pub struct KubernetesAdapter {
    options: Options,
}

impl KubernetesAdapter {
    pub fn new(options: Options) -> Self {
        Self { options }
    }

    fn base_args(&self) -> Vec<String> {
        let mut args = Vec::new();
        if let Some(context) = &self.options.context {
            args.push("--context".to_string());
            args.push(context.clone());
        }
        args.push("--namespace".to_string());
        args.push(self.options.namespace.clone());
        args
    }

    async fn kubectl(&self, args: &[&str], stdin: Option<&[u8]>) -> Result<String, OrchestratorError> {
        let mut full = self.base_args();
        full.extend(args.iter().map(|a| a.to_string()));
        command::run(&self.options.binary, &full, stdin).await
    }

    async fn scale_to(&self, handle: &InstanceHandle, replicas: u32) -> Result<(), OrchestratorError> {
        let target = format!("deployment/{}", handle.id);
        let count = format!("--replicas={}", replicas);
        self.kubectl(&["scale", &target, &count], None).await?;
        Ok(())
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DeploymentObject {
    #[serde(default)]
    spec: DeploymentObjectSpec,

    #[serde(default)]
    status: DeploymentObjectStatus,
}

#[derive(Debug, Default, Deserialize)]
struct DeploymentObjectSpec {
    #[serde(default)]
    replicas: u32,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DeploymentObjectStatus {
    #[serde(default)]
    ready_replicas: u32,

    #[serde(default)]
    available_replicas: u32,

    #[serde(default)]
    conditions: Vec<ObjectCondition>,
}

#[derive(Debug, Default, Deserialize)]
struct ObjectCondition {
    #[serde(rename = "type", default)]
    condition_type: String,

    #[serde(default)]
    status: String,

    #[serde(default)]
    message: String,
}

#[async_trait]
impl ProviderAdapter for KubernetesAdapter {
    fn provider_id(&self) -> &str {
        &self.options.provider_id
    }

    fn kind(&self) -> ProviderKind {
        ProviderKind::Kubernetes
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            native_replicas: true,
            in_place_patch: true,
            staged_rollout: true,
            build: false,
        }
    }

    async fn create_instance(&self, spec: &InstanceSpec) -> Result<InstanceHandle, OrchestratorError> {
        info!("Applying deployment {} ({} replicas)", spec.name, spec.replicas);
        let manifest = serde_json::to_vec(&deployment_manifest(spec, &self.options.namespace))?;
        self.kubectl(&["apply", "-f", "-"], Some(&manifest)).await?;
        Ok(InstanceHandle::new(spec.name.clone()))
    }

    async fn start(&self, handle: &InstanceHandle) -> Result<(), OrchestratorError> {
        // Applied deployments start on their own; make sure the object exists.
        let target = format!("deployment/{}", handle.id);
        self.kubectl(&["get", &target, "-o", "name"], None).await?;
        Ok(())
    }

    async fn stop(&self, handle: &InstanceHandle) -> Result<(), OrchestratorError> {
        debug!("Scaling {} to zero", handle);
        self.scale_to(handle, 0).await
    }

    async fn remove(&self, handle: &InstanceHandle) -> Result<(), OrchestratorError> {
        debug!("Deleting deployment {}", handle);
        self.kubectl(&["delete", "deployment", &handle.id, "--ignore-not-found"], None)
            .await?;
        Ok(())
    }

    async fn inspect(&self, handle: &InstanceHandle) -> Result<RawStatus, OrchestratorError> {
        let stdout = self
            .kubectl(&["get", "deployment", &handle.id, "-o", "json"], None)
            .await?;
        let object: DeploymentObject = serde_json::from_str(&stdout)?;
        Ok(status_from_object(&object))
    }

    async fn logs(&self, handle: &InstanceHandle, options: &LogQuery) -> Result<String, OrchestratorError> {
        let mut args = self.base_args();
        args.extend(log_args(handle, options));
        command::run(&self.options.binary, &args, None).await
    }

    async fn stats(&self, handle: &InstanceHandle) -> Result<RawStats, OrchestratorError> {
        let selector = format!("app={}", handle.id);
        let stdout = self
            .kubectl(&["top", "pod", "-l", &selector, "--no-headers"], None)
            .await?;
        Ok(stats_from_top(&handle.id, &stdout))
    }

    async fn patch(&self, handle: &InstanceHandle, patch: &InstancePatch) -> Result<(), OrchestratorError> {
        info!("Patching deployment {}", handle);
        let body = serde_json::to_string(&patch_body(&handle.id, patch))?;
        self.kubectl(
            &["patch", "deployment", &handle.id, "--type=strategic", "-p", &body],
            None,
        )
        .await?;
        Ok(())
    }

    async fn health_probe(&self) -> Result<(), OrchestratorError> {
        self.kubectl(&["get", "--raw", "/readyz"], None).await?;
        Ok(())
    }
}

fn status_from_object(object: &DeploymentObject) -> RawStatus {
    let available = object
        .status
        .conditions
        .iter()
        .find(|c| c.condition_type == "Available");
    RawStatus {
        running: object.spec.replicas > 0 && object.status.available_replicas > 0,
        state: match available {
            Some(c) if c.status == "True" => "available".to_string(),
            Some(_) => "progressing".to_string(),
            None => "unknown".to_string(),
        },
        desired_replicas: object.spec.replicas,
        ready_replicas: object.status.ready_replicas,
        available_replicas: object.status.available_replicas,
        message: available
            .filter(|c| !c.message.is_empty())
            .map(|c| c.message.clone()),
    }
}

/// Arguments for `kubectl logs`. `follow` is ignored: the
/// output is collected after the command exits.
pub fn log_args(handle: &InstanceHandle, options: &LogQuery) -> Vec<String> {
    let mut args = vec!["logs".to_string(), format!("deployment/{}", handle.id)];
    if options.timestamps {
        args.push("--timestamps".to_string());
    }
    if let Some(tail) = options.tail_lines {
        args.push(format!("--tail={}", tail));
    }
    if let Some(since) = options.since {
        args.push(format!("--since-time={}", since.to_rfc3339()));
    }
    args
}

/// Sum `kubectl top pod` rows ("name 250m 64Mi") into container-engine
/// style stats: CPU as a percentage of one core.
fn stats_from_top(name: &str, output: &str) -> RawStats {
    let mut millicores = 0.0;
    let mut mebibytes = 0.0;
    for line in output.lines() {
        let columns: Vec<&str> = line.split_whitespace().collect();
        if columns.len() < 3 {
            continue;
        }
        if let Some(cpu) = columns[1].strip_suffix('m').and_then(|v| v.parse::<f64>().ok()) {
            millicores += cpu;
        }
        if let Some(mem) = columns[2].strip_suffix("Mi").and_then(|v| v.parse::<f64>().ok()) {
            mebibytes += mem;
        }
    }

    RawStats {
        id: name.to_string(),
        cpu_perc: format!("{:.2}%", millicores / 10.0),
        mem_usage: format!("{}MiB / 0B", mebibytes),
        mem_perc: "0.00%".to_string(),
        net_io: String::new(),
        block_io: String::new(),
    }
}

fn resource_list(list: &ResourceList) -> Value {
    let mut map = Map::new();
    if let Some(cpu) = &list.cpu {
        map.insert("cpu".to_string(), json!(cpu));
    }
    if let Some(memory) = &list.memory {
        map.insert("memory".to_string(), json!(memory));
    }
    Value::Object(map)
}

fn resources(resources: &ResourceRequirements) -> Value {
    json!({
        "requests": resource_list(&resources.requests),
        "limits": resource_list(&resources.limits),
    })
}

fn env_list(env: &std::collections::BTreeMap<String, String>) -> Value {
    Value::Array(
        env.iter()
            .map(|(name, value)| json!({ "name": name, "value": value }))
            .collect(),
    )
}

fn liveness_probe(check: &HealthCheck, ports: &[PortMapping]) -> Value {
    let default_port = ports.first().map(|p| p.container_port).unwrap_or(80);
    let mut probe = match check.probe_type.to_lowercase().as_str() {
        "http" | "httpget" => json!({ "httpGet": { "path": check.target, "port": default_port } }),
        "tcp" | "tcpsocket" => {
            let port = check.target.parse::<u16>().unwrap_or(default_port);
            json!({ "tcpSocket": { "port": port } })
        }
        _ => json!({ "exec": { "command": ["sh", "-c", check.target] } }),
    };
    if let Value::Object(map) = &mut probe {
        map.insert("initialDelaySeconds".to_string(), json!(check.initial_delay_seconds));
        map.insert("periodSeconds".to_string(), json!(check.period_seconds));
        map.insert("timeoutSeconds".to_string(), json!(check.timeout_seconds));
        map.insert("failureThreshold".to_string(), json!(check.failure_threshold));
    }
    probe
}

/// `apps/v1` Deployment manifest for `spec`
pub fn deployment_manifest(spec: &InstanceSpec, namespace: &str) -> Value {
    let ports: Vec<Value> = spec
        .ports
        .iter()
        .map(|p| {
            json!({
                "name": p.name,
                "containerPort": p.container_port,
                "protocol": p.protocol.to_uppercase(),
            })
        })
        .collect();

    let mut container = json!({
        "name": spec.name,
        "image": spec.image,
        "ports": ports,
        "resources": resources(&spec.resources),
        "env": env_list(&spec.env),
    });
    if let (Some(check), Value::Object(map)) = (&spec.health_check, &mut container) {
        map.insert("livenessProbe".to_string(), liveness_probe(check, &spec.ports));
    }

    json!({
        "apiVersion": "apps/v1",
        "kind": "Deployment",
        "metadata": {
            "name": spec.name,
            "namespace": namespace,
            "labels": spec.labels,
        },
        "spec": {
            "replicas": spec.replicas,
            "selector": { "matchLabels": { "app": spec.name } },
            "strategy": { "type": "RollingUpdate" },
            "template": {
                "metadata": { "labels": spec.labels },
                "spec": { "containers": [container] },
            },
        },
    })
}

/// Strategic-merge patch body for `patch`
pub fn patch_body(name: &str, patch: &InstancePatch) -> Value {
    let mut container = Map::new();
    container.insert("name".to_string(), json!(name));
    if let Some(image) = &patch.image {
        container.insert("image".to_string(), json!(image));
    }
    if let Some(res) = &patch.resources {
        container.insert("resources".to_string(), resources(res));
    }
    if let Some(env) = &patch.env {
        container.insert("env".to_string(), env_list(env));
    }

    let mut spec = Map::new();
    if let Some(replicas) = patch.replicas {
        spec.insert("replicas".to_string(), json!(replicas));
    }
    if container.len() > 1 {
        let mut template = json!({ "spec": { "containers": [Value::Object(container)] } });
        if let (Some(version), Value::Object(map)) = (&patch.version, &mut template) {
            map.insert(
                "metadata".to_string(),
                json!({ "labels": { "skyward.version": version } }),
            );
        }
        spec.insert("template".to_string(), template);
    }

    json!({ "spec": Value::Object(spec) })
}
