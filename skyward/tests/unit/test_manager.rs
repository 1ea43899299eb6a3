//! Deployment manager tests

mod common;

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio_test::{assert_err, assert_ok};

use common::{clustered, config, replicas, single_instance, ManualClock, MockAdapter};
use skyward::deploy::adapter::RawStats;
use skyward::deploy::events::{LifecycleEvent, Operation};
use skyward::deploy::fsm::DeploymentPhase;
use skyward::deploy::manager::{DeploymentManager, ManagerOptions};
use skyward::deploy::rollout::RolloutOptions;
use skyward::models::deployment::{
    BuildSpec, ComposeProject, DeploymentPatch, DeploymentStrategy, LogQuery, ResourceList,
    ResourceRequirements, RollbackStrategy,
};

fn record_events(manager: &DeploymentManager) -> Arc<Mutex<Vec<LifecycleEvent>>> {
    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = events.clone();
    manager.subscribe(move |event| sink.lock().unwrap().push(event.clone()));
    events
}

// ================================ DEPLOY ================================ //

#[tokio::test]
async fn test_deploy_then_status_is_running_with_min_replicas() {
    let adapter = MockAdapter::new("docker", single_instance());
    let manager = adapter.manager();

    let mut cfg = config("d1", "1.0.0");
    cfg.scaling = replicas(1, 1);
    let result = manager.deploy(cfg).await;
    assert!(result.success, "{}", result.message);
    assert_eq!(result.deployment_id, "d1");

    let status = manager.get_status("d1").await;
    assert_eq!(status.phase, DeploymentPhase::Running);
    assert_eq!(status.replicas.desired, 1);
    assert_eq!(status.replicas.ready, 1);

    let deployment = manager.get("d1").await.unwrap();
    assert_eq!(deployment.revision_history.len(), 1);
    assert_eq!(deployment.current_revision().unwrap().revision_number, 1);
    assert_eq!(adapter.calls_of("create"), vec!["create:d1@registry.local/app:1.0.0"]);
}

#[tokio::test]
async fn test_deploy_on_clustered_backend_uses_min_replicas() {
    let adapter = MockAdapter::new("k8s", clustered());
    let manager = adapter.manager();

    let mut cfg = config("api", "2.1.0");
    cfg.scaling = replicas(3, 5);
    assert!(manager.deploy(cfg).await.success);

    let status = manager.get_status("api").await;
    assert_eq!(status.phase, DeploymentPhase::Running);
    assert_eq!(status.replicas.desired, 3);
    assert_eq!(status.replicas.available, 3);
    assert_eq!(status.conditions[0].status, "True");
}

#[tokio::test]
async fn test_deploy_validation_makes_no_provider_call() {
    let adapter = MockAdapter::new("docker", single_instance());
    let manager = adapter.manager();
    let events = record_events(&manager);

    let result = manager.deploy(config("", "1.0.0")).await;
    assert!(!result.success);
    assert!(result.message.contains("Deployment ID is required"));

    let mut cfg = config("d1", "1.0.0");
    cfg.name = String::new();
    let result = manager.deploy(cfg).await;
    assert!(result.message.contains("Deployment name is required"));

    let mut cfg = config("d1", "1.0.0");
    cfg.scaling = replicas(4, 2);
    let result = manager.deploy(cfg).await;
    assert!(!result.success);
    assert!(result.message.contains("minReplicas (4) must not exceed maxReplicas (2)"));

    assert!(adapter.calls().is_empty());
    assert!(events.lock().unwrap().is_empty());
    assert!(manager.list().await.is_empty());
}

#[tokio::test]
async fn test_deploy_multiple_replicas_on_single_instance_backend_rejected() {
    let adapter = MockAdapter::new("docker", single_instance());
    let manager = adapter.manager();

    let mut cfg = config("d1", "1.0.0");
    cfg.scaling = replicas(2, 3);
    let result = manager.deploy(cfg).await;
    assert!(!result.success);
    assert!(result.message.contains("requires a clustered backend"));
    assert!(adapter.calls().is_empty());
}

#[tokio::test]
async fn test_update_to_multiple_replicas_on_single_instance_backend_rejected() {
    let adapter = MockAdapter::new("docker", single_instance());
    let manager = adapter.manager();
    assert!(manager.deploy(config("d1", "1.0.0")).await.success);
    adapter.clear_calls();

    let patch = DeploymentPatch {
        scaling: Some(replicas(3, 5)),
        ..Default::default()
    };
    let result = manager.update("d1", patch).await;
    assert!(!result.success);
    assert!(result.message.contains("requires a clustered backend"));
    assert!(adapter.calls().is_empty());

    let stored = manager.get("d1").await.unwrap();
    assert_eq!(stored.config.scaling.min_replicas, 1);
    assert_eq!(stored.replicas.desired, 1);
    assert_eq!(stored.revision_history.len(), 1);
    assert_eq!(stored.phase, DeploymentPhase::Running);
}

#[tokio::test]
async fn test_deploy_provider_failure_emits_failed_and_cleans_up() {
    let adapter = MockAdapter::new("docker", single_instance());
    let manager = adapter.manager();
    let events = record_events(&manager);

    adapter.fail_next("start", "port is already allocated");
    let result = manager.deploy(config("d1", "1.0.0")).await;

    assert!(!result.success);
    assert!(result.message.contains("port is already allocated"));
    assert_eq!(adapter.count("remove"), 1);
    assert_eq!(adapter.live_instances(), 0);
    assert!(!manager.contains("d1").await);
    assert_eq!(manager.get_status("d1").await.phase, DeploymentPhase::Unknown);

    let events = events.lock().unwrap();
    assert_eq!(events.len(), 2);
    assert!(matches!(
        events[0],
        LifecycleEvent::DeploymentStarted { operation: Operation::Deploy, .. }
    ));
    match &events[1] {
        LifecycleEvent::DeploymentFailed { error, .. } => {
            assert!(error.contains("port is already allocated"))
        }
        other => panic!("unexpected event {:?}", other),
    }
}

#[tokio::test]
async fn test_deploy_existing_id_is_rejected() {
    let adapter = MockAdapter::new("docker", single_instance());
    let manager = adapter.manager();

    assert!(manager.deploy(config("d1", "1.0.0")).await.success);
    let result = manager.deploy(config("d1", "2.0.0")).await;
    assert!(!result.success);
    assert!(result.message.contains("already exists"));
    assert_eq!(adapter.count("create"), 1);
}

#[tokio::test]
async fn test_deploy_builds_artifact_first() {
    let adapter = MockAdapter::new("docker", single_instance());
    let manager = adapter.manager();

    let mut cfg = config("web", "3.0.0");
    cfg.image = String::new();
    cfg.build = Some(BuildSpec {
        context: "./web".to_string(),
        dockerfile: None,
        tag: None,
        args: BTreeMap::new(),
    });
    let result = manager.deploy(cfg).await;
    assert!(result.success, "{}", result.message);

    let calls = adapter.calls();
    assert_eq!(calls[0], "build:app:3.0.0");
    assert_eq!(calls[1], "create:web@app:3.0.0");

    let deployment = manager.get("web").await.unwrap();
    assert_eq!(deployment.config.image, "app:3.0.0");
}

#[tokio::test]
async fn test_deploy_build_on_backend_without_builds_fails() {
    let adapter = MockAdapter::new("k8s", clustered());
    let manager = adapter.manager();

    let mut cfg = config("web", "3.0.0");
    cfg.build = Some(BuildSpec {
        context: ".".to_string(),
        dockerfile: None,
        tag: Some("web:3".to_string()),
        args: BTreeMap::new(),
    });
    let result = manager.deploy(cfg).await;
    assert!(!result.success);
    assert!(result.message.contains("does not support artifact builds"));
    assert!(adapter.calls().is_empty());
}

// ================================ UPDATE ================================ //

#[tokio::test]
async fn test_update_then_rollback_restores_previous_version() {
    let adapter = MockAdapter::new("docker", single_instance());
    let manager = adapter.manager();

    assert!(manager.deploy(config("d1", "1.0.0")).await.success);
    let result = manager.update("d1", DeploymentPatch::version("2.0.0")).await;
    assert!(result.success, "{}", result.message);
    assert_eq!(manager.get("d1").await.unwrap().config.version, "2.0.0");

    let result = manager.rollback("d1", None).await;
    assert!(result.success, "{}", result.message);

    let info = result.rollback_info.unwrap();
    assert_eq!(info.previous_version, "2.0.0");
    assert_eq!(info.target_revision, 1);
    assert_eq!(info.rollback_strategy, RollbackStrategy::Immediate);

    let deployment = manager.get("d1").await.unwrap();
    assert_eq!(deployment.config.version, "1.0.0");
    assert_eq!(deployment.phase, DeploymentPhase::Running);
    let numbers: Vec<u64> = deployment
        .revision_history
        .iter()
        .map(|r| r.revision_number)
        .collect();
    assert_eq!(numbers, vec![1, 2, 3]);
}

#[tokio::test]
async fn test_update_recreates_on_single_instance_backend() {
    let adapter = MockAdapter::new("docker", single_instance());
    let manager = adapter.manager();

    assert!(manager.deploy(config("d1", "1.0.0")).await.success);
    adapter.clear_calls();

    assert!(manager.update("d1", DeploymentPatch::version("1.1.0")).await.success);
    assert_eq!(
        adapter.calls(),
        vec![
            "stop:d1-1",
            "remove:d1-1",
            "create:d1@registry.local/app:1.1.0",
            "start:d1-2",
        ]
    );
    assert_eq!(adapter.count("patch"), 0);
}

#[tokio::test]
async fn test_rolling_update_patches_in_place_on_clustered_backend() {
    let adapter = MockAdapter::new("k8s", clustered());
    let manager = adapter.manager();

    assert!(manager.deploy(config("api", "1.0.0")).await.success);
    adapter.clear_calls();

    assert!(manager.update("api", DeploymentPatch::version("1.1.0")).await.success);
    assert_eq!(adapter.calls(), vec!["patch:api-1=version:1.1.0"]);

    // Recreate strategy bypasses the patch even when it is available
    let patch = DeploymentPatch {
        version: Some("1.2.0".to_string()),
        strategy: Some(DeploymentStrategy::Recreate),
        ..Default::default()
    };
    adapter.clear_calls();
    assert!(manager.update("api", patch).await.success);
    assert_eq!(adapter.count("patch"), 0);
    assert_eq!(adapter.count("create"), 1);
}

#[tokio::test]
async fn test_update_failure_leaves_record_untouched() {
    let adapter = MockAdapter::new("k8s", clustered());
    let manager = adapter.manager();
    assert!(manager.deploy(config("api", "1.0.0")).await.success);
    let before = manager.get("api").await.unwrap();

    adapter.fail_next("patch", "admission webhook denied the request");
    let result = manager.update("api", DeploymentPatch::version("2.0.0")).await;
    assert!(!result.success);
    assert!(result.message.starts_with("Update failed"));
    assert!(result.message.contains("admission webhook denied the request"));

    let after = manager.get("api").await.unwrap();
    assert_eq!(after.config, before.config);
    assert_eq!(after.replicas, before.replicas);
    assert_eq!(after.revision_history, before.revision_history);
    assert_eq!(after.phase, DeploymentPhase::Running);
}

#[tokio::test]
async fn test_destructive_update_failure_marks_failed_then_recovers() {
    let adapter = MockAdapter::new("docker", single_instance());
    let manager = adapter.manager();
    assert!(manager.deploy(config("d1", "1.0.0")).await.success);

    adapter.fail_next("create", "no space left on device");
    let result = manager.update("d1", DeploymentPatch::version("2.0.0")).await;
    assert!(!result.success);

    let deployment = manager.get("d1").await.unwrap();
    assert_eq!(deployment.phase, DeploymentPhase::Failed);
    assert!(deployment.instance.is_none());
    assert_eq!(deployment.config.version, "1.0.0");
    assert_eq!(manager.get_status("d1").await.phase, DeploymentPhase::Failed);

    let result = manager.update("d1", DeploymentPatch::version("2.0.0")).await;
    assert!(result.success, "{}", result.message);
    let deployment = manager.get("d1").await.unwrap();
    assert_eq!(deployment.phase, DeploymentPhase::Running);
    assert_eq!(deployment.config.version, "2.0.0");
}

#[tokio::test]
async fn test_update_replaces_resources_wholesale() {
    let adapter = MockAdapter::new("docker", single_instance());
    let manager = adapter.manager();

    let mut cfg = config("d1", "1.0.0");
    cfg.resources.requests = ResourceList {
        cpu: Some("250m".to_string()),
        memory: Some("128Mi".to_string()),
    };
    assert!(manager.deploy(cfg).await.success);

    let patch = DeploymentPatch {
        resources: Some(ResourceRequirements {
            requests: ResourceList {
                cpu: Some("1".to_string()),
                memory: None,
            },
            limits: ResourceList::default(),
        }),
        ..Default::default()
    };
    assert!(manager.update("d1", patch).await.success);

    let resources = manager.get("d1").await.unwrap().config.resources;
    assert_eq!(resources.requests.cpu.as_deref(), Some("1"));
    assert_eq!(resources.requests.memory, None);
}

#[tokio::test]
async fn test_update_invalid_patch_makes_no_provider_call() {
    let adapter = MockAdapter::new("docker", single_instance());
    let manager = adapter.manager();
    assert!(manager.deploy(config("d1", "1.0.0")).await.success);
    adapter.clear_calls();

    let patch = DeploymentPatch {
        name: Some(String::new()),
        ..Default::default()
    };
    let result = manager.update("d1", patch).await;
    assert!(!result.success);
    assert!(result.message.contains("Deployment name is required"));
    assert!(adapter.calls().is_empty());
}

#[tokio::test]
async fn test_mutations_on_unknown_id_fail() {
    let adapter = MockAdapter::new("docker", single_instance());
    let manager = adapter.manager();

    for result in [
        manager.update("ghost", DeploymentPatch::version("2")).await,
        manager.rollback("ghost", None).await,
        manager.scale("ghost", 1).await,
    ] {
        assert!(!result.success);
        assert!(result.message.contains("not found"));
    }
    assert!(adapter.calls().is_empty());
}

// =============================== ROLLBACK =============================== //

#[tokio::test]
async fn test_rollback_unknown_target_version_leaves_history() {
    let adapter = MockAdapter::new("docker", single_instance());
    let manager = adapter.manager();
    assert!(manager.deploy(config("d1", "1.0.0")).await.success);
    assert!(manager.update("d1", DeploymentPatch::version("2.0.0")).await.success);
    let history = manager.get("d1").await.unwrap().revision_history;
    adapter.clear_calls();

    let result = manager.rollback("d1", Some("9.9.9")).await;
    assert!(!result.success);
    assert!(result.message.contains("not found"));
    assert!(result.rollback_info.is_none());
    assert_eq!(manager.get("d1").await.unwrap().revision_history, history);
    assert!(adapter.calls().is_empty());
}

#[tokio::test]
async fn test_rollback_without_previous_revision_fails() {
    let adapter = MockAdapter::new("docker", single_instance());
    let manager = adapter.manager();
    assert!(manager.deploy(config("d1", "1.0.0")).await.success);

    let result = manager.rollback("d1", None).await;
    assert!(!result.success);
    assert!(result.message.contains("no previous revision"));
}

#[tokio::test]
async fn test_rollback_to_target_version_is_gradual_on_clustered_backend() {
    let adapter = MockAdapter::new("k8s", clustered());
    let manager = adapter.manager();
    assert!(manager.deploy(config("api", "1.0.0")).await.success);
    assert!(manager.update("api", DeploymentPatch::version("2.0.0")).await.success);
    assert!(manager.update("api", DeploymentPatch::version("3.0.0")).await.success);
    adapter.clear_calls();

    let result = manager.rollback("api", Some("1.0.0")).await;
    assert!(result.success, "{}", result.message);
    let info = result.rollback_info.unwrap();
    assert_eq!(info.previous_version, "3.0.0");
    assert_eq!(info.target_revision, 1);
    assert_eq!(info.rollback_strategy, RollbackStrategy::Gradual);
    assert_eq!(adapter.calls(), vec!["patch:api-1=version:1.0.0"]);

    let deployment = manager.get("api").await.unwrap();
    assert_eq!(deployment.config.version, "1.0.0");
    assert_eq!(deployment.current_revision().unwrap().revision_number, 4);
}

#[tokio::test]
async fn test_rollback_provider_failure() {
    let adapter = MockAdapter::new("k8s", clustered());
    let manager = adapter.manager();
    assert!(manager.deploy(config("api", "1.0.0")).await.success);
    assert!(manager.update("api", DeploymentPatch::version("2.0.0")).await.success);

    adapter.fail_next("patch", "etcd leader changed");
    let result = manager.rollback("api", None).await;
    assert!(!result.success);
    assert!(result.message.starts_with("Rollback failed"));
    assert!(result.message.contains("etcd leader changed"));

    let deployment = manager.get("api").await.unwrap();
    assert_eq!(deployment.config.version, "2.0.0");
    assert_eq!(deployment.revision_history.len(), 2);
    assert_eq!(deployment.phase, DeploymentPhase::Running);
}

#[tokio::test]
async fn test_revision_history_is_capped() {
    let adapter = MockAdapter::new("k8s", clustered());
    let options = ManagerOptions {
        max_revision_history: 3,
        ..Default::default()
    };
    let manager = DeploymentManager::new(adapter.clone(), options);

    assert!(manager.deploy(config("api", "1")).await.success);
    for version in ["2", "3", "4", "5"] {
        assert!(manager.update("api", DeploymentPatch::version(version)).await.success);
    }

    let numbers: Vec<u64> = manager
        .get("api")
        .await
        .unwrap()
        .revision_history
        .iter()
        .map(|r| r.revision_number)
        .collect();
    assert_eq!(numbers, vec![3, 4, 5]);
}

// ================================ SCALE ================================= //

#[tokio::test]
async fn test_scale_to_zero_and_back_on_single_instance_backend() {
    let adapter = MockAdapter::new("docker", single_instance());
    let manager = adapter.manager();
    assert!(manager.deploy(config("d1", "1.0.0")).await.success);
    adapter.clear_calls();

    let result = manager.scale("d1", 0).await;
    assert!(result.success, "{}", result.message);
    let status = manager.get_status("d1").await;
    assert_eq!(status.phase, DeploymentPhase::Stopped);
    assert_eq!(status.replicas.desired, 0);

    let result = manager.scale("d1", 1).await;
    assert!(result.success, "{}", result.message);
    assert_eq!(manager.get_status("d1").await.phase, DeploymentPhase::Running);

    assert_eq!(adapter.count("stop"), 1);
    assert_eq!(adapter.count("remove"), 1);
    assert_eq!(adapter.count("create"), 1);
    assert_eq!(adapter.count("start"), 1);
}

#[tokio::test]
async fn test_scale_is_idempotent_at_current_count() {
    let adapter = MockAdapter::new("docker", single_instance());
    let manager = adapter.manager();
    assert!(manager.deploy(config("d1", "1.0.0")).await.success);
    adapter.clear_calls();

    assert!(manager.scale("d1", 1).await.success);
    assert!(manager.scale("d1", 0).await.success);
    assert!(manager.scale("d1", 0).await.success);
    assert_eq!(adapter.count("stop"), 1);
}

#[tokio::test]
async fn test_scale_above_one_on_single_instance_backend_rejected() {
    let adapter = MockAdapter::new("docker", single_instance());
    let manager = adapter.manager();
    assert!(manager.deploy(config("d1", "1.0.0")).await.success);
    adapter.clear_calls();

    let result = manager.scale("d1", 3).await;
    assert!(!result.success);
    assert!(result.message.contains("multi-replica support requires a clustered backend"));
    assert!(adapter.calls().is_empty());
    assert_eq!(manager.get_status("d1").await.phase, DeploymentPhase::Running);
}

#[tokio::test]
async fn test_scale_on_clustered_backend_patches_replicas() {
    let adapter = MockAdapter::new("k8s", clustered());
    let manager = adapter.manager();
    assert!(manager.deploy(config("api", "1.0.0")).await.success);
    adapter.clear_calls();

    assert!(manager.scale("api", 5).await.success);
    assert_eq!(adapter.calls(), vec!["patch:api-1=replicas:5"]);

    let status = manager.get_status("api").await;
    assert_eq!(status.replicas.desired, 5);
    assert_eq!(status.replicas.ready, 5);

    adapter.fail_next("patch", "quota exceeded");
    let result = manager.scale("api", 50).await;
    assert!(!result.success);
    assert!(result.message.contains("quota exceeded"));
    assert_eq!(manager.get("api").await.unwrap().replicas.desired, 5);
}

// ================================ STATUS ================================ //

#[tokio::test]
async fn test_status_of_unknown_id_makes_no_provider_call() {
    let adapter = MockAdapter::new("docker", single_instance());
    let manager = adapter.manager();

    let status = manager.get_status("unknown-id").await;
    assert_eq!(status.phase, DeploymentPhase::Unknown);
    assert_eq!(status.replicas.desired, 0);
    assert_eq!(status.replicas.ready, 0);
    assert_eq!(status.replicas.available, 0);
    assert!(adapter.calls().is_empty());
}

#[tokio::test]
async fn test_status_inspect_failure_is_reported_as_condition() {
    let adapter = MockAdapter::new("docker", single_instance());
    let manager = adapter.manager();
    assert!(manager.deploy(config("d1", "1.0.0")).await.success);

    adapter.fail_next("inspect", "daemon not responding");
    let status = manager.get_status("d1").await;
    assert_eq!(status.phase, DeploymentPhase::Unknown);
    assert_eq!(status.conditions.len(), 1);
    let condition = &status.conditions[0];
    assert_eq!(condition.condition_type, "Available");
    assert_eq!(condition.status, "False");
    assert_eq!(condition.reason.as_deref(), Some("StatusCheckFailed"));
    assert!(condition.message.as_deref().unwrap().contains("daemon not responding"));

    // The record itself is unaffected
    assert_eq!(manager.get_status("d1").await.phase, DeploymentPhase::Running);
}

#[tokio::test]
async fn test_get_logs_splits_lines_and_forwards_options() {
    let adapter = MockAdapter::new("docker", single_instance());
    let manager = adapter.manager();
    let mut cfg = config("d1", "1.0.0");
    cfg.scaling = replicas(1, 1);
    assert!(manager.deploy(cfg).await.success);

    adapter.set_logs("a\nb\nc");
    let query = LogQuery {
        tail_lines: Some(3),
        timestamps: true,
        ..Default::default()
    };
    let lines = assert_ok!(manager.get_logs("d1", &query).await);
    assert_eq!(lines, vec!["a", "b", "c"]);
    assert_eq!(adapter.log_queries(), vec![query]);

    let err = assert_err!(manager.get_logs("nope", &LogQuery::default()).await);
    assert!(err.to_string().contains("not found"));
}

#[tokio::test]
async fn test_container_stats_are_normalized() {
    let adapter = MockAdapter::new("docker", single_instance());
    let manager = adapter.manager();
    assert!(manager.deploy(config("d1", "1.0.0")).await.success);

    adapter.set_stats(RawStats {
        id: String::new(),
        cpu_perc: "12.5%".to_string(),
        mem_usage: "100MiB / 2GiB".to_string(),
        mem_perc: "4.88%".to_string(),
        net_io: "1kB / 2kB".to_string(),
        block_io: "0B / 0B".to_string(),
    });
    let stats = assert_ok!(manager.get_container_stats("d1").await);
    assert_eq!(stats.container_id, "d1-1");
    assert_eq!(stats.cpu.percent, 12.5);
    assert_eq!(stats.memory.usage_bytes, 100 * 1024 * 1024);
    assert_eq!(stats.memory.limit_bytes, 2 * 1024 * 1024 * 1024);
    assert_eq!(stats.network.rx_bytes, 1000);
    assert_eq!(stats.network.tx_bytes, 2000);
}

// ================================ DELETE ================================ //

#[tokio::test]
async fn test_delete_is_idempotent() {
    let adapter = MockAdapter::new("docker", single_instance());
    let manager = adapter.manager();

    assert!(manager.delete("never-deployed").await.success);
    assert!(adapter.calls().is_empty());

    assert!(manager.deploy(config("d1", "1.0.0")).await.success);
    assert!(manager.delete("d1").await.success);
    assert!(manager.delete("d1").await.success);

    assert_eq!(adapter.count("remove"), 1);
    assert!(!manager.contains("d1").await);
    assert_eq!(manager.get_status("d1").await.phase, DeploymentPhase::Unknown);
}

#[tokio::test]
async fn test_delete_continues_when_stop_fails() {
    let adapter = MockAdapter::new("docker", single_instance());
    let manager = adapter.manager();
    assert!(manager.deploy(config("d1", "1.0.0")).await.success);

    adapter.fail_next("stop", "container already stopped");
    assert!(manager.delete("d1").await.success);
    assert_eq!(adapter.live_instances(), 0);

    assert!(manager.deploy(config("d2", "1.0.0")).await.success);
    adapter.fail_next("remove", "device busy");
    let result = manager.delete("d2").await;
    assert!(!result.success);
    assert!(result.message.contains("device busy"));
    assert!(manager.contains("d2").await);
}

// ================================ EVENTS ================================ //

#[tokio::test]
async fn test_events_fire_once_per_call_until_unsubscribed() {
    let adapter = MockAdapter::new("docker", single_instance());
    let manager = adapter.manager();

    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = events.clone();
    let listener = manager.subscribe(move |event| sink.lock().unwrap().push(event.clone()));

    assert!(manager.deploy(config("d1", "1.0.0")).await.success);
    {
        let events = events.lock().unwrap();
        assert_eq!(events.len(), 2);
        match &events[1] {
            LifecycleEvent::DeploymentCompleted { deployment_id, result, .. } => {
                assert_eq!(deployment_id, "d1");
                assert!(result.success);
            }
            other => panic!("unexpected event {:?}", other),
        }
    }

    assert!(manager.unsubscribe(listener));
    assert!(manager.update("d1", DeploymentPatch::version("2.0.0")).await.success);
    assert_eq!(events.lock().unwrap().len(), 2);
}

// =============================== ROLLOUT ================================ //

fn rollout_manager(adapter: &Arc<MockAdapter>, clock: Arc<ManualClock>) -> DeploymentManager {
    let options = ManagerOptions {
        rollout: RolloutOptions {
            timeout: Duration::from_secs(10),
            poll_interval: Duration::from_secs(2),
        },
        ..Default::default()
    };
    DeploymentManager::new(adapter.clone(), options).with_clock(clock)
}

#[tokio::test]
async fn test_wait_for_rollout_polls_until_ready() {
    let adapter = MockAdapter::new("k8s", clustered());
    let clock = ManualClock::new();
    let manager = rollout_manager(&adapter, clock.clone());

    let mut cfg = config("api", "1.0.0");
    cfg.scaling = replicas(2, 2);
    assert!(manager.deploy(cfg).await.success);
    adapter.ready_after(3);

    let status = assert_ok!(manager.wait_for_rollout("api", None).await);
    assert_eq!(status.replicas.ready, 2);
    assert_eq!(adapter.count("inspect"), 4);
    assert_eq!(clock.elapsed(), Duration::from_secs(6));
}

#[tokio::test]
async fn test_wait_for_rollout_times_out_at_deadline() {
    let adapter = MockAdapter::new("k8s", clustered());
    let clock = ManualClock::new();
    let manager = rollout_manager(&adapter, clock.clone());

    assert!(manager.deploy(config("api", "1.0.0")).await.success);
    adapter.never_ready();

    let err = assert_err!(
        manager
            .wait_for_rollout("api", Some(Duration::from_secs(5)))
            .await
    );
    assert!(err.is_timeout());
    assert!(err.to_string().contains("Rollout timeout"));
    assert_eq!(clock.elapsed(), Duration::from_secs(5));
    assert_eq!(
        clock.sleeps(),
        vec![
            Duration::from_secs(2),
            Duration::from_secs(2),
            Duration::from_secs(1),
        ]
    );
}

#[tokio::test]
async fn test_wait_for_rollout_times_out_when_status_read_hangs() {
    let adapter = MockAdapter::new("k8s", clustered());
    let clock = ManualClock::new();
    let manager = rollout_manager(&adapter, clock.clone());

    assert!(manager.deploy(config("api", "1.0.0")).await.success);
    adapter.hang_inspect();

    let waited = tokio::time::timeout(
        Duration::from_secs(30),
        manager.wait_for_rollout("api", Some(Duration::from_secs(5))),
    )
    .await;
    let err = assert_err!(assert_ok!(waited));
    assert!(err.is_timeout());
    assert!(err.to_string().contains("Rollout timeout"));
    assert_eq!(adapter.count("inspect"), 1);
    assert_eq!(clock.elapsed(), Duration::from_secs(5));
}

#[tokio::test]
async fn test_wait_for_rollout_unknown_id() {
    let adapter = MockAdapter::new("k8s", clustered());
    let manager = rollout_manager(&adapter, ManualClock::new());

    let err = assert_err!(manager.wait_for_rollout("ghost", None).await);
    assert!(!err.is_timeout());
    assert!(adapter.calls().is_empty());
}

// =============================== COMPOSE ================================ //

#[tokio::test]
async fn test_compose_deploys_services_independently() {
    let adapter = MockAdapter::new("docker", single_instance());
    let manager = adapter.manager();

    let mut services = BTreeMap::new();
    for name in ["api", "db", "web"] {
        let mut cfg = config("", "1.0.0");
        cfg.name = String::new();
        services.insert(name.to_string(), cfg);
    }
    let project = ComposeProject {
        name: "shop".to_string(),
        services,
    };

    adapter.fail_next("create", "image not found");
    let results = manager.deploy_with_compose(&project).await;

    let ids: Vec<&str> = results.iter().map(|r| r.deployment_id.as_str()).collect();
    assert_eq!(ids, vec!["shop-api", "shop-db", "shop-web"]);
    assert!(!results[0].success);
    assert!(results[1].success);
    assert!(results[2].success);

    let deployed: Vec<String> = manager
        .list()
        .await
        .into_iter()
        .map(|d| d.config.id)
        .collect();
    assert_eq!(deployed, vec!["shop-db", "shop-web"]);
    assert_eq!(manager.get("shop-db").await.unwrap().config.name, "db");
}
