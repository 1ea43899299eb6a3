//! skyward - Entry Point
//!
//! Deploys workloads across providers with failover, generates coordinated
//! CI/CD workflows, or runs as a long-lived health checker.

use std::collections::HashMap;
use std::env;
use std::time::Duration;

use anyhow::Context;
use skyward::app::options::AppOptions;
use skyward::app::run::{build_coordinator, build_orchestrator, run, run_diagnostic, shared_config};
use skyward::filesys::file::File;
use skyward::logs::{init_logging, LogOptions};
use skyward::models::deployment::DeploymentConfig;
use skyward::models::workflow::WorkflowType;
use skyward::storage::settings::{Settings, DEFAULT_SETTINGS_PATH};
use skyward::utils::version_info;

use tracing::{error, info};

#[tokio::main]
async fn main() {
    // Parse command line arguments
    let args: Vec<String> = env::args().collect();
    let mut cli_args: HashMap<String, String> = HashMap::new();

    for arg in args.iter().skip(1) {
        if let Some((key, value)) = arg.split_once('=') {
            let clean_key = key.trim_start_matches('-');
            cli_args.insert(clean_key.to_string(), value.to_string());
        } else if arg.starts_with("--") {
            let clean_key = arg.trim_start_matches('-');
            cli_args.insert(clean_key.to_string(), "true".to_string());
        }
    }

    let version = version_info();
    if cli_args.contains_key("version") {
        match serde_json::to_string_pretty(&version) {
            Ok(json) => println!("{}", json),
            Err(e) => eprintln!("Failed to print version: {e}"),
        }
        return;
    }

    let settings_path = cli_args
        .get("settings")
        .cloned()
        .unwrap_or_else(|| DEFAULT_SETTINGS_PATH.to_string());
    let settings = match Settings::load(&settings_path).await {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("Unable to read settings file {}: {}", settings_path, e);
            std::process::exit(1);
        }
    };

    let log_options = LogOptions {
        log_level: settings.log_level.clone(),
        json_format: settings.log_json,
        log_dir: settings.log_dir.clone(),
        ..Default::default()
    };
    let _log_guard = match init_logging(log_options) {
        Ok(guard) => guard,
        Err(e) => {
            println!("Failed to initialize logging: {e}");
            None
        }
    };

    let options = AppOptions::from_settings(&settings);

    let result = if cli_args.contains_key("diagnostic") || cli_args.contains_key("diag") {
        diagnose(&options).await
    } else if let Some(path) = cli_args.get("deploy") {
        deploy(&options, path, cli_args.contains_key("wait")).await
    } else if let Some(types) = cli_args.get("workflows") {
        generate_workflows(&options, types, &cli_args).await
    } else {
        info!("Running skyward with options: {:?}", options);
        run(version.version, options, await_shutdown_signal())
            .await
            .context("skyward stopped with an error")
    };

    if let Err(e) = result {
        error!("{:#}", e);
        eprintln!("{:#}", e);
        std::process::exit(1);
    }
}

async fn diagnose(options: &AppOptions) -> anyhow::Result<()> {
    let health = run_diagnostic(options).await?;
    println!("{}", serde_json::to_string_pretty(&health)?);
    Ok(())
}

async fn deploy(options: &AppOptions, path: &str, wait: bool) -> anyhow::Result<()> {
    let config: DeploymentConfig = File::new(path)
        .read_json()
        .await
        .with_context(|| format!("reading deployment config {}", path))?;

    let orchestrator = build_orchestrator(options)?;
    orchestrator.check_health().await;

    let routed = orchestrator.deploy_function(config.clone()).await;
    println!("{}", serde_json::to_string_pretty(&routed)?);
    if !routed.result.success {
        anyhow::bail!("deployment {} failed: {}", config.id, routed.result.message);
    }

    if wait {
        let manager = routed
            .provider_id
            .as_deref()
            .and_then(|id| orchestrator.manager(id))
            .context("accepting provider is not configured")?;
        let status = manager
            .wait_for_rollout(&config.id, None::<Duration>)
            .await?;
        println!("{}", serde_json::to_string_pretty(&status)?);
    }
    Ok(())
}

async fn generate_workflows(
    options: &AppOptions,
    types: &str,
    cli_args: &HashMap<String, String>,
) -> anyhow::Result<()> {
    let types = types
        .split(',')
        .filter(|t| !t.trim().is_empty())
        .map(str::parse::<WorkflowType>)
        .collect::<Result<Vec<_>, _>>()?;
    let project = cli_args
        .get("project")
        .cloned()
        .context("--project=<name> is required with --workflows")?;
    let frameworks: Vec<String> = cli_args
        .get("frameworks")
        .map(|f| f.split(',').map(|s| s.trim().to_string()).filter(|s| !s.is_empty()).collect())
        .unwrap_or_default();

    let coordinator = build_coordinator(&options.workflows);
    let shared = shared_config(&options.workflows, &project, &frameworks);
    let result = coordinator.generate_coordinated_workflows(&types, &shared).await?;
    println!("{}", serde_json::to_string_pretty(&result)?);
    if !result.success {
        anyhow::bail!("{} workflow artifacts were not generated", result.errors.len());
    }
    Ok(())
}

async fn await_shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let (mut sigterm, mut sigint) =
            match (signal(SignalKind::terminate()), signal(SignalKind::interrupt())) {
                (Ok(sigterm), Ok(sigint)) => (sigterm, sigint),
                _ => {
                    error!("Failed to install signal handlers, waiting for Ctrl+C");
                    let _ = tokio::signal::ctrl_c().await;
                    return;
                }
            };

        tokio::select! {
            _ = sigterm.recv() => {
                info!("SIGTERM received, shutting down...");
            }
            _ = sigint.recv() => {
                info!("SIGINT received, shutting down...");
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Ctrl+C received, shutting down...");
            }
        }
    }

    #[cfg(not(unix))]
    {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
        }
        info!("Ctrl+C received, shutting down...");
    }
}
