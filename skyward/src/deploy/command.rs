//! Command runner shared by the CLI-backed adapters

use std::process::Stdio;

use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;

use crate::errors::OrchestratorError;

/// Run `program args...`, optionally feeding `stdin`, and return stdout.
///
/// A non-zero exit becomes a provider error carrying the command's stderr,
/// so callers can surface the backend's own diagnosis.
pub async fn run(program: &str, args: &[String], stdin: Option<&[u8]>) -> Result<String, OrchestratorError> {
    debug!("Running: {} {}", program, args.join(" "));

    let mut command = Command::new(program);
    command
        .args(args)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .stdin(if stdin.is_some() { Stdio::piped() } else { Stdio::null() });

    let mut child = command
        .spawn()
        .map_err(|e| OrchestratorError::ProviderError(format!("Failed to run {}: {}", program, e)))?;

    // Stdin is fed while stdout and stderr drain.
    let pipe = child.stdin.take();
    let feed = async move {
        if let (Some(mut pipe), Some(input)) = (pipe, stdin) {
            pipe.write_all(input).await?;
            pipe.shutdown().await?;
        }
        Ok::<_, std::io::Error>(())
    };
    let (fed, output) = tokio::join!(feed, child.wait_with_output());
    let output = output?;
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        let detail = if stderr.is_empty() {
            format!("exit status {}", output.status)
        } else {
            stderr
        };
        return Err(OrchestratorError::ProviderError(format!(
            "{} {} failed: {}",
            program,
            args.first().map(String::as_str).unwrap_or_default(),
            detail
        )));
    }
    fed?;

    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

/// Like [`run`], but also returns stderr appended to stdout. Container
/// engines write application stderr to the command's stderr on `logs`.
pub async fn run_combined(program: &str, args: &[String]) -> Result<String, OrchestratorError> {
    debug!("Running: {} {}", program, args.join(" "));

    let output = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .output()
        .await
        .map_err(|e| OrchestratorError::ProviderError(format!("Failed to run {}: {}", program, e)))?;

    if !output.status.success() {
        return Err(OrchestratorError::ProviderError(format!(
            "{} {} failed: {}",
            program,
            args.first().map(String::as_str).unwrap_or_default(),
            String::from_utf8_lossy(&output.stderr).trim()
        )));
    }

    let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
    combined.push_str(&String::from_utf8_lossy(&output.stderr));
    Ok(combined)
}
