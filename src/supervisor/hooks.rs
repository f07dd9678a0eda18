//! Pre-launch and post-launch helper commands

use super::process::{CommandSpec, ManagedChild, open_writers};
use crate::error::{Result, ServyError};
use crate::rotation::RotationPolicy;
use crate::service::{PostLaunchConfig, PreLaunchConfig};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

const HELPER_STOP_GRACE: Duration = Duration::from_secs(2);
const HELPER_DRAIN: Duration = Duration::from_secs(1);

enum Attempt {
    Succeeded,
    Failed(String),
}

/// Run the pre-launch helper, retrying up to `retry_attempts` extra times with no
/// backoff. Returns the number of attempts made, or the last failure.
pub async fn run_pre_launch(pre: &PreLaunchConfig, cancel: &CancellationToken) -> Result<u32> {
    let spec = CommandSpec::for_pre_launch(pre);
    let timeout = Duration::from_secs(pre.timeout_seconds.max(1));
    let attempts = pre.retry_attempts.saturating_add(1);
    let mut last_error = String::new();

    for attempt in 1..=attempts {
        tracing::info!("Pre-launch attempt {}/{}: {} {}", attempt, attempts, spec.program, spec.args);
        match run_once(&spec, pre, timeout, cancel).await? {
            Attempt::Succeeded => {
                tracing::info!("Pre-launch succeeded on attempt {}", attempt);
                return Ok(attempt);
            }
            Attempt::Failed(reason) => {
                tracing::warn!("Pre-launch attempt {} failed: {}", attempt, reason);
                last_error = reason;
            }
        }
    }

    Err(ServyError::Hook(format!(
        "pre-launch failed after {} attempt(s): {}",
        attempts, last_error
    )))
}

async fn run_once(
    spec: &CommandSpec,
    pre: &PreLaunchConfig,
    timeout: Duration,
    cancel: &CancellationToken,
) -> Result<Attempt> {
    let (out, err) = open_writers(
        pre.stdout_path.as_deref(),
        pre.stderr_path.as_deref(),
        RotationPolicy::disabled(),
    );
    let mut child = match ManagedChild::spawn(spec, out, err) {
        Ok(child) => child,
        Err(e) => return Ok(Attempt::Failed(e.to_string())),
    };

    let outcome = tokio::select! {
        _ = cancel.cancelled() => {
            if let Err(e) = child.stop(HELPER_STOP_GRACE, HELPER_DRAIN).await {
                tracing::warn!("Could not stop pre-launch helper: {}", e);
            }
            return Err(ServyError::Cancelled);
        }
        waited = tokio::time::timeout(timeout, child.wait()) => match waited {
            Ok(Ok(status)) if status.success() => Attempt::Succeeded,
            Ok(Ok(status)) => Attempt::Failed(format!("exited with {}", status)),
            Ok(Err(e)) => Attempt::Failed(e.to_string()),
            Err(_) => match child.stop(HELPER_STOP_GRACE, HELPER_DRAIN).await {
                Ok(_) => Attempt::Failed(format!("timed out after {:?}", timeout)),
                Err(e) => Attempt::Failed(format!("timed out after {:?} and could not be stopped: {}", timeout, e)),
            },
        },
    };
    child.drain(HELPER_DRAIN).await;
    Ok(outcome)
}

/// Start the post-launch helper in the background. Its result is only logged.
pub fn spawn_post_launch(post: &PostLaunchConfig, cancel: CancellationToken) -> tokio::task::JoinHandle<()> {
    let spec = CommandSpec::for_post_launch(post);
    tokio::spawn(async move {
        let mut child = match ManagedChild::spawn(&spec, None, None) {
            Ok(child) => child,
            Err(e) => {
                tracing::warn!("Post-launch command failed to start: {}", e);
                return;
            }
        };
        tokio::select! {
            _ = cancel.cancelled() => {
                let _ = child.stop(HELPER_STOP_GRACE, HELPER_DRAIN).await;
            }
            status = child.wait() => match status {
                Ok(status) if status.success() => tracing::info!("Post-launch command finished"),
                Ok(status) => tracing::warn!("Post-launch command exited with {}", status),
                Err(e) => tracing::warn!("Post-launch command failed: {}", e),
            },
        }
    })
}
