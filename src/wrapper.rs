//! Wrapper process entry points
//!
//! The SCM launches the wrapper with the positional fields produced at install
//! time. Settings that do not fit those fields are read back from the service store.

use crate::config::AppConfig;
use crate::error::Result;
use crate::repository::{JsonServiceRepository, ServiceRepository};
use crate::service::ServiceConfiguration;
use crate::supervisor::{ConsoleHost, ProcessSupervisor, ServiceHost, SupervisorOutcome};
use crate::wrapper_args;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Decode the wrapper argv and fill in stored settings for the same service
pub fn load_wrapper_config(argv: &[String], app: &AppConfig) -> Result<ServiceConfiguration> {
    let mut config = wrapper_args::decode(argv)?;

    let stored = JsonServiceRepository::open(&app.services_file)
        .and_then(|repo| repo.get(&config.name));
    match stored {
        Ok(Some(stored)) => supplement(&mut config, stored.config),
        Ok(None) => tracing::debug!("No stored settings for '{}'", config.name),
        Err(e) => tracing::warn!("Cannot read stored settings for '{}': {}", config.name, e),
    }
    Ok(config)
}

fn supplement(config: &mut ServiceConfiguration, stored: ServiceConfiguration) {
    if config.rotation_enabled {
        config.max_rotations = stored.max_rotations;
    }
    config.description = stored.description;
    config.post_launch = stored.post_launch;
    config.stop_timeout_seconds = stored.stop_timeout_seconds;
    config.dependencies = stored.dependencies;
}

/// Supervise `config` until `cancel` fires or the supervisor gives up
pub async fn run_supervisor(
    config: ServiceConfiguration,
    app: &AppConfig,
    host: Arc<dyn ServiceHost>,
    cancel: CancellationToken,
) -> SupervisorOutcome {
    let settings = app.supervisor_settings(config.stop_timeout_seconds);
    ProcessSupervisor::new(config, settings, host).run(cancel).await
}

/// Run the wrapper in the foreground; Ctrl+C stops it
pub async fn run_console(config: ServiceConfiguration, app: &AppConfig) -> SupervisorOutcome {
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Ctrl+C received, stopping");
            trigger.cancel();
        }
    });

    run_supervisor(config, app, Arc::new(ConsoleHost), cancel).await
}
