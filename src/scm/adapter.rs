//! Install, update, remove and control wrapped services
//!
//! Every native handle is owned by a value whose `Drop` releases it, so early returns
//! and `?` never leak a handle.

use super::dependencies::{DependencyResolver, ServiceDependencyNode};
use super::{
    ScmConnector, ScmTimeouts, ServiceAccessLevel, ServiceApi, ServiceManagerApi, ServiceSpec,
    ServiceState,
};
use crate::error::Result;
use crate::repository::ServiceRepository;
use crate::service::{ServiceConfiguration, StartType};
use crate::wrapper_args;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

/// Registers services that launch through the wrapper executable
pub struct ScmAdapter<C: ScmConnector> {
    connector: C,
    repository: Arc<dyn ServiceRepository>,
    wrapper_exe: PathBuf,
    timeouts: ScmTimeouts,
}

impl<C: ScmConnector> ScmAdapter<C> {
    pub fn new(
        connector: C,
        repository: Arc<dyn ServiceRepository>,
        wrapper_exe: impl Into<PathBuf>,
        timeouts: ScmTimeouts,
    ) -> Self {
        ScmAdapter {
            connector,
            repository,
            wrapper_exe: wrapper_exe.into(),
            timeouts,
        }
    }

    pub fn wrapper_exe(&self) -> &Path {
        &self.wrapper_exe
    }

    /// Native arguments for `config`, with the wrapper command line as binary path
    pub fn service_spec(&self, config: &ServiceConfiguration) -> ServiceSpec {
        let account = config.service_account().map(str::to_string);
        let password = if account.is_some() {
            config.password.clone()
        } else {
            None
        };
        ServiceSpec {
            name: config.name.clone(),
            display_name: config.name.clone(),
            description: config.description.clone(),
            binary_path: wrapper_args::encode(&self.wrapper_exe, config),
            start_type: config.start_type,
            account,
            password,
            dependencies: config.dependencies.clone(),
        }
    }

    /// Create the service, or update it in place if the name is already registered
    pub fn install(&self, config: &ServiceConfiguration) -> Result<bool> {
        config.validate()?;

        let manager = self.connector.connect()?;
        let spec = self.service_spec(config);

        let installed = match manager.create_service(&spec) {
            Ok(service) => {
                service.set_description(&spec.description)?;
                tracing::info!("Created service '{}'", spec.name);
                true
            }
            Err(e) if e.is_service_exists() => {
                tracing::info!("Service '{}' already exists, updating configuration", spec.name);
                self.update_config(&manager, &spec)?
            }
            Err(e) => return Err(e),
        };

        if installed {
            if let Err(e) = self.repository.upsert(config) {
                tracing::warn!("Failed to record service '{}': {}", config.name, e);
            }
        }
        Ok(installed)
    }

    /// Rewrite an existing service's configuration, then its description
    pub fn update_config(&self, manager: &C::Manager, spec: &ServiceSpec) -> Result<bool> {
        let service = manager.open_service(&spec.name, ServiceAccessLevel::All)?;
        service.change_config(spec)?;
        service.set_description(&spec.description)?;
        tracing::info!("Updated service '{}'", spec.name);
        Ok(true)
    }

    /// Stop and delete a service. Returns false when it cannot be opened.
    pub fn uninstall(&self, name: &str) -> Result<bool> {
        let manager = self.connector.connect()?;
        let service = match manager.open_service(name, ServiceAccessLevel::All) {
            Ok(service) => service,
            Err(e) => {
                tracing::debug!("Cannot open service '{}' for removal: {}", name, e);
                return Ok(false);
            }
        };

        // a Disabled service would refuse the stop below
        service.set_start_type(StartType::Manual)?;

        if service.query_state()? != ServiceState::Stopped {
            if let Err(e) = service.stop() {
                if !e.is_service_not_active() {
                    tracing::warn!("Stop request for '{}' failed: {}", name, e);
                }
            }
            if !self.wait_for(&service, ServiceState::Stopped, self.timeouts.stop)? {
                tracing::warn!(
                    "Service '{}' did not stop within {:?}, deleting anyway",
                    name,
                    self.timeouts.stop
                );
            }
        }

        service.delete()?;
        tracing::info!("Deleted service '{}'", name);

        if let Err(e) = self.repository.remove(name) {
            tracing::warn!("Failed to drop stored record for '{}': {}", name, e);
        }
        Ok(true)
    }

    /// Start the service and wait for Running. Errors are logged and reported as false.
    pub fn start(&self, name: &str) -> bool {
        self.try_start(name).unwrap_or_else(|e| {
            tracing::warn!("Failed to start '{}': {}", name, e);
            false
        })
    }

    /// Stop the service and wait for Stopped. Errors are logged and reported as false.
    pub fn stop(&self, name: &str) -> bool {
        self.try_stop(name).unwrap_or_else(|e| {
            tracing::warn!("Failed to stop '{}': {}", name, e);
            false
        })
    }

    /// Stop then start; never starts if the stop did not complete
    pub fn restart(&self, name: &str) -> bool {
        if !self.stop(name) {
            return false;
        }
        self.start(name)
    }

    /// Current state, or `None` when the service is not installed
    pub fn query_status(&self, name: &str) -> Result<Option<ServiceState>> {
        let manager = self.connector.connect()?;
        let service = match manager.open_service(name, ServiceAccessLevel::Query) {
            Ok(service) => service,
            Err(e) if e.is_service_missing() => return Ok(None),
            Err(e) => return Err(e),
        };
        Ok(Some(service.query_state()?))
    }

    /// Dependency tree rooted at `name`
    pub fn dependencies(&self, name: &str) -> Result<ServiceDependencyNode> {
        let manager = self.connector.connect()?;
        Ok(DependencyResolver::new(&manager).get_dependencies(name))
    }

    fn try_start(&self, name: &str) -> Result<bool> {
        let manager = self.connector.connect()?;
        let service = manager.open_service(name, ServiceAccessLevel::Control)?;
        match service.query_state()? {
            ServiceState::Running => return Ok(true),
            ServiceState::StartPending => {}
            _ => service.start()?,
        }
        self.wait_for(&service, ServiceState::Running, self.timeouts.start)
    }

    fn try_stop(&self, name: &str) -> Result<bool> {
        let manager = self.connector.connect()?;
        let service = manager.open_service(name, ServiceAccessLevel::Control)?;
        match service.query_state()? {
            ServiceState::Stopped => return Ok(true),
            ServiceState::StopPending => {}
            _ => {
                if let Err(e) = service.stop() {
                    if !e.is_service_not_active() {
                        return Err(e);
                    }
                }
            }
        }
        self.wait_for(&service, ServiceState::Stopped, self.timeouts.stop)
    }

    /// Poll until `target` or until `timeout` elapses
    fn wait_for<S: ServiceApi>(&self, service: &S, target: ServiceState, timeout: std::time::Duration) -> Result<bool> {
        let deadline = Instant::now() + timeout;
        loop {
            if service.query_state()? == target {
                return Ok(true);
            }
            if Instant::now() >= deadline {
                return Ok(false);
            }
            std::thread::sleep(self.timeouts.poll);
        }
    }
}
