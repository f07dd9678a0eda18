//! Service manager for servy
//!
//! High-level operations behind the CLI: install from a configuration file, service
//! control, status and dependency views. Coordinates the SCM adapter, the service
//! store and the inventory.

use crate::config::AppConfig;
use crate::error::{Result, ServyError};
use crate::logs::{self, LogType};
use crate::repository::{JsonServiceRepository, ServiceRepository};
use crate::scm::{ScmAdapter, ScmConnector, ServiceInventory};
use crate::service::ServiceConfiguration;
use crate::supervisor::process::diagnose_executable;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Main service manager that coordinates all operations
pub struct ServiceManager<C: ScmConnector> {
    adapter: ScmAdapter<C>,
    repository: Arc<dyn ServiceRepository>,
    inventory: Box<dyn ServiceInventory>,
    config: AppConfig,
}

impl<C: ScmConnector> ServiceManager<C> {
    pub fn new(connector: C, inventory: Box<dyn ServiceInventory>, config: AppConfig) -> Result<Self> {
        let repository: Arc<dyn ServiceRepository> =
            Arc::new(JsonServiceRepository::open(&config.services_file)?);
        let adapter = ScmAdapter::new(
            connector,
            Arc::clone(&repository),
            config.wrapper_exe()?,
            config.scm_timeouts(),
        );

        Ok(Self {
            adapter,
            repository,
            inventory,
            config,
        })
    }

    /// Read a service configuration from a JSON file
    pub fn load_config_file(path: &Path) -> Result<ServiceConfiguration> {
        let content = fs::read_to_string(path).map_err(|e| {
            ServyError::Config(format!("cannot read {}: {}", path.display(), e))
        })?;
        serde_json::from_str(&content)
            .map_err(|e| ServyError::Config(format!("invalid configuration {}: {}", path.display(), e)))
    }

    pub fn install_from_file(&self, path: &Path) -> Result<()> {
        let config = Self::load_config_file(path)?;
        self.install(&config)
    }

    /// Install a service, or update it in place if it already exists
    pub fn install(&self, config: &ServiceConfiguration) -> Result<()> {
        println!("📦 Installing service '{}'", config.name);
        if !self.adapter.install(config)? {
            return Err(ServyError::Config(format!(
                "service '{}' was not installed",
                config.name
            )));
        }

        println!("✅ Service '{}' installed", config.name);
        println!("   Wrapper: {}", self.adapter.wrapper_exe().display());
        println!("   Start type: {}", config.start_type);
        Ok(())
    }

    pub fn uninstall(&self, name: &str) -> Result<()> {
        if !self.adapter.uninstall(name)? {
            return Err(ServyError::ServiceNotFound(name.to_string()));
        }
        println!("🗑️  Service '{}' removed", name);
        Ok(())
    }

    pub fn start(&self, name: &str) -> Result<()> {
        println!("🚀 Starting service '{}'...", name);
        if !self.adapter.start(name) {
            println!("💡 Check the wrapper log: {}", self.config.service_log_path(name).display());
            return Err(ServyError::Timeout(format!("service '{}' did not reach Running", name)));
        }
        println!("✅ Service '{}' is running", name);
        Ok(())
    }

    pub fn stop(&self, name: &str) -> Result<()> {
        println!("🛑 Stopping service '{}'...", name);
        if !self.adapter.stop(name) {
            return Err(ServyError::Timeout(format!("service '{}' did not reach Stopped", name)));
        }
        println!("✅ Service '{}' stopped", name);
        Ok(())
    }

    pub fn restart(&self, name: &str) -> Result<()> {
        println!("🔄 Restarting service '{}'...", name);
        if !self.adapter.restart(name) {
            return Err(ServyError::Timeout(format!("service '{}' did not restart", name)));
        }
        println!("✅ Service '{}' restarted", name);
        Ok(())
    }

    /// Show one service in detail, or every service on the machine
    pub fn show_status(&self, name: Option<&str>) -> Result<()> {
        match name {
            Some(name) => self.show_service_status(name),
            None => self.show_all_services(),
        }
    }

    fn show_service_status(&self, name: &str) -> Result<()> {
        let state = self
            .adapter
            .query_status(name)?
            .ok_or_else(|| ServyError::ServiceNotFound(name.to_string()))?;

        println!("Service: {}", name);
        println!("Status: {}", state.display_with_icon());

        let cancel = CancellationToken::new();
        match self.inventory.find_service(name, &cancel) {
            Ok(Some(info)) => {
                if let Some(pid) = info.process_id {
                    println!("PID: {}", pid);
                }
                if !info.user.is_empty() {
                    println!("Account: {}", info.user);
                }
            }
            Ok(None) => {}
            Err(e) => tracing::debug!("Inventory lookup for '{}' failed: {}", name, e),
        }

        if let Some(stored) = self.repository.get(name)? {
            println!("{}", "-".repeat(50));
            stored.config.print_details();
            println!("Installed: {}", stored.created_at.format("%Y-%m-%d %H:%M:%S UTC"));
            println!("Updated: {}", stored.updated_at.format("%Y-%m-%d %H:%M:%S UTC"));
        }
        Ok(())
    }

    fn show_all_services(&self) -> Result<()> {
        let services = self.inventory.get_all_services(&CancellationToken::new())?;
        if services.is_empty() {
            println!("No services found.");
            return Ok(());
        }

        println!("{:<30} {:<20} {:<12} {:<40}", "NAME", "STATUS", "START", "DISPLAY NAME");
        println!("{}", "-".repeat(104));
        for service in services {
            let start = service
                .start_type
                .map(|t| t.to_string())
                .unwrap_or_else(|| "-".to_string());
            println!(
                "{:<30} {:<20} {:<12} {:<40}",
                service.name,
                service.status.display_with_icon(),
                start,
                service.display_name
            );
        }
        Ok(())
    }

    /// List services installed through servy with their current state
    pub fn list_services(&self) -> Result<()> {
        let stored = self.repository.list()?;
        if stored.is_empty() {
            println!("No services installed.");
            return Ok(());
        }

        println!("{:<10} {:<24} {:<20} {:<40}", "ID", "NAME", "STATUS", "EXECUTABLE");
        println!("{}", "-".repeat(96));
        for service in stored {
            let status = match self.adapter.query_status(&service.config.name) {
                Ok(Some(state)) => state.display_with_icon(),
                Ok(None) => "⚪ Not installed".to_string(),
                Err(e) => {
                    tracing::debug!("Status query for '{}' failed: {}", service.config.name, e);
                    "❓ Unknown".to_string()
                }
            };
            let id = service.id.to_string();
            println!(
                "{:<10} {:<24} {:<20} {:<40}",
                &id[..8],
                service.config.name,
                status,
                service.config.executable_path
            );
        }
        Ok(())
    }

    pub fn show_dependencies(&self, name: &str) -> Result<()> {
        let tree = self.adapter.dependencies(name)?;
        println!("🌳 Dependencies of '{}'", name);
        print!("{}", tree.render());
        Ok(())
    }

    pub async fn show_logs(&self, path: &Path, lines: Option<usize>, log_type: LogType, follow: bool) -> Result<()> {
        let lines = lines.unwrap_or(self.config.settings.default_log_lines);
        logs::show_logs(path, log_type, lines, follow, self.config.log_follow_interval()).await
    }

    pub fn diagnose(&self, exe: &str) -> Result<()> {
        diagnose_executable(exe)
    }
}
