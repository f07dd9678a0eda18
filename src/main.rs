use clap::Parser;
use servy::cli::{Cli, Commands};
use servy::config::AppConfig;
use servy::error::Result;
use servy::manager::ServiceManager;
use servy::scm::ScmConnector;
use servy::telemetry;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        eprintln!("❌ {}", e);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = AppConfig::new()?;
    telemetry::init_console(&config.settings.log_level);
    let manager = service_manager(config)?;
    dispatch(&manager, cli.command).await
}

#[cfg(windows)]
fn service_manager(config: AppConfig) -> Result<ServiceManager<servy::scm::windows::NativeScm>> {
    use servy::scm::windows::{NativeScm, WmiInventory};
    ServiceManager::new(NativeScm, Box::new(WmiInventory), config)
}

#[cfg(not(windows))]
fn service_manager(config: AppConfig) -> Result<ServiceManager<unsupported::NoScm>> {
    ServiceManager::new(unsupported::NoScm, Box::new(unsupported::NoScm), config)
}

async fn dispatch<C: ScmConnector>(manager: &ServiceManager<C>, command: Commands) -> Result<()> {
    match command {
        Commands::Install { config } => manager.install_from_file(&config),
        Commands::Uninstall { name } => manager.uninstall(&name),
        Commands::Start { name } => manager.start(&name),
        Commands::Stop { name } => manager.stop(&name),
        Commands::Restart { name } => manager.restart(&name),
        Commands::Status { name } => manager.show_status(name.as_deref()),
        Commands::List => manager.list_services(),
        Commands::Deps { name } => manager.show_dependencies(&name),
        Commands::Logs {
            path,
            lines,
            log_type,
            follow,
        } => manager.show_logs(&path, lines, log_type, follow).await,
        Commands::Diagnose { exe } => manager.diagnose(&exe),
    }
}

/// Stand-ins off Windows: logs and diagnose work, SCM commands report Unsupported
#[cfg(not(windows))]
mod unsupported {
    use servy::error::{Result, ServyError};
    use servy::scm::{
        ScmConnector, ServiceAccessLevel, ServiceApi, ServiceConfigInfo, ServiceInfo,
        ServiceInventory, ServiceManagerApi, ServiceSpec, ServiceState,
    };
    use servy::service::StartType;
    use tokio_util::sync::CancellationToken;

    fn unsupported<T>() -> Result<T> {
        Err(ServyError::Unsupported(
            "the Service Control Manager is only available on Windows".to_string(),
        ))
    }

    pub struct NoScm;

    impl ScmConnector for NoScm {
        type Manager = NoScm;

        fn connect(&self) -> Result<NoScm> {
            unsupported()
        }
    }

    impl ServiceManagerApi for NoScm {
        type Service = NoScm;

        fn create_service(&self, _spec: &ServiceSpec) -> Result<NoScm> {
            unsupported()
        }

        fn open_service(&self, _name: &str, _access: ServiceAccessLevel) -> Result<NoScm> {
            unsupported()
        }
    }

    impl ServiceApi for NoScm {
        fn change_config(&self, _spec: &ServiceSpec) -> Result<()> {
            unsupported()
        }
        fn set_description(&self, _description: &str) -> Result<()> {
            unsupported()
        }
        fn set_start_type(&self, _start_type: StartType) -> Result<()> {
            unsupported()
        }
        fn query_state(&self) -> Result<ServiceState> {
            unsupported()
        }
        fn query_config(&self) -> Result<ServiceConfigInfo> {
            unsupported()
        }
        fn start(&self) -> Result<()> {
            unsupported()
        }
        fn stop(&self) -> Result<()> {
            unsupported()
        }
        fn delete(&self) -> Result<()> {
            unsupported()
        }
    }

    impl ServiceInventory for NoScm {
        fn get_all_services(&self, _cancel: &CancellationToken) -> Result<Vec<ServiceInfo>> {
            unsupported()
        }

        fn find_service(&self, _name: &str, _cancel: &CancellationToken) -> Result<Option<ServiceInfo>> {
            unsupported()
        }
    }
}
