//! servy-service: the wrapper process the SCM launches for every installed service
//!
//! Usage: `servy-service [--console] <23 positional fields>`

use servy::config::AppConfig;
use servy::error::Result;
use servy::telemetry;
use servy::wrapper;
use std::env;
use std::process::ExitCode;

#[cfg(windows)]
use windows_service::{define_windows_service, service_dispatcher};

#[cfg(windows)]
define_windows_service!(ffi_service_main, service_main);

/// Name position in the wrapper command line (0-based)
#[cfg(windows)]
const SERVICE_NAME_FIELD: usize = 11;

fn main() -> ExitCode {
    let mut argv: Vec<String> = env::args().collect();
    let console = argv.get(1).is_some_and(|a| a == "--console");
    if console {
        argv.remove(1);
    }

    #[cfg(windows)]
    if !console {
        let name = argv.get(SERVICE_NAME_FIELD).cloned().unwrap_or_default();
        match service_dispatcher::start(&name, ffi_service_main) {
            Ok(()) => return ExitCode::SUCCESS,
            Err(e) => {
                eprintln!("Failed to start as Windows service: {:?}", e);
                eprintln!("Running in console mode instead.");
            }
        }
    }

    match run_console(argv) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("❌ {}", e);
            ExitCode::FAILURE
        }
    }
}

fn run_console(argv: Vec<String>) -> Result<ExitCode> {
    let app = AppConfig::new()?;
    telemetry::init_console(&app.settings.log_level);
    let config = wrapper::load_wrapper_config(&argv, &app)?;

    let runtime = tokio::runtime::Runtime::new()?;
    let outcome = runtime.block_on(wrapper::run_console(config, &app));
    println!(
        "Supervisor finished: {:?} ({} launch(es), {} restart(s))",
        outcome.state, outcome.launches, outcome.restarts
    );
    Ok(ExitCode::from(outcome.exit_code.min(255) as u8))
}

#[cfg(windows)]
fn service_main(_arguments: Vec<std::ffi::OsString>) {
    // StartService arguments are not the binary path fields; read our own argv
    let argv: Vec<String> = env::args().collect();
    if let Err(e) = run_service(argv) {
        tracing::error!("Wrapper failed: {}", e);
    }
}

#[cfg(windows)]
fn run_service(argv: Vec<String>) -> Result<()> {
    use servy::error::ServyError;
    use servy::supervisor::host::WindowsServiceHost;
    use servy::supervisor::{HostStatus, ServiceHost};
    use std::sync::Arc;
    use tokio_util::sync::CancellationToken;
    use windows_service::service::ServiceControl;
    use windows_service::service_control_handler::{self, ServiceControlHandlerResult};

    let app = AppConfig::new()?;
    let name = argv.get(SERVICE_NAME_FIELD).cloned().unwrap_or_else(|| app.settings.event_source.clone());
    telemetry::init_file(&app.service_log_path(&name), &app.settings.log_level)?;

    let cancel = CancellationToken::new();
    let handler_cancel = cancel.clone();
    let event_handler = move |control| match control {
        ServiceControl::Stop | ServiceControl::Shutdown => {
            tracing::info!("Received stop/shutdown signal");
            handler_cancel.cancel();
            ServiceControlHandlerResult::NoError
        }
        ServiceControl::Interrogate => ServiceControlHandlerResult::NoError,
        _ => ServiceControlHandlerResult::NotImplemented,
    };

    let status_handle = service_control_handler::register(&name, event_handler).map_err(|e| {
        ServyError::Native {
            operation: "RegisterServiceCtrlHandler".to_string(),
            code: 0,
            message: e.to_string(),
        }
    })?;
    let host: Arc<dyn ServiceHost> = Arc::new(WindowsServiceHost::new(status_handle, app.restarter_exe()?));

    let config = match wrapper::load_wrapper_config(&argv, &app) {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("Invalid wrapper command line: {}", e);
            host.report(HostStatus::Stopped {
                exit_code: servy::constants::EXIT_CODE_FAILED,
            });
            return Err(e);
        }
    };

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(runtime) => runtime,
        Err(e) => {
            host.report(HostStatus::Stopped {
                exit_code: servy::constants::EXIT_CODE_FAILED,
            });
            return Err(e.into());
        }
    };
    let outcome = runtime.block_on(wrapper::run_supervisor(config, &app, host, cancel));
    tracing::info!("Service '{}' ended: {:?}", name, outcome.state);
    Ok(())
}
