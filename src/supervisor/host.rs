//! The wrapper's view of whoever is hosting it: the SCM, or a console

use crate::error::{Result, ServyError};

/// Service status as reported to the host
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostStatus {
    StartPending,
    Running,
    StopPending,
    Stopped { exit_code: u32 },
}

/// Reports supervisor state outward and performs recovery actions that reach beyond
/// the child process
pub trait ServiceHost: Send + Sync {
    fn report(&self, status: HostStatus);

    /// Ask for the whole service (this wrapper included) to be restarted
    fn request_service_restart(&self, service_name: &str) -> Result<()>;

    fn request_reboot(&self) -> Result<()>;
}

/// Host for console mode; statuses go to the log
#[derive(Debug, Default, Clone, Copy)]
pub struct ConsoleHost;

impl ServiceHost for ConsoleHost {
    fn report(&self, status: HostStatus) {
        tracing::info!("Service status: {:?}", status);
    }

    fn request_service_restart(&self, service_name: &str) -> Result<()> {
        Err(ServyError::Unsupported(format!(
            "cannot restart service '{}' from console mode",
            service_name
        )))
    }

    fn request_reboot(&self) -> Result<()> {
        Err(ServyError::Unsupported(
            "reboot is not requested from console mode".to_string(),
        ))
    }
}

#[cfg(windows)]
pub use self::windows_host::WindowsServiceHost;

#[cfg(windows)]
mod windows_host {
    use super::{HostStatus, ServiceHost};
    use crate::error::{Result, ServyError};
    use std::path::PathBuf;
    use std::process::{Command, Stdio};
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;
    use windows_service::service::{
        ServiceControlAccept, ServiceExitCode, ServiceState, ServiceStatus, ServiceType,
    };
    use windows_service::service_control_handler::ServiceStatusHandle;

    const PENDING_WAIT_HINT: Duration = Duration::from_secs(30);

    /// Host backed by the SCM status handle of the running service
    pub struct WindowsServiceHost {
        status_handle: ServiceStatusHandle,
        restarter: PathBuf,
        checkpoint: AtomicU32,
    }

    impl WindowsServiceHost {
        /// `restarter` is the management executable, run as `<restarter> restart <name>`
        pub fn new(status_handle: ServiceStatusHandle, restarter: PathBuf) -> Self {
            WindowsServiceHost {
                status_handle,
                restarter,
                checkpoint: AtomicU32::new(0),
            }
        }
    }

    impl ServiceHost for WindowsServiceHost {
        fn report(&self, status: HostStatus) {
            let (current_state, controls_accepted, exit_code, pending) = match status {
                HostStatus::StartPending => (
                    ServiceState::StartPending,
                    ServiceControlAccept::empty(),
                    ServiceExitCode::Win32(0),
                    true,
                ),
                HostStatus::Running => (
                    ServiceState::Running,
                    ServiceControlAccept::STOP | ServiceControlAccept::SHUTDOWN,
                    ServiceExitCode::Win32(0),
                    false,
                ),
                HostStatus::StopPending => (
                    ServiceState::StopPending,
                    ServiceControlAccept::empty(),
                    ServiceExitCode::Win32(0),
                    true,
                ),
                HostStatus::Stopped { exit_code } => (
                    ServiceState::Stopped,
                    ServiceControlAccept::empty(),
                    if exit_code == 0 {
                        ServiceExitCode::Win32(0)
                    } else {
                        ServiceExitCode::ServiceSpecific(exit_code)
                    },
                    false,
                ),
            };

            let (checkpoint, wait_hint) = if pending {
                (self.checkpoint.fetch_add(1, Ordering::Relaxed) + 1, PENDING_WAIT_HINT)
            } else {
                self.checkpoint.store(0, Ordering::Relaxed);
                (0, Duration::default())
            };

            let result = self.status_handle.set_service_status(ServiceStatus {
                service_type: ServiceType::OWN_PROCESS,
                current_state,
                controls_accepted,
                exit_code,
                checkpoint,
                wait_hint,
                process_id: None,
            });
            if let Err(e) = result {
                tracing::warn!("Failed to report {:?} to the SCM: {}", status, e);
            }
        }

        fn request_service_restart(&self, service_name: &str) -> Result<()> {
            // detached, because the restart stops this very process
            Command::new(&self.restarter)
                .arg("restart")
                .arg(service_name)
                .stdin(Stdio::null())
                .stdout(Stdio::null())
                .stderr(Stdio::null())
                .spawn()
                .map(|_| ())
                .map_err(|e| ServyError::ProcessStart(self.restarter.display().to_string(), e.to_string()))
        }

        fn request_reboot(&self) -> Result<()> {
            let status = Command::new("shutdown")
                .args(["/r", "/t", "0"])
                .status()
                .map_err(|e| ServyError::ProcessStart("shutdown".to_string(), e.to_string()))?;
            if status.success() {
                Ok(())
            } else {
                Err(ServyError::Hook(format!("shutdown exited with {}", status)))
            }
        }
    }
}
