//! Service Control Manager access
//!
//! The adapter and the dependency resolver are written against the small trait surface
//! below. The Windows implementation calls the native service-control API; tests use an
//! in-memory fake.

pub mod adapter;
pub mod dependencies;
pub mod inventory;
#[cfg(test)]
pub(crate) mod testing;
#[cfg(windows)]
pub mod windows;

pub use adapter::ScmAdapter;
pub use dependencies::{DependencyResolver, ServiceDependencyNode};
pub use inventory::{ServiceInfo, ServiceInventory};

use crate::constants::{SCM_POLL_INTERVAL, SCM_START_TIMEOUT, SCM_STOP_TIMEOUT};
use crate::error::Result;
use crate::service::StartType;
use std::time::Duration;

/// Current state of a service as the SCM reports it
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub enum ServiceState {
    Stopped,
    StartPending,
    StopPending,
    Running,
    ContinuePending,
    PausePending,
    Paused,
    Unknown,
}

impl ServiceState {
    /// Map a native `SERVICE_STATUS.dwCurrentState` value
    pub fn from_code(code: u32) -> Self {
        match code {
            1 => ServiceState::Stopped,
            2 => ServiceState::StartPending,
            3 => ServiceState::StopPending,
            4 => ServiceState::Running,
            5 => ServiceState::ContinuePending,
            6 => ServiceState::PausePending,
            7 => ServiceState::Paused,
            _ => ServiceState::Unknown,
        }
    }

    pub fn display_with_icon(&self) -> String {
        let icon = match self {
            ServiceState::Running => "🟢",
            ServiceState::Stopped => "🔴",
            ServiceState::Paused => "⏸️",
            ServiceState::Unknown => "❓",
            _ => "🟡",
        };
        format!("{} {}", icon, self)
    }
}

impl std::fmt::Display for ServiceState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ServiceState::Stopped => "Stopped",
            ServiceState::StartPending => "Start Pending",
            ServiceState::StopPending => "Stop Pending",
            ServiceState::Running => "Running",
            ServiceState::ContinuePending => "Continue Pending",
            ServiceState::PausePending => "Pause Pending",
            ServiceState::Paused => "Paused",
            ServiceState::Unknown => "Unknown",
        };
        f.write_str(name)
    }
}

/// Rights requested when opening a service
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceAccessLevel {
    /// Status and configuration queries only
    Query,
    /// Queries plus start and stop
    Control,
    /// Everything, including reconfigure and delete
    All,
}

/// Arguments for creating or reconfiguring a service
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceSpec {
    pub name: String,
    pub display_name: String,
    pub description: String,
    /// Full command line registered with the SCM
    pub binary_path: String,
    pub start_type: StartType,
    /// `None` runs as LocalSystem
    pub account: Option<String>,
    pub password: Option<String>,
    pub dependencies: Vec<String>,
}

/// Stored configuration read back from the SCM
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ServiceConfigInfo {
    pub display_name: String,
    pub binary_path: String,
    /// Service names this one depends on (load-order groups excluded)
    pub dependencies: Vec<String>,
}

/// Bounded waits used by start, stop and uninstall
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScmTimeouts {
    pub start: Duration,
    pub stop: Duration,
    pub poll: Duration,
}

impl Default for ScmTimeouts {
    fn default() -> Self {
        ScmTimeouts {
            start: SCM_START_TIMEOUT,
            stop: SCM_STOP_TIMEOUT,
            poll: SCM_POLL_INTERVAL,
        }
    }
}

/// Opens connections to the service control manager
pub trait ScmConnector: Send + Sync {
    type Manager: ServiceManagerApi;

    /// Open the SCM with full access
    fn connect(&self) -> Result<Self::Manager>;
}

/// An open SCM handle. Dropping it releases the handle.
pub trait ServiceManagerApi {
    type Service: ServiceApi;

    fn create_service(&self, spec: &ServiceSpec) -> Result<Self::Service>;

    /// Fails with a native 1060 error (see `ServyError::is_service_missing`) when the
    /// service is not installed
    fn open_service(&self, name: &str, access: ServiceAccessLevel) -> Result<Self::Service>;
}

/// An open service handle. Dropping it releases the handle.
pub trait ServiceApi {
    /// Change type, start type, error control, binary path, account and dependencies
    /// in one call
    fn change_config(&self, spec: &ServiceSpec) -> Result<()>;
    fn set_description(&self, description: &str) -> Result<()>;
    fn set_start_type(&self, start_type: StartType) -> Result<()>;
    fn query_state(&self) -> Result<ServiceState>;
    fn query_config(&self) -> Result<ServiceConfigInfo>;
    fn start(&self) -> Result<()>;
    /// Send the stop control code
    fn stop(&self) -> Result<()>;
    fn delete(&self) -> Result<()>;
}
