//! Bulk service inventory over WMI `Win32_Service`
//!
//! The record type and the field mapping are platform-neutral; only the connection in
//! `scm::windows` needs WMI.

use super::ServiceState;
use crate::error::{Result, ServyError};
use crate::service::StartType;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

/// One row of `Win32_Service`
#[allow(non_camel_case_types)]
#[derive(Deserialize, Debug, Clone, Default)]
pub struct Win32_Service {
    #[serde(rename = "Name")]
    pub name: Option<String>,

    #[serde(rename = "DisplayName")]
    pub display_name: Option<String>,

    #[serde(rename = "Description")]
    pub description: Option<String>,

    #[serde(rename = "State")]
    pub state: Option<String>,

    #[serde(rename = "StartMode")]
    pub start_mode: Option<String>,

    #[serde(rename = "StartName")]
    pub start_name: Option<String>,

    #[serde(rename = "ProcessId")]
    pub process_id: Option<u32>,

    #[serde(rename = "PathName")]
    pub path_name: Option<String>,
}

/// Service summary as shown by `status`
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct ServiceInfo {
    pub name: String,
    pub display_name: String,
    pub description: String,
    pub status: ServiceState,
    pub start_type: Option<StartType>,
    pub user: String,
    pub process_id: Option<u32>,
    pub path_name: String,
}

impl ServiceInfo {
    /// Map a WMI row; rows without a name are dropped
    pub fn from_wmi(row: Win32_Service) -> Option<Self> {
        let name = row.name?;
        Some(ServiceInfo {
            display_name: row.display_name.unwrap_or_else(|| name.clone()),
            name,
            description: row.description.unwrap_or_default(),
            status: parse_wmi_state(row.state.as_deref().unwrap_or_default()),
            start_type: parse_wmi_start_mode(row.start_mode.as_deref().unwrap_or_default()),
            user: row.start_name.unwrap_or_default(),
            process_id: row.process_id.filter(|pid| *pid != 0),
            path_name: row.path_name.unwrap_or_default(),
        })
    }
}

/// `Win32_Service.State` to [`ServiceState`]
pub fn parse_wmi_state(state: &str) -> ServiceState {
    match state.to_ascii_lowercase().as_str() {
        "stopped" => ServiceState::Stopped,
        "start pending" => ServiceState::StartPending,
        "stop pending" => ServiceState::StopPending,
        "running" => ServiceState::Running,
        "continue pending" => ServiceState::ContinuePending,
        "pause pending" => ServiceState::PausePending,
        "paused" => ServiceState::Paused,
        _ => ServiceState::Unknown,
    }
}

/// `Win32_Service.StartMode` to [`StartType`]
pub fn parse_wmi_start_mode(mode: &str) -> Option<StartType> {
    match mode.to_ascii_lowercase().as_str() {
        "boot" => Some(StartType::Boot),
        "system" => Some(StartType::System),
        "auto" | "automatic" => Some(StartType::Automatic),
        "manual" => Some(StartType::Manual),
        "disabled" => Some(StartType::Disabled),
        _ => None,
    }
}

/// Escape a literal for use inside single quotes in WQL
pub fn escape_wql(value: &str) -> String {
    value.replace('\\', "\\\\").replace('\'', "\\'")
}

/// `SELECT * FROM Win32_Service`, optionally filtered to one name
pub fn service_query(name: Option<&str>) -> String {
    match name {
        Some(name) => format!("SELECT * FROM Win32_Service WHERE Name='{}'", escape_wql(name)),
        None => "SELECT * FROM Win32_Service".to_string(),
    }
}

pub(crate) fn check_cancelled(cancel: &CancellationToken) -> Result<()> {
    if cancel.is_cancelled() {
        Err(ServyError::Cancelled)
    } else {
        Ok(())
    }
}

/// Read-only service inventory. Single-service lookups return `None` when the service
/// is not installed, and every call fails with `Cancelled` once the token has fired.
pub trait ServiceInventory {
    fn get_all_services(&self, cancel: &CancellationToken) -> Result<Vec<ServiceInfo>>;

    fn find_service(&self, name: &str, cancel: &CancellationToken) -> Result<Option<ServiceInfo>>;

    fn get_service_startup_type(&self, name: &str, cancel: &CancellationToken) -> Result<Option<StartType>> {
        Ok(self.find_service(name, cancel)?.and_then(|s| s.start_type))
    }

    fn get_service_description(&self, name: &str, cancel: &CancellationToken) -> Result<Option<String>> {
        Ok(self
            .find_service(name, cancel)?
            .map(|s| s.description)
            .filter(|d| !d.is_empty()))
    }

    fn get_service_user(&self, name: &str, cancel: &CancellationToken) -> Result<Option<String>> {
        Ok(self
            .find_service(name, cancel)?
            .map(|s| s.user)
            .filter(|u| !u.is_empty()))
    }
}
