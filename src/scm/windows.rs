//! Native service-control and WMI backends

use super::inventory::{ServiceInventory, Win32_Service, check_cancelled, service_query};
use super::{
    ScmConnector, ServiceAccessLevel, ServiceApi, ServiceConfigInfo, ServiceInfo,
    ServiceManagerApi, ServiceSpec, ServiceState,
};
use crate::error::{Result, ServyError};
use crate::service::StartType;
use tokio_util::sync::CancellationToken;
use windows::Win32::System::Services::{
    ChangeServiceConfig2W, ChangeServiceConfigW, CloseServiceHandle, ControlService,
    CreateServiceW, DeleteService, ENUM_SERVICE_TYPE, SERVICE_ERROR, OpenSCManagerW, OpenServiceW, QUERY_SERVICE_CONFIGW,
    QueryServiceConfigW, QueryServiceStatus, SC_HANDLE, SC_MANAGER_ALL_ACCESS,
    SERVICE_ALL_ACCESS, SERVICE_CONFIG_DESCRIPTION, SERVICE_CONTROL_STOP, SERVICE_DESCRIPTIONW,
    SERVICE_ERROR_NORMAL, SERVICE_NO_CHANGE, SERVICE_QUERY_CONFIG, SERVICE_QUERY_STATUS,
    SERVICE_START, SERVICE_START_TYPE, SERVICE_STATUS, SERVICE_STOP, SERVICE_WIN32_OWN_PROCESS,
    StartServiceW,
};
use windows::core::{PCWSTR, PWSTR};
use wmi::{COMLibrary, WMIConnection};

const ERROR_INSUFFICIENT_BUFFER: u32 = 122;

/// Owned SCM or service handle, closed on drop
struct ScHandle(SC_HANDLE);

impl Drop for ScHandle {
    fn drop(&mut self) {
        unsafe {
            let _ = CloseServiceHandle(self.0);
        }
    }
}

fn os_error(operation: &str, err: windows::core::Error) -> ServyError {
    ServyError::native(operation, (err.code().0 as u32) & 0xFFFF)
}

fn wide(s: &str) -> Vec<u16> {
    s.encode_utf16().chain(std::iter::once(0)).collect()
}

/// Double-NUL terminated list, as the SCM expects for dependencies
fn multi_sz(items: &[String]) -> Vec<u16> {
    let mut out = Vec::new();
    for item in items.iter().filter(|i| !i.is_empty()) {
        out.extend(item.encode_utf16());
        out.push(0);
    }
    out.push(0);
    out
}

fn optional(buf: &Option<Vec<u16>>) -> PCWSTR {
    match buf {
        Some(buf) => PCWSTR(buf.as_ptr()),
        None => PCWSTR::null(),
    }
}

unsafe fn read_pwstr(p: PWSTR) -> String {
    if p.is_null() {
        String::new()
    } else {
        unsafe { p.to_string().unwrap_or_default() }
    }
}

/// Split a double-NUL terminated list; `+`-prefixed load-order groups are skipped
unsafe fn read_multi_sz(p: PWSTR) -> Vec<String> {
    let mut out = Vec::new();
    if p.is_null() {
        return out;
    }
    let mut cursor = p.0 as *const u16;
    loop {
        let mut len = 0usize;
        unsafe {
            while *cursor.add(len) != 0 {
                len += 1;
            }
        }
        if len == 0 {
            break;
        }
        let slice = unsafe { std::slice::from_raw_parts(cursor, len) };
        let item = String::from_utf16_lossy(slice);
        if !item.starts_with('+') {
            out.push(item);
        }
        cursor = unsafe { cursor.add(len + 1) };
    }
    out
}

/// Connector for the local machine's SCM
#[derive(Debug, Clone, Copy, Default)]
pub struct NativeScm;

pub struct NativeManager {
    handle: ScHandle,
}

pub struct NativeService {
    handle: ScHandle,
}

impl ScmConnector for NativeScm {
    type Manager = NativeManager;

    fn connect(&self) -> Result<NativeManager> {
        let handle = unsafe { OpenSCManagerW(PCWSTR::null(), PCWSTR::null(), SC_MANAGER_ALL_ACCESS) }
            .map_err(|e| os_error("OpenSCManager", e))?;
        Ok(NativeManager {
            handle: ScHandle(handle),
        })
    }
}

impl ServiceManagerApi for NativeManager {
    type Service = NativeService;

    fn create_service(&self, spec: &ServiceSpec) -> Result<NativeService> {
        let name = wide(&spec.name);
        let display = wide(&spec.display_name);
        let binary = wide(&spec.binary_path);
        let deps = multi_sz(&spec.dependencies);
        let account = spec.account.as_deref().map(wide);
        let password = spec.password.as_deref().map(wide);

        let handle = unsafe {
            CreateServiceW(
                self.handle.0,
                PCWSTR(name.as_ptr()),
                PCWSTR(display.as_ptr()),
                SERVICE_ALL_ACCESS,
                SERVICE_WIN32_OWN_PROCESS,
                SERVICE_START_TYPE(spec.start_type.code()),
                SERVICE_ERROR_NORMAL,
                PCWSTR(binary.as_ptr()),
                PCWSTR::null(),
                None,
                PCWSTR(deps.as_ptr()),
                optional(&account),
                optional(&password),
            )
        }
        .map_err(|e| os_error("CreateService", e))?;

        Ok(NativeService {
            handle: ScHandle(handle),
        })
    }

    fn open_service(&self, name: &str, access: ServiceAccessLevel) -> Result<NativeService> {
        let rights = match access {
            ServiceAccessLevel::Query => SERVICE_QUERY_STATUS | SERVICE_QUERY_CONFIG,
            ServiceAccessLevel::Control => {
                SERVICE_QUERY_STATUS | SERVICE_QUERY_CONFIG | SERVICE_START | SERVICE_STOP
            }
            ServiceAccessLevel::All => SERVICE_ALL_ACCESS,
        };
        let wname = wide(name);
        let handle = unsafe { OpenServiceW(self.handle.0, PCWSTR(wname.as_ptr()), rights) }
            .map_err(|e| os_error("OpenService", e))?;
        Ok(NativeService {
            handle: ScHandle(handle),
        })
    }
}

impl ServiceApi for NativeService {
    fn change_config(&self, spec: &ServiceSpec) -> Result<()> {
        let display = wide(&spec.display_name);
        let binary = wide(&spec.binary_path);
        let deps = multi_sz(&spec.dependencies);
        // an explicit LocalSystem resets a previously configured account
        let account = wide(spec.account.as_deref().unwrap_or("LocalSystem"));
        let password = wide(spec.password.as_deref().unwrap_or(""));

        unsafe {
            ChangeServiceConfigW(
                self.handle.0,
                SERVICE_WIN32_OWN_PROCESS,
                SERVICE_START_TYPE(spec.start_type.code()),
                SERVICE_ERROR_NORMAL,
                PCWSTR(binary.as_ptr()),
                PCWSTR::null(),
                None,
                PCWSTR(deps.as_ptr()),
                PCWSTR(account.as_ptr()),
                PCWSTR(password.as_ptr()),
                PCWSTR(display.as_ptr()),
            )
        }
        .map_err(|e| os_error("ChangeServiceConfig", e))
    }

    fn set_description(&self, description: &str) -> Result<()> {
        let mut text = wide(description);
        let info = SERVICE_DESCRIPTIONW {
            lpDescription: PWSTR(text.as_mut_ptr()),
        };
        unsafe {
            ChangeServiceConfig2W(
                self.handle.0,
                SERVICE_CONFIG_DESCRIPTION,
                Some(&info as *const SERVICE_DESCRIPTIONW as *const std::ffi::c_void),
            )
        }
        .map_err(|e| os_error("ChangeServiceConfig2", e))
    }

    fn set_start_type(&self, start_type: StartType) -> Result<()> {
        unsafe {
            ChangeServiceConfigW(
                self.handle.0,
                ENUM_SERVICE_TYPE(SERVICE_NO_CHANGE),
                SERVICE_START_TYPE(start_type.code()),
                SERVICE_ERROR(SERVICE_NO_CHANGE),
                PCWSTR::null(),
                PCWSTR::null(),
                None,
                PCWSTR::null(),
                PCWSTR::null(),
                PCWSTR::null(),
                PCWSTR::null(),
            )
        }
        .map_err(|e| os_error("ChangeServiceConfig", e))
    }

    fn query_state(&self) -> Result<ServiceState> {
        let mut status = SERVICE_STATUS::default();
        unsafe { QueryServiceStatus(self.handle.0, &mut status) }
            .map_err(|e| os_error("QueryServiceStatus", e))?;
        Ok(ServiceState::from_code(status.dwCurrentState.0))
    }

    fn query_config(&self) -> Result<ServiceConfigInfo> {
        let mut needed = 0u32;
        if let Err(e) = unsafe { QueryServiceConfigW(self.handle.0, None, 0, &mut needed) } {
            let code = (e.code().0 as u32) & 0xFFFF;
            if code != ERROR_INSUFFICIENT_BUFFER {
                return Err(ServyError::native("QueryServiceConfig", code));
            }
        }

        // u64 backing keeps the struct suitably aligned
        let mut buffer = vec![0u64; (needed as usize).div_ceil(8).max(1)];
        let config = buffer.as_mut_ptr() as *mut QUERY_SERVICE_CONFIGW;
        unsafe { QueryServiceConfigW(self.handle.0, Some(config), needed, &mut needed) }
            .map_err(|e| os_error("QueryServiceConfig", e))?;

        unsafe {
            let config = &*config;
            Ok(ServiceConfigInfo {
                display_name: read_pwstr(config.lpDisplayName),
                binary_path: read_pwstr(config.lpBinaryPathName),
                dependencies: read_multi_sz(config.lpDependencies),
            })
        }
    }

    fn start(&self) -> Result<()> {
        unsafe { StartServiceW(self.handle.0, None) }.map_err(|e| os_error("StartService", e))
    }

    fn stop(&self) -> Result<()> {
        let mut status = SERVICE_STATUS::default();
        unsafe { ControlService(self.handle.0, SERVICE_CONTROL_STOP, &mut status) }
            .map_err(|e| os_error("ControlService", e))
    }

    fn delete(&self) -> Result<()> {
        unsafe { DeleteService(self.handle.0) }.map_err(|e| os_error("DeleteService", e))
    }
}

/// `Win32_Service` inventory over a fresh WMI connection per call
#[derive(Debug, Clone, Copy, Default)]
pub struct WmiInventory;

impl WmiInventory {
    fn connect() -> Result<WMIConnection> {
        let com = COMLibrary::new()
            .or_else(|_| COMLibrary::without_security())
            .map_err(|e| ServyError::Inventory(format!("COM initialization failed: {}", e)))?;
        WMIConnection::new(com).map_err(|e| ServyError::Inventory(format!("WMI connection failed: {}", e)))
    }

    fn query(name: Option<&str>, cancel: &CancellationToken) -> Result<Vec<ServiceInfo>> {
        check_cancelled(cancel)?;
        let conn = Self::connect()?;
        let rows: Vec<Win32_Service> = conn
            .raw_query(service_query(name))
            .map_err(|e| ServyError::Inventory(e.to_string()))?;
        check_cancelled(cancel)?;
        Ok(rows.into_iter().filter_map(ServiceInfo::from_wmi).collect())
    }
}

impl ServiceInventory for WmiInventory {
    fn get_all_services(&self, cancel: &CancellationToken) -> Result<Vec<ServiceInfo>> {
        Self::query(None, cancel)
    }

    fn find_service(&self, name: &str, cancel: &CancellationToken) -> Result<Option<ServiceInfo>> {
        Ok(Self::query(Some(name), cancel)?.into_iter().next())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn multi_sz_is_double_nul_terminated() {
        let buf = multi_sz(&["Tcpip".to_string(), "Dnscache".to_string()]);
        assert_eq!(&buf[buf.len() - 2..], &[0, 0]);
        let parsed = unsafe { read_multi_sz(PWSTR(buf.as_ptr() as *mut u16)) };
        assert_eq!(parsed, vec!["Tcpip", "Dnscache"]);
    }

    #[test]
    fn empty_dependency_list_is_an_empty_string() {
        assert_eq!(multi_sz(&[]), vec![0]);
    }
}
