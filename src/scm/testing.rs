//! In-memory service control manager for tests
//!
//! Tracks every open handle so tests can assert that each operation releases what it
//! opened, and records the native calls made in order.

use super::{
    ScmConnector, ServiceAccessLevel, ServiceApi, ServiceConfigInfo, ServiceManagerApi,
    ServiceSpec, ServiceState,
};
use crate::error::{ERROR_SERVICE_DOES_NOT_EXIST, ERROR_SERVICE_EXISTS, ERROR_SERVICE_NOT_ACTIVE, Result, ServyError};
use crate::service::StartType;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};

const ERROR_ACCESS_DENIED: u32 = 5;
const ERROR_INVALID_PARAMETER: u32 = 87;
const ERROR_SERVICE_ALREADY_RUNNING: u32 = 1056;

#[derive(Debug, Clone)]
pub struct FakeRecord {
    pub spec: ServiceSpec,
    pub state: ServiceState,
}

#[derive(Debug, Default)]
pub struct FakeState {
    pub services: BTreeMap<String, FakeRecord>,
    pub calls: Vec<String>,
    pub open_handles: i64,
    pub fail_connect: bool,
    pub fail_create: Option<u32>,
    pub fail_change_config: bool,
    /// Stop requests leave the service in StopPending
    pub stuck_stopping: bool,
    /// Names whose open fails with access denied
    pub unavailable: Vec<String>,
}

#[derive(Clone, Default)]
pub struct FakeScm {
    state: Arc<Mutex<FakeState>>,
}

fn key(name: &str) -> String {
    name.to_lowercase()
}

impl FakeScm {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lock(&self) -> MutexGuard<'_, FakeState> {
        self.state.lock().unwrap()
    }

    /// Register a service directly, bypassing the call log
    pub fn with_service(self, name: &str, display_name: &str, deps: &[&str], state: ServiceState) -> Self {
        let spec = ServiceSpec {
            name: name.to_string(),
            display_name: display_name.to_string(),
            description: String::new(),
            binary_path: format!("{}.exe", name),
            start_type: StartType::Automatic,
            account: None,
            password: None,
            dependencies: deps.iter().map(|d| d.to_string()).collect(),
        };
        self.lock().services.insert(key(name), FakeRecord { spec, state });
        self
    }

    pub fn record(&self, name: &str) -> Option<FakeRecord> {
        self.lock().services.get(&key(name)).cloned()
    }

    pub fn calls(&self) -> Vec<String> {
        self.lock().calls.clone()
    }

    pub fn open_handles(&self) -> i64 {
        self.lock().open_handles
    }
}

pub struct FakeManager {
    state: Arc<Mutex<FakeState>>,
}

pub struct FakeService {
    state: Arc<Mutex<FakeState>>,
    name: String,
}

impl ScmConnector for FakeScm {
    type Manager = FakeManager;

    fn connect(&self) -> Result<FakeManager> {
        let mut state = self.lock();
        if state.fail_connect {
            return Err(ServyError::native("OpenSCManager", ERROR_ACCESS_DENIED));
        }
        state.open_handles += 1;
        Ok(FakeManager {
            state: Arc::clone(&self.state),
        })
    }
}

impl Drop for FakeManager {
    fn drop(&mut self) {
        self.state.lock().unwrap().open_handles -= 1;
    }
}

impl Drop for FakeService {
    fn drop(&mut self) {
        self.state.lock().unwrap().open_handles -= 1;
    }
}

impl ServiceManagerApi for FakeManager {
    type Service = FakeService;

    fn create_service(&self, spec: &ServiceSpec) -> Result<FakeService> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(format!("create:{}", spec.name));
        if let Some(code) = state.fail_create {
            return Err(ServyError::native("CreateService", code));
        }
        if state.services.contains_key(&key(&spec.name)) {
            return Err(ServyError::native("CreateService", ERROR_SERVICE_EXISTS));
        }
        state.services.insert(
            key(&spec.name),
            FakeRecord {
                spec: spec.clone(),
                state: ServiceState::Stopped,
            },
        );
        state.open_handles += 1;
        Ok(FakeService {
            state: Arc::clone(&self.state),
            name: spec.name.clone(),
        })
    }

    fn open_service(&self, name: &str, _access: ServiceAccessLevel) -> Result<FakeService> {
        let mut state = self.state.lock().unwrap();
        if state.unavailable.iter().any(|n| n.eq_ignore_ascii_case(name)) {
            return Err(ServyError::native("OpenService", ERROR_ACCESS_DENIED));
        }
        if !state.services.contains_key(&key(name)) {
            return Err(ServyError::native("OpenService", ERROR_SERVICE_DOES_NOT_EXIST));
        }
        state.open_handles += 1;
        Ok(FakeService {
            state: Arc::clone(&self.state),
            name: name.to_string(),
        })
    }
}

impl FakeService {
    fn with_record<T>(&self, call: &str, f: impl FnOnce(&mut FakeState) -> Result<T>) -> Result<T> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(format!("{}:{}", call, self.name));
        if !state.services.contains_key(&key(&self.name)) {
            return Err(ServyError::native(call, ERROR_SERVICE_DOES_NOT_EXIST));
        }
        f(&mut state)
    }

    fn record_mut<'a>(&self, state: &'a mut FakeState) -> &'a mut FakeRecord {
        state.services.get_mut(&key(&self.name)).unwrap()
    }
}

impl ServiceApi for FakeService {
    fn change_config(&self, spec: &ServiceSpec) -> Result<()> {
        self.with_record("change_config", |state| {
            if state.fail_change_config {
                return Err(ServyError::native("ChangeServiceConfig", ERROR_INVALID_PARAMETER));
            }
            let record = self.record_mut(state);
            let description = record.spec.description.clone();
            record.spec = spec.clone();
            record.spec.description = description;
            Ok(())
        })
    }

    fn set_description(&self, description: &str) -> Result<()> {
        self.with_record("describe", |state| {
            self.record_mut(state).spec.description = description.to_string();
            Ok(())
        })
    }

    fn set_start_type(&self, start_type: StartType) -> Result<()> {
        self.with_record("start_type", |state| {
            self.record_mut(state).spec.start_type = start_type;
            Ok(())
        })
    }

    fn query_state(&self) -> Result<ServiceState> {
        let state = self.state.lock().unwrap();
        state
            .services
            .get(&key(&self.name))
            .map(|r| r.state)
            .ok_or_else(|| ServyError::native("QueryServiceStatus", ERROR_SERVICE_DOES_NOT_EXIST))
    }

    fn query_config(&self) -> Result<ServiceConfigInfo> {
        let state = self.state.lock().unwrap();
        let record = state
            .services
            .get(&key(&self.name))
            .ok_or_else(|| ServyError::native("QueryServiceConfig", ERROR_SERVICE_DOES_NOT_EXIST))?;
        Ok(ServiceConfigInfo {
            display_name: record.spec.display_name.clone(),
            binary_path: record.spec.binary_path.clone(),
            dependencies: record.spec.dependencies.clone(),
        })
    }

    fn start(&self) -> Result<()> {
        self.with_record("start", |state| {
            let record = self.record_mut(state);
            if record.state == ServiceState::Running {
                return Err(ServyError::native("StartService", ERROR_SERVICE_ALREADY_RUNNING));
            }
            record.state = ServiceState::Running;
            Ok(())
        })
    }

    fn stop(&self) -> Result<()> {
        self.with_record("stop", |state| {
            let stuck = state.stuck_stopping;
            let record = self.record_mut(state);
            if record.state == ServiceState::Stopped {
                return Err(ServyError::native("ControlService", ERROR_SERVICE_NOT_ACTIVE));
            }
            record.state = if stuck {
                ServiceState::StopPending
            } else {
                ServiceState::Stopped
            };
            Ok(())
        })
    }

    fn delete(&self) -> Result<()> {
        self.with_record("delete", |state| {
            state.services.remove(&key(&self.name));
            Ok(())
        })
    }
}
