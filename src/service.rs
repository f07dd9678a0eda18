//! Service configuration model
//!
//! Everything the management layer hands to the SCM adapter, and everything the wrapper
//! decodes back out of its command line.

use crate::constants::{DEFAULT_PRE_LAUNCH_TIMEOUT_SECS, MAX_LOG_SIZE, SHUTDOWN_TIMEOUT};
use crate::error::{Result, ServyError};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// OS scheduling priority for the supervised process
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum ProcessPriority {
    Idle,
    BelowNormal,
    #[default]
    Normal,
    AboveNormal,
    High,
    RealTime,
}

impl ProcessPriority {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProcessPriority::Idle => "Idle",
            ProcessPriority::BelowNormal => "BelowNormal",
            ProcessPriority::Normal => "Normal",
            ProcessPriority::AboveNormal => "AboveNormal",
            ProcessPriority::High => "High",
            ProcessPriority::RealTime => "RealTime",
        }
    }

    /// Windows priority-class creation flag
    pub fn creation_flag(&self) -> u32 {
        match self {
            ProcessPriority::Idle => 0x0000_0040,
            ProcessPriority::BelowNormal => 0x0000_4000,
            ProcessPriority::Normal => 0x0000_0020,
            ProcessPriority::AboveNormal => 0x0000_8000,
            ProcessPriority::High => 0x0000_0080,
            ProcessPriority::RealTime => 0x0000_0100,
        }
    }

    /// Unix nice value
    pub fn nice(&self) -> i32 {
        match self {
            ProcessPriority::Idle => 19,
            ProcessPriority::BelowNormal => 10,
            ProcessPriority::Normal => 0,
            ProcessPriority::AboveNormal => -5,
            ProcessPriority::High => -10,
            ProcessPriority::RealTime => -20,
        }
    }
}

impl std::str::FromStr for ProcessPriority {
    type Err = ServyError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "idle" => Ok(ProcessPriority::Idle),
            "belownormal" => Ok(ProcessPriority::BelowNormal),
            "" | "normal" => Ok(ProcessPriority::Normal),
            "abovenormal" => Ok(ProcessPriority::AboveNormal),
            "high" => Ok(ProcessPriority::High),
            "realtime" => Ok(ProcessPriority::RealTime),
            _ => Err(ServyError::Config(format!("unknown process priority '{}'", s))),
        }
    }
}

impl std::fmt::Display for ProcessPriority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Remedial step taken once consecutive heartbeat failures cross the threshold
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum RecoveryAction {
    None,
    #[default]
    RestartProcess,
    RestartService,
    RestartComputer,
}

impl RecoveryAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecoveryAction::None => "None",
            RecoveryAction::RestartProcess => "RestartProcess",
            RecoveryAction::RestartService => "RestartService",
            RecoveryAction::RestartComputer => "RestartComputer",
        }
    }
}

impl std::str::FromStr for RecoveryAction {
    type Err = ServyError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "" | "none" => Ok(RecoveryAction::None),
            "restartprocess" => Ok(RecoveryAction::RestartProcess),
            "restartservice" => Ok(RecoveryAction::RestartService),
            "restartcomputer" => Ok(RecoveryAction::RestartComputer),
            _ => Err(ServyError::Config(format!("unknown recovery action '{}'", s))),
        }
    }
}

impl std::fmt::Display for RecoveryAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// SCM start type. Discriminants are the native values.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum StartType {
    Boot = 0,
    System = 1,
    #[default]
    Automatic = 2,
    Manual = 3,
    Disabled = 4,
}

impl StartType {
    pub fn code(&self) -> u32 {
        *self as u32
    }

    pub fn from_code(code: u32) -> Option<Self> {
        match code {
            0 => Some(StartType::Boot),
            1 => Some(StartType::System),
            2 => Some(StartType::Automatic),
            3 => Some(StartType::Manual),
            4 => Some(StartType::Disabled),
            _ => None,
        }
    }
}

impl std::fmt::Display for StartType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            StartType::Boot => "Boot",
            StartType::System => "System",
            StartType::Automatic => "Automatic",
            StartType::Manual => "Manual",
            StartType::Disabled => "Disabled",
        };
        f.write_str(name)
    }
}

/// Helper command run before the main process starts
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct PreLaunchConfig {
    pub exe_path: String,
    #[serde(default)]
    pub working_directory: Option<String>,
    #[serde(default)]
    pub args: String,
    #[serde(default)]
    pub env: Vec<(String, String)>,
    #[serde(default)]
    pub stdout_path: Option<String>,
    #[serde(default)]
    pub stderr_path: Option<String>,
    #[serde(default = "default_pre_launch_timeout")]
    pub timeout_seconds: u64,
    #[serde(default)]
    pub retry_attempts: u32,
    #[serde(default)]
    pub ignore_failure: bool,
}

fn default_pre_launch_timeout() -> u64 {
    DEFAULT_PRE_LAUNCH_TIMEOUT_SECS
}

impl PreLaunchConfig {
    pub fn new(exe_path: impl Into<String>) -> Self {
        Self {
            exe_path: exe_path.into(),
            working_directory: None,
            args: String::new(),
            env: Vec::new(),
            stdout_path: None,
            stderr_path: None,
            timeout_seconds: DEFAULT_PRE_LAUNCH_TIMEOUT_SECS,
            retry_attempts: 0,
            ignore_failure: false,
        }
    }
}

/// Helper command run once the main process is up; failures are only logged
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct PostLaunchConfig {
    pub exe_path: String,
    #[serde(default)]
    pub working_directory: Option<String>,
    #[serde(default)]
    pub args: String,
}

/// Complete description of one wrapped service
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct ServiceConfiguration {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub executable_path: String,
    #[serde(default)]
    pub working_directory: Option<String>,
    #[serde(default)]
    pub arguments: String,
    #[serde(default)]
    pub environment_variables: Vec<(String, String)>,
    #[serde(default)]
    pub priority: ProcessPriority,
    #[serde(default)]
    pub start_type: StartType,
    #[serde(default)]
    pub stdout_path: Option<String>,
    #[serde(default)]
    pub stderr_path: Option<String>,
    #[serde(default)]
    pub rotation_enabled: bool,
    #[serde(default)]
    pub rotation_size_bytes: u64,
    #[serde(default)]
    pub max_rotations: u32,
    #[serde(default)]
    pub health_enabled: bool,
    #[serde(default)]
    pub heartbeat_interval_seconds: u64,
    #[serde(default)]
    pub max_failed_checks: u32,
    #[serde(default)]
    pub recovery_action: RecoveryAction,
    #[serde(default)]
    pub max_restart_attempts: u32,
    #[serde(default = "default_true")]
    pub run_as_local_system: bool,
    #[serde(default)]
    pub account: Option<String>,
    /// Handed to the SCM only; never persisted.
    #[serde(default, skip_serializing)]
    pub password: Option<String>,
    #[serde(default)]
    pub dependencies: Vec<String>,
    #[serde(default)]
    pub pre_launch: Option<PreLaunchConfig>,
    #[serde(default)]
    pub post_launch: Option<PostLaunchConfig>,
    #[serde(default = "default_stop_timeout")]
    pub stop_timeout_seconds: u64,
}

fn default_true() -> bool {
    true
}

fn default_stop_timeout() -> u64 {
    SHUTDOWN_TIMEOUT.as_secs()
}

impl ServiceConfiguration {
    /// Create a configuration with default policy for the given executable
    pub fn new(name: impl Into<String>, executable_path: impl Into<String>) -> Self {
        ServiceConfiguration {
            name: name.into(),
            description: String::new(),
            executable_path: executable_path.into(),
            working_directory: None,
            arguments: String::new(),
            environment_variables: Vec::new(),
            priority: ProcessPriority::Normal,
            start_type: StartType::Automatic,
            stdout_path: None,
            stderr_path: None,
            rotation_enabled: false,
            rotation_size_bytes: 0,
            max_rotations: 0,
            health_enabled: false,
            heartbeat_interval_seconds: 0,
            max_failed_checks: 0,
            recovery_action: RecoveryAction::RestartProcess,
            max_restart_attempts: 0,
            run_as_local_system: true,
            account: None,
            password: None,
            dependencies: Vec::new(),
            pre_launch: None,
            post_launch: None,
            stop_timeout_seconds: SHUTDOWN_TIMEOUT.as_secs(),
        }
    }

    /// Turn on size-based rotation of captured output
    pub fn with_rotation(mut self, size_bytes: u64, max_rotations: u32) -> Self {
        self.rotation_enabled = true;
        self.rotation_size_bytes = size_bytes;
        self.max_rotations = max_rotations;
        self
    }

    /// Turn on heartbeat health checks
    pub fn with_health(
        mut self,
        interval_seconds: u64,
        max_failed_checks: u32,
        action: RecoveryAction,
        max_restart_attempts: u32,
    ) -> Self {
        self.health_enabled = true;
        self.heartbeat_interval_seconds = interval_seconds;
        self.max_failed_checks = max_failed_checks;
        self.recovery_action = action;
        self.max_restart_attempts = max_restart_attempts;
        self
    }

    /// Rotation threshold as encoded for the wrapper; zero when rotation is off
    pub fn effective_rotation_size(&self) -> u64 {
        if self.rotation_enabled {
            self.rotation_size_bytes
        } else {
            0
        }
    }

    /// Heartbeat period as encoded for the wrapper; zero when health checks are off
    pub fn effective_heartbeat_interval(&self) -> u64 {
        if self.health_enabled {
            self.heartbeat_interval_seconds
        } else {
            0
        }
    }

    /// Account the service runs under; `None` means LocalSystem
    pub fn service_account(&self) -> Option<&str> {
        if self.run_as_local_system {
            None
        } else {
            self.account.as_deref().filter(|a| !a.is_empty())
        }
    }

    /// Reject configurations that cannot be installed, before any native call is made
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(ServyError::Config("service name is required".to_string()));
        }
        if self.name.contains(['/', '\\']) {
            return Err(ServyError::Config(format!(
                "service name '{}' must not contain slashes",
                self.name
            )));
        }

        validate_executable(&self.executable_path)?;

        if let Some(ref workdir) = self.working_directory {
            if !workdir.is_empty() && !Path::new(workdir).is_dir() {
                return Err(ServyError::Config(format!(
                    "working directory not found: {}",
                    workdir
                )));
            }
        }

        if self.rotation_enabled && self.rotation_size_bytes == 0 {
            return Err(ServyError::Config(
                "rotation is enabled but rotation size is 0".to_string(),
            ));
        }

        if self.health_enabled {
            if self.heartbeat_interval_seconds == 0 {
                return Err(ServyError::Config(
                    "health monitoring is enabled but heartbeat interval is 0".to_string(),
                ));
            }
            if self.max_failed_checks == 0 {
                return Err(ServyError::Config(
                    "max failed checks must be at least 1".to_string(),
                ));
            }
        }

        if !self.run_as_local_system && self.service_account().is_none() {
            return Err(ServyError::Config(
                "an account is required when not running as LocalSystem".to_string(),
            ));
        }

        if let Some(ref pre) = self.pre_launch {
            validate_executable(&pre.exe_path)?;
            if pre.timeout_seconds == 0 {
                return Err(ServyError::Config(
                    "pre-launch timeout must be at least 1 second".to_string(),
                ));
            }
        }

        if let Some(ref post) = self.post_launch {
            validate_executable(&post.exe_path)?;
        }

        for (key, _) in self.environment_variables.iter() {
            if key.is_empty() {
                return Err(ServyError::Config(
                    "environment variable with empty name".to_string(),
                ));
            }
        }

        Ok(())
    }

    /// Print detailed configuration information
    pub fn print_details(&self) {
        println!("Service: {}", self.name);
        if !self.description.is_empty() {
            println!("Description: {}", self.description);
        }
        println!("Executable: {}", self.executable_path);
        if !self.arguments.is_empty() {
            println!("Arguments: {}", self.arguments);
        }
        if let Some(workdir) = &self.working_directory {
            println!("Working directory: {}", workdir);
        }
        println!("Priority: {}", self.priority);
        println!("Start type: {}", self.start_type);
        if let Some(stdout) = &self.stdout_path {
            println!("Stdout: {}", stdout);
        }
        if let Some(stderr) = &self.stderr_path {
            println!("Stderr: {}", stderr);
        }
        if self.rotation_enabled {
            println!(
                "Rotation: {} bytes, keep {}",
                self.rotation_size_bytes,
                if self.max_rotations == 0 {
                    "all".to_string()
                } else {
                    self.max_rotations.to_string()
                }
            );
        }
        if self.health_enabled {
            println!(
                "Health: every {}s, {} failures -> {} (max {} restarts)",
                self.heartbeat_interval_seconds,
                self.max_failed_checks,
                self.recovery_action,
                self.max_restart_attempts
            );
        }
        if !self.environment_variables.is_empty() {
            println!("Environment variables:");
            for (key, value) in &self.environment_variables {
                println!("  {}={}", key, value);
            }
        }
        if !self.dependencies.is_empty() {
            println!("Depends on: {}", self.dependencies.join(", "));
        }
        if let Some(pre) = &self.pre_launch {
            println!(
                "Pre-launch: {} {} (timeout {}s, retries {}, ignore failure {})",
                pre.exe_path, pre.args, pre.timeout_seconds, pre.retry_attempts, pre.ignore_failure
            );
        }
        if let Some(post) = &self.post_launch {
            println!("Post-launch: {} {}", post.exe_path, post.args);
        }
    }
}

/// Check that an executable path points at an existing file
fn validate_executable(path: &str) -> Result<()> {
    if path.trim().is_empty() {
        return Err(ServyError::Config("executable path is required".to_string()));
    }
    let p = Path::new(path);
    if !p.exists() {
        return Err(ServyError::Config(format!("executable not found: {}", path)));
    }
    if p.is_dir() {
        return Err(ServyError::Config(format!(
            "executable path is a directory: {}",
            path
        )));
    }
    Ok(())
}

impl Default for ServiceConfiguration {
    fn default() -> Self {
        Self::new("", "")
    }
}

/// Default rotation threshold offered to the management layer
pub fn default_rotation_size() -> u64 {
    MAX_LOG_SIZE
}

#[cfg(test)]
mod tests {
    use super::*;

    fn existing_exe() -> String {
        std::env::current_exe()
            .unwrap()
            .to_string_lossy()
            .into_owned()
    }

    #[test]
    fn valid_configuration_passes() {
        let config = ServiceConfiguration::new("demo", existing_exe())
            .with_rotation(default_rotation_size(), 5)
            .with_health(30, 3, RecoveryAction::RestartProcess, 3);
        config.validate().unwrap();
    }

    #[test]
    fn missing_executable_is_rejected() {
        let config = ServiceConfiguration::new("demo", "/definitely/not/here.exe");
        assert!(matches!(config.validate(), Err(ServyError::Config(_))));
    }

    #[test]
    fn rotation_enabled_requires_size() {
        let mut config = ServiceConfiguration::new("demo", existing_exe());
        config.rotation_enabled = true;
        assert!(config.validate().is_err());

        config.rotation_enabled = false;
        config.rotation_size_bytes = 4096;
        config.validate().unwrap();
        assert_eq!(config.effective_rotation_size(), 0);
    }

    #[test]
    fn health_enabled_requires_interval() {
        let mut config = ServiceConfiguration::new("demo", existing_exe());
        config.health_enabled = true;
        config.max_failed_checks = 3;
        assert!(config.validate().is_err());

        config.heartbeat_interval_seconds = 5;
        config.validate().unwrap();
        assert_eq!(config.effective_heartbeat_interval(), 5);
    }

    #[test]
    fn custom_account_must_be_named() {
        let mut config = ServiceConfiguration::new("demo", existing_exe());
        config.run_as_local_system = false;
        assert!(config.validate().is_err());
        config.account = Some(".\\svc".into());
        config.validate().unwrap();
        assert_eq!(config.service_account(), Some(".\\svc"));
    }

    #[test]
    fn enums_parse_case_insensitively() {
        assert_eq!("restartservice".parse::<RecoveryAction>().unwrap(), RecoveryAction::RestartService);
        assert_eq!("HIGH".parse::<ProcessPriority>().unwrap(), ProcessPriority::High);
        assert!("sometimes".parse::<RecoveryAction>().is_err());
        assert_eq!(StartType::from_code(3), Some(StartType::Manual));
        assert_eq!(StartType::Disabled.code(), 4);
    }

    #[test]
    fn password_is_not_serialized() {
        let mut config = ServiceConfiguration::new("demo", "app.exe");
        config.password = Some("hunter2".into());
        let json = serde_json::to_string(&config).unwrap();
        assert!(!json.contains("hunter2"));
        let back: ServiceConfiguration = serde_json::from_str(&json).unwrap();
        assert_eq!(back.password, None);
    }
}
