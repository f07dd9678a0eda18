//! Configuration management for servy
//!
//! Resolves the data directory, the service store and log locations, and loads the
//! tunable settings. Components receive the values they need when they are built.

use crate::constants::{
    DEFAULT_LOG_LINES, LOG_FOLLOW_INTERVAL, PUMP_DRAIN_TIMEOUT, SCM_POLL_INTERVAL,
    SCM_START_TIMEOUT, SCM_STOP_TIMEOUT, SHUTDOWN_TIMEOUT,
};
use crate::error::{Result, ServyError};
use crate::scm::ScmTimeouts;
use crate::supervisor::SupervisorSettings;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable overriding the data directory
pub const HOME_ENV: &str = "SERVY_HOME";

/// Tunables stored in `settings.json`
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct Settings {
    /// Name used for the wrapper's own log file
    pub event_source: String,
    /// Wrapper executable registered as each service's binary; next to `servy` when unset
    pub wrapper_exe: Option<PathBuf>,
    /// Management executable used to restart a service from inside it
    pub restarter_exe: Option<PathBuf>,
    pub scm_start_timeout_ms: u64,
    pub scm_stop_timeout_ms: u64,
    pub scm_poll_interval_ms: u64,
    pub pump_drain_timeout_ms: u64,
    pub log_follow_interval_ms: u64,
    pub default_log_lines: usize,
    /// Fallback filter when `RUST_LOG` is not set
    pub log_level: String,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            event_source: "servy".to_string(),
            wrapper_exe: None,
            restarter_exe: None,
            scm_start_timeout_ms: SCM_START_TIMEOUT.as_millis() as u64,
            scm_stop_timeout_ms: SCM_STOP_TIMEOUT.as_millis() as u64,
            scm_poll_interval_ms: SCM_POLL_INTERVAL.as_millis() as u64,
            pump_drain_timeout_ms: PUMP_DRAIN_TIMEOUT.as_millis() as u64,
            log_follow_interval_ms: LOG_FOLLOW_INTERVAL.as_millis() as u64,
            default_log_lines: DEFAULT_LOG_LINES,
            log_level: "info".to_string(),
        }
    }
}

/// Resolved locations plus loaded settings
#[derive(Clone, Debug)]
pub struct AppConfig {
    /// Base data directory
    pub config_dir: PathBuf,
    /// JSON store of installed services
    pub services_file: PathBuf,
    /// Directory for the wrapper's own logs
    pub logs_dir: PathBuf,
    pub settings: Settings,
}

impl AppConfig {
    /// Resolve the data directory and load settings from it
    pub fn new() -> Result<Self> {
        Self::at(default_config_dir()?)
    }

    /// Use `config_dir` as the data directory, creating it if needed
    pub fn at(config_dir: impl Into<PathBuf>) -> Result<Self> {
        let config_dir = config_dir.into();
        let services_file = config_dir.join("services.json");
        let logs_dir = config_dir.join("logs");

        fs::create_dir_all(&config_dir)?;
        fs::create_dir_all(&logs_dir)?;

        let settings = load_settings(&config_dir.join("settings.json"))?;

        Ok(AppConfig {
            config_dir,
            services_file,
            logs_dir,
            settings,
        })
    }

    /// Log file for the wrapper hosting `service_name`
    pub fn service_log_path(&self, service_name: &str) -> PathBuf {
        let safe: String = service_name
            .chars()
            .map(|c| if c.is_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
            .collect();
        self.logs_dir.join(format!("{}.log", safe))
    }

    /// Wrapper binary path; defaults to `servy-service` beside the running executable
    pub fn wrapper_exe(&self) -> Result<PathBuf> {
        match &self.settings.wrapper_exe {
            Some(path) => Ok(path.clone()),
            None => sibling_exe("servy-service"),
        }
    }

    /// Management binary path; defaults to `servy` beside the running executable
    pub fn restarter_exe(&self) -> Result<PathBuf> {
        match &self.settings.restarter_exe {
            Some(path) => Ok(path.clone()),
            None => sibling_exe("servy"),
        }
    }

    pub fn scm_timeouts(&self) -> ScmTimeouts {
        ScmTimeouts {
            start: Duration::from_millis(self.settings.scm_start_timeout_ms),
            stop: Duration::from_millis(self.settings.scm_stop_timeout_ms),
            poll: Duration::from_millis(self.settings.scm_poll_interval_ms.max(1)),
        }
    }

    /// Supervisor timings, with the per-service stop grace period
    pub fn supervisor_settings(&self, stop_timeout_seconds: u64) -> SupervisorSettings {
        let grace = if stop_timeout_seconds == 0 {
            SHUTDOWN_TIMEOUT
        } else {
            Duration::from_secs(stop_timeout_seconds)
        };
        SupervisorSettings {
            stop_grace: grace,
            pump_drain_timeout: Duration::from_millis(self.settings.pump_drain_timeout_ms),
        }
    }

    pub fn log_follow_interval(&self) -> Duration {
        Duration::from_millis(self.settings.log_follow_interval_ms.max(1))
    }

    /// Write the current settings back to `settings.json`
    pub fn save_settings(&self) -> Result<()> {
        let json = serde_json::to_string_pretty(&self.settings)?;
        fs::write(self.config_dir.join("settings.json"), json)?;
        Ok(())
    }
}

fn load_settings(path: &Path) -> Result<Settings> {
    if !path.exists() {
        return Ok(Settings::default());
    }
    let content = fs::read_to_string(path)?;
    serde_json::from_str(&content).map_err(|e| {
        ServyError::Config(format!("invalid settings file {}: {}", path.display(), e))
    })
}

fn default_config_dir() -> Result<PathBuf> {
    if let Some(home) = std::env::var_os(HOME_ENV) {
        if !home.is_empty() {
            return Ok(PathBuf::from(home));
        }
    }

    #[cfg(windows)]
    if let Some(program_data) = std::env::var_os("ProgramData") {
        return Ok(PathBuf::from(program_data).join("Servy"));
    }

    Ok(dirs::config_dir()
        .ok_or_else(|| ServyError::Config("Could not find config directory".to_string()))?
        .join("servy"))
}

fn sibling_exe(stem: &str) -> Result<PathBuf> {
    let current = std::env::current_exe()?;
    let dir = current
        .parent()
        .ok_or_else(|| ServyError::Config("executable has no parent directory".to_string()))?;
    Ok(dir.join(format!("{}{}", stem, std::env::consts::EXE_SUFFIX)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn creates_layout_with_default_settings() {
        let dir = TempDir::new().unwrap();
        let config = AppConfig::at(dir.path().join("servy")).unwrap();

        assert!(config.logs_dir.is_dir());
        assert_eq!(config.services_file, dir.path().join("servy").join("services.json"));
        assert_eq!(config.settings, Settings::default());
        assert_eq!(config.scm_timeouts().stop, SCM_STOP_TIMEOUT);
    }

    #[test]
    fn partial_settings_file_keeps_other_defaults() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join("settings.json"),
            r#"{ "event_source": "acme", "scm_poll_interval_ms": 50 }"#,
        )
        .unwrap();

        let config = AppConfig::at(dir.path()).unwrap();
        assert_eq!(config.settings.event_source, "acme");
        assert_eq!(config.scm_timeouts().poll, Duration::from_millis(50));
        assert_eq!(config.settings.default_log_lines, DEFAULT_LOG_LINES);
    }

    #[test]
    fn saved_settings_are_loaded_back() {
        let dir = TempDir::new().unwrap();
        let mut config = AppConfig::at(dir.path()).unwrap();
        config.settings.log_level = "debug".to_string();
        config.settings.wrapper_exe = Some(PathBuf::from("/opt/servy/servy-service"));
        config.save_settings().unwrap();

        let reloaded = AppConfig::at(dir.path()).unwrap();
        assert_eq!(reloaded.settings, config.settings);
        assert_eq!(reloaded.wrapper_exe().unwrap(), PathBuf::from("/opt/servy/servy-service"));
    }

    #[test]
    fn service_log_names_are_sanitized() {
        let dir = TempDir::new().unwrap();
        let config = AppConfig::at(dir.path()).unwrap();
        assert_eq!(
            config.service_log_path("My Service:1"),
            config.logs_dir.join("My_Service_1.log")
        );
    }

    #[test]
    fn zero_stop_timeout_uses_default_grace() {
        let dir = TempDir::new().unwrap();
        let config = AppConfig::at(dir.path()).unwrap();
        assert_eq!(config.supervisor_settings(0).stop_grace, SHUTDOWN_TIMEOUT);
        assert_eq!(config.supervisor_settings(3).stop_grace, Duration::from_secs(3));
    }
}
