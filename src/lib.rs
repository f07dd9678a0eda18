//! servy
//!
//! Runs an arbitrary executable as a supervised Windows service. A generic wrapper
//! process sits between the Service Control Manager and the real program: it launches
//! the child, captures and rotates its output, polls its health and applies the
//! configured recovery policy.

pub mod cli;
pub mod config;
pub mod error;
pub mod logs;
pub mod manager;
pub mod repository;
pub mod rotation;
pub mod scm;
pub mod service;
pub mod supervisor;
pub mod telemetry;
pub mod wrapper;
pub mod wrapper_args;

pub use error::{Result, ServyError};
pub use manager::ServiceManager;
pub use service::{RecoveryAction, ServiceConfiguration};
pub use supervisor::{ProcessSupervisor, SupervisorState};

/// Application constants
pub mod constants {
    use std::time::Duration;

    /// Default rotation threshold for captured output (10MB)
    pub const MAX_LOG_SIZE: u64 = 10 * 1024 * 1024;

    /// How long `Start` waits for the service to report Running
    pub const SCM_START_TIMEOUT: Duration = Duration::from_secs(30);

    /// How long `Stop` and `Uninstall` wait for the service to report Stopped
    pub const SCM_STOP_TIMEOUT: Duration = Duration::from_secs(60);

    /// Status poll interval while waiting on the SCM
    pub const SCM_POLL_INTERVAL: Duration = Duration::from_millis(500);

    /// Grace period between the stop signal and forced termination of the child
    pub const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

    /// How long to wait for the output pumps to drain after the child exits
    pub const PUMP_DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

    /// Log follow polling interval
    pub const LOG_FOLLOW_INTERVAL: Duration = Duration::from_millis(500);

    /// Default number of log lines to show
    pub const DEFAULT_LOG_LINES: usize = 50;

    /// Block size used when reading log history backwards
    pub const HISTORY_BLOCK_SIZE: u64 = 8 * 1024;

    /// Largest chunk an output pump holds before writing it without a newline
    pub const PUMP_CHUNK_LIMIT: u64 = 64 * 1024;

    /// Default pre-launch helper timeout in seconds
    pub const DEFAULT_PRE_LAUNCH_TIMEOUT_SECS: u64 = 30;

    /// Service-specific exit code reported when the supervisor ends in Failed
    pub const EXIT_CODE_FAILED: u32 = 1;

    /// Service-specific exit code reported when pre-launch prevents the start
    pub const EXIT_CODE_PRE_LAUNCH_FAILED: u32 = 2;
}
