use std::fmt;

/// Custom error type for servy operations
#[derive(Debug)]
pub enum ServyError {
    /// I/O operation failed
    Io(std::io::Error),
    /// JSON serialization/deserialization failed
    Json(serde_json::Error),
    /// Configuration rejected before any native call
    Config(String),
    /// Wrapper command line does not follow the positional contract
    WrapperArgs(String),
    /// A native service-control call failed
    Native {
        operation: String,
        code: u32,
        message: String,
    },
    /// Service not registered with the service control manager
    ServiceNotFound(String),
    /// Operation cancelled by the caller
    Cancelled,
    /// Bounded wait elapsed
    Timeout(String),
    /// Process start error
    ProcessStart(String, String), // binary, error message
    /// Process stop error
    ProcessStop(String),
    /// Pre/post-launch helper failed
    Hook(String),
    /// WMI inventory query failed
    Inventory(String),
    /// Operation not available on this platform or host
    Unsupported(String),
    /// Log operation failed
    LogError(String),
}

/// The SCM refused to create a service because the name is taken.
pub const ERROR_SERVICE_EXISTS: u32 = 1073;
/// The named service is not installed.
pub const ERROR_SERVICE_DOES_NOT_EXIST: u32 = 1060;
/// A stop was sent to a service that is not running.
pub const ERROR_SERVICE_NOT_ACTIVE: u32 = 1062;

impl ServyError {
    /// Wrap a failing native call with its OS error code and the system message for it
    pub fn native(operation: impl Into<String>, code: u32) -> Self {
        let message = std::io::Error::from_raw_os_error(code as i32).to_string();
        ServyError::Native {
            operation: operation.into(),
            code,
            message,
        }
    }

    /// OS error code carried by a native failure
    pub fn native_code(&self) -> Option<u32> {
        match self {
            ServyError::Native { code, .. } => Some(*code),
            _ => None,
        }
    }

    pub fn is_service_exists(&self) -> bool {
        self.native_code() == Some(ERROR_SERVICE_EXISTS)
    }

    pub fn is_service_missing(&self) -> bool {
        matches!(self, ServyError::ServiceNotFound(_))
            || self.native_code() == Some(ERROR_SERVICE_DOES_NOT_EXIST)
    }

    pub fn is_service_not_active(&self) -> bool {
        self.native_code() == Some(ERROR_SERVICE_NOT_ACTIVE)
    }
}

impl fmt::Display for ServyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServyError::Io(err) => write!(f, "I/O error: {}", err),
            ServyError::Json(err) => write!(f, "JSON error: {}", err),
            ServyError::Config(msg) => write!(f, "Configuration error: {}", msg),
            ServyError::WrapperArgs(msg) => write!(f, "Invalid wrapper arguments: {}", msg),
            ServyError::Native {
                operation,
                code,
                message,
            } => write!(f, "{} failed (OS error {}): {}", operation, code, message),
            ServyError::ServiceNotFound(name) => write!(f, "Service '{}' not found", name),
            ServyError::Cancelled => write!(f, "Operation cancelled"),
            ServyError::Timeout(msg) => write!(f, "Timed out: {}", msg),
            ServyError::ProcessStart(binary, msg) => {
                write!(f, "Failed to start process '{}': {}", binary, msg)
            }
            ServyError::ProcessStop(msg) => write!(f, "Failed to stop process: {}", msg),
            ServyError::Hook(msg) => write!(f, "Helper command failed: {}", msg),
            ServyError::Inventory(msg) => write!(f, "Inventory query failed: {}", msg),
            ServyError::Unsupported(msg) => write!(f, "Unsupported: {}", msg),
            ServyError::LogError(msg) => write!(f, "Log error: {}", msg),
        }
    }
}

impl std::error::Error for ServyError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ServyError::Io(err) => Some(err),
            ServyError::Json(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for ServyError {
    fn from(err: std::io::Error) -> Self {
        ServyError::Io(err)
    }
}

impl From<serde_json::Error> for ServyError {
    fn from(err: serde_json::Error) -> Self {
        ServyError::Json(err)
    }
}

/// Result type alias for servy operations
pub type Result<T> = std::result::Result<T, ServyError>;
