use thiserror::Error;

/// Main error type for the plancake process manager
#[derive(Debug, Error)]
pub enum PmError {
    // Process-related errors
    #[error("Process not found: {0}")]
    ProcessNotFound(String),

    #[error("Failed to spawn process: {0}")]
    SpawnError(String),

    #[error("Process already exists: {0}")]
    ProcessAlreadyExists(String),

    #[error("Failed to stop process {0}: {1}")]
    StopError(String, String),

    #[error("Process restart limit exceeded for {0}")]
    RestartLimitExceeded(String),

    // Supervisor lifecycle errors
    #[error("Supervisor not running")]
    SupervisorNotRunning,

    #[error("Supervisor already running (PID: {0})")]
    SupervisorAlreadyRunning(u32),

    // State store errors
    #[error("State store error: {0}")]
    StateError(String),

    #[error("Failed to load state: {0}")]
    StateLoadError(String),

    #[error("Failed to save state: {0}")]
    StateSaveError(String),

    #[error("State corruption detected: {0}")]
    StateCorruption(String),

    // Manifest errors
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Invalid configuration file: {0}")]
    InvalidConfig(String),

    #[error("Missing required configuration field: {0}")]
    MissingConfigField(String),

    #[error("Configuration validation failed: {0}")]
    ConfigValidationError(String),

    #[error("Duplicate process name in manifest: {0}")]
    DuplicateProcessName(String),

    #[error("Invalid memory size '{0}': {1}")]
    InvalidMemorySize(String, String),

    #[error("Preflight failed for {0}")]
    PreflightFailed(String),

    // Log-related errors
    #[error("Log error: {0}")]
    LogError(String),

    #[error("Failed to open log file: {0}")]
    LogFileError(String),

    #[error("Log rotation failed: {0}")]
    LogRotationError(String),

    // System errors
    #[error("System error: {0}")]
    SystemError(String),

    #[error("Signal error: {0}")]
    SignalError(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

/// Result type alias for process manager operations
pub type Result<T> = std::result::Result<T, PmError>;
