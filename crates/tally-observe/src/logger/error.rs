use thiserror::Error;

/// Errors from [`logger_init`](crate::logger_init) and logger configuration parsing.
#[derive(Debug, Error)]
pub enum LoggerError {
    #[error("unknown log format {0:?} (expected text, json or journald)")]
    InvalidFormat(String),
    #[error("journald output needs linux and the `journald` feature")]
    JournaldNotSupported,
    #[error("a global tracing subscriber is already installed")]
    AlreadyInitialized,
    #[error("logger installation failed: {0}")]
    InitializationFailed(String),
    #[error("invalid log filter {directive:?}: {reason}")]
    InvalidLogLevel { directive: String, reason: String },
}
