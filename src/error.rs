//! Error types for the agentspan telemetry pipeline.

use thiserror::Error;

/// Errors raised to callers of the pipeline's public API.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TelemetryError {
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("No active session; start a session or pass an explicit handle")]
    NoSession,

    #[error("Ambiguous session: {active} sessions are active; use Session::patch or an explicit handle")]
    AmbiguousSession { active: usize },

    #[error("Session {0} has ended")]
    SessionEnded(String),

    #[error("Session not found: {0}")]
    SessionNotFound(String),

    #[error("Telemetry pipeline is shut down")]
    PipelineClosed,

    #[error("Failed to start background worker: {0}")]
    WorkerStart(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

/// Span delivery errors. Classified so the batch worker knows whether to retry.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ExportError {
    #[error("Export rejected with status {status}: {message}")]
    Rejected { status: u16, message: String },

    #[error("Export authentication failed ({status}): {message}")]
    Unauthorized { status: u16, message: String },

    #[error("Export failed with server status {status}: {message}")]
    Server { status: u16, message: String },

    #[error("Export timed out: {0}")]
    Timeout(String),

    #[error("Export connection error: {0}")]
    Connection(String),

    #[error("Failed to serialize span batch: {0}")]
    Serialization(String),
}

impl ExportError {
    /// Classify an HTTP status code returned by the backend.
    pub fn from_status(status: u16, message: impl Into<String>) -> Self {
        let message = message.into();
        match status {
            401 | 403 => ExportError::Unauthorized { status, message },
            408 => ExportError::Timeout(message),
            429 | 500..=599 => ExportError::Server { status, message },
            _ => ExportError::Rejected { status, message },
        }
    }

    pub fn is_retryable(&self) -> bool {
        match self {
            ExportError::Server { .. } => true,
            ExportError::Timeout(_) => true,
            ExportError::Connection(_) => true,
            ExportError::Unauthorized { .. } => false,
            ExportError::Rejected { .. } => false,
            ExportError::Serialization(_) => false,
        }
    }
}

impl From<config::ConfigError> for TelemetryError {
    fn from(err: config::ConfigError) -> Self {
        TelemetryError::ConfigError(err.to_string())
    }
}
