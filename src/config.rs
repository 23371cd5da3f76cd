//! Configuration System
//!
//! Injected configuration for the telemetry pipeline: the project credential, the
//! backend endpoint, and the batching/retry knobs of the exporter. Values are layered
//! from defaults, a global file, a project file and `AGENTSPAN_*` environment variables.

use crate::error::TelemetryError;
use crate::logging::LoggingConfig;
use serde::{Deserialize, Serialize};
use std::time::Duration;

mod loader;
mod merge;
mod sources;

pub use loader::ConfigLoader;

pub const DEFAULT_ENDPOINT: &str = "http://localhost:4318";

/// Root configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentspanConfig {
    /// Project credential sent as a bearer token
    #[serde(default)]
    pub api_key: Option<String>,

    /// Project the exported spans belong to
    #[serde(default)]
    pub project_id: Option<String>,

    /// Base URL of the trace collector
    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    /// Tags merged into every session started by a client
    #[serde(default)]
    pub default_tags: Vec<String>,

    /// Batching, retry and queue settings
    #[serde(default)]
    pub exporter: ExporterConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

fn default_endpoint() -> String {
    DEFAULT_ENDPOINT.to_string()
}

impl Default for AgentspanConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            project_id: None,
            endpoint: default_endpoint(),
            default_tags: Vec::new(),
            exporter: ExporterConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

/// Exporter configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExporterConfig {
    /// Spans per batch; reaching it triggers a flush
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Maximum time the oldest buffered span waits before a flush (milliseconds)
    #[serde(default = "default_max_wait_ms")]
    pub max_wait_ms: u64,

    /// Total delivery attempts per batch, including the first
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Backoff before the second attempt; doubled for each further attempt (milliseconds)
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,

    /// Capacity of the export queue between producers and the worker
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    /// Upper bound for a synchronous per-session flush (milliseconds)
    #[serde(default = "default_flush_timeout_ms")]
    pub flush_timeout_ms: u64,

    /// Global budget for the final flush on shutdown or signal (milliseconds)
    #[serde(default = "default_shutdown_timeout_ms")]
    pub shutdown_timeout_ms: u64,

    /// HTTP request timeout for one delivery attempt (milliseconds)
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,

    /// Exit the process after the signal flush completes
    #[serde(default = "default_true")]
    pub exit_on_signal: bool,
}

fn default_batch_size() -> usize {
    256
}

fn default_max_wait_ms() -> u64 {
    5000
}

fn default_max_attempts() -> u32 {
    3
}

fn default_base_delay_ms() -> u64 {
    1000
}

fn default_queue_capacity() -> usize {
    512
}

fn default_flush_timeout_ms() -> u64 {
    5000
}

fn default_shutdown_timeout_ms() -> u64 {
    3000
}

fn default_request_timeout_ms() -> u64 {
    10_000
}

fn default_true() -> bool {
    true
}

impl Default for ExporterConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            max_wait_ms: default_max_wait_ms(),
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
            queue_capacity: default_queue_capacity(),
            flush_timeout_ms: default_flush_timeout_ms(),
            shutdown_timeout_ms: default_shutdown_timeout_ms(),
            request_timeout_ms: default_request_timeout_ms(),
            exit_on_signal: default_true(),
        }
    }
}

impl ExporterConfig {
    pub fn max_wait(&self) -> Duration {
        Duration::from_millis(self.max_wait_ms)
    }

    pub fn base_delay(&self) -> Duration {
        Duration::from_millis(self.base_delay_ms)
    }

    pub fn flush_timeout(&self) -> Duration {
        Duration::from_millis(self.flush_timeout_ms)
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    /// Validate exporter configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.batch_size == 0 {
            return Err("batch_size must be greater than zero".to_string());
        }
        if self.queue_capacity == 0 {
            return Err("queue_capacity must be greater than zero".to_string());
        }
        if self.max_attempts == 0 {
            return Err("max_attempts must be at least 1".to_string());
        }
        if self.max_wait_ms == 0 {
            return Err("max_wait_ms must be greater than zero".to_string());
        }
        Ok(())
    }
}

/// Configuration validation errors
#[derive(Debug, Clone)]
pub enum ValidationError {
    Endpoint(String),
    Exporter(String),
    Credential(String),
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValidationError::Endpoint(msg) => write!(f, "Endpoint: {}", msg),
            ValidationError::Exporter(msg) => write!(f, "Exporter: {}", msg),
            ValidationError::Credential(msg) => write!(f, "Credential: {}", msg),
        }
    }
}

impl std::error::Error for ValidationError {}

impl AgentspanConfig {
    /// Config with a credential and otherwise default settings.
    pub fn with_api_key(api_key: impl Into<String>) -> Self {
        Self {
            api_key: Some(api_key.into()),
            ..Self::default()
        }
    }

    /// Validate everything except the credential, which is only required once a
    /// session starts.
    pub fn validate(&self) -> Result<(), Vec<ValidationError>> {
        let mut errors = Vec::new();

        if !(self.endpoint.starts_with("http://") || self.endpoint.starts_with("https://")) {
            errors.push(ValidationError::Endpoint(format!(
                "'{}' must start with http:// or https://",
                self.endpoint
            )));
        }

        if let Err(e) = self.exporter.validate() {
            errors.push(ValidationError::Exporter(e));
        }

        if let Some(key) = &self.api_key {
            if key.trim().is_empty() {
                errors.push(ValidationError::Credential(
                    "api_key is set but empty".to_string(),
                ));
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// The resolved credential, or `InvalidConfiguration` when none is set.
    pub fn require_api_key(&self) -> Result<&str, TelemetryError> {
        match self.api_key.as_deref() {
            Some(key) if !key.trim().is_empty() => Ok(key),
            _ => Err(TelemetryError::InvalidConfiguration(
                "no API key configured; set AGENTSPAN_API_KEY or api_key in agentspan.toml"
                    .to_string(),
            )),
        }
    }

    pub(crate) fn into_validated(self) -> Result<Self, TelemetryError> {
        self.validate().map_err(|errors| {
            let error_msgs: Vec<String> = errors.iter().map(|e| e.to_string()).collect();
            TelemetryError::InvalidConfiguration(error_msgs.join("; "))
        })?;
        Ok(self)
    }
}
