//! Agentspan: Session Telemetry for AI Agents
//!
//! Records the events an agent workload produces (LLM calls, tool calls,
//! actions, errors), groups them into sessions, encodes each session as one
//! trace of spans and exports those spans in batches from a background worker
//! with bounded retry.

pub mod config;
pub mod error;
pub mod logging;
pub mod telemetry;

pub use config::{AgentspanConfig, ConfigLoader, ExporterConfig};
pub use error::{ExportError, TelemetryError};
pub use telemetry::{
    Client, EndState, Event, EventType, Session, SessionId, SessionRegistry, Span, SpanExporter,
};
