//! Integration tests for the agentspan telemetry pipeline

mod ambiguous_resolution;
mod backpressure;
mod config_integration;
mod export_retry;
mod session_isolation;
mod session_lifecycle;
pub mod test_utils;
