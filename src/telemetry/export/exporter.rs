//! Exporter capability and the serialized batch it consumes.

use async_trait::async_trait;

use crate::error::ExportError;
use crate::telemetry::encoding::Span;
use crate::telemetry::export::payload;

/// Outcome of a single delivery attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExportResult {
    Success,
    Failure { retryable: bool, reason: String },
}

impl ExportResult {
    pub fn is_success(&self) -> bool {
        matches!(self, ExportResult::Success)
    }

    pub fn failure(err: &ExportError) -> Self {
        ExportResult::Failure {
            retryable: err.is_retryable(),
            reason: err.to_string(),
        }
    }
}

impl From<Result<(), ExportError>> for ExportResult {
    fn from(result: Result<(), ExportError>) -> Self {
        match result {
            Ok(()) => ExportResult::Success,
            Err(err) => ExportResult::failure(&err),
        }
    }
}

/// A batch of finished spans plus its wire form, serialized once and reused
/// for every delivery attempt.
#[derive(Debug, Clone)]
pub struct ExportBatch {
    spans: Vec<Span>,
    payload: Vec<u8>,
}

impl ExportBatch {
    pub fn new(spans: Vec<Span>, project_id: Option<&str>) -> Result<Self, ExportError> {
        let payload = payload::encode(&spans, project_id)?;
        Ok(Self { spans, payload })
    }

    pub fn spans(&self) -> &[Span] {
        &self.spans
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    pub fn len(&self) -> usize {
        self.spans.len()
    }

    pub fn is_empty(&self) -> bool {
        self.spans.is_empty()
    }
}

/// Destination of span batches.
///
/// Called only from the export worker, one batch at a time.
#[async_trait]
pub trait SpanExporter: Send + Sync {
    async fn export(&self, batch: &ExportBatch) -> ExportResult;

    fn name(&self) -> &str;

    async fn shutdown(&self) {}
}
