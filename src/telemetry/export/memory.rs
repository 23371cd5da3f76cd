//! In-process exporter that keeps every delivered span.

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::telemetry::encoding::Span;
use crate::telemetry::export::exporter::{ExportBatch, ExportResult, SpanExporter};
use crate::telemetry::types::SessionId;

#[derive(Debug, Default)]
pub struct InMemorySpanExporter {
    spans: Mutex<Vec<Span>>,
    batch_sizes: Mutex<Vec<usize>>,
}

impl InMemorySpanExporter {
    pub fn new() -> Self {
        Self::default()
    }

    /// All spans received so far, in delivery order.
    pub fn spans(&self) -> Vec<Span> {
        self.spans.lock().clone()
    }

    pub fn spans_for_session(&self, session_id: SessionId) -> Vec<Span> {
        self.spans
            .lock()
            .iter()
            .filter(|span| span.session_id() == session_id)
            .cloned()
            .collect()
    }

    pub fn batch_sizes(&self) -> Vec<usize> {
        self.batch_sizes.lock().clone()
    }

    pub fn reset(&self) {
        self.spans.lock().clear();
        self.batch_sizes.lock().clear();
    }
}

#[async_trait]
impl SpanExporter for InMemorySpanExporter {
    async fn export(&self, batch: &ExportBatch) -> ExportResult {
        self.batch_sizes.lock().push(batch.len());
        self.spans.lock().extend(batch.spans().iter().cloned());
        ExportResult::Success
    }

    fn name(&self) -> &str {
        "in-memory"
    }
}
