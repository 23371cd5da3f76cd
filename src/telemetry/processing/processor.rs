//! Span processor: enrichment, counting and non-blocking hand-off to the export queue.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use crate::config::AgentspanConfig;
use crate::error::TelemetryError;
use crate::telemetry::encoding::{Attributes, EncodedSpan, SpanPhase};
use crate::telemetry::export::{BatchConfig, BatchExporter, SpanExporter};
use crate::telemetry::processing::queue::{EnqueueError, SpanQueue};
use crate::telemetry::processing::stats::{PipelineStats, PipelineStatsSnapshot};
use crate::telemetry::types::SessionId;

const DROP_WARN_INTERVAL: u64 = 1000;

pub struct SpanProcessor {
    queue: SpanQueue,
    exporter: BatchExporter,
    stats: Arc<PipelineStats>,
    flush_timeout: Duration,
}

impl SpanProcessor {
    /// Create the queue and start the export worker delivering to `exporter`.
    pub fn new(
        exporter: Arc<dyn SpanExporter>,
        config: &AgentspanConfig,
    ) -> Result<Self, TelemetryError> {
        let stats = Arc::new(PipelineStats::new());
        let (queue, receiver) = SpanQueue::bounded(config.exporter.queue_capacity);
        let exporter = BatchExporter::spawn(
            receiver,
            exporter,
            BatchConfig::from_config(config),
            stats.clone(),
        )?;
        Ok(Self {
            queue,
            exporter,
            stats,
            flush_timeout: config.exporter.flush_timeout(),
        })
    }

    /// Hand encoder output to the export queue. Never blocks.
    ///
    /// Start notifications are counted but not exported; the final form of the
    /// same span follows. Session-scoped attributes fill in keys the span does
    /// not set itself.
    pub fn process(&self, spans: Vec<EncodedSpan>, session_attributes: &Attributes) {
        for encoded in spans {
            match encoded.phase {
                SpanPhase::Start => {
                    self.stats.record_started();
                    debug!(
                        span_id = %encoded.span.span_id(),
                        name = encoded.span.name(),
                        "Span started"
                    );
                }
                SpanPhase::End => {
                    let span = encoded.span.with_default_attributes(session_attributes);
                    self.stats.record_received(span.kind());
                    match self.queue.try_enqueue(span) {
                        Ok(()) => self.stats.record_enqueued(),
                        Err(reason) => self.record_drop(reason),
                    }
                }
            }
        }
    }

    fn record_drop(&self, reason: EnqueueError) {
        let dropped = self.stats.record_dropped();
        if dropped == 1 || dropped % DROP_WARN_INTERVAL == 0 {
            warn!(
                dropped_total = dropped,
                capacity = self.queue.capacity(),
                reason = ?reason,
                "Export queue rejected span; dropping"
            );
        }
    }

    /// Deliver everything queued so far, waiting up to the configured flush timeout.
    pub fn flush(&self, session_id: SessionId) -> bool {
        self.flush_within(Some(session_id), self.flush_timeout)
    }

    pub fn flush_within(&self, session_id: Option<SessionId>, timeout: Duration) -> bool {
        self.exporter.flush(session_id, timeout)
    }

    /// Final drain; stops the worker.
    pub fn shutdown(&self, timeout: Duration) -> bool {
        self.exporter.shutdown(timeout)
    }

    pub fn flush_timeout(&self) -> Duration {
        self.flush_timeout
    }

    pub fn stats(&self) -> PipelineStatsSnapshot {
        self.stats.snapshot()
    }

    pub fn queue_len(&self) -> usize {
        self.queue.len()
    }
}
