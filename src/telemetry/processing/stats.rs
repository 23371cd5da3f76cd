//! Pipeline counters.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

use crate::telemetry::encoding::SpanKind;

/// Monotonic counters shared by the processor and the export worker.
#[derive(Debug, Default)]
pub struct PipelineStats {
    spans_received: AtomicU64,
    spans_started: AtomicU64,
    spans_enqueued: AtomicU64,
    spans_dropped: AtomicU64,
    spans_exported: AtomicU64,
    spans_export_failed: AtomicU64,
    batches_exported: AtomicU64,
    batches_dropped: AtomicU64,
    retries: AtomicU64,
    per_kind: [AtomicU64; 6],
}

/// Point-in-time copy of [`PipelineStats`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PipelineStatsSnapshot {
    pub spans_received: u64,
    pub spans_started: u64,
    pub spans_enqueued: u64,
    pub spans_dropped: u64,
    pub spans_exported: u64,
    pub spans_export_failed: u64,
    pub batches_exported: u64,
    pub batches_dropped: u64,
    pub retries: u64,
    pub per_kind: BTreeMap<String, u64>,
}

impl PipelineStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_received(&self, kind: SpanKind) {
        self.spans_received.fetch_add(1, Ordering::Relaxed);
        self.per_kind[kind.index()].fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_started(&self) {
        self.spans_started.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_enqueued(&self) {
        self.spans_enqueued.fetch_add(1, Ordering::Relaxed);
    }

    /// Returns the total number of dropped spans including this one.
    pub(crate) fn record_dropped(&self) -> u64 {
        self.spans_dropped.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub(crate) fn record_batch_exported(&self, spans: usize) {
        self.batches_exported.fetch_add(1, Ordering::Relaxed);
        self.spans_exported.fetch_add(spans as u64, Ordering::Relaxed);
    }

    pub(crate) fn record_batch_dropped(&self, spans: usize) {
        self.batches_dropped.fetch_add(1, Ordering::Relaxed);
        self.spans_export_failed.fetch_add(spans as u64, Ordering::Relaxed);
    }

    pub(crate) fn record_retry(&self) {
        self.retries.fetch_add(1, Ordering::Relaxed);
    }

    pub fn spans_dropped(&self) -> u64 {
        self.spans_dropped.load(Ordering::Relaxed)
    }

    pub fn snapshot(&self) -> PipelineStatsSnapshot {
        PipelineStatsSnapshot {
            spans_received: self.spans_received.load(Ordering::Relaxed),
            spans_started: self.spans_started.load(Ordering::Relaxed),
            spans_enqueued: self.spans_enqueued.load(Ordering::Relaxed),
            spans_dropped: self.spans_dropped.load(Ordering::Relaxed),
            spans_exported: self.spans_exported.load(Ordering::Relaxed),
            spans_export_failed: self.spans_export_failed.load(Ordering::Relaxed),
            batches_exported: self.batches_exported.load(Ordering::Relaxed),
            batches_dropped: self.batches_dropped.load(Ordering::Relaxed),
            retries: self.retries.load(Ordering::Relaxed),
            per_kind: SpanKind::ALL
                .iter()
                .map(|kind| {
                    (
                        kind.as_str().to_string(),
                        self.per_kind[kind.index()].load(Ordering::Relaxed),
                    )
                })
                .collect(),
        }
    }
}
