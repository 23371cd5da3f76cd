//! Span processing: per-span enrichment, counters and the bounded export queue.

pub mod processor;
pub mod queue;
pub mod stats;

pub use processor::SpanProcessor;
pub use queue::{EnqueueError, SpanQueue};
pub use stats::{PipelineStats, PipelineStatsSnapshot};
