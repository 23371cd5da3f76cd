//! Span export: batching worker, retry policy, wire payload and exporters.

pub mod batch;
pub mod exporter;
pub mod http;
pub mod memory;
pub mod payload;
pub mod retry;

pub use batch::{BatchConfig, BatchExporter};
pub use exporter::{ExportBatch, ExportResult, SpanExporter};
pub use http::HttpSpanExporter;
pub use memory::InMemorySpanExporter;
pub use retry::RetryPolicy;
