//! Telemetry: events, span encoding, sessions, processing and export.

pub mod encoding;
pub mod events;
pub mod export;
pub mod instrument;
pub mod processing;
pub mod sessions;
pub mod shutdown;
pub mod types;

pub use encoding::{
    AttributeValue, Attributes, EncodedSpan, Span, SpanEncoder, SpanKind, SpanPhase, SpanStatus,
    TraceContext,
};
pub use events::{ActionData, ErrorData, Event, EventKind, EventType, LlmCall, ToolCall};
pub use export::{
    ExportBatch, ExportResult, HttpSpanExporter, InMemorySpanExporter, RetryPolicy, SpanExporter,
};
pub use instrument::{CallAdapter, InstrumentError};
pub use processing::{PipelineStats, PipelineStatsSnapshot, SpanProcessor};
pub use sessions::{Client, EndState, Session, SessionLifecycle, SessionRegistry};
pub use types::{EventId, SessionId, SpanId, Timestamp, TraceId};
