//! Span encoding: the span model and the pure event -> span mapping.

pub mod context;
pub mod encoder;
pub mod span;

pub use context::TraceContext;
pub use encoder::{keys, SpanEncoder, ORPHANED_MESSAGE};
pub use span::{
    sort_siblings, span_order, AttributeValue, Attributes, EncodedSpan, Span, SpanKind, SpanPhase,
    SpanStatus,
};
