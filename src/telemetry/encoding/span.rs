//! The export unit: an immutable, timed, attributed span.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::telemetry::events::EventType;
use crate::telemetry::types::{SessionId, SpanId, Timestamp, TraceId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SpanKind {
    Session,
    Agent,
    Llm,
    Tool,
    Action,
    Error,
}

impl SpanKind {
    pub const ALL: [SpanKind; 6] = [
        SpanKind::Session,
        SpanKind::Agent,
        SpanKind::Llm,
        SpanKind::Tool,
        SpanKind::Action,
        SpanKind::Error,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            SpanKind::Session => "session",
            SpanKind::Agent => "agent",
            SpanKind::Llm => "llm",
            SpanKind::Tool => "tool",
            SpanKind::Action => "action",
            SpanKind::Error => "error",
        }
    }

    pub(crate) fn index(self) -> usize {
        self as usize
    }
}

impl From<EventType> for SpanKind {
    fn from(event_type: EventType) -> Self {
        match event_type {
            EventType::Llm => SpanKind::Llm,
            EventType::Tool => SpanKind::Tool,
            EventType::Action => SpanKind::Action,
            EventType::Error => SpanKind::Error,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SpanStatus {
    Ok,
    Error,
}

/// Flat attribute value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttributeValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
}

impl AttributeValue {
    /// Flatten a JSON value: scalars map directly, arrays and objects become
    /// their JSON text, null becomes an empty string.
    pub fn from_json(value: &Value) -> Self {
        match value {
            Value::Bool(b) => AttributeValue::Bool(*b),
            Value::Number(n) => match n.as_i64() {
                Some(i) => AttributeValue::Int(i),
                None => AttributeValue::Float(n.as_f64().unwrap_or(0.0)),
            },
            Value::String(s) => AttributeValue::String(s.clone()),
            Value::Null => AttributeValue::String(String::new()),
            other => AttributeValue::String(other.to_string()),
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            AttributeValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            AttributeValue::Int(i) => Some(*i),
            _ => None,
        }
    }
}

impl From<&str> for AttributeValue {
    fn from(v: &str) -> Self {
        AttributeValue::String(v.to_string())
    }
}

impl From<String> for AttributeValue {
    fn from(v: String) -> Self {
        AttributeValue::String(v)
    }
}

impl From<i64> for AttributeValue {
    fn from(v: i64) -> Self {
        AttributeValue::Int(v)
    }
}

impl From<u64> for AttributeValue {
    fn from(v: u64) -> Self {
        AttributeValue::Int(i64::try_from(v).unwrap_or(i64::MAX))
    }
}

impl From<f64> for AttributeValue {
    fn from(v: f64) -> Self {
        AttributeValue::Float(v)
    }
}

impl From<bool> for AttributeValue {
    fn from(v: bool) -> Self {
        AttributeValue::Bool(v)
    }
}

pub type Attributes = BTreeMap<String, AttributeValue>;

/// A finished (or, for start notifications, started) unit of work in a trace.
///
/// Spans are built by the encoder and completed by the processor; once handed to
/// the export queue nothing mutates them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Span {
    trace_id: TraceId,
    span_id: SpanId,
    #[serde(skip_serializing_if = "Option::is_none")]
    parent_span_id: Option<SpanId>,
    name: String,
    kind: SpanKind,
    start_time: Timestamp,
    #[serde(skip_serializing_if = "Option::is_none")]
    end_time: Option<Timestamp>,
    attributes: Attributes,
    status: SpanStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    status_message: Option<String>,
    session_id: SessionId,
    sequence: u64,
}

impl Span {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        trace_id: TraceId,
        span_id: SpanId,
        parent_span_id: Option<SpanId>,
        name: String,
        kind: SpanKind,
        start_time: Timestamp,
        end_time: Option<Timestamp>,
        session_id: SessionId,
        sequence: u64,
    ) -> Self {
        Self {
            trace_id,
            span_id,
            parent_span_id,
            name,
            kind,
            start_time,
            end_time,
            attributes: Attributes::new(),
            status: SpanStatus::Ok,
            status_message: None,
            session_id,
            sequence,
        }
    }

    pub(crate) fn with_attribute(mut self, key: impl Into<String>, value: impl Into<AttributeValue>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    pub(crate) fn with_attributes(mut self, attributes: Attributes) -> Self {
        self.attributes.extend(attributes);
        self
    }

    /// Insert attributes only where the key is not already present.
    pub(crate) fn with_default_attributes(mut self, attributes: &Attributes) -> Self {
        for (key, value) in attributes {
            self.attributes
                .entry(key.clone())
                .or_insert_with(|| value.clone());
        }
        self
    }

    pub(crate) fn with_status(mut self, status: SpanStatus, message: Option<String>) -> Self {
        self.status = status;
        self.status_message = message;
        self
    }

    pub fn trace_id(&self) -> TraceId {
        self.trace_id
    }

    pub fn span_id(&self) -> SpanId {
        self.span_id
    }

    pub fn parent_span_id(&self) -> Option<SpanId> {
        self.parent_span_id
    }

    pub fn is_root(&self) -> bool {
        self.parent_span_id.is_none()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> SpanKind {
        self.kind
    }

    pub fn start_time(&self) -> Timestamp {
        self.start_time
    }

    pub fn end_time(&self) -> Option<Timestamp> {
        self.end_time
    }

    pub fn attributes(&self) -> &Attributes {
        &self.attributes
    }

    pub fn attribute(&self, key: &str) -> Option<&AttributeValue> {
        self.attributes.get(key)
    }

    pub fn status(&self) -> SpanStatus {
        self.status
    }

    pub fn status_message(&self) -> Option<&str> {
        self.status_message.as_deref()
    }

    pub fn session_id(&self) -> SessionId {
        self.session_id
    }

    /// Session-assigned sequence number; the root span is always 0.
    pub fn sequence(&self) -> u64 {
        self.sequence
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpanPhase {
    /// The event is still running; `end_time` is unset.
    Start,
    /// Final form of the span.
    End,
}

/// Encoder output: a span plus whether it is a start notification or the final form.
#[derive(Debug, Clone, PartialEq)]
pub struct EncodedSpan {
    pub phase: SpanPhase,
    pub span: Span,
}

impl EncodedSpan {
    pub fn start(span: Span) -> Self {
        Self {
            phase: SpanPhase::Start,
            span,
        }
    }

    pub fn end(span: Span) -> Self {
        Self {
            phase: SpanPhase::End,
            span,
        }
    }
}

/// Sibling ordering: start time, then end time, then the session-assigned
/// sequence. Arrival order never participates.
pub fn span_order(a: &Span, b: &Span) -> Ordering {
    a.start_time
        .cmp(&b.start_time)
        .then_with(|| a.end_time.cmp(&b.end_time))
        .then_with(|| a.sequence.cmp(&b.sequence))
}

pub fn sort_siblings(spans: &mut [Span]) {
    spans.sort_by(span_order);
}
