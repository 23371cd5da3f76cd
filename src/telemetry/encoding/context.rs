//! Per-trace span-building state owned by a session.

use std::collections::{HashMap, VecDeque};

use crate::telemetry::encoding::span::{Attributes, SpanKind};
use crate::telemetry::types::{EventId, SessionId, SpanId, Timestamp, TraceId};

/// Completed events remembered per trace. Older entries are evicted first.
pub const CLOSED_EVENT_CAPACITY: usize = 4096;

/// A span whose event has started but not completed.
#[derive(Debug, Clone)]
pub(crate) struct OpenSpan {
    pub span_id: SpanId,
    pub parent_span_id: SpanId,
    pub name: String,
    pub kind: SpanKind,
    pub start_time: Timestamp,
    pub sequence: u64,
    pub attributes: Attributes,
    /// Error attached by an error event while the span was in flight.
    pub error: Option<String>,
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct AgentSpan {
    pub span_id: SpanId,
    pub start_time: Timestamp,
}

/// Completed event ids and their span ids, bounded to the most recent
/// `capacity` entries.
#[derive(Debug)]
pub(crate) struct ClosedEvents {
    spans: HashMap<EventId, SpanId>,
    order: VecDeque<EventId>,
    capacity: usize,
}

impl ClosedEvents {
    pub(crate) fn with_capacity(capacity: usize) -> Self {
        Self {
            spans: HashMap::new(),
            order: VecDeque::new(),
            capacity: capacity.max(1),
        }
    }

    pub(crate) fn contains(&self, id: &EventId) -> bool {
        self.spans.contains_key(id)
    }

    pub(crate) fn get(&self, id: &EventId) -> Option<SpanId> {
        self.spans.get(id).copied()
    }

    pub(crate) fn insert(&mut self, id: EventId, span_id: SpanId) {
        if self.spans.insert(id, span_id).is_some() {
            return;
        }
        self.order.push_back(id);
        while self.order.len() > self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.spans.remove(&oldest);
            }
        }
    }
}

/// Span-building context of one trace.
///
/// Holds the ids every span of the trace shares, the sequence counter used to
/// break timestamp ties, and the bookkeeping for in-flight and completed events.
#[derive(Debug)]
pub struct TraceContext {
    session_id: SessionId,
    trace_id: TraceId,
    root_span_id: SpanId,
    root_start: Timestamp,
    next_sequence: u64,
    earliest_child_start: Option<Timestamp>,
    latest_child_end: Option<Timestamp>,
    pub(crate) agent_spans: HashMap<String, AgentSpan>,
    pub(crate) open: HashMap<EventId, OpenSpan>,
    pub(crate) closed: ClosedEvents,
}

impl TraceContext {
    pub fn new(session_id: SessionId, root_start: Timestamp) -> Self {
        Self::with_closed_capacity(session_id, root_start, CLOSED_EVENT_CAPACITY)
    }

    pub(crate) fn with_closed_capacity(
        session_id: SessionId,
        root_start: Timestamp,
        capacity: usize,
    ) -> Self {
        Self {
            session_id,
            trace_id: TraceId::for_session(&session_id),
            root_span_id: SpanId::session_root(&session_id),
            root_start,
            next_sequence: 1,
            earliest_child_start: None,
            latest_child_end: None,
            agent_spans: HashMap::new(),
            open: HashMap::new(),
            closed: ClosedEvents::with_capacity(capacity),
        }
    }

    pub fn session_id(&self) -> SessionId {
        self.session_id
    }

    pub fn trace_id(&self) -> TraceId {
        self.trace_id
    }

    pub fn root_span_id(&self) -> SpanId {
        self.root_span_id
    }

    /// Root start: the session start, or the earliest child start if an event
    /// claims to have started before the session did.
    pub fn root_start(&self) -> Timestamp {
        match self.earliest_child_start {
            Some(child) if child < self.root_start => child,
            _ => self.root_start,
        }
    }

    /// Latest end time seen on any completed child span.
    pub fn latest_child_end(&self) -> Option<Timestamp> {
        self.latest_child_end
    }

    pub fn open_count(&self) -> usize {
        self.open.len()
    }

    /// Whether `id` is in flight or among the remembered completed events.
    pub fn knows_event(&self, id: &EventId) -> bool {
        self.open.contains_key(id) || self.closed.contains(id)
    }

    pub fn has_agent_span(&self, agent_id: &str) -> bool {
        self.agent_spans.contains_key(agent_id)
    }

    pub(crate) fn next_sequence(&mut self) -> u64 {
        let seq = self.next_sequence;
        self.next_sequence += 1;
        seq
    }

    pub(crate) fn observe_start(&mut self, start: Timestamp) {
        self.earliest_child_start = Some(match self.earliest_child_start {
            Some(existing) if existing <= start => existing,
            _ => start,
        });
    }

    pub(crate) fn observe_end(&mut self, end: Timestamp) {
        self.latest_child_end = Some(match self.latest_child_end {
            Some(existing) if existing >= end => existing,
            _ => end,
        });
    }

    /// Parent for a span of `agent_id` starting at `start`: the agent's span when
    /// it exists and started no later than `start`, otherwise the root.
    pub(crate) fn parent_for(&self, agent_id: Option<&str>, start: Timestamp) -> SpanId {
        agent_id
            .and_then(|id| self.agent_spans.get(id))
            .filter(|agent| agent.start_time <= start)
            .map(|agent| agent.span_id)
            .unwrap_or(self.root_span_id)
    }
}
