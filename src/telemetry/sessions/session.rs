//! A session: one logical unit of work, exported as one trace.

use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use serde::Serialize;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::TelemetryError;
use crate::telemetry::encoding::{
    keys, AttributeValue, Attributes, EncodedSpan, Span, SpanEncoder, SpanStatus, TraceContext,
};
use crate::telemetry::events::{Event, EventType};
use crate::telemetry::processing::SpanProcessor;
use crate::telemetry::sessions::policy::{EndState, SessionLifecycle};
use crate::telemetry::sessions::registry::SessionRegistry;
use crate::telemetry::sessions::scope;
use crate::telemetry::types::{now, SessionId, SpanId, Timestamp, TraceId};

pub const DEFAULT_SESSION_NAME: &str = "session";

/// Creation parameters for a session.
#[derive(Debug, Clone, Default)]
pub struct SessionOptions {
    pub name: Option<String>,
    pub tags: Vec<String>,
    pub project_id: Option<String>,
    /// Attach to an existing session id instead of generating one. The handle
    /// shares the trace and root span ids and never emits the root span.
    pub inherited_id: Option<SessionId>,
}

/// Per-session statistics.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionAnalytics {
    pub session_id: SessionId,
    pub lifecycle: SessionLifecycle,
    pub end_state: EndState,
    pub event_counts: BTreeMap<String, u64>,
    pub total_events: u64,
    pub agent_count: usize,
    pub duration_ms: u64,
}

/// Handle to a session. Cheap to clone; all clones share the same state.
#[derive(Clone)]
pub struct Session {
    inner: Arc<SessionInner>,
}

struct SessionInner {
    id: SessionId,
    name: String,
    project_id: Option<String>,
    inherited: bool,
    default_agent: String,
    processor: Arc<SpanProcessor>,
    registry: Weak<SessionRegistry>,
    state: Mutex<SessionState>,
}

struct SessionState {
    lifecycle: SessionLifecycle,
    start_time: Timestamp,
    end_time: Option<Timestamp>,
    end_state: EndState,
    end_state_reason: Option<String>,
    tags: Vec<String>,
    agents: BTreeMap<String, String>,
    event_counts: BTreeMap<EventType, u64>,
    ctx: TraceContext,
}

impl Session {
    /// A `Pending` session. The client registers it, then calls [`Session::activate`].
    pub(crate) fn new(
        options: SessionOptions,
        processor: Arc<SpanProcessor>,
        registry: &Arc<SessionRegistry>,
    ) -> Self {
        let inherited = options.inherited_id.is_some();
        let id = options.inherited_id.unwrap_or_default();
        let start_time = now();
        let state = SessionState {
            lifecycle: SessionLifecycle::Pending,
            start_time,
            end_time: None,
            end_state: EndState::Indeterminate,
            end_state_reason: None,
            tags: dedup_tags(options.tags),
            agents: BTreeMap::new(),
            event_counts: BTreeMap::new(),
            ctx: TraceContext::new(id, start_time),
        };
        Self {
            inner: Arc::new(SessionInner {
                id,
                name: options
                    .name
                    .unwrap_or_else(|| DEFAULT_SESSION_NAME.to_string()),
                project_id: options.project_id,
                inherited,
                default_agent: format!("default-agent-{}", id),
                processor,
                registry: Arc::downgrade(registry),
                state: Mutex::new(state),
            }),
        }
    }

    pub(crate) fn activate(&self) {
        let mut state = self.inner.state.lock();
        if state.lifecycle == SessionLifecycle::Pending {
            state.lifecycle = SessionLifecycle::Active;
            debug!(session_id = %self.inner.id, inherited = self.inner.inherited, "Session started");
        }
    }

    /// Record an event. Failures are logged, never returned.
    pub fn record(&self, event: Event) {
        if let Err(err) = self.try_record(event) {
            warn!(session_id = %self.inner.id, error = %err, "Dropping event");
        }
    }

    /// Record an event, reporting why it was not accepted.
    ///
    /// The event is stamped with this session and the default agent when it has
    /// none. Each event id counts once; recording the completed form of an
    /// already-recorded open event updates its span.
    pub fn try_record(&self, event: Event) -> Result<(), TelemetryError> {
        let mut state = self.inner.state.lock();
        if !state.lifecycle.accepts_events() {
            return Err(TelemetryError::SessionEnded(self.inner.id.to_string()));
        }

        let event = event.stamped(self.inner.id, &self.inner.default_agent);
        if !state.ctx.knows_event(&event.id()) {
            *state.event_counts.entry(event.event_type()).or_insert(0) += 1;
        }
        let spans = SpanEncoder::encode(&event, &mut state.ctx);
        let attributes = self.session_attributes(&state);
        self.inner.processor.process(spans, &attributes);
        Ok(())
    }

    /// Register a named agent and emit its span. Events carrying the returned id
    /// are parented to that span.
    pub fn create_agent(&self, name: impl Into<String>) -> Result<String, TelemetryError> {
        let name = name.into();
        let mut state = self.inner.state.lock();
        if !state.lifecycle.accepts_events() {
            return Err(TelemetryError::SessionEnded(self.inner.id.to_string()));
        }
        let agent_id = Uuid::new_v4().to_string();
        state.agents.insert(agent_id.clone(), name.clone());
        let span = SpanEncoder::agent_span(&mut state.ctx, &agent_id, &name, now());
        let attributes = self.session_attributes(&state);
        self.inner.processor.process(vec![span], &attributes);
        Ok(agent_id)
    }

    pub fn add_tags<I, S>(&self, tags: I) -> Result<(), TelemetryError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut state = self.inner.state.lock();
        if state.lifecycle.is_terminal() {
            return Err(TelemetryError::SessionEnded(self.inner.id.to_string()));
        }
        let mut merged = std::mem::take(&mut state.tags);
        merged.extend(tags.into_iter().map(Into::into));
        state.tags = dedup_tags(merged);
        Ok(())
    }

    pub fn set_tags<I, S>(&self, tags: I) -> Result<(), TelemetryError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut state = self.inner.state.lock();
        if state.lifecycle.is_terminal() {
            return Err(TelemetryError::SessionEnded(self.inner.id.to_string()));
        }
        state.tags = dedup_tags(tags.into_iter().map(Into::into).collect());
        Ok(())
    }

    /// End the session and flush its spans, waiting up to the configured flush timeout.
    ///
    /// Idempotent: only the first call has any effect.
    pub fn end(&self, end_state: EndState, reason: Option<&str>) {
        self.end_within(end_state, reason, self.inner.processor.flush_timeout());
    }

    /// [`Session::end`] with an explicit flush budget. Returns whether this call
    /// ended the session and its spans were delivered in time.
    pub fn end_within(&self, end_state: EndState, reason: Option<&str>, timeout: Duration) -> bool {
        {
            let mut state = self.inner.state.lock();
            if state.lifecycle.is_terminal() {
                return false;
            }
            state.lifecycle = SessionLifecycle::Ending;
            let end_time = now();
            state.end_time = Some(end_time);
            state.end_state = end_state;
            state.end_state_reason = reason.map(str::to_string);

            let mut spans = SpanEncoder::close_orphans(&mut state.ctx, end_time);
            if !spans.is_empty() {
                debug!(
                    session_id = %self.inner.id,
                    orphans = spans.len(),
                    "Closed in-flight events at session end"
                );
            }
            if !self.inner.inherited {
                spans.push(EncodedSpan::end(self.root_span(&state, end_time)));
            }
            let attributes = self.session_attributes(&state);
            self.inner.processor.process(spans, &attributes);
        }

        let delivered = self.inner.processor.flush_within(Some(self.inner.id), timeout);
        if !delivered {
            warn!(
                session_id = %self.inner.id,
                ?timeout,
                "Session spans were not delivered before the flush timeout"
            );
        }

        self.inner.state.lock().lifecycle = SessionLifecycle::Ended;
        if let Some(registry) = self.inner.registry.upgrade() {
            registry.unregister(self.inner.id);
        }
        debug!(session_id = %self.inner.id, end_state = %end_state, "Session ended");
        delivered
    }

    fn root_span(&self, state: &SessionState, end_time: Timestamp) -> Span {
        let mut attributes = Attributes::new();
        attributes.insert(keys::SESSION_NAME.to_string(), self.inner.name.as_str().into());
        attributes.insert(keys::END_STATE.to_string(), state.end_state.as_str().into());
        if let Some(reason) = &state.end_state_reason {
            attributes.insert(keys::END_STATE_REASON.to_string(), reason.as_str().into());
        }
        for (event_type, count) in &state.event_counts {
            attributes.insert(
                format!("{}{}", keys::EVENT_COUNT_PREFIX, event_type.as_str()),
                (*count).into(),
            );
        }

        let (status, message) = match state.end_state {
            EndState::Fail => (
                SpanStatus::Error,
                Some(
                    state
                        .end_state_reason
                        .clone()
                        .unwrap_or_else(|| "session failed".to_string()),
                ),
            ),
            _ => (SpanStatus::Ok, None),
        };
        SpanEncoder::root_span(
            &state.ctx,
            &self.inner.name,
            end_time,
            status,
            message,
            attributes,
        )
    }

    /// Attributes every span of this session carries unless it sets them itself.
    fn session_attributes(&self, state: &SessionState) -> Attributes {
        let mut attributes = Attributes::new();
        attributes.insert(
            keys::SESSION_ID.to_string(),
            AttributeValue::String(self.inner.id.to_string()),
        );
        if let Some(project_id) = &self.inner.project_id {
            attributes.insert(keys::PROJECT_ID.to_string(), project_id.as_str().into());
        }
        if !state.tags.is_empty() {
            attributes.insert(keys::SESSION_TAGS.to_string(), state.tags.join(",").into());
        }
        attributes
    }

    /// Wrap `f` so everything it records without a handle goes to this session.
    pub fn patch<F, R>(&self, f: F) -> impl FnOnce() -> R
    where
        F: FnOnce() -> R,
    {
        let session = self.clone();
        move || scope::in_scope(&session, f)
    }

    /// Reusable form of [`Session::patch`]: every call of the returned
    /// callable runs with this session as the current one.
    pub fn patch_fn<F, R>(&self, f: F) -> impl Fn() -> R
    where
        F: Fn() -> R,
    {
        let session = self.clone();
        move || scope::in_scope(&session, &f)
    }

    /// Run `f` now with this session as the current one.
    pub fn in_scope<R>(&self, f: impl FnOnce() -> R) -> R {
        scope::in_scope(self, f)
    }

    /// Run `future` with this session as the current one of the task.
    pub async fn scope<F: std::future::Future>(&self, future: F) -> F::Output {
        scope::scope_async(self.clone(), future).await
    }

    pub fn analytics(&self) -> SessionAnalytics {
        let state = self.inner.state.lock();
        let end = state.end_time.unwrap_or_else(now);
        let duration_ms = (end - state.start_time).num_milliseconds().max(0) as u64;
        SessionAnalytics {
            session_id: self.inner.id,
            lifecycle: state.lifecycle,
            end_state: state.end_state,
            event_counts: EventType::ALL
                .iter()
                .map(|t| {
                    (
                        t.as_str().to_string(),
                        state.event_counts.get(t).copied().unwrap_or(0),
                    )
                })
                .collect(),
            total_events: state.event_counts.values().sum(),
            agent_count: state.agents.len(),
            duration_ms,
        }
    }

    pub fn id(&self) -> SessionId {
        self.inner.id
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn trace_id(&self) -> TraceId {
        TraceId::for_session(&self.inner.id)
    }

    pub fn root_span_id(&self) -> SpanId {
        SpanId::session_root(&self.inner.id)
    }

    pub fn project_id(&self) -> Option<&str> {
        self.inner.project_id.as_deref()
    }

    pub fn is_inherited(&self) -> bool {
        self.inner.inherited
    }

    pub fn default_agent_id(&self) -> &str {
        &self.inner.default_agent
    }

    pub fn lifecycle(&self) -> SessionLifecycle {
        self.inner.state.lock().lifecycle
    }

    pub fn is_active(&self) -> bool {
        self.lifecycle() == SessionLifecycle::Active
    }

    pub fn is_ended(&self) -> bool {
        self.lifecycle() == SessionLifecycle::Ended
    }

    pub fn start_time(&self) -> Timestamp {
        self.inner.state.lock().start_time
    }

    pub fn end_time(&self) -> Option<Timestamp> {
        self.inner.state.lock().end_time
    }

    pub fn end_state(&self) -> EndState {
        self.inner.state.lock().end_state
    }

    pub fn end_state_reason(&self) -> Option<String> {
        self.inner.state.lock().end_state_reason.clone()
    }

    pub fn tags(&self) -> Vec<String> {
        self.inner.state.lock().tags.clone()
    }

    /// Registered agents: id -> display name.
    pub fn agents(&self) -> BTreeMap<String, String> {
        self.inner.state.lock().agents.clone()
    }

    pub fn event_count(&self, event_type: EventType) -> u64 {
        self.inner
            .state
            .lock()
            .event_counts
            .get(&event_type)
            .copied()
            .unwrap_or(0)
    }

    pub fn ptr_eq(&self, other: &Session) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.inner.id)
            .field("name", &self.inner.name)
            .field("inherited", &self.inner.inherited)
            .finish()
    }
}

/// Keep first occurrence order, drop blanks and repeats.
fn dedup_tags(tags: Vec<String>) -> Vec<String> {
    let mut seen = HashSet::new();
    tags.into_iter()
        .filter(|tag| !tag.trim().is_empty())
        .filter(|tag| seen.insert(tag.clone()))
        .collect()
}
