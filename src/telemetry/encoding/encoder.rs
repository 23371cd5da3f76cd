//! Pure event -> span mapping.
//!
//! No I/O and no state of its own: everything it remembers lives in the
//! [`TraceContext`] the owning session passes in.

use tracing::debug;

use crate::telemetry::encoding::context::{AgentSpan, OpenSpan, TraceContext};
use crate::telemetry::encoding::span::{
    AttributeValue, Attributes, EncodedSpan, Span, SpanKind, SpanStatus,
};
use crate::telemetry::events::{Event, EventKind};
use crate::telemetry::types::{SpanId, Timestamp};

/// Attribute keys written by the encoder and the processor.
pub mod keys {
    pub const SESSION_ID: &str = "agentspan.session.id";
    pub const SESSION_NAME: &str = "agentspan.session.name";
    pub const SESSION_TAGS: &str = "agentspan.session.tags";
    pub const END_STATE: &str = "agentspan.session.end_state";
    pub const END_STATE_REASON: &str = "agentspan.session.end_state_reason";
    pub const EVENT_COUNT_PREFIX: &str = "agentspan.session.event_counts.";
    pub const PROJECT_ID: &str = "agentspan.project.id";
    pub const SPAN_KIND: &str = "agentspan.span.kind";
    pub const SPAN_SEQUENCE: &str = "agentspan.span.sequence";
    pub const EVENT_ID: &str = "agentspan.event.id";
    pub const EVENT_TYPE: &str = "agentspan.event.type";
    pub const AGENT_ID: &str = "agentspan.agent.id";
    pub const AGENT_NAME: &str = "agentspan.agent.name";
    pub const PARAMS_PREFIX: &str = "agentspan.params.";
    pub const RETURNS: &str = "agentspan.returns";
    pub const CLAMPED: &str = "agentspan.clamped";
    pub const ORPHANED: &str = "agentspan.orphaned";
    pub const LLM_MODEL: &str = "gen_ai.request.model";
    pub const LLM_PROMPT: &str = "gen_ai.prompt";
    pub const LLM_COMPLETION: &str = "gen_ai.completion";
    pub const LLM_PROMPT_TOKENS: &str = "gen_ai.usage.prompt_tokens";
    pub const LLM_COMPLETION_TOKENS: &str = "gen_ai.usage.completion_tokens";
    pub const LLM_THREAD_ID: &str = "gen_ai.thread.id";
    pub const TOOL_NAME: &str = "tool.name";
    pub const TOOL_LOGS: &str = "tool.logs";
    pub const ACTION_TYPE: &str = "action.type";
    pub const ACTION_LOGS: &str = "action.logs";
    pub const ERROR_TYPE: &str = "error.type";
    pub const ERROR_CODE: &str = "error.code";
    pub const ERROR_DETAILS: &str = "error.details";
    pub const ERROR_TRIGGER: &str = "error.trigger_event";
}

pub const ORPHANED_MESSAGE: &str = "orphaned at session end";

pub struct SpanEncoder;

impl SpanEncoder {
    /// Encode one event into zero or more spans.
    ///
    /// - a new closed event yields one `End` span;
    /// - a new open event yields a `Start` notification;
    /// - a completion of an open event yields the `End` form with the same span id;
    /// - an error referencing an in-flight event marks that event's span instead
    ///   of producing its own;
    /// - events already completed are ignored.
    pub fn encode(event: &Event, ctx: &mut TraceContext) -> Vec<EncodedSpan> {
        let event_id = event.id();

        if ctx.closed.contains(&event_id) {
            debug!(event_id = %event_id, "Ignoring event that was already recorded");
            return Vec::new();
        }

        if ctx.open.contains_key(&event_id) {
            if event.is_open() {
                debug!(event_id = %event_id, "Ignoring repeated start of in-flight event");
                return Vec::new();
            }
            return Self::complete(event, ctx).into_iter().collect();
        }

        if let EventKind::Error(data) = event.kind() {
            if let Some(trigger) = data.trigger_event {
                if let Some(open) = ctx.open.get_mut(&trigger) {
                    open.attributes.extend(event_attributes(event));
                    open.error = Some(error_message(event));
                    ctx.closed.insert(event_id, open.span_id);
                    return Vec::new();
                }
            }
        }

        let start = event.init_timestamp();
        let sequence = ctx.next_sequence();
        let span_id = SpanId::random();
        let parent = match event.kind() {
            EventKind::Error(data) => data
                .trigger_event
                .and_then(|trigger| ctx.closed.get(&trigger))
                .unwrap_or_else(|| ctx.parent_for(event.agent_id(), start)),
            _ => ctx.parent_for(event.agent_id(), start),
        };
        ctx.observe_start(start);

        if event.is_open() {
            let open = OpenSpan {
                span_id,
                parent_span_id: parent,
                name: span_name(event),
                kind: SpanKind::from(event.event_type()),
                start_time: start,
                sequence,
                attributes: event_attributes(event),
                error: None,
            };
            let span = build_span(ctx, &open, None);
            ctx.open.insert(event_id, open);
            return vec![EncodedSpan::start(span)];
        }

        let open = OpenSpan {
            span_id,
            parent_span_id: parent,
            name: span_name(event),
            kind: SpanKind::from(event.event_type()),
            start_time: start,
            sequence,
            attributes: event_attributes(event),
            error: match event.kind() {
                EventKind::Error(_) => Some(error_message(event)),
                _ => None,
            },
        };
        let span = Self::finish(ctx, open, event.end_timestamp().unwrap_or(start));
        ctx.closed.insert(event_id, span.span_id());
        vec![EncodedSpan::end(span)]
    }

    /// Register an agent and emit its agent-level span (parented to the root).
    pub fn agent_span(
        ctx: &mut TraceContext,
        agent_id: &str,
        agent_name: &str,
        at: Timestamp,
    ) -> EncodedSpan {
        let sequence = ctx.next_sequence();
        let span_id = SpanId::random();
        ctx.agent_spans.insert(
            agent_id.to_string(),
            AgentSpan {
                span_id,
                start_time: at,
            },
        );
        ctx.observe_start(at);
        ctx.observe_end(at);
        let span = Span::new(
            ctx.trace_id(),
            span_id,
            Some(ctx.root_span_id()),
            format!("agent {}", agent_name),
            SpanKind::Agent,
            at,
            Some(at),
            ctx.session_id(),
            sequence,
        )
        .with_attribute(keys::SPAN_KIND, SpanKind::Agent.as_str())
        .with_attribute(keys::AGENT_ID, agent_id)
        .with_attribute(keys::AGENT_NAME, agent_name);
        EncodedSpan::end(span)
    }

    /// Close every in-flight span at `end_time` with an error status.
    pub fn close_orphans(ctx: &mut TraceContext, end_time: Timestamp) -> Vec<EncodedSpan> {
        let mut orphans: Vec<_> = ctx.open.drain().collect();
        orphans.sort_by_key(|(_, open)| open.sequence);

        let mut spans = Vec::with_capacity(orphans.len());
        for (event_id, mut open) in orphans {
            if open.error.is_none() {
                open.error = Some(ORPHANED_MESSAGE.to_string());
            }
            open.attributes
                .insert(keys::ORPHANED.to_string(), AttributeValue::Bool(true));
            let span = Self::finish(ctx, open, end_time);
            ctx.closed.insert(event_id, span.span_id());
            spans.push(EncodedSpan::end(span));
        }
        spans
    }

    /// The session's root span. Its end never precedes the latest child end.
    pub fn root_span(
        ctx: &TraceContext,
        name: &str,
        end_time: Timestamp,
        status: SpanStatus,
        status_message: Option<String>,
        attributes: Attributes,
    ) -> Span {
        let start = ctx.root_start();
        let mut end = end_time.max(start);
        if let Some(latest) = ctx.latest_child_end() {
            end = end.max(latest);
        }
        Span::new(
            ctx.trace_id(),
            ctx.root_span_id(),
            None,
            name.to_string(),
            SpanKind::Session,
            start,
            Some(end),
            ctx.session_id(),
            0,
        )
        .with_attribute(keys::SPAN_KIND, SpanKind::Session.as_str())
        .with_attribute(keys::SESSION_ID, ctx.session_id().to_string())
        .with_attributes(attributes)
        .with_status(status, status_message)
    }

    fn complete(event: &Event, ctx: &mut TraceContext) -> Option<EncodedSpan> {
        let mut open = ctx.open.remove(&event.id())?;
        open.attributes.extend(event_attributes(event));
        let end = event.end_timestamp().unwrap_or(open.start_time);
        let span = Self::finish(ctx, open, end);
        ctx.closed.insert(event.id(), span.span_id());
        Some(EncodedSpan::end(span))
    }

    fn finish(ctx: &mut TraceContext, open: OpenSpan, end: Timestamp) -> Span {
        let clamped = end < open.start_time;
        let end = if clamped {
            debug!(
                span_id = %open.span_id,
                "Event ended before it started; clamping end to start"
            );
            open.start_time
        } else {
            end
        };
        ctx.observe_end(end);
        let span = build_span(ctx, &open, Some(end));
        if clamped {
            span.with_attribute(keys::CLAMPED, true)
        } else {
            span
        }
    }
}

fn build_span(ctx: &TraceContext, open: &OpenSpan, end: Option<Timestamp>) -> Span {
    let span = Span::new(
        ctx.trace_id(),
        open.span_id,
        Some(open.parent_span_id),
        open.name.clone(),
        open.kind,
        open.start_time,
        end,
        ctx.session_id(),
        open.sequence,
    )
    .with_attribute(keys::SPAN_KIND, open.kind.as_str())
    .with_attributes(open.attributes.clone());
    match &open.error {
        Some(message) => span.with_status(SpanStatus::Error, Some(message.clone())),
        None => span,
    }
}

fn span_name(event: &Event) -> String {
    match event.kind() {
        EventKind::Llm(call) => match &call.model {
            Some(model) => format!("llm {}", model),
            None => "llm".to_string(),
        },
        EventKind::Tool(call) => format!("tool {}", call.name),
        EventKind::Action(action) => format!("action {}", action.action_type),
        EventKind::Error(error) => format!("error {}", error.error_type),
    }
}

fn error_message(event: &Event) -> String {
    match event.kind() {
        EventKind::Error(error) => match &error.details {
            Some(details) => format!("{}: {}", error.error_type, details),
            None => error.error_type.clone(),
        },
        _ => String::new(),
    }
}

fn event_attributes(event: &Event) -> Attributes {
    let mut attrs = Attributes::new();
    attrs.insert(keys::EVENT_ID.to_string(), event.id().to_string().into());
    attrs.insert(keys::EVENT_TYPE.to_string(), event.event_type().as_str().into());
    if let Some(agent_id) = event.agent_id() {
        attrs.insert(keys::AGENT_ID.to_string(), agent_id.into());
    }
    for (key, value) in event.params() {
        attrs.insert(
            format!("{}{}", keys::PARAMS_PREFIX, key),
            AttributeValue::from_json(value),
        );
    }
    if let Some(returns) = event.returns() {
        attrs.insert(keys::RETURNS.to_string(), AttributeValue::from_json(returns));
    }

    match event.kind() {
        EventKind::Llm(call) => {
            if let Some(model) = &call.model {
                attrs.insert(keys::LLM_MODEL.to_string(), model.as_str().into());
            }
            if let Some(prompt) = &call.prompt {
                attrs.insert(keys::LLM_PROMPT.to_string(), AttributeValue::from_json(prompt));
            }
            if let Some(completion) = &call.completion {
                attrs.insert(
                    keys::LLM_COMPLETION.to_string(),
                    AttributeValue::from_json(completion),
                );
            }
            if let Some(tokens) = call.prompt_tokens {
                attrs.insert(keys::LLM_PROMPT_TOKENS.to_string(), tokens.into());
            }
            if let Some(tokens) = call.completion_tokens {
                attrs.insert(keys::LLM_COMPLETION_TOKENS.to_string(), tokens.into());
            }
            if let Some(thread) = &call.thread_id {
                attrs.insert(keys::LLM_THREAD_ID.to_string(), thread.as_str().into());
            }
        }
        EventKind::Tool(call) => {
            attrs.insert(keys::TOOL_NAME.to_string(), call.name.as_str().into());
            if let Some(logs) = &call.logs {
                attrs.insert(keys::TOOL_LOGS.to_string(), AttributeValue::from_json(logs));
            }
        }
        EventKind::Action(action) => {
            attrs.insert(keys::ACTION_TYPE.to_string(), action.action_type.as_str().into());
            if let Some(logs) = &action.logs {
                attrs.insert(keys::ACTION_LOGS.to_string(), AttributeValue::from_json(logs));
            }
        }
        EventKind::Error(error) => {
            attrs.insert(keys::ERROR_TYPE.to_string(), error.error_type.as_str().into());
            if let Some(code) = &error.code {
                attrs.insert(keys::ERROR_CODE.to_string(), code.as_str().into());
            }
            if let Some(details) = &error.details {
                attrs.insert(keys::ERROR_DETAILS.to_string(), details.as_str().into());
            }
            if let Some(trigger) = error.trigger_event {
                attrs.insert(keys::ERROR_TRIGGER.to_string(), trigger.to_string().into());
            }
        }
    }
    attrs
}
