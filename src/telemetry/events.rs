//! Event schema for telemetry.
//!
//! Events are immutable values. Builders consume and return `Self`; completing an
//! open event yields a new value that keeps the original id, which is how the
//! encoder matches a completion update to the span it started earlier.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::telemetry::types::{now, EventId, SessionId, Timestamp};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventType {
    Llm,
    Tool,
    Action,
    Error,
}

impl EventType {
    pub const ALL: [EventType; 4] = [
        EventType::Llm,
        EventType::Tool,
        EventType::Action,
        EventType::Error,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            EventType::Llm => "llm",
            EventType::Tool => "tool",
            EventType::Action => "action",
            EventType::Error => "error",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LlmCall {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prompt: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completion: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prompt_tokens: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completion_tokens: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thread_id: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub logs: Option<Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ActionData {
    pub action_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub logs: Option<Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ErrorData {
    pub error_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
    /// Event this error happened inside of, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trigger_event: Option<EventId>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum EventKind {
    Llm(LlmCall),
    Tool(ToolCall),
    Action(ActionData),
    Error(ErrorData),
}

impl EventKind {
    pub fn event_type(&self) -> EventType {
        match self {
            EventKind::Llm(_) => EventType::Llm,
            EventKind::Tool(_) => EventType::Tool,
            EventKind::Action(_) => EventType::Action,
            EventKind::Error(_) => EventType::Error,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    id: EventId,
    kind: EventKind,
    init_timestamp: Timestamp,
    #[serde(skip_serializing_if = "Option::is_none")]
    end_timestamp: Option<Timestamp>,
    #[serde(default)]
    params: Map<String, Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    returns: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    session_id: Option<SessionId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    agent_id: Option<String>,
}

impl Event {
    /// New event of `kind`, started now. Errors are closed immediately; everything
    /// else stays open until [`Event::end`] or [`Event::ended_at`].
    pub fn new(kind: EventKind) -> Self {
        let init = now();
        let end_timestamp = match kind {
            EventKind::Error(_) => Some(init),
            _ => None,
        };
        Self {
            id: EventId::new(),
            kind,
            init_timestamp: init,
            end_timestamp,
            params: Map::new(),
            returns: None,
            session_id: None,
            agent_id: None,
        }
    }

    pub fn llm(model: impl Into<String>) -> Self {
        Self::new(EventKind::Llm(LlmCall {
            model: Some(model.into()),
            ..LlmCall::default()
        }))
    }

    pub fn tool(name: impl Into<String>) -> Self {
        Self::new(EventKind::Tool(ToolCall {
            name: name.into(),
            logs: None,
        }))
    }

    pub fn action(action_type: impl Into<String>) -> Self {
        Self::new(EventKind::Action(ActionData {
            action_type: action_type.into(),
            logs: None,
        }))
    }

    pub fn error(error_type: impl Into<String>) -> Self {
        Self::new(EventKind::Error(ErrorData {
            error_type: error_type.into(),
            ..ErrorData::default()
        }))
    }

    /// Error raised while `trigger` was running.
    pub fn error_in(trigger: &Event, error_type: impl Into<String>, details: impl Into<String>) -> Self {
        Self::new(EventKind::Error(ErrorData {
            error_type: error_type.into(),
            code: None,
            details: Some(details.into()),
            trigger_event: Some(trigger.id),
        }))
        .with_agent_opt(trigger.agent_id.clone())
    }

    pub fn started_at(mut self, ts: Timestamp) -> Self {
        self.init_timestamp = ts;
        if let (EventKind::Error(_), Some(end)) = (&self.kind, self.end_timestamp) {
            if end < ts {
                self.end_timestamp = Some(ts);
            }
        }
        self
    }

    /// Close the event now.
    pub fn end(self) -> Self {
        self.ended_at(now())
    }

    /// Close the event at `ts`.
    pub fn ended_at(mut self, ts: Timestamp) -> Self {
        self.end_timestamp = Some(ts);
        self
    }

    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    pub fn with_params(mut self, params: Map<String, Value>) -> Self {
        self.params.extend(params);
        self
    }

    pub fn with_returns(mut self, returns: impl Into<Value>) -> Self {
        self.returns = Some(returns.into());
        self
    }

    pub fn with_agent(mut self, agent_id: impl Into<String>) -> Self {
        self.agent_id = Some(agent_id.into());
        self
    }

    fn with_agent_opt(mut self, agent_id: Option<String>) -> Self {
        self.agent_id = agent_id;
        self
    }

    pub fn with_kind(mut self, kind: EventKind) -> Self {
        self.kind = kind;
        self
    }

    /// Stamp session and default agent, keeping values already set.
    pub(crate) fn stamped(mut self, session_id: SessionId, default_agent: &str) -> Self {
        if self.session_id.is_none() {
            self.session_id = Some(session_id);
        }
        if self.agent_id.is_none() {
            self.agent_id = Some(default_agent.to_string());
        }
        self
    }

    pub fn id(&self) -> EventId {
        self.id
    }

    pub fn kind(&self) -> &EventKind {
        &self.kind
    }

    pub fn event_type(&self) -> EventType {
        self.kind.event_type()
    }

    pub fn init_timestamp(&self) -> Timestamp {
        self.init_timestamp
    }

    pub fn end_timestamp(&self) -> Option<Timestamp> {
        self.end_timestamp
    }

    pub fn is_open(&self) -> bool {
        self.end_timestamp.is_none()
    }

    pub fn params(&self) -> &Map<String, Value> {
        &self.params
    }

    pub fn returns(&self) -> Option<&Value> {
        self.returns.as_ref()
    }

    pub fn session_id(&self) -> Option<SessionId> {
        self.session_id
    }

    pub fn agent_id(&self) -> Option<&str> {
        self.agent_id.as_deref()
    }
}
