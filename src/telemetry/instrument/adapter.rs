//! Call adapters: how a particular kind of call turns into events.

use serde::Serialize;
use serde_json::{Map, Value};

use crate::telemetry::events::{Event, EventKind, LlmCall};

/// Describes a call to instrumentation.
///
/// `on_call_start` builds the open event before the call runs;
/// `on_call_end` completes it from the call's output.
pub trait CallAdapter<Args: ?Sized, Output: ?Sized> {
    fn on_call_start(&self, args: &Args) -> Event;

    fn on_call_end(&self, event: Event, output: &Output) -> Event;

    /// Error type recorded when the call fails.
    fn error_type(&self) -> &str {
        "CallError"
    }
}

/// Tool calls: serialized arguments become params, the output becomes `returns`.
#[derive(Debug, Clone)]
pub struct ToolAdapter {
    name: String,
}

impl ToolAdapter {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl<A: Serialize + ?Sized, O: Serialize + ?Sized> CallAdapter<A, O> for ToolAdapter {
    fn on_call_start(&self, args: &A) -> Event {
        Event::tool(self.name.as_str()).with_params(params_of(args))
    }

    fn on_call_end(&self, event: Event, output: &O) -> Event {
        with_output(event, output).end()
    }

    fn error_type(&self) -> &str {
        "ToolError"
    }
}

/// LLM calls: the serialized request is the prompt, the serialized response
/// the completion.
#[derive(Debug, Clone)]
pub struct LlmAdapter {
    model: String,
}

impl LlmAdapter {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
        }
    }
}

impl<A: Serialize + ?Sized, O: Serialize + ?Sized> CallAdapter<A, O> for LlmAdapter {
    fn on_call_start(&self, args: &A) -> Event {
        Event::new(EventKind::Llm(LlmCall {
            model: Some(self.model.clone()),
            prompt: serde_json::to_value(args).ok(),
            ..LlmCall::default()
        }))
    }

    fn on_call_end(&self, event: Event, output: &O) -> Event {
        let kind = match event.kind() {
            EventKind::Llm(call) => EventKind::Llm(LlmCall {
                completion: serde_json::to_value(output).ok(),
                ..call.clone()
            }),
            other => other.clone(),
        };
        event.with_kind(kind).end()
    }

    fn error_type(&self) -> &str {
        "LlmError"
    }
}

/// Adapter built from two closures.
pub struct FnAdapter<S, E> {
    start: S,
    end: E,
}

pub fn adapter_fn<A, O, S, E>(start: S, end: E) -> FnAdapter<S, E>
where
    A: ?Sized,
    O: ?Sized,
    S: Fn(&A) -> Event,
    E: Fn(Event, &O) -> Event,
{
    FnAdapter { start, end }
}

impl<A: ?Sized, O: ?Sized, S, E> CallAdapter<A, O> for FnAdapter<S, E>
where
    S: Fn(&A) -> Event,
    E: Fn(Event, &O) -> Event,
{
    fn on_call_start(&self, args: &A) -> Event {
        (self.start)(args)
    }

    fn on_call_end(&self, event: Event, output: &O) -> Event {
        (self.end)(event, output)
    }
}

/// Objects become params key by key; anything else lands under `args`.
fn params_of<A: Serialize + ?Sized>(args: &A) -> Map<String, Value> {
    match serde_json::to_value(args) {
        Ok(Value::Object(map)) => map,
        Ok(Value::Null) | Err(_) => Map::new(),
        Ok(other) => {
            let mut map = Map::new();
            map.insert("args".to_string(), other);
            map
        }
    }
}

fn with_output<O: Serialize + ?Sized>(event: Event, output: &O) -> Event {
    match serde_json::to_value(output) {
        Ok(Value::Null) | Err(_) => event,
        Ok(value) => event.with_returns(value),
    }
}
