//! OTLP/JSON-shaped trace payload.
//!
//! `resourceSpans -> scopeSpans -> spans`, with 64-bit nanosecond timestamps and
//! integer attributes rendered as strings as the OTLP JSON mapping requires.

use serde::Serialize;

use crate::error::ExportError;
use crate::telemetry::encoding::{keys, AttributeValue, Span, SpanStatus};
use crate::telemetry::types::unix_nanos;

pub const SERVICE_NAME: &str = "agentspan";
pub const SCOPE_NAME: &str = "agentspan";

// OTLP span kind INTERNAL.
const SPAN_KIND_INTERNAL: u8 = 1;
const STATUS_CODE_OK: u8 = 1;
const STATUS_CODE_ERROR: u8 = 2;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct TracePayload<'a> {
    resource_spans: Vec<ResourceSpans<'a>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ResourceSpans<'a> {
    resource: Resource<'a>,
    scope_spans: Vec<ScopeSpans<'a>>,
}

#[derive(Debug, Serialize)]
struct Resource<'a> {
    attributes: Vec<KeyValue<'a>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ScopeSpans<'a> {
    scope: Scope,
    spans: Vec<OtlpSpan<'a>>,
}

#[derive(Debug, Serialize)]
struct Scope {
    name: &'static str,
    version: &'static str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct OtlpSpan<'a> {
    trace_id: String,
    span_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    parent_span_id: Option<String>,
    name: &'a str,
    kind: u8,
    start_time_unix_nano: String,
    end_time_unix_nano: String,
    attributes: Vec<KeyValue<'a>>,
    status: Status<'a>,
}

#[derive(Debug, Serialize)]
struct Status<'a> {
    code: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<&'a str>,
}

#[derive(Debug, Serialize)]
struct KeyValue<'a> {
    key: &'a str,
    value: AnyValue<'a>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
enum AnyValue<'a> {
    StringValue(&'a str),
    IntValue(String),
    DoubleValue(f64),
    BoolValue(bool),
}

impl<'a> From<&'a AttributeValue> for AnyValue<'a> {
    fn from(value: &'a AttributeValue) -> Self {
        match value {
            AttributeValue::String(s) => AnyValue::StringValue(s),
            AttributeValue::Int(i) => AnyValue::IntValue(i.to_string()),
            AttributeValue::Float(f) => AnyValue::DoubleValue(*f),
            AttributeValue::Bool(b) => AnyValue::BoolValue(*b),
        }
    }
}

fn otlp_span(span: &Span) -> OtlpSpan<'_> {
    let end = span.end_time().unwrap_or_else(|| span.start_time());
    OtlpSpan {
        trace_id: span.trace_id().to_hex(),
        span_id: span.span_id().to_hex(),
        parent_span_id: span.parent_span_id().map(|id| id.to_hex()),
        name: span.name(),
        kind: SPAN_KIND_INTERNAL,
        start_time_unix_nano: unix_nanos(&span.start_time()).to_string(),
        end_time_unix_nano: unix_nanos(&end).to_string(),
        attributes: span
            .attributes()
            .iter()
            .map(|(key, value)| KeyValue {
                key,
                value: value.into(),
            })
            .chain(std::iter::once(KeyValue {
                key: keys::SPAN_SEQUENCE,
                value: AnyValue::IntValue(span.sequence().to_string()),
            }))
            .collect(),
        status: match span.status() {
            SpanStatus::Ok => Status {
                code: STATUS_CODE_OK,
                message: None,
            },
            SpanStatus::Error => Status {
                code: STATUS_CODE_ERROR,
                message: span.status_message(),
            },
        },
    }
}

/// Serialize `spans` into one payload, preserving their order.
pub fn encode(spans: &[Span], project_id: Option<&str>) -> Result<Vec<u8>, ExportError> {
    let mut resource = vec![KeyValue {
        key: "service.name",
        value: AnyValue::StringValue(SERVICE_NAME),
    }];
    if let Some(project_id) = project_id {
        resource.push(KeyValue {
            key: "agentspan.project.id",
            value: AnyValue::StringValue(project_id),
        });
    }

    let payload = TracePayload {
        resource_spans: vec![ResourceSpans {
            resource: Resource {
                attributes: resource,
            },
            scope_spans: vec![ScopeSpans {
                scope: Scope {
                    name: SCOPE_NAME,
                    version: env!("CARGO_PKG_VERSION"),
                },
                spans: spans.iter().map(otlp_span).collect(),
            }],
        }],
    };

    serde_json::to_vec(&payload).map_err(|e| ExportError::Serialization(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::telemetry::encoding::{SpanEncoder, TraceContext};
    use crate::telemetry::events::Event;
    use crate::telemetry::types::{now, SessionId};
    use serde_json::Value;

    #[test]
    fn payload_has_otlp_shape() {
        let mut ctx = TraceContext::new(SessionId::new(), now());
        let event = Event::llm("gpt-4o")
            .with_param("temperature", 0.2)
            .with_param("max_tokens", 64)
            .end();
        let spans: Vec<Span> = SpanEncoder::encode(&event, &mut ctx)
            .into_iter()
            .map(|encoded| encoded.span)
            .collect();

        let bytes = encode(&spans, Some("proj-1")).unwrap();
        let value: Value = serde_json::from_slice(&bytes).unwrap();
        let resource = &value["resourceSpans"][0];
        assert_eq!(resource["resource"]["attributes"][1]["value"]["stringValue"], "proj-1");

        let span = &resource["scopeSpans"][0]["spans"][0];
        assert_eq!(span["traceId"], ctx.trace_id().to_hex());
        assert_eq!(span["parentSpanId"], ctx.root_span_id().to_hex());
        assert_eq!(span["name"], "llm gpt-4o");
        assert_eq!(span["status"]["code"], 1);
        assert!(span["startTimeUnixNano"].as_str().unwrap().parse::<u64>().is_ok());

        let attrs = span["attributes"].as_array().unwrap();
        let max_tokens = attrs
            .iter()
            .find(|kv| kv["key"] == "agentspan.params.max_tokens")
            .unwrap();
        assert_eq!(max_tokens["value"]["intValue"], "64");
    }

    #[test]
    fn error_status_carries_message() {
        let mut ctx = TraceContext::new(SessionId::new(), now());
        let spans: Vec<Span> = SpanEncoder::encode(&Event::error("Crash"), &mut ctx)
            .into_iter()
            .map(|encoded| encoded.span)
            .collect();
        let value: Value = serde_json::from_slice(&encode(&spans, None).unwrap()).unwrap();
        let span = &value["resourceSpans"][0]["scopeSpans"][0]["spans"][0];
        assert_eq!(span["status"]["code"], 2);
        assert_eq!(span["status"]["message"], "Crash");
    }

    #[test]
    fn sequence_is_carried_for_completed_open_events() {
        let mut ctx = TraceContext::new(SessionId::new(), now());
        let open = Event::tool("slow");
        let _ = SpanEncoder::encode(&open, &mut ctx);
        let mut spans: Vec<Span> = SpanEncoder::encode(&Event::tool("fast").end(), &mut ctx)
            .into_iter()
            .chain(SpanEncoder::encode(&open.end(), &mut ctx))
            .map(|encoded| encoded.span)
            .collect();
        spans.push(SpanEncoder::root_span(
            &ctx,
            "root",
            now(),
            SpanStatus::Ok,
            None,
            Default::default(),
        ));

        let value: Value = serde_json::from_slice(&encode(&spans, None).unwrap()).unwrap();
        let wire = value["resourceSpans"][0]["scopeSpans"][0]["spans"].as_array().unwrap();
        let sequences: Vec<(&str, &str)> = wire
            .iter()
            .map(|span| {
                let sequence = span["attributes"]
                    .as_array()
                    .unwrap()
                    .iter()
                    .find(|kv| kv["key"] == keys::SPAN_SEQUENCE)
                    .unwrap();
                (
                    span["name"].as_str().unwrap(),
                    sequence["value"]["intValue"].as_str().unwrap(),
                )
            })
            .collect();
        assert_eq!(
            sequences,
            vec![("tool fast", "2"), ("tool slow", "1"), ("root", "0")]
        );
    }
}
