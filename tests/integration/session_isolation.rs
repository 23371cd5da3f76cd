//! Concurrent sessions never share spans, trace ids or counts.

use std::collections::HashSet;
use std::thread;

use agentspan::telemetry::encoding::keys;
use agentspan::telemetry::{AttributeValue, SpanKind};
use agentspan::{EndState, Event, EventType};

use crate::integration::test_utils::memory_client;

const SESSIONS: usize = 6;
const EVENTS_PER_SESSION: usize = 40;

#[test]
fn concurrent_sessions_stay_isolated() {
    let (client, memory) = memory_client();

    let handles: Vec<_> = (0..SESSIONS)
        .map(|i| {
            let client = client.clone();
            thread::spawn(move || {
                let tag = format!("worker-{}", i);
                let session = client.start_session([tag.clone()], None).unwrap();
                for n in 0..EVENTS_PER_SESSION {
                    let event = match n % 3 {
                        0 => Event::llm("model"),
                        1 => Event::tool(format!("tool-{}", n)),
                        _ => Event::action("step"),
                    };
                    session.record(event.with_param("worker", i as u64).end());
                }
                session.end(EndState::Success, None);
                (session, tag)
            })
        })
        .collect();

    let sessions: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    let all_spans = memory.spans();
    assert_eq!(all_spans.len(), SESSIONS * (EVENTS_PER_SESSION + 1));

    let trace_ids: HashSet<_> = sessions.iter().map(|(s, _)| s.trace_id()).collect();
    assert_eq!(trace_ids.len(), SESSIONS);

    for (i, (session, tag)) in sessions.iter().enumerate() {
        let spans = memory.spans_for_session(session.id());
        assert_eq!(spans.len(), EVENTS_PER_SESSION + 1);

        let total: u64 = [EventType::Llm, EventType::Tool, EventType::Action]
            .iter()
            .map(|t| session.event_count(*t))
            .sum();
        assert_eq!(total, EVENTS_PER_SESSION as u64);

        for span in &spans {
            assert_eq!(span.trace_id(), session.trace_id());
            assert_eq!(
                span.attribute(keys::SESSION_TAGS).and_then(AttributeValue::as_str),
                Some(tag.as_str())
            );
            if span.kind() != SpanKind::Session {
                assert_eq!(
                    span.attribute("agentspan.params.worker"),
                    Some(&AttributeValue::Int(i as i64))
                );
                assert_eq!(span.parent_span_id(), Some(session.root_span_id()));
            }
        }
    }
}

#[test]
fn explicit_scopes_route_unhandled_records() {
    let (client, memory) = memory_client();
    let first = client.start_session(["first"], None).unwrap();
    let second = client.start_session(["second"], None).unwrap();

    let record_first = first.patch({
        let client = client.clone();
        move || client.record(Event::tool("from-first").end())
    });
    record_first().unwrap();

    second
        .in_scope(|| client.record(Event::tool("from-second").end()))
        .unwrap();

    assert_eq!(first.event_count(EventType::Tool), 1);
    assert_eq!(second.event_count(EventType::Tool), 1);

    first.end(EndState::Success, None);
    second.end(EndState::Success, None);
    let first_names: Vec<String> = memory
        .spans_for_session(first.id())
        .iter()
        .map(|s| s.name().to_string())
        .collect();
    assert!(first_names.contains(&"tool from-first".to_string()));
    assert!(!first_names.contains(&"tool from-second".to_string()));
}
