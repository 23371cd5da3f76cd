//! Session lifecycle: end semantics, orphan closure and inherited sessions.

use std::thread;

use agentspan::telemetry::encoding::keys;
use agentspan::telemetry::{AttributeValue, SessionLifecycle, SpanKind, SpanStatus};
use agentspan::{EndState, Event, EventType, TelemetryError};
use chrono::Duration;

use crate::integration::test_utils::memory_client;

#[test]
fn single_llm_event_produces_root_and_child() {
    let (client, memory) = memory_client();
    let session = client.start_session(["a"], None).unwrap();

    let t0 = agentspan::telemetry::types::now();
    session.record(
        Event::llm("gpt-4o")
            .started_at(t0)
            .ended_at(t0 + Duration::milliseconds(50)),
    );
    session.end(EndState::Success, None);

    let spans = memory.spans_for_session(session.id());
    assert_eq!(spans.len(), 2);

    let root = spans.iter().find(|s| s.is_root()).unwrap();
    let llm = spans.iter().find(|s| s.kind() == SpanKind::Llm).unwrap();

    assert!(root.end_time().unwrap() >= t0 + Duration::milliseconds(50));
    assert_eq!(llm.parent_span_id(), Some(root.span_id()));
    assert_eq!(llm.trace_id(), root.trace_id());
    assert_eq!(
        root.attribute(keys::END_STATE).and_then(AttributeValue::as_str),
        Some("Success")
    );
    assert_eq!(
        root.attribute("agentspan.session.event_counts.llm"),
        Some(&AttributeValue::Int(1))
    );
    assert_eq!(
        llm.attribute(keys::SESSION_TAGS).and_then(AttributeValue::as_str),
        Some("a")
    );
}

#[test]
fn end_is_idempotent() {
    let (client, memory) = memory_client();
    let session = client.start_session(["idempotent"], None).unwrap();
    session.record(Event::tool("search").end());

    session.end(EndState::Success, Some("first"));
    let after_first = memory.spans_for_session(session.id());
    let end_time = session.end_time();

    session.end(EndState::Fail, Some("second"));
    client.end_trace(&session, EndState::Indeterminate, None);

    assert_eq!(memory.spans_for_session(session.id()), after_first);
    assert_eq!(session.end_state(), EndState::Success);
    assert_eq!(session.end_state_reason().as_deref(), Some("first"));
    assert_eq!(session.end_time(), end_time);
    assert_eq!(after_first.iter().filter(|s| s.is_root()).count(), 1);
}

#[test]
fn concurrent_end_emits_one_root() {
    let (client, memory) = memory_client();
    let session = client.start_session(["race"], None).unwrap();

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let session = session.clone();
            thread::spawn(move || session.end(EndState::Success, None))
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let roots = memory
        .spans_for_session(session.id())
        .into_iter()
        .filter(|s| s.is_root())
        .count();
    assert_eq!(roots, 1);
    assert_eq!(session.lifecycle(), SessionLifecycle::Ended);
}

#[test]
fn open_events_are_closed_as_orphans() {
    let (client, memory) = memory_client();
    let session = client.start_session(["orphans"], None).unwrap();
    session.record(Event::llm("never-finishes"));
    session.record(Event::tool("also-open"));
    session.record(Event::action("done").end());

    session.end(EndState::Indeterminate, None);
    let session_end = session.end_time().unwrap();

    let spans = memory.spans_for_session(session.id());
    let orphans: Vec<_> = spans
        .iter()
        .filter(|s| matches!(s.kind(), SpanKind::Llm | SpanKind::Tool))
        .collect();
    assert_eq!(orphans.len(), 2);
    for orphan in orphans {
        assert_eq!(orphan.status(), SpanStatus::Error);
        assert_eq!(orphan.status_message(), Some("orphaned at session end"));
        assert_eq!(orphan.end_time(), Some(session_end));
    }

    let action = spans.iter().find(|s| s.kind() == SpanKind::Action).unwrap();
    assert_eq!(action.status(), SpanStatus::Ok);
}

#[test]
fn recording_after_end_is_rejected() {
    let (client, memory) = memory_client();
    let session = client.start_session(["late"], None).unwrap();
    session.end(EndState::Success, None);

    assert!(matches!(
        session.try_record(Event::tool("late").end()),
        Err(TelemetryError::SessionEnded(_))
    ));
    session.record(Event::tool("late").end());
    assert!(matches!(
        session.create_agent("late-agent"),
        Err(TelemetryError::SessionEnded(_))
    ));
    assert_eq!(memory.spans_for_session(session.id()).len(), 1);
    assert_eq!(session.event_count(EventType::Tool), 0);
}

#[test]
fn inherited_session_shares_trace_without_root() {
    let (owner_client, owner_memory) = memory_client();
    let (worker_client, worker_memory) = memory_client();

    let owner = owner_client.start_session(["owner"], None).unwrap();
    let worker = worker_client
        .start_session(["worker"], Some(owner.id()))
        .unwrap();
    assert!(worker.is_inherited());
    assert_eq!(worker.id(), owner.id());
    assert_eq!(worker.trace_id(), owner.trace_id());
    assert_eq!(worker.root_span_id(), owner.root_span_id());

    worker.record(Event::tool("remote-step").end());
    worker.end(EndState::Success, None);
    owner.end(EndState::Success, None);

    let worker_spans = worker_memory.spans();
    assert_eq!(worker_spans.len(), 1);
    assert!(!worker_spans[0].is_root());
    assert_eq!(worker_spans[0].parent_span_id(), Some(owner.root_span_id()));

    let owner_spans = owner_memory.spans();
    assert_eq!(owner_spans.len(), 1);
    assert!(owner_spans[0].is_root());
    assert_eq!(owner_spans[0].span_id(), owner.root_span_id());
}

#[test]
fn analytics_report_counts_and_state() {
    let (client, _memory) = memory_client();
    let session = client.start_trace("analytics", ["x"]).unwrap();
    session.record(Event::llm("m").end());
    session.record(Event::llm("m").end());
    session.record(Event::error("Oops"));
    session.end(EndState::Fail, Some("oops"));

    let analytics = session.analytics();
    assert_eq!(analytics.event_counts["llm"], 2);
    assert_eq!(analytics.event_counts["error"], 1);
    assert_eq!(analytics.event_counts["tool"], 0);
    assert_eq!(analytics.total_events, 3);
    assert_eq!(analytics.end_state, EndState::Fail);
    assert_eq!(analytics.lifecycle, SessionLifecycle::Ended);
}
