//! Handle-less recording resolves only when exactly one session is active.

use std::sync::Arc;

use agentspan::telemetry::instrument::ToolAdapter;
use agentspan::telemetry::InstrumentError;
use agentspan::{Client, EndState, Event, EventType, SessionRegistry, TelemetryError};

use crate::integration::test_utils::{memory_client, test_config};

#[test]
fn no_session_then_one_then_ambiguous() {
    let (client, _memory) = memory_client();
    assert_eq!(
        client.record(Event::tool("t").end()),
        Err(TelemetryError::NoSession)
    );

    let first = client.start_session(["one"], None).unwrap();
    client.record(Event::tool("t").end()).unwrap();
    assert_eq!(first.event_count(EventType::Tool), 1);

    let second = client.start_session(["two"], None).unwrap();
    assert_eq!(
        client.record(Event::tool("t").end()),
        Err(TelemetryError::AmbiguousSession { active: 2 })
    );
    assert_eq!(first.event_count(EventType::Tool), 1);
    assert_eq!(second.event_count(EventType::Tool), 0);

    second.end(EndState::Success, None);
    client.record(Event::tool("t").end()).unwrap();
    assert_eq!(first.event_count(EventType::Tool), 2);
}

#[test]
fn ambiguous_wrap_does_not_run_the_call() {
    let (client, _memory) = memory_client();
    let _a = client.start_session(["a"], None).unwrap();
    let _b = client.start_session(["b"], None).unwrap();

    let mut calls = 0;
    let result: Result<(), InstrumentError<String>> =
        client.wrap(&ToolAdapter::new("guarded"), (), |_: ()| {
            calls += 1;
            Ok(())
        });
    assert!(matches!(
        result,
        Err(InstrumentError::Session(TelemetryError::AmbiguousSession { active: 2 }))
    ));
    assert_eq!(calls, 0);
}

#[test]
fn injected_registry_is_shared_and_resettable() {
    let registry = Arc::new(SessionRegistry::new());
    let memory = Arc::new(agentspan::telemetry::InMemorySpanExporter::new());
    let client = Client::builder(test_config())
        .exporter(memory)
        .registry(registry.clone())
        .build()
        .unwrap();

    let session = client.start_session(["shared"], None).unwrap();
    assert_eq!(registry.active_count(), 1);
    assert!(registry.resolve(None).unwrap().ptr_eq(&session));
    assert!(registry.resolve(Some(session.id())).is_ok());

    client.reset();
    assert!(registry.is_empty());
    assert_eq!(
        client.record(Event::tool("t").end()),
        Err(TelemetryError::NoSession)
    );
    assert!(matches!(
        registry.resolve(Some(session.id())),
        Err(TelemetryError::SessionNotFound(_))
    ));
}

#[test]
fn all_active_excludes_ended_sessions() {
    let (client, _memory) = memory_client();
    let a = client.start_session(["a"], None).unwrap();
    let b = client.start_session(["b"], None).unwrap();
    a.end(EndState::Success, None);

    let active = client.registry().all_active();
    assert_eq!(active.len(), 1);
    assert!(active[0].ptr_eq(&b));
    assert_eq!(client.end_all_sessions(EndState::Indeterminate, Some("test")), 1);
    assert_eq!(b.end_state(), EndState::Indeterminate);
    assert_eq!(client.registry().active_count(), 0);
}
