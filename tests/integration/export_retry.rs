//! Delivery retry: bounded attempts, doubling backoff, drop after exhaustion.

use std::sync::Arc;
use std::time::Duration;

use agentspan::telemetry::export::ExportResult;
use agentspan::{Client, EndState, Event};

use crate::integration::test_utils::{test_config, ScriptedExporter};

fn client_with(exporter: Arc<ScriptedExporter>, base_delay_ms: u64) -> Client {
    let mut config = test_config();
    config.exporter.base_delay_ms = base_delay_ms;
    Client::with_exporter(config, exporter).unwrap()
}

#[test]
fn transient_failures_are_retried_with_doubling_backoff() {
    let exporter = Arc::new(ScriptedExporter::retryable_failures(2));
    let client = client_with(exporter.clone(), 40);
    let session = client.start_session(["retry"], None).unwrap();
    session.record(Event::tool("flaky").end());
    session.end(EndState::Success, None);

    let attempts = exporter.attempts();
    assert_eq!(attempts.len(), 3);
    let first_gap = attempts[1] - attempts[0];
    let second_gap = attempts[2] - attempts[1];
    assert!(first_gap >= Duration::from_millis(40), "first gap {:?}", first_gap);
    assert!(second_gap >= Duration::from_millis(80), "second gap {:?}", second_gap);

    assert_eq!(exporter.delivered().len(), 2);
    let stats = client.stats();
    assert_eq!(stats.retries, 2);
    assert_eq!(stats.batches_exported, 1);
    assert_eq!(stats.batches_dropped, 0);
}

#[test]
fn exhausted_retries_drop_the_batch() {
    let exporter = Arc::new(ScriptedExporter::retryable_failures(3));
    let client = client_with(exporter.clone(), 5);
    let session = client.start_session(["exhaust"], None).unwrap();
    session.record(Event::tool("down").end());
    session.end(EndState::Success, None);

    assert_eq!(exporter.attempts().len(), 3);
    assert!(exporter.delivered().is_empty());
    let stats = client.stats();
    assert_eq!(stats.batches_dropped, 1);
    assert_eq!(stats.spans_export_failed, 2);
    assert_eq!(stats.retries, 2);
}

#[test]
fn non_retryable_failure_is_not_retried() {
    let exporter = Arc::new(ScriptedExporter::new(vec![ExportResult::Failure {
        retryable: false,
        reason: "401 unauthorized".to_string(),
    }]));
    let client = client_with(exporter.clone(), 5);

    let rejected = client.start_session(["rejected"], None).unwrap();
    rejected.record(Event::tool("t").end());
    rejected.end(EndState::Success, None);
    assert_eq!(exporter.attempts().len(), 1);
    assert_eq!(client.stats().retries, 0);
    assert_eq!(client.stats().batches_dropped, 1);

    let accepted = client.start_session(["accepted"], None).unwrap();
    accepted.record(Event::tool("t").end());
    accepted.end(EndState::Success, None);
    assert_eq!(exporter.attempts().len(), 2);
    assert_eq!(exporter.delivered().len(), 2);
}

#[test]
fn failed_export_never_reaches_the_caller() {
    let exporter = Arc::new(ScriptedExporter::retryable_failures(10));
    let client = client_with(exporter, 1);
    let session = client.start_session(["quiet"], None).unwrap();
    assert!(session.try_record(Event::tool("t").end()).is_ok());
    assert!(!session.end_within(EndState::Success, None, Duration::from_secs(5)));
    assert!(session.is_ended());
}
