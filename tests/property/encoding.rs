//! Properties of the event to span mapping.

use agentspan::telemetry::encoding::{keys, sort_siblings, SpanEncoder, TraceContext};
use agentspan::telemetry::types::now;
use agentspan::telemetry::{Event, SessionId, Span, SpanId, TraceId};
use chrono::Duration;
use proptest::prelude::*;

fn encode_all(events: &[Event], ctx: &mut TraceContext) -> Vec<Span> {
    events
        .iter()
        .flat_map(|event| SpanEncoder::encode(event, ctx))
        .map(|encoded| encoded.span)
        .collect()
}

/// Sorting siblings yields the same order whatever order the spans arrived in
#[test]
fn test_sibling_order_ignores_arrival_order() {
    let mut runner = proptest::test_runner::TestRunner::default();

    runner
        .run(
            &(prop::collection::vec((0i64..50, 0i64..50), 1..20), any::<u64>()),
            |(offsets, seed)| {
                let base = now();
                let events: Vec<Event> = offsets
                    .iter()
                    .enumerate()
                    .map(|(i, (start, len))| {
                        let start = base + Duration::milliseconds(*start);
                        Event::tool(format!("t{}", i))
                            .started_at(start)
                            .ended_at(start + Duration::milliseconds(*len))
                    })
                    .collect();

                let mut ctx = TraceContext::new(SessionId::new(), base);
                let mut in_order = encode_all(&events, &mut ctx);
                let mut shuffled = in_order.clone();
                let len = shuffled.len();
                for i in 0..len {
                    let j = (seed.wrapping_mul(i as u64 + 1) % len as u64) as usize;
                    shuffled.swap(i, j);
                }

                sort_siblings(&mut in_order);
                sort_siblings(&mut shuffled);
                let ids = |spans: &[Span]| spans.iter().map(Span::span_id).collect::<Vec<_>>();
                assert_eq!(ids(&in_order), ids(&shuffled));

                for pair in in_order.windows(2) {
                    assert!(pair[0].start_time() <= pair[1].start_time());
                }

                Ok(())
            },
        )
        .unwrap();
}

/// No exported span ends before it starts; inverted events are marked clamped
#[test]
fn test_span_end_never_precedes_start() {
    let mut runner = proptest::test_runner::TestRunner::default();

    runner
        .run(&(-1_000i64..1_000), |delta_ms| {
            let start = now();
            let event = Event::action("step")
                .started_at(start)
                .ended_at(start + Duration::milliseconds(delta_ms));

            let mut ctx = TraceContext::new(SessionId::new(), start);
            let spans = encode_all(&[event], &mut ctx);
            assert_eq!(spans.len(), 1);

            let span = &spans[0];
            let end = span.end_time().unwrap();
            assert!(end >= span.start_time());
            assert_eq!(span.attribute(keys::CLAMPED).is_some(), delta_ms < 0);

            Ok(())
        })
        .unwrap();
}

/// Trace and root span ids are a pure function of the session id
#[test]
fn test_session_ids_derive_stable_trace_identity() {
    let mut runner = proptest::test_runner::TestRunner::default();

    runner
        .run(&any::<u8>(), |_| {
            let a = SessionId::new();
            let b = SessionId::new();

            assert_eq!(TraceId::for_session(&a), TraceId::for_session(&a));
            assert_eq!(SpanId::session_root(&a), SpanId::session_root(&a));
            assert_ne!(TraceId::for_session(&a), TraceId::for_session(&b));

            Ok(())
        })
        .unwrap();
}

/// Every span of a context shares its trace and hangs off its root
#[test]
fn test_spans_share_trace_and_root() {
    let mut runner = proptest::test_runner::TestRunner::default();

    runner
        .run(&prop::collection::vec(0u8..3, 1..30), |kinds| {
            let session = SessionId::new();
            let mut ctx = TraceContext::new(session, now());
            let events: Vec<Event> = kinds
                .iter()
                .map(|kind| match kind {
                    0 => Event::llm("model").end(),
                    1 => Event::tool("search").end(),
                    _ => Event::action("step").end(),
                })
                .collect();

            for span in encode_all(&events, &mut ctx) {
                assert_eq!(span.trace_id(), TraceId::for_session(&session));
                assert_eq!(span.parent_span_id(), Some(ctx.root_span_id()));
                assert_eq!(span.session_id(), session);
            }

            Ok(())
        })
        .unwrap();
}
