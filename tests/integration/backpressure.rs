//! A full export queue drops spans instead of blocking producers.

use std::sync::Arc;
use std::time::{Duration, Instant};

use agentspan::{Client, EndState, Event};

use crate::integration::test_utils::{test_config, wait_until, GatedExporter};

const CAPACITY: usize = 4;
const RECORDED: usize = 200;

#[test]
fn full_queue_drops_and_counts() {
    let exporter = Arc::new(GatedExporter::new());
    let mut config = test_config();
    config.exporter.queue_capacity = CAPACITY;
    config.exporter.batch_size = 1;
    let client = Client::with_exporter(config, exporter.clone()).unwrap();
    let session = client.start_session(["flood"], None).unwrap();

    let started = Instant::now();
    for n in 0..RECORDED {
        session.record(Event::tool(format!("t{}", n)).end());
    }
    assert!(started.elapsed() < Duration::from_secs(5));

    let stats = client.stats();
    assert_eq!(stats.spans_received, RECORDED as u64);
    assert_eq!(stats.spans_enqueued + stats.spans_dropped, RECORDED as u64);
    assert!(stats.spans_enqueued <= (CAPACITY + 1) as u64);
    assert!(stats.spans_dropped >= (RECORDED - CAPACITY - 1) as u64);

    exporter.open();
    assert!(wait_until(Duration::from_secs(5), || {
        exporter.spans().len() as u64 == client.stats().spans_enqueued
    }));
    session.end(EndState::Success, None);
    assert!(client.stats().spans_dropped >= (RECORDED - CAPACITY - 1) as u64);
}
