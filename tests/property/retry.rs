//! Properties of the bounded exponential backoff.

use std::time::Duration;

use agentspan::telemetry::RetryPolicy;
use proptest::prelude::*;

/// Every delay is twice the previous one, starting at the base delay
#[test]
fn test_backoff_doubles_from_base() {
    let mut runner = proptest::test_runner::TestRunner::default();

    runner
        .run(&(1u32..10, 1u64..5_000), |(max_attempts, base_ms)| {
            let policy = RetryPolicy::new(max_attempts, Duration::from_millis(base_ms));
            let schedule = policy.schedule();

            assert_eq!(schedule.len() as u32, max_attempts - 1);
            if let Some(first) = schedule.first() {
                assert_eq!(*first, Duration::from_millis(base_ms));
            }
            for pair in schedule.windows(2) {
                assert_eq!(pair[1], pair[0] * 2);
            }

            Ok(())
        })
        .unwrap();
}

/// A batch is attempted at most `max_attempts` times, and only once when the
/// failure is not retryable
#[test]
fn test_attempts_are_bounded() {
    let mut runner = proptest::test_runner::TestRunner::default();

    runner
        .run(&(1u32..20, any::<bool>()), |(max_attempts, retryable)| {
            let policy = RetryPolicy::new(max_attempts, Duration::from_millis(1));

            let mut attempt = 1;
            while policy.should_retry(attempt, retryable) {
                attempt += 1;
            }

            if retryable {
                assert_eq!(attempt, max_attempts);
            } else {
                assert_eq!(attempt, 1);
            }

            Ok(())
        })
        .unwrap();
}

/// Backoff never panics on large attempt numbers
#[test]
fn test_backoff_saturates() {
    let mut runner = proptest::test_runner::TestRunner::default();

    runner
        .run(&any::<u32>(), |attempt| {
            let policy = RetryPolicy::new(u32::MAX, Duration::from_secs(1));
            let delay = policy.backoff(attempt);
            assert!(delay >= Duration::from_secs(1));
            Ok(())
        })
        .unwrap();
}
