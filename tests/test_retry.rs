//! Retry timing tests on a paused clock
//!
//! `start_paused` lets the backoff sleeps complete instantly while virtual
//! time still records exactly how long the sequence would have waited.

use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;
use vitals_ingest::events::{PublishOutcome, RetryPolicy};
use vitals_ingest::protocol::{BloodPressure, VitalsRecord, VitalsRecordedEvent};
use vitals_ingest::testing::FlakyEventSink;

fn sample_event() -> VitalsRecordedEvent {
    VitalsRecordedEvent::for_record(&VitalsRecord {
        id: Uuid::new_v4(),
        patient_id: Uuid::new_v4(),
        recorded_at: chrono::Utc::now(),
        heart_rate: Some(64),
        blood_pressure: Some(BloodPressure {
            systolic: 118,
            diastolic: 76,
        }),
        temperature: None,
        oxygen_saturation: None,
        device_id: None,
    })
}

#[tokio::test(start_paused = true)]
async fn test_backoff_waits_100_then_200_ms() {
    let sink = Arc::new(FlakyEventSink::failing_first(2));
    let policy = RetryPolicy::default();

    let started = tokio::time::Instant::now();
    let outcome = policy.publish_with_retry(&sink, &sample_event()).await;
    let elapsed = started.elapsed();

    assert!(matches!(
        outcome,
        PublishOutcome::Delivered { attempts: 3, .. }
    ));
    assert_eq!(elapsed, Duration::from_millis(100 + 200));
}

#[tokio::test(start_paused = true)]
async fn test_no_backoff_after_final_attempt() {
    let sink = Arc::new(FlakyEventSink::always_failing());
    let policy = RetryPolicy::default();

    let started = tokio::time::Instant::now();
    let outcome = policy.publish_with_retry(&sink, &sample_event()).await;
    let elapsed = started.elapsed();

    assert_eq!(outcome, PublishOutcome::Lost { attempts: 3 });
    assert_eq!(sink.attempts(), 3);
    // Two sleeps between three attempts; none after exhaustion.
    assert_eq!(elapsed, Duration::from_millis(100 + 200));
}

#[tokio::test(start_paused = true)]
async fn test_first_attempt_success_never_sleeps() {
    let sink = Arc::new(FlakyEventSink::new());
    let policy = RetryPolicy::default();

    let started = tokio::time::Instant::now();
    let outcome = policy.publish_with_retry(&sink, &sample_event()).await;

    assert!(matches!(
        outcome,
        PublishOutcome::Delivered {
            attempts: 1,
            sequence: 1
        }
    ));
    assert_eq!(started.elapsed(), Duration::ZERO);
}

#[tokio::test]
async fn test_sequence_numbers_advance_per_publish() {
    let sink = Arc::new(FlakyEventSink::new());
    let policy = RetryPolicy::default();

    let first = policy.publish_with_retry(&sink, &sample_event()).await;
    let second = policy.publish_with_retry(&sink, &sample_event()).await;

    assert!(matches!(
        first,
        PublishOutcome::Delivered { sequence: 1, .. }
    ));
    assert!(matches!(
        second,
        PublishOutcome::Delivered { sequence: 2, .. }
    ));
}
