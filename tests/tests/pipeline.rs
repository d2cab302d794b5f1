//! Consume pipeline: group sessions, batch assembly, decode, persist.
//!
//! Runs on the current-thread runtime so the log capture sees events from
//! spawned batch tasks.

use integration_tests::fixtures::{event_payload, event_payloads, legacy_payload, malformed_payload};
use integration_tests::logs::LogCapture;
use integration_tests::mocks::InMemoryGroup;
use integration_tests::setup::PipelineContext;
use redpanda::{BatchSource, RedpandaError};
use std::time::Duration;
use tracing::Level;
use worker::CoordinatorState;

const WAIT: Duration = Duration::from_secs(5);

#[tokio::test]
async fn test_malformed_record_is_logged_and_skipped() {
    let (logs, _guard) = LogCapture::install();
    let group = InMemoryGroup::new().with_session(vec![(
        0,
        vec![malformed_payload(), event_payload("user1", "segment1")],
    )]);
    let ctx = PipelineContext::new(group, PipelineContext::batch_of(10));

    let handle = ctx.start();
    assert!(ctx.repository.wait_for_save_calls(1, WAIT).await);
    ctx.shutdown(handle).await;

    let rows = ctx.repository.rows();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].user_id, "user1");
    assert_eq!(rows[0].segment, "segment1");

    let decode_errors = logs.matching(Level::ERROR, "error unmarshaling segment");
    assert_eq!(decode_errors.len(), 1);
    assert_eq!(
        decode_errors[0].fields.get("partition").map(String::as_str),
        Some("0")
    );
}

#[tokio::test]
async fn test_failed_insert_is_logged_and_dropped() {
    let (logs, _guard) = LogCapture::install();
    let group = InMemoryGroup::new()
        .with_session(vec![(0, vec![legacy_payload("user1", "segment1")])]);
    let ctx = PipelineContext::new(group, PipelineContext::batch_of(10));
    ctx.repository.set_should_fail(true);

    let handle = ctx.start();
    assert!(ctx.repository.wait_for_save_calls(1, WAIT).await);
    ctx.shutdown(handle).await;

    assert_eq!(ctx.repository.row_count(), 0);
    assert_eq!(ctx.repository.save_calls(), 1);
    assert_eq!(logs.matching(Level::ERROR, "error saving segments").len(), 1);
    assert!(logs
        .matching(Level::ERROR, "error unmarshaling segment")
        .is_empty());

    // The position already moved past the lost record.
    assert_eq!(ctx.source.group().positions().next_offset(0), Some(1));
}

#[tokio::test]
async fn test_shutdown_waits_for_in_flight_batches() {
    let group = InMemoryGroup::new().with_session(vec![
        (0, event_payloads(2, "drain-a")),
        (1, event_payloads(2, "drain-b")),
        (2, event_payloads(2, "drain-c")),
    ]);
    let ctx = PipelineContext::new(group, PipelineContext::batch_of(2));
    ctx.repository.set_delay(Duration::from_millis(200));

    let handle = ctx.start();
    assert!(ctx.repository.wait_for_save_calls(3, WAIT).await);
    assert!(ctx.repository.completed_saves() < 3);

    ctx.shutdown(handle).await;

    assert_eq!(ctx.repository.completed_saves(), ctx.repository.save_calls());
    assert_eq!(ctx.repository.row_count(), 6);
    assert_eq!(ctx.coordinator.state(), CoordinatorState::Stopped);
    assert_eq!(ctx.coordinator.in_flight(), 0);
}

#[tokio::test]
async fn test_batch_preserves_partition_order() {
    let group = InMemoryGroup::new().with_session(vec![(3, event_payloads(10, "ordered"))]);
    let ctx = PipelineContext::new(group, PipelineContext::batch_of(10));

    let handle = ctx.start();
    assert!(ctx.repository.wait_for_save_calls(1, WAIT).await);
    ctx.shutdown(handle).await;

    let users: Vec<_> = ctx
        .repository
        .rows()
        .into_iter()
        .map(|row| row.user_id)
        .collect();
    let expected: Vec<_> = (0..10).map(|i| format!("user-{i}")).collect();
    assert_eq!(users, expected);
    assert_eq!(ctx.source.group().positions().next_offset(3), Some(10));
}

#[tokio::test]
async fn test_rejoin_resumes_from_marked_positions() {
    let group = InMemoryGroup::new()
        .with_session(vec![(0, event_payloads(2, "rejoin"))])
        .with_session(vec![
            (0, vec![event_payload("late-0", "rejoin")]),
            (1, vec![event_payload("late-1", "rejoin")]),
        ]);
    let ctx = PipelineContext::new(group, PipelineContext::batch_of(10));

    let handle = ctx.start();
    assert!(ctx.repository.wait_for_save_calls(3, WAIT).await);
    ctx.shutdown(handle).await;

    let group = ctx.source.group();
    assert!(group.joins() >= 2);
    assert_eq!(ctx.repository.row_count(), 4);

    let positions = group.positions().snapshot();
    assert_eq!(positions.get(&0), Some(&3));
    assert_eq!(positions.get(&1), Some(&1));
}

#[tokio::test]
async fn test_close_ends_consumption() {
    let group = InMemoryGroup::new().with_session(vec![(0, vec![event_payload("user1", "closing")])]);
    let ctx = PipelineContext::new(group, PipelineContext::batch_of(10));

    let handle = ctx.start();
    assert!(ctx.repository.wait_for_save_calls(1, WAIT).await);

    ctx.source.close().await.unwrap();
    assert!(ctx.source.group().is_closed());

    // Closing the source closes the batch channel, which ends the dispatch loop.
    tokio::time::timeout(WAIT, handle)
        .await
        .expect("dispatch loop did not stop")
        .expect("coordinator task panicked")
        .expect("coordinator failed");
    assert_eq!(ctx.coordinator.state(), CoordinatorState::Stopped);

    let again = ctx.source.consume(ctx.cancel.clone());
    assert!(matches!(again, Err(RedpandaError::AlreadyStarted)));
}
