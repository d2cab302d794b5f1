//! ClickHouse segment store against a real server.
//!
//! Needs Docker, or `SEGMENT_TEST_CLICKHOUSE_URL` pointing at a running server:
//! `cargo test -p integration-tests --test clickhouse_repository -- --ignored`

use engine_core::{SegmentEvent, SegmentRepository};
use integration_tests::setup::StoreContext;

#[tokio::test]
#[ignore = "requires ClickHouse"]
async fn test_save_then_count_distinct_users() {
    let ctx = StoreContext::new().await;

    ctx.repository
        .save_user_segments(&[
            SegmentEvent::new("user1", "segment1"),
            SegmentEvent::new("user2", "segment1"),
        ])
        .await
        .expect("insert");

    assert_eq!(
        ctx.repository.segment_users_count("segment1").await.unwrap(),
        2
    );
    assert_eq!(
        ctx.repository.segment_users_count("segment2").await.unwrap(),
        0
    );
}

#[tokio::test]
#[ignore = "requires ClickHouse"]
async fn test_empty_save_is_noop() {
    let ctx = StoreContext::new().await;

    ctx.repository.save_user_segments(&[]).await.expect("empty save");
    assert_eq!(
        ctx.repository.segment_users_count("segment1").await.unwrap(),
        0
    );
}

#[tokio::test]
#[ignore = "requires ClickHouse"]
async fn test_schema_init_is_idempotent() {
    let ctx = StoreContext::new().await;

    clickhouse_client::schema::init_schema(&ctx.client)
        .await
        .expect("second init");
}
