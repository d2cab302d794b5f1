//! Read endpoint: counts, validation, and error mapping.

use axum::http::StatusCode;
use engine_core::{SegmentEvent, SegmentRepository};
use integration_tests::{fixtures, setup::ApiContext};

#[tokio::test]
async fn test_estimate_counts_distinct_users() {
    let ctx = ApiContext::new();
    ctx.repository
        .save_user_segments(&[
            SegmentEvent::new("user1", "segment1"),
            SegmentEvent::new("user2", "segment1"),
        ])
        .await
        .unwrap();
    let server = ctx.server();

    let response = server
        .post("/v1/estimate")
        .json(&fixtures::estimate_body("segment1"))
        .await;
    response.assert_status_ok();
    let body: serde_json::Value = response.json();
    assert_eq!(body["count"], 2);

    let response = server
        .post("/v1/estimate")
        .json(&fixtures::estimate_body("segment2"))
        .await;
    response.assert_status_ok();
    let body: serde_json::Value = response.json();
    assert_eq!(body["count"], 0);
}

#[tokio::test]
async fn test_repeated_queries_without_writes_agree() {
    let ctx = ApiContext::new();
    ctx.repository
        .save_user_segments(&[SegmentEvent::new("user1", "news")])
        .await
        .unwrap();
    let server = ctx.server();

    let first: serde_json::Value = server
        .post("/v1/estimate")
        .json(&fixtures::estimate_body("news"))
        .await
        .json();
    let second: serde_json::Value = server
        .post("/v1/estimate")
        .json(&fixtures::estimate_body("news"))
        .await
        .json();

    assert_eq!(first, second);
}

#[tokio::test]
async fn test_empty_segment_is_invalid_argument() {
    let ctx = ApiContext::new();
    let server = ctx.server();

    let response = server
        .post("/v1/estimate")
        .json(&fixtures::estimate_body(""))
        .await;

    response.assert_status(StatusCode::BAD_REQUEST);
    let body: serde_json::Value = response.json();
    assert_eq!(body["code"], "INVALID_ARGUMENT");
    assert!(body["error"]
        .as_str()
        .unwrap_or_default()
        .contains("segment is required"));
}

#[tokio::test]
async fn test_store_failure_is_generic_internal_error() {
    let ctx = ApiContext::new();
    ctx.repository.set_should_fail(true);
    let server = ctx.server();

    let response = server
        .post("/v1/estimate")
        .json(&fixtures::estimate_body("segment1"))
        .await;

    response.assert_status(StatusCode::INTERNAL_SERVER_ERROR);
    let body: serde_json::Value = response.json();
    assert_eq!(body["code"], "INTERNAL");
    assert_eq!(body["error"], "internal error");
}

#[tokio::test]
async fn test_read_route_absent_for_segmentation_role() {
    let ctx = ApiContext::segmentation_only();
    let server = ctx.server();

    server
        .post("/v1/estimate")
        .json(&fixtures::estimate_body("segment1"))
        .await
        .assert_status(StatusCode::NOT_FOUND);
}
