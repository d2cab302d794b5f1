//! Write endpoint: validation, publishing, and error mapping.
//!
//! The broker is replaced by `MockPublisher`; no Docker required.

use axum::http::StatusCode;
use integration_tests::{fixtures, setup::ApiContext};

#[tokio::test]
async fn test_add_segment_publishes_one_event() {
    let ctx = ApiContext::new();
    let server = ctx.server();

    let response = server
        .post("/v1/segments")
        .json(&fixtures::add_segment_body("user1", "segment1"))
        .await;

    response.assert_status_ok();
    let body: serde_json::Value = response.json();
    assert_eq!(body, serde_json::json!({}));

    let events = ctx.publisher.captured_events();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].user_id, "user1");
    assert_eq!(events[0].segment, "segment1");
    assert!(events[0].registered_at > 0, "event should be timestamped");
}

#[tokio::test]
async fn test_published_payload_decodes_to_request() {
    let ctx = ApiContext::new();
    let server = ctx.server();

    server
        .post("/v1/segments")
        .json(&fixtures::add_segment_body("u-42", "sports"))
        .await
        .assert_status_ok();

    let event = ctx.publisher.captured_events().remove(0);
    let decoded = engine_core::SegmentEvent::decode(&event.encode().unwrap()).unwrap();
    assert_eq!(decoded.user_id, "u-42");
    assert_eq!(decoded.segment, "sports");
}

#[tokio::test]
async fn test_empty_user_id_is_rejected_without_publishing() {
    let ctx = ApiContext::new();
    let server = ctx.server();

    let response = server
        .post("/v1/segments")
        .json(&fixtures::add_segment_body("", "segment1"))
        .await;

    response.assert_status(StatusCode::BAD_REQUEST);
    let body: serde_json::Value = response.json();
    assert_eq!(body["code"], "INVALID_ARGUMENT");
    assert!(body["error"]
        .as_str()
        .unwrap_or_default()
        .contains("user_id is required"));
    assert_eq!(ctx.publisher.event_count(), 0);
}

#[tokio::test]
async fn test_empty_segment_is_rejected_without_publishing() {
    let ctx = ApiContext::new();
    let server = ctx.server();

    let response = server
        .post("/v1/segments")
        .json(&fixtures::add_segment_body("user1", ""))
        .await;

    response.assert_status(StatusCode::BAD_REQUEST);
    let body: serde_json::Value = response.json();
    assert_eq!(body["code"], "INVALID_ARGUMENT");
    assert_eq!(ctx.publisher.event_count(), 0);
}

#[tokio::test]
async fn test_missing_fields_are_rejected() {
    let ctx = ApiContext::new();
    let server = ctx.server();

    let response = server
        .post("/v1/segments")
        .json(&serde_json::json!({ "segment": "segment1" }))
        .await;

    response.assert_status(StatusCode::BAD_REQUEST);
    assert_eq!(ctx.publisher.event_count(), 0);
}

#[tokio::test]
async fn test_malformed_json_is_invalid_argument() {
    let ctx = ApiContext::new();
    let server = ctx.server();

    let response = server
        .post("/v1/segments")
        .content_type("application/json")
        .bytes("{not json".into())
        .await;

    response.assert_status(StatusCode::BAD_REQUEST);
    let body: serde_json::Value = response.json();
    assert_eq!(body["code"], "INVALID_ARGUMENT");
}

#[tokio::test]
async fn test_publish_failure_is_generic_internal_error() {
    let ctx = ApiContext::new();
    ctx.publisher.set_should_fail(true);
    let server = ctx.server();

    let response = server
        .post("/v1/segments")
        .json(&fixtures::add_segment_body("user1", "segment1"))
        .await;

    response.assert_status(StatusCode::INTERNAL_SERVER_ERROR);
    let body: serde_json::Value = response.json();
    assert_eq!(body["code"], "INTERNAL");
    assert_eq!(body["error"], "internal error");
}

#[tokio::test]
async fn test_write_route_absent_for_estimation_role() {
    let ctx = ApiContext::estimation_only();
    let server = ctx.server();

    let response = server
        .post("/v1/segments")
        .json(&fixtures::add_segment_body("user1", "segment1"))
        .await;

    response.assert_status(StatusCode::NOT_FOUND);
    assert_eq!(ctx.publisher.event_count(), 0);
}
