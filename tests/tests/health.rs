//! Health endpoints.

use axum::http::StatusCode;
use integration_tests::setup::ApiContext;
use telemetry::health;

#[tokio::test]
async fn test_liveness_always_ok() {
    let server = ApiContext::new().server();
    server.get("/health/live").await.assert_status_ok();
}

#[tokio::test]
async fn test_health_report_includes_metrics() {
    let server = ApiContext::new().server();

    let response = server.get("/health").await;
    response.assert_status_ok();

    let body: serde_json::Value = response.json();
    assert!(body["status"].is_string());
    assert!(body["components"].is_array());
    assert!(body["metrics"]["rows_persisted"].is_u64());
}

// Mutates the process-wide registry; the only test here that does.
#[tokio::test]
async fn test_readiness_follows_tracked_components() {
    let server = ApiContext::new().server();

    health().redpanda.set_healthy();
    server.get("/health/ready").await.assert_status_ok();

    health().clickhouse.set_unhealthy("Connection failed");
    server
        .get("/health/ready")
        .await
        .assert_status(StatusCode::SERVICE_UNAVAILABLE);

    health().clickhouse.set_healthy();
    server.get("/health/ready").await.assert_status_ok();
}
