mod common;

use axum::http::StatusCode;
use tower::util::ServiceExt;

#[tokio::test]
async fn health_reports_database_up() {
    let app = common::spawn_app().await;

    let response = app.oneshot(common::get_request("/health")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = common::body_json(response).await;
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["service"], "kubedeck-auth-test");
    assert_eq!(body["checks"]["database"], "up");
}

#[tokio::test]
async fn metrics_exposition_is_public() {
    let app = common::spawn_app().await;

    let response = app.oneshot(common::get_request("/metrics")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn responses_carry_security_and_request_id_headers() {
    let app = common::spawn_app().await;

    let response = app.oneshot(common::get_request("/health")).await.unwrap();

    let headers = response.headers();
    assert_eq!(headers.get("x-content-type-options").unwrap(), "nosniff");
    assert_eq!(headers.get("x-frame-options").unwrap(), "DENY");
    assert!(headers.contains_key("strict-transport-security"));
    assert!(headers.contains_key("x-request-id"));
}

#[tokio::test]
async fn caller_supplied_request_id_is_echoed() {
    let app = common::spawn_app().await;

    let request = axum::http::Request::builder()
        .method("GET")
        .uri("/health")
        .header("x-request-id", "trace-me-123")
        .body(axum::body::Body::empty())
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.headers().get("x-request-id").unwrap(), "trace-me-123");
}
