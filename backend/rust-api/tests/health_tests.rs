use axum::{
    body::{to_bytes, Body},
    http::{header, Request, StatusCode},
};
use base64::{engine::general_purpose, Engine as _};

mod common;

use common::TestApp;

#[tokio::test]
async fn test_health_reports_backends() {
    let app = TestApp::new();
    let (status, body) = app.get("/health", None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["service"], "nihongo-api");
    assert_eq!(body["dependencies"]["store"]["backend"], "memory");
    assert_eq!(body["dependencies"]["rate_limiter"]["status"], "healthy");
}

#[tokio::test]
async fn test_security_headers_on_every_response() {
    let app = TestApp::new();
    let response = app
        .send(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await;

    let headers = response.headers();
    assert_eq!(headers.get(header::X_CONTENT_TYPE_OPTIONS).unwrap(), "nosniff");
    assert_eq!(headers.get(header::X_FRAME_OPTIONS).unwrap(), "DENY");
    assert!(headers.contains_key(header::CONTENT_SECURITY_POLICY));
    assert!(headers.contains_key("x-trace-id"));
}

#[tokio::test]
async fn test_metrics_require_basic_auth() {
    let app = TestApp::new();

    let response = app
        .send(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
        .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let wrong = general_purpose::STANDARD.encode("admin:wrong");
    let response = app
        .send(
            Request::builder()
                .uri("/metrics")
                .header(header::AUTHORIZATION, format!("Basic {}", wrong))
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    // one request through the router so the http counters exist
    app.get("/health", None).await;

    let credentials = general_purpose::STANDARD.encode("admin:changeme");
    let response = app
        .send(
            Request::builder()
                .uri("/metrics")
                .header(header::AUTHORIZATION, format!("Basic {}", credentials))
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let text = String::from_utf8(body.to_vec()).unwrap();
    assert!(text.contains("http_requests_total"));
}
