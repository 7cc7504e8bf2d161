// Per-IP fixed windows on the auth and quiz endpoints
use axum::{
    body::Body,
    http::{header, Request, StatusCode},
};
use serde_json::{json, Value};

mod common;

use common::{test_config, TestApp};
use nihongo_api::config::Config;

fn limited_app() -> TestApp {
    TestApp::with_config(Config {
        rate_limit_enabled: true,
        ..test_config()
    })
}

async fn post_from(app: &TestApp, uri: &str, body: &Value, ip: &str) -> StatusCode {
    app.send(
        Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .header("x-forwarded-for", ip)
            .body(Body::from(body.to_string()))
            .unwrap(),
    )
    .await
    .status()
}

#[tokio::test]
async fn test_login_rate_limit_per_ip() {
    let app = limited_app();
    let body = json!({ "email": "ghost@example.com", "password": "Wrong1234" });

    for _ in 0..5 {
        let status = post_from(&app, "/api/auth/login", &body, "10.0.0.1").await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }
    let status = post_from(&app, "/api/auth/login", &body, "10.0.0.1").await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);

    // another client still gets through
    let status = post_from(&app, "/api/auth/login", &body, "10.0.0.2").await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_register_rate_limit() {
    let app = limited_app();

    for i in 0..3 {
        let body = json!({
            "username": format!("learner{}", i),
            "email": format!("learner{}@example.com", i),
            "password": "Sakura2024"
        });
        let status = post_from(&app, "/api/auth/register", &body, "10.0.0.3").await;
        assert_eq!(status, StatusCode::CREATED);
    }

    let body = json!({
        "username": "learner9",
        "email": "learner9@example.com",
        "password": "Sakura2024"
    });
    let status = post_from(&app, "/api/auth/register", &body, "10.0.0.3").await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
}

#[tokio::test]
async fn test_scopes_are_counted_separately() {
    let app = limited_app();
    let body = json!({ "email": "ghost@example.com" });

    for _ in 0..2 {
        let status = post_from(&app, "/api/auth/resend-mfa", &body, "10.0.0.4").await;
        assert_eq!(status, StatusCode::OK);
    }
    let status = post_from(&app, "/api/auth/resend-mfa", &body, "10.0.0.4").await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);

    let status = post_from(&app, "/api/auth/resend-verification", &body, "10.0.0.4").await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_rejection_body_format() {
    let app = limited_app();
    let body = json!({ "email": "ghost@example.com" });

    for _ in 0..2 {
        post_from(&app, "/api/auth/resend-mfa", &body, "10.0.0.5").await;
    }
    let response = app
        .send(
            Request::builder()
                .method("POST")
                .uri("/api/auth/resend-mfa")
                .header(header::CONTENT_TYPE, "application/json")
                .header("x-real-ip", "10.0.0.5")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await;
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);

    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let value: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(
        value["message"],
        "Too many requests. Please wait before trying again."
    );
    assert_eq!(value["status"], 429);
}

#[tokio::test]
async fn test_disabled_limits_never_reject() {
    let app = TestApp::new();
    let body = json!({ "email": "ghost@example.com" });

    for _ in 0..10 {
        let status = post_from(&app, "/api/auth/resend-mfa", &body, "10.0.0.6").await;
        assert_eq!(status, StatusCode::OK);
    }
}
