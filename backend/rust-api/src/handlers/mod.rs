use axum::{
    extract::{Request, State},
    http::{header, HeaderMap, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use base64::{engine::general_purpose, Engine as _};
use serde_json::json;
use std::{future::Future, sync::Arc, time::Duration};

use crate::metrics;
use crate::services::AppState;

pub async fn health_check(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let mut dependencies = serde_json::Map::new();

    let store = check_dependency(
        state.stores.health.backend(),
        Duration::from_secs(1),
        state.stores.health.ping(),
    )
    .await;
    let limiter = check_dependency(
        state.rate_limiter.backend(),
        Duration::from_millis(500),
        state.rate_limiter.ping(),
    )
    .await;

    let all_healthy = [&store, &limiter]
        .iter()
        .all(|result| result.get("status").and_then(|v| v.as_str()) == Some("healthy"));

    dependencies.insert("store".to_string(), json!(store));
    dependencies.insert("rate_limiter".to_string(), json!(limiter));

    let (status_code, status) = if all_healthy {
        (StatusCode::OK, "healthy")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "degraded")
    };

    (
        status_code,
        Json(json!({
            "status": status,
            "service": "nihongo-api",
            "version": env!("CARGO_PKG_VERSION"),
            "dependencies": dependencies
        })),
    )
}

async fn check_dependency(
    backend: &str,
    timeout: Duration,
    ping: impl Future<Output = anyhow::Result<()>>,
) -> serde_json::Map<String, serde_json::Value> {
    let mut result = serde_json::Map::new();
    result.insert("backend".to_string(), json!(backend));

    match tokio::time::timeout(timeout, ping).await {
        Ok(Ok(())) => {
            result.insert("status".to_string(), json!("healthy"));
        }
        Ok(Err(e)) => {
            result.insert("status".to_string(), json!("unhealthy"));
            result.insert("error".to_string(), json!(format!("{:#}", e)));
        }
        Err(_) => {
            result.insert("status".to_string(), json!("unhealthy"));
            result.insert(
                "error".to_string(),
                json!(format!("timeout after {}ms", timeout.as_millis())),
            );
        }
    }

    result
}

pub async fn metrics_handler() -> impl IntoResponse {
    match metrics::render_metrics() {
        Ok(metrics_text) => (StatusCode::OK, metrics_text),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("Failed to render metrics: {}", e),
        ),
    }
}

/// Protects /metrics with HTTP Basic auth (`user:password` from config).
pub async fn metrics_auth_middleware(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    request: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    let encoded = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Basic "))
        .ok_or(StatusCode::UNAUTHORIZED)?;

    let decoded = general_purpose::STANDARD
        .decode(encoded.trim())
        .map_err(|_| StatusCode::UNAUTHORIZED)?;
    let credentials = String::from_utf8(decoded).map_err(|_| StatusCode::UNAUTHORIZED)?;

    if credentials != state.config.metrics_auth {
        return Err(StatusCode::UNAUTHORIZED);
    }

    Ok(next.run(request).await)
}

pub mod admin;
pub mod auth;
pub mod kana;
pub mod preferences;
pub mod quiz;
pub mod scores;
pub mod vocabulary;
