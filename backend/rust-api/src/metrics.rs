use lazy_static::lazy_static;
use prometheus::{
    register_histogram_vec, register_int_counter_vec, Encoder, HistogramVec, IntCounterVec,
    TextEncoder,
};

lazy_static! {
    // HTTP Metrics
    pub static ref HTTP_REQUESTS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "http_requests_total",
        "Total number of HTTP requests",
        &["method", "path", "status"]
    )
    .unwrap();

    pub static ref HTTP_REQUEST_DURATION_SECONDS: HistogramVec = register_histogram_vec!(
        "http_request_duration_seconds",
        "HTTP request duration in seconds",
        &["method", "path"],
        vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0]
    )
    .unwrap();

    // Database Metrics (MongoDB)
    pub static ref DB_OPERATIONS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "db_operations_total",
        "Total number of database operations",
        &["operation", "collection", "status"]
    )
    .unwrap();

    pub static ref DB_OPERATION_DURATION_SECONDS: HistogramVec = register_histogram_vec!(
        "db_operation_duration_seconds",
        "Database operation duration in seconds",
        &["operation", "collection"],
        vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0]
    )
    .unwrap();

    // Quiz
    pub static ref QUIZ_QUESTIONS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "quiz_questions_total",
        "Quiz questions generated",
        &["mode", "question_type"]
    )
    .unwrap();

    pub static ref QUIZ_ANSWERS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "quiz_answers_total",
        "Quiz answers checked",
        &["mode", "correct"]
    )
    .unwrap();

    pub static ref AI_REQUESTS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "ai_requests_total",
        "Hint and speech requests by outcome",
        &["kind", "result"]
    )
    .unwrap();

    // Auth
    pub static ref LOGIN_ATTEMPTS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "login_attempts_total",
        "Login and MFA outcomes",
        &["stage", "result"]
    )
    .unwrap();

    pub static ref ACCOUNT_LOCKOUTS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "account_lockouts_total",
        "Accounts locked after repeated failures",
        &["stage"]
    )
    .unwrap();

    pub static ref EMAILS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "emails_total",
        "Outgoing emails by kind and status",
        &["kind", "status"]
    )
    .unwrap();

    pub static ref RATE_LIMIT_REJECTIONS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "rate_limit_rejections_total",
        "Requests rejected by the rate limiter",
        &["scope"]
    )
    .unwrap();
}

/// Renders all metrics in Prometheus text format
pub fn render_metrics() -> Result<String, prometheus::Error> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    String::from_utf8(buffer)
        .map_err(|e| prometheus::Error::Msg(format!("Failed to convert metrics to UTF-8: {}", e)))
}

/// Helper: track database operation with metrics
pub async fn track_db_operation<F, T>(
    operation: &str,
    collection: &str,
    future: F,
) -> Result<T, anyhow::Error>
where
    F: std::future::Future<Output = Result<T, anyhow::Error>>,
{
    let start = std::time::Instant::now();
    let result = future.await;
    let duration = start.elapsed().as_secs_f64();

    let status = if result.is_ok() { "success" } else { "error" };

    DB_OPERATIONS_TOTAL
        .with_label_values(&[operation, collection, status])
        .inc();

    DB_OPERATION_DURATION_SECONDS
        .with_label_values(&[operation, collection])
        .observe(duration);

    result
}

pub fn record_login(stage: &str, result: &str) {
    LOGIN_ATTEMPTS_TOTAL.with_label_values(&[stage, result]).inc();
}

pub fn record_ai_request(kind: &str, result: &str) {
    AI_REQUESTS_TOTAL.with_label_values(&[kind, result]).inc();
}
