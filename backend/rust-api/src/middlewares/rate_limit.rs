use anyhow::Context;
use async_trait::async_trait;
use axum::{
    extract::{ConnectInfo, Request, State},
    http::HeaderMap,
    middleware::Next,
    response::Response,
};
use redis::aio::ConnectionManager;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

use crate::{error::AppError, metrics::RATE_LIMIT_REJECTIONS_TOTAL, services::AppState};

/// Fixed-window limit applied per client IP.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitRule {
    pub scope: &'static str,
    pub limit: u32,
    pub window_seconds: u64,
}

const fn per_minute(scope: &'static str, limit: u32) -> RateLimitRule {
    RateLimitRule {
        scope,
        limit,
        window_seconds: 60,
    }
}

pub const LOGIN: RateLimitRule = per_minute("login", 5);
pub const REGISTER: RateLimitRule = per_minute("register", 3);
pub const MFA_VERIFY: RateLimitRule = per_minute("mfa_verify", 5);
pub const MFA_RESEND: RateLimitRule = per_minute("mfa_resend", 2);
pub const CONFIRM_EMAIL: RateLimitRule = per_minute("confirm_email", 5);
pub const RESEND_VERIFICATION: RateLimitRule = per_minute("resend_verification", 2);
pub const QUIZ: RateLimitRule = per_minute("quiz", 120);
pub const HINT: RateLimitRule = per_minute("hint", 20);
pub const TTS: RateLimitRule = per_minute("tts", 30);

/// Counter backend for the fixed-window limiter.
#[async_trait]
pub trait RateLimiter: Send + Sync {
    fn backend(&self) -> &'static str;
    /// Counts one hit on `key`; false once `limit` hits happened in the window.
    async fn check(&self, key: &str, limit: u32, window_seconds: u64) -> anyhow::Result<bool>;
    async fn ping(&self) -> anyhow::Result<()>;
}

pub struct RedisRateLimiter {
    conn: ConnectionManager,
}

impl RedisRateLimiter {
    pub fn new(conn: ConnectionManager) -> Self {
        Self { conn }
    }
}

const FIXED_WINDOW_SCRIPT: &str = r#"
    local key = KEYS[1]
    local limit = tonumber(ARGV[1])
    local window = tonumber(ARGV[2])

    local current = redis.call('GET', key)

    if current == false then
        redis.call('SET', key, 1, 'EX', window)
        return 1
    end

    current = tonumber(current)

    if current >= limit then
        return 0
    end

    redis.call('INCR', key)
    return 1
"#;

#[async_trait]
impl RateLimiter for RedisRateLimiter {
    fn backend(&self) -> &'static str {
        "redis"
    }

    async fn check(&self, key: &str, limit: u32, window_seconds: u64) -> anyhow::Result<bool> {
        let mut conn = self.conn.clone();
        let allowed: u32 = redis::Script::new(FIXED_WINDOW_SCRIPT)
            .key(key)
            .arg(limit)
            .arg(window_seconds)
            .invoke_async(&mut conn)
            .await
            .context("Rate limit script failed")?;
        Ok(allowed == 1)
    }

    async fn ping(&self) -> anyhow::Result<()> {
        let mut conn = self.conn.clone();
        redis::cmd("PING")
            .query_async::<String>(&mut conn)
            .await
            .context("Redis PING failed")?;
        Ok(())
    }
}

/// Keys tracked before the first sweep of expired windows.
const SWEEP_THRESHOLD: usize = 1024;

struct Window {
    expires_at: Instant,
    hits: u32,
}

struct Windows {
    slots: HashMap<String, Window>,
    /// Size at which the next new key triggers a sweep.
    sweep_at: usize,
}

impl Default for Windows {
    fn default() -> Self {
        Self {
            slots: HashMap::new(),
            sweep_at: SWEEP_THRESHOLD,
        }
    }
}

/// Single-process limiter used when no Redis is configured. Expired windows
/// are swept whenever the map doubles, so memory follows the number of
/// clients active within one window.
#[derive(Default)]
pub struct MemoryRateLimiter {
    windows: Mutex<Windows>,
}

impl MemoryRateLimiter {
    #[cfg(test)]
    async fn tracked_keys(&self) -> usize {
        self.windows.lock().await.slots.len()
    }
}

#[async_trait]
impl RateLimiter for MemoryRateLimiter {
    fn backend(&self) -> &'static str {
        "memory"
    }

    async fn check(&self, key: &str, limit: u32, window_seconds: u64) -> anyhow::Result<bool> {
        let now = Instant::now();
        let fresh = || Window {
            expires_at: now + Duration::from_secs(window_seconds),
            hits: 0,
        };
        let mut windows = self.windows.lock().await;

        if !windows.slots.contains_key(key) && windows.slots.len() >= windows.sweep_at {
            windows.slots.retain(|_, window| window.expires_at > now);
            windows.sweep_at = (windows.slots.len() * 2).max(SWEEP_THRESHOLD);
        }

        let slot = windows.slots.entry(key.to_string()).or_insert_with(fresh);
        if now >= slot.expires_at {
            *slot = fresh();
        }
        if slot.hits >= limit {
            return Ok(false);
        }
        slot.hits += 1;
        Ok(true)
    }

    async fn ping(&self) -> anyhow::Result<()> {
        Ok(())
    }
}

pub(crate) fn extract_client_ip_from(
    headers: &HeaderMap,
    extensions: &axum::http::Extensions,
) -> String {
    // Preferred order: X-Forwarded-For, X-Real-IP, ConnectInfo
    if let Some(v) = headers.get("x-forwarded-for") {
        if let Ok(s) = v.to_str() {
            // x-forwarded-for can be a comma separated list; take first
            return s.split(',').next().unwrap_or(s).trim().to_string();
        }
    }

    if let Some(v) = headers.get("x-real-ip") {
        if let Ok(s) = v.to_str() {
            return s.trim().to_string();
        }
    }

    if let Some(ci) = extensions.get::<ConnectInfo<SocketAddr>>() {
        return ci.0.ip().to_string();
    }

    "unknown".to_string()
}

/// Route layer: `from_fn_with_state((state, rate_limit::LOGIN), rate_limit_middleware)`.
pub async fn rate_limit_middleware(
    State((state, rule)): State<(Arc<AppState>, RateLimitRule)>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    if !state.config.rate_limit_enabled {
        return Ok(next.run(request).await);
    }

    let client_ip = extract_client_ip_from(request.headers(), request.extensions());
    let key = format!("ratelimit:{}:{}", rule.scope, client_ip);

    let allowed = state
        .rate_limiter
        .check(&key, rule.limit, rule.window_seconds)
        .await
        .map_err(|e| {
            tracing::error!(scope = rule.scope, "Rate limit check failed: {:#}", e);
            AppError::Internal(e)
        })?;

    if !allowed {
        tracing::warn!(scope = rule.scope, ip = %client_ip, "Rate limit exceeded");
        RATE_LIMIT_REJECTIONS_TOTAL
            .with_label_values(&[rule.scope])
            .inc();
        return Err(AppError::RateLimited);
    }

    Ok(next.run(request).await)
}
