#![allow(dead_code)]

use anyhow::anyhow;
use async_trait::async_trait;
use axum::{
    body::{to_bytes, Body},
    http::{header, Method, Request, StatusCode},
    response::Response,
    Router,
};
use serde_json::{json, Value};
use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};
use tokio::sync::mpsc;
use tower::ServiceExt;

use nihongo_api::{
    config::Config,
    create_router,
    middlewares::rate_limit::MemoryRateLimiter,
    models::{quiz::QuizMode, vocabulary::Vocabulary},
    services::{
        ai_client::AiProvider,
        email_service::{Notification, Notifier, EMAIL_QUEUE_CAPACITY},
        AppState,
    },
    stores::Stores,
};

pub const PASSWORD: &str = "Sakura2024";
pub const ADMIN_EMAIL: &str = "sensei@example.com";

/// In-process configuration: cheap bcrypt, no rate limits, one admin address.
pub fn test_config() -> Config {
    Config {
        jwt_secret: "integration-test-secret-0123456789".to_string(),
        admin_emails: vec![ADMIN_EMAIL.to_string()],
        bcrypt_cost: 4,
        rate_limit_enabled: false,
        email_send_disabled: true,
        ..Config::default()
    }
}

/// Canned AI backend that counts calls.
#[derive(Default)]
pub struct FakeAi {
    pub fail: bool,
    pub hint_calls: AtomicUsize,
    pub tts_calls: AtomicUsize,
}

impl FakeAi {
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn hint_calls(&self) -> usize {
        self.hint_calls.load(Ordering::SeqCst)
    }

    pub fn tts_calls(&self) -> usize {
        self.tts_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AiProvider for FakeAi {
    async fn generate_hint(&self, vocab: &Vocabulary, mode: QuizMode) -> anyhow::Result<String> {
        self.hint_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(anyhow!("provider offline"));
        }
        Ok(format!("hint for {} ({})", vocab.expression, mode.as_str()))
    }

    async fn synthesize_speech(&self, text: &str) -> anyhow::Result<Vec<u8>> {
        self.tts_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(anyhow!("provider offline"));
        }
        Ok(format!("ID3{}", text).into_bytes())
    }
}

pub struct TestApp {
    pub router: Router,
    pub state: Arc<AppState>,
    emails: mpsc::Receiver<Notification>,
}

impl TestApp {
    pub fn new() -> Self {
        Self::build(test_config(), None)
    }

    pub fn with_config(config: Config) -> Self {
        Self::build(config, None)
    }

    pub fn with_ai(ai: Arc<dyn AiProvider>) -> Self {
        Self::build(test_config(), Some(ai))
    }

    fn build(config: Config, ai: Option<Arc<dyn AiProvider>>) -> Self {
        let _ = tracing_subscriber::fmt()
            .with_test_writer()
            .with_max_level(tracing::Level::DEBUG)
            .try_init();

        let (notifier, emails) = Notifier::channel(EMAIL_QUEUE_CAPACITY);
        let state = Arc::new(AppState::with_backends(
            config,
            Stores::in_memory(),
            Arc::new(MemoryRateLimiter::default()),
            notifier,
            ai,
        ));

        Self {
            router: create_router(state.clone()),
            state,
            emails,
        }
    }

    pub async fn send(&self, request: Request<Body>) -> Response {
        self.router.clone().oneshot(request).await.unwrap()
    }

    /// JSON request; the body comes back as `Value::Null` when it is not JSON.
    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        body: Option<Value>,
        token: Option<&str>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = self.send(request).await;
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, value)
    }

    pub async fn get(&self, uri: &str, token: Option<&str>) -> (StatusCode, Value) {
        self.request(Method::GET, uri, None, token).await
    }

    pub async fn post(&self, uri: &str, body: Value, token: Option<&str>) -> (StatusCode, Value) {
        self.request(Method::POST, uri, Some(body), token).await
    }

    /// Most recent queued email, discarding older ones.
    pub fn last_email(&mut self) -> Option<Notification> {
        let mut last = None;
        while let Ok(notification) = self.emails.try_recv() {
            last = Some(notification);
        }
        last
    }

    pub fn verification_token(&mut self) -> String {
        match self.last_email() {
            Some(Notification::VerificationLink { link, .. }) => link
                .split_once("token=")
                .map(|(_, token)| token.to_string())
                .unwrap(),
            other => panic!("expected a verification email, got {:?}", other),
        }
    }

    /// Raw token from the last invitation email.
    pub fn invitation_token(&mut self) -> String {
        match self.last_email() {
            Some(Notification::Invitation { link, .. }) => link
                .split_once("invitation_token=")
                .map(|(_, token)| token.to_string())
                .unwrap(),
            other => panic!("expected an invitation email, got {:?}", other),
        }
    }

    pub fn mfa_code(&mut self) -> String {
        match self.last_email() {
            Some(Notification::MfaCode { code, .. }) => code,
            other => panic!("expected an MFA email, got {:?}", other),
        }
    }

    /// Registers and confirms the account.
    pub async fn register_verified(&mut self, username: &str, email: &str) {
        let (status, body) = self
            .post(
                "/api/auth/register",
                json!({ "username": username, "email": email, "password": PASSWORD }),
                None,
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "register failed: {}", body);

        let token = self.verification_token();
        let (status, body) = self
            .post("/api/auth/confirm-email", json!({ "token": token }), None)
            .await;
        assert_eq!(status, StatusCode::OK, "confirm failed: {}", body);
    }

    /// Password step plus the emailed code; returns the access token.
    pub async fn login(&mut self, email: &str) -> String {
        let (status, body) = self
            .post(
                "/api/auth/login",
                json!({ "email": email, "password": PASSWORD }),
                None,
            )
            .await;
        assert_eq!(status, StatusCode::OK, "login failed: {}", body);
        assert_eq!(body["mfa_required"], true);

        let code = self.mfa_code();
        let (status, body) = self
            .post(
                "/api/auth/verify-mfa",
                json!({ "email": email, "code": code }),
                None,
            )
            .await;
        assert_eq!(status, StatusCode::OK, "verify-mfa failed: {}", body);
        body["access_token"].as_str().unwrap().to_string()
    }

    pub async fn user_token(&mut self, username: &str) -> String {
        let email = format!("{}@example.com", username);
        self.register_verified(username, &email).await;
        self.login(&email).await
    }

    pub async fn admin_token(&mut self) -> String {
        self.register_verified("sensei", ADMIN_EMAIL).await;
        self.login(ADMIN_EMAIL).await
    }

    pub async fn seed(&self, expression: &str, reading: &str, meaning: &str, tags: &str) -> Vocabulary {
        let vocab = Vocabulary::new(expression, reading, meaning, tags);
        self.state.stores.vocabulary.insert(&vocab).await.unwrap();
        vocab
    }
}
