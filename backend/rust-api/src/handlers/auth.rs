use axum::{extract::State, http::StatusCode, response::IntoResponse, Extension, Json};
use std::sync::Arc;

use crate::{
    error::AppResult,
    extractors::{AppJson, ClientIp},
    middlewares::auth::JwtClaims,
    models::user::{
        ConfirmEmailRequest, EmailRequest, LoginRequest, LoginResponse, MessageResponse,
        MfaVerifyRequest, RegisterRequest, TokenResponse, UserProfile,
    },
    services::{auth_service::AuthService, AppState},
};

/// POST /api/auth/register
pub async fn register(
    State(state): State<Arc<AppState>>,
    ClientIp(ip): ClientIp,
    AppJson(req): AppJson<RegisterRequest>,
) -> AppResult<impl IntoResponse> {
    let response = AuthService::new(&state, Some(ip)).register(req).await?;
    Ok((StatusCode::CREATED, Json(response)))
}

/// POST /api/auth/confirm-email
pub async fn confirm_email(
    State(state): State<Arc<AppState>>,
    ClientIp(ip): ClientIp,
    AppJson(req): AppJson<ConfirmEmailRequest>,
) -> AppResult<Json<MessageResponse>> {
    let response = AuthService::new(&state, Some(ip))
        .confirm_email(&req.token)
        .await?;
    Ok(Json(response))
}

/// POST /api/auth/resend-verification
pub async fn resend_verification(
    State(state): State<Arc<AppState>>,
    ClientIp(ip): ClientIp,
    AppJson(req): AppJson<EmailRequest>,
) -> AppResult<Json<MessageResponse>> {
    let response = AuthService::new(&state, Some(ip))
        .resend_verification(req)
        .await?;
    Ok(Json(response))
}

/// POST /api/auth/login - token, or `mfa_required` when a code was emailed
pub async fn login(
    State(state): State<Arc<AppState>>,
    ClientIp(ip): ClientIp,
    AppJson(req): AppJson<LoginRequest>,
) -> AppResult<Json<LoginResponse>> {
    let response = AuthService::new(&state, Some(ip)).login(req).await?;
    Ok(Json(response))
}

/// POST /api/auth/verify-mfa
pub async fn verify_mfa(
    State(state): State<Arc<AppState>>,
    ClientIp(ip): ClientIp,
    AppJson(req): AppJson<MfaVerifyRequest>,
) -> AppResult<Json<TokenResponse>> {
    let response = AuthService::new(&state, Some(ip)).verify_mfa(req).await?;
    Ok(Json(response))
}

/// POST /api/auth/resend-mfa
pub async fn resend_mfa(
    State(state): State<Arc<AppState>>,
    ClientIp(ip): ClientIp,
    AppJson(req): AppJson<EmailRequest>,
) -> AppResult<Json<MessageResponse>> {
    let response = AuthService::new(&state, Some(ip)).resend_mfa(req).await?;
    Ok(Json(response))
}

/// GET /api/auth/me
pub async fn me(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<JwtClaims>,
) -> AppResult<Json<UserProfile>> {
    let profile = AuthService::new(&state, None).me(&claims).await?;
    Ok(Json(profile))
}
