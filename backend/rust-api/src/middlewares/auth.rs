use axum::{
    extract::{Request, State},
    http::{header, HeaderMap},
    middleware::Next,
    response::Response,
};
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, errors::ErrorKind, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::{error::AppError, models::user::User, services::AppState};

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct JwtClaims {
    pub sub: String, // user_id
    pub username: String,
    pub is_admin: bool,
    pub exp: usize, // expiration timestamp
    pub iat: usize, // issued at timestamp
}

#[derive(Debug)]
pub enum AuthError {
    InvalidToken,
    ExpiredToken,
    MissingToken,
    InvalidSignature,
}

impl std::fmt::Display for AuthError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AuthError::InvalidToken => write!(f, "Invalid token"),
            AuthError::ExpiredToken => write!(f, "Token expired"),
            AuthError::MissingToken => write!(f, "Missing authorization token"),
            AuthError::InvalidSignature => write!(f, "Invalid token signature"),
        }
    }
}

impl std::error::Error for AuthError {}

impl From<AuthError> for AppError {
    fn from(_: AuthError) -> Self {
        AppError::Unauthorized("Could not validate credentials".to_string())
    }
}

pub struct JwtService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
}

impl JwtService {
    pub fn new(secret: &str) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
        }
    }

    pub fn generate_token(&self, claims: &JwtClaims) -> Result<String, AuthError> {
        encode(&Header::default(), claims, &self.encoding_key).map_err(|_| AuthError::InvalidToken)
    }

    /// Access token for `user`, valid for `ttl_minutes`.
    pub fn issue_for(&self, user: &User, ttl_minutes: i64) -> Result<String, AuthError> {
        let now = Utc::now();
        let claims = JwtClaims {
            sub: user.id.clone(),
            username: user.username.clone(),
            is_admin: user.is_admin,
            exp: (now + Duration::minutes(ttl_minutes)).timestamp() as usize,
            iat: now.timestamp() as usize,
        };
        self.generate_token(&claims)
    }

    pub fn validate_token(&self, token: &str) -> Result<JwtClaims, AuthError> {
        decode::<JwtClaims>(token, &self.decoding_key, &Validation::default())
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                ErrorKind::ExpiredSignature => AuthError::ExpiredToken,
                ErrorKind::InvalidSignature => AuthError::InvalidSignature,
                _ => AuthError::InvalidToken,
            })
    }
}

fn bearer_token(headers: &HeaderMap) -> Result<&str, AuthError> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .ok_or(AuthError::MissingToken)
}

/// Validates the bearer token and stores its claims in request extensions.
pub async fn auth_middleware(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let token = bearer_token(&headers)?;

    let jwt_service = JwtService::new(&state.config.jwt_secret);
    let claims = jwt_service.validate_token(token).map_err(|e| {
        tracing::warn!("JWT validation failed: {}", e);
        e
    })?;

    tracing::debug!(
        user_id = %claims.sub,
        is_admin = claims.is_admin,
        "Authenticated user"
    );

    request.extensions_mut().insert(claims);

    Ok(next.run(request).await)
}

/// Must run after `auth_middleware`.
pub async fn admin_guard_middleware(request: Request, next: Next) -> Result<Response, AppError> {
    match request.extensions().get::<JwtClaims>() {
        Some(claims) if claims.is_admin => Ok(next.run(request).await),
        Some(claims) => {
            tracing::warn!(user_id = %claims.sub, "Access denied: admin required");
            Err(AppError::Forbidden("Admin access required".to_string()))
        }
        None => Err(AuthError::MissingToken.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_jwt_generation_and_validation() {
        let service = JwtService::new("test-secret");
        let user = User::new("kenji".into(), "k@example.com".into(), "x".into(), true);

        let token = service.issue_for(&user, 60).unwrap();
        let validated = service.validate_token(&token).unwrap();

        assert_eq!(validated.sub, user.id);
        assert_eq!(validated.username, "kenji");
        assert!(validated.is_admin);
        assert!(validated.exp > validated.iat);
    }

    #[test]
    fn token_signed_with_other_secret_is_rejected() {
        let user = User::new("kenji".into(), "k@example.com".into(), "x".into(), false);
        let token = JwtService::new("secret-a").issue_for(&user, 60).unwrap();
        assert!(matches!(
            JwtService::new("secret-b").validate_token(&token),
            Err(AuthError::InvalidSignature)
        ));
    }

    #[test]
    fn expired_token_is_rejected() {
        let service = JwtService::new("test-secret");
        let user = User::new("kenji".into(), "k@example.com".into(), "x".into(), false);
        let token = service.issue_for(&user, -10).unwrap();
        assert!(matches!(
            service.validate_token(&token),
            Err(AuthError::ExpiredToken)
        ));
    }

    #[test]
    fn missing_header_is_reported() {
        assert!(matches!(
            bearer_token(&HeaderMap::new()),
            Err(AuthError::MissingToken)
        ));
    }
}
