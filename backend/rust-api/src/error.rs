use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;

/// Message used for every credential failure so callers cannot tell an
/// unknown email from a wrong password.
pub const GENERIC_CREDENTIALS_MESSAGE: &str = "Incorrect email or password";

#[derive(Error, Debug)]
pub enum AppError {
    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Validation(String),

    #[error("Incorrect email or password")]
    Auth,

    #[error("{0}")]
    Unauthorized(String),

    #[error("Account temporarily locked. Try again in {minutes} minutes.")]
    Locked { minutes: i64 },

    #[error("Too many requests. Please wait before trying again.")]
    RateLimited,

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    Unavailable(String),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    pub fn not_found(message: impl Into<String>) -> Self {
        AppError::NotFound(message.into())
    }

    pub fn validation(message: impl Into<String>) -> Self {
        AppError::Validation(message.into())
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::Auth | AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::Locked { .. } => StatusCode::LOCKED,
            AppError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(errors: validator::ValidationErrors) -> Self {
        AppError::Validation(format!("Validation error: {}", errors))
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match &self {
            AppError::Internal(err) => {
                tracing::error!("Internal error: {:#}", err);
                "Internal server error".to_string()
            }
            other => other.to_string(),
        };

        let body = serde_json::json!({
            "message": message,
            "status": status.as_u16()
        });

        let mut response = (status, Json(body)).into_response();
        if matches!(self, AppError::Auth | AppError::Unauthorized(_)) {
            response
                .headers_mut()
                .insert(header::WWW_AUTHENTICATE, HeaderValue::from_static("Bearer"));
        }
        response
    }
}

pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auth_error_uses_generic_message() {
        assert_eq!(AppError::Auth.to_string(), GENERIC_CREDENTIALS_MESSAGE);
    }

    #[test]
    fn auth_error_sets_www_authenticate() {
        let response = AppError::Auth.into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            response.headers().get(header::WWW_AUTHENTICATE).unwrap(),
            "Bearer"
        );
    }

    #[test]
    fn locked_error_mentions_minutes() {
        let err = AppError::Locked { minutes: 7 };
        assert_eq!(err.status(), StatusCode::LOCKED);
        assert!(err.to_string().contains("7 minutes"));
    }

    #[test]
    fn internal_error_hides_details() {
        let err = AppError::Internal(anyhow::anyhow!("connection refused on 10.0.0.5"));
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
