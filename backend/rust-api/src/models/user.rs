use chrono::{DateTime, Utc};
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::{Validate, ValidationError};

use super::{bson_datetime_as_chrono, bson_datetime_as_chrono_option, normalized_email};

/// User model stored in MongoDB "users" collection
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    #[serde(rename = "_id")]
    pub id: String,
    pub username: String,
    pub email: String,
    pub password_hash: String,
    #[serde(default)]
    pub is_email_verified: bool,
    #[serde(default = "default_mfa_enabled")]
    pub mfa_enabled: bool,
    #[serde(default)]
    pub is_admin: bool,
    #[serde(default)]
    pub failed_login_attempts: u32,
    #[serde(
        rename = "lockedUntil",
        default,
        skip_serializing_if = "Option::is_none",
        with = "bson_datetime_as_chrono_option"
    )]
    pub locked_until: Option<DateTime<Utc>>,
    #[serde(rename = "createdAt", with = "bson_datetime_as_chrono")]
    pub created_at: DateTime<Utc>,
}

fn default_mfa_enabled() -> bool {
    true
}

impl User {
    /// New accounts start unverified with MFA switched on.
    pub fn new(username: String, email: String, password_hash: String, is_admin: bool) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            username,
            email,
            password_hash,
            is_email_verified: false,
            mfa_enabled: true,
            is_admin,
            failed_login_attempts: 0,
            locked_until: None,
            created_at: Utc::now(),
        }
    }

    pub fn is_locked(&self, now: DateTime<Utc>) -> bool {
        self.locked_until.is_some_and(|until| now < until)
    }

    /// Whole minutes left on the lock, rounded up for display.
    pub fn lock_minutes_remaining(&self, now: DateTime<Utc>) -> i64 {
        match self.locked_until {
            Some(until) if now < until => (until - now).num_seconds() / 60 + 1,
            _ => 0,
        }
    }
}

/// User profile returned to client (without sensitive data)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: String,
    pub username: String,
    pub email: String,
    pub is_email_verified: bool,
    pub mfa_enabled: bool,
    pub is_admin: bool,
    pub created_at: DateTime<Utc>,
}

impl From<User> for UserProfile {
    fn from(user: User) -> Self {
        UserProfile {
            id: user.id,
            username: user.username,
            email: user.email,
            is_email_verified: user.is_email_verified,
            mfa_enabled: user.mfa_enabled,
            is_admin: user.is_admin,
            created_at: user.created_at,
        }
    }
}

lazy_static! {
    static ref USERNAME_CHARS: Regex = Regex::new(r"^[a-zA-Z0-9_\-.@]+$").unwrap();
}

fn validate_username(username: &str) -> Result<(), ValidationError> {
    if !USERNAME_CHARS.is_match(username) {
        return Err(ValidationError::new("username_chars").with_message(
            "Username can only contain letters, numbers, underscores, hyphens, dots, and @".into(),
        ));
    }
    if username.contains("..") || username.starts_with('.') || username.ends_with('.') {
        return Err(ValidationError::new("username_dots").with_message(
            "Username cannot start/end with a dot or contain consecutive dots".into(),
        ));
    }
    Ok(())
}

fn validate_password_complexity(password: &str) -> Result<(), ValidationError> {
    let has_upper = password.chars().any(|c| c.is_ascii_uppercase());
    let has_lower = password.chars().any(|c| c.is_ascii_lowercase());
    let has_digit = password.chars().any(|c| c.is_ascii_digit());
    if has_upper && has_lower && has_digit {
        Ok(())
    } else {
        Err(ValidationError::new("password_complexity").with_message(
            "Password must contain an uppercase letter, a lowercase letter and a digit".into(),
        ))
    }
}

/// Request to register a new user
#[derive(Debug, Deserialize, Validate)]
pub struct RegisterRequest {
    #[validate(
        length(min = 3, max = 100, message = "Username must be 3-100 characters"),
        custom(function = "validate_username")
    )]
    pub username: String,

    #[serde(deserialize_with = "normalized_email")]
    #[validate(email(message = "Invalid email format"))]
    pub email: String,

    #[validate(
        length(min = 8, max = 128, message = "Password must be 8-128 characters"),
        custom(function = "validate_password_complexity")
    )]
    pub password: String,

    /// Token from an admin invitation email; must belong to `email`
    #[serde(default)]
    pub invitation_token: Option<String>,

    /// Honeypot: hidden in the form, only bots fill it
    #[serde(default)]
    pub website: Option<String>,
}

/// Request to login
#[derive(Debug, Deserialize, Validate)]
pub struct LoginRequest {
    #[serde(deserialize_with = "normalized_email")]
    #[validate(email(message = "Invalid email format"))]
    pub email: String,

    pub password: String,

    #[serde(default)]
    pub website: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct MfaVerifyRequest {
    #[serde(deserialize_with = "normalized_email")]
    #[validate(email(message = "Invalid email format"))]
    pub email: String,

    #[validate(length(equal = 6, message = "Code must be 6 digits"))]
    pub code: String,
}

/// Body for the "send it again" endpoints (MFA code, verification link)
#[derive(Debug, Deserialize, Validate)]
pub struct EmailRequest {
    #[serde(deserialize_with = "normalized_email")]
    #[validate(email(message = "Invalid email format"))]
    pub email: String,
}

#[derive(Debug, Deserialize)]
pub struct ConfirmEmailRequest {
    pub token: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TokenResponse {
    pub access_token: String,
    pub token_type: String,
}

impl TokenResponse {
    pub fn bearer(access_token: String) -> Self {
        Self {
            access_token,
            token_type: "bearer".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MfaRequiredResponse {
    pub mfa_required: bool,
    pub email: String,
    pub message: String,
}

/// Login either finishes with a token or asks for the emailed code.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum LoginResponse {
    Token(TokenResponse),
    MfaRequired(MfaRequiredResponse),
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RegisterResponse {
    pub success: bool,
    pub message: String,
    pub email: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MessageResponse {
    pub success: bool,
    pub message: String,
}

impl MessageResponse {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
        }
    }
}
