use anyhow::{anyhow, Context};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use bcrypt::{hash, verify};
use chrono::{Duration, Utc};
use rand::Rng;
use sha2::{Digest, Sha256};
use validator::Validate;

use crate::{
    error::{AppError, AppResult},
    metrics::{record_login, ACCOUNT_LOCKOUTS_TOTAL},
    middlewares::auth::{JwtClaims, JwtService},
    models::{
        credentials::{MfaCode, VerificationToken},
        invitation::Invitation,
        user::{
            EmailRequest, LoginRequest, LoginResponse, MessageResponse, MfaRequiredResponse,
            MfaVerifyRequest, RegisterRequest, RegisterResponse, TokenResponse, User, UserProfile,
        },
    },
    services::{
        audit_service::{AuditEventParams, AuditEventType, AuditService},
        email_service::Notification,
        AppState,
    },
    stores::DuplicateKey,
};

const VERIFICATION_TOKEN_TTL_HOURS: i64 = 24;

pub const REGISTRATION_MESSAGE: &str =
    "Registration successful. Please check your email to verify your account.";
pub const MFA_SENT_MESSAGE: &str = "Verification code sent to your email";
pub const MFA_RESEND_MESSAGE: &str = "If the email exists, a new code has been sent";
pub const VERIFICATION_RESEND_MESSAGE: &str =
    "If an account with this email exists, a verification email has been sent.";
pub const EMAIL_VERIFIED_MESSAGE: &str = "Email successfully verified. You can now log in.";

pub struct AuthService<'a> {
    state: &'a AppState,
    jwt_service: JwtService,
    audit: AuditService,
}

impl<'a> AuthService<'a> {
    pub fn new(state: &'a AppState, client_ip: Option<String>) -> Self {
        Self {
            state,
            jwt_service: JwtService::new(&state.config.jwt_secret),
            audit: AuditService::new(client_ip),
        }
    }

    pub fn hash_password(&self, password: &str) -> AppResult<String> {
        Ok(hash(password, self.state.config.bcrypt_cost).context("Failed to hash password")?)
    }

    pub fn verify_password(&self, password: &str, hash: &str) -> AppResult<bool> {
        Ok(verify(password, hash).context("Failed to verify password")?)
    }

    pub async fn register(&self, req: RegisterRequest) -> AppResult<RegisterResponse> {
        if honeypot_filled(req.website.as_deref()) {
            self.log_bot("register");
            return Err(AppError::not_found("Not found"));
        }
        req.validate()?;

        let username = req.username.trim().to_string();
        let email = normalize_email(&req.email);
        let users = &self.state.stores.users;

        if users.find_by_username(&username).await?.is_some() {
            return Err(AppError::validation("Username already registered"));
        }
        if users.find_by_email(&email).await?.is_some() {
            return Err(AppError::validation("Email already registered"));
        }

        let invitation = match req
            .invitation_token
            .as_deref()
            .map(str::trim)
            .filter(|token| !token.is_empty())
        {
            Some(token) => Some(self.pending_invitation(token, &email).await?),
            None => None,
        };

        let password_hash = self.hash_password(&req.password)?;
        let is_admin = self.state.config.is_admin_email(&email);
        let user = User::new(username, email, password_hash, is_admin);
        // Unique indexes settle registrations racing past the checks above
        users.insert(&user).await.map_err(registration_conflict)?;

        if let Some(invitation) = invitation {
            let accepted = self
                .state
                .stores
                .invitations
                .mark_accepted(&invitation.id, Utc::now())
                .await?;
            if accepted {
                self.audit.log_event(
                    AuditEventParams::new(AuditEventType::InvitationAccepted, true)
                        .email(&user.email)
                        .user_id(&user.id)
                        .details(&invitation.id),
                );
                tracing::info!(invitation_id = %invitation.id, "Invitation accepted");
            }
        }

        self.send_verification_link(&user).await?;

        self.audit.log_event(
            AuditEventParams::new(AuditEventType::Registration, true)
                .email(&user.email)
                .user_id(&user.id),
        );
        tracing::info!(user_id = %user.id, is_admin, "User registered");

        Ok(RegisterResponse {
            success: true,
            message: REGISTRATION_MESSAGE.to_string(),
            email: user.email,
        })
    }

    pub async fn confirm_email(&self, token: &str) -> AppResult<MessageResponse> {
        let invalid = || AppError::validation("Invalid or expired verification link");
        if token.trim().is_empty() {
            return Err(invalid());
        }

        let stored = self
            .state
            .stores
            .verification_tokens
            .find_valid(&hash_token(token.trim()), Utc::now())
            .await?
            .ok_or_else(invalid)?;

        let users = &self.state.stores.users;
        let user = users.get(&stored.user_id).await?.ok_or_else(invalid)?;

        users.update_verified_flag(&user.id, true).await?;
        self.state
            .stores
            .verification_tokens
            .delete_for_user(&user.id)
            .await?;

        self.audit.log_event(
            AuditEventParams::new(AuditEventType::EmailVerified, true)
                .email(&user.email)
                .user_id(&user.id),
        );

        Ok(MessageResponse::ok(EMAIL_VERIFIED_MESSAGE))
    }

    /// Same answer whether or not the account exists.
    pub async fn resend_verification(&self, req: EmailRequest) -> AppResult<MessageResponse> {
        req.validate()?;
        let email = normalize_email(&req.email);

        match self.state.stores.users.find_by_email(&email).await? {
            Some(user) if !user.is_email_verified => {
                self.send_verification_link(&user).await?;
            }
            Some(_) => tracing::debug!("Verification resend requested for verified account"),
            None => tracing::debug!("Verification resend requested for unknown email"),
        }

        Ok(MessageResponse::ok(VERIFICATION_RESEND_MESSAGE))
    }

    pub async fn login(&self, req: LoginRequest) -> AppResult<LoginResponse> {
        if honeypot_filled(req.website.as_deref()) {
            self.log_bot("login");
            return Err(AppError::not_found("Not found"));
        }
        req.validate()?;

        let email = normalize_email(&req.email);
        let Some(user) = self.state.stores.users.find_by_email(&email).await? else {
            self.audit.log_login_failed(&email, "User not found");
            record_login("password", "failure");
            return Err(AppError::Auth);
        };

        let now = Utc::now();
        if user.is_locked(now) {
            self.audit.log_login_failed(&user.email, "Account locked");
            record_login("password", "locked");
            return Err(AppError::Locked {
                minutes: user.lock_minutes_remaining(now),
            });
        }

        if !self.verify_password(&req.password, &user.password_hash)? {
            self.register_failure(&user, "password").await?;
            return Err(AppError::Auth);
        }

        if !user.is_email_verified {
            self.audit.log_login_failed(&user.email, "Email not verified");
            record_login("password", "unverified");
            return Err(AppError::Auth);
        }

        if user.mfa_enabled {
            // The counter is only reset once the code is confirmed.
            self.send_mfa_code(&user).await?;
            record_login("password", "mfa_required");
            return Ok(LoginResponse::MfaRequired(MfaRequiredResponse {
                mfa_required: true,
                email: user.email,
                message: MFA_SENT_MESSAGE.to_string(),
            }));
        }

        self.reset_failures(&user).await?;
        let token = self.issue_token(&user)?;
        self.audit
            .log_login_success(&user.email, &user.id, user.is_admin);
        record_login("password", "success");

        Ok(LoginResponse::Token(token))
    }

    pub async fn verify_mfa(&self, req: MfaVerifyRequest) -> AppResult<TokenResponse> {
        req.validate()?;

        let email = normalize_email(&req.email);
        let Some(user) = self.state.stores.users.find_by_email(&email).await? else {
            record_login("mfa", "failure");
            return Err(AppError::validation("Invalid verification code"));
        };

        let now = Utc::now();
        if user.is_locked(now) {
            record_login("mfa", "locked");
            return Err(AppError::Locked {
                minutes: user.lock_minutes_remaining(now),
            });
        }

        let code = self
            .state
            .stores
            .mfa_codes
            .find_valid(&user.id, req.code.trim(), now)
            .await?;
        if code.is_none() {
            self.register_failure(&user, "mfa").await?;
            return Err(AppError::validation("Invalid or expired verification code"));
        }

        self.state.stores.mfa_codes.delete_for_user(&user.id).await?;

        if !user.is_email_verified {
            self.state
                .stores
                .users
                .update_verified_flag(&user.id, true)
                .await?;
            self.audit.log_event(
                AuditEventParams::new(AuditEventType::EmailVerified, true)
                    .email(&user.email)
                    .user_id(&user.id),
            );
        }

        self.reset_failures(&user).await?;
        let token = self.issue_token(&user)?;

        self.audit.log_event(
            AuditEventParams::new(AuditEventType::MfaVerified, true)
                .email(&user.email)
                .user_id(&user.id),
        );
        self.audit
            .log_login_success(&user.email, &user.id, user.is_admin);
        record_login("mfa", "success");

        Ok(token)
    }

    /// Same answer whether or not the account exists.
    pub async fn resend_mfa(&self, req: EmailRequest) -> AppResult<MessageResponse> {
        req.validate()?;
        let email = normalize_email(&req.email);

        if let Some(user) = self.state.stores.users.find_by_email(&email).await? {
            self.send_mfa_code(&user).await?;
        }

        Ok(MessageResponse::ok(MFA_RESEND_MESSAGE))
    }

    pub async fn me(&self, claims: &JwtClaims) -> AppResult<UserProfile> {
        self.state
            .stores
            .users
            .get(&claims.sub)
            .await?
            .map(UserProfile::from)
            .ok_or_else(|| AppError::Unauthorized("Could not validate credentials".to_string()))
    }

    /// Password and MFA failures share one counter. The store bumps it in a
    /// single write so parallel failures all count.
    async fn register_failure(&self, user: &User, stage: &'static str) -> AppResult<()> {
        let config = &self.state.config;
        let lock_until = Utc::now() + Duration::minutes(config.lockout_minutes);

        let updated = self
            .state
            .stores
            .users
            .record_failed_login(&user.id, config.max_failed_attempts, lock_until)
            .await?;
        let attempts = updated
            .as_ref()
            .map_or(0, |updated| updated.failed_login_attempts);

        if attempts >= config.max_failed_attempts {
            self.audit.log_account_locked(&user.email, &user.id);
            ACCOUNT_LOCKOUTS_TOTAL.with_label_values(&[stage]).inc();
            tracing::warn!(user_id = %user.id, attempts, stage, "Account locked");
        } else if stage == "mfa" {
            self.audit.log_event(
                AuditEventParams::new(AuditEventType::MfaFailed, false)
                    .email(&user.email)
                    .user_id(&user.id),
            );
        } else {
            self.audit.log_login_failed(&user.email, "Invalid password");
        }
        record_login(stage, "failure");
        Ok(())
    }

    /// The invitation behind `token`, which must still be open and addressed
    /// to `email`.
    async fn pending_invitation(&self, token: &str, email: &str) -> AppResult<Invitation> {
        let invitation = self
            .state
            .stores
            .invitations
            .find_pending_by_token(&hash_token(token), Utc::now())
            .await?
            .ok_or_else(|| AppError::validation("Invalid or expired invitation"))?;
        if invitation.email != email {
            return Err(AppError::validation("Email does not match invitation"));
        }
        Ok(invitation)
    }

    async fn reset_failures(&self, user: &User) -> AppResult<()> {
        if user.failed_login_attempts > 0 || user.locked_until.is_some() {
            self.state
                .stores
                .users
                .update_lockout_state(&user.id, 0, None)
                .await?;
        }
        Ok(())
    }

    fn issue_token(&self, user: &User) -> AppResult<TokenResponse> {
        let token = self
            .jwt_service
            .issue_for(user, self.state.config.jwt_expire_minutes)
            .map_err(|e| AppError::Internal(anyhow!("Failed to issue access token: {}", e)))?;
        Ok(TokenResponse::bearer(token))
    }

    async fn send_mfa_code(&self, user: &User) -> AppResult<()> {
        let expires_minutes = self.state.config.mfa_code_expire_minutes;
        let code = MfaCode::new(
            &user.id,
            generate_mfa_code(),
            Duration::minutes(expires_minutes),
        );
        self.state.stores.mfa_codes.replace_for_user(&code).await?;

        self.state.notifier.enqueue(Notification::MfaCode {
            to: user.email.clone(),
            username: user.username.clone(),
            code: code.code,
            expires_minutes,
        });

        self.audit.log_event(
            AuditEventParams::new(AuditEventType::MfaSent, true)
                .email(&user.email)
                .user_id(&user.id),
        );
        Ok(())
    }

    pub async fn send_verification_link(&self, user: &User) -> AppResult<()> {
        let token = generate_link_token();
        let stored = VerificationToken::new(
            &user.id,
            hash_token(&token),
            Duration::hours(VERIFICATION_TOKEN_TTL_HOURS),
        );
        self.state
            .stores
            .verification_tokens
            .replace_for_user(&stored)
            .await?;

        let link = format!(
            "{}/confirm-email?token={}",
            self.state.config.frontend_url.trim_end_matches('/'),
            token
        );
        self.state.notifier.enqueue(Notification::VerificationLink {
            to: user.email.clone(),
            username: user.username.clone(),
            link,
        });
        Ok(())
    }

    fn log_bot(&self, endpoint: &str) {
        self.audit.log_event(
            AuditEventParams::new(AuditEventType::SuspiciousActivity, false)
                .details(&format!("honeypot field filled on {}", endpoint)),
        );
    }
}

fn registration_conflict(err: anyhow::Error) -> AppError {
    match err.downcast_ref::<DuplicateKey>() {
        Some(DuplicateKey { field: "username" }) => {
            AppError::validation("Username already registered")
        }
        Some(_) => AppError::validation("Email already registered"),
        None => AppError::Internal(err),
    }
}

fn honeypot_filled(website: Option<&str>) -> bool {
    website.is_some_and(|value| !value.trim().is_empty())
}

pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Six decimal digits, leading zeros kept.
pub fn generate_mfa_code() -> String {
    format!("{:06}", rand::rng().random_range(0..1_000_000u32))
}

/// 32 random bytes, URL-safe base64 without padding.
pub fn generate_link_token() -> String {
    let mut bytes = [0u8; 32];
    rand::rng().fill(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

pub fn hash_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mfa_code_is_six_digits() {
        for _ in 0..100 {
            let code = generate_mfa_code();
            assert_eq!(code.len(), 6);
            assert!(code.chars().all(|c| c.is_ascii_digit()));
        }
    }

    #[test]
    fn verification_token_is_url_safe() {
        let token = generate_link_token();
        assert_eq!(token.len(), 43);
        assert!(token
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
        assert_ne!(token, generate_link_token());
    }

    #[test]
    fn token_hash_is_stable_hex() {
        let hashed = hash_token("abc");
        assert_eq!(hashed.len(), 64);
        assert_eq!(hashed, hash_token("abc"));
        assert_ne!(hashed, hash_token("abd"));
    }

    #[test]
    fn unique_index_conflicts_become_validation_errors() {
        let username = registration_conflict(DuplicateKey { field: "username" }.into());
        assert!(
            matches!(username, AppError::Validation(ref msg) if msg == "Username already registered")
        );
        let email = registration_conflict(DuplicateKey { field: "email" }.into());
        assert!(matches!(email, AppError::Validation(ref msg) if msg == "Email already registered"));
        let outage = registration_conflict(anyhow!("connection reset"));
        assert!(matches!(outage, AppError::Internal(_)));
    }

    #[test]
    fn blank_honeypot_is_ignored() {
        assert!(!honeypot_filled(None));
        assert!(!honeypot_filled(Some("  ")));
        assert!(honeypot_filled(Some("http://spam.example")));
    }
}
