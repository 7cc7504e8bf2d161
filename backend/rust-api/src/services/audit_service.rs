//! Security audit trail. Events go to the `audit` tracing target so they can
//! be routed separately from application logs; emails are always masked.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuditEventType {
    LoginSuccess,
    AdminLogin,
    LoginFailed,
    MfaSent,
    MfaVerified,
    MfaFailed,
    Registration,
    EmailVerified,
    AccountLocked,
    UserDeleted,
    InvitationCreated,
    InvitationResent,
    InvitationDeleted,
    InvitationAccepted,
    VocabularyCreated,
    VocabularyUpdated,
    VocabularyDeleted,
    SuspiciousActivity,
}

impl AuditEventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditEventType::LoginSuccess => "LOGIN_SUCCESS",
            AuditEventType::AdminLogin => "ADMIN_LOGIN",
            AuditEventType::LoginFailed => "LOGIN_FAILED",
            AuditEventType::MfaSent => "MFA_SENT",
            AuditEventType::MfaVerified => "MFA_VERIFIED",
            AuditEventType::MfaFailed => "MFA_FAILED",
            AuditEventType::Registration => "REGISTRATION",
            AuditEventType::EmailVerified => "EMAIL_VERIFIED",
            AuditEventType::AccountLocked => "ACCOUNT_LOCKED",
            AuditEventType::UserDeleted => "USER_DELETED",
            AuditEventType::InvitationCreated => "INVITATION_CREATED",
            AuditEventType::InvitationResent => "INVITATION_RESENT",
            AuditEventType::InvitationDeleted => "INVITATION_DELETED",
            AuditEventType::InvitationAccepted => "INVITATION_ACCEPTED",
            AuditEventType::VocabularyCreated => "VOCABULARY_CREATED",
            AuditEventType::VocabularyUpdated => "VOCABULARY_UPDATED",
            AuditEventType::VocabularyDeleted => "VOCABULARY_DELETED",
            AuditEventType::SuspiciousActivity => "SUSPICIOUS_ACTIVITY",
        }
    }
}

/// Parameters for audit event logging
#[derive(Debug)]
pub struct AuditEventParams<'a> {
    pub event_type: AuditEventType,
    pub user_id: Option<&'a str>,
    pub email: Option<&'a str>,
    pub success: bool,
    pub details: Option<&'a str>,
}

impl<'a> AuditEventParams<'a> {
    pub fn new(event_type: AuditEventType, success: bool) -> Self {
        Self {
            event_type,
            user_id: None,
            email: None,
            success,
            details: None,
        }
    }

    pub fn email(mut self, email: &'a str) -> Self {
        self.email = Some(email);
        self
    }

    pub fn user_id(mut self, user_id: &'a str) -> Self {
        self.user_id = Some(user_id);
        self
    }

    pub fn details(mut self, details: &'a str) -> Self {
        self.details = Some(details);
        self
    }
}

pub struct AuditService {
    client_ip: Option<String>,
}

impl AuditService {
    pub fn new(client_ip: Option<String>) -> Self {
        Self { client_ip }
    }

    pub fn log_event(&self, params: AuditEventParams<'_>) {
        let user = params.email.map(mask_email);
        let ip = self.client_ip.as_deref().unwrap_or("unknown");
        let status = if params.success { "SUCCESS" } else { "FAILED" };

        if params.success {
            tracing::info!(
                target: "audit",
                event = params.event_type.as_str(),
                status,
                user = user.as_deref(),
                user_id = params.user_id,
                ip,
                details = params.details,
            );
        } else {
            tracing::warn!(
                target: "audit",
                event = params.event_type.as_str(),
                status,
                user = user.as_deref(),
                user_id = params.user_id,
                ip,
                details = params.details,
            );
        }
    }

    pub fn log_login_failed(&self, email: &str, reason: &str) {
        self.log_event(
            AuditEventParams::new(AuditEventType::LoginFailed, false)
                .email(email)
                .details(reason),
        );
    }

    pub fn log_login_success(&self, email: &str, user_id: &str, is_admin: bool) {
        let event_type = if is_admin {
            AuditEventType::AdminLogin
        } else {
            AuditEventType::LoginSuccess
        };
        self.log_event(
            AuditEventParams::new(event_type, true)
                .email(email)
                .user_id(user_id),
        );
    }

    pub fn log_account_locked(&self, email: &str, user_id: &str) {
        self.log_event(
            AuditEventParams::new(AuditEventType::AccountLocked, false)
                .email(email)
                .user_id(user_id),
        );
    }
}

/// `john@example.com` becomes `j**n@example.com`; local parts of two
/// characters or fewer are fully starred.
pub fn mask_email(email: &str) -> String {
    let Some((local, domain)) = email.rsplit_once('@') else {
        return "***".to_string();
    };

    let chars: Vec<char> = local.chars().collect();
    let masked_local = match chars.as_slice() {
        [] | [_] | [_, _] => "*".repeat(chars.len()),
        [first, .., last] => {
            format!("{}{}{}", first, "*".repeat(chars.len() - 2), last)
        }
    };

    format!("{}@{}", masked_local, domain)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn masks_inner_characters() {
        assert_eq!(mask_email("john@example.com"), "j**n@example.com");
        assert_eq!(mask_email("abc@x.io"), "a*c@x.io");
    }

    #[test]
    fn short_local_part_is_fully_masked() {
        assert_eq!(mask_email("jo@example.com"), "**@example.com");
        assert_eq!(mask_email("j@example.com"), "*@example.com");
    }

    #[test]
    fn malformed_address_is_hidden() {
        assert_eq!(mask_email("not-an-email"), "***");
        assert_eq!(mask_email(""), "***");
    }

    #[test]
    fn uses_last_at_sign() {
        assert_eq!(mask_email("a@b@example.com"), "a*b@example.com");
    }
}
