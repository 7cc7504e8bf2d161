use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::bson_datetime_as_chrono;

/// Emailed 6-digit login code, "mfa_codes" collection. One per user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MfaCode {
    #[serde(rename = "_id")]
    pub id: String,
    pub user_id: String,
    pub code: String,
    #[serde(rename = "expiresAt", with = "bson_datetime_as_chrono")]
    pub expires_at: DateTime<Utc>,
    #[serde(rename = "createdAt", with = "bson_datetime_as_chrono")]
    pub created_at: DateTime<Utc>,
}

impl MfaCode {
    pub fn new(user_id: &str, code: String, ttl: Duration) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            code,
            expires_at: now + ttl,
            created_at: now,
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

/// Email confirmation token, "verification_tokens" collection.
/// Only the SHA-256 of the emailed token is stored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerificationToken {
    #[serde(rename = "_id")]
    pub id: String,
    pub user_id: String,
    pub token_hash: String,
    #[serde(rename = "expiresAt", with = "bson_datetime_as_chrono")]
    pub expires_at: DateTime<Utc>,
    #[serde(rename = "createdAt", with = "bson_datetime_as_chrono")]
    pub created_at: DateTime<Utc>,
}

impl VerificationToken {
    pub fn new(user_id: &str, token_hash: String, ttl: Duration) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            token_hash,
            expires_at: now + ttl,
            created_at: now,
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn code_expires_after_ttl() {
        let code = MfaCode::new("u1", "123456".into(), Duration::minutes(10));
        assert!(!code.is_expired(code.created_at + Duration::minutes(9)));
        assert!(code.is_expired(code.created_at + Duration::minutes(10)));
    }
}
