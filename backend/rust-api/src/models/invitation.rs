use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use super::{bson_datetime_as_chrono, bson_datetime_as_chrono_option, normalized_email};

/// Admin invitation, "invitations" collection.
/// Only the SHA-256 of the emailed token is stored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Invitation {
    #[serde(rename = "_id")]
    pub id: String,
    pub email: String,
    pub token_hash: String,
    pub invited_by: String,
    pub invited_by_username: String,
    #[serde(default)]
    pub accepted: bool,
    #[serde(
        rename = "acceptedAt",
        default,
        skip_serializing_if = "Option::is_none",
        with = "bson_datetime_as_chrono_option"
    )]
    pub accepted_at: Option<DateTime<Utc>>,
    #[serde(rename = "expiresAt", with = "bson_datetime_as_chrono")]
    pub expires_at: DateTime<Utc>,
    #[serde(rename = "createdAt", with = "bson_datetime_as_chrono")]
    pub created_at: DateTime<Utc>,
}

impl Invitation {
    pub fn new(
        email: String,
        token_hash: String,
        invited_by: &str,
        invited_by_username: &str,
        ttl: Duration,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            email,
            token_hash,
            invited_by: invited_by.to_string(),
            invited_by_username: invited_by_username.to_string(),
            accepted: false,
            accepted_at: None,
            expires_at: now + ttl,
            created_at: now,
        }
    }

    /// Still usable for registration.
    pub fn is_pending(&self, now: DateTime<Utc>) -> bool {
        !self.accepted && now < self.expires_at
    }
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateInvitationRequest {
    #[serde(deserialize_with = "normalized_email")]
    #[validate(email(message = "Invalid email format"))]
    pub email: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvitationResponse {
    pub id: String,
    pub email: String,
    pub accepted: bool,
    pub accepted_at: Option<DateTime<Utc>>,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub invited_by_username: String,
}

impl From<Invitation> for InvitationResponse {
    fn from(invitation: Invitation) -> Self {
        Self {
            id: invitation.id,
            email: invitation.email,
            accepted: invitation.accepted,
            accepted_at: invitation.accepted_at,
            expires_at: invitation.expires_at,
            created_at: invitation.created_at,
            invited_by_username: invitation.invited_by_username,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pending_until_accepted_or_expired() {
        let mut invitation = Invitation::new(
            "yuki@example.com".into(),
            "hash".into(),
            "admin-id",
            "sensei",
            Duration::days(7),
        );
        let now = invitation.created_at;
        assert!(invitation.is_pending(now));
        assert!(!invitation.is_pending(now + Duration::days(7)));

        invitation.accepted = true;
        assert!(!invitation.is_pending(now));
    }

    #[test]
    fn response_hides_token_hash() {
        let invitation = Invitation::new(
            "yuki@example.com".into(),
            "secret-hash".into(),
            "admin-id",
            "sensei",
            Duration::days(7),
        );
        let value = serde_json::to_value(InvitationResponse::from(invitation)).unwrap();
        assert!(value.get("token_hash").is_none());
        assert_eq!(value["invited_by_username"], "sensei");
        assert_eq!(value["accepted"], false);
    }
}
