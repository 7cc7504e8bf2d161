use anyhow::Context;
use chrono::{Duration, Utc};
use url::Url;
use validator::Validate;

use crate::{
    error::{AppError, AppResult},
    middlewares::auth::JwtClaims,
    models::{
        invitation::{CreateInvitationRequest, Invitation, InvitationResponse},
        ItemList,
    },
    services::{
        audit_service::{AuditEventParams, AuditEventType, AuditService},
        auth_service::{generate_link_token, hash_token},
        email_service::Notification,
        AppState,
    },
};

pub const INVITATION_TTL_DAYS: i64 = 7;

pub struct InvitationService<'a> {
    state: &'a AppState,
    audit: AuditService,
}

impl<'a> InvitationService<'a> {
    pub fn new(state: &'a AppState, client_ip: Option<String>) -> Self {
        Self {
            state,
            audit: AuditService::new(client_ip),
        }
    }

    /// Invites an address that has neither an account nor an open invitation.
    pub async fn create(
        &self,
        req: CreateInvitationRequest,
        admin: &JwtClaims,
    ) -> AppResult<InvitationResponse> {
        req.validate()?;
        let stores = &self.state.stores;

        if stores.users.find_by_email(&req.email).await?.is_some() {
            return Err(AppError::validation(
                "This email address is already registered",
            ));
        }
        if stores
            .invitations
            .find_pending_for_email(&req.email, Utc::now())
            .await?
            .is_some()
        {
            return Err(AppError::validation(
                "An active invitation already exists for this email",
            ));
        }

        let token = generate_link_token();
        let invitation = Invitation::new(
            req.email,
            hash_token(&token),
            &admin.sub,
            &admin.username,
            Duration::days(INVITATION_TTL_DAYS),
        );
        stores.invitations.insert(&invitation).await?;
        self.send(&invitation, &token, &admin.username)?;

        self.audit.log_event(
            AuditEventParams::new(AuditEventType::InvitationCreated, true)
                .email(&invitation.email)
                .user_id(&admin.sub)
                .details(&invitation.id),
        );
        tracing::info!(admin = %admin.username, invitation_id = %invitation.id, "Invitation created");

        Ok(invitation.into())
    }

    /// Newest first.
    pub async fn list(&self) -> AppResult<ItemList<InvitationResponse>> {
        let invitations = self.state.stores.invitations.list().await?;
        Ok(invitations
            .into_iter()
            .map(InvitationResponse::from)
            .collect::<Vec<_>>()
            .into())
    }

    pub async fn delete(&self, id: &str, admin: &JwtClaims) -> AppResult<()> {
        let invitations = &self.state.stores.invitations;
        let invitation = invitations
            .get(id)
            .await?
            .ok_or_else(|| AppError::not_found("Invitation not found"))?;
        if !invitations.delete(id).await? {
            return Err(AppError::not_found("Invitation not found"));
        }

        self.audit.log_event(
            AuditEventParams::new(AuditEventType::InvitationDeleted, true)
                .email(&invitation.email)
                .user_id(&admin.sub)
                .details(id),
        );
        Ok(())
    }

    /// Issues a fresh token and a full new validity period. The old link
    /// stops working.
    pub async fn resend(&self, id: &str, admin: &JwtClaims) -> AppResult<InvitationResponse> {
        let invitations = &self.state.stores.invitations;
        let current = invitations
            .get(id)
            .await?
            .ok_or_else(|| AppError::not_found("Invitation not found"))?;
        let accepted = || AppError::validation("This invitation has already been accepted");
        if current.accepted {
            return Err(accepted());
        }

        let token = generate_link_token();
        let expires_at = Utc::now() + Duration::days(INVITATION_TTL_DAYS);
        let renewed = invitations
            .renew(id, &hash_token(&token), expires_at)
            .await?
            .ok_or_else(accepted)?;
        self.send(&renewed, &token, &admin.username)?;

        self.audit.log_event(
            AuditEventParams::new(AuditEventType::InvitationResent, true)
                .email(&renewed.email)
                .user_id(&admin.sub)
                .details(id),
        );

        Ok(renewed.into())
    }

    fn send(&self, invitation: &Invitation, token: &str, inviter: &str) -> AppResult<()> {
        let link = invitation_link(&self.state.config.frontend_url, &invitation.email, token)?;
        self.state.notifier.enqueue(Notification::Invitation {
            to: invitation.email.clone(),
            inviter: inviter.to_string(),
            link,
        });
        Ok(())
    }
}

/// Registration page prefilled with the invited address.
pub fn invitation_link(frontend_url: &str, email: &str, token: &str) -> AppResult<String> {
    let base = format!("{}/register", frontend_url.trim_end_matches('/'));
    let mut url = Url::parse(&base).context("Invalid frontend URL")?;
    url.query_pairs_mut()
        .append_pair("email", email)
        .append_pair("invitation_token", token);
    Ok(url.into())
}
