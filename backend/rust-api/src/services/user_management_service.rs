use crate::{
    error::{AppError, AppResult},
    models::{user::UserProfile, ItemList},
    services::{
        audit_service::{AuditEventParams, AuditEventType, AuditService},
        auth_service::AuthService,
        AppState,
    },
};

pub struct UserManagementService<'a> {
    state: &'a AppState,
    audit: AuditService,
}

impl<'a> UserManagementService<'a> {
    pub fn new(state: &'a AppState, client_ip: Option<String>) -> Self {
        Self {
            state,
            audit: AuditService::new(client_ip),
        }
    }

    /// Newest accounts first.
    pub async fn list_users(&self) -> AppResult<ItemList<UserProfile>> {
        let users = self.state.stores.users.list().await?;
        Ok(users
            .into_iter()
            .map(UserProfile::from)
            .collect::<Vec<_>>()
            .into())
    }

    /// Removes the account with its codes, tokens, scores, preferences and
    /// the invitations it sent.
    pub async fn delete_user(&self, user_id: &str, admin_id: &str) -> AppResult<()> {
        if user_id == admin_id {
            return Err(AppError::validation("You cannot delete your own account"));
        }

        let users = &self.state.stores.users;
        let user = users
            .get(user_id)
            .await?
            .ok_or_else(|| AppError::not_found("User not found"))?;

        if !users.delete(&user.id).await? {
            return Err(AppError::not_found("User not found"));
        }

        self.audit.log_event(
            AuditEventParams::new(AuditEventType::UserDeleted, true)
                .email(&user.email)
                .user_id(&user.id)
                .details(&format!("deleted by {}", admin_id)),
        );
        Ok(())
    }

    pub async fn resend_verification(&self, user_id: &str) -> AppResult<UserProfile> {
        let user = self
            .state
            .stores
            .users
            .get(user_id)
            .await?
            .ok_or_else(|| AppError::not_found("User not found"))?;

        if user.is_email_verified {
            return Err(AppError::validation("User is already verified"));
        }

        AuthService::new(self.state, None)
            .send_verification_link(&user)
            .await?;
        tracing::info!(user_id = %user.id, "Verification email resent by admin");

        Ok(user.into())
    }
}
