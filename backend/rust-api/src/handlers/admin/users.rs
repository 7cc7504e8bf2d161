use axum::{
    extract::{Path, State},
    http::StatusCode,
    Extension, Json,
};
use std::sync::Arc;

use crate::{
    error::AppResult,
    extractors::ClientIp,
    middlewares::auth::JwtClaims,
    models::{user::UserProfile, ItemList},
    services::{user_management_service::UserManagementService, AppState},
};

/// GET /api/admin/users
pub async fn list_users(
    State(state): State<Arc<AppState>>,
) -> AppResult<Json<ItemList<UserProfile>>> {
    let users = UserManagementService::new(&state, None).list_users().await?;
    Ok(Json(users))
}

/// DELETE /api/admin/users/{id}
pub async fn delete_user(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<JwtClaims>,
    ClientIp(ip): ClientIp,
    Path(user_id): Path<String>,
) -> AppResult<StatusCode> {
    tracing::info!(admin_id = %claims.sub, %user_id, "Deleting user");
    UserManagementService::new(&state, Some(ip))
        .delete_user(&user_id, &claims.sub)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/admin/users/{id}/resend-verification
pub async fn resend_user_verification(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<String>,
) -> AppResult<Json<UserProfile>> {
    let user = UserManagementService::new(&state, None)
        .resend_verification(&user_id)
        .await?;
    Ok(Json(user))
}
