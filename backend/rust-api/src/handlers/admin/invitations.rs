use axum::{
    extract::{Path, State},
    http::StatusCode,
    Extension, Json,
};
use std::sync::Arc;

use crate::{
    error::AppResult,
    extractors::{AppJson, ClientIp},
    middlewares::auth::JwtClaims,
    models::{
        invitation::{CreateInvitationRequest, InvitationResponse},
        ItemList,
    },
    services::{invitation_service::InvitationService, AppState},
};

/// POST /api/admin/invitations
pub async fn create_invitation(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<JwtClaims>,
    ClientIp(ip): ClientIp,
    AppJson(req): AppJson<CreateInvitationRequest>,
) -> AppResult<(StatusCode, Json<InvitationResponse>)> {
    let invitation = InvitationService::new(&state, Some(ip))
        .create(req, &claims)
        .await?;
    Ok((StatusCode::CREATED, Json(invitation)))
}

/// GET /api/admin/invitations
pub async fn list_invitations(
    State(state): State<Arc<AppState>>,
) -> AppResult<Json<ItemList<InvitationResponse>>> {
    let invitations = InvitationService::new(&state, None).list().await?;
    Ok(Json(invitations))
}

/// DELETE /api/admin/invitations/{id}
pub async fn delete_invitation(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<JwtClaims>,
    ClientIp(ip): ClientIp,
    Path(invitation_id): Path<String>,
) -> AppResult<StatusCode> {
    InvitationService::new(&state, Some(ip))
        .delete(&invitation_id, &claims)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/admin/invitations/{id}/resend
pub async fn resend_invitation(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<JwtClaims>,
    ClientIp(ip): ClientIp,
    Path(invitation_id): Path<String>,
) -> AppResult<Json<InvitationResponse>> {
    let invitation = InvitationService::new(&state, Some(ip))
        .resend(&invitation_id, &claims)
        .await?;
    Ok(Json(invitation))
}
