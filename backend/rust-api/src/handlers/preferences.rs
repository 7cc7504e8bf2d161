use axum::{extract::State, Extension, Json};
use std::sync::Arc;

use crate::{
    error::AppResult,
    extractors::AppJson,
    middlewares::auth::JwtClaims,
    models::preferences::{PreferencesResponse, UpdatePreferencesRequest},
    services::{preferences_service::PreferencesService, AppState},
};

/// GET /api/user/preferences
pub async fn get_preferences(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<JwtClaims>,
) -> AppResult<Json<PreferencesResponse>> {
    let prefs = PreferencesService::new(&state.stores)
        .get(&claims.sub)
        .await?;
    Ok(Json(prefs))
}

/// PUT /api/user/preferences
pub async fn update_preferences(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<JwtClaims>,
    AppJson(req): AppJson<UpdatePreferencesRequest>,
) -> AppResult<Json<PreferencesResponse>> {
    let prefs = PreferencesService::new(&state.stores)
        .update(&claims.sub, req)
        .await?;
    Ok(Json(prefs))
}
