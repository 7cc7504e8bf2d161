use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Response,
    Json,
};
use std::sync::Arc;

use crate::{
    error::AppResult,
    extractors::AppJson,
    handlers::quiz::mp3_response,
    models::{
        ai_cache::{CacheStats, HintCacheView, TtsCacheSummary, UpdateHintRequest},
        ItemList,
    },
    services::{cache_service::CacheService, AppState},
};

/// GET /api/admin/cache/stats
pub async fn cache_stats(State(state): State<Arc<AppState>>) -> AppResult<Json<CacheStats>> {
    Ok(Json(CacheService::new(&state.stores).stats().await?))
}

/// GET /api/admin/cache/hints
pub async fn list_hints(
    State(state): State<Arc<AppState>>,
) -> AppResult<Json<ItemList<HintCacheView>>> {
    Ok(Json(CacheService::new(&state.stores).list_hints().await?))
}

/// PUT /api/admin/cache/hints/{id}
pub async fn update_hint(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    AppJson(req): AppJson<UpdateHintRequest>,
) -> AppResult<Json<HintCacheView>> {
    let hint = CacheService::new(&state.stores).update_hint(&id, req).await?;
    Ok(Json(hint))
}

/// DELETE /api/admin/cache/hints/{id}
pub async fn delete_hint(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> AppResult<StatusCode> {
    CacheService::new(&state.stores).delete_hint(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// DELETE /api/admin/cache/hints
pub async fn clear_hints(State(state): State<Arc<AppState>>) -> AppResult<StatusCode> {
    CacheService::new(&state.stores).clear_hints().await?;
    Ok(StatusCode::NO_CONTENT)
}

/// GET /api/admin/cache/tts
pub async fn list_tts(
    State(state): State<Arc<AppState>>,
) -> AppResult<Json<ItemList<TtsCacheSummary>>> {
    Ok(Json(CacheService::new(&state.stores).list_tts().await?))
}

/// GET /api/admin/cache/tts/{id}/audio
pub async fn tts_audio(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> AppResult<Response> {
    let audio = CacheService::new(&state.stores).tts_audio(&id).await?;
    Ok(mp3_response(audio))
}

/// DELETE /api/admin/cache/tts/{id}
pub async fn delete_tts(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> AppResult<StatusCode> {
    CacheService::new(&state.stores).delete_tts(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// DELETE /api/admin/cache/tts
pub async fn clear_tts(State(state): State<Arc<AppState>>) -> AppResult<StatusCode> {
    CacheService::new(&state.stores).clear_tts().await?;
    Ok(StatusCode::NO_CONTENT)
}
