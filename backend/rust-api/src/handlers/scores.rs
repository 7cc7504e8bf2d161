use axum::{extract::State, Extension, Json};
use std::sync::Arc;

use crate::{
    error::AppResult,
    extractors::{AppJson, AppQuery},
    middlewares::auth::JwtClaims,
    models::score::{
        GameScores, ScoreHistoryQuery, ScoreHistoryResponse, ScoreResponse, ScoreUpdateRequest,
    },
    services::{score_service::ScoreService, AppState},
};

/// POST /api/scores/update
pub async fn update(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<JwtClaims>,
    AppJson(req): AppJson<ScoreUpdateRequest>,
) -> AppResult<Json<ScoreResponse>> {
    let record = ScoreService::new(&state.stores)
        .update(&claims.sub, req)
        .await?;
    Ok(Json(record))
}

/// GET /api/scores/today
pub async fn today(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<JwtClaims>,
) -> AppResult<Json<GameScores>> {
    let scores = ScoreService::new(&state.stores).today(&claims.sub).await?;
    Ok(Json(scores))
}

/// GET /api/scores/me
pub async fn history(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<JwtClaims>,
    AppQuery(query): AppQuery<ScoreHistoryQuery>,
) -> AppResult<Json<ScoreHistoryResponse>> {
    let history = ScoreService::new(&state.stores)
        .history(&claims.sub, query)
        .await?;
    Ok(Json(history))
}

/// GET /api/scores/best
pub async fn best(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<JwtClaims>,
) -> AppResult<Json<GameScores>> {
    let scores = ScoreService::new(&state.stores).best(&claims.sub).await?;
    Ok(Json(scores))
}
