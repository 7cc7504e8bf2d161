use axum::{
    extract::{Path, State},
    http::{header, StatusCode},
    response::IntoResponse,
    Extension, Json,
};
use std::sync::Arc;

use crate::{
    error::AppResult,
    extractors::{AppJson, AppQuery, ClientIp},
    middlewares::auth::JwtClaims,
    models::vocabulary::{
        CreateVocabularyRequest, ListVocabularyQuery, RandomVocabularyQuery,
        UpdateVocabularyRequest, VocabularyListResponse, VocabularyResponse,
    },
    services::{audit_service::AuditService, vocabulary_service::VocabularyService, AppState},
};

const TAGS_CACHE_CONTROL: &str = "public, max-age=300";

/// GET /api/vocabulary
pub async fn list(
    State(state): State<Arc<AppState>>,
    AppQuery(query): AppQuery<ListVocabularyQuery>,
) -> AppResult<Json<VocabularyListResponse>> {
    let page = VocabularyService::new(&state.stores).list(query).await?;
    Ok(Json(page))
}

/// GET /api/vocabulary/tags
pub async fn tags(State(state): State<Arc<AppState>>) -> AppResult<impl IntoResponse> {
    let tags = VocabularyService::new(&state.stores).tags().await?;
    Ok(([(header::CACHE_CONTROL, TAGS_CACHE_CONTROL)], Json(tags)))
}

/// GET /api/vocabulary/random
pub async fn random(
    State(state): State<Arc<AppState>>,
    AppQuery(query): AppQuery<RandomVocabularyQuery>,
) -> AppResult<Json<Vec<VocabularyResponse>>> {
    let items = VocabularyService::new(&state.stores).random(query).await?;
    Ok(Json(items))
}

/// GET /api/vocabulary/{id}
pub async fn get(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> AppResult<Json<VocabularyResponse>> {
    let vocab = VocabularyService::new(&state.stores).get(&id).await?;
    Ok(Json(vocab))
}

/// POST /api/vocabulary (admin)
pub async fn create(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<JwtClaims>,
    ClientIp(ip): ClientIp,
    AppJson(req): AppJson<CreateVocabularyRequest>,
) -> AppResult<impl IntoResponse> {
    let audit = AuditService::new(Some(ip));
    let vocab = VocabularyService::new(&state.stores)
        .create(req, &audit, &claims.sub)
        .await?;
    Ok((StatusCode::CREATED, Json(vocab)))
}

/// PUT /api/vocabulary/{id} (admin)
pub async fn update(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<JwtClaims>,
    ClientIp(ip): ClientIp,
    Path(id): Path<String>,
    AppJson(req): AppJson<UpdateVocabularyRequest>,
) -> AppResult<Json<VocabularyResponse>> {
    let audit = AuditService::new(Some(ip));
    let vocab = VocabularyService::new(&state.stores)
        .update(&id, req, &audit, &claims.sub)
        .await?;
    Ok(Json(vocab))
}

/// DELETE /api/vocabulary/{id} (admin)
pub async fn delete(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<JwtClaims>,
    ClientIp(ip): ClientIp,
    Path(id): Path<String>,
) -> AppResult<StatusCode> {
    let audit = AuditService::new(Some(ip));
    VocabularyService::new(&state.stores)
        .delete(&id, &audit, &claims.sub)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}
