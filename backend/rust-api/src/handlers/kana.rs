use axum::{http::header, response::IntoResponse, Json};

use crate::{
    error::{AppError, AppResult},
    extractors::AppQuery,
    models::kana::{KanaListResponse, KanaScript, RandomKanaQuery, RandomKanaResponse},
    quiz::kana::{all_kana, random_kana, DEFAULT_KANA_COUNT, MAX_KANA_COUNT},
};

/// The table never changes between deploys.
const KANA_CACHE_CONTROL: &str = "public, max-age=86400";

/// GET /api/kana
pub async fn list() -> impl IntoResponse {
    let body = KanaListResponse {
        hiragana: all_kana(KanaScript::Hiragana),
        katakana: all_kana(KanaScript::Katakana),
    };
    ([(header::CACHE_CONTROL, KANA_CACHE_CONTROL)], Json(body))
}

/// GET /api/kana/random?type=hiragana|katakana|mixed&count=N
pub async fn random(
    AppQuery(query): AppQuery<RandomKanaQuery>,
) -> AppResult<Json<RandomKanaResponse>> {
    let count = query.count.unwrap_or(DEFAULT_KANA_COUNT);
    if !(1..=MAX_KANA_COUNT).contains(&count) {
        return Err(AppError::validation(format!(
            "count must be between 1 and {}",
            MAX_KANA_COUNT
        )));
    }

    let kana = random_kana(&mut rand::rng(), query.script, count);
    Ok(Json(RandomKanaResponse {
        count: kana.len(),
        kana,
    }))
}
