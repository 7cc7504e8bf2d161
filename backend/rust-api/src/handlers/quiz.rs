use axum::{
    extract::State,
    http::header,
    response::{IntoResponse, Response},
    Json,
};
use std::sync::Arc;
use validator::Validate;

use crate::{
    error::AppResult,
    extractors::{AppJson, AppQuery},
    models::{
        quiz::{
            HintRequest, HintResponse, OptionsQuery, QuizAnswerRequest, QuizQuestion, QuizResult,
            RandomQuestionQuery, TtsRequest,
        },
        vocabulary::parse_tag_filter,
    },
    services::{hint_service::HintService, quiz_service::QuizService, AppState},
};

/// GET /api/quiz/random?tags=a,b
pub async fn random_question(
    State(state): State<Arc<AppState>>,
    AppQuery(query): AppQuery<RandomQuestionQuery>,
) -> AppResult<Json<QuizQuestion>> {
    let tags = parse_tag_filter(query.tags.as_deref());
    let question = QuizService::new(&state.stores).next_question(tags).await?;
    Ok(Json(question))
}

/// GET /api/quiz/options?exclude_id&mode&count
pub async fn options(
    State(state): State<Arc<AppState>>,
    AppQuery(query): AppQuery<OptionsQuery>,
) -> AppResult<Json<Vec<String>>> {
    let options = QuizService::new(&state.stores)
        .distractors(&query.exclude_id, query.mode, query.count)
        .await?;
    Ok(Json(options))
}

/// POST /api/quiz/check
pub async fn check(
    State(state): State<Arc<AppState>>,
    AppJson(req): AppJson<QuizAnswerRequest>,
) -> AppResult<Json<QuizResult>> {
    req.validate()?;
    let result = QuizService::new(&state.stores).check(req).await?;
    Ok(Json(result))
}

/// POST /api/quiz/hint
pub async fn hint(
    State(state): State<Arc<AppState>>,
    AppJson(req): AppJson<HintRequest>,
) -> AppResult<Json<HintResponse>> {
    let response = HintService::new(&state).hint(req).await?;
    Ok(Json(response))
}

/// POST /api/quiz/tts - MP3 audio
pub async fn tts(
    State(state): State<Arc<AppState>>,
    AppJson(req): AppJson<TtsRequest>,
) -> AppResult<Response> {
    let audio = HintService::new(&state).speech(req).await?;
    Ok(mp3_response(audio))
}

pub(crate) fn mp3_response(audio: Vec<u8>) -> Response {
    (
        [
            (header::CONTENT_TYPE, "audio/mpeg"),
            (header::CONTENT_DISPOSITION, "inline; filename=tts.mp3"),
        ],
        audio,
    )
        .into_response()
}
