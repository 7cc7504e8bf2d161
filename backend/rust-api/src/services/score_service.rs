use chrono::Utc;
use validator::Validate;

use crate::{
    error::{AppError, AppResult},
    models::score::{
        GameScores, ScoreHistoryQuery, ScoreHistoryResponse, ScoreResponse, ScoreUpdateRequest,
    },
    stores::Stores,
};

const DEFAULT_HISTORY_LIMIT: i64 = 30;
const MAX_HISTORY_LIMIT: i64 = 100;

pub struct ScoreService<'a> {
    stores: &'a Stores,
}

impl<'a> ScoreService<'a> {
    pub fn new(stores: &'a Stores) -> Self {
        Self { stores }
    }

    /// Keeps the best score of the current UTC day.
    pub async fn update(&self, user_id: &str, req: ScoreUpdateRequest) -> AppResult<ScoreResponse> {
        req.validate()?;
        let today = Utc::now().date_naive();

        let record = self
            .stores
            .scores
            .record_high_score(user_id, req.game_type, today, req.score)
            .await?;

        tracing::debug!(
            user_id,
            game_type = req.game_type.as_str(),
            submitted = req.score,
            stored = record.score,
            "Score recorded"
        );

        Ok(record.into())
    }

    pub async fn today(&self, user_id: &str) -> AppResult<GameScores> {
        let today = Utc::now().date_naive();
        let records = self.stores.scores.for_day(user_id, today).await?;
        Ok(records
            .into_iter()
            .map(|record| (record.game_type, record.score))
            .collect())
    }

    pub async fn history(
        &self,
        user_id: &str,
        query: ScoreHistoryQuery,
    ) -> AppResult<ScoreHistoryResponse> {
        let limit = query.limit.unwrap_or(DEFAULT_HISTORY_LIMIT);
        if !(1..=MAX_HISTORY_LIMIT).contains(&limit) {
            return Err(AppError::validation(format!(
                "limit must be between 1 and {}",
                MAX_HISTORY_LIMIT
            )));
        }

        let records = self
            .stores
            .scores
            .history(user_id, query.game_type, limit)
            .await?;

        Ok(ScoreHistoryResponse {
            scores: records.into_iter().map(ScoreResponse::from).collect(),
        })
    }

    pub async fn best(&self, user_id: &str) -> AppResult<GameScores> {
        let best = self.stores.scores.best(user_id).await?;
        Ok(best.into_iter().collect())
    }
}
