use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

use super::bson_datetime_as_chrono;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GameType {
    Quiz,
    Salad,
    Lines,
    Memory,
}

impl GameType {
    pub const ALL: [GameType; 4] = [
        GameType::Quiz,
        GameType::Salad,
        GameType::Lines,
        GameType::Memory,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            GameType::Quiz => "quiz",
            GameType::Salad => "salad",
            GameType::Lines => "lines",
            GameType::Memory => "memory",
        }
    }
}

/// Daily high score, "scores" collection.
///
/// The document id is derived from (user, game, day) so there is never more
/// than one record per triple.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScoreRecord {
    #[serde(rename = "_id")]
    pub id: String,
    pub user_id: String,
    pub game_type: GameType,
    pub date: NaiveDate,
    pub score: i64,
    #[serde(rename = "updatedAt", with = "bson_datetime_as_chrono")]
    pub updated_at: DateTime<Utc>,
}

impl ScoreRecord {
    pub fn record_id(user_id: &str, game_type: GameType, date: NaiveDate) -> String {
        format!("{}:{}:{}", user_id, game_type.as_str(), date)
    }

    pub fn new(user_id: &str, game_type: GameType, date: NaiveDate, score: i64) -> Self {
        Self {
            id: Self::record_id(user_id, game_type, date),
            user_id: user_id.to_string(),
            game_type,
            date,
            score,
            updated_at: Utc::now(),
        }
    }
}

#[derive(Debug, Deserialize, Validate)]
pub struct ScoreUpdateRequest {
    pub game_type: GameType,
    #[validate(range(min = 0, message = "Score must be non-negative"))]
    pub score: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoreResponse {
    pub id: String,
    pub game_type: GameType,
    pub date: NaiveDate,
    pub score: i64,
    pub updated_at: DateTime<Utc>,
}

impl From<ScoreRecord> for ScoreResponse {
    fn from(record: ScoreRecord) -> Self {
        Self {
            id: record.id,
            game_type: record.game_type,
            date: record.date,
            score: record.score,
            updated_at: record.updated_at,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ScoreHistoryQuery {
    pub game_type: Option<GameType>,
    pub limit: Option<i64>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ScoreHistoryResponse {
    pub scores: Vec<ScoreResponse>,
}

/// One number per game, zero when nothing was recorded.
#[derive(Debug, Default, Clone, Serialize, Deserialize, PartialEq)]
pub struct GameScores {
    pub quiz: i64,
    pub salad: i64,
    pub lines: i64,
    pub memory: i64,
}

impl GameScores {
    pub fn set(&mut self, game_type: GameType, score: i64) {
        let slot = match game_type {
            GameType::Quiz => &mut self.quiz,
            GameType::Salad => &mut self.salad,
            GameType::Lines => &mut self.lines,
            GameType::Memory => &mut self.memory,
        };
        *slot = (*slot).max(score);
    }
}

impl FromIterator<(GameType, i64)> for GameScores {
    fn from_iter<I: IntoIterator<Item = (GameType, i64)>>(iter: I) -> Self {
        let mut scores = GameScores::default();
        for (game_type, score) in iter {
            scores.set(game_type, score);
        }
        scores
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_id_is_deterministic() {
        let date = NaiveDate::from_ymd_opt(2024, 5, 1).unwrap();
        assert_eq!(
            ScoreRecord::record_id("u1", GameType::Lines, date),
            "u1:lines:2024-05-01"
        );
    }

    #[test]
    fn game_scores_keep_maximum() {
        let scores: GameScores = [(GameType::Quiz, 5), (GameType::Quiz, 3), (GameType::Memory, 9)]
            .into_iter()
            .collect();
        assert_eq!(scores.quiz, 5);
        assert_eq!(scores.memory, 9);
        assert_eq!(scores.salad, 0);
    }

    #[test]
    fn negative_score_fails_validation() {
        let req = ScoreUpdateRequest {
            game_type: GameType::Salad,
            score: -1,
        };
        assert!(req.validate().is_err());
    }
}
