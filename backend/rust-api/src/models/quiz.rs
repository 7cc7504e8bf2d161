use serde::{Deserialize, Serialize};
use validator::Validate;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuizMode {
    ToJapanese,
    ToEnglish,
    FillInBlank,
}

impl QuizMode {
    pub const ALL: [QuizMode; 3] = [
        QuizMode::ToJapanese,
        QuizMode::ToEnglish,
        QuizMode::FillInBlank,
    ];

    /// Modes that work for any reading length.
    pub const DIRECT: [QuizMode; 2] = [QuizMode::ToJapanese, QuizMode::ToEnglish];

    pub fn as_str(&self) -> &'static str {
        match self {
            QuizMode::ToJapanese => "to_japanese",
            QuizMode::ToEnglish => "to_english",
            QuizMode::FillInBlank => "fill_in_blank",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuestionType {
    Text,
    MultipleChoice,
}

impl QuestionType {
    pub const ALL: [QuestionType; 2] = [QuestionType::Text, QuestionType::MultipleChoice];
}

/// Question payload generated per request; never persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuizQuestion {
    pub vocabulary_id: String,
    pub question: String,
    pub mode: QuizMode,
    pub question_type: QuestionType,
    pub options: Option<Vec<String>>,
    pub display_text: Option<String>,
    pub gap_indices: Option<Vec<usize>>,
    pub gap_count: Option<usize>,
    pub tts_text: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RandomQuestionQuery {
    pub tags: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct QuizAnswerRequest {
    pub vocabulary_id: String,
    #[validate(length(max = 500, message = "Answer must be at most 500 characters"))]
    pub answer: String,
    pub mode: QuizMode,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QuizResult {
    pub correct: bool,
    pub correct_answer: String,
    pub user_answer: String,
    pub normalized_answer: String,
}

#[derive(Debug, Deserialize)]
pub struct OptionsQuery {
    pub exclude_id: String,
    pub mode: QuizMode,
    pub count: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct HintRequest {
    pub vocabulary_id: String,
    pub mode: QuizMode,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HintResponse {
    pub hint: String,
    pub available: bool,
}

#[derive(Debug, Deserialize, Validate)]
pub struct TtsRequest {
    #[validate(length(min = 1, max = 500, message = "Text must be 1-500 characters"))]
    pub text: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mode_uses_snake_case_on_the_wire() {
        let json = serde_json::to_string(&QuizMode::FillInBlank).unwrap();
        assert_eq!(json, "\"fill_in_blank\"");
        let mode: QuizMode = serde_json::from_str("\"to_english\"").unwrap();
        assert_eq!(mode, QuizMode::ToEnglish);
        assert_eq!(QuizMode::ToJapanese.as_str(), "to_japanese");
    }
}
