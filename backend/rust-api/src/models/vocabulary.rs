use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use super::bson_datetime_as_chrono;

/// Vocabulary entry stored in the "vocabulary" collection
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Vocabulary {
    #[serde(rename = "_id")]
    pub id: String,
    pub expression: String,
    pub reading: String,
    /// Comma separated synonyms, e.g. "to eat, eat"
    pub meaning: String,
    #[serde(default)]
    pub tags: String,
    #[serde(rename = "createdAt", with = "bson_datetime_as_chrono")]
    pub created_at: DateTime<Utc>,
    #[serde(rename = "updatedAt", with = "bson_datetime_as_chrono")]
    pub updated_at: DateTime<Utc>,
}

impl Vocabulary {
    pub fn new(
        expression: impl Into<String>,
        reading: impl Into<String>,
        meaning: impl Into<String>,
        tags: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            expression: expression.into(),
            reading: reading.into(),
            meaning: meaning.into(),
            tags: tags.into(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Length of the reading in characters (not bytes).
    pub fn reading_len(&self) -> usize {
        self.reading.chars().count()
    }

    /// First comma segment of the meaning, trimmed.
    pub fn primary_meaning(&self) -> &str {
        self.meaning.split(',').next().unwrap_or_default().trim()
    }

    pub fn tag_list(&self) -> impl Iterator<Item = &str> {
        self.tags.split_whitespace()
    }

    /// Case-insensitive substring match of every requested tag.
    pub fn has_all_tags(&self, tags: &[String]) -> bool {
        let haystack = self.tags.to_lowercase();
        tags.iter().all(|tag| haystack.contains(&tag.to_lowercase()))
    }
}

/// Splits a `tags=a,b` query value into trimmed, non-empty tags.
pub fn parse_tag_filter(raw: Option<&str>) -> Vec<String> {
    raw.map(|value| {
        value
            .split(',')
            .map(str::trim)
            .filter(|tag| !tag.is_empty())
            .map(str::to_string)
            .collect()
    })
    .unwrap_or_default()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VocabularyResponse {
    pub id: String,
    pub expression: String,
    pub reading: String,
    pub meaning: String,
    pub tags: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Vocabulary> for VocabularyResponse {
    fn from(vocab: Vocabulary) -> Self {
        Self {
            id: vocab.id,
            expression: vocab.expression,
            reading: vocab.reading,
            meaning: vocab.meaning,
            tags: vocab.tags,
            created_at: vocab.created_at,
            updated_at: vocab.updated_at,
        }
    }
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateVocabularyRequest {
    #[validate(length(min = 1, max = 255, message = "Expression must be 1-255 characters"))]
    pub expression: String,

    #[validate(length(min = 1, max = 255, message = "Reading must be 1-255 characters"))]
    pub reading: String,

    #[validate(length(min = 1, max = 1000, message = "Meaning must be 1-1000 characters"))]
    pub meaning: String,

    #[validate(length(max = 500, message = "Tags must be at most 500 characters"))]
    pub tags: Option<String>,
}

/// Partial update: absent fields keep their current value
#[derive(Debug, Deserialize, Validate)]
pub struct UpdateVocabularyRequest {
    #[validate(length(min = 1, max = 255, message = "Expression must be 1-255 characters"))]
    pub expression: Option<String>,

    #[validate(length(min = 1, max = 255, message = "Reading must be 1-255 characters"))]
    pub reading: Option<String>,

    #[validate(length(min = 1, max = 1000, message = "Meaning must be 1-1000 characters"))]
    pub meaning: Option<String>,

    #[validate(length(max = 500, message = "Tags must be at most 500 characters"))]
    pub tags: Option<String>,
}

impl UpdateVocabularyRequest {
    pub fn apply(self, vocab: &mut Vocabulary) {
        if let Some(expression) = self.expression {
            vocab.expression = expression;
        }
        if let Some(reading) = self.reading {
            vocab.reading = reading;
        }
        if let Some(meaning) = self.meaning {
            vocab.meaning = meaning;
        }
        if let Some(tags) = self.tags {
            vocab.tags = tags;
        }
        vocab.updated_at = Utc::now();
    }
}

#[derive(Debug, Deserialize)]
pub struct ListVocabularyQuery {
    pub page: Option<u64>,
    pub page_size: Option<u64>,
    pub search: Option<String>,
    pub tags: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct VocabularyListResponse {
    pub items: Vec<VocabularyResponse>,
    pub total: u64,
    pub page: u64,
    pub page_size: u64,
    pub total_pages: u64,
}

#[derive(Debug, Deserialize)]
pub struct RandomVocabularyQuery {
    pub count: Option<usize>,
    pub tags: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn primary_meaning_is_first_segment() {
        let vocab = Vocabulary::new("食べる", "たべる", " to eat , eat", "verb");
        assert_eq!(vocab.primary_meaning(), "to eat");
    }

    #[test]
    fn reading_len_counts_characters() {
        let vocab = Vocabulary::new("食べる", "たべる", "to eat", "");
        assert_eq!(vocab.reading_len(), 3);
    }

    #[test]
    fn tag_match_is_case_insensitive_substring() {
        let vocab = Vocabulary::new("猫", "ねこ", "cat", "JLPT-N5 animals");
        assert!(vocab.has_all_tags(&["n5".to_string(), "ANIMAL".to_string()]));
        assert!(!vocab.has_all_tags(&["n4".to_string()]));
        assert!(vocab.has_all_tags(&[]));
    }

    #[test]
    fn tag_filter_skips_blank_items() {
        assert_eq!(
            parse_tag_filter(Some(" n5, ,verbs ")),
            vec!["n5".to_string(), "verbs".to_string()]
        );
        assert!(parse_tag_filter(None).is_empty());
    }
}
