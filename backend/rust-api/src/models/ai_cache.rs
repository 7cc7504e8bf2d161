use chrono::{DateTime, Utc};
use mongodb::bson::{spec::BinarySubtype, Binary};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use super::bson_datetime_as_chrono;
use crate::models::quiz::QuizMode;

/// Generated hint, "hint_cache" collection. Unique per (vocabulary, mode).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HintCacheEntry {
    #[serde(rename = "_id")]
    pub id: String,
    pub vocabulary_id: String,
    pub mode: QuizMode,
    pub hint: String,
    #[serde(rename = "createdAt", with = "bson_datetime_as_chrono")]
    pub created_at: DateTime<Utc>,
}

impl HintCacheEntry {
    pub fn new(vocabulary_id: &str, mode: QuizMode, hint: String) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            vocabulary_id: vocabulary_id.to_string(),
            mode,
            hint,
            created_at: Utc::now(),
        }
    }
}

/// Synthesized speech, "tts_cache" collection. Unique per text.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TtsCacheEntry {
    #[serde(rename = "_id")]
    pub id: String,
    pub text: String,
    pub audio: Binary,
    #[serde(rename = "createdAt", with = "bson_datetime_as_chrono")]
    pub created_at: DateTime<Utc>,
}

impl TtsCacheEntry {
    pub fn new(text: &str, audio: Vec<u8>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            text: text.to_string(),
            audio: Binary {
                subtype: BinarySubtype::Generic,
                bytes: audio,
            },
            created_at: Utc::now(),
        }
    }

    pub fn audio_bytes(&self) -> &[u8] {
        &self.audio.bytes
    }
}

/// Admin view of a TTS entry without the audio payload
#[derive(Debug, Clone, Serialize)]
pub struct TtsCacheSummary {
    pub id: String,
    pub text: String,
    pub size_bytes: usize,
    pub created_at: DateTime<Utc>,
}

impl From<&TtsCacheEntry> for TtsCacheSummary {
    fn from(entry: &TtsCacheEntry) -> Self {
        Self {
            id: entry.id.clone(),
            text: entry.text.clone(),
            size_bytes: entry.audio.bytes.len(),
            created_at: entry.created_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct HintCacheView {
    pub id: String,
    pub vocabulary_id: String,
    pub mode: QuizMode,
    pub hint: String,
    pub created_at: DateTime<Utc>,
}

impl From<HintCacheEntry> for HintCacheView {
    fn from(entry: HintCacheEntry) -> Self {
        Self {
            id: entry.id,
            vocabulary_id: entry.vocabulary_id,
            mode: entry.mode,
            hint: entry.hint,
            created_at: entry.created_at,
        }
    }
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateHintRequest {
    #[validate(length(min = 1, max = 2000, message = "Hint must be 1-2000 characters"))]
    pub hint: String,
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct CacheStats {
    pub hint_count: u64,
    pub tts_count: u64,
    pub tts_total_bytes: u64,
}
