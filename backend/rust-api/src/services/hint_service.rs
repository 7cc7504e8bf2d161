use validator::Validate;

use crate::{
    error::{AppError, AppResult},
    metrics::record_ai_request,
    models::{
        ai_cache::{HintCacheEntry, TtsCacheEntry},
        quiz::{HintRequest, HintResponse, TtsRequest},
    },
    services::AppState,
};

pub const HINTS_UNAVAILABLE: &str = "AI hints are not available. Please configure OPENAI_API_KEY.";
pub const TTS_UNAVAILABLE: &str = "TTS is not available. Please configure OPENAI_API_KEY.";

/// AI hints and speech, cached so each prompt is paid for once.
pub struct HintService<'a> {
    state: &'a AppState,
}

impl<'a> HintService<'a> {
    pub fn new(state: &'a AppState) -> Self {
        Self { state }
    }

    /// Provider failures come back as hint text and are not cached.
    pub async fn hint(&self, req: HintRequest) -> AppResult<HintResponse> {
        let stores = &self.state.stores;
        let vocab = stores
            .vocabulary
            .get(&req.vocabulary_id)
            .await?
            .ok_or_else(|| AppError::not_found("Vocabulary not found"))?;

        if let Some(cached) = stores.ai_cache.find_hint(&vocab.id, req.mode).await? {
            record_ai_request("hint", "cache_hit");
            return Ok(HintResponse {
                hint: cached.hint,
                available: true,
            });
        }

        let Some(ai) = &self.state.ai else {
            return Ok(HintResponse {
                hint: HINTS_UNAVAILABLE.to_string(),
                available: false,
            });
        };

        match ai.generate_hint(&vocab, req.mode).await {
            Ok(hint) => {
                record_ai_request("hint", "generated");
                stores
                    .ai_cache
                    .save_hint(&HintCacheEntry::new(&vocab.id, req.mode, hint.clone()))
                    .await?;
                Ok(HintResponse {
                    hint,
                    available: true,
                })
            }
            Err(e) => {
                tracing::error!(vocabulary_id = %vocab.id, "Hint generation failed: {:#}", e);
                record_ai_request("hint", "error");
                Ok(HintResponse {
                    hint: format!("Could not generate hint: {}", e),
                    available: true,
                })
            }
        }
    }

    /// MP3 bytes for `req.text`.
    pub async fn speech(&self, req: TtsRequest) -> AppResult<Vec<u8>> {
        req.validate()?;
        let cache = &self.state.stores.ai_cache;

        if let Some(cached) = cache.find_tts(&req.text).await? {
            record_ai_request("tts", "cache_hit");
            return Ok(cached.audio_bytes().to_vec());
        }

        let ai = self
            .state
            .ai
            .as_ref()
            .ok_or_else(|| AppError::Unavailable(TTS_UNAVAILABLE.to_string()))?;

        let audio = ai.synthesize_speech(&req.text).await.map_err(|e| {
            record_ai_request("tts", "error");
            AppError::Internal(e.context("Failed to generate audio"))
        })?;
        record_ai_request("tts", "generated");

        cache.save_tts(&TtsCacheEntry::new(&req.text, audio.clone())).await?;
        Ok(audio)
    }
}
