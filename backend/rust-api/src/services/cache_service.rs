use validator::Validate;

use crate::{
    error::{AppError, AppResult},
    models::{
        ai_cache::{CacheStats, HintCacheView, TtsCacheSummary, UpdateHintRequest},
        ItemList,
    },
    stores::Stores,
};

/// Admin view over the AI hint and speech caches.
pub struct CacheService<'a> {
    stores: &'a Stores,
}

impl<'a> CacheService<'a> {
    pub fn new(stores: &'a Stores) -> Self {
        Self { stores }
    }

    pub async fn stats(&self) -> AppResult<CacheStats> {
        Ok(self.stores.ai_cache.stats().await?)
    }

    pub async fn list_hints(&self) -> AppResult<ItemList<HintCacheView>> {
        let hints = self.stores.ai_cache.list_hints().await?;
        Ok(hints
            .into_iter()
            .map(HintCacheView::from)
            .collect::<Vec<_>>()
            .into())
    }

    pub async fn update_hint(&self, id: &str, req: UpdateHintRequest) -> AppResult<HintCacheView> {
        req.validate()?;
        self.stores
            .ai_cache
            .update_hint(id, req.hint.trim())
            .await?
            .map(HintCacheView::from)
            .ok_or_else(|| AppError::not_found("Cached hint not found"))
    }

    pub async fn delete_hint(&self, id: &str) -> AppResult<()> {
        if !self.stores.ai_cache.delete_hint(id).await? {
            return Err(AppError::not_found("Cached hint not found"));
        }
        Ok(())
    }

    pub async fn clear_hints(&self) -> AppResult<u64> {
        let removed = self.stores.ai_cache.clear_hints().await?;
        tracing::info!(removed, "Hint cache cleared");
        Ok(removed)
    }

    pub async fn list_tts(&self) -> AppResult<ItemList<TtsCacheSummary>> {
        Ok(self.stores.ai_cache.list_tts().await?.into())
    }

    pub async fn tts_audio(&self, id: &str) -> AppResult<Vec<u8>> {
        self.stores
            .ai_cache
            .get_tts(id)
            .await?
            .map(|entry| entry.audio_bytes().to_vec())
            .ok_or_else(|| AppError::not_found("Cached TTS not found"))
    }

    pub async fn delete_tts(&self, id: &str) -> AppResult<()> {
        if !self.stores.ai_cache.delete_tts(id).await? {
            return Err(AppError::not_found("Cached TTS not found"));
        }
        Ok(())
    }

    pub async fn clear_tts(&self) -> AppResult<u64> {
        let removed = self.stores.ai_cache.clear_tts().await?;
        tracing::info!(removed, "TTS cache cleared");
        Ok(removed)
    }
}
