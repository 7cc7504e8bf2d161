use chrono::Utc;
use validator::Validate;

use crate::{
    error::AppResult,
    models::preferences::{PreferencesResponse, UpdatePreferencesRequest, UserPreferences},
    stores::Stores,
};

pub struct PreferencesService<'a> {
    stores: &'a Stores,
}

impl<'a> PreferencesService<'a> {
    pub fn new(stores: &'a Stores) -> Self {
        Self { stores }
    }

    pub async fn get(&self, user_id: &str) -> AppResult<PreferencesResponse> {
        let prefs = self
            .stores
            .preferences
            .get(user_id)
            .await?
            .unwrap_or_else(|| UserPreferences::empty(user_id));
        Ok(prefs.into())
    }

    /// Blank and duplicate tags are dropped, order is kept.
    pub async fn update(
        &self,
        user_id: &str,
        req: UpdatePreferencesRequest,
    ) -> AppResult<PreferencesResponse> {
        req.validate()?;

        let mut selected_tags: Vec<String> = Vec::with_capacity(req.selected_tags.len());
        for tag in req.selected_tags {
            let tag = tag.trim();
            if !tag.is_empty() && !selected_tags.iter().any(|existing| existing == tag) {
                selected_tags.push(tag.to_string());
            }
        }

        let prefs = UserPreferences {
            user_id: user_id.to_string(),
            selected_tags,
            updated_at: Utc::now(),
        };
        self.stores.preferences.upsert(&prefs).await?;

        Ok(prefs.into())
    }
}
