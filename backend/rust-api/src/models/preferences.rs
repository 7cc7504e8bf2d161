use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

use super::bson_datetime_as_chrono;

/// Per-user quiz settings, "user_preferences" collection keyed by user id.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UserPreferences {
    #[serde(rename = "_id")]
    pub user_id: String,
    #[serde(default)]
    pub selected_tags: Vec<String>,
    #[serde(rename = "updatedAt", with = "bson_datetime_as_chrono")]
    pub updated_at: DateTime<Utc>,
}

impl UserPreferences {
    pub fn empty(user_id: &str) -> Self {
        Self {
            user_id: user_id.to_string(),
            selected_tags: Vec::new(),
            updated_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PreferencesResponse {
    pub selected_tags: Vec<String>,
}

impl From<UserPreferences> for PreferencesResponse {
    fn from(prefs: UserPreferences) -> Self {
        Self {
            selected_tags: prefs.selected_tags,
        }
    }
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdatePreferencesRequest {
    #[validate(length(max = 100, message = "At most 100 tags can be selected"))]
    pub selected_tags: Vec<String>,
}
