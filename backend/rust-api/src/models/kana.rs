use serde::{Deserialize, Serialize};

/// One syllable for the kana salad game.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct KanaItem {
    pub romaji: &'static str,
    pub kana: &'static str,
}

#[derive(Debug, Serialize)]
pub struct KanaListResponse {
    pub hiragana: Vec<KanaItem>,
    pub katakana: Vec<KanaItem>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KanaScript {
    #[default]
    Hiragana,
    Katakana,
    /// Each syllable drawn from either script, romaji never repeated.
    Mixed,
}

#[derive(Debug, Deserialize)]
pub struct RandomKanaQuery {
    #[serde(default, rename = "type")]
    pub script: KanaScript,
    pub count: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct RandomKanaResponse {
    pub kana: Vec<KanaItem>,
    pub count: usize,
}
