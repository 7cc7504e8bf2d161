use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;

use crate::models::{quiz::QuizMode, vocabulary::Vocabulary};

const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
const HINT_MODEL: &str = "gpt-4o-mini";
const TTS_MODEL: &str = "tts-1";
const TTS_VOICE: &str = "nova";
const SYSTEM_PROMPT: &str =
    "You are a concise Japanese language tutor. Keep hints short and helpful.";

/// Text generation and speech synthesis backend for quiz hints.
#[async_trait]
pub trait AiProvider: Send + Sync {
    async fn generate_hint(&self, vocab: &Vocabulary, mode: QuizMode) -> Result<String>;
    /// MP3 audio for `text`.
    async fn synthesize_speech(&self, text: &str) -> Result<Vec<u8>>;
}

pub struct OpenAiClient {
    http_client: Client,
    api_key: String,
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    content: Option<String>,
}

impl OpenAiClient {
    pub fn new(api_key: impl Into<String>) -> Result<Self> {
        let http_client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .context("Failed to build OpenAI HTTP client")?;

        Ok(Self {
            http_client,
            api_key: api_key.into(),
            base_url: OPENAI_BASE_URL.to_string(),
        })
    }

    async fn post_json(&self, path: &str, body: &serde_json::Value) -> Result<reqwest::Response> {
        let url = format!("{}{}", self.base_url, path);
        let response = self
            .http_client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(body)
            .send()
            .await
            .with_context(|| format!("Failed to call OpenAI {}", path))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(anyhow!("OpenAI returned error {}: {}", status, error_text));
        }

        Ok(response)
    }
}

/// Writing-focused prompt for to_japanese, meaning-focused otherwise.
pub fn hint_prompt(vocab: &Vocabulary, mode: QuizMode) -> String {
    match mode {
        QuizMode::ToJapanese => format!(
            "You are a helpful Japanese language learning assistant.\n\
             The student needs to type \"{meaning}\" in Japanese hiragana.\n\
             The correct answer is: {reading} (kanji: {expression})\n\n\
             Give a SHORT hint (max 2 sentences) to help them TYPE the word correctly in hiragana.\n\
             Focus on HOW TO WRITE/SPELL it, not just the meaning. You can:\n\
             - Tell them the first 1-2 syllables\n\
             - Tell them how many syllables/characters it has\n\
             - Give a phonetic clue\n\
             - Mention if it contains common patterns like っ (small tsu) or ん\n\n\
             Do NOT reveal the full answer. Respond in English only.",
            meaning = vocab.meaning,
            reading = vocab.reading,
            expression = vocab.expression,
        ),
        QuizMode::ToEnglish | QuizMode::FillInBlank => format!(
            "You are a helpful Japanese language learning assistant.\n\
             The student sees the Japanese word: {expression} ({reading})\n\
             They need to translate it to English. The correct meaning is: {meaning}\n\n\
             Give a SHORT, helpful hint (max 2 sentences) to help them remember or guess the English meaning.\n\
             Do NOT reveal the exact answer. You can:\n\
             - Describe a situation where this word is used\n\
             - Give a related word or category\n\
             - Mention what type of word it is (verb, noun, adjective)\n\
             - Give a contextual clue\n\n\
             Respond in English only.",
            expression = vocab.expression,
            reading = vocab.reading,
            meaning = vocab.meaning,
        ),
    }
}

#[async_trait]
impl AiProvider for OpenAiClient {
    async fn generate_hint(&self, vocab: &Vocabulary, mode: QuizMode) -> Result<String> {
        let body = serde_json::json!({
            "model": HINT_MODEL,
            "messages": [
                { "role": "system", "content": SYSTEM_PROMPT },
                { "role": "user", "content": hint_prompt(vocab, mode) }
            ],
            "max_tokens": 100,
            "temperature": 0.7
        });

        let completion: ChatCompletionResponse = self
            .post_json("/chat/completions", &body)
            .await?
            .json()
            .await
            .context("Failed to parse chat completion response")?;

        completion
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .map(|content| content.trim().to_string())
            .filter(|content| !content.is_empty())
            .ok_or_else(|| anyhow!("Empty chat completion"))
    }

    async fn synthesize_speech(&self, text: &str) -> Result<Vec<u8>> {
        // Short words get clipped at the start of the clip without a lead-in.
        let body = serde_json::json!({
            "model": TTS_MODEL,
            "voice": TTS_VOICE,
            "input": format!("It sounds like: {}", text),
            "response_format": "mp3"
        });

        let audio = self
            .post_json("/audio/speech", &body)
            .await?
            .bytes()
            .await
            .context("Failed to read speech audio")?;

        Ok(audio.to_vec())
    }
}
