//! Persistence seams. Services only talk to these traits; `mongo` backs them
//! with MongoDB in production and `memory` keeps everything in process for
//! tests and local runs.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use std::sync::Arc;

use crate::models::{
    ai_cache::{CacheStats, HintCacheEntry, TtsCacheEntry, TtsCacheSummary},
    credentials::{MfaCode, VerificationToken},
    invitation::Invitation,
    preferences::UserPreferences,
    quiz::QuizMode,
    score::{GameType, ScoreRecord},
    user::User,
    vocabulary::Vocabulary,
};

pub mod memory;
pub mod mongo;

pub use memory::MemoryStore;
pub use mongo::MongoStore;

/// A unique field was already taken. Stores return it inside `anyhow::Error`
/// so services can tell a conflict from an outage.
#[derive(Debug, thiserror::Error)]
#[error("duplicate value for unique field `{field}`")]
pub struct DuplicateKey {
    pub field: &'static str,
}

/// Criteria shared by listing, counting and sampling vocabulary.
#[derive(Debug, Clone, Default)]
pub struct VocabularyFilter {
    /// Every tag must appear (case-insensitive substring) in `tags`.
    pub tags: Vec<String>,
    /// Case-insensitive substring over expression, reading and meaning.
    pub search: Option<String>,
    /// Minimum reading length in characters.
    pub min_reading_len: Option<usize>,
    pub exclude_id: Option<String>,
}

impl VocabularyFilter {
    pub fn with_tags(tags: Vec<String>) -> Self {
        Self {
            tags,
            ..Self::default()
        }
    }

    pub fn excluding(id: &str) -> Self {
        Self {
            exclude_id: Some(id.to_string()),
            ..Self::default()
        }
    }

    pub fn matches(&self, vocab: &Vocabulary) -> bool {
        if !vocab.has_all_tags(&self.tags) {
            return false;
        }
        if let Some(search) = &self.search {
            let needle = search.to_lowercase();
            let hit = [&vocab.expression, &vocab.reading, &vocab.meaning]
                .iter()
                .any(|field| field.to_lowercase().contains(&needle));
            if !hit {
                return false;
            }
        }
        if let Some(min) = self.min_reading_len {
            if vocab.reading_len() < min {
                return false;
            }
        }
        if let Some(excluded) = &self.exclude_id {
            if vocab.id == *excluded {
                return false;
            }
        }
        true
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub skip: u64,
    pub limit: u64,
}

impl Page {
    /// 1-based page number to skip/limit.
    pub fn new(page: u64, page_size: u64) -> Self {
        Self {
            skip: page.saturating_sub(1) * page_size,
            limit: page_size,
        }
    }
}

#[async_trait]
pub trait VocabularyStore: Send + Sync {
    /// Newest first.
    async fn find(&self, filter: &VocabularyFilter, page: Page) -> Result<Vec<Vocabulary>>;
    async fn count(&self, filter: &VocabularyFilter) -> Result<u64>;
    /// Up to `size` distinct entries in random order.
    async fn random_sample(&self, filter: &VocabularyFilter, size: usize)
        -> Result<Vec<Vocabulary>>;
    async fn get(&self, id: &str) -> Result<Option<Vocabulary>>;
    async fn insert(&self, vocab: &Vocabulary) -> Result<()>;
    async fn replace(&self, vocab: &Vocabulary) -> Result<bool>;
    /// Also drops cached hints of the entry.
    async fn delete(&self, id: &str) -> Result<bool>;
    /// Raw `tags` field of every entry.
    async fn tag_strings(&self) -> Result<Vec<String>>;
}

#[async_trait]
pub trait UserStore: Send + Sync {
    async fn find_by_email(&self, email: &str) -> Result<Option<User>>;
    async fn find_by_username(&self, username: &str) -> Result<Option<User>>;
    async fn get(&self, id: &str) -> Result<Option<User>>;
    async fn insert(&self, user: &User) -> Result<()>;
    async fn list(&self) -> Result<Vec<User>>;
    async fn update_lockout_state(
        &self,
        id: &str,
        failed_login_attempts: u32,
        locked_until: Option<DateTime<Utc>>,
    ) -> Result<()>;
    /// Adds one failed attempt in a single atomic update and locks the account
    /// until `lock_until` once the count reaches `max_attempts`. Returns the
    /// updated user, `None` when it no longer exists.
    async fn record_failed_login(
        &self,
        id: &str,
        max_attempts: u32,
        lock_until: DateTime<Utc>,
    ) -> Result<Option<User>>;
    async fn update_verified_flag(&self, id: &str, verified: bool) -> Result<()>;
    /// Removes the user with their codes, tokens, scores, preferences and the
    /// invitations they sent.
    async fn delete(&self, id: &str) -> Result<bool>;
}

#[async_trait]
pub trait MfaCodeStore: Send + Sync {
    /// Drops any previous code of the user, then stores `code`.
    async fn replace_for_user(&self, code: &MfaCode) -> Result<()>;
    async fn find_valid(&self, user_id: &str, code: &str, now: DateTime<Utc>)
        -> Result<Option<MfaCode>>;
    async fn delete_for_user(&self, user_id: &str) -> Result<()>;
}

#[async_trait]
pub trait VerificationTokenStore: Send + Sync {
    async fn replace_for_user(&self, token: &VerificationToken) -> Result<()>;
    async fn find_valid(&self, token_hash: &str, now: DateTime<Utc>)
        -> Result<Option<VerificationToken>>;
    async fn delete_for_user(&self, user_id: &str) -> Result<()>;
}

#[async_trait]
pub trait ScoreStore: Send + Sync {
    /// Creates the (user, game, day) record or raises its score. A lower or
    /// equal score leaves the record untouched. Returns the stored record.
    async fn record_high_score(
        &self,
        user_id: &str,
        game_type: GameType,
        date: NaiveDate,
        score: i64,
    ) -> Result<ScoreRecord>;
    async fn for_day(&self, user_id: &str, date: NaiveDate) -> Result<Vec<ScoreRecord>>;
    /// Newest day first.
    async fn history(
        &self,
        user_id: &str,
        game_type: Option<GameType>,
        limit: i64,
    ) -> Result<Vec<ScoreRecord>>;
    async fn best(&self, user_id: &str) -> Result<Vec<(GameType, i64)>>;
}

#[async_trait]
pub trait PreferencesStore: Send + Sync {
    async fn get(&self, user_id: &str) -> Result<Option<UserPreferences>>;
    async fn upsert(&self, prefs: &UserPreferences) -> Result<()>;
}

#[async_trait]
pub trait AiCacheStore: Send + Sync {
    async fn find_hint(&self, vocabulary_id: &str, mode: QuizMode) -> Result<Option<HintCacheEntry>>;
    /// Keeps one entry per (vocabulary, mode).
    async fn save_hint(&self, entry: &HintCacheEntry) -> Result<()>;
    async fn list_hints(&self) -> Result<Vec<HintCacheEntry>>;
    async fn update_hint(&self, id: &str, hint: &str) -> Result<Option<HintCacheEntry>>;
    async fn delete_hint(&self, id: &str) -> Result<bool>;
    async fn clear_hints(&self) -> Result<u64>;

    async fn find_tts(&self, text: &str) -> Result<Option<TtsCacheEntry>>;
    /// Keeps one entry per text.
    async fn save_tts(&self, entry: &TtsCacheEntry) -> Result<()>;
    async fn list_tts(&self) -> Result<Vec<TtsCacheSummary>>;
    async fn get_tts(&self, id: &str) -> Result<Option<TtsCacheEntry>>;
    async fn delete_tts(&self, id: &str) -> Result<bool>;
    async fn clear_tts(&self) -> Result<u64>;

    async fn stats(&self) -> Result<CacheStats>;
}

#[async_trait]
pub trait InvitationStore: Send + Sync {
    async fn insert(&self, invitation: &Invitation) -> Result<()>;
    /// Newest first.
    async fn list(&self) -> Result<Vec<Invitation>>;
    async fn get(&self, id: &str) -> Result<Option<Invitation>>;
    async fn find_pending_for_email(
        &self,
        email: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<Invitation>>;
    async fn find_pending_by_token(
        &self,
        token_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<Invitation>>;
    /// Swaps in a new token and expiry unless the invitation was accepted.
    async fn renew(
        &self,
        id: &str,
        token_hash: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<Option<Invitation>>;
    /// False when the invitation was already accepted or is gone.
    async fn mark_accepted(&self, id: &str, at: DateTime<Utc>) -> Result<bool>;
    async fn delete(&self, id: &str) -> Result<bool>;
}

#[async_trait]
pub trait StoreHealth: Send + Sync {
    fn backend(&self) -> &'static str;
    async fn ping(&self) -> Result<()>;
}

/// Handles to every store, shared through `AppState`.
#[derive(Clone)]
pub struct Stores {
    pub vocabulary: Arc<dyn VocabularyStore>,
    pub users: Arc<dyn UserStore>,
    pub mfa_codes: Arc<dyn MfaCodeStore>,
    pub verification_tokens: Arc<dyn VerificationTokenStore>,
    pub scores: Arc<dyn ScoreStore>,
    pub preferences: Arc<dyn PreferencesStore>,
    pub ai_cache: Arc<dyn AiCacheStore>,
    pub invitations: Arc<dyn InvitationStore>,
    pub health: Arc<dyn StoreHealth>,
}

impl Stores {
    /// Creates the unique and TTL indexes before handing out the store.
    pub async fn mongo(db: mongodb::Database) -> Result<Self> {
        let store = MongoStore::new(db);
        store.ensure_indexes().await?;
        Ok(Self::from_backend(Arc::new(store)))
    }

    pub fn in_memory() -> Self {
        Self::from_backend(Arc::new(MemoryStore::default()))
    }

    fn from_backend<B>(backend: Arc<B>) -> Self
    where
        B: VocabularyStore
            + UserStore
            + MfaCodeStore
            + VerificationTokenStore
            + ScoreStore
            + PreferencesStore
            + AiCacheStore
            + InvitationStore
            + StoreHealth
            + 'static,
    {
        Self {
            vocabulary: backend.clone(),
            users: backend.clone(),
            mfa_codes: backend.clone(),
            verification_tokens: backend.clone(),
            scores: backend.clone(),
            preferences: backend.clone(),
            ai_cache: backend.clone(),
            invitations: backend.clone(),
            health: backend,
        }
    }
}
