use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use rand::seq::SliceRandom;
use std::collections::HashMap;
use tokio::sync::RwLock;

use super::{
    AiCacheStore, DuplicateKey, InvitationStore, MfaCodeStore, Page, PreferencesStore,
    ScoreStore, StoreHealth, UserStore, VerificationTokenStore, VocabularyFilter,
    VocabularyStore,
};
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

#[derive(Default)]
struct Tables {
    vocabulary: HashMap<String, Vocabulary>,
    users: HashMap<String, User>,
    mfa_codes: HashMap<String, MfaCode>,
    verification_tokens: HashMap<String, VerificationToken>,
    scores: HashMap<String, ScoreRecord>,
    preferences: HashMap<String, UserPreferences>,
    hints: HashMap<String, HintCacheEntry>,
    tts: HashMap<String, TtsCacheEntry>,
    invitations: HashMap<String, Invitation>,
}

/// Process-local backend. All tables sit behind one lock so cascades and
/// conditional updates are atomic.
#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

fn shuffled(mut items: Vec<Vocabulary>, size: usize) -> Vec<Vocabulary> {
    items.shuffle(&mut rand::rng());
    items.truncate(size);
    items
}

fn newest_first<T, F>(items: &mut [T], key: F)
where
    F: Fn(&T) -> DateTime<Utc>,
{
    items.sort_by_key(|item| std::cmp::Reverse(key(item)));
}

#[async_trait]
impl VocabularyStore for MemoryStore {
    async fn find(&self, filter: &VocabularyFilter, page: Page) -> Result<Vec<Vocabulary>> {
        let tables = self.tables.read().await;
        let mut matching: Vec<Vocabulary> = tables
            .vocabulary
            .values()
            .filter(|vocab| filter.matches(vocab))
            .cloned()
            .collect();
        newest_first(&mut matching, |vocab| vocab.created_at);

        let skip = usize::try_from(page.skip).unwrap_or(usize::MAX);
        let limit = usize::try_from(page.limit).unwrap_or(usize::MAX);
        Ok(matching.into_iter().skip(skip).take(limit).collect())
    }

    async fn count(&self, filter: &VocabularyFilter) -> Result<u64> {
        let tables = self.tables.read().await;
        Ok(tables
            .vocabulary
            .values()
            .filter(|vocab| filter.matches(vocab))
            .count() as u64)
    }

    async fn random_sample(
        &self,
        filter: &VocabularyFilter,
        size: usize,
    ) -> Result<Vec<Vocabulary>> {
        let matching: Vec<Vocabulary> = {
            let tables = self.tables.read().await;
            tables
                .vocabulary
                .values()
                .filter(|vocab| filter.matches(vocab))
                .cloned()
                .collect()
        };
        Ok(shuffled(matching, size))
    }

    async fn get(&self, id: &str) -> Result<Option<Vocabulary>> {
        Ok(self.tables.read().await.vocabulary.get(id).cloned())
    }

    async fn insert(&self, vocab: &Vocabulary) -> Result<()> {
        let mut tables = self.tables.write().await;
        if tables.vocabulary.contains_key(&vocab.id) {
            anyhow::bail!("Vocabulary {} already exists", vocab.id);
        }
        tables.vocabulary.insert(vocab.id.clone(), vocab.clone());
        Ok(())
    }

    async fn replace(&self, vocab: &Vocabulary) -> Result<bool> {
        let mut tables = self.tables.write().await;
        match tables.vocabulary.get_mut(&vocab.id) {
            Some(existing) => {
                *existing = vocab.clone();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn delete(&self, id: &str) -> Result<bool> {
        let mut tables = self.tables.write().await;
        if tables.vocabulary.remove(id).is_none() {
            return Ok(false);
        }
        tables.hints.retain(|_, hint| hint.vocabulary_id != id);
        Ok(true)
    }

    async fn tag_strings(&self) -> Result<Vec<String>> {
        let tables = self.tables.read().await;
        Ok(tables
            .vocabulary
            .values()
            .map(|vocab| vocab.tags.clone())
            .collect())
    }
}

#[async_trait]
impl UserStore for MemoryStore {
    async fn find_by_email(&self, email: &str) -> Result<Option<User>> {
        let tables = self.tables.read().await;
        Ok(tables.users.values().find(|u| u.email == email).cloned())
    }

    async fn find_by_username(&self, username: &str) -> Result<Option<User>> {
        let tables = self.tables.read().await;
        Ok(tables.users.values().find(|u| u.username == username).cloned())
    }

    async fn get(&self, id: &str) -> Result<Option<User>> {
        Ok(self.tables.read().await.users.get(id).cloned())
    }

    async fn insert(&self, user: &User) -> Result<()> {
        let mut tables = self.tables.write().await;
        for existing in tables.users.values() {
            let field = if existing.id == user.id {
                "_id"
            } else if existing.email == user.email {
                "email"
            } else if existing.username == user.username {
                "username"
            } else {
                continue;
            };
            return Err(DuplicateKey { field }.into());
        }
        tables.users.insert(user.id.clone(), user.clone());
        Ok(())
    }

    async fn list(&self) -> Result<Vec<User>> {
        let mut users: Vec<User> = self.tables.read().await.users.values().cloned().collect();
        newest_first(&mut users, |user| user.created_at);
        Ok(users)
    }

    async fn update_lockout_state(
        &self,
        id: &str,
        failed_login_attempts: u32,
        locked_until: Option<DateTime<Utc>>,
    ) -> Result<()> {
        let mut tables = self.tables.write().await;
        if let Some(user) = tables.users.get_mut(id) {
            user.failed_login_attempts = failed_login_attempts;
            user.locked_until = locked_until;
        }
        Ok(())
    }

    async fn record_failed_login(
        &self,
        id: &str,
        max_attempts: u32,
        lock_until: DateTime<Utc>,
    ) -> Result<Option<User>> {
        let mut tables = self.tables.write().await;
        Ok(tables.users.get_mut(id).map(|user| {
            user.failed_login_attempts = user.failed_login_attempts.saturating_add(1);
            if user.failed_login_attempts >= max_attempts {
                user.locked_until = Some(lock_until);
            }
            user.clone()
        }))
    }

    async fn update_verified_flag(&self, id: &str, verified: bool) -> Result<()> {
        let mut tables = self.tables.write().await;
        if let Some(user) = tables.users.get_mut(id) {
            user.is_email_verified = verified;
        }
        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<bool> {
        let mut tables = self.tables.write().await;
        if tables.users.remove(id).is_none() {
            return Ok(false);
        }
        tables.mfa_codes.retain(|_, code| code.user_id != id);
        tables.verification_tokens.retain(|_, token| token.user_id != id);
        tables.scores.retain(|_, score| score.user_id != id);
        tables.preferences.remove(id);
        tables.invitations.retain(|_, invitation| invitation.invited_by != id);
        Ok(true)
    }
}

#[async_trait]
impl MfaCodeStore for MemoryStore {
    async fn replace_for_user(&self, code: &MfaCode) -> Result<()> {
        let mut tables = self.tables.write().await;
        tables.mfa_codes.retain(|_, existing| existing.user_id != code.user_id);
        tables.mfa_codes.insert(code.id.clone(), code.clone());
        Ok(())
    }

    async fn find_valid(
        &self,
        user_id: &str,
        code: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<MfaCode>> {
        let tables = self.tables.read().await;
        Ok(tables
            .mfa_codes
            .values()
            .find(|c| c.user_id == user_id && c.code == code && !c.is_expired(now))
            .cloned())
    }

    async fn delete_for_user(&self, user_id: &str) -> Result<()> {
        let mut tables = self.tables.write().await;
        tables.mfa_codes.retain(|_, code| code.user_id != user_id);
        Ok(())
    }
}

#[async_trait]
impl VerificationTokenStore for MemoryStore {
    async fn replace_for_user(&self, token: &VerificationToken) -> Result<()> {
        let mut tables = self.tables.write().await;
        tables
            .verification_tokens
            .retain(|_, existing| existing.user_id != token.user_id);
        tables
            .verification_tokens
            .insert(token.id.clone(), token.clone());
        Ok(())
    }

    async fn find_valid(
        &self,
        token_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<VerificationToken>> {
        let tables = self.tables.read().await;
        Ok(tables
            .verification_tokens
            .values()
            .find(|t| t.token_hash == token_hash && !t.is_expired(now))
            .cloned())
    }

    async fn delete_for_user(&self, user_id: &str) -> Result<()> {
        let mut tables = self.tables.write().await;
        tables
            .verification_tokens
            .retain(|_, token| token.user_id != user_id);
        Ok(())
    }
}

#[async_trait]
impl ScoreStore for MemoryStore {
    async fn record_high_score(
        &self,
        user_id: &str,
        game_type: GameType,
        date: NaiveDate,
        score: i64,
    ) -> Result<ScoreRecord> {
        let mut tables = self.tables.write().await;
        let record = tables
            .scores
            .entry(ScoreRecord::record_id(user_id, game_type, date))
            .and_modify(|record| {
                if score > record.score {
                    record.score = score;
                    record.updated_at = Utc::now();
                }
            })
            .or_insert_with(|| ScoreRecord::new(user_id, game_type, date, score));
        Ok(record.clone())
    }

    async fn for_day(&self, user_id: &str, date: NaiveDate) -> Result<Vec<ScoreRecord>> {
        let tables = self.tables.read().await;
        Ok(tables
            .scores
            .values()
            .filter(|r| r.user_id == user_id && r.date == date)
            .cloned()
            .collect())
    }

    async fn history(
        &self,
        user_id: &str,
        game_type: Option<GameType>,
        limit: i64,
    ) -> Result<Vec<ScoreRecord>> {
        let tables = self.tables.read().await;
        let mut records: Vec<ScoreRecord> = tables
            .scores
            .values()
            .filter(|r| r.user_id == user_id && game_type.map_or(true, |g| r.game_type == g))
            .cloned()
            .collect();
        records.sort_by(|a, b| {
            b.date
                .cmp(&a.date)
                .then_with(|| a.game_type.as_str().cmp(b.game_type.as_str()))
        });
        records.truncate(usize::try_from(limit).unwrap_or(0));
        Ok(records)
    }

    async fn best(&self, user_id: &str) -> Result<Vec<(GameType, i64)>> {
        let tables = self.tables.read().await;
        let mut best: HashMap<GameType, i64> = HashMap::new();
        for record in tables.scores.values().filter(|r| r.user_id == user_id) {
            let slot = best.entry(record.game_type).or_insert(record.score);
            *slot = (*slot).max(record.score);
        }
        Ok(best.into_iter().collect())
    }
}

#[async_trait]
impl PreferencesStore for MemoryStore {
    async fn get(&self, user_id: &str) -> Result<Option<UserPreferences>> {
        Ok(self.tables.read().await.preferences.get(user_id).cloned())
    }

    async fn upsert(&self, prefs: &UserPreferences) -> Result<()> {
        let mut tables = self.tables.write().await;
        tables
            .preferences
            .insert(prefs.user_id.clone(), prefs.clone());
        Ok(())
    }
}

#[async_trait]
impl AiCacheStore for MemoryStore {
    async fn find_hint(
        &self,
        vocabulary_id: &str,
        mode: QuizMode,
    ) -> Result<Option<HintCacheEntry>> {
        let tables = self.tables.read().await;
        Ok(tables
            .hints
            .values()
            .find(|h| h.vocabulary_id == vocabulary_id && h.mode == mode)
            .cloned())
    }

    async fn save_hint(&self, entry: &HintCacheEntry) -> Result<()> {
        let mut tables = self.tables.write().await;
        if let Some(existing) = tables
            .hints
            .values_mut()
            .find(|h| h.vocabulary_id == entry.vocabulary_id && h.mode == entry.mode)
        {
            existing.hint = entry.hint.clone();
            return Ok(());
        }
        tables.hints.insert(entry.id.clone(), entry.clone());
        Ok(())
    }

    async fn list_hints(&self) -> Result<Vec<HintCacheEntry>> {
        let mut hints: Vec<HintCacheEntry> =
            self.tables.read().await.hints.values().cloned().collect();
        newest_first(&mut hints, |hint| hint.created_at);
        Ok(hints)
    }

    async fn update_hint(&self, id: &str, hint: &str) -> Result<Option<HintCacheEntry>> {
        let mut tables = self.tables.write().await;
        Ok(tables.hints.get_mut(id).map(|entry| {
            entry.hint = hint.to_string();
            entry.clone()
        }))
    }

    async fn delete_hint(&self, id: &str) -> Result<bool> {
        Ok(self.tables.write().await.hints.remove(id).is_some())
    }

    async fn clear_hints(&self) -> Result<u64> {
        let mut tables = self.tables.write().await;
        let removed = tables.hints.len() as u64;
        tables.hints.clear();
        Ok(removed)
    }

    async fn find_tts(&self, text: &str) -> Result<Option<TtsCacheEntry>> {
        let tables = self.tables.read().await;
        Ok(tables.tts.values().find(|t| t.text == text).cloned())
    }

    async fn save_tts(&self, entry: &TtsCacheEntry) -> Result<()> {
        let mut tables = self.tables.write().await;
        tables.tts.retain(|_, existing| existing.text != entry.text);
        tables.tts.insert(entry.id.clone(), entry.clone());
        Ok(())
    }

    async fn list_tts(&self) -> Result<Vec<TtsCacheSummary>> {
        let tables = self.tables.read().await;
        let mut entries: Vec<&TtsCacheEntry> = tables.tts.values().collect();
        entries.sort_by_key(|entry| std::cmp::Reverse(entry.created_at));
        Ok(entries.into_iter().map(TtsCacheSummary::from).collect())
    }

    async fn get_tts(&self, id: &str) -> Result<Option<TtsCacheEntry>> {
        Ok(self.tables.read().await.tts.get(id).cloned())
    }

    async fn delete_tts(&self, id: &str) -> Result<bool> {
        Ok(self.tables.write().await.tts.remove(id).is_some())
    }

    async fn clear_tts(&self) -> Result<u64> {
        let mut tables = self.tables.write().await;
        let removed = tables.tts.len() as u64;
        tables.tts.clear();
        Ok(removed)
    }

    async fn stats(&self) -> Result<CacheStats> {
        let tables = self.tables.read().await;
        Ok(CacheStats {
            hint_count: tables.hints.len() as u64,
            tts_count: tables.tts.len() as u64,
            tts_total_bytes: tables
                .tts
                .values()
                .map(|entry| entry.audio_bytes().len() as u64)
                .sum(),
        })
    }
}

#[async_trait]
impl InvitationStore for MemoryStore {
    async fn insert(&self, invitation: &Invitation) -> Result<()> {
        let mut tables = self.tables.write().await;
        if tables
            .invitations
            .values()
            .any(|i| i.id == invitation.id || i.token_hash == invitation.token_hash)
        {
            return Err(DuplicateKey { field: "token_hash" }.into());
        }
        tables
            .invitations
            .insert(invitation.id.clone(), invitation.clone());
        Ok(())
    }

    async fn list(&self) -> Result<Vec<Invitation>> {
        let mut invitations: Vec<Invitation> =
            self.tables.read().await.invitations.values().cloned().collect();
        newest_first(&mut invitations, |invitation| invitation.created_at);
        Ok(invitations)
    }

    async fn get(&self, id: &str) -> Result<Option<Invitation>> {
        Ok(self.tables.read().await.invitations.get(id).cloned())
    }

    async fn find_pending_for_email(
        &self,
        email: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<Invitation>> {
        let tables = self.tables.read().await;
        Ok(tables
            .invitations
            .values()
            .find(|i| i.email == email && i.is_pending(now))
            .cloned())
    }

    async fn find_pending_by_token(
        &self,
        token_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<Invitation>> {
        let tables = self.tables.read().await;
        Ok(tables
            .invitations
            .values()
            .find(|i| i.token_hash == token_hash && i.is_pending(now))
            .cloned())
    }

    async fn renew(
        &self,
        id: &str,
        token_hash: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<Option<Invitation>> {
        let mut tables = self.tables.write().await;
        Ok(tables
            .invitations
            .get_mut(id)
            .filter(|invitation| !invitation.accepted)
            .map(|invitation| {
                invitation.token_hash = token_hash.to_string();
                invitation.expires_at = expires_at;
                invitation.clone()
            }))
    }

    async fn mark_accepted(&self, id: &str, at: DateTime<Utc>) -> Result<bool> {
        let mut tables = self.tables.write().await;
        match tables.invitations.get_mut(id) {
            Some(invitation) if !invitation.accepted => {
                invitation.accepted = true;
                invitation.accepted_at = Some(at);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn delete(&self, id: &str) -> Result<bool> {
        Ok(self.tables.write().await.invitations.remove(id).is_some())
    }
}

#[async_trait]
impl StoreHealth for MemoryStore {
    fn backend(&self) -> &'static str {
        "memory"
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }
}
