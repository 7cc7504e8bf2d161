use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use futures::stream::TryStreamExt;
use mongodb::{
    bson::{self, doc, DateTime as BsonDateTime, Document},
    error::{ErrorKind, WriteFailure},
    options::{IndexOptions, ReturnDocument},
    Collection, Database, IndexModel,
};
use std::time::Duration;

use super::{
    AiCacheStore, DuplicateKey, InvitationStore, MfaCodeStore, Page, PreferencesStore,
    ScoreStore, StoreHealth, UserStore, VerificationTokenStore, VocabularyFilter,
    VocabularyStore,
};
use crate::metrics::track_db_operation;
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

const VOCABULARY: &str = "vocabulary";
const USERS: &str = "users";
const MFA_CODES: &str = "mfa_codes";
const VERIFICATION_TOKENS: &str = "verification_tokens";
const SCORES: &str = "scores";
const USER_PREFERENCES: &str = "user_preferences";
const HINT_CACHE: &str = "hint_cache";
const TTS_CACHE: &str = "tts_cache";
const INVITATIONS: &str = "invitations";

const DUPLICATE_KEY: i32 = 11000;

pub struct MongoStore {
    db: Database,
}

impl MongoStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Unique keys the stores rely on, plus TTL cleanup of expired codes.
    /// `createIndexes` is a no-op for indexes that already exist.
    pub async fn ensure_indexes(&self) -> Result<()> {
        let indexes: [(&str, Vec<IndexModel>); 8] = [
            (USERS, vec![unique(doc! { "email": 1 }), unique(doc! { "username": 1 })]),
            (
                MFA_CODES,
                vec![unique(doc! { "user_id": 1 }), expiring(doc! { "expiresAt": 1 })],
            ),
            (
                VERIFICATION_TOKENS,
                vec![
                    unique(doc! { "user_id": 1 }),
                    unique(doc! { "token_hash": 1 }),
                    expiring(doc! { "expiresAt": 1 }),
                ],
            ),
            (HINT_CACHE, vec![unique(doc! { "vocabulary_id": 1, "mode": 1 })]),
            (TTS_CACHE, vec![unique(doc! { "text": 1 })]),
            (
                INVITATIONS,
                vec![unique(doc! { "token_hash": 1 }), plain(doc! { "email": 1 })],
            ),
            (SCORES, vec![plain(doc! { "user_id": 1, "date": -1 })]),
            (VOCABULARY, vec![plain(doc! { "createdAt": -1 })]),
        ];

        for (collection, models) in indexes {
            track_db_operation("create_indexes", collection, async {
                self.db
                    .collection::<Document>(collection)
                    .create_indexes(models)
                    .await
                    .with_context(|| format!("Failed to create indexes on {}", collection))?;
                Ok(())
            })
            .await?;
        }
        tracing::info!("MongoDB indexes ensured");
        Ok(())
    }

    fn vocabulary(&self) -> Collection<Vocabulary> {
        self.db.collection(VOCABULARY)
    }

    fn users(&self) -> Collection<User> {
        self.db.collection(USERS)
    }

    fn mfa_codes(&self) -> Collection<MfaCode> {
        self.db.collection(MFA_CODES)
    }

    fn verification_tokens(&self) -> Collection<VerificationToken> {
        self.db.collection(VERIFICATION_TOKENS)
    }

    fn scores(&self) -> Collection<ScoreRecord> {
        self.db.collection(SCORES)
    }

    fn preferences(&self) -> Collection<UserPreferences> {
        self.db.collection(USER_PREFERENCES)
    }

    fn hints(&self) -> Collection<HintCacheEntry> {
        self.db.collection(HINT_CACHE)
    }

    fn tts(&self) -> Collection<TtsCacheEntry> {
        self.db.collection(TTS_CACHE)
    }

    fn invitations(&self) -> Collection<Invitation> {
        self.db.collection(INVITATIONS)
    }
}

fn plain(keys: Document) -> IndexModel {
    IndexModel::builder().keys(keys).build()
}

fn unique(keys: Document) -> IndexModel {
    IndexModel::builder()
        .keys(keys)
        .options(IndexOptions::builder().unique(true).build())
        .build()
}

/// Documents go away once the indexed date has passed.
fn expiring(keys: Document) -> IndexModel {
    IndexModel::builder()
        .keys(keys)
        .options(
            IndexOptions::builder()
                .expire_after(Duration::from_secs(0))
                .build(),
        )
        .build()
}

fn bson_now(now: DateTime<Utc>) -> BsonDateTime {
    BsonDateTime::from_millis(now.timestamp_millis())
}

fn is_duplicate_key(err: &mongodb::error::Error) -> bool {
    matches!(
        *err.kind,
        ErrorKind::Write(WriteFailure::WriteError(ref we)) if we.code == DUPLICATE_KEY
    )
}

/// Turns an E11000 into `DuplicateKey`, naming the first of `fields` whose
/// index shows up in the server message.
fn duplicate_key_error(
    err: mongodb::error::Error,
    fields: &[&'static str],
    context: &'static str,
) -> anyhow::Error {
    if let ErrorKind::Write(WriteFailure::WriteError(ref we)) = *err.kind {
        if we.code == DUPLICATE_KEY {
            let field = fields
                .iter()
                .copied()
                .find(|field| we.message.contains(&format!("{}_1", field)))
                .unwrap_or("_id");
            return DuplicateKey { field }.into();
        }
    }
    anyhow::Error::new(err).context(context)
}

/// Field values of `value` without its `_id`, for upserts keyed on another field.
fn fields_without_id<T: serde::Serialize>(value: &T) -> Result<Document> {
    let mut fields = bson::to_document(value).context("Failed to encode document")?;
    fields.remove("_id");
    Ok(fields)
}

fn contains_ci(field: &str, needle: &str) -> Document {
    doc! { field: { "$regex": regex::escape(needle), "$options": "i" } }
}

fn vocabulary_filter_doc(filter: &VocabularyFilter) -> Document {
    let mut clauses: Vec<Document> = filter
        .tags
        .iter()
        .map(|tag| contains_ci("tags", tag))
        .collect();

    if let Some(search) = filter.search.as_deref() {
        clauses.push(doc! {
            "$or": [
                contains_ci("expression", search),
                contains_ci("reading", search),
                contains_ci("meaning", search),
            ]
        });
    }
    if let Some(min) = filter.min_reading_len {
        let min = i64::try_from(min).unwrap_or(i64::MAX);
        clauses.push(doc! { "$expr": { "$gte": [ { "$strLenCP": "$reading" }, min ] } });
    }
    if let Some(excluded) = filter.exclude_id.as_deref() {
        clauses.push(doc! { "_id": { "$ne": excluded } });
    }

    if clauses.is_empty() {
        doc! {}
    } else {
        doc! { "$and": clauses }
    }
}

/// Aggregation-pipeline update: one more failed attempt, and a lock once the
/// new count reaches `max_attempts`. Both stages run in a single write.
fn failed_login_update(max_attempts: u32, lock_until: DateTime<Utc>) -> Vec<Document> {
    vec![
        doc! { "$set": {
            "failed_login_attempts": {
                "$add": [ { "$ifNull": [ "$failed_login_attempts", 0 ] }, 1 ]
            }
        } },
        doc! { "$set": {
            "lockedUntil": {
                "$cond": [
                    { "$gte": [ "$failed_login_attempts", i64::from(max_attempts) ] },
                    bson_now(lock_until),
                    "$lockedUntil",
                ]
            }
        } },
    ]
}

#[async_trait]
impl VocabularyStore for MongoStore {
    async fn find(&self, filter: &VocabularyFilter, page: Page) -> Result<Vec<Vocabulary>> {
        track_db_operation("find", VOCABULARY, async {
            let cursor = self
                .vocabulary()
                .find(vocabulary_filter_doc(filter))
                .sort(doc! { "createdAt": -1 })
                .skip(page.skip)
                .limit(i64::try_from(page.limit).unwrap_or(i64::MAX))
                .await
                .context("Failed to query vocabulary")?;
            cursor
                .try_collect()
                .await
                .context("Failed to read vocabulary")
        })
        .await
    }

    async fn count(&self, filter: &VocabularyFilter) -> Result<u64> {
        track_db_operation("count", VOCABULARY, async {
            self.vocabulary()
                .count_documents(vocabulary_filter_doc(filter))
                .await
                .context("Failed to count vocabulary")
        })
        .await
    }

    async fn random_sample(
        &self,
        filter: &VocabularyFilter,
        size: usize,
    ) -> Result<Vec<Vocabulary>> {
        if size == 0 {
            return Ok(Vec::new());
        }
        let pipeline = vec![
            doc! { "$match": vocabulary_filter_doc(filter) },
            doc! { "$sample": { "size": i64::try_from(size).unwrap_or(i64::MAX) } },
        ];
        track_db_operation("sample", VOCABULARY, async {
            let cursor = self
                .vocabulary()
                .aggregate(pipeline)
                .with_type::<Vocabulary>()
                .await
                .context("Failed to sample vocabulary")?;
            cursor
                .try_collect()
                .await
                .context("Failed to read sampled vocabulary")
        })
        .await
    }

    async fn get(&self, id: &str) -> Result<Option<Vocabulary>> {
        track_db_operation("find_one", VOCABULARY, async {
            self.vocabulary()
                .find_one(doc! { "_id": id })
                .await
                .context("Failed to load vocabulary")
        })
        .await
    }

    async fn insert(&self, vocab: &Vocabulary) -> Result<()> {
        track_db_operation("insert", VOCABULARY, async {
            self.vocabulary()
                .insert_one(vocab)
                .await
                .context("Failed to insert vocabulary")?;
            Ok(())
        })
        .await
    }

    async fn replace(&self, vocab: &Vocabulary) -> Result<bool> {
        track_db_operation("replace", VOCABULARY, async {
            let result = self
                .vocabulary()
                .replace_one(doc! { "_id": &vocab.id }, vocab)
                .await
                .context("Failed to update vocabulary")?;
            Ok(result.matched_count > 0)
        })
        .await
    }

    async fn delete(&self, id: &str) -> Result<bool> {
        let deleted = track_db_operation("delete", VOCABULARY, async {
            let result = self
                .vocabulary()
                .delete_one(doc! { "_id": id })
                .await
                .context("Failed to delete vocabulary")?;
            Ok(result.deleted_count > 0)
        })
        .await?;
        if !deleted {
            return Ok(false);
        }
        track_db_operation("delete_many", HINT_CACHE, async {
            self.hints()
                .delete_many(doc! { "vocabulary_id": id })
                .await
                .context("Failed to delete cached hints")?;
            Ok(true)
        })
        .await
    }

    async fn tag_strings(&self) -> Result<Vec<String>> {
        let values = track_db_operation("distinct", VOCABULARY, async {
            self.vocabulary()
                .distinct("tags", doc! {})
                .await
                .context("Failed to load tags")
        })
        .await?;
        Ok(values
            .into_iter()
            .filter_map(|value| value.as_str().map(str::to_string))
            .collect())
    }
}

#[async_trait]
impl UserStore for MongoStore {
    async fn find_by_email(&self, email: &str) -> Result<Option<User>> {
        track_db_operation("find_one", USERS, async {
            self.users()
                .find_one(doc! { "email": email })
                .await
                .context("Failed to query user by email")
        })
        .await
    }

    async fn find_by_username(&self, username: &str) -> Result<Option<User>> {
        track_db_operation("find_one", USERS, async {
            self.users()
                .find_one(doc! { "username": username })
                .await
                .context("Failed to query user by username")
        })
        .await
    }

    async fn get(&self, id: &str) -> Result<Option<User>> {
        track_db_operation("find_one", USERS, async {
            self.users()
                .find_one(doc! { "_id": id })
                .await
                .context("Failed to query user")
        })
        .await
    }

    async fn insert(&self, user: &User) -> Result<()> {
        track_db_operation("insert", USERS, async {
            self.users()
                .insert_one(user)
                .await
                .map_err(|err| {
                    duplicate_key_error(err, &["email", "username"], "Failed to insert user")
                })?;
            Ok(())
        })
        .await
    }

    async fn list(&self) -> Result<Vec<User>> {
        track_db_operation("find", USERS, async {
            let cursor = self
                .users()
                .find(doc! {})
                .sort(doc! { "createdAt": -1 })
                .await
                .context("Failed to list users")?;
            cursor.try_collect().await.context("Failed to read users")
        })
        .await
    }

    async fn update_lockout_state(
        &self,
        id: &str,
        failed_login_attempts: u32,
        locked_until: Option<DateTime<Utc>>,
    ) -> Result<()> {
        track_db_operation("update", USERS, async {
            self.users()
                .update_one(
                    doc! { "_id": id },
                    doc! { "$set": {
                        "failed_login_attempts": i64::from(failed_login_attempts),
                        "lockedUntil": locked_until.map(bson_now),
                    } },
                )
                .await
                .context("Failed to update lockout state")?;
            Ok(())
        })
        .await
    }

    async fn record_failed_login(
        &self,
        id: &str,
        max_attempts: u32,
        lock_until: DateTime<Utc>,
    ) -> Result<Option<User>> {
        track_db_operation("record_failed_login", USERS, async {
            self.users()
                .find_one_and_update(
                    doc! { "_id": id },
                    failed_login_update(max_attempts, lock_until),
                )
                .return_document(ReturnDocument::After)
                .await
                .context("Failed to record failed login")
        })
        .await
    }

    async fn update_verified_flag(&self, id: &str, verified: bool) -> Result<()> {
        track_db_operation("update", USERS, async {
            self.users()
                .update_one(
                    doc! { "_id": id },
                    doc! { "$set": { "is_email_verified": verified } },
                )
                .await
                .context("Failed to update verification flag")?;
            Ok(())
        })
        .await
    }

    async fn delete(&self, id: &str) -> Result<bool> {
        let deleted = track_db_operation("delete", USERS, async {
            let result = self
                .users()
                .delete_one(doc! { "_id": id })
                .await
                .context("Failed to delete user")?;
            Ok(result.deleted_count > 0)
        })
        .await?;
        if !deleted {
            return Ok(false);
        }

        track_db_operation("delete_many", MFA_CODES, async {
            self.mfa_codes()
                .delete_many(doc! { "user_id": id })
                .await
                .context("Failed to delete MFA codes")
        })
        .await?;
        track_db_operation("delete_many", VERIFICATION_TOKENS, async {
            self.verification_tokens()
                .delete_many(doc! { "user_id": id })
                .await
                .context("Failed to delete verification tokens")
        })
        .await?;
        track_db_operation("delete_many", SCORES, async {
            self.scores()
                .delete_many(doc! { "user_id": id })
                .await
                .context("Failed to delete scores")
        })
        .await?;
        track_db_operation("delete", USER_PREFERENCES, async {
            self.preferences()
                .delete_one(doc! { "_id": id })
                .await
                .context("Failed to delete preferences")
        })
        .await?;
        track_db_operation("delete_many", INVITATIONS, async {
            self.invitations()
                .delete_many(doc! { "invited_by": id })
                .await
                .context("Failed to delete invitations")
        })
        .await?;
        Ok(true)
    }
}

#[async_trait]
impl MfaCodeStore for MongoStore {
    async fn replace_for_user(&self, code: &MfaCode) -> Result<()> {
        let fields = fields_without_id(code)?;
        track_db_operation("upsert", MFA_CODES, async {
            self.mfa_codes()
                .update_one(
                    doc! { "user_id": &code.user_id },
                    doc! { "$set": fields, "$setOnInsert": { "_id": &code.id } },
                )
                .upsert(true)
                .await
                .context("Failed to store MFA code")?;
            Ok(())
        })
        .await
    }

    async fn find_valid(
        &self,
        user_id: &str,
        code: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<MfaCode>> {
        track_db_operation("find_one", MFA_CODES, async {
            self.mfa_codes()
                .find_one(doc! {
                    "user_id": user_id,
                    "code": code,
                    "expiresAt": { "$gt": bson_now(now) },
                })
                .await
                .context("Failed to query MFA code")
        })
        .await
    }

    async fn delete_for_user(&self, user_id: &str) -> Result<()> {
        track_db_operation("delete_many", MFA_CODES, async {
            self.mfa_codes()
                .delete_many(doc! { "user_id": user_id })
                .await
                .context("Failed to delete MFA codes")?;
            Ok(())
        })
        .await
    }
}

#[async_trait]
impl VerificationTokenStore for MongoStore {
    async fn replace_for_user(&self, token: &VerificationToken) -> Result<()> {
        let fields = fields_without_id(token)?;
        track_db_operation("upsert", VERIFICATION_TOKENS, async {
            self.verification_tokens()
                .update_one(
                    doc! { "user_id": &token.user_id },
                    doc! { "$set": fields, "$setOnInsert": { "_id": &token.id } },
                )
                .upsert(true)
                .await
                .context("Failed to store verification token")?;
            Ok(())
        })
        .await
    }

    async fn find_valid(
        &self,
        token_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<VerificationToken>> {
        track_db_operation("find_one", VERIFICATION_TOKENS, async {
            self.verification_tokens()
                .find_one(doc! {
                    "token_hash": token_hash,
                    "expiresAt": { "$gt": bson_now(now) },
                })
                .await
                .context("Failed to query verification token")
        })
        .await
    }

    async fn delete_for_user(&self, user_id: &str) -> Result<()> {
        track_db_operation("delete_many", VERIFICATION_TOKENS, async {
            self.verification_tokens()
                .delete_many(doc! { "user_id": user_id })
                .await
                .context("Failed to delete verification tokens")?;
            Ok(())
        })
        .await
    }
}

#[async_trait]
impl ScoreStore for MongoStore {
    async fn record_high_score(
        &self,
        user_id: &str,
        game_type: GameType,
        date: NaiveDate,
        score: i64,
    ) -> Result<ScoreRecord> {
        let record_id = ScoreRecord::record_id(user_id, game_type, date);

        track_db_operation("record_high_score", SCORES, async {
            // Raise an existing lower score in one conditional update
            let raised = self
                .scores()
                .find_one_and_update(
                    doc! { "_id": &record_id, "score": { "$lt": score } },
                    doc! { "$set": { "score": score, "updatedAt": BsonDateTime::now() } },
                )
                .return_document(ReturnDocument::After)
                .await
                .context("Failed to raise score")?;
            if let Some(record) = raised {
                return Ok(record);
            }

            // First submission of the day; a no-op when the record exists
            let fresh = fields_without_id(&ScoreRecord::new(user_id, game_type, date, score))?;
            if let Err(err) = self
                .scores()
                .update_one(doc! { "_id": &record_id }, doc! { "$setOnInsert": fresh })
                .upsert(true)
                .await
            {
                if !is_duplicate_key(&err) {
                    return Err(anyhow::Error::new(err).context("Failed to create score record"));
                }
            }

            self.scores()
                .find_one(doc! { "_id": &record_id })
                .await
                .context("Failed to load score record")?
                .ok_or_else(|| anyhow!("Score record {} vanished after upsert", record_id))
        })
        .await
    }

    async fn for_day(&self, user_id: &str, date: NaiveDate) -> Result<Vec<ScoreRecord>> {
        track_db_operation("find", SCORES, async {
            let cursor = self
                .scores()
                .find(doc! { "user_id": user_id, "date": date.to_string() })
                .await
                .context("Failed to query daily scores")?;
            cursor.try_collect().await.context("Failed to read scores")
        })
        .await
    }

    async fn history(
        &self,
        user_id: &str,
        game_type: Option<GameType>,
        limit: i64,
    ) -> Result<Vec<ScoreRecord>> {
        let mut filter = doc! { "user_id": user_id };
        if let Some(game_type) = game_type {
            filter.insert("game_type", game_type.as_str());
        }
        track_db_operation("find", SCORES, async {
            let cursor = self
                .scores()
                .find(filter)
                .sort(doc! { "date": -1, "game_type": 1 })
                .limit(limit)
                .await
                .context("Failed to query score history")?;
            cursor.try_collect().await.context("Failed to read scores")
        })
        .await
    }

    async fn best(&self, user_id: &str) -> Result<Vec<(GameType, i64)>> {
        let pipeline = vec![
            doc! { "$match": { "user_id": user_id } },
            doc! { "$group": { "_id": "$game_type", "best": { "$max": "$score" } } },
        ];
        let rows: Vec<Document> = track_db_operation("aggregate", SCORES, async {
            self.scores()
                .aggregate(pipeline)
                .await
                .context("Failed to aggregate best scores")?
                .try_collect()
                .await
                .context("Failed to read best scores")
        })
        .await?;

        rows.into_iter()
            .map(|row| {
                let game_type: GameType = bson::from_bson(
                    row.get("_id").cloned().unwrap_or(bson::Bson::Null),
                )
                .context("Unknown game type in scores")?;
                let best = row
                    .get_i64("best")
                    .or_else(|_| row.get_i32("best").map(i64::from))
                    .context("Missing best score")?;
                Ok((game_type, best))
            })
            .collect()
    }
}

#[async_trait]
impl PreferencesStore for MongoStore {
    async fn get(&self, user_id: &str) -> Result<Option<UserPreferences>> {
        track_db_operation("find_one", USER_PREFERENCES, async {
            self.preferences()
                .find_one(doc! { "_id": user_id })
                .await
                .context("Failed to load preferences")
        })
        .await
    }

    async fn upsert(&self, prefs: &UserPreferences) -> Result<()> {
        track_db_operation("upsert", USER_PREFERENCES, async {
            self.preferences()
                .replace_one(doc! { "_id": &prefs.user_id }, prefs)
                .upsert(true)
                .await
                .context("Failed to save preferences")?;
            Ok(())
        })
        .await
    }
}

#[async_trait]
impl AiCacheStore for MongoStore {
    async fn find_hint(
        &self,
        vocabulary_id: &str,
        mode: QuizMode,
    ) -> Result<Option<HintCacheEntry>> {
        track_db_operation("find_one", HINT_CACHE, async {
            self.hints()
                .find_one(doc! { "vocabulary_id": vocabulary_id, "mode": mode.as_str() })
                .await
                .context("Failed to query hint cache")
        })
        .await
    }

    async fn save_hint(&self, entry: &HintCacheEntry) -> Result<()> {
        track_db_operation("upsert", HINT_CACHE, async {
            self.hints()
                .update_one(
                    doc! { "vocabulary_id": &entry.vocabulary_id, "mode": entry.mode.as_str() },
                    doc! {
                        "$set": { "hint": &entry.hint },
                        "$setOnInsert": {
                            "_id": &entry.id,
                            "createdAt": bson_now(entry.created_at),
                        },
                    },
                )
                .upsert(true)
                .await
                .context("Failed to cache hint")?;
            Ok(())
        })
        .await
    }

    async fn list_hints(&self) -> Result<Vec<HintCacheEntry>> {
        track_db_operation("find", HINT_CACHE, async {
            let cursor = self
                .hints()
                .find(doc! {})
                .sort(doc! { "createdAt": -1 })
                .await
                .context("Failed to list cached hints")?;
            cursor.try_collect().await.context("Failed to read hints")
        })
        .await
    }

    async fn update_hint(&self, id: &str, hint: &str) -> Result<Option<HintCacheEntry>> {
        track_db_operation("update", HINT_CACHE, async {
            self.hints()
                .find_one_and_update(doc! { "_id": id }, doc! { "$set": { "hint": hint } })
                .return_document(ReturnDocument::After)
                .await
                .context("Failed to update cached hint")
        })
        .await
    }

    async fn delete_hint(&self, id: &str) -> Result<bool> {
        track_db_operation("delete", HINT_CACHE, async {
            let result = self
                .hints()
                .delete_one(doc! { "_id": id })
                .await
                .context("Failed to delete cached hint")?;
            Ok(result.deleted_count > 0)
        })
        .await
    }

    async fn clear_hints(&self) -> Result<u64> {
        track_db_operation("delete_many", HINT_CACHE, async {
            let result = self
                .hints()
                .delete_many(doc! {})
                .await
                .context("Failed to clear hint cache")?;
            Ok(result.deleted_count)
        })
        .await
    }

    async fn find_tts(&self, text: &str) -> Result<Option<TtsCacheEntry>> {
        track_db_operation("find_one", TTS_CACHE, async {
            self.tts()
                .find_one(doc! { "text": text })
                .await
                .context("Failed to query TTS cache")
        })
        .await
    }

    async fn save_tts(&self, entry: &TtsCacheEntry) -> Result<()> {
        track_db_operation("upsert", TTS_CACHE, async {
            self.tts()
                .update_one(
                    doc! { "text": &entry.text },
                    doc! {
                        "$set": { "audio": entry.audio.clone() },
                        "$setOnInsert": {
                            "_id": &entry.id,
                            "createdAt": bson_now(entry.created_at),
                        },
                    },
                )
                .upsert(true)
                .await
                .context("Failed to cache TTS audio")?;
            Ok(())
        })
        .await
    }

    async fn list_tts(&self) -> Result<Vec<TtsCacheSummary>> {
        let entries: Vec<TtsCacheEntry> = track_db_operation("find", TTS_CACHE, async {
            self.tts()
                .find(doc! {})
                .sort(doc! { "createdAt": -1 })
                .await
                .context("Failed to list TTS cache")?
                .try_collect()
                .await
                .context("Failed to read TTS cache")
        })
        .await?;
        Ok(entries.iter().map(TtsCacheSummary::from).collect())
    }

    async fn get_tts(&self, id: &str) -> Result<Option<TtsCacheEntry>> {
        track_db_operation("find_one", TTS_CACHE, async {
            self.tts()
                .find_one(doc! { "_id": id })
                .await
                .context("Failed to load TTS entry")
        })
        .await
    }

    async fn delete_tts(&self, id: &str) -> Result<bool> {
        track_db_operation("delete", TTS_CACHE, async {
            let result = self
                .tts()
                .delete_one(doc! { "_id": id })
                .await
                .context("Failed to delete TTS entry")?;
            Ok(result.deleted_count > 0)
        })
        .await
    }

    async fn clear_tts(&self) -> Result<u64> {
        track_db_operation("delete_many", TTS_CACHE, async {
            let result = self
                .tts()
                .delete_many(doc! {})
                .await
                .context("Failed to clear TTS cache")?;
            Ok(result.deleted_count)
        })
        .await
    }

    async fn stats(&self) -> Result<CacheStats> {
        let hint_count = track_db_operation("count", HINT_CACHE, async {
            self.hints()
                .count_documents(doc! {})
                .await
                .context("Failed to count cached hints")
        })
        .await?;
        let tts_count = track_db_operation("count", TTS_CACHE, async {
            self.tts()
                .count_documents(doc! {})
                .await
                .context("Failed to count TTS cache")
        })
        .await?;

        let pipeline = vec![doc! {
            "$group": { "_id": null, "bytes": { "$sum": { "$binarySize": "$audio" } } }
        }];
        let totals: Vec<Document> = track_db_operation("aggregate", TTS_CACHE, async {
            self.tts()
                .aggregate(pipeline)
                .await
                .context("Failed to sum TTS cache size")?
                .try_collect()
                .await
                .context("Failed to read TTS cache size")
        })
        .await?;
        let tts_total_bytes = totals
            .first()
            .and_then(|row| {
                row.get_i64("bytes")
                    .ok()
                    .or_else(|| row.get_i32("bytes").ok().map(i64::from))
            })
            .and_then(|bytes| u64::try_from(bytes).ok())
            .unwrap_or(0);

        Ok(CacheStats {
            hint_count,
            tts_count,
            tts_total_bytes,
        })
    }
}

#[async_trait]
impl InvitationStore for MongoStore {
    async fn insert(&self, invitation: &Invitation) -> Result<()> {
        track_db_operation("insert", INVITATIONS, async {
            self.invitations()
                .insert_one(invitation)
                .await
                .map_err(|err| {
                    duplicate_key_error(err, &["token_hash"], "Failed to insert invitation")
                })?;
            Ok(())
        })
        .await
    }

    async fn list(&self) -> Result<Vec<Invitation>> {
        track_db_operation("find", INVITATIONS, async {
            let cursor = self
                .invitations()
                .find(doc! {})
                .sort(doc! { "createdAt": -1 })
                .await
                .context("Failed to list invitations")?;
            cursor
                .try_collect()
                .await
                .context("Failed to read invitations")
        })
        .await
    }

    async fn get(&self, id: &str) -> Result<Option<Invitation>> {
        track_db_operation("find_one", INVITATIONS, async {
            self.invitations()
                .find_one(doc! { "_id": id })
                .await
                .context("Failed to load invitation")
        })
        .await
    }

    async fn find_pending_for_email(
        &self,
        email: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<Invitation>> {
        track_db_operation("find_one", INVITATIONS, async {
            self.invitations()
                .find_one(doc! {
                    "email": email,
                    "accepted": false,
                    "expiresAt": { "$gt": bson_now(now) },
                })
                .await
                .context("Failed to query invitation by email")
        })
        .await
    }

    async fn find_pending_by_token(
        &self,
        token_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<Invitation>> {
        track_db_operation("find_one", INVITATIONS, async {
            self.invitations()
                .find_one(doc! {
                    "token_hash": token_hash,
                    "accepted": false,
                    "expiresAt": { "$gt": bson_now(now) },
                })
                .await
                .context("Failed to query invitation by token")
        })
        .await
    }

    async fn renew(
        &self,
        id: &str,
        token_hash: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<Option<Invitation>> {
        track_db_operation("update", INVITATIONS, async {
            self.invitations()
                .find_one_and_update(
                    doc! { "_id": id, "accepted": false },
                    doc! { "$set": {
                        "token_hash": token_hash,
                        "expiresAt": bson_now(expires_at),
                    } },
                )
                .return_document(ReturnDocument::After)
                .await
                .context("Failed to renew invitation")
        })
        .await
    }

    async fn mark_accepted(&self, id: &str, at: DateTime<Utc>) -> Result<bool> {
        track_db_operation("update", INVITATIONS, async {
            let result = self
                .invitations()
                .update_one(
                    doc! { "_id": id, "accepted": false },
                    doc! { "$set": { "accepted": true, "acceptedAt": bson_now(at) } },
                )
                .await
                .context("Failed to accept invitation")?;
            Ok(result.modified_count > 0)
        })
        .await
    }

    async fn delete(&self, id: &str) -> Result<bool> {
        track_db_operation("delete", INVITATIONS, async {
            let result = self
                .invitations()
                .delete_one(doc! { "_id": id })
                .await
                .context("Failed to delete invitation")?;
            Ok(result.deleted_count > 0)
        })
        .await
    }
}

#[async_trait]
impl StoreHealth for MongoStore {
    fn backend(&self) -> &'static str {
        "mongodb"
    }

    async fn ping(&self) -> Result<()> {
        track_db_operation("ping", "admin", async {
            self.db
                .run_command(doc! { "ping": 1 })
                .await
                .context("MongoDB ping failed")?;
            Ok(())
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_filter_matches_everything() {
        assert_eq!(vocabulary_filter_doc(&VocabularyFilter::default()), doc! {});
    }

    #[test]
    fn tags_are_escaped_case_insensitive_regexes() {
        let filter = VocabularyFilter::with_tags(vec!["n5+".to_string()]);
        let doc = vocabulary_filter_doc(&filter);
        let clauses = doc.get_array("$and").unwrap();
        assert_eq!(
            clauses[0],
            bson::Bson::Document(doc! { "tags": { "$regex": "n5\\+", "$options": "i" } })
        );
    }

    #[test]
    fn failed_login_update_counts_then_locks_in_one_pipeline() {
        let lock_until = Utc::now();
        let stages = failed_login_update(10, lock_until);
        assert_eq!(stages.len(), 2);

        let count = stages[0].get_document("$set").unwrap();
        assert!(count.contains_key("failed_login_attempts"));

        let lock = stages[1]
            .get_document("$set")
            .unwrap()
            .get_document("lockedUntil")
            .unwrap()
            .get_array("$cond")
            .unwrap();
        assert_eq!(
            lock[0],
            bson::Bson::Document(doc! { "$gte": [ "$failed_login_attempts", 10_i64 ] })
        );
        assert_eq!(lock[1], bson::Bson::DateTime(bson_now(lock_until)));
        assert_eq!(lock[2], bson::Bson::String("$lockedUntil".to_string()));
    }

    #[test]
    fn upsert_fields_drop_the_id() {
        let code = MfaCode::new("user-1", "123456".to_string(), chrono::Duration::minutes(5));
        let fields = fields_without_id(&code).unwrap();
        assert!(!fields.contains_key("_id"));
        assert_eq!(fields.get_str("user_id").unwrap(), "user-1");
    }
}
