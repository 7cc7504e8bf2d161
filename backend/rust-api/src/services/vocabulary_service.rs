use std::collections::BTreeSet;
use validator::Validate;

use crate::{
    error::{AppError, AppResult},
    models::vocabulary::{
        parse_tag_filter, CreateVocabularyRequest, ListVocabularyQuery, RandomVocabularyQuery,
        UpdateVocabularyRequest, Vocabulary, VocabularyListResponse, VocabularyResponse,
    },
    services::audit_service::{AuditEventParams, AuditEventType, AuditService},
    stores::{Page, Stores, VocabularyFilter},
};

const DEFAULT_PAGE_SIZE: u64 = 20;
const MAX_PAGE_SIZE: u64 = 100;
const DEFAULT_RANDOM_COUNT: usize = 10;
const MAX_RANDOM_COUNT: usize = 50;

pub struct VocabularyService<'a> {
    stores: &'a Stores,
}

impl<'a> VocabularyService<'a> {
    pub fn new(stores: &'a Stores) -> Self {
        Self { stores }
    }

    pub async fn list(&self, query: ListVocabularyQuery) -> AppResult<VocabularyListResponse> {
        let page = query.page.unwrap_or(1);
        let page_size = query.page_size.unwrap_or(DEFAULT_PAGE_SIZE);
        if page < 1 {
            return Err(AppError::validation("page must be at least 1"));
        }
        if !(1..=MAX_PAGE_SIZE).contains(&page_size) {
            return Err(AppError::validation(format!(
                "page_size must be between 1 and {}",
                MAX_PAGE_SIZE
            )));
        }

        let filter = VocabularyFilter {
            tags: parse_tag_filter(query.tags.as_deref()),
            search: query
                .search
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty()),
            ..VocabularyFilter::default()
        };

        let total = self.stores.vocabulary.count(&filter).await?;
        let items = self
            .stores
            .vocabulary
            .find(&filter, Page::new(page, page_size))
            .await?;

        Ok(VocabularyListResponse {
            items: items.into_iter().map(VocabularyResponse::from).collect(),
            total,
            page,
            page_size,
            total_pages: total.div_ceil(page_size),
        })
    }

    /// Distinct whitespace-separated tags across all entries, sorted.
    pub async fn tags(&self) -> AppResult<Vec<String>> {
        let raw = self.stores.vocabulary.tag_strings().await?;
        let unique: BTreeSet<String> = raw
            .iter()
            .flat_map(|tags| tags.split_whitespace())
            .map(str::to_string)
            .collect();
        Ok(unique.into_iter().collect())
    }

    pub async fn random(&self, query: RandomVocabularyQuery) -> AppResult<Vec<VocabularyResponse>> {
        let count = query.count.unwrap_or(DEFAULT_RANDOM_COUNT);
        if !(1..=MAX_RANDOM_COUNT).contains(&count) {
            return Err(AppError::validation(format!(
                "count must be between 1 and {}",
                MAX_RANDOM_COUNT
            )));
        }

        let filter = VocabularyFilter::with_tags(parse_tag_filter(query.tags.as_deref()));
        let items = self.stores.vocabulary.random_sample(&filter, count).await?;
        Ok(items.into_iter().map(VocabularyResponse::from).collect())
    }

    pub async fn get(&self, id: &str) -> AppResult<VocabularyResponse> {
        Ok(self.fetch(id).await?.into())
    }

    pub async fn create(
        &self,
        req: CreateVocabularyRequest,
        audit: &AuditService,
        admin_id: &str,
    ) -> AppResult<VocabularyResponse> {
        req.validate()?;

        let vocab = Vocabulary::new(
            req.expression.trim(),
            req.reading.trim(),
            req.meaning.trim(),
            req.tags.unwrap_or_default().trim(),
        );
        self.stores.vocabulary.insert(&vocab).await?;

        audit.log_event(
            AuditEventParams::new(AuditEventType::VocabularyCreated, true)
                .user_id(admin_id)
                .details(&vocab.id),
        );
        Ok(vocab.into())
    }

    pub async fn update(
        &self,
        id: &str,
        req: UpdateVocabularyRequest,
        audit: &AuditService,
        admin_id: &str,
    ) -> AppResult<VocabularyResponse> {
        req.validate()?;

        let mut vocab = self.fetch(id).await?;
        req.apply(&mut vocab);

        if !self.stores.vocabulary.replace(&vocab).await? {
            return Err(AppError::not_found("Vocabulary not found"));
        }

        audit.log_event(
            AuditEventParams::new(AuditEventType::VocabularyUpdated, true)
                .user_id(admin_id)
                .details(&vocab.id),
        );
        Ok(vocab.into())
    }

    /// Cached hints for the entry go with it.
    pub async fn delete(&self, id: &str, audit: &AuditService, admin_id: &str) -> AppResult<()> {
        if !self.stores.vocabulary.delete(id).await? {
            return Err(AppError::not_found("Vocabulary not found"));
        }

        audit.log_event(
            AuditEventParams::new(AuditEventType::VocabularyDeleted, true)
                .user_id(admin_id)
                .details(id),
        );
        Ok(())
    }

    async fn fetch(&self, id: &str) -> AppResult<Vocabulary> {
        self.stores
            .vocabulary
            .get(id)
            .await?
            .ok_or_else(|| AppError::not_found("Vocabulary not found"))
    }
}
