use crate::{
    config::Config,
    middlewares::rate_limit::{MemoryRateLimiter, RateLimiter, RedisRateLimiter},
    stores::Stores,
};
use mongodb::Client as MongoClient;
use redis::aio::ConnectionManager;
use std::sync::Arc;

use ai_client::{AiProvider, OpenAiClient};
use email_service::Notifier;

pub struct AppState {
    pub config: Config,
    pub stores: Stores,
    pub rate_limiter: Arc<dyn RateLimiter>,
    pub notifier: Notifier,
    /// `None` when no OpenAI key is configured.
    pub ai: Option<Arc<dyn AiProvider>>,
}

impl AppState {
    pub async fn new(
        config: Config,
        mongo_client: MongoClient,
        redis_client: Option<redis::Client>,
        notifier: Notifier,
    ) -> anyhow::Result<Self> {
        let stores = Stores::mongo(mongo_client.database(&config.mongo_database)).await?;

        let rate_limiter: Arc<dyn RateLimiter> = match redis_client {
            Some(client) => Arc::new(RedisRateLimiter::new(connect_redis(client).await?)),
            None => {
                tracing::warn!("REDIS_URI not set, rate limits are tracked per process");
                Arc::new(MemoryRateLimiter::default())
            }
        };

        let ai: Option<Arc<dyn AiProvider>> = match config.openai_api_key.as_deref() {
            Some(key) => Some(Arc::new(OpenAiClient::new(key)?)),
            None => {
                tracing::info!("OPENAI_API_KEY not set, AI hints and TTS disabled");
                None
            }
        };

        Ok(Self::with_backends(config, stores, rate_limiter, notifier, ai))
    }

    pub fn with_backends(
        config: Config,
        stores: Stores,
        rate_limiter: Arc<dyn RateLimiter>,
        notifier: Notifier,
        ai: Option<Arc<dyn AiProvider>>,
    ) -> Self {
        Self {
            config,
            stores,
            rate_limiter,
            notifier,
            ai,
        }
    }
}

async fn connect_redis(redis_client: redis::Client) -> anyhow::Result<ConnectionManager> {
    tracing::info!("Attempting to connect to Redis...");

    let redis = tokio::time::timeout(
        std::time::Duration::from_secs(30),
        ConnectionManager::new(redis_client),
    )
    .await
    .map_err(|_| anyhow::anyhow!("Redis connection timeout after 30s"))??;

    let mut conn = redis.clone();
    tokio::time::timeout(
        std::time::Duration::from_secs(5),
        redis::cmd("PING").query_async::<String>(&mut conn),
    )
    .await
    .map_err(|_| anyhow::anyhow!("Redis PING timeout after 5s"))??;

    tracing::info!("Redis connection established successfully");
    Ok(redis)
}

pub mod ai_client;
pub mod audit_service;
pub mod auth_service;
pub mod cache_service;
pub mod email_service;
pub mod hint_service;
pub mod invitation_service;
pub mod preferences_service;
pub mod quiz_service;
pub mod score_service;
pub mod user_management_service;
pub mod vocabulary_service;
