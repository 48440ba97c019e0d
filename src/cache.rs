use std::fmt::Display;

use redis::{AsyncCommands, Client};

use crate::error::AppResult;

/// Default TTL for cached recommendation lists (1 hour)
pub const REC_CACHE_TTL: u64 = 3600;

/// Cache keys used by the recommendation engine.
///
/// The recommendation key is (user, k) only: the refresh flag decides
/// whether the read happens, never what key is written.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CacheKey {
    Recommendations { user_id: i64, k: usize },
}

impl Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CacheKey::Recommendations { user_id, k } => {
                write!(f, "rec:user:{}:k:{}", user_id, k)
            }
        }
    }
}

/// Read-through cache over string payloads.
///
/// Values are JSON documents; encoding and decoding stay with the
/// caller so a decode failure can be treated as a miss.
#[async_trait::async_trait]
pub trait RecCache: Send + Sync {
    /// Returns the raw cached value, or None on a miss
    async fn get(&self, key: &CacheKey) -> AppResult<Option<String>>;

    /// Stores a value with a TTL in seconds, overwriting any prior value
    async fn set(&self, key: &CacheKey, value: String, ttl_seconds: u64) -> AppResult<()>;
}

/// Creates a Redis client for caching
///
/// Establishes a connection to Redis for fast data caching.
/// Uses connection pooling via the connection-manager feature.
pub fn create_redis_client(redis_url: &str) -> anyhow::Result<Client> {
    let client = Client::open(redis_url)?;
    Ok(client)
}

/// Redis-backed recommendation cache
#[derive(Clone)]
pub struct RedisCache {
    redis_client: Client,
}

impl RedisCache {
    pub fn new(redis_client: Client) -> Self {
        Self { redis_client }
    }
}

#[async_trait::async_trait]
impl RecCache for RedisCache {
    async fn get(&self, key: &CacheKey) -> AppResult<Option<String>> {
        let mut conn = self.redis_client.get_multiplexed_async_connection().await?;
        let cached: Option<String> = conn.get(format!("{}", key)).await?;
        Ok(cached)
    }

    async fn set(&self, key: &CacheKey, value: String, ttl_seconds: u64) -> AppResult<()> {
        let mut conn = self.redis_client.get_multiplexed_async_connection().await?;
        let _: () = conn.set_ex(format!("{}", key), value, ttl_seconds).await?;
        Ok(())
    }
}
