//! Redis read-cache adapter.
//!
//! The cache is strictly advisory: every read-side method falls back to SQL
//! on a miss or on any Redis failure, so get/set errors degrade to misses
//! instead of surfacing. Keys are namespaced and version-tagged for safe
//! invalidation; writers invalidate by TTL-driven overwrite, never by
//! explicit eviction.

use std::time::Duration;

use bb8_redis::bb8::Pool;
use bb8_redis::RedisConnectionManager;
use redis::AsyncCommands;
use serde::de::DeserializeOwned;
use serde::Serialize;
use sha2::{Digest, Sha256};
use tracing::debug;

/// Namespace prefix on every key.
const CACHE_NAMESPACE: &str = "apiary:v1";

/// Errors raised while connecting; runtime errors never surface.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("invalid redis url: {0}")]
    InvalidUrl(String),
    #[error("redis connection failed: {0}")]
    Connection(String),
}

/// Pooled Redis client for per-method response caching.
#[derive(Clone)]
pub struct RedisCache {
    pool: Pool<RedisConnectionManager>,
}

impl RedisCache {
    /// Connect and verify the endpoint answers a ping.
    pub async fn connect(url: &str) -> Result<Self, CacheError> {
        let manager = RedisConnectionManager::new(url)
            .map_err(|err| CacheError::InvalidUrl(err.to_string()))?;
        let pool = Pool::builder()
            .max_size(8)
            .build(manager)
            .await
            .map_err(|err| CacheError::Connection(err.to_string()))?;
        {
            let mut conn = pool
                .get()
                .await
                .map_err(|err| CacheError::Connection(err.to_string()))?;
            redis::cmd("PING")
                .query_async::<_, ()>(&mut *conn)
                .await
                .map_err(|err| CacheError::Connection(err.to_string()))?;
        }
        Ok(Self { pool })
    }

    /// Fetch and decode a cached value; any failure is a miss.
    pub async fn get_json<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let mut conn = match self.pool.get().await {
            Ok(conn) => conn,
            Err(error) => {
                debug!(%error, "cache checkout failed");
                return None;
            }
        };
        let raw: Option<String> = match conn.get(key).await {
            Ok(raw) => raw,
            Err(error) => {
                debug!(key, %error, "cache get failed");
                return None;
            }
        };
        raw.and_then(|raw| serde_json::from_str(&raw).ok())
    }

    /// Encode and store a value with a TTL; failures are dropped.
    pub async fn set_json<T: Serialize>(&self, key: &str, value: &T, ttl: Duration) {
        let Ok(encoded) = serde_json::to_string(value) else {
            return;
        };
        let mut conn = match self.pool.get().await {
            Ok(conn) => conn,
            Err(error) => {
                debug!(%error, "cache checkout failed");
                return;
            }
        };
        let result: Result<(), redis::RedisError> = conn
            .set_ex(key, encoded, ttl.as_secs().max(1))
            .await;
        if let Err(error) = result {
            debug!(key, %error, "cache set failed");
        }
    }
}

/// Namespaced cache key for one method invocation: the parameter blob is
/// hashed so arbitrary client input cannot bloat key space.
pub fn method_key(method: &str, params: &serde_json::Value) -> String {
    let mut hasher = Sha256::new();
    hasher.update(params.to_string().as_bytes());
    let digest = hasher.finalize();
    let hash: String = digest.iter().take(16).map(|b| format!("{b:02x}")).collect();
    format!("{CACHE_NAMESPACE}:{method}:{hash}")
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn keys_are_namespaced_and_stable() {
        let a = method_key("condenser_api.get_blog", &json!(["alice", 0, 20]));
        let b = method_key("condenser_api.get_blog", &json!(["alice", 0, 20]));
        let c = method_key("condenser_api.get_blog", &json!(["bob", 0, 20]));
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert!(a.starts_with("apiary:v1:condenser_api.get_blog:"));
    }
}
