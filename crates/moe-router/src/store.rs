//! Optional persistence backing store for the performance tracker.
//!
//! The in-memory tracker is authoritative at runtime; a store only extends
//! counters across restarts. Grounded on `synapse_cache::ResponseCache`'s
//! `redis::Client` + `get_multiplexed_async_connection` pattern and its
//! "swallow and log" error handling.

use thiserror::Error;

/// Persistence backing store failure. Never propagated into the selection
/// path: callers log it via `tracing::warn!` and keep serving from memory.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("persistence backend: {0}")]
    Backend(String),
}

/// A small key/value interface for persisting tracker counters.
///
/// A missing or failing store degrades to pure in-memory operation; this is
/// the same contract the teacher's cache gives a failed Valkey connection.
#[async_trait::async_trait]
pub trait PersistenceStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;
    async fn put(&self, key: &str, value: &str) -> Result<(), StoreError>;
    async fn incr(&self, key: &str, delta: i64) -> Result<i64, StoreError>;
}

/// No-op store: every call succeeds and reports nothing. The tracker's
/// default collaborator.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopStore;

#[async_trait::async_trait]
impl PersistenceStore for NoopStore {
    async fn get(&self, _key: &str) -> Result<Option<String>, StoreError> {
        Ok(None)
    }

    async fn put(&self, _key: &str, _value: &str) -> Result<(), StoreError> {
        Ok(())
    }

    async fn incr(&self, _key: &str, delta: i64) -> Result<i64, StoreError> {
        Ok(delta)
    }
}

#[cfg(feature = "redis-store")]
pub use redis_store::RedisStore;

#[cfg(feature = "redis-store")]
mod redis_store {
    use super::{PersistenceStore, StoreError};

    /// A store backed by Redis/Valkey, mirroring `synapse_cache::ResponseCache`'s
    /// connection and error-handling pattern.
    #[derive(Clone)]
    pub struct RedisStore {
        client: redis::Client,
        key_prefix: String,
    }

    impl RedisStore {
        /// # Errors
        ///
        /// Returns [`StoreError`] if the URL is invalid.
        pub fn new(url: &str, key_prefix: impl Into<String>) -> Result<Self, StoreError> {
            let client = redis::Client::open(url).map_err(|e| StoreError::Backend(format!("invalid URL: {e}")))?;
            Ok(Self { client, key_prefix: key_prefix.into() })
        }

        fn key(&self, key: &str) -> String {
            format!("{}:{key}", self.key_prefix)
        }
    }

    #[async_trait::async_trait]
    impl PersistenceStore for RedisStore {
        async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
            use redis::AsyncCommands;
            let mut conn = self
                .client
                .get_multiplexed_async_connection()
                .await
                .map_err(|e| StoreError::Backend(format!("connection failed: {e}")))?;
            conn.get(self.key(key)).await.map_err(|e| StoreError::Backend(format!("GET failed: {e}")))
        }

        async fn put(&self, key: &str, value: &str) -> Result<(), StoreError> {
            use redis::AsyncCommands;
            let mut conn = self
                .client
                .get_multiplexed_async_connection()
                .await
                .map_err(|e| StoreError::Backend(format!("connection failed: {e}")))?;
            let _: () = conn
                .set(self.key(key), value)
                .await
                .map_err(|e| StoreError::Backend(format!("SET failed: {e}")))?;
            Ok(())
        }

        async fn incr(&self, key: &str, delta: i64) -> Result<i64, StoreError> {
            use redis::AsyncCommands;
            let mut conn = self
                .client
                .get_multiplexed_async_connection()
                .await
                .map_err(|e| StoreError::Backend(format!("connection failed: {e}")))?;
            conn.incr(self.key(key), delta)
                .await
                .map_err(|e| StoreError::Backend(format!("INCRBY failed: {e}")))
        }
    }
}
