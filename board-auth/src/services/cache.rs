use async_trait::async_trait;
use redis::{aio::ConnectionManager, Client};
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Key/value cache with per-key expiry. Holds the notification dedup markers.
#[async_trait]
pub trait CacheStore: Send + Sync {
    async fn set_cache(&self, key: &str, value: &str, expiry_seconds: u64)
        -> Result<(), anyhow::Error>;
    async fn get_cache(&self, key: &str) -> Result<Option<String>, anyhow::Error>;
    async fn delete_cache(&self, key: &str) -> Result<(), anyhow::Error>;
    async fn health_check(&self) -> Result<(), anyhow::Error>;
}

#[derive(Clone)]
pub struct RedisService {
    manager: ConnectionManager,
}

impl RedisService {
    pub async fn new(config: &crate::config::RedisConfig) -> Result<Self, anyhow::Error> {
        tracing::info!("Connecting to Redis");
        let client = Client::open(config.url.clone())?;

        let manager = client.get_connection_manager().await.map_err(|e| {
            tracing::error!("Failed to get Redis connection manager: {}", e);
            anyhow::anyhow!("Failed to connect to Redis: {}", e)
        })?;

        tracing::info!("Successfully connected to Redis");
        Ok(Self { manager })
    }
}

#[async_trait]
impl CacheStore for RedisService {
    async fn health_check(&self) -> Result<(), anyhow::Error> {
        let mut conn = self.manager.clone();
        redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(|e| anyhow::anyhow!("Redis health check failed: {}", e))
    }

    async fn set_cache(
        &self,
        key: &str,
        value: &str,
        expiry_seconds: u64,
    ) -> Result<(), anyhow::Error> {
        let mut conn = self.manager.clone();
        redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("EX")
            .arg(expiry_seconds)
            .query_async(&mut conn)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to set cache: {}", e))
    }

    async fn get_cache(&self, key: &str) -> Result<Option<String>, anyhow::Error> {
        let mut conn = self.manager.clone();
        redis::cmd("GET")
            .arg(key)
            .query_async(&mut conn)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to get cache: {}", e))
    }

    async fn delete_cache(&self, key: &str) -> Result<(), anyhow::Error> {
        let mut conn = self.manager.clone();
        redis::cmd("DEL")
            .arg(key)
            .query_async(&mut conn)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to delete cache: {}", e))
    }
}

#[derive(Default)]
pub struct MemoryCache {
    entries: Mutex<HashMap<String, (String, Instant)>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CacheStore for MemoryCache {
    async fn health_check(&self) -> Result<(), anyhow::Error> {
        Ok(())
    }

    async fn set_cache(
        &self,
        key: &str,
        value: &str,
        expiry_seconds: u64,
    ) -> Result<(), anyhow::Error> {
        let expires = Instant::now() + Duration::from_secs(expiry_seconds);
        self.entries
            .lock()
            .map_err(|e| anyhow::anyhow!("Memory cache mutex poisoned: {}", e))?
            .insert(key.to_string(), (value.to_string(), expires));
        Ok(())
    }

    async fn get_cache(&self, key: &str) -> Result<Option<String>, anyhow::Error> {
        let mut entries = self
            .entries
            .lock()
            .map_err(|e| anyhow::anyhow!("Memory cache mutex poisoned: {}", e))?;
        match entries.get(key) {
            Some((value, expires)) if *expires > Instant::now() => Ok(Some(value.clone())),
            Some(_) => {
                entries.remove(key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn delete_cache(&self, key: &str) -> Result<(), anyhow::Error> {
        self.entries
            .lock()
            .map_err(|e| anyhow::anyhow!("Memory cache mutex poisoned: {}", e))?
            .remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn entries_expire() {
        let cache = MemoryCache::new();
        cache.set_cache("k", "v", 60).await.unwrap();
        assert_eq!(cache.get_cache("k").await.unwrap().as_deref(), Some("v"));

        cache.set_cache("gone", "v", 0).await.unwrap();
        assert_eq!(cache.get_cache("gone").await.unwrap(), None);

        cache.delete_cache("k").await.unwrap();
        assert_eq!(cache.get_cache("k").await.unwrap(), None);
    }
}
