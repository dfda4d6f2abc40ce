//! Redis backend.

use crate::error::{CacheError, CacheResult};
use crate::store::{KeyValueStore, KvBackend, KvConfig};
use async_trait::async_trait;
use redis::{AsyncCommands, Client, aio::ConnectionManager};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::OnceCell;
use tracing::debug;

/// Redis server reached over one connection per selected database.
#[derive(Debug, Clone)]
pub struct RedisBackend {
    config: KvConfig,
}

impl RedisBackend {
    pub fn new(config: KvConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &KvConfig {
        &self.config
    }
}

impl KvBackend for RedisBackend {
    fn select(&self, partition: u8) -> Arc<dyn KeyValueStore> {
        Arc::new(RedisStore::new(self.config.clone(), partition))
    }

    fn name(&self) -> &'static str {
        "redis"
    }
}

/// One Redis database. Connects on first use.
pub struct RedisStore {
    config: KvConfig,
    partition: u8,
    connection: OnceCell<ConnectionManager>,
}

impl RedisStore {
    pub fn new(config: KvConfig, partition: u8) -> Self {
        Self {
            config,
            partition,
            connection: OnceCell::new(),
        }
    }

    async fn conn(&self) -> CacheResult<ConnectionManager> {
        let conn = self
            .connection
            .get_or_try_init(|| async {
                let url = self.config.url(self.partition);
                debug!(server = %self.config, db = self.partition, "Connecting to Redis");

                let client =
                    Client::open(url.as_str()).map_err(|e| CacheError::Connection(e.to_string()))?;
                tokio::time::timeout(self.config.connect_timeout, ConnectionManager::new(client))
                    .await
                    .map_err(|_| {
                        CacheError::Connection(format!("timed out connecting to {}", self.config))
                    })?
                    .map_err(|e| CacheError::Connection(e.to_string()))
            })
            .await?;
        Ok(conn.clone())
    }
}

#[async_trait]
impl KeyValueStore for RedisStore {
    async fn get(&self, key: &str) -> CacheResult<Option<String>> {
        let mut conn = self.conn().await?;
        Ok(conn.get(key).await?)
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> CacheResult<()> {
        let mut conn = self.conn().await?;
        let mut cmd = redis::cmd("SET");
        cmd.arg(key).arg(value);
        if let Some(ttl) = ttl {
            cmd.arg("PX").arg(ttl.as_millis().max(1) as u64);
        }
        let _: () = cmd.query_async(&mut conn).await?;
        Ok(())
    }

    async fn incr(&self, key: &str) -> CacheResult<i64> {
        let mut conn = self.conn().await?;
        conn.incr(key, 1_i64).await.map_err(|e| {
            if e.to_string().contains("not an integer") {
                CacheError::NotAnInteger(key.to_string())
            } else {
                CacheError::Redis(e)
            }
        })
    }

    async fn delete(&self, key: &str) -> CacheResult<bool> {
        let mut conn = self.conn().await?;
        let removed: i64 = conn.del(key).await?;
        Ok(removed > 0)
    }

    async fn exists(&self, key: &str) -> CacheResult<bool> {
        let mut conn = self.conn().await?;
        Ok(conn.exists(key).await?)
    }

    async fn ttl(&self, key: &str) -> CacheResult<Option<Duration>> {
        let mut conn = self.conn().await?;
        let millis: i64 = conn.pttl(key).await?;

        // -2 missing, -1 persistent
        Ok((millis > 0).then(|| Duration::from_millis(millis as u64)))
    }

    async fn flush(&self) -> CacheResult<()> {
        let mut conn = self.conn().await?;
        let _: () = redis::cmd("FLUSHDB").query_async(&mut conn).await?;
        Ok(())
    }

    fn partition(&self) -> u8 {
        self.partition
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_select_binds_partition() {
        let backend = RedisBackend::new(KvConfig::for_docker(false));
        let store = backend.select(3);

        assert_eq!(store.partition(), 3);
        assert_eq!(backend.name(), "redis");
        assert_eq!(backend.config().url(3), "redis://localhost:6379/3");
    }
}
