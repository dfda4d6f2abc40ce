//! Key-value store traits.

use crate::error::CacheResult;
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Numbered partitions of the shared store, one per feature so their keys
/// never collide.
pub mod partition {
    /// Application cache
    pub const CACHE: u8 = 0;
    /// Session payloads
    pub const SESSION: u8 = 1;
    /// ORM metadata/query cache
    pub const DOCTRINE: u8 = 2;
    /// Rate-limit counters
    pub const RATE_LIMIT: u8 = 3;
}

/// One partition of a key-value store.
///
/// Implementations must make `incr` atomic and must leave the expiry of an
/// existing key untouched when incrementing it.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Get a raw value.
    async fn get(&self, key: &str) -> CacheResult<Option<String>>;

    /// Set a raw value, optionally expiring after `ttl`.
    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> CacheResult<()>;

    /// Increment an integer value by one and return the new value.
    ///
    /// A missing key starts from zero and gets no expiry.
    async fn incr(&self, key: &str) -> CacheResult<i64>;

    /// Delete a key; returns whether it existed.
    async fn delete(&self, key: &str) -> CacheResult<bool>;

    /// Check whether a key exists.
    async fn exists(&self, key: &str) -> CacheResult<bool>;

    /// Remaining lifetime of a key, `None` if missing or persistent.
    async fn ttl(&self, key: &str) -> CacheResult<Option<Duration>>;

    /// Remove every key in this partition.
    async fn flush(&self) -> CacheResult<()>;

    /// Partition number this handle is bound to.
    fn partition(&self) -> u8;
}

/// A store that hands out partition handles.
pub trait KvBackend: Send + Sync {
    /// Handle bound to one numbered partition.
    fn select(&self, partition: u8) -> Arc<dyn KeyValueStore>;

    /// Backend name, for logs.
    fn name(&self) -> &'static str;
}

/// Connection settings for a networked backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KvConfig {
    pub host: String,
    pub port: u16,
    pub connect_timeout: Duration,
}

impl KvConfig {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            connect_timeout: Duration::from_secs(15),
        }
    }

    /// `redis` inside the container network, `localhost` otherwise.
    pub fn for_docker(is_docker: bool) -> Self {
        Self::new(if is_docker { "redis" } else { "localhost" }, 6379)
    }

    /// Connection URL selecting one partition.
    pub fn url(&self, partition: u8) -> String {
        format!("redis://{}:{}/{}", self.host, self.port, partition)
    }
}

impl fmt::Display for KvConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_docker_host_selection() {
        assert_eq!(KvConfig::for_docker(true).host, "redis");
        assert_eq!(KvConfig::for_docker(false).host, "localhost");
        assert_eq!(KvConfig::for_docker(true).port, 6379);
    }

    #[test]
    fn test_url_carries_partition() {
        let config = KvConfig::new("redis", 6379);
        assert_eq!(config.url(partition::RATE_LIMIT), "redis://redis:6379/3");
        assert_eq!(config.to_string(), "redis:6379");
    }
}
