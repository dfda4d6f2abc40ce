//! In-process key-value backend.

use crate::error::{CacheError, CacheResult};
use crate::store::{KeyValueStore, KvBackend};
use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry as MapEntry;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::trace;

#[derive(Debug, Clone)]
struct Entry {
    value: String,
    expires_at: Option<Instant>,
}

impl Entry {
    fn new(value: String, ttl: Option<Duration>) -> Self {
        Self {
            value,
            expires_at: ttl.map(|ttl| Instant::now() + ttl),
        }
    }

    fn is_expired(&self) -> bool {
        self.expires_at.is_some_and(|at| Instant::now() >= at)
    }
}

type Entries = Arc<DashMap<(u8, String), Entry>>;

/// Memory backend shared by all partitions of one process.
///
/// Expired entries are dropped lazily on access.
#[derive(Debug, Clone, Default)]
pub struct MemoryBackend {
    entries: Entries,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live entries across every partition.
    pub fn len(&self) -> usize {
        self.entries.iter().filter(|e| !e.is_expired()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl KvBackend for MemoryBackend {
    fn select(&self, partition: u8) -> Arc<dyn KeyValueStore> {
        Arc::new(MemoryStore {
            partition,
            entries: self.entries.clone(),
        })
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}

/// One partition of a [`MemoryBackend`].
#[derive(Debug, Clone)]
pub struct MemoryStore {
    partition: u8,
    entries: Entries,
}

impl MemoryStore {
    /// Standalone store with its own backing map.
    pub fn new(partition: u8) -> Self {
        Self {
            partition,
            entries: Arc::new(DashMap::new()),
        }
    }

    fn key(&self, key: &str) -> (u8, String) {
        (self.partition, key.to_string())
    }

    fn live(&self, key: &str) -> Option<Entry> {
        let k = self.key(key);
        let entry = self.entries.get(&k)?.clone();
        if entry.is_expired() {
            self.entries.remove_if(&k, |_, e| e.is_expired());
            return None;
        }
        Some(entry)
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> CacheResult<Option<String>> {
        Ok(self.live(key).map(|e| e.value))
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> CacheResult<()> {
        trace!(partition = self.partition, key, ?ttl, "memory set");
        self.entries
            .insert(self.key(key), Entry::new(value.to_string(), ttl));
        Ok(())
    }

    async fn incr(&self, key: &str) -> CacheResult<i64> {
        match self.entries.entry(self.key(key)) {
            MapEntry::Occupied(mut occupied) => {
                let entry = occupied.get_mut();
                if entry.is_expired() {
                    *entry = Entry::new("1".to_string(), None);
                    return Ok(1);
                }
                let next = entry
                    .value
                    .parse::<i64>()
                    .map_err(|_| CacheError::NotAnInteger(key.to_string()))?
                    + 1;
                entry.value = next.to_string();
                Ok(next)
            }
            MapEntry::Vacant(vacant) => {
                vacant.insert(Entry::new("1".to_string(), None));
                Ok(1)
            }
        }
    }

    async fn delete(&self, key: &str) -> CacheResult<bool> {
        let existed = self.live(key).is_some();
        self.entries.remove(&self.key(key));
        Ok(existed)
    }

    async fn exists(&self, key: &str) -> CacheResult<bool> {
        Ok(self.live(key).is_some())
    }

    async fn ttl(&self, key: &str) -> CacheResult<Option<Duration>> {
        Ok(self
            .live(key)
            .and_then(|e| e.expires_at)
            .map(|at| at.saturating_duration_since(Instant::now())))
    }

    async fn flush(&self) -> CacheResult<()> {
        let partition = self.partition;
        self.entries.retain(|(p, _), _| *p != partition);
        Ok(())
    }

    fn partition(&self) -> u8 {
        self.partition
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::partition;

    #[tokio::test]
    async fn test_set_get_delete() {
        let store = MemoryStore::new(0);

        store.set("station", "1", None).await.unwrap();
        assert_eq!(store.get("station").await.unwrap().as_deref(), Some("1"));
        assert!(store.delete("station").await.unwrap());
        assert!(!store.delete("station").await.unwrap());
        assert_eq!(store.get("station").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_entries_expire() {
        let store = MemoryStore::new(0);
        store
            .set("short", "x", Some(Duration::from_millis(20)))
            .await
            .unwrap();

        assert!(store.exists("short").await.unwrap());
        tokio::time::sleep(Duration::from_millis(40)).await;
        assert!(!store.exists("short").await.unwrap());
    }

    #[tokio::test]
    async fn test_incr_keeps_expiry() {
        let store = MemoryStore::new(0);
        store
            .set("counter", "1", Some(Duration::from_secs(5)))
            .await
            .unwrap();

        assert_eq!(store.incr("counter").await.unwrap(), 2);
        let ttl = store.ttl("counter").await.unwrap().unwrap();
        assert!(ttl <= Duration::from_secs(5));
        assert!(ttl > Duration::from_secs(3));
    }

    #[tokio::test]
    async fn test_incr_missing_key_starts_at_one() {
        let store = MemoryStore::new(0);
        assert_eq!(store.incr("fresh").await.unwrap(), 1);
        assert_eq!(store.ttl("fresh").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_incr_rejects_text() {
        let store = MemoryStore::new(0);
        store.set("name", "radio", None).await.unwrap();

        assert!(matches!(
            store.incr("name").await,
            Err(CacheError::NotAnInteger(_))
        ));
    }

    #[tokio::test]
    async fn test_partitions_are_isolated() {
        let backend = MemoryBackend::new();
        let cache = backend.select(partition::CACHE);
        let limits = backend.select(partition::RATE_LIMIT);

        cache.set("key", "cache", None).await.unwrap();
        limits.set("key", "limit", None).await.unwrap();

        assert_eq!(cache.get("key").await.unwrap().as_deref(), Some("cache"));
        assert_eq!(limits.get("key").await.unwrap().as_deref(), Some("limit"));

        cache.flush().await.unwrap();
        assert_eq!(cache.get("key").await.unwrap(), None);
        assert_eq!(limits.get("key").await.unwrap().as_deref(), Some("limit"));
        assert_eq!(backend.len(), 1);
    }
}
