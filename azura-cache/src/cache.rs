//! Typed cache facade over one store partition.

use crate::error::{CacheError, CacheResult};
use crate::store::KeyValueStore;
use serde::{Serialize, de::DeserializeOwned};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::trace;

/// JSON-encoding cache on top of a [`KeyValueStore`].
#[derive(Clone)]
pub struct Cache {
    store: Arc<dyn KeyValueStore>,
}

impl Cache {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    /// Underlying store handle.
    pub fn store(&self) -> &Arc<dyn KeyValueStore> {
        &self.store
    }

    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> CacheResult<Option<T>> {
        match self.store.get(key).await? {
            Some(raw) => serde_json::from_str(&raw)
                .map(Some)
                .map_err(|e| CacheError::Deserialization(e.to_string())),
            None => Ok(None),
        }
    }

    pub async fn set<T: Serialize + ?Sized>(
        &self,
        key: &str,
        value: &T,
        ttl: Option<Duration>,
    ) -> CacheResult<()> {
        let raw =
            serde_json::to_string(value).map_err(|e| CacheError::Serialization(e.to_string()))?;
        self.store.set(key, &raw, ttl).await
    }

    pub async fn has(&self, key: &str) -> CacheResult<bool> {
        self.store.exists(key).await
    }

    pub async fn remove(&self, key: &str) -> CacheResult<bool> {
        self.store.delete(key).await
    }

    /// Flush the whole partition.
    pub async fn clear(&self) -> CacheResult<()> {
        trace!(partition = self.store.partition(), "Clearing cache partition");
        self.store.flush().await
    }

    /// Return the cached value, or compute and store it.
    pub async fn remember<T, F, Fut, E>(
        &self,
        key: &str,
        ttl: Option<Duration>,
        factory: F,
    ) -> Result<T, E>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: From<CacheError>,
    {
        if let Some(value) = self.get(key).await? {
            return Ok(value);
        }

        let value = factory().await?;
        self.set(key, &value, ttl).await?;
        Ok(value)
    }
}

impl std::fmt::Debug for Cache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cache")
            .field("partition", &self.store.partition())
            .finish()
    }
}
