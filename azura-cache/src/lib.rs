//! Partitioned key-value storage for Azura.
//!
//! One backend (in-memory, or Redis with the `redis` feature) is split into
//! numbered partitions: the application cache, sessions, ORM metadata and
//! rate-limit counters each get their own.
//!
//! ```
//! use azura_cache::{Cache, KvBackend, MemoryBackend, partition};
//!
//! # tokio_test::block_on(async {
//! let backend = MemoryBackend::new();
//! let cache = Cache::new(backend.select(partition::CACHE));
//!
//! cache.set("greeting", "hello", None).await.unwrap();
//! let value: Option<String> = cache.get("greeting").await.unwrap();
//! assert_eq!(value.as_deref(), Some("hello"));
//! # });
//! ```

pub mod cache;
pub mod error;
pub mod memory;
#[cfg(feature = "redis")]
pub mod redis_store;
pub mod store;

pub use cache::Cache;
pub use error::{CacheError, CacheResult};
pub use memory::{MemoryBackend, MemoryStore};
#[cfg(feature = "redis")]
pub use redis_store::{RedisBackend, RedisStore};
pub use store::{KeyValueStore, KvBackend, KvConfig, partition};
