//! Shared-backend behaviour across partitions.

use azura_cache::*;
use std::sync::Arc;
use std::time::Duration;

#[tokio::test]
async fn test_handles_share_one_backend() {
    let backend = MemoryBackend::new();
    let first = backend.select(partition::SESSION);
    let second = backend.select(partition::SESSION);

    first.set("session:APP_ABCDE:1", "{}", None).await.unwrap();
    assert!(second.exists("session:APP_ABCDE:1").await.unwrap());
}

#[tokio::test]
async fn test_concurrent_increments_are_atomic() {
    let backend = MemoryBackend::new();
    let store = backend.select(partition::RATE_LIMIT);
    store
        .set("rate_limit:default:127.0.0.1", "0", Some(Duration::from_secs(5)))
        .await
        .unwrap();

    let mut tasks = Vec::new();
    for _ in 0..50 {
        let store = Arc::clone(&store);
        tasks.push(tokio::spawn(async move {
            store.incr("rate_limit:default:127.0.0.1").await.unwrap()
        }));
    }
    for task in tasks {
        task.await.unwrap();
    }

    let value = store.get("rate_limit:default:127.0.0.1").await.unwrap();
    assert_eq!(value.as_deref(), Some("50"));
    assert!(store.ttl("rate_limit:default:127.0.0.1").await.unwrap().is_some());
}

#[tokio::test]
async fn test_cache_facade_over_backend() {
    let backend = MemoryBackend::new();
    let cache = Cache::new(backend.select(partition::CACHE));

    cache
        .set("stations", &vec!["one", "two"], Some(Duration::from_secs(60)))
        .await
        .unwrap();
    let stations: Vec<String> = cache.get("stations").await.unwrap().unwrap();

    assert_eq!(stations, vec!["one", "two"]);
    assert_eq!(backend.len(), 1);
}
