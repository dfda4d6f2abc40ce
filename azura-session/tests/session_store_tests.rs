//! Sessions persisted through a shared backend.

use azura_cache::{KeyValueStore, KvBackend, MemoryBackend, partition};
use azura_session::*;
use std::time::Duration;

#[tokio::test]
async fn test_sessions_live_in_their_own_partition() {
    let backend = MemoryBackend::new();
    let manager = SessionManager::new(app_prefix("/var/app/www"), backend.select(partition::SESSION));

    let session = manager.start(None).await.unwrap();
    manager.save(&session).await.unwrap();

    let key = format!("session:{}:{}", manager.prefix(), session.id());
    assert!(backend.select(partition::SESSION).exists(&key).await.unwrap());
    assert!(!backend.select(partition::CACHE).exists(&key).await.unwrap());
}

#[tokio::test]
async fn test_session_expires_with_lifetime() {
    let backend = MemoryBackend::new();
    let manager = SessionManager::new("APP_AAAAA", backend.select(partition::SESSION))
        .with_lifetime(Duration::from_millis(30));

    let session = manager.start(None).await.unwrap();
    session.set("counter", 1).unwrap();
    manager.save(&session).await.unwrap();

    tokio::time::sleep(Duration::from_millis(60)).await;
    let resumed = manager.start(Some(session.id())).await.unwrap();
    assert!(resumed.is_new());
    assert!(!resumed.has("counter"));
}
