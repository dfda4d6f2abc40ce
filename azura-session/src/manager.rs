//! Loading and persisting sessions.

use crate::error::{SessionError, SessionResult};
use crate::session::{Session, SessionData};
use azura_cache::KeyValueStore;
use sha2::{Digest, Sha256};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, trace, warn};

/// Default session lifetime: one day.
pub const DEFAULT_LIFETIME: Duration = Duration::from_secs(86_400);

const MAX_ID_LEN: usize = 128;

/// Application-specific prefix: `APP_` plus the first five upper-case hex
/// characters of the SHA-256 of the base directory.
pub fn app_prefix(base_dir: impl AsRef<Path>) -> String {
    let digest = Sha256::digest(base_dir.as_ref().to_string_lossy().as_bytes());
    let hex = hex::encode(digest);
    format!("APP_{}", hex[..5].to_uppercase())
}

/// Whether a client-supplied ID is safe to use as a store key.
pub fn is_valid_id(id: &str) -> bool {
    !id.is_empty() && id.len() <= MAX_ID_LEN && id.bytes().all(|b| b.is_ascii_alphanumeric())
}

/// Creates, loads, saves and destroys sessions in a key-value partition.
pub struct SessionManager {
    prefix: String,
    store: Arc<dyn KeyValueStore>,
    lifetime: Duration,
}

impl SessionManager {
    pub fn new(prefix: impl Into<String>, store: Arc<dyn KeyValueStore>) -> Self {
        Self {
            prefix: prefix.into(),
            store,
            lifetime: DEFAULT_LIFETIME,
        }
    }

    pub fn with_lifetime(mut self, lifetime: Duration) -> Self {
        self.lifetime = lifetime;
        self
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn lifetime(&self) -> Duration {
        self.lifetime
    }

    /// Name of the cookie carrying the session ID.
    pub fn cookie_name(&self) -> String {
        format!("{}_SESSID", self.prefix)
    }

    fn key(&self, id: &str) -> String {
        format!("session:{}:{}", self.prefix, id)
    }

    /// Resume the session named by `id`, or start a fresh one when the ID is
    /// absent, malformed or unknown.
    pub async fn start(&self, id: Option<&str>) -> SessionResult<Session> {
        if let Some(id) = id.filter(|id| is_valid_id(id)) {
            if let Some(raw) = self.store.get(&self.key(id)).await? {
                match serde_json::from_str::<SessionData>(&raw) {
                    Ok(data) => {
                        trace!(session_id = %id, "Resumed session");
                        return Ok(Session::new(id.to_string(), false, data));
                    }
                    Err(e) => {
                        warn!(session_id = %id, error = %e, "Discarding unreadable session data");
                    }
                }
            }
        }

        let id = uuid::Uuid::new_v4().simple().to_string();
        debug!(session_id = %id, "Started new session");
        Ok(Session::new(id, true, SessionData::default()))
    }

    /// Load an existing session without creating one.
    pub async fn load(&self, id: &str) -> SessionResult<Option<Session>> {
        if !is_valid_id(id) {
            return Err(SessionError::InvalidSessionId(id.to_string()));
        }
        match self.store.get(&self.key(id)).await? {
            Some(raw) => {
                let data = serde_json::from_str(&raw)
                    .map_err(|e| SessionError::Deserialization(e.to_string()))?;
                Ok(Some(Session::new(id.to_string(), false, data)))
            }
            None => Ok(None),
        }
    }

    /// Persist the session, refreshing its lifetime.
    pub async fn save(&self, session: &Session) -> SessionResult<()> {
        let raw = serde_json::to_string(&session.snapshot())
            .map_err(|e| SessionError::Serialization(e.to_string()))?;
        self.store
            .set(&self.key(session.id()), &raw, Some(self.lifetime))
            .await?;
        Ok(())
    }

    pub async fn destroy(&self, session: &Session) -> SessionResult<bool> {
        session.clear();
        Ok(self.store.delete(&self.key(session.id())).await?)
    }
}

impl std::fmt::Debug for SessionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionManager")
            .field("prefix", &self.prefix)
            .field("partition", &self.store.partition())
            .field("lifetime", &self.lifetime)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::FlashLevel;
    use azura_cache::MemoryStore;

    fn manager() -> SessionManager {
        SessionManager::new("APP_12345", Arc::new(MemoryStore::new(1)))
    }

    #[test]
    fn test_app_prefix_shape() {
        let prefix = app_prefix("/var/azuracast/www");
        assert!(prefix.starts_with("APP_"));
        assert_eq!(prefix.len(), 9);
        assert_eq!(prefix, prefix.to_uppercase());
        assert_eq!(prefix, app_prefix("/var/azuracast/www"));
        assert_ne!(prefix, app_prefix("/srv/other"));
    }

    #[test]
    fn test_id_validation() {
        assert!(is_valid_id("0123456789abcdef0123456789abcdef"));
        assert!(!is_valid_id(""));
        assert!(!is_valid_id("../../etc"));
        assert!(!is_valid_id("id with spaces"));
    }

    #[tokio::test]
    async fn test_start_save_resume() {
        let manager = manager();
        assert_eq!(manager.cookie_name(), "APP_12345_SESSID");

        let session = manager.start(None).await.unwrap();
        assert!(session.is_new());
        assert_eq!(session.id().len(), 32);
        session.set("user", "dj").unwrap();
        session.flash("Welcome", FlashLevel::Success);
        manager.save(&session).await.unwrap();

        let resumed = manager.start(Some(session.id())).await.unwrap();
        assert!(!resumed.is_new());
        assert_eq!(resumed.get::<String>("user").as_deref(), Some("dj"));
        assert_eq!(resumed.get_flash().len(), 1);
    }

    #[tokio::test]
    async fn test_unknown_id_starts_fresh() {
        let manager = manager();
        let session = manager.start(Some("doesnotexist")).await.unwrap();

        assert!(session.is_new());
        assert_ne!(session.id(), "doesnotexist");
    }

    #[tokio::test]
    async fn test_corrupt_session_starts_fresh() {
        let store = Arc::new(MemoryStore::new(1));
        let manager = SessionManager::new("APP_12345", store.clone());
        let id = "0123456789abcdef0123456789abcdef";
        store
            .set("session:APP_12345:0123456789abcdef0123456789abcdef", "{not json", None)
            .await
            .unwrap();

        let session = manager.start(Some(id)).await.unwrap();
        assert!(session.is_new());
        assert_ne!(session.id(), id);
        assert!(matches!(
            manager.load(id).await,
            Err(SessionError::Deserialization(_))
        ));
    }

    #[tokio::test]
    async fn test_destroy() {
        let manager = manager();
        let session = manager.start(None).await.unwrap();
        manager.save(&session).await.unwrap();

        assert!(manager.destroy(&session).await.unwrap());
        assert!(manager.load(session.id()).await.unwrap().is_none());
        assert!(matches!(
            manager.load("bad/id").await,
            Err(SessionError::InvalidSessionId(_))
        ));
    }
}
