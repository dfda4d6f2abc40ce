//! Per-visitor session state.

use crate::error::{SessionError, SessionResult};
use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;

/// Severity of a flash message, used by templates for styling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FlashLevel {
    Success,
    #[default]
    Info,
    Warning,
    Error,
}

impl FlashLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            FlashLevel::Success => "success",
            FlashLevel::Info => "info",
            FlashLevel::Warning => "warning",
            FlashLevel::Error => "error",
        }
    }
}

impl fmt::Display for FlashLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A one-shot message shown on the next rendered page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlashMessage {
    pub message: String,
    pub level: FlashLevel,
}

/// Serialized session payload.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionData {
    #[serde(default)]
    pub values: HashMap<String, Value>,
    #[serde(default)]
    pub flash: Vec<FlashMessage>,
}

/// A loaded session. Shared between middleware and handlers through the
/// request, so mutation goes through an internal lock.
pub struct Session {
    id: String,
    is_new: bool,
    data: RwLock<SessionData>,
}

impl Session {
    pub(crate) fn new(id: String, is_new: bool, data: SessionData) -> Self {
        Self {
            id,
            is_new,
            data: RwLock::new(data),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Whether the session was created during this request.
    pub fn is_new(&self) -> bool {
        self.is_new
    }

    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.data
            .read()
            .values
            .get(key)
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }

    pub fn get_value(&self, key: &str) -> Option<Value> {
        self.data.read().values.get(key).cloned()
    }

    pub fn set<T: Serialize>(&self, key: &str, value: T) -> SessionResult<()> {
        let value =
            serde_json::to_value(value).map_err(|e| SessionError::Serialization(e.to_string()))?;
        self.data.write().values.insert(key.to_string(), value);
        Ok(())
    }

    pub fn has(&self, key: &str) -> bool {
        self.data.read().values.contains_key(key)
    }

    pub fn remove(&self, key: &str) -> Option<Value> {
        self.data.write().values.remove(key)
    }

    /// Drop all values and pending flash messages.
    pub fn clear(&self) {
        let mut data = self.data.write();
        data.values.clear();
        data.flash.clear();
    }

    pub fn flash(&self, message: impl Into<String>, level: FlashLevel) {
        self.data.write().flash.push(FlashMessage {
            message: message.into(),
            level,
        });
    }

    /// Take the pending flash messages; they are gone afterwards.
    pub fn get_flash(&self) -> Vec<FlashMessage> {
        std::mem::take(&mut self.data.write().flash)
    }

    pub fn peek_flash(&self) -> Vec<FlashMessage> {
        self.data.read().flash.clone()
    }

    pub fn has_flash(&self) -> bool {
        !self.data.read().flash.is_empty()
    }

    /// Copy of the current payload.
    pub fn snapshot(&self) -> SessionData {
        self.data.read().clone()
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("is_new", &self.is_new)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session() -> Session {
        Session::new("abc".into(), true, SessionData::default())
    }

    #[test]
    fn test_values() {
        let session = session();
        session.set("user_id", 12).unwrap();

        assert!(session.has("user_id"));
        assert_eq!(session.get::<u32>("user_id"), Some(12));
        assert_eq!(session.get::<String>("user_id"), None);
        assert!(session.remove("user_id").is_some());
        assert!(!session.has("user_id"));
    }

    #[test]
    fn test_flash_is_drained_once() {
        let session = session();
        session.flash("Saved.", FlashLevel::Success);
        session.flash("Careful.", FlashLevel::Warning);

        assert_eq!(session.peek_flash().len(), 2);
        let flashed = session.get_flash();
        assert_eq!(flashed[0].message, "Saved.");
        assert_eq!(flashed[1].level, FlashLevel::Warning);
        assert!(session.get_flash().is_empty());
    }

    #[test]
    fn test_payload_format() {
        let session = session();
        session.set("login_referrer", "/admin").unwrap();
        session.flash("Hi", FlashLevel::Info);

        let json = serde_json::to_value(session.snapshot()).unwrap();
        assert_eq!(json["values"]["login_referrer"], "/admin");
        assert_eq!(json["flash"][0]["level"], "info");
    }
}
