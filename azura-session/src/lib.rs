//! Sessions for Azura applications.
//!
//! Session payloads (values plus pending flash messages) are stored as JSON in
//! the session partition of the shared key-value store, under
//! `session:{prefix}:{id}`. The cookie carrying the ID is named
//! `{prefix}_SESSID`.

pub mod error;
pub mod manager;
pub mod session;

pub use error::{SessionError, SessionResult};
pub use manager::{DEFAULT_LIFETIME, SessionManager, app_prefix, is_valid_id};
pub use session::{FlashLevel, FlashMessage, Session, SessionData};
