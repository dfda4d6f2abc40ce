// Azura - application kernel for Rust web services
//
// Settings, a lazy service container, a middleware pipeline with sessions,
// views and rate limiting, lifecycle events and console bootstrap.

//! # Azura
//!
//! The root crate wires the member crates together: it registers the default
//! service catalog, builds the [`App`] through [`AppBuilder`] and exposes the
//! console entry point.
//!
//! ```no_run
//! use azura::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> azura::Result<()> {
//!     let app = AppBuilder::new("/var/azuracast/www")
//!         .routes(|app| {
//!             app.get("/", handler(|_, _| async { Ok(Response::text("Hello")) }))
//!                 .name("home");
//!             Ok(())
//!         })
//!         .build()?;
//!
//!     app.listen("0.0.0.0:8080").await
//! }
//! ```

// Re-export core functionality
pub use azura_core::*;

pub use azura_cache;
pub use azura_config;
pub use azura_ratelimit;
pub use azura_session;

pub mod bootstrap;
pub mod commands;
pub mod services;
pub mod subscriber;
pub mod testing;

#[cfg(feature = "database")]
pub mod database;

pub use bootstrap::{AppBuilder, EventHooks, RouteHooks};
pub use commands::ClearCache;
pub use services::{SharedKv, register_defaults};

pub use azura_cache::{Cache, KvBackend, KvConfig};
pub use azura_config::{AppEnv, ConfigRepository, Environment, Settings, SettingsLoader};
pub use azura_ratelimit::{RateLimit, RateLimitMiddleware};
pub use azura_session::{FlashLevel, Session, SessionManager};

#[cfg(feature = "database")]
pub use database::{Database, DbOptions};

// Prelude for common imports
pub mod prelude {
    pub use crate::{
        App, AppBuilder, AppException, Command, ConsoleApplication, Container, Error,
        EventDispatcher, Middleware, Next, RateLimitMiddleware, Request, Response, Result,
        Router, Settings, async_trait, handler,
    };
}
