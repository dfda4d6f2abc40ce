//! Azura Logging
//!
//! Sets up the application logger: an always-present file sink plus an
//! optional stderr stream sink, both filtered at one level and backed by
//! `tracing`.
//!
//! # Usage
//!
//! ```no_run
//! use azura_log::{LogConfig, LogLevel, info};
//!
//! let _guard = LogConfig::new()
//!     .app_name("my-app")
//!     .level(LogLevel::Debug)
//!     .file("/tmp/www_tmp/app.log")
//!     .stderr(true)
//!     .init()
//!     .expect("log file must be writable");
//!
//! info!(port = 8080, "Server started");
//! ```
//!
//! Errors and other records whose severity is only known at runtime go
//! through [`log_at!`]:
//!
//! ```
//! use azura_log::{LogLevel, log_at};
//!
//! let level = LogLevel::Warn;
//! log_at!(level, code = 42, "Something odd happened");
//! ```
//!
//! # Environment Variables
//!
//! - `RUST_LOG` - overrides the configured level filter (`azura=debug,hyper=info`)

mod config;
mod level;
mod logger;

pub use config::{LogConfig, LogFormat, LogGuard};
pub use level::{LogLevel, ParseLevelError};
pub use logger::Logger;

pub use tracing::{debug, error, info, trace, warn};

/// Emit an event at a level chosen at runtime.
///
/// `tracing` macros take their level as a constant, so this expands to a
/// match over [`LogLevel`] with one arm per macro.
#[macro_export]
macro_rules! log_at {
    ($level:expr, $($arg:tt)+) => {
        match $level {
            $crate::LogLevel::Trace => $crate::trace!($($arg)+),
            $crate::LogLevel::Debug => $crate::debug!($($arg)+),
            $crate::LogLevel::Info => $crate::info!($($arg)+),
            $crate::LogLevel::Warn => $crate::warn!($($arg)+),
            $crate::LogLevel::Error => $crate::error!($($arg)+),
        }
    };
}
