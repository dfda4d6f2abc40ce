//! Rate limiting for Azura
//!
//! A fixed-window counter per client IP and group, stored in the
//! rate-limit partition of the shared key-value store.
//!
//! ```no_run
//! use azura_ratelimit::{RateLimit, RateLimitMiddleware};
//! use azura_cache::{MemoryStore, partition};
//! use azura_config::Settings;
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! let limiter = Arc::new(RateLimit::new(
//!     Arc::new(MemoryStore::new(partition::RATE_LIMIT)),
//!     Arc::new(Settings::new("/var/azuracast/www")),
//! ));
//!
//! // Three login attempts per minute.
//! let middleware = RateLimitMiddleware::new(limiter)
//!     .group("login")
//!     .timeout(Duration::from_secs(60))
//!     .interval(3);
//! ```

pub mod error;
pub mod extractor;
pub mod limiter;
pub mod middleware;

pub use error::{RateLimitError, RateLimitResult};
pub use extractor::{cache_key, client_ip};
pub use limiter::{DEFAULT_GROUP, DEFAULT_INTERVAL, DEFAULT_TIMEOUT, RateLimit};
pub use middleware::RateLimitMiddleware;
