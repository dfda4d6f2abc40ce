//! Fixed-window limiter over a key-value partition
//!
//! The first request in a window stores `1` with the window length as its
//! expiry. Later requests increment the counter without touching the expiry
//! until the next request would exceed the interval, which is refused. The
//! window ends when the key expires, so bursts straddling two windows are
//! possible.

use crate::error::{RateLimitError, RateLimitResult};
use crate::extractor::{cache_key, client_ip};
use azura_cache::KeyValueStore;
use azura_config::Settings;
use azura_core::Request;
use azura_log::{debug, trace};
use std::sync::Arc;
use std::time::Duration;

pub const DEFAULT_GROUP: &str = "default";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);
pub const DEFAULT_INTERVAL: u64 = 2;

pub struct RateLimit {
    store: Arc<dyn KeyValueStore>,
    settings: Arc<Settings>,
}

impl RateLimit {
    pub fn new(store: Arc<dyn KeyValueStore>, settings: Arc<Settings>) -> Self {
        Self { store, settings }
    }

    /// Limits are not enforced under test or from the command line.
    pub fn is_bypassed(&self) -> bool {
        self.settings.is_testing() || self.settings.is_cli()
    }

    /// Count a request from `req`'s client against `group`.
    pub async fn check(
        &self,
        req: &Request,
        group: &str,
        timeout: Duration,
        interval: u64,
    ) -> RateLimitResult<()> {
        if self.is_bypassed() {
            return Ok(());
        }
        self.check_ip(&client_ip(req), group, timeout, interval).await
    }

    /// Count a request from `ip` against `group`, ignoring the bypass.
    pub async fn check_ip(
        &self,
        ip: &str,
        group: &str,
        timeout: Duration,
        interval: u64,
    ) -> RateLimitResult<()> {
        let key = cache_key(group, ip);

        let current = self
            .store
            .get(&key)
            .await?
            .and_then(|raw| raw.trim().parse::<u64>().ok());

        match current {
            Some(count) if count + 1 > interval => {
                debug!(group, ip, count, interval, "Rate limit exceeded");
                Err(RateLimitError::limit_exceeded(group, ip))
            }
            Some(count) => {
                self.store.incr(&key).await?;
                trace!(group, ip, count = count + 1, "Rate limit counter incremented");
                Ok(())
            }
            None => {
                self.store.set(&key, "1", Some(timeout)).await?;
                trace!(group, ip, timeout_secs = timeout.as_secs(), "Rate limit window opened");
                Ok(())
            }
        }
    }
}

impl std::fmt::Debug for RateLimit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimit")
            .field("partition", &self.store.partition())
            .field("bypassed", &self.is_bypassed())
            .finish()
    }
}
