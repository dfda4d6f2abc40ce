//! Rate limiting middleware

use crate::limiter::{DEFAULT_GROUP, DEFAULT_INTERVAL, DEFAULT_TIMEOUT, RateLimit};
use async_trait::async_trait;
use azura_core::{Middleware, Next, Request, Response, Result};
use std::sync::Arc;
use std::time::Duration;

/// Refuses requests once a client exceeds `interval` requests within
/// `timeout` for this middleware's group.
#[derive(Debug, Clone)]
pub struct RateLimitMiddleware {
    limiter: Arc<RateLimit>,
    group: String,
    timeout: Duration,
    interval: u64,
}

impl RateLimitMiddleware {
    pub fn new(limiter: Arc<RateLimit>) -> Self {
        Self {
            limiter,
            group: DEFAULT_GROUP.to_string(),
            timeout: DEFAULT_TIMEOUT,
            interval: DEFAULT_INTERVAL,
        }
    }

    pub fn group(mut self, group: impl Into<String>) -> Self {
        self.group = group.into();
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn interval(mut self, interval: u64) -> Self {
        self.interval = interval;
        self
    }
}

#[async_trait]
impl Middleware for RateLimitMiddleware {
    async fn handle(&self, req: Request, next: Next) -> Result<Response> {
        self.limiter
            .check(&req, &self.group, self.timeout, self.interval)
            .await?;
        next(req).await
    }
}
