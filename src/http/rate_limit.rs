//! Client-side request budget
//!
//! A `governor` token bucket shared by every clone of a client. Server-side
//! throttling (429) is handled separately by the response hooks.

use crate::config::HttpConfig;
use governor::clock::DefaultClock;
use governor::middleware::NoOpMiddleware;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter as Governor};
use std::num::NonZeroU32;
use std::sync::Arc;

/// Requests per second and bucket size
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimiterConfig {
    pub requests_per_second: u32,
    /// Requests allowed back to back before waiting
    pub burst_size: u32,
}

impl RateLimiterConfig {
    pub fn new(requests_per_second: u32, burst_size: u32) -> Self {
        Self {
            requests_per_second,
            burst_size,
        }
    }

    /// Budget of `rps` requests per second with an equal burst
    pub fn per_second(rps: u32) -> Self {
        Self::new(rps, rps)
    }

    /// Budget configured for a client, if any
    pub fn from_http(config: &HttpConfig) -> Option<Self> {
        config.requests_per_second.map(Self::per_second)
    }
}

/// Token bucket limiter
#[derive(Clone)]
pub struct RateLimiter {
    bucket: Arc<Governor<NotKeyed, InMemoryState, DefaultClock, NoOpMiddleware>>,
    config: RateLimiterConfig,
}

impl RateLimiter {
    /// Zero rates and bursts are clamped to one
    pub fn new(config: RateLimiterConfig) -> Self {
        let rps = NonZeroU32::new(config.requests_per_second).unwrap_or(NonZeroU32::MIN);
        let burst = NonZeroU32::new(config.burst_size).unwrap_or(NonZeroU32::MIN);
        Self {
            bucket: Arc::new(Governor::direct(Quota::per_second(rps).allow_burst(burst))),
            config,
        }
    }

    pub fn config(&self) -> RateLimiterConfig {
        self.config
    }

    /// Wait for a permit
    pub async fn wait(&self) {
        self.bucket.until_ready().await;
    }

    /// Take a permit if one is available now
    pub fn try_acquire(&self) -> bool {
        self.bucket.check().is_ok()
    }
}

impl std::fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimiter")
            .field("requests_per_second", &self.config.requests_per_second)
            .field("burst_size", &self.config.burst_size)
            .finish()
    }
}

#[cfg(test)]
mod rate_limit_tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_budget_from_http_config() {
        assert_eq!(RateLimiterConfig::from_http(&HttpConfig::default()), None);

        let http = HttpConfig {
            requests_per_second: Some(25),
            ..HttpConfig::default()
        };
        assert_eq!(
            RateLimiterConfig::from_http(&http),
            Some(RateLimiterConfig::new(25, 25))
        );
    }

    #[tokio::test]
    async fn test_burst_then_blocks() {
        let limiter = RateLimiter::new(RateLimiterConfig::new(1, 3));
        for _ in 0..3 {
            assert!(limiter.try_acquire());
        }
        assert!(!limiter.try_acquire());
    }

    #[tokio::test]
    async fn test_zero_budget_is_clamped() {
        let limiter = RateLimiter::new(RateLimiterConfig::new(0, 0));
        assert!(limiter.try_acquire());
        assert_eq!(limiter.config().requests_per_second, 0);
    }

    #[tokio::test]
    async fn test_wait_within_burst() {
        let limiter = RateLimiter::new(RateLimiterConfig::per_second(100));
        let waited = tokio::time::timeout(Duration::from_millis(100), limiter.wait()).await;
        assert!(waited.is_ok());
    }
}
