//! Client-side request throttling
//!
//! The platform answers bursts with `REQUEST_LIMIT_EXCEEDED`, so every
//! transport attempt takes a permit from a governor token bucket first.
//! Clones of the transport share one bucket.

use governor::clock::DefaultClock;
use governor::middleware::NoOpMiddleware;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter as Governor};
use serde::{Deserialize, Serialize};
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::{Duration, Instant};

type DirectLimiter = Governor<NotKeyed, InMemoryState, DefaultClock, NoOpMiddleware>;

/// Token bucket settings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimiterConfig {
    /// Sustained requests per second
    pub requests_per_second: u32,
    /// Bucket capacity
    pub burst_size: u32,
}

impl Default for RateLimiterConfig {
    fn default() -> Self {
        Self::per_second(10)
    }
}

impl RateLimiterConfig {
    /// Explicit rate and burst
    pub fn new(requests_per_second: u32, burst_size: u32) -> Self {
        Self {
            requests_per_second,
            burst_size,
        }
    }

    /// Rate with a burst of one second's worth of requests
    pub fn per_second(requests_per_second: u32) -> Self {
        Self::new(requests_per_second, requests_per_second)
    }
}

/// Shared token bucket
#[derive(Clone)]
pub struct RateLimiter {
    limiter: Arc<DirectLimiter>,
    config: RateLimiterConfig,
}

impl RateLimiter {
    /// Build a bucket; zero rate or burst counts as one
    pub fn new(config: &RateLimiterConfig) -> Self {
        let rate = NonZeroU32::new(config.requests_per_second).unwrap_or(NonZeroU32::MIN);
        let burst = NonZeroU32::new(config.burst_size).unwrap_or(NonZeroU32::MIN);

        Self {
            limiter: Arc::new(Governor::direct(Quota::per_second(rate).allow_burst(burst))),
            config: *config,
        }
    }

    /// Settings the bucket was built from
    pub fn config(&self) -> &RateLimiterConfig {
        &self.config
    }

    /// Wait for a permit and report how long that took
    pub async fn acquire(&self) -> Duration {
        if self.limiter.check().is_ok() {
            return Duration::ZERO;
        }
        let started = Instant::now();
        self.limiter.until_ready().await;
        started.elapsed()
    }

    /// Take a permit only if one is free
    pub fn try_acquire(&self) -> bool {
        self.limiter.check().is_ok()
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
