//! HTTP transport
//!
//! Authenticated request execution with retry, backoff and rate limiting.
//!
//! # Features
//!
//! - **Connection pooling**: pool sized for the expected report fan-out
//! - **Automatic Retries**: connection errors, timeouts, 429 and 5xx
//! - **Backoff Strategies**: constant, linear and exponential (factor 5 by default)
//! - **Rate Limiting**: token bucket rate limiter using governor
//! - **Authentication**: bearer token read from the shared `AuthContext`

mod client;
mod rate_limit;

pub use client::{HttpClient, HttpClientConfig, HttpClientConfigBuilder, RequestConfig};
pub use rate_limit::{RateLimiter, RateLimiterConfig};

#[cfg(test)]
mod tests;
