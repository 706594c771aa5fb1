//! HTTP client with retry and rate limiting
//!
//! Provides the transport every platform call goes through:
//! - Bearer authentication from the shared `AuthContext`
//! - Automatic retries with configurable backoff
//! - Rate limiting to prevent API throttling
//! - Error classification for retry decisions
//!
//! Non-2xx responses surface as `Error::HttpStatus` with the raw body;
//! interpreting platform error payloads is left to callers.

use super::rate_limit::{RateLimiter, RateLimiterConfig};
use crate::auth::AuthContext;
use crate::error::{Error, Result};
use crate::types::BackoffType;
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, warn};

/// Configuration for the HTTP client
#[derive(Debug, Clone)]
pub struct HttpClientConfig {
    /// Request timeout
    pub timeout: Duration,
    /// Total attempts per request, including the first one
    pub max_attempts: u32,
    /// Delay before the first retry
    pub initial_backoff: Duration,
    /// Upper bound for any single retry delay
    pub max_backoff: Duration,
    /// Type of backoff strategy
    pub backoff_type: BackoffType,
    /// Idle connections kept per host
    pub pool_size: usize,
    /// Rate limiter configuration
    pub rate_limit: Option<RateLimiterConfig>,
    /// Statuses retried in addition to 429 and 5xx
    pub retry_statuses: Vec<u16>,
    /// Default headers for all requests
    pub default_headers: HashMap<String, String>,
    /// User agent string
    pub user_agent: String,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(300),
            max_attempts: 5,
            initial_backoff: Duration::from_secs(5),
            max_backoff: Duration::from_secs(625),
            backoff_type: BackoffType::Platform,
            pool_size: 100,
            rate_limit: Some(RateLimiterConfig::default()),
            retry_statuses: Vec::new(),
            default_headers: HashMap::new(),
            user_agent: format!("ads-report-connector/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

impl HttpClientConfig {
    /// Create a new config builder
    pub fn builder() -> HttpClientConfigBuilder {
        HttpClientConfigBuilder::default()
    }
}

/// Builder for HTTP client config
#[derive(Default)]
pub struct HttpClientConfigBuilder {
    config: HttpClientConfig,
}

impl HttpClientConfigBuilder {
    /// Set the request timeout
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout = timeout;
        self
    }

    /// Set total attempts per request
    pub fn max_attempts(mut self, attempts: u32) -> Self {
        self.config.max_attempts = attempts.max(1);
        self
    }

    /// Set backoff configuration
    pub fn backoff(mut self, backoff_type: BackoffType, initial: Duration, max: Duration) -> Self {
        self.config.backoff_type = backoff_type;
        self.config.initial_backoff = initial;
        self.config.max_backoff = max;
        self
    }

    /// Set the connection pool size
    pub fn pool_size(mut self, size: usize) -> Self {
        self.config.pool_size = size.max(1);
        self
    }

    /// Set rate limiter
    pub fn rate_limit(mut self, config: RateLimiterConfig) -> Self {
        self.config.rate_limit = Some(config);
        self
    }

    /// Disable rate limiting
    pub fn no_rate_limit(mut self) -> Self {
        self.config.rate_limit = None;
        self
    }

    /// Retry an additional status code
    pub fn retry_status(mut self, status: u16) -> Self {
        self.config.retry_statuses.push(status);
        self
    }

    /// Add a default header
    pub fn header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.config.default_headers.insert(key.into(), value.into());
        self
    }

    /// Set user agent
    pub fn user_agent(mut self, agent: impl Into<String>) -> Self {
        self.config.user_agent = agent.into();
        self
    }

    /// Build the config
    pub fn build(self) -> HttpClientConfig {
        self.config
    }
}

/// Configuration for a single request
#[derive(Debug, Clone, Default)]
pub struct RequestConfig {
    /// Request headers
    pub headers: HashMap<String, String>,
    /// Request body (JSON)
    pub body: Option<Value>,
    /// Override timeout for this request
    pub timeout: Option<Duration>,
    /// Override total attempts for this request
    pub max_attempts: Option<u32>,
    /// Statuses retried for this request only
    pub retry_statuses: Vec<u16>,
}

impl RequestConfig {
    /// Create a new request config
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a header
    #[must_use]
    pub fn header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }

    /// Set JSON body
    #[must_use]
    pub fn json(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    /// Set timeout
    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Set total attempts
    #[must_use]
    pub fn attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = Some(attempts.max(1));
        self
    }

    /// Retry an additional status for this request
    #[must_use]
    pub fn retry_on(mut self, status: u16) -> Self {
        self.retry_statuses.push(status);
        self
    }
}

/// HTTP client with retry and rate limiting
#[derive(Clone)]
pub struct HttpClient {
    client: Client,
    config: HttpClientConfig,
    auth: Option<AuthContext>,
    rate_limiter: Option<RateLimiter>,
}

impl HttpClient {
    /// Create a new HTTP client with default configuration
    pub fn new() -> Result<Self> {
        Self::with_config(HttpClientConfig::default())
    }

    /// Create a new HTTP client with custom configuration
    pub fn with_config(config: HttpClientConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .pool_max_idle_per_host(config.pool_size)
            .user_agent(&config.user_agent)
            .build()?;

        let rate_limiter = config.rate_limit.as_ref().map(RateLimiter::new);

        Ok(Self {
            client,
            config,
            auth: None,
            rate_limiter,
        })
    }

    /// Attach the shared bearer token
    #[must_use]
    pub fn with_auth(mut self, auth: AuthContext) -> Self {
        self.auth = Some(auth);
        self
    }

    /// The shared auth context, if any
    pub fn auth(&self) -> Option<&AuthContext> {
        self.auth.as_ref()
    }

    /// Get the underlying reqwest client
    pub fn inner(&self) -> &Client {
        &self.client
    }

    /// Client configuration
    pub fn config(&self) -> &HttpClientConfig {
        &self.config
    }

    /// Make a POST request with a JSON body
    pub async fn post_json(&self, url: &str, body: Value) -> Result<Response> {
        self.execute(Method::POST, url, RequestConfig::new().json(body))
            .await
    }

    /// Make a POST request and parse the JSON response
    pub async fn post_json_for<T: DeserializeOwned>(&self, url: &str, body: Value) -> Result<T> {
        let response = self.post_json(url, body).await?;
        let parsed: T = response.json().await.map_err(Error::Http)?;
        Ok(parsed)
    }

    /// Execute a request, retrying retryable failures.
    ///
    /// Retried: connection errors, timeouts, 429, 5xx and any status listed in
    /// the client or request `retry_statuses`. A 401 is never retried here;
    /// token refresh belongs to the caller.
    pub async fn execute(
        &self,
        method: Method,
        url: &str,
        config: RequestConfig,
    ) -> Result<Response> {
        let max_attempts = config.max_attempts.unwrap_or(self.config.max_attempts).max(1);
        let timeout = config.timeout.unwrap_or(self.config.timeout);

        let mut last_error = None;

        for attempt in 1..=max_attempts {
            let can_retry = attempt < max_attempts;

            if let Some(ref limiter) = self.rate_limiter {
                let waited = limiter.acquire().await;
                if !waited.is_zero() {
                    debug!(url, waited_ms = waited.as_millis() as u64, "Throttled by rate limiter");
                }
            }

            let req = self.build_request(&method, url, &config, timeout).await?;

            let (error, retry_after) = match req.send().await {
                Ok(response) if response.status().is_success() => {
                    debug!(%method, url, attempt, "Request succeeded");
                    return Ok(response);
                }
                Ok(response) => {
                    let status = response.status();
                    let retryable = is_retryable_status(status)
                        || self.config.retry_statuses.contains(&status.as_u16())
                        || config.retry_statuses.contains(&status.as_u16());
                    let retry_after = extract_retry_after(&response)
                        .filter(|_| status == StatusCode::TOO_MANY_REQUESTS);
                    let body = response.text().await.unwrap_or_default();
                    let error = Error::HttpStatus {
                        status: status.as_u16(),
                        body,
                    };

                    if !(retryable && can_retry) {
                        warn!(status = status.as_u16(), error = %error, "HTTP error response");
                        return Err(error);
                    }
                    (error, retry_after)
                }
                Err(e) if e.is_timeout() => {
                    let error = Error::Timeout {
                        timeout_ms: timeout.as_millis() as u64,
                    };
                    if !can_retry {
                        return Err(error);
                    }
                    (error, None)
                }
                Err(e) if e.is_connect() && can_retry => (Error::Http(e), None),
                Err(e) => return Err(Error::Http(e)),
            };

            let delay = retry_after.map_or_else(
                || self.calculate_backoff(attempt - 1),
                |after| after.min(self.config.max_backoff),
            );
            warn!(
                error = %error,
                "Request failed, attempt {attempt}/{max_attempts}, retrying in {delay:?}"
            );
            last_error = Some(error);
            tokio::time::sleep(delay).await;
        }

        Err(last_error.unwrap_or(Error::MaxRetriesExceeded { max_attempts }))
    }

    /// Assemble one attempt: default headers, request headers, body, bearer
    async fn build_request(
        &self,
        method: &Method,
        url: &str,
        config: &RequestConfig,
        timeout: Duration,
    ) -> Result<RequestBuilder> {
        let mut req = self.client.request(method.clone(), url).timeout(timeout);

        for (key, value) in self.config.default_headers.iter().chain(&config.headers) {
            req = req.header(key.as_str(), value.as_str());
        }

        if let Some(ref body) = config.body {
            req = req.json(body);
        }

        match self.auth {
            Some(ref auth) => auth.apply(req).await,
            None => Ok(req),
        }
    }

    /// Check if rate limiting is enabled
    pub fn has_rate_limiter(&self) -> bool {
        self.rate_limiter.is_some()
    }

    /// Calculate backoff delay before retry number `retry` (zero-based)
    pub fn calculate_backoff(&self, retry: u32) -> Duration {
        let initial = self.config.initial_backoff;
        let max = self.config.max_backoff;

        let delay = match self.config.backoff_type {
            BackoffType::Constant => Some(initial),
            BackoffType::Linear => initial.checked_mul(retry.saturating_add(1)),
            BackoffType::Exponential { .. } | BackoffType::Platform => {
                let factor = self.config.backoff_type.factor().unwrap_or(2);
                factor
                    .checked_pow(retry)
                    .and_then(|multiplier| initial.checked_mul(multiplier))
            }
        };

        delay.map_or(max, |d| d.min(max))
    }
}

impl std::fmt::Debug for HttpClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpClient")
            .field("config", &self.config)
            .field("has_auth", &self.auth.is_some())
            .field("has_rate_limiter", &self.rate_limiter.is_some())
            .finish_non_exhaustive()
    }
}

/// Check if an HTTP status is retryable
fn is_retryable_status(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

/// Extract retry-after header value
fn extract_retry_after(response: &Response) -> Option<Duration> {
    response
        .headers()
        .get("retry-after")
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
}
