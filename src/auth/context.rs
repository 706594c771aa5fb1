//! Shared bearer token state

use super::refresher::TokenRefresher;
use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use reqwest::RequestBuilder;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};

/// Cached token with expiration
#[derive(Debug, Clone)]
pub struct CachedToken {
    /// The access token
    pub token: String,
    /// When the token expires
    pub expires_at: Option<DateTime<Utc>>,
}

impl CachedToken {
    /// Create a new cached token
    pub fn new(token: impl Into<String>, expires_at: Option<DateTime<Utc>>) -> Self {
        Self {
            token: token.into(),
            expires_at,
        }
    }

    /// Create a token that expires in N seconds from now
    pub fn expires_in(token: impl Into<String>, seconds: i64) -> Self {
        Self {
            token: token.into(),
            expires_at: Some(Utc::now() + chrono::Duration::seconds(seconds)),
        }
    }

    /// Check if the token is expired (with 30 second buffer)
    pub fn is_expired(&self) -> bool {
        match self.expires_at {
            Some(expires_at) => Utc::now() + chrono::Duration::seconds(30) >= expires_at,
            None => false,
        }
    }
}

/// Bearer token plus the hook that renews it.
///
/// Cloning is cheap; all clones observe the same token.
#[derive(Clone)]
pub struct AuthContext {
    token: Arc<RwLock<Option<CachedToken>>>,
    refresher: Option<Arc<dyn TokenRefresher>>,
}

impl AuthContext {
    /// Context with a fixed token and no refresh hook
    pub fn bearer_token(token: impl Into<String>) -> Self {
        Self {
            token: Arc::new(RwLock::new(Some(CachedToken::new(token, None)))),
            refresher: None,
        }
    }

    /// Context backed by a refresh hook, optionally seeded with a token
    pub fn with_refresher(initial: Option<String>, refresher: Arc<dyn TokenRefresher>) -> Self {
        Self {
            token: Arc::new(RwLock::new(initial.map(|t| CachedToken::new(t, None)))),
            refresher: Some(refresher),
        }
    }

    /// Whether a refresh hook is installed
    pub fn can_refresh(&self) -> bool {
        self.refresher.is_some()
    }

    /// Current bearer token, fetching one through the hook when the cached
    /// token is missing or expired
    pub async fn bearer(&self) -> Result<String> {
        {
            let cached = self.token.read().await;
            if let Some(token) = cached.as_ref() {
                if !token.is_expired() {
                    return Ok(token.token.clone());
                }
            }
        }

        let mut cached = self.token.write().await;

        // Another task may have refreshed while we waited for the lock
        if let Some(token) = cached.as_ref() {
            if !token.is_expired() {
                return Ok(token.token.clone());
            }
        }

        let refresher = self
            .refresher
            .as_ref()
            .ok_or_else(|| Error::auth("No bearer token available and no refresh hook"))?;
        debug!("Fetching bearer token");
        let fresh = refresher.refresh().await?;
        let token = fresh.token.clone();
        *cached = Some(fresh);
        Ok(token)
    }

    /// Force a refresh through the hook, e.g. after the platform answered 401
    pub async fn refresh(&self) -> Result<String> {
        let refresher = self
            .refresher
            .as_ref()
            .ok_or_else(|| Error::auth("Bearer token rejected and no refresh hook installed"))?;

        let mut cached = self.token.write().await;
        let fresh = refresher.refresh().await?;
        info!("Bearer token refreshed");
        let token = fresh.token.clone();
        *cached = Some(fresh);
        Ok(token)
    }

    /// Cached token, without fetching or refreshing
    pub async fn current(&self) -> Option<String> {
        self.token.read().await.as_ref().map(|t| t.token.clone())
    }

    /// Refresh after the platform rejected `rejected` with a 401.
    ///
    /// Tasks that saw the same rejection queue on the write lock; the first
    /// one runs the grant and the rest pick up its token, so a burst of 401s
    /// costs a single grant. Without a known `rejected` token the grant
    /// always runs.
    pub async fn refresh_rejected(&self, rejected: Option<&str>) -> Result<String> {
        let refresher = self
            .refresher
            .as_ref()
            .ok_or_else(|| Error::auth("Bearer token rejected and no refresh hook installed"))?;

        let mut cached = self.token.write().await;
        if let (Some(token), Some(rejected)) = (cached.as_ref(), rejected) {
            if token.token != rejected && !token.is_expired() {
                debug!("Bearer token already replaced, skipping refresh");
                return Ok(token.token.clone());
            }
        }

        let fresh = refresher.refresh().await?;
        info!("Bearer token refreshed");
        let token = fresh.token.clone();
        *cached = Some(fresh);
        Ok(token)
    }

    /// Attach `Authorization: Bearer <token>` to a request
    pub async fn apply(&self, req: RequestBuilder) -> Result<RequestBuilder> {
        let token = self.bearer().await?;
        Ok(req.bearer_auth(token))
    }
}

impl std::fmt::Debug for AuthContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthContext")
            .field("can_refresh", &self.refresher.is_some())
            .finish_non_exhaustive()
    }
}
