//! Token refresh hooks

use super::context::CachedToken;
use crate::error::{Error, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;

/// Production OAuth2 token endpoint
pub const DEFAULT_TOKEN_URL: &str = "https://biz-oauth.yahoo.co.jp/oauth/v1/token";

/// Obtains a fresh bearer token
#[async_trait]
pub trait TokenRefresher: Send + Sync {
    /// Fetch a new token
    async fn refresh(&self) -> Result<CachedToken>;
}

/// OAuth2 refresh-token grant
pub struct OAuth2RefreshTokenRefresher {
    token_url: String,
    client_id: String,
    client_secret: String,
    refresh_token: String,
    http_client: Client,
}

impl OAuth2RefreshTokenRefresher {
    /// Create a refresher for the given credentials
    pub fn new(
        token_url: impl Into<String>,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        refresh_token: impl Into<String>,
    ) -> Self {
        Self {
            token_url: token_url.into(),
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            refresh_token: refresh_token.into(),
            http_client: Client::new(),
        }
    }

    /// Reuse an existing connection pool
    #[must_use]
    pub fn with_client(mut self, http_client: Client) -> Self {
        self.http_client = http_client;
        self
    }
}

#[async_trait]
impl TokenRefresher for OAuth2RefreshTokenRefresher {
    async fn refresh(&self) -> Result<CachedToken> {
        let form = [
            ("grant_type", "refresh_token"),
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
            ("refresh_token", self.refresh_token.as_str()),
        ];

        let response = self
            .http_client
            .post(&self.token_url)
            .form(&form)
            .send()
            .await
            .map_err(Error::Http)?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::TokenRefresh {
                message: format!("Refresh token request failed with status {status}: {body}"),
            });
        }

        let token_response: TokenResponse = response.json().await.map_err(Error::Http)?;
        Ok(token_response.into_cached_token())
    }
}

impl std::fmt::Debug for OAuth2RefreshTokenRefresher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OAuth2RefreshTokenRefresher")
            .field("token_url", &self.token_url)
            .field("client_id", &self.client_id)
            .finish_non_exhaustive()
    }
}

/// OAuth2 token response
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<i64>,
}

impl TokenResponse {
    fn into_cached_token(self) -> CachedToken {
        match self.expires_in {
            Some(secs) => CachedToken::expires_in(self.access_token, secs),
            None => CachedToken::new(self.access_token, None),
        }
    }
}
