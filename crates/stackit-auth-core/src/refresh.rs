//! OAuth2 refresh-token grant.

use crate::credential::{Credential, DEFAULT_SAFETY_MARGIN_SECONDS};
use crate::error::AuthError;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// STACKIT OAuth2 token endpoint
pub const TOKEN_ENDPOINT: &str = "https://accounts.stackit.cloud/oauth2/token";
/// Public client id of the STACKIT CLI
pub const CLI_CLIENT_ID: &str = "stackit-cli-0000-0000-000000000001";

/// Refresh settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefreshConfig {
    #[serde(default = "default_token_endpoint")]
    pub token_endpoint: String,
    #[serde(default = "default_client_id")]
    pub client_id: String,
    /// Upper bound for one refresh request, in seconds
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,
    /// Tokens expiring within this many seconds are refreshed proactively
    #[serde(default = "default_safety_margin_seconds")]
    pub safety_margin_seconds: i64,
}

fn default_token_endpoint() -> String {
    TOKEN_ENDPOINT.to_string()
}
fn default_client_id() -> String {
    CLI_CLIENT_ID.to_string()
}
fn default_timeout_seconds() -> u64 {
    30
}
fn default_safety_margin_seconds() -> i64 {
    DEFAULT_SAFETY_MARGIN_SECONDS
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            token_endpoint: default_token_endpoint(),
            client_id: default_client_id(),
            timeout_seconds: default_timeout_seconds(),
            safety_margin_seconds: default_safety_margin_seconds(),
        }
    }
}

impl RefreshConfig {
    /// Margin as a duration; negative values count as zero and values beyond
    /// the representable range saturate.
    pub fn safety_margin(&self) -> Duration {
        Duration::try_seconds(self.safety_margin_seconds.max(0)).unwrap_or(Duration::MAX)
    }

    pub fn timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.timeout_seconds)
    }
}

/// Exchanges a refresh token for a new access token.
///
/// Implementations return the updated record and never touch storage.
#[async_trait]
pub trait TokenRefresher: Send + Sync {
    async fn refresh(&self, credential: &Credential) -> Result<Credential, AuthError>;
}

#[derive(Debug, Deserialize)]
struct RefreshTokenResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    expires_in: Option<i64>,
    #[serde(default)]
    #[allow(dead_code)]
    token_type: Option<String>,
}

/// Refresh-token grant against the STACKIT token endpoint
#[derive(Debug, Clone)]
pub struct OAuthTokenRefresher {
    client: Client,
    token_endpoint: String,
    client_id: String,
}

impl OAuthTokenRefresher {
    pub fn new(config: &RefreshConfig) -> Result<Self, AuthError> {
        let client = Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| AuthError::RefreshTransport(format!("create client: {}", e)))?;
        Ok(Self::with_client(client, config))
    }

    pub fn with_client(client: Client, config: &RefreshConfig) -> Self {
        Self {
            client,
            token_endpoint: config.token_endpoint.clone(),
            client_id: config.client_id.clone(),
        }
    }
}

#[async_trait]
impl TokenRefresher for OAuthTokenRefresher {
    async fn refresh(&self, credential: &Credential) -> Result<Credential, AuthError> {
        if credential.refresh_token.is_empty() {
            return Err(AuthError::RefreshTransport(
                "refresh token is empty".to_string(),
            ));
        }

        debug!(endpoint = %self.token_endpoint, "Requesting token refresh");
        let response = self
            .client
            .post(&self.token_endpoint)
            .form(&[
                ("grant_type", "refresh_token"),
                ("refresh_token", credential.refresh_token.as_str()),
                ("client_id", self.client_id.as_str()),
            ])
            .send()
            .await
            .map_err(|e| AuthError::RefreshTransport(format!("execute request: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AuthError::RefreshRejected {
                status: status.as_u16(),
                body,
            });
        }

        let result = response
            .json::<RefreshTokenResponse>()
            .await
            .map_err(|e| AuthError::RefreshTransport(format!("decode response: {}", e)))?;

        if result.access_token.is_empty() {
            return Err(AuthError::RefreshTransport(
                "token response did not include an access_token".to_string(),
            ));
        }

        let mut refreshed = credential.clone();
        refreshed.access_token = result.access_token;
        if let Some(rotated) = result.refresh_token.filter(|t| !t.is_empty()) {
            refreshed.refresh_token = rotated;
        }
        refreshed.expires_at = result
            .expires_in
            .filter(|seconds| *seconds > 0)
            .and_then(expiry_from_now);

        Ok(refreshed)
    }
}

/// `now + expires_in`, or `None` when the result is not representable.
fn expiry_from_now(seconds: i64) -> Option<DateTime<Utc>> {
    let expires_at =
        Duration::try_seconds(seconds).and_then(|ttl| Utc::now().checked_add_signed(ttl));
    if expires_at.is_none() {
        warn!(expires_in = seconds, "Ignoring out-of-range expires_in in token response");
    }
    expires_at
}
