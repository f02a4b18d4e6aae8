use std::time::{Duration, Instant};

use serde::Deserialize;
use tokio::sync::Mutex;

use crate::config::OAuthConfig;
use crate::error::{EngineError, Result};

/// Refresh the token this long before it actually expires so requests
/// never go out with a token about to lapse mid-flight.
const EXPIRY_MARGIN: Duration = Duration::from_secs(30);

const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

fn default_expires_in() -> u64 {
    3600
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default = "default_expires_in")]
    expires_in: u64,
}

#[derive(Debug, Clone)]
struct CachedToken {
    token: String,
    expires_at: Instant,
}

/// Client-credentials token provider for the gateway.
///
/// Fetches an access token from the configured auth server and caches
/// it until shortly before expiry. All authenticated gateway requests
/// go through [`access_token`](OAuthProvider::access_token).
pub struct OAuthProvider {
    http: reqwest::Client,
    config: OAuthConfig,
    cached: Mutex<Option<CachedToken>>,
}

impl OAuthProvider {
    pub fn new(config: OAuthConfig) -> Result<Self> {
        let http = reqwest::Client::builder().timeout(HTTP_TIMEOUT).build()?;
        Ok(Self {
            http,
            config,
            cached: Mutex::new(None),
        })
    }

    /// Return a valid access token, fetching a fresh one if the cached
    /// token is absent or inside the expiry margin.
    pub async fn access_token(&self) -> Result<String> {
        let mut cached = self.cached.lock().await;
        if let Some(token) = cached.as_ref() {
            if Instant::now() + EXPIRY_MARGIN < token.expires_at {
                return Ok(token.token.clone());
            }
        }

        let fresh = self.fetch_token().await?;
        let token = fresh.token.clone();
        *cached = Some(fresh);
        Ok(token)
    }

    async fn fetch_token(&self) -> Result<CachedToken> {
        tracing::debug!(
            auth_server = %self.config.auth_server_url,
            audience = %self.config.audience,
            "Requesting access token"
        );

        let response = self
            .http
            .post(&self.config.auth_server_url)
            .form(&[
                ("grant_type", "client_credentials"),
                ("client_id", self.config.client_id.as_str()),
                ("client_secret", self.config.client_secret.as_str()),
                ("audience", self.config.audience.as_str()),
            ])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(EngineError::Auth(format!(
                "token endpoint returned {}",
                status
            )));
        }

        let body: TokenResponse = response.json().await?;
        Ok(CachedToken {
            token: body.access_token,
            expires_at: Instant::now() + Duration::from_secs(body.expires_in),
        })
    }
}
