mod oauth;
mod token_store;

pub use oauth::run_auth_flow;
pub use token_store::TokenData;

use std::path::PathBuf;

use anyhow::{Context, Result};
use tokio::sync::Mutex;

use crate::config::{AuthConfig, ClientSecret};

/// Refresh when the access token expires within this many seconds.
const REFRESH_MARGIN_SECS: i64 = 60;

/// Everything a worker needs to build its own authenticated client.
///
/// Plain data: copied into each worker, never shared as a live handle.
#[derive(Debug, Clone)]
pub struct Credentials {
    pub client_id: String,
    pub client_secret: String,
    pub tokens: TokenData,
}

/// Load stored tokens, refresh them if they are about to expire, and
/// return the credentials for this run. Any failure here aborts the run.
pub async fn authenticate(secret: &ClientSecret, auth: &AuthConfig) -> Result<Credentials> {
    let token_path = token_store::resolve_token_path(auth.token_path.as_deref())?;
    if !token_path.exists() {
        anyhow::bail!(
            "Not authenticated: no tokens at {}. Run `drivepush auth` first.",
            token_path.display()
        );
    }
    let tokens = token_store::load_tokens(&token_path)?;
    tracing::debug!(path = %token_path.display(), "loaded stored tokens");

    let credentials = Credentials {
        client_id: secret.client_id.clone(),
        client_secret: secret.client_secret.clone(),
        tokens,
    };
    let manager = TokenManager::new(credentials).persist_to(token_path);
    manager.get_access_token().await?;
    Ok(manager.credentials().await)
}

/// Hands out valid access tokens, refreshing through the token endpoint.
pub struct TokenManager {
    client_id: String,
    client_secret: String,
    token_url: String,
    token_path: Option<PathBuf>,
    tokens: Mutex<TokenData>,
    http_client: reqwest::Client,
}

impl TokenManager {
    pub fn new(credentials: Credentials) -> Self {
        Self {
            client_id: credentials.client_id,
            client_secret: credentials.client_secret,
            token_url: oauth::TOKEN_URL.to_string(),
            token_path: None,
            tokens: Mutex::new(credentials.tokens),
            http_client: reqwest::Client::new(),
        }
    }

    /// Save refreshed tokens to this file.
    pub fn persist_to(mut self, path: PathBuf) -> Self {
        self.token_path = Some(path);
        self
    }

    #[cfg(test)]
    pub fn with_token_url(mut self, url: impl Into<String>) -> Self {
        self.token_url = url.into();
        self
    }

    /// Snapshot of the current credentials.
    pub async fn credentials(&self) -> Credentials {
        Credentials {
            client_id: self.client_id.clone(),
            client_secret: self.client_secret.clone(),
            tokens: self.tokens.lock().await.clone(),
        }
    }

    /// Get a valid access token, refreshing if necessary.
    pub async fn get_access_token(&self) -> Result<String> {
        let mut tokens = self.tokens.lock().await;

        let now = chrono::Utc::now();
        if tokens.expires_at <= now + chrono::Duration::seconds(REFRESH_MARGIN_SECS) {
            tracing::debug!("access token expired or expiring soon, refreshing");
            *tokens = self.refresh(&tokens).await?;
            if let Some(path) = &self.token_path {
                token_store::save_tokens(path, &tokens)?;
            }
            tracing::debug!("token refreshed");
        }

        Ok(tokens.access_token.clone())
    }

    async fn refresh(&self, tokens: &TokenData) -> Result<TokenData> {
        let resp = self
            .http_client
            .post(&self.token_url)
            .form(&[
                ("grant_type", "refresh_token"),
                ("refresh_token", tokens.refresh_token.as_str()),
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
            ])
            .send()
            .await
            .context("Failed to contact Google token endpoint")?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            anyhow::bail!(
                "Token refresh failed ({status}): {body}\n\
                 You may need to re-authenticate with `drivepush auth`"
            );
        }

        let tr: oauth::TokenResponse = resp
            .json()
            .await
            .context("Failed to parse token response")?;
        let expires_at = chrono::Utc::now() + chrono::Duration::seconds(tr.expires_in as i64);

        Ok(TokenData {
            access_token: tr.access_token,
            // Google omits the refresh token on refresh responses
            refresh_token: tr
                .refresh_token
                .unwrap_or_else(|| tokens.refresh_token.clone()),
            expires_at,
        })
    }
}
