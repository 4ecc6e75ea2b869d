use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::{Method, RequestBuilder, Response};

use crate::auth::TokenManager;

use super::types::DriveErrorResponse;

pub const API_BASE: &str = "https://www.googleapis.com/drive/v3";
pub const UPLOAD_BASE: &str = "https://www.googleapis.com/upload/drive/v3";

pub struct DriveClient {
    http: reqwest::Client,
    token_manager: Arc<TokenManager>,
    api_base: String,
    upload_base: String,
    pub(super) page_size: u32,
}

impl DriveClient {
    pub fn new(token_manager: Arc<TokenManager>) -> Result<Self> {
        Self::with_base_urls(token_manager, API_BASE, UPLOAD_BASE)
    }

    /// Point the client at other endpoints (a mock server in tests).
    pub fn with_base_urls(
        token_manager: Arc<TokenManager>,
        api_base: impl Into<String>,
        upload_base: impl Into<String>,
    ) -> Result<Self> {
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(30))
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            http,
            token_manager,
            api_base: api_base.into(),
            upload_base: upload_base.into(),
            page_size: 1000,
        })
    }

    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size;
        self
    }

    /// Build an authenticated request to the metadata API.
    pub fn api_request(&self, method: Method, path: &str) -> AuthenticatedRequest<'_> {
        let url = format!("{}{path}", self.api_base);
        AuthenticatedRequest {
            client: self,
            builder: self.http.request(method, &url),
        }
    }

    /// Build an authenticated request to the media upload endpoint.
    pub fn upload_request(&self, method: Method, path: &str) -> AuthenticatedRequest<'_> {
        let url = format!("{}{path}", self.upload_base);
        AuthenticatedRequest {
            client: self,
            builder: self.http.request(method, &url),
        }
    }
}

/// Attaches the bearer token and maps Drive error responses.
pub struct AuthenticatedRequest<'a> {
    client: &'a DriveClient,
    builder: RequestBuilder,
}

impl<'a> AuthenticatedRequest<'a> {
    pub fn query<T: serde::Serialize + ?Sized>(mut self, params: &T) -> Self {
        self.builder = self.builder.query(params);
        self
    }

    pub fn header(mut self, key: &str, value: &str) -> Self {
        self.builder = self.builder.header(key, value);
        self
    }

    pub fn json<T: serde::Serialize + ?Sized>(mut self, body: &T) -> Self {
        self.builder = self.builder.json(body);
        self
    }

    pub fn body(mut self, body: reqwest::Body) -> Self {
        self.builder = self.builder.body(body);
        self
    }

    /// Send once. Non-success statuses become errors carrying Drive's message.
    pub async fn send(self) -> Result<Response> {
        let token = self.client.token_manager.get_access_token().await?;

        let resp = self
            .builder
            .bearer_auth(&token)
            .send()
            .await
            .context("HTTP request failed")?;

        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }

        let body = resp.text().await.unwrap_or_default();
        if let Ok(err) = serde_json::from_str::<DriveErrorResponse>(&body) {
            anyhow::bail!("{}", err.error);
        }
        anyhow::bail!("Drive API error ({status}): {body}");
    }
}

impl DriveClient {
    /// GET /about: the authenticated user's display name or email.
    pub async fn about_user(&self) -> Result<String> {
        let resp = self
            .api_request(Method::GET, "/about")
            .query(&[("fields", "user(displayName,emailAddress)")])
            .send()
            .await
            .context("Failed to fetch account information")?;

        let about: super::types::About = resp
            .json()
            .await
            .context("Failed to parse /about response")?;
        Ok(about
            .user
            .display_name
            .or(about.user.email_address)
            .unwrap_or_else(|| "unknown user".into()))
    }
}
