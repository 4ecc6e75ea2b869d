//! The seam between the sync pipeline and the storage backend.

use std::path::Path;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;

use crate::auth::{Credentials, TokenManager};
use crate::drive_api::DriveClient;
use crate::drive_api::types::{DriveItem, FOLDER_MIME_TYPE};

/// A file or folder in the remote store.
pub type RemoteItem = DriveItem;

/// Filter for one folder listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListQuery {
    pub parent_id: String,
    pub name: Option<String>,
    pub mime_type: Option<String>,
}

impl ListQuery {
    /// Every non-trashed child of `parent_id`.
    pub fn children(parent_id: &str) -> Self {
        Self {
            parent_id: parent_id.to_string(),
            name: None,
            mime_type: None,
        }
    }

    /// Child folders of `parent_id` with exactly this name.
    pub fn child_folder(parent_id: &str, name: &str) -> Self {
        Self {
            parent_id: parent_id.to_string(),
            name: Some(name.to_string()),
            mime_type: Some(FOLDER_MIME_TYPE.to_string()),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ItemPage {
    pub items: Vec<RemoteItem>,
    pub next_page_token: Option<String>,
}

#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Fetch one page of a listing.
    async fn list_page(&self, query: &ListQuery, page_token: Option<&str>) -> Result<ItemPage>;

    /// Create a folder, returning its id.
    async fn create_folder(&self, name: &str, parent_id: &str) -> Result<String>;

    /// Create a new file from local content, returning its id.
    async fn upload_file(&self, local_path: &Path, name: &str, parent_id: &str) -> Result<String>;

    /// Fetch every page of a listing.
    async fn list_all(&self, query: &ListQuery) -> Result<Vec<RemoteItem>> {
        let mut items = Vec::new();
        let mut page_token: Option<String> = None;
        let mut pages = 0usize;

        loop {
            let page = self.list_page(query, page_token.as_deref()).await?;
            pages += 1;
            items.extend(page.items);

            match page.next_page_token {
                Some(token) if !token.is_empty() => {
                    tracing::trace!(parent = %query.parent_id, pages, "more results, fetching next page");
                    page_token = Some(token);
                }
                _ => break,
            }
        }

        Ok(items)
    }
}

#[async_trait]
impl RemoteStore for DriveClient {
    async fn list_page(&self, query: &ListQuery, page_token: Option<&str>) -> Result<ItemPage> {
        let page = self.list_files(query, page_token).await?;
        Ok(ItemPage {
            items: page.files,
            next_page_token: page.next_page_token,
        })
    }

    async fn create_folder(&self, name: &str, parent_id: &str) -> Result<String> {
        DriveClient::create_folder(self, name, parent_id).await
    }

    async fn upload_file(&self, local_path: &Path, name: &str, parent_id: &str) -> Result<String> {
        DriveClient::upload_file(self, local_path, name, parent_id).await
    }
}

/// Builds a store from a credentials value. Each upload worker calls this
/// once with its own copy.
pub trait RemoteConnector: Send + Sync + 'static {
    type Store: RemoteStore + 'static;

    fn connect(&self, credentials: Credentials) -> Result<Self::Store>;
}

/// Connects to Google Drive.
#[derive(Debug, Clone)]
pub struct DriveConnector {
    page_size: u32,
    endpoints: Option<(String, String)>,
}

impl DriveConnector {
    pub fn new(page_size: u32) -> Self {
        Self {
            page_size,
            endpoints: None,
        }
    }

    #[cfg(test)]
    pub fn with_endpoints(page_size: u32, api_base: &str, upload_base: &str) -> Self {
        Self {
            page_size,
            endpoints: Some((api_base.to_string(), upload_base.to_string())),
        }
    }
}

impl RemoteConnector for DriveConnector {
    type Store = DriveClient;

    fn connect(&self, credentials: Credentials) -> Result<DriveClient> {
        let tokens = Arc::new(TokenManager::new(credentials));
        let client = match &self.endpoints {
            Some((api, upload)) => DriveClient::with_base_urls(tokens, api.as_str(), upload.as_str())?,
            None => DriveClient::new(tokens)?,
        };
        Ok(client.with_page_size(self.page_size))
    }
}
