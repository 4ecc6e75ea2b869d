use anyhow::{Context, Result};
use reqwest::Method;

use super::client::DriveClient;
use super::types::{CreatedFile, FOLDER_MIME_TYPE, FileList, FileMetadata};
use crate::remote::ListQuery;

const LIST_FIELDS: &str = "nextPageToken, files(id, name, mimeType, size)";

impl DriveClient {
    /// Fetch one page of a folder listing.
    pub async fn list_files(&self, query: &ListQuery, page_token: Option<&str>) -> Result<FileList> {
        let q = drive_query(query);
        let page_size = self.page_size.to_string();
        let mut params = vec![
            ("q", q.as_str()),
            ("fields", LIST_FIELDS),
            ("pageSize", page_size.as_str()),
            ("supportsAllDrives", "true"),
            ("includeItemsFromAllDrives", "true"),
        ];
        if let Some(token) = page_token {
            params.push(("pageToken", token));
        }

        let resp = self
            .api_request(Method::GET, "/files")
            .query(&params)
            .send()
            .await
            .with_context(|| format!("Failed to list folder {}", query.parent_id))?;

        resp.json()
            .await
            .context("Failed to parse file list response")
    }

    /// Create a folder and return its id.
    pub async fn create_folder(&self, name: &str, parent_id: &str) -> Result<String> {
        let body = FileMetadata {
            name: name.to_string(),
            parents: vec![parent_id.to_string()],
            mime_type: Some(FOLDER_MIME_TYPE.to_string()),
        };

        let resp = self
            .api_request(Method::POST, "/files")
            .query(&[("fields", "id"), ("supportsAllDrives", "true")])
            .json(&body)
            .send()
            .await
            .with_context(|| format!("Failed to create folder {name} in {parent_id}"))?;

        let created: CreatedFile = resp
            .json()
            .await
            .context("Failed to parse create folder response")?;
        Ok(created.id)
    }
}

/// Build the `q` parameter for a listing.
pub fn drive_query(query: &ListQuery) -> String {
    let mut q = format!("'{}' in parents and trashed = false", escape(&query.parent_id));
    if let Some(name) = &query.name {
        q.push_str(&format!(" and name = '{}'", escape(name)));
    }
    if let Some(mime) = &query.mime_type {
        q.push_str(&format!(" and mimeType = '{}'", escape(mime)));
    }
    q
}

/// Escape a string literal for the Drive query language.
fn escape(value: &str) -> String {
    value.replace('\\', "\\\\").replace('\'', "\\'")
}
