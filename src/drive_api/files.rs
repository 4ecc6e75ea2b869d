use std::path::Path;

use anyhow::{Context, Result};
use bytes::Bytes;
use futures_util::StreamExt;
use futures_util::stream;
use reqwest::Method;
use tokio_util::io::ReaderStream;

use super::client::DriveClient;
use super::types::{CreatedFile, FileMetadata};

impl DriveClient {
    /// Create a new file under `parent_id` with the contents of `local_path`.
    ///
    /// Sends a single `multipart/related` request: the JSON metadata part,
    /// then the file content streamed from disk.
    pub async fn upload_file(&self, local_path: &Path, name: &str, parent_id: &str) -> Result<String> {
        let file = tokio::fs::File::open(local_path)
            .await
            .with_context(|| format!("Failed to open {}", local_path.display()))?;
        let file_len = file
            .metadata()
            .await
            .with_context(|| format!("Cannot stat {}", local_path.display()))?
            .len();

        let metadata = FileMetadata {
            name: name.to_string(),
            parents: vec![parent_id.to_string()],
            mime_type: None,
        };
        let body = MultipartRelated::new(&metadata)?;
        let content_length = body.len(file_len);
        let content_type = body.content_type();
        let MultipartRelated { head, tail, .. } = body;

        let parts = stream::once(async move { Ok::<_, std::io::Error>(head) })
            .chain(ReaderStream::new(file))
            .chain(stream::once(async move { Ok(tail) }));

        let resp = self
            .upload_request(Method::POST, "/files")
            .query(&[
                ("uploadType", "multipart"),
                ("fields", "id"),
                ("supportsAllDrives", "true"),
            ])
            .header("content-type", &content_type)
            .header("content-length", &content_length.to_string())
            .body(reqwest::Body::wrap_stream(parts))
            .send()
            .await
            .with_context(|| format!("Failed to upload {}", local_path.display()))?;

        let created: CreatedFile = resp
            .json()
            .await
            .context("Failed to parse upload response")?;
        Ok(created.id)
    }
}

/// The fixed framing around the file bytes of a `multipart/related` body.
struct MultipartRelated {
    boundary: String,
    head: Bytes,
    tail: Bytes,
}

impl MultipartRelated {
    fn new(metadata: &FileMetadata) -> Result<Self> {
        let boundary = format!("drivepush-{:016x}", rand::random::<u64>());
        let json = serde_json::to_string(metadata)?;
        let head = format!(
            "--{boundary}\r\n\
             Content-Type: application/json; charset=UTF-8\r\n\r\n\
             {json}\r\n\
             --{boundary}\r\n\
             Content-Type: application/octet-stream\r\n\r\n"
        );
        let tail = format!("\r\n--{boundary}--\r\n");
        Ok(Self {
            boundary,
            head: Bytes::from(head),
            tail: Bytes::from(tail),
        })
    }

    fn content_type(&self) -> String {
        format!("multipart/related; boundary={}", self.boundary)
    }

    fn len(&self, file_len: u64) -> u64 {
        self.head.len() as u64 + file_len + self.tail.len() as u64
    }
}
