use serde::{Deserialize, Serialize};

pub const FOLDER_MIME_TYPE: &str = "application/vnd.google-apps.folder";

/// A file or folder from a `files.list` response.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DriveItem {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub mime_type: String,
    /// Drive encodes int64 fields as JSON strings.
    #[serde(default, deserialize_with = "optional_u64_from_string")]
    pub size: Option<u64>,
}

impl DriveItem {
    pub fn is_folder(&self) -> bool {
        self.mime_type == FOLDER_MIME_TYPE
    }
}

/// One page of `GET /files`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileList {
    #[serde(default)]
    pub files: Vec<DriveItem>,
    #[serde(default)]
    pub next_page_token: Option<String>,
}

/// Metadata body for folder creation and multipart uploads.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FileMetadata {
    pub name: String,
    pub parents: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
}

/// Response from `files.create` with `fields=id`.
#[derive(Debug, Clone, Deserialize)]
pub struct CreatedFile {
    pub id: String,
}

/// Response from `GET /about?fields=user`.
#[derive(Debug, Clone, Deserialize)]
pub struct About {
    pub user: AboutUser,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AboutUser {
    pub display_name: Option<String>,
    pub email_address: Option<String>,
}

/// Drive error envelope: `{"error": {...}}`.
#[derive(Debug, Clone, Deserialize)]
pub struct DriveErrorResponse {
    pub error: DriveApiError,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DriveApiError {
    pub code: Option<u16>,
    pub message: Option<String>,
    pub status: Option<String>,
}

impl std::fmt::Display for DriveApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Drive API error {}: {} (status: {})",
            self.code.unwrap_or(0),
            self.message.as_deref().unwrap_or("unknown"),
            self.status.as_deref().unwrap_or("none"),
        )
    }
}

/// Deserialize an optional integer sent as either a JSON string or number.
fn optional_u64_from_string<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    use serde::de;

    struct StringOrNumber;

    impl<'de> de::Visitor<'de> for StringOrNumber {
        type Value = Option<u64>;

        fn expecting(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
            f.write_str("an integer as a string or a number")
        }

        fn visit_str<E: de::Error>(self, v: &str) -> Result<Self::Value, E> {
            v.parse().map(Some).map_err(E::custom)
        }

        fn visit_u64<E: de::Error>(self, v: u64) -> Result<Self::Value, E> {
            Ok(Some(v))
        }

        fn visit_none<E: de::Error>(self) -> Result<Self::Value, E> {
            Ok(None)
        }

        fn visit_unit<E: de::Error>(self) -> Result<Self::Value, E> {
            Ok(None)
        }
    }

    deserializer.deserialize_any(StringOrNumber)
}
