use serde::{Deserialize, Serialize};

/// Options attached to an upload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadOptions {
    pub content_type: String,
    /// Overwrite an existing object at the same key
    pub upsert: bool,
}

impl Default for UploadOptions {
    fn default() -> Self {
        Self {
            content_type: "application/octet-stream".to_string(),
            upsert: false,
        }
    }
}

impl UploadOptions {
    pub fn new(content_type: impl Into<String>) -> Self {
        Self {
            content_type: content_type.into(),
            ..Self::default()
        }
    }

    pub fn upsert(mut self) -> Self {
        self.upsert = true;
        self
    }
}

/// Error body returned by the storage API.
///
/// `statusCode` arrives either as a string or a number depending on the
/// server version, so it is kept as a raw value.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ApiErrorBody {
    #[serde(rename = "statusCode")]
    pub status_code: Option<serde_json::Value>,
    pub error: Option<String>,
    pub message: Option<String>,
}

impl ApiErrorBody {
    /// Best human-readable message, preferring `message` over `error`.
    pub fn into_message(self) -> Option<String> {
        self.message
            .filter(|m| !m.is_empty())
            .or(self.error.filter(|e| !e.is_empty()))
    }
}
