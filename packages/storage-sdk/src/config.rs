use serde::{Deserialize, Serialize};

/// Connection settings for a Supabase storage endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Project base URL, e.g. `https://xyz.supabase.co`
    pub url: String,
    /// Service role key, sent both as bearer token and `apikey` header
    pub service_key: String,
}

impl StorageConfig {
    pub fn new(url: impl Into<String>, service_key: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            service_key: service_key.into(),
        }
    }
}
