pub mod client;
pub mod config;
pub mod error;
pub mod memory;
pub mod models;

pub use client::StorageClient;
pub use config::StorageConfig;
pub use error::{Result, StorageError};
pub use memory::MemoryStorage;
pub use models::UploadOptions;

use async_trait::async_trait;

/// Object storage as seen by the render pipelines.
#[async_trait]
pub trait ObjectStorage: Send + Sync {
    /// Fetch the object at `key` in `bucket`.
    async fn download(&self, bucket: &str, key: &str) -> Result<Vec<u8>>;

    /// Store `body` at `key` in `bucket`.
    async fn upload(
        &self,
        bucket: &str,
        key: &str,
        body: Vec<u8>,
        options: UploadOptions,
    ) -> Result<()>;
}
