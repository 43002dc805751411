use crate::{error::*, models::UploadOptions, ObjectStorage};
use async_trait::async_trait;
use std::{collections::HashMap, sync::Mutex};

/// A stored object
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    pub body: Vec<u8>,
    pub content_type: String,
}

/// A call made against [`MemoryStorage`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageCall {
    Download { bucket: String, key: String },
    Upload { bucket: String, key: String },
}

#[derive(Default)]
struct Inner {
    objects: HashMap<(String, String), StoredObject>,
    calls: Vec<StorageCall>,
    upload_failure: Option<String>,
}

/// In-process object storage with a call journal
#[derive(Default)]
pub struct MemoryStorage {
    inner: Mutex<Inner>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed an object without recording a call
    pub fn insert(&self, bucket: &str, key: &str, body: impl Into<Vec<u8>>, content_type: &str) {
        let mut inner = self.lock();
        inner.objects.insert(
            (bucket.to_string(), key.to_string()),
            StoredObject {
                body: body.into(),
                content_type: content_type.to_string(),
            },
        );
    }

    pub fn get(&self, bucket: &str, key: &str) -> Option<StoredObject> {
        self.lock()
            .objects
            .get(&(bucket.to_string(), key.to_string()))
            .cloned()
    }

    /// Make every following upload fail with `message`
    pub fn fail_uploads(&self, message: impl Into<String>) {
        self.lock().upload_failure = Some(message.into());
    }

    pub fn calls(&self) -> Vec<StorageCall> {
        self.lock().calls.clone()
    }

    pub fn upload_count(&self) -> usize {
        self.lock()
            .calls
            .iter()
            .filter(|c| matches!(c, StorageCall::Upload { .. }))
            .count()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl ObjectStorage for MemoryStorage {
    async fn download(&self, bucket: &str, key: &str) -> Result<Vec<u8>> {
        let mut inner = self.lock();
        inner.calls.push(StorageCall::Download {
            bucket: bucket.to_string(),
            key: key.to_string(),
        });

        inner
            .objects
            .get(&(bucket.to_string(), key.to_string()))
            .map(|o| o.body.clone())
            .ok_or_else(|| StorageError::Api {
                status: 404,
                message: "Object not found".to_string(),
            })
    }

    async fn upload(
        &self,
        bucket: &str,
        key: &str,
        body: Vec<u8>,
        options: UploadOptions,
    ) -> Result<()> {
        let mut inner = self.lock();
        inner.calls.push(StorageCall::Upload {
            bucket: bucket.to_string(),
            key: key.to_string(),
        });

        if let Some(message) = &inner.upload_failure {
            return Err(StorageError::Api {
                status: 500,
                message: message.clone(),
            });
        }

        let slot = (bucket.to_string(), key.to_string());
        if !options.upsert && inner.objects.contains_key(&slot) {
            return Err(StorageError::Api {
                status: 409,
                message: "The resource already exists".to_string(),
            });
        }

        inner.objects.insert(
            slot,
            StoredObject {
                body,
                content_type: options.content_type,
            },
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_object_is_not_found() {
        let storage = MemoryStorage::new();
        let err = storage.download("templates", "nope").await.unwrap_err();
        assert_eq!(err.status(), Some(404));
        assert_eq!(err.to_string(), "Object not found");
    }

    #[tokio::test]
    async fn upload_without_upsert_refuses_overwrite() {
        let storage = MemoryStorage::new();
        let opts = UploadOptions::new("text/plain");
        storage.upload("b", "k", b"one".to_vec(), opts.clone()).await.unwrap();

        let err = storage.upload("b", "k", b"two".to_vec(), opts).await.unwrap_err();
        assert_eq!(err.status(), Some(409));

        storage
            .upload("b", "k", b"three".to_vec(), UploadOptions::new("text/plain").upsert())
            .await
            .unwrap();
        assert_eq!(storage.get("b", "k").unwrap().body, b"three");
        assert_eq!(storage.upload_count(), 3);
    }

    #[tokio::test]
    async fn injected_upload_failure() {
        let storage = MemoryStorage::new();
        storage.fail_uploads("bucket is read-only");
        let err = storage
            .upload("b", "k", vec![], UploadOptions::default())
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "bucket is read-only");
        assert!(storage.get("b", "k").is_none());
    }
}
