use crate::{error::*, models::*, ObjectStorage, StorageConfig};
use async_trait::async_trait;
use reqwest::{header::CONTENT_TYPE, Client, Response};
use url::Url;

/// Supabase Storage REST client
pub struct StorageClient {
    base_url: Url,
    service_key: String,
    http_client: Client,
}

impl StorageClient {
    /// Create a new storage client
    pub fn new(config: StorageConfig) -> Result<Self> {
        Self::with_http_client(config, Client::new())
    }

    /// Create a client that reuses an existing `reqwest` client
    pub fn with_http_client(config: StorageConfig, http_client: Client) -> Result<Self> {
        let base_url = Url::parse(&config.url)?;
        if base_url.cannot_be_a_base() {
            return Err(StorageError::InvalidUrl(
                url::ParseError::RelativeUrlWithCannotBeABaseBase,
            ));
        }

        Ok(Self {
            base_url,
            service_key: config.service_key,
            http_client,
        })
    }

    /// URL of an object: `{base}/storage/v1/object/{bucket}/{key...}`
    pub fn object_url(&self, bucket: &str, key: &str) -> Result<Url> {
        let segments = split_key(key)?;
        if bucket.is_empty() || bucket.contains('/') {
            return Err(StorageError::InvalidKey(bucket.to_string()));
        }

        let mut url = self.base_url.clone();
        {
            let mut path = url.path_segments_mut().map_err(|_| {
                StorageError::InvalidUrl(url::ParseError::RelativeUrlWithCannotBeABaseBase)
            })?;
            path.pop_if_empty()
                .extend(["storage", "v1", "object", bucket])
                .extend(segments);
        }
        Ok(url)
    }

    /// Turn a non-success response into `StorageError::Api`
    async fn check(response: Response) -> Result<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<ApiErrorBody>(&body)
            .ok()
            .and_then(ApiErrorBody::into_message)
            .or_else(|| (!body.trim().is_empty()).then(|| body.trim().to_string()))
            .unwrap_or_else(|| {
                status
                    .canonical_reason()
                    .unwrap_or("Unknown storage error")
                    .to_string()
            });

        Err(StorageError::Api {
            status: status.as_u16(),
            message,
        })
    }
}

#[async_trait]
impl ObjectStorage for StorageClient {
    async fn download(&self, bucket: &str, key: &str) -> Result<Vec<u8>> {
        let url = self.object_url(bucket, key)?;
        tracing::debug!(%bucket, %key, "downloading object");

        let response = self
            .http_client
            .get(url)
            .bearer_auth(&self.service_key)
            .header("apikey", &self.service_key)
            .send()
            .await?;

        let bytes = Self::check(response).await?.bytes().await?;
        Ok(bytes.to_vec())
    }

    async fn upload(
        &self,
        bucket: &str,
        key: &str,
        body: Vec<u8>,
        options: UploadOptions,
    ) -> Result<()> {
        let url = self.object_url(bucket, key)?;
        tracing::debug!(%bucket, %key, size = body.len(), upsert = options.upsert, "uploading object");

        let response = self
            .http_client
            .post(url)
            .bearer_auth(&self.service_key)
            .header("apikey", &self.service_key)
            .header(CONTENT_TYPE, options.content_type)
            .header("x-upsert", options.upsert.to_string())
            .body(body)
            .send()
            .await?;

        Self::check(response).await?;
        Ok(())
    }
}

fn split_key(key: &str) -> Result<Vec<&str>> {
    let segments: Vec<&str> = key.split('/').collect();
    let valid = !key.is_empty()
        && segments
            .iter()
            .all(|s| !s.is_empty() && *s != "." && *s != "..");

    if !valid {
        return Err(StorageError::InvalidKey(key.to_string()));
    }
    Ok(segments)
}
