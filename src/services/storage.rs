//! Object storage for uploaded spreadsheets.
//!
//! [`ObjectStore`] is the blob seam used by the stage workflow and the
//! upload history. [`Storage`] implements it on S3 (AWS or MinIO).

use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_s3::Client;
use aws_sdk_s3::config::{Credentials, Region};
use chrono::{DateTime, Utc};
use tracing::{debug, info};

use crate::config::StorageSettings;
use crate::error::{AppError, AppResult};
use crate::models::BlobEntry;

/// Blob store operations needed by the import pipeline.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn ping(&self) -> AppResult<()>;

    /// Create an object. Existing objects are never overwritten: a taken
    /// key fails with [`AppError::ObjectExists`].
    async fn put(&self, path: &str, data: Vec<u8>, content_type: Option<&str>) -> AppResult<()>;

    /// List every object under `prefix`. `name` is relative to the prefix.
    async fn list(&self, prefix: &str) -> AppResult<Vec<BlobEntry>>;

    /// Remove an object. Removing a missing object succeeds.
    async fn delete(&self, path: &str) -> AppResult<()>;

    async fn exists(&self, path: &str) -> AppResult<bool>;
}

/// S3 storage client wrapper.
#[derive(Clone)]
pub struct Storage {
    client: Client,
    bucket: String,
}

impl Storage {
    /// Create a new S3 storage client from configuration.
    pub async fn new(config: &StorageSettings) -> AppResult<Self> {
        let credentials =
            Credentials::new(&config.access_key, &config.secret_key, None, None, "crm-import");

        let region = Region::new(config.region.clone());

        let mut s3_config_builder = aws_sdk_s3::Config::builder()
            .behavior_version(BehaviorVersion::latest())
            .region(region)
            .credentials_provider(credentials)
            .force_path_style(true); // Required for MinIO

        if let Some(ref endpoint) = config.endpoint {
            s3_config_builder = s3_config_builder.endpoint_url(endpoint);
        }

        let client = Client::from_conf(s3_config_builder.build());

        let storage = Self {
            client,
            bucket: config.bucket.clone(),
        };

        storage.ensure_bucket_exists().await?;

        info!("S3 storage initialized: bucket={}", config.bucket);

        Ok(storage)
    }

    /// Ensure the bucket exists, creating it if necessary.
    async fn ensure_bucket_exists(&self) -> AppResult<()> {
        match self.client.head_bucket().bucket(&self.bucket).send().await {
            Ok(_) => {
                info!("S3 bucket '{}' exists", self.bucket);
                Ok(())
            }
            Err(e) => {
                let service_error = e.into_service_error();
                if service_error.is_not_found() {
                    info!("Creating S3 bucket '{}'", self.bucket);
                    self.client
                        .create_bucket()
                        .bucket(&self.bucket)
                        .send()
                        .await
                        .map_err(|e| {
                            AppError::Storage(format!("Failed to create bucket: {}", e))
                        })?;
                    info!("S3 bucket '{}' created", self.bucket);
                    Ok(())
                } else {
                    Err(AppError::Storage(format!(
                        "Failed to access bucket '{}': {}",
                        self.bucket, service_error
                    )))
                }
            }
        }
    }
}

#[async_trait]
impl ObjectStore for Storage {
    async fn ping(&self) -> AppResult<()> {
        self.client
            .head_bucket()
            .bucket(&self.bucket)
            .send()
            .await
            .map_err(|e| AppError::Storage(format!("Bucket unreachable: {}", e)))?;
        Ok(())
    }

    async fn put(&self, key: &str, data: Vec<u8>, content_type: Option<&str>) -> AppResult<()> {
        let body = aws_sdk_s3::primitives::ByteStream::from(data);
        let mut request = self
            .client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .if_none_match("*")
            .body(body);

        if let Some(ct) = content_type {
            request = request.content_type(ct);
        }

        request.send().await.map_err(|e| {
            // 412 when the key exists, 409 when a concurrent conditional write won.
            match e.raw_response().map(|r| r.status().as_u16()) {
                Some(409 | 412) => AppError::ObjectExists(key.to_string()),
                _ => AppError::Storage(format!("Failed to upload file to S3: {}", e)),
            }
        })?;

        debug!(key, "Object stored");
        Ok(())
    }

    async fn list(&self, prefix: &str) -> AppResult<Vec<BlobEntry>> {
        let mut entries = Vec::new();
        let mut continuation: Option<String> = None;

        loop {
            let response = self
                .client
                .list_objects_v2()
                .bucket(&self.bucket)
                .prefix(prefix)
                .set_continuation_token(continuation.take())
                .send()
                .await
                .map_err(|e| AppError::Storage(format!("Failed to list objects: {}", e)))?;

            for object in response.contents() {
                let Some(key) = object.key() else {
                    continue;
                };
                let name = key.strip_prefix(prefix).unwrap_or(key);
                if name.is_empty() {
                    continue;
                }

                entries.push(BlobEntry {
                    name: name.to_string(),
                    path: key.to_string(),
                    size: object.size().unwrap_or(0),
                    created_at: object
                        .last_modified()
                        .and_then(|t| DateTime::<Utc>::from_timestamp(t.secs(), t.subsec_nanos())),
                });
            }

            match response.next_continuation_token() {
                Some(token) if response.is_truncated().unwrap_or(false) => {
                    continuation = Some(token.to_string());
                }
                _ => break,
            }
        }

        Ok(entries)
    }

    async fn delete(&self, key: &str) -> AppResult<()> {
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| AppError::Storage(format!("Failed to delete object: {}", e)))?;

        debug!(key, "Object deleted");
        Ok(())
    }

    async fn exists(&self, key: &str) -> AppResult<bool> {
        match self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
        {
            Ok(_) => Ok(true),
            Err(e) => {
                let service_error = e.into_service_error();
                if service_error.is_not_found() {
                    Ok(false)
                } else {
                    Err(AppError::Storage(format!(
                        "Failed to inspect object '{}': {}",
                        key, service_error
                    )))
                }
            }
        }
    }
}
