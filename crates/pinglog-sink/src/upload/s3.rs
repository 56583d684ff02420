//! S3 (and S3-compatible) uploader built on `object_store`.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Local};
use object_store::ObjectStore;
use object_store::aws::AmazonS3Builder;
use object_store::buffered::BufWriter;
use object_store::path::Path as ObjectPath;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

use super::{Uploader, object_key};
use crate::config::S3Config;
use crate::error::{ScheduleError, UploadError};
use crate::schedule;

/// Streams local files into a bucket under time-stamped keys.
#[derive(Debug, Clone)]
pub struct S3Uploader {
    store: Arc<dyn ObjectStore>,
    key_prefix: String,
    delete_after: bool,
    upload_time: String,
}

impl S3Uploader {
    /// Build a client with static credentials from the `[s3]` settings.
    ///
    /// A custom endpoint is addressed path-style, as is any bucket when
    /// `force_path_style` is set.
    pub fn from_config(config: &S3Config) -> Result<Self, UploadError> {
        let mut builder = AmazonS3Builder::new()
            .with_region(&config.region)
            .with_bucket_name(&config.bucket)
            .with_access_key_id(&config.access_key)
            .with_secret_access_key(&config.secret_key);

        let endpoint = config.endpoint_url();
        if let Some(endpoint) = &endpoint {
            builder = builder
                .with_endpoint(endpoint)
                .with_allow_http(endpoint.starts_with("http://"));
        }
        let virtual_hosted = endpoint.is_none() && !config.force_path_style;
        let store = builder
            .with_virtual_hosted_style_request(virtual_hosted)
            .build()?;

        info!(
            bucket = %config.bucket,
            region = %config.region,
            endpoint = endpoint.as_deref().unwrap_or("default"),
            "S3 uploader ready"
        );
        Ok(Self::with_store(Arc::new(store), config))
    }

    /// Use an already constructed store with the given settings.
    pub fn with_store(store: Arc<dyn ObjectStore>, config: &S3Config) -> Self {
        Self {
            store,
            key_prefix: config.key_prefix.clone(),
            delete_after: config.delete_after,
            upload_time: config.upload_time.clone(),
        }
    }

    pub fn store(&self) -> &Arc<dyn ObjectStore> {
        &self.store
    }

    /// The next instant implied by the legacy daily `upload_time`.
    pub fn next_upload_instant(&self) -> Result<DateTime<Local>, ScheduleError> {
        schedule::next_daily_instant(&self.upload_time, &Local::now())
    }

    async fn stream_file(
        &self,
        file: &mut tokio::fs::File,
        location: ObjectPath,
    ) -> std::io::Result<()> {
        let mut writer = BufWriter::new(Arc::clone(&self.store), location);
        let result = async {
            tokio::io::copy(&mut *file, &mut writer).await?;
            writer.shutdown().await
        }
        .await;

        if result.is_err() {
            if let Err(e) = writer.abort().await {
                debug!(error = %e, "Failed to abort partial upload");
            }
        }
        result
    }
}

#[async_trait]
impl Uploader for S3Uploader {
    async fn upload_file(&self, path: &Path) -> Result<String, UploadError> {
        let mut file = tokio::fs::File::open(path)
            .await
            .map_err(|source| UploadError::FileOpen {
                path: path.to_path_buf(),
                source,
            })?;

        let key = object_key(&self.key_prefix, path, &Local::now());
        self.stream_file(&mut file, ObjectPath::from(key.as_str()))
            .await
            .map_err(|source| UploadError::Upload {
                key: key.clone(),
                source,
            })?;
        drop(file);
        debug!(path = %path.display(), key = %key, "Uploaded file");

        if self.delete_after {
            tokio::fs::remove_file(path).await.map_err(|source| {
                warn!(path = %path.display(), key = %key, "Uploaded but failed to delete local file");
                UploadError::Delete {
                    path: path.to_path_buf(),
                    key: key.clone(),
                    source,
                }
            })?;
        }
        Ok(key)
    }
}
