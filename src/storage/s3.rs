use anyhow::{Context, Result};
use async_trait::async_trait;
use s3::creds::Credentials;
use s3::region::Region;
use s3::Bucket;
use tracing::debug;

use super::{ObjectStore, UploadError};
use crate::config::Config;

/// S3-compatible object store.
///
/// The bucket is chosen per call, so one store serves every invocation.
#[derive(Clone)]
pub struct S3Store {
    region: Region,
    credentials: Credentials,
    path_style: bool,
}

impl S3Store {
    #[must_use]
    pub fn new(region: Region, credentials: Credentials, path_style: bool) -> Self {
        Self {
            region,
            credentials,
            path_style,
        }
    }

    /// Create a store from configuration and the standard AWS credential variables.
    ///
    /// # Errors
    ///
    /// Returns an error if credentials are missing.
    pub fn from_config(config: &Config) -> Result<Self> {
        let access_key = std::env::var("AWS_ACCESS_KEY_ID").context("AWS_ACCESS_KEY_ID not set")?;
        let secret_key =
            std::env::var("AWS_SECRET_ACCESS_KEY").context("AWS_SECRET_ACCESS_KEY not set")?;
        let session_token = std::env::var("AWS_SESSION_TOKEN")
            .ok()
            .filter(|s| !s.is_empty());

        let credentials = Credentials::new(
            Some(&access_key),
            Some(&secret_key),
            None,
            session_token.as_deref(),
            None,
        )
        .context("Failed to create S3 credentials")?;

        let region = if let Some(ref endpoint) = config.s3_endpoint {
            Region::Custom {
                region: config.s3_region.clone(),
                endpoint: endpoint.clone(),
            }
        } else {
            config.s3_region.parse().unwrap_or(Region::UsEast1)
        };

        // Use path-style for custom endpoints (MinIO, R2, etc.)
        Ok(Self::new(region, credentials, config.s3_endpoint.is_some()))
    }

    fn bucket(&self, name: &str) -> Result<Box<Bucket>, UploadError> {
        let bucket = Bucket::new(name, self.region.clone(), self.credentials.clone()).map_err(
            |e| UploadError::Bucket {
                bucket: name.to_string(),
                message: e.to_string(),
            },
        )?;
        Ok(if self.path_style {
            bucket.with_path_style()
        } else {
            bucket
        })
    }
}

#[async_trait]
impl ObjectStore for S3Store {
    async fn put(
        &self,
        bucket: &str,
        key: &str,
        bytes: &[u8],
        content_type: &str,
    ) -> Result<(), UploadError> {
        debug!(bucket = %bucket, key = %key, content_type = %content_type, "Uploading bytes to S3");

        let response = self
            .bucket(bucket)?
            .put_object_with_content_type(key, bytes, content_type)
            .await
            .map_err(|e| UploadError::Request {
                key: key.to_string(),
                message: e.to_string(),
            })?;

        let status = response.status_code();
        if !(200..300).contains(&status) {
            return Err(UploadError::Status {
                key: key.to_string(),
                status,
            });
        }

        Ok(())
    }
}

impl std::fmt::Debug for S3Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("S3Store")
            .field("region", &self.region.to_string())
            .field("path_style", &self.path_style)
            .finish_non_exhaustive()
    }
}
