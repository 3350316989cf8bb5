//! Object storage for rendered documents.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use thiserror::Error;
use tracing::debug;

use crate::constants::HTML_CONTENT_TYPE;
use crate::render::HtmlDocument;

pub mod s3;

pub use self::s3::S3Store;

#[derive(Debug, Error)]
pub enum UploadError {
    #[error("invalid bucket {bucket}: {message}")]
    Bucket { bucket: String, message: String },
    #[error("upload of {key} failed: {message}")]
    Request { key: String, message: String },
    #[error("upload of {key} rejected with HTTP {status}")]
    Status { key: String, status: u16 },
}

/// Write-only object store.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Store `bytes` at `bucket`/`key`, replacing any existing object.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails. Callers do not retry.
    async fn put(
        &self,
        bucket: &str,
        key: &str,
        bytes: &[u8],
        content_type: &str,
    ) -> Result<(), UploadError>;
}

/// Writes rendered documents with a fixed content type.
#[derive(Clone, Copy)]
pub struct Uploader<'a> {
    store: &'a dyn ObjectStore,
}

impl<'a> Uploader<'a> {
    #[must_use]
    pub fn new(store: &'a dyn ObjectStore) -> Self {
        Self { store }
    }

    /// Upload a document verbatim as UTF-8 HTML.
    ///
    /// # Errors
    ///
    /// Returns the store's error unchanged.
    pub async fn upload(
        &self,
        document: &HtmlDocument,
        bucket: &str,
        key: &str,
    ) -> Result<(), UploadError> {
        debug!(bucket = %bucket, key = %key, size = document.len(), "Uploading rendered document");
        self.store
            .put(bucket, key, document.as_bytes(), HTML_CONTENT_TYPE)
            .await
    }
}

/// A stored object as kept by [`MemoryStore`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    pub bytes: Vec<u8>,
    pub content_type: String,
}

/// In-process store, keyed by `(bucket, key)`. Used for dry runs and tests.
#[derive(Debug, Default)]
pub struct MemoryStore {
    objects: Mutex<HashMap<(String, String), StoredObject>>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn get(&self, bucket: &str, key: &str) -> Option<StoredObject> {
        self.objects
            .lock()
            .ok()?
            .get(&(bucket.to_string(), key.to_string()))
            .cloned()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.objects.lock().map_or(0, |objects| objects.len())
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn put(
        &self,
        bucket: &str,
        key: &str,
        bytes: &[u8],
        content_type: &str,
    ) -> Result<(), UploadError> {
        let mut objects = self.objects.lock().map_err(|e| UploadError::Request {
            key: key.to_string(),
            message: e.to_string(),
        })?;
        objects.insert(
            (bucket.to_string(), key.to_string()),
            StoredObject {
                bytes: bytes.to_vec(),
                content_type: content_type.to_string(),
            },
        );
        Ok(())
    }
}
