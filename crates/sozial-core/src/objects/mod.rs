//! Binary asset upload: object store boundary and the asset pipeline.

pub mod bucket;
pub mod memory;

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::models::LocalImage;

pub use bucket::{BucketConfig, BucketObjectStore};
pub use memory::MemoryObjectStore;

/// Errors from image pick, read, and object-store operations.
#[derive(Debug, Error)]
pub enum UploadError {
    /// Local image bytes could not be read.
    #[error("Failed to read image {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Object key was empty after normalization.
    #[error("Invalid object key: {0}")]
    InvalidKey(String),

    /// Put, delete, or URL resolution failed at the object store.
    #[error("Object storage error: {0}")]
    Storage(String),
}

/// Remote binary object store boundary: put bytes by key, resolve a
/// publicly fetchable URL by key.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn put(
        &self,
        key: &str,
        bytes: Vec<u8>,
        content_type: Option<&str>,
    ) -> Result<(), UploadError>;

    async fn url(&self, key: &str) -> Result<String, UploadError>;

    async fn delete(&self, key: &str) -> Result<(), UploadError>;
}

/// Device image picker boundary.
///
/// `Ok(None)` means the user dismissed the picker; that is not an error.
#[async_trait]
pub trait ImagePicker: Send + Sync {
    async fn pick(&self) -> Result<Option<LocalImage>, UploadError>;
}

/// Uploads locally picked images and resolves their retrieval URLs.
///
/// The pipeline only accepts [`LocalImage`] values; an already-remote URL
/// cannot reach the upload path. Callers supply the key, so collision
/// policy is theirs: event images use a fresh timestamp per upload, profile
/// images reuse one key per identity so storage does not grow unbounded.
#[derive(Debug)]
pub struct AssetPipeline<O> {
    store: Arc<O>,
}

impl<O> Clone for AssetPipeline<O> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
        }
    }
}

impl<O: ObjectStore> AssetPipeline<O> {
    pub fn new(store: Arc<O>) -> Self {
        Self { store }
    }

    /// Key for a new event image, unique per upload.
    #[must_use]
    pub fn event_image_key() -> String {
        format!("event_images/{}", chrono::Utc::now().timestamp_millis())
    }

    /// Fixed key for an identity's profile image; a re-upload overwrites.
    #[must_use]
    pub fn profile_image_key(identity_id: &str) -> String {
        format!("profile_images/{identity_id}")
    }

    /// Read the picked file, put it under `key`, and resolve its URL.
    ///
    /// A failed upload is not resumed; retrying re-uploads from the start.
    pub async fn upload(&self, image: &LocalImage, key: &str) -> Result<String, UploadError> {
        let bytes = tokio::fs::read(image.path())
            .await
            .map_err(|source| UploadError::Read {
                path: image.path().to_path_buf(),
                source,
            })?;
        let content_type = mime_guess::from_path(image.path()).first_raw();

        tracing::debug!(key, size = bytes.len(), "Uploading image");
        self.store.put(key, bytes, content_type).await?;
        self.store.url(key).await
    }

    /// Delete the object under `key`, for compensating cleanup.
    pub async fn remove(&self, key: &str) -> Result<(), UploadError> {
        self.store.delete(key).await
    }
}
