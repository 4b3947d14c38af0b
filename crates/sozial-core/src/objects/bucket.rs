//! S3-compatible bucket binding for image storage.
//!
//! Sozial stores event and profile images in one bucket behind a public
//! CDN base URL. Credentials and endpoints come from the environment; a
//! fully absent configuration means the binding is simply not available.

use std::env;

use async_trait::async_trait;
use aws_credential_types::Credentials;
use aws_sdk_s3::{primitives::ByteStream, Client};
use aws_types::region::Region;

use crate::util::normalize_text_option;

use super::{ObjectStore, UploadError};

const ENV_ENDPOINT: &str = "MEDIA_ENDPOINT";
const ENV_BUCKET: &str = "MEDIA_BUCKET";
const ENV_ACCESS_KEY_ID: &str = "MEDIA_ACCESS_KEY_ID";
const ENV_SECRET_ACCESS_KEY: &str = "MEDIA_SECRET_ACCESS_KEY";
const ENV_PUBLIC_BASE_URL: &str = "MEDIA_PUBLIC_BASE_URL";

/// Bucket configuration.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BucketConfig {
    /// S3-compatible endpoint URL.
    pub endpoint: String,
    /// Bucket name.
    pub bucket: String,
    /// Access key id for S3-compatible auth.
    pub access_key_id: String,
    /// Secret access key for S3-compatible auth.
    pub secret_access_key: String,
    /// Public URL base the uploaded images are served from.
    pub public_base_url: String,
}

impl BucketConfig {
    /// Load bucket configuration from environment variables.
    ///
    /// Returns `Ok(None)` when no media variables are set.
    /// Returns an error when only a partial configuration is provided.
    pub fn from_env() -> Result<Option<Self>, UploadError> {
        parse_config(|key| env::var(key).ok())
    }
}

/// Bucket-backed [`ObjectStore`].
#[derive(Clone, Debug)]
pub struct BucketObjectStore {
    config: BucketConfig,
    client: Client,
}

impl BucketObjectStore {
    #[must_use]
    pub fn new(config: BucketConfig) -> Self {
        let client = build_s3_client(&config);
        Self { config, client }
    }

    #[must_use]
    pub const fn config(&self) -> &BucketConfig {
        &self.config
    }

    /// Check that the configured bucket is reachable with current credentials.
    pub async fn bucket_is_reachable(&self) -> Result<(), UploadError> {
        self.client
            .head_bucket()
            .bucket(&self.config.bucket)
            .send()
            .await
            .map_err(|error| storage_error("head_bucket", &self.config.bucket, None, error))?;
        Ok(())
    }
}

#[async_trait]
impl ObjectStore for BucketObjectStore {
    async fn put(
        &self,
        key: &str,
        bytes: Vec<u8>,
        content_type: Option<&str>,
    ) -> Result<(), UploadError> {
        let key = normalize_object_key(key)?;

        let mut request = self
            .client
            .put_object()
            .bucket(&self.config.bucket)
            .key(&key)
            .body(ByteStream::from(bytes));

        if let Some(content_type) = normalize_text_option(content_type.map(ToOwned::to_owned)) {
            request = request.content_type(content_type);
        }

        request
            .send()
            .await
            .map_err(|error| storage_error("put_object", &self.config.bucket, Some(&key), error))?;
        Ok(())
    }

    async fn url(&self, key: &str) -> Result<String, UploadError> {
        let key = normalize_object_key(key)?;
        Ok(format!("{}/{key}", self.config.public_base_url))
    }

    async fn delete(&self, key: &str) -> Result<(), UploadError> {
        let key = normalize_object_key(key)?;

        self.client
            .delete_object()
            .bucket(&self.config.bucket)
            .key(&key)
            .send()
            .await
            .map_err(|error| {
                storage_error("delete_object", &self.config.bucket, Some(&key), error)
            })?;
        Ok(())
    }
}

fn parse_config(lookup: impl Fn(&str) -> Option<String>) -> Result<Option<BucketConfig>, UploadError> {
    let endpoint = normalize_text_option(lookup(ENV_ENDPOINT));
    let bucket = normalize_text_option(lookup(ENV_BUCKET));
    let access_key_id = normalize_text_option(lookup(ENV_ACCESS_KEY_ID));
    let secret_access_key = normalize_text_option(lookup(ENV_SECRET_ACCESS_KEY));
    let public_base_url = normalize_text_option(lookup(ENV_PUBLIC_BASE_URL));

    let any_present = endpoint.is_some()
        || bucket.is_some()
        || access_key_id.is_some()
        || secret_access_key.is_some()
        || public_base_url.is_some();

    if !any_present {
        return Ok(None);
    }

    let mut missing = Vec::new();
    if endpoint.is_none() {
        missing.push(ENV_ENDPOINT);
    }
    if bucket.is_none() {
        missing.push(ENV_BUCKET);
    }
    if access_key_id.is_none() {
        missing.push(ENV_ACCESS_KEY_ID);
    }
    if secret_access_key.is_none() {
        missing.push(ENV_SECRET_ACCESS_KEY);
    }
    if public_base_url.is_none() {
        missing.push(ENV_PUBLIC_BASE_URL);
    }

    if !missing.is_empty() {
        return Err(UploadError::Storage(format!(
            "Media storage configuration is incomplete. Missing: {}",
            missing.join(", ")
        )));
    }

    let endpoint = normalize_http_url(ENV_ENDPOINT, endpoint)?;
    let public_base_url = normalize_http_url(ENV_PUBLIC_BASE_URL, public_base_url)?;

    Ok(Some(BucketConfig {
        endpoint,
        bucket: bucket.unwrap_or_default(),
        access_key_id: access_key_id.unwrap_or_default(),
        secret_access_key: secret_access_key.unwrap_or_default(),
        public_base_url,
    }))
}

fn build_s3_client(config: &BucketConfig) -> Client {
    let credentials = Credentials::new(
        config.access_key_id.clone(),
        config.secret_access_key.clone(),
        None,
        None,
        "sozial-core-media-storage",
    );

    let sdk_config = aws_sdk_s3::config::Builder::new()
        .region(Region::new("auto"))
        .credentials_provider(credentials)
        .endpoint_url(&config.endpoint)
        .force_path_style(true)
        .build();

    Client::from_conf(sdk_config)
}

fn storage_error(
    operation: &str,
    bucket: &str,
    object_key: Option<&str>,
    error: impl std::fmt::Display,
) -> UploadError {
    let target = object_key.map_or_else(|| bucket.to_string(), |key| format!("{bucket}/{key}"));
    UploadError::Storage(format!("{operation} failed for {target}: {error}"))
}

fn normalize_object_key(key: &str) -> Result<String, UploadError> {
    let key = key.trim().trim_matches('/').to_string();
    if key.is_empty() {
        return Err(UploadError::InvalidKey(key));
    }
    Ok(key)
}

fn normalize_http_url(name: &str, value: Option<String>) -> Result<String, UploadError> {
    let value = value.unwrap_or_default();
    if !value.starts_with("https://") && !value.starts_with("http://") {
        return Err(UploadError::Storage(format!(
            "{name} must start with http:// or https://"
        )));
    }
    Ok(value.trim_end_matches('/').to_string())
}
