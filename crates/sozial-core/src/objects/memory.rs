//! In-memory object store for tests and local development.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;

use super::{ObjectStore, UploadError};

/// A stored object: raw bytes plus the content type supplied at put time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    pub bytes: Vec<u8>,
    pub content_type: Option<String>,
}

#[derive(Debug, Default)]
struct Inner {
    objects: HashMap<String, StoredObject>,
    puts: usize,
    deletes: usize,
    fail_next_put: Option<String>,
}

/// In-process [`ObjectStore`] with put counters and failure injection.
#[derive(Debug)]
pub struct MemoryObjectStore {
    inner: Mutex<Inner>,
    base_url: String,
}

impl Default for MemoryObjectStore {
    fn default() -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            base_url: "https://objects.test".to_string(),
        }
    }
}

impl MemoryObjectStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of successful puts so far.
    pub fn put_count(&self) -> usize {
        self.inner.lock().expect("object lock poisoned").puts
    }

    /// Number of delete calls so far.
    pub fn delete_count(&self) -> usize {
        self.inner.lock().expect("object lock poisoned").deletes
    }

    /// Make the next put fail with the given message.
    pub fn fail_next_put(&self, message: impl Into<String>) {
        self.inner.lock().expect("object lock poisoned").fail_next_put = Some(message.into());
    }

    /// The stored object under `key`, for assertions.
    pub fn object(&self, key: &str) -> Option<StoredObject> {
        self.inner
            .lock()
            .expect("object lock poisoned")
            .objects
            .get(key)
            .cloned()
    }

    /// Keys currently held, sorted for stable assertions.
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self
            .inner
            .lock()
            .expect("object lock poisoned")
            .objects
            .keys()
            .cloned()
            .collect();
        keys.sort();
        keys
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn put(
        &self,
        key: &str,
        bytes: Vec<u8>,
        content_type: Option<&str>,
    ) -> Result<(), UploadError> {
        let mut inner = self.inner.lock().expect("object lock poisoned");
        if let Some(message) = inner.fail_next_put.take() {
            return Err(UploadError::Storage(message));
        }

        inner.puts += 1;
        inner.objects.insert(
            key.to_string(),
            StoredObject {
                bytes,
                content_type: content_type.map(ToOwned::to_owned),
            },
        );
        Ok(())
    }

    async fn url(&self, key: &str) -> Result<String, UploadError> {
        if key.trim().is_empty() {
            return Err(UploadError::InvalidKey(key.to_string()));
        }
        Ok(format!("{}/{key}", self.base_url))
    }

    async fn delete(&self, key: &str) -> Result<(), UploadError> {
        let mut inner = self.inner.lock().expect("object lock poisoned");
        inner.deletes += 1;
        inner.objects.remove(key);
        Ok(())
    }
}
