//! Remote document store boundary and the typed collection repository.
//!
//! The store holds named collections of schemaless JSON documents and
//! supports CRUD plus live change subscriptions. Every subscription delivers
//! full-collection snapshots; that is fine at Sozial's scale but is a known
//! ceiling, and a store with large collections would need windowed queries.

pub mod memory;

use std::fmt;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;
use tokio::sync::mpsc;

pub use memory::MemoryDocumentStore;

/// Collection holding event documents.
pub const EVENTS_COLLECTION: &str = "events";
/// Collection holding one profile document per identity.
pub const USERS_COLLECTION: &str = "users";

/// Opaque document identifier assigned by the store (or, for profile
/// documents, chosen by the caller as the identity id).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
pub struct DocumentId(String);

impl DocumentId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for DocumentId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

/// Schemaless document payload.
pub type Fields = serde_json::Map<String, serde_json::Value>;

/// A document as delivered by a snapshot.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub id: DocumentId,
    pub fields: Fields,
}

/// Errors from document CRUD and subscriptions.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Update target does not exist.
    #[error("Document not found: {collection}/{id}")]
    MissingDocument { collection: String, id: DocumentId },

    /// Field payload could not be encoded or decoded.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Transport or permission failure reported by the store.
    #[error("Store error: {0}")]
    Backend(String),
}

/// One delivery on a collection subscription.
#[derive(Debug)]
pub enum StoreEvent {
    /// A full, internally consistent snapshot of the collection.
    Snapshot(Vec<Document>),
    /// Terminal failure; no further events will arrive.
    Error(StoreError),
}

/// A live subscription to one collection.
///
/// The channel already holds the initial snapshot when `subscribe` returns,
/// so the first `next_event` resolves without waiting for a server change.
/// Dropping the subscription releases it; the store stops delivering.
#[derive(Debug)]
pub struct Subscription {
    events: mpsc::UnboundedReceiver<StoreEvent>,
}

impl Subscription {
    pub(crate) fn new(events: mpsc::UnboundedReceiver<StoreEvent>) -> Self {
        Self { events }
    }

    /// Next delivery, or `None` once the subscription has terminated.
    pub async fn next_event(&mut self) -> Option<StoreEvent> {
        self.events.recv().await
    }
}

/// Remote document store boundary.
///
/// `read_document` treats absence as a non-error (`Ok(None)`); callers
/// decide whether a missing document is expected. `delete_document` of a
/// missing id is a no-op.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Create a document with a store-generated id.
    async fn create_document(&self, collection: &str, fields: Fields)
        -> Result<DocumentId, StoreError>;

    /// Read a document; `Ok(None)` when it does not exist.
    async fn read_document(
        &self,
        collection: &str,
        id: &DocumentId,
    ) -> Result<Option<Fields>, StoreError>;

    /// Create or fully replace a document at a caller-chosen id.
    async fn put_document(
        &self,
        collection: &str,
        id: &DocumentId,
        fields: Fields,
    ) -> Result<(), StoreError>;

    /// Fully replace an existing document; fails if the id does not exist.
    async fn update_document(
        &self,
        collection: &str,
        id: &DocumentId,
        fields: Fields,
    ) -> Result<(), StoreError>;

    /// Delete a document; deleting a missing id succeeds.
    async fn delete_document(&self, collection: &str, id: &DocumentId) -> Result<(), StoreError>;

    /// Subscribe to full-collection snapshots, the current one first.
    async fn subscribe(&self, collection: &str) -> Result<Subscription, StoreError>;
}

/// One delivery on a typed subscription.
#[derive(Debug)]
pub enum TypedEvent<T> {
    Snapshot(Vec<(DocumentId, T)>),
    Error(StoreError),
}

/// Typed wrapper over a raw [`Subscription`].
///
/// Documents that fail to decode are skipped with a warning; one malformed
/// document must not tear down the whole collection view.
#[derive(Debug)]
pub struct TypedSubscription<T> {
    collection: String,
    inner: Subscription,
    _marker: std::marker::PhantomData<fn() -> T>,
}

impl<T: DeserializeOwned> TypedSubscription<T> {
    /// Next decoded delivery, or `None` once terminated.
    pub async fn next_event(&mut self) -> Option<TypedEvent<T>> {
        match self.inner.next_event().await? {
            StoreEvent::Snapshot(documents) => {
                let mut entries = Vec::with_capacity(documents.len());
                for document in documents {
                    match serde_json::from_value(serde_json::Value::Object(document.fields)) {
                        Ok(record) => entries.push((document.id, record)),
                        Err(error) => {
                            tracing::warn!(
                                collection = %self.collection,
                                id = %document.id,
                                "Skipping undecodable document in snapshot: {error}"
                            );
                        }
                    }
                }
                Some(TypedEvent::Snapshot(entries))
            }
            StoreEvent::Error(error) => Some(TypedEvent::Error(error)),
        }
    }
}

/// Typed CRUD and subscription over one collection of a [`DocumentStore`].
#[derive(Debug)]
pub struct CollectionRepository<S, T> {
    store: std::sync::Arc<S>,
    collection: &'static str,
    _marker: std::marker::PhantomData<fn() -> T>,
}

impl<S, T> Clone for CollectionRepository<S, T> {
    fn clone(&self) -> Self {
        Self {
            store: std::sync::Arc::clone(&self.store),
            collection: self.collection,
            _marker: std::marker::PhantomData,
        }
    }
}

impl<S, T> CollectionRepository<S, T>
where
    S: DocumentStore,
    T: Serialize + DeserializeOwned,
{
    pub fn new(store: std::sync::Arc<S>, collection: &'static str) -> Self {
        Self {
            store,
            collection,
            _marker: std::marker::PhantomData,
        }
    }

    /// Collection this repository is bound to.
    #[must_use]
    pub const fn collection(&self) -> &'static str {
        self.collection
    }

    pub async fn create(&self, record: &T) -> Result<DocumentId, StoreError> {
        let fields = encode(record)?;
        self.store.create_document(self.collection, fields).await
    }

    pub async fn read(&self, id: &DocumentId) -> Result<Option<T>, StoreError> {
        let Some(fields) = self.store.read_document(self.collection, id).await? else {
            return Ok(None);
        };
        let record = serde_json::from_value(serde_json::Value::Object(fields))?;
        Ok(Some(record))
    }

    pub async fn put(&self, id: &DocumentId, record: &T) -> Result<(), StoreError> {
        let fields = encode(record)?;
        self.store.put_document(self.collection, id, fields).await
    }

    pub async fn update(&self, id: &DocumentId, record: &T) -> Result<(), StoreError> {
        let fields = encode(record)?;
        self.store
            .update_document(self.collection, id, fields)
            .await
    }

    pub async fn delete(&self, id: &DocumentId) -> Result<(), StoreError> {
        self.store.delete_document(self.collection, id).await
    }

    pub async fn subscribe(&self) -> Result<TypedSubscription<T>, StoreError> {
        let inner = self.store.subscribe(self.collection).await?;
        Ok(TypedSubscription {
            collection: self.collection.to_string(),
            inner,
            _marker: std::marker::PhantomData,
        })
    }
}

fn encode<T: Serialize>(record: &T) -> Result<Fields, StoreError> {
    match serde_json::to_value(record)? {
        serde_json::Value::Object(fields) => Ok(fields),
        other => Err(StoreError::Backend(format!(
            "Record did not serialize to an object: {other}"
        ))),
    }
}
