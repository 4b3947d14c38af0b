//! In-memory document store.
//!
//! Backs tests and local development with the full store contract,
//! including synchronous-first-snapshot subscriptions. Operation counters
//! and failure injection exist so callers can assert exactly which remote
//! calls an operation performed.

use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;

use async_trait::async_trait;
use tokio::sync::mpsc;
use uuid::Uuid;

use super::{Document, DocumentId, DocumentStore, Fields, StoreError, StoreEvent, Subscription};

/// Per-operation call counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OpCounts {
    pub creates: usize,
    pub reads: usize,
    pub puts: usize,
    pub updates: usize,
    pub deletes: usize,
    pub subscribes: usize,
}

impl OpCounts {
    /// Total mutating calls.
    #[must_use]
    pub const fn writes(&self) -> usize {
        self.creates + self.puts + self.updates + self.deletes
    }
}

#[derive(Debug, Default)]
struct Inner {
    collections: HashMap<String, BTreeMap<DocumentId, Fields>>,
    subscribers: HashMap<String, Vec<mpsc::UnboundedSender<StoreEvent>>>,
    fail_next_write: Option<String>,
    counts: OpCounts,
}

impl Inner {
    fn snapshot(&self, collection: &str) -> Vec<Document> {
        self.collections
            .get(collection)
            .map(|documents| {
                documents
                    .iter()
                    .map(|(id, fields)| Document {
                        id: id.clone(),
                        fields: fields.clone(),
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    fn publish(&mut self, collection: &str) {
        let snapshot = self.snapshot(collection);
        if let Some(senders) = self.subscribers.get_mut(collection) {
            senders.retain(|sender| sender.send(StoreEvent::Snapshot(snapshot.clone())).is_ok());
        }
    }

    fn take_injected_failure(&mut self) -> Option<StoreError> {
        self.fail_next_write.take().map(StoreError::Backend)
    }
}

/// In-process [`DocumentStore`] with live subscriptions.
#[derive(Debug, Default)]
pub struct MemoryDocumentStore {
    inner: Mutex<Inner>,
}

impl MemoryDocumentStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Counters of every store call made so far.
    pub fn counts(&self) -> OpCounts {
        self.inner.lock().expect("store lock poisoned").counts
    }

    /// Make the next mutating call fail with the given message.
    pub fn fail_next_write(&self, message: impl Into<String>) {
        self.inner.lock().expect("store lock poisoned").fail_next_write = Some(message.into());
    }

    /// Terminate every subscription on `collection` with an error.
    pub fn fail_subscriptions(&self, collection: &str, message: &str) {
        let mut inner = self.inner.lock().expect("store lock poisoned");
        if let Some(senders) = inner.subscribers.remove(collection) {
            for sender in senders {
                let _ = sender.send(StoreEvent::Error(StoreError::Backend(message.to_string())));
            }
        }
    }

    /// Raw fields of a stored document, for assertions.
    pub fn document(&self, collection: &str, id: &DocumentId) -> Option<Fields> {
        let inner = self.inner.lock().expect("store lock poisoned");
        inner
            .collections
            .get(collection)
            .and_then(|documents| documents.get(id))
            .cloned()
    }

    /// Number of documents currently in `collection`.
    pub fn collection_len(&self, collection: &str) -> usize {
        let inner = self.inner.lock().expect("store lock poisoned");
        inner
            .collections
            .get(collection)
            .map_or(0, BTreeMap::len)
    }
}

#[async_trait]
impl DocumentStore for MemoryDocumentStore {
    async fn create_document(
        &self,
        collection: &str,
        fields: Fields,
    ) -> Result<DocumentId, StoreError> {
        let mut inner = self.inner.lock().expect("store lock poisoned");
        inner.counts.creates += 1;
        if let Some(error) = inner.take_injected_failure() {
            return Err(error);
        }

        let id = DocumentId::new(Uuid::now_v7().to_string());
        inner
            .collections
            .entry(collection.to_string())
            .or_default()
            .insert(id.clone(), fields);
        inner.publish(collection);
        Ok(id)
    }

    async fn read_document(
        &self,
        collection: &str,
        id: &DocumentId,
    ) -> Result<Option<Fields>, StoreError> {
        let mut inner = self.inner.lock().expect("store lock poisoned");
        inner.counts.reads += 1;
        Ok(inner
            .collections
            .get(collection)
            .and_then(|documents| documents.get(id))
            .cloned())
    }

    async fn put_document(
        &self,
        collection: &str,
        id: &DocumentId,
        fields: Fields,
    ) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().expect("store lock poisoned");
        inner.counts.puts += 1;
        if let Some(error) = inner.take_injected_failure() {
            return Err(error);
        }

        inner
            .collections
            .entry(collection.to_string())
            .or_default()
            .insert(id.clone(), fields);
        inner.publish(collection);
        Ok(())
    }

    async fn update_document(
        &self,
        collection: &str,
        id: &DocumentId,
        fields: Fields,
    ) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().expect("store lock poisoned");
        inner.counts.updates += 1;
        if let Some(error) = inner.take_injected_failure() {
            return Err(error);
        }

        let documents = inner
            .collections
            .entry(collection.to_string())
            .or_default();
        if !documents.contains_key(id) {
            return Err(StoreError::MissingDocument {
                collection: collection.to_string(),
                id: id.clone(),
            });
        }
        documents.insert(id.clone(), fields);
        inner.publish(collection);
        Ok(())
    }

    async fn delete_document(&self, collection: &str, id: &DocumentId) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().expect("store lock poisoned");
        inner.counts.deletes += 1;
        if let Some(error) = inner.take_injected_failure() {
            return Err(error);
        }

        let removed = inner
            .collections
            .get_mut(collection)
            .and_then(|documents| documents.remove(id));
        // Deleting an already-deleted id is a no-op, not an error.
        if removed.is_some() {
            inner.publish(collection);
        }
        Ok(())
    }

    async fn subscribe(&self, collection: &str) -> Result<Subscription, StoreError> {
        let mut inner = self.inner.lock().expect("store lock poisoned");
        inner.counts.subscribes += 1;

        let (sender, receiver) = mpsc::unbounded_channel();
        let snapshot = inner.snapshot(collection);
        sender
            .send(StoreEvent::Snapshot(snapshot))
            .map_err(|_| StoreError::Backend("Subscription channel closed".to_string()))?;
        inner
            .subscribers
            .entry(collection.to_string())
            .or_default()
            .push(sender);
        Ok(Subscription::new(receiver))
    }
}
