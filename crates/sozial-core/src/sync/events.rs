//! Live view and mutations for the `events` collection.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::models::{Event, EventDraft, ImageRef};
use crate::objects::{AssetPipeline, ObjectStore};
use crate::store::{
    CollectionRepository, DocumentId, DocumentStore, TypedEvent, TypedSubscription,
    EVENTS_COLLECTION,
};

use super::{EngineError, LiveState};

/// One event in the local view, keyed by its store id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventEntry {
    pub id: DocumentId,
    pub event: Event,
}

/// Snapshot the presentation layer observes.
///
/// Derived state: the remote store is the sole source of truth, and the
/// entries are whatever the latest subscription snapshot delivered, in the
/// store's order.
#[derive(Debug, Clone, PartialEq)]
pub struct EventsView {
    pub state: LiveState,
    pub entries: Vec<EventEntry>,
    pub last_error: Option<String>,
}

impl EventsView {
    fn uninitialized() -> Self {
        Self {
            state: LiveState::Uninitialized,
            entries: Vec::new(),
            last_error: None,
        }
    }

    /// Look up an event by id.
    #[must_use]
    pub fn get(&self, id: &DocumentId) -> Option<&Event> {
        self.entries
            .iter()
            .find(|entry| &entry.id == id)
            .map(|entry| &entry.event)
    }
}

/// Maintains a live, ordered view of the events collection and applies
/// user mutations against it.
///
/// Mutations issued before an earlier one settles run concurrently; the
/// engine does not serialize writes per instance, so the store's last
/// write wins. Snapshots are applied strictly in delivery order by a
/// single pump task.
pub struct EventSyncEngine<S, O> {
    repo: CollectionRepository<S, Event>,
    assets: AssetPipeline<O>,
    view: Arc<watch::Sender<EventsView>>,
    mounted: Arc<AtomicBool>,
    pump: Mutex<Option<JoinHandle<()>>>,
}

impl<S, O> EventSyncEngine<S, O>
where
    S: DocumentStore + 'static,
    O: ObjectStore + 'static,
{
    /// Build an engine over the store and pipeline; call [`Self::start`]
    /// to subscribe.
    pub fn new(store: Arc<S>, assets: AssetPipeline<O>) -> Self {
        Self {
            repo: CollectionRepository::new(store, EVENTS_COLLECTION),
            assets,
            view: Arc::new(watch::channel(EventsView::uninitialized()).0),
            mounted: Arc::new(AtomicBool::new(true)),
            pump: Mutex::new(None),
        }
    }

    /// Observable handle to the current view.
    pub fn view(&self) -> watch::Receiver<EventsView> {
        self.view.subscribe()
    }

    /// Clone of the current view, for one-shot reads.
    pub fn current_view(&self) -> EventsView {
        self.view.borrow().clone()
    }

    /// Subscribe to the collection and start applying snapshots.
    ///
    /// Also the recovery path from the `Error` state. Any prior
    /// subscription is released first, so exactly one is ever active.
    pub async fn start(&self) -> Result<(), EngineError> {
        if !self.mounted.load(Ordering::SeqCst) {
            return Err(EngineError::TornDown);
        }

        if let Some(handle) = self.pump.lock().expect("pump lock poisoned").take() {
            handle.abort();
        }

        self.view.send_modify(|view| view.state = LiveState::Loading);
        let subscription = match self.repo.subscribe().await {
            Ok(subscription) => subscription,
            Err(error) => {
                let error = EngineError::from(error);
                self.view.send_modify(|view| {
                    view.state = LiveState::Error;
                    view.last_error = Some(error.to_string());
                });
                return Err(error);
            }
        };

        let view = Arc::clone(&self.view);
        let mounted = Arc::clone(&self.mounted);
        let handle = tokio::spawn(pump(subscription, view, mounted));
        *self.pump.lock().expect("pump lock poisoned") = Some(handle);
        Ok(())
    }

    /// Validate, upload a staged local image, and create the document.
    ///
    /// The new event reaches the view through the subscription, not through
    /// an optimistic insert; the returned id is the store's acknowledgment.
    pub async fn create(&self, draft: EventDraft) -> Result<DocumentId, EngineError> {
        self.ensure_mounted()?;
        draft.validate().map_err(|error| self.fail(error))?;

        let (image_url, uploaded_key) = self.resolve_image(&draft.image).await?;
        let record = draft.into_event(image_url);

        match self.repo.create(&record).await {
            Ok(id) => {
                self.clear_error();
                Ok(id)
            }
            Err(error) => {
                self.discard_orphan(uploaded_key).await;
                Err(self.fail(error))
            }
        }
    }

    /// Validate, upload a staged local image, and replace the document.
    ///
    /// An already-remote image reference passes through unchanged; only a
    /// freshly picked local file is uploaded.
    pub async fn update(&self, id: &DocumentId, draft: EventDraft) -> Result<(), EngineError> {
        self.ensure_mounted()?;
        draft.validate().map_err(|error| self.fail(error))?;

        let (image_url, uploaded_key) = self.resolve_image(&draft.image).await?;
        let record = draft.into_event(image_url);

        match self.repo.update(id, &record).await {
            Ok(()) => {
                self.clear_error();
                Ok(())
            }
            Err(error) => {
                self.discard_orphan(uploaded_key).await;
                Err(self.fail(error))
            }
        }
    }

    /// Delete the document. Deleting an already-deleted event succeeds.
    pub async fn delete(&self, id: &DocumentId) -> Result<(), EngineError> {
        self.ensure_mounted()?;
        match self.repo.delete(id).await {
            Ok(()) => {
                self.clear_error();
                Ok(())
            }
            Err(error) => Err(self.fail(error)),
        }
    }

    /// Tear the engine down: release the subscription and stop acting on
    /// anything that arrives afterwards. Terminal.
    pub fn shutdown(&self) {
        self.mounted.store(false, Ordering::SeqCst);
        if let Some(handle) = self.pump.lock().expect("pump lock poisoned").take() {
            handle.abort();
        }
        self.view.send_modify(|view| view.state = LiveState::TornDown);
    }

    async fn resolve_image(
        &self,
        image: &Option<ImageRef>,
    ) -> Result<(Option<String>, Option<String>), EngineError> {
        match image {
            None => Ok((None, None)),
            Some(ImageRef::Remote(url)) => Ok((Some(url.clone()), None)),
            Some(ImageRef::Local(local)) => {
                let key = AssetPipeline::<O>::event_image_key();
                let url = self
                    .assets
                    .upload(local, &key)
                    .await
                    .map_err(|error| self.fail(error))?;
                Ok((Some(url), Some(key)))
            }
        }
    }

    /// Best-effort delete of an upload whose document write failed.
    ///
    /// Event image keys are unique per upload, so the blob is referenced by
    /// nothing once the write is abandoned.
    async fn discard_orphan(&self, uploaded_key: Option<String>) {
        let Some(key) = uploaded_key else { return };
        if let Err(error) = self.assets.remove(&key).await {
            tracing::warn!(key, "Failed to delete orphaned upload: {error}");
        }
    }

    fn ensure_mounted(&self) -> Result<(), EngineError> {
        if self.mounted.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(EngineError::TornDown)
        }
    }

    // Operations that settle after teardown must not touch the view.
    fn fail(&self, error: impl Into<EngineError>) -> EngineError {
        let error = error.into();
        if self.mounted.load(Ordering::SeqCst) {
            self.view
                .send_modify(|view| view.last_error = Some(error.to_string()));
        }
        error
    }

    fn clear_error(&self) {
        if self.mounted.load(Ordering::SeqCst) {
            self.view.send_modify(|view| view.last_error = None);
        }
    }
}

impl<S, O> Drop for EventSyncEngine<S, O> {
    fn drop(&mut self) {
        if let Ok(mut pump) = self.pump.lock() {
            if let Some(handle) = pump.take() {
                handle.abort();
            }
        }
    }
}

async fn pump(
    mut subscription: TypedSubscription<Event>,
    view: Arc<watch::Sender<EventsView>>,
    mounted: Arc<AtomicBool>,
) {
    while let Some(event) = subscription.next_event().await {
        // A torn-down engine stops acting on late deliveries.
        if !mounted.load(Ordering::SeqCst) {
            break;
        }

        match event {
            TypedEvent::Snapshot(entries) => {
                tracing::debug!(count = entries.len(), "Applying events snapshot");
                view.send_modify(|view| {
                    view.state = LiveState::Live;
                    view.entries = entries
                        .into_iter()
                        .map(|(id, event)| EventEntry { id, event })
                        .collect();
                });
            }
            TypedEvent::Error(error) => {
                tracing::warn!("Events subscription terminated: {error}");
                view.send_modify(|view| {
                    view.state = LiveState::Error;
                    view.last_error = Some(error.to_string());
                });
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;
    use std::time::Duration;

    use pretty_assertions::assert_eq;

    use super::*;
    use crate::models::LocalImage;
    use crate::store::{DocumentStore, Fields, MemoryDocumentStore};
    use crate::objects::MemoryObjectStore;

    struct Harness {
        store: Arc<MemoryDocumentStore>,
        objects: Arc<MemoryObjectStore>,
        engine: EventSyncEngine<MemoryDocumentStore, MemoryObjectStore>,
    }

    async fn mounted_engine() -> Harness {
        let store = Arc::new(MemoryDocumentStore::new());
        let objects = Arc::new(MemoryObjectStore::new());
        let engine = EventSyncEngine::new(
            Arc::clone(&store),
            AssetPipeline::new(Arc::clone(&objects)),
        );
        engine.start().await.unwrap();
        Harness {
            store,
            objects,
            engine,
        }
    }

    fn draft(name: &str) -> EventDraft {
        EventDraft {
            name: name.to_string(),
            capacity: "20".to_string(),
            description: "Outdoor".to_string(),
            address: "Park Ave".to_string(),
            category: "Social".to_string(),
            image: None,
        }
    }

    fn picked_image() -> (tempfile::NamedTempFile, LocalImage) {
        let mut file = tempfile::NamedTempFile::with_suffix(".jpg").unwrap();
        file.write_all(b"jpeg-bytes").unwrap();
        let image = LocalImage::new(file.path());
        (file, image)
    }

    async fn wait_for(
        engine: &EventSyncEngine<MemoryDocumentStore, MemoryObjectStore>,
        predicate: impl FnMut(&EventsView) -> bool,
    ) -> EventsView {
        let mut receiver = engine.view();
        let view = tokio::time::timeout(Duration::from_secs(2), receiver.wait_for(predicate))
            .await
            .expect("view did not converge in time")
            .expect("view channel closed");
        view.clone()
    }

    #[tokio::test]
    async fn create_surfaces_event_through_subscription() {
        let harness = mounted_engine().await;

        let id = harness.engine.create(draft("Picnic")).await.unwrap();
        let view = wait_for(&harness.engine, |view| !view.entries.is_empty()).await;

        assert_eq!(view.state, LiveState::Live);
        assert_eq!(view.entries.len(), 1);
        let event = view.get(&id).unwrap();
        assert_eq!(event.name, "Picnic");
        assert_eq!(event.capacity, "20");
        assert_eq!(event.image, None);
    }

    #[tokio::test]
    async fn create_with_image_uploads_then_writes_document() {
        let harness = mounted_engine().await;
        let (_file, image) = picked_image();

        let mut staged = draft("Picnic");
        staged.image = Some(ImageRef::Local(image));

        let id = harness.engine.create(staged).await.unwrap();

        // Exactly one upload, under the event images namespace.
        assert_eq!(harness.objects.put_count(), 1);
        let keys = harness.objects.keys();
        assert_eq!(keys.len(), 1);
        assert!(keys[0].starts_with("event_images/"));

        // Exactly one document, referencing the resolved URL.
        assert_eq!(harness.store.collection_len(EVENTS_COLLECTION), 1);
        let view = wait_for(&harness.engine, |view| !view.entries.is_empty()).await;
        let event = view.get(&id).unwrap();
        assert_eq!(
            event.image.as_deref(),
            Some(format!("https://objects.test/{}", keys[0]).as_str())
        );
    }

    #[tokio::test]
    async fn invalid_draft_makes_no_remote_calls() {
        let harness = mounted_engine().await;
        let (_file, image) = picked_image();

        let mut incomplete = draft("");
        incomplete.category = String::new();
        incomplete.image = Some(ImageRef::Local(image));

        let error = harness.engine.create(incomplete.clone()).await.unwrap_err();
        assert!(matches!(error, EngineError::Validation(_)));
        assert!(error.to_string().contains("name"));
        assert!(error.to_string().contains("category"));

        let error = harness
            .engine
            .update(&DocumentId::from("e1"), incomplete)
            .await
            .unwrap_err();
        assert!(matches!(error, EngineError::Validation(_)));

        assert_eq!(harness.store.counts().writes(), 0);
        assert_eq!(harness.objects.put_count(), 0);
    }

    #[tokio::test]
    async fn second_update_with_remote_image_does_not_reupload() {
        let harness = mounted_engine().await;
        let (_file, image) = picked_image();

        let mut staged = draft("Picnic");
        staged.image = Some(ImageRef::Local(image));
        let id = harness.engine.create(staged).await.unwrap();
        assert_eq!(harness.objects.put_count(), 1);

        let view = wait_for(&harness.engine, |view| !view.entries.is_empty()).await;
        let persisted_url = view.get(&id).unwrap().image.clone().unwrap();

        // Edit again without picking a new image: the form round-trips the
        // remote URL it loaded.
        let mut edited = draft("Picnic (moved)");
        edited.image = Some(ImageRef::Remote(persisted_url.clone()));
        harness.engine.update(&id, edited).await.unwrap();

        assert_eq!(harness.objects.put_count(), 1);
        let view = wait_for(&harness.engine, |view| {
            view.get(&id).is_some_and(|event| event.name == "Picnic (moved)")
        })
        .await;
        assert_eq!(view.get(&id).unwrap().image.as_deref(), Some(persisted_url.as_str()));
    }

    #[tokio::test]
    async fn delete_twice_succeeds_and_view_drops_event() {
        let harness = mounted_engine().await;

        let id = harness.engine.create(draft("Picnic")).await.unwrap();
        wait_for(&harness.engine, |view| !view.entries.is_empty()).await;

        harness.engine.delete(&id).await.unwrap();
        let view = wait_for(&harness.engine, |view| view.entries.is_empty()).await;
        assert!(view.get(&id).is_none());

        harness.engine.delete(&id).await.unwrap();
    }

    #[tokio::test]
    async fn view_converges_to_final_store_state() {
        let harness = mounted_engine().await;

        // Server-side mutations, as another client would produce them.
        let mut fields = Fields::new();
        fields.insert("eventName".to_string(), "A".into());
        for key in ["capacity", "description", "address", "category"] {
            fields.insert(key.to_string(), "x".into());
        }
        fields.insert("image".to_string(), serde_json::Value::Null);

        let a = DocumentId::from("remote-a");
        let b = DocumentId::from("remote-b");
        harness
            .store
            .put_document(EVENTS_COLLECTION, &a, fields.clone())
            .await
            .unwrap();
        harness
            .store
            .put_document(EVENTS_COLLECTION, &b, fields.clone())
            .await
            .unwrap();
        let mut renamed = fields.clone();
        renamed.insert("eventName".to_string(), "B-final".into());
        harness
            .store
            .put_document(EVENTS_COLLECTION, &b, renamed)
            .await
            .unwrap();

        let view = wait_for(&harness.engine, |view| {
            view.get(&b).is_some_and(|event| event.name == "B-final")
        })
        .await;
        assert_eq!(view.entries.len(), 2);
        assert_eq!(view.get(&a).unwrap().name, "A");
    }

    #[tokio::test]
    async fn subscription_failure_degrades_then_recovers() {
        let harness = mounted_engine().await;
        wait_for(&harness.engine, |view| view.state == LiveState::Live).await;

        harness
            .store
            .fail_subscriptions(EVENTS_COLLECTION, "listen channel broke");
        let view = wait_for(&harness.engine, |view| view.state == LiveState::Error).await;
        assert!(view
            .last_error
            .as_deref()
            .unwrap()
            .contains("listen channel broke"));

        // Recovery is an explicit re-subscribe.
        harness.engine.start().await.unwrap();
        wait_for(&harness.engine, |view| view.state == LiveState::Live).await;
    }

    #[tokio::test]
    async fn failed_write_discards_fresh_upload() {
        let harness = mounted_engine().await;
        let (_file, image) = picked_image();

        let mut staged = draft("Picnic");
        staged.image = Some(ImageRef::Local(image));

        harness.store.fail_next_write("permission denied");
        let error = harness.engine.create(staged).await.unwrap_err();
        assert!(matches!(error, EngineError::Store(_)));

        // The upload happened, then the orphan was cleaned up.
        assert_eq!(harness.objects.put_count(), 1);
        assert_eq!(harness.objects.delete_count(), 1);
        assert!(harness.objects.keys().is_empty());
        assert_eq!(harness.store.collection_len(EVENTS_COLLECTION), 0);
    }

    #[tokio::test]
    async fn failed_upload_aborts_before_any_document_write() {
        let harness = mounted_engine().await;
        let (_file, image) = picked_image();

        let mut staged = draft("Picnic");
        staged.image = Some(ImageRef::Local(image));

        harness.objects.fail_next_put("bucket unreachable");
        let error = harness.engine.create(staged).await.unwrap_err();
        assert!(matches!(error, EngineError::Upload(_)));
        assert_eq!(harness.store.counts().writes(), 0);

        let view = harness.engine.current_view();
        assert!(view.last_error.as_deref().unwrap().contains("bucket unreachable"));
    }

    #[tokio::test]
    async fn torn_down_engine_ignores_late_snapshots() {
        let harness = mounted_engine().await;
        wait_for(&harness.engine, |view| view.state == LiveState::Live).await;

        harness.engine.shutdown();
        assert_eq!(harness.engine.current_view().state, LiveState::TornDown);

        // A server-side change arriving after teardown is not applied.
        let mut fields = Fields::new();
        fields.insert("eventName".to_string(), "Late".into());
        harness
            .store
            .put_document(EVENTS_COLLECTION, &DocumentId::from("late"), fields)
            .await
            .unwrap();
        tokio::task::yield_now().await;

        let view = harness.engine.current_view();
        assert_eq!(view.state, LiveState::TornDown);
        assert!(view.entries.is_empty());

        // New intents are rejected rather than silently applied.
        assert!(matches!(
            harness.engine.create(draft("After teardown")).await.unwrap_err(),
            EngineError::TornDown
        ));
        assert!(matches!(
            harness.engine.start().await.unwrap_err(),
            EngineError::TornDown
        ));
    }
}
