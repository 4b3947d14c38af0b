//! Load, edit, and persist one user's profile document.

use std::sync::Arc;

use tokio::sync::watch;

use crate::models::{ImageRef, Profile, ProfileDraft, ProfileSeed};
use crate::objects::{AssetPipeline, ObjectStore};
use crate::session::Session;
use crate::store::{CollectionRepository, DocumentId, DocumentStore, USERS_COLLECTION};

use super::EngineError;

/// Load state of the profile view.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProfileState {
    NotLoaded,
    Loading,
    Loaded,
}

/// Snapshot the presentation layer observes.
#[derive(Debug, Clone, PartialEq)]
pub struct ProfileView {
    pub state: ProfileState,
    pub profile: Option<Profile>,
    pub last_error: Option<String>,
}

impl ProfileView {
    fn not_loaded() -> Self {
        Self {
            state: ProfileState::NotLoaded,
            profile: None,
            last_error: None,
        }
    }
}

/// Single-document sync engine for the signed-in user's profile.
///
/// The session is captured at construction; the profile document id and
/// the image object key are both derived from its identity. Writes are
/// full-document replaces, so every save re-sends the immutable `email`
/// field along with the edited ones.
pub struct ProfileSyncEngine<S, O> {
    repo: CollectionRepository<S, Profile>,
    assets: AssetPipeline<O>,
    session: Session,
    view: Arc<watch::Sender<ProfileView>>,
}

impl<S, O> ProfileSyncEngine<S, O>
where
    S: DocumentStore + 'static,
    O: ObjectStore + 'static,
{
    pub fn new(store: Arc<S>, assets: AssetPipeline<O>, session: Session) -> Self {
        Self {
            repo: CollectionRepository::new(store, USERS_COLLECTION),
            assets,
            session,
            view: Arc::new(watch::channel(ProfileView::not_loaded()).0),
        }
    }

    /// Observable handle to the current view.
    pub fn view(&self) -> watch::Receiver<ProfileView> {
        self.view.subscribe()
    }

    /// Clone of the current view, for one-shot reads.
    pub fn current_view(&self) -> ProfileView {
        self.view.borrow().clone()
    }

    fn document_id(&self) -> DocumentId {
        DocumentId::from(self.session.identity_id())
    }

    /// Write the initial profile document at account creation.
    ///
    /// Starts with an empty bio and no image; the email comes from the
    /// freshly created identity.
    pub async fn initialize(&self, seed: ProfileSeed) -> Result<(), EngineError> {
        let profile = Profile {
            name: seed.name,
            age: seed.age,
            city: seed.city,
            bio: String::new(),
            profile_image: None,
            email: self.session.email().unwrap_or_default().to_string(),
        };

        self.repo
            .put(&self.document_id(), &profile)
            .await
            .map_err(|error| self.fail(error))?;

        self.view.send_modify(|view| {
            view.state = ProfileState::Loaded;
            view.profile = Some(profile);
            view.last_error = None;
        });
        Ok(())
    }

    /// Load the profile document.
    ///
    /// A missing document is not an error: the view becomes a blank
    /// profile carrying the account email, ready for a first edit.
    pub async fn load(&self) -> Result<(), EngineError> {
        self.view.send_modify(|view| view.state = ProfileState::Loading);

        match self.repo.read(&self.document_id()).await {
            Ok(loaded) => {
                let profile = loaded.unwrap_or_else(|| {
                    Profile::blank(self.session.email().unwrap_or_default())
                });
                self.view.send_modify(|view| {
                    view.state = ProfileState::Loaded;
                    view.profile = Some(profile);
                    view.last_error = None;
                });
                Ok(())
            }
            Err(error) => {
                let error = EngineError::from(error);
                self.view.send_modify(|view| {
                    view.state = ProfileState::NotLoaded;
                    view.last_error = Some(error.to_string());
                });
                Err(error)
            }
        }
    }

    /// Persist an edited profile.
    ///
    /// A freshly picked image is uploaded first, under the identity's
    /// fixed object key, so a later upload overwrites the earlier one and
    /// storage stays bounded per user. The write is a full-document
    /// replace that round-trips every field, including `email`.
    pub async fn save(&self, draft: ProfileDraft) -> Result<(), EngineError> {
        let image_url = match &draft.image {
            None => None,
            Some(ImageRef::Remote(url)) => Some(url.clone()),
            Some(ImageRef::Local(local)) => {
                let key = AssetPipeline::<O>::profile_image_key(self.session.identity_id());
                let url = self
                    .assets
                    .upload(local, &key)
                    .await
                    .map_err(|error| self.fail(error))?;
                Some(url)
            }
        };

        let email = self.stored_email();
        let profile = draft.into_profile(email, image_url);

        self.repo
            .update(&self.document_id(), &profile)
            .await
            .map_err(|error| self.fail(error))?;

        self.view.send_modify(|view| {
            view.state = ProfileState::Loaded;
            view.profile = Some(profile);
            view.last_error = None;
        });
        Ok(())
    }

    /// The immutable account email to round-trip on every save: the loaded
    /// profile's, falling back to the session identity's.
    fn stored_email(&self) -> String {
        self.view
            .borrow()
            .profile
            .as_ref()
            .map(|profile| profile.email.clone())
            .filter(|email| !email.is_empty())
            .unwrap_or_else(|| self.session.email().unwrap_or_default().to_string())
    }

    fn fail(&self, error: impl Into<EngineError>) -> EngineError {
        let error = error.into();
        self.view
            .send_modify(|view| view.last_error = Some(error.to_string()));
        error
    }
}
