//! Sync engines: live local views over the remote store plus the mutation
//! operations the screens invoke.

pub mod events;
pub mod profile;

use thiserror::Error;

use crate::models::ValidationError;
use crate::objects::UploadError;
use crate::store::StoreError;

pub use events::{EventEntry, EventSyncEngine, EventsView};
pub use profile::{ProfileState, ProfileSyncEngine, ProfileView};

/// Lifecycle of a mounted events engine.
///
/// `Error` is recoverable by re-subscribing; `TornDown` is terminal.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LiveState {
    Uninitialized,
    Loading,
    Live,
    Error,
    TornDown,
}

/// Composite failure of an engine operation.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
    #[error("Upload error: {0}")]
    Upload(#[from] UploadError),
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
    #[error("Engine is torn down")]
    TornDown,
}
