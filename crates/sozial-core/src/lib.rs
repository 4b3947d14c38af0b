//! sozial-core - Core data layer for Sozial
//!
//! This crate keeps local screen state consistent with the remote document
//! store and mediates every mutation to it: session management, typed
//! document CRUD with live subscriptions, image upload, and the sync
//! engines the screens observe.

pub mod models;
pub mod objects;
pub mod session;
pub mod store;
pub mod sync;
pub mod util;

pub use models::{Event, EventDraft, ImageRef, LocalImage, Profile, ProfileDraft, ProfileSeed};
pub use session::{Identity, Session, SessionGate};
pub use store::{DocumentId, EVENTS_COLLECTION, USERS_COLLECTION};
pub use sync::{EngineError, EventSyncEngine, LiveState, ProfileSyncEngine};
