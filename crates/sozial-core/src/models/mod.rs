//! Domain models shared by the sync engines and the presentation layer.

mod event;
mod image;
mod profile;

pub use event::{Event, EventDraft, ValidationError};
pub use image::{ImageRef, LocalImage};
pub use profile::{Profile, ProfileDraft, ProfileSeed};
