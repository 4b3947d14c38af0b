//! Image references as a tagged union.
//!
//! A draft either carries a file the user just picked (not yet uploaded) or
//! the URL of an image that already lives in object storage. Keeping the two
//! as distinct variants means an already-remote image can never be fed back
//! into the upload path.

use std::path::{Path, PathBuf};

/// An image file on the local device, produced by the picker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalImage {
    path: PathBuf,
}

impl LocalImage {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Path to the underlying file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Either a not-yet-uploaded local file or an already-uploaded remote URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageRef {
    /// Picked on this device; must be uploaded before a document references it.
    Local(LocalImage),
    /// Resolved object-storage URL; passed through unchanged on writes.
    Remote(String),
}

impl ImageRef {
    /// Wrap a local file path.
    pub fn local(path: impl Into<PathBuf>) -> Self {
        Self::Local(LocalImage::new(path))
    }

    /// Wrap an already-resolved URL.
    pub fn remote(url: impl Into<String>) -> Self {
        Self::Remote(url.into())
    }

    /// The remote URL, when this reference is already uploaded.
    #[must_use]
    pub fn remote_url(&self) -> Option<&str> {
        match self {
            Self::Remote(url) => Some(url),
            Self::Local(_) => None,
        }
    }

    #[must_use]
    pub const fn is_local(&self) -> bool {
        matches!(self, Self::Local(_))
    }
}
