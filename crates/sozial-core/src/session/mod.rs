//! Session gate over the identity provider.
//!
//! The session is an explicit context value: acquired at sign-in or
//! sign-up, handed to the components that need identity scoping, and
//! released at sign-out. Nothing in this crate looks identity up through
//! ambient global state.

pub mod http;

use std::sync::Mutex;

use async_trait::async_trait;
use thiserror::Error;

pub use http::HttpIdentityProvider;

/// The authenticated user as reported by the identity provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    /// Opaque identity id; also the profile document id.
    pub id: String,
    pub email: Option<String>,
}

/// Context value for a signed-in user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub identity: Identity,
}

impl Session {
    #[must_use]
    pub const fn new(identity: Identity) -> Self {
        Self { identity }
    }

    /// Identity id used for document and object-key scoping.
    #[must_use]
    pub fn identity_id(&self) -> &str {
        &self.identity.id
    }

    /// Account email, when the provider reported one.
    #[must_use]
    pub fn email(&self) -> Option<&str> {
        self.identity.email.as_deref()
    }
}

/// Identity provider failures, surfaced verbatim to the caller.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Invalid auth configuration: {0}")]
    InvalidConfiguration(&'static str),
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Failed to parse JSON payload: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Auth API error: {0}")]
    Api(String),
}

pub type AuthResult<T> = Result<T, AuthError>;

/// Remote identity provider boundary.
///
/// No retry policy: failures are returned once, immediately, with the
/// provider's own message intact for display.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    async fn sign_up(&self, email: &str, password: &str) -> AuthResult<Identity>;
    async fn sign_in(&self, email: &str, password: &str) -> AuthResult<Identity>;
    async fn sign_out(&self) -> AuthResult<()>;
}

/// Holds the current [`Session`] and mediates every auth transition.
#[derive(Debug)]
pub struct SessionGate<P> {
    provider: P,
    current: Mutex<Option<Session>>,
}

impl<P: IdentityProvider> SessionGate<P> {
    pub fn new(provider: P) -> Self {
        Self {
            provider,
            current: Mutex::new(None),
        }
    }

    /// The active session, if any. Synchronous; never blocks on I/O.
    pub fn current(&self) -> Option<Session> {
        self.current.lock().expect("session lock poisoned").clone()
    }

    /// Create an account and acquire a session for it.
    pub async fn sign_up(&self, email: &str, password: &str) -> AuthResult<Session> {
        let identity = self.provider.sign_up(email, password).await?;
        Ok(self.acquire(identity))
    }

    /// Sign in and acquire a session.
    pub async fn sign_in(&self, email: &str, password: &str) -> AuthResult<Session> {
        let identity = self.provider.sign_in(email, password).await?;
        Ok(self.acquire(identity))
    }

    /// Sign out, releasing the current session.
    ///
    /// Fails only on transport failure, in which case the session is kept.
    pub async fn sign_out(&self) -> AuthResult<()> {
        self.provider.sign_out().await?;
        *self.current.lock().expect("session lock poisoned") = None;
        Ok(())
    }

    fn acquire(&self, identity: Identity) -> Session {
        let session = Session::new(identity);
        *self.current.lock().expect("session lock poisoned") = Some(session.clone());
        session
    }
}

pub(crate) fn validate_credentials(email: &str, password: &str) -> AuthResult<()> {
    if email.trim().is_empty() {
        return Err(AuthError::Api("Email is required".to_string()));
    }
    if password.trim().is_empty() {
        return Err(AuthError::Api("Password is required".to_string()));
    }
    Ok(())
}
