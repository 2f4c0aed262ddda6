//! Identity provider interface.
//!
//! The provider authenticates credentials and emits identity changes; it
//! knows nothing about roles. Role resolution happens in
//! [`crate::session`].

pub mod credentials;
pub mod local;

pub use local::LocalIdentityStore;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::models::Identity;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum IdentityError {
    #[error("Please enter a valid email address")]
    InvalidEmail,

    #[error("Password must be at least {min} characters")]
    WeakPassword { min: usize },

    #[error("An account already exists for this email")]
    EmailInUse,

    #[error("Invalid email or password")]
    InvalidCredentials,

    #[error("Identity provider unavailable: {0}")]
    Unavailable(String),
}

impl IdentityError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Unavailable(_))
    }
}

/// Opaque token issued per sign-in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionToken(Uuid);

impl SessionToken {
    pub(crate) fn issue() -> Self {
        Self(Uuid::new_v4())
    }
}

impl std::fmt::Display for SessionToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.simple())
    }
}

/// Assertion from a federated provider (the popup sign-in flow).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderGrant {
    pub provider: String,
    pub subject: String,
    pub email: String,
    pub display_name: Option<String>,
}

/// Ordered stream of identity changes. Dropping it unsubscribes.
pub struct IdentitySubscription {
    receiver: mpsc::UnboundedReceiver<Option<Identity>>,
}

impl IdentitySubscription {
    pub(crate) fn new(receiver: mpsc::UnboundedReceiver<Option<Identity>>) -> Self {
        Self { receiver }
    }

    /// Next change: `Some(None)` is a sign-out, `None` means the provider
    /// went away.
    pub async fn next(&mut self) -> Option<Option<Identity>> {
        self.receiver.recv().await
    }

    /// Explicit disposer; equivalent to dropping the subscription.
    pub fn unsubscribe(self) {}
}

/// Authentication provider consumed by the session resolver.
#[async_trait]
pub trait IdentityStore: Send + Sync {
    /// Subscribe to identity changes. The current identity (or `None`) is
    /// delivered first, then every change in order.
    fn subscribe(&self) -> IdentitySubscription;

    /// Identity currently signed in, if any.
    fn current(&self) -> Option<Identity>;

    async fn sign_in_with_credential(
        &self,
        email: &str,
        password: &str,
    ) -> Result<Identity, IdentityError>;

    async fn sign_in_with_provider(&self, grant: ProviderGrant) -> Result<Identity, IdentityError>;

    async fn sign_out(&self) -> Result<(), IdentityError>;
}
