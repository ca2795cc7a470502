//! Identity provider port
//!
//! Defines the interface to the authentication backend: account creation,
//! sign-in/out, the push-based session stream and account recovery mails.

use std::sync::Mutex;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc;

use crate::domain::{Identity, SessionEvent};

/// Provider-level authentication failure
///
/// The display strings are the provider's raw messages. User-facing wording
/// is chosen per flow by the auth service from [`AuthError::code`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    #[error("The email address is badly formatted.")]
    InvalidEmail,

    #[error("The email address is already in use by another account.")]
    EmailAlreadyInUse,

    #[error("Password should be at least {min_length} characters.")]
    WeakPassword { min_length: usize },

    #[error("There is no user record corresponding to this identifier.")]
    UserNotFound,

    #[error("The password is invalid.")]
    WrongPassword,

    #[error("The user account has been disabled by an administrator.")]
    UserDisabled,

    #[error("This operation is not allowed.")]
    OperationNotAllowed,

    #[error("The action code is invalid. It may be malformed, expired, or already used.")]
    InvalidActionCode,

    #[error("A network error has occurred: {0}")]
    Network(String),

    /// Anything the provider reports that has no dedicated variant
    #[error("{message}")]
    Provider { code: String, message: String },
}

impl AuthError {
    /// Stable provider error code
    pub fn code(&self) -> &str {
        match self {
            AuthError::InvalidEmail => "auth/invalid-email",
            AuthError::EmailAlreadyInUse => "auth/email-already-in-use",
            AuthError::WeakPassword { .. } => "auth/weak-password",
            AuthError::UserNotFound => "auth/user-not-found",
            AuthError::WrongPassword => "auth/wrong-password",
            AuthError::UserDisabled => "auth/user-disabled",
            AuthError::OperationNotAllowed => "auth/operation-not-allowed",
            AuthError::InvalidActionCode => "auth/invalid-action-code",
            AuthError::Network(_) => "auth/network-request-failed",
            AuthError::Provider { code, .. } => code,
        }
    }

    /// Wrap an unexpected backend failure
    pub fn internal(message: impl Into<String>) -> Self {
        AuthError::Provider {
            code: "auth/internal-error".to_string(),
            message: message.into(),
        }
    }
}

pub type AuthResult<T> = std::result::Result<T, AuthError>;

/// Identity provider trait
///
/// Implementations own identities and the notion of "the current session".
/// Every change of the current session is pushed to subscribers.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Provider name (e.g., "local")
    fn name(&self) -> &str;

    /// Create an identity and make it the current session
    async fn register(&self, email: &str, password: &str) -> AuthResult<Identity>;

    /// Authenticate and make the identity the current session
    async fn sign_in(&self, email: &str, password: &str) -> AuthResult<Identity>;

    /// End the current session (no-op when nobody is signed in)
    async fn sign_out(&self) -> AuthResult<()>;

    /// The identity of the current session, if any
    fn current_identity(&self) -> Option<Identity>;

    /// Subscribe to session transitions
    ///
    /// The current state is delivered first, then every transition in the
    /// order the provider emits them.
    fn subscribe(&self) -> SessionSubscription;

    /// Send a password reset link to `email`
    async fn send_password_reset(&self, email: &str) -> AuthResult<()>;

    /// Set a new password using a reset code
    async fn confirm_password_reset(&self, code: &str, new_password: &str) -> AuthResult<()>;

    /// Send an email verification link to the identity's address
    async fn send_email_verification(&self, identity: &Identity) -> AuthResult<()>;

    /// Mark the email behind a verification code as verified
    async fn verify_email(&self, code: &str) -> AuthResult<Identity>;
}

/// Handle on a provider's session stream
///
/// Dropping the handle (or calling [`SessionSubscription::unsubscribe`])
/// releases it; the provider prunes released handles on its next emit.
#[derive(Debug)]
pub struct SessionSubscription {
    receiver: mpsc::UnboundedReceiver<SessionEvent>,
}

impl SessionSubscription {
    /// Wait for the next transition; `None` once the provider is gone
    pub async fn next(&mut self) -> Option<SessionEvent> {
        self.receiver.recv().await
    }

    /// Take an already delivered transition without waiting
    pub fn try_next(&mut self) -> Option<SessionEvent> {
        self.receiver.try_recv().ok()
    }

    pub fn unsubscribe(mut self) {
        self.receiver.close();
    }
}

/// Fan-out of session events to subscriptions
///
/// Shared building block for provider implementations.
#[derive(Debug, Default)]
pub struct SessionBroadcaster {
    subscribers: Mutex<Vec<mpsc::UnboundedSender<SessionEvent>>>,
}

impl SessionBroadcaster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a subscription, seeding it with the state returned by
    /// `current`. `current` runs under the subscriber lock so no emit can
    /// slip in between reading the state and registering.
    pub fn subscribe(&self, current: impl FnOnce() -> SessionEvent) -> SessionSubscription {
        let (sender, receiver) = mpsc::unbounded_channel();
        let mut subscribers = self.subscribers.lock().unwrap_or_else(|e| e.into_inner());
        // The receiver is still in scope, so this send cannot fail
        let _ = sender.send(current());
        subscribers.push(sender);
        SessionSubscription { receiver }
    }

    /// Deliver an event to every live subscription
    pub fn publish(&self, event: SessionEvent) {
        let mut subscribers = self.subscribers.lock().unwrap_or_else(|e| e.into_inner());
        subscribers.retain(|sender| sender.send(event.clone()).is_ok());
        tracing::debug!(subscribers = subscribers.len(), "session event published");
    }

    /// Number of subscriptions that have not been released
    pub fn subscriber_count(&self) -> usize {
        let mut subscribers = self.subscribers.lock().unwrap_or_else(|e| e.into_inner());
        subscribers.retain(|sender| !sender.is_closed());
        subscribers.len()
    }
}
