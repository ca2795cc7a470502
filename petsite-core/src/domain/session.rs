//! Unified session view and its reducer
//!
//! The session view merges the identity provider's current identity with the
//! profile document stored for it. It is never persisted: every transition is
//! derived by [`reduce`] from the previous view and a [`SessionMessage`].

use serde::Serialize;

use super::identity::Identity;
use super::pet::Pet;
use super::profile::Profile;

/// Username shown when neither a profile nor a display name is available
pub const DEFAULT_FALLBACK_USERNAME: &str = "New User";

/// Raw session transition pushed by the identity provider
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    NoIdentity,
    ActiveIdentity(Identity),
}

impl SessionEvent {
    pub fn identity(&self) -> Option<&Identity> {
        match self {
            SessionEvent::NoIdentity => None,
            SessionEvent::ActiveIdentity(identity) => Some(identity),
        }
    }
}

impl From<Option<Identity>> for SessionEvent {
    fn from(identity: Option<Identity>) -> Self {
        match identity {
            Some(identity) => SessionEvent::ActiveIdentity(identity),
            None => SessionEvent::NoIdentity,
        }
    }
}

/// Profile half of a signed-in session
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "source", rename_all = "lowercase")]
pub enum SessionProfile {
    /// The stored profile document
    Stored(Profile),
    /// Synthesized from provider fields because no document exists (yet)
    Fallback {
        id: String,
        email: String,
        username: String,
    },
}

impl SessionProfile {
    /// Synthesize a profile from identity fields
    pub fn fallback(identity: &Identity, fallback_username: &str) -> Self {
        let username = identity
            .display_name
            .as_deref()
            .filter(|name| !name.trim().is_empty())
            .unwrap_or(fallback_username)
            .to_string();

        SessionProfile::Fallback {
            id: identity.id.clone(),
            email: identity.email.clone(),
            username,
        }
    }

    pub fn username(&self) -> &str {
        match self {
            SessionProfile::Stored(profile) => &profile.username,
            SessionProfile::Fallback { username, .. } => username,
        }
    }

    pub fn email(&self) -> &str {
        match self {
            SessionProfile::Stored(profile) => &profile.email,
            SessionProfile::Fallback { email, .. } => email,
        }
    }

    pub fn currency(&self) -> u64 {
        match self {
            SessionProfile::Stored(profile) => profile.currency,
            SessionProfile::Fallback { .. } => 0,
        }
    }

    pub fn pets(&self) -> &[Pet] {
        match self {
            SessionProfile::Stored(profile) => &profile.pets,
            SessionProfile::Fallback { .. } => &[],
        }
    }

    pub fn is_stored(&self) -> bool {
        matches!(self, SessionProfile::Stored(_))
    }
}

/// A signed-in user: identity plus resolved profile
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionUser {
    pub identity: Identity,
    pub profile: SessionProfile,
}

impl SessionUser {
    pub fn uid(&self) -> &str {
        &self.identity.id
    }

    pub fn username(&self) -> &str {
        self.profile.username()
    }
}

/// What every consumer sees
///
/// While `loading` is true consumers must not render user data: `user` is
/// always `None` during resolution, so an identity is never observable
/// without its profile.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionView {
    pub loading: bool,
    pub user: Option<SessionUser>,
    /// Set when the last profile fetch failed
    pub error: Option<String>,
}

impl SessionView {
    pub fn initial() -> Self {
        Self {
            loading: true,
            user: None,
            error: None,
        }
    }

    pub fn is_signed_in(&self) -> bool {
        self.user.is_some()
    }

    pub fn uid(&self) -> Option<&str> {
        self.user.as_ref().map(|u| u.uid())
    }
}

impl Default for SessionView {
    fn default() -> Self {
        Self::initial()
    }
}

/// The only way a session view changes
#[derive(Debug, Clone, PartialEq)]
pub enum SessionMessage {
    /// Provider reported no identity
    SignedOut,
    /// Provider reported an identity; its profile is being fetched
    Resolving(Identity),
    /// Profile fetch finished; `None` means no document exists
    Resolved {
        identity: Identity,
        profile: Option<Profile>,
        fallback_username: String,
    },
    /// Profile fetch failed (not retried)
    ResolveFailed {
        identity: Identity,
        error: String,
        fallback_username: String,
    },
}

/// Apply one message to a view
pub fn reduce(_view: &SessionView, message: SessionMessage) -> SessionView {
    match message {
        SessionMessage::SignedOut => SessionView {
            loading: false,
            user: None,
            error: None,
        },
        SessionMessage::Resolving(_) => SessionView {
            loading: true,
            user: None,
            error: None,
        },
        SessionMessage::Resolved {
            identity,
            profile,
            fallback_username,
        } => {
            let profile = match profile {
                Some(profile) => SessionProfile::Stored(profile),
                None => SessionProfile::fallback(&identity, &fallback_username),
            };
            SessionView {
                loading: false,
                user: Some(SessionUser { identity, profile }),
                error: None,
            }
        }
        SessionMessage::ResolveFailed {
            identity,
            error,
            fallback_username,
        } => {
            let profile = SessionProfile::fallback(&identity, &fallback_username);
            SessionView {
                loading: false,
                user: Some(SessionUser { identity, profile }),
                error: Some(error),
            }
        }
    }
}
