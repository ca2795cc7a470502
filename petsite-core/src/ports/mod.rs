//! Port definitions (hexagonal architecture)
//!
//! Ports define the interfaces for external dependencies. The core domain
//! depends only on these traits, not on concrete implementations.

mod identity_provider;
mod mailer;
mod profile_store;

pub use identity_provider::{
    AuthError, AuthResult, IdentityProvider, SessionBroadcaster, SessionSubscription,
};
pub use mailer::{Mailer, OutboundEmail};
pub use profile_store::{Precondition, ProfileChange, ProfileStore};
