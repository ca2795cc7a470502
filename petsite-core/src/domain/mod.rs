//! Core domain entities
//!
//! All business entities are defined here. These are pure data structures
//! with validation logic - no I/O or external dependencies.

mod identity;
pub mod pet;
pub mod profile;
pub mod result;
pub mod session;

pub use identity::Identity;
pub use pet::{CollectedItems, Gender, NewPet, Pet};
pub use profile::{NewProfile, Profile, ProfileEdit, ProfilePage};
pub use session::{SessionEvent, SessionMessage, SessionProfile, SessionUser, SessionView};
