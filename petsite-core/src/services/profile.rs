//! Profile service - single-record operations on profile documents

use std::sync::Arc;

use url::Url;

use crate::domain::pet::toggle_featured;
use crate::domain::result::{Error, Result};
use crate::domain::{NewPet, NewProfile, Pet, Profile, ProfileEdit, ProfilePage};
use crate::ports::{Precondition, ProfileChange, ProfileStore};

/// Attempts made by [`ProfileService::set_featured_pet`] before giving up
pub const FEATURED_PET_MAX_ATTEMPTS: usize = 3;

/// Service for profile documents
///
/// Failures are reported as `Read`/`Write` errors carrying the store's
/// message and are not retried, except the compare-and-swap loop of
/// [`ProfileService::set_featured_pet`].
pub struct ProfileService {
    store: Arc<dyn ProfileStore>,
}

impl ProfileService {
    pub fn new(store: Arc<dyn ProfileStore>) -> Self {
        Self { store }
    }

    /// Write the initial document for a freshly registered identity
    pub async fn create_profile(&self, id: &str, new_profile: NewProfile) -> Result<Profile> {
        let mut profile = Profile::new(id, new_profile);
        profile.version = self
            .store
            .set(id, &profile)
            .await
            .map_err(|e| Error::write(format!("Failed to create profile: {}", store_message(&e))))?;
        tracing::info!(profile_id = %id, "profile created");
        Ok(profile)
    }

    pub async fn read_profile(&self, id: &str) -> Result<Profile> {
        match self.store.get(id).await {
            Ok(Some(profile)) => Ok(profile),
            Ok(None) => Err(Error::not_found(format!("No profile for user {}", id))),
            Err(e) => Err(Error::read(store_message(&e))),
        }
    }

    /// Add a pet with default stats (array-union append)
    pub async fn append_pet(&self, id: &str, new_pet: NewPet) -> Result<Pet> {
        let pet_name = new_pet.pet_name.trim();
        if pet_name.is_empty() {
            return Err(Error::validation("Pet name cannot be empty."));
        }

        let pet = Pet::new(pet_name, new_pet.gender);
        self.store
            .update(id, &[ProfileChange::AppendPet(pet.clone())], Precondition::None)
            .await
            .map_err(|e| Error::write(format!("Failed to add pet: {}", store_message(&e))))?;

        tracing::info!(profile_id = %id, pet_id = pet.id, "pet added");
        Ok(pet)
    }

    /// Toggle the featured flag on the named pet, clearing it on all others
    ///
    /// The pet list is written back only if the document is still at the
    /// version that was read; a lost race re-reads and recomputes.
    pub async fn set_featured_pet(&self, id: &str, pet_name: &str) -> Result<Vec<Pet>> {
        for attempt in 1..=FEATURED_PET_MAX_ATTEMPTS {
            let profile = self.read_profile(id).await?;

            let mut pets = profile.pets;
            if !toggle_featured(&mut pets, pet_name) {
                return Err(Error::not_found(format!("No pet named {}", pet_name)));
            }

            let result = self
                .store
                .update(
                    id,
                    &[ProfileChange::ReplacePets(pets.clone())],
                    Precondition::Version(profile.version),
                )
                .await;

            match result {
                Ok(_) => return Ok(pets),
                Err(Error::Conflict(reason)) => {
                    tracing::debug!(profile_id = %id, attempt, %reason, "featured pet write lost a race");
                }
                Err(e) => return Err(Error::write(store_message(&e))),
            }
        }

        Err(Error::Conflict(format!(
            "Profile {} kept changing; featured pet not updated after {} attempts",
            id, FEATURED_PET_MAX_ATTEMPTS
        )))
    }

    /// Apply owner edits to username and profile image
    pub async fn edit_profile(&self, id: &str, edit: ProfileEdit) -> Result<Profile> {
        if edit.is_empty() {
            return self.read_profile(id).await;
        }

        let mut changes = Vec::new();
        if let Some(username) = edit.username {
            let username = username.trim();
            if username.is_empty() {
                return Err(Error::validation("Username cannot be empty."));
            }
            changes.push(ProfileChange::SetUsername(username.to_string()));
        }
        if let Some(image) = edit.profile_image_url {
            changes.push(ProfileChange::SetProfileImage(validate_image_url(image)?));
        }

        self.store
            .update(id, &changes, Precondition::None)
            .await
            .map_err(|e| match e {
                Error::NotFound(_) => e,
                other => Error::write(format!("Failed to update profile: {}", store_message(&other))),
            })?;
        self.read_profile(id).await
    }

    /// Public page model for `user_id` as seen by `viewer_id`
    pub async fn profile_page(&self, user_id: &str, viewer_id: Option<&str>) -> Result<ProfilePage> {
        let profile = self.read_profile(user_id).await?;
        Ok(ProfilePage::new(profile, viewer_id))
    }
}

/// Blank clears the image; anything else must be an absolute http(s) URL
fn validate_image_url(image: Option<String>) -> Result<Option<String>> {
    let Some(raw) = image.map(|s| s.trim().to_string()).filter(|s| !s.is_empty()) else {
        return Ok(None);
    };
    match Url::parse(&raw) {
        Ok(url) if matches!(url.scheme(), "http" | "https") => Ok(Some(url.to_string())),
        _ => Err(Error::validation(format!(
            "Profile image must be an http(s) URL: {}",
            raw
        ))),
    }
}

/// The store's own message, without our `Read error:` style prefixes
fn store_message(err: &Error) -> String {
    match err {
        Error::Read(msg) | Error::Write(msg) | Error::Database(msg) => msg.clone(),
        other => other.to_string(),
    }
}
