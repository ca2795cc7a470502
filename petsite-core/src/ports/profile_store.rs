//! Profile store port - document storage abstraction

use async_trait::async_trait;

use crate::domain::result::Result;
use crate::domain::{Pet, Profile};

/// A single field-level change to a profile document
#[derive(Debug, Clone, PartialEq)]
pub enum ProfileChange {
    SetUsername(String),
    SetProfileImage(Option<String>),
    /// Array-union append: a pet equal to one already present is not added
    /// again
    AppendPet(Pet),
    /// Replace the whole pet list
    ReplacePets(Vec<Pet>),
}

impl ProfileChange {
    /// Apply the change to an in-memory document
    pub fn apply(&self, profile: &mut Profile) {
        match self {
            ProfileChange::SetUsername(username) => profile.username = username.clone(),
            ProfileChange::SetProfileImage(url) => profile.profile_image_url = url.clone(),
            ProfileChange::AppendPet(pet) => {
                if !profile.pets.contains(pet) {
                    profile.pets.push(pet.clone());
                }
            }
            ProfileChange::ReplacePets(pets) => profile.pets = pets.clone(),
        }
    }
}

/// Condition an update must satisfy to be applied
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Precondition {
    /// Apply unconditionally
    None,
    /// Apply only if the stored version still equals this value
    Version(u64),
}

/// Profile document store
///
/// One document per identity ID. Every successful write bumps the
/// document's version; the new version is returned.
#[async_trait]
pub trait ProfileStore: Send + Sync {
    /// Fetch a document (`Ok(None)` when absent, `Error::Read` on transport
    /// failure)
    async fn get(&self, id: &str) -> Result<Option<Profile>>;

    /// Create or overwrite a document
    async fn set(&self, id: &str, profile: &Profile) -> Result<u64>;

    /// Apply changes atomically to an existing document
    ///
    /// Fails with `Error::NotFound` if the document does not exist and with
    /// `Error::Conflict` if the precondition does not hold.
    async fn update(
        &self,
        id: &str,
        changes: &[ProfileChange],
        precondition: Precondition,
    ) -> Result<u64>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Gender, NewProfile};

    #[test]
    fn test_append_pet_is_array_union() {
        let mut profile = Profile::new("uid-1", NewProfile::new("rexfan", "a@b.com"));
        let pet = Pet::new("Rex", Gender::Male);

        ProfileChange::AppendPet(pet.clone()).apply(&mut profile);
        ProfileChange::AppendPet(pet).apply(&mut profile);
        assert_eq!(profile.pets.len(), 1);

        ProfileChange::AppendPet(Pet::new("Rex", Gender::Male)).apply(&mut profile);
        assert_eq!(profile.pets.len(), 2);
    }

    #[test]
    fn test_field_changes() {
        let mut profile = Profile::new("uid-1", NewProfile::new("rexfan", "a@b.com"));
        ProfileChange::SetUsername("mofan".to_string()).apply(&mut profile);
        ProfileChange::SetProfileImage(Some("https://img.example/me.png".to_string()))
            .apply(&mut profile);
        ProfileChange::ReplacePets(vec![Pet::new("Mo", Gender::Female)]).apply(&mut profile);

        assert_eq!(profile.username, "mofan");
        assert_eq!(
            profile.profile_image_url.as_deref(),
            Some("https://img.example/me.png")
        );
        assert_eq!(profile.pets[0].pet_name, "Mo");
    }
}
