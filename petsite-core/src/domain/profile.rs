//! Profile domain model
//!
//! A profile is the application-owned document for one identity. It is
//! stored as JSON keyed by the identity ID; the key and the store's write
//! version travel alongside the document but are not part of it.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use super::pet::{featured_pet, Pet};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    /// Identity ID this profile belongs to (document key)
    #[serde(skip)]
    pub id: String,
    /// Store write counter, used for conditional updates
    #[serde(skip)]
    pub version: u64,

    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub email: String,
    /// Absent on documents written before signup recorded it
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub currency: u64,
    #[serde(default, deserialize_with = "deserialize_image_url")]
    pub profile_image_url: Option<String>,
    #[serde(default, deserialize_with = "deserialize_pets")]
    pub pets: Vec<Pet>,
}

impl Profile {
    /// Build the initial document for a freshly registered identity
    pub fn new(id: impl Into<String>, new_profile: NewProfile) -> Self {
        Self {
            id: id.into(),
            version: 0,
            username: new_profile.username,
            email: new_profile.email,
            created_at: Some(Utc::now()),
            currency: 0,
            profile_image_url: None,
            pets: Vec::new(),
        }
    }

    /// Parse a stored document, normalizing legacy shapes
    pub fn from_document(id: impl Into<String>, version: u64, document: &str) -> serde_json::Result<Self> {
        let mut profile: Profile = serde_json::from_str(document)?;
        profile.id = id.into();
        profile.version = version;
        Ok(profile)
    }

    /// Serialize the document body (without key or version)
    pub fn to_document(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    pub fn featured_pet(&self) -> Option<&Pet> {
        featured_pet(&self.pets)
    }

    pub fn find_pet(&self, pet_name: &str) -> Option<&Pet> {
        self.pets.iter().find(|p| p.pet_name == pet_name)
    }
}

/// Fields written at registration time
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewProfile {
    pub username: String,
    pub email: String,
}

impl NewProfile {
    pub fn new(username: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            email: email.into(),
        }
    }
}

/// Owner-initiated profile edits
///
/// `None` leaves a field untouched. `profile_image_url: Some(None)` clears
/// the image.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProfileEdit {
    pub username: Option<String>,
    pub profile_image_url: Option<Option<String>>,
}

impl ProfileEdit {
    pub fn is_empty(&self) -> bool {
        self.username.is_none() && self.profile_image_url.is_none()
    }
}

/// Public profile page model
#[derive(Debug, Clone, Serialize)]
pub struct ProfilePage {
    pub user_id: String,
    pub username: String,
    pub profile_image_url: Option<String>,
    pub member_since: Option<DateTime<Utc>>,
    pub currency: u64,
    pub pets: Vec<Pet>,
    pub featured_pet: Option<Pet>,
    /// True when the viewer owns this profile (write actions allowed)
    pub is_owner: bool,
}

impl ProfilePage {
    pub fn new(profile: Profile, viewer_id: Option<&str>) -> Self {
        let featured = profile.featured_pet().cloned();
        let is_owner = viewer_id == Some(profile.id.as_str());
        Self {
            user_id: profile.id,
            username: profile.username,
            profile_image_url: profile.profile_image_url,
            member_since: profile.created_at,
            currency: profile.currency,
            pets: profile.pets,
            featured_pet: featured,
            is_owner,
        }
    }
}

/// Stored pet collections come either as an array or as an object keyed by
/// pet ID. Both normalize to an ordered list (keyed entries sorted by key).
#[derive(Deserialize)]
#[serde(untagged)]
enum PetCollection {
    List(Vec<Pet>),
    Keyed(BTreeMap<String, Pet>),
}

fn deserialize_pets<'de, D>(deserializer: D) -> Result<Vec<Pet>, D::Error>
where
    D: Deserializer<'de>,
{
    let collection: Option<PetCollection> = Option::deserialize(deserializer)?;
    Ok(match collection {
        Some(PetCollection::List(pets)) => pets,
        Some(PetCollection::Keyed(pets)) => pets.into_values().collect(),
        None => Vec::new(),
    })
}

fn deserialize_image_url<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let url: Option<String> = Option::deserialize(deserializer)?;
    Ok(url.filter(|u| !u.trim().is_empty()))
}

/// True when a raw document stores its pets in the keyed shape
pub fn has_keyed_pets(document: &str) -> bool {
    serde_json::from_str::<serde_json::Value>(document)
        .map(|v| v.get("pets").is_some_and(|p| p.is_object()))
        .unwrap_or(false)
}
