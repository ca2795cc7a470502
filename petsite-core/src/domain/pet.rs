//! Pet domain model

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// Starting hunger for a freshly created pet
pub const INITIAL_HUNGER: u32 = 100;

/// Starting boredom for a freshly created pet
pub const INITIAL_BOREDOM: u32 = 0;

/// Counter for generating unique IDs within the same millisecond
static PET_ID_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Generate a time-based pet ID
///
/// Lower 16 bits are a per-process counter, the rest is the unix timestamp in
/// milliseconds, so IDs created in the same millisecond stay distinct.
pub fn next_pet_id() -> i64 {
    let timestamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64;

    let counter = PET_ID_COUNTER.fetch_add(1, Ordering::Relaxed) & 0xFFFF;
    ((timestamp << 16) | counter) as i64
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Gender {
    #[default]
    Male,
    Female,
    Other,
}

impl Gender {
    pub fn as_str(&self) -> &'static str {
        match self {
            Gender::Male => "male",
            Gender::Female => "female",
            Gender::Other => "other",
        }
    }
}

impl fmt::Display for Gender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Gender {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "male" => Ok(Gender::Male),
            "female" => Ok(Gender::Female),
            "other" => Ok(Gender::Other),
            other => Err(format!(
                "Unknown gender: {}. Expected male, female or other",
                other
            )),
        }
    }
}

/// Items a pet has collected, keyed by item ID
///
/// Food and toys are independent sets. Item payloads are opaque to this
/// crate and kept as raw JSON so nothing is lost on a rewrite.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CollectedItems {
    #[serde(default)]
    pub food: BTreeMap<String, JsonValue>,
    #[serde(default)]
    pub toys: BTreeMap<String, JsonValue>,
}

impl CollectedItems {
    pub fn is_empty(&self) -> bool {
        self.food.is_empty() && self.toys.is_empty()
    }
}

/// A virtual pet owned by a profile
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pet {
    pub id: i64,
    pub pet_name: String,
    #[serde(default)]
    pub gender: Gender,
    #[serde(default = "default_hunger")]
    pub hunger: u32,
    #[serde(default)]
    pub boredom: u32,
    /// At most one pet per profile has this set
    #[serde(default)]
    pub featured: bool,
    #[serde(default)]
    pub collected_items: CollectedItems,
}

fn default_hunger() -> u32 {
    INITIAL_HUNGER
}

impl Pet {
    /// Create a new pet with starting stats
    pub fn new(pet_name: impl Into<String>, gender: Gender) -> Self {
        Self {
            id: next_pet_id(),
            pet_name: pet_name.into(),
            gender,
            hunger: INITIAL_HUNGER,
            boredom: INITIAL_BOREDOM,
            featured: false,
            collected_items: CollectedItems::default(),
        }
    }
}

/// Input for creating a pet
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewPet {
    pub pet_name: String,
    pub gender: Gender,
}

impl NewPet {
    pub fn new(pet_name: impl Into<String>, gender: Gender) -> Self {
        Self {
            pet_name: pet_name.into(),
            gender,
        }
    }
}

/// Toggle the featured flag on the first pet named `pet_name`
///
/// Every other pet is forced to not featured, so at most one pet is featured
/// afterwards. Returns `false` (and leaves the list untouched) when no pet
/// carries that name.
pub fn toggle_featured(pets: &mut [Pet], pet_name: &str) -> bool {
    let Some(target) = pets.iter().position(|p| p.pet_name == pet_name) else {
        return false;
    };

    for (index, pet) in pets.iter_mut().enumerate() {
        pet.featured = if index == target { !pet.featured } else { false };
    }
    true
}

/// The featured pet, if any
pub fn featured_pet(pets: &[Pet]) -> Option<&Pet> {
    pets.iter().find(|p| p.featured)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pets(names: &[&str]) -> Vec<Pet> {
        names.iter().map(|n| Pet::new(*n, Gender::Other)).collect()
    }

    #[test]
    fn test_new_pet_has_starting_stats() {
        let pet = Pet::new("Rex", Gender::Male);
        assert_eq!(pet.pet_name, "Rex");
        assert_eq!(pet.hunger, 100);
        assert_eq!(pet.boredom, 0);
        assert!(!pet.featured);
        assert!(pet.collected_items.is_empty());
    }

    #[test]
    fn test_pet_ids_are_unique() {
        let ids: std::collections::HashSet<i64> = (0..1000).map(|_| next_pet_id()).collect();
        assert_eq!(ids.len(), 1000);
    }

    #[test]
    fn test_pet_serializes_camel_case() {
        let pet = Pet::new("Rex", Gender::Female);
        let json = serde_json::to_value(&pet).unwrap();
        assert_eq!(json["petName"], "Rex");
        assert_eq!(json["gender"], "female");
        assert!(json["collectedItems"]["food"].is_object());
        assert!(json["collectedItems"]["toys"].is_object());
    }

    #[test]
    fn test_pet_deserializes_with_missing_stats() {
        let pet: Pet = serde_json::from_str(r#"{"id": 7, "petName": "Mo"}"#).unwrap();
        assert_eq!(pet.hunger, 100);
        assert_eq!(pet.boredom, 0);
        assert_eq!(pet.gender, Gender::Male);
    }

    #[test]
    fn test_gender_from_str() {
        assert_eq!("Female".parse::<Gender>().unwrap(), Gender::Female);
        assert_eq!(" other ".parse::<Gender>().unwrap(), Gender::Other);
        assert!("cat".parse::<Gender>().is_err());
    }

    #[test]
    fn test_toggle_featured_clears_others() {
        let mut list = pets(&["Rex", "Mo", "Bun"]);
        list[1].featured = true;

        assert!(toggle_featured(&mut list, "Bun"));
        assert!(!list[0].featured);
        assert!(!list[1].featured);
        assert!(list[2].featured);
    }

    #[test]
    fn test_toggle_featured_twice_unfeatures() {
        let mut list = pets(&["Rex", "Mo"]);

        toggle_featured(&mut list, "Rex");
        assert_eq!(list.iter().filter(|p| p.featured).count(), 1);

        toggle_featured(&mut list, "Rex");
        assert_eq!(list.iter().filter(|p| p.featured).count(), 0);
    }

    #[test]
    fn test_toggle_featured_duplicate_names_only_first() {
        let mut list = pets(&["Rex", "Rex"]);
        toggle_featured(&mut list, "Rex");
        assert!(list[0].featured);
        assert!(!list[1].featured);
    }

    #[test]
    fn test_toggle_featured_unknown_name() {
        let mut list = pets(&["Rex"]);
        list[0].featured = true;
        assert!(!toggle_featured(&mut list, "Ghost"));
        assert!(list[0].featured);
    }
}
