//! Featured-pet compare-and-swap against concurrent writers

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;

use petsite_core::adapters::duckdb::DuckDbRepository;
use petsite_core::domain::result::Result;
use petsite_core::domain::{Gender, NewPet, NewProfile, Pet, Profile};
use petsite_core::ports::{Precondition, ProfileChange, ProfileStore};
use petsite_core::services::{ProfileService, FEATURED_PET_MAX_ATTEMPTS};
use petsite_core::Error;

/// Wraps the DuckDB store and lets another writer sneak in ahead of the
/// first conditional update
struct RacingStore {
    inner: Arc<DuckDbRepository>,
    raced: AtomicBool,
    conditional_updates: AtomicUsize,
}

#[async_trait]
impl ProfileStore for RacingStore {
    async fn get(&self, id: &str) -> Result<Option<Profile>> {
        self.inner.get(id).await
    }

    async fn set(&self, id: &str, profile: &Profile) -> Result<u64> {
        self.inner.set(id, profile).await
    }

    async fn update(
        &self,
        id: &str,
        changes: &[ProfileChange],
        precondition: Precondition,
    ) -> Result<u64> {
        if let Precondition::Version(_) = precondition {
            self.conditional_updates.fetch_add(1, Ordering::SeqCst);
            if !self.raced.swap(true, Ordering::SeqCst) {
                let intruder = Pet::new("Mo", Gender::Female);
                self.inner
                    .update(id, &[ProfileChange::AppendPet(intruder)], Precondition::None)
                    .await?;
            }
        }
        self.inner.update(id, changes, precondition).await
    }
}

/// Every conditional update loses
struct AlwaysConflict {
    inner: Arc<DuckDbRepository>,
    updates: AtomicUsize,
}

#[async_trait]
impl ProfileStore for AlwaysConflict {
    async fn get(&self, id: &str) -> Result<Option<Profile>> {
        self.inner.get(id).await
    }

    async fn set(&self, id: &str, profile: &Profile) -> Result<u64> {
        self.inner.set(id, profile).await
    }

    async fn update(
        &self,
        id: &str,
        changes: &[ProfileChange],
        precondition: Precondition,
    ) -> Result<u64> {
        match precondition {
            Precondition::None => self.inner.update(id, changes, precondition).await,
            Precondition::Version(_) => {
                self.updates.fetch_add(1, Ordering::SeqCst);
                Err(Error::Conflict("version moved".to_string()))
            }
        }
    }
}

async fn seeded_repo() -> Arc<DuckDbRepository> {
    let repo = Arc::new(DuckDbRepository::open_in_memory().unwrap());
    repo.ensure_schema().unwrap();

    let service = ProfileService::new(repo.clone());
    service
        .create_profile("uid-1", NewProfile::new("rexfan", "a@b.com"))
        .await
        .unwrap();
    service
        .append_pet("uid-1", NewPet::new("Rex", Gender::Male))
        .await
        .unwrap();
    repo
}

fn featured_names(pets: &[Pet]) -> Vec<&str> {
    pets.iter()
        .filter(|p| p.featured)
        .map(|p| p.pet_name.as_str())
        .collect()
}

#[tokio::test]
async fn test_lost_race_is_retried_on_fresh_data() {
    let repo = seeded_repo().await;
    let store = Arc::new(RacingStore {
        inner: repo.clone(),
        raced: AtomicBool::new(false),
        conditional_updates: AtomicUsize::new(0),
    });
    let service = ProfileService::new(store.clone());

    let pets = service.set_featured_pet("uid-1", "Rex").await.unwrap();
    assert_eq!(store.conditional_updates.load(Ordering::SeqCst), 2);

    // The concurrent append survives the retried write
    assert_eq!(pets.len(), 2);
    let stored = repo.get_profile("uid-1").unwrap().unwrap();
    assert_eq!(stored.pets.len(), 2);
    assert_eq!(featured_names(&stored.pets), vec!["Rex"]);
}

#[tokio::test]
async fn test_gives_up_after_max_attempts() {
    let repo = seeded_repo().await;
    let store = Arc::new(AlwaysConflict {
        inner: repo.clone(),
        updates: AtomicUsize::new(0),
    });
    let service = ProfileService::new(store.clone());

    let err = service.set_featured_pet("uid-1", "Rex").await.unwrap_err();
    assert!(matches!(err, Error::Conflict(_)));
    assert_eq!(store.updates.load(Ordering::SeqCst), FEATURED_PET_MAX_ATTEMPTS);

    let stored = repo.get_profile("uid-1").unwrap().unwrap();
    assert!(featured_names(&stored.pets).is_empty());
}

#[tokio::test]
async fn test_at_most_one_featured_pet() {
    let repo = seeded_repo().await;
    let service = ProfileService::new(repo.clone());
    for name in ["Mo", "Tux"] {
        service
            .append_pet("uid-1", NewPet::new(name, Gender::Female))
            .await
            .unwrap();
    }

    for name in ["Rex", "Mo", "Tux", "Tux", "Rex", "Mo"] {
        let pets = service.set_featured_pet("uid-1", name).await.unwrap();
        assert!(featured_names(&pets).len() <= 1);
    }

    let stored = repo.get_profile("uid-1").unwrap().unwrap();
    assert_eq!(featured_names(&stored.pets), vec!["Mo"]);
}

#[tokio::test]
async fn test_unknown_pet_leaves_document_untouched() {
    let repo = seeded_repo().await;
    let service = ProfileService::new(repo.clone());
    let before = repo.get_profile("uid-1").unwrap().unwrap();

    let err = service.set_featured_pet("uid-1", "Ghost").await.unwrap_err();
    assert!(err.is_not_found());

    let after = repo.get_profile("uid-1").unwrap().unwrap();
    assert_eq!(after.version, before.version);
}
