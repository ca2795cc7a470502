//! DuckDB file persistence across reopen
//!
//! Run with: cargo test --test persistence_tests

use tempfile::TempDir;

use petsite_core::adapters::duckdb::DuckDbRepository;
use petsite_core::domain::{Gender, NewProfile, Pet, Profile};
use petsite_core::ports::{Precondition, ProfileChange};

#[test]
fn test_reopen_keeps_documents_and_versions() {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("petsite.duckdb");

    {
        let repo = DuckDbRepository::new(&db_path).unwrap();
        repo.ensure_schema().unwrap();
        let profile = Profile::new("uid-1", NewProfile::new("rexfan", "a@b.com"));
        assert_eq!(repo.put_profile("uid-1", &profile).unwrap(), 1);
        repo.update_profile(
            "uid-1",
            &[ProfileChange::AppendPet(Pet::new("Rex", Gender::Male))],
            Precondition::Version(1),
        )
        .unwrap();
    }

    let repo = DuckDbRepository::new(&db_path).unwrap();
    let result = repo.run_migrations().unwrap();
    assert!(result.applied.is_empty());

    let profile = repo.get_profile("uid-1").unwrap().unwrap();
    assert_eq!(profile.version, 2);
    assert_eq!(profile.pets[0].pet_name, "Rex");
    assert_eq!(repo.db_path(), Some(db_path.as_path()));
}

#[test]
fn test_current_session_survives_reopen() {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("petsite.duckdb");

    {
        let repo = DuckDbRepository::new(&db_path).unwrap();
        repo.ensure_schema().unwrap();
        repo.set_current_session("uid-1").unwrap();
        repo.set_current_session("uid-2").unwrap();
    }

    let repo = DuckDbRepository::new(&db_path).unwrap();
    assert_eq!(repo.current_session_identity().unwrap().as_deref(), Some("uid-2"));

    repo.clear_current_session().unwrap();
    assert!(repo.current_session_identity().unwrap().is_none());
}

#[test]
fn test_stale_version_is_rejected() {
    let temp_dir = TempDir::new().unwrap();
    let repo = DuckDbRepository::new(&temp_dir.path().join("petsite.duckdb")).unwrap();
    repo.ensure_schema().unwrap();
    repo.put_profile("uid-1", &Profile::new("uid-1", NewProfile::new("x", "x@b.com")))
        .unwrap();
    repo.update_profile(
        "uid-1",
        &[ProfileChange::SetUsername("y".to_string())],
        Precondition::None,
    )
    .unwrap();

    let err = repo
        .update_profile(
            "uid-1",
            &[ProfileChange::SetUsername("z".to_string())],
            Precondition::Version(1),
        )
        .unwrap_err();
    assert!(matches!(err, petsite_core::Error::Conflict(_)));
    assert_eq!(repo.get_profile("uid-1").unwrap().unwrap().username, "y");
}
