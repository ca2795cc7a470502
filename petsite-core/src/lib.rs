//! Petsite Core - business logic for the Petsite virtual pet site
//!
//! This crate implements the core domain logic following hexagonal architecture:
//!
//! - **domain**: Core entities (Identity, Profile, Pet) and the session view reducer
//! - **ports**: Trait definitions for external dependencies (IdentityProvider, ProfileStore, Mailer)
//! - **services**: Business logic orchestration (session sync, profiles, auth flows)
//! - **adapters**: Concrete implementations (DuckDB, local accounts, outbox)

pub mod adapters;
pub mod config;
pub mod domain;
pub mod migrations;
pub mod ports;
pub mod services;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};

use adapters::duckdb::DuckDbRepository;
use adapters::local_identity::LocalIdentityProvider;
use adapters::outbox::OutboxMailer;
use config::Config;
use services::*;

// Re-export commonly used types at crate root
pub use domain::result::Error;
pub use domain::{
    Gender, Identity, NewPet, NewProfile, Pet, Profile, ProfileEdit, ProfilePage, SessionUser,
    SessionView,
};

/// Main context for Petsite operations
///
/// Wires the DuckDB store, the local identity provider and the services
/// together. The session publisher starts in the loading state; call
/// [`PetsiteContext::start_session_listener`] to have it follow the provider.
pub struct PetsiteContext {
    pub config: Config,
    pub petsite_dir: PathBuf,
    pub repository: Arc<DuckDbRepository>,
    pub identity_provider: Arc<LocalIdentityProvider>,
    pub mailer: Arc<OutboxMailer>,
    pub publisher: Arc<SessionPublisher>,
    pub profile_service: Arc<ProfileService>,
    pub auth_service: AuthService,
    pub doctor_service: DoctorService,
}

impl PetsiteContext {
    /// Open (or create) the petsite directory and database
    pub fn new(petsite_dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(petsite_dir).with_context(|| {
            format!("Failed to create data directory {}", petsite_dir.display())
        })?;
        let config = Config::load(petsite_dir)?;

        let db_path = petsite_dir.join("petsite.duckdb");
        let repository = Arc::new(
            DuckDbRepository::new(&db_path)
                .with_context(|| format!("Failed to open {}", db_path.display()))?,
        );
        repository.ensure_schema()?;

        Self::with_repository(config, petsite_dir.to_path_buf(), repository)
    }

    /// Build a context around an already opened repository
    pub fn with_repository(
        config: Config,
        petsite_dir: PathBuf,
        repository: Arc<DuckDbRepository>,
    ) -> Result<Self> {
        let mailer = Arc::new(OutboxMailer::new(Arc::clone(&repository)));
        let identity_provider = Arc::new(LocalIdentityProvider::new(
            Arc::clone(&repository),
            mailer.clone(),
            &config,
        )?);

        let profile_service = Arc::new(ProfileService::new(repository.clone()));
        let auth_service =
            AuthService::new(identity_provider.clone(), Arc::clone(&profile_service));
        let doctor_service = DoctorService::new(Arc::clone(&repository));

        Ok(Self {
            config,
            petsite_dir,
            repository,
            identity_provider,
            mailer,
            publisher: Arc::new(SessionPublisher::new()),
            profile_service,
            auth_service,
            doctor_service,
        })
    }

    /// Attach a listener that keeps the session view in sync
    ///
    /// Only one listener may run per context. Must be called inside a tokio
    /// runtime.
    pub fn start_session_listener(&self) -> domain::result::Result<SessionListener> {
        SessionListener::start(
            self.identity_provider.clone(),
            self.repository.clone(),
            Arc::clone(&self.publisher),
            self.config.fallback_username.clone(),
        )
    }

    /// Read handle on the session view
    pub fn session(&self) -> SessionConsumer {
        self.publisher.subscribe()
    }
}
