//! Local identity provider
//!
//! Accounts live in `sys_identities` with Argon2 password hashes. The current
//! session is persisted in `sys_current_session` so it survives between CLI
//! invocations, and every change of it is pushed to subscribers.

use std::sync::{Arc, Mutex};

use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use async_trait::async_trait;
use base64::Engine;
use chrono::{Duration, Utc};
use rand::Rng;
use regex::Regex;
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::adapters::duckdb::{DuckDbRepository, IdentityRecord};
use crate::config::Config;
use crate::domain::result::{Error, Result};
use crate::domain::{Identity, SessionEvent};
use crate::ports::{
    AuthError, AuthResult, IdentityProvider, Mailer, OutboundEmail, SessionBroadcaster,
    SessionSubscription,
};

const EMAIL_PATTERN: &str = r"^[^\s@]+@[^\s@]+\.[^\s@]+$";

const PURPOSE_PASSWORD_RESET: &str = "password_reset";
const PURPOSE_VERIFY_EMAIL: &str = "verify_email";

/// Hash a password into an Argon2id PHC string
pub fn hash_password(password: &str) -> Result<String> {
    let salt_bytes: [u8; 16] = rand::thread_rng().gen();
    let salt = SaltString::encode_b64(&salt_bytes)
        .map_err(|e| Error::Other(format!("Failed to encode salt: {}", e)))?;
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| Error::Other(format!("Failed to hash password: {}", e)))?;
    Ok(hash.to_string())
}

/// Check a password against a stored PHC string
pub fn verify_password(password: &str, phc: &str) -> bool {
    PasswordHash::new(phc)
        .map(|parsed| {
            Argon2::default()
                .verify_password(password.as_bytes(), &parsed)
                .is_ok()
        })
        .unwrap_or(false)
}

/// New random one-time code, URL-safe
fn generate_action_code() -> String {
    let bytes: [u8; 24] = rand::thread_rng().gen();
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(bytes)
}

/// Codes are stored only as their SHA-256 digest
fn digest_action_code(code: &str) -> String {
    hex::encode(Sha256::digest(code.trim().as_bytes()))
}

fn internal(err: Error) -> AuthError {
    AuthError::internal(err.to_string())
}

pub struct LocalIdentityProvider {
    repository: Arc<DuckDbRepository>,
    mailer: Arc<dyn Mailer>,
    broadcaster: SessionBroadcaster,
    current: Mutex<Option<Identity>>,
    email_re: Regex,
    min_password_length: usize,
    action_code_ttl: Duration,
}

impl LocalIdentityProvider {
    /// Create the provider and restore the persisted session, if any
    pub fn new(
        repository: Arc<DuckDbRepository>,
        mailer: Arc<dyn Mailer>,
        config: &Config,
    ) -> Result<Self> {
        let email_re = Regex::new(EMAIL_PATTERN)
            .map_err(|e| Error::config(format!("Invalid email pattern: {}", e)))?;

        let current = match repository.current_session_identity()? {
            Some(id) => match repository.find_identity_by_id(&id)? {
                Some(record) if !record.disabled => Some(record.identity),
                _ => {
                    repository.clear_current_session()?;
                    None
                }
            },
            None => None,
        };

        let action_code_ttl = Duration::try_minutes(config.action_token_ttl_minutes)
            .filter(|ttl| *ttl > Duration::zero())
            .ok_or_else(|| {
                Error::config(format!(
                    "Action token lifetime out of range: {} minutes",
                    config.action_token_ttl_minutes
                ))
            })?;

        Ok(Self {
            repository,
            mailer,
            broadcaster: SessionBroadcaster::new(),
            current: Mutex::new(current),
            email_re,
            min_password_length: config.min_password_length,
            action_code_ttl,
        })
    }

    fn validate_email(&self, email: &str) -> AuthResult<String> {
        let email = email.trim();
        if self.email_re.is_match(email) {
            Ok(email.to_string())
        } else {
            Err(AuthError::InvalidEmail)
        }
    }

    fn validate_password(&self, password: &str) -> AuthResult<()> {
        if password.chars().count() < self.min_password_length {
            return Err(AuthError::WeakPassword {
                min_length: self.min_password_length,
            });
        }
        Ok(())
    }

    /// Update the session and publish it under the same lock, so
    /// subscribers see transitions in the order they were applied
    fn set_current(&self, identity: Option<Identity>) {
        let mut current = self.current.lock().unwrap_or_else(|e| e.into_inner());
        if *current == identity {
            return;
        }
        *current = identity.clone();
        self.broadcaster.publish(identity.into());
    }

    fn issue_action_code(&self, identity_id: &str, purpose: &str) -> AuthResult<String> {
        let code = generate_action_code();
        let expires_at = Utc::now()
            .checked_add_signed(self.action_code_ttl)
            .ok_or_else(|| AuthError::internal("Action code expiry out of range"))?;
        self.repository
            .insert_action_token(&digest_action_code(&code), identity_id, purpose, expires_at)
            .map_err(internal)?;
        Ok(code)
    }

    fn send_mail(&self, email: OutboundEmail) -> AuthResult<()> {
        self.mailer.send(&email).map_err(internal)
    }

    /// Number of live session subscriptions
    pub fn subscriber_count(&self) -> usize {
        self.broadcaster.subscriber_count()
    }
}

#[async_trait]
impl IdentityProvider for LocalIdentityProvider {
    fn name(&self) -> &str {
        "local"
    }

    async fn register(&self, email: &str, password: &str) -> AuthResult<Identity> {
        let email = self.validate_email(email)?;
        self.validate_password(password)?;

        if self
            .repository
            .find_identity_by_email(&email)
            .map_err(internal)?
            .is_some()
        {
            return Err(AuthError::EmailAlreadyInUse);
        }

        let record = IdentityRecord {
            identity: Identity::new(Uuid::new_v4().to_string(), email),
            password_hash: hash_password(password).map_err(internal)?,
            disabled: false,
            created_at: Utc::now(),
        };
        self.repository
            .insert_identity(&record)
            .map_err(internal)?;
        self.repository
            .set_current_session(&record.identity.id)
            .map_err(internal)?;

        tracing::info!(identity_id = %record.identity.id, "identity registered");
        self.set_current(Some(record.identity.clone()));
        Ok(record.identity)
    }

    async fn sign_in(&self, email: &str, password: &str) -> AuthResult<Identity> {
        let email = self.validate_email(email)?;
        let record = self
            .repository
            .find_identity_by_email(&email)
            .map_err(internal)?
            .ok_or(AuthError::UserNotFound)?;

        if record.disabled {
            return Err(AuthError::UserDisabled);
        }
        if !verify_password(password, &record.password_hash) {
            return Err(AuthError::WrongPassword);
        }

        self.repository
            .set_current_session(&record.identity.id)
            .map_err(internal)?;
        tracing::info!(identity_id = %record.identity.id, "identity signed in");
        self.set_current(Some(record.identity.clone()));
        Ok(record.identity)
    }

    async fn sign_out(&self) -> AuthResult<()> {
        self.repository.clear_current_session().map_err(internal)?;
        self.set_current(None);
        Ok(())
    }

    fn current_identity(&self) -> Option<Identity> {
        self.current
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    fn subscribe(&self) -> SessionSubscription {
        // Lock order is current, then broadcaster, matching `set_current`
        let current = self.current.lock().unwrap_or_else(|e| e.into_inner());
        self.broadcaster
            .subscribe(|| SessionEvent::from(current.clone()))
    }

    async fn send_password_reset(&self, email: &str) -> AuthResult<()> {
        let email = self.validate_email(email)?;
        let record = self
            .repository
            .find_identity_by_email(&email)
            .map_err(internal)?
            .ok_or(AuthError::UserNotFound)?;

        let code = self.issue_action_code(&record.identity.id, PURPOSE_PASSWORD_RESET)?;
        self.send_mail(OutboundEmail::new(
            &record.identity.email,
            "Reset your password",
            format!(
                "Use this code to choose a new password:\n\n    petsite reset-password confirm {}\n\nIf you did not ask for a reset, ignore this email.",
                code
            ),
        ))
    }

    async fn confirm_password_reset(&self, code: &str, new_password: &str) -> AuthResult<()> {
        self.validate_password(new_password)?;
        let token = self
            .repository
            .consume_action_token(&digest_action_code(code), PURPOSE_PASSWORD_RESET, Utc::now())
            .map_err(internal)?
            .ok_or(AuthError::InvalidActionCode)?;

        let hash = hash_password(new_password).map_err(internal)?;
        self.repository
            .update_password_hash(&token.identity_id, &hash)
            .map_err(internal)?;
        tracing::info!(identity_id = %token.identity_id, "password reset");
        Ok(())
    }

    async fn send_email_verification(&self, identity: &Identity) -> AuthResult<()> {
        let record = self
            .repository
            .find_identity_by_id(&identity.id)
            .map_err(internal)?
            .ok_or(AuthError::UserNotFound)?;

        let code = self.issue_action_code(&record.identity.id, PURPOSE_VERIFY_EMAIL)?;
        self.send_mail(OutboundEmail::new(
            &record.identity.email,
            "Verify your email",
            format!(
                "Confirm this address with:\n\n    petsite verify-email confirm {}",
                code
            ),
        ))
    }

    async fn verify_email(&self, code: &str) -> AuthResult<Identity> {
        let token = self
            .repository
            .consume_action_token(&digest_action_code(code), PURPOSE_VERIFY_EMAIL, Utc::now())
            .map_err(internal)?
            .ok_or(AuthError::InvalidActionCode)?;

        self.repository
            .set_email_verified(&token.identity_id)
            .map_err(internal)?;
        let record = self
            .repository
            .find_identity_by_id(&token.identity_id)
            .map_err(internal)?
            .ok_or(AuthError::UserNotFound)?;

        // Keep the cached session in step without emitting a transition
        {
            let mut current = self.current.lock().unwrap_or_else(|e| e.into_inner());
            if current.as_ref().is_some_and(|c| c.id == record.identity.id) {
                *current = Some(record.identity.clone());
            }
        }
        Ok(record.identity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::outbox::OutboxMailer;

    fn provider() -> (LocalIdentityProvider, Arc<DuckDbRepository>) {
        let repo = Arc::new(DuckDbRepository::open_in_memory().unwrap());
        repo.ensure_schema().unwrap();
        let mailer = Arc::new(OutboxMailer::new(Arc::clone(&repo)));
        let provider =
            LocalIdentityProvider::new(Arc::clone(&repo), mailer, &Config::default()).unwrap();
        (provider, repo)
    }

    /// Pull the code out of the last outbox message body
    fn last_code(repo: &DuckDbRepository) -> String {
        let email = repo.list_outbox(1).unwrap().remove(0);
        email
            .body
            .split_whitespace()
            .find(|w| w.len() == 32)
            .unwrap()
            .to_string()
    }

    #[test]
    fn test_password_hash_roundtrip() {
        let hash = hash_password("secret1").unwrap();
        assert!(hash.starts_with("$argon2"));
        assert!(verify_password("secret1", &hash));
        assert!(!verify_password("secret2", &hash));
        assert!(!verify_password("secret1", "not-a-hash"));
    }

    #[test]
    fn test_action_code_digest_is_stable() {
        let code = generate_action_code();
        assert_eq!(code.len(), 32);
        assert_eq!(digest_action_code(&code), digest_action_code(&format!(" {} ", code)));
        assert_eq!(digest_action_code(&code).len(), 64);
    }

    #[tokio::test]
    async fn test_register_validates_input() {
        let (provider, _) = provider();
        assert_eq!(
            provider.register("not-an-email", "secret1").await.unwrap_err(),
            AuthError::InvalidEmail
        );
        assert_eq!(
            provider.register("a@b.com", "abc").await.unwrap_err(),
            AuthError::WeakPassword { min_length: 6 }
        );

        provider.register("a@b.com", "secret1").await.unwrap();
        assert_eq!(
            provider.register("A@b.com", "secret1").await.unwrap_err(),
            AuthError::EmailAlreadyInUse
        );
    }

    #[tokio::test]
    async fn test_sign_in_errors() {
        let (provider, repo) = provider();
        let identity = provider.register("a@b.com", "secret1").await.unwrap();
        provider.sign_out().await.unwrap();

        assert_eq!(
            provider.sign_in("x@y.com", "secret1").await.unwrap_err(),
            AuthError::UserNotFound
        );
        assert_eq!(
            provider.sign_in("a@b.com", "wrong-pw").await.unwrap_err(),
            AuthError::WrongPassword
        );

        repo.set_identity_disabled(&identity.id, true).unwrap();
        assert_eq!(
            provider.sign_in("a@b.com", "secret1").await.unwrap_err(),
            AuthError::UserDisabled
        );
        assert!(provider.current_identity().is_none());
    }

    #[tokio::test]
    async fn test_session_transitions_are_pushed() {
        let (provider, _) = provider();
        let mut subscription = provider.subscribe();
        assert_eq!(subscription.next().await, Some(SessionEvent::NoIdentity));

        let identity = provider.register("a@b.com", "secret1").await.unwrap();
        assert_eq!(
            subscription.next().await,
            Some(SessionEvent::ActiveIdentity(identity))
        );

        provider.sign_out().await.unwrap();
        assert_eq!(subscription.next().await, Some(SessionEvent::NoIdentity));

        // Signing out again is not a transition
        provider.sign_out().await.unwrap();
        assert!(subscription.try_next().is_none());
    }

    #[tokio::test]
    async fn test_session_survives_restart() {
        let (provider, repo) = provider();
        let identity = provider.register("a@b.com", "secret1").await.unwrap();
        drop(provider);

        let mailer = Arc::new(OutboxMailer::new(Arc::clone(&repo)));
        let restored =
            LocalIdentityProvider::new(Arc::clone(&repo), mailer, &Config::default()).unwrap();
        assert_eq!(restored.current_identity(), Some(identity));
    }

    #[tokio::test]
    async fn test_password_reset_flow() {
        let (provider, repo) = provider();
        provider.register("a@b.com", "secret1").await.unwrap();

        assert_eq!(
            provider.send_password_reset("x@y.com").await.unwrap_err(),
            AuthError::UserNotFound
        );
        provider.send_password_reset("a@b.com").await.unwrap();
        let code = last_code(&repo);

        assert_eq!(
            provider.confirm_password_reset("bogus", "newsecret").await.unwrap_err(),
            AuthError::InvalidActionCode
        );
        provider.confirm_password_reset(&code, "newsecret").await.unwrap();
        assert_eq!(
            provider.confirm_password_reset(&code, "other-secret").await.unwrap_err(),
            AuthError::InvalidActionCode
        );

        provider.sign_out().await.unwrap();
        assert_eq!(
            provider.sign_in("a@b.com", "secret1").await.unwrap_err(),
            AuthError::WrongPassword
        );
        provider.sign_in("a@b.com", "newsecret").await.unwrap();
    }

    #[tokio::test]
    async fn test_email_verification_flow() {
        let (provider, repo) = provider();
        let identity = provider.register("a@b.com", "secret1").await.unwrap();
        assert!(!identity.email_verified);

        provider.send_email_verification(&identity).await.unwrap();
        let code = last_code(&repo);

        let verified = provider.verify_email(&code).await.unwrap();
        assert!(verified.email_verified);
        assert!(provider.current_identity().unwrap().email_verified);
    }

    #[test]
    fn test_out_of_range_token_ttl_is_a_config_error() {
        let repo = Arc::new(DuckDbRepository::open_in_memory().unwrap());
        repo.ensure_schema().unwrap();
        let mailer = Arc::new(OutboxMailer::new(Arc::clone(&repo)));
        let config = Config {
            action_token_ttl_minutes: i64::MAX,
            ..Config::default()
        };

        let err = LocalIdentityProvider::new(repo, mailer, &config)
            .err()
            .unwrap();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_concurrent_transitions_end_on_current_state() {
        let (provider, _) = provider();
        let provider = Arc::new(provider);
        let mut subscription = provider.subscribe();

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let provider = Arc::clone(&provider);
                std::thread::spawn(move || {
                    for round in 0..50 {
                        let identity = (round % 2 == 0)
                            .then(|| Identity::new(format!("uid-{}", i), "a@b.com"));
                        provider.set_current(identity);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let mut last = None;
        while let Some(event) = subscription.try_next() {
            last = Some(event);
        }
        assert_eq!(
            last,
            Some(SessionEvent::from(provider.current_identity()))
        );
    }
}
