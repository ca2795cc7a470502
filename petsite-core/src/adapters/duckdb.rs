//! DuckDB repository implementation
//!
//! Holds identities, the persisted current session, action tokens, the mail
//! outbox and profile documents in `petsite.duckdb`.

use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use std::thread;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use duckdb::{params, Connection, OptionalExt};
use uuid::Uuid;

use crate::domain::result::{Error, Result};
use crate::domain::{Identity, Profile};
use crate::ports::{OutboundEmail, Precondition, ProfileChange, ProfileStore};
use crate::services::{MigrationResult, MigrationService};

/// Maximum number of retries when database file is locked
const MAX_RETRIES: u32 = 5;

/// Initial retry delay in milliseconds (doubles each retry: 50, 100, 200, 400, 800ms)
const INITIAL_RETRY_DELAY_MS: u64 = 50;

/// The single row of `sys_current_session`
const SESSION_SLOT: i32 = 1;

/// Check if an error message indicates a file locking issue that should be retried
fn is_retryable_error(err_msg: &str) -> bool {
    let lower = err_msg.to_lowercase();
    // Windows error messages
    lower.contains("being used by another process")
        || lower.contains("cannot access the file")
        // Unix/macOS error messages
        || lower.contains("resource temporarily unavailable")
        || lower.contains("database is locked")
        || lower.contains("file is already open")
}

fn parse_timestamp(value: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_default()
}

/// An identity row as the local identity provider sees it
#[derive(Debug, Clone)]
pub struct IdentityRecord {
    pub identity: Identity,
    /// Argon2 PHC string
    pub password_hash: String,
    pub disabled: bool,
    pub created_at: DateTime<Utc>,
}

/// A stored, still valid action token
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionToken {
    pub identity_id: String,
    pub purpose: String,
    pub expires_at: DateTime<Utc>,
}

/// DuckDB repository implementation
pub struct DuckDbRepository {
    conn: Mutex<Connection>,
    db_path: Option<PathBuf>,
}

impl DuckDbRepository {
    /// Open (or create) the database file
    ///
    /// Includes retry logic with exponential backoff for file locking errors,
    /// which occur when another `petsite` process holds the file.
    pub fn new(db_path: &Path) -> Result<Self> {
        let mut last_error = None;

        for attempt in 0..MAX_RETRIES {
            match Self::try_open_connection(db_path) {
                Ok(conn) => {
                    return Ok(Self {
                        conn: Mutex::new(conn),
                        db_path: Some(db_path.to_path_buf()),
                    });
                }
                Err(e) => {
                    let err_msg = e.to_string();
                    if is_retryable_error(&err_msg) && attempt < MAX_RETRIES - 1 {
                        let delay =
                            Duration::from_millis(INITIAL_RETRY_DELAY_MS * 2u64.pow(attempt));
                        tracing::warn!(
                            delay_ms = delay.as_millis() as u64,
                            attempt = attempt + 1,
                            max = MAX_RETRIES,
                            error = %err_msg,
                            "database busy, retrying"
                        );
                        thread::sleep(delay);
                        last_error = Some(e);
                        continue;
                    }
                    return Err(e);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| {
            Error::database(format!(
                "Failed to open database after {} retries",
                MAX_RETRIES
            ))
        }))
    }

    /// In-memory database, used by tests and throwaway contexts
    pub fn open_in_memory() -> Result<Self> {
        let config = duckdb::Config::default().enable_autoload_extension(false)?;
        Ok(Self {
            conn: Mutex::new(Connection::open_in_memory_with_flags(config)?),
            db_path: None,
        })
    }

    fn try_open_connection(db_path: &Path) -> Result<Connection> {
        // Extension autoloading stays off; JSON is linked in through the cargo feature
        let config = duckdb::Config::default().enable_autoload_extension(false)?;
        Ok(Connection::open_with_flags(db_path, config)?)
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn db_path(&self) -> Option<&Path> {
        self.db_path.as_deref()
    }

    /// Run database migrations using the MigrationService
    pub fn run_migrations(&self) -> Result<MigrationResult> {
        let conn = self.conn();
        MigrationService::new(&conn).run_pending()
    }

    /// Ensure database schema exists (runs pending migrations)
    pub fn ensure_schema(&self) -> Result<()> {
        self.run_migrations()?;
        Ok(())
    }

    /// Applied and pending migration names
    pub fn migration_status(&self) -> Result<(Vec<String>, Vec<String>)> {
        let conn = self.conn();
        let service = MigrationService::new(&conn);
        Ok((service.get_applied()?, service.get_pending()?))
    }

    // === Identity operations ===

    pub fn insert_identity(&self, record: &IdentityRecord) -> Result<()> {
        let conn = self.conn();
        conn.execute(
            "INSERT INTO sys_identities (identity_id, email, display_name, password_hash,
                                         email_verified, disabled, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
            params![
                record.identity.id,
                record.identity.email,
                record.identity.display_name,
                record.password_hash,
                record.identity.email_verified,
                record.disabled,
                record.created_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    pub fn find_identity_by_email(&self, email: &str) -> Result<Option<IdentityRecord>> {
        self.find_identity("lower(email) = lower(?)", email)
    }

    pub fn find_identity_by_id(&self, identity_id: &str) -> Result<Option<IdentityRecord>> {
        self.find_identity("identity_id = ?", identity_id)
    }

    fn find_identity(&self, predicate: &str, value: &str) -> Result<Option<IdentityRecord>> {
        let conn = self.conn();
        let sql = format!(
            "SELECT identity_id, email, display_name, password_hash, email_verified,
                    disabled, created_at
             FROM sys_identities WHERE {}",
            predicate
        );
        let record = conn
            .query_row(&sql, [value], |row| {
                let created_at: String = row.get(6)?;
                Ok(IdentityRecord {
                    identity: Identity {
                        id: row.get(0)?,
                        email: row.get(1)?,
                        display_name: row.get(2)?,
                        email_verified: row.get(4)?,
                    },
                    password_hash: row.get(3)?,
                    disabled: row.get(5)?,
                    created_at: parse_timestamp(&created_at),
                })
            })
            .optional()?;
        Ok(record)
    }

    pub fn update_password_hash(&self, identity_id: &str, password_hash: &str) -> Result<()> {
        let conn = self.conn();
        conn.execute(
            "UPDATE sys_identities SET password_hash = ? WHERE identity_id = ?",
            params![password_hash, identity_id],
        )?;
        Ok(())
    }

    pub fn set_email_verified(&self, identity_id: &str) -> Result<()> {
        let conn = self.conn();
        conn.execute(
            "UPDATE sys_identities SET email_verified = TRUE WHERE identity_id = ?",
            [identity_id],
        )?;
        Ok(())
    }

    pub fn set_identity_disabled(&self, identity_id: &str, disabled: bool) -> Result<()> {
        let conn = self.conn();
        conn.execute(
            "UPDATE sys_identities SET disabled = ? WHERE identity_id = ?",
            params![disabled, identity_id],
        )?;
        Ok(())
    }

    pub fn identity_count(&self) -> Result<i64> {
        let conn = self.conn();
        Ok(conn.query_row("SELECT COUNT(*) FROM sys_identities", [], |row| row.get(0))?)
    }

    /// Identities that never got a profile document
    pub fn identities_without_profile(&self) -> Result<Vec<String>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT i.identity_id FROM sys_identities i
             LEFT JOIN sys_profiles p ON p.profile_id = i.identity_id
             WHERE p.profile_id IS NULL
             ORDER BY i.identity_id",
        )?;
        let ids = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(ids)
    }

    // === Current session ===

    pub fn current_session_identity(&self) -> Result<Option<String>> {
        let conn = self.conn();
        Ok(conn
            .query_row(
                "SELECT identity_id FROM sys_current_session WHERE slot = ?",
                [SESSION_SLOT],
                |row| row.get(0),
            )
            .optional()?)
    }

    pub fn set_current_session(&self, identity_id: &str) -> Result<()> {
        let conn = self.conn();
        conn.execute("DELETE FROM sys_current_session WHERE slot = ?", [SESSION_SLOT])?;
        conn.execute(
            "INSERT INTO sys_current_session (slot, identity_id, signed_in_at) VALUES (?, ?, ?)",
            params![SESSION_SLOT, identity_id, Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }

    pub fn clear_current_session(&self) -> Result<()> {
        let conn = self.conn();
        conn.execute("DELETE FROM sys_current_session WHERE slot = ?", [SESSION_SLOT])?;
        Ok(())
    }

    // === Action tokens ===

    pub fn insert_action_token(
        &self,
        token_hash: &str,
        identity_id: &str,
        purpose: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<()> {
        let conn = self.conn();
        conn.execute(
            "INSERT INTO sys_action_tokens (token_hash, identity_id, purpose, expires_at)
             VALUES (?, ?, ?, ?)",
            params![token_hash, identity_id, purpose, expires_at.to_rfc3339()],
        )?;
        Ok(())
    }

    /// Mark a token used and return it, if it exists, matches `purpose`, is
    /// unused and has not expired at `now`
    pub fn consume_action_token(
        &self,
        token_hash: &str,
        purpose: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<ActionToken>> {
        let conn = self.conn();
        let row: Option<(String, String, String, bool)> = conn
            .query_row(
                "SELECT identity_id, purpose, expires_at, used
                 FROM sys_action_tokens WHERE token_hash = ?",
                [token_hash],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
            )
            .optional()?;

        let Some((identity_id, stored_purpose, expires_at, used)) = row else {
            return Ok(None);
        };
        let expires_at = parse_timestamp(&expires_at);
        if used || stored_purpose != purpose || expires_at <= now {
            return Ok(None);
        }

        conn.execute(
            "UPDATE sys_action_tokens SET used = TRUE WHERE token_hash = ?",
            [token_hash],
        )?;
        Ok(Some(ActionToken {
            identity_id,
            purpose: stored_purpose,
            expires_at,
        }))
    }

    // === Outbox ===

    pub fn insert_outbox(&self, email: &OutboundEmail) -> Result<()> {
        let conn = self.conn();
        conn.execute(
            "INSERT INTO sys_outbox (message_id, recipient, subject, body, created_at)
             VALUES (?, ?, ?, ?, ?)",
            params![
                email.id.to_string(),
                email.recipient,
                email.subject,
                email.body,
                email.created_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    /// Most recent outbox messages first
    pub fn list_outbox(&self, limit: usize) -> Result<Vec<OutboundEmail>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT message_id, recipient, subject, body, created_at
             FROM sys_outbox ORDER BY created_at DESC LIMIT ?",
        )?;
        let emails = stmt
            .query_map([limit as i64], |row| {
                let id: String = row.get(0)?;
                let created_at: String = row.get(4)?;
                Ok(OutboundEmail {
                    id: Uuid::parse_str(&id).unwrap_or_default(),
                    recipient: row.get(1)?,
                    subject: row.get(2)?,
                    body: row.get(3)?,
                    created_at: parse_timestamp(&created_at),
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(emails)
    }

    // === Profile documents ===

    pub fn get_profile(&self, profile_id: &str) -> Result<Option<Profile>> {
        let conn = self.conn();
        let row: Option<(String, i64)> = conn
            .query_row(
                "SELECT document, version FROM sys_profiles WHERE profile_id = ?",
                [profile_id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        match row {
            Some((document, version)) => Ok(Some(Profile::from_document(
                profile_id,
                version as u64,
                &document,
            )?)),
            None => Ok(None),
        }
    }

    /// Create or overwrite a document, returning its new version
    pub fn put_profile(&self, profile_id: &str, profile: &Profile) -> Result<u64> {
        let document = profile.to_document()?;
        let mut conn = self.conn();
        let tx = conn.transaction()?;

        let current: Option<i64> = tx
            .query_row(
                "SELECT version FROM sys_profiles WHERE profile_id = ?",
                [profile_id],
                |row| row.get(0),
            )
            .optional()?;
        let now = Utc::now().to_rfc3339();

        let version = match current {
            Some(version) => {
                tx.execute(
                    "UPDATE sys_profiles SET document = ?, version = ?, updated_at = ?
                     WHERE profile_id = ?",
                    params![document, version + 1, now, profile_id],
                )?;
                version + 1
            }
            None => {
                tx.execute(
                    "INSERT INTO sys_profiles (profile_id, document, version, updated_at)
                     VALUES (?, ?, 1, ?)",
                    params![profile_id, document, now],
                )?;
                1
            }
        };

        tx.commit()?;
        Ok(version as u64)
    }

    /// Apply changes to an existing document in one transaction
    ///
    /// The write is conditioned on the version that was read, so a document
    /// changed underneath the caller is never overwritten.
    pub fn update_profile(
        &self,
        profile_id: &str,
        changes: &[ProfileChange],
        precondition: Precondition,
    ) -> Result<u64> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;

        let row: Option<(String, i64)> = tx
            .query_row(
                "SELECT document, version FROM sys_profiles WHERE profile_id = ?",
                [profile_id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;
        let Some((document, version)) = row else {
            return Err(Error::not_found(format!("profile {}", profile_id)));
        };

        if let Precondition::Version(expected) = precondition {
            if expected != version as u64 {
                return Err(Error::Conflict(format!(
                    "profile {} is at version {}, expected {}",
                    profile_id, version, expected
                )));
            }
        }

        let mut profile = Profile::from_document(profile_id, version as u64, &document)?;
        for change in changes {
            change.apply(&mut profile);
        }

        let updated = tx.execute(
            "UPDATE sys_profiles SET document = ?, version = version + 1, updated_at = ?
             WHERE profile_id = ? AND version = ?",
            params![
                profile.to_document()?,
                Utc::now().to_rfc3339(),
                profile_id,
                version
            ],
        )?;
        if updated != 1 {
            return Err(Error::Conflict(format!(
                "profile {} changed during update",
                profile_id
            )));
        }

        tx.commit()?;
        Ok(version as u64 + 1)
    }

    /// Raw `(profile_id, document)` pairs, for health checks
    pub fn list_profile_documents(&self) -> Result<Vec<(String, String)>> {
        let conn = self.conn();
        let mut stmt =
            conn.prepare("SELECT profile_id, document FROM sys_profiles ORDER BY profile_id")?;
        let docs = stmt
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(docs)
    }

    /// Store a raw document as-is (import of legacy documents)
    pub fn put_raw_document(&self, profile_id: &str, document: &str) -> Result<()> {
        let conn = self.conn();
        conn.execute("DELETE FROM sys_profiles WHERE profile_id = ?", [profile_id])?;
        conn.execute(
            "INSERT INTO sys_profiles (profile_id, document, version, updated_at)
             VALUES (?, ?, 1, ?)",
            params![profile_id, document, Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }
}

#[async_trait]
impl ProfileStore for DuckDbRepository {
    async fn get(&self, id: &str) -> Result<Option<Profile>> {
        self.get_profile(id).map_err(|e| Error::read(e.to_string()))
    }

    async fn set(&self, id: &str, profile: &Profile) -> Result<u64> {
        self.put_profile(id, profile)
            .map_err(|e| Error::write(e.to_string()))
    }

    async fn update(
        &self,
        id: &str,
        changes: &[ProfileChange],
        precondition: Precondition,
    ) -> Result<u64> {
        self.update_profile(id, changes, precondition)
            .map_err(|e| match e {
                Error::NotFound(_) | Error::Conflict(_) => e,
                other => Error::write(other.to_string()),
            })
    }
}
