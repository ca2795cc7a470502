//! Configuration management
//!
//! Settings live in `<petsite_dir>/settings.json`:
//! ```json
//! {
//!   "app": {
//!     "minPasswordLength": 6,
//!     "fallbackUsername": "New User",
//!     "actionTokenTtlMinutes": 60,
//!     "logFilter": "warn"
//!   }
//! }
//! ```
//! Keys this crate does not know about are ignored.

use std::path::{Path, PathBuf};

use anyhow::Result;
use serde::Deserialize;

use crate::domain::result::Error;
use crate::domain::session::DEFAULT_FALLBACK_USERNAME;

/// Environment variable selecting the data directory
pub const DIR_ENV: &str = "PETSITE_DIR";

/// Environment variable overriding the log filter
pub const LOG_ENV: &str = "PETSITE_LOG";

const DEFAULT_MIN_PASSWORD_LENGTH: usize = 6;
const DEFAULT_ACTION_TOKEN_TTL_MINUTES: i64 = 60;
const DEFAULT_LOG_FILTER: &str = "warn";

/// Longest accepted lifetime for action codes (30 days)
pub const MAX_ACTION_TOKEN_TTL_MINUTES: i64 = 30 * 24 * 60;

/// Raw settings.json structure
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SettingsFile {
    #[serde(default)]
    app: AppSettings,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AppSettings {
    #[serde(default)]
    min_password_length: Option<usize>,
    #[serde(default)]
    fallback_username: Option<String>,
    #[serde(default)]
    action_token_ttl_minutes: Option<i64>,
    #[serde(default)]
    log_filter: Option<String>,
}

/// Petsite configuration (resolved view of settings)
#[derive(Debug, Clone)]
pub struct Config {
    /// Minimum password length accepted at sign-up and reset
    pub min_password_length: usize,
    /// Username shown for a signed-in identity with no profile and no display name
    pub fallback_username: String,
    /// Lifetime of password reset and email verification codes
    pub action_token_ttl_minutes: i64,
    /// `tracing` filter directive for diagnostic output
    pub log_filter: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            min_password_length: DEFAULT_MIN_PASSWORD_LENGTH,
            fallback_username: DEFAULT_FALLBACK_USERNAME.to_string(),
            action_token_ttl_minutes: DEFAULT_ACTION_TOKEN_TTL_MINUTES,
            log_filter: DEFAULT_LOG_FILTER.to_string(),
        }
    }
}

impl Config {
    /// Load config from the petsite directory
    ///
    /// A missing or unreadable settings file yields the defaults. The log
    /// filter can be overridden with `PETSITE_LOG`. An action token lifetime
    /// above [`MAX_ACTION_TOKEN_TTL_MINUTES`] is rejected.
    pub fn load(petsite_dir: &Path) -> Result<Self> {
        let raw = read_settings(petsite_dir)?;
        let defaults = Config::default();

        if let Some(ttl) = raw.app.action_token_ttl_minutes {
            if ttl > MAX_ACTION_TOKEN_TTL_MINUTES {
                return Err(Error::config(format!(
                    "actionTokenTtlMinutes must be at most {} (got {})",
                    MAX_ACTION_TOKEN_TTL_MINUTES, ttl
                ))
                .into());
            }
        }

        let log_filter = std::env::var(LOG_ENV)
            .ok()
            .filter(|v| !v.trim().is_empty())
            .or(raw.app.log_filter)
            .unwrap_or(defaults.log_filter);

        Ok(Self {
            min_password_length: raw
                .app
                .min_password_length
                .filter(|n| *n > 0)
                .unwrap_or(defaults.min_password_length),
            fallback_username: raw
                .app
                .fallback_username
                .filter(|u| !u.trim().is_empty())
                .unwrap_or(defaults.fallback_username),
            action_token_ttl_minutes: raw
                .app
                .action_token_ttl_minutes
                .filter(|m| *m > 0)
                .unwrap_or(defaults.action_token_ttl_minutes),
            log_filter,
        })
    }
}

fn read_settings(petsite_dir: &Path) -> Result<SettingsFile> {
    let settings_path = petsite_dir.join("settings.json");
    if !settings_path.exists() {
        return Ok(SettingsFile::default());
    }
    let content = std::fs::read_to_string(&settings_path)?;
    Ok(serde_json::from_str(&content).unwrap_or_default())
}

/// Resolve the data directory: `PETSITE_DIR`, else `~/.petsite`
pub fn default_dir() -> PathBuf {
    if let Ok(dir) = std::env::var(DIR_ENV) {
        if !dir.trim().is_empty() {
            return PathBuf::from(dir);
        }
    }
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".petsite")
}
