//! Doctor service - data health checks

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Serialize;
use serde_json::json;

use crate::adapters::duckdb::DuckDbRepository;
use crate::domain::profile::has_keyed_pets;
use crate::domain::result::Result;
use crate::domain::Profile;

/// Doctor service for health checks
pub struct DoctorService {
    repository: Arc<DuckDbRepository>,
}

impl DoctorService {
    pub fn new(repository: Arc<DuckDbRepository>) -> Self {
        Self { repository }
    }

    /// Run all health checks
    pub fn run_checks(&self) -> Result<DoctorResult> {
        let mut checks = BTreeMap::new();

        let (_, pending) = self.repository.migration_status()?;
        checks.insert(
            "schema_migrations".to_string(),
            if pending.is_empty() {
                CheckResult::pass("All migrations applied")
            } else {
                CheckResult::new(
                    CheckStatus::Error,
                    format!("{} migration(s) pending", pending.len()),
                    pending.iter().map(|m| json!({ "migration": m })).collect(),
                )
            },
        );

        // Registration writes the identity first, so a failed profile write leaves one behind
        let missing = self.repository.identities_without_profile()?;
        checks.insert(
            "missing_profiles".to_string(),
            if missing.is_empty() {
                CheckResult::pass("Every identity has a profile")
            } else {
                CheckResult::new(
                    CheckStatus::Warning,
                    format!("{} identity(ies) have no profile document", missing.len()),
                    missing.iter().map(|id| json!({ "user_id": id })).collect(),
                )
            },
        );

        let mut unreadable = Vec::new();
        let mut multiple_featured = Vec::new();
        let mut keyed = Vec::new();
        for (id, document) in self.repository.list_profile_documents()? {
            if has_keyed_pets(&document) {
                keyed.push(json!({ "user_id": id }));
            }
            match Profile::from_document(id.as_str(), 0, &document) {
                Ok(profile) => {
                    let featured: Vec<&str> = profile
                        .pets
                        .iter()
                        .filter(|p| p.featured)
                        .map(|p| p.pet_name.as_str())
                        .collect();
                    if featured.len() > 1 {
                        multiple_featured.push(json!({ "user_id": id, "featured": featured }));
                    }
                }
                Err(e) => unreadable.push(json!({ "user_id": id, "error": e.to_string() })),
            }
        }

        checks.insert(
            "unreadable_profiles".to_string(),
            if unreadable.is_empty() {
                CheckResult::pass("All profile documents parse")
            } else {
                CheckResult::new(
                    CheckStatus::Error,
                    format!("{} profile document(s) cannot be read", unreadable.len()),
                    unreadable,
                )
            },
        );
        checks.insert(
            "featured_pets".to_string(),
            if multiple_featured.is_empty() {
                CheckResult::pass("No profile features more than one pet")
            } else {
                CheckResult::new(
                    CheckStatus::Error,
                    format!(
                        "{} profile(s) feature more than one pet",
                        multiple_featured.len()
                    ),
                    multiple_featured,
                )
            },
        );
        checks.insert(
            "pet_collection_shape".to_string(),
            if keyed.is_empty() {
                CheckResult::pass("All pet collections are lists")
            } else {
                CheckResult::new(
                    CheckStatus::Warning,
                    format!(
                        "{} profile(s) store pets as a keyed object (read as a list)",
                        keyed.len()
                    ),
                    keyed,
                )
            },
        );

        let count = |status: CheckStatus| checks.values().filter(|c| c.status == status).count();
        let summary = DoctorSummary {
            passed: count(CheckStatus::Pass),
            warnings: count(CheckStatus::Warning),
            errors: count(CheckStatus::Error),
        };

        Ok(DoctorResult { checks, summary })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckStatus {
    Pass,
    Warning,
    Error,
}

#[derive(Debug, Serialize)]
pub struct DoctorResult {
    pub checks: BTreeMap<String, CheckResult>,
    pub summary: DoctorSummary,
}

impl DoctorResult {
    pub fn is_healthy(&self) -> bool {
        self.summary.errors == 0
    }
}

#[derive(Debug, Serialize)]
pub struct CheckResult {
    pub status: CheckStatus,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Vec<serde_json::Value>>,
}

impl CheckResult {
    fn pass(message: impl Into<String>) -> Self {
        Self {
            status: CheckStatus::Pass,
            message: message.into(),
            details: None,
        }
    }

    fn new(status: CheckStatus, message: String, details: Vec<serde_json::Value>) -> Self {
        Self {
            status,
            message,
            details: Some(details),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct DoctorSummary {
    pub passed: usize,
    pub warnings: usize,
    pub errors: usize,
}
