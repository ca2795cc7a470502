//! Embedded schema migrations
//!
//! SQL files are compiled in with `include_str!` and applied by
//! [`crate::services::MigrationService`] in name order. Applied names are
//! recorded in `sys_migrations` of the database they ran against.
//!
//! To add a migration, create `NNN_description.sql` next to this file (or
//! under `log/` for the event log) and append it to the matching list.

/// Name of the bootstrap migration every set starts with
pub const BOOTSTRAP_MIGRATION: &str = "000_migrations.sql";

/// Migrations for `petsite.duckdb`
pub const MIGRATIONS: &[(&str, &str)] = &[
    (BOOTSTRAP_MIGRATION, include_str!("000_migrations.sql")),
    ("001_initial_schema.sql", include_str!("001_initial_schema.sql")),
    (
        "002_action_tokens_outbox.sql",
        include_str!("002_action_tokens_outbox.sql"),
    ),
];

/// Migrations for the event log database `logs.duckdb`
pub const LOG_MIGRATIONS: &[(&str, &str)] = &[
    (BOOTSTRAP_MIGRATION, include_str!("log/000_migrations.sql")),
    ("001_event_log.sql", include_str!("log/001_event_log.sql")),
];
