//! Adapter implementations
//!
//! Adapters implement the port traits with concrete technologies:
//! - DuckDB for the ProfileStore port (and the provider's own tables)
//! - Local accounts with Argon2 hashes for the IdentityProvider port
//! - A DuckDB outbox table for the Mailer port

pub mod duckdb;
pub mod local_identity;
pub mod outbox;
