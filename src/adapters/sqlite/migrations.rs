//! Embedded schema migrations.
//!
//! The schema ships inside the binary as an append-only table of
//! versioned SQL scripts. Each script runs once; applied versions are
//! recorded in `schema_migrations` so a restart (or an old binary
//! against a newer file) never re-runs or skips anything.

use sqlx::SqlitePool;
use thiserror::Error;
use tracing::debug;

/// Versioned migration scripts, oldest first. Schema changes append
/// here; versions are never renumbered.
const MIGRATIONS: &[(i64, &str)] =
    &[(1, include_str!("../../../migrations/001_initial_schema.sql"))];

#[derive(Debug, Error)]
pub enum MigrationError {
    #[error("Failed to prepare migration bookkeeping: {0}")]
    Setup(#[source] sqlx::Error),
    #[error("Failed to read schema version: {0}")]
    Version(#[source] sqlx::Error),
    #[error("Migration {version} failed: {source}")]
    Apply {
        version: i64,
        #[source]
        source: sqlx::Error,
    },
}

/// Apply every migration newer than the stored schema version.
pub async fn run_migrations(pool: &SqlitePool) -> Result<(), MigrationError> {
    sqlx::query(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version INTEGER PRIMARY KEY,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        )",
    )
    .execute(pool)
    .await
    .map_err(MigrationError::Setup)?;

    let (current,): (i64,) =
        sqlx::query_as("SELECT COALESCE(MAX(version), 0) FROM schema_migrations")
            .fetch_one(pool)
            .await
            .map_err(MigrationError::Version)?;

    for &(version, sql) in MIGRATIONS.iter().filter(|(version, _)| *version > current) {
        sqlx::raw_sql(sql)
            .execute(pool)
            .await
            .map_err(|source| MigrationError::Apply { version, source })?;

        sqlx::query("INSERT INTO schema_migrations (version) VALUES (?)")
            .bind(version)
            .execute(pool)
            .await
            .map_err(|source| MigrationError::Apply { version, source })?;

        debug!(version, "Applied schema migration");
    }

    Ok(())
}
