//! Store opening.
//!
//! One pool serves the daemon loop, every executor, and the API
//! handlers. Journal mode is WAL so status reads never block behind a
//! claim burst; synchronous is FULL because a claim/complete/fail is
//! acknowledged to callers the moment its CAS UPDATE commits, and that
//! commit must already be on disk (invariant: persistence precedes
//! action). Mid-phase workflow updates ride the same pool and stay
//! crash-consistent under WAL.

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::SqlitePool;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

use crate::domain::models::DatabaseConfig;

use super::migrations::{run_migrations, MigrationError};

/// Writers queue behind the WAL write lock; concurrent CAS transitions
/// back off this long before a busy error surfaces as a store error.
const BUSY_TIMEOUT: Duration = Duration::from_secs(30);

/// Executor transactions are short; waiting longer than this for a pool
/// connection means the store is wedged, not busy.
const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(3);

#[derive(Debug, Error)]
pub enum StoreOpenError {
    #[error("Failed to create store directory {path}: {source}")]
    CreateDirectory {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to open store: {0}")]
    Open(#[source] sqlx::Error),
    #[error(transparent)]
    Migrate(#[from] MigrationError),
}

/// Open (or create) the durable store at `config.path` and bring its
/// schema up to date. Parent directories are created as needed.
pub async fn open_store(config: &DatabaseConfig) -> Result<SqlitePool, StoreOpenError> {
    let path = Path::new(&config.path);
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent).map_err(|source| StoreOpenError::CreateDirectory {
                path: parent.display().to_string(),
                source,
            })?;
        }
    }

    let options = SqliteConnectOptions::new()
        .filename(path)
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .synchronous(SqliteSynchronous::Full)
        .busy_timeout(BUSY_TIMEOUT)
        .foreign_keys(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(config.max_connections)
        .acquire_timeout(ACQUIRE_TIMEOUT)
        .connect_with(options)
        .await
        .map_err(StoreOpenError::Open)?;

    run_migrations(&pool).await?;
    Ok(pool)
}

/// In-memory store with the schema applied, for tests and benches.
///
/// Durability settings are meaningless here; the single connection is
/// what keeps the database alive.
pub async fn open_memory_store() -> Result<SqlitePool, StoreOpenError> {
    let options = SqliteConnectOptions::new()
        .filename(":memory:")
        .shared_cache(true)
        .foreign_keys(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(options)
        .await
        .map_err(StoreOpenError::Open)?;

    run_migrations(&pool).await?;
    Ok(pool)
}
