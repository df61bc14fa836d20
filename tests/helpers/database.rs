//! Database fixtures for integration tests.

use sqlx::SqlitePool;
use tempfile::TempDir;

use taskmill::adapters::sqlite::{open_memory_store, open_store};
use taskmill::domain::models::DatabaseConfig;

/// In-memory pool with the schema applied. Single connection; fine for
/// sequential access.
pub async fn setup_test_db() -> SqlitePool {
    open_memory_store().await.expect("failed to create test database")
}

/// File-backed pool for tests that need real cross-connection
/// concurrency (claim races, daemon restarts). The TempDir guard must
/// stay alive for the duration of the test.
pub async fn setup_file_db() -> (SqlitePool, TempDir) {
    let dir = TempDir::new().expect("failed to create temp dir");
    let config = DatabaseConfig {
        path: format!("{}/taskmill-test.db", dir.path().display()),
        max_connections: 10,
    };
    let pool = open_store(&config).await.expect("failed to open test database");
    (pool, dir)
}

pub async fn teardown_test_db(pool: SqlitePool) {
    pool.close().await;
}
