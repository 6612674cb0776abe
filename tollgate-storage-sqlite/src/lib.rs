//! SQLite storage backend for tollgate.
//!
//! Attempt ledgers go to a `kv_entries` table with an `expires_at` column;
//! accounts and their TOTP secrets go to `accounts` and `totp_secrets`.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use tollgate_core::{SystemClock, repositories::RepositoryProvider};
//! use tollgate_storage_sqlite::SqliteStorage;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let storage = SqliteStorage::connect("sqlite://tollgate.db?mode=rwc").await?;
//! let provider = storage.into_repository_provider(Arc::new(SystemClock));
//! provider.migrate().await?;
//! # Ok(())
//! # }
//! ```
pub mod migrations;
pub mod repositories;

use std::sync::Arc;

pub use repositories::{SqliteAccountDirectory, SqliteExpiringStore, SqliteRepositoryProvider};
pub use sqlx::SqlitePool;

use tollgate_core::{Clock, Error, error::StorageError};

/// A connected SQLite pool, not yet bound to a clock.
pub struct SqliteStorage {
    pool: SqlitePool,
}

impl SqliteStorage {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn connect(url: &str) -> Result<Self, Error> {
        let pool = SqlitePool::connect(url).await.map_err(|e| {
            tracing::error!(error = %e, "Failed to connect to SQLite");
            StorageError::Connection(e.to_string())
        })?;
        Ok(Self::new(pool))
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub fn into_repository_provider(self, clock: Arc<dyn Clock>) -> SqliteRepositoryProvider {
        SqliteRepositoryProvider::new(self.pool, clock)
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use sqlx::sqlite::SqlitePoolOptions;

    use super::*;

    /// A single-connection in-memory pool; every connection to
    /// `sqlite::memory:` would otherwise open its own empty database.
    pub async fn memory_pool() -> SqlitePool {
        let _ = tracing_subscriber::fmt().try_init();
        SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap()
    }

    pub async fn migrated_provider(clock: Arc<dyn Clock>) -> SqliteRepositoryProvider {
        use tollgate_core::repositories::RepositoryProvider;

        let provider = SqliteRepositoryProvider::new(memory_pool().await, clock);
        provider.migrate().await.unwrap();
        provider
    }
}
