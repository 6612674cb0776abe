//! Repository implementations for SQLite storage

pub mod account;
pub mod store;

pub use account::SqliteAccountDirectory;
pub use store::SqliteExpiringStore;

use std::sync::Arc;

use async_trait::async_trait;
use sqlx::SqlitePool;
use tollgate_core::{
    Clock, Error,
    error::StorageError,
    repositories::{AccountDirectoryProvider, ExpiringStoreProvider, RepositoryProvider},
};

use crate::migrations::{self, SqliteMigrationManager};

/// Repository provider implementation for SQLite
pub struct SqliteRepositoryProvider {
    pool: SqlitePool,
    store: SqliteExpiringStore,
    accounts: SqliteAccountDirectory,
}

impl SqliteRepositoryProvider {
    /// Entry expiry is evaluated against `clock`.
    pub fn new(pool: SqlitePool, clock: Arc<dyn Clock>) -> Self {
        Self {
            store: SqliteExpiringStore::new(pool.clone(), clock),
            accounts: SqliteAccountDirectory::new(pool.clone()),
            pool,
        }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

impl ExpiringStoreProvider for SqliteRepositoryProvider {
    type Store = SqliteExpiringStore;

    fn store(&self) -> &Self::Store {
        &self.store
    }
}

impl AccountDirectoryProvider for SqliteRepositoryProvider {
    type Directory = SqliteAccountDirectory;

    fn accounts(&self) -> &Self::Directory {
        &self.accounts
    }
}

#[async_trait]
impl RepositoryProvider for SqliteRepositoryProvider {
    async fn migrate(&self) -> Result<(), Error> {
        let manager = SqliteMigrationManager::new(self.pool.clone());
        manager.initialize().await.map_err(|e| {
            tracing::error!(error = %e, "Failed to initialize migrations");
            StorageError::Migration("Failed to initialize migrations".to_string())
        })?;

        manager.up(&migrations::all()).await.map_err(|e| {
            tracing::error!(error = %e, "Failed to run migrations");
            StorageError::Migration("Failed to run migrations".to_string())
        })?;

        Ok(())
    }

    async fn health_check(&self) -> Result<(), Error> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| StorageError::Database(e.to_string()))?;
        Ok(())
    }
}
