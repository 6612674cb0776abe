//! SQLite implementation of the expiring store.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Duration;
use sqlx::SqlitePool;
use tollgate_core::{
    Clock, Error,
    error::StorageError,
    repositories::{ExpiringStore, StoredEntry},
};

/// Expiring key-value entries in the `kv_entries` table.
///
/// Expired rows are filtered out on every read and physically removed by
/// [`purge_expired`](Self::purge_expired).
pub struct SqliteExpiringStore {
    pool: SqlitePool,
    clock: Arc<dyn Clock>,
}

impl SqliteExpiringStore {
    pub fn new(pool: SqlitePool, clock: Arc<dyn Clock>) -> Self {
        Self { pool, clock }
    }

    /// Delete every expired row, returning how many were removed.
    pub async fn purge_expired(&self) -> Result<u64, Error> {
        let result = sqlx::query("DELETE FROM kv_entries WHERE expires_at <= ?")
            .bind(self.clock.now())
            .execute(&self.pool)
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "Failed to purge expired entries");
                StorageError::Database("Failed to purge expired entries".to_string())
            })?;

        Ok(result.rows_affected())
    }
}

#[derive(Debug, sqlx::FromRow)]
struct SqliteEntry {
    key: String,
    value: Vec<u8>,
    expires_at: i64,
}

impl From<SqliteEntry> for StoredEntry {
    fn from(row: SqliteEntry) -> Self {
        StoredEntry {
            key: row.key,
            value: row.value,
            expires_at: row.expires_at,
        }
    }
}

#[async_trait]
impl ExpiringStore for SqliteExpiringStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, Error> {
        let value = sqlx::query_scalar::<_, Vec<u8>>(
            "SELECT value FROM kv_entries WHERE key = ? AND expires_at > ?",
        )
        .bind(key)
        .bind(self.clock.now())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            tracing::error!(error = %e, key = %key, "Failed to read entry");
            StorageError::Database("Failed to read entry".to_string())
        })?;

        Ok(value)
    }

    async fn set(&self, key: &str, value: &[u8], ttl: Duration) -> Result<(), Error> {
        let expires_at = self.clock.now().saturating_add(ttl.num_seconds());

        sqlx::query(
            r#"
            INSERT INTO kv_entries (key, value, expires_at)
            VALUES (?, ?, ?)
            ON CONFLICT(key) DO UPDATE SET
                value = excluded.value,
                expires_at = excluded.expires_at
            "#,
        )
        .bind(key)
        .bind(value)
        .bind(expires_at)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            tracing::error!(error = %e, key = %key, "Failed to write entry");
            StorageError::Database("Failed to write entry".to_string())
        })?;

        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool, Error> {
        let expires_at = sqlx::query_scalar::<_, i64>(
            "DELETE FROM kv_entries WHERE key = ? RETURNING expires_at",
        )
        .bind(key)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            tracing::error!(error = %e, key = %key, "Failed to delete entry");
            StorageError::Database("Failed to delete entry".to_string())
        })?;

        let now = self.clock.now();
        Ok(expires_at.is_some_and(|expires_at| expires_at > now))
    }

    async fn scan_prefix(&self, prefix: &str) -> Result<Vec<StoredEntry>, Error> {
        // substr keeps `_` and `%` in the prefix literal, unlike LIKE
        let rows = sqlx::query_as::<_, SqliteEntry>(
            r#"
            SELECT key, value, expires_at
            FROM kv_entries
            WHERE substr(key, 1, ?) = ? AND expires_at > ?
            ORDER BY key
            "#,
        )
        .bind(prefix.chars().count() as i64)
        .bind(prefix)
        .bind(self.clock.now())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            tracing::error!(error = %e, prefix = %prefix, "Failed to scan entries");
            StorageError::Database("Failed to scan entries".to_string())
        })?;

        Ok(rows.into_iter().map(StoredEntry::from).collect())
    }
}
