//! SQLite implementation of the account directory.

use async_trait::async_trait;
use sqlx::SqlitePool;
use tollgate_core::{
    AccountId, Error, TotpSecret, error::StorageError, repositories::AccountDirectory,
};

/// Accounts in the `accounts` table, secrets in `totp_secrets`.
///
/// A login identifier resolves against both the `login` and `email`
/// columns.
pub struct SqliteAccountDirectory {
    pool: SqlitePool,
}

impl SqliteAccountDirectory {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn create_account(
        &self,
        account: &AccountId,
        login: &str,
        email: Option<&str>,
    ) -> Result<(), Error> {
        sqlx::query("INSERT INTO accounts (id, login, email) VALUES (?, ?, ?)")
            .bind(account.as_str())
            .bind(login)
            .bind(email)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "Failed to create account");
                StorageError::Database("Failed to create account".to_string())
            })?;

        Ok(())
    }

    /// Delete an account together with its secret.
    pub async fn delete_account(&self, account: &AccountId) -> Result<(), Error> {
        sqlx::query("DELETE FROM accounts WHERE id = ?")
            .bind(account.as_str())
            .execute(&self.pool)
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "Failed to delete account");
                StorageError::Database("Failed to delete account".to_string())
            })?;

        Ok(())
    }
}

#[async_trait]
impl AccountDirectory for SqliteAccountDirectory {
    async fn resolve_account(&self, login: &str) -> Result<Option<AccountId>, Error> {
        let id = sqlx::query_scalar::<_, String>(
            "SELECT id FROM accounts WHERE login = ? OR email = ? ORDER BY login = ? DESC LIMIT 1",
        )
        .bind(login)
        .bind(login)
        .bind(login)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "Failed to resolve account");
            StorageError::Database("Failed to resolve account".to_string())
        })?;

        Ok(id.map(AccountId::from))
    }

    async fn get_secret(&self, account: &AccountId) -> Result<Option<TotpSecret>, Error> {
        let secret = sqlx::query_scalar::<_, Vec<u8>>(
            "SELECT secret FROM totp_secrets WHERE account_id = ?",
        )
        .bind(account.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "Failed to get secret");
            StorageError::Database("Failed to get secret".to_string())
        })?;

        Ok(secret.map(TotpSecret::from_bytes))
    }

    async fn set_secret(&self, account: &AccountId, secret: &TotpSecret) -> Result<(), Error> {
        sqlx::query(
            r#"
            INSERT INTO totp_secrets (account_id, secret, updated_at)
            VALUES (?, ?, unixepoch())
            ON CONFLICT(account_id) DO UPDATE SET
                secret = excluded.secret,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(account.as_str())
        .bind(secret.as_bytes())
        .execute(&self.pool)
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "Failed to set secret");
            StorageError::Database("Failed to set secret".to_string())
        })?;

        Ok(())
    }

    async fn delete_secret(&self, account: &AccountId) -> Result<bool, Error> {
        let result = sqlx::query("DELETE FROM totp_secrets WHERE account_id = ?")
            .bind(account.as_str())
            .execute(&self.pool)
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "Failed to delete secret");
                StorageError::Database("Failed to delete secret".to_string())
            })?;

        Ok(result.rows_affected() > 0)
    }
}
