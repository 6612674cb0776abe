use std::sync::Arc;

use async_trait::async_trait;
use chrono::Duration;

use crate::{
    Error,
    account::AccountId,
    repositories::{AccountDirectory, ExpiringStore, RepositoryProvider, StoredEntry},
    totp::TotpSecret,
};

/// Adapter that wraps a RepositoryProvider and implements [`ExpiringStore`]
pub struct ExpiringStoreAdapter<R: RepositoryProvider> {
    provider: Arc<R>,
}

impl<R: RepositoryProvider> ExpiringStoreAdapter<R> {
    pub fn new(provider: Arc<R>) -> Self {
        Self { provider }
    }
}

#[async_trait]
impl<R: RepositoryProvider> ExpiringStore for ExpiringStoreAdapter<R> {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, Error> {
        self.provider.store().get(key).await
    }

    async fn set(&self, key: &str, value: &[u8], ttl: Duration) -> Result<(), Error> {
        self.provider.store().set(key, value, ttl).await
    }

    async fn delete(&self, key: &str) -> Result<bool, Error> {
        self.provider.store().delete(key).await
    }

    async fn scan_prefix(&self, prefix: &str) -> Result<Vec<StoredEntry>, Error> {
        self.provider.store().scan_prefix(prefix).await
    }
}

/// Adapter that wraps a RepositoryProvider and implements [`AccountDirectory`]
pub struct AccountDirectoryAdapter<R: RepositoryProvider> {
    provider: Arc<R>,
}

impl<R: RepositoryProvider> AccountDirectoryAdapter<R> {
    pub fn new(provider: Arc<R>) -> Self {
        Self { provider }
    }
}

#[async_trait]
impl<R: RepositoryProvider> AccountDirectory for AccountDirectoryAdapter<R> {
    async fn resolve_account(&self, login: &str) -> Result<Option<AccountId>, Error> {
        self.provider.accounts().resolve_account(login).await
    }

    async fn get_secret(&self, account: &AccountId) -> Result<Option<TotpSecret>, Error> {
        self.provider.accounts().get_secret(account).await
    }

    async fn set_secret(&self, account: &AccountId, secret: &TotpSecret) -> Result<(), Error> {
        self.provider.accounts().set_secret(account, secret).await
    }

    async fn delete_secret(&self, account: &AccountId) -> Result<bool, Error> {
        self.provider.accounts().delete_secret(account).await
    }
}
