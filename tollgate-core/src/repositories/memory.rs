//! In-process repository implementations.
//!
//! Backed by [`DashMap`], these serve single-node deployments and tests.
//! Entry expiry is evaluated lazily against the injected [`Clock`] so that
//! tests can drive block expiry with a [`ManualClock`](crate::ManualClock).

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Duration;
use dashmap::DashMap;

use crate::{
    Error,
    account::AccountId,
    clock::{Clock, SystemClock},
    repositories::{
        AccountDirectory, AccountDirectoryProvider, ExpiringStore, ExpiringStoreProvider,
        RepositoryProvider, StoredEntry,
    },
    totp::TotpSecret,
};

#[derive(Debug, Clone)]
struct Entry {
    value: Vec<u8>,
    expires_at: i64,
}

impl Entry {
    fn is_live(&self, now: i64) -> bool {
        now < self.expires_at
    }
}

/// Expiring store held in memory.
pub struct MemoryStore {
    entries: DashMap<String, Entry>,
    clock: Arc<dyn Clock>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new(Arc::new(SystemClock))
    }
}

impl MemoryStore {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: DashMap::new(),
            clock,
        }
    }

    /// Drop every expired entry, returning how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = self.clock.now();
        let before = self.entries.len();
        self.entries.retain(|_, entry| entry.is_live(now));
        before - self.entries.len()
    }

    /// Number of entries held, including expired ones not yet purged.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl ExpiringStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, Error> {
        let now = self.clock.now();
        let value = self
            .entries
            .get(key)
            .and_then(|entry| entry.is_live(now).then(|| entry.value.clone()));

        if value.is_none() {
            self.entries.remove_if(key, |_, entry| !entry.is_live(now));
        }
        Ok(value)
    }

    async fn set(&self, key: &str, value: &[u8], ttl: Duration) -> Result<(), Error> {
        let expires_at = self.clock.now().saturating_add(ttl.num_seconds());
        self.entries.insert(
            key.to_string(),
            Entry {
                value: value.to_vec(),
                expires_at,
            },
        );
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool, Error> {
        let now = self.clock.now();
        Ok(self
            .entries
            .remove(key)
            .is_some_and(|(_, entry)| entry.is_live(now)))
    }

    async fn scan_prefix(&self, prefix: &str) -> Result<Vec<StoredEntry>, Error> {
        let now = self.clock.now();
        let mut entries: Vec<StoredEntry> = self
            .entries
            .iter()
            .filter(|item| item.key().starts_with(prefix) && item.value().is_live(now))
            .map(|item| StoredEntry {
                key: item.key().clone(),
                value: item.value().value.clone(),
                expires_at: item.value().expires_at,
            })
            .collect();

        entries.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(entries)
    }
}

/// Account directory held in memory.
#[derive(Default)]
pub struct MemoryAccountDirectory {
    logins: DashMap<String, AccountId>,
    secrets: DashMap<AccountId, TotpSecret>,
}

impl MemoryAccountDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an account reachable by its login and, optionally, its email.
    pub fn add_account(&self, account: &AccountId, login: &str, email: Option<&str>) {
        self.logins.insert(login.to_string(), account.clone());
        if let Some(email) = email {
            self.logins.insert(email.to_string(), account.clone());
        }
    }
}

#[async_trait]
impl AccountDirectory for MemoryAccountDirectory {
    async fn resolve_account(&self, login: &str) -> Result<Option<AccountId>, Error> {
        Ok(self.logins.get(login).map(|account| account.clone()))
    }

    async fn get_secret(&self, account: &AccountId) -> Result<Option<TotpSecret>, Error> {
        Ok(self.secrets.get(account).map(|secret| secret.clone()))
    }

    async fn set_secret(&self, account: &AccountId, secret: &TotpSecret) -> Result<(), Error> {
        self.secrets.insert(account.clone(), secret.clone());
        Ok(())
    }

    async fn delete_secret(&self, account: &AccountId) -> Result<bool, Error> {
        Ok(self.secrets.remove(account).is_some())
    }
}

/// Repository provider backed entirely by process memory.
pub struct MemoryRepositoryProvider {
    store: MemoryStore,
    accounts: MemoryAccountDirectory,
}

impl Default for MemoryRepositoryProvider {
    fn default() -> Self {
        Self::new(Arc::new(SystemClock))
    }
}

impl MemoryRepositoryProvider {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            store: MemoryStore::new(clock),
            accounts: MemoryAccountDirectory::new(),
        }
    }
}

impl ExpiringStoreProvider for MemoryRepositoryProvider {
    type Store = MemoryStore;

    fn store(&self) -> &Self::Store {
        &self.store
    }
}

impl AccountDirectoryProvider for MemoryRepositoryProvider {
    type Directory = MemoryAccountDirectory;

    fn accounts(&self) -> &Self::Directory {
        &self.accounts
    }
}

#[async_trait]
impl RepositoryProvider for MemoryRepositoryProvider {
    async fn migrate(&self) -> Result<(), Error> {
        Ok(())
    }

    async fn health_check(&self) -> Result<(), Error> {
        Ok(())
    }
}
