//! Repository trait for the expiring key-value store.
//!
//! Attempt ledgers live in a store that forgets entries on its own once
//! their TTL runs out. Expiry is what lifts a block, so implementations must
//! never return an entry past its deadline.

use async_trait::async_trait;
use chrono::Duration;

use crate::Error;

/// One live entry returned by [`ExpiringStore::scan_prefix`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredEntry {
    pub key: String,
    pub value: Vec<u8>,
    /// Unix time after which the entry is gone
    pub expires_at: i64,
}

/// Key-value storage with per-entry time to live.
///
/// # Consistency
///
/// Callers that read, modify and write back an entry must serialise those
/// steps themselves; the store only guarantees that each call is atomic.
#[async_trait]
pub trait ExpiringStore: Send + Sync + 'static {
    /// Fetch a live entry.
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, Error>;

    /// Insert or replace an entry that expires `ttl` from now.
    async fn set(&self, key: &str, value: &[u8], ttl: Duration) -> Result<(), Error>;

    /// Remove an entry.
    ///
    /// # Returns
    ///
    /// `true` if a live entry was removed.
    async fn delete(&self, key: &str) -> Result<bool, Error>;

    /// All live entries whose key starts with `prefix`, in key order.
    async fn scan_prefix(&self, prefix: &str) -> Result<Vec<StoredEntry>, Error>;
}
