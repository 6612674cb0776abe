//! Repository traits for the data access layer
//!
//! Services never talk to a database directly. They go through two
//! repository traits:
//!
//! - [`ExpiringStore`] holds attempt ledgers with a time to live
//! - [`AccountDirectory`] maps logins to accounts and stores TOTP secrets
//!
//! A storage backend exposes both through the provider traits below and
//! adds lifecycle methods via [`RepositoryProvider`].

pub mod account;
pub mod adapter;
pub mod memory;
pub mod store;

pub use account::AccountDirectory;
pub use adapter::{AccountDirectoryAdapter, ExpiringStoreAdapter};
pub use memory::{MemoryAccountDirectory, MemoryRepositoryProvider, MemoryStore};
pub use store::{ExpiringStore, StoredEntry};

use async_trait::async_trait;

use crate::Error;

/// Provider trait for expiring store access.
pub trait ExpiringStoreProvider: Send + Sync + 'static {
    /// The store implementation type
    type Store: ExpiringStore;

    /// Get the store
    fn store(&self) -> &Self::Store;
}

/// Provider trait for account directory access.
pub trait AccountDirectoryProvider: Send + Sync + 'static {
    /// The directory implementation type
    type Directory: AccountDirectory;

    /// Get the directory
    fn accounts(&self) -> &Self::Directory;
}

/// Provider trait that storage backends implement to serve every repository.
///
/// # Example
///
/// ```rust,ignore
/// use tollgate_core::repositories::*;
///
/// struct MyStorage { /* ... */ }
///
/// impl ExpiringStoreProvider for MyStorage {
///     type Store = MyStore;
///     fn store(&self) -> &Self::Store { &self.store }
/// }
///
/// // ... AccountDirectoryProvider ...
///
/// #[async_trait]
/// impl RepositoryProvider for MyStorage {
///     async fn migrate(&self) -> Result<(), Error> { /* ... */ }
///     async fn health_check(&self) -> Result<(), Error> { /* ... */ }
/// }
/// ```
#[async_trait]
pub trait RepositoryProvider: ExpiringStoreProvider + AccountDirectoryProvider {
    /// Run migrations for all repositories
    async fn migrate(&self) -> Result<(), Error>;

    /// Health check for all repositories
    async fn health_check(&self) -> Result<(), Error>;
}
