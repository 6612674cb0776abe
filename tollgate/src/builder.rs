//! Builder pattern for constructing Tollgate instances
//!
//! This module provides a type-safe builder for creating [`Tollgate`] instances
//! with compile-time validation of storage configuration.
//!
//! # Example
//!
//! ```rust,no_run
//! use tollgate::{ThrottleConfig, TollgateBuilder};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Build with SQLite and auto-migration
//!     let tollgate = TollgateBuilder::new()
//!         .with_sqlite("sqlite://tollgate.db?mode=rwc")
//!         .await?
//!         .with_throttle_config(ThrottleConfig {
//!             attempts_limit: 3,
//!             ..ThrottleConfig::default()
//!         })
//!         .apply_migrations(true)
//!         .build()
//!         .await?;
//!
//!     // Or keep everything in memory
//!     let tollgate = TollgateBuilder::new().with_memory().build().await?;
//!
//!     Ok(())
//! }
//! ```

use std::sync::Arc;

use tollgate_core::{
    Clock, IdentityResolver, LoggingNotifier, Notifier, SystemClock, ThrottleConfig, TotpConfig,
    repositories::{MemoryRepositoryProvider, RepositoryProvider},
};

use crate::Tollgate;

// ============================================================================
// Error Types
// ============================================================================

/// Errors that can occur when building a Tollgate instance.
#[derive(Debug, thiserror::Error)]
pub enum TollgateBuilderError {
    /// Failed to connect to storage backend
    #[error("Storage connection failed: {0}")]
    StorageConnection(String),

    /// Failed to run database migrations
    #[error("Migration failed: {0}")]
    Migration(String),

    /// Invalid configuration provided
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),
}

// ============================================================================
// Type-State Markers
// ============================================================================

/// Marker type indicating no storage has been configured yet.
///
/// This is the initial state of [`TollgateBuilder`].
pub struct NoStorage;

/// Marker type indicating storage has been configured.
pub struct WithStorage<R: RepositoryProvider> {
    repositories: Arc<R>,
}

// ============================================================================
// Builder Implementation
// ============================================================================

/// A type-safe builder for constructing [`Tollgate`] instances.
///
/// Storage must be chosen before anything else can be configured, which the
/// type state enforces at compile time.
///
/// # Type States
///
/// - [`NoStorage`]: Initial state, storage must be configured
/// - [`WithStorage<R>`]: Storage configured, ready to build or add more configuration
pub struct TollgateBuilder<Storage> {
    storage: Storage,
    clock: Arc<dyn Clock>,
    throttle_config: ThrottleConfig,
    totp_config: TotpConfig,
    notifier: Arc<dyn Notifier>,
    identity_resolver: IdentityResolver,
    apply_migrations: bool,
}

impl Default for TollgateBuilder<NoStorage> {
    fn default() -> Self {
        Self::new()
    }
}

impl TollgateBuilder<NoStorage> {
    /// Create a new builder with default configuration.
    ///
    /// # Defaults
    ///
    /// - Clock: system time
    /// - Throttle: enabled, 5 attempts, 5 second gap, blocked for a day
    /// - TOTP: 30 second period, 16 byte secrets
    /// - Notifier: [`LoggingNotifier`]
    /// - Apply migrations: false
    pub fn new() -> Self {
        Self {
            storage: NoStorage,
            clock: Arc::new(SystemClock),
            throttle_config: ThrottleConfig::default(),
            totp_config: TotpConfig::default(),
            notifier: Arc::new(LoggingNotifier),
            identity_resolver: IdentityResolver::default(),
            apply_migrations: false,
        }
    }

    /// Replace the clock used for attempt timestamps, codes and entry expiry.
    ///
    /// Set this before choosing storage: backends evaluate expiry against
    /// the clock they are created with.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Keep ledgers and secrets in process memory.
    pub fn with_memory(self) -> TollgateBuilder<WithStorage<MemoryRepositoryProvider>> {
        let repositories = Arc::new(MemoryRepositoryProvider::new(self.clock.clone()));
        self.with_storage(repositories)
    }

    /// Use an already constructed repository provider.
    pub fn with_provider<R: RepositoryProvider>(
        self,
        repositories: Arc<R>,
    ) -> TollgateBuilder<WithStorage<R>> {
        self.with_storage(repositories)
    }

    fn with_storage<R: RepositoryProvider>(
        self,
        repositories: Arc<R>,
    ) -> TollgateBuilder<WithStorage<R>> {
        TollgateBuilder {
            storage: WithStorage { repositories },
            clock: self.clock,
            throttle_config: self.throttle_config,
            totp_config: self.totp_config,
            notifier: self.notifier,
            identity_resolver: self.identity_resolver,
            apply_migrations: self.apply_migrations,
        }
    }
}

// ============================================================================
// Storage Configuration Methods (NoStorage -> WithStorage)
// ============================================================================

#[cfg(feature = "sqlite")]
impl TollgateBuilder<NoStorage> {
    /// Configure SQLite storage by connecting to the given URL.
    ///
    /// # Arguments
    ///
    /// * `url` - SQLite connection URL (e.g., "sqlite://path/to/db.sqlite?mode=rwc")
    ///
    /// # Example
    ///
    /// ```rust,no_run
    /// use tollgate::TollgateBuilder;
    ///
    /// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
    /// let tollgate = TollgateBuilder::new()
    ///     .with_sqlite("sqlite://tollgate.db?mode=rwc")
    ///     .await?
    ///     .build()
    ///     .await?;
    /// # Ok(())
    /// # }
    /// ```
    pub async fn with_sqlite(
        self,
        url: &str,
    ) -> Result<TollgateBuilder<WithStorage<crate::SqliteRepositoryProvider>>, TollgateBuilderError>
    {
        let storage = crate::SqliteStorage::connect(url)
            .await
            .map_err(|e| TollgateBuilderError::StorageConnection(e.to_string()))?;

        let repositories = Arc::new(storage.into_repository_provider(self.clock.clone()));
        Ok(self.with_storage(repositories))
    }

    /// Configure SQLite storage with an existing connection pool.
    ///
    /// Use this when you already have a SQLite connection pool and want to
    /// share it with Tollgate.
    ///
    /// # Example
    ///
    /// ```rust,no_run
    /// use tollgate::{SqlitePool, TollgateBuilder};
    ///
    /// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
    /// let pool = SqlitePool::connect("sqlite://tollgate.db?mode=rwc").await?;
    ///
    /// let tollgate = TollgateBuilder::new()
    ///     .with_sqlite_pool(pool)
    ///     .apply_migrations(true)
    ///     .build()
    ///     .await?;
    /// # Ok(())
    /// # }
    /// ```
    pub fn with_sqlite_pool(
        self,
        pool: crate::SqlitePool,
    ) -> TollgateBuilder<WithStorage<crate::SqliteRepositoryProvider>> {
        let repositories = Arc::new(crate::SqliteRepositoryProvider::new(
            pool,
            self.clock.clone(),
        ));
        self.with_storage(repositories)
    }
}

// ============================================================================
// Configuration Methods (available after storage is configured)
// ============================================================================

impl<R: RepositoryProvider> TollgateBuilder<WithStorage<R>> {
    /// Set the throttle limits.
    ///
    /// # Example
    ///
    /// ```rust,no_run
    /// use tollgate::{ThrottleConfig, TollgateBuilder};
    ///
    /// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
    /// let tollgate = TollgateBuilder::new()
    ///     .with_memory()
    ///     .with_throttle_config(ThrottleConfig {
    ///         attempts_limit: 3,
    ///         block_period: 3_600,
    ///         ..ThrottleConfig::default()
    ///     })
    ///     .build()
    ///     .await?;
    /// # Ok(())
    /// # }
    /// ```
    pub fn with_throttle_config(mut self, config: ThrottleConfig) -> Self {
        self.throttle_config = config;
        self
    }

    pub fn with_totp_config(mut self, config: TotpConfig) -> Self {
        self.totp_config = config;
        self
    }

    /// Set who is told about blocked attempts on a known account.
    ///
    /// Default: [`LoggingNotifier`]
    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }

    /// Set which request headers the client identity is read from.
    pub fn with_identity_resolver(mut self, resolver: IdentityResolver) -> Self {
        self.identity_resolver = resolver;
        self
    }

    /// Set whether to automatically apply database migrations during build.
    ///
    /// Default: false
    ///
    /// When `false`, call [`Tollgate::migrate`] manually after building.
    pub fn apply_migrations(mut self, apply: bool) -> Self {
        self.apply_migrations = apply;
        self
    }

    /// Build the Tollgate instance.
    ///
    /// Both configurations are validated first. If `apply_migrations(true)`
    /// was called, migrations are applied before returning.
    pub async fn build(self) -> Result<Tollgate<R>, TollgateBuilderError> {
        self.throttle_config
            .validate()
            .map_err(|e| TollgateBuilderError::InvalidConfiguration(e.to_string()))?;
        self.totp_config
            .validate()
            .map_err(|e| TollgateBuilderError::InvalidConfiguration(e.to_string()))?;

        if self.apply_migrations {
            self.storage
                .repositories
                .migrate()
                .await
                .map_err(|e| TollgateBuilderError::Migration(e.to_string()))?;
        }

        Ok(Tollgate::from_parts(
            self.storage.repositories,
            self.clock,
            self.throttle_config,
            self.totp_config,
            self.notifier,
            self.identity_resolver,
        ))
    }
}

#[cfg(test)]
mod tests {
    use tollgate_core::{ClientIdentity, ManualClock, repositories::ExpiringStoreProvider};

    use super::*;

    #[tokio::test]
    async fn test_build_with_memory() {
        let tollgate = TollgateBuilder::new().with_memory().build().await.unwrap();
        tollgate.health_check().await.unwrap();
        assert!(tollgate.throttle_config().enabled);
    }

    #[tokio::test]
    async fn test_invalid_throttle_config_is_rejected() {
        let result = TollgateBuilder::new()
            .with_memory()
            .with_throttle_config(ThrottleConfig {
                attempts_limit: 0,
                ..ThrottleConfig::default()
            })
            .build()
            .await;

        assert!(matches!(
            result,
            Err(TollgateBuilderError::InvalidConfiguration(_))
        ));
    }

    #[tokio::test]
    async fn test_invalid_totp_config_is_rejected() {
        let result = TollgateBuilder::new()
            .with_memory()
            .with_totp_config(TotpConfig {
                period: 0,
                ..TotpConfig::default()
            })
            .build()
            .await;

        assert!(matches!(
            result,
            Err(TollgateBuilderError::InvalidConfiguration(_))
        ));
    }

    #[tokio::test]
    async fn test_clock_reaches_storage() {
        let clock = ManualClock::new(1_000);
        let builder = TollgateBuilder::new()
            .with_clock(Arc::new(clock.clone()))
            .with_memory();
        let provider = builder.storage.repositories.clone();
        let tollgate = builder.build().await.unwrap();

        let identity = ClientIdentity::new("203.0.113.7");
        tollgate.check_attempt(&identity, "admin").await.unwrap();
        assert_eq!(provider.store().len(), 1);

        // past the one day retention
        clock.advance(86_400);
        assert_eq!(provider.store().purge_expired(), 1);
    }
}
