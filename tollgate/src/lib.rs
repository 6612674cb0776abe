//! # Tollgate
//!
//! Tollgate guards a login form. Every authentication attempt is recorded
//! against the client identity it came from; identities that try too fast
//! are rate limited and identities that try too often are blocked for a
//! while. Accounts that have a TOTP secret must also present the current
//! one-time code.
//!
//! Tollgate never sees passwords. The host checks the password itself and
//! hands the verdict to [`Tollgate::login`], which runs the throttle before
//! the verdict is looked at and the second factor after it.
//!
//! ## Storage Support
//!
//! - In memory (always available)
//! - SQLite (`sqlite` feature, on by default)
//!
//! ## Example
//!
//! ```rust,no_run
//! use tollgate::{LoginAttempt, PasswordVerdict, TollgateBuilder};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let tollgate = TollgateBuilder::new()
//!         .with_sqlite("sqlite://tollgate.db?mode=rwc")
//!         .await?
//!         .apply_migrations(true)
//!         .build()
//!         .await?;
//!
//!     let attempt = LoginAttempt::new("admin").with_remote_addr("203.0.113.7");
//!     match tollgate.login(&attempt, PasswordVerdict::Accepted, Some("123456")).await {
//!         Ok(granted) => println!("welcome {:?}", granted.account),
//!         Err(e) if e.is_transport_rejection() => { /* answer 403 with no body */ }
//!         Err(e) => println!("{e}"),
//!     }
//!
//!     Ok(())
//! }
//! ```
pub mod builder;

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tollgate_core::{
    repositories::{AccountDirectoryAdapter, ExpiringStoreAdapter},
    services::{
        DEFAULT_RECENT_LIMIT, Enrollment, IdentityStatus, RecentAttempt, ThrottleOutcome,
        ThrottleService, TwoFactorService,
    },
};

pub use builder::{NoStorage, TollgateBuilder, TollgateBuilderError, WithStorage};

/// Re-export core types from tollgate_core
///
/// These types are commonly used when working with the Tollgate API.
pub use tollgate_core::{
    AccountId, ClientIdentity, Clock, CurrentCode, Decision, Error, IdentityResolver,
    LoggingNotifier, ManualClock, Notifier, RequestHeaders, StepEncoding, SystemClock,
    ThrottleConfig, TotpConfig, Transport,
    error::{AuthError, StorageError, ThrottleError, TotpError, ValidationError},
    repositories::{MemoryRepositoryProvider, RepositoryProvider},
};

/// Re-export storage backends
///
/// These storage implementations are available when the corresponding feature is enabled.
#[cfg(feature = "sqlite")]
pub use tollgate_storage_sqlite::{SqlitePool, SqliteRepositoryProvider, SqliteStorage};

/// One submitted login form, as seen by the host.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoginAttempt {
    /// Username or email exactly as submitted
    pub login: String,
    pub headers: RequestHeaders,
    /// Address of the directly connected peer
    pub remote_addr: Option<String>,
    pub transport: Transport,
}

impl LoginAttempt {
    pub fn new(login: impl Into<String>) -> Self {
        Self {
            login: login.into(),
            ..Self::default()
        }
    }

    pub fn with_headers(mut self, headers: RequestHeaders) -> Self {
        self.headers = headers;
        self
    }

    pub fn with_remote_addr(mut self, addr: impl Into<String>) -> Self {
        self.remote_addr = Some(addr.into());
        self
    }

    pub fn with_transport(mut self, transport: Transport) -> Self {
        self.transport = transport;
        self
    }
}

/// The host's own password check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PasswordVerdict {
    Accepted,
    Rejected,
}

/// A login that passed the throttle, the password check and the second factor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoginGranted {
    /// The account the login resolved to, `None` when the directory does not
    /// know it
    pub account: Option<AccountId>,
    pub identity: ClientIdentity,
}

/// The login pipeline over one storage backend.
///
/// Build it with [`TollgateBuilder`].
pub struct Tollgate<R: RepositoryProvider> {
    repositories: Arc<R>,
    throttle_service: Arc<ThrottleService<ExpiringStoreAdapter<R>, AccountDirectoryAdapter<R>>>,
    two_factor_service: Arc<TwoFactorService<AccountDirectoryAdapter<R>>>,
    identity_resolver: IdentityResolver,
}

impl<R: RepositoryProvider> Tollgate<R> {
    pub(crate) fn from_parts(
        repositories: Arc<R>,
        clock: Arc<dyn Clock>,
        throttle_config: ThrottleConfig,
        totp_config: TotpConfig,
        notifier: Arc<dyn Notifier>,
        identity_resolver: IdentityResolver,
    ) -> Self {
        let store = Arc::new(ExpiringStoreAdapter::new(repositories.clone()));
        let accounts = Arc::new(AccountDirectoryAdapter::new(repositories.clone()));

        Self {
            throttle_service: Arc::new(ThrottleService::new(
                store,
                accounts.clone(),
                notifier,
                clock.clone(),
                throttle_config,
            )),
            two_factor_service: Arc::new(TwoFactorService::new(accounts, clock, totp_config)),
            repositories,
            identity_resolver,
        }
    }

    /// Run migrations for all repositories
    pub async fn migrate(&self) -> Result<(), Error> {
        self.repositories.migrate().await
    }

    /// Health check for all repositories
    pub async fn health_check(&self) -> Result<(), Error> {
        self.repositories.health_check().await
    }

    pub fn repositories(&self) -> &Arc<R> {
        &self.repositories
    }

    pub fn throttle_config(&self) -> &ThrottleConfig {
        self.throttle_service.config()
    }

    pub fn totp_config(&self) -> &TotpConfig {
        self.two_factor_service.config()
    }

    /// The client identity an attempt is throttled under.
    pub fn resolve_identity(&self, attempt: &LoginAttempt) -> ClientIdentity {
        self.identity_resolver
            .resolve(&attempt.headers, attempt.remote_addr.as_deref())
    }

    /// Run one login attempt through the whole pipeline.
    ///
    /// 1. The attempt is recorded and throttled. Rate limited and blocked
    ///    attempts fail here whatever the password verdict; blocked
    ///    programmatic callers get [`ThrottleError::Forbidden`].
    /// 2. A rejected password fails with [`AuthError::InvalidCredentials`].
    /// 3. Enrolled accounts must present the current TOTP code.
    /// 4. The identity's ledger is cleared.
    ///
    /// # Errors
    ///
    /// Storage failures are returned as they are; they never let an attempt
    /// through.
    pub async fn login(
        &self,
        attempt: &LoginAttempt,
        verdict: PasswordVerdict,
        totp_code: Option<&str>,
    ) -> Result<LoginGranted, Error> {
        let identity = self.resolve_identity(attempt);

        self.throttle_service
            .check_attempt(&identity, &attempt.login)
            .await?
            .into_result(attempt.transport)?;

        if verdict == PasswordVerdict::Rejected {
            return Err(AuthError::InvalidCredentials.into());
        }

        let account = self
            .two_factor_service
            .verify_login(&attempt.login, totp_code)
            .await?;

        self.throttle_service.record_success(&identity).await?;
        tracing::debug!(identity = %identity, login = %attempt.login, "Login granted");

        Ok(LoginGranted { account, identity })
    }

    /// Record and classify an attempt without the rest of the pipeline.
    pub async fn check_attempt(
        &self,
        identity: &ClientIdentity,
        login: &str,
    ) -> Result<ThrottleOutcome, Error> {
        self.throttle_service.check_attempt(identity, login).await
    }

    /// Inspect the ledger of `identity`.
    pub async fn status(&self, identity: &ClientIdentity) -> Result<IdentityStatus, Error> {
        self.throttle_service.status(identity).await
    }

    /// Delete the ledger of `identity`, lifting any block on it.
    pub async fn purge(&self, identity: &ClientIdentity) -> Result<bool, Error> {
        self.throttle_service.purge(identity).await
    }

    /// The most recently active ledgers, flattened into attempt rows.
    ///
    /// `None` means [`DEFAULT_RECENT_LIMIT`] ledgers.
    pub async fn recent_attempts(&self, limit: Option<usize>) -> Result<Vec<RecentAttempt>, Error> {
        self.throttle_service
            .recent_attempts(limit.unwrap_or(DEFAULT_RECENT_LIMIT))
            .await
    }

    pub async fn is_enrolled(&self, account: &AccountId) -> Result<bool, Error> {
        self.two_factor_service.is_enrolled(account).await
    }

    /// Give `account` a fresh TOTP secret.
    pub async fn regenerate_secret(
        &self,
        account: &AccountId,
        label: &str,
    ) -> Result<Enrollment, Error> {
        self.two_factor_service
            .regenerate_secret(account, label)
            .await
    }

    pub async fn import_secret(&self, account: &AccountId, base32: &str) -> Result<(), Error> {
        self.two_factor_service.import_secret(account, base32).await
    }

    /// Turn the second factor of `account` off.
    pub async fn delete_secret(&self, account: &AccountId) -> Result<bool, Error> {
        self.two_factor_service.delete_secret(account).await
    }

    pub async fn enrollment(
        &self,
        account: &AccountId,
        label: &str,
    ) -> Result<Option<Enrollment>, Error> {
        self.two_factor_service.enrollment(account, label).await
    }

    pub async fn current_code(&self, account: &AccountId) -> Result<Option<CurrentCode>, Error> {
        self.two_factor_service.current_code(account).await
    }
}

pub mod services {
    //! Service-level types returned by [`Tollgate`](crate::Tollgate).
    pub use tollgate_core::services::{
        DEFAULT_RECENT_LIMIT, Enrollment, IdentityStatus, RecentAttempt, ThrottleOutcome,
    };
}
