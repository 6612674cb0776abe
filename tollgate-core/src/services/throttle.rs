//! Attempt throttle service.
//!
//! Wraps the pure [`evaluate`] engine with persistence: for every attempt it
//! loads the identity's ledger from the [`ExpiringStore`], appends the
//! attempt, writes the ledger back with the TTL the engine chose, and
//! notifies the account owner when the attempt is blocked.
//!
//! # Concurrency
//!
//! The read-modify-write of one identity's ledger is serialised by a
//! per-identity async mutex, so parallel attempts from the same identity
//! within this process are all counted. Attempts from different identities
//! never wait on each other.
//!
//! # Example
//!
//! ```rust,ignore
//! use tollgate_core::services::ThrottleService;
//!
//! let outcome = service.check_attempt(&identity, "admin").await?;
//! outcome.into_result(Transport::Form)?;
//!
//! // ... verify the password and second factor ...
//!
//! service.record_success(&identity).await?;
//! ```

use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::{
    Error,
    clock::Clock,
    config::ThrottleConfig,
    error::ThrottleError,
    identity::ClientIdentity,
    ledger::{AttemptLedger, KEY_PREFIX, ledger_key},
    notify::Notifier,
    repositories::{AccountDirectory, ExpiringStore},
    throttle::{Decision, Evaluation, Transport, evaluate},
};

/// Dashboard listings show this many ledgers unless told otherwise.
pub const DEFAULT_RECENT_LIMIT: usize = 20;

/// What [`ThrottleService::check_attempt`] decided.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThrottleOutcome {
    pub identity: ClientIdentity,
    pub decision: Decision,
    /// Records in the ledger after this attempt
    pub attempts: usize,
    /// Seconds since the previous attempt
    pub time_difference: i64,
    /// Rejection to surface, `None` when allowed
    pub error: Option<ThrottleError>,
}

impl ThrottleOutcome {
    fn allowed(identity: &ClientIdentity) -> Self {
        Self {
            identity: identity.clone(),
            decision: Decision::Allowed,
            attempts: 0,
            time_difference: 0,
            error: None,
        }
    }

    fn from_evaluation(evaluation: &Evaluation, config: &ThrottleConfig) -> Self {
        Self {
            identity: evaluation.ledger.identity().clone(),
            decision: evaluation.decision,
            attempts: evaluation.ledger.len(),
            time_difference: evaluation.time_difference,
            error: evaluation.error(config),
        }
    }

    pub fn is_allowed(&self) -> bool {
        self.decision.is_allowed()
    }

    /// User-facing message for a rejection.
    pub fn message(&self) -> Option<String> {
        self.error.as_ref().map(ToString::to_string)
    }

    /// Turn the outcome into the error the host should act on.
    ///
    /// Blocked programmatic callers get [`ThrottleError::Forbidden`] instead
    /// of the user-facing block message.
    pub fn into_result(self, transport: Transport) -> Result<(), ThrottleError> {
        match (self.decision, transport) {
            (Decision::Blocked, Transport::Programmatic) => Err(ThrottleError::Forbidden),
            _ => match self.error {
                Some(error) => Err(error),
                None => Ok(()),
            },
        }
    }
}

/// Read-only view of one identity's ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityStatus {
    pub identity: ClientIdentity,
    pub attempts: usize,
    pub last_attempt_at: Option<DateTime<Utc>>,
    /// Whether the ledger currently holds enough records to block
    pub blocked: bool,
    /// Attempts left before the next one is blocked
    pub remaining_attempts: u32,
}

/// One row of the recent attempts listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecentAttempt {
    pub identity: ClientIdentity,
    pub login: String,
    pub attempted_at: DateTime<Utc>,
}

/// Service for throttling authentication attempts per client identity.
///
/// # Thread Safety
///
/// This service is thread-safe and can be shared across multiple tasks.
pub struct ThrottleService<S: ExpiringStore, D: AccountDirectory> {
    store: Arc<S>,
    accounts: Arc<D>,
    notifier: Arc<dyn Notifier>,
    clock: Arc<dyn Clock>,
    config: ThrottleConfig,
    locks: DashMap<ClientIdentity, Arc<Mutex<()>>>,
}

impl<S: ExpiringStore, D: AccountDirectory> ThrottleService<S, D> {
    /// Create a new ThrottleService.
    ///
    /// # Arguments
    ///
    /// * `store` - Where ledgers are persisted
    /// * `accounts` - Used to find the owner of a blocked login
    /// * `notifier` - Told about blocks when `notify_on_block` is set
    /// * `clock` - Source of attempt timestamps
    /// * `config` - Throttle limits
    pub fn new(
        store: Arc<S>,
        accounts: Arc<D>,
        notifier: Arc<dyn Notifier>,
        clock: Arc<dyn Clock>,
        config: ThrottleConfig,
    ) -> Self {
        Self {
            store,
            accounts,
            notifier,
            clock,
            config,
            locks: DashMap::new(),
        }
    }

    pub fn config(&self) -> &ThrottleConfig {
        &self.config
    }

    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    /// Record an authentication attempt by `login` from `identity` and
    /// classify it.
    ///
    /// The ledger is persisted whatever the decision. Rejections are
    /// reported in the returned outcome, not as `Err`; errors are reserved
    /// for an unusable identity and storage failures, which are never
    /// treated as an allowed attempt.
    pub async fn check_attempt(
        &self,
        identity: &ClientIdentity,
        login: &str,
    ) -> Result<ThrottleOutcome, Error> {
        if !self.config.enabled {
            return Ok(ThrottleOutcome::allowed(identity));
        }

        if identity.is_empty() {
            tracing::warn!(login = %login, "Refusing attempt with an unresolved client identity");
            return Err(ThrottleError::IdentityUnresolved.into());
        }

        let evaluation = {
            let _lock = self.lock_identity(identity).await;
            self.evaluate_and_store(identity, login).await?
        };

        let outcome = ThrottleOutcome::from_evaluation(&evaluation, &self.config);
        match outcome.decision {
            Decision::Allowed => {
                tracing::debug!(
                    identity = %identity,
                    login = %login,
                    attempts = outcome.attempts,
                    "Login attempt allowed"
                );
            }
            Decision::RateLimited => {
                tracing::warn!(
                    identity = %identity,
                    login = %login,
                    time_difference = outcome.time_difference,
                    "Login attempt rate limited"
                );
            }
            Decision::Blocked => {
                tracing::warn!(
                    identity = %identity,
                    login = %login,
                    attempts = outcome.attempts,
                    "Login attempt blocked"
                );
                if self.config.notify_on_block {
                    self.notify_owner(identity, login).await;
                }
            }
        }

        Ok(outcome)
    }

    /// Clear the ledger of `identity` after a login that passed every check.
    pub async fn record_success(&self, identity: &ClientIdentity) -> Result<(), Error> {
        if identity.is_empty() {
            return Ok(());
        }
        self.store.delete(&ledger_key(identity)).await?;
        Ok(())
    }

    /// Delete the ledger of `identity`, lifting any block on it.
    ///
    /// # Returns
    ///
    /// `true` if a ledger existed.
    pub async fn purge(&self, identity: &ClientIdentity) -> Result<bool, Error> {
        let removed = self.store.delete(&ledger_key(identity)).await?;
        tracing::info!(identity = %identity, removed = removed, "Purged attempt ledger");
        Ok(removed)
    }

    /// Inspect the ledger of `identity` without recording anything.
    pub async fn status(&self, identity: &ClientIdentity) -> Result<IdentityStatus, Error> {
        let ledger = self.load(identity).await?;
        let attempts = ledger.len();
        let limit = self.config.attempts_limit;
        let recorded = u32::try_from(attempts).unwrap_or(u32::MAX);

        Ok(IdentityStatus {
            identity: identity.clone(),
            attempts,
            last_attempt_at: ledger.last().and_then(|r| r.attempted_at()),
            blocked: self.config.enabled && recorded >= limit,
            // the attempt that reaches the limit is itself blocked
            remaining_attempts: limit.saturating_sub(recorded).saturating_sub(1),
        })
    }

    /// Flatten the most recently active ledgers into attempt rows.
    ///
    /// Ledgers are ordered by their latest attempt, newest first, and at
    /// most `limit` ledgers are included. Rows within a ledger keep their
    /// recorded order. Undecodable ledgers are skipped.
    pub async fn recent_attempts(&self, limit: usize) -> Result<Vec<RecentAttempt>, Error> {
        let entries = self.store.scan_prefix(KEY_PREFIX).await?;

        let mut ledgers: Vec<AttemptLedger> = entries
            .into_iter()
            .filter_map(|entry| match AttemptLedger::parse(&entry.value) {
                Ok(ledger) => ledger,
                Err(e) => {
                    tracing::warn!(key = %entry.key, error = %e, "Skipping unreadable ledger");
                    None
                }
            })
            .filter(|ledger| !ledger.is_empty())
            .collect();

        ledgers.sort_by_key(|ledger| {
            std::cmp::Reverse(ledger.last().map(|r| r.timestamp).unwrap_or(i64::MIN))
        });

        Ok(ledgers
            .iter()
            .take(limit)
            .flat_map(|ledger| {
                ledger.records().iter().filter_map(|record| {
                    Some(RecentAttempt {
                        identity: ledger.identity().clone(),
                        login: record.login.clone(),
                        attempted_at: record.attempted_at()?,
                    })
                })
            })
            .collect())
    }

    async fn load(&self, identity: &ClientIdentity) -> Result<AttemptLedger, Error> {
        match self.store.get(&ledger_key(identity)).await? {
            Some(bytes) => Ok(AttemptLedger::from_bytes(identity, &bytes)?),
            None => Ok(AttemptLedger::new(identity.clone())),
        }
    }

    async fn evaluate_and_store(
        &self,
        identity: &ClientIdentity,
        login: &str,
    ) -> Result<Evaluation, Error> {
        let ledger = self.load(identity).await?;
        let evaluation = evaluate(&self.config, ledger, login, self.clock.now());

        let bytes = evaluation.ledger.to_bytes()?;
        self.store
            .set(&ledger_key(identity), &bytes, evaluation.ttl)
            .await?;

        Ok(evaluation)
    }

    async fn notify_owner(&self, identity: &ClientIdentity, login: &str) {
        let account = match self.accounts.resolve_account(login).await {
            Ok(Some(account)) => account,
            Ok(None) => return,
            Err(e) => {
                tracing::warn!(login = %login, error = %e, "Failed to resolve blocked login");
                return;
            }
        };

        if let Err(e) = self.notifier.notify_block(&account, identity).await {
            tracing::warn!(
                account = %account,
                identity = %identity,
                error = %e,
                "Failed to send block notification"
            );
        }
    }

    /// Wait for exclusive access to the ledger of `identity`.
    async fn lock_identity(&self, identity: &ClientIdentity) -> IdentityLock<'_> {
        let mut held = IdentityLock {
            locks: &self.locks,
            identity: identity.clone(),
            guard: None,
        };
        let mutex = self
            .locks
            .entry(identity.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        held.guard = Some(mutex.lock_owned().await);
        held
    }
}

/// Exclusive access to one identity's ledger.
///
/// Dropping it, including when the attempt is cancelled while still waiting,
/// removes the identity's mutex from the map once nobody else refers to it.
struct IdentityLock<'a> {
    locks: &'a DashMap<ClientIdentity, Arc<Mutex<()>>>,
    identity: ClientIdentity,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for IdentityLock<'_> {
    fn drop(&mut self) {
        // the guard holds a handle to the mutex; release it before counting
        self.guard.take();
        self.locks
            .remove_if(&self.identity, |_, lock| Arc::strong_count(lock) == 1);
    }
}
