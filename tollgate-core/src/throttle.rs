//! Pure throttle decision engine.
//!
//! [`evaluate`] takes the ledger loaded for an identity, appends the current
//! attempt and classifies it. It performs no I/O; persisting the returned
//! ledger with the returned TTL is up to the caller (see
//! [`ThrottleService`](crate::services::ThrottleService)).
//!
//! Two independent checks run on every attempt:
//!
//! - **rate limit**: the gap since the previous record is shorter than
//!   `time_limit`
//! - **block**: after appending, the ledger holds `attempts_limit` or more
//!   records
//!
//! Both can fire at once. The block check runs last, so its outcome wins.
//!
//! The ledger never keeps more than `attempts_limit` records: past that
//! point extra records change no decision.

use chrono::Duration;
use serde::{Deserialize, Serialize};

use crate::{config::ThrottleConfig, error::ThrottleError, ledger::AttemptLedger};

/// Per-attempt classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    Allowed,
    RateLimited,
    Blocked,
}

impl Decision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Decision::Allowed)
    }
}

/// How the attempt reached the host.
///
/// Programmatic callers (RPC-style integrations) do not render an error
/// page, so a block is reported to them as a bare transport rejection.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Transport {
    #[default]
    Form,
    Programmatic,
}

/// Result of evaluating one attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Evaluation {
    pub decision: Decision,
    /// The rate-limit check fired
    pub rate_limited: bool,
    /// The block check fired
    pub blocked: bool,
    /// Seconds since the previous record, or `time_limit` when there was none
    pub time_difference: i64,
    /// Ledger with the current attempt appended, to be persisted
    pub ledger: AttemptLedger,
    /// How long the ledger should be kept
    pub ttl: Duration,
}

impl Evaluation {
    /// The rejection for this decision, if any.
    pub fn error(&self, config: &ThrottleConfig) -> Option<ThrottleError> {
        match self.decision {
            Decision::Allowed => None,
            Decision::RateLimited => Some(ThrottleError::RateLimited {
                time_limit: config.time_limit,
            }),
            Decision::Blocked => Some(ThrottleError::Blocked {
                block_period: config.block_period,
            }),
        }
    }

    /// The user-facing message for a rejection.
    pub fn message(&self, config: &ThrottleConfig) -> Option<String> {
        self.error(config).map(|e| e.to_string())
    }
}

/// Append an attempt by `login` at `now` to `ledger` and classify it.
pub fn evaluate(
    config: &ThrottleConfig,
    mut ledger: AttemptLedger,
    login: &str,
    now: i64,
) -> Evaluation {
    let time_limit = i64::try_from(config.time_limit).unwrap_or(i64::MAX);

    let time_difference = match ledger.last() {
        Some(last) => now.saturating_sub(last.timestamp),
        None => time_limit,
    };

    ledger.record(now, login);

    let limit = usize::try_from(config.attempts_limit).unwrap_or(usize::MAX);
    ledger.retain_latest(limit);
    let allow = ledger.len() < limit;

    let rate_limited = time_difference < time_limit;
    let blocked = !allow;

    let decision = if blocked {
        Decision::Blocked
    } else if rate_limited {
        Decision::RateLimited
    } else {
        Decision::Allowed
    };

    let ttl = if blocked {
        config.block_ttl()
    } else {
        config.retention_ttl()
    };

    Evaluation {
        decision,
        rate_limited,
        blocked,
        time_difference,
        ledger,
        ttl,
    }
}
