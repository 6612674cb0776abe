//! Core functionality for tollgate
//!
//! Tollgate throttles authentication attempts per client identity and adds an
//! optional TOTP second factor per account.
//!
//! The building blocks, leaf first:
//!
//! - [`base32`] and [`totp`]: secret encoding and one-time codes
//! - [`identity`]: resolving the [`ClientIdentity`] an attempt is throttled under
//! - [`ledger`]: the per-identity record of recent attempts
//! - [`throttle`]: the pure decision engine over a ledger
//! - [`services`]: [`ThrottleService`] and [`TwoFactorService`], which persist
//!   state through the traits in [`repositories`]
//!
//! Storage backends implement [`repositories::RepositoryProvider`]. An
//! in-memory backend ships in [`repositories::memory`]; see
//! `tollgate-storage-sqlite` for SQLite.
pub mod account;
pub mod base32;
pub mod clock;
pub mod config;
pub mod crypto;
pub mod error;
pub mod identity;
pub mod ledger;
pub mod notify;
pub mod repositories;
pub mod services;
pub mod throttle;
pub mod totp;

pub use account::AccountId;
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{ThrottleConfig, TotpConfig};
pub use error::Error;
pub use identity::{ClientIdentity, IdentityResolver, RequestHeaders};
pub use ledger::{AttemptLedger, AttemptRecord};
pub use notify::{LoggingNotifier, Notifier};
pub use services::{ThrottleService, TwoFactorService};
pub use throttle::{Decision, Transport};
pub use totp::{CurrentCode, StepEncoding, TotpCode, TotpSecret};
