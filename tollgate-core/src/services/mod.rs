//! Service layer
//!
//! Services own the I/O around the pure engines: they load and persist
//! ledgers, look up accounts and secrets, and emit the structured log events.

pub mod throttle;
pub mod two_factor;

pub use throttle::{
    DEFAULT_RECENT_LIMIT, IdentityStatus, RecentAttempt, ThrottleOutcome, ThrottleService,
};
pub use two_factor::{Enrollment, TwoFactorService};
