//! Block notifications.
//!
//! When an attempt is blocked and the submitted login belongs to a known
//! account, the throttle tells a [`Notifier`]. Delivery is best effort: a
//! failing notifier is logged and never changes the decision.

use async_trait::async_trait;

use crate::{Error, account::AccountId, identity::ClientIdentity};

#[async_trait]
pub trait Notifier: Send + Sync + 'static {
    /// Tell the owner of `account` that `identity` has been blocked after
    /// too many attempts on their login.
    async fn notify_block(&self, account: &AccountId, identity: &ClientIdentity)
    -> Result<(), Error>;
}

/// Emits a `warn` event instead of contacting anyone.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingNotifier;

#[async_trait]
impl Notifier for LoggingNotifier {
    async fn notify_block(
        &self,
        account: &AccountId,
        identity: &ClientIdentity,
    ) -> Result<(), Error> {
        tracing::warn!(
            account = %account,
            identity = %identity,
            "Blocked login attempts on account"
        );
        Ok(())
    }
}
