//! Repository trait for the host's account directory.

use async_trait::async_trait;

use crate::{Error, account::AccountId, totp::TotpSecret};

/// Lookup of accounts by login identifier, plus per-account TOTP secrets.
///
/// # Security Considerations
///
/// - `resolve_account` is called for every blocked attempt and every second
///   factor check, with attacker-chosen input. It must not leak whether an
///   account exists through anything but its return value.
/// - Secrets are stored raw. Backends that persist them should protect the
///   storage accordingly.
#[async_trait]
pub trait AccountDirectory: Send + Sync + 'static {
    /// Map a submitted login identifier to an account.
    async fn resolve_account(&self, login: &str) -> Result<Option<AccountId>, Error>;

    async fn get_secret(&self, account: &AccountId) -> Result<Option<TotpSecret>, Error>;

    /// Store `secret` for `account`, replacing any previous secret.
    async fn set_secret(&self, account: &AccountId, secret: &TotpSecret) -> Result<(), Error>;

    /// Remove the secret of `account`.
    ///
    /// # Returns
    ///
    /// `true` if the account had a secret.
    async fn delete_secret(&self, account: &AccountId) -> Result<bool, Error>;
}
