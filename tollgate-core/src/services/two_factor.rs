//! TOTP second-factor service.
//!
//! Second factor is opt-in per account: an account is enrolled once it has a
//! secret in the [`AccountDirectory`]. Logins that resolve to no account, or
//! to an account without a secret, pass through unchecked.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::{
    Error,
    account::AccountId,
    clock::Clock,
    config::TotpConfig,
    error::TotpError,
    repositories::AccountDirectory,
    totp::{self, CurrentCode, TotpSecret},
};

/// What an administrator hands to the account owner after (re)generating a
/// secret.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Enrollment {
    pub secret_base32: String,
    /// `otpauth://` URI for QR enrollment
    pub provisioning_uri: String,
}

pub struct TwoFactorService<D: AccountDirectory> {
    accounts: Arc<D>,
    clock: Arc<dyn Clock>,
    config: TotpConfig,
}

impl<D: AccountDirectory> TwoFactorService<D> {
    pub fn new(accounts: Arc<D>, clock: Arc<dyn Clock>, config: TotpConfig) -> Self {
        Self {
            accounts,
            clock,
            config,
        }
    }

    pub fn config(&self) -> &TotpConfig {
        &self.config
    }

    /// Check the second factor for a submitted login.
    ///
    /// # Returns
    ///
    /// The account the login resolved to, if any. Unknown logins are not an
    /// error here; rejecting them is the password check's job.
    pub async fn verify_login(
        &self,
        login: &str,
        code: Option<&str>,
    ) -> Result<Option<AccountId>, Error> {
        let Some(account) = self.accounts.resolve_account(login).await? else {
            return Ok(None);
        };
        self.verify_account(&account, code).await?;
        Ok(Some(account))
    }

    /// Check `code` for `account`. Accounts without a secret always pass; a
    /// missing code for an enrolled account is rejected.
    pub async fn verify_account(&self, account: &AccountId, code: Option<&str>) -> Result<(), Error> {
        let Some(secret) = self.accounts.get_secret(account).await? else {
            return Ok(());
        };

        let submitted = code.unwrap_or_default();
        let valid = totp::verify_with(
            &secret,
            submitted,
            self.config.period,
            self.clock.now(),
            self.config.encoding,
        );

        if !valid {
            tracing::warn!(account = %account, "Invalid two-factor code");
            return Err(TotpError::InvalidCode.into());
        }
        Ok(())
    }

    pub async fn is_enrolled(&self, account: &AccountId) -> Result<bool, Error> {
        Ok(self.accounts.get_secret(account).await?.is_some())
    }

    /// Replace the secret of `account` with a fresh random one.
    ///
    /// `label` is the account name shown in authenticator apps, usually the
    /// login.
    pub async fn regenerate_secret(
        &self,
        account: &AccountId,
        label: &str,
    ) -> Result<Enrollment, Error> {
        let secret = TotpSecret::generate(self.config.secret_length)?;
        self.accounts.set_secret(account, &secret).await?;

        tracing::info!(account = %account, "Regenerated two-factor secret");

        Ok(Enrollment {
            secret_base32: secret.to_base32(),
            provisioning_uri: totp::provisioning_uri(label, &secret, &self.config.issuer),
        })
    }

    /// Store a secret supplied as Base32 text, e.g. when migrating accounts.
    pub async fn import_secret(&self, account: &AccountId, base32: &str) -> Result<(), Error> {
        let secret = TotpSecret::from_base32(base32)?;
        self.accounts.set_secret(account, &secret).await?;
        tracing::info!(account = %account, "Imported two-factor secret");
        Ok(())
    }

    /// Remove the secret of `account`, turning its second factor off.
    pub async fn delete_secret(&self, account: &AccountId) -> Result<bool, Error> {
        let removed = self.accounts.delete_secret(account).await?;
        tracing::info!(account = %account, removed = removed, "Deleted two-factor secret");
        Ok(removed)
    }

    /// The enrollment details of the existing secret, for showing the QR
    /// code again.
    pub async fn enrollment(
        &self,
        account: &AccountId,
        label: &str,
    ) -> Result<Option<Enrollment>, Error> {
        Ok(self
            .accounts
            .get_secret(account)
            .await?
            .map(|secret| Enrollment {
                secret_base32: secret.to_base32(),
                provisioning_uri: totp::provisioning_uri(label, &secret, &self.config.issuer),
            }))
    }

    /// The code valid right now for `account`, with its expiry.
    pub async fn current_code(&self, account: &AccountId) -> Result<Option<CurrentCode>, Error> {
        Ok(self.accounts.get_secret(account).await?.map(|secret| {
            totp::current_code(
                &secret,
                self.config.period,
                self.clock.now(),
                self.config.encoding,
            )
        }))
    }
}
