//! Configuration values for the throttle and the TOTP engine.
//!
//! Both structs are plain values: build them once (by hand or by
//! deserializing them from whatever configuration source the host uses) and
//! pass them to the services. Nothing in tollgate reads global settings.

use chrono::Duration;
use serde::{Deserialize, Serialize};

use crate::{error::ValidationError, totp::StepEncoding};

/// Configuration for the attempt throttle.
///
/// # Example
///
/// ```rust
/// use tollgate_core::ThrottleConfig;
///
/// let config = ThrottleConfig {
///     attempts_limit: 3,
///     ..ThrottleConfig::default()
/// };
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ThrottleConfig {
    /// Whether throttling is active at all
    pub enabled: bool,
    /// Minimum gap in seconds between two attempts from one identity
    pub time_limit: u64,
    /// Number of ledger records at which an identity is blocked
    pub attempts_limit: u32,
    /// Seconds a blocked ledger is kept (and the identity stays blocked)
    pub block_period: u64,
    /// Seconds an unblocked ledger is kept after its last attempt
    pub ledger_retention: u64,
    /// Notify the account owner when an attempt on their login is blocked
    pub notify_on_block: bool,
}

impl Default for ThrottleConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            time_limit: 5,
            attempts_limit: 5,
            block_period: 86_400,
            ledger_retention: 86_400,
            notify_on_block: true,
        }
    }
}

impl ThrottleConfig {
    /// A configuration that lets every attempt through without recording it.
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.attempts_limit == 0 {
            return Err(ValidationError::InvalidConfig(
                "attempts_limit must be at least 1".to_string(),
            ));
        }
        if self.block_period == 0 {
            return Err(ValidationError::InvalidConfig(
                "block_period must be at least 1 second".to_string(),
            ));
        }
        if self.ledger_retention == 0 {
            return Err(ValidationError::InvalidConfig(
                "ledger_retention must be at least 1 second".to_string(),
            ));
        }
        Ok(())
    }

    pub fn block_ttl(&self) -> Duration {
        Duration::seconds(saturating_i64(self.block_period))
    }

    pub fn retention_ttl(&self) -> Duration {
        Duration::seconds(saturating_i64(self.ledger_retention))
    }
}

/// Configuration for TOTP generation and verification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TotpConfig {
    /// Length of a time step in seconds
    pub period: u64,
    /// Number of random bytes in a freshly generated secret
    pub secret_length: usize,
    /// Issuer shown by authenticator apps
    pub issuer: String,
    /// Width of the time step inside the HMAC message
    pub encoding: StepEncoding,
}

impl Default for TotpConfig {
    fn default() -> Self {
        Self {
            period: crate::totp::DEFAULT_PERIOD,
            secret_length: crate::totp::DEFAULT_SECRET_LENGTH,
            issuer: "tollgate".to_string(),
            encoding: StepEncoding::default(),
        }
    }
}

impl TotpConfig {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.period == 0 {
            return Err(ValidationError::InvalidConfig(
                "period must be at least 1 second".to_string(),
            ));
        }
        // 80 bits
        if self.secret_length < 10 {
            return Err(ValidationError::InvalidConfig(
                "secret_length must be at least 10 bytes".to_string(),
            ));
        }
        Ok(())
    }
}

fn saturating_i64(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_throttle_defaults() {
        let config = ThrottleConfig::default();
        assert!(config.enabled);
        assert_eq!(config.time_limit, 5);
        assert_eq!(config.attempts_limit, 5);
        assert_eq!(config.block_period, 86_400);
        assert_eq!(config.block_ttl(), Duration::days(1));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_disabled() {
        let config = ThrottleConfig::disabled();
        assert!(!config.enabled);
        assert_eq!(config.attempts_limit, 5);
    }

    #[test]
    fn test_validate_rejects_zero_attempts() {
        let config = ThrottleConfig {
            attempts_limit: 0,
            ..ThrottleConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ValidationError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_deserialize_partial_config() {
        let config: ThrottleConfig =
            serde_json::from_str(r#"{ "attempts_limit": 3, "time_limit": 10 }"#).unwrap();
        assert_eq!(config.attempts_limit, 3);
        assert_eq!(config.time_limit, 10);
        assert_eq!(config.block_period, 86_400);
    }

    #[test]
    fn test_totp_config_validation() {
        assert!(TotpConfig::default().validate().is_ok());

        let short = TotpConfig {
            secret_length: 4,
            ..TotpConfig::default()
        };
        assert!(short.validate().is_err());

        let zero = TotpConfig {
            period: 0,
            ..TotpConfig::default()
        };
        assert!(zero.validate().is_err());
    }
}
