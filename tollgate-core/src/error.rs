use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Throttle error: {0}")]
    Throttle(#[from] ThrottleError),

    #[error("Two-factor error: {0}")]
    Totp(#[from] TotpError),

    #[error("Authentication error: {0}")]
    Auth(#[from] AuthError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Cryptographic error: {0}")]
    Crypto(#[from] CryptoError),
}

/// Rejections produced by the attempt throttle.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ThrottleError {
    #[error("Too many login attempts in less than {time_limit} seconds.")]
    RateLimited { time_limit: u64 },

    #[error("Too many login attempts. Your IP is blocked for {}.", blocked_for(.block_period))]
    Blocked { block_period: u64 },

    /// Terminal transport-level rejection for programmatic callers. Hosts
    /// should answer with a bare 403 and no body.
    #[error("Forbidden")]
    Forbidden,

    #[error("Client identity could not be resolved")]
    IdentityUnresolved,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TotpError {
    #[error("Invalid 2FA code.")]
    InvalidCode,

    #[error("Invalid secret: {0}")]
    InvalidSecret(String),
}

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Invalid credentials")]
    InvalidCredentials,
}

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Migration error: {0}")]
    Migration(String),
}

#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("Random source failure: {0}")]
    Random(String),
}

impl Error {
    pub fn is_throttle_error(&self) -> bool {
        matches!(self, Error::Throttle(_))
    }

    /// True when the host must terminate the transport instead of rendering an error.
    pub fn is_transport_rejection(&self) -> bool {
        matches!(self, Error::Throttle(ThrottleError::Forbidden))
    }

    pub fn is_totp_error(&self) -> bool {
        matches!(self, Error::Totp(_))
    }

    pub fn is_auth_error(&self) -> bool {
        matches!(self, Error::Auth(_))
    }

    pub fn is_storage_error(&self) -> bool {
        matches!(self, Error::Storage(_))
    }

    pub fn is_validation_error(&self) -> bool {
        matches!(self, Error::Validation(_))
    }

    pub fn is_crypto_error(&self) -> bool {
        matches!(self, Error::Crypto(_))
    }
}

impl From<serde_json::Error> for StorageError {
    fn from(e: serde_json::Error) -> Self {
        StorageError::Serialization(e.to_string())
    }
}

fn blocked_for(block_period: &u64) -> String {
    humanize_period(*block_period)
}

/// Render a period in seconds the way it is shown to a blocked user.
pub fn humanize_period(seconds: u64) -> String {
    const MINUTE: u64 = 60;
    const HOUR: u64 = 60 * MINUTE;
    const DAY: u64 = 24 * HOUR;

    let (count, unit) = match seconds {
        s if s > 0 && s % DAY == 0 => (s / DAY, "day"),
        s if s > 0 && s % HOUR == 0 => (s / HOUR, "hour"),
        s if s > 0 && s % MINUTE == 0 => (s / MINUTE, "minute"),
        s => (s, "second"),
    };

    if count == 1 {
        let article = if unit == "hour" { "an" } else { "a" };
        format!("{article} {unit}")
    } else {
        format!("{count} {unit}s")
    }
}
