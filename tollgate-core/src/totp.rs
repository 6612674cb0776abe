//! Time-based one-time codes.
//!
//! Codes are six decimal digits derived from HMAC-SHA1 over the current time
//! step, truncated as described in RFC 4226 §5.3. Verification accepts the
//! current step only; there is no tolerance window for clock drift.
//!
//! # Step encoding
//!
//! The HMAC message is the time step as a big-endian integer. By default it
//! is 4 bytes wide ([`StepEncoding::Compact`]), which is what existing
//! tollgate secrets were enrolled with. Standard authenticator apps follow
//! RFC 6238 and use 8 bytes ([`StepEncoding::Rfc6238`]); hosts provisioning
//! secrets to such apps should select that encoding in [`TotpConfig`]. TOTP
//! crates only speak the 8 byte form, so codes are computed here.
//!
//! [`TotpConfig`]: crate::TotpConfig

use std::fmt;

use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha1::Sha1;
use url::form_urlencoded;

use crate::{
    base32,
    crypto::{constant_time_compare, random_bytes},
    error::{CryptoError, TotpError},
};

pub const DEFAULT_PERIOD: u64 = 30;
pub const DEFAULT_SECRET_LENGTH: usize = 16;
pub const DIGITS: usize = 6;

const MODULUS: u32 = 1_000_000;

/// Width of the time step inside the HMAC message.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepEncoding {
    /// 4-byte big-endian step (low 32 bits)
    #[default]
    Compact,
    /// 8-byte big-endian step, RFC 6238
    Rfc6238,
}

/// Raw (pre-Base32) shared secret of one account.
#[derive(Clone, PartialEq, Eq)]
pub struct TotpSecret(Vec<u8>);

impl TotpSecret {
    /// Draw `length` bytes from the operating system's CSPRNG.
    pub fn generate(length: usize) -> Result<Self, CryptoError> {
        Ok(Self(random_bytes(length)?))
    }

    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    /// Decode a Base32 secret. Formatting noise is skipped; a secret with no
    /// decodable bytes at all is rejected.
    pub fn from_base32(text: &str) -> Result<Self, TotpError> {
        let bytes = base32::decode(text);
        if bytes.is_empty() {
            return Err(TotpError::InvalidSecret(
                "no Base32 data in secret".to_string(),
            ));
        }
        Ok(Self(bytes))
    }

    pub fn to_base32(&self) -> String {
        base32::encode(&self.0)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Debug for TotpSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("TotpSecret").field(&"[REDACTED]").finish()
    }
}

/// A 6-digit, zero-padded one-time code.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TotpCode(String);

impl TotpCode {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TotpCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl PartialEq<&str> for TotpCode {
    fn eq(&self, other: &&str) -> bool {
        self.0 == *other
    }
}

/// The code valid right now plus when it stops being valid.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CurrentCode {
    pub code: TotpCode,
    /// Unix time of the next step boundary
    pub expires_at: i64,
    /// Seconds left until `expires_at`
    pub remaining: i64,
}

/// `floor(unix_time / period)`.
pub fn time_step(unix_time: i64, period: u64) -> i64 {
    let period = i64::try_from(period.max(1)).unwrap_or(i64::MAX);
    unix_time.div_euclid(period)
}

/// Compute the code for `unix_time` with the default step encoding.
pub fn totp(secret: &TotpSecret, period: u64, unix_time: i64) -> TotpCode {
    totp_with(secret, period, unix_time, StepEncoding::default())
}

pub fn totp_with(
    secret: &TotpSecret,
    period: u64,
    unix_time: i64,
    encoding: StepEncoding,
) -> TotpCode {
    let step = time_step(unix_time, period);
    let mut mac =
        Hmac::<Sha1>::new_from_slice(secret.as_bytes()).expect("HMAC accepts keys of any length");

    match encoding {
        StepEncoding::Compact => mac.update(&(step as u32).to_be_bytes()),
        StepEncoding::Rfc6238 => mac.update(&(step as u64).to_be_bytes()),
    }

    let digest = mac.finalize().into_bytes();
    let offset = usize::from(digest[19] & 0x0F);
    let binary = u32::from(digest[offset] & 0x7F) << 24
        | u32::from(digest[offset + 1]) << 16
        | u32::from(digest[offset + 2]) << 8
        | u32::from(digest[offset + 3]);

    TotpCode(format!("{:0width$}", binary % MODULUS, width = DIGITS))
}

/// Check `submitted` against the code of the current step only.
pub fn verify(secret: &TotpSecret, submitted: &str, period: u64, unix_time: i64) -> bool {
    verify_with(secret, submitted, period, unix_time, StepEncoding::default())
}

pub fn verify_with(
    secret: &TotpSecret,
    submitted: &str,
    period: u64,
    unix_time: i64,
    encoding: StepEncoding,
) -> bool {
    let expected = totp_with(secret, period, unix_time, encoding);
    constant_time_compare(expected.as_str().as_bytes(), submitted.as_bytes())
}

/// Unix time at which the code for `unix_time` expires. Display only.
pub fn expire_time(period: u64, unix_time: i64) -> i64 {
    let period_secs = i64::try_from(period.max(1)).unwrap_or(i64::MAX);
    time_step(unix_time, period)
        .saturating_add(1)
        .saturating_mul(period_secs)
}

pub fn current_code(
    secret: &TotpSecret,
    period: u64,
    unix_time: i64,
    encoding: StepEncoding,
) -> CurrentCode {
    let expires_at = expire_time(period, unix_time);
    CurrentCode {
        code: totp_with(secret, period, unix_time, encoding),
        expires_at,
        remaining: expires_at.saturating_sub(unix_time),
    }
}

/// `otpauth://totp/{label}?secret={base32}&issuer={issuer}` for QR enrollment.
///
/// Label and issuer are form-urlencoded.
pub fn provisioning_uri(label: &str, secret: &TotpSecret, issuer: &str) -> String {
    let label: String = form_urlencoded::byte_serialize(label.as_bytes()).collect();
    let query = form_urlencoded::Serializer::new(String::new())
        .append_pair("secret", &secret.to_base32())
        .append_pair("issuer", issuer)
        .finish();
    format!("otpauth://totp/{label}?{query}")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rfc_secret() -> TotpSecret {
        TotpSecret::from_bytes(b"12345678901234567890".to_vec())
    }

    #[test]
    fn test_time_step() {
        assert_eq!(time_step(0, 30), 0);
        assert_eq!(time_step(29, 30), 0);
        assert_eq!(time_step(30, 30), 1);
        assert_eq!(time_step(1_111_111_109, 30), 37_037_036);
        assert_eq!(time_step(-1, 30), -1);
    }

    #[test]
    fn test_rfc6238_sha1_vectors() {
        let secret = rfc_secret();
        let vectors = [
            (59, "287082"),
            (1_111_111_109, "081804"),
            (1_111_111_111, "050471"),
            (1_234_567_890, "005924"),
            (2_000_000_000, "279037"),
        ];
        for (time, expected) in vectors {
            assert_eq!(
                totp_with(&secret, 30, time, StepEncoding::Rfc6238),
                expected,
                "t = {time}"
            );
        }
    }

    #[test]
    fn test_compact_encoding_vectors() {
        let secret = rfc_secret();
        let vectors = [
            (0, "613114"),
            (59, "675152"),
            (1_000, "976917"),
            (1_111_111_109, "792951"),
            (1_234_567_890, "851050"),
        ];
        for (time, expected) in vectors {
            assert_eq!(totp(&secret, 30, time), expected, "t = {time}");
        }
    }

    #[test]
    fn test_code_is_six_ascii_digits() {
        let secret = TotpSecret::generate(16).unwrap();
        for time in (0..3_000).step_by(30) {
            let code = totp(&secret, 30, time);
            assert_eq!(code.as_str().len(), DIGITS);
            assert!(code.as_str().bytes().all(|b| b.is_ascii_digit()));
        }
    }

    #[test]
    fn test_same_step_same_code() {
        let secret = TotpSecret::generate(16).unwrap();
        assert_eq!(totp(&secret, 30, 1_020), totp(&secret, 30, 1_049));
    }

    #[test]
    fn test_different_step_different_code() {
        let secret = rfc_secret();
        assert_ne!(totp(&secret, 30, 1_049), totp(&secret, 30, 1_050));
    }

    #[test]
    fn test_verify_current_step_only() {
        let secret = rfc_secret();
        let code = totp(&secret, 30, 1_000);

        assert!(verify(&secret, code.as_str(), 30, 1_000));
        assert!(verify(&secret, code.as_str(), 30, 1_019));
        // 1_020 starts the next step; no drift window
        assert!(!verify(&secret, code.as_str(), 30, 1_020));
        assert!(!verify(&secret, code.as_str(), 30, 989));
    }

    #[test]
    fn test_verify_rejects_wrong_codes() {
        let secret = rfc_secret();
        assert!(!verify(&secret, "000000", 30, 1_000));
        assert!(!verify(&secret, "", 30, 1_000));
        assert!(!verify(&secret, "9769170", 30, 1_000));
    }

    #[test]
    fn test_expire_time() {
        assert_eq!(expire_time(30, 0), 30);
        assert_eq!(expire_time(30, 1_000), 1_020);
        assert_eq!(expire_time(30, 1_019), 1_020);
        assert_eq!(expire_time(30, 1_020), 1_050);
        assert_eq!(expire_time(30, i64::MAX), i64::MAX);
    }

    #[test]
    fn test_current_code() {
        let secret = rfc_secret();
        let current = current_code(&secret, 30, 1_000, StepEncoding::Compact);
        assert_eq!(current.code, "976917");
        assert_eq!(current.expires_at, 1_020);
        assert_eq!(current.remaining, 20);
    }

    #[test]
    fn test_secret_base32_round_trip() {
        let secret = rfc_secret();
        assert_eq!(secret.to_base32(), "GEZDGNBVGY3TQOJQGEZDGNBVGY3TQOJQ");
        assert_eq!(
            TotpSecret::from_base32("gezd gnbv gy3t qojq gezd gnbv gy3t qojq").unwrap(),
            secret
        );
    }

    #[test]
    fn test_secret_from_base32_rejects_empty() {
        assert!(matches!(
            TotpSecret::from_base32("!!--"),
            Err(TotpError::InvalidSecret(_))
        ));
    }

    #[test]
    fn test_generate_secret_length() {
        assert_eq!(TotpSecret::generate(16).unwrap().as_bytes().len(), 16);
        assert_eq!(TotpSecret::generate(20).unwrap().as_bytes().len(), 20);
    }

    #[test]
    fn test_secret_debug_is_redacted() {
        let rendered = format!("{:?}", rfc_secret());
        assert!(!rendered.contains("12345"));
        assert!(rendered.contains("REDACTED"));
    }

    #[test]
    fn test_provisioning_uri() {
        let uri = provisioning_uri("jane doe", &rfc_secret(), "My Blog");
        assert_eq!(
            uri,
            "otpauth://totp/jane+doe?secret=GEZDGNBVGY3TQOJQGEZDGNBVGY3TQOJQ&issuer=My+Blog"
        );
    }
}
