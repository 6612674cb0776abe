//! Cryptographic helpers shared by the TOTP engine.
//!
//! # Security
//!
//! Submitted one-time codes are compared against the expected code with a
//! constant-time comparison via the `subtle` crate, so the comparison takes
//! the same time regardless of where (or if) the strings differ.

use rand::{TryRngCore, rngs::OsRng};
use subtle::ConstantTimeEq;

use crate::error::CryptoError;

/// Fill a buffer of `length` bytes from the operating system's CSPRNG.
///
/// # Errors
///
/// Returns [`CryptoError::Random`] if the OS entropy source is unavailable.
pub fn random_bytes(length: usize) -> Result<Vec<u8>, CryptoError> {
    let mut bytes = vec![0u8; length];
    OsRng
        .try_fill_bytes(&mut bytes)
        .map_err(|e| CryptoError::Random(e.to_string()))?;
    Ok(bytes)
}

/// Perform constant-time comparison of two byte slices.
///
/// # Arguments
///
/// * `a` - First byte slice
/// * `b` - Second byte slice
///
/// # Returns
///
/// `true` if the slices are equal, `false` otherwise
pub fn constant_time_compare(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.ct_eq(b).into()
}
